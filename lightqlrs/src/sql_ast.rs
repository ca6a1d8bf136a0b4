use serde_json::Value;

use crate::dialect::Dialect;
use crate::explores::JoinType;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    /// Pre-compiled SQL emitted verbatim.
    Raw(String),
    Column {
        table: Option<String>,
        name: String,
    },
    Literal(Value),
    BinaryOp {
        op: SqlBinaryOperator,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
        negated: bool,
    },
    Between {
        expr: Box<SqlExpr>,
        low: Box<SqlExpr>,
        high: Box<SqlExpr>,
        negated: bool,
    },
    IsNull {
        expr: Box<SqlExpr>,
        negated: bool,
    },
    /// Case-insensitive substring match, rendered by the dialect.
    Contains {
        expr: Box<SqlExpr>,
        pattern: Box<SqlExpr>,
        negated: bool,
    },
    /// `AND`/`OR` over several predicates. A single item renders bare.
    Logical {
        op: LogicalOperator,
        items: Vec<SqlExpr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlBinaryOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    Named {
        database: Option<String>,
        schema: Option<String>,
        name: String,
    },
    /// Derived-table SQL, wrapped in parentheses when rendered.
    Derived(String),
    /// A CTE declared in the same statement.
    Cte(String),
}

impl Default for Relation {
    fn default() -> Self {
        Relation::Cte(String::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRef {
    pub relation: Relation,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableRef,
    pub on: SqlExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: SqlExpr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub query: Box<SelectQuery>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub with: Vec<Cte>,
    pub select: Vec<SelectItem>,
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub filter: Option<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub having: Option<SqlExpr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
}

pub struct SqlRenderer<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> SqlRenderer<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Render a statement, one clause per line.
    pub fn render_select(&self, query: &SelectQuery) -> String {
        let mut lines = Vec::new();

        if !query.with.is_empty() {
            let ctes: Vec<String> = query
                .with
                .iter()
                .map(|cte| {
                    format!(
                        "{} AS (\n{}\n)",
                        self.dialect.quote_ident(&cte.name),
                        self.render_select(&cte.query)
                    )
                })
                .collect();
            lines.push(format!("WITH {}", ctes.join(",\n")));
        }

        let select_items: Vec<String> = query
            .select
            .iter()
            .map(|item| {
                let expr_sql = self.render_expr(&item.expr);
                match &item.alias {
                    Some(alias) => format!("  {expr_sql} AS {}", self.dialect.quote_ident(alias)),
                    None => format!("  {expr_sql}"),
                }
            })
            .collect();
        lines.push(format!("SELECT\n{}", select_items.join(",\n")));
        lines.push(format!("FROM {}", self.render_table_ref(&query.from)));

        for join in &query.joins {
            let join_kw = match join.join_type {
                JoinType::Inner => "INNER JOIN",
                JoinType::Left => "LEFT OUTER JOIN",
                JoinType::Right => "RIGHT OUTER JOIN",
                JoinType::Full => "FULL OUTER JOIN",
            };
            lines.push(format!(
                "{join_kw} {}\n  ON {}",
                self.render_table_ref(&join.table),
                self.render_expr(&join.on)
            ));
        }

        if let Some(filter) = &query.filter {
            lines.push(format!("WHERE {}", self.render_expr(filter)));
        }

        if !query.group_by.is_empty() {
            let groups: Vec<String> = query.group_by.iter().map(|g| self.render_expr(g)).collect();
            lines.push(format!("GROUP BY {}", groups.join(", ")));
        }

        if let Some(having) = &query.having {
            lines.push(format!("HAVING {}", self.render_expr(having)));
        }

        if !query.order_by.is_empty() {
            let orders: Vec<String> = query
                .order_by
                .iter()
                .map(|o| {
                    let dir = if o.descending { "DESC" } else { "ASC" };
                    format!("{} {dir}", self.render_expr(&o.expr))
                })
                .collect();
            lines.push(format!("ORDER BY {}", orders.join(", ")));
        }

        if let Some(limit) = query.limit {
            lines.push(self.dialect.render_limit(limit));
        }

        lines.join("\n")
    }

    fn render_table_ref(&self, table: &TableRef) -> String {
        let relation = match &table.relation {
            Relation::Named {
                database,
                schema,
                name,
            } => self
                .dialect
                .qualify_table(database.as_deref(), schema.as_deref(), name),
            Relation::Derived(sql) => format!("(\n{sql}\n)"),
            Relation::Cte(name) => self.dialect.quote_ident(name),
        };
        match &table.alias {
            Some(alias) => format!("{relation} AS {}", self.dialect.quote_ident(alias)),
            None => relation,
        }
    }

    pub fn render_expr(&self, expr: &SqlExpr) -> String {
        match expr {
            SqlExpr::Raw(sql) => sql.clone(),
            SqlExpr::Column { table, name } => match table {
                Some(t) => format!(
                    "{}.{}",
                    self.dialect.quote_ident(t),
                    self.dialect.quote_ident(name)
                ),
                None => self.dialect.quote_ident(name),
            },
            SqlExpr::Literal(v) => self.dialect.render_literal(v),
            SqlExpr::BinaryOp { op, left, right } => {
                let op_sql = match op {
                    SqlBinaryOperator::Eq => "=",
                    SqlBinaryOperator::Neq => "!=",
                    SqlBinaryOperator::Gt => ">",
                    SqlBinaryOperator::Gte => ">=",
                    SqlBinaryOperator::Lt => "<",
                    SqlBinaryOperator::Lte => "<=",
                    SqlBinaryOperator::Like => "LIKE",
                };
                let escape = match op {
                    SqlBinaryOperator::Like => self.dialect.like_escape_clause(),
                    _ => String::new(),
                };
                format!(
                    "{} {} {}{escape}",
                    self.render_expr(left),
                    op_sql,
                    self.render_expr(right)
                )
            }
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                let rendered_values: Vec<String> =
                    list.iter().map(|v| self.render_expr(v)).collect();
                let not_kw = if *negated { "NOT " } else { "" };
                format!(
                    "{} {}IN ({})",
                    self.render_expr(expr),
                    not_kw,
                    rendered_values.join(", ")
                )
            }
            SqlExpr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not_kw = if *negated { "NOT " } else { "" };
                format!(
                    "{} {}BETWEEN {} AND {}",
                    self.render_expr(expr),
                    not_kw,
                    self.render_expr(low),
                    self.render_expr(high)
                )
            }
            SqlExpr::IsNull { expr, negated } => {
                let not_kw = if *negated { "NOT " } else { "" };
                format!("{} IS {not_kw}NULL", self.render_expr(expr))
            }
            SqlExpr::Contains {
                expr,
                pattern,
                negated,
            } => format!(
                "{}{}",
                self.dialect.render_contains(
                    &self.render_expr(expr),
                    &self.render_expr(pattern),
                    *negated,
                ),
                self.dialect.like_escape_clause()
            ),
            SqlExpr::Logical { op, items } => {
                if let [single] = items.as_slice() {
                    return self.render_expr(single);
                }
                let joiner = match op {
                    LogicalOperator::And => " AND ",
                    LogicalOperator::Or => " OR ",
                };
                let parts: Vec<String> = items.iter().map(|i| self.render_expr(i)).collect();
                format!("({})", parts.join(joiner))
            }
        }
    }
}
