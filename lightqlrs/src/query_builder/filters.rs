//! Compiles nested AND/OR filter trees into SQL predicates.

use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::{LightqlError, Result};
use crate::explores::FieldType;
use crate::metric_query::{FilterGroup, FilterGroupItem, FilterOperator, FilterRule};
use crate::sql_ast::{LogicalOperator, SqlBinaryOperator, SqlExpr, SqlRenderer};

use super::fields::FieldMap;
use super::templates::parenthesize;

/// What a rule's field id resolved to: the SQL to compare and, when known,
/// the field type.
#[derive(Debug, Clone)]
pub(crate) struct FilterTarget {
    pub sql: String,
    pub field_type: Option<FieldType>,
}

/// A compiled predicate with the field ids of the rules that produced it.
/// Skipped rules contribute neither SQL nor ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompiledFilter {
    pub sql: String,
    pub field_ids: Vec<String>,
}

/// Compile a filter tree against the field registry. Returns `None` when
/// nothing in the tree produces a predicate.
pub fn compile_filter_group(
    group: &FilterGroup,
    fields: &FieldMap,
    dialect: &dyn Dialect,
) -> Result<Option<String>> {
    Ok(compile_filter_fields(group, fields, dialect)?.map(|f| f.sql))
}

pub(crate) fn compile_filter_fields(
    group: &FilterGroup,
    fields: &FieldMap,
    dialect: &dyn Dialect,
) -> Result<Option<CompiledFilter>> {
    compile_filter_group_with(group, dialect, |id| {
        let field = fields.resolve(id)?;
        Ok(FilterTarget {
            sql: field.sql.clone(),
            field_type: Some(field.field_type),
        })
    })
}

pub(crate) fn compile_filter_group_with<F>(
    group: &FilterGroup,
    dialect: &dyn Dialect,
    mut resolve: F,
) -> Result<Option<CompiledFilter>>
where
    F: FnMut(&str) -> Result<FilterTarget>,
{
    let mut compiler = TreeCompiler {
        dialect,
        resolve: &mut resolve,
        field_ids: Vec::new(),
    };
    let expr = compiler.group(group)?;
    let field_ids = compiler.field_ids;
    Ok(expr.map(|e| CompiledFilter {
        sql: SqlRenderer::new(dialect).render_expr(&e),
        field_ids,
    }))
}

struct TreeCompiler<'a, F> {
    dialect: &'a dyn Dialect,
    resolve: &'a mut F,
    field_ids: Vec<String>,
}

impl<F> TreeCompiler<'_, F>
where
    F: FnMut(&str) -> Result<FilterTarget>,
{
    fn group(&mut self, group: &FilterGroup) -> Result<Option<SqlExpr>> {
        let mut items = Vec::new();
        for item in group.items() {
            let compiled = match item {
                FilterGroupItem::Group(nested) => self.group(nested)?,
                FilterGroupItem::Rule(rule) => {
                    let expr = rule_to_expr(rule, self.dialect, &mut *self.resolve)?;
                    if expr.is_some() && !self.field_ids.contains(&rule.target.field_id) {
                        self.field_ids.push(rule.target.field_id.clone());
                    }
                    expr
                }
            };
            items.extend(compiled);
        }
        if items.is_empty() {
            return Ok(None);
        }
        let op = match group {
            FilterGroup::And(_) => LogicalOperator::And,
            FilterGroup::Or(_) => LogicalOperator::Or,
        };
        Ok(Some(SqlExpr::Logical { op, items }))
    }
}

fn rule_to_expr<F>(
    rule: &FilterRule,
    dialect: &dyn Dialect,
    resolve: &mut F,
) -> Result<Option<SqlExpr>>
where
    F: FnMut(&str) -> Result<FilterTarget>,
{
    if rule.disabled {
        return Ok(None);
    }
    let target = resolve(&rule.target.field_id)?;
    let field = || Box::new(SqlExpr::Raw(parenthesize(&target.sql)));

    let values = match rule.operator {
        FilterOperator::IsNull | FilterOperator::NotNull => Vec::new(),
        _ => scalar_values(rule)?,
    };

    let expr = match rule.operator {
        FilterOperator::IsNull | FilterOperator::NotNull => Some(SqlExpr::IsNull {
            expr: field(),
            negated: rule.operator == FilterOperator::NotNull,
        }),
        _ if values.is_empty() => None,
        FilterOperator::Equals if values.len() == 1 => {
            Some(binary(SqlBinaryOperator::Eq, field(), &values[0]))
        }
        FilterOperator::Equals | FilterOperator::In => Some(SqlExpr::InList {
            expr: field(),
            list: literals(&values),
            negated: false,
        }),
        FilterOperator::NotEquals => {
            let mismatch = if values.len() == 1 {
                binary(SqlBinaryOperator::Neq, field(), &values[0])
            } else {
                SqlExpr::InList {
                    expr: field(),
                    list: literals(&values),
                    negated: true,
                }
            };
            Some(SqlExpr::Logical {
                op: LogicalOperator::Or,
                items: vec![
                    mismatch,
                    SqlExpr::IsNull {
                        expr: field(),
                        negated: false,
                    },
                ],
            })
        }
        FilterOperator::Include | FilterOperator::NotInclude => {
            if let Some(field_type) = target.field_type {
                if field_type != FieldType::String {
                    return Err(LightqlError::Compile(format!(
                        "operator {:?} needs a string field but {} is {:?}",
                        rule.operator, rule.target.field_id, field_type
                    )));
                }
            }
            let negated = rule.operator == FilterOperator::NotInclude;
            let items = values
                .iter()
                .map(|v| SqlExpr::Contains {
                    expr: field(),
                    pattern: Box::new(SqlExpr::Literal(Value::String(format!(
                        "%{}%",
                        dialect.escape_like(&value_text(v))
                    )))),
                    negated,
                })
                .collect();
            let op = if negated {
                LogicalOperator::And
            } else {
                LogicalOperator::Or
            };
            Some(SqlExpr::Logical { op, items })
        }
        FilterOperator::StartsWith | FilterOperator::EndsWith => {
            let starts = rule.operator == FilterOperator::StartsWith;
            let items = values
                .iter()
                .map(|v| {
                    let text = dialect.escape_like(&value_text(v));
                    let pattern = if starts {
                        format!("{text}%")
                    } else {
                        format!("%{text}")
                    };
                    binary(SqlBinaryOperator::Like, field(), &Value::String(pattern))
                })
                .collect();
            Some(SqlExpr::Logical {
                op: LogicalOperator::Or,
                items,
            })
        }
        FilterOperator::GreaterThan => Some(binary(SqlBinaryOperator::Gt, field(), &values[0])),
        FilterOperator::GreaterThanOrEqual => {
            Some(binary(SqlBinaryOperator::Gte, field(), &values[0]))
        }
        FilterOperator::LessThan => Some(binary(SqlBinaryOperator::Lt, field(), &values[0])),
        FilterOperator::LessThanOrEqual => {
            Some(binary(SqlBinaryOperator::Lte, field(), &values[0]))
        }
        FilterOperator::InBetween | FilterOperator::NotInBetween => match values.as_slice() {
            [low, high, ..] => Some(SqlExpr::Between {
                expr: field(),
                low: Box::new(SqlExpr::Literal(low.clone())),
                high: Box::new(SqlExpr::Literal(high.clone())),
                negated: rule.operator == FilterOperator::NotInBetween,
            }),
            _ => None,
        },
    };

    if expr.is_none() {
        tracing::trace!(
            field = %rule.target.field_id,
            operator = ?rule.operator,
            "skipped filter rule without values"
        );
    }
    Ok(expr)
}

/// Rule values must be scalars; nulls, arrays and objects cannot be
/// compared against a single column.
fn scalar_values(rule: &FilterRule) -> Result<Vec<Value>> {
    rule.values
        .iter()
        .map(|value| match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(value.clone()),
            other => Err(LightqlError::Compile(format!(
                "filter on {} has unsupported value {other}",
                rule.target.field_id
            ))),
        })
        .collect()
}

fn binary(op: SqlBinaryOperator, left: Box<SqlExpr>, value: &Value) -> SqlExpr {
    SqlExpr::BinaryOp {
        op,
        left,
        right: Box::new(SqlExpr::Literal(value.clone())),
    }
}

fn literals(values: &[Value]) -> Vec<SqlExpr> {
    values.iter().cloned().map(SqlExpr::Literal).collect()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
