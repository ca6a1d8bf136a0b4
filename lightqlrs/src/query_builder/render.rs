use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::dialect::Dialect;
use crate::sql_ast::{
    Cte, Join, OrderItem, Relation, SelectItem, SelectQuery, SqlExpr, SqlRenderer, TableRef,
};

use super::compile::CompiledMetricQuery;

/// Name of the CTE holding the aggregated rows when table calculations or
/// their filters are evaluated in an outer query.
pub const METRICS_CTE: &str = "metrics";

/// Final SQL plus metadata about how it was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledSql {
    pub query: String,
    /// True when a selected metric is the synthetic count added to explores
    /// without metrics.
    pub has_example_metric: bool,
}

impl CompiledSql {
    /// SHA-256 of the SQL text as 64 lowercase hex characters.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.query.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

pub fn render(compiled: &CompiledMetricQuery, dialect: &dyn Dialect) -> CompiledSql {
    let query = SqlRenderer::new(dialect).render_select(&to_select_query(compiled, dialect));
    tracing::trace!(explore = %compiled.explore_name, sql = %query, "rendered sql");
    CompiledSql {
        query,
        has_example_metric: compiled.has_example_metric,
    }
}

/// Whether the aggregation must be wrapped in the `metrics` CTE.
pub(crate) fn needs_metrics_cte(compiled: &CompiledMetricQuery, dialect: &dyn Dialect) -> bool {
    compiled.table_calculation_filter_sql.is_some()
        || (!compiled.table_calculations.is_empty()
            && !dialect.supports_inline_table_calculations())
}

pub(crate) fn to_select_query(
    compiled: &CompiledMetricQuery,
    dialect: &dyn Dialect,
) -> SelectQuery {
    let mut aggregate = SelectQuery {
        select: compiled
            .dimensions
            .iter()
            .chain(compiled.metrics.iter())
            .map(|field| SelectItem {
                expr: SqlExpr::Raw(field.sql.clone()),
                alias: Some(field.id.clone()),
            })
            .collect(),
        from: compiled.from.clone(),
        joins: compiled
            .joins
            .iter()
            .map(|join| Join {
                join_type: join.join_type,
                table: join.table.clone(),
                on: SqlExpr::Raw(join.sql_on.clone()),
            })
            .collect(),
        filter: compiled.where_sql.clone().map(SqlExpr::Raw),
        having: compiled.having_sql.clone().map(SqlExpr::Raw),
        ..Default::default()
    };
    if !compiled.metrics.is_empty() {
        aggregate.group_by = compiled
            .dimensions
            .iter()
            .map(|d| SqlExpr::Raw(d.sql.clone()))
            .collect();
    }

    let order_by: Vec<OrderItem> = compiled
        .sorts
        .iter()
        .map(|sort| OrderItem {
            expr: SqlExpr::Column {
                table: None,
                name: sort.alias.clone(),
            },
            descending: sort.descending,
        })
        .collect();

    if !needs_metrics_cte(compiled, dialect) {
        aggregate
            .select
            .extend(compiled.table_calculations.iter().map(|tc| SelectItem {
                expr: SqlExpr::Raw(tc.inline_sql.clone()),
                alias: Some(tc.name.clone()),
            }));
        aggregate.order_by = order_by;
        aggregate.limit = Some(compiled.limit);
        return aggregate;
    }

    let mut select = vec![SelectItem {
        expr: SqlExpr::Raw("*".to_string()),
        alias: None,
    }];
    select.extend(compiled.table_calculations.iter().map(|tc| SelectItem {
        expr: SqlExpr::Raw(tc.cte_sql.clone()),
        alias: Some(tc.name.clone()),
    }));
    SelectQuery {
        with: vec![Cte {
            name: METRICS_CTE.to_string(),
            query: Box::new(aggregate),
        }],
        select,
        from: TableRef {
            relation: Relation::Cte(METRICS_CTE.to_string()),
            alias: None,
        },
        filter: compiled.table_calculation_filter_sql.clone().map(SqlExpr::Raw),
        order_by,
        limit: Some(compiled.limit),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_sha256_hex_of_query() {
        let sql = CompiledSql {
            query: "SELECT 1".to_string(),
            has_example_metric: false,
        };
        let key = sql.cache_key();
        assert_eq!(key.len(), 64);
        assert_eq!(key, sql.clone().cache_key());
        let other = CompiledSql {
            query: "SELECT 2".to_string(),
            has_example_metric: false,
        };
        assert_ne!(key, other.cache_key());
    }
}
