//! SQL dialect abstractions for the supported warehouses.
//!
//! A dialect is the compiler's only view of the warehouse client: how to quote
//! identifiers, escape values, aggregate, truncate dates and limit rows. Each
//! warehouse lives in its own file.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::explores::{FieldType, MetricType, TimeInterval};

/// Dialects render identifiers and primitive expression pieces.
/// Template compilation and clause assembly live in the query builder; the
/// dialect only maps logical constructs to SQL fragments.
pub trait Dialect {
    fn warehouse_type(&self) -> WarehouseType;

    fn quote_ident(&self, ident: &str) -> String;

    /// Escape the body of a single-quoted string literal.
    fn escape_string(&self, value: &str) -> String {
        value.replace('\'', "''")
    }

    fn qualify_table(
        &self,
        database: Option<&str>,
        schema: Option<&str>,
        relation: &str,
    ) -> String {
        [database, schema, Some(relation)]
            .into_iter()
            .flatten()
            .map(|part| self.quote_ident(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn render_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => format!("'{}'", self.escape_string(s)),
            Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|v| self.render_literal(v)).collect();
                rendered.join(", ")
            }
            Value::Object(_) => format!("'{}'", self.escape_string(&value.to_string())),
        }
    }

    fn render_aggregation(
        &self,
        metric_type: MetricType,
        expr: &str,
        percentile: Option<u8>,
    ) -> String {
        match metric_type {
            MetricType::Sum => format!("SUM({expr})"),
            MetricType::Count => format!("COUNT({expr})"),
            MetricType::CountDistinct => format!("COUNT(DISTINCT {expr})"),
            MetricType::Average => format!("AVG({expr})"),
            MetricType::Min => format!("MIN({expr})"),
            MetricType::Max => format!("MAX({expr})"),
            MetricType::Median => self.render_percentile(expr, 50),
            MetricType::Percentile => self.render_percentile(expr, percentile.unwrap_or(50)),
            MetricType::Custom => expr.to_string(),
        }
    }

    fn render_percentile(&self, expr: &str, percentile: u8) -> String {
        format!(
            "PERCENTILE_CONT({}) WITHIN GROUP (ORDER BY {expr})",
            percentile_fraction(percentile)
        )
    }

    fn render_time_interval(
        &self,
        interval: TimeInterval,
        field_type: FieldType,
        expr: &str,
    ) -> String;

    /// Case-insensitive substring test; `pattern` is an already rendered literal.
    fn render_contains(&self, expr: &str, pattern: &str, negated: bool) -> String {
        let not_kw = if negated { "NOT " } else { "" };
        format!("LOWER({expr}) {not_kw}LIKE LOWER({pattern})")
    }

    /// Escape LIKE wildcards so `text` matches literally.
    fn escape_like(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            if matches!(c, '\\' | '%' | '_') {
                out.push('\\');
            }
            out.push(c);
        }
        out
    }

    /// Appended after LIKE patterns built with [`Dialect::escape_like`].
    /// Empty where backslash is already the default escape character.
    fn like_escape_clause(&self) -> String {
        String::new()
    }

    fn render_limit(&self, limit: u64) -> String {
        format!("LIMIT {limit}")
    }

    /// Whether table calculations can be evaluated in the aggregating SELECT.
    /// When false the aggregation is wrapped in a `metrics` CTE first.
    fn supports_inline_table_calculations(&self) -> bool {
        false
    }
}

/// Percentile 0..=100 as a fraction literal (`50` -> `0.5`).
pub(crate) fn percentile_fraction(percentile: u8) -> String {
    let clamped = percentile.min(100);
    format!("{}", f64::from(clamped) / 100.0)
}

/// Supported warehouses, as named in configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseType {
    #[default]
    Postgres,
    Bigquery,
    Snowflake,
    Duckdb,
}

impl WarehouseType {
    pub fn dialect(&self) -> Box<dyn Dialect + Send + Sync> {
        match self {
            WarehouseType::Postgres => Box::new(PostgresDialect),
            WarehouseType::Bigquery => Box::new(BigQueryDialect),
            WarehouseType::Snowflake => Box::new(SnowflakeDialect),
            WarehouseType::Duckdb => Box::new(DuckDbDialect),
        }
    }
}

mod bigquery;
mod duckdb;
mod postgres;
mod snowflake;

pub use bigquery::BigQueryDialect;
pub use duckdb::DuckDbDialect;
pub use postgres::PostgresDialect;
pub use snowflake::SnowflakeDialect;
