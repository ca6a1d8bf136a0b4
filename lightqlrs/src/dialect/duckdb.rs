//! DuckDB dialect implementation.

use crate::explores::{FieldType, TimeInterval};

use super::{percentile_fraction, Dialect, WarehouseType};

#[derive(Debug, Default, Clone, Copy)]
pub struct DuckDbDialect;

impl Dialect for DuckDbDialect {
    fn warehouse_type(&self) -> WarehouseType {
        WarehouseType::Duckdb
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn render_percentile(&self, expr: &str, percentile: u8) -> String {
        format!("QUANTILE_CONT({expr}, {})", percentile_fraction(percentile))
    }

    fn render_time_interval(
        &self,
        interval: TimeInterval,
        _field_type: FieldType,
        expr: &str,
    ) -> String {
        format!("DATE_TRUNC('{}', {expr})", interval.as_str())
    }

    fn render_contains(&self, expr: &str, pattern: &str, negated: bool) -> String {
        let not_kw = if negated { "NOT " } else { "" };
        format!("{expr} {not_kw}ILIKE {pattern}")
    }

    fn like_escape_clause(&self) -> String {
        format!(" ESCAPE '{}'", self.escape_string("\\"))
    }

    fn supports_inline_table_calculations(&self) -> bool {
        true
    }
}
