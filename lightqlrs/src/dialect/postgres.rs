//! PostgreSQL dialect implementation.

use crate::explores::{FieldType, TimeInterval};

use super::{Dialect, WarehouseType};

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn warehouse_type(&self) -> WarehouseType {
        WarehouseType::Postgres
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
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
}
