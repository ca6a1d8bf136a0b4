//! Snowflake dialect implementation.

use crate::explores::{FieldType, TimeInterval};

use super::{Dialect, WarehouseType};

#[derive(Debug, Default, Clone, Copy)]
pub struct SnowflakeDialect;

impl Dialect for SnowflakeDialect {
    fn warehouse_type(&self) -> WarehouseType {
        WarehouseType::Snowflake
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    // Backslash starts an escape sequence inside Snowflake string literals.
    fn escape_string(&self, value: &str) -> String {
        value.replace('\\', "\\\\").replace('\'', "''")
    }

    fn render_time_interval(
        &self,
        interval: TimeInterval,
        _field_type: FieldType,
        expr: &str,
    ) -> String {
        format!(
            "DATE_TRUNC('{}', {expr})",
            interval.as_str().to_ascii_uppercase()
        )
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
