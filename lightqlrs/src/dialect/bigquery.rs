//! BigQuery dialect implementation.

use crate::explores::{FieldType, TimeInterval};

use super::{Dialect, WarehouseType};

#[derive(Debug, Default, Clone, Copy)]
pub struct BigQueryDialect;

impl Dialect for BigQueryDialect {
    fn warehouse_type(&self) -> WarehouseType {
        WarehouseType::Bigquery
    }

    fn quote_ident(&self, ident: &str) -> String {
        // BigQuery uses backticks for identifiers
        format!("`{}`", ident.replace('`', "\\`"))
    }

    fn escape_string(&self, value: &str) -> String {
        value.replace('\\', "\\\\").replace('\'', "\\'")
    }

    fn render_percentile(&self, expr: &str, percentile: u8) -> String {
        format!("APPROX_QUANTILES({expr}, 100)[OFFSET({})]", percentile.min(100))
    }

    fn render_time_interval(
        &self,
        interval: TimeInterval,
        field_type: FieldType,
        expr: &str,
    ) -> String {
        let unit = interval.as_str().to_ascii_uppercase();
        match field_type {
            // BigQuery: DATE_TRUNC(date, MONTH)
            FieldType::Date => format!("DATE_TRUNC({expr}, {unit})"),
            // BigQuery: TIMESTAMP_TRUNC(timestamp, MONTH)
            _ => format!("TIMESTAMP_TRUNC({expr}, {unit})"),
        }
    }
}
