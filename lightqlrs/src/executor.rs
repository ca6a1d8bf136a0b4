//! Execution seam towards a warehouse.
//!
//! Connection management and credentials belong to the implementor; the
//! compiler only asks a client for its dialect and hands it finished SQL.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::dialect::Dialect;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMeta {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Map<String, Value>>,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// A warehouse connection able to run compiled SQL.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    fn dialect(&self) -> &(dyn Dialect + Send + Sync);
    async fn run_sql(&self, sql: &str) -> Result<QueryResult>;
}
