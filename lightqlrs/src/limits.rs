//! Row limit policy derived from a cell budget.

use serde::{Deserialize, Serialize};

use crate::error::{LightqlError, Result};

pub const DEFAULT_CSV_CELLS_LIMIT: u64 = 100_000;
pub const DEFAULT_MAX_LIMIT: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowLimitPolicy {
    /// Maximum number of cells (rows x columns) a result may hold.
    pub csv_cells_limit: u64,
    /// Largest limit a caller may request. `None` accepts any limit.
    pub max_limit: Option<u64>,
}

impl Default for RowLimitPolicy {
    fn default() -> Self {
        Self {
            csv_cells_limit: DEFAULT_CSV_CELLS_LIMIT,
            max_limit: Some(DEFAULT_MAX_LIMIT),
        }
    }
}

impl RowLimitPolicy {
    pub fn unbounded_requests(csv_cells_limit: u64) -> Self {
        Self {
            csv_cells_limit,
            max_limit: None,
        }
    }

    /// Rows that fit in the cell budget for `column_count` columns, never
    /// below one.
    pub fn cell_cap(&self, column_count: usize) -> u64 {
        let columns = (column_count as u64).max(1);
        (self.csv_cells_limit / columns).max(1)
    }

    /// Resolve the limit to emit for a query selecting `column_count` columns.
    pub fn resolve(&self, requested: Option<u64>, column_count: usize) -> Result<u64> {
        let cap = self.cell_cap(column_count);
        match requested {
            None => Ok(cap),
            Some(0) => Err(LightqlError::Parameter(
                "limit must be greater than zero".to_string(),
            )),
            Some(limit) => {
                if let Some(max) = self.max_limit {
                    if limit > max {
                        return Err(LightqlError::Parameter(format!(
                            "limit {limit} exceeds the maximum of {max}"
                        )));
                    }
                }
                if limit > cap {
                    tracing::debug!(
                        requested = limit,
                        cap,
                        column_count,
                        "clamped row limit to cell budget"
                    );
                }
                Ok(limit.min(cap))
            }
        }
    }
}
