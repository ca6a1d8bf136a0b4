pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod explores;
pub mod limits;
pub mod metric_query;
pub mod query_builder;
pub mod registry;
pub mod runtime;
pub mod sql_ast;
pub mod validation;

use std::path::Path;

use crate::error::Result;

/// Compile and render one metric query with the default row limit policy.
pub fn compile_and_build(
    explore: &Explore,
    query: &MetricQuery,
    dialect: &dyn Dialect,
) -> Result<CompiledSql> {
    SqlBuilder::default().build_with_dialect(explore, query, dialect)
}

/// Load explores from disk and validate them with the provided validator.
pub fn load_and_validate<P: AsRef<Path>>(
    explore_dir: P,
    validator: &crate::validation::Validator,
) -> Result<ExploreRegistry> {
    let registry = ExploreRegistry::load_from_dir(explore_dir)?;
    validator.validate_registry(&registry)?;
    Ok(registry)
}

pub use crate::validation::Validator;
pub use config::LightqlConfig;
pub use dialect::{
    BigQueryDialect, Dialect, DuckDbDialect, PostgresDialect, SnowflakeDialect, WarehouseType,
};
pub use error::LightqlError;
pub use executor::{ColumnMeta, QueryResult, WarehouseClient};
pub use explores::{Dimension, Explore, ExploreJoin, Metric, Table};
pub use limits::RowLimitPolicy;
pub use metric_query::{
    AdditionalMetric, FilterGroup, FilterGroupItem, FilterOperator, FilterRule, Filters,
    MetricQuery, QueryRequest, SortField, TableCalculation,
};
pub use query_builder::{CompiledMetricQuery, CompiledSql, SqlBuilder};
pub use registry::ExploreRegistry;
