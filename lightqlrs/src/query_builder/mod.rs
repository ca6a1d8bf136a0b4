use crate::config::LightqlConfig;
use crate::dialect::Dialect;
use crate::error::{LightqlError, Result};
use crate::explores::Explore;
use crate::limits::RowLimitPolicy;
use crate::metric_query::{MetricQuery, QueryRequest};
use crate::registry::ExploreRegistry;

pub mod compile;
pub mod fields;
pub mod filters;
pub mod joins;
pub mod render;
pub(crate) mod templates;

pub use compile::{
    compile_metric_query, CompiledMetricQuery, CompiledSort, CompiledTableCalculation, FieldRef,
    JoinClause,
};
pub use fields::{build_field_map, CompiledField, FieldKind, FieldMap, FieldSource};
pub use filters::compile_filter_group;
pub use joins::{resolve_required_tables, CompiledJoin, JoinGraph, ResolvedJoins};
pub use render::{render, CompiledSql, METRICS_CTE};

/// Compiles metric queries under one row limit policy.
#[derive(Debug, Clone, Default)]
pub struct SqlBuilder {
    limits: RowLimitPolicy,
}

impl SqlBuilder {
    pub fn new(limits: RowLimitPolicy) -> Self {
        Self { limits }
    }

    pub fn from_config(config: &LightqlConfig) -> Self {
        Self::new(config.row_limit_policy())
    }

    pub fn limits(&self) -> &RowLimitPolicy {
        &self.limits
    }

    /// Compile without rendering.
    pub fn compile(
        &self,
        explore: &Explore,
        query: &MetricQuery,
        dialect: &dyn Dialect,
    ) -> Result<CompiledMetricQuery> {
        compile_metric_query(explore, query, dialect, &self.limits)
    }

    /// Build SQL using a provided dialect.
    pub fn build_with_dialect(
        &self,
        explore: &Explore,
        query: &MetricQuery,
        dialect: &dyn Dialect,
    ) -> Result<CompiledSql> {
        let compiled = self.compile(explore, query, dialect)?;
        Ok(render(&compiled, dialect))
    }

    /// Resolve the request's explore from the registry, then build SQL.
    pub fn build_for_request(
        &self,
        registry: &ExploreRegistry,
        request: &QueryRequest,
        dialect: &dyn Dialect,
    ) -> Result<CompiledSql> {
        let explore = registry.get_explore(&request.explore).ok_or_else(|| {
            LightqlError::Validation(format!("unknown explore {}", request.explore))
        })?;
        self.build_with_dialect(explore, &request.metric_query, dialect)
    }
}
