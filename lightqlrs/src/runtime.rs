use crate::error::Result;
use crate::executor::{QueryResult, WarehouseClient};
use crate::metric_query::QueryRequest;
use crate::query_builder::SqlBuilder;
use crate::registry::ExploreRegistry;

/// Compile a request for the client's dialect and execute it.
pub async fn run_query(
    builder: &SqlBuilder,
    registry: &ExploreRegistry,
    client: &dyn WarehouseClient,
    request: &QueryRequest,
) -> Result<QueryResult> {
    let compiled = builder.build_for_request(registry, request, client.dialect())?;
    tracing::debug!(
        explore = %request.explore,
        cache_key = %compiled.cache_key(),
        "executing compiled query"
    );
    let result = client.run_sql(&compiled.query).await?;
    tracing::debug!(explore = %request.explore, rows = result.row_count(), "query finished");
    Ok(result)
}
