use std::collections::{BTreeSet, HashSet};

use crate::config::LightqlConfig;
use crate::dialect::WarehouseType;
use crate::error::{LightqlError, Result};
use crate::explores::{Explore, MetricType};
use crate::query_builder::fields::build_field_map;
use crate::query_builder::joins::JoinGraph;
use crate::query_builder::templates::placeholders;
use crate::registry::ExploreRegistry;

/// Checks explore definitions before they are served.
pub struct Validator {
    warehouse: WarehouseType,
    warn_only: bool,
}

impl Validator {
    pub fn new(warehouse: WarehouseType, warn_only: bool) -> Self {
        Self {
            warehouse,
            warn_only,
        }
    }

    pub fn from_config(config: &LightqlConfig) -> Self {
        Self::new(config.warehouse.dialect, config.validation.warn_only)
    }

    pub fn validate_registry(&self, registry: &ExploreRegistry) -> Result<()> {
        for name in registry.explore_names() {
            if let Some(explore) = registry.get_explore(name) {
                self.validate_explore(explore)?;
            }
        }
        Ok(())
    }

    pub fn validate_explore(&self, explore: &Explore) -> Result<()> {
        self.check(
            explore.tables.contains_key(&explore.base_table),
            format!(
                "explore {} base table {} not found",
                explore.name, explore.base_table
            ),
        )?;

        let mut joined = HashSet::new();
        joined.insert(explore.base_table.as_str());
        for join in &explore.joins {
            self.check(
                join.table != explore.base_table,
                format!("explore {} joins its base table {}", explore.name, join.table),
            )?;
            self.check(
                explore.tables.contains_key(&join.table),
                format!("explore {} joins missing table {}", explore.name, join.table),
            )?;
            self.check(
                joined.insert(join.table.as_str()),
                format!("explore {} joins table {} twice", explore.name, join.table),
            )?;
        }
        for table in explore.tables.keys() {
            self.check(
                joined.contains(table.as_str()),
                format!(
                    "table {table} in explore {} is neither the base table nor joined",
                    explore.name
                ),
            )?;
        }

        for join in &explore.joins {
            for p in placeholders(&join.sql_on) {
                if p.is_table_keyword() {
                    continue;
                }
                let table = p.qualifier.unwrap_or(p.name);
                self.check(
                    joined.contains(table),
                    format!(
                        "join {} in explore {} references unknown table {table}",
                        join.table, explore.name
                    ),
                )?;
            }
        }

        for (table_name, table) in &explore.tables {
            for (name, metric) in &table.metrics {
                let percentile_ok = match metric.metric_type {
                    MetricType::Percentile => matches!(metric.percentile, Some(p) if p <= 100),
                    _ => metric.percentile.is_none(),
                };
                self.check(
                    percentile_ok,
                    format!(
                        "metric {table_name}.{name} needs a percentile between 0 and 100 only when its type is percentile"
                    ),
                )?;
            }
        }

        // Template and join graph errors surface through a trial compilation.
        let dialect = self.warehouse.dialect();
        let fields = match build_field_map(explore, &[], dialect.as_ref()) {
            Ok(fields) => fields,
            Err(e) => {
                self.check(false, format!("explore {}: {e}", explore.name))?;
                return Ok(());
            }
        };
        let all_tables: BTreeSet<String> = explore.tables.keys().cloned().collect();
        let reachable = JoinGraph::build(explore, &fields, dialect.as_ref())
            .and_then(|graph| graph.resolve(&all_tables));
        if let Err(e) = reachable {
            self.check(false, format!("explore {}: {e}", explore.name))?;
        }

        Ok(())
    }

    fn check(&self, condition: bool, message: String) -> Result<()> {
        if condition {
            return Ok(());
        }
        if self.warn_only {
            tracing::warn!(%message, "explore validation failed");
            Ok(())
        } else {
            Err(LightqlError::Validation(message))
        }
    }
}
