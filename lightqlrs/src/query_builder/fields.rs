//! Field registry: every dimension, metric and ad-hoc metric of an explore,
//! keyed by field id, with SQL templates compiled for one dialect.

use std::collections::{BTreeMap, BTreeSet};

use crate::dialect::Dialect;
use crate::error::{LightqlError, Result};
use crate::explores::{field_id, Dimension, Explore, FieldType, MetricType};
use crate::metric_query::AdditionalMetric;

use super::templates::{parenthesize, substitute, Placeholder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Dimension,
    Metric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    Explore,
    AdditionalMetric,
}

/// A field with its SQL fully substituted. For metrics `sql` is the
/// aggregated expression.
#[derive(Debug, Clone)]
pub struct CompiledField {
    pub id: String,
    pub table: String,
    pub name: String,
    pub kind: FieldKind,
    pub field_type: FieldType,
    pub metric_type: Option<MetricType>,
    pub sql: String,
    /// Tables the expression reads from, the owning table included.
    pub tables_references: BTreeSet<String>,
    pub hidden: bool,
    pub auto_generated: bool,
    pub source: FieldSource,
}

impl CompiledField {
    pub fn is_metric(&self) -> bool {
        self.kind == FieldKind::Metric
    }

    pub fn is_dimension(&self) -> bool {
        self.kind == FieldKind::Dimension
    }
}

/// Immutable field namespace built once per compilation.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    fields: BTreeMap<String, CompiledField>,
}

impl FieldMap {
    pub fn get(&self, id: &str) -> Option<&CompiledField> {
        self.fields.get(id)
    }

    /// Resolve a field id to its compiled field or fail naming the id.
    pub fn resolve(&self, id: &str) -> Result<&CompiledField> {
        self.fields
            .get(id)
            .ok_or_else(|| LightqlError::FieldReference(format!("unknown field id {id}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledField> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Merge the explore's fields with the ad-hoc metrics and compile every
/// template.
pub fn build_field_map(
    explore: &Explore,
    additional_metrics: &[AdditionalMetric],
    dialect: &dyn Dialect,
) -> Result<FieldMap> {
    let defs = collect_definitions(explore, additional_metrics)?;
    let ids: Vec<String> = defs.keys().cloned().collect();
    let mut compiler = FieldCompiler {
        explore,
        dialect,
        defs,
        compiled: BTreeMap::new(),
        in_progress: Vec::new(),
    };
    for id in &ids {
        compiler.compile(id)?;
    }
    tracing::debug!(
        explore = %explore.name,
        fields = compiler.compiled.len(),
        additional_metrics = additional_metrics.len(),
        "built field map"
    );
    Ok(FieldMap {
        fields: compiler.compiled,
    })
}

#[derive(Debug, Clone, Copy)]
enum Definition<'a> {
    Dimension(&'a Dimension),
    Metric {
        metric_type: MetricType,
        sql: &'a str,
        percentile: Option<u8>,
        hidden: bool,
        auto_generated: bool,
        source: FieldSource,
    },
}

#[derive(Debug, Clone, Copy)]
struct FieldDef<'a> {
    table: &'a str,
    name: &'a str,
    def: Definition<'a>,
}

impl FieldDef<'_> {
    fn kind(&self) -> FieldKind {
        match self.def {
            Definition::Dimension(_) => FieldKind::Dimension,
            Definition::Metric { .. } => FieldKind::Metric,
        }
    }

    fn source(&self) -> FieldSource {
        match self.def {
            Definition::Dimension(_) => FieldSource::Explore,
            Definition::Metric { source, .. } => source,
        }
    }
}

fn collect_definitions<'a>(
    explore: &'a Explore,
    additional_metrics: &'a [AdditionalMetric],
) -> Result<BTreeMap<String, FieldDef<'a>>> {
    let mut defs: BTreeMap<String, FieldDef<'a>> = BTreeMap::new();

    for (table_name, table) in &explore.tables {
        for (name, dim) in &table.dimensions {
            insert_unique(
                &mut defs,
                FieldDef {
                    table: table_name,
                    name,
                    def: Definition::Dimension(dim),
                },
            )?;
        }
        for (name, metric) in &table.metrics {
            insert_unique(
                &mut defs,
                FieldDef {
                    table: table_name,
                    name,
                    def: Definition::Metric {
                        metric_type: metric.metric_type,
                        sql: &metric.sql,
                        percentile: metric.percentile,
                        hidden: metric.hidden,
                        auto_generated: metric.auto_generated,
                        source: FieldSource::Explore,
                    },
                },
            )?;
        }
    }

    for metric in additional_metrics {
        if !explore.tables.contains_key(&metric.table) {
            return Err(LightqlError::FieldReference(format!(
                "additional metric {} references table {} which is not part of explore {}",
                metric.name, metric.table, explore.name
            )));
        }
        let def = FieldDef {
            table: &metric.table,
            name: &metric.name,
            def: Definition::Metric {
                metric_type: metric.metric_type,
                sql: &metric.sql,
                percentile: metric.percentile,
                hidden: false,
                auto_generated: false,
                source: FieldSource::AdditionalMetric,
            },
        };
        let id = field_id(&metric.table, &metric.name);
        let replaceable = defs
            .get(&id)
            .map(|existing| {
                existing.kind() == FieldKind::Metric && existing.source() == FieldSource::Explore
            })
            .unwrap_or(false);
        if metric.override_existing && replaceable {
            tracing::debug!(field = %id, "additional metric overrides explore metric");
            defs.insert(id, def);
        } else {
            insert_unique(&mut defs, def)?;
        }
    }

    Ok(defs)
}

fn insert_unique<'a>(defs: &mut BTreeMap<String, FieldDef<'a>>, def: FieldDef<'a>) -> Result<()> {
    let id = field_id(def.table, def.name);
    if let Some(existing) = defs.get(&id) {
        return Err(LightqlError::FieldReference(format!(
            "field id {id} is declared twice ({}.{} and {}.{})",
            existing.table, existing.name, def.table, def.name
        )));
    }
    defs.insert(id, def);
    Ok(())
}

/// Which fields a bare `${name}` may refer to inside a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Dimensions and aggregated metrics read dimensions only.
    Dimensions,
    /// Custom metrics combine other metrics first, dimensions second.
    MetricsThenDimensions,
}

struct FieldCompiler<'a> {
    explore: &'a Explore,
    dialect: &'a dyn Dialect,
    defs: BTreeMap<String, FieldDef<'a>>,
    compiled: BTreeMap<String, CompiledField>,
    in_progress: Vec<String>,
}

impl<'a> FieldCompiler<'a> {
    fn compile(&mut self, id: &str) -> Result<(String, BTreeSet<String>)> {
        if let Some(done) = self.compiled.get(id) {
            return Ok((done.sql.clone(), done.tables_references.clone()));
        }
        if self.in_progress.iter().any(|f| f == id) {
            let mut chain = self.in_progress.clone();
            chain.push(id.to_string());
            return Err(LightqlError::FieldReference(format!(
                "circular field reference: {}",
                chain.join(" -> ")
            )));
        }
        let def = *self
            .defs
            .get(id)
            .ok_or_else(|| LightqlError::FieldReference(format!("unknown field id {id}")))?;

        self.in_progress.push(id.to_string());
        let (template, scope) = match def.def {
            Definition::Dimension(dim) => (dim.sql.as_str(), Scope::Dimensions),
            Definition::Metric {
                metric_type: MetricType::Custom,
                sql,
                ..
            } => (sql, Scope::MetricsThenDimensions),
            Definition::Metric { sql, .. } => (sql, Scope::Dimensions),
        };
        let mut tables = BTreeSet::from([def.table.to_string()]);
        let substituted = substitute(template, |p| {
            self.resolve_placeholder(id, def.table, scope, p, &mut tables)
        });
        self.in_progress.pop();
        let substituted = substituted?;

        let field = match def.def {
            Definition::Dimension(dim) => {
                let sql = match dim.time_interval {
                    Some(interval) => {
                        if !dim.field_type.is_temporal() {
                            return Err(LightqlError::Validation(format!(
                                "dimension {id} has a time interval but is not a date or timestamp"
                            )));
                        }
                        self.dialect
                            .render_time_interval(interval, dim.field_type, &substituted)
                    }
                    None => substituted,
                };
                CompiledField {
                    id: id.to_string(),
                    table: def.table.to_string(),
                    name: def.name.to_string(),
                    kind: FieldKind::Dimension,
                    field_type: dim.field_type,
                    metric_type: None,
                    sql,
                    tables_references: tables,
                    hidden: dim.hidden,
                    auto_generated: dim.auto_generated,
                    source: FieldSource::Explore,
                }
            }
            Definition::Metric {
                metric_type,
                percentile,
                hidden,
                auto_generated,
                source,
                ..
            } => CompiledField {
                id: id.to_string(),
                table: def.table.to_string(),
                name: def.name.to_string(),
                kind: FieldKind::Metric,
                field_type: FieldType::Number,
                metric_type: Some(metric_type),
                sql: self
                    .dialect
                    .render_aggregation(metric_type, &substituted, percentile),
                tables_references: tables,
                hidden,
                auto_generated,
                source,
            },
        };

        tracing::trace!(field = %id, sql = %field.sql, "compiled field");
        let result = (field.sql.clone(), field.tables_references.clone());
        self.compiled.insert(id.to_string(), field);
        Ok(result)
    }

    fn resolve_placeholder(
        &mut self,
        owner_id: &str,
        owner_table: &'a str,
        scope: Scope,
        placeholder: Placeholder<'_>,
        tables: &mut BTreeSet<String>,
    ) -> Result<String> {
        if placeholder.is_table_keyword() {
            return Ok(self.dialect.quote_ident(owner_table));
        }
        let table = placeholder.qualifier.unwrap_or(owner_table);
        let kinds: &[FieldKind] = match scope {
            Scope::Dimensions => &[FieldKind::Dimension],
            Scope::MetricsThenDimensions => &[FieldKind::Metric, FieldKind::Dimension],
        };
        for kind in kinds {
            if let Some(id) = self.lookup(table, placeholder.name, *kind) {
                let (sql, refs) = self.compile(&id)?;
                tables.extend(refs);
                return Ok(parenthesize(&sql));
            }
        }
        if placeholder.qualifier.is_none() && self.explore.tables.contains_key(placeholder.name) {
            tables.insert(placeholder.name.to_string());
            return Ok(self.dialect.quote_ident(placeholder.name));
        }
        Err(LightqlError::FieldReference(format!(
            "unknown reference {placeholder} in field {owner_id}"
        )))
    }

    fn lookup(&self, table: &str, name: &str, kind: FieldKind) -> Option<String> {
        let id = field_id(table, name);
        let def = self.defs.get(&id)?;
        (def.kind() == kind && def.table == table && def.name == name).then_some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PostgresDialect;
    use crate::explores::{Metric, Table};

    fn explore() -> Explore {
        let mut orders = Table {
            database: None,
            schema: None,
            relation: None,
            sql: None,
            dimensions: BTreeMap::new(),
            metrics: BTreeMap::new(),
            description: None,
        };
        orders.dimensions.insert(
            "amount".to_string(),
            Dimension::new(FieldType::Number, "${TABLE}.amount"),
        );
        orders.dimensions.insert(
            "net".to_string(),
            Dimension::new(FieldType::Number, "${amount} - ${TABLE}.tax"),
        );
        orders
            .metrics
            .insert("total".to_string(), Metric::new(MetricType::Sum, "${net}"));
        orders.metrics.insert(
            "doubled".to_string(),
            Metric::new(MetricType::Custom, "${total} * 2"),
        );
        Explore {
            name: "orders".to_string(),
            base_table: "orders".to_string(),
            tables: BTreeMap::from([("orders".to_string(), orders)]),
            joins: Vec::new(),
            description: None,
        }
    }

    #[test]
    fn compiles_nested_dimension_references() {
        let map = build_field_map(&explore(), &[], &PostgresDialect).unwrap();
        let net = map.resolve("orders_net").unwrap();
        assert_eq!(net.sql, "\"orders\".amount - \"orders\".tax");
        let total = map.resolve("orders_total").unwrap();
        assert_eq!(total.sql, "SUM((\"orders\".amount - \"orders\".tax))");
        let doubled = map.resolve("orders_doubled").unwrap();
        assert_eq!(doubled.sql, "SUM((\"orders\".amount - \"orders\".tax)) * 2");
    }

    #[test]
    fn keeps_precedence_of_unspaced_expressions() {
        let mut explore = explore();
        let orders = explore.tables.get_mut("orders").unwrap();
        orders.dimensions.insert(
            "gross".to_string(),
            Dimension::new(FieldType::Number, "${TABLE}.a-${TABLE}.b"),
        );
        orders.dimensions.insert(
            "twice".to_string(),
            Dimension::new(FieldType::Number, "${gross} * 2"),
        );
        let map = build_field_map(&explore, &[], &PostgresDialect).unwrap();
        let twice = map.resolve("orders_twice").unwrap();
        assert_eq!(twice.sql, "(\"orders\".a-\"orders\".b) * 2");
    }

    #[test]
    fn detects_circular_references() {
        let mut explore = explore();
        let orders = explore.tables.get_mut("orders").unwrap();
        orders.dimensions.insert(
            "a".to_string(),
            Dimension::new(FieldType::Number, "${b} + 1"),
        );
        orders.dimensions.insert(
            "b".to_string(),
            Dimension::new(FieldType::Number, "${a} + 1"),
        );
        let err = build_field_map(&explore, &[], &PostgresDialect).unwrap_err();
        assert!(
            matches!(&err, LightqlError::FieldReference(msg) if msg.contains("circular")),
            "unexpected error {err:?}"
        );
    }

    #[test]
    fn additional_metric_collision_requires_override() {
        let explore = explore();
        let mut adhoc =
            AdditionalMetric::new("orders", "total", MetricType::Max, "${TABLE}.amount");
        let err = build_field_map(&explore, std::slice::from_ref(&adhoc), &PostgresDialect)
            .unwrap_err();
        assert!(matches!(err, LightqlError::FieldReference(_)));

        adhoc.override_existing = true;
        let map = build_field_map(&explore, &[adhoc], &PostgresDialect).unwrap();
        let total = map.resolve("orders_total").unwrap();
        assert_eq!(total.sql, "MAX(\"orders\".amount)");
        assert_eq!(total.source, FieldSource::AdditionalMetric);
    }
}
