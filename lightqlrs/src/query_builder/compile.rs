//! Metric query compilation.
//!
//! Turns an explore plus a [`MetricQuery`] into a [`CompiledMetricQuery`]:
//! 1. Builds the field registry, ad-hoc metrics included
//! 2. Resolves every referenced field id
//! 3. Checks filter placement and compiles the WHERE and HAVING trees
//! 4. Collects the tables read by selected fields and emitted filters, and
//!    resolves the joins
//! 5. Compiles table calculations, sorts, their filter tree and the row limit

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::dialect::Dialect;
use crate::error::{LightqlError, Result};
use crate::explores::{Explore, FieldType, JoinType};
use crate::limits::RowLimitPolicy;
use crate::metric_query::{FilterGroup, MetricQuery, TableCalculation};
use crate::sql_ast::{Relation, TableRef};

use super::fields::{build_field_map, CompiledField, FieldKind, FieldMap, FieldSource};
use super::filters::{compile_filter_fields, compile_filter_group_with, FilterTarget};
use super::joins::resolve_required_tables;
use super::templates::{parenthesize, placeholders, substitute};

/// A selected field after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub id: String,
    pub sql: String,
    pub field_type: FieldType,
    pub kind: FieldKind,
}

impl From<&CompiledField> for FieldRef {
    fn from(field: &CompiledField) -> Self {
        Self {
            id: field.id.clone(),
            sql: field.sql.clone(),
            field_type: field.field_type,
            kind: field.kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTableCalculation {
    pub name: String,
    pub display_name: Option<String>,
    /// Expression over the aggregating SELECT's own field expressions.
    pub inline_sql: String,
    /// Expression over the columns of the wrapping `metrics` CTE.
    pub cte_sql: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub table: TableRef,
    pub join_type: JoinType,
    pub sql_on: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSort {
    /// SELECT-list alias: a field id or a table calculation name.
    pub alias: String,
    pub descending: bool,
}

/// Dialect-agnostic shape of one query, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMetricQuery {
    pub explore_name: String,
    pub base_table: String,
    pub from: TableRef,
    pub dimensions: Vec<FieldRef>,
    pub metrics: Vec<FieldRef>,
    pub table_calculations: Vec<CompiledTableCalculation>,
    /// Required tables in emission order, base table first.
    pub tables: Vec<String>,
    pub joins: Vec<JoinClause>,
    pub where_sql: Option<String>,
    pub having_sql: Option<String>,
    pub table_calculation_filter_sql: Option<String>,
    pub sorts: Vec<CompiledSort>,
    pub limit: u64,
    pub additional_metrics: Vec<FieldRef>,
    pub has_example_metric: bool,
}

impl CompiledMetricQuery {
    pub fn column_count(&self) -> usize {
        self.dimensions.len() + self.metrics.len() + self.table_calculations.len()
    }
}

pub fn compile_metric_query(
    explore: &Explore,
    query: &MetricQuery,
    dialect: &dyn Dialect,
    limits: &RowLimitPolicy,
) -> Result<CompiledMetricQuery> {
    tracing::debug!(
        explore = %explore.name,
        dimensions = query.dimensions.len(),
        metrics = query.metrics.len(),
        table_calculations = query.table_calculations.len(),
        "compiling metric query"
    );
    let fields = build_field_map(explore, &query.additional_metrics, dialect)?;

    // Every referenced id must exist before anything else is checked.
    let dimensions = resolve_selection(&fields, &query.dimensions, FieldKind::Dimension)?;
    let metrics = resolve_selection(&fields, &query.metrics, FieldKind::Metric)?;
    let calculation_names: HashSet<&str> = query
        .table_calculations
        .iter()
        .map(|tc| tc.name.as_str())
        .collect();
    check_references(&fields, query, &calculation_names)?;

    let selected: BTreeMap<&str, &CompiledField> = dimensions
        .iter()
        .chain(metrics.iter())
        .copied()
        .map(|f| (f.id.as_str(), f))
        .collect();
    if selected.len() != dimensions.len() + metrics.len() {
        return Err(LightqlError::Compile(
            "a field id is selected more than once".to_string(),
        ));
    }

    let dimension_filters = query.filters.dimensions.as_ref();
    let metric_filters = query.filters.metrics.as_ref();
    for field in filter_targets(&fields, dimension_filters)? {
        if field.is_metric() {
            return Err(LightqlError::Compile(format!(
                "metric {} cannot be filtered before aggregation; move it to the metrics filters",
                field.id
            )));
        }
    }
    for field in filter_targets(&fields, metric_filters)? {
        if field.is_dimension() {
            return Err(LightqlError::Compile(format!(
                "dimension {} cannot be filtered after aggregation; move it to the dimensions filters",
                field.id
            )));
        }
    }

    let where_filter = match dimension_filters {
        Some(group) => compile_filter_fields(group, &fields, dialect)?,
        None => None,
    };
    let having_filter = match metric_filters {
        Some(group) => compile_filter_fields(group, &fields, dialect)?,
        None => None,
    };

    // Rules skipped for lack of values must not pull in joins.
    let mut referenced_tables = BTreeSet::new();
    for field in selected.values() {
        referenced_tables.extend(field.tables_references.iter().cloned());
    }
    let filtered_ids = where_filter
        .iter()
        .chain(having_filter.iter())
        .flat_map(|f| f.field_ids.iter());
    for id in filtered_ids {
        referenced_tables.extend(fields.resolve(id)?.tables_references.iter().cloned());
    }
    let resolved = resolve_required_tables(explore, &referenced_tables, &fields, dialect)?;
    let joins = resolved
        .joins
        .iter()
        .map(|join| {
            Ok(JoinClause {
                table: table_ref(explore, &join.table)?,
                join_type: join.join_type,
                sql_on: join.sql_on.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let table_calculations =
        compile_table_calculations(&fields, &selected, &query.table_calculations, dialect)?;

    let sorts = query
        .sorts
        .iter()
        .map(|sort| {
            let id = sort.field_id.as_str();
            if !selected.contains_key(id) && !calculation_names.contains(id) {
                return Err(LightqlError::Compile(format!(
                    "cannot sort by {id} because it is not selected"
                )));
            }
            Ok(CompiledSort {
                alias: id.to_string(),
                descending: sort.descending,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let table_calculation_filter_sql = match query.filters.table_calculations.as_ref() {
        Some(group) => compile_filter_group_with(group, dialect, |id| {
            if calculation_names.contains(id) {
                return Ok(FilterTarget {
                    sql: dialect.quote_ident(id),
                    field_type: None,
                });
            }
            match selected.get(id) {
                Some(field) => Ok(FilterTarget {
                    sql: dialect.quote_ident(id),
                    field_type: Some(field.field_type),
                }),
                None => {
                    fields.resolve(id)?;
                    Err(LightqlError::Compile(format!(
                        "table calculation filter on {id} needs the field to be selected"
                    )))
                }
            }
        })?
        .map(|f| f.sql),
        None => None,
    };

    if dimensions.is_empty() && metrics.is_empty() {
        return Err(LightqlError::Parameter(
            "query must select at least one dimension or metric".to_string(),
        ));
    }
    let column_count = dimensions.len() + metrics.len() + table_calculations.len();
    let limit = limits.resolve(query.limit, column_count)?;

    let has_example_metric = metrics.iter().any(|m| m.auto_generated);
    let additional_metrics = fields
        .iter()
        .filter(|f| f.source == FieldSource::AdditionalMetric)
        .map(FieldRef::from)
        .collect();

    let compiled = CompiledMetricQuery {
        explore_name: explore.name.clone(),
        base_table: explore.base_table.clone(),
        from: table_ref(explore, &explore.base_table)?,
        dimensions: dimensions.into_iter().map(FieldRef::from).collect(),
        metrics: metrics.into_iter().map(FieldRef::from).collect(),
        table_calculations,
        tables: resolved.tables,
        joins,
        where_sql: where_filter.map(|f| f.sql),
        having_sql: having_filter.map(|f| f.sql),
        table_calculation_filter_sql,
        sorts,
        limit,
        additional_metrics,
        has_example_metric,
    };
    tracing::debug!(
        explore = %compiled.explore_name,
        tables = ?compiled.tables,
        limit = compiled.limit,
        has_where = compiled.where_sql.is_some(),
        has_having = compiled.having_sql.is_some(),
        "compiled metric query"
    );
    Ok(compiled)
}

fn resolve_selection<'f>(
    fields: &'f FieldMap,
    ids: &[String],
    expected: FieldKind,
) -> Result<Vec<&'f CompiledField>> {
    ids.iter()
        .map(|id| {
            let field = fields.resolve(id)?;
            if field.kind != expected {
                return Err(LightqlError::FieldReference(format!(
                    "{id} is not a {}",
                    match expected {
                        FieldKind::Dimension => "dimension",
                        FieldKind::Metric => "metric",
                    }
                )));
            }
            Ok(field)
        })
        .collect()
}

/// Resolve the ids named by filters, sorts and table calculation
/// templates. Ids naming a table calculation are left alone where one is
/// allowed.
fn check_references(
    fields: &FieldMap,
    query: &MetricQuery,
    calculation_names: &HashSet<&str>,
) -> Result<()> {
    let field_trees = [query.filters.dimensions.as_ref(), query.filters.metrics.as_ref()];
    for rule in field_trees.into_iter().flatten().flat_map(|g| g.rules()) {
        if !rule.disabled {
            fields.resolve(&rule.target.field_id)?;
        }
    }
    for rule in query.filters.table_calculations.iter().flat_map(|g| g.rules()) {
        let id = rule.target.field_id.as_str();
        if !rule.disabled && !calculation_names.contains(id) {
            fields.resolve(id)?;
        }
    }
    for sort in &query.sorts {
        if !calculation_names.contains(sort.field_id.as_str()) {
            fields.resolve(&sort.field_id)?;
        }
    }
    for calc in &query.table_calculations {
        for p in placeholders(&calc.sql) {
            fields.resolve(&placeholder_id(p.qualifier, p.name))?;
        }
    }
    Ok(())
}

/// Fields targeted by enabled rules of a filter tree.
fn filter_targets<'f>(
    fields: &'f FieldMap,
    group: Option<&FilterGroup>,
) -> Result<Vec<&'f CompiledField>> {
    let Some(group) = group else {
        return Ok(Vec::new());
    };
    group
        .rules()
        .into_iter()
        .filter(|rule| !rule.disabled)
        .map(|rule| fields.resolve(&rule.target.field_id))
        .collect()
}

fn compile_table_calculations(
    fields: &FieldMap,
    selected: &BTreeMap<&str, &CompiledField>,
    calculations: &[TableCalculation],
    dialect: &dyn Dialect,
) -> Result<Vec<CompiledTableCalculation>> {
    let mut seen = HashSet::new();
    calculations
        .iter()
        .map(|calc| {
            if fields.get(&calc.name).is_some() {
                return Err(LightqlError::Compile(format!(
                    "table calculation {} has the same name as a field",
                    calc.name
                )));
            }
            if !seen.insert(calc.name.as_str()) {
                return Err(LightqlError::Compile(format!(
                    "table calculation {} is declared twice",
                    calc.name
                )));
            }
            let inline_sql = substitute(&calc.sql, |p| {
                let id = placeholder_id(p.qualifier, p.name);
                Ok(parenthesize(&selected_field(fields, selected, &calc.name, &id)?.sql))
            })?;
            let cte_sql = substitute(&calc.sql, |p| {
                let id = placeholder_id(p.qualifier, p.name);
                Ok(dialect.quote_ident(&selected_field(fields, selected, &calc.name, &id)?.id))
            })?;
            Ok(CompiledTableCalculation {
                name: calc.name.clone(),
                display_name: calc.display_name.clone(),
                inline_sql,
                cte_sql,
            })
        })
        .collect()
}

fn selected_field<'f>(
    fields: &FieldMap,
    selected: &BTreeMap<&str, &'f CompiledField>,
    calculation: &str,
    id: &str,
) -> Result<&'f CompiledField> {
    if let Some(field) = selected.get(id) {
        return Ok(*field);
    }
    fields.resolve(id)?;
    Err(LightqlError::Compile(format!(
        "table calculation {calculation} references {id} which is not selected"
    )))
}

/// Table calculations reference fields by id; a dotted reference is
/// read as `table.name` and mapped to the same id.
fn placeholder_id(qualifier: Option<&str>, name: &str) -> String {
    match qualifier {
        Some(table) => crate::explores::field_id(table, name),
        None => name.to_string(),
    }
}

fn table_ref(explore: &Explore, name: &str) -> Result<TableRef> {
    let table = explore.table(name).ok_or_else(|| {
        LightqlError::Join(format!(
            "table {name} is not part of explore {}",
            explore.name
        ))
    })?;
    let relation = match &table.sql {
        Some(sql) => Relation::Derived(sql.clone()),
        None => Relation::Named {
            database: table.database.clone(),
            schema: table.schema.clone(),
            name: table.relation.clone().unwrap_or_else(|| name.to_string()),
        },
    };
    Ok(TableRef {
        relation,
        alias: Some(name.to_string()),
    })
}
