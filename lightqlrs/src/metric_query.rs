//! The declarative query shape sent by clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::explores::MetricType;

/// A metric query against a named explore.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryRequest {
    pub explore: String,
    pub metric_query: MetricQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MetricQuery {
    /// Dimension field ids, in SELECT order.
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Metric field ids, in SELECT order.
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub sorts: Vec<SortField>,
    /// Maximum rows. `None` lets the row limit policy derive one.
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub table_calculations: Vec<TableCalculation>,
    #[serde(default)]
    pub additional_metrics: Vec<AdditionalMetric>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Filters {
    /// Compiles to WHERE, before aggregation.
    #[serde(default)]
    pub dimensions: Option<FilterGroup>,
    /// Compiles to HAVING, after aggregation.
    #[serde(default)]
    pub metrics: Option<FilterGroup>,
    /// Applied to the wrapped query once table calculations exist.
    #[serde(default)]
    pub table_calculations: Option<FilterGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SortField {
    pub field_id: String,
    #[serde(default)]
    pub descending: bool,
}

impl SortField {
    pub fn asc(field_id: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            descending: false,
        }
    }

    pub fn desc(field_id: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            descending: true,
        }
    }
}

/// A post-aggregation expression over selected fields, written with
/// `${field_id}` placeholders, e.g. `${orders_total} / SUM(${orders_total}) OVER ()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TableCalculation {
    pub name: String,
    pub display_name: Option<String>,
    pub sql: String,
}

impl TableCalculation {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            sql: sql.into(),
        }
    }
}

/// A metric declared inline with the query rather than in the explore.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AdditionalMetric {
    pub table: String,
    pub name: String,
    pub sql: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub percentile: Option<u8>,
    /// Replace an explore metric that produces the same field id instead of
    /// failing on the collision.
    #[serde(default)]
    pub override_existing: bool,
    pub description: Option<String>,
}

impl AdditionalMetric {
    pub fn new(
        table: impl Into<String>,
        name: impl Into<String>,
        metric_type: MetricType,
        sql: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            sql: sql.into(),
            metric_type,
            percentile: None,
            override_existing: false,
            description: None,
        }
    }
}

/// A boolean group of filter rules and nested groups.
///
/// Serialized as `{"and": [...]}` or `{"or": [...]}`; an optional `id` key
/// is accepted and ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawFilterGroup", into = "RawFilterGroup")]
pub enum FilterGroup {
    And(Vec<FilterGroupItem>),
    Or(Vec<FilterGroupItem>),
}

impl FilterGroup {
    pub fn items(&self) -> &[FilterGroupItem] {
        match self {
            FilterGroup::And(items) | FilterGroup::Or(items) => items,
        }
    }

    /// Every rule in the tree, depth first.
    pub fn rules(&self) -> Vec<&FilterRule> {
        let mut out = Vec::new();
        self.collect_rules(&mut out);
        out
    }

    fn collect_rules<'a>(&'a self, out: &mut Vec<&'a FilterRule>) {
        for item in self.items() {
            match item {
                FilterGroupItem::Group(group) => group.collect_rules(out),
                FilterGroupItem::Rule(rule) => out.push(rule),
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFilterGroup {
    #[serde(default, skip_serializing)]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    and: Option<Vec<FilterGroupItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    or: Option<Vec<FilterGroupItem>>,
}

impl TryFrom<RawFilterGroup> for FilterGroup {
    type Error = String;

    fn try_from(raw: RawFilterGroup) -> Result<Self, Self::Error> {
        match (raw.and, raw.or) {
            (Some(items), None) => Ok(FilterGroup::And(items)),
            (None, Some(items)) => Ok(FilterGroup::Or(items)),
            (Some(_), Some(_)) => Err("filter group cannot declare both 'and' and 'or'".into()),
            (None, None) => Err("filter group must declare 'and' or 'or'".into()),
        }
    }
}

impl From<FilterGroup> for RawFilterGroup {
    fn from(group: FilterGroup) -> Self {
        match group {
            FilterGroup::And(items) => RawFilterGroup {
                id: None,
                and: Some(items),
                or: None,
            },
            FilterGroup::Or(items) => RawFilterGroup {
                id: None,
                and: None,
                or: Some(items),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FilterGroupItem {
    Group(FilterGroup),
    Rule(FilterRule),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FilterRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub target: FilterTarget,
    pub operator: FilterOperator,
    #[serde(default)]
    pub values: Vec<Value>,
    /// Disabled rules are kept in the tree but never compiled.
    #[serde(default)]
    pub disabled: bool,
}

impl FilterRule {
    pub fn new(field_id: impl Into<String>, operator: FilterOperator, values: Vec<Value>) -> Self {
        Self {
            id: None,
            target: FilterTarget {
                field_id: field_id.into(),
            },
            operator,
            values,
            disabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FilterTarget {
    pub field_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    /// Case-insensitive substring match.
    Include,
    NotInclude,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    InBetween,
    NotInBetween,
    IsNull,
    NotNull,
    In,
}
