use std::collections::BTreeMap;

use serde::{de, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the metric added to explores that declare no metrics at all.
pub const EXAMPLE_METRIC_NAME: &str = "count";

/// Build the stable identifier of a field: `<table>_<name>`.
///
/// Dots are not valid in identifiers handed to the warehouse, so nested names
/// such as `address.city` become `address__city`.
pub fn field_id(table: &str, name: &str) -> String {
    format!("{table}_{name}").replace('.', "__")
}

/// A virtual table: one base table plus the tables joined onto it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Explore {
    pub name: String,
    pub base_table: String,
    pub tables: BTreeMap<String, Table>,
    /// Joined tables in declaration order. Order matters for join tie-breaks.
    #[serde(default)]
    pub joins: Vec<ExploreJoin>,
    pub description: Option<String>,
}

impl Explore {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn join_for(&self, table: &str) -> Option<&ExploreJoin> {
        self.joins.iter().find(|j| j.table == table)
    }

    /// True if any table of the explore declares at least one metric.
    pub fn has_metrics(&self) -> bool {
        self.tables.values().any(|t| !t.metrics.is_empty())
    }

    /// Add a synthetic row-count metric to the base table when no table
    /// declares a metric, so the explore can still be aggregated.
    pub fn with_example_metric(mut self) -> Self {
        if self.has_metrics() {
            return self;
        }
        if let Some(base) = self.tables.get_mut(&self.base_table) {
            base.metrics.insert(
                EXAMPLE_METRIC_NAME.to_string(),
                Metric {
                    metric_type: MetricType::Count,
                    sql: "*".to_string(),
                    percentile: None,
                    hidden: false,
                    auto_generated: true,
                    description: Some("Row count".to_string()),
                },
            );
        }
        self
    }

    /// Expand every `time_intervals` list into one derived dimension per
    /// interval (`<name>_<interval>`). Existing dimensions are never replaced.
    pub fn with_time_interval_dimensions(mut self) -> Self {
        for table in self.tables.values_mut() {
            table.expand_time_intervals();
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Table {
    pub database: Option<String>,
    pub schema: Option<String>,
    /// Physical relation name. Defaults to the table's key in the explore.
    pub relation: Option<String>,
    /// Derived-table SQL, used in place of the physical relation when set.
    pub sql: Option<String>,
    #[serde(default)]
    pub dimensions: BTreeMap<String, Dimension>,
    #[serde(default)]
    pub metrics: BTreeMap<String, Metric>,
    pub description: Option<String>,
}

impl Table {
    fn expand_time_intervals(&mut self) {
        let mut derived = Vec::new();
        for (name, dim) in self.dimensions.iter_mut() {
            if dim.time_intervals.is_empty() {
                continue;
            }
            for interval in std::mem::take(&mut dim.time_intervals) {
                derived.push((
                    format!("{name}_{}", interval.as_str()),
                    Dimension {
                        field_type: dim.field_type,
                        sql: dim.sql.clone(),
                        time_interval: Some(interval),
                        time_intervals: Vec::new(),
                        hidden: dim.hidden,
                        auto_generated: true,
                        description: dim.description.clone(),
                    },
                ));
            }
        }
        for (name, dim) in derived {
            self.dimensions.entry(name).or_insert(dim);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Dimension {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// SQL template. `${TABLE}` is the owning table, `${name}` a sibling
    /// dimension and `${table.name}` a dimension of another table.
    pub sql: String,
    pub time_interval: Option<TimeInterval>,
    pub time_intervals: Vec<TimeInterval>,
    pub hidden: bool,
    pub auto_generated: bool,
    pub description: Option<String>,
}

impl Dimension {
    pub fn new(field_type: FieldType, sql: impl Into<String>) -> Self {
        Self {
            field_type,
            sql: sql.into(),
            time_interval: None,
            time_intervals: Vec::new(),
            hidden: false,
            auto_generated: false,
            description: None,
        }
    }
}

impl<'de> Deserialize<'de> for Dimension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) => Ok(Dimension::new(FieldType::String, s)),
            other => {
                #[derive(Deserialize)]
                #[serde(deny_unknown_fields)]
                struct Full {
                    #[serde(rename = "type", default)]
                    field_type: FieldType,
                    sql: String,
                    time_interval: Option<TimeInterval>,
                    #[serde(default)]
                    time_intervals: Vec<TimeInterval>,
                    #[serde(default)]
                    hidden: bool,
                    #[serde(default)]
                    auto_generated: bool,
                    description: Option<String>,
                }
                let full = Full::deserialize(other).map_err(de::Error::custom)?;
                if !full.time_intervals.is_empty() && !full.field_type.is_temporal() {
                    return Err(de::Error::custom(
                        "time_intervals are only allowed on date or timestamp dimensions",
                    ));
                }
                Ok(Dimension {
                    field_type: full.field_type,
                    sql: full.sql,
                    time_interval: full.time_interval,
                    time_intervals: full.time_intervals,
                    hidden: full.hidden,
                    auto_generated: full.auto_generated,
                    description: full.description,
                })
            }
        }
    }
}

/// An aggregated field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metric {
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    /// SQL template aggregated according to `metric_type`. Custom metrics are
    /// used verbatim and may reference other metrics with `${metric}`.
    pub sql: String,
    /// Percentile in the range 0..=100, only read for `percentile` metrics.
    pub percentile: Option<u8>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub auto_generated: bool,
    pub description: Option<String>,
}

impl Metric {
    pub fn new(metric_type: MetricType, sql: impl Into<String>) -> Self {
        Self {
            metric_type,
            sql: sql.into(),
            percentile: None,
            hidden: false,
            auto_generated: false,
            description: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    String,
    Number,
    Date,
    Timestamp,
    Boolean,
}

impl FieldType {
    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldType::Date | FieldType::Timestamp)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Sum,
    Count,
    CountDistinct,
    Average,
    Min,
    Max,
    Median,
    Percentile,
    Custom,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeInterval {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInterval::Day => "day",
            TimeInterval::Week => "week",
            TimeInterval::Month => "month",
            TimeInterval::Quarter => "quarter",
            TimeInterval::Year => "year",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExploreJoin {
    pub table: String,
    /// ON condition template, e.g. `${orders.customer_id} = ${customers.id}`.
    pub sql_on: String,
    #[serde(default)]
    pub join_type: JoinType,
    pub description: Option<String>,
}

impl ExploreJoin {
    pub fn new(table: impl Into<String>, sql_on: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            sql_on: sql_on.into(),
            join_type: JoinType::Left,
            description: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    #[default]
    Left,
    Right,
    Full,
}
