//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;

use lightql::explores::{
    Dimension, Explore, ExploreJoin, FieldType, Metric, MetricType, Table, TimeInterval,
};
use lightql::metric_query::{FilterGroupItem, FilterOperator, FilterRule, MetricQuery};
use serde_json::Value;

pub fn table(
    dimensions: &[(&str, FieldType, &str)],
    metrics: &[(&str, MetricType, &str)],
) -> Table {
    Table {
        database: None,
        schema: None,
        relation: None,
        sql: None,
        dimensions: dimensions
            .iter()
            .map(|(name, ty, sql)| (name.to_string(), Dimension::new(*ty, *sql)))
            .collect(),
        metrics: metrics
            .iter()
            .map(|(name, ty, sql)| (name.to_string(), Metric::new(*ty, *sql)))
            .collect(),
        description: None,
    }
}

/// `orders -> customers -> regions`, where regions is reachable only
/// through customers.
pub fn orders_explore() -> Explore {
    let mut orders = table(
        &[
            ("order_id", FieldType::Number, "${TABLE}.id"),
            ("customer_id", FieldType::Number, "${TABLE}.customer_id"),
            ("status", FieldType::String, "${TABLE}.status"),
            ("created", FieldType::Timestamp, "${TABLE}.created_at"),
            ("amount", FieldType::Number, "${TABLE}.amount"),
        ],
        &[
            ("revenue", MetricType::Sum, "${amount}"),
            ("order_count", MetricType::CountDistinct, "${order_id}"),
        ],
    );
    if let Some(created) = orders.dimensions.get_mut("created") {
        created.time_intervals = vec![TimeInterval::Month, TimeInterval::Year];
    }
    let customers = table(
        &[
            ("customer_id", FieldType::Number, "${TABLE}.id"),
            ("region_id", FieldType::Number, "${TABLE}.region_id"),
            ("name", FieldType::String, "${TABLE}.name"),
        ],
        &[("customer_count", MetricType::CountDistinct, "${customer_id}")],
    );
    let regions = table(
        &[
            ("region_id", FieldType::Number, "${TABLE}.id"),
            ("country", FieldType::String, "${TABLE}.country"),
        ],
        &[],
    );
    Explore {
        name: "orders".to_string(),
        base_table: "orders".to_string(),
        tables: BTreeMap::from([
            ("orders".to_string(), orders),
            ("customers".to_string(), customers),
            ("regions".to_string(), regions),
        ]),
        joins: vec![
            ExploreJoin::new(
                "customers",
                "${orders.customer_id} = ${customers.customer_id}",
            ),
            ExploreJoin::new("regions", "${customers.region_id} = ${regions.region_id}"),
        ],
        description: None,
    }
    .with_time_interval_dimensions()
}

/// An explore with no metrics, so the example count metric is added.
pub fn events_explore() -> Explore {
    Explore {
        name: "events".to_string(),
        base_table: "events".to_string(),
        tables: BTreeMap::from([(
            "events".to_string(),
            table(&[("kind", FieldType::String, "${TABLE}.kind")], &[]),
        )]),
        joins: Vec::new(),
        description: None,
    }
    .with_example_metric()
}

/// `a` joins `left` and `right`; `target` is joinable through either and
/// declares `left` first.
pub fn diamond_explore(target_on: &str) -> Explore {
    let keyed = |extra: &[(&'static str, FieldType, &'static str)]| {
        let mut dims = vec![("id", FieldType::Number, "${TABLE}.id")];
        dims.extend_from_slice(extra);
        table(&dims, &[])
    };
    Explore {
        name: "a".to_string(),
        base_table: "a".to_string(),
        tables: BTreeMap::from([
            ("a".to_string(), keyed(&[])),
            (
                "left".to_string(),
                keyed(&[("a_id", FieldType::Number, "${TABLE}.a_id")]),
            ),
            (
                "right".to_string(),
                keyed(&[("a_id", FieldType::Number, "${TABLE}.a_id")]),
            ),
            (
                "target".to_string(),
                keyed(&[("value", FieldType::Number, "${TABLE}.value")]),
            ),
        ]),
        joins: vec![
            ExploreJoin::new("left", "${a.id} = ${left.a_id}"),
            ExploreJoin::new("right", "${a.id} = ${right.a_id}"),
            ExploreJoin::new("target", target_on),
        ],
        description: None,
    }
}

pub fn query(dimensions: &[&str], metrics: &[&str]) -> MetricQuery {
    MetricQuery {
        dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
        metrics: metrics.iter().map(|m| m.to_string()).collect(),
        ..Default::default()
    }
}

pub fn rule(field_id: &str, operator: FilterOperator, values: Vec<Value>) -> FilterGroupItem {
    FilterGroupItem::Rule(FilterRule::new(field_id, operator, values))
}
