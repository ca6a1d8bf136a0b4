//! Integration tests for metric query compilation.
//!
//! These tests exercise the public API: SqlBuilder, compile_and_build,
//! MetricQuery.

mod common;

use common::{events_explore, orders_explore, query, rule};
use lightql::dialect::{DuckDbDialect, PostgresDialect};
use lightql::explores::MetricType;
use lightql::limits::RowLimitPolicy;
use lightql::metric_query::{
    AdditionalMetric, FilterGroup, FilterGroupItem, FilterOperator, SortField, TableCalculation,
};
use lightql::query_builder::SqlBuilder;
use lightql::{compile_and_build, LightqlError};
use serde_json::json;

// ============================================================================
// Field resolution and join selection
// ============================================================================

#[test]
fn renders_grouped_query_through_intermediate_join() {
    let sql = compile_and_build(
        &orders_explore(),
        &query(&["regions_country"], &["orders_revenue"]),
        &PostgresDialect,
    )
    .unwrap();
    assert_eq!(
        sql.query,
        "SELECT\n\
         \x20 \"regions\".country AS \"regions_country\",\n\
         \x20 SUM(\"orders\".amount) AS \"orders_revenue\"\n\
         FROM \"orders\" AS \"orders\"\n\
         LEFT OUTER JOIN \"customers\" AS \"customers\"\n\
         \x20 ON \"orders\".customer_id = \"customers\".id\n\
         LEFT OUTER JOIN \"regions\" AS \"regions\"\n\
         \x20 ON \"customers\".region_id = \"regions\".id\n\
         GROUP BY \"regions\".country\n\
         LIMIT 50000"
    );
    assert!(!sql.has_example_metric);
}

#[test]
fn resolved_tables_start_with_base_and_cover_owners() {
    let compiled = SqlBuilder::default()
        .compile(
            &orders_explore(),
            &query(&["regions_country", "customers_name"], &["orders_order_count"]),
            &PostgresDialect,
        )
        .unwrap();
    assert_eq!(compiled.tables, vec!["orders", "customers", "regions"]);
    assert_eq!(compiled.joins.len(), 2);
    assert_eq!(compiled.joins[0].table.alias.as_deref(), Some("customers"));
}

#[test]
fn base_table_query_emits_no_joins() {
    let sql = compile_and_build(
        &orders_explore(),
        &query(&["orders_status"], &["orders_revenue"]),
        &PostgresDialect,
    )
    .unwrap();
    assert!(!sql.query.contains("JOIN"));
}

#[test]
fn filter_only_tables_are_joined_but_not_selected() {
    let mut q = query(&["orders_status"], &["orders_revenue"]);
    q.filters.dimensions = Some(FilterGroup::And(vec![rule(
        "regions_country",
        FilterOperator::Equals,
        vec![json!("NL")],
    )]));
    let sql = compile_and_build(&orders_explore(), &q, &PostgresDialect).unwrap();
    let customers = sql.query.find("JOIN \"customers\"").unwrap();
    let regions = sql.query.find("JOIN \"regions\"").unwrap();
    assert!(customers < regions);
    assert!(sql.query.contains("WHERE \"regions\".country = 'NL'"));
    assert!(!sql.query.contains("AS \"regions_country\""));
}

#[test]
fn unknown_field_is_a_field_reference_error_naming_it() {
    let err = compile_and_build(
        &orders_explore(),
        &query(&["orders_nonexistent"], &[]),
        &PostgresDialect,
    )
    .unwrap_err();
    assert!(
        matches!(&err, LightqlError::FieldReference(msg) if msg.contains("orders_nonexistent")),
        "unexpected error {err:?}"
    );
}

#[test]
fn dimension_in_metrics_list_is_a_field_reference_error() {
    let err = compile_and_build(
        &orders_explore(),
        &query(&[], &["orders_status"]),
        &PostgresDialect,
    )
    .unwrap_err();
    assert!(matches!(err, LightqlError::FieldReference(_)));
}

#[test]
fn time_interval_dimensions_truncate_the_source() {
    let sql = compile_and_build(
        &orders_explore(),
        &query(&["orders_created_month"], &["orders_revenue"]),
        &PostgresDialect,
    )
    .unwrap();
    assert!(sql
        .query
        .contains("DATE_TRUNC('month', \"orders\".created_at) AS \"orders_created_month\""));
    assert!(sql
        .query
        .contains("GROUP BY DATE_TRUNC('month', \"orders\".created_at)"));
}

#[test]
fn dimensions_only_query_has_no_group_by() {
    let sql = compile_and_build(
        &orders_explore(),
        &query(&["orders_status"], &[]),
        &PostgresDialect,
    )
    .unwrap();
    assert!(!sql.query.contains("GROUP BY"));
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn empty_filter_trees_match_absent_filters() {
    let plain = query(&["orders_status"], &["orders_revenue"]);
    let mut empty = plain.clone();
    empty.filters.dimensions = Some(FilterGroup::And(vec![FilterGroupItem::Group(
        FilterGroup::Or(vec![]),
    )]));
    empty.filters.metrics = Some(FilterGroup::Or(vec![]));
    empty.filters.table_calculations = Some(FilterGroup::And(vec![]));

    let explore = orders_explore();
    let a = compile_and_build(&explore, &plain, &PostgresDialect).unwrap();
    let b = compile_and_build(&explore, &empty, &PostgresDialect).unwrap();
    assert_eq!(a, b);
    assert!(!b.query.contains("WHERE"));
    assert!(!b.query.contains("HAVING"));
}

#[test]
fn skipped_rules_do_not_add_joins() {
    let plain = query(&["orders_status"], &["orders_revenue"]);
    let mut skipped = plain.clone();
    skipped.filters.dimensions = Some(FilterGroup::And(vec![
        rule("regions_country", FilterOperator::In, vec![]),
        rule("customers_name", FilterOperator::InBetween, vec![json!("a")]),
    ]));

    let explore = orders_explore();
    let absent = compile_and_build(&explore, &plain, &PostgresDialect).unwrap();
    let with_skipped = compile_and_build(&explore, &skipped, &PostgresDialect).unwrap();
    assert_eq!(absent.query, with_skipped.query);
    assert!(!with_skipped.query.contains("JOIN"));
}

#[test]
fn emitted_filter_rules_still_add_joins() {
    let mut q = query(&["orders_status"], &["orders_revenue"]);
    q.filters.dimensions = Some(FilterGroup::And(vec![
        rule("orders_status", FilterOperator::In, vec![]),
        rule("regions_country", FilterOperator::Equals, vec![json!("NZ")]),
    ]));
    let compiled = SqlBuilder::default()
        .compile(&orders_explore(), &q, &PostgresDialect)
        .unwrap();
    assert_eq!(compiled.tables, vec!["orders", "customers", "regions"]);
}

#[test]
fn unknown_references_are_reported_before_other_errors() {
    let explore = orders_explore();

    let mut empty = query(&[], &[]);
    empty.sorts = vec![SortField::asc("orders_nonexistent")];
    let err = compile_and_build(&explore, &empty, &PostgresDialect).unwrap_err();
    assert!(
        matches!(&err, LightqlError::FieldReference(msg) if msg.contains("orders_nonexistent")),
        "unexpected error {err:?}"
    );

    let mut misplaced = query(&["orders_status"], &["orders_revenue"]);
    misplaced.filters.dimensions = Some(FilterGroup::And(vec![rule(
        "orders_revenue",
        FilterOperator::GreaterThan,
        vec![json!(1)],
    )]));
    misplaced.table_calculations = vec![TableCalculation::new("ratio", "${orders_missing} / 2")];
    let err = compile_and_build(&explore, &misplaced, &PostgresDialect).unwrap_err();
    assert!(
        matches!(&err, LightqlError::FieldReference(msg) if msg.contains("orders_missing")),
        "unexpected error {err:?}"
    );
}

#[test]
fn metric_filters_compile_to_having() {
    let mut q = query(&["orders_status"], &["orders_revenue"]);
    q.filters.metrics = Some(FilterGroup::And(vec![rule(
        "orders_revenue",
        FilterOperator::GreaterThan,
        vec![json!(100)],
    )]));
    let sql = compile_and_build(&orders_explore(), &q, &PostgresDialect).unwrap();
    assert!(sql.query.contains("HAVING SUM(\"orders\".amount) > 100"));
    assert!(!sql.query.contains("WHERE"));
}

#[test]
fn metric_in_dimensions_tree_is_a_compile_error() {
    let mut q = query(&["orders_status"], &["orders_revenue"]);
    q.filters.dimensions = Some(FilterGroup::And(vec![rule(
        "orders_revenue",
        FilterOperator::GreaterThan,
        vec![json!(5)],
    )]));
    let err = compile_and_build(&orders_explore(), &q, &PostgresDialect).unwrap_err();
    assert!(matches!(err, LightqlError::Compile(_)));
}

#[test]
fn dimension_in_metrics_tree_is_a_compile_error() {
    let mut q = query(&["orders_status"], &["orders_revenue"]);
    q.filters.metrics = Some(FilterGroup::And(vec![rule(
        "orders_status",
        FilterOperator::Equals,
        vec![json!("shipped")],
    )]));
    let err = compile_and_build(&orders_explore(), &q, &PostgresDialect).unwrap_err();
    assert!(matches!(err, LightqlError::Compile(_)));
}

#[test]
fn unknown_filter_target_is_a_field_reference_error() {
    let mut q = query(&["orders_status"], &[]);
    q.filters.dimensions = Some(FilterGroup::And(vec![rule(
        "orders_missing",
        FilterOperator::IsNull,
        vec![],
    )]));
    let err = compile_and_build(&orders_explore(), &q, &PostgresDialect).unwrap_err();
    assert!(matches!(&err, LightqlError::FieldReference(msg) if msg.contains("orders_missing")));
}

#[test]
fn filter_values_are_escaped() {
    let mut q = query(&["orders_status"], &[]);
    q.filters.dimensions = Some(FilterGroup::And(vec![rule(
        "orders_status",
        FilterOperator::Equals,
        vec![json!("x' OR '1'='1")],
    )]));
    let sql = compile_and_build(&orders_explore(), &q, &PostgresDialect).unwrap();
    assert!(sql
        .query
        .contains("WHERE \"orders\".status = 'x'' OR ''1''=''1'"));
}

// ============================================================================
// Limits
// ============================================================================

#[test]
fn null_limit_is_derived_from_cell_budget() {
    let compiled = SqlBuilder::default()
        .compile(
            &orders_explore(),
            &query(&["orders_status"], &["orders_revenue"]),
            &PostgresDialect,
        )
        .unwrap();
    assert_eq!(compiled.limit, 50_000);
}

#[test]
fn explicit_limit_is_clamped_to_cell_cap() {
    let builder = SqlBuilder::new(RowLimitPolicy::unbounded_requests(100_000));
    let mut q = query(&["orders_status"], &["orders_revenue", "orders_order_count"]);
    q.limit = Some(9_999_999);
    let sql = builder
        .build_with_dialect(&orders_explore(), &q, &PostgresDialect)
        .unwrap();
    assert!(sql.query.ends_with("LIMIT 33333"));
}

#[test]
fn limit_above_maximum_is_a_parameter_error() {
    let mut q = query(&["orders_status"], &[]);
    q.limit = Some(5_001);
    let err = compile_and_build(&orders_explore(), &q, &PostgresDialect).unwrap_err();
    assert!(matches!(err, LightqlError::Parameter(_)));
}

#[test]
fn empty_selection_is_a_parameter_error() {
    let mut q = query(&[], &[]);
    q.table_calculations = vec![TableCalculation::new("one", "1")];
    let err = compile_and_build(&orders_explore(), &q, &PostgresDialect).unwrap_err();
    assert!(matches!(err, LightqlError::Parameter(_)));
}

// ============================================================================
// Sorts, table calculations, additional metrics
// ============================================================================

#[test]
fn sorts_use_select_aliases() {
    let mut q = query(&["orders_status"], &["orders_revenue"]);
    q.sorts = vec![SortField::desc("orders_revenue"), SortField::asc("orders_status")];
    let sql = compile_and_build(&orders_explore(), &q, &PostgresDialect).unwrap();
    assert!(sql
        .query
        .contains("ORDER BY \"orders_revenue\" DESC, \"orders_status\" ASC"));
}

#[test]
fn sorting_by_unselected_field_is_a_compile_error() {
    let mut q = query(&["orders_status"], &[]);
    q.sorts = vec![SortField::asc("orders_amount")];
    let err = compile_and_build(&orders_explore(), &q, &PostgresDialect).unwrap_err();
    assert!(matches!(err, LightqlError::Compile(_)));

    q.sorts = vec![SortField::asc("orders_nope")];
    let err = compile_and_build(&orders_explore(), &q, &PostgresDialect).unwrap_err();
    assert!(matches!(err, LightqlError::FieldReference(_)));
}

#[test]
fn table_calculations_wrap_in_cte_without_inline_support() {
    let mut q = query(&["orders_status"], &["orders_revenue"]);
    q.table_calculations = vec![TableCalculation::new(
        "revenue_share",
        "${orders_revenue} / SUM(${orders_revenue}) OVER ()",
    )];
    q.sorts = vec![SortField::desc("revenue_share")];
    let sql = compile_and_build(&orders_explore(), &q, &PostgresDialect).unwrap();
    assert!(sql.query.starts_with("WITH \"metrics\" AS (\nSELECT"));
    assert!(sql.query.contains(
        "SELECT\n  *,\n  \"orders_revenue\" / SUM(\"orders_revenue\") OVER () AS \"revenue_share\"\nFROM \"metrics\""
    ));
    assert!(sql.query.ends_with("ORDER BY \"revenue_share\" DESC\nLIMIT 33333"));
}

#[test]
fn table_calculations_render_inline_when_supported() {
    let mut q = query(&["orders_status"], &["orders_revenue"]);
    q.table_calculations = vec![TableCalculation::new(
        "revenue_share",
        "${orders_revenue} / SUM(${orders_revenue}) OVER ()",
    )];
    let sql = compile_and_build(&orders_explore(), &q, &DuckDbDialect).unwrap();
    assert!(!sql.query.contains("WITH"));
    assert!(sql.query.contains(
        "SUM(\"orders\".amount) / SUM(SUM(\"orders\".amount)) OVER () AS \"revenue_share\""
    ));
}

#[test]
fn table_calculation_filters_apply_to_the_wrapped_query() {
    let mut q = query(&["orders_status"], &["orders_revenue"]);
    q.table_calculations = vec![TableCalculation::new("double_revenue", "${orders_revenue} * 2")];
    q.filters.table_calculations = Some(FilterGroup::And(vec![rule(
        "double_revenue",
        FilterOperator::GreaterThan,
        vec![json!(10)],
    )]));
    let sql = compile_and_build(&orders_explore(), &q, &DuckDbDialect).unwrap();
    assert!(sql.query.starts_with("WITH \"metrics\" AS ("));
    assert!(sql.query.contains("FROM \"metrics\"\nWHERE \"double_revenue\" > 10"));
}

#[test]
fn table_calculation_must_reference_selected_fields() {
    let mut q = query(&["orders_status"], &[]);
    q.table_calculations = vec![TableCalculation::new("x", "${orders_revenue} * 2")];
    let err = compile_and_build(&orders_explore(), &q, &PostgresDialect).unwrap_err();
    assert!(matches!(err, LightqlError::Compile(_)));
}

#[test]
fn additional_metrics_join_the_namespace() {
    let mut q = query(&["orders_status"], &["orders_max_amount"]);
    q.additional_metrics = vec![AdditionalMetric::new(
        "orders",
        "max_amount",
        MetricType::Max,
        "${TABLE}.amount",
    )];
    let builder = SqlBuilder::default();
    let compiled = builder.compile(&orders_explore(), &q, &PostgresDialect).unwrap();
    assert_eq!(compiled.additional_metrics.len(), 1);
    let sql = builder
        .build_with_dialect(&orders_explore(), &q, &PostgresDialect)
        .unwrap();
    assert!(sql
        .query
        .contains("MAX(\"orders\".amount) AS \"orders_max_amount\""));
}

#[test]
fn additional_metric_on_unknown_table_is_rejected() {
    let mut q = query(&["orders_status"], &[]);
    q.additional_metrics = vec![AdditionalMetric::new(
        "refunds",
        "total",
        MetricType::Sum,
        "${TABLE}.amount",
    )];
    let err = compile_and_build(&orders_explore(), &q, &PostgresDialect).unwrap_err();
    assert!(matches!(err, LightqlError::FieldReference(_)));
}

#[test]
fn example_metric_is_reported() {
    let sql = compile_and_build(
        &events_explore(),
        &query(&["events_kind"], &["events_count"]),
        &PostgresDialect,
    )
    .unwrap();
    assert!(sql.has_example_metric);
    assert!(sql.query.contains("COUNT(*) AS \"events_count\""));
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn rendering_is_deterministic() {
    let mut q = query(&["regions_country", "orders_status"], &["orders_revenue"]);
    q.filters.dimensions = Some(FilterGroup::Or(vec![
        rule("orders_status", FilterOperator::In, vec![json!("a"), json!("b")]),
        rule("customers_name", FilterOperator::StartsWith, vec![json!("A")]),
    ]));
    let builder = SqlBuilder::default();
    let explore = orders_explore();
    let compiled = builder.compile(&explore, &q, &PostgresDialect).unwrap();
    let first = lightql::query_builder::render(&compiled, &PostgresDialect);
    let second = lightql::query_builder::render(&compiled, &PostgresDialect);
    assert_eq!(first.query, second.query);
    assert_eq!(first.cache_key(), second.cache_key());
    let rebuilt = builder.build_with_dialect(&explore, &q, &PostgresDialect).unwrap();
    assert_eq!(first, rebuilt);
}
