//! Execution tests: run composed SQL against a real PostgreSQL.
//!
//! These start a Testcontainers PostgreSQL instance and are ignored by
//! default. Run with: `cargo test --test postgres_execution_tests -- --ignored`

mod common;

use common::{TestDb, init_tracing, measure_catalog, shop_catalog};
use pg_aggregates::aggregate::query::{AggregateQuery, AggregateRequest};
use pg_aggregates::aggregate::relation_filter::RelationAggregateFilterInput;
use pg_aggregates::aggregate::result_type::ResultFamily;
use pg_aggregates::{AggregateSurface, AggregatesConfig};
use serde_json::json;

fn shop_surface() -> AggregateSurface {
    init_tracing();
    AggregateSurface::build_with_defaults(&shop_catalog(), &AggregatesConfig::default())
        .expect("shop surface builds")
}

fn measure_surface() -> AggregateSurface {
    init_tracing();
    AggregateSurface::build_with_defaults(&measure_catalog(), &AggregatesConfig::default())
        .expect("measure surface builds")
}

/// A value every family accepts as a comparison operand.
fn sample_value(family: ResultFamily) -> serde_json::Value {
    match family {
        ResultFamily::Int | ResultFamily::BigInt => json!(0),
        ResultFamily::Float => json!(0.5),
        ResultFamily::BigFloat => json!("0"),
        ResultFamily::Datetime => json!("2024-01-01"),
        ResultFamily::String => json!("x"),
    }
}

fn customers_where(surface: &AggregateSurface, input: serde_json::Value) -> String {
    let customer = surface.table("public", "customer").unwrap();
    let filter = customer.relation_filter("ordersAggregates").unwrap();
    let input = RelationAggregateFilterInput::from_json(input).unwrap();
    let mut ctx = surface.compose_context();
    let condition = filter
        .apply(&mut ctx, &surface.catalog, &input, "c")
        .unwrap();
    format!("SELECT c.id FROM public.customer AS c WHERE {condition} ORDER BY c.id")
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_correlated_sum_filter_executes() {
    let db = TestDb::with_shop().await;
    let surface = shop_surface();

    let sql = customers_where(&surface, json!({"sum": {"amount": {"greaterThan": 1000}}}));
    assert_eq!(db.query_ids(&sql).await, vec![1, 2]);

    let sql = customers_where(
        &surface,
        json!({
            "filter": {"status": {"equalTo": "paid"}},
            "sum": {"amount": {"greaterThan": 1000}}
        }),
    );
    assert_eq!(db.query_ids(&sql).await, vec![1]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_multiple_scopes_in_one_subquery() {
    let db = TestDb::with_shop().await;
    let surface = shop_surface();
    let sql = customers_where(
        &surface,
        json!({
            "distinctCount": {"status": {"equalTo": 2}},
            "max": {"quantity": {"greaterThanOrEqualTo": 3}}
        }),
    );
    assert_eq!(db.query_ids(&sql).await, vec![2]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_subquery_returns_one_row_per_matching_parent() {
    let db = TestDb::with_shop().await;
    let surface = shop_surface();
    let customer = surface.table("public", "customer").unwrap();
    let filter = customer.relation_filter("ordersAggregates").unwrap();
    let input = RelationAggregateFilterInput::from_json(json!({})).unwrap();
    let mut ctx = surface.compose_context();
    let condition = filter
        .apply(&mut ctx, &surface.catalog, &input, "c")
        .unwrap();
    // a scalar subquery returning more than one row would raise an error
    let sql = format!("SELECT c.id FROM public.customer AS c WHERE c.id IN (1, 2) AND {condition}");
    assert_eq!(db.count_rows(&sql).await, 2);

    // the childless customer still gets its single row
    let sql = format!("SELECT c.id FROM public.customer AS c WHERE {condition}");
    assert_eq!(db.count_rows(&sql).await, 3);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_childless_parent_passes_sum_below_threshold() {
    let db = TestDb::with_shop().await;
    let surface = shop_surface();
    // customer 3 has no orders, so its coalesced sum is 0
    let sql = customers_where(&surface, json!({"sum": {"amount": {"lessThan": 100}}}));
    assert_eq!(db.query_ids(&sql).await, vec![3]);

    let sql = customers_where(&surface, json!({"max": {"quantity": {"greaterThan": 0}}}));
    assert_eq!(db.query_ids(&sql).await, vec![1, 2]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_every_offered_aggregate_executes_over_mixed_types() {
    let db = TestDb::with_measures().await;
    let surface = measure_surface();
    let measure = surface.table("public", "measure").unwrap();

    let mut failures = Vec::new();
    let mut executed = 0;
    for aggregate_type in &measure.aggregate_types {
        for field in &aggregate_type.fields {
            let request = AggregateRequest::from_json(json!({
                "aggregates": [{"spec": aggregate_type.spec.id, "column": field.column}]
            }))
            .unwrap();
            let mut ctx = surface.compose_context();
            let sql = AggregateQuery::compose(&mut ctx, measure, &request)
                .unwrap()
                .to_sql();
            if let Err(e) = db.try_execute(&sql).await {
                failures.push(format!("{sql} -> {e}"));
            }
            executed += 1;
        }
    }
    for key in &measure.group_keys {
        let request = AggregateRequest::from_json(json!({
            "groupBy": [key.name],
            "aggregates": [{"spec": "distinctCount", "column": "tag"}]
        }))
        .unwrap();
        let mut ctx = surface.compose_context();
        let sql = AggregateQuery::compose(&mut ctx, measure, &request)
            .unwrap()
            .to_sql();
        if let Err(e) = db.try_execute(&sql).await {
            failures.push(format!("{sql} -> {e}"));
        }
    }
    assert!(executed > 0);
    assert!(failures.is_empty(), "{}", failures.join("\n"));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_every_having_field_executes_over_mixed_types() {
    let db = TestDb::with_measures().await;
    let surface = measure_surface();
    let measure = surface.table("public", "measure").unwrap();
    let having = measure.having.as_ref().unwrap();

    let mut failures = Vec::new();
    for filter in &having.filters {
        let Some(spec) = &filter.aggregate else {
            continue;
        };
        for field in &filter.fields {
            let request = AggregateRequest::from_json(json!({
                "aggregates": [{"spec": spec.id, "column": field.column}],
                "having": {(spec.id.clone()): {(field.column.clone()): {"greaterThan": sample_value(field.family)}}}
            }))
            .unwrap();
            let mut ctx = surface.compose_context();
            let sql = AggregateQuery::compose(&mut ctx, measure, &request)
                .unwrap()
                .to_sql();
            if let Err(e) = db.try_execute(&sql).await {
                failures.push(format!("{sql} -> {e}"));
            }
        }
    }
    assert!(failures.is_empty(), "{}", failures.join("\n"));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_empty_sums_over_interval_and_money_are_zero() {
    let db = TestDb::with_measures().await;
    let surface = measure_surface();
    let measure = surface.table("public", "measure").unwrap();
    let request = AggregateRequest::from_json(json!({
        "aggregates": [
            {"spec": "sum", "column": "span"},
            {"spec": "sum", "column": "price"}
        ],
        "filter": {"id": {"lessThan": 0}}
    }))
    .unwrap();
    let mut ctx = surface.compose_context();
    let sql = AggregateQuery::compose(&mut ctx, measure, &request)
        .unwrap()
        .to_sql();
    let zero: bool = db
        .query_scalar(&format!(
            "SELECT sum_span = interval '0' AND sum_price = '0'::money FROM ({sql}) AS q"
        ))
        .await;
    assert!(zero);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_relation_filter_over_account_without_measures() {
    let db = TestDb::with_measures().await;
    let surface = measure_surface();
    let account = surface.table("public", "account").unwrap();
    let filter = account.relation_filter("measureAggregates").unwrap();
    let input = RelationAggregateFilterInput::from_json(json!({
        "distinctCount": {"tag": {"equalTo": 0}}
    }))
    .unwrap();
    let mut ctx = surface.compose_context();
    let condition = filter
        .apply(&mut ctx, &surface.catalog, &input, "a")
        .unwrap();
    let sql = format!("SELECT a.id FROM public.account AS a WHERE {condition} ORDER BY a.id");
    assert_eq!(db.query_ids(&sql).await, vec![2]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_order_by_related_count_and_sum() {
    let db = TestDb::with_shop().await;
    let surface = shop_surface();
    let customer = surface.table("public", "customer").unwrap();
    let mut ctx = surface.compose_context();

    let by_count = customer
        .ordering_key("ORDERS_COUNT_DESC")
        .unwrap()
        .order_by_sql(&mut ctx, &surface.catalog, "c")
        .unwrap();
    let sql = format!("SELECT c.id FROM public.customer AS c ORDER BY {by_count}, c.id");
    assert_eq!(db.query_ids(&sql).await, vec![1, 2, 3]);

    let by_sum = customer
        .ordering_key("ORDERS_SUM_AMOUNT_DESC")
        .unwrap()
        .order_by_sql(&mut ctx, &surface.catalog, "c")
        .unwrap();
    let sql = format!("SELECT c.id FROM public.customer AS c ORDER BY {by_sum}, c.id");
    assert_eq!(db.query_ids(&sql).await, vec![2, 1, 3]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_grouped_query_executes() {
    let db = TestDb::with_shop().await;
    let surface = shop_surface();
    let orders = surface.table("public", "orders").unwrap();
    let request = AggregateRequest::from_json(json!({
        "groupBy": ["PLACED_AT_TRUNCATED_TO_MONTH"],
        "aggregates": [{"spec": "sum", "column": "amount"}],
        "filter": {"status": {"equalTo": "paid"}},
        "having": {"sum": {"amount": {"greaterThan": 650}}}
    }))
    .unwrap();
    let mut ctx = surface.compose_context();
    let query = AggregateQuery::compose(&mut ctx, orders, &request).unwrap();

    // January: 600 + 100, February: 700
    assert_eq!(db.count_rows(&query.to_sql()).await, 2);

    let total: i64 = db
        .query_scalar(&format!(
            "SELECT sum(sum_amount)::int8 FROM ({}) AS q",
            query.to_sql()
        ))
        .await;
    assert_eq!(total, 1400);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_ungrouped_sum_over_no_rows_is_zero() {
    let db = TestDb::with_shop().await;
    let surface = shop_surface();
    let orders = surface.table("public", "orders").unwrap();
    let request = AggregateRequest::from_json(json!({
        "aggregates": [
            {"spec": "sum", "column": "amount"},
            {"spec": "average", "column": "amount"}
        ],
        "filter": {"status": {"equalTo": "lost"}}
    }))
    .unwrap();
    let mut ctx = surface.compose_context();
    let sql = AggregateQuery::compose(&mut ctx, orders, &request)
        .unwrap()
        .to_sql();

    let sum_is_zero: bool = db
        .query_scalar(&format!("SELECT sum_amount = 0 FROM ({sql}) AS q"))
        .await;
    assert!(sum_is_zero);
    let avg_is_null: bool = db
        .query_scalar(&format!("SELECT average_amount IS NULL FROM ({sql}) AS q"))
        .await;
    assert!(avg_is_null);
}
