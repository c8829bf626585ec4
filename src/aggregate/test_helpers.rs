//! Shared test helpers for aggregate unit tests.
//!
//! Provides catalog builders, a small shop schema, an owned
//! [`SchemaEnv`] holder and SQL assertion helpers. All helpers are
//! `#[cfg(test)]` and never touch PostgreSQL.

use crate::aggregate::SchemaEnv;
use crate::aggregate::group_by::GroupByRegistry;
use crate::aggregate::spec::AggregateRegistry;
use crate::catalog::{Catalog, Column, DefaultCapabilities, Relation, Table, oid};
use crate::inflection::DefaultNames;

// ── Column and table builders ───────────────────────────────────────────

/// Build a nullable `Column`.
pub fn col(name: &str, type_oid: u32) -> Column {
    Column {
        name: name.to_string(),
        type_oid,
        is_nullable: true,
    }
}

/// Build a non-nullable `Column`.
pub fn col_not_null(name: &str, type_oid: u32) -> Column {
    Column {
        name: name.to_string(),
        type_oid,
        is_nullable: false,
    }
}

/// Build a table in `public` with no keys and no relations.
pub fn table(name: &str, columns: Vec<Column>) -> Table {
    table_with_keys(name, columns, &[])
}

/// Build a table in `public` with explicit unique key sets.
pub fn table_with_keys(name: &str, columns: Vec<Column>, keys: &[&[&str]]) -> Table {
    Table {
        schema: "public".to_string(),
        name: name.to_string(),
        columns,
        unique_keys: keys
            .iter()
            .map(|k| k.iter().map(|c| c.to_string()).collect())
            .collect(),
        relations: Vec::new(),
    }
}

/// Build a relation to a table in `public`.
pub fn relation(name: &str, is_referencee: bool, local: &[&str], remote: &[&str], remote_table: &str) -> Relation {
    Relation {
        name: name.to_string(),
        is_referencee,
        local_columns: local.iter().map(|c| c.to_string()).collect(),
        remote_columns: remote.iter().map(|c| c.to_string()).collect(),
        remote_schema: "public".to_string(),
        remote_table: remote_table.to_string(),
    }
}

// ── Shop schema ─────────────────────────────────────────────────────────

/// `orders(id pk, customer_id, amount numeric, status text, placed_at timestamptz, quantity int2)`
pub fn shop_orders() -> Table {
    let mut orders = table_with_keys(
        "orders",
        vec![
            col_not_null("id", oid::INT4),
            col_not_null("customer_id", oid::INT4),
            col_not_null("amount", oid::NUMERIC),
            col("status", oid::TEXT),
            col("placed_at", oid::TIMESTAMPTZ),
            col("quantity", oid::INT2),
        ],
        &[&["id"]],
    );
    orders
        .relations
        .push(relation("customer", false, &["customer_id"], &["id"], "customer"));
    orders
}

/// `customer` with a one-to-many `orders` relation and a one-to-one
/// `profile` relation, plus the `orders` and `profile` tables.
pub fn shop_catalog() -> Catalog {
    let mut customer = table_with_keys(
        "customer",
        vec![col_not_null("id", oid::INT4), col("name", oid::TEXT)],
        &[&["id"]],
    );
    customer
        .relations
        .push(relation("orders", true, &["id"], &["customer_id"], "orders"));
    customer
        .relations
        .push(relation("profile", true, &["id"], &["customer_id"], "profile"));

    let mut profile = table_with_keys(
        "profile",
        vec![
            col_not_null("id", oid::INT4),
            col_not_null("customer_id", oid::INT4),
            col("bio", oid::TEXT),
        ],
        &[&["id"], &["customer_id"]],
    );
    profile
        .relations
        .push(relation("customer", false, &["customer_id"], &["id"], "customer"));

    Catalog::new(vec![customer, shop_orders(), profile])
}

// ── Schema environment ──────────────────────────────────────────────────

/// Owns everything a [`SchemaEnv`] borrows.
pub struct TestSchema {
    pub catalog: Catalog,
    pub aggregates: AggregateRegistry,
    pub group_bys: GroupByRegistry,
    pub caps: DefaultCapabilities,
    pub names: DefaultNames,
}

impl TestSchema {
    pub fn new(tables: Vec<Table>) -> Self {
        Self::from_catalog(Catalog::new(tables))
    }

    pub fn from_catalog(catalog: Catalog) -> Self {
        TestSchema {
            catalog,
            aggregates: AggregateRegistry::with_defaults(),
            group_bys: GroupByRegistry::with_defaults(),
            caps: DefaultCapabilities,
            names: DefaultNames,
        }
    }

    pub fn env(&self) -> SchemaEnv<'_> {
        SchemaEnv {
            catalog: &self.catalog,
            aggregates: &self.aggregates,
            group_bys: &self.group_bys,
            caps: &self.caps,
            names: &self.names,
        }
    }

    /// Look up a table in `public`, panicking when absent.
    pub fn table(&self, name: &str) -> &Table {
        self.catalog
            .table("public", name)
            .unwrap_or_else(|| panic!("no table {name} in test catalog"))
    }
}

/// The shop schema with default registries.
pub fn shop_schema() -> TestSchema {
    TestSchema::from_catalog(shop_catalog())
}

/// `events(id pk, kind text, occurred_at timestamptz)` with default registries.
pub fn events_schema() -> TestSchema {
    TestSchema::new(vec![table_with_keys(
        "events",
        vec![
            col_not_null("id", oid::INT8),
            col("kind", oid::TEXT),
            col_not_null("occurred_at", oid::TIMESTAMPTZ),
        ],
        &[&["id"]],
    )])
}

// ── Assertion helpers ───────────────────────────────────────────────────

/// Assert that the generated SQL contains a substring (case-sensitive).
pub fn assert_sql_contains(sql: &str, expected: &str) {
    assert!(
        sql.contains(expected),
        "Expected SQL to contain:\n  {expected}\nGot:\n  {sql}",
    );
}

/// Assert that the generated SQL does NOT contain a substring (case-sensitive).
pub fn assert_sql_not_contains(sql: &str, unexpected: &str) {
    assert!(
        !sql.contains(unexpected),
        "Expected SQL NOT to contain:\n  {unexpected}\nGot:\n  {sql}",
    );
}
