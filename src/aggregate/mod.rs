//! Aggregate rule engine.
//!
//! Build-time rules (result types, spec registries, group keys, ordering
//! keys) and request-time composition (having filters, correlated aggregate
//! conditions, grouped queries). Nothing here reads ambient state: the
//! catalog snapshot, registries, capability query and naming service are
//! passed in through a [`SchemaEnv`].

pub mod condition;
pub mod context;
pub mod group_by;
pub mod having;
pub mod ordering;
pub mod query;
pub mod relation_filter;
pub mod result_type;
pub mod spec;

#[cfg(test)]
pub(crate) mod test_helpers;

use crate::catalog::{Catalog, Column, ColumnCapabilities, Table, TypeInfo};
use crate::inflection::NameGenerator;

use self::group_by::{GroupByRegistry, GroupBySpec};
use self::spec::{AggregateRegistry, AggregateSpec};

/// Read-only inputs shared by every rule and composer.
///
/// All references are immutable, so one environment can be shared by any
/// number of concurrent requests.
#[derive(Clone, Copy)]
pub struct SchemaEnv<'a> {
    pub catalog: &'a Catalog,
    pub aggregates: &'a AggregateRegistry,
    pub group_bys: &'a GroupByRegistry,
    pub caps: &'a dyn ColumnCapabilities,
    pub names: &'a dyn NameGenerator,
}

impl<'a> SchemaEnv<'a> {
    /// `listAggregateSpecs()`, in registration order.
    pub fn list_aggregate_specs(&self) -> &'a [AggregateSpec] {
        let registry: &'a AggregateRegistry = self.aggregates;
        &registry.specs
    }

    /// `listGroupBySpecs()`, in registration order.
    pub fn list_group_by_specs(&self) -> &'a [GroupBySpec] {
        let registry: &'a GroupByRegistry = self.group_bys;
        &registry.specs
    }
}

/// A column that may be aggregated by a spec, with its resolved type.
#[derive(Debug, Clone)]
pub struct EligibleColumn<'t> {
    pub column: &'t Column,
    pub source_type: TypeInfo,
}

/// Columns of `table` that `spec` may aggregate.
///
/// A column is eligible when its type resolves, it is not a single-column
/// unique key, the spec accepts its type and `gate` (a capability check)
/// passes. Everything else is skipped with a debug event.
pub fn eligible_columns<'t, G>(
    env: &SchemaEnv<'_>,
    table: &'t Table,
    spec: &AggregateSpec,
    gate: G,
) -> Vec<EligibleColumn<'t>>
where
    G: Fn(&Table, &Column) -> bool,
{
    let mut eligible = Vec::new();
    for column in &table.columns {
        if table.is_single_column_unique(&column.name) {
            tracing::debug!(table = %table.name, column = %column.name, spec = %spec.id, reason = "unique", "skipping aggregate column");
            continue;
        }
        let Some(source_type) = env.catalog.resolve_type(column.type_oid) else {
            tracing::debug!(table = %table.name, column = %column.name, spec = %spec.id, reason = "unknown type", "skipping aggregate column");
            continue;
        };
        if !spec.is_suitable(&source_type) {
            continue;
        }
        if !gate(table, column) {
            tracing::debug!(table = %table.name, column = %column.name, spec = %spec.id, reason = "capability", "skipping aggregate column");
            continue;
        }
        eligible.push(EligibleColumn {
            column,
            source_type,
        });
    }
    eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::result_type::AggregateKind;
    use crate::aggregate::test_helpers::*;
    use crate::catalog::oid;

    #[test]
    fn test_list_specs_follow_registry_order() {
        let schema = events_schema();
        let env = schema.env();
        assert_eq!(env.list_aggregate_specs().len(), 9);
        assert_eq!(env.list_aggregate_specs()[0].id, "sum");
        assert_eq!(env.list_group_by_specs()[0].id, "truncated-to-year");
    }

    #[test]
    fn test_eligible_columns_for_sum() {
        let schema = TestSchema::new(vec![shop_orders()]);
        let env = schema.env();
        let orders = &schema.catalog.tables[0];
        let sum = AggregateSpec::builtin(AggregateKind::Sum);
        let eligible = eligible_columns(&env, orders, &sum, |_, _| true);
        let names: Vec<&str> = eligible
            .iter()
            .map(|c| c.column.name.as_str())
            .collect();
        // `id` is unique, `status` and `placed_at` are not summable
        assert_eq!(names, vec!["customer_id", "amount", "quantity"]);
    }

    #[test]
    fn test_eligible_columns_gate_and_unknown_type() {
        let schema = TestSchema::new(vec![table(
            "t",
            vec![col("a", oid::INT4), col("b", 999_999), col("c", oid::INT8)],
        )]);
        let env = schema.env();
        let t = &schema.catalog.tables[0];
        let dc = AggregateSpec::builtin(AggregateKind::DistinctCount);
        let eligible = eligible_columns(&env, t, &dc, |_, c| c.name != "c");
        let names: Vec<&str> = eligible
            .iter()
            .map(|c| c.column.name.as_str())
            .collect();
        assert_eq!(names, vec!["a"]);
    }
}
