//! Filters on parent rows by aggregates of a related child collection.
//!
//! Input shape, per aggregatable relation:
//!
//! ```json
//! { "filter": { "status": { "equalTo": "paid" } },
//!   "sum": { "amount": { "greaterThan": 1000 } } }
//! ```
//!
//! `filter` restricts the child rows; each aggregate key adds having-style
//! comparisons. Everything is folded into one correlated aggregate
//! condition (see [`crate::aggregate::condition`]).

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::aggregate::SchemaEnv;
use crate::aggregate::condition::AggregateConditionBuilder;
use crate::aggregate::context::ComposeContext;
use crate::aggregate::having::{ComparisonFilter, FilterInput, build_having_filter, build_row_filter};
use crate::catalog::{Catalog, Relation, Table};
use crate::error::PgAggregatesError;
use crate::fragment::Fragment;

/// User input for a [`RelationAggregateFilter`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RelationAggregateFilterInput {
    #[serde(default)]
    pub filter: Option<FilterInput>,
    #[serde(flatten)]
    pub aggregates: BTreeMap<String, FilterInput>,
}

impl RelationAggregateFilterInput {
    pub fn from_json(value: Value) -> Result<Self, PgAggregatesError> {
        serde_json::from_value(value).map_err(|e| PgAggregatesError::InvalidArgument(e.to_string()))
    }
}

/// Filter descriptor for one one-to-many relation of a parent table.
#[derive(Debug, Clone)]
pub struct RelationAggregateFilter {
    /// Field name on the parent's filter input.
    pub field_name: String,
    pub type_name: String,
    pub relation: Relation,
    /// Row filter over the child table.
    pub row_filter: Option<ComparisonFilter>,
    /// Having filters over the child table, in registry order.
    pub having: Vec<ComparisonFilter>,
}

/// Describe the aggregate filter of `relation`, or `Ok(None)` when the
/// relation is not aggregatable or the child table offers nothing to
/// filter on.
pub fn build_relation_filter(
    env: &SchemaEnv<'_>,
    table: &Table,
    relation: &Relation,
) -> Result<Option<RelationAggregateFilter>, PgAggregatesError> {
    if !env.catalog.is_aggregatable(relation) {
        tracing::debug!(table = %table.name, relation = %relation.name, reason = "not aggregatable", "skipping relation filter");
        return Ok(None);
    }
    let Some(remote) = env.catalog.remote_table(relation) else {
        return Ok(None);
    };
    let row_filter = build_row_filter(env, remote)?;
    let mut having = Vec::new();
    for spec in env.aggregates {
        if let Some(filter) = build_having_filter(env, remote, spec)? {
            having.push(filter);
        }
    }
    if row_filter.is_none() && having.is_empty() {
        tracing::debug!(table = %table.name, relation = %relation.name, reason = "no filterable columns", "skipping relation filter");
        return Ok(None);
    }
    Ok(Some(RelationAggregateFilter {
        field_name: env.names.relation_filter_field(table, relation),
        type_name: env.names.relation_filter_type(table, relation),
        relation: relation.clone(),
        row_filter,
        having,
    }))
}

/// All relation aggregate filters of `table`, in relation order.
pub fn list_relation_filters(
    env: &SchemaEnv<'_>,
    table: &Table,
) -> Result<Vec<RelationAggregateFilter>, PgAggregatesError> {
    let mut filters = Vec::new();
    for relation in &table.relations {
        if let Some(filter) = build_relation_filter(env, table, relation)? {
            filters.push(filter);
        }
    }
    Ok(filters)
}

impl RelationAggregateFilter {
    fn having_for(&self, spec_id: &str) -> Option<&ComparisonFilter> {
        self.having
            .iter()
            .find(|f| f.aggregate.as_ref().is_some_and(|s| s.id == spec_id))
    }

    /// `buildAggregateCondition(relation, contributedConditions)`: the
    /// scalar boolean subquery for `input`, correlated to `parent_alias`.
    pub fn apply(
        &self,
        ctx: &mut ComposeContext,
        catalog: &Catalog,
        input: &RelationAggregateFilterInput,
        parent_alias: &str,
    ) -> Result<Fragment, PgAggregatesError> {
        if let Some(unknown) = input.aggregates.keys().find(|k| self.having_for(k).is_none()) {
            return Err(PgAggregatesError::InvalidArgument(format!(
                "{} has no field \"{unknown}\"",
                self.type_name
            )));
        }

        let mut builder =
            AggregateConditionBuilder::for_relation(ctx, catalog, &self.relation, parent_alias)?;
        let alias = builder.alias().to_string();

        if let Some(filter_input) = &input.filter {
            let row_filter = self.row_filter.as_ref().ok_or_else(|| {
                PgAggregatesError::InvalidArgument(format!("{} has no field \"filter\"", self.type_name))
            })?;
            let condition = row_filter.apply(filter_input, &alias)?;
            if !condition.is_true() {
                builder.add_row_condition(condition)?;
            }
        }

        for having in &self.having {
            let Some(spec) = &having.aggregate else {
                continue;
            };
            let Some(sub) = input.aggregates.get(&spec.id) else {
                continue;
            };
            let condition = having.apply(sub, &alias)?;
            builder.scope(spec)?.add_condition(condition);
        }

        builder.finalize()
    }
}
