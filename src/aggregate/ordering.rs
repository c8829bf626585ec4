//! Ordering keys over related child collections.
//!
//! For every one-to-many, non-unique relation of a table, two keys
//! (ascending, descending) order parent rows by the number of related rows,
//! and two more per (column, aggregate spec) pair order them by an
//! aggregate of a child column. Aggregation collapses row identity, so no
//! key derived here is ever unique.

use crate::aggregate::SchemaEnv;
use crate::aggregate::condition::correlation_conditions;
use crate::aggregate::context::ComposeContext;
use crate::aggregate::eligible_columns;
use crate::aggregate::spec::AggregateSpec;
use crate::catalog::{Catalog, Relation, Table};
use crate::error::PgAggregatesError;
use crate::fragment::{Fragment, Select, SelectItem, join_and};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const BOTH: [SortDirection; 2] = [SortDirection::Asc, SortDirection::Desc];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// What an ordering key measures over the related rows.
#[derive(Debug, Clone)]
pub enum OrderingMeasure {
    /// `count(*)`
    Count,
    /// `spec.wrap(column)`
    Aggregate { spec: AggregateSpec, column: String },
}

/// One enum-like ordering value.
#[derive(Debug, Clone)]
pub struct OrderingKey {
    pub name: String,
    pub direction: SortDirection,
    /// Always false.
    pub is_unique: bool,
    pub relation: Relation,
    pub measure: OrderingMeasure,
}

impl OrderingKey {
    /// The correlated scalar subquery computing the sort value for the
    /// parent row aliased `parent_alias`.
    ///
    /// There is no `GROUP BY`: a plain aggregate over zero rows still
    /// yields one row, so parents without children sort by `0` (count) or
    /// `NULL` (most aggregates).
    pub fn sql_expression(
        &self,
        ctx: &mut ComposeContext,
        catalog: &Catalog,
        parent_alias: &str,
    ) -> Result<Fragment, PgAggregatesError> {
        let remote = catalog.remote_table(&self.relation).ok_or_else(|| {
            PgAggregatesError::InvalidArgument(format!(
                "ordering key {} points at unknown table {}.{}",
                self.name, self.relation.remote_schema, self.relation.remote_table
            ))
        })?;
        let alias = ctx.next_alias(&remote.name);
        let measured = match &self.measure {
            OrderingMeasure::Count => Fragment::call("count", vec![Fragment::Star]),
            OrderingMeasure::Aggregate { spec, column } => {
                spec.wrap_sql(Fragment::qualified(&[alias.as_str(), column.as_str()])?)
            }
        };
        let mut select = Select::new(remote.sql_name()?, &alias)?;
        select.projection.push(SelectItem {
            expr: measured,
            alias: None,
        });
        select.where_clause = Some(join_and(correlation_conditions(
            &self.relation,
            parent_alias,
            &alias,
        )?));
        Ok(Fragment::subquery(select))
    }

    /// `<expression> ASC|DESC`, ready for an `ORDER BY` list.
    pub fn order_by_sql(
        &self,
        ctx: &mut ComposeContext,
        catalog: &Catalog,
        parent_alias: &str,
    ) -> Result<String, PgAggregatesError> {
        let expr = self.sql_expression(ctx, catalog, parent_alias)?;
        Ok(format!("{expr} {}", self.direction.as_str()))
    }
}

/// `listOrderingKeys(table)`.
pub fn list_ordering_keys(env: &SchemaEnv<'_>, table: &Table) -> Vec<OrderingKey> {
    let mut keys = Vec::new();
    for relation in &table.relations {
        if !env.catalog.is_aggregatable(relation) {
            tracing::debug!(table = %table.name, relation = %relation.name, reason = "not aggregatable", "skipping ordering relation");
            continue;
        }
        let Some(remote) = env.catalog.remote_table(relation) else {
            continue;
        };

        for direction in SortDirection::BOTH {
            keys.push(OrderingKey {
                name: env.names.order_by_related_count(table, relation, direction),
                direction,
                is_unique: false,
                relation: relation.clone(),
                measure: OrderingMeasure::Count,
            });
        }

        for spec in env.aggregates {
            for eligible in eligible_columns(env, remote, spec, |t, c| env.caps.is_orderable(t, c)) {
                for direction in SortDirection::BOTH {
                    keys.push(OrderingKey {
                        name: env.names.order_by_related_aggregate(
                            table,
                            relation,
                            &spec.id,
                            &eligible.column.name,
                            direction,
                        ),
                        direction,
                        is_unique: false,
                        relation: relation.clone(),
                        measure: OrderingMeasure::Aggregate {
                            spec: spec.clone(),
                            column: eligible.column.name.clone(),
                        },
                    });
                }
            }
        }
    }
    keys
}
