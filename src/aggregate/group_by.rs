//! Group-by specs and group-key enumeration.
//!
//! Every orderable, non-unique column is offered as an identity group key.
//! Derivative keys come from the [`GroupByRegistry`]: the built-in set
//! truncates `timestamp`/`timestamptz` columns with `date_trunc` at year,
//! month, week, day and hour granularity.

use crate::aggregate::SchemaEnv;
use crate::aggregate::spec::{RegistryEntry, SpecRegistry};
use crate::catalog::{Table, TypeInfo};
use crate::config::{AggregatesConfig, Granularity};
use crate::error::PgAggregatesError;
use crate::fragment::{Fragment, SqlValue};

/// A transform producing a coarser group key from a column.
#[derive(Debug, Clone)]
pub struct GroupBySpec {
    pub id: String,
    pub is_suitable_type: fn(&TypeInfo) -> bool,
    pub wrap: fn(Fragment) -> Fragment,
}

impl RegistryEntry for GroupBySpec {
    const REGISTRY: &'static str = "group-by";

    fn id(&self) -> &str {
        &self.id
    }
}

fn date_trunc(field: &str, expr: Fragment) -> Fragment {
    Fragment::call(
        "date_trunc",
        vec![Fragment::literal(SqlValue::Text(field.to_string())), expr],
    )
}

impl GroupBySpec {
    /// The built-in truncation spec for a granularity.
    pub fn truncation(granularity: Granularity) -> GroupBySpec {
        let wrap: fn(Fragment) -> Fragment = match granularity {
            Granularity::Year => |expr| date_trunc("year", expr),
            Granularity::Month => |expr| date_trunc("month", expr),
            Granularity::Week => |expr| date_trunc("week", expr),
            Granularity::Day => |expr| date_trunc("day", expr),
            Granularity::Hour => |expr| date_trunc("hour", expr),
        };
        GroupBySpec {
            id: granularity.spec_id().to_string(),
            is_suitable_type: TypeInfo::is_timestamp,
            wrap,
        }
    }

    pub fn is_suitable(&self, ty: &TypeInfo) -> bool {
        (self.is_suitable_type)(ty)
    }

    pub fn wrap_sql(&self, expr: Fragment) -> Fragment {
        (self.wrap)(expr)
    }
}

pub type GroupByRegistry = SpecRegistry<GroupBySpec>;

impl SpecRegistry<GroupBySpec> {
    /// All built-in truncation specs, coarsest first.
    pub fn with_defaults() -> Self {
        SpecRegistry {
            specs: Granularity::ALL
                .iter()
                .map(|g| GroupBySpec::truncation(*g))
                .collect(),
        }
    }

    /// The truncation specs listed in `config.truncation_granularities`.
    pub fn from_config(config: &AggregatesConfig) -> Result<Self, PgAggregatesError> {
        let mut registry = SpecRegistry::new();
        for g in &config.truncation_granularities {
            registry.register(GroupBySpec::truncation(*g))?;
        }
        Ok(registry)
    }
}

/// One group key offered for a table.
#[derive(Debug, Clone)]
pub struct GroupByKey {
    /// External enum value name.
    pub name: String,
    pub column: String,
    /// `None` for the identity key.
    pub spec_id: Option<String>,
    wrap: Option<fn(Fragment) -> Fragment>,
}

impl GroupByKey {
    /// The key expression over the table aliased as `alias`.
    pub fn expression(&self, alias: &str) -> Result<Fragment, PgAggregatesError> {
        let column = Fragment::qualified(&[alias, self.column.as_str()])?;
        Ok(match self.wrap {
            Some(wrap) => wrap(column),
            None => column,
        })
    }

    pub fn is_derivative(&self) -> bool {
        self.spec_id.is_some()
    }
}

/// Enumerate the group keys of a table.
///
/// Columns in a single-column unique constraint are never offered: grouping
/// by them yields one group per row.
pub fn list_group_by_keys(env: &SchemaEnv<'_>, table: &Table) -> Vec<GroupByKey> {
    let mut keys = Vec::new();
    for column in &table.columns {
        if table.is_single_column_unique(&column.name) {
            tracing::debug!(table = %table.name, column = %column.name, reason = "unique", "skipping group-by column");
            continue;
        }
        if !env.caps.is_orderable(table, column) {
            tracing::debug!(table = %table.name, column = %column.name, reason = "not orderable", "skipping group-by column");
            continue;
        }
        keys.push(GroupByKey {
            name: env.names.group_by_key(table, &column.name, None),
            column: column.name.clone(),
            spec_id: None,
            wrap: None,
        });
        let Some(ty) = env.catalog.resolve_type(column.type_oid) else {
            continue;
        };
        for spec in env.group_bys {
            if spec.is_suitable(&ty) {
                keys.push(GroupByKey {
                    name: env.names.group_by_key(table, &column.name, Some(spec.id.as_str())),
                    column: column.name.clone(),
                    spec_id: Some(spec.id.clone()),
                    wrap: Some(spec.wrap),
                });
            }
        }
    }
    keys
}
