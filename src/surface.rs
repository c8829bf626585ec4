//! Once-per-build enumeration of the generated aggregate surface.
//!
//! [`AggregateSurface::build`] walks every table of the catalog snapshot and
//! records what can be computed: aggregate types, group keys, having
//! filters, relation aggregate filters and ordering keys. Anything with
//! zero eligible members is left out. The result is immutable and may be
//! shared across request threads.

use crate::aggregate::SchemaEnv;
use crate::aggregate::context::ComposeContext;
use crate::aggregate::group_by::{GroupByKey, GroupByRegistry, list_group_by_keys};
use crate::aggregate::having::{ComparisonFilter, TableHavingFilter, build_row_filter};
use crate::aggregate::ordering::{OrderingKey, list_ordering_keys};
use crate::aggregate::query::{AggregateType, build_aggregate_type};
use crate::aggregate::relation_filter::{RelationAggregateFilter, list_relation_filters};
use crate::aggregate::spec::AggregateRegistry;
use crate::catalog::{Catalog, DefaultCapabilities, Table};
use crate::config::AggregatesConfig;
use crate::error::PgAggregatesError;
use crate::inflection::DefaultNames;

/// Everything generated for one table.
#[derive(Debug, Clone)]
pub struct TableSurface {
    pub table: Table,
    pub aggregate_types: Vec<AggregateType>,
    pub group_keys: Vec<GroupByKey>,
    /// Row filter used as `WHERE` of grouped aggregate queries.
    pub row_filter: Option<ComparisonFilter>,
    pub having: Option<TableHavingFilter>,
    pub relation_filters: Vec<RelationAggregateFilter>,
    pub ordering_keys: Vec<OrderingKey>,
}

impl TableSurface {
    pub fn is_empty(&self) -> bool {
        self.aggregate_types.is_empty()
            && self.group_keys.is_empty()
            && self.having.is_none()
            && self.relation_filters.is_empty()
            && self.ordering_keys.is_empty()
    }

    pub fn relation_filter(&self, field_name: &str) -> Option<&RelationAggregateFilter> {
        self.relation_filters
            .iter()
            .find(|f| f.field_name == field_name)
    }

    pub fn ordering_key(&self, name: &str) -> Option<&OrderingKey> {
        self.ordering_keys.iter().find(|k| k.name == name)
    }
}

/// The generated surface of a whole catalog.
#[derive(Debug, Clone)]
pub struct AggregateSurface {
    pub catalog: Catalog,
    pub config: AggregatesConfig,
    pub tables: Vec<TableSurface>,
}

impl AggregateSurface {
    /// Build the surface from explicit collaborators.
    pub fn build(
        env: &SchemaEnv<'_>,
        config: &AggregatesConfig,
    ) -> Result<AggregateSurface, PgAggregatesError> {
        config.validate()?;
        let mut tables = Vec::new();
        for table in &env.catalog.tables {
            let surface = build_table_surface(env, config, table)?;
            if surface.is_empty() {
                tracing::debug!(table = %table.name, reason = "nothing eligible", "skipping table");
                continue;
            }
            tables.push(surface);
        }

        tracing::info!(
            tables = tables.len(),
            aggregate_types = tables.iter().map(|t| t.aggregate_types.len()).sum::<usize>(),
            group_keys = tables.iter().map(|t| t.group_keys.len()).sum::<usize>(),
            relation_filters = tables.iter().map(|t| t.relation_filters.len()).sum::<usize>(),
            ordering_keys = tables.iter().map(|t| t.ordering_keys.len()).sum::<usize>(),
            "aggregate surface built"
        );

        Ok(AggregateSurface {
            catalog: env.catalog.clone(),
            config: config.clone(),
            tables,
        })
    }

    /// Build with registries derived from `config`, the default capability
    /// query and the default naming scheme.
    pub fn build_with_defaults(
        catalog: &Catalog,
        config: &AggregatesConfig,
    ) -> Result<AggregateSurface, PgAggregatesError> {
        let aggregates = AggregateRegistry::from_config(config)?;
        let group_bys = GroupByRegistry::from_config(config)?;
        let env = SchemaEnv {
            catalog,
            aggregates: &aggregates,
            group_bys: &group_bys,
            caps: &DefaultCapabilities,
            names: &DefaultNames,
        };
        Self::build(&env, config)
    }

    pub fn table(&self, schema: &str, name: &str) -> Option<&TableSurface> {
        self.tables
            .iter()
            .find(|t| t.table.schema == schema && t.table.name == name)
    }

    /// A fresh per-request composition context.
    pub fn compose_context(&self) -> ComposeContext {
        ComposeContext::new(&self.config)
    }
}

fn build_table_surface(
    env: &SchemaEnv<'_>,
    config: &AggregatesConfig,
    table: &Table,
) -> Result<TableSurface, PgAggregatesError> {
    let mut surface = TableSurface {
        table: table.clone(),
        aggregate_types: Vec::new(),
        group_keys: Vec::new(),
        row_filter: None,
        having: None,
        relation_filters: Vec::new(),
        ordering_keys: Vec::new(),
    };

    if config.enable_grouped_aggregates {
        for spec in env.aggregates {
            if let Some(aggregate_type) = build_aggregate_type(env, table, spec)? {
                surface.aggregate_types.push(aggregate_type);
            }
        }
        surface.group_keys = list_group_by_keys(env, table);
        surface.row_filter = build_row_filter(env, table)?;
        if config.enable_having {
            surface.having = TableHavingFilter::build(env, table)?;
        }
    }
    if config.enable_relation_filters {
        surface.relation_filters = list_relation_filters(env, table)?;
    }
    if config.enable_order_by_aggregates {
        surface.ordering_keys = list_ordering_keys(env, table);
    }
    Ok(surface)
}
