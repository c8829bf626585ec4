//! Grouped aggregate query composition.
//!
//! Turns an [`AggregateRequest`] against one table surface into
//!
//! ```text
//! SELECT <key expr> AS "key_0", ..., <agg(col)> AS "<spec>_<column>", ...
//! FROM <table> AS <alias> [WHERE ...] [GROUP BY <key exprs>] [HAVING ...]
//! ```
//!
//! With no group keys the whole filtered set is aggregated into one row.

use serde::Deserialize;
use serde_json::Value;

use crate::aggregate::SchemaEnv;
use crate::aggregate::context::ComposeContext;
use crate::aggregate::eligible_columns;
use crate::aggregate::having::{FilterInput, TableHavingInput};
use crate::aggregate::result_type::resolve_result_type;
use crate::aggregate::spec::AggregateSpec;
use crate::catalog::{Table, TypeInfo};
use crate::error::PgAggregatesError;
use crate::fragment::{Fragment, Select, SelectItem};
use crate::surface::TableSurface;

// ── Aggregate types ─────────────────────────────────────────────────────

/// One aggregated column of an [`AggregateType`].
#[derive(Debug, Clone)]
pub struct AggregateField {
    pub column: String,
    pub source_type: TypeInfo,
    pub result_type: TypeInfo,
    pub nullable: bool,
}

/// The columns one aggregate spec can compute over a table.
#[derive(Debug, Clone)]
pub struct AggregateType {
    pub type_name: String,
    pub spec: AggregateSpec,
    pub fields: Vec<AggregateField>,
}

impl AggregateType {
    pub fn field(&self, column: &str) -> Option<&AggregateField> {
        self.fields.iter().find(|f| f.column == column)
    }
}

/// Resolve the aggregate type of `spec` over `table`; `Ok(None)` when no
/// column is eligible. An unresolvable result type is fatal.
pub fn build_aggregate_type(
    env: &SchemaEnv<'_>,
    table: &Table,
    spec: &AggregateSpec,
) -> Result<Option<AggregateType>, PgAggregatesError> {
    let mut fields = Vec::new();
    for eligible in eligible_columns(env, table, spec, |_, _| true) {
        let result = spec.result_type_for(eligible.source_type.oid);
        let result_type =
            resolve_result_type(env.catalog, &spec.id, &eligible.source_type, result.type_oid)?;
        fields.push(AggregateField {
            column: eligible.column.name.clone(),
            source_type: eligible.source_type,
            result_type,
            nullable: result.nullable,
        });
    }
    if fields.is_empty() {
        tracing::debug!(table = %table.name, spec = %spec.id, reason = "no eligible columns", "skipping aggregate type");
        return Ok(None);
    }
    Ok(Some(AggregateType {
        type_name: env.names.aggregate_type(table, &spec.id),
        spec: spec.clone(),
        fields,
    }))
}

// ── Requests ────────────────────────────────────────────────────────────

/// One `spec(column)` in a request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AggregateSelection {
    pub spec: String,
    pub column: String,
}

/// A grouped aggregate request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AggregateRequest {
    /// Group key names, e.g. `PLACED_AT_TRUNCATED_TO_MONTH`.
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub aggregates: Vec<AggregateSelection>,
    /// Row filter applied before grouping.
    #[serde(default)]
    pub filter: Option<FilterInput>,
    #[serde(default)]
    pub having: Option<TableHavingInput>,
}

impl AggregateRequest {
    pub fn from_json(value: Value) -> Result<Self, PgAggregatesError> {
        serde_json::from_value(value).map_err(|e| PgAggregatesError::InvalidArgument(e.to_string()))
    }
}

/// Metadata of one output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    pub name: String,
    pub type_oid: u32,
    pub nullable: bool,
}

/// A composed grouped aggregate statement.
#[derive(Debug, Clone)]
pub struct AggregateQuery {
    pub select: Select,
    pub outputs: Vec<OutputColumn>,
}

fn invalid(msg: String) -> PgAggregatesError {
    PgAggregatesError::InvalidArgument(msg)
}

impl AggregateQuery {
    pub fn compose(
        ctx: &mut ComposeContext,
        surface: &TableSurface,
        request: &AggregateRequest,
    ) -> Result<AggregateQuery, PgAggregatesError> {
        let table = &surface.table;
        if request.group_by.is_empty() && request.aggregates.is_empty() {
            return Err(invalid(format!(
                "aggregate request on {} selects nothing",
                table.name
            )));
        }
        let alias = ctx.next_alias(&table.name);
        let mut select = Select::new(table.sql_name()?, &alias)?;
        let mut outputs = Vec::new();

        for (i, key_name) in request.group_by.iter().enumerate() {
            let key = surface
                .group_keys
                .iter()
                .find(|k| &k.name == key_name)
                .ok_or_else(|| invalid(format!("{} has no group key {key_name}", table.name)))?;
            let column = table.column(&key.column).ok_or_else(|| {
                PgAggregatesError::InternalError(format!(
                    "group key {} refers to missing column {}",
                    key.name, key.column
                ))
            })?;
            let expr = key.expression(&alias)?;
            let name = format!("key_{i}");
            select.projection.push(SelectItem {
                expr: expr.clone(),
                alias: Some(name.clone()),
            });
            select.group_by.push(expr);
            outputs.push(OutputColumn {
                name,
                type_oid: column.type_oid,
                nullable: column.is_nullable,
            });
        }

        for selection in &request.aggregates {
            let aggregate = surface
                .aggregate_types
                .iter()
                .find(|a| a.spec.id == selection.spec)
                .ok_or_else(|| {
                    invalid(format!("{} has no aggregate {}", table.name, selection.spec))
                })?;
            let field = aggregate.field(&selection.column).ok_or_else(|| {
                invalid(format!(
                    "{} cannot aggregate column {}",
                    aggregate.type_name, selection.column
                ))
            })?;
            let column = Fragment::qualified(&[alias.as_str(), field.column.as_str()])?;
            let name = format!("{}_{}", aggregate.spec.id, field.column);
            select.projection.push(SelectItem {
                expr: aggregate.spec.wrap_sql(column),
                alias: Some(name.clone()),
            });
            outputs.push(OutputColumn {
                name,
                type_oid: field.result_type.oid,
                nullable: field.nullable,
            });
        }

        if let Some(filter) = &request.filter {
            let row_filter = surface
                .row_filter
                .as_ref()
                .ok_or_else(|| invalid(format!("{} has no row filter", table.name)))?;
            let predicate = row_filter.apply(filter, &alias)?;
            if !predicate.is_true() {
                select.where_clause = Some(predicate);
            }
        }

        if let Some(having) = &request.having {
            let having_filter = surface
                .having
                .as_ref()
                .ok_or_else(|| invalid(format!("{} has no having filter", table.name)))?;
            let predicate = having_filter.apply(having, &alias)?;
            if !predicate.is_true() {
                select.having = Some(predicate);
            }
        }

        Ok(AggregateQuery { select, outputs })
    }

    pub fn to_sql(&self) -> String {
        self.select.to_sql()
    }
}
