//! Having-filter composer and row-level comparison filters.
//!
//! A [`ComparisonFilter`] describes one filter input type: a list of
//! per-column comparison groups, each exposing the operators of a result
//! type family. It is built once per schema build and evaluated lazily per
//! request against a table alias:
//!
//! - a *having* filter (`aggregate = Some(spec)`) compares
//!   `spec.wrap(alias.column)` against user values;
//! - a *row* filter (`aggregate = None`) compares the raw column.
//!
//! Within one input, comparisons are ANDed in descriptor order, then the
//! `and` combinators left to right, then the `or` combinators. An input with
//! nothing set evaluates to boolean-true.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;

use crate::aggregate::SchemaEnv;
use crate::aggregate::eligible_columns;
use crate::aggregate::result_type::{ComparisonOperator, ResultFamily, resolve_result_type};
use crate::aggregate::spec::AggregateSpec;
use crate::catalog::{Table, TypeInfo};
use crate::error::PgAggregatesError;
use crate::fragment::{Fragment, SqlValue, join_and, join_or};

// ── Input shapes ────────────────────────────────────────────────────────

/// Operator values for one column. `null` counts as not set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ComparisonInput {
    pub equal_to: Option<Value>,
    pub not_equal_to: Option<Value>,
    pub greater_than: Option<Value>,
    pub greater_than_or_equal_to: Option<Value>,
    pub less_than: Option<Value>,
    pub less_than_or_equal_to: Option<Value>,
}

impl ComparisonInput {
    pub fn get(&self, op: ComparisonOperator) -> Option<&Value> {
        let value = match op {
            ComparisonOperator::EqualTo => &self.equal_to,
            ComparisonOperator::NotEqualTo => &self.not_equal_to,
            ComparisonOperator::GreaterThan => &self.greater_than,
            ComparisonOperator::GreaterThanOrEqualTo => &self.greater_than_or_equal_to,
            ComparisonOperator::LessThan => &self.less_than,
            ComparisonOperator::LessThanOrEqualTo => &self.less_than_or_equal_to,
        };
        value.as_ref().filter(|v| !v.is_null())
    }
}

/// User input for a [`ComparisonFilter`]: `{ <column>: {...}, and: [...], or: [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FilterInput {
    #[serde(default)]
    pub and: Option<Vec<FilterInput>>,
    #[serde(default)]
    pub or: Option<Vec<FilterInput>>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, ComparisonInput>,
}

impl FilterInput {
    pub fn from_json(value: Value) -> Result<Self, PgAggregatesError> {
        serde_json::from_value(value).map_err(|e| PgAggregatesError::InvalidArgument(e.to_string()))
    }
}

// ── Descriptors ─────────────────────────────────────────────────────────

/// Keys taken by the combinators of [`FilterInput`]; a column with one of
/// these names cannot be addressed and gets no comparison group.
pub const RESERVED_FIELD_NAMES: [&str; 2] = ["and", "or"];

fn is_reserved_field(name: &str) -> bool {
    RESERVED_FIELD_NAMES.contains(&name)
}

/// One comparison group of a filter.
#[derive(Debug, Clone)]
pub struct FilterField {
    pub column: String,
    /// SQL type user values are embedded as.
    pub input_type: TypeInfo,
    pub family: ResultFamily,
    pub operators: &'static [ComparisonOperator],
}

/// A filter input type for one table.
#[derive(Debug, Clone)]
pub struct ComparisonFilter {
    pub type_name: String,
    /// The aggregate wrapping each column, `None` for a row filter.
    pub aggregate: Option<AggregateSpec>,
    pub fields: Vec<FilterField>,
}

/// `buildHavingFilter(table, spec)`.
///
/// Returns `Ok(None)` when no column is eligible, so no empty input type is
/// ever produced. Result-type resolution failures are fatal.
pub fn build_having_filter(
    env: &SchemaEnv<'_>,
    table: &Table,
    spec: &AggregateSpec,
) -> Result<Option<ComparisonFilter>, PgAggregatesError> {
    let mut fields = Vec::new();
    for eligible in eligible_columns(env, table, spec, |t, c| env.caps.is_filterable(t, c)) {
        if is_reserved_field(&eligible.column.name) {
            tracing::debug!(table = %table.name, column = %eligible.column.name, spec = %spec.id, reason = "reserved name", "skipping having column");
            continue;
        }
        let result = spec.result_type_for(eligible.source_type.oid);
        let result_type =
            resolve_result_type(env.catalog, &spec.id, &eligible.source_type, result.type_oid)?;
        let Some(family) = ResultFamily::for_type(&result_type) else {
            tracing::debug!(table = %table.name, column = %eligible.column.name, spec = %spec.id, reason = "no result family", "skipping having column");
            continue;
        };
        if family.operators().is_empty() {
            tracing::debug!(table = %table.name, column = %eligible.column.name, spec = %spec.id, family = family.name(), reason = "no operators", "skipping having column");
            continue;
        }
        fields.push(FilterField {
            column: eligible.column.name.clone(),
            input_type: family.input_type(env.catalog)?,
            family,
            operators: family.operators(),
        });
    }
    if fields.is_empty() {
        tracing::debug!(table = %table.name, spec = %spec.id, reason = "no eligible columns", "skipping having filter");
        return Ok(None);
    }
    Ok(Some(ComparisonFilter {
        type_name: env.names.having_filter_type(table, &spec.id),
        aggregate: Some(spec.clone()),
        fields,
    }))
}

/// A filter over raw column values, offered for every filterable column
/// with a comparable type. Every family, string included, gets all six
/// operators here.
pub fn build_row_filter(
    env: &SchemaEnv<'_>,
    table: &Table,
) -> Result<Option<ComparisonFilter>, PgAggregatesError> {
    let mut fields = Vec::new();
    for column in &table.columns {
        if !env.caps.is_filterable(table, column) {
            continue;
        }
        if is_reserved_field(&column.name) {
            tracing::debug!(table = %table.name, column = %column.name, reason = "reserved name", "skipping row filter column");
            continue;
        }
        let Some(family) = env
            .catalog
            .resolve_type(column.type_oid)
            .and_then(|ty| ResultFamily::for_type(&ty))
        else {
            tracing::debug!(table = %table.name, column = %column.name, reason = "no comparison family", "skipping row filter column");
            continue;
        };
        fields.push(FilterField {
            column: column.name.clone(),
            input_type: family.input_type(env.catalog)?,
            family,
            operators: &ComparisonOperator::ALL,
        });
    }
    if fields.is_empty() {
        return Ok(None);
    }
    Ok(Some(ComparisonFilter {
        type_name: env.names.row_filter_type(table),
        aggregate: None,
        fields,
    }))
}

impl ComparisonFilter {
    pub fn field(&self, column: &str) -> Option<&FilterField> {
        self.fields.iter().find(|f| f.column == column)
    }

    /// The compared expression for `column` over the table aliased `alias`.
    pub fn operand(&self, alias: &str, column: &str) -> Result<Fragment, PgAggregatesError> {
        let column = Fragment::qualified(&[alias, column])?;
        Ok(match &self.aggregate {
            Some(spec) => spec.wrap_sql(column),
            None => column,
        })
    }

    /// Evaluate `input` against the table aliased `alias`.
    pub fn apply(&self, input: &FilterInput, alias: &str) -> Result<Fragment, PgAggregatesError> {
        if let Some(unknown) = input.fields.keys().find(|k| self.field(k).is_none()) {
            return Err(PgAggregatesError::InvalidArgument(format!(
                "{} has no field \"{unknown}\"",
                self.type_name
            )));
        }

        let mut parts = Vec::new();
        for field in &self.fields {
            let Some(comparison) = input.fields.get(&field.column) else {
                continue;
            };
            for op in ComparisonOperator::ALL {
                let Some(value) = comparison.get(op) else {
                    continue;
                };
                if !field.operators.contains(&op) {
                    return Err(PgAggregatesError::InvalidArgument(format!(
                        "operator {} is not available on {}.{}",
                        op.name(),
                        self.type_name,
                        field.column
                    )));
                }
                let left = self.operand(alias, &field.column)?;
                let right = embed_literal(field.family, &field.input_type, value)?;
                parts.push(Fragment::binary_op(left, op.binary_operator(), right));
            }
        }
        if let Some(branches) = &input.and {
            let mut anded = Vec::with_capacity(branches.len());
            for branch in branches {
                anded.push(self.apply(branch, alias)?);
            }
            parts.push(join_and(anded));
        }
        if let Some(branches) = &input.or {
            let mut ored = Vec::with_capacity(branches.len());
            for branch in branches {
                ored.push(self.apply(branch, alias)?);
            }
            parts.push(join_or(ored));
        }
        Ok(join_and(parts))
    }
}

// ── Literal embedding ───────────────────────────────────────────────────

fn invalid_value(family: ResultFamily, value: &Value) -> PgAggregatesError {
    PgAggregatesError::InvalidArgument(format!(
        "cannot use {value} as a {} filter value",
        family.name()
    ))
}

fn is_decimal(s: &str) -> bool {
    let s = s.trim();
    let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s);
    let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
        Some((m, e)) => (m, Some(e)),
        None => (unsigned, None),
    };
    let mut digits = 0;
    let mut dots = 0;
    for c in mantissa.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return false,
        }
    }
    let exponent_ok = match exponent {
        Some(e) => {
            let e = e.strip_prefix(['-', '+']).unwrap_or(e);
            !e.is_empty() && e.chars().all(|c| c.is_ascii_digit())
        }
        None => true,
    };
    digits > 0 && dots <= 1 && exponent_ok
}

fn is_datetime(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Embed a user value as a literal of the family's input type.
pub fn embed_literal(
    family: ResultFamily,
    input_type: &TypeInfo,
    value: &Value,
) -> Result<Fragment, PgAggregatesError> {
    let literal = match family {
        ResultFamily::Int => {
            let n = match value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            }
            .filter(|n| i32::try_from(*n).is_ok())
            .ok_or_else(|| invalid_value(family, value))?;
            SqlValue::Int(n)
        }
        ResultFamily::BigInt => {
            let n = match value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            }
            .ok_or_else(|| invalid_value(family, value))?;
            SqlValue::Int(n)
        }
        ResultFamily::Float => {
            let f = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .ok_or_else(|| invalid_value(family, value))?;
            SqlValue::Float(f)
        }
        ResultFamily::BigFloat => {
            let text = match value {
                Value::Number(n) => n.to_string(),
                Value::String(s) if is_decimal(s) => s.trim().to_string(),
                _ => return Err(invalid_value(family, value)),
            };
            SqlValue::Typed {
                value: text,
                type_name: input_type.name.clone(),
            }
        }
        ResultFamily::Datetime => match value {
            Value::String(s) if is_datetime(s) => SqlValue::Typed {
                value: s.clone(),
                type_name: input_type.name.clone(),
            },
            _ => return Err(invalid_value(family, value)),
        },
        ResultFamily::String => match value {
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Number(n) => SqlValue::Text(n.to_string()),
            Value::Bool(b) => SqlValue::Text(b.to_string()),
            _ => return Err(invalid_value(family, value)),
        },
    };
    Ok(Fragment::literal(literal))
}

// ── Table-level having input ────────────────────────────────────────────

/// User input for a [`TableHavingFilter`]:
/// `{ <aggregateId>: FilterInput, and: [...], or: [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TableHavingInput {
    #[serde(default)]
    pub and: Option<Vec<TableHavingInput>>,
    #[serde(default)]
    pub or: Option<Vec<TableHavingInput>>,
    #[serde(flatten)]
    pub aggregates: BTreeMap<String, FilterInput>,
}

impl TableHavingInput {
    pub fn from_json(value: Value) -> Result<Self, PgAggregatesError> {
        serde_json::from_value(value).map_err(|e| PgAggregatesError::InvalidArgument(e.to_string()))
    }
}

/// All having filters of a table, combined with recursive `and`/`or`.
#[derive(Debug, Clone)]
pub struct TableHavingFilter {
    pub type_name: String,
    pub filters: Vec<ComparisonFilter>,
}

impl TableHavingFilter {
    /// One having filter per aggregate spec with eligible columns, in
    /// registry order. `Ok(None)` when there are none.
    pub fn build(
        env: &SchemaEnv<'_>,
        table: &Table,
    ) -> Result<Option<TableHavingFilter>, PgAggregatesError> {
        let mut filters = Vec::new();
        for spec in env.aggregates {
            if let Some(filter) = build_having_filter(env, table, spec)? {
                filters.push(filter);
            }
        }
        if filters.is_empty() {
            return Ok(None);
        }
        Ok(Some(TableHavingFilter {
            type_name: env.names.having_input_type(table),
            filters,
        }))
    }

    pub fn filter(&self, spec_id: &str) -> Option<&ComparisonFilter> {
        self.filters
            .iter()
            .find(|f| f.aggregate.as_ref().is_some_and(|s| s.id == spec_id))
    }

    pub fn apply(&self, input: &TableHavingInput, alias: &str) -> Result<Fragment, PgAggregatesError> {
        let mut parts = Vec::new();
        for key in input.aggregates.keys() {
            if self.filter(key).is_none() {
                return Err(PgAggregatesError::InvalidArgument(format!(
                    "{} has no field \"{key}\"",
                    self.type_name
                )));
            }
        }
        for filter in &self.filters {
            let Some(spec) = &filter.aggregate else {
                continue;
            };
            if let Some(sub) = input.aggregates.get(&spec.id) {
                parts.push(filter.apply(sub, alias)?);
            }
        }
        if let Some(branches) = &input.and {
            let mut anded = Vec::with_capacity(branches.len());
            for branch in branches {
                anded.push(self.apply(branch, alias)?);
            }
            parts.push(join_and(anded));
        }
        if let Some(branches) = &input.or {
            let mut ored = Vec::with_capacity(branches.len());
            for branch in branches {
                ored.push(self.apply(branch, alias)?);
            }
            parts.push(join_or(ored));
        }
        Ok(join_and(parts))
    }
}
