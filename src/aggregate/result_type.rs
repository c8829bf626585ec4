//! Result-type derivation for aggregates.
//!
//! Each aggregate kind has an explicit mapping table from source type OID to
//! result type OID plus a declared fallback for unmapped types:
//!
//! | kind | mapping | fallback | nullable |
//! |---|---|---|---|
//! | sum | int2/int4 → int8, int8 → numeric, float/interval/money kept | numeric | no (coalesced with `'0'`) |
//! | average | integers → numeric, float4 → float8, numeric/interval kept | numeric | yes |
//! | min / max | source type kept | n/a | yes |
//! | distinctCount | always int8 | n/a | no |
//! | stddev / variance | float4/float8 → float8 | numeric | yes |

use crate::catalog::{Catalog, TypeInfo, oid};
use crate::error::PgAggregatesError;

/// The built-in aggregate kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Sum,
    DistinctCount,
    Min,
    Max,
    Average,
    StddevSample,
    StddevPopulation,
    VarianceSample,
    VariancePopulation,
}

impl AggregateKind {
    /// All kinds in registration order.
    pub const ALL: [AggregateKind; 9] = [
        AggregateKind::Sum,
        AggregateKind::DistinctCount,
        AggregateKind::Min,
        AggregateKind::Max,
        AggregateKind::Average,
        AggregateKind::StddevSample,
        AggregateKind::StddevPopulation,
        AggregateKind::VarianceSample,
        AggregateKind::VariancePopulation,
    ];

    /// Stable id used in generated names. Never change a published id.
    pub fn id(&self) -> &'static str {
        match self {
            AggregateKind::Sum => "sum",
            AggregateKind::DistinctCount => "distinctCount",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
            AggregateKind::Average => "average",
            AggregateKind::StddevSample => "stddevSample",
            AggregateKind::StddevPopulation => "stddevPopulation",
            AggregateKind::VarianceSample => "varianceSample",
            AggregateKind::VariancePopulation => "variancePopulation",
        }
    }

    /// The mapping rule for this kind.
    pub fn result_type_rule(&self) -> fn(u32) -> u32 {
        match self {
            AggregateKind::Sum => sum_result_type,
            AggregateKind::DistinctCount => distinct_count_result_type,
            AggregateKind::Min | AggregateKind::Max => preserve_result_type,
            AggregateKind::Average => average_result_type,
            AggregateKind::StddevSample
            | AggregateKind::StddevPopulation
            | AggregateKind::VarianceSample
            | AggregateKind::VariancePopulation => statistical_result_type,
        }
    }

    /// Whether the wrapped aggregate can never be NULL.
    pub fn is_non_null(&self) -> bool {
        matches!(self, AggregateKind::Sum | AggregateKind::DistinctCount)
    }
}

/// Result of an aggregate over a source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultType {
    pub type_oid: u32,
    pub nullable: bool,
}

/// `resultType(sourceTypeId, aggregateKind)`.
pub fn result_type(source_type: u32, kind: AggregateKind) -> ResultType {
    ResultType {
        type_oid: (kind.result_type_rule())(source_type),
        nullable: !kind.is_non_null(),
    }
}

// ── Mapping tables ──────────────────────────────────────────────────────

const SUM_MAP: &[(u32, u32)] = &[
    (oid::INT2, oid::INT8),
    (oid::INT4, oid::INT8),
    (oid::INT8, oid::NUMERIC),
    (oid::FLOAT4, oid::FLOAT4),
    (oid::FLOAT8, oid::FLOAT8),
    (oid::INTERVAL, oid::INTERVAL),
    (oid::MONEY, oid::MONEY),
];

const AVERAGE_MAP: &[(u32, u32)] = &[
    (oid::INT2, oid::NUMERIC),
    (oid::INT4, oid::NUMERIC),
    (oid::INT8, oid::NUMERIC),
    (oid::FLOAT4, oid::FLOAT8),
    (oid::FLOAT8, oid::FLOAT8),
    (oid::NUMERIC, oid::NUMERIC),
    (oid::INTERVAL, oid::INTERVAL),
];

const STATISTICAL_MAP: &[(u32, u32)] = &[(oid::FLOAT4, oid::FLOAT8), (oid::FLOAT8, oid::FLOAT8)];

fn map_with_fallback(map: &[(u32, u32)], source: u32, fallback: u32) -> u32 {
    map.iter()
        .find(|(from, _)| *from == source)
        .map(|(_, to)| *to)
        .unwrap_or(fallback)
}

pub fn sum_result_type(source: u32) -> u32 {
    map_with_fallback(SUM_MAP, source, oid::NUMERIC)
}

pub fn average_result_type(source: u32) -> u32 {
    map_with_fallback(AVERAGE_MAP, source, oid::NUMERIC)
}

pub fn statistical_result_type(source: u32) -> u32 {
    map_with_fallback(STATISTICAL_MAP, source, oid::NUMERIC)
}

/// min/max: the source type is returned unchanged.
pub fn preserve_result_type(source: u32) -> u32 {
    source
}

/// distinctCount: constant int8, the mapping table is not consulted.
pub fn distinct_count_result_type(_source: u32) -> u32 {
    oid::INT8
}

/// Resolve a mapped result type against the catalog.
///
/// An unresolvable target is a configuration error naming the aggregate and
/// the source type.
pub fn resolve_result_type(
    catalog: &Catalog,
    aggregate_id: &str,
    source: &TypeInfo,
    target_oid: u32,
) -> Result<TypeInfo, PgAggregatesError> {
    catalog.resolve_type(target_oid).ok_or_else(|| {
        let err = PgAggregatesError::UnresolvedType {
            aggregate: aggregate_id.to_string(),
            source_type: source.name.clone(),
            target_type: target_oid,
        };
        tracing::warn!(aggregate = aggregate_id, source_type = %source.name, target_oid, "{err}");
        err
    })
}

// ── Result-type families ────────────────────────────────────────────────

/// Classification of a result type selecting the having-filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultFamily {
    Int,
    BigInt,
    Float,
    BigFloat,
    Datetime,
    String,
}

/// The six comparison operators offered by filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    EqualTo,
    NotEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
}

impl ComparisonOperator {
    pub const ALL: [ComparisonOperator; 6] = [
        ComparisonOperator::EqualTo,
        ComparisonOperator::NotEqualTo,
        ComparisonOperator::GreaterThan,
        ComparisonOperator::GreaterThanOrEqualTo,
        ComparisonOperator::LessThan,
        ComparisonOperator::LessThanOrEqualTo,
    ];

    pub const EQUALITY: [ComparisonOperator; 2] =
        [ComparisonOperator::EqualTo, ComparisonOperator::NotEqualTo];

    /// Input field name of the operator.
    pub fn name(&self) -> &'static str {
        match self {
            ComparisonOperator::EqualTo => "equalTo",
            ComparisonOperator::NotEqualTo => "notEqualTo",
            ComparisonOperator::GreaterThan => "greaterThan",
            ComparisonOperator::GreaterThanOrEqualTo => "greaterThanOrEqualTo",
            ComparisonOperator::LessThan => "lessThan",
            ComparisonOperator::LessThanOrEqualTo => "lessThanOrEqualTo",
        }
    }

    pub fn binary_operator(&self) -> crate::fragment::BinaryOperator {
        use crate::fragment::BinaryOperator;
        match self {
            ComparisonOperator::EqualTo => BinaryOperator::Eq,
            ComparisonOperator::NotEqualTo => BinaryOperator::NotEq,
            ComparisonOperator::GreaterThan => BinaryOperator::Gt,
            ComparisonOperator::GreaterThanOrEqualTo => BinaryOperator::GtEq,
            ComparisonOperator::LessThan => BinaryOperator::Lt,
            ComparisonOperator::LessThanOrEqualTo => BinaryOperator::LtEq,
        }
    }
}

impl ResultFamily {
    /// Classify a result type; `None` when no family applies (e.g. interval).
    ///
    /// Money is left out: PostgreSQL has no money-versus-numeric comparison
    /// and user values are embedded as the family's input type.
    pub fn for_type(ty: &TypeInfo) -> Option<ResultFamily> {
        match ty.oid {
            oid::INT2 | oid::INT4 => Some(ResultFamily::Int),
            oid::INT8 => Some(ResultFamily::BigInt),
            oid::FLOAT4 | oid::FLOAT8 => Some(ResultFamily::Float),
            oid::NUMERIC => Some(ResultFamily::BigFloat),
            oid::TIMESTAMP | oid::TIMESTAMPTZ | oid::DATE => Some(ResultFamily::Datetime),
            oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::NAME => Some(ResultFamily::String),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResultFamily::Int => "int",
            ResultFamily::BigInt => "bigint",
            ResultFamily::Float => "float",
            ResultFamily::BigFloat => "bigfloat",
            ResultFamily::Datetime => "datetime",
            ResultFamily::String => "string",
        }
    }

    /// Operators a having filter exposes for this family. The string family
    /// is reserved and exposes none.
    pub fn operators(&self) -> &'static [ComparisonOperator] {
        match self {
            ResultFamily::String => &[],
            _ => &ComparisonOperator::ALL,
        }
    }

    /// SQL type user values are embedded as.
    pub fn input_type_oid(&self) -> u32 {
        match self {
            ResultFamily::Int => oid::INT4,
            ResultFamily::BigInt => oid::INT8,
            ResultFamily::Float => oid::FLOAT8,
            ResultFamily::BigFloat => oid::NUMERIC,
            ResultFamily::Datetime => oid::TIMESTAMPTZ,
            ResultFamily::String => oid::TEXT,
        }
    }

    /// Resolve the input type in the catalog.
    pub fn input_type(&self, catalog: &Catalog) -> Result<TypeInfo, PgAggregatesError> {
        catalog
            .resolve_type(self.input_type_oid())
            .ok_or_else(|| PgAggregatesError::NoFilterInputType {
                family: self.name().to_string(),
            })
    }
}
