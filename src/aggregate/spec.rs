//! Aggregate specs and the ordered spec registry.
//!
//! An [`AggregateSpec`] is a descriptor carrying plain function pointers
//! (`is_suitable_type`, `wrap`, `result_type`), so specs can be cloned,
//! shared across threads and exercised without any schema in place.
//!
//! [`SpecRegistry`] keeps specs in an explicit ordered sequence. The order
//! is the registration order and drives generated field ordering.
//! Registration is additive and rejects duplicate ids; `retain` supports
//! filter-then-append replacement of defaults.

use crate::aggregate::result_type::{AggregateKind, ResultType};
use crate::catalog::TypeInfo;
use crate::config::AggregatesConfig;
use crate::error::PgAggregatesError;
use crate::fragment::{Fragment, SqlValue};

/// An entry of a [`SpecRegistry`].
pub trait RegistryEntry {
    /// Registry name used in error messages.
    const REGISTRY: &'static str;

    fn id(&self) -> &str;
}

/// An ordered, id-unique sequence of specs.
#[derive(Debug, Clone)]
pub struct SpecRegistry<S> {
    pub(crate) specs: Vec<S>,
}

impl<S> Default for SpecRegistry<S> {
    fn default() -> Self {
        SpecRegistry { specs: Vec::new() }
    }
}

impl<S: RegistryEntry> SpecRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a spec. Registering an id twice is a configuration error.
    pub fn register(&mut self, spec: S) -> Result<(), PgAggregatesError> {
        if self.get(spec.id()).is_some() {
            return Err(PgAggregatesError::DuplicateSpec {
                registry: S::REGISTRY,
                id: spec.id().to_string(),
            });
        }
        self.specs.push(spec);
        Ok(())
    }

    /// Keep only the specs matching `keep`, preserving order.
    pub fn retain<F: FnMut(&S) -> bool>(&mut self, keep: F) {
        self.specs.retain(keep);
    }

    pub fn get(&self, id: &str) -> Option<&S> {
        self.specs.iter().find(|s| s.id() == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, S> {
        self.specs.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl<'a, S> IntoIterator for &'a SpecRegistry<S> {
    type Item = &'a S;
    type IntoIter = std::slice::Iter<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.iter()
    }
}

// ── Aggregate specs ─────────────────────────────────────────────────────

/// Describes one aggregate kind.
#[derive(Debug, Clone)]
pub struct AggregateSpec {
    /// Stable id used in generated names.
    pub id: String,
    pub is_suitable_type: fn(&TypeInfo) -> bool,
    /// Wrap a column expression in the aggregate.
    pub wrap: fn(Fragment) -> Fragment,
    /// Source type OID → result type OID.
    pub result_type: fn(u32) -> u32,
    /// True when `wrap` never yields NULL.
    pub is_non_null: bool,
}

impl RegistryEntry for AggregateSpec {
    const REGISTRY: &'static str = "aggregate";

    fn id(&self) -> &str {
        &self.id
    }
}

impl AggregateSpec {
    /// The built-in spec for an aggregate kind.
    pub fn builtin(kind: AggregateKind) -> AggregateSpec {
        let (is_suitable_type, wrap): (fn(&TypeInfo) -> bool, fn(Fragment) -> Fragment) =
            match kind {
                AggregateKind::Sum => (is_summable, |expr| {
                    Fragment::call(
                        "coalesce",
                        vec![
                            Fragment::call("sum", vec![expr]),
                            // untyped, so it resolves to the sum's own type
                            Fragment::literal(SqlValue::Text("0".to_string())),
                        ],
                    )
                }),
                AggregateKind::DistinctCount => (TypeInfo::has_equality, |expr| {
                    Fragment::call_distinct("count", vec![expr])
                }),
                AggregateKind::Min => (is_extremum_type, |expr| Fragment::call("min", vec![expr])),
                AggregateKind::Max => (is_extremum_type, |expr| Fragment::call("max", vec![expr])),
                AggregateKind::Average => (is_averageable, |expr| Fragment::call("avg", vec![expr])),
                AggregateKind::StddevSample => (TypeInfo::is_arithmetic, |expr| {
                    Fragment::call("stddev_samp", vec![expr])
                }),
                AggregateKind::StddevPopulation => (TypeInfo::is_arithmetic, |expr| {
                    Fragment::call("stddev_pop", vec![expr])
                }),
                AggregateKind::VarianceSample => (TypeInfo::is_arithmetic, |expr| {
                    Fragment::call("var_samp", vec![expr])
                }),
                AggregateKind::VariancePopulation => (TypeInfo::is_arithmetic, |expr| {
                    Fragment::call("var_pop", vec![expr])
                }),
            };
        AggregateSpec {
            id: kind.id().to_string(),
            is_suitable_type,
            wrap,
            result_type: kind.result_type_rule(),
            is_non_null: kind.is_non_null(),
        }
    }

    pub fn is_suitable(&self, ty: &TypeInfo) -> bool {
        (self.is_suitable_type)(ty)
    }

    pub fn wrap_sql(&self, expr: Fragment) -> Fragment {
        (self.wrap)(expr)
    }

    pub fn result_type_for(&self, source_type: u32) -> ResultType {
        ResultType {
            type_oid: (self.result_type)(source_type),
            nullable: !self.is_non_null,
        }
    }
}

/// sum accepts numbers, money and intervals.
fn is_summable(ty: &TypeInfo) -> bool {
    ty.is_number_like() || ty.is_interval()
}

fn is_averageable(ty: &TypeInfo) -> bool {
    ty.is_arithmetic() || ty.is_interval()
}

/// min/max accept anything with a meaningful numeric or temporal order.
fn is_extremum_type(ty: &TypeInfo) -> bool {
    ty.is_number_like() || ty.is_interval() || ty.is_datetime()
}

pub type AggregateRegistry = SpecRegistry<AggregateSpec>;

impl SpecRegistry<AggregateSpec> {
    /// The built-in specs, in [`AggregateKind::ALL`] order.
    pub fn with_defaults() -> Self {
        SpecRegistry {
            specs: AggregateKind::ALL
                .iter()
                .map(|k| AggregateSpec::builtin(*k))
                .collect(),
        }
    }

    /// The built-in specs minus `config.disabled_aggregates`.
    pub fn from_config(config: &AggregatesConfig) -> Result<Self, PgAggregatesError> {
        let mut registry = Self::with_defaults();
        for id in &config.disabled_aggregates {
            if registry.get(id).is_none() {
                return Err(PgAggregatesError::UnknownSpec(id.clone()));
            }
        }
        registry.retain(|spec| !config.disabled_aggregates.contains(&spec.id));
        Ok(registry)
    }
}
