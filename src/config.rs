//! Build-time configuration for the aggregate surface.
//!
//! Settings are read once before the surface is built and are immutable
//! afterwards. They can be loaded from TOML:
//!
//! ```toml
//! alias_prefix = "__agg"
//! disabled_aggregates = ["varianceSample"]
//! truncation_granularities = ["month", "day"]
//! enable_order_by_aggregates = false
//! ```

use serde::Deserialize;

use crate::error::PgAggregatesError;

/// Granularity of a built-in `date_trunc` group-by spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Year,
    Month,
    Week,
    Day,
    Hour,
}

impl Granularity {
    /// All built-in granularities, coarsest first.
    pub const ALL: [Granularity; 5] = [
        Granularity::Year,
        Granularity::Month,
        Granularity::Week,
        Granularity::Day,
        Granularity::Hour,
    ];

    /// The `date_trunc` field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Year => "year",
            Granularity::Month => "month",
            Granularity::Week => "week",
            Granularity::Day => "day",
            Granularity::Hour => "hour",
        }
    }

    /// Stable id of the group-by spec for this granularity.
    pub fn spec_id(&self) -> &'static str {
        match self {
            Granularity::Year => "truncated-to-year",
            Granularity::Month => "truncated-to-month",
            Granularity::Week => "truncated-to-week",
            Granularity::Day => "truncated-to-day",
            Granularity::Hour => "truncated-to-hour",
        }
    }
}

/// Settings controlling which parts of the aggregate surface are generated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregatesConfig {
    /// Prefix of fresh subquery aliases (`<prefix>_<table>_<n>`).
    pub alias_prefix: String,
    /// Aggregate spec ids removed from the default registry.
    pub disabled_aggregates: Vec<String>,
    /// Built-in truncation group-by specs to offer.
    pub truncation_granularities: Vec<Granularity>,
    pub enable_grouped_aggregates: bool,
    pub enable_having: bool,
    pub enable_relation_filters: bool,
    pub enable_order_by_aggregates: bool,
}

impl Default for AggregatesConfig {
    fn default() -> Self {
        AggregatesConfig {
            alias_prefix: "__agg".to_string(),
            disabled_aggregates: Vec::new(),
            truncation_granularities: Granularity::ALL.to_vec(),
            enable_grouped_aggregates: true,
            enable_having: true,
            enable_relation_filters: true,
            enable_order_by_aggregates: true,
        }
    }
}

/// Longest alias prefix accepted; leaves room for the table stem and counter
/// within PostgreSQL's 63-byte identifier limit.
const MAX_ALIAS_PREFIX_LEN: usize = 16;

impl AggregatesConfig {
    /// Parse and validate settings from a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, PgAggregatesError> {
        let config: AggregatesConfig =
            toml::from_str(input).map_err(|e| PgAggregatesError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), PgAggregatesError> {
        let prefix = &self.alias_prefix;
        if prefix.is_empty() || prefix.len() > MAX_ALIAS_PREFIX_LEN {
            return Err(PgAggregatesError::InvalidConfig(format!(
                "alias_prefix must be 1..={MAX_ALIAS_PREFIX_LEN} characters, got {prefix:?}"
            )));
        }
        if !prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(PgAggregatesError::InvalidConfig(format!(
                "alias_prefix may only contain ASCII letters, digits and '_', got {prefix:?}"
            )));
        }
        for (i, g) in self.truncation_granularities.iter().enumerate() {
            if self.truncation_granularities[..i].contains(g) {
                return Err(PgAggregatesError::InvalidConfig(format!(
                    "truncation granularity '{}' listed twice",
                    g.as_str()
                )));
            }
        }
        Ok(())
    }
}
