//! Error types for pg_aggregates.
//!
//! All errors are represented by [`PgAggregatesError`] and propagated via
//! `Result<T, PgAggregatesError>`.
//!
//! # Error Classification
//!
//! - **Configuration**: duplicate spec ids, unresolvable result types,
//!   invalid settings. Raised while the surface is built; fatal.
//! - **Request**: bad identifiers or filter values met while composing
//!   SQL for a single request.
//! - **Internal**: bugs (e.g. a builder used after it was finalized).
//!
//! Ineligible tables, columns and relations are not errors: they are
//! skipped while the surface is enumerated.

use std::fmt;

/// Primary error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum PgAggregatesError {
    // ── Configuration errors: abort the schema build ───────────────────
    /// A spec id was registered twice in the same registry.
    #[error("duplicate {registry} spec id: {id}")]
    DuplicateSpec { registry: &'static str, id: String },

    /// A spec id named in configuration is not registered.
    #[error("unknown spec id: {0}")]
    UnknownSpec(String),

    /// The result type of an aggregate could not be resolved in the type catalog.
    #[error(
        "aggregate '{aggregate}' over source type '{source_type}' maps to type OID {target_type}, \
         which is not present in the type catalog"
    )]
    UnresolvedType {
        aggregate: String,
        source_type: String,
        target_type: u32,
    },

    /// A having-filter family has no SQL input type.
    #[error("result-type family '{family}' resolves to no SQL input type")]
    NoFilterInputType { family: String },

    /// A configuration value is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Request errors: reject the request ─────────────────────────────
    /// An identifier is empty or contains an embedded terminator.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A filter or query argument cannot be applied.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // ── Internal errors: should not happen ─────────────────────────────
    /// An unexpected internal error. Indicates a bug.
    #[error("internal error: {0}")]
    InternalError(String),
}

/// Classification of an error for callers deciding how to surface it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgAggregatesErrorKind {
    Configuration,
    Request,
    Internal,
}

impl fmt::Display for PgAggregatesErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgAggregatesErrorKind::Configuration => write!(f, "CONFIGURATION"),
            PgAggregatesErrorKind::Request => write!(f, "REQUEST"),
            PgAggregatesErrorKind::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl PgAggregatesError {
    /// Classify the error.
    pub fn kind(&self) -> PgAggregatesErrorKind {
        match self {
            PgAggregatesError::DuplicateSpec { .. }
            | PgAggregatesError::UnknownSpec(_)
            | PgAggregatesError::UnresolvedType { .. }
            | PgAggregatesError::NoFilterInputType { .. }
            | PgAggregatesError::InvalidConfig(_) => PgAggregatesErrorKind::Configuration,

            PgAggregatesError::InvalidIdentifier(_) | PgAggregatesError::InvalidArgument(_) => {
                PgAggregatesErrorKind::Request
            }

            PgAggregatesError::InternalError(_) => PgAggregatesErrorKind::Internal,
        }
    }

    /// Whether the error must abort schema construction.
    pub fn is_fatal(&self) -> bool {
        self.kind() == PgAggregatesErrorKind::Configuration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_fatal() {
        let err = PgAggregatesError::DuplicateSpec {
            registry: "aggregate",
            id: "sum".into(),
        };
        assert_eq!(err.kind(), PgAggregatesErrorKind::Configuration);
        assert!(err.is_fatal());

        let err = PgAggregatesError::NoFilterInputType {
            family: "bigfloat".into(),
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn test_request_errors_are_not_fatal() {
        let err = PgAggregatesError::InvalidIdentifier("a\0b".into());
        assert_eq!(err.kind(), PgAggregatesErrorKind::Request);
        assert!(!err.is_fatal());
        assert!(!PgAggregatesError::InternalError("x".into()).is_fatal());
    }

    #[test]
    fn test_unresolved_type_message_names_aggregate_and_type() {
        let err = PgAggregatesError::UnresolvedType {
            aggregate: "average".into(),
            source_type: "int4".into(),
            target_type: 99999,
        };
        let msg = err.to_string();
        assert!(msg.contains("average"));
        assert!(msg.contains("int4"));
        assert!(msg.contains("99999"));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(PgAggregatesErrorKind::Configuration.to_string(), "CONFIGURATION");
        assert_eq!(PgAggregatesErrorKind::Request.to_string(), "REQUEST");
        assert_eq!(PgAggregatesErrorKind::Internal.to_string(), "INTERNAL");
    }
}
