//! pg_aggregates: aggregate computation for PostgreSQL query surfaces.
//!
//! Given a catalog snapshot, this crate decides which aggregates, group keys,
//! having filters and ordering keys a table can offer, derives their result
//! types, and composes the SQL to compute them:
//!
//! - per-column aggregates (`sum`, `distinctCount`, `min`, `max`, `average`,
//!   sample/population `stddev` and `variance`);
//! - grouped aggregate queries with identity and `date_trunc` group keys;
//! - having filters over aggregated values;
//! - correlated scalar subqueries filtering or ordering parent rows by
//!   aggregates of a one-to-many child collection.
//!
//! Nothing here executes SQL. Fragments are handed to an external executor.
//!
//! # Phases
//!
//! Rule construction ([`surface::AggregateSurface::build`]) runs once per
//! schema build and produces immutable, shareable descriptors. Composition
//! runs per request with a fresh [`aggregate::context::ComposeContext`].

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fragment;
pub mod inflection;
pub mod surface;

pub use aggregate::SchemaEnv;
pub use aggregate::context::ComposeContext;
pub use aggregate::group_by::{GroupByRegistry, GroupBySpec};
pub use aggregate::spec::{AggregateRegistry, AggregateSpec};
pub use catalog::{Catalog, ColumnCapabilities, DefaultCapabilities};
pub use config::AggregatesConfig;
pub use error::{PgAggregatesError, PgAggregatesErrorKind};
pub use fragment::Fragment;
pub use inflection::{DefaultNames, NameGenerator};
pub use surface::AggregateSurface;
