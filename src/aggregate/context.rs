//! Per-request composition context.
//!
//! A `ComposeContext` is created for one composition (one parent query) and
//! hands out fresh subquery aliases. It is never shared between requests.

use crate::config::AggregatesConfig;

/// PostgreSQL truncates identifiers longer than this many bytes.
const MAX_IDENTIFIER_LEN: usize = 63;

const DEFAULT_ALIAS_PREFIX: &str = "__agg";

/// Mutable state of one composition.
#[derive(Debug, Clone)]
pub struct ComposeContext {
    alias_prefix: String,
    alias_counter: usize,
}

impl ComposeContext {
    pub fn new(config: &AggregatesConfig) -> Self {
        ComposeContext {
            alias_prefix: config.alias_prefix.clone(),
            alias_counter: 0,
        }
    }

    /// A context with the default alias prefix, for tests and benches.
    pub fn standalone() -> Self {
        ComposeContext {
            alias_prefix: DEFAULT_ALIAS_PREFIX.to_string(),
            alias_counter: 0,
        }
    }

    /// Generate a unique alias: `<prefix>_<base>_<n>`.
    ///
    /// `base` is reduced to ASCII alphanumerics and underscores and cut so
    /// the alias fits in one PostgreSQL identifier; the counter keeps
    /// truncated aliases distinct.
    pub fn next_alias(&mut self, base: &str) -> String {
        self.alias_counter += 1;
        let suffix = format!("_{}", self.alias_counter);
        let budget = MAX_IDENTIFIER_LEN
            .saturating_sub(self.alias_prefix.len() + 1 + suffix.len());
        let stem: String = base
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .take(budget)
            .collect();
        format!("{}_{stem}{suffix}", self.alias_prefix)
    }

    /// Number of aliases handed out so far.
    pub fn aliases_issued(&self) -> usize {
        self.alias_counter
    }
}
