//! Correlated aggregate-condition builder.
//!
//! Filtering a parent row by properties of its child collection needs a
//! boolean computed over an aggregate of the children. The builder is a
//! two-level accumulator:
//!
//! - **row scope**: ordinary boolean conditions on the child rows
//!   (including the correlation to the parent), rendered as `WHERE`;
//! - **aggregate scopes**: one per aggregate spec in use, holding
//!   comparisons whose operands are already wrapped in the aggregate.
//!   They are folded into the single projected boolean.
//!
//! ```text
//! (SELECT <AND of aggregate scopes> FROM <child> AS <alias>
//!  [WHERE <AND of row conditions>] GROUP BY ())
//! ```
//!
//! The empty grouping set is always present, whatever was contributed, so
//! the subquery yields exactly one row even when no child row matches. Each
//! builder owns its scopes; `finalize` renders bottom-up exactly once and
//! later calls return the same fragment.

use crate::aggregate::context::ComposeContext;
use crate::aggregate::spec::AggregateSpec;
use crate::catalog::{Catalog, Relation};
use crate::error::PgAggregatesError;
use crate::fragment::{BinaryOperator, Fragment, Select, SelectItem, join_and};

/// `alias.remote = parent.local` for every column pair of a relation.
pub fn correlation_conditions(
    relation: &Relation,
    parent_alias: &str,
    child_alias: &str,
) -> Result<Vec<Fragment>, PgAggregatesError> {
    if relation.local_columns.len() != relation.remote_columns.len() {
        return Err(PgAggregatesError::InternalError(format!(
            "relation {} pairs {} local with {} remote columns",
            relation.name,
            relation.local_columns.len(),
            relation.remote_columns.len()
        )));
    }
    relation
        .remote_columns
        .iter()
        .zip(&relation.local_columns)
        .map(|(remote, local)| {
            Ok(Fragment::binary_op(
                Fragment::qualified(&[child_alias, remote.as_str()])?,
                BinaryOperator::Eq,
                Fragment::qualified(&[parent_alias, local.as_str()])?,
            ))
        })
        .collect()
}

/// Comparisons over one aggregate spec.
#[derive(Debug, Clone)]
pub struct AggregateScope {
    spec: AggregateSpec,
    alias: String,
    conditions: Vec<Fragment>,
}

impl AggregateScope {
    pub fn spec(&self) -> &AggregateSpec {
        &self.spec
    }

    /// `spec.wrap(alias.column)`.
    pub fn aggregate_column(&self, column: &str) -> Result<Fragment, PgAggregatesError> {
        Ok(self
            .spec
            .wrap_sql(Fragment::qualified(&[self.alias.as_str(), column])?))
    }

    /// Add a comparison over aggregated operands.
    pub fn add_condition(&mut self, condition: Fragment) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[Fragment] {
        &self.conditions
    }

    fn finalize(&self) -> Fragment {
        join_and(self.conditions.clone())
    }
}

/// Accumulates the conditions of one correlated aggregate subquery.
#[derive(Debug, Clone)]
pub struct AggregateConditionBuilder {
    from: Fragment,
    alias: String,
    row_conditions: Vec<Fragment>,
    scopes: Vec<AggregateScope>,
    finalized: Option<Fragment>,
}

impl AggregateConditionBuilder {
    /// A builder over `from AS alias` with no conditions.
    pub fn new(from: Fragment, alias: String) -> Self {
        AggregateConditionBuilder {
            from,
            alias,
            row_conditions: Vec::new(),
            scopes: Vec::new(),
            finalized: None,
        }
    }

    /// A builder over the child table of a one-to-many relation, under a
    /// fresh alias, with the correlation to `parent_alias` already added as
    /// row conditions.
    pub fn for_relation(
        ctx: &mut ComposeContext,
        catalog: &Catalog,
        relation: &Relation,
        parent_alias: &str,
    ) -> Result<Self, PgAggregatesError> {
        let remote = catalog.remote_table(relation).ok_or_else(|| {
            PgAggregatesError::InvalidArgument(format!(
                "relation {} points at unknown table {}.{}",
                relation.name, relation.remote_schema, relation.remote_table
            ))
        })?;
        let alias = ctx.next_alias(&remote.name);
        let mut builder = AggregateConditionBuilder::new(remote.sql_name()?, alias);
        for condition in correlation_conditions(relation, parent_alias, &builder.alias)? {
            builder.add_row_condition(condition)?;
        }
        Ok(builder)
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    fn ensure_open(&self) -> Result<(), PgAggregatesError> {
        if self.finalized.is_some() {
            return Err(PgAggregatesError::InternalError(format!(
                "aggregate condition over {} is already finalized",
                self.alias
            )));
        }
        Ok(())
    }

    /// Add a Level-1 condition on the child rows.
    pub fn add_row_condition(&mut self, condition: Fragment) -> Result<(), PgAggregatesError> {
        self.ensure_open()?;
        self.row_conditions.push(condition);
        Ok(())
    }

    /// The Level-2 scope for `spec`, created on first use. Scopes keep the
    /// order in which they were first requested.
    pub fn scope(&mut self, spec: &AggregateSpec) -> Result<&mut AggregateScope, PgAggregatesError> {
        self.ensure_open()?;
        let index = match self.scopes.iter().position(|s| s.spec.id == spec.id) {
            Some(index) => index,
            None => {
                self.scopes.push(AggregateScope {
                    spec: spec.clone(),
                    alias: self.alias.clone(),
                    conditions: Vec::new(),
                });
                self.scopes.len() - 1
            }
        };
        Ok(&mut self.scopes[index])
    }

    /// Render the scalar boolean subquery.
    pub fn finalize(&mut self) -> Result<Fragment, PgAggregatesError> {
        if let Some(done) = &self.finalized {
            return Ok(done.clone());
        }
        let projected = join_and(self.scopes.iter().map(AggregateScope::finalize).collect());
        let mut select = Select::new(self.from.clone(), &self.alias)?;
        select.projection.push(SelectItem {
            expr: projected,
            alias: None,
        });
        if !self.row_conditions.is_empty() {
            select.where_clause = Some(join_and(self.row_conditions.clone()));
        }
        select.group_by_empty_set = true;

        let fragment = Fragment::subquery(select);
        self.finalized = Some(fragment.clone());
        Ok(fragment)
    }
}
