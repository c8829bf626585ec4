//! SQL fragment builder.
//!
//! A [`Fragment`] is an immutable piece of PostgreSQL SQL represented as a
//! small expression tree. Fragments are composed by value: every
//! constructor takes its operands and returns a new fragment, so an operand
//! can be reused in any number of parents without being changed.
//!
//! Rendering (`to_sql` / `Display`) quotes every identifier, escapes every
//! string literal and parenthesizes every binary operation and junction, so
//! nested fragments never depend on operator precedence.

use std::fmt;

use crate::error::PgAggregatesError;

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quote a string literal, doubling embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A literal value embedded in SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// A string literal cast to a named type: `'value'::type_name`.
    Typed { value: String, type_name: String },
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
}

impl BinaryOperator {
    pub fn sql(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "<>",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JunctionKind {
    And,
    Or,
}

/// An immutable, composable SQL fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// A possibly qualified identifier; parts are stored unquoted.
    Identifier(Vec<String>),
    Literal(SqlValue),
    /// A function call: `func(args...)` or `func(DISTINCT args...)`.
    Call {
        func_name: String,
        args: Vec<Fragment>,
        distinct: bool,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<Fragment>,
        right: Box<Fragment>,
    },
    /// Two or more operands joined by AND / OR.
    Junction {
        kind: JunctionKind,
        parts: Vec<Fragment>,
    },
    /// A parenthesized scalar subquery.
    Subquery(Box<Select>),
    /// `*`, only meaningful as a `count(*)` argument.
    Star,
    /// Trusted SQL text supplied by the caller.
    Raw(String),
}

fn check_identifier_part(part: &str) -> Result<(), PgAggregatesError> {
    if part.is_empty() || part.contains('\0') {
        return Err(PgAggregatesError::InvalidIdentifier(part.to_string()));
    }
    Ok(())
}

impl Fragment {
    /// An unqualified identifier.
    pub fn identifier(name: &str) -> Result<Fragment, PgAggregatesError> {
        check_identifier_part(name)?;
        Ok(Fragment::Identifier(vec![name.to_string()]))
    }

    /// A dotted identifier such as `schema.table` or `alias.column`.
    pub fn qualified(parts: &[&str]) -> Result<Fragment, PgAggregatesError> {
        if parts.is_empty() {
            return Err(PgAggregatesError::InvalidIdentifier(String::new()));
        }
        for part in parts {
            check_identifier_part(part)?;
        }
        Ok(Fragment::Identifier(
            parts.iter().map(|p| p.to_string()).collect(),
        ))
    }

    pub fn literal(value: SqlValue) -> Fragment {
        Fragment::Literal(value)
    }

    /// The boolean-true fragment.
    pub fn true_() -> Fragment {
        Fragment::Literal(SqlValue::Bool(true))
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Fragment::Literal(SqlValue::Bool(true)))
    }

    pub fn call(func_name: &str, args: Vec<Fragment>) -> Fragment {
        Fragment::Call {
            func_name: func_name.to_string(),
            args,
            distinct: false,
        }
    }

    pub fn call_distinct(func_name: &str, args: Vec<Fragment>) -> Fragment {
        Fragment::Call {
            func_name: func_name.to_string(),
            args,
            distinct: true,
        }
    }

    pub fn binary_op(left: Fragment, op: BinaryOperator, right: Fragment) -> Fragment {
        Fragment::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn subquery(select: Select) -> Fragment {
        Fragment::Subquery(Box::new(select))
    }

    /// Convert the fragment to SQL text.
    pub fn to_sql(&self) -> String {
        match self {
            Fragment::Identifier(parts) => parts
                .iter()
                .map(|p| quote_ident(p))
                .collect::<Vec<_>>()
                .join("."),
            Fragment::Literal(value) => literal_sql(value),
            Fragment::Call {
                func_name,
                args,
                distinct,
            } => {
                let arg_strs: Vec<String> = args.iter().map(|a| a.to_sql()).collect();
                if *distinct {
                    format!("{func_name}(DISTINCT {})", arg_strs.join(", "))
                } else {
                    format!("{func_name}({})", arg_strs.join(", "))
                }
            }
            Fragment::BinaryOp { op, left, right } => {
                format!("({} {} {})", left.to_sql(), op.sql(), right.to_sql())
            }
            Fragment::Junction { kind, parts } => {
                let sep = match kind {
                    JunctionKind::And => " AND ",
                    JunctionKind::Or => " OR ",
                };
                let part_strs: Vec<String> = parts.iter().map(|p| p.to_sql()).collect();
                format!("({})", part_strs.join(sep))
            }
            Fragment::Subquery(select) => format!("({})", select.to_sql()),
            Fragment::Star => "*".to_string(),
            Fragment::Raw(sql) => sql.clone(),
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

fn literal_sql(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(true) => "TRUE".to_string(),
        SqlValue::Bool(false) => "FALSE".to_string(),
        SqlValue::Int(n) => n.to_string(),
        SqlValue::Float(f) if f.is_nan() => "'NaN'::float8".to_string(),
        SqlValue::Float(f) if f.is_infinite() => {
            if *f > 0.0 {
                "'Infinity'::float8".to_string()
            } else {
                "'-Infinity'::float8".to_string()
            }
        }
        // `{:?}` keeps a decimal point or exponent, so PostgreSQL never
        // reads the value back as an integer.
        SqlValue::Float(f) => format!("{f:?}"),
        SqlValue::Text(s) => quote_literal(s),
        SqlValue::Typed { value, type_name } => format!("{}::{type_name}", quote_literal(value)),
    }
}

/// AND all fragments together.
///
/// Boolean-true operands are dropped; no remaining operands yields the
/// boolean-true fragment and a single one is returned as is.
pub fn join_and(fragments: Vec<Fragment>) -> Fragment {
    let mut parts: Vec<Fragment> = fragments.into_iter().filter(|f| !f.is_true()).collect();
    match parts.len() {
        0 => Fragment::true_(),
        1 => parts.remove(0),
        _ => Fragment::Junction {
            kind: JunctionKind::And,
            parts,
        },
    }
}

/// OR all fragments together.
///
/// An empty input and any boolean-true operand both yield boolean-true.
pub fn join_or(mut fragments: Vec<Fragment>) -> Fragment {
    if fragments.is_empty() || fragments.iter().any(|f| f.is_true()) {
        return Fragment::true_();
    }
    if fragments.len() == 1 {
        return fragments.remove(0);
    }
    Fragment::Junction {
        kind: JunctionKind::Or,
        parts: fragments,
    }
}

/// One projected expression with an optional output alias.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Fragment,
    pub alias: Option<String>,
}

/// A single-table SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub projection: Vec<SelectItem>,
    /// Table reference, usually a qualified identifier.
    pub from: Fragment,
    pub from_alias: String,
    pub where_clause: Option<Fragment>,
    pub group_by: Vec<Fragment>,
    /// Render `GROUP BY ()` when `group_by` is empty, so the statement
    /// yields exactly one row even over zero input rows.
    pub group_by_empty_set: bool,
    pub having: Option<Fragment>,
}

impl Select {
    pub fn new(from: Fragment, from_alias: &str) -> Result<Self, PgAggregatesError> {
        check_identifier_part(from_alias)?;
        Ok(Select {
            projection: Vec::new(),
            from,
            from_alias: from_alias.to_string(),
            where_clause: None,
            group_by: Vec::new(),
            group_by_empty_set: false,
            having: None,
        })
    }

    pub fn to_sql(&self) -> String {
        let projection = if self.projection.is_empty() {
            "TRUE".to_string()
        } else {
            self.projection
                .iter()
                .map(|item| match &item.alias {
                    Some(alias) => format!("{} AS {}", item.expr.to_sql(), quote_ident(alias)),
                    None => item.expr.to_sql(),
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut sql = format!(
            "SELECT {projection} FROM {} AS {}",
            self.from.to_sql(),
            quote_ident(&self.from_alias)
        );
        if let Some(predicate) = &self.where_clause {
            sql.push_str(&format!(" WHERE {}", predicate.to_sql()));
        }
        if !self.group_by.is_empty() {
            let keys: Vec<String> = self.group_by.iter().map(|g| g.to_sql()).collect();
            sql.push_str(&format!(" GROUP BY {}", keys.join(", ")));
        } else if self.group_by_empty_set {
            sql.push_str(" GROUP BY ()");
        }
        if let Some(predicate) = &self.having {
            sql.push_str(&format!(" HAVING {}", predicate.to_sql()));
        }
        sql
    }
}
