//! Deterministic naming of generated types, fields and enum values.
//!
//! Names are a pure function of their inputs. The default scheme uses
//! `UpperCamelCase` for types, `camelCase` for fields and `CONSTANT_CASE`
//! for enum values; no pluralization or singularization is applied.

use crate::aggregate::ordering::SortDirection;
use crate::catalog::{Relation, Table};

/// Produces external names for the generated surface.
pub trait NameGenerator: Send + Sync {
    /// e.g. `OrdersSumAggregates`
    fn aggregate_type(&self, table: &Table, spec_id: &str) -> String;
    /// e.g. `OrdersHavingSumInput`
    fn having_filter_type(&self, table: &Table, spec_id: &str) -> String;
    /// e.g. `OrdersHavingInput`
    fn having_input_type(&self, table: &Table) -> String;
    /// e.g. `OrdersAggregateRowFilter`
    fn row_filter_type(&self, table: &Table) -> String;
    /// e.g. `OCCURRED_AT_TRUNCATED_TO_MONTH`
    fn group_by_key(&self, table: &Table, column: &str, spec_id: Option<&str>) -> String;
    /// e.g. `ordersAggregates`
    fn relation_filter_field(&self, table: &Table, relation: &Relation) -> String;
    /// e.g. `CustomerOrdersAggregatesFilter`
    fn relation_filter_type(&self, table: &Table, relation: &Relation) -> String;
    /// e.g. `ORDERS_COUNT_ASC`
    fn order_by_related_count(
        &self,
        table: &Table,
        relation: &Relation,
        direction: SortDirection,
    ) -> String;
    /// e.g. `ORDERS_SUM_AMOUNT_DESC`
    fn order_by_related_aggregate(
        &self,
        table: &Table,
        relation: &Relation,
        spec_id: &str,
        column: &str,
        direction: SortDirection,
    ) -> String;
}

/// The default naming scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNames;

impl NameGenerator for DefaultNames {
    fn aggregate_type(&self, table: &Table, spec_id: &str) -> String {
        format!(
            "{}{}Aggregates",
            upper_camel_case(&table.name),
            upper_camel_case(spec_id)
        )
    }

    fn having_filter_type(&self, table: &Table, spec_id: &str) -> String {
        format!(
            "{}Having{}Input",
            upper_camel_case(&table.name),
            upper_camel_case(spec_id)
        )
    }

    fn having_input_type(&self, table: &Table) -> String {
        format!("{}HavingInput", upper_camel_case(&table.name))
    }

    fn row_filter_type(&self, table: &Table) -> String {
        format!("{}AggregateRowFilter", upper_camel_case(&table.name))
    }

    fn group_by_key(&self, _table: &Table, column: &str, spec_id: Option<&str>) -> String {
        match spec_id {
            Some(id) => format!("{}_{}", constant_case(column), constant_case(id)),
            None => constant_case(column),
        }
    }

    fn relation_filter_field(&self, _table: &Table, relation: &Relation) -> String {
        format!("{}Aggregates", camel_case(&relation.name))
    }

    fn relation_filter_type(&self, table: &Table, relation: &Relation) -> String {
        format!(
            "{}{}AggregatesFilter",
            upper_camel_case(&table.name),
            upper_camel_case(&relation.name)
        )
    }

    fn order_by_related_count(
        &self,
        _table: &Table,
        relation: &Relation,
        direction: SortDirection,
    ) -> String {
        format!("{}_COUNT_{}", constant_case(&relation.name), direction.as_str())
    }

    fn order_by_related_aggregate(
        &self,
        _table: &Table,
        relation: &Relation,
        spec_id: &str,
        column: &str,
        direction: SortDirection,
    ) -> String {
        format!(
            "{}_{}_{}_{}",
            constant_case(&relation.name),
            constant_case(spec_id),
            constant_case(column),
            direction.as_str()
        )
    }
}

/// Split a name into lowercase words at separators and camelCase humps.
pub fn words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower_or_digit = false;
    for c in name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower_or_digit = false;
            continue;
        }
        if c.is_uppercase() && prev_lower_or_digit && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower_or_digit = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn upper_camel_case(name: &str) -> String {
    words(name).iter().map(|w| capitalize(w)).collect()
}

pub fn camel_case(name: &str) -> String {
    let mut out = String::new();
    for (i, w) in words(name).iter().enumerate() {
        if i == 0 {
            out.push_str(w);
        } else {
            out.push_str(&capitalize(w));
        }
    }
    out
}

pub fn constant_case(name: &str) -> String {
    words(name)
        .iter()
        .map(|w| w.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}
