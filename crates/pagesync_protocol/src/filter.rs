//! Batch filters for discovery queries.
//!
//! A `BatchFilter` accumulates typed clauses between sync passes and renders
//! them into a `FilterPayload` that transports translate into their own
//! request format.
//!
//! Clauses occupy named slots. Re-adding a clause for an occupied slot
//! replaces it in place, so an advancing sync window keeps a single
//! `updated_at from` clause instead of stacking one per window.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;

/// Default format used to render date clauses (`Y-m-d H:i:s`).
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Which end of a date range a clause bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateBound {
    /// Inclusive lower bound.
    From,
    /// Upper bound.
    To,
}

impl DateBound {
    /// Returns the operator keyword used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            DateBound::From => "from",
            DateBound::To => "to",
        }
    }
}

impl fmt::Display for DateBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The condition a clause places on its field.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Field equals the value.
    Equals(String),
    /// Field is bounded by a date.
    Date {
        /// Bound kind.
        bound: DateBound,
        /// Bound value.
        at: DateTime<Utc>,
        /// `chrono` format string used when rendering.
        format: String,
    },
    /// Field is one of the values.
    In(Vec<String>),
}

/// Presentation group of a clause in the rendered payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterGroup {
    /// Range and set clauses.
    Complex,
    /// Equality clauses.
    Simple,
}

/// A single filter clause.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    /// Filtered field name.
    pub field: String,
    /// Condition on the field.
    pub value: FilterValue,
}

impl FilterClause {
    /// Returns the slot this clause occupies in a `BatchFilter`.
    pub fn slot(&self) -> Cow<'_, str> {
        match &self.value {
            FilterValue::Date { bound, .. } => Cow::Owned(format!("{}-{}", self.field, bound)),
            _ => Cow::Borrowed(&self.field),
        }
    }

    /// Returns the presentation group of this clause.
    pub fn group(&self) -> FilterGroup {
        match self.value {
            FilterValue::Equals(_) => FilterGroup::Simple,
            FilterValue::Date { .. } | FilterValue::In(_) => FilterGroup::Complex,
        }
    }

    /// Returns the operator keyword of this clause.
    pub fn operator(&self) -> &'static str {
        match &self.value {
            FilterValue::Equals(_) => "=",
            FilterValue::Date { bound, .. } => bound.as_str(),
            FilterValue::In(_) => "in",
        }
    }

    /// Returns the rendered clause value.
    pub fn rendered_value(&self) -> String {
        match &self.value {
            FilterValue::Equals(v) => v.clone(),
            FilterValue::Date { at, format, .. } => at.format(format).to_string(),
            FilterValue::In(values) => values.join(","),
        }
    }

    /// Returns a one-line human readable form, e.g. `created_at from 2024-01-01 00:00:00`.
    pub fn describe(&self) -> String {
        format!("{} {} {}", self.field, self.operator(), self.rendered_value())
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireValue {
    Scalar(String),
    Keyed { key: &'static str, value: String },
}

#[derive(Serialize)]
struct WireClause<'a> {
    key: &'a str,
    value: WireValue,
}

impl Serialize for FilterClause {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = match self.group() {
            FilterGroup::Simple => WireValue::Scalar(self.rendered_value()),
            FilterGroup::Complex => WireValue::Keyed {
                key: self.operator(),
                value: self.rendered_value(),
            },
        };
        WireClause {
            key: &self.field,
            value,
        }
        .serialize(serializer)
    }
}

/// Accumulates filter clauses for discovery queries.
#[derive(Debug, Clone, Default)]
pub struct BatchFilter {
    clauses: Vec<FilterClause>,
}

impl BatchFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a date bound on `field`, rendered with `format`.
    pub fn add_date_filter(
        &mut self,
        field: impl Into<String>,
        bound: DateBound,
        at: DateTime<Utc>,
        format: impl Into<String>,
    ) {
        self.put(FilterClause {
            field: field.into(),
            value: FilterValue::Date {
                bound,
                at,
                format: format.into(),
            },
        });
    }

    /// Adds a set-membership clause on `field`.
    pub fn add_set_filter<I, V>(&mut self, field: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.put(FilterClause {
            field: field.into(),
            value: FilterValue::In(values.into_iter().map(|v| v.to_string()).collect()),
        });
    }

    /// Adds an equality clause on `field`.
    pub fn add_equality_filter(&mut self, field: impl Into<String>, value: impl ToString) {
        self.put(FilterClause {
            field: field.into(),
            value: FilterValue::Equals(value.to_string()),
        });
    }

    /// Restricts results to the given websites.
    pub fn add_website_filter(&mut self, website_ids: &[i64]) {
        self.add_set_filter("website_id", website_ids);
    }

    /// Restricts results to the given stores.
    pub fn add_store_filter(&mut self, store_ids: &[i64]) {
        self.add_set_filter("store_id", store_ids);
    }

    /// Removes all clauses.
    pub fn reset(&mut self) {
        self.clauses.clear();
    }

    /// Returns true if no clause has been added.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Returns the number of clauses.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Returns the clauses in insertion order.
    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    /// Renders the accumulated clauses.
    pub fn render(&self) -> FilterPayload {
        let (complex, simple): (Vec<_>, Vec<_>) = self
            .clauses
            .iter()
            .cloned()
            .partition(|c| c.group() == FilterGroup::Complex);
        FilterPayload {
            filters: FilterGroups { complex, simple },
        }
    }

    fn put(&mut self, clause: FilterClause) {
        match self.clauses.iter_mut().find(|c| c.slot() == clause.slot()) {
            Some(existing) => *existing = clause,
            None => self.clauses.push(clause),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
struct FilterGroups {
    #[serde(rename = "complex_filter")]
    complex: Vec<FilterClause>,
    #[serde(rename = "filter")]
    simple: Vec<FilterClause>,
}

/// A rendered filter, ready to be handed to a transport.
///
/// Serializes as `{"filters":{"complex_filter":[..],"filter":[..]}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterPayload {
    filters: FilterGroups,
}

impl FilterPayload {
    /// Returns the clauses of one presentation group.
    pub fn group(&self, group: FilterGroup) -> &[FilterClause] {
        match group {
            FilterGroup::Complex => &self.filters.complex,
            FilterGroup::Simple => &self.filters.simple,
        }
    }

    /// Iterates over all clauses, complex first.
    pub fn clauses(&self) -> impl Iterator<Item = &FilterClause> {
        self.filters.complex.iter().chain(self.filters.simple.iter())
    }

    /// Finds the clause filtering `field`, if any.
    pub fn find(&self, field: &str) -> Option<&FilterClause> {
        self.clauses().find(|c| c.field == field)
    }

    /// Returns true if the payload has no clauses.
    pub fn is_empty(&self) -> bool {
        self.filters.complex.is_empty() && self.filters.simple.is_empty()
    }

    /// Returns one descriptive line per clause.
    pub fn describe(&self) -> Vec<String> {
        self.clauses().map(FilterClause::describe).collect()
    }
}
