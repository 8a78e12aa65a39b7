//! Conjunctive filter predicates for list calls
//!
//! A [`FilterSet`] is an ordered list of `(field, operator, value)` triples.
//! The remote API may apply filters positionally, so insertion order is kept
//! all the way to the query string.

use crate::error::{ExtractError, Result};
use std::fmt;
use std::str::FromStr;

/// Comparison operators accepted by the list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Gte,
    Lt,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Gte => ">=",
            Operator::Lt => "<",
        }
    }
}

impl FromStr for Operator {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" => Ok(Operator::Eq),
            ">=" => Ok(Operator::Gte),
            "<" => Ok(Operator::Lt),
            other => Err(ExtractError::invalid_filter(format!(
                "unsupported operator '{}' (expected one of =, >=, <)",
                other
            ))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    pub value: String,
}

/// Immutable, ordered conjunction of filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new set with the predicate appended.
    ///
    /// Fails with [`ExtractError::InvalidFilter`] for operators outside
    /// `=`, `>=`, `<` and for an empty field name.
    pub fn filter(&self, field: &str, operator: &str, value: impl Into<String>) -> Result<Self> {
        let operator: Operator = operator.parse()?;
        self.with(field, operator, value)
    }

    /// Typed variant of [`FilterSet::filter`]
    pub fn with(&self, field: &str, operator: Operator, value: impl Into<String>) -> Result<Self> {
        if field.trim().is_empty() {
            return Err(ExtractError::invalid_filter("filter field must not be empty"));
        }

        let mut filters = self.filters.clone();
        filters.push(Filter {
            field: field.to_string(),
            operator,
            value: value.into(),
        });
        Ok(Self { filters })
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    /// Query parameters in the remote API's positional encoding:
    /// `filter[field][n]`, `filter[operator][n]`, `filter[value][n]`.
    pub fn to_query(&self) -> Vec<(String, String)> {
        self.filters
            .iter()
            .enumerate()
            .flat_map(|(n, f)| {
                [
                    (format!("filter[field][{}]", n), f.field.clone()),
                    (format!("filter[operator][{}]", n), f.operator.as_str().to_string()),
                    (format!("filter[value][{}]", n), f.value.clone()),
                ]
            })
            .collect()
    }
}
