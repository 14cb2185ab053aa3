//! Ancestor-scoped, conjunctive equality queries.
//!
//! A [`Query`] optionally restricts results to one kind and to the
//! descendants of an ancestor key, then narrows them with equality
//! [`Filter`]s. Every filter must hold; there is no disjunction, range or
//! ordering support.

use std::collections::BTreeMap;

use entistore_types::EntityKey;
use serde_json::Value;

use crate::entity::RawEntity;
use crate::error::QueryError;

/// Field-to-value equality conditions, combined with logical AND.
pub type Conditions = BTreeMap<String, Value>;

/// A single equality filter.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

/// An executable query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    kind: Option<String>,
    ancestor: Option<EntityKey>,
    filters: Vec<Filter>,
}

impl Query {
    /// Kind restriction, if any.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Ancestor restriction, if any.
    pub fn ancestor(&self) -> Option<&EntityKey> {
        self.ancestor.as_ref()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Returns `true` if the query has no equality filters.
    pub fn is_unfiltered(&self) -> bool {
        self.filters.is_empty()
    }

    /// Returns `true` if `entity` satisfies every restriction of this query.
    pub fn matches(&self, entity: &RawEntity) -> bool {
        if let Some(ref kind) = self.kind {
            if entity.kind() != kind {
                return false;
            }
        }
        if let Some(ref ancestor) = self.ancestor {
            if !entity.key.has_ancestor(ancestor) {
                return false;
            }
        }
        self.filters
            .iter()
            .all(|filter| entity.property_matches(&filter.field, &filter.value))
    }
}

/// Builds a [`Query`] one restriction at a time.
///
/// Filter expressions are a field name, optionally followed by `=` or `==`
/// (`"category"`, `"category ="`). Any other operator is rejected.
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Start a query over records of `kind`.
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            query: Query {
                kind: Some(kind.into()),
                ..Query::default()
            },
        }
    }

    /// Start a query over records of every kind.
    pub fn kindless() -> Self {
        Self {
            query: Query::default(),
        }
    }

    /// Restrict results to records whose key chain contains `ancestor`.
    pub fn ancestor(mut self, ancestor: EntityKey) -> Self {
        self.query.ancestor = Some(ancestor);
        self
    }

    /// Narrow the query with one equality filter.
    pub fn filter(mut self, expression: &str, value: Value) -> Result<Self, QueryError> {
        let field = parse_filter_field(expression)?;
        self.query.filters.push(Filter { field, value });
        Ok(self)
    }

    /// Narrow the query once per condition. Empty conditions leave it
    /// unfiltered.
    pub fn conditions(self, conditions: &Conditions) -> Result<Self, QueryError> {
        conditions
            .iter()
            .try_fold(self, |builder, (expression, value)| {
                builder.filter(expression, value.clone())
            })
    }

    pub fn build(self) -> Query {
        self.query
    }
}

fn parse_filter_field(expression: &str) -> Result<String, QueryError> {
    let mut parts = expression.split_whitespace();
    let field = parts.next().ok_or(QueryError::EmptyField)?;
    let operator: Vec<&str> = parts.collect();
    match operator.as_slice() {
        [] | ["="] | ["=="] => Ok(field.to_string()),
        other => Err(QueryError::UnsupportedOperator {
            field: field.to_string(),
            operator: other.join(" "),
        }),
    }
}
