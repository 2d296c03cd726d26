//! Filter descriptions to parameterized `WHERE` clauses.
//!
//! Filter values only ever travel as positional bind arguments. The one piece
//! of caller-supplied text spliced into SQL is the relation name, which must
//! pass [`RelationName::parse`] first.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::Arguments;
use sqlx::postgres::PgArguments;
use tracing::warn;

use crate::application::repos::RepoError;
use crate::domain::filters::{Availability, CategorySet, normalize_search_text};

static RELATION_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("relation name pattern is valid")
});

/// A relation identifier that is safe to splice into query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationName(String);

impl RelationName {
    /// Accept `raw` if it is a plain or schema-qualified identifier, otherwise
    /// fall back to `default`.
    pub fn parse(raw: &str, default: &'static str) -> Self {
        let trimmed = raw.trim();
        if RELATION_NAME.is_match(trimmed) {
            return Self(trimmed.to_string());
        }
        if !trimmed.is_empty() {
            warn!(
                relation = trimmed,
                fallback = default,
                "Rejected relation name; using default"
            );
        }
        Self(default.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One positional argument of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Float(f64),
    Int(i64),
    Text(String),
    TextArray(Vec<String>),
}

/// Subset of filter fields a predicate is built from.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredicateInput<'a> {
    pub availability: Availability,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub categories: Option<&'a CategorySet>,
    pub query: &'a str,
}

/// Clause text (empty, or starting with ` where `) plus its arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clause: String,
    args: Vec<BindValue>,
}

impl Predicate {
    pub fn build(input: PredicateInput<'_>) -> Self {
        let mut clauses: Vec<String> = Vec::with_capacity(6);
        let mut args: Vec<BindValue> = Vec::with_capacity(6);

        match input.availability {
            Availability::Available => clauses.push("is_available = true".to_string()),
            Availability::Preorder => clauses.push("is_preorder = true".to_string()),
            Availability::Any => {}
        }

        if let Some(min) = input.min_price {
            args.push(BindValue::Float(min));
            clauses.push(format!("latest_price >= ${}", args.len()));
        }
        if let Some(max) = input.max_price {
            args.push(BindValue::Float(max));
            clauses.push(format!("latest_price <= ${}", args.len()));
        }

        if let Some(categories) = input.categories.filter(|set| !set.is_empty()) {
            args.push(BindValue::TextArray(categories.to_vec()));
            clauses.push(format!("category_tags && ${}::text[]", args.len()));
        }

        let query = normalize_search_text(input.query);
        if !query.is_empty() {
            args.push(BindValue::Text(format!("%{query}%")));
            let n = args.len();
            clauses.push(format!(
                "(product_name_search ilike ${n} or product_code ilike ${n})"
            ));
        }

        let clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" where {}", clauses.join(" and "))
        };
        Self { clause, args }
    }

    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn args(&self) -> &[BindValue] {
        &self.args
    }

    /// Placeholder number the next appended argument will take.
    pub fn next_placeholder(&self) -> usize {
        self.args.len() + 1
    }

    /// Bind the predicate arguments followed by `extra`.
    pub fn arguments(&self, extra: &[BindValue]) -> Result<PgArguments, RepoError> {
        let mut arguments = PgArguments::default();
        for value in self.args.iter().chain(extra) {
            let added = match value {
                BindValue::Float(value) => arguments.add(*value),
                BindValue::Int(value) => arguments.add(*value),
                BindValue::Text(value) => arguments.add(value.clone()),
                BindValue::TextArray(value) => arguments.add(value.clone()),
            };
            added.map_err(|err| RepoError::InvalidInput {
                message: format!("failed to bind query argument: {err}"),
            })?;
        }
        Ok(arguments)
    }
}
