//! Connector-facing filter tree.
//!
//! [`QueryState`] is everything a connector may look at when serving a
//! query: the target model, the AND-ed conditions, OR groups of
//! independent branches, linked sub-queries, and paging. Connectors walk it
//! with a [`FilterVisitor`] through [`QueryState::query_builder`].

use crate::value::Value;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one query instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(u64);

impl QueryId {
    fn next() -> Self {
        Self(NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Comparison operators a condition can apply to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Is,
    IsNot,
    IsIn,
    IsNotIn,
    Between,
    NotBetween,
    GreaterThan,
    GreaterOrEqual,
    LowerThan,
    LowerOrEqual,
    /// SQL-style pattern: `%` matches any run, `_` one character
    Like,
    /// Operand is a boolean: whether the field must be present
    Exists,
}

impl Operator {
    /// Name of the operator as exposed to connectors.
    pub const fn name(self) -> &'static str {
        match self {
            Operator::Is => "is",
            Operator::IsNot => "isNot",
            Operator::IsIn => "isIn",
            Operator::IsNotIn => "isNotIn",
            Operator::Between => "between",
            Operator::NotBetween => "notBetween",
            Operator::GreaterThan => "greaterThan",
            Operator::GreaterOrEqual => "greaterOrEqual",
            Operator::LowerThan => "lowerThan",
            Operator::LowerOrEqual => "lowerOrEqual",
            Operator::Like => "like",
            Operator::Exists => "exists",
        }
    }

    /// Whether the operand is a list of values rather than a scalar.
    pub const fn takes_list(self) -> bool {
        matches!(
            self,
            Operator::IsIn | Operator::IsNotIn | Operator::Between | Operator::NotBetween
        )
    }
}

/// One `field <operator> value` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// A linked sub-query: `field` must take one of the values `target_field`
/// has in the records matched by `query`.
///
/// Resolving a link is backend work, done inside the connector's complex
/// query resolution.
#[derive(Debug, Clone)]
pub struct Link {
    pub field: String,
    pub target_field: String,
    pub query: QueryState,
}

/// The filter and paging state of one query.
#[derive(Debug, Clone)]
pub struct QueryState {
    id: QueryId,
    model: &'static str,
    conditions: Vec<Condition>,
    or_groups: Vec<Vec<QueryState>>,
    linked: Vec<Link>,
    select: Vec<String>,
    sort: Vec<(String, SortOrder)>,
    skip: Option<u64>,
    limit: Option<u64>,
}

impl QueryState {
    /// Create an empty query targeting `model`.
    pub fn new(model: &'static str) -> Self {
        Self {
            id: QueryId::next(),
            model,
            conditions: Vec::new(),
            or_groups: Vec::new(),
            linked: Vec::new(),
            select: Vec::new(),
            sort: Vec::new(),
            skip: None,
            limit: None,
        }
    }

    pub fn id(&self) -> QueryId {
        self.id
    }

    pub fn model(&self) -> &'static str {
        self.model
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// OR groups; each group is satisfied when any of its branches matches.
    pub fn or_groups(&self) -> &[Vec<QueryState>] {
        &self.or_groups
    }

    pub fn linked(&self) -> &[Link] {
        &self.linked
    }

    /// Does producing records require resolving linked sub-queries first?
    pub fn has_linked_sub_queries(&self) -> bool {
        !self.linked.is_empty()
    }

    /// Fields to keep in projected records; empty keeps all.
    pub fn selected(&self) -> &[String] {
        &self.select
    }

    pub fn sort(&self) -> &[(String, SortOrder)] {
        &self.sort
    }

    pub fn skip(&self) -> Option<u64> {
        self.skip
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn push_condition(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn push_or_group(&mut self, branches: Vec<QueryState>) {
        if !branches.is_empty() {
            self.or_groups.push(branches);
        }
    }

    pub fn push_link(&mut self, link: Link) {
        self.linked.push(link);
    }

    pub fn set_select(&mut self, fields: Vec<String>) {
        self.select = fields;
    }

    pub fn push_sort(&mut self, field: impl Into<String>, order: SortOrder) {
        self.sort.push((field.into(), order));
    }

    pub fn set_skip(&mut self, skip: Option<u64>) {
        self.skip = skip;
    }

    pub fn set_limit(&mut self, limit: Option<u64>) {
        self.limit = limit;
    }

    /// Walk the filter tree, reporting every node to `visitor`.
    ///
    /// Conditions come first, in insertion order, then OR groups, then links.
    /// Branches of an OR group are handed over unvisited; the visitor decides
    /// how to walk them.
    pub fn query_builder<V: FilterVisitor + ?Sized>(&self, visitor: &mut V) {
        for condition in &self.conditions {
            visitor.on_operator(condition);
        }
        for group in &self.or_groups {
            visitor.on_or(group);
        }
        for link in &self.linked {
            visitor.on_linked(link);
        }
    }
}

/// Callbacks a connector implements to translate a [`QueryState`].
pub trait FilterVisitor {
    fn on_operator(&mut self, condition: &Condition);

    fn on_or(&mut self, _branches: &[QueryState]) {}

    fn on_linked(&mut self, _link: &Link) {}
}
