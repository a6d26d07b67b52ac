//
// Copyright (c) 2024 Nathan Fiedler
//
use crate::domain::criteria::{Direction, Operator, Predicate, Visibility};
use serde_json::Value;

///
/// How a clause joins the clauses preceding it.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boolean {
    And,
    Or,
}

///
/// A node of the predicate tree.
///
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Compare {
        field: String,
        operator: Operator,
        value: Value,
    },
    Null(String),
    NotNull(String),
    /// Parenthesized group of clauses.
    Nested(Vec<Clause>),
}

///
/// A condition and the boolean connecting it to its predecessor. The
/// boolean of the first clause in a list is ignored.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Clause {
    pub boolean: Boolean,
    pub condition: Condition,
}

///
/// Mutable query handle for a single table, obtained fresh from the data
/// source for every terminal operation.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    table: String,
    deleted_at: Option<String>,
    visibility: Visibility,
    clauses: Vec<Clause>,
    offset: Option<u64>,
    limit: Option<u64>,
    orders: Vec<(String, Direction)>,
}

impl Query {
    pub fn new<T: Into<String>>(table: T) -> Self {
        Self {
            table: table.into(),
            deleted_at: None,
            visibility: Visibility::default(),
            clauses: Vec::new(),
            offset: None,
            limit: None,
            orders: Vec::new(),
        }
    }

    /// Name the column whose non-null value marks a row as soft-deleted.
    pub fn soft_deletes<C: Into<String>>(mut self, column: C) -> Self {
        self.deleted_at = Some(column.into());
        self
    }

    pub fn with_trashed(&mut self) -> &mut Self {
        self.visibility = Visibility::WithTrashed;
        self
    }

    pub fn only_trashed(&mut self) -> &mut Self {
        self.visibility = Visibility::OnlyTrashed;
        self
    }

    pub fn and_where(&mut self, predicate: &Predicate) -> &mut Self {
        self.push_predicate(Boolean::And, predicate)
    }

    pub fn or_where(&mut self, predicate: &Predicate) -> &mut Self {
        self.push_predicate(Boolean::Or, predicate)
    }

    pub fn where_null<F: Into<String>>(&mut self, field: F) -> &mut Self {
        self.push(Boolean::And, Condition::Null(field.into()))
    }

    pub fn or_where_null<F: Into<String>>(&mut self, field: F) -> &mut Self {
        self.push(Boolean::Or, Condition::Null(field.into()))
    }

    pub fn where_not_null<F: Into<String>>(&mut self, field: F) -> &mut Self {
        self.push(Boolean::And, Condition::NotNull(field.into()))
    }

    pub fn or_where_not_null<F: Into<String>>(&mut self, field: F) -> &mut Self {
        self.push(Boolean::Or, Condition::NotNull(field.into()))
    }

    ///
    /// Add a parenthesized group built by the given closure. Empty groups
    /// are discarded.
    ///
    pub fn where_nested<F>(&mut self, boolean: Boolean, build: F) -> &mut Self
    where
        F: FnOnce(&mut Query),
    {
        let mut group = Query::new(self.table.clone());
        build(&mut group);
        if group.clauses.is_empty() {
            self
        } else {
            self.push(boolean, Condition::Nested(group.clauses))
        }
    }

    pub fn skip(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    pub fn take(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn order_by<F: Into<String>>(&mut self, field: F, direction: Direction) -> &mut Self {
        self.orders.push((field.into(), direction));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn deleted_at_column(&self) -> Option<&str> {
        self.deleted_at.as_deref()
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn orders(&self) -> &[(String, Direction)] {
        &self.orders
    }

    // An empty mapping contributes no condition, like an empty nested group.
    fn push_predicate(&mut self, boolean: Boolean, predicate: &Predicate) -> &mut Self {
        match predicate {
            Predicate::AllEqual(pairs) if pairs.is_empty() => self,
            _ => self.push(boolean, predicate_condition(predicate)),
        }
    }

    fn push(&mut self, boolean: Boolean, condition: Condition) -> &mut Self {
        self.clauses.push(Clause { boolean, condition });
        self
    }
}

// Field predicates map to a single comparison, mappings to a nested group of
// equality conjunctions.
fn predicate_condition(predicate: &Predicate) -> Condition {
    match predicate {
        Predicate::Field {
            field,
            operator,
            value,
        } => Condition::Compare {
            field: field.clone(),
            operator: *operator,
            value: value.clone(),
        },
        Predicate::AllEqual(pairs) => Condition::Nested(
            pairs
                .iter()
                .map(|(field, value)| Clause {
                    boolean: Boolean::And,
                    condition: Condition::Compare {
                        field: field.clone(),
                        operator: Operator::Eq,
                        value: value.clone(),
                    },
                })
                .collect(),
        ),
    }
}
