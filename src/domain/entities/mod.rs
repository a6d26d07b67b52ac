//
// Copyright (c) 2024 Nathan Fiedler
//
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

///
/// Attribute values keyed by column name, as supplied to `create` and `update`.
///
pub type Record = Map<String, Value>;

///
/// A single row retrieved from the store.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(flatten)]
    pub attributes: Record,
}

impl Entity {
    /// Return the value of the named attribute, if it was selected.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    /// Return the value of the `id` attribute, the primary key of every
    /// table served by this crate.
    pub fn id(&self) -> Option<&Value> {
        self.attributes.get("id")
    }

    /// Return `true` if the row carries a non-null `deleted_at` value, the
    /// soft-delete column of every table served by this crate. Always
    /// `false` when that column was not selected.
    pub fn is_trashed(&self) -> bool {
        matches!(self.attributes.get("deleted_at"), Some(v) if !v.is_null())
    }
}

impl From<Record> for Entity {
    fn from(attributes: Record) -> Self {
        Self { attributes }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "Entity({})", id),
            None => write!(f, "Entity(?)"),
        }
    }
}

///
/// Projection of the columns to be returned by a query.
///
/// The single column `*` selects every column of the table.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Columns(Vec<String>);

impl Columns {
    /// Select every column.
    pub fn all() -> Self {
        Self(vec!["*".into()])
    }

    /// Return `true` if this projection selects every column.
    pub fn is_all(&self) -> bool {
        self.0.is_empty() || self.0.iter().any(|c| c == "*")
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl Default for Columns {
    fn default() -> Self {
        Self::all()
    }
}

impl<const N: usize> From<[&str; N]> for Columns {
    fn from(names: [&str; N]) -> Self {
        Self(names.iter().map(|n| n.to_string()).collect())
    }
}

impl From<&[&str]> for Columns {
    fn from(names: &[&str]) -> Self {
        Self(names.iter().map(|n| n.to_string()).collect())
    }
}

impl From<Vec<String>> for Columns {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

impl fmt::Display for Columns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

///
/// One page of results along with the figures needed to navigate the rest.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Rows on the requested page.
    pub data: Vec<Entity>,
    /// Number of rows matching the query across all pages.
    pub total: u64,
    /// Maximum number of rows on each page.
    pub per_page: u64,
    /// The 1-based number of this page.
    pub current_page: u64,
    /// The 1-based number of the final page, never less than 1.
    pub last_page: u64,
}

impl Page {
    pub fn new(data: Vec<Entity>, total: u64, per_page: u64, current_page: u64) -> Self {
        let last_page = if per_page > 0 {
            total.div_ceil(per_page).max(1)
        } else {
            1
        };
        Self {
            data,
            total,
            per_page,
            current_page,
            last_page,
        }
    }

    /// Return `true` if pages follow this one.
    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Page({} of {}, {} rows of {})",
            self.current_page,
            self.last_page,
            self.data.len(),
            self.total
        )
    }
}
