//
// Copyright (c) 2024 Nathan Fiedler
//
pub mod data;
pub mod domain;

pub use data::repositories::Repository;
pub use data::sources::{
    build_data_source, Capabilities, Column, ColumnType, DataSourceType, EntityDataSource,
    TableSchema,
};
pub use domain::criteria::{Criteria, Direction, Operator, Predicate, Visibility};
pub use domain::entities::{Columns, Entity, Page, Record};
pub use domain::query::{Boolean, Clause, Condition, Query};

///
/// This type represents various errors that can occur within this crate.
///
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error occurred during an SQL related operation.
    #[error("SQL error: {0}")]
    SQLError(#[from] rusqlite::Error),
    /// Error occurred while (de)serializing JSON.
    #[error("JSON error: {0}")]
    JSONError(#[from] serde_json::Error),
    /// No row matched a query that expects exactly one result.
    #[error("no query results for {0}")]
    NotFound(String),
    /// The data source given to a repository lacks required capabilities.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Query referenced a field that the table does not define.
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    /// Comparison operator text was not recognized.
    #[error("invalid operator: {0}")]
    InvalidOperator(String),
    /// Sort direction text was not recognized.
    #[error("invalid sort direction: {0}")]
    InvalidDirection(String),
    /// An argument to a terminal operation was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Something happened when operating on the database.
    #[error("error resulting from database operation")]
    Database,
    /// An unexpected error occurred that would otherwise have been a panic.
    #[error("something bad happened: {0}")]
    InternalError(String),
}
