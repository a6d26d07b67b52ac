//
// Copyright (c) 2024 Nathan Fiedler
//
use crate::domain::entities::{Columns, Entity, Page, Record};
use crate::domain::query::Query;
use crate::Error;
#[cfg(test)]
use mockall::{automock, predicate::*};
use serde_json::Value;
use std::env;
use std::sync::Arc;

mod schema;
mod sqlite;

pub use schema::{Column, ColumnType, TableSchema};

///
/// Features a data source must offer before a repository will use it.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Rows can be created, updated, and removed.
    pub persistence: bool,
    /// Compiled queries can be executed.
    pub querying: bool,
    /// Rows are soft-deleted via a timestamp column.
    pub soft_deletes: bool,
}

impl Capabilities {
    /// Every capability a repository requires.
    pub fn full() -> Self {
        Self {
            persistence: true,
            querying: true,
            soft_deletes: true,
        }
    }

    /// Return the names of the required capabilities that are absent.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.persistence {
            missing.push("persistence");
        }
        if !self.querying {
            missing.push("querying");
        }
        if !self.soft_deletes {
            missing.push("soft deletes");
        }
        missing
    }
}

///
/// Data source for the rows of a single table.
///
#[cfg_attr(test, automock)]
pub trait EntityDataSource: Send + Sync {
    /// Describe what this data source is able to do.
    fn capabilities(&self) -> Capabilities;

    /// Return a fresh query handle scoped to this table.
    fn new_query(&self) -> Query;

    /// Retrieve all rows matching the query.
    fn get(&self, query: &Query, columns: &Columns) -> Result<Vec<Entity>, Error>;

    /// Retrieve one page of the rows matching the query, ignoring any offset
    /// and limit on the query itself.
    fn paginate(
        &self,
        query: &Query,
        per_page: u64,
        page: u64,
        columns: &Columns,
    ) -> Result<Page, Error>;

    /// Retrieve the row matching the query with the given primary key.
    ///
    /// Returns `Error::NotFound` if there is no such row.
    fn find_or_fail(&self, query: &Query, id: &Value, columns: &Columns) -> Result<Entity, Error>;

    /// Retrieve the first row matching the query.
    ///
    /// Returns `Error::NotFound` if there is no such row.
    fn first_or_fail(&self, query: &Query, columns: &Columns) -> Result<Entity, Error>;

    /// Insert a new row and return it as stored.
    fn create(&self, data: &Record) -> Result<Entity, Error>;

    /// Apply the given values to every row matching the query.
    ///
    /// Returns the number of rows affected.
    fn update(&self, query: &Query, data: &Record) -> Result<u64, Error>;

    /// Soft-delete the live row with the given primary key.
    ///
    /// Returns the number of rows affected.
    fn destroy(&self, id: &Value) -> Result<u64, Error>;

    /// Permanently remove the row with the given primary key.
    ///
    /// Returns the number of rows removed.
    fn force_delete(&self, id: &Value) -> Result<u64, Error>;
}

///
/// Type for creating the desired type of data source.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataSourceType {
    /// SQLite resident in memory, not persistent.
    SqliteMemory,
    /// SQLite stored persistently to the given file path.
    SqliteFile(String),
}

impl DataSourceType {
    ///
    /// Determine the data source from the `DATABASE_PATH` environment
    /// variable, loading a `.env` file first if one is present.
    ///
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_path(env::var("DATABASE_PATH").ok())
    }

    /// An unset, empty, or `:memory:` path means an in-memory database.
    pub fn from_path(path: Option<String>) -> Self {
        match path {
            Some(p) if !p.trim().is_empty() && p.trim() != ":memory:" => {
                DataSourceType::SqliteFile(p.trim().to_owned())
            }
            _ => DataSourceType::SqliteMemory,
        }
    }
}

///
/// Construct a data source appropriate for the given type, serving rows of
/// the described table.
///
pub fn build_data_source(
    dstype: DataSourceType,
    schema: TableSchema,
) -> Result<Arc<dyn EntityDataSource>, Error> {
    match dstype {
        DataSourceType::SqliteMemory => {
            let source: Arc<dyn EntityDataSource> =
                Arc::new(sqlite::SQLiteEntityDataSource::new_in_memory(schema)?);
            Ok(source)
        }
        DataSourceType::SqliteFile(path) => {
            let source: Arc<dyn EntityDataSource> =
                Arc::new(sqlite::SQLiteEntityDataSource::new(path, schema)?);
            Ok(source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_missing() {
        assert!(Capabilities::full().missing().is_empty());
        let caps = Capabilities {
            persistence: true,
            querying: false,
            soft_deletes: false,
        };
        assert_eq!(caps.missing(), vec!["querying", "soft deletes"]);
    }

    #[test]
    fn test_data_source_type_from_path() {
        assert_eq!(DataSourceType::from_path(None), DataSourceType::SqliteMemory);
        assert_eq!(
            DataSourceType::from_path(Some("".into())),
            DataSourceType::SqliteMemory
        );
        assert_eq!(
            DataSourceType::from_path(Some(":memory:".into())),
            DataSourceType::SqliteMemory
        );
        assert_eq!(
            DataSourceType::from_path(Some("tmp/users.db3".into())),
            DataSourceType::SqliteFile("tmp/users.db3".into())
        );
    }

    #[test]
    fn test_build_data_source_memory() -> Result<(), Error> {
        let schema = TableSchema::new("users")
            .column(Column::text("user_name"))
            .soft_deletes();
        let source = build_data_source(DataSourceType::SqliteMemory, schema)?;
        assert_eq!(source.capabilities(), Capabilities::full());
        assert_eq!(source.new_query().table(), "users");
        Ok(())
    }
}
