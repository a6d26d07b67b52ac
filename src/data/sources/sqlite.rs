//
// Copyright (c) 2024 Nathan Fiedler
//
use super::schema::{TableSchema, CREATED_AT, UPDATED_AT};
use crate::data::sources::{Capabilities, EntityDataSource};
use crate::domain::criteria::{Operator, Visibility};
use crate::domain::entities::{Columns, Entity, Page, Record};
use crate::domain::query::{Boolean, Clause, Condition, Query};
use crate::Error;
use log::debug;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

///
/// Data source implementation backed by an SQLite database.
///
pub struct SQLiteEntityDataSource {
    // database connection
    conn: Arc<Mutex<Connection>>,
    schema: TableSchema,
}

impl SQLiteEntityDataSource {
    /// Construct an SQLite-based data source that will be stored at the given path.
    pub fn new<P: AsRef<Path>>(path: P, schema: TableSchema) -> Result<Self, Error> {
        let conn = Connection::open(path)?;
        create_tables(&conn, &schema)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            schema,
        })
    }

    /// Construct an SQLite-based data source that will be memory resident.
    pub fn new_in_memory(schema: TableSchema) -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn, &schema)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            schema,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.conn
            .lock()
            .map_err(|e| Error::InternalError(format!("connection lock poisoned: {}", e)))
    }

    fn column(&self, name: &str) -> Result<String, Error> {
        if self.schema.has_column(name) {
            Ok(quote(name))
        } else {
            Err(Error::UnknownColumn(name.to_owned()))
        }
    }

    fn table(&self) -> String {
        quote(&self.schema.table)
    }

    fn select_list(&self, columns: &Columns) -> Result<String, Error> {
        if columns.is_all() {
            return Ok("*".into());
        }
        let names: Result<Vec<String>, Error> =
            columns.names().iter().map(|c| self.column(c)).collect();
        Ok(names?.join(", "))
    }

    //
    // Build the WHERE clause: the query's own clauses as a single group,
    // then the optional primary key match, then the soft-delete scope.
    //
    fn where_sql(
        &self,
        query: &Query,
        key: Option<&Value>,
        params: &mut Vec<SqlValue>,
    ) -> Result<String, Error> {
        let mut parts: Vec<String> = Vec::new();
        if !query.clauses().is_empty() {
            parts.push(format!("({})", self.clauses_sql(query.clauses(), params)?));
        }
        if let Some(id) = key {
            parts.push(format!("{} = ?", quote(&self.schema.primary_key)));
            params.push(to_sql_value(id));
        }
        if let Some(ref deleted_at) = self.schema.deleted_at {
            match query.visibility() {
                Visibility::WithoutTrashed => parts.push(format!("{} IS NULL", quote(deleted_at))),
                Visibility::OnlyTrashed => {
                    parts.push(format!("{} IS NOT NULL", quote(deleted_at)))
                }
                Visibility::WithTrashed => {}
            }
        }
        if parts.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!(" WHERE {}", parts.join(" AND ")))
        }
    }

    fn clauses_sql(&self, clauses: &[Clause], params: &mut Vec<SqlValue>) -> Result<String, Error> {
        let mut sql = String::new();
        for (index, clause) in clauses.iter().enumerate() {
            if index > 0 {
                sql.push_str(match clause.boolean {
                    Boolean::And => " AND ",
                    Boolean::Or => " OR ",
                });
            }
            sql.push_str(&self.condition_sql(&clause.condition, params)?);
        }
        Ok(sql)
    }

    fn condition_sql(
        &self,
        condition: &Condition,
        params: &mut Vec<SqlValue>,
    ) -> Result<String, Error> {
        match condition {
            Condition::Compare {
                field,
                operator,
                value,
            } => {
                let column = self.column(field)?;
                match (operator, value) {
                    (Operator::Eq, Value::Null) => Ok(format!("{} IS NULL", column)),
                    (Operator::NotEq, Value::Null) => Ok(format!("{} IS NOT NULL", column)),
                    _ => {
                        params.push(to_sql_value(value));
                        Ok(format!("{} {} ?", column, operator.as_sql()))
                    }
                }
            }
            Condition::Null(field) => Ok(format!("{} IS NULL", self.column(field)?)),
            Condition::NotNull(field) => Ok(format!("{} IS NOT NULL", self.column(field)?)),
            Condition::Nested(inner) if inner.is_empty() => Ok("1 = 1".into()),
            Condition::Nested(inner) => Ok(format!("({})", self.clauses_sql(inner, params)?)),
        }
    }

    fn order_sql(&self, query: &Query) -> Result<String, Error> {
        if query.orders().is_empty() {
            return Ok(String::new());
        }
        let mut keys: Vec<String> = Vec::new();
        for (field, direction) in query.orders() {
            keys.push(format!("{} {}", self.column(field)?, direction));
        }
        Ok(format!(" ORDER BY {}", keys.join(", ")))
    }
}

impl EntityDataSource for SQLiteEntityDataSource {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            persistence: true,
            querying: true,
            soft_deletes: self.schema.deleted_at.is_some(),
        }
    }

    fn new_query(&self) -> Query {
        let query = Query::new(self.schema.table.clone());
        match self.schema.deleted_at {
            Some(ref column) => query.soft_deletes(column.clone()),
            None => query,
        }
    }

    fn get(&self, query: &Query, columns: &Columns) -> Result<Vec<Entity>, Error> {
        let mut params: Vec<SqlValue> = Vec::new();
        let sql = format!(
            "SELECT {} FROM {}{}{}{}",
            self.select_list(columns)?,
            self.table(),
            self.where_sql(query, None, &mut params)?,
            self.order_sql(query)?,
            limit_sql(query.offset(), query.limit())
        );
        let db = self.lock()?;
        fetch_rows(&db, &sql, params)
    }

    fn paginate(
        &self,
        query: &Query,
        per_page: u64,
        page: u64,
        columns: &Columns,
    ) -> Result<Page, Error> {
        let page = page.max(1);
        let mut params: Vec<SqlValue> = Vec::new();
        let where_sql = self.where_sql(query, None, &mut params)?;
        let count_sql = format!("SELECT COUNT(*) FROM {}{}", self.table(), where_sql);
        let sql = format!(
            "SELECT {} FROM {}{}{}{}",
            self.select_list(columns)?,
            self.table(),
            where_sql,
            self.order_sql(query)?,
            limit_sql(Some((page - 1).saturating_mul(per_page)), Some(per_page))
        );
        let db = self.lock()?;
        let total = count_rows(&db, &count_sql, params.clone())?;
        let data = fetch_rows(&db, &sql, params)?;
        Ok(Page::new(data, total, per_page, page))
    }

    fn find_or_fail(&self, query: &Query, id: &Value, columns: &Columns) -> Result<Entity, Error> {
        let mut params: Vec<SqlValue> = Vec::new();
        let sql = format!(
            "SELECT {} FROM {}{} LIMIT 1",
            self.select_list(columns)?,
            self.table(),
            self.where_sql(query, Some(id), &mut params)?
        );
        let db = self.lock()?;
        fetch_rows(&db, &sql, params)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("{} {}", self.schema.table, id)))
    }

    fn first_or_fail(&self, query: &Query, columns: &Columns) -> Result<Entity, Error> {
        let mut params: Vec<SqlValue> = Vec::new();
        let sql = format!(
            "SELECT {} FROM {}{}{}{}",
            self.select_list(columns)?,
            self.table(),
            self.where_sql(query, None, &mut params)?,
            self.order_sql(query)?,
            limit_sql(query.offset(), Some(1))
        );
        let db = self.lock()?;
        fetch_rows(&db, &sql, params)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(self.schema.table.clone()))
    }

    fn create(&self, data: &Record) -> Result<Entity, Error> {
        let mut names: Vec<String> = Vec::new();
        let mut values: Vec<&str> = Vec::new();
        let mut params: Vec<SqlValue> = Vec::new();
        for (field, value) in data {
            names.push(self.column(field)?);
            values.push("?");
            params.push(to_sql_value(value));
        }
        if self.schema.timestamps {
            for stamp in [CREATED_AT, UPDATED_AT] {
                if !data.contains_key(stamp) {
                    names.push(quote(stamp));
                    values.push("CURRENT_TIMESTAMP");
                }
            }
        }
        let sql = if names.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table())
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table(),
                names.join(", "),
                values.join(", ")
            )
        };
        debug!("{}", sql);
        let db = self.lock()?;
        db.execute(&sql, params_from_iter(params))?;
        let rowid = db.last_insert_rowid();
        let select = format!(
            "SELECT * FROM {} WHERE {} = ?",
            self.table(),
            quote(&self.schema.primary_key)
        );
        fetch_rows(&db, &select, vec![SqlValue::Integer(rowid)])?
            .into_iter()
            .next()
            // mysterious failure
            .ok_or(Error::Database)
    }

    fn update(&self, query: &Query, data: &Record) -> Result<u64, Error> {
        if data.is_empty() {
            return Err(Error::InvalidArgument("no values given for update".into()));
        }
        let mut sets: Vec<String> = Vec::new();
        let mut params: Vec<SqlValue> = Vec::new();
        for (field, value) in data {
            sets.push(format!("{} = ?", self.column(field)?));
            params.push(to_sql_value(value));
        }
        if self.schema.timestamps && !data.contains_key(UPDATED_AT) {
            sets.push(format!("{} = CURRENT_TIMESTAMP", quote(UPDATED_AT)));
        }
        let sql = format!(
            "UPDATE {} SET {}{}",
            self.table(),
            sets.join(", "),
            self.where_sql(query, None, &mut params)?
        );
        debug!("{}", sql);
        let db = self.lock()?;
        let count = db.execute(&sql, params_from_iter(params))?;
        Ok(count as u64)
    }

    fn destroy(&self, id: &Value) -> Result<u64, Error> {
        let key = quote(&self.schema.primary_key);
        let sql = match self.schema.deleted_at {
            Some(ref deleted_at) => {
                let mut sets = vec![format!("{} = CURRENT_TIMESTAMP", quote(deleted_at))];
                if self.schema.timestamps {
                    sets.push(format!("{} = CURRENT_TIMESTAMP", quote(UPDATED_AT)));
                }
                format!(
                    "UPDATE {} SET {} WHERE {} = ? AND {} IS NULL",
                    self.table(),
                    sets.join(", "),
                    key,
                    quote(deleted_at)
                )
            }
            None => format!("DELETE FROM {} WHERE {} = ?", self.table(), key),
        };
        debug!("{}", sql);
        let db = self.lock()?;
        let count = db.execute(&sql, [to_sql_value(id)])?;
        Ok(count as u64)
    }

    fn force_delete(&self, id: &Value) -> Result<u64, Error> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            self.table(),
            quote(&self.schema.primary_key)
        );
        debug!("{}", sql);
        let db = self.lock()?;
        let count = db.execute(&sql, [to_sql_value(id)])?;
        Ok(count as u64)
    }
}

//
// Create the database tables if they do not exist.
//
fn create_tables(conn: &Connection, schema: &TableSchema) -> rusqlite::Result<()> {
    conn.execute(&schema.create_sql(), ())?;
    Ok(())
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

// sqlite integers are signed 64-bit
fn limit_sql(offset: Option<u64>, limit: Option<u64>) -> String {
    let clamp = |n: u64| n.min(i64::MAX as u64);
    match (limit.map(clamp), offset.map(clamp)) {
        (Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
        (Some(limit), None) => format!(" LIMIT {}", limit),
        // sqlite does not accept OFFSET without LIMIT
        (None, Some(offset)) => format!(" LIMIT -1 OFFSET {}", offset),
        (None, None) => String::new(),
    }
}

fn fetch_rows(db: &Connection, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Entity>, Error> {
    debug!("{}", sql);
    let mut stmt = db.prepare(sql)?;
    let names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut results: Vec<Entity> = Vec::new();
    while let Some(row) = rows.next()? {
        let mut attributes = Map::new();
        for (index, name) in names.iter().enumerate() {
            attributes.insert(name.to_owned(), to_json_value(row.get_ref(index)?));
        }
        results.push(Entity::from(attributes));
    }
    Ok(results)
}

fn count_rows(db: &Connection, sql: &str, params: Vec<SqlValue>) -> Result<u64, Error> {
    debug!("{}", sql);
    let mut stmt = db.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(params))?;
    if let Some(row) = rows.next()? {
        let count: i64 = row.get(0)?;
        Ok(count as u64)
    } else {
        // mysterious failure
        Err(Error::Database)
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Null
            }
        }
        Value::String(s) => SqlValue::Text(s.to_owned()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn to_json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::from(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sources::Column;
    use crate::domain::criteria::{Direction, Predicate};
    use serde_json::json;

    fn users_schema() -> TableSchema {
        TableSchema::new("users")
            .column(Column::text("user_name").unique())
            .column(Column::text("customer_name"))
            .column(Column::text("location").nullable())
            .timestamps()
            .soft_deletes()
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }

    // ids 1 through 5, in this order
    fn seeded() -> Result<SQLiteEntityDataSource, Error> {
        let eds = SQLiteEntityDataSource::new_in_memory(users_schema())?;
        let users = [
            ("alice", "Acme", json!("Paris")),
            ("bob", "Acme", Value::Null),
            ("carol", "Globex", json!("Paris")),
            ("dave", "Acme", json!("London")),
            ("erin", "Globex", Value::Null),
        ];
        for (user_name, customer_name, location) in users {
            eds.create(&record(json!({
                "user_name": user_name,
                "customer_name": customer_name,
                "location": location
            })))?;
        }
        Ok(eds)
    }

    fn names(rows: &[Entity]) -> Vec<&str> {
        rows.iter()
            .filter_map(|row| row.get("user_name").and_then(|v| v.as_str()))
            .collect()
    }

    #[test]
    fn test_find_or_fail_not_found() -> Result<(), Error> {
        // arrange
        let eds = SQLiteEntityDataSource::new_in_memory(users_schema())?;
        // act
        let result = eds.find_or_fail(&eds.new_query(), &json!(999), &Columns::all());
        // assert
        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("no query results for users 999"));
        Ok(())
    }

    #[test]
    fn test_create_stamps_and_returns_row() -> Result<(), Error> {
        let eds = SQLiteEntityDataSource::new_in_memory(users_schema())?;
        let created = eds.create(&record(json!({
            "user_name": "johndoe",
            "customer_name": "Acme"
        })))?;
        assert_eq!(created.id(), Some(&json!(1)));
        assert_eq!(created.get("user_name"), Some(&json!("johndoe")));
        assert_eq!(created.get("location"), Some(&Value::Null));
        assert!(created.get("created_at").map_or(false, |v| v.is_string()));
        assert!(created.get("updated_at").map_or(false, |v| v.is_string()));
        assert!(!created.is_trashed());
        Ok(())
    }

    #[test]
    fn test_create_unknown_column() -> Result<(), Error> {
        let eds = SQLiteEntityDataSource::new_in_memory(users_schema())?;
        let result = eds.create(&record(json!({"user_name": "x", "shoe_size": 9})));
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().to_string(), "unknown column: shoe_size");
        Ok(())
    }

    #[test]
    fn test_get_where_and_order() -> Result<(), Error> {
        let eds = seeded()?;
        let mut query = eds.new_query();
        query
            .and_where(&Predicate::eq("customer_name", "Acme"))
            .order_by("user_name", Direction::Desc);
        let rows = eds.get(&query, &Columns::all())?;
        assert_eq!(names(&rows), vec!["dave", "bob", "alice"]);
        Ok(())
    }

    #[test]
    fn test_get_projection() -> Result<(), Error> {
        let eds = seeded()?;
        let mut query = eds.new_query();
        query.take(1);
        let rows = eds.get(&query, &Columns::from(["id", "user_name"]))?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].attributes.len(), 2);
        assert!(rows[0].get("customer_name").is_none());
        Ok(())
    }

    #[test]
    fn test_get_null_equality() -> Result<(), Error> {
        let eds = seeded()?;
        let mut query = eds.new_query();
        query
            .and_where(&Predicate::eq("location", Value::Null))
            .order_by("id", Direction::Asc);
        let rows = eds.get(&query, &Columns::all())?;
        assert_eq!(names(&rows), vec!["bob", "erin"]);

        let mut query = eds.new_query();
        query.and_where(&Predicate::compare("location", Operator::NotEq, Value::Null));
        let rows = eds.get(&query, &Columns::all())?;
        assert_eq!(rows.len(), 3);
        Ok(())
    }

    #[test]
    fn test_get_offset_without_limit() -> Result<(), Error> {
        let eds = seeded()?;
        let mut query = eds.new_query();
        query.skip(3).order_by("id", Direction::Asc);
        let rows = eds.get(&query, &Columns::all())?;
        assert_eq!(names(&rows), vec!["dave", "erin"]);
        Ok(())
    }

    #[test]
    fn test_get_huge_limit_and_offset() -> Result<(), Error> {
        let eds = seeded()?;
        let mut query = eds.new_query();
        query.take(u64::MAX).order_by("id", Direction::Asc);
        let rows = eds.get(&query, &Columns::all())?;
        assert_eq!(rows.len(), 5);

        let mut query = eds.new_query();
        query.skip(u64::MAX);
        assert!(eds.get(&query, &Columns::all())?.is_empty());
        let page = eds.paginate(&eds.new_query(), u64::MAX, 2, &Columns::all())?;
        assert!(page.data.is_empty());
        assert_eq!(page.total, 5);
        Ok(())
    }

    #[test]
    fn test_get_unknown_column() -> Result<(), Error> {
        let eds = seeded()?;
        let mut query = eds.new_query();
        query.and_where(&Predicate::eq("nonesuch", 1));
        let result = eds.get(&query, &Columns::all());
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().to_string(), "unknown column: nonesuch");
        Ok(())
    }

    #[test]
    fn test_destroy_and_visibility() -> Result<(), Error> {
        let eds = seeded()?;
        assert_eq!(eds.destroy(&json!(2))?, 1);
        // already trashed rows are not deleted again
        assert_eq!(eds.destroy(&json!(2))?, 0);

        let rows = eds.get(&eds.new_query(), &Columns::all())?;
        assert_eq!(rows.len(), 4);
        let mut query = eds.new_query();
        query.with_trashed();
        let rows = eds.get(&query, &Columns::all())?;
        assert_eq!(rows.len(), 5);
        let mut query = eds.new_query();
        query.only_trashed();
        let rows = eds.get(&query, &Columns::all())?;
        assert_eq!(names(&rows), vec!["bob"]);
        assert!(rows[0].is_trashed());
        Ok(())
    }

    #[test]
    fn test_scope_wraps_disjunction() -> Result<(), Error> {
        let eds = seeded()?;
        eds.destroy(&json!(2))?;
        // bob is trashed and must not leak through the OR
        let mut query = eds.new_query();
        query
            .and_where(&Predicate::eq("user_name", "bob"))
            .or_where(&Predicate::eq("user_name", "carol"));
        let rows = eds.get(&query, &Columns::all())?;
        assert_eq!(names(&rows), vec!["carol"]);
        Ok(())
    }

    #[test]
    fn test_paginate() -> Result<(), Error> {
        let eds = seeded()?;
        let mut query = eds.new_query();
        query.order_by("id", Direction::Asc);
        let page = eds.paginate(&query, 2, 2, &Columns::all())?;
        assert_eq!(names(&page.data), vec!["carol", "dave"]);
        assert_eq!(page.total, 5);
        assert_eq!(page.per_page, 2);
        assert_eq!(page.current_page, 2);
        assert_eq!(page.last_page, 3);
        Ok(())
    }

    #[test]
    fn test_first_or_fail() -> Result<(), Error> {
        let eds = seeded()?;
        let mut query = eds.new_query();
        query.and_where(&Predicate::eq("customer_name", "Globex"));
        let first = eds.first_or_fail(&query, &Columns::all())?;
        assert_eq!(first.get("user_name"), Some(&json!("carol")));

        let mut query = eds.new_query();
        query.and_where(&Predicate::eq("customer_name", "Initech"));
        let result = eds.first_or_fail(&query, &Columns::all());
        assert!(matches!(result, Err(Error::NotFound(_))));
        Ok(())
    }

    #[test]
    fn test_update_respects_scope() -> Result<(), Error> {
        let eds = seeded()?;
        eds.destroy(&json!(1))?;
        let mut query = eds.new_query();
        query.and_where(&Predicate::eq("customer_name", "Acme"));
        let count = eds.update(&query, &record(json!({"location": "Berlin"})))?;
        assert_eq!(count, 2);

        let mut query = eds.new_query();
        query
            .with_trashed()
            .and_where(&Predicate::eq("customer_name", "Acme"));
        let count = eds.update(&query, &record(json!({"location": "Rome"})))?;
        assert_eq!(count, 3);

        let result = eds.update(&eds.new_query(), &Record::new());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn test_force_delete() -> Result<(), Error> {
        let eds = seeded()?;
        eds.destroy(&json!(3))?;
        assert_eq!(eds.force_delete(&json!(3))?, 1);
        let mut query = eds.new_query();
        query.with_trashed();
        let rows = eds.get(&query, &Columns::all())?;
        assert_eq!(rows.len(), 4);
        assert_eq!(eds.force_delete(&json!(3))?, 0);
        Ok(())
    }

    #[test]
    fn test_table_without_soft_deletes() -> Result<(), Error> {
        let schema = TableSchema::new("view_counts")
            .column(Column::integer("repository_id"))
            .column(Column::integer("count").nullable())
            .timestamps();
        let eds = SQLiteEntityDataSource::new_in_memory(schema)?;
        assert!(!eds.capabilities().soft_deletes);
        assert!(eds.new_query().deleted_at_column().is_none());
        eds.create(&record(json!({"repository_id": 7, "count": 0})))?;
        // without a deleted_at column, destroy removes the row
        assert_eq!(eds.destroy(&json!(1))?, 1);
        assert!(eds.get(&eds.new_query(), &Columns::all())?.is_empty());
        Ok(())
    }
}
