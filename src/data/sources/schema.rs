//
// Copyright (c) 2024 Nathan Fiedler
//

///
/// Storage class of a column.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

///
/// Definition of a single non-key column.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
    pub nullable: bool,
    pub unique: bool,
}

impl Column {
    pub fn new<N: Into<String>>(name: N, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            unique: false,
        }
    }

    pub fn text<N: Into<String>>(name: N) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn integer<N: Into<String>>(name: N) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn real<N: Into<String>>(name: N) -> Self {
        Self::new(name, ColumnType::Real)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn definition(&self) -> String {
        let mut def = format!("\"{}\" {}", self.name, self.kind.as_sql());
        if !self.nullable {
            def.push_str(" NOT NULL");
        }
        if self.unique {
            def.push_str(" UNIQUE");
        }
        def
    }
}

///
/// Shape of the table served by a data source: an integer `id` primary key,
/// the declared columns, and optionally the timestamp and `deleted_at`
/// soft-delete columns.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub(crate) table: String,
    pub(crate) primary_key: String,
    pub(crate) columns: Vec<Column>,
    pub(crate) timestamps: bool,
    pub(crate) deleted_at: Option<String>,
}

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED_AT: &str = "deleted_at";

impl TableSchema {
    pub fn new<T: Into<String>>(table: T) -> Self {
        Self {
            table: table.into(),
            primary_key: "id".into(),
            columns: Vec::new(),
            timestamps: false,
            deleted_at: None,
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Maintain `created_at` and `updated_at` columns.
    pub fn timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    /// Soft-delete rows by setting a `deleted_at` column.
    pub fn soft_deletes(mut self) -> Self {
        self.deleted_at = Some(DELETED_AT.into());
        self
    }

    /// Return `true` if the table defines a column with the given name.
    pub fn has_column(&self, name: &str) -> bool {
        name == self.primary_key
            || self.columns.iter().any(|c| c.name == name)
            || (self.timestamps && (name == CREATED_AT || name == UPDATED_AT))
            || self.deleted_at.as_deref() == Some(name)
    }

    /// Statement that creates the table if it does not already exist.
    pub fn create_sql(&self) -> String {
        let mut defs = vec![format!(
            "\"{}\" INTEGER PRIMARY KEY AUTOINCREMENT",
            self.primary_key
        )];
        defs.extend(self.columns.iter().map(|c| c.definition()));
        if self.timestamps {
            defs.push(format!("\"{}\" TEXT", CREATED_AT));
            defs.push(format!("\"{}\" TEXT", UPDATED_AT));
        }
        if let Some(ref deleted_at) = self.deleted_at {
            defs.push(format!("\"{}\" TEXT", deleted_at));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            self.table,
            defs.join(", ")
        )
    }
}
