//! Schema model: tables, columns, primary keys.
//!
//! This is plain data consumed by the mapping engine; DDL generation and
//! naming strategies live elsewhere. Column identity is structural
//! (table name + column name), so columns can be used as map keys in
//! insert/update payloads.

use crate::error::{ConfigErrorKind, Error, Result};
use crate::types::SqlType;
use crate::value::Value;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A column of a table.
///
/// Cheap to clone; equality and hashing consider only (table, name).
#[derive(Debug, Clone)]
pub struct Column {
    table: Arc<str>,
    name: Arc<str>,
    ty: SqlType,
    nullable: bool,
    primary_key: bool,
    auto_generated: bool,
    primitive: bool,
}

impl Column {
    /// Table this column belongs to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column type.
    pub fn ty(&self) -> SqlType {
        self.ty
    }

    /// Whether NULL is a legal stored value.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether this column is part of the table's primary key.
    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Whether the database generates this column's value on insert.
    pub fn is_auto_generated(&self) -> bool {
        self.auto_generated
    }

    /// Whether this column is backed by a non-nullable scalar property
    /// whose zero value means "unset".
    pub fn is_primitive(&self) -> bool {
        self.primitive
    }

    /// `table.name`, for messages and logs.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table, self.name)
    }

    /// Whether `value` counts as unset for this column.
    ///
    /// NULL is always unset; for primitive-backed columns the type's zero
    /// value is unset as well. Drives lazy embedded instantiation and
    /// composed-identifier newness.
    pub fn is_default_value(&self, value: &Value) -> bool {
        value.is_null() || (self.primitive && *value == self.ty.zero())
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.name == other.name
    }
}

impl Eq for Column {}

impl Hash for Column {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.name)
    }
}

/// A column declaration, attached to a table at build time.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    name: String,
    ty: SqlType,
    nullable: bool,
    primary_key: bool,
    auto_generated: bool,
    primitive: bool,
}

impl ColumnDef {
    /// Declare a column. Nullable by default.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            primary_key: false,
            auto_generated: false,
            primitive: false,
        }
    }

    /// Set the nullable flag.
    #[must_use]
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Mark as part of the primary key. Primary-key columns are not
    /// nullable.
    #[must_use]
    pub fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        if value {
            self.nullable = false;
        }
        self
    }

    /// Mark as database-generated on insert.
    #[must_use]
    pub fn auto_generated(mut self, value: bool) -> Self {
        self.auto_generated = value;
        self
    }

    /// Mark as backed by a non-nullable scalar whose zero value means
    /// "unset". Implies not nullable.
    #[must_use]
    pub fn primitive(mut self, value: bool) -> Self {
        self.primitive = value;
        if value {
            self.nullable = false;
        }
        self
    }
}

/// A table with its columns.
#[derive(Debug, Clone)]
pub struct Table {
    name: Arc<str>,
    columns: Vec<Column>,
}

impl Table {
    /// Build a table from column declarations.
    ///
    /// Fails fast on duplicate column names and on tables without any
    /// primary-key column.
    pub fn build(name: impl Into<String>, defs: Vec<ColumnDef>) -> Result<Self> {
        let name: Arc<str> = Arc::from(name.into());
        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(defs.len());
        for def in defs {
            if !seen.insert(def.name.clone()) {
                return Err(Error::config(
                    ConfigErrorKind::DuplicateColumn,
                    format!("column '{}' declared twice on table '{}'", def.name, name),
                ));
            }
            columns.push(Column {
                table: Arc::clone(&name),
                name: Arc::from(def.name),
                ty: def.ty,
                nullable: def.nullable,
                primary_key: def.primary_key,
                auto_generated: def.auto_generated,
                primitive: def.primitive,
            });
        }
        if !columns.iter().any(Column::is_primary_key) {
            return Err(Error::config(
                ConfigErrorKind::MissingPrimaryKey,
                format!("table '{}' has no primary-key column", name),
            ));
        }
        Ok(Self { name, columns })
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All columns, in declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Whether this table owns the given column.
    pub fn contains(&self, column: &Column) -> bool {
        column.table() == self.name() && self.column(column.name()).is_some()
    }

    /// The primary-key view of this table.
    pub fn primary_key(&self) -> PrimaryKey {
        PrimaryKey {
            columns: self
                .columns
                .iter()
                .filter(|c| c.is_primary_key())
                .cloned()
                .collect(),
        }
    }
}

/// The primary-key columns of a table.
#[derive(Debug, Clone)]
pub struct PrimaryKey {
    columns: Vec<Column>,
}

impl PrimaryKey {
    /// Key columns, in table declaration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Whether the key spans more than one column.
    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }
}
