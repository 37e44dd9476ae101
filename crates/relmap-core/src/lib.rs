//! Core types for the relmap persistence core.
//!
//! This crate provides the foundational abstractions shared by the mapping
//! and relation engines:
//!
//! - `Table`/`Column`/`PrimaryKey` schema model (plain data, no DDL)
//! - `Value` for dynamically-typed column values
//! - `Row` abstraction over a database result row
//! - the accessor layer (`PropertyAccessor`, `Embedding`) replacing runtime
//!   reflection with closures resolved once at configuration time
//! - the error module

pub mod accessor;
pub mod error;
pub mod row;
pub mod schema;
pub mod types;
pub mod value;

pub use accessor::{Embedding, Getter, PropertyAccessor, Setter, property, read_only_property};
pub use error::{ConfigError, ConfigErrorKind, Error, Result, TypeError, UnsupportedError};
pub use row::{ColumnInfo, FromValue, Row};
pub use schema::{Column, ColumnDef, PrimaryKey, Table};
pub use types::SqlType;
pub use value::Value;
