//! The mapping contract.

use crate::context::WriteContext;
use indexmap::IndexMap;
use relmap_core::{Column, Result, Row, Value};

/// Column values for an insert statement, in deterministic column order.
pub type ColumnValues = IndexMap<Column, Value>;

/// Column values for an update statement, keyed by column and role.
pub type UpdatePayload = IndexMap<UpwhereColumn, Value>;

/// The role a column plays in an update statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateRole {
    /// Column is assigned a new value (SET clause).
    Set,
    /// Column constrains the updated row (WHERE clause).
    Where,
}

/// A column tagged with its role inside one update statement.
///
/// Equality covers both column and role, so the same column may appear
/// twice in one payload: an optimistic-lock column carries its new value
/// under `Set` and its previous value under `Where`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpwhereColumn {
    column: Column,
    role: UpdateRole,
}

impl UpwhereColumn {
    /// A column assigned in the SET clause.
    pub fn set(column: Column) -> Self {
        Self {
            column,
            role: UpdateRole::Set,
        }
    }

    /// A column constraining the WHERE clause.
    pub fn condition(column: Column) -> Self {
        Self {
            column,
            role: UpdateRole::Where,
        }
    }

    /// The underlying column.
    pub fn column(&self) -> &Column {
        &self.column
    }

    /// The role of this entry.
    pub fn role(&self) -> UpdateRole {
        self.role
    }

    /// Whether this is a SET entry.
    pub fn is_set(&self) -> bool {
        self.role == UpdateRole::Set
    }

    /// Whether this is a WHERE entry.
    pub fn is_condition(&self) -> bool {
        self.role == UpdateRole::Where
    }
}

/// Conversion contract between an entity type and its table columns.
///
/// Implementations are immutable once configured and hold no per-call
/// state; all of them may be shared across threads.
pub trait Mapping<C>: Send + Sync {
    /// Every column this mapping reads or writes.
    fn columns(&self) -> Vec<Column>;

    /// Column values for inserting `entity`.
    ///
    /// Auto-generated columns are never present in the result.
    fn insert_values(&self, entity: &C, ctx: &WriteContext) -> ColumnValues;

    /// Column values for updating `modified`.
    ///
    /// With an `unmodified` reference, only changed columns are emitted;
    /// without one, every mapped property is emitted (full overwrite).
    /// When `all_columns` is set and at least one column changed, the
    /// remaining updatable columns are backfilled — from `unmodified` when
    /// available, else from `modified` — so batched statements stay
    /// uniform. An unchanged entity yields an empty payload.
    fn update_values(
        &self,
        modified: &C,
        unmodified: Option<&C>,
        all_columns: bool,
        ctx: &WriteContext,
    ) -> UpdatePayload;

    /// Build an entity from a result row.
    fn transform(&self, row: &Row) -> Result<C>;

    /// The (property name, column) pairs of declared properties.
    ///
    /// Mappings that have no per-property columns (flat collection/map
    /// mappings) return an unsupported-operation error.
    fn property_column_pairs(&self) -> Result<Vec<(&'static str, Column)>>;
}

/// Turn an insert payload back into a result row keyed by column name.
///
/// The write path and the read path meet here: feeding the produced row to
/// the mapping's transformer must yield an entity equal to the one the
/// payload was computed from, on every mapped property.
pub fn row_from_values(values: &ColumnValues) -> Row {
    Row::from_pairs(
        values
            .iter()
            .map(|(col, v)| (col.name().to_string(), v.clone()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmap_core::{ColumnDef, SqlType, Table};

    fn version_column() -> Column {
        let table = Table::build(
            "doc",
            vec![
                ColumnDef::new("id", SqlType::BigInt).primary_key(true),
                ColumnDef::new("version", SqlType::BigInt).nullable(false),
            ],
        )
        .unwrap();
        table.column("version").unwrap().clone()
    }

    #[test]
    fn test_set_and_where_are_distinct_keys() {
        let col = version_column();
        let mut payload = UpdatePayload::new();
        payload.insert(UpwhereColumn::set(col.clone()), Value::BigInt(3));
        payload.insert(UpwhereColumn::condition(col.clone()), Value::BigInt(2));

        assert_eq!(payload.len(), 2);
        assert_eq!(
            payload.get(&UpwhereColumn::set(col.clone())),
            Some(&Value::BigInt(3))
        );
        assert_eq!(
            payload.get(&UpwhereColumn::condition(col)),
            Some(&Value::BigInt(2))
        );
    }

    #[test]
    fn test_same_column_same_role_collides() {
        let col = version_column();
        let mut payload = UpdatePayload::new();
        payload.insert(UpwhereColumn::set(col.clone()), Value::BigInt(1));
        payload.insert(UpwhereColumn::set(col), Value::BigInt(2));
        assert_eq!(payload.len(), 1);
    }

    #[test]
    fn test_row_from_values() {
        let col = version_column();
        let mut values = ColumnValues::new();
        values.insert(col, Value::BigInt(9));
        let row = row_from_values(&values);
        assert_eq!(row.get_by_name("version"), Some(&Value::BigInt(9)));
    }
}
