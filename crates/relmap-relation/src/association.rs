//! Association-table rows for relations owned by neither side.

use relmap_core::{Column, ConfigErrorKind, Error, Result, Table, TypeError, Value};
use relmap_mapping::{ColumnValues, UpdatePayload, UpwhereColumn};

/// A join-table row: (source id, target id).
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationRecord {
    /// Identifier components of the source side.
    pub source_id: Vec<Value>,
    /// Identifier components of the target side.
    pub target_id: Vec<Value>,
}

impl AssociationRecord {
    /// Build a record.
    pub fn new(source_id: Vec<Value>, target_id: Vec<Value>) -> Self {
        Self {
            source_id,
            target_id,
        }
    }
}

/// A join-table row carrying the element's list position.
///
/// Identity covers the position as well: the same (source, target) pair may
/// appear at several positions of one list.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedAssociationRecord {
    /// Identifier components of the source side.
    pub source_id: Vec<Value>,
    /// Identifier components of the target side.
    pub target_id: Vec<Value>,
    /// Zero-based position in the source's list.
    pub index: i64,
}

impl IndexedAssociationRecord {
    /// Build a record.
    pub fn new(source_id: Vec<Value>, target_id: Vec<Value>, index: i64) -> Self {
        Self {
            source_id,
            target_id,
            index,
        }
    }
}

/// Maps association records onto their join table.
#[derive(Debug, Clone)]
pub struct AssociationTableMapping {
    table: Table,
    source_columns: Vec<Column>,
    target_columns: Vec<Column>,
    index_column: Option<Column>,
}

impl AssociationTableMapping {
    /// Build the mapping, failing fast on structural mistakes.
    pub fn new(
        table: Table,
        source_columns: Vec<Column>,
        target_columns: Vec<Column>,
        index_column: Option<Column>,
    ) -> Result<Self> {
        if source_columns.is_empty() || target_columns.is_empty() {
            return Err(Error::config(
                ConfigErrorKind::Invalid,
                format!(
                    "association table '{}' needs source and target columns",
                    table.name()
                ),
            ));
        }
        for col in source_columns
            .iter()
            .chain(&target_columns)
            .chain(index_column.as_ref())
        {
            if !table.contains(col) {
                return Err(Error::config(
                    ConfigErrorKind::Invalid,
                    format!(
                        "column '{}' does not belong to association table '{}'",
                        col.qualified(),
                        table.name()
                    ),
                ));
            }
        }
        Ok(Self {
            table,
            source_columns,
            target_columns,
            index_column,
        })
    }

    /// The join table.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Columns referencing the source side.
    pub fn source_columns(&self) -> &[Column] {
        &self.source_columns
    }

    /// Columns referencing the target side.
    pub fn target_columns(&self) -> &[Column] {
        &self.target_columns
    }

    /// The list-position column, for ordered relations.
    pub fn index_column(&self) -> Option<&Column> {
        self.index_column.as_ref()
    }

    /// Whether this table carries a position column.
    pub fn is_indexed(&self) -> bool {
        self.index_column.is_some()
    }

    fn spread(columns: &[Column], id: &[Value], side: &'static str) -> Result<ColumnValues> {
        if columns.len() != id.len() {
            return Err(Error::Type(TypeError {
                expected: "matching identifier arity",
                actual: format!(
                    "{} {} component(s) for {} column(s)",
                    id.len(),
                    side,
                    columns.len()
                ),
                column: None,
            }));
        }
        Ok(columns.iter().cloned().zip(id.iter().cloned()).collect())
    }

    /// Insert values for one record.
    pub fn insert_values(&self, record: &AssociationRecord) -> Result<ColumnValues> {
        let mut values = Self::spread(&self.source_columns, &record.source_id, "source")?;
        values.extend(Self::spread(&self.target_columns, &record.target_id, "target")?);
        Ok(values)
    }

    /// Insert values for one indexed record.
    pub fn insert_values_indexed(&self, record: &IndexedAssociationRecord) -> Result<ColumnValues> {
        let index_column = self.index_column.as_ref().ok_or_else(|| {
            Error::unsupported(
                "insert_values_indexed",
                format!("association table '{}' has no index column", self.table.name()),
            )
        })?;
        let mut values = Self::spread(&self.source_columns, &record.source_id, "source")?;
        values.extend(Self::spread(&self.target_columns, &record.target_id, "target")?);
        values.insert(index_column.clone(), Value::BigInt(record.index));
        Ok(values)
    }

    /// Predicate selecting one record's row (source and target columns,
    /// position excluded).
    pub fn delete_predicate(&self, record: &AssociationRecord) -> Result<ColumnValues> {
        self.insert_values(record)
    }

    /// Predicate selecting every row of one source (delete-by-id path).
    pub fn source_predicate(&self, source_id: &[Value]) -> Result<ColumnValues> {
        Self::spread(&self.source_columns, source_id, "source")
    }

    /// Index-only update: move one record to `new_index`. The WHERE side
    /// pins source, target and the previous position.
    pub fn index_update(
        &self,
        record: &IndexedAssociationRecord,
        new_index: i64,
    ) -> Result<UpdatePayload> {
        let index_column = self.index_column.as_ref().ok_or_else(|| {
            Error::unsupported(
                "index_update",
                format!("association table '{}' has no index column", self.table.name()),
            )
        })?;
        let mut payload = UpdatePayload::new();
        payload.insert(
            UpwhereColumn::set(index_column.clone()),
            Value::BigInt(new_index),
        );
        for (col, value) in Self::spread(&self.source_columns, &record.source_id, "source")? {
            payload.insert(UpwhereColumn::condition(col), value);
        }
        for (col, value) in Self::spread(&self.target_columns, &record.target_id, "target")? {
            payload.insert(UpwhereColumn::condition(col), value);
        }
        payload.insert(
            UpwhereColumn::condition(index_column.clone()),
            Value::BigInt(record.index),
        );
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmap_core::{ColumnDef, SqlType};

    fn mapping(indexed: bool) -> AssociationTableMapping {
        let mut defs = vec![
            ColumnDef::new("team_id", SqlType::BigInt).primary_key(true),
            ColumnDef::new("hero_id", SqlType::BigInt).primary_key(true),
        ];
        if indexed {
            defs.push(ColumnDef::new("idx", SqlType::BigInt).primary_key(true));
        }
        let table = Table::build("team_heroes", defs).unwrap();
        let source = vec![table.column("team_id").unwrap().clone()];
        let target = vec![table.column("hero_id").unwrap().clone()];
        let index = indexed.then(|| table.column("idx").unwrap().clone());
        AssociationTableMapping::new(table, source, target, index).unwrap()
    }

    #[test]
    fn test_insert_values() {
        let m = mapping(false);
        let record = AssociationRecord::new(vec![Value::BigInt(1)], vec![Value::BigInt(2)]);
        let values = m.insert_values(&record).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(
            values.get(m.source_columns().first().unwrap()),
            Some(&Value::BigInt(1))
        );
        assert_eq!(
            values.get(m.target_columns().first().unwrap()),
            Some(&Value::BigInt(2))
        );
    }

    #[test]
    fn test_indexed_insert_requires_index_column() {
        let record =
            IndexedAssociationRecord::new(vec![Value::BigInt(1)], vec![Value::BigInt(2)], 0);
        assert!(mapping(false).insert_values_indexed(&record).is_err());
        let values = mapping(true).insert_values_indexed(&record).unwrap();
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn test_index_update_pins_previous_position() {
        let m = mapping(true);
        let record =
            IndexedAssociationRecord::new(vec![Value::BigInt(1)], vec![Value::BigInt(2)], 1);
        let payload = m.index_update(&record, 2).unwrap();
        let index_col = m.index_column().unwrap().clone();
        assert_eq!(
            payload.get(&UpwhereColumn::set(index_col.clone())),
            Some(&Value::BigInt(2))
        );
        assert_eq!(
            payload.get(&UpwhereColumn::condition(index_col)),
            Some(&Value::BigInt(1))
        );
    }

    #[test]
    fn test_arity_mismatch_is_rejected() {
        let m = mapping(false);
        let record = AssociationRecord::new(vec![Value::BigInt(1), Value::BigInt(9)], vec![Value::BigInt(2)]);
        assert!(m.insert_values(&record).is_err());
    }

    #[test]
    fn test_source_predicate() {
        let m = mapping(false);
        let predicate = m.source_predicate(&[Value::BigInt(4)]).unwrap();
        assert_eq!(predicate.len(), 1);
        assert_eq!(
            predicate.get(m.source_columns().first().unwrap()),
            Some(&Value::BigInt(4))
        );
    }

    #[test]
    fn test_foreign_column_rejected() {
        let other = Table::build(
            "other",
            vec![ColumnDef::new("id", SqlType::BigInt).primary_key(true)],
        )
        .unwrap();
        let table = Table::build(
            "team_heroes",
            vec![
                ColumnDef::new("team_id", SqlType::BigInt).primary_key(true),
                ColumnDef::new("hero_id", SqlType::BigInt).primary_key(true),
            ],
        )
        .unwrap();
        let result = AssociationTableMapping::new(
            table.clone(),
            vec![other.column("id").unwrap().clone()],
            vec![table.column("hero_id").unwrap().clone()],
            None,
        );
        assert!(result.is_err());
    }
}
