//! Identifier mapping: access, newness, insertion strategy, assembly.

use crate::mapping::ColumnValues;
use crate::transformer::RowAccess;
use relmap_core::{Column, ConfigErrorKind, Error, FromValue, Result, TypeError, Value};
use std::sync::Arc;

/// Reads and writes an entity's identifier as ordered component values.
///
/// Simple identifiers have one component; composed identifiers one per key
/// column, in the assembler's column order.
pub struct IdAccessor<C> {
    get: Arc<dyn Fn(&C) -> Vec<Value> + Send + Sync>,
    set: Arc<dyn Fn(&mut C, &[Value]) -> Result<()> + Send + Sync>,
}

impl<C> Clone for IdAccessor<C> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
        }
    }
}

impl<C> IdAccessor<C> {
    /// Accessor from raw component closures.
    pub fn new(
        get: impl Fn(&C) -> Vec<Value> + Send + Sync + 'static,
        set: impl Fn(&mut C, &[Value]) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            get: Arc::new(get),
            set: Arc::new(set),
        }
    }

    /// Read the identifier components.
    pub fn get(&self, entity: &C) -> Vec<Value> {
        (self.get)(entity)
    }

    /// Write the identifier components back.
    pub fn set(&self, entity: &mut C, id: &[Value]) -> Result<()> {
        (self.set)(entity, id)
    }
}

/// Accessor for a single-component identifier property.
pub fn simple_id<C, T, G, S>(get: G, set: S) -> IdAccessor<C>
where
    T: Into<Value> + FromValue,
    G: Fn(&C) -> T + Send + Sync + 'static,
    S: Fn(&mut C, T) + Send + Sync + 'static,
{
    IdAccessor::new(
        move |c: &C| vec![get(c).into()],
        move |c: &mut C, id: &[Value]| {
            let value = id.first().cloned().unwrap_or(Value::Null);
            let typed = T::from_value(&value).map_err(Error::from)?;
            set(c, typed);
            Ok(())
        },
    )
}

/// How "is this instance new" is decided, selected at configuration time.
pub enum IsNewPolicy<C> {
    /// New when the identifier value is NULL.
    Nullable,
    /// New when the identifier's numeric value is zero (the property is a
    /// non-nullable scalar, so zero is its unset marker).
    PrimitiveDefault,
    /// Identifier presence cannot tell new from existing; the entity
    /// carries its own persisted marker.
    AlreadyAssigned {
        is_persisted: Arc<dyn Fn(&C) -> bool + Send + Sync>,
    },
}

impl<C> Clone for IsNewPolicy<C> {
    fn clone(&self) -> Self {
        match self {
            IsNewPolicy::Nullable => IsNewPolicy::Nullable,
            IsNewPolicy::PrimitiveDefault => IsNewPolicy::PrimitiveDefault,
            IsNewPolicy::AlreadyAssigned { is_persisted } => IsNewPolicy::AlreadyAssigned {
                is_persisted: Arc::clone(is_persisted),
            },
        }
    }
}

impl<C> std::fmt::Debug for IsNewPolicy<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsNewPolicy::Nullable => f.write_str("Nullable"),
            IsNewPolicy::PrimitiveDefault => f.write_str("PrimitiveDefault"),
            IsNewPolicy::AlreadyAssigned { .. } => f.write_str("AlreadyAssigned"),
        }
    }
}

/// When and how the identifier value is produced.
pub enum IdentifierInsertion<C> {
    /// The database generates the value on insert; identifier columns are
    /// excluded from the insert payload.
    DatabaseGenerated,
    /// Generated before insert (sequence, UUID, hi/lo...).
    BeforeInsert {
        generator: Arc<dyn Fn() -> Vec<Value> + Send + Sync>,
    },
    /// The caller assigned the identifier; after a successful insert the
    /// entity's persisted marker is raised.
    AlreadyAssigned {
        mark_persisted: Arc<dyn Fn(&mut C) + Send + Sync>,
    },
}

impl<C> Clone for IdentifierInsertion<C> {
    fn clone(&self) -> Self {
        match self {
            IdentifierInsertion::DatabaseGenerated => IdentifierInsertion::DatabaseGenerated,
            IdentifierInsertion::BeforeInsert { generator } => IdentifierInsertion::BeforeInsert {
                generator: Arc::clone(generator),
            },
            IdentifierInsertion::AlreadyAssigned { mark_persisted } => {
                IdentifierInsertion::AlreadyAssigned {
                    mark_persisted: Arc::clone(mark_persisted),
                }
            }
        }
    }
}

impl<C> std::fmt::Debug for IdentifierInsertion<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentifierInsertion::DatabaseGenerated => f.write_str("DatabaseGenerated"),
            IdentifierInsertion::BeforeInsert { .. } => f.write_str("BeforeInsert"),
            IdentifierInsertion::AlreadyAssigned { .. } => f.write_str("AlreadyAssigned"),
        }
    }
}

/// Row↔identifier marshalling over the key columns.
#[derive(Debug, Clone)]
pub enum IdentifierAssembler {
    /// Single key column.
    Simple { column: Column },
    /// Multi-column key; component order follows the column order.
    Composed { columns: Vec<Column> },
}

impl IdentifierAssembler {
    /// Assembler over one key column.
    pub fn simple(column: Column) -> Self {
        IdentifierAssembler::Simple { column }
    }

    /// Assembler over several key columns. Fails fast when empty.
    pub fn composed(columns: Vec<Column>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::config(
                ConfigErrorKind::MissingIdentifier,
                "composed identifier needs at least one column",
            ));
        }
        Ok(IdentifierAssembler::Composed { columns })
    }

    /// The key columns, in component order.
    pub fn columns(&self) -> &[Column] {
        match self {
            IdentifierAssembler::Simple { column } => std::slice::from_ref(column),
            IdentifierAssembler::Composed { columns } => columns,
        }
    }

    /// Read the identifier components out of a row.
    pub fn assemble(&self, row: &RowAccess<'_>) -> Result<Vec<Value>> {
        self.columns()
            .iter()
            .map(|col| {
                row.value(col).cloned().ok_or_else(|| {
                    Error::Type(TypeError {
                        expected: "identifier column",
                        actual: format!("column '{}' not in row", col.qualified()),
                        column: Some(col.name().to_string()),
                    })
                })
            })
            .collect()
    }

    /// Spread identifier components over the key columns, for predicates
    /// and insert payloads. Fails on arity mismatch.
    pub fn to_column_values(&self, id: &[Value]) -> Result<ColumnValues> {
        let columns = self.columns();
        if columns.len() != id.len() {
            return Err(Error::Type(TypeError {
                expected: "matching identifier arity",
                actual: format!(
                    "{} component(s) for {} key column(s)",
                    id.len(),
                    columns.len()
                ),
                column: None,
            }));
        }
        Ok(columns
            .iter()
            .cloned()
            .zip(id.iter().cloned())
            .collect())
    }
}

/// Identifier strategy of one entity mapping.
pub struct IdMapping<C> {
    accessor: IdAccessor<C>,
    assembler: IdentifierAssembler,
    insertion: IdentifierInsertion<C>,
    policy: IsNewPolicy<C>,
}

impl<C> Clone for IdMapping<C> {
    fn clone(&self) -> Self {
        Self {
            accessor: self.accessor.clone(),
            assembler: self.assembler.clone(),
            insertion: self.insertion.clone(),
            policy: self.policy.clone(),
        }
    }
}

impl<C> IdMapping<C> {
    /// Compose an identifier strategy.
    pub fn new(
        accessor: IdAccessor<C>,
        assembler: IdentifierAssembler,
        insertion: IdentifierInsertion<C>,
        policy: IsNewPolicy<C>,
    ) -> Self {
        Self {
            accessor,
            assembler,
            insertion,
            policy,
        }
    }

    /// The key columns.
    pub fn columns(&self) -> &[Column] {
        self.assembler.columns()
    }

    /// The assembler.
    pub fn assembler(&self) -> &IdentifierAssembler {
        &self.assembler
    }

    /// Identifier component values of an entity.
    pub fn id_values(&self, entity: &C) -> Vec<Value> {
        self.accessor.get(entity)
    }

    /// Write identifier components back into an entity.
    pub fn set_id(&self, entity: &mut C, id: &[Value]) -> Result<()> {
        self.accessor.set(entity, id)
    }

    /// Whether the database produces the identifier on insert.
    pub fn is_database_generated(&self) -> bool {
        matches!(self.insertion, IdentifierInsertion::DatabaseGenerated)
    }

    /// Whether the entity has not been persisted yet.
    ///
    /// Composed identifiers are new when every component is
    /// null-or-default.
    pub fn is_new(&self, entity: &C) -> bool {
        match &self.policy {
            IsNewPolicy::Nullable => self.id_values(entity).iter().all(Value::is_null),
            IsNewPolicy::PrimitiveDefault => self
                .id_values(entity)
                .iter()
                .all(|v| v.is_null() || v.is_zero()),
            IsNewPolicy::AlreadyAssigned { is_persisted } => !is_persisted(entity),
        }
    }

    /// Whether two entities carry the same identifier.
    pub fn same_id(&self, a: &C, b: &C) -> bool {
        self.id_values(a) == self.id_values(b)
    }

    /// Assign a generated identifier when the strategy produces it before
    /// insert; no-op otherwise.
    pub fn prepare_for_insert(&self, entity: &mut C) -> Result<()> {
        if let IdentifierInsertion::BeforeInsert { generator } = &self.insertion {
            if self.is_new(entity) {
                let id = generator();
                self.accessor.set(entity, &id)?;
            }
        }
        Ok(())
    }

    /// Raise the entity's persisted marker after insert, for the
    /// already-assigned strategy; no-op otherwise.
    pub fn mark_persisted(&self, entity: &mut C) {
        if let IdentifierInsertion::AlreadyAssigned { mark_persisted } = &self.insertion {
            mark_persisted(entity);
        }
    }

    /// Fix the identifier on a bean from a row.
    pub fn fix_from_row(&self, row: &RowAccess<'_>, bean: &mut C) -> Result<()> {
        let id = self.assembler.assemble(row)?;
        self.accessor.set(bean, &id)
    }

    /// Identifier values spread over the key columns, for WHERE
    /// predicates. Components beyond the key arity are ignored.
    pub fn where_values(&self, entity: &C) -> ColumnValues {
        self.columns()
            .iter()
            .cloned()
            .zip(self.id_values(entity))
            .collect()
    }
}
