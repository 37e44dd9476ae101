//! Optimistic-lock version column support.

use relmap_core::{Column, Getter, Result, Setter, Value};
use std::sync::Arc;

/// Version column strategy for optimistic locking.
///
/// On update, the payload carries the upgraded value under the SET role and
/// the previous value under the WHERE role, so a concurrent writer makes
/// the statement match zero rows instead of silently overwriting.
pub struct VersioningStrategy<C> {
    column: Column,
    current: Getter<C>,
    next: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
    touch: Option<Setter<C>>,
}

impl<C> Clone for VersioningStrategy<C> {
    fn clone(&self) -> Self {
        Self {
            column: self.column.clone(),
            current: Arc::clone(&self.current),
            next: Arc::clone(&self.next),
            touch: self.touch.clone(),
        }
    }
}

impl<C> std::fmt::Debug for VersioningStrategy<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersioningStrategy")
            .field("column", &self.column)
            .finish()
    }
}

fn bump_integer(value: &Value) -> Value {
    match value {
        Value::SmallInt(v) => Value::SmallInt(v + 1),
        Value::Int(v) => Value::Int(v + 1),
        Value::BigInt(v) => Value::BigInt(v + 1),
        // Unversioned rows start counting at 1.
        _ => Value::BigInt(1),
    }
}

impl<C> VersioningStrategy<C> {
    /// Strategy with a caller-supplied upgrade function.
    pub fn new(
        column: Column,
        current: Getter<C>,
        next: impl Fn(&Value) -> Value + Send + Sync + 'static,
        touch: Option<Setter<C>>,
    ) -> Self {
        Self {
            column,
            current,
            next: Arc::new(next),
            touch,
        }
    }

    /// The usual integer-increment strategy.
    pub fn incrementing(column: Column, current: Getter<C>, touch: Option<Setter<C>>) -> Self {
        Self::new(column, current, bump_integer, touch)
    }

    /// The version column.
    pub fn column(&self) -> &Column {
        &self.column
    }

    /// Current version value of an entity.
    pub fn current_value(&self, entity: &C) -> Value {
        (self.current)(entity)
    }

    /// The value following `current`.
    pub fn next_value(&self, current: &Value) -> Value {
        (self.next)(current)
    }

    /// Write a version value into the entity, when a mutator was
    /// configured. Used to restore the persisted version on read.
    pub fn write_back(&self, entity: &mut C, value: Value) -> Result<()> {
        match &self.touch {
            Some(touch) => touch(entity, value),
            None => Ok(()),
        }
    }

    /// Upgrade an entity in place, returning (previous, upgraded).
    pub fn upgrade(&self, entity: &mut C) -> Result<(Value, Value)> {
        let old = self.current_value(entity);
        let new = self.next_value(&old);
        if let Some(touch) = &self.touch {
            touch(entity, new.clone())?;
        }
        Ok((old, new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmap_core::{ColumnDef, SqlType, Table, property};

    #[derive(Debug, Default, Clone)]
    struct Doc {
        version: i64,
    }

    fn version_column() -> Column {
        Table::build(
            "doc",
            vec![
                ColumnDef::new("id", SqlType::BigInt).primary_key(true),
                ColumnDef::new("version", SqlType::BigInt).nullable(false),
            ],
        )
        .unwrap()
        .column("version")
        .unwrap()
        .clone()
    }

    fn strategy() -> VersioningStrategy<Doc> {
        let accessor = property(
            "version",
            |d: &Doc| d.version,
            |d: &mut Doc, v: i64| d.version = v,
        );
        let getter: Getter<Doc> = Arc::new(|d: &Doc| Value::BigInt(d.version));
        VersioningStrategy::incrementing(
            version_column(),
            getter,
            Some(Arc::new(move |d: &mut Doc, v: Value| {
                accessor.set(d, v)
            })),
        )
    }

    #[test]
    fn test_increment() {
        let s = strategy();
        assert_eq!(s.next_value(&Value::BigInt(3)), Value::BigInt(4));
        assert_eq!(s.next_value(&Value::Int(3)), Value::Int(4));
        assert_eq!(s.next_value(&Value::Null), Value::BigInt(1));
    }

    #[test]
    fn test_upgrade_writes_back() {
        let s = strategy();
        let mut doc = Doc { version: 2 };
        let (old, new) = s.upgrade(&mut doc).unwrap();
        assert_eq!(old, Value::BigInt(2));
        assert_eq!(new, Value::BigInt(3));
        assert_eq!(doc.version, 3);
    }
}
