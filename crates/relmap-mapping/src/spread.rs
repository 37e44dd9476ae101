//! Flat collection/map properties spread over a fixed column set.
//!
//! For a property whose value is a flat `Vec` or map with no relational
//! children, each element (or map entry) is stored in its own column.
//! Insertion pairs iteration/key order against the column set; a shorter
//! collection leaves the remaining columns NULL. These mappings have no
//! per-property columns, so the property-to-column export is structurally
//! unsupported.

use crate::context::WriteContext;
use crate::mapping::{ColumnValues, Mapping, UpdatePayload, UpwhereColumn};
use crate::transformer::{ColumnAliases, RowAccess};
use relmap_core::{Column, ConfigErrorKind, Error, Result, Row, Value};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

fn check_columns(columns: &[Column], what: &str) -> Result<()> {
    if columns.is_empty() {
        return Err(Error::config(
            ConfigErrorKind::Invalid,
            format!("{what} needs at least one column"),
        ));
    }
    let mut seen = HashSet::new();
    for col in columns {
        if !seen.insert(col.clone()) {
            return Err(Error::config(
                ConfigErrorKind::DuplicateBinding,
                format!("column '{}' used twice by {what}", col.qualified()),
            ));
        }
    }
    Ok(())
}

/// A `Vec`-valued property spread positionally over a column set.
pub struct PositionalColumnMapping<C> {
    factory: Arc<dyn Fn() -> C + Send + Sync>,
    columns: Vec<Column>,
    get: Arc<dyn Fn(&C) -> Vec<Value> + Send + Sync>,
    set: Arc<dyn Fn(&mut C, Vec<Value>) + Send + Sync>,
}

impl<C> Clone for PositionalColumnMapping<C> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            columns: self.columns.clone(),
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
        }
    }
}

impl<C> PositionalColumnMapping<C> {
    /// Build the mapping; fails fast on an empty or duplicated column set.
    pub fn new(
        factory: impl Fn() -> C + Send + Sync + 'static,
        columns: Vec<Column>,
        get: impl Fn(&C) -> Vec<Value> + Send + Sync + 'static,
        set: impl Fn(&mut C, Vec<Value>) + Send + Sync + 'static,
    ) -> Result<Self> {
        check_columns(&columns, "positional column mapping")?;
        Ok(Self {
            factory: Arc::new(factory),
            columns,
            get: Arc::new(get),
            set: Arc::new(set),
        })
    }

    fn element(&self, values: &[Value], i: usize) -> Value {
        values.get(i).cloned().unwrap_or(Value::Null)
    }

    fn read_elements(&self, row: &RowAccess<'_>) -> Vec<Value> {
        let mut values: Vec<Value> = self
            .columns
            .iter()
            .map(|col| row.value(col).cloned().unwrap_or(Value::Null))
            .collect();
        while values.last().is_some_and(Value::is_null) {
            values.pop();
        }
        values
    }
}

impl<C: Send + Sync> Mapping<C> for PositionalColumnMapping<C> {
    fn columns(&self) -> Vec<Column> {
        self.columns.clone()
    }

    fn insert_values(&self, entity: &C, _ctx: &WriteContext) -> ColumnValues {
        let values = (self.get)(entity);
        if values.len() > self.columns.len() {
            tracing::warn!(
                elements = values.len(),
                columns = self.columns.len(),
                "collection longer than its column set, extra elements dropped"
            );
        }
        self.columns
            .iter()
            .enumerate()
            .map(|(i, col)| (col.clone(), self.element(&values, i)))
            .collect()
    }

    fn update_values(
        &self,
        modified: &C,
        unmodified: Option<&C>,
        all_columns: bool,
        _ctx: &WriteContext,
    ) -> UpdatePayload {
        let new_values = (self.get)(modified);
        let old_values = unmodified.map(|u| (self.get)(u));
        let mut payload = UpdatePayload::new();
        for (i, col) in self.columns.iter().enumerate() {
            let new = self.element(&new_values, i);
            match &old_values {
                Some(old) => {
                    if new != self.element(old, i) {
                        payload.insert(UpwhereColumn::set(col.clone()), new);
                    }
                }
                None => {
                    payload.insert(UpwhereColumn::set(col.clone()), new);
                }
            }
        }
        if payload.is_empty() {
            return payload;
        }
        if all_columns {
            if let Some(old) = &old_values {
                for (i, col) in self.columns.iter().enumerate() {
                    let key = UpwhereColumn::set(col.clone());
                    if !payload.contains_key(&key) {
                        payload.insert(key, self.element(old, i));
                    }
                }
            }
        }
        payload
    }

    fn transform(&self, row: &Row) -> Result<C> {
        let aliases = ColumnAliases::default();
        let access = RowAccess::new(row, &aliases);
        let mut bean = (self.factory)();
        (self.set)(&mut bean, self.read_elements(&access));
        Ok(bean)
    }

    fn property_column_pairs(&self) -> Result<Vec<(&'static str, Column)>> {
        Err(Error::unsupported(
            "property_column_pairs",
            "positional column mapping has no per-property columns",
        ))
    }
}

/// A map-valued property spread over a fixed key-to-column table.
pub struct KeyedColumnMapping<C, K> {
    factory: Arc<dyn Fn() -> C + Send + Sync>,
    entries: Vec<(K, Column)>,
    get: Arc<dyn Fn(&C) -> HashMap<K, Value> + Send + Sync>,
    set: Arc<dyn Fn(&mut C, HashMap<K, Value>) + Send + Sync>,
}

impl<C, K: Clone> Clone for KeyedColumnMapping<C, K> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            entries: self.entries.clone(),
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
        }
    }
}

impl<C, K> KeyedColumnMapping<C, K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Build the mapping; fails fast on an empty or duplicated column set.
    pub fn new(
        factory: impl Fn() -> C + Send + Sync + 'static,
        entries: Vec<(K, Column)>,
        get: impl Fn(&C) -> HashMap<K, Value> + Send + Sync + 'static,
        set: impl Fn(&mut C, HashMap<K, Value>) + Send + Sync + 'static,
    ) -> Result<Self> {
        let columns: Vec<Column> = entries.iter().map(|(_, col)| col.clone()).collect();
        check_columns(&columns, "keyed column mapping")?;
        Ok(Self {
            factory: Arc::new(factory),
            entries,
            get: Arc::new(get),
            set: Arc::new(set),
        })
    }

    fn cell(map: &HashMap<K, Value>, key: &K) -> Value {
        map.get(key).cloned().unwrap_or(Value::Null)
    }
}

impl<C, K> Mapping<C> for KeyedColumnMapping<C, K>
where
    C: Send + Sync,
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn columns(&self) -> Vec<Column> {
        self.entries.iter().map(|(_, col)| col.clone()).collect()
    }

    fn insert_values(&self, entity: &C, _ctx: &WriteContext) -> ColumnValues {
        let map = (self.get)(entity);
        self.entries
            .iter()
            .map(|(key, col)| (col.clone(), Self::cell(&map, key)))
            .collect()
    }

    fn update_values(
        &self,
        modified: &C,
        unmodified: Option<&C>,
        all_columns: bool,
        _ctx: &WriteContext,
    ) -> UpdatePayload {
        let new_map = (self.get)(modified);
        let old_map = unmodified.map(|u| (self.get)(u));
        let mut payload = UpdatePayload::new();
        for (key, col) in &self.entries {
            let new = Self::cell(&new_map, key);
            match &old_map {
                Some(old) => {
                    if new != Self::cell(old, key) {
                        payload.insert(UpwhereColumn::set(col.clone()), new);
                    }
                }
                None => {
                    payload.insert(UpwhereColumn::set(col.clone()), new);
                }
            }
        }
        if payload.is_empty() {
            return payload;
        }
        if all_columns {
            if let Some(old) = &old_map {
                for (key, col) in &self.entries {
                    let entry = UpwhereColumn::set(col.clone());
                    if !payload.contains_key(&entry) {
                        payload.insert(entry, Self::cell(old, key));
                    }
                }
            }
        }
        payload
    }

    fn transform(&self, row: &Row) -> Result<C> {
        let aliases = ColumnAliases::default();
        let access = RowAccess::new(row, &aliases);
        let mut map = HashMap::new();
        for (key, col) in &self.entries {
            if let Some(value) = access.value(col) {
                if !value.is_null() {
                    map.insert(key.clone(), value.clone());
                }
            }
        }
        let mut bean = (self.factory)();
        (self.set)(&mut bean, map);
        Ok(bean)
    }

    fn property_column_pairs(&self) -> Result<Vec<(&'static str, Column)>> {
        Err(Error::unsupported(
            "property_column_pairs",
            "keyed column mapping has no per-property columns",
        ))
    }
}
