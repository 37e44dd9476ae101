//! Declared property/column bindings and shadow columns.
//!
//! A [`PropertyMapping`] is the workhorse behind both a main entity mapping
//! and an embedded value object: a fixed set of (accessor, column) pairs
//! plus shadow-column providers registered independently for insert and
//! update. It is built once at configuration time and immutable afterwards.

use crate::context::WriteContext;
use crate::mapping::{ColumnValues, Mapping, UpdatePayload, UpwhereColumn};
use crate::transformer::{BeanFactory, ColumnAliases, RowAccess};
use relmap_core::{Column, ConfigErrorKind, Error, PropertyAccessor, Result, Row, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// A column with no declared property behind it.
///
/// The provider supplies the value per instance from the entity and the
/// call-scoped [`WriteContext`]; the `accept` predicate lets it opt out for
/// instances it does not apply to. Used for discriminators, list-position
/// columns and owning-side foreign keys.
pub struct ShadowColumnProvider<C> {
    column: Column,
    accept: Arc<dyn Fn(&C, &WriteContext) -> bool + Send + Sync>,
    value: Arc<dyn Fn(&C, &WriteContext) -> Value + Send + Sync>,
}

impl<C> Clone for ShadowColumnProvider<C> {
    fn clone(&self) -> Self {
        Self {
            column: self.column.clone(),
            accept: Arc::clone(&self.accept),
            value: Arc::clone(&self.value),
        }
    }
}

impl<C> std::fmt::Debug for ShadowColumnProvider<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowColumnProvider")
            .field("column", &self.column)
            .finish()
    }
}

impl<C> ShadowColumnProvider<C> {
    /// Provider with an accept predicate.
    pub fn new(
        column: Column,
        accept: impl Fn(&C, &WriteContext) -> bool + Send + Sync + 'static,
        value: impl Fn(&C, &WriteContext) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            column,
            accept: Arc::new(accept),
            value: Arc::new(value),
        }
    }

    /// Provider that applies to every instance.
    pub fn always(
        column: Column,
        value: impl Fn(&C, &WriteContext) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self::new(column, |_, _| true, value)
    }

    /// The shadow column.
    pub fn column(&self) -> &Column {
        &self.column
    }

    /// Whether the provider participates for this instance.
    pub fn accepts(&self, entity: &C, ctx: &WriteContext) -> bool {
        (self.accept)(entity, ctx)
    }

    /// The value to persist for this instance.
    pub fn value(&self, entity: &C, ctx: &WriteContext) -> Value {
        (self.value)(entity, ctx)
    }
}

/// One (accessor, column) pair.
pub struct PropertyBinding<C> {
    accessor: PropertyAccessor<C>,
    column: Column,
    set_by_constructor: bool,
}

impl<C> Clone for PropertyBinding<C> {
    fn clone(&self) -> Self {
        Self {
            accessor: self.accessor.clone(),
            column: self.column.clone(),
            set_by_constructor: self.set_by_constructor,
        }
    }
}

impl<C> PropertyBinding<C> {
    /// The bound accessor.
    pub fn accessor(&self) -> &PropertyAccessor<C> {
        &self.accessor
    }

    /// The bound column.
    pub fn column(&self) -> &Column {
        &self.column
    }

    /// Whether the bean factory supplies this property at construction.
    pub fn is_set_by_constructor(&self) -> bool {
        self.set_by_constructor
    }
}

/// Builder for [`PropertyMapping`]; all checks are fail-fast.
pub struct PropertyMappingBuilder<C> {
    factory: BeanFactory<C>,
    bindings: Vec<PropertyBinding<C>>,
    insert_shadows: Vec<ShadowColumnProvider<C>>,
    update_shadows: Vec<ShadowColumnProvider<C>>,
}

impl<C> PropertyMappingBuilder<C> {
    /// Start a mapping around a bean factory.
    pub fn new(factory: BeanFactory<C>) -> Self {
        Self {
            factory,
            bindings: Vec::new(),
            insert_shadows: Vec::new(),
            update_shadows: Vec::new(),
        }
    }

    /// Bind a property to a column.
    #[must_use]
    pub fn map(mut self, accessor: PropertyAccessor<C>, column: Column) -> Self {
        self.bindings.push(PropertyBinding {
            accessor,
            column,
            set_by_constructor: false,
        });
        self
    }

    /// Bind a constructor-supplied property to a column: the binding is
    /// written on insert/update but skipped during row application, because
    /// the bean factory already consumed the column.
    #[must_use]
    pub fn map_constructor_supplied(
        mut self,
        accessor: PropertyAccessor<C>,
        column: Column,
    ) -> Self {
        self.bindings.push(PropertyBinding {
            accessor,
            column,
            set_by_constructor: true,
        });
        self
    }

    /// Register a shadow column for inserts.
    #[must_use]
    pub fn insert_shadow(mut self, provider: ShadowColumnProvider<C>) -> Self {
        self.insert_shadows.push(provider);
        self
    }

    /// Register a shadow column for updates.
    #[must_use]
    pub fn update_shadow(mut self, provider: ShadowColumnProvider<C>) -> Self {
        self.update_shadows.push(provider);
        self
    }

    /// Validate and freeze the mapping.
    pub fn build(self) -> Result<PropertyMapping<C>> {
        let mut seen: HashSet<Column> = HashSet::new();
        for binding in &self.bindings {
            if !seen.insert(binding.column.clone()) {
                return Err(Error::config(
                    ConfigErrorKind::DuplicateBinding,
                    format!("column '{}' bound twice", binding.column.qualified()),
                ));
            }
        }
        for shadow in self.insert_shadows.iter().chain(&self.update_shadows) {
            if self.bindings.iter().any(|b| b.column == shadow.column) {
                return Err(Error::config(
                    ConfigErrorKind::DuplicateBinding,
                    format!(
                        "shadow column '{}' already bound to a property",
                        shadow.column.qualified()
                    ),
                ));
            }
        }
        for binding in &self.bindings {
            if binding.set_by_constructor {
                if !self.factory.consumes(&binding.column) {
                    return Err(Error::config(
                        ConfigErrorKind::UnbackedConstructorBinding,
                        format!(
                            "property '{}' is marked constructor-supplied but the bean \
                             factory does not consume column '{}'",
                            binding.accessor.name(),
                            binding.column.qualified()
                        ),
                    ));
                }
            } else if !binding.accessor.is_reversible() {
                return Err(Error::config(
                    ConfigErrorKind::Invalid,
                    format!(
                        "property '{}' has no mutator and is not constructor-supplied",
                        binding.accessor.name()
                    ),
                ));
            }
        }
        Ok(PropertyMapping {
            factory: self.factory,
            bindings: self.bindings,
            insert_shadows: self.insert_shadows,
            update_shadows: self.update_shadows,
        })
    }
}

/// Declared property bindings plus shadow columns for one bean type.
pub struct PropertyMapping<C> {
    factory: BeanFactory<C>,
    bindings: Vec<PropertyBinding<C>>,
    insert_shadows: Vec<ShadowColumnProvider<C>>,
    update_shadows: Vec<ShadowColumnProvider<C>>,
}

impl<C> Clone for PropertyMapping<C> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            bindings: self.bindings.clone(),
            insert_shadows: self.insert_shadows.clone(),
            update_shadows: self.update_shadows.clone(),
        }
    }
}

impl<C> PropertyMapping<C> {
    /// Start building a mapping.
    pub fn builder(factory: BeanFactory<C>) -> PropertyMappingBuilder<C> {
        PropertyMappingBuilder::new(factory)
    }

    /// The declared bindings.
    pub fn bindings(&self) -> &[PropertyBinding<C>] {
        &self.bindings
    }

    /// The bean factory.
    pub fn factory(&self) -> &BeanFactory<C> {
        &self.factory
    }

    /// Columns written on insert (auto-generated excluded, shadow insert
    /// columns included).
    pub fn insertable_columns(&self) -> Vec<Column> {
        let mut cols: Vec<Column> = self
            .bindings
            .iter()
            .filter(|b| !b.column.is_auto_generated())
            .map(|b| b.column.clone())
            .collect();
        cols.extend(self.insert_shadows.iter().map(|s| s.column.clone()));
        cols
    }

    /// Columns written on update (primary-key and auto-generated excluded,
    /// shadow update columns included).
    pub fn updatable_columns(&self) -> Vec<Column> {
        let mut cols: Vec<Column> = self
            .updatable_bindings()
            .map(|b| b.column.clone())
            .collect();
        cols.extend(self.update_shadows.iter().map(|s| s.column.clone()));
        cols
    }

    fn updatable_bindings(&self) -> impl Iterator<Item = &PropertyBinding<C>> {
        self.bindings
            .iter()
            .filter(|b| !b.column.is_primary_key() && !b.column.is_auto_generated())
    }

    /// Values for inserting `entity`: declared properties first, then
    /// accepting shadow providers.
    pub fn insert_values(&self, entity: &C, ctx: &WriteContext) -> ColumnValues {
        let mut values = ColumnValues::new();
        for binding in &self.bindings {
            if binding.column.is_auto_generated() {
                continue;
            }
            values.insert(binding.column.clone(), binding.accessor.get(entity));
        }
        for shadow in &self.insert_shadows {
            if shadow.accepts(entity, ctx) {
                values.insert(shadow.column.clone(), shadow.value(entity, ctx));
            }
        }
        values
    }

    /// SET entries for updating `modified` (see the [`Mapping`] contract).
    ///
    /// Update shadow providers fire only when at least one declared
    /// property changed.
    pub fn update_values(
        &self,
        modified: &C,
        unmodified: Option<&C>,
        all_columns: bool,
        ctx: &WriteContext,
    ) -> UpdatePayload {
        let mut payload = UpdatePayload::new();
        for binding in self.updatable_bindings() {
            let new = binding.accessor.get(modified);
            match unmodified {
                Some(prior) => {
                    if new != binding.accessor.get(prior) {
                        payload.insert(UpwhereColumn::set(binding.column.clone()), new);
                    }
                }
                None => {
                    payload.insert(UpwhereColumn::set(binding.column.clone()), new);
                }
            }
        }
        if payload.is_empty() {
            return payload;
        }
        if all_columns {
            let source = unmodified.unwrap_or(modified);
            for binding in self.updatable_bindings() {
                let key = UpwhereColumn::set(binding.column.clone());
                if !payload.contains_key(&key) {
                    payload.insert(key, binding.accessor.get(source));
                }
            }
        }
        for shadow in &self.update_shadows {
            if shadow.accepts(modified, ctx) {
                payload.insert(
                    UpwhereColumn::set(shadow.column.clone()),
                    shadow.value(modified, ctx),
                );
            }
        }
        payload
    }

    /// Current values of every updatable declared property, read from
    /// `source`. Used for all-columns backfill at the composition level.
    pub fn updatable_values(&self, source: &C) -> ColumnValues {
        self.updatable_bindings()
            .map(|b| (b.column.clone(), b.accessor.get(source)))
            .collect()
    }

    /// Apply a row to an existing bean.
    ///
    /// Constructor-supplied bindings are skipped; columns absent from the
    /// row are skipped as well (partial selects).
    pub fn apply_row(&self, row: &RowAccess<'_>, bean: &mut C) -> Result<()> {
        for binding in &self.bindings {
            if binding.set_by_constructor {
                continue;
            }
            if let Some(value) = row.value(&binding.column) {
                binding.accessor.set(bean, value.clone())?;
            }
        }
        Ok(())
    }

    /// Whether the row holds a non-default value for any bound column.
    ///
    /// Drives lazy embedded instantiation: an all-default slice means the
    /// embedded property stays unset. Default-ness is type-aware (NULL for
    /// reference-typed columns, zero for primitive-backed ones).
    pub fn has_non_default(&self, row: &RowAccess<'_>) -> bool {
        self.bindings.iter().any(|b| {
            row.value(&b.column)
                .is_some_and(|v| !b.column.is_default_value(v))
        })
    }

    /// Build a bean from an aliased row view.
    pub fn transform_access(&self, row: &RowAccess<'_>) -> Result<C> {
        let mut bean = self.factory.new_instance(row)?;
        self.apply_row(row, &mut bean)?;
        Ok(bean)
    }
}

impl<C: Send + Sync> Mapping<C> for PropertyMapping<C> {
    fn columns(&self) -> Vec<Column> {
        let mut cols: Vec<Column> = self.bindings.iter().map(|b| b.column.clone()).collect();
        for shadow in self.insert_shadows.iter().chain(&self.update_shadows) {
            if !cols.contains(&shadow.column) {
                cols.push(shadow.column.clone());
            }
        }
        cols
    }

    fn insert_values(&self, entity: &C, ctx: &WriteContext) -> ColumnValues {
        PropertyMapping::insert_values(self, entity, ctx)
    }

    fn update_values(
        &self,
        modified: &C,
        unmodified: Option<&C>,
        all_columns: bool,
        ctx: &WriteContext,
    ) -> UpdatePayload {
        PropertyMapping::update_values(self, modified, unmodified, all_columns, ctx)
    }

    fn transform(&self, row: &Row) -> Result<C> {
        let aliases = ColumnAliases::default();
        self.transform_access(&RowAccess::new(row, &aliases))
    }

    fn property_column_pairs(&self) -> Result<Vec<(&'static str, Column)>> {
        Ok(self
            .bindings
            .iter()
            .map(|b| (b.accessor.name(), b.column.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::row_from_values;
    use relmap_core::{ColumnDef, SqlType, Table, property};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Person {
        id: Option<i64>,
        name: String,
        age: Option<i32>,
    }

    fn person_table() -> Table {
        Table::build(
            "person",
            vec![
                ColumnDef::new("id", SqlType::BigInt)
                    .primary_key(true)
                    .auto_generated(true),
                ColumnDef::new("name", SqlType::Text).nullable(false),
                ColumnDef::new("age", SqlType::Integer),
            ],
        )
        .unwrap()
    }

    fn person_mapping(table: &Table) -> PropertyMapping<Person> {
        PropertyMapping::builder(BeanFactory::from_fn(Person::default))
            .map(
                property("id", |p: &Person| p.id, |p: &mut Person, v| p.id = v),
                table.column("id").unwrap().clone(),
            )
            .map(
                property(
                    "name",
                    |p: &Person| p.name.clone(),
                    |p: &mut Person, v| p.name = v,
                ),
                table.column("name").unwrap().clone(),
            )
            .map(
                property("age", |p: &Person| p.age, |p: &mut Person, v| p.age = v),
                table.column("age").unwrap().clone(),
            )
            .build()
            .unwrap()
    }

    fn ada() -> Person {
        Person {
            id: Some(1),
            name: "Ada".to_string(),
            age: Some(36),
        }
    }

    #[test]
    fn test_insert_skips_auto_generated() {
        let table = person_table();
        let mapping = person_mapping(&table);
        let values = mapping.insert_values(&ada(), &WriteContext::new());
        assert!(!values.contains_key(table.column("id").unwrap()));
        assert_eq!(
            values.get(table.column("name").unwrap()),
            Some(&Value::Text("Ada".to_string()))
        );
        assert_eq!(values.get(table.column("age").unwrap()), Some(&Value::Int(36)));
    }

    #[test]
    fn test_update_emits_only_changes() {
        let table = person_table();
        let mapping = person_mapping(&table);
        let before = ada();
        let mut after = ada();
        after.age = Some(37);

        let payload = mapping.update_values(&after, Some(&before), false, &WriteContext::new());
        assert_eq!(payload.len(), 1);
        assert_eq!(
            payload.get(&UpwhereColumn::set(table.column("age").unwrap().clone())),
            Some(&Value::Int(37))
        );
    }

    #[test]
    fn test_update_unchanged_is_empty() {
        let table = person_table();
        let mapping = person_mapping(&table);
        let a = ada();
        let b = ada();
        assert!(mapping
            .update_values(&a, Some(&b), false, &WriteContext::new())
            .is_empty());
    }

    #[test]
    fn test_update_without_snapshot_is_full_overwrite() {
        let table = person_table();
        let mapping = person_mapping(&table);
        let payload = mapping.update_values(&ada(), None, false, &WriteContext::new());
        // id is excluded (primary key); name and age are both emitted.
        assert_eq!(payload.len(), 2);
    }

    #[test]
    fn test_all_columns_backfills_from_snapshot() {
        let table = person_table();
        let mapping = person_mapping(&table);
        let before = ada();
        let mut after = ada();
        after.age = Some(40);

        let payload = mapping.update_values(&after, Some(&before), true, &WriteContext::new());
        assert_eq!(
            payload.get(&UpwhereColumn::set(table.column("age").unwrap().clone())),
            Some(&Value::Int(40))
        );
        // Unchanged name is backfilled from the snapshot.
        assert_eq!(
            payload.get(&UpwhereColumn::set(table.column("name").unwrap().clone())),
            Some(&Value::Text("Ada".to_string()))
        );
    }

    #[test]
    fn test_shadow_columns_gated_by_accept() {
        let table = person_table();
        let discriminator = Table::build(
            "person",
            vec![
                ColumnDef::new("id", SqlType::BigInt).primary_key(true),
                ColumnDef::new("kind", SqlType::Text),
            ],
        )
        .unwrap()
        .column("kind")
        .unwrap()
        .clone();

        let mapping = PropertyMapping::builder(BeanFactory::from_fn(Person::default))
            .map(
                property(
                    "name",
                    |p: &Person| p.name.clone(),
                    |p: &mut Person, v| p.name = v,
                ),
                table.column("name").unwrap().clone(),
            )
            .insert_shadow(ShadowColumnProvider::new(
                discriminator.clone(),
                |p: &Person, _| p.age.is_some(),
                |_, _| Value::Text("adult".to_string()),
            ))
            .build()
            .unwrap();

        let with_age = ada();
        let values = mapping.insert_values(&with_age, &WriteContext::new());
        assert_eq!(values.get(&discriminator), Some(&Value::Text("adult".to_string())));

        let without_age = Person {
            age: None,
            ..ada()
        };
        let values = mapping.insert_values(&without_age, &WriteContext::new());
        assert!(!values.contains_key(&discriminator));
    }

    #[test]
    fn test_duplicate_binding_fails_fast() {
        let table = person_table();
        let result = PropertyMapping::builder(BeanFactory::from_fn(Person::default))
            .map(
                property(
                    "name",
                    |p: &Person| p.name.clone(),
                    |p: &mut Person, v| p.name = v,
                ),
                table.column("name").unwrap().clone(),
            )
            .map(
                property(
                    "name2",
                    |p: &Person| p.name.clone(),
                    |p: &mut Person, v| p.name = v,
                ),
                table.column("name").unwrap().clone(),
            )
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_constructor_binding_must_be_backed_by_factory() {
        let table = person_table();
        let name_col = table.column("name").unwrap().clone();
        // Factory does not consume the name column: build must fail loudly.
        let result = PropertyMapping::builder(BeanFactory::from_fn(Person::default))
            .map_constructor_supplied(
                property(
                    "name",
                    |p: &Person| p.name.clone(),
                    |p: &mut Person, v| p.name = v,
                ),
                name_col,
            )
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_round_trip() {
        let table = person_table();
        let mapping = person_mapping(&table);
        let person = ada();
        let mut values = mapping.insert_values(&person, &WriteContext::new());
        // Simulate the database echoing the generated key back.
        values.insert(table.column("id").unwrap().clone(), Value::BigInt(1));
        let row = row_from_values(&values);
        let rebuilt = mapping.transform(&row).unwrap();
        assert_eq!(rebuilt, person);
    }
}
