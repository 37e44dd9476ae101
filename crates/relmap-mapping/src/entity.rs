//! Entity mapping composition.
//!
//! An [`EntityMapping`] merges one main property mapping, the identifier
//! strategy, any number of embedded sub-mappings (each behind an
//! [`Embedding`] lens) and an optional version column, and derives the
//! insertable/updatable/selectable column sets from its parts.

use crate::context::WriteContext;
use crate::id::IdMapping;
use crate::mapping::{ColumnValues, Mapping, UpdatePayload, UpwhereColumn};
use crate::property::PropertyMapping;
use crate::transformer::{RowAccess, RowStep, RowTransformer, TransformListener};
use crate::version::VersioningStrategy;
use relmap_core::{Column, ConfigErrorKind, Embedding, Error, Result, Row, Table, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// A type-erased embedded sub-mapping, addressed through its lens.
///
/// Built once from an [`Embedding`] and the embedded value's own
/// [`PropertyMapping`]; the parent entity mapping walks these nodes for
/// both value computation and row transformation.
pub struct EmbeddedRelation<C> {
    name: &'static str,
    columns: Vec<Column>,
    insertable: Vec<Column>,
    updatable: Vec<Column>,
    property_pairs: Vec<(&'static str, Column)>,
    insert_values_fn: Arc<dyn Fn(&C, &WriteContext) -> ColumnValues + Send + Sync>,
    update_values_fn: Arc<dyn Fn(&C, Option<&C>, &WriteContext) -> UpdatePayload + Send + Sync>,
    updatable_values_fn: Arc<dyn Fn(&C) -> ColumnValues + Send + Sync>,
    row_step: RowStep<C>,
}

impl<C> Clone for EmbeddedRelation<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            columns: self.columns.clone(),
            insertable: self.insertable.clone(),
            updatable: self.updatable.clone(),
            property_pairs: self.property_pairs.clone(),
            insert_values_fn: Arc::clone(&self.insert_values_fn),
            update_values_fn: Arc::clone(&self.update_values_fn),
            updatable_values_fn: Arc::clone(&self.updatable_values_fn),
            row_step: Arc::clone(&self.row_step),
        }
    }
}

impl<C> std::fmt::Debug for EmbeddedRelation<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedRelation")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .finish()
    }
}

impl<C> EmbeddedRelation<C> {
    /// Compose an embedded node from its lens and mapping.
    pub fn build<E: Send + Sync + 'static>(
        embedding: Embedding<C, E>,
        mapping: PropertyMapping<E>,
    ) -> Self
    where
        C: 'static,
    {
        let name = embedding.name();
        let mapping = Arc::new(mapping);
        let columns: Vec<Column> = mapping.bindings().iter().map(|b| b.column().clone()).collect();
        let insertable = mapping.insertable_columns();
        let updatable = mapping.updatable_columns();
        let property_pairs: Vec<(&'static str, Column)> = mapping
            .bindings()
            .iter()
            .map(|b| (b.accessor().name(), b.column().clone()))
            .collect();

        let insert_values_fn = {
            let embedding = embedding.clone();
            let mapping = Arc::clone(&mapping);
            let insertable = insertable.clone();
            Arc::new(move |parent: &C, ctx: &WriteContext| match embedding.read(parent) {
                Some(value) => mapping.insert_values(&value, ctx),
                None => insertable
                    .iter()
                    .cloned()
                    .map(|col| (col, Value::Null))
                    .collect(),
            }) as Arc<dyn Fn(&C, &WriteContext) -> ColumnValues + Send + Sync>
        };

        let update_values_fn = {
            let embedding = embedding.clone();
            let mapping = Arc::clone(&mapping);
            let updatable = updatable.clone();
            let null_out = move || -> UpdatePayload {
                updatable
                    .iter()
                    .cloned()
                    .map(|col| (UpwhereColumn::set(col), Value::Null))
                    .collect()
            };
            Arc::new(
                move |modified: &C, unmodified: Option<&C>, ctx: &WriteContext| {
                    match (embedding.read(modified), unmodified) {
                        (Some(new), Some(prior_parent)) => match embedding.read(prior_parent) {
                            Some(prior) => mapping.update_values(&new, Some(&prior), false, ctx),
                            None => mapping.update_values(&new, None, false, ctx),
                        },
                        (Some(new), None) => mapping.update_values(&new, None, false, ctx),
                        (None, Some(prior_parent)) => {
                            if embedding.read(prior_parent).is_some() {
                                null_out()
                            } else {
                                UpdatePayload::new()
                            }
                        }
                        (None, None) => null_out(),
                    }
                },
            )
                as Arc<dyn Fn(&C, Option<&C>, &WriteContext) -> UpdatePayload + Send + Sync>
        };

        let updatable_values_fn = {
            let embedding = embedding.clone();
            let mapping = Arc::clone(&mapping);
            let updatable = updatable.clone();
            Arc::new(move |parent: &C| match embedding.read(parent) {
                Some(value) => mapping.updatable_values(&value),
                None => updatable
                    .iter()
                    .cloned()
                    .map(|col| (col, Value::Null))
                    .collect(),
            }) as Arc<dyn Fn(&C) -> ColumnValues + Send + Sync>
        };

        // Lazy instantiation: the whole slice is inspected before anything
        // is written into the parent; an all-default slice leaves the
        // property unset.
        let row_step: RowStep<C> = {
            let mapping = Arc::clone(&mapping);
            Arc::new(move |row: &RowAccess<'_>, parent: &mut C| {
                if mapping.has_non_default(row) {
                    let bean = mapping.transform_access(row)?;
                    embedding.write(parent, bean);
                }
                Ok(())
            })
        };

        Self {
            name,
            columns,
            insertable,
            updatable,
            property_pairs,
            insert_values_fn,
            update_values_fn,
            updatable_values_fn,
            row_step,
        }
    }

    /// The embedded property's name on the parent.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Every column of the embedded mapping.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Columns written on insert.
    pub fn insertable_columns(&self) -> &[Column] {
        &self.insertable
    }

    /// Columns written on update.
    pub fn updatable_columns(&self) -> &[Column] {
        &self.updatable
    }

    /// (property, column) pairs of the embedded mapping.
    pub fn property_pairs(&self) -> &[(&'static str, Column)] {
        &self.property_pairs
    }

    /// Insert values of the embedded slice (NULLs when the property is
    /// unset).
    pub fn insert_values(&self, parent: &C, ctx: &WriteContext) -> ColumnValues {
        (self.insert_values_fn)(parent, ctx)
    }

    /// Changed columns of the embedded slice.
    pub fn update_values(
        &self,
        modified: &C,
        unmodified: Option<&C>,
        ctx: &WriteContext,
    ) -> UpdatePayload {
        (self.update_values_fn)(modified, unmodified, ctx)
    }

    /// Current values of every updatable embedded column.
    pub fn updatable_values(&self, parent: &C) -> ColumnValues {
        (self.updatable_values_fn)(parent)
    }

    /// The row-application step for this node.
    pub fn row_step(&self) -> RowStep<C> {
        Arc::clone(&self.row_step)
    }
}

/// Builder for [`EntityMapping`]; all checks are fail-fast.
pub struct EntityMappingBuilder<C> {
    table: Table,
    main: PropertyMapping<C>,
    id: IdMapping<C>,
    embedded: Vec<EmbeddedRelation<C>>,
    version: Option<VersioningStrategy<C>>,
    transform_listeners: Vec<Arc<dyn TransformListener<C>>>,
}

impl<C> EntityMappingBuilder<C> {
    /// Start from the table, the main mapping and the identifier strategy.
    pub fn new(table: Table, main: PropertyMapping<C>, id: IdMapping<C>) -> Self {
        Self {
            table,
            main,
            id,
            embedded: Vec::new(),
            version: None,
            transform_listeners: Vec::new(),
        }
    }

    /// Add an embedded sub-mapping.
    #[must_use]
    pub fn embed(mut self, relation: EmbeddedRelation<C>) -> Self {
        self.embedded.push(relation);
        self
    }

    /// Enable optimistic locking through a version column.
    #[must_use]
    pub fn versioned_by(mut self, strategy: VersioningStrategy<C>) -> Self {
        self.version = Some(strategy);
        self
    }

    /// Register a transform listener, notified with every bean read.
    #[must_use]
    pub fn transform_listener(mut self, listener: Arc<dyn TransformListener<C>>) -> Self {
        self.transform_listeners.push(listener);
        self
    }

    /// Validate and freeze the mapping.
    pub fn build(self) -> Result<EntityMapping<C>>
    where
        C: 'static,
    {
        let id_columns = self.id.columns().to_vec();
        for col in &id_columns {
            if !self.table.contains(col) {
                return Err(Error::config(
                    ConfigErrorKind::MissingIdentifier,
                    format!(
                        "identifier column '{}' does not belong to table '{}'",
                        col.qualified(),
                        self.table.name()
                    ),
                ));
            }
            if !col.is_primary_key() {
                return Err(Error::config(
                    ConfigErrorKind::MissingIdentifier,
                    format!("identifier column '{}' is not a primary-key column", col.qualified()),
                ));
            }
        }

        let mut seen: HashSet<Column> = HashSet::new();
        let mut claim = |col: &Column| -> Result<()> {
            if !seen.insert(col.clone()) {
                return Err(Error::config(
                    ConfigErrorKind::DuplicateBinding,
                    format!("column '{}' mapped by more than one part", col.qualified()),
                ));
            }
            Ok(())
        };
        for binding in self.main.bindings() {
            claim(binding.column())?;
        }
        for relation in &self.embedded {
            for col in relation.columns() {
                claim(col)?;
            }
        }
        if let Some(version) = &self.version {
            claim(version.column())?;
        }

        let main = Arc::new(self.main);
        let id = Arc::new(self.id);

        let mut builder = RowTransformer::builder(main.factory().clone());
        {
            let main = Arc::clone(&main);
            builder = builder.step(Arc::new(move |row: &RowAccess<'_>, bean: &mut C| {
                main.apply_row(row, bean)
            }));
        }
        let factory_consumes_id = id_columns
            .iter()
            .all(|col| main.factory().consumes(col));
        if !factory_consumes_id {
            let id = Arc::clone(&id);
            builder = builder.step(Arc::new(move |row: &RowAccess<'_>, bean: &mut C| {
                id.fix_from_row(row, bean)
            }));
        }
        if let Some(version) = &self.version {
            let version = version.clone();
            builder = builder.step(Arc::new(move |row: &RowAccess<'_>, bean: &mut C| {
                // Restore the persisted version so the next update's WHERE
                // clause matches.
                if let Some(value) = row.value(version.column()) {
                    if !value.is_null() {
                        version.write_back(bean, value.clone())?;
                    }
                }
                Ok(())
            }));
        }
        for relation in &self.embedded {
            builder = builder.step(relation.row_step());
        }
        for listener in self.transform_listeners {
            builder = builder.listener(listener);
        }
        let transformer = builder.build();

        Ok(EntityMapping {
            table: self.table,
            main,
            id,
            embedded: self.embedded,
            version: self.version,
            transformer,
        })
    }
}

/// The per-entity composition root: main mapping + identifier + embedded
/// sub-mappings + optional version column.
pub struct EntityMapping<C> {
    table: Table,
    main: Arc<PropertyMapping<C>>,
    id: Arc<IdMapping<C>>,
    embedded: Vec<EmbeddedRelation<C>>,
    version: Option<VersioningStrategy<C>>,
    transformer: RowTransformer<C>,
}

impl<C> Clone for EntityMapping<C> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            main: Arc::clone(&self.main),
            id: Arc::clone(&self.id),
            embedded: self.embedded.clone(),
            version: self.version.clone(),
            transformer: self.transformer.clone(),
        }
    }
}

impl<C> EntityMapping<C> {
    /// Start building an entity mapping.
    pub fn builder(table: Table, main: PropertyMapping<C>, id: IdMapping<C>) -> EntityMappingBuilder<C> {
        EntityMappingBuilder::new(table, main, id)
    }

    /// The mapped table.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// The main property mapping.
    pub fn main(&self) -> &PropertyMapping<C> {
        &self.main
    }

    /// The identifier strategy.
    pub fn id_mapping(&self) -> &IdMapping<C> {
        &self.id
    }

    /// The embedded sub-mappings.
    pub fn embedded(&self) -> &[EmbeddedRelation<C>] {
        &self.embedded
    }

    /// The version strategy, when optimistic locking is on.
    pub fn version(&self) -> Option<&VersioningStrategy<C>> {
        self.version.as_ref()
    }

    /// Columns written on insert: main + embedded + identifier + version,
    /// minus auto-generated columns.
    pub fn insertable_columns(&self) -> Vec<Column> {
        let mut cols = self.main.insertable_columns();
        for relation in &self.embedded {
            push_unique(&mut cols, relation.insertable_columns());
        }
        if !self.id.is_database_generated() {
            let id_cols: Vec<Column> = self
                .id
                .columns()
                .iter()
                .filter(|c| !c.is_auto_generated())
                .cloned()
                .collect();
            push_unique(&mut cols, &id_cols);
        }
        if let Some(version) = &self.version {
            push_unique(&mut cols, std::slice::from_ref(version.column()));
        }
        cols
    }

    /// Columns written on update: main + embedded + version, minus
    /// primary-key and auto-generated columns.
    pub fn updatable_columns(&self) -> Vec<Column> {
        let mut cols = self.main.updatable_columns();
        for relation in &self.embedded {
            push_unique(&mut cols, relation.updatable_columns());
        }
        if let Some(version) = &self.version {
            push_unique(&mut cols, std::slice::from_ref(version.column()));
        }
        cols
    }

    /// Columns read on select: every mapped column plus identifier and
    /// version columns, read-only ones included.
    pub fn selectable_columns(&self) -> Vec<Column> {
        let mut cols: Vec<Column> = self
            .main
            .bindings()
            .iter()
            .map(|b| b.column().clone())
            .collect();
        for relation in &self.embedded {
            push_unique(&mut cols, relation.columns());
        }
        push_unique(&mut cols, self.id.columns());
        if let Some(version) = &self.version {
            push_unique(&mut cols, std::slice::from_ref(version.column()));
        }
        cols
    }

    /// Insert payload for one entity.
    pub fn insert_values(&self, entity: &C, ctx: &WriteContext) -> ColumnValues {
        let mut values = self.main.insert_values(entity, ctx);
        for relation in &self.embedded {
            values.extend(relation.insert_values(entity, ctx));
        }
        if !self.id.is_database_generated() {
            for (col, value) in self
                .id
                .columns()
                .iter()
                .zip(self.id.id_values(entity))
            {
                if !col.is_auto_generated() {
                    values.insert(col.clone(), value);
                }
            }
        }
        if let Some(version) = &self.version {
            values.insert(version.column().clone(), version.current_value(entity));
        }
        values
    }

    /// Update payload for one entity (see the [`Mapping`] contract).
    ///
    /// The payload is empty when nothing changed, and also when `modified`
    /// and `unmodified` carry different identifiers: a diff across two
    /// identities is meaningless and producing one would corrupt the
    /// wrong row.
    pub fn update_values(
        &self,
        modified: &C,
        unmodified: Option<&C>,
        all_columns: bool,
        ctx: &WriteContext,
    ) -> UpdatePayload {
        if let Some(prior) = unmodified {
            if !self.id.same_id(modified, prior) {
                tracing::debug!(
                    table = self.table.name(),
                    "cross-identity update request ignored"
                );
                return UpdatePayload::new();
            }
        }
        let mut payload = self.main.update_values(modified, unmodified, false, ctx);
        for relation in &self.embedded {
            payload.extend(relation.update_values(modified, unmodified, ctx));
        }
        if payload.is_empty() {
            return payload;
        }
        if all_columns {
            let source = unmodified.unwrap_or(modified);
            let mut full = self.main.updatable_values(source);
            for relation in &self.embedded {
                full.extend(relation.updatable_values(source));
            }
            for (col, value) in full {
                let key = UpwhereColumn::set(col);
                if !payload.contains_key(&key) {
                    payload.insert(key, value);
                }
            }
        }
        if let Some(version) = &self.version {
            let old = version.current_value(unmodified.unwrap_or(modified));
            payload.insert(
                UpwhereColumn::set(version.column().clone()),
                version.next_value(&old),
            );
            payload.insert(UpwhereColumn::condition(version.column().clone()), old);
        }
        for (col, value) in self.id.where_values(unmodified.unwrap_or(modified)) {
            payload.insert(UpwhereColumn::condition(col), value);
        }
        payload
    }

    /// Identifier predicate for deleting one entity.
    pub fn delete_predicate(&self, entity: &C) -> ColumnValues {
        self.id.where_values(entity)
    }

    /// Whether the entity has not been persisted yet.
    pub fn is_new(&self, entity: &C) -> bool {
        self.id.is_new(entity)
    }

    /// Identifier component values.
    pub fn id_values(&self, entity: &C) -> Vec<Value> {
        self.id.id_values(entity)
    }

    /// Assign a before-insert generated identifier, when configured.
    pub fn prepare_for_insert(&self, entity: &mut C) -> Result<()> {
        self.id.prepare_for_insert(entity)
    }

    /// Raise the persisted marker, for already-assigned identifiers.
    pub fn mark_persisted(&self, entity: &mut C) {
        self.id.mark_persisted(entity);
    }

    /// Build an entity from a row.
    pub fn transform(&self, row: &Row) -> Result<C> {
        self.transformer.transform(row)
    }

    /// The configured row transformer.
    pub fn transformer(&self) -> &RowTransformer<C> {
        &self.transformer
    }

    /// A transformer copy bound to different column-to-row-key resolution.
    pub fn transformer_with_aliases(
        &self,
        aliases: crate::transformer::ColumnAliases,
    ) -> RowTransformer<C> {
        self.transformer.copy_with_aliases(aliases)
    }
}

impl<C: Send + Sync> Mapping<C> for EntityMapping<C> {
    fn columns(&self) -> Vec<Column> {
        self.selectable_columns()
    }

    fn insert_values(&self, entity: &C, ctx: &WriteContext) -> ColumnValues {
        EntityMapping::insert_values(self, entity, ctx)
    }

    fn update_values(
        &self,
        modified: &C,
        unmodified: Option<&C>,
        all_columns: bool,
        ctx: &WriteContext,
    ) -> UpdatePayload {
        EntityMapping::update_values(self, modified, unmodified, all_columns, ctx)
    }

    fn transform(&self, row: &Row) -> Result<C> {
        EntityMapping::transform(self, row)
    }

    fn property_column_pairs(&self) -> Result<Vec<(&'static str, Column)>> {
        let mut pairs: Vec<(&'static str, Column)> = self
            .main
            .bindings()
            .iter()
            .map(|b| (b.accessor().name(), b.column().clone()))
            .collect();
        for relation in &self.embedded {
            pairs.extend(relation.property_pairs().iter().cloned());
        }
        Ok(pairs)
    }
}

fn push_unique(into: &mut Vec<Column>, columns: &[Column]) {
    for col in columns {
        if !into.contains(col) {
            into.push(col.clone());
        }
    }
}
