//! Foreign-key-owned collection cascade.
//!
//! The target table carries the owning-side foreign key (and, for ordered
//! collections, a position column); both are shadow columns of the target
//! mapping fed from the call-scoped [`WriteContext`], since the target
//! type itself may have no property pointing back at its owner.

use crate::descriptor::ManyRelationDescriptor;
use crate::diff::CollectionDiffer;
use crate::persister::RelationHook;
use crate::plan::{WriteOp, WritePlan};
use relmap_core::{Column, ConfigErrorKind, Error, Result, Value};
use relmap_mapping::{
    ColumnValues, EntityMapping, ShadowColumnProvider, UpdatePayload, UpwhereColumn, WriteContext,
};
use std::sync::Arc;

/// Builder for [`OneToManyRelation`]; checks are fail-fast.
pub struct OneToManyRelationBuilder<SRC, TRGT> {
    source: Arc<EntityMapping<SRC>>,
    target: Arc<EntityMapping<TRGT>>,
    descriptor: ManyRelationDescriptor<SRC, TRGT>,
    fk_columns: Vec<Column>,
    index_column: Option<Column>,
    orphan_removal: bool,
    cascade_delete: bool,
}

impl<SRC, TRGT> OneToManyRelationBuilder<SRC, TRGT>
where
    SRC: Send + Sync + 'static,
    TRGT: Clone + Send + Sync + 'static,
{
    /// Keep collection order in the given target-row column.
    #[must_use]
    pub fn indexed_by(mut self, column: Column) -> Self {
        self.index_column = Some(column);
        self
    }

    /// Delete target rows that leave the collection instead of nulling
    /// their foreign key.
    #[must_use]
    pub fn orphan_removal(mut self, value: bool) -> Self {
        self.orphan_removal = value;
        self
    }

    /// Delete target rows when the source is deleted instead of nulling
    /// their foreign keys.
    #[must_use]
    pub fn cascade_delete(mut self, value: bool) -> Self {
        self.cascade_delete = value;
        self
    }

    /// Validate and freeze the engine.
    pub fn build(self) -> Result<OneToManyRelation<SRC, TRGT>> {
        if self.fk_columns.is_empty() {
            return Err(Error::config(
                ConfigErrorKind::Invalid,
                "one-to-many relation needs at least one foreign-key column",
            ));
        }
        for col in self.fk_columns.iter().chain(self.index_column.as_ref()) {
            if !self.target.table().contains(col) {
                return Err(Error::config(
                    ConfigErrorKind::Invalid,
                    format!(
                        "column '{}' does not belong to target table '{}'",
                        col.qualified(),
                        self.target.table().name()
                    ),
                ));
            }
        }
        if self.fk_columns.len() != self.source.id_mapping().columns().len() {
            return Err(Error::config(
                ConfigErrorKind::Invalid,
                format!(
                    "{} foreign-key column(s) for {} source identifier column(s)",
                    self.fk_columns.len(),
                    self.source.id_mapping().columns().len()
                ),
            ));
        }

        let mut shadows: Vec<ShadowColumnProvider<TRGT>> = Vec::new();
        for (i, col) in self.fk_columns.iter().cloned().enumerate() {
            shadows.push(ShadowColumnProvider::new(
                col,
                move |_: &TRGT, ctx: &WriteContext| ctx.owner_component(i).is_some(),
                move |_: &TRGT, ctx: &WriteContext| {
                    ctx.owner_component(i).cloned().unwrap_or(Value::Null)
                },
            ));
        }
        if let Some(col) = self.index_column.clone() {
            shadows.push(ShadowColumnProvider::new(
                col,
                |_: &TRGT, ctx: &WriteContext| ctx.index().is_some(),
                |_: &TRGT, ctx: &WriteContext| {
                    ctx.index().map(Value::BigInt).unwrap_or(Value::Null)
                },
            ));
        }

        let target = Arc::clone(&self.target);
        let differ = CollectionDiffer::new(move |t: &TRGT| target.id_values(t));

        Ok(OneToManyRelation {
            source: self.source,
            target: self.target,
            descriptor: self.descriptor,
            fk_columns: self.fk_columns,
            index_column: self.index_column,
            orphan_removal: self.orphan_removal,
            cascade_delete: self.cascade_delete,
            shadows,
            differ,
        })
    }
}

/// Cascade engine for a collection whose target rows own the foreign key.
pub struct OneToManyRelation<SRC, TRGT> {
    source: Arc<EntityMapping<SRC>>,
    target: Arc<EntityMapping<TRGT>>,
    descriptor: ManyRelationDescriptor<SRC, TRGT>,
    fk_columns: Vec<Column>,
    index_column: Option<Column>,
    orphan_removal: bool,
    cascade_delete: bool,
    shadows: Vec<ShadowColumnProvider<TRGT>>,
    differ: CollectionDiffer<TRGT>,
}

impl<SRC, TRGT> OneToManyRelation<SRC, TRGT>
where
    SRC: Send + Sync + 'static,
    TRGT: Clone + Send + Sync + 'static,
{
    /// Start building the engine.
    pub fn builder(
        source: Arc<EntityMapping<SRC>>,
        target: Arc<EntityMapping<TRGT>>,
        descriptor: ManyRelationDescriptor<SRC, TRGT>,
        fk_columns: Vec<Column>,
    ) -> OneToManyRelationBuilder<SRC, TRGT> {
        OneToManyRelationBuilder {
            source,
            target,
            descriptor,
            fk_columns,
            index_column: None,
            orphan_removal: false,
            cascade_delete: false,
        }
    }

    /// Whether collection order is persisted.
    pub fn is_ordered(&self) -> bool {
        self.index_column.is_some()
    }

    fn context_for(&self, source: &SRC, index: Option<usize>) -> WriteContext {
        let mut ctx = WriteContext::for_owner(self.source.id_values(source));
        if let Some(i) = index {
            ctx = ctx.at_index(i as i64);
        }
        ctx
    }

    fn element_index(&self, position: usize) -> Option<usize> {
        self.index_column.as_ref().map(|_| position)
    }

    /// Target insert values with the engine's shadow columns applied on
    /// top of the declared ones.
    fn target_insert_values(&self, target: &TRGT, ctx: &WriteContext) -> ColumnValues {
        let mut values = self.target.insert_values(target, ctx);
        for shadow in &self.shadows {
            if shadow.accepts(target, ctx) {
                values.insert(shadow.column().clone(), shadow.value(target, ctx));
            }
        }
        values
    }

    /// Attach an existing target to the source: rewrite its foreign key
    /// (and position) without touching any other column.
    fn attach_update(&self, target: &TRGT, ctx: &WriteContext) -> UpdatePayload {
        let mut payload = UpdatePayload::new();
        for shadow in &self.shadows {
            if shadow.accepts(target, ctx) {
                payload.insert(
                    UpwhereColumn::set(shadow.column().clone()),
                    shadow.value(target, ctx),
                );
            }
        }
        for (col, value) in self.target.delete_predicate(target) {
            payload.insert(UpwhereColumn::condition(col), value);
        }
        payload
    }

    /// Detach a target: null its foreign key (and position).
    fn detach_update(&self, target: &TRGT) -> UpdatePayload {
        let mut payload = UpdatePayload::new();
        for col in self.fk_columns.iter().chain(self.index_column.as_ref()) {
            payload.insert(UpwhereColumn::set(col.clone()), Value::Null);
        }
        for (col, value) in self.target.delete_predicate(target) {
            payload.insert(UpwhereColumn::condition(col), value);
        }
        payload
    }

    /// Null every foreign key (and position) pointing at one source id,
    /// in a single statement.
    fn detach_all_update(&self, source_id: &[Value]) -> UpdatePayload {
        let mut payload = UpdatePayload::new();
        for col in self.fk_columns.iter().chain(self.index_column.as_ref()) {
            payload.insert(UpwhereColumn::set(col.clone()), Value::Null);
        }
        for (col, value) in self.fk_columns.iter().zip(source_id) {
            payload.insert(UpwhereColumn::condition(col.clone()), value.clone());
        }
        payload
    }

    fn push_added(
        &self,
        source: &SRC,
        target: &TRGT,
        position: Option<usize>,
        plan: &mut WritePlan,
    ) -> Result<()> {
        let ctx = self.context_for(source, position);
        let table = self.target.table().name().to_string();
        if self.target.is_new(target) {
            let mut fresh = target.clone();
            self.target.prepare_for_insert(&mut fresh)?;
            plan.push(WriteOp::Insert {
                table,
                values: self.target_insert_values(&fresh, &ctx),
            });
        } else {
            plan.push(WriteOp::Update {
                table,
                values: self.attach_update(target, &ctx),
            });
        }
        Ok(())
    }

    fn push_removed(&self, target: &TRGT, plan: &mut WritePlan) {
        let table = self.target.table().name().to_string();
        if self.orphan_removal {
            plan.push(WriteOp::Delete {
                table,
                predicate: self.target.delete_predicate(target),
            });
        } else {
            plan.push(WriteOp::Update {
                table,
                values: self.detach_update(target),
            });
        }
    }
}

impl<SRC, TRGT> RelationHook<SRC> for OneToManyRelation<SRC, TRGT>
where
    SRC: Send + Sync + 'static,
    TRGT: Clone + Send + Sync + 'static,
{
    #[tracing::instrument(level = "debug", skip_all)]
    fn after_insert(&self, source: &SRC, plan: &mut WritePlan) -> Result<()> {
        let targets = self.descriptor.collection(source);
        tracing::debug!(
            target_table = self.target.table().name(),
            targets = targets.len(),
            "cascading collection insert"
        );
        for (i, target) in targets.iter().enumerate() {
            self.push_added(source, target, self.element_index(i), plan)?;
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    fn on_update(&self, modified: &SRC, unmodified: &SRC, plan: &mut WritePlan) -> Result<()> {
        let before = self.descriptor.collection(unmodified);
        let after = self.descriptor.collection(modified);
        let table = self.target.table().name().to_string();

        if self.index_column.is_some() {
            let diff = self.differ.diff_ordered(&before, &after);
            for (target, positions) in diff.added() {
                let position = positions.iter().next().copied();
                self.push_added(modified, target, position, plan)?;
            }
            for held in diff.held() {
                if !held.is_moved() {
                    continue;
                }
                // Index-only update: the element merely moved, nothing
                // else about its row is rewritten.
                let new_position = *held
                    .new_positions()
                    .iter()
                    .next()
                    .expect("held element has a new position");
                let index_column = self.index_column.clone().expect("ordered relation");
                let mut payload = UpdatePayload::new();
                payload.insert(
                    UpwhereColumn::set(index_column),
                    Value::BigInt(new_position as i64),
                );
                for (col, value) in self.target.delete_predicate(held.element()) {
                    payload.insert(UpwhereColumn::condition(col), value);
                }
                plan.push(WriteOp::Update {
                    table: table.clone(),
                    values: payload,
                });
            }
            for (target, _) in diff.removed() {
                self.push_removed(target, plan);
            }
        } else {
            let diff = self.differ.diff(&before, &after);
            for target in diff.added() {
                self.push_added(modified, target, None, plan)?;
            }
            for target in diff.removed() {
                self.push_removed(target, plan);
            }
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    fn before_delete(&self, source: &SRC, plan: &mut WritePlan) -> Result<()> {
        let table = self.target.table().name().to_string();
        if self.cascade_delete {
            for target in self.descriptor.collection(source) {
                plan.push(WriteOp::Delete {
                    table: table.clone(),
                    predicate: self.target.delete_predicate(&target),
                });
            }
        } else {
            plan.push(WriteOp::Update {
                table,
                values: self.detach_all_update(&self.source.id_values(source)),
            });
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    fn before_delete_by_id(&self, ids: &[Vec<Value>], plan: &mut WritePlan) -> Result<()> {
        let table = self.target.table().name().to_string();
        for id in ids {
            if self.cascade_delete {
                // Delete target rows purely by foreign-key predicate.
                let predicate: ColumnValues = self
                    .fk_columns
                    .iter()
                    .cloned()
                    .zip(id.iter().cloned())
                    .collect();
                plan.push(WriteOp::Delete {
                    table: table.clone(),
                    predicate,
                });
            } else {
                plan.push(WriteOp::Update {
                    table: table.clone(),
                    values: self.detach_all_update(id),
                });
            }
        }
        Ok(())
    }
}
