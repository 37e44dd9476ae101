//! Association-table collection cascade.
//!
//! Neither side's own row changes; the relation lives in (source id,
//! target id[, position]) rows of a join table. Target rows are inserted
//! before the join rows that reference them, and join rows are deleted
//! before any target row, so referential integrity holds at every step of
//! the plan.

use crate::association::{AssociationRecord, AssociationTableMapping, IndexedAssociationRecord};
use crate::descriptor::ManyRelationDescriptor;
use crate::diff::CollectionDiffer;
use crate::persister::RelationHook;
use crate::plan::{WriteOp, WritePlan};
use relmap_core::{ConfigErrorKind, Error, Result, Value};
use relmap_mapping::{EntityMapping, WriteContext};
use std::sync::Arc;

/// Builder for [`AssociationRelation`]; checks are fail-fast.
pub struct AssociationRelationBuilder<SRC, TRGT> {
    source: Arc<EntityMapping<SRC>>,
    target: Arc<EntityMapping<TRGT>>,
    descriptor: ManyRelationDescriptor<SRC, TRGT>,
    association: AssociationTableMapping,
    association_only: bool,
    cascade_target_delete: bool,
}

impl<SRC, TRGT> AssociationRelationBuilder<SRC, TRGT>
where
    SRC: Send + Sync + 'static,
    TRGT: Clone + Send + Sync + 'static,
{
    /// Maintain only the association rows: never cascade-insert target
    /// entities (they are persisted through their own persister).
    #[must_use]
    pub fn association_only(mut self, value: bool) -> Self {
        self.association_only = value;
        self
    }

    /// Also delete target rows whose association is removed.
    #[must_use]
    pub fn cascade_target_delete(mut self, value: bool) -> Self {
        self.cascade_target_delete = value;
        self
    }

    /// Validate and freeze the engine.
    pub fn build(self) -> Result<AssociationRelation<SRC, TRGT>> {
        if self.association.source_columns().len() != self.source.id_mapping().columns().len() {
            return Err(Error::config(
                ConfigErrorKind::Invalid,
                format!(
                    "{} association source column(s) for {} source identifier column(s)",
                    self.association.source_columns().len(),
                    self.source.id_mapping().columns().len()
                ),
            ));
        }
        if self.association.target_columns().len() != self.target.id_mapping().columns().len() {
            return Err(Error::config(
                ConfigErrorKind::Invalid,
                format!(
                    "{} association target column(s) for {} target identifier column(s)",
                    self.association.target_columns().len(),
                    self.target.id_mapping().columns().len()
                ),
            ));
        }

        let target = Arc::clone(&self.target);
        let differ = CollectionDiffer::new(move |t: &TRGT| target.id_values(t));

        Ok(AssociationRelation {
            source: self.source,
            target: self.target,
            descriptor: self.descriptor,
            association: self.association,
            association_only: self.association_only,
            cascade_target_delete: self.cascade_target_delete,
            differ,
        })
    }
}

/// Cascade engine for a collection persisted through an association table.
pub struct AssociationRelation<SRC, TRGT> {
    source: Arc<EntityMapping<SRC>>,
    target: Arc<EntityMapping<TRGT>>,
    descriptor: ManyRelationDescriptor<SRC, TRGT>,
    association: AssociationTableMapping,
    association_only: bool,
    cascade_target_delete: bool,
    differ: CollectionDiffer<TRGT>,
}

impl<SRC, TRGT> AssociationRelation<SRC, TRGT>
where
    SRC: Send + Sync + 'static,
    TRGT: Clone + Send + Sync + 'static,
{
    /// Start building the engine.
    pub fn builder(
        source: Arc<EntityMapping<SRC>>,
        target: Arc<EntityMapping<TRGT>>,
        descriptor: ManyRelationDescriptor<SRC, TRGT>,
        association: AssociationTableMapping,
    ) -> AssociationRelationBuilder<SRC, TRGT> {
        AssociationRelationBuilder {
            source,
            target,
            descriptor,
            association,
            association_only: false,
            cascade_target_delete: false,
        }
    }

    /// Whether collection order is persisted in the join table.
    pub fn is_ordered(&self) -> bool {
        self.association.is_indexed()
    }

    fn record(&self, source: &SRC, target: &TRGT) -> AssociationRecord {
        AssociationRecord::new(self.source.id_values(source), self.target.id_values(target))
    }

    fn indexed_record(
        &self,
        source: &SRC,
        target: &TRGT,
        index: usize,
    ) -> IndexedAssociationRecord {
        IndexedAssociationRecord::new(
            self.source.id_values(source),
            self.target.id_values(target),
            index as i64,
        )
    }

    /// Cascade-insert one target row, unless running association-only or
    /// the target is already persisted.
    ///
    /// The target is taken mutably: a before-insert generated identifier
    /// must stick to the instance, since the join row produced right after
    /// references it.
    fn push_target_insert(&self, target: &mut TRGT, plan: &mut WritePlan) -> Result<()> {
        if self.association_only || !self.target.is_new(target) {
            return Ok(());
        }
        self.target.prepare_for_insert(target)?;
        plan.push(WriteOp::Insert {
            table: self.target.table().name().to_string(),
            values: self.target.insert_values(target, &WriteContext::new()),
        });
        Ok(())
    }

    fn push_association_insert(
        &self,
        source: &SRC,
        target: &TRGT,
        index: Option<usize>,
        plan: &mut WritePlan,
    ) -> Result<()> {
        let table = self.association.table().name().to_string();
        let values = match index {
            Some(i) => self
                .association
                .insert_values_indexed(&self.indexed_record(source, target, i))?,
            None => self.association.insert_values(&self.record(source, target))?,
        };
        plan.push(WriteOp::Insert { table, values });
        Ok(())
    }

    fn push_association_delete(
        &self,
        source: &SRC,
        target: &TRGT,
        index: Option<usize>,
        plan: &mut WritePlan,
    ) -> Result<()> {
        let table = self.association.table().name().to_string();
        let predicate = match index {
            Some(i) => self
                .association
                .insert_values_indexed(&self.indexed_record(source, target, i))?,
            None => self.association.delete_predicate(&self.record(source, target))?,
        };
        plan.push(WriteOp::Delete { table, predicate });
        Ok(())
    }

    fn push_target_delete(&self, target: &TRGT, plan: &mut WritePlan) {
        plan.push(WriteOp::Delete {
            table: self.target.table().name().to_string(),
            predicate: self.target.delete_predicate(target),
        });
    }
}

impl<SRC, TRGT> RelationHook<SRC> for AssociationRelation<SRC, TRGT>
where
    SRC: Send + Sync + 'static,
    TRGT: Clone + Send + Sync + 'static,
{
    #[tracing::instrument(level = "debug", skip_all)]
    fn after_insert(&self, source: &SRC, plan: &mut WritePlan) -> Result<()> {
        let mut targets = self.descriptor.collection(source);
        tracing::debug!(
            association_table = self.association.table().name(),
            targets = targets.len(),
            "cascading association insert"
        );
        // Target rows first, join rows after: the join rows reference them.
        for target in &mut targets {
            self.push_target_insert(target, plan)?;
        }
        let indexed = self.association.is_indexed();
        for (i, target) in targets.iter().enumerate() {
            self.push_association_insert(source, target, indexed.then_some(i), plan)?;
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    fn on_update(&self, modified: &SRC, unmodified: &SRC, plan: &mut WritePlan) -> Result<()> {
        let before = self.descriptor.collection(unmodified);
        let after = self.descriptor.collection(modified);

        if self.association.is_indexed() {
            let diff = self.differ.diff_ordered(&before, &after);
            for (target, positions) in diff.added() {
                let mut target = target.clone();
                self.push_target_insert(&mut target, plan)?;
                for position in positions {
                    self.push_association_insert(modified, &target, Some(*position), plan)?;
                }
            }
            for held in diff.held() {
                if !held.is_moved() {
                    continue;
                }
                // Index-only updates for matched pairs, inserts/deletes
                // for occurrence-count changes.
                for (old, new) in held.index_moves() {
                    let record = self.indexed_record(modified, held.element(), old);
                    let payload = self.association.index_update(&record, new as i64)?;
                    plan.push(WriteOp::Update {
                        table: self.association.table().name().to_string(),
                        values: payload,
                    });
                }
                for position in held.surplus_new() {
                    self.push_association_insert(modified, held.element(), Some(position), plan)?;
                }
                for position in held.surplus_old() {
                    self.push_association_delete(modified, held.element(), Some(position), plan)?;
                }
            }
            for (target, positions) in diff.removed() {
                for position in positions {
                    self.push_association_delete(modified, target, Some(*position), plan)?;
                }
                if self.cascade_target_delete {
                    self.push_target_delete(target, plan);
                }
            }
        } else {
            let diff = self.differ.diff(&before, &after);
            for target in diff.added() {
                let mut target = target.clone();
                self.push_target_insert(&mut target, plan)?;
                self.push_association_insert(modified, &target, None, plan)?;
            }
            for target in diff.removed() {
                self.push_association_delete(modified, target, None, plan)?;
                if self.cascade_target_delete {
                    self.push_target_delete(target, plan);
                }
            }
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    fn before_delete(&self, source: &SRC, plan: &mut WritePlan) -> Result<()> {
        // One statement sweeps every join row of this source.
        let predicate = self
            .association
            .source_predicate(&self.source.id_values(source))?;
        plan.push(WriteOp::Delete {
            table: self.association.table().name().to_string(),
            predicate,
        });
        if self.cascade_target_delete {
            for target in self.descriptor.collection(source) {
                self.push_target_delete(&target, plan);
            }
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    fn before_delete_by_id(&self, ids: &[Vec<Value>], plan: &mut WritePlan) -> Result<()> {
        // Without entities only the join rows can be located; target rows
        // are the caller's business in the by-id path.
        for id in ids {
            let predicate = self.association.source_predicate(id)?;
            plan.push(WriteOp::Delete {
                table: self.association.table().name().to_string(),
                predicate,
            });
        }
        Ok(())
    }
}
