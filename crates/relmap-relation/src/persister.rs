//! Entity persister: own-row operations plus relation maintenance.
//!
//! A [`Persister`] composes an entity mapping with the cascade engines
//! attached to its lifecycle (as [`RelationHook`]s) and the observer lists.
//! Every operation produces a [`WritePlan`] for the external SQL executor;
//! plan order respects referential integrity (relation rows that reference
//! an owning row come after its insert and before its delete).

use crate::listener::ListenerSet;
use crate::plan::{WriteOp, WritePlan};
use relmap_core::{Result, Row, Value};
use relmap_mapping::{EntityMapping, WriteContext};
use std::sync::Arc;

use crate::listener::{DeleteListener, InsertListener, SelectListener, UpdateListener};

/// A cascade engine attached to a persister's lifecycle.
pub trait RelationHook<C>: Send + Sync {
    /// Contribute relation maintenance after the owning row's insert.
    fn after_insert(&self, source: &C, plan: &mut WritePlan) -> Result<()>;

    /// Contribute relation maintenance for an update, given both
    /// snapshots.
    fn on_update(&self, modified: &C, unmodified: &C, plan: &mut WritePlan) -> Result<()>;

    /// Contribute relation maintenance before the owning row's delete.
    fn before_delete(&self, source: &C, plan: &mut WritePlan) -> Result<()>;

    /// Contribute relation maintenance before a delete-by-identifier, with
    /// no entity available.
    fn before_delete_by_id(&self, ids: &[Vec<Value>], plan: &mut WritePlan) -> Result<()>;
}

/// Computes write plans for one entity type.
pub struct Persister<C> {
    mapping: Arc<EntityMapping<C>>,
    relations: Vec<Arc<dyn RelationHook<C>>>,
    listeners: ListenerSet<C>,
}

impl<C> Persister<C> {
    /// A persister around an entity mapping.
    pub fn new(mapping: Arc<EntityMapping<C>>) -> Self {
        Self {
            mapping,
            relations: Vec::new(),
            listeners: ListenerSet::new(),
        }
    }

    /// Attach a cascade engine. Configuration-time only.
    #[must_use]
    pub fn register_relation(mut self, hook: Arc<dyn RelationHook<C>>) -> Self {
        self.relations.push(hook);
        self
    }

    /// Register an insert listener. Configuration-time only.
    #[must_use]
    pub fn insert_listener(mut self, listener: Arc<dyn InsertListener<C>>) -> Self {
        self.listeners.add_insert(listener);
        self
    }

    /// Register an update listener. Configuration-time only.
    #[must_use]
    pub fn update_listener(mut self, listener: Arc<dyn UpdateListener<C>>) -> Self {
        self.listeners.add_update(listener);
        self
    }

    /// Register a delete listener. Configuration-time only.
    #[must_use]
    pub fn delete_listener(mut self, listener: Arc<dyn DeleteListener<C>>) -> Self {
        self.listeners.add_delete(listener);
        self
    }

    /// Register a select listener. Configuration-time only.
    #[must_use]
    pub fn select_listener(mut self, listener: Arc<dyn SelectListener<C>>) -> Self {
        self.listeners.add_select(listener);
        self
    }

    /// The underlying entity mapping.
    pub fn mapping(&self) -> &Arc<EntityMapping<C>> {
        &self.mapping
    }

    /// Plan the insert of a batch of entities.
    ///
    /// Before-insert identifier generation happens here; for
    /// already-assigned identifiers the persisted marker is raised once
    /// the plan is produced.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn insert(&self, entities: &mut [C]) -> Result<WritePlan> {
        self.listeners.before_insert(entities);
        let result = self.plan_insert(entities);
        match &result {
            Ok(plan) => {
                tracing::debug!(
                    table = self.mapping.table().name(),
                    entities = entities.len(),
                    ops = plan.len(),
                    "insert plan computed"
                );
                self.listeners.after_insert(entities);
            }
            Err(error) => self.listeners.on_insert_error(entities, error),
        }
        result
    }

    fn plan_insert(&self, entities: &mut [C]) -> Result<WritePlan> {
        let mut plan = WritePlan::new();
        let table = self.mapping.table().name().to_string();
        for entity in entities.iter_mut() {
            self.mapping.prepare_for_insert(entity)?;
            let values = self.mapping.insert_values(entity, &WriteContext::new());
            plan.push(WriteOp::Insert {
                table: table.clone(),
                values,
            });
            for hook in &self.relations {
                hook.after_insert(entity, &mut plan)?;
            }
        }
        for entity in entities.iter_mut() {
            self.mapping.mark_persisted(entity);
        }
        Ok(plan)
    }

    /// Plan the update of (modified, unmodified) pairs.
    ///
    /// Pairs whose entity did not change produce no own-row operation;
    /// relation maintenance still runs, since only the diff knows whether
    /// the collection changed.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn update(&self, pairs: &[(C, C)], all_columns: bool) -> Result<WritePlan> {
        self.listeners.before_update(pairs);
        let result = self.plan_update(pairs, all_columns);
        match &result {
            Ok(plan) => {
                tracing::debug!(
                    table = self.mapping.table().name(),
                    pairs = pairs.len(),
                    ops = plan.len(),
                    "update plan computed"
                );
                self.listeners.after_update(pairs);
            }
            Err(error) => self.listeners.on_update_error(pairs, error),
        }
        result
    }

    fn plan_update(&self, pairs: &[(C, C)], all_columns: bool) -> Result<WritePlan> {
        let mut plan = WritePlan::new();
        let table = self.mapping.table().name().to_string();
        for (modified, unmodified) in pairs {
            let payload = self.mapping.update_values(
                modified,
                Some(unmodified),
                all_columns,
                &WriteContext::new(),
            );
            if !payload.is_empty() {
                plan.push(WriteOp::Update {
                    table: table.clone(),
                    values: payload,
                });
            }
            for hook in &self.relations {
                hook.on_update(modified, unmodified, &mut plan)?;
            }
        }
        Ok(plan)
    }

    /// Plan the delete of a batch of entities. Relation maintenance comes
    /// first, the owning rows last.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn delete(&self, entities: &[C]) -> Result<WritePlan> {
        self.listeners.before_delete(entities);
        let result = self.plan_delete(entities);
        match &result {
            Ok(plan) => {
                tracing::debug!(
                    table = self.mapping.table().name(),
                    entities = entities.len(),
                    ops = plan.len(),
                    "delete plan computed"
                );
                self.listeners.after_delete(entities);
            }
            Err(error) => self.listeners.on_delete_error(entities, error),
        }
        result
    }

    fn plan_delete(&self, entities: &[C]) -> Result<WritePlan> {
        let mut plan = WritePlan::new();
        let table = self.mapping.table().name().to_string();
        for entity in entities {
            for hook in &self.relations {
                hook.before_delete(entity, &mut plan)?;
            }
            plan.push(WriteOp::Delete {
                table: table.clone(),
                predicate: self.mapping.delete_predicate(entity),
            });
        }
        Ok(plan)
    }

    /// Plan a delete purely by identifier, with no entities available.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn delete_by_id(&self, ids: &[Vec<Value>]) -> Result<WritePlan> {
        let mut plan = WritePlan::new();
        let table = self.mapping.table().name().to_string();
        for hook in &self.relations {
            hook.before_delete_by_id(ids, &mut plan)?;
        }
        for id in ids {
            let predicate = self.mapping.id_mapping().assembler().to_column_values(id)?;
            plan.push(WriteOp::Delete {
                table: table.clone(),
                predicate,
            });
        }
        tracing::debug!(
            table = self.mapping.table().name(),
            ids = ids.len(),
            ops = plan.len(),
            "delete-by-id plan computed"
        );
        Ok(plan)
    }

    /// Transform a batch of rows, with select listeners around the batch.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn transform_rows(&self, rows: &[Row]) -> Result<Vec<C>> {
        self.listeners.before_select();
        let result: Result<Vec<C>> = rows.iter().map(|row| self.mapping.transform(row)).collect();
        match &result {
            Ok(loaded) => self.listeners.after_select(loaded),
            Err(error) => self.listeners.on_select_error(error),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmap_core::{ColumnDef, Error, SqlType, Table, property};
    use relmap_mapping::{
        BeanFactory, IdMapping, IdentifierAssembler, IdentifierInsertion, IsNewPolicy,
        PropertyMapping, simple_id,
    };
    use std::sync::Mutex;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Team {
        id: Option<i64>,
        name: String,
    }

    fn team_mapping() -> Arc<EntityMapping<Team>> {
        let table = Table::build(
            "team",
            vec![
                ColumnDef::new("id", SqlType::BigInt)
                    .primary_key(true)
                    .auto_generated(true),
                ColumnDef::new("name", SqlType::Text).nullable(false),
            ],
        )
        .unwrap();
        let main = PropertyMapping::builder(BeanFactory::from_fn(Team::default))
            .map(
                property(
                    "name",
                    |t: &Team| t.name.clone(),
                    |t: &mut Team, v| t.name = v,
                ),
                table.column("name").unwrap().clone(),
            )
            .build()
            .unwrap();
        let id = IdMapping::new(
            simple_id(|t: &Team| t.id, |t: &mut Team, v| t.id = v),
            IdentifierAssembler::simple(table.column("id").unwrap().clone()),
            IdentifierInsertion::DatabaseGenerated,
            IsNewPolicy::Nullable,
        );
        Arc::new(EntityMapping::builder(table, main, id).build().unwrap())
    }

    #[test]
    fn test_insert_plan_contains_own_row() {
        let persister = Persister::new(team_mapping());
        let mut teams = vec![Team {
            id: None,
            name: "Avengers".to_string(),
        }];
        let plan = persister.insert(&mut teams).unwrap();
        assert_eq!(plan.len(), 1);
        assert!(plan.ops()[0].is_insert());
        assert_eq!(plan.ops()[0].table(), "team");
    }

    #[test]
    fn test_update_noop_produces_empty_plan() {
        let persister = Persister::new(team_mapping());
        let team = Team {
            id: Some(1),
            name: "Avengers".to_string(),
        };
        let plan = persister.update(&[(team.clone(), team)], false).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_delete_plan_uses_identifier_predicate() {
        let persister = Persister::new(team_mapping());
        let team = Team {
            id: Some(4),
            name: "Avengers".to_string(),
        };
        let plan = persister.delete(&[team]).unwrap();
        assert_eq!(plan.len(), 1);
        match &plan.ops()[0] {
            WriteOp::Delete { table, predicate } => {
                assert_eq!(table, "team");
                assert_eq!(predicate.values().next(), Some(&Value::BigInt(4)));
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn test_delete_by_id() {
        let persister = Persister::new(team_mapping());
        let plan = persister
            .delete_by_id(&[vec![Value::BigInt(1)], vec![Value::BigInt(2)]])
            .unwrap();
        assert_eq!(plan.delete_count(), 2);
    }

    struct FailingHook;

    impl RelationHook<Team> for FailingHook {
        fn after_insert(&self, _source: &Team, _plan: &mut WritePlan) -> Result<()> {
            Err(Error::unsupported("test", "deliberate failure"))
        }
        fn on_update(&self, _m: &Team, _u: &Team, _plan: &mut WritePlan) -> Result<()> {
            Ok(())
        }
        fn before_delete(&self, _source: &Team, _plan: &mut WritePlan) -> Result<()> {
            Ok(())
        }
        fn before_delete_by_id(&self, _ids: &[Vec<Value>], _plan: &mut WritePlan) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingListener {
        after: Mutex<usize>,
        errors: Mutex<usize>,
    }

    impl InsertListener<Team> for CountingListener {
        fn after_insert(&self, _entities: &[Team]) {
            *self.after.lock().unwrap() += 1;
        }
        fn on_insert_error(&self, _entities: &[Team], _error: &Error) {
            *self.errors.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_error_path_still_notifies_listeners() {
        let listener = Arc::new(CountingListener::default());
        let persister = Persister::new(team_mapping())
            .register_relation(Arc::new(FailingHook))
            .insert_listener(listener.clone());
        let mut teams = vec![Team {
            id: None,
            name: "X".to_string(),
        }];
        assert!(persister.insert(&mut teams).is_err());
        assert_eq!(*listener.after.lock().unwrap(), 0);
        assert_eq!(*listener.errors.lock().unwrap(), 1);
    }
}
