//! Persistence lifecycle listeners.
//!
//! Listeners are registered on a [`crate::Persister`] during the
//! configuration build and never mutated at request time. After/error
//! hooks are always invoked — on the success path and on the failure path
//! alike — so observers never miss the end of an operation.

use relmap_core::Error;
use std::sync::Arc;

/// Observes insert operations.
pub trait InsertListener<C>: Send + Sync {
    /// Before the insert plan is computed.
    fn before_insert(&self, _entities: &[C]) {}
    /// After the insert plan was computed successfully.
    fn after_insert(&self, _entities: &[C]) {}
    /// When computing the insert plan failed.
    fn on_insert_error(&self, _entities: &[C], _error: &Error) {}
}

/// Observes update operations.
pub trait UpdateListener<C>: Send + Sync {
    /// Before the update plan is computed; pairs are (modified, unmodified).
    fn before_update(&self, _pairs: &[(C, C)]) {}
    /// After the update plan was computed successfully.
    fn after_update(&self, _pairs: &[(C, C)]) {}
    /// When computing the update plan failed.
    fn on_update_error(&self, _pairs: &[(C, C)], _error: &Error) {}
}

/// Observes delete operations.
pub trait DeleteListener<C>: Send + Sync {
    /// Before the delete plan is computed.
    fn before_delete(&self, _entities: &[C]) {}
    /// After the delete plan was computed successfully.
    fn after_delete(&self, _entities: &[C]) {}
    /// When computing the delete plan failed.
    fn on_delete_error(&self, _entities: &[C], _error: &Error) {}
}

/// Observes row transformation batches (select side).
pub trait SelectListener<C>: Send + Sync {
    /// Before a batch of rows is transformed.
    fn before_select(&self) {}
    /// After every row of the batch was transformed.
    fn after_select(&self, _loaded: &[C]) {}
    /// When transforming a row failed.
    fn on_select_error(&self, _error: &Error) {}
}

/// The listener lists of one persister.
pub struct ListenerSet<C> {
    insert: Vec<Arc<dyn InsertListener<C>>>,
    update: Vec<Arc<dyn UpdateListener<C>>>,
    delete: Vec<Arc<dyn DeleteListener<C>>>,
    select: Vec<Arc<dyn SelectListener<C>>>,
}

impl<C> Default for ListenerSet<C> {
    fn default() -> Self {
        Self {
            insert: Vec::new(),
            update: Vec::new(),
            delete: Vec::new(),
            select: Vec::new(),
        }
    }
}

impl<C> Clone for ListenerSet<C> {
    fn clone(&self) -> Self {
        Self {
            insert: self.insert.clone(),
            update: self.update.clone(),
            delete: self.delete.clone(),
            select: self.select.clone(),
        }
    }
}

impl<C> ListenerSet<C> {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an insert listener.
    pub fn add_insert(&mut self, listener: Arc<dyn InsertListener<C>>) {
        self.insert.push(listener);
    }

    /// Register an update listener.
    pub fn add_update(&mut self, listener: Arc<dyn UpdateListener<C>>) {
        self.update.push(listener);
    }

    /// Register a delete listener.
    pub fn add_delete(&mut self, listener: Arc<dyn DeleteListener<C>>) {
        self.delete.push(listener);
    }

    /// Register a select listener.
    pub fn add_select(&mut self, listener: Arc<dyn SelectListener<C>>) {
        self.select.push(listener);
    }

    pub(crate) fn before_insert(&self, entities: &[C]) {
        for l in &self.insert {
            l.before_insert(entities);
        }
    }

    pub(crate) fn after_insert(&self, entities: &[C]) {
        for l in &self.insert {
            l.after_insert(entities);
        }
    }

    pub(crate) fn on_insert_error(&self, entities: &[C], error: &Error) {
        for l in &self.insert {
            l.on_insert_error(entities, error);
        }
    }

    pub(crate) fn before_update(&self, pairs: &[(C, C)]) {
        for l in &self.update {
            l.before_update(pairs);
        }
    }

    pub(crate) fn after_update(&self, pairs: &[(C, C)]) {
        for l in &self.update {
            l.after_update(pairs);
        }
    }

    pub(crate) fn on_update_error(&self, pairs: &[(C, C)], error: &Error) {
        for l in &self.update {
            l.on_update_error(pairs, error);
        }
    }

    pub(crate) fn before_delete(&self, entities: &[C]) {
        for l in &self.delete {
            l.before_delete(entities);
        }
    }

    pub(crate) fn after_delete(&self, entities: &[C]) {
        for l in &self.delete {
            l.after_delete(entities);
        }
    }

    pub(crate) fn on_delete_error(&self, entities: &[C], error: &Error) {
        for l in &self.delete {
            l.on_delete_error(entities, error);
        }
    }

    pub(crate) fn before_select(&self) {
        for l in &self.select {
            l.before_select();
        }
    }

    pub(crate) fn after_select(&self, loaded: &[C]) {
        for l in &self.select {
            l.after_select(loaded);
        }
    }

    pub(crate) fn on_select_error(&self, error: &Error) {
        for l in &self.select {
            l.on_select_error(error);
        }
    }
}
