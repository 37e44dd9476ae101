//! Two-phase load support for cyclic relation graphs.
//!
//! When a relation graph is cyclic, joining it out fully would expand
//! forever. The first pass loads sources shallowly and only records
//! (source id, target id) pairs through a transform listener; the second
//! pass hydrates the targets by identifier and stitches the collections
//! back together through the relation descriptor.

use crate::descriptor::ManyRelationDescriptor;
use crate::diff::IdentityKey;
use relmap_core::{Column, Value};
use relmap_mapping::{RowAccess, TransformListener};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// First-pass listener recording (source id, target id) pairs.
///
/// Attach to the source's row transformer for the shallow pass; rows whose
/// target columns are entirely NULL (outer join without a child) record
/// nothing. Duplicate pairs are recorded once.
pub struct RelationIdCollector<SRC> {
    source_id: Arc<dyn Fn(&SRC) -> Vec<Value> + Send + Sync>,
    target_columns: Vec<Column>,
    pairs: Mutex<Vec<(Vec<Value>, Vec<Value>)>>,
}

impl<SRC> RelationIdCollector<SRC> {
    /// Collector reading the target identifier from the given columns.
    pub fn new(
        source_id: impl Fn(&SRC) -> Vec<Value> + Send + Sync + 'static,
        target_columns: Vec<Column>,
    ) -> Self {
        Self {
            source_id: Arc::new(source_id),
            target_columns,
            pairs: Mutex::new(Vec::new()),
        }
    }

    /// Drain the recorded pairs.
    pub fn take(&self) -> Vec<(Vec<Value>, Vec<Value>)> {
        std::mem::take(&mut *self.pairs.lock().expect("collector poisoned"))
    }

    /// Number of recorded pairs.
    pub fn len(&self) -> usize {
        self.pairs.lock().expect("collector poisoned").len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<SRC> TransformListener<SRC> for RelationIdCollector<SRC> {
    fn row_consumed(&self, bean: &mut SRC, row: &RowAccess<'_>) {
        let target_id: Vec<Value> = self
            .target_columns
            .iter()
            .map(|col| row.value(col).cloned().unwrap_or(Value::Null))
            .collect();
        if target_id.iter().all(Value::is_null) {
            return;
        }
        let pair = ((self.source_id)(bean), target_id);
        let mut pairs = self.pairs.lock().expect("collector poisoned");
        if !pairs.contains(&pair) {
            pairs.push(pair);
        }
    }
}

/// Second pass: stitch hydrated targets into their sources' collections.
///
/// Collections are rebuilt from scratch (in pair order) and the
/// descriptor's reverse setter fixes the in-memory back-reference of every
/// target.
pub fn assemble_relations<SRC, TRGT: Clone + 'static>(
    pairs: &[(Vec<Value>, Vec<Value>)],
    sources: &mut [SRC],
    targets: &[TRGT],
    source_id: impl Fn(&SRC) -> Vec<Value>,
    target_id: impl Fn(&TRGT) -> Vec<Value>,
    descriptor: &ManyRelationDescriptor<SRC, TRGT>,
) {
    let targets_by_id: HashMap<IdentityKey, &TRGT> = targets
        .iter()
        .map(|t| (IdentityKey::new(target_id(t)), t))
        .collect();

    for source in sources.iter_mut() {
        let key = source_id(source);
        descriptor.set_collection(source, descriptor.new_collection());
        for (src, tgt) in pairs {
            if *src != key {
                continue;
            }
            if let Some(target) = targets_by_id.get(&IdentityKey::new(tgt.clone())) {
                descriptor.add_to_collection(source, (*target).clone());
            }
        }
    }
    tracing::debug!(
        pairs = pairs.len(),
        sources = sources.len(),
        targets = targets.len(),
        "relation graph assembled"
    );
}
