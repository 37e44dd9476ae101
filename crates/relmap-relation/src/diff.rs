//! Collection diff engine.
//!
//! Compares two snapshots of a collection (the persisted one and the
//! in-memory one) and classifies every element as added, removed or held.
//! For ordered collections the indexed variant additionally tracks the old
//! and new position sets of held elements, so the cascade engine can issue
//! index-only updates for elements that merely moved.
//!
//! Elements are matched by identifier, not by instance: an element whose
//! identifier is entirely unassigned can never match a persisted element
//! and therefore always classifies as added (or removed, when it somehow
//! appears in the persisted snapshot).

use relmap_core::Value;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An element identity: its identifier component values.
///
/// Usable as a hash-map key; floating-point components hash by bit
/// pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityKey(Vec<Value>);

impl IdentityKey {
    /// Wrap identifier components.
    pub fn new(components: Vec<Value>) -> Self {
        Self(components)
    }

    /// Whether every component is NULL (identifier not assigned yet).
    pub fn is_unassigned(&self) -> bool {
        self.0.is_empty() || self.0.iter().all(Value::is_null)
    }

    /// The identifier components.
    pub fn components(&self) -> &[Value] {
        &self.0
    }
}

impl Eq for IdentityKey {}

impl Hash for IdentityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for v in &self.0 {
            std::mem::discriminant(v).hash(state);
            match v {
                Value::Null => {}
                Value::Bool(b) => b.hash(state),
                Value::SmallInt(v) => v.hash(state),
                Value::Int(v) => v.hash(state),
                Value::BigInt(v) => v.hash(state),
                Value::Double(v) => v.to_bits().hash(state),
                Value::Text(s) => s.hash(state),
                Value::Bytes(b) => b.hash(state),
                Value::Date(v) => v.hash(state),
                Value::Time(v) => v.hash(state),
                Value::Timestamp(v) => v.hash(state),
                Value::Uuid(u) => u.hash(state),
                Value::Json(j) => j.to_string().hash(state),
            }
        }
    }
}

/// Classification of an unordered collection comparison.
#[derive(Debug, Clone)]
pub struct CollectionDiff<T> {
    added: Vec<T>,
    removed: Vec<T>,
    held: Vec<T>,
}

impl<T> CollectionDiff<T> {
    /// Elements present only in the new snapshot.
    pub fn added(&self) -> &[T] {
        &self.added
    }

    /// Elements present only in the old snapshot.
    pub fn removed(&self) -> &[T] {
        &self.removed
    }

    /// Elements present in both snapshots (new-snapshot instances).
    pub fn held(&self) -> &[T] {
        &self.held
    }

    /// Whether the two snapshots hold the same element set.
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// A held element of an ordered collection, with its position sets.
///
/// An element may legitimately occupy several positions (duplicates in a
/// list); both sets are carried in full.
#[derive(Debug, Clone)]
pub struct IndexedHeld<T> {
    element: T,
    old_positions: BTreeSet<usize>,
    new_positions: BTreeSet<usize>,
}

impl<T> IndexedHeld<T> {
    /// The element (new-snapshot instance).
    pub fn element(&self) -> &T {
        &self.element
    }

    /// Positions in the old snapshot.
    pub fn old_positions(&self) -> &BTreeSet<usize> {
        &self.old_positions
    }

    /// Positions in the new snapshot.
    pub fn new_positions(&self) -> &BTreeSet<usize> {
        &self.new_positions
    }

    /// Whether the element occupies different positions than before.
    pub fn is_moved(&self) -> bool {
        self.old_positions != self.new_positions
    }

    /// Position changes as (old, new) pairs, matching old and new
    /// positions in ascending order and keeping only real moves.
    pub fn index_moves(&self) -> Vec<(usize, usize)> {
        self.old_positions
            .iter()
            .zip(self.new_positions.iter())
            .filter(|(old, new)| old != new)
            .map(|(old, new)| (*old, *new))
            .collect()
    }

    /// New positions beyond the matched pairs (occurrence count grew).
    pub fn surplus_new(&self) -> Vec<usize> {
        self.new_positions
            .iter()
            .skip(self.old_positions.len())
            .copied()
            .collect()
    }

    /// Old positions beyond the matched pairs (occurrence count shrank).
    pub fn surplus_old(&self) -> Vec<usize> {
        self.old_positions
            .iter()
            .skip(self.new_positions.len())
            .copied()
            .collect()
    }
}

/// Classification of an ordered collection comparison.
#[derive(Debug, Clone)]
pub struct IndexedDiff<T> {
    added: Vec<(T, BTreeSet<usize>)>,
    removed: Vec<(T, BTreeSet<usize>)>,
    held: Vec<IndexedHeld<T>>,
}

impl<T> IndexedDiff<T> {
    /// Added elements with their new positions.
    pub fn added(&self) -> &[(T, BTreeSet<usize>)] {
        &self.added
    }

    /// Removed elements with their old positions.
    pub fn removed(&self) -> &[(T, BTreeSet<usize>)] {
        &self.removed
    }

    /// Held elements with both position sets.
    pub fn held(&self) -> &[IndexedHeld<T>] {
        &self.held
    }
}

/// Compares collection snapshots, matching elements by identifier.
pub struct CollectionDiffer<T> {
    identity: Arc<dyn Fn(&T) -> Vec<Value> + Send + Sync>,
}

impl<T> Clone for CollectionDiffer<T> {
    fn clone(&self) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
        }
    }
}

impl<T: Clone> CollectionDiffer<T> {
    /// Differ with the given identity function.
    pub fn new(identity: impl Fn(&T) -> Vec<Value> + Send + Sync + 'static) -> Self {
        Self {
            identity: Arc::new(identity),
        }
    }

    /// The identity key of one element.
    pub fn identity_of(&self, element: &T) -> IdentityKey {
        IdentityKey::new((self.identity)(element))
    }

    /// Unordered comparison.
    ///
    /// Duplicate identities are matched pairwise; surplus occurrences
    /// classify as added or removed.
    pub fn diff(&self, before: &[T], after: &[T]) -> CollectionDiff<T> {
        let mut remaining: HashMap<IdentityKey, usize> = HashMap::new();
        for element in before {
            let key = self.identity_of(element);
            if !key.is_unassigned() {
                *remaining.entry(key).or_insert(0) += 1;
            }
        }

        let mut added = Vec::new();
        let mut held = Vec::new();
        for element in after {
            let key = self.identity_of(element);
            if key.is_unassigned() {
                added.push(element.clone());
                continue;
            }
            match remaining.get_mut(&key) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    held.push(element.clone());
                }
                _ => added.push(element.clone()),
            }
        }

        let mut removed = Vec::new();
        for element in before {
            let key = self.identity_of(element);
            if key.is_unassigned() {
                removed.push(element.clone());
                continue;
            }
            if let Some(count) = remaining.get_mut(&key) {
                if *count > 0 {
                    *count -= 1;
                    removed.push(element.clone());
                }
            }
        }

        tracing::debug!(
            added = added.len(),
            removed = removed.len(),
            held = held.len(),
            "collection diff computed"
        );
        CollectionDiff {
            added,
            removed,
            held,
        }
    }

    /// Ordered comparison, tracking element positions.
    pub fn diff_ordered(&self, before: &[T], after: &[T]) -> IndexedDiff<T> {
        let mut before_map: HashMap<IdentityKey, (T, BTreeSet<usize>)> = HashMap::new();
        let mut removed: Vec<(T, BTreeSet<usize>)> = Vec::new();
        for (i, element) in before.iter().enumerate() {
            let key = self.identity_of(element);
            if key.is_unassigned() {
                removed.push((element.clone(), BTreeSet::from([i])));
                continue;
            }
            before_map
                .entry(key)
                .or_insert_with(|| (element.clone(), BTreeSet::new()))
                .1
                .insert(i);
        }

        let mut after_map: HashMap<IdentityKey, (T, BTreeSet<usize>)> = HashMap::new();
        let mut after_order: Vec<IdentityKey> = Vec::new();
        let mut added: Vec<(T, BTreeSet<usize>)> = Vec::new();
        for (i, element) in after.iter().enumerate() {
            let key = self.identity_of(element);
            if key.is_unassigned() {
                added.push((element.clone(), BTreeSet::from([i])));
                continue;
            }
            let entry = after_map
                .entry(key.clone())
                .or_insert_with(|| (element.clone(), BTreeSet::new()));
            if entry.1.is_empty() {
                after_order.push(key);
            }
            entry.1.insert(i);
        }

        let mut held = Vec::new();
        for key in after_order {
            let (element, new_positions) = after_map.remove(&key).expect("key recorded in order");
            match before_map.remove(&key) {
                Some((_, old_positions)) => held.push(IndexedHeld {
                    element,
                    old_positions,
                    new_positions,
                }),
                None => added.push((element, new_positions)),
            }
        }
        for (_, (element, old_positions)) in before_map {
            removed.push((element, old_positions));
        }

        tracing::debug!(
            added = added.len(),
            removed = removed.len(),
            held = held.len(),
            moved = held.iter().filter(|h| h.is_moved()).count(),
            "ordered collection diff computed"
        );
        IndexedDiff {
            added,
            removed,
            held,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Hero {
        id: Option<i64>,
        name: &'static str,
    }

    fn hero(id: i64, name: &'static str) -> Hero {
        Hero { id: Some(id), name }
    }

    fn differ() -> CollectionDiffer<Hero> {
        CollectionDiffer::new(|h: &Hero| vec![Value::from(h.id)])
    }

    #[test]
    fn test_unordered_added_removed_held() {
        let before = vec![hero(1, "a"), hero(2, "b")];
        let after = vec![hero(2, "b"), hero(3, "c")];
        let diff = differ().diff(&before, &after);

        assert_eq!(diff.added(), &[hero(3, "c")]);
        assert_eq!(diff.removed(), &[hero(1, "a")]);
        assert_eq!(diff.held(), &[hero(2, "b")]);
        assert!(!diff.is_unchanged());
    }

    #[test]
    fn test_unassigned_identifier_is_always_added() {
        let before = vec![hero(1, "a")];
        let after = vec![hero(1, "a"), Hero { id: None, name: "new" }];
        let diff = differ().diff(&before, &after);
        assert_eq!(diff.added(), &[Hero { id: None, name: "new" }]);
        assert_eq!(diff.held(), &[hero(1, "a")]);
        assert!(diff.removed().is_empty());
    }

    #[test]
    fn test_duplicate_count_changes() {
        let before = vec![hero(1, "a"), hero(1, "a")];
        let after = vec![hero(1, "a")];
        let diff = differ().diff(&before, &after);
        assert_eq!(diff.held().len(), 1);
        assert_eq!(diff.removed().len(), 1);
        assert!(diff.added().is_empty());
    }

    #[test]
    fn test_reorder_classifies_held_with_moves() {
        // {A:0, B:1, C:2} vs {A:0, C:1, B:2}
        let before = vec![hero(1, "A"), hero(2, "B"), hero(3, "C")];
        let after = vec![hero(1, "A"), hero(3, "C"), hero(2, "B")];
        let diff = differ().diff_ordered(&before, &after);

        assert!(diff.added().is_empty());
        assert!(diff.removed().is_empty());
        assert_eq!(diff.held().len(), 3);

        let a = diff.held().iter().find(|h| h.element().name == "A").unwrap();
        let b = diff.held().iter().find(|h| h.element().name == "B").unwrap();
        let c = diff.held().iter().find(|h| h.element().name == "C").unwrap();

        assert!(!a.is_moved());
        assert!(a.index_moves().is_empty());
        assert!(b.is_moved());
        assert_eq!(b.index_moves(), vec![(1, 2)]);
        assert!(c.is_moved());
        assert_eq!(c.index_moves(), vec![(2, 1)]);
    }

    #[test]
    fn test_ordered_added_and_removed_carry_positions() {
        let before = vec![hero(1, "a"), hero(2, "b")];
        let after = vec![hero(2, "b"), hero(3, "c")];
        let diff = differ().diff_ordered(&before, &after);

        assert_eq!(diff.added().len(), 1);
        assert_eq!(diff.added()[0].0, hero(3, "c"));
        assert_eq!(diff.added()[0].1, BTreeSet::from([1]));

        assert_eq!(diff.removed().len(), 1);
        assert_eq!(diff.removed()[0].0, hero(1, "a"));
        assert_eq!(diff.removed()[0].1, BTreeSet::from([0]));

        let held = &diff.held()[0];
        assert_eq!(held.element(), &hero(2, "b"));
        assert_eq!(held.index_moves(), vec![(1, 0)]);
    }

    #[test]
    fn test_ordered_duplicates_track_position_sets() {
        let before = vec![hero(1, "a"), hero(1, "a"), hero(2, "b")];
        let after = vec![hero(1, "a"), hero(2, "b"), hero(1, "a"), hero(1, "a")];
        let diff = differ().diff_ordered(&before, &after);

        let a = diff.held().iter().find(|h| h.element().name == "a").unwrap();
        assert_eq!(a.old_positions(), &BTreeSet::from([0, 1]));
        assert_eq!(a.new_positions(), &BTreeSet::from([0, 2, 3]));
        assert_eq!(a.surplus_new(), vec![3]);
        assert!(a.surplus_old().is_empty());
    }

    #[test]
    fn test_identity_key_unassigned() {
        assert!(IdentityKey::new(vec![Value::Null]).is_unassigned());
        assert!(!IdentityKey::new(vec![Value::BigInt(0)]).is_unassigned());
        assert!(!IdentityKey::new(vec![Value::Null, Value::BigInt(1)]).is_unassigned());
    }
}
