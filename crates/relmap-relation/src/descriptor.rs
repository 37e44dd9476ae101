//! Collection relationship descriptor.

use std::sync::Arc;

/// Describes how a source entity holds a collection of target entities.
///
/// Built once at configuration time: a snapshot getter, a setter, a
/// collection factory and an optional reverse setter. The reverse setter is
/// the in-memory side of a bidirectional relation; it is applied when rows
/// are consumed, never persisted by itself.
pub struct ManyRelationDescriptor<SRC, TRGT> {
    collection: Arc<dyn Fn(&SRC) -> Vec<TRGT> + Send + Sync>,
    set_collection: Arc<dyn Fn(&mut SRC, Vec<TRGT>) + Send + Sync>,
    factory: Arc<dyn Fn() -> Vec<TRGT> + Send + Sync>,
    reverse_setter: Option<Arc<dyn Fn(&mut TRGT, &SRC) + Send + Sync>>,
}

impl<SRC, TRGT> Clone for ManyRelationDescriptor<SRC, TRGT> {
    fn clone(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
            set_collection: Arc::clone(&self.set_collection),
            factory: Arc::clone(&self.factory),
            reverse_setter: self.reverse_setter.clone(),
        }
    }
}

impl<SRC, TRGT: 'static> ManyRelationDescriptor<SRC, TRGT> {
    /// Descriptor from collection access closures.
    pub fn new(
        collection: impl Fn(&SRC) -> Vec<TRGT> + Send + Sync + 'static,
        set_collection: impl Fn(&mut SRC, Vec<TRGT>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            collection: Arc::new(collection),
            set_collection: Arc::new(set_collection),
            factory: Arc::new(Vec::new),
            reverse_setter: None,
        }
    }

    /// Replace the collection factory (defaults to an empty `Vec`).
    #[must_use]
    pub fn with_factory(mut self, factory: impl Fn() -> Vec<TRGT> + Send + Sync + 'static) -> Self {
        self.factory = Arc::new(factory);
        self
    }

    /// Register the reverse setter applied to each target during row
    /// consumption.
    #[must_use]
    pub fn with_reverse_setter(
        mut self,
        reverse: impl Fn(&mut TRGT, &SRC) + Send + Sync + 'static,
    ) -> Self {
        self.reverse_setter = Some(Arc::new(reverse));
        self
    }

    /// A snapshot of the source's collection.
    pub fn collection(&self, source: &SRC) -> Vec<TRGT> {
        (self.collection)(source)
    }

    /// Replace the source's collection.
    pub fn set_collection(&self, source: &mut SRC, targets: Vec<TRGT>) {
        (self.set_collection)(source, targets);
    }

    /// A fresh, empty collection.
    pub fn new_collection(&self) -> Vec<TRGT> {
        (self.factory)()
    }

    /// Whether a reverse setter was configured.
    pub fn has_reverse_setter(&self) -> bool {
        self.reverse_setter.is_some()
    }

    /// Add one target to the source's collection, fixing the reverse side
    /// when configured.
    pub fn add_to_collection(&self, source: &mut SRC, mut target: TRGT) {
        if let Some(reverse) = &self.reverse_setter {
            reverse(&mut target, source);
        }
        let mut targets = self.collection(source);
        targets.push(target);
        self.set_collection(source, targets);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct Team {
        id: Option<i64>,
        heroes: Vec<HeroRef>,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct HeroRef {
        name: &'static str,
        team_id: Option<i64>,
    }

    fn descriptor() -> ManyRelationDescriptor<Team, HeroRef> {
        ManyRelationDescriptor::new(
            |t: &Team| t.heroes.clone(),
            |t: &mut Team, heroes| t.heroes = heroes,
        )
        .with_reverse_setter(|h: &mut HeroRef, t: &Team| h.team_id = t.id)
    }

    #[test]
    fn test_snapshot_and_set() {
        let d = descriptor();
        let mut team = Team {
            id: Some(1),
            heroes: vec![],
        };
        assert!(d.collection(&team).is_empty());
        d.set_collection(
            &mut team,
            vec![HeroRef {
                name: "a",
                team_id: None,
            }],
        );
        assert_eq!(d.collection(&team).len(), 1);
    }

    #[test]
    fn test_add_fixes_reverse_side() {
        let d = descriptor();
        let mut team = Team {
            id: Some(7),
            heroes: vec![],
        };
        d.add_to_collection(
            &mut team,
            HeroRef {
                name: "a",
                team_id: None,
            },
        );
        assert_eq!(team.heroes[0].team_id, Some(7));
    }
}
