//! Call-scoped write context.
//!
//! During a cascade, shadow-column providers need two pieces of information
//! that do not live on the entity being written: the identifier of the
//! owning source entity (for owning-side foreign keys) and the element's
//! position in its collection (for list-index columns).
//!
//! Rather than stashing these in thread-bound state that must be cleared on
//! every exit path, the cascade engines build a fresh `WriteContext` per
//! element immediately before producing its row and hand it down the call
//! chain explicitly. The context is immutable once built, so nothing can
//! leak into a later call.

use relmap_core::Value;

/// Per-element context threaded through one insert/update call chain.
#[derive(Debug, Clone, Default)]
pub struct WriteContext {
    owner_id: Option<Vec<Value>>,
    index: Option<i64>,
}

impl WriteContext {
    /// An empty context, for writes outside any relation cascade.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for an element owned by the source with the given
    /// identifier.
    pub fn for_owner(owner_id: Vec<Value>) -> Self {
        Self {
            owner_id: Some(owner_id),
            index: None,
        }
    }

    /// Attach the element's position in its collection.
    #[must_use]
    pub fn at_index(mut self, index: i64) -> Self {
        self.index = Some(index);
        self
    }

    /// Identifier of the owning source entity, if inside a cascade.
    pub fn owner_id(&self) -> Option<&[Value]> {
        self.owner_id.as_deref()
    }

    /// One component of the owner identifier.
    pub fn owner_component(&self, i: usize) -> Option<&Value> {
        self.owner_id.as_ref().and_then(|id| id.get(i))
    }

    /// The element's collection position, if the relation is ordered.
    pub fn index(&self) -> Option<i64> {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context() {
        let ctx = WriteContext::new();
        assert!(ctx.owner_id().is_none());
        assert!(ctx.index().is_none());
    }

    #[test]
    fn test_owner_and_index() {
        let ctx = WriteContext::for_owner(vec![Value::BigInt(7)]).at_index(2);
        assert_eq!(ctx.owner_id(), Some(&[Value::BigInt(7)][..]));
        assert_eq!(ctx.owner_component(0), Some(&Value::BigInt(7)));
        assert_eq!(ctx.owner_component(1), None);
        assert_eq!(ctx.index(), Some(2));
    }
}
