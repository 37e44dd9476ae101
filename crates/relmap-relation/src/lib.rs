//! Collection-relationship cascade and diff engines.
//!
//! The second of relmap's two engines: given the two sides' entity
//! mappings and a collection descriptor, it keeps a persisted collection
//! consistent with the in-memory one across insert/update/delete.
//!
//! - [`CollectionDiffer`]: classifies two collection snapshots into
//!   added/removed/held (and reordered, for ordered collections)
//! - [`ManyRelationDescriptor`]: collection access plus the in-memory
//!   relation fixer
//! - [`AssociationTableMapping`]: join-table rows for relations owned by
//!   neither side
//! - [`WritePlan`]/[`WriteOp`]: the ordered row operations handed to the
//!   external SQL executor
//! - [`OneToManyRelation`]/[`AssociationRelation`]: the cascade engines,
//!   attached to a [`Persister`]'s lifecycle as relation hooks
//! - two-phase load support for cyclic graphs

pub mod association;
pub mod cascade;
pub mod descriptor;
pub mod diff;
pub mod listener;
pub mod persister;
pub mod plan;
pub mod two_phase;

pub use association::{AssociationRecord, AssociationTableMapping, IndexedAssociationRecord};
pub use cascade::association::{AssociationRelation, AssociationRelationBuilder};
pub use cascade::one_to_many::{OneToManyRelation, OneToManyRelationBuilder};
pub use descriptor::ManyRelationDescriptor;
pub use diff::{CollectionDiff, CollectionDiffer, IdentityKey, IndexedDiff, IndexedHeld};
pub use listener::{DeleteListener, InsertListener, ListenerSet, SelectListener, UpdateListener};
pub use persister::{Persister, RelationHook};
pub use plan::{WriteOp, WritePlan};
pub use two_phase::{RelationIdCollector, assemble_relations};
