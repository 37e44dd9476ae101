//! Cascade engines: synchronize a persisted collection with the in-memory
//! one.
//!
//! Two shapes exist, matching how the relation is persisted:
//!
//! - [`one_to_many`]: the target row owns a foreign key (and optionally a
//!   position column) pointing back at the source;
//! - [`association`]: an association table owns (source id, target id
//!   [, position]) rows and neither side's own row changes.

pub mod association;
pub mod one_to_many;
