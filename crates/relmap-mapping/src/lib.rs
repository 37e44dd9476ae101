//! Entity-to-column mapping and row transformation.
//!
//! This crate holds the first of relmap's two engines: the mapping layer
//! that turns entities into insert/update column payloads and result rows
//! back into entities.
//!
//! - [`Mapping`]: the conversion contract (insert values, update values,
//!   row transformation)
//! - [`PropertyMapping`]: declared property/column bindings plus shadow
//!   columns, for a main entity or an embedded value object
//! - [`IdMapping`]: identifier access, newness policies, insertion
//!   strategy, row↔identifier assembly
//! - [`EntityMapping`]: the composition root merging main mapping,
//!   identifier, embedded sub-mappings and an optional version column
//! - [`RowTransformer`]: row-to-bean construction with aliasable column
//!   resolution and transform listeners
//! - [`PositionalColumnMapping`]/[`KeyedColumnMapping`]: flat
//!   collection/map properties spread over a fixed column set

pub mod context;
pub mod entity;
pub mod id;
pub mod mapping;
pub mod property;
pub mod spread;
pub mod transformer;
pub mod version;

pub use context::WriteContext;
pub use entity::{EmbeddedRelation, EntityMapping, EntityMappingBuilder};
pub use id::{IdAccessor, IdMapping, IdentifierAssembler, IdentifierInsertion, IsNewPolicy, simple_id};
pub use mapping::{ColumnValues, Mapping, UpdatePayload, UpdateRole, UpwhereColumn, row_from_values};
pub use property::{PropertyMapping, PropertyMappingBuilder, ShadowColumnProvider};
pub use spread::{KeyedColumnMapping, PositionalColumnMapping};
pub use transformer::{
    BeanFactory, ColumnAliases, RowAccess, RowStep, RowTransformer, RowTransformerBuilder,
    TransformListener,
};
pub use version::VersioningStrategy;
