//! relmap — an object-relational persistence core.
//!
//! relmap converts in-memory entity graphs into relational row values for
//! writes and relational rows back into entity graphs for reads, and keeps
//! collection-valued relationships consistent with their persisted
//! representation across insert/update/delete.
//!
//! It deliberately owns no SQL: mappings produce column-value payloads and
//! ordered [`WritePlan`]s that an external execution layer runs, and
//! consume [`Row`]s that the execution layer produced. Configuration is
//! builder-based and fail-fast; everything built is immutable afterwards
//! and safe to share across threads.
//!
//! The two engines:
//!
//! - **Mapping** ([`relmap_mapping`]): property/column bindings, shadow
//!   columns, identifier strategies, embedded value objects, versioning
//!   and row transformation.
//! - **Relation** ([`relmap_relation`]): collection diffing and the
//!   cascade engines maintaining foreign keys or association-table rows.

pub use relmap_core::{
    Column, ColumnDef, ColumnInfo, ConfigError, ConfigErrorKind, Embedding, Error, FromValue,
    Getter, PrimaryKey, PropertyAccessor, Result, Row, Setter, SqlType, Table, TypeError,
    UnsupportedError, Value, property, read_only_property,
};
pub use relmap_mapping::{
    BeanFactory, ColumnAliases, ColumnValues, EmbeddedRelation, EntityMapping,
    EntityMappingBuilder, IdAccessor, IdMapping, IdentifierAssembler, IdentifierInsertion,
    IsNewPolicy, KeyedColumnMapping, Mapping, PositionalColumnMapping, PropertyMapping,
    PropertyMappingBuilder, RowAccess, RowStep, RowTransformer, RowTransformerBuilder,
    ShadowColumnProvider, TransformListener, UpdatePayload, UpdateRole, UpwhereColumn,
    VersioningStrategy, WriteContext, row_from_values, simple_id,
};
pub use relmap_relation::{
    AssociationRecord, AssociationRelation, AssociationRelationBuilder, AssociationTableMapping,
    CollectionDiff, CollectionDiffer, DeleteListener, IdentityKey, IndexedAssociationRecord,
    IndexedDiff, IndexedHeld, InsertListener, ListenerSet, ManyRelationDescriptor,
    OneToManyRelation, OneToManyRelationBuilder, Persister, RelationHook, RelationIdCollector,
    SelectListener, UpdateListener, WriteOp, WritePlan, assemble_relations,
};

/// Commonly used items.
pub mod prelude {
    pub use relmap_core::{
        Column, ColumnDef, Embedding, Error, Result, Row, SqlType, Table, Value, property,
    };
    pub use relmap_mapping::{
        BeanFactory, EmbeddedRelation, EntityMapping, IdMapping, IdentifierAssembler,
        IdentifierInsertion, IsNewPolicy, Mapping, PropertyMapping, UpwhereColumn, WriteContext,
        row_from_values, simple_id,
    };
    pub use relmap_relation::{
        AssociationTableMapping, ManyRelationDescriptor, Persister, WriteOp, WritePlan,
    };
}
