//! End-to-end checks of the mapping engine: payload computation, row
//! transformation and identifier policies over a realistic entity with an
//! embedded value object and a version column.

use relmap::prelude::*;
use relmap::{ColumnAliases, UpdateRole, VersioningStrategy};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
struct Address {
    street: Option<String>,
    city: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Customer {
    id: Option<i64>,
    name: String,
    active: bool,
    version: i64,
    address: Option<Address>,
}

fn customer_table() -> Table {
    Table::build(
        "customer",
        vec![
            ColumnDef::new("id", SqlType::BigInt)
                .primary_key(true)
                .auto_generated(true),
            ColumnDef::new("name", SqlType::Text).nullable(false),
            ColumnDef::new("active", SqlType::Boolean).nullable(false),
            ColumnDef::new("version", SqlType::BigInt).nullable(false),
            ColumnDef::new("street", SqlType::Text),
            ColumnDef::new("city", SqlType::Text),
        ],
    )
    .unwrap()
}

fn customer_mapping() -> (Table, EntityMapping<Customer>) {
    let table = customer_table();
    let main = PropertyMapping::builder(BeanFactory::from_fn(Customer::default))
        .map(
            property(
                "name",
                |c: &Customer| c.name.clone(),
                |c: &mut Customer, v| c.name = v,
            ),
            table.column("name").unwrap().clone(),
        )
        .map(
            property(
                "active",
                |c: &Customer| c.active,
                |c: &mut Customer, v| c.active = v,
            ),
            table.column("active").unwrap().clone(),
        )
        .build()
        .unwrap();
    let id = IdMapping::new(
        simple_id(|c: &Customer| c.id, |c: &mut Customer, v| c.id = v),
        IdentifierAssembler::simple(table.column("id").unwrap().clone()),
        IdentifierInsertion::DatabaseGenerated,
        IsNewPolicy::Nullable,
    );
    let address_mapping = PropertyMapping::builder(BeanFactory::from_fn(Address::default))
        .map(
            property(
                "street",
                |a: &Address| a.street.clone(),
                |a: &mut Address, v| a.street = v,
            ),
            table.column("street").unwrap().clone(),
        )
        .map(
            property(
                "city",
                |a: &Address| a.city.clone(),
                |a: &mut Address, v| a.city = v,
            ),
            table.column("city").unwrap().clone(),
        )
        .build()
        .unwrap();
    let embedding = Embedding::new(
        "address",
        |c: &Customer| c.address.clone(),
        |c: &mut Customer, a: Address| c.address = Some(a),
    );
    let version = VersioningStrategy::incrementing(
        table.column("version").unwrap().clone(),
        Arc::new(|c: &Customer| Value::BigInt(c.version)),
        Some(Arc::new(|c: &mut Customer, v: Value| {
            c.version = v.as_i64().unwrap_or(0);
            Ok(())
        })),
    );
    let mapping = EntityMapping::builder(table.clone(), main, id)
        .embed(EmbeddedRelation::build(embedding, address_mapping))
        .versioned_by(version)
        .build()
        .unwrap();
    (table, mapping)
}

fn ada() -> Customer {
    Customer {
        id: Some(1),
        name: "Ada".to_string(),
        active: true,
        version: 1,
        address: Some(Address {
            street: Some("12 Main".to_string()),
            city: Some("London".to_string()),
        }),
    }
}

#[test]
fn round_trip_preserves_every_mapped_property() {
    let (table, mapping) = customer_mapping();
    let customer = ada();
    let mut values = mapping.insert_values(&customer, &WriteContext::new());
    // The execution layer echoes the generated key back into the row.
    values.insert(table.column("id").unwrap().clone(), Value::BigInt(1));
    let rebuilt = mapping.transform(&row_from_values(&values)).unwrap();
    assert_eq!(rebuilt, customer);
}

#[test]
fn auto_generated_key_never_in_insert_payload() {
    let (table, mapping) = customer_mapping();
    let values = mapping.insert_values(&ada(), &WriteContext::new());
    assert!(!values.contains_key(table.column("id").unwrap()));
}

#[test]
fn unchanged_entity_produces_empty_update() {
    let (_, mapping) = customer_mapping();
    let a = ada();
    let b = ada();
    assert!(mapping
        .update_values(&a, Some(&b), false, &WriteContext::new())
        .is_empty());
    assert!(mapping
        .update_values(&a, Some(&b), true, &WriteContext::new())
        .is_empty());
}

#[test]
fn cross_identity_update_is_refused() {
    let (_, mapping) = customer_mapping();
    let a = ada();
    let mut b = ada();
    b.id = Some(2);
    b.name = "Grace".to_string();
    assert!(mapping
        .update_values(&b, Some(&a), false, &WriteContext::new())
        .is_empty());
}

#[test]
fn version_column_appears_under_both_roles() {
    let (table, mapping) = customer_mapping();
    let before = ada();
    let mut after = ada();
    after.name = "Ada Lovelace".to_string();

    let payload = mapping.update_values(&after, Some(&before), false, &WriteContext::new());
    let version = table.column("version").unwrap().clone();
    assert_eq!(
        payload.get(&UpwhereColumn::set(version.clone())),
        Some(&Value::BigInt(2))
    );
    assert_eq!(
        payload.get(&UpwhereColumn::condition(version)),
        Some(&Value::BigInt(1))
    );

    let set_entries = payload.keys().filter(|k| k.role() == UpdateRole::Set).count();
    let where_entries = payload
        .keys()
        .filter(|k| k.role() == UpdateRole::Where)
        .count();
    assert!(set_entries >= 2); // name + version
    assert_eq!(where_entries, 2); // version + identifier
}

#[test]
fn lazy_embedded_stays_unset_on_all_null_slice() {
    let (_, mapping) = customer_mapping();
    let row = Row::from_pairs(vec![
        ("id".to_string(), Value::BigInt(5)),
        ("name".to_string(), Value::Text("Alan".to_string())),
        ("active".to_string(), Value::Bool(true)),
        ("version".to_string(), Value::BigInt(1)),
        ("street".to_string(), Value::Null),
        ("city".to_string(), Value::Null),
    ]);
    let customer = mapping.transform(&row).unwrap();
    assert_eq!(customer.address, None);
}

#[test]
fn lazy_embedded_instantiates_on_partial_slice() {
    let (_, mapping) = customer_mapping();
    let row = Row::from_pairs(vec![
        ("id".to_string(), Value::BigInt(5)),
        ("name".to_string(), Value::Text("Alan".to_string())),
        ("active".to_string(), Value::Bool(true)),
        ("version".to_string(), Value::BigInt(1)),
        ("street".to_string(), Value::Text("Main".to_string())),
        ("city".to_string(), Value::Null),
    ]);
    let customer = mapping.transform(&row).unwrap();
    let address = customer.address.expect("address must be instantiated");
    assert_eq!(address.street.as_deref(), Some("Main"));
    assert_eq!(address.city, None);
}

#[test]
fn aliased_transformer_reads_prefixed_rows() {
    let (table, mapping) = customer_mapping();
    let mut aliases = ColumnAliases::new();
    for col in table.columns() {
        aliases = aliases.aliased(col.clone(), format!("c_{}", col.name()));
    }
    let transformer = mapping.transformer_with_aliases(aliases);
    let row = Row::from_pairs(vec![
        ("c_id".to_string(), Value::BigInt(9)),
        ("c_name".to_string(), Value::Text("Grace".to_string())),
        ("c_active".to_string(), Value::Bool(false)),
        ("c_version".to_string(), Value::BigInt(3)),
        ("c_street".to_string(), Value::Null),
        ("c_city".to_string(), Value::Null),
    ]);
    let customer = transformer.transform(&row).unwrap();
    assert_eq!(customer.id, Some(9));
    assert_eq!(customer.name, "Grace");
    assert_eq!(customer.version, 3);
    assert_eq!(customer.address, None);
}

mod is_new_policies {
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct NullableId {
        id: Option<i64>,
    }

    #[derive(Debug, Clone, Default)]
    struct PrimitiveId {
        id: i64,
    }

    fn key_table() -> Table {
        Table::build(
            "person",
            vec![ColumnDef::new("id", SqlType::BigInt).primary_key(true)],
        )
        .unwrap()
    }

    #[test]
    fn nullable_policy_treats_zero_as_assigned() {
        let table = key_table();
        let id = IdMapping::new(
            simple_id(|p: &NullableId| p.id, |p: &mut NullableId, v| p.id = v),
            IdentifierAssembler::simple(table.column("id").unwrap().clone()),
            IdentifierInsertion::DatabaseGenerated,
            IsNewPolicy::Nullable,
        );
        assert!(id.is_new(&NullableId { id: None }));
        // 0 is a valid assigned value, not a default marker.
        assert!(!id.is_new(&NullableId { id: Some(0) }));
    }

    #[test]
    fn primitive_policy_treats_zero_as_new() {
        let table = key_table();
        let id = IdMapping::new(
            simple_id(|p: &PrimitiveId| p.id, |p: &mut PrimitiveId, v| p.id = v),
            IdentifierAssembler::simple(table.column("id").unwrap().clone()),
            IdentifierInsertion::DatabaseGenerated,
            IsNewPolicy::PrimitiveDefault,
        );
        assert!(id.is_new(&PrimitiveId { id: 0 }));
        assert!(!id.is_new(&PrimitiveId { id: 7 }));
    }
}
