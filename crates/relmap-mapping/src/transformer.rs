//! Row-to-bean transformation.
//!
//! A [`RowTransformer`] owns the steps needed to build an entity from a
//! result row: a bean factory (a plain constructor, or one that consumes
//! columns directly), an ordered list of row-application steps, and the
//! listeners notified after each produced bean. Column-to-row-key
//! resolution goes through [`ColumnAliases`], so the same transformer can
//! be rebound to an aliased sub-select with `copy_with_aliases` without
//! re-deriving any of the steps.

use relmap_core::{Column, FromValue, Result, Row, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Column-to-row-key resolution.
///
/// By default a column's value is read under its own name; aliases override
/// that per column (e.g. `person.name` read under `owner_name` in a joined
/// select).
#[derive(Debug, Clone, Default)]
pub struct ColumnAliases {
    overrides: HashMap<Column, String>,
}

impl ColumnAliases {
    /// No aliases: every column resolves to its own name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an alias for one column.
    #[must_use]
    pub fn aliased(mut self, column: Column, key: impl Into<String>) -> Self {
        self.overrides.insert(column, key.into());
        self
    }

    /// The row key a column's value is read under.
    pub fn key_for<'a>(&'a self, column: &'a Column) -> &'a str {
        self.overrides
            .get(column)
            .map(String::as_str)
            .unwrap_or_else(|| column.name())
    }
}

/// A result row viewed through an alias mapping.
///
/// This is the column lookup handed to row steps and transform listeners.
#[derive(Debug, Clone, Copy)]
pub struct RowAccess<'a> {
    row: &'a Row,
    aliases: &'a ColumnAliases,
}

impl<'a> RowAccess<'a> {
    /// View a row through the given aliases.
    pub fn new(row: &'a Row, aliases: &'a ColumnAliases) -> Self {
        Self { row, aliases }
    }

    /// The raw value of a column, if the row carries it.
    pub fn value(&self, column: &Column) -> Option<&'a Value> {
        self.row.get_by_name(self.aliases.key_for(column))
    }

    /// Typed value of a column.
    pub fn get<T: FromValue>(&self, column: &Column) -> Result<T> {
        self.row
            .get_named(self.aliases.key_for(column))
            .map_err(Into::into)
    }

    /// Whether the row carries the column at all.
    pub fn contains(&self, column: &Column) -> bool {
        self.row.contains_column(self.aliases.key_for(column))
    }

    /// The underlying row.
    pub fn row(&self) -> &'a Row {
        self.row
    }
}

/// Observer notified with every bean produced by a transformer.
pub trait TransformListener<C>: Send + Sync {
    /// Called once per transformed row, after all row steps ran.
    fn row_consumed(&self, bean: &mut C, row: &RowAccess<'_>);
}

/// How a transformer obtains a fresh bean instance.
pub enum BeanFactory<C> {
    /// A plain constructor; every property is set through its mutator.
    Default(Arc<dyn Fn() -> C + Send + Sync>),
    /// A constructor reading some columns directly from the row. The
    /// consumed columns are skipped during row application.
    FromRow {
        build: Arc<dyn Fn(&RowAccess<'_>) -> Result<C> + Send + Sync>,
        consumed: Vec<Column>,
    },
}

impl<C> Clone for BeanFactory<C> {
    fn clone(&self) -> Self {
        match self {
            BeanFactory::Default(f) => BeanFactory::Default(Arc::clone(f)),
            BeanFactory::FromRow { build, consumed } => BeanFactory::FromRow {
                build: Arc::clone(build),
                consumed: consumed.clone(),
            },
        }
    }
}

impl<C> std::fmt::Debug for BeanFactory<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BeanFactory::Default(_) => f.write_str("BeanFactory::Default"),
            BeanFactory::FromRow { consumed, .. } => f
                .debug_struct("BeanFactory::FromRow")
                .field("consumed", consumed)
                .finish(),
        }
    }
}

impl<C> BeanFactory<C> {
    /// Factory from a plain constructor closure.
    pub fn from_fn(f: impl Fn() -> C + Send + Sync + 'static) -> Self {
        BeanFactory::Default(Arc::new(f))
    }

    /// Factory that consumes the listed columns directly from the row.
    pub fn from_row(
        build: impl Fn(&RowAccess<'_>) -> Result<C> + Send + Sync + 'static,
        consumed: Vec<Column>,
    ) -> Self {
        BeanFactory::FromRow {
            build: Arc::new(build),
            consumed,
        }
    }

    /// Columns the factory reads itself (empty for plain constructors).
    pub fn consumed_columns(&self) -> &[Column] {
        match self {
            BeanFactory::Default(_) => &[],
            BeanFactory::FromRow { consumed, .. } => consumed,
        }
    }

    /// Whether the factory consumes the given column.
    pub fn consumes(&self, column: &Column) -> bool {
        self.consumed_columns().contains(column)
    }

    /// Produce a fresh instance.
    pub fn new_instance(&self, row: &RowAccess<'_>) -> Result<C> {
        match self {
            BeanFactory::Default(f) => Ok(f()),
            BeanFactory::FromRow { build, .. } => build(row),
        }
    }
}

/// One application step run against every row.
pub type RowStep<C> = Arc<dyn Fn(&RowAccess<'_>, &mut C) -> Result<()> + Send + Sync>;

/// Builds a bean from a row: factory, then row steps, then listeners.
pub struct RowTransformer<C> {
    factory: BeanFactory<C>,
    steps: Vec<RowStep<C>>,
    listeners: Vec<Arc<dyn TransformListener<C>>>,
    aliases: ColumnAliases,
}

impl<C> Clone for RowTransformer<C> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            steps: self.steps.clone(),
            listeners: self.listeners.clone(),
            aliases: self.aliases.clone(),
        }
    }
}

impl<C> RowTransformer<C> {
    /// Start building a transformer around a bean factory.
    pub fn builder(factory: BeanFactory<C>) -> RowTransformerBuilder<C> {
        RowTransformerBuilder {
            factory,
            steps: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Build a bean from a row and notify listeners.
    pub fn transform(&self, row: &Row) -> Result<C> {
        let access = RowAccess::new(row, &self.aliases);
        let mut bean = self.factory.new_instance(&access)?;
        for step in &self.steps {
            step(&access, &mut bean)?;
        }
        for listener in &self.listeners {
            listener.row_consumed(&mut bean, &access);
        }
        Ok(bean)
    }

    /// Apply the row steps to an existing bean (no factory, no listeners).
    pub fn apply(&self, row: &Row, bean: &mut C) -> Result<()> {
        let access = RowAccess::new(row, &self.aliases);
        for step in &self.steps {
            step(&access, bean)?;
        }
        Ok(())
    }

    /// A copy of this transformer bound to a different column-to-row-key
    /// resolution. Steps and listeners are shared with the original, so
    /// listeners observe rows produced by either instance.
    #[must_use]
    pub fn copy_with_aliases(&self, aliases: ColumnAliases) -> Self {
        Self {
            factory: self.factory.clone(),
            steps: self.steps.clone(),
            listeners: self.listeners.clone(),
            aliases,
        }
    }

    /// The active alias mapping.
    pub fn aliases(&self) -> &ColumnAliases {
        &self.aliases
    }

    /// The bean factory.
    pub fn factory(&self) -> &BeanFactory<C> {
        &self.factory
    }
}

/// Builder for [`RowTransformer`]. Steps and listeners are registered
/// during the configuration pass and fixed afterwards.
pub struct RowTransformerBuilder<C> {
    factory: BeanFactory<C>,
    steps: Vec<RowStep<C>>,
    listeners: Vec<Arc<dyn TransformListener<C>>>,
}

impl<C> RowTransformerBuilder<C> {
    /// Append a row-application step.
    #[must_use]
    pub fn step(mut self, step: RowStep<C>) -> Self {
        self.steps.push(step);
        self
    }

    /// Register a transform listener.
    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn TransformListener<C>>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Finish, with default (name-based) column resolution.
    pub fn build(self) -> RowTransformer<C> {
        RowTransformer {
            factory: self.factory,
            steps: self.steps,
            listeners: self.listeners,
            aliases: ColumnAliases::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relmap_core::{ColumnDef, SqlType, Table};
    use std::sync::Mutex;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Person {
        id: i64,
        name: String,
    }

    fn person_table() -> Table {
        Table::build(
            "person",
            vec![
                ColumnDef::new("id", SqlType::BigInt).primary_key(true),
                ColumnDef::new("name", SqlType::Text).nullable(false),
            ],
        )
        .unwrap()
    }

    fn person_transformer(table: &Table) -> RowTransformer<Person> {
        let id_col = table.column("id").unwrap().clone();
        let name_col = table.column("name").unwrap().clone();
        RowTransformer::builder(BeanFactory::from_fn(Person::default))
            .step(Arc::new(move |row, p: &mut Person| {
                p.id = row.get(&id_col)?;
                Ok(())
            }))
            .step(Arc::new(move |row, p: &mut Person| {
                p.name = row.get(&name_col)?;
                Ok(())
            }))
            .build()
    }

    #[test]
    fn test_transform_builds_bean() {
        let table = person_table();
        let transformer = person_transformer(&table);
        let row = Row::from_pairs(vec![
            ("id".to_string(), Value::BigInt(1)),
            ("name".to_string(), Value::Text("Ada".to_string())),
        ]);
        let person = transformer.transform(&row).unwrap();
        assert_eq!(
            person,
            Person {
                id: 1,
                name: "Ada".to_string()
            }
        );
    }

    #[test]
    fn test_copy_with_aliases_rebinds_resolution() {
        let table = person_table();
        let transformer = person_transformer(&table);
        let aliased = transformer.copy_with_aliases(
            ColumnAliases::new()
                .aliased(table.column("id").unwrap().clone(), "p_id")
                .aliased(table.column("name").unwrap().clone(), "p_name"),
        );

        let row = Row::from_pairs(vec![
            ("p_id".to_string(), Value::BigInt(2)),
            ("p_name".to_string(), Value::Text("Grace".to_string())),
        ]);
        // The original does not see the aliased keys.
        assert!(transformer.transform(&row).is_err());
        let person = aliased.transform(&row).unwrap();
        assert_eq!(person.id, 2);
        assert_eq!(person.name, "Grace");
    }

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl TransformListener<Person> for Recorder {
        fn row_consumed(&self, bean: &mut Person, _row: &RowAccess<'_>) {
            self.seen.lock().unwrap().push(bean.name.clone());
        }
    }

    #[test]
    fn test_listeners_carried_over_to_aliased_copy() {
        let table = person_table();
        let id_col = table.column("id").unwrap().clone();
        let name_col = table.column("name").unwrap().clone();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let transformer = RowTransformer::builder(BeanFactory::from_fn(Person::default))
            .step(Arc::new(move |row, p: &mut Person| {
                p.id = row.get(&id_col)?;
                Ok(())
            }))
            .step(Arc::new(move |row, p: &mut Person| {
                p.name = row.get(&name_col)?;
                Ok(())
            }))
            .listener(recorder.clone())
            .build();

        let aliased = transformer.copy_with_aliases(
            ColumnAliases::new()
                .aliased(table.column("id").unwrap().clone(), "x_id")
                .aliased(table.column("name").unwrap().clone(), "x_name"),
        );

        transformer
            .transform(&Row::from_pairs(vec![
                ("id".to_string(), Value::BigInt(1)),
                ("name".to_string(), Value::Text("Ada".to_string())),
            ]))
            .unwrap();
        aliased
            .transform(&Row::from_pairs(vec![
                ("x_id".to_string(), Value::BigInt(2)),
                ("x_name".to_string(), Value::Text("Grace".to_string())),
            ]))
            .unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(*seen, vec!["Ada".to_string(), "Grace".to_string()]);
    }

    #[test]
    fn test_from_row_factory_consumes_columns() {
        let table = person_table();
        let id_col = table.column("id").unwrap().clone();
        let name_col = table.column("name").unwrap().clone();
        let factory_id = id_col.clone();
        let factory = BeanFactory::from_row(
            move |row| {
                Ok(Person {
                    id: row.get(&factory_id)?,
                    name: String::new(),
                })
            },
            vec![id_col.clone()],
        );
        assert!(factory.consumes(&id_col));
        assert!(!factory.consumes(&name_col));

        let transformer = RowTransformer::builder(factory)
            .step(Arc::new(move |row, p: &mut Person| {
                p.name = row.get(&name_col)?;
                Ok(())
            }))
            .build();
        let person = transformer
            .transform(&Row::from_pairs(vec![
                ("id".to_string(), Value::BigInt(5)),
                ("name".to_string(), Value::Text("Alan".to_string())),
            ]))
            .unwrap();
        assert_eq!(person.id, 5);
        assert_eq!(person.name, "Alan");
    }
}
