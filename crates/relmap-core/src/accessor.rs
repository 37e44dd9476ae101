//! Property accessors.
//!
//! Where the original pattern for this kind of engine reaches for runtime
//! reflection, relmap uses a closed set of accessor shapes resolved once at
//! configuration time:
//!
//! - [`PropertyAccessor`]: read (and optionally write) one property of an
//!   entity as a [`Value`],
//! - [`Embedding`]: a lens onto a nested value object inside its parent,
//! - constructor-supplied properties, which have no mutator at all (the
//!   bean factory consumes their columns directly).
//!
//! All accessors are cheap-to-clone `Arc` closures, built by the
//! configuration layer and never changed afterwards.

use crate::Result;
use crate::error::Error;
use crate::row::FromValue;
use crate::value::Value;
use std::sync::Arc;

/// Reads one property of an entity as a dynamically-typed value.
pub type Getter<C> = Arc<dyn Fn(&C) -> Value + Send + Sync>;

/// Writes one property of an entity from a dynamically-typed value.
pub type Setter<C> = Arc<dyn Fn(&mut C, Value) -> Result<()> + Send + Sync>;

/// A named property accessor: a getter, and a setter when the property is
/// reversible (readable and writable).
pub struct PropertyAccessor<C> {
    name: &'static str,
    get: Getter<C>,
    set: Option<Setter<C>>,
}

impl<C> Clone for PropertyAccessor<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            get: Arc::clone(&self.get),
            set: self.set.clone(),
        }
    }
}

impl<C> std::fmt::Debug for PropertyAccessor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyAccessor")
            .field("name", &self.name)
            .field("reversible", &self.set.is_some())
            .finish()
    }
}

impl<C> PropertyAccessor<C> {
    /// Create a reversible accessor.
    pub fn new(name: &'static str, get: Getter<C>, set: Setter<C>) -> Self {
        Self {
            name,
            get,
            set: Some(set),
        }
    }

    /// Create a read-only accessor.
    pub fn read_only(name: &'static str, get: Getter<C>) -> Self {
        Self {
            name,
            get,
            set: None,
        }
    }

    /// Property name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Read the property.
    pub fn get(&self, entity: &C) -> Value {
        (self.get)(entity)
    }

    /// Write the property. Errors for read-only accessors.
    pub fn set(&self, entity: &mut C, value: Value) -> Result<()> {
        match &self.set {
            Some(set) => set(entity, value),
            None => Err(Error::unsupported(
                "set",
                format!("property '{}' is read-only", self.name),
            )),
        }
    }

    /// Whether the accessor can write back.
    pub fn is_reversible(&self) -> bool {
        self.set.is_some()
    }
}

/// Build a reversible accessor from typed closures.
///
/// The setter's conversion failure surfaces as a type error naming the
/// property.
pub fn property<C, T, G, S>(name: &'static str, get: G, set: S) -> PropertyAccessor<C>
where
    T: Into<Value> + FromValue,
    G: Fn(&C) -> T + Send + Sync + 'static,
    S: Fn(&mut C, T) + Send + Sync + 'static,
{
    PropertyAccessor::new(
        name,
        Arc::new(move |c: &C| get(c).into()),
        Arc::new(move |c: &mut C, v: Value| {
            let typed = T::from_value(&v).map_err(|mut te| {
                te.column = Some(name.to_string());
                Error::from(te)
            })?;
            set(c, typed);
            Ok(())
        }),
    )
}

/// Build a read-only accessor from a typed closure.
pub fn read_only_property<C, T, G>(name: &'static str, get: G) -> PropertyAccessor<C>
where
    T: Into<Value>,
    G: Fn(&C) -> T + Send + Sync + 'static,
{
    PropertyAccessor::read_only(name, Arc::new(move |c: &C| get(c).into()))
}

/// A lens onto a nested value object inside its parent entity.
///
/// `read` clones the embedded value out (absent means the property is
/// unset); `write` replaces it. Together with the embedded value's own
/// property mapping this forms the composed access chain from parent to
/// nested column values.
pub struct Embedding<C, E> {
    name: &'static str,
    read: Arc<dyn Fn(&C) -> Option<E> + Send + Sync>,
    write: Arc<dyn Fn(&mut C, E) + Send + Sync>,
}

impl<C, E> Clone for Embedding<C, E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            read: Arc::clone(&self.read),
            write: Arc::clone(&self.write),
        }
    }
}

impl<C, E> std::fmt::Debug for Embedding<C, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedding").field("name", &self.name).finish()
    }
}

impl<C, E> Embedding<C, E> {
    /// Create a lens from read/write closures.
    pub fn new<R, W>(name: &'static str, read: R, write: W) -> Self
    where
        R: Fn(&C) -> Option<E> + Send + Sync + 'static,
        W: Fn(&mut C, E) + Send + Sync + 'static,
    {
        Self {
            name,
            read: Arc::new(read),
            write: Arc::new(write),
        }
    }

    /// Property name of the embedded value on the parent.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Read the embedded value out of the parent.
    pub fn read(&self, parent: &C) -> Option<E> {
        (self.read)(parent)
    }

    /// Write the embedded value into the parent.
    pub fn write(&self, parent: &mut C, value: E) {
        (self.write)(parent, value);
    }
}
