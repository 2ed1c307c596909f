#![forbid(unsafe_code)]

//! A concrete, observable owner object.
//!
//! [`Declarative`] is the object expressions are usually bound to: named
//! attributes, per-binding Local Storage, an optional parent for dynamic
//! lookup, per-attribute observers and an [`ExpressionEngine`] created on the
//! first [`Declarative::bind`].
//!
//! # Attribute semantics
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | set to an equal value | nothing |
//! | first set | observers get a `Create` change, then the write handler runs |
//! | later set | observers get an `Update` change, then the write handler runs |
//! | read with no value and a read binding | binding evaluated, result stored (`Create`) |
//! | read with no value and no read binding | `None` |
//! | set on a constant | `AccessError::ReadOnly` |
//! | set on an unknown name | `AccessError::NoSuchAttribute` |
//! | [`Declarative::emit`] | observers and write handler get an `Event`; nothing stored |
//! | [`Declarative::clear_attr`] | the value is dropped and a `Delete` change fires |

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::{AHashMap, AHashSet};
use exprbind_core::{
    AccessError, ChangeKind, ChangeRecord, Namespace, Object, ObjectId, ObjectRef, Observer,
    Observers, Result, ScopeKey, SharedNamespace, Subscription, Value, WeakObjectRef,
};

use crate::config::EngineConfig;
use crate::engine::ExpressionEngine;
use crate::funchelper::ExprFunction;
use crate::operators::Operator;

/// An owner object with observable attributes and expression bindings.
pub struct Declarative {
    id: ObjectId,
    type_name: String,
    weak_self: Weak<Declarative>,
    parent: Option<WeakObjectRef>,
    members: RefCell<AHashSet<String>>,
    constants: AHashSet<String>,
    values: RefCell<AHashMap<String, Value>>,
    storage: RefCell<AHashMap<ScopeKey, SharedNamespace>>,
    observers: Observers,
    config: Option<EngineConfig>,
    engine: RefCell<Option<Rc<ExpressionEngine>>>,
}

impl Declarative {
    /// Start building an object of the given type.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(type_name: impl Into<String>) -> DeclarativeBuilder {
        DeclarativeBuilder {
            type_name: type_name.into(),
            parent: None,
            members: AHashSet::new(),
            constants: AHashSet::new(),
            values: AHashMap::new(),
            storage: AHashMap::new(),
            config: None,
        }
    }

    /// The stored value of `name`, without evaluating any binding.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<Value> {
        self.values.borrow().get(name).cloned()
    }

    /// The expression engine, once something has been bound.
    #[must_use]
    pub fn engine(&self) -> Option<Rc<ExpressionEngine>> {
        self.engine.borrow().clone()
    }

    /// Bind `func` to `name` with `operator`. Declares `name` as an
    /// attribute if it is not one yet.
    pub fn bind(&self, name: &str, operator: Operator, func: ExprFunction, scope_key: ScopeKey) {
        self.members.borrow_mut().insert(name.to_owned());
        let engine = self.engine_or_init();
        engine.add_binding(name, operator.bind(func, scope_key));
    }

    /// Evaluate every read binding that has no stored value yet, installing
    /// the subscriptions of traced ones.
    pub fn initialize(&self) -> Result<()> {
        let Some(engine) = self.engine() else {
            return Ok(());
        };
        for name in engine.binding_names() {
            if engine.has_reader(&name) && self.value(&name).is_none() {
                self.get_attr(&name)?;
            }
        }
        Ok(())
    }

    /// Fire an `Event` change on `name` without storing `value`. Observers
    /// and the write handler see it like any other change.
    pub fn emit(&self, name: &str, value: Value) -> Result<()> {
        if !self.has_attr(name) {
            return Err(AccessError::no_such_attribute(&self.type_name, name).into());
        }
        self.dispatch(ChangeKind::Event, name, Value::None, value)
    }

    /// Drop the stored value of `name`, firing a `Delete` change. The
    /// attribute stays declared; a read binding recomputes it on next read.
    pub fn clear_attr(&self, name: &str) -> Result<()> {
        if self.constants.contains(name) {
            return Err(AccessError::read_only(&self.type_name, name).into());
        }
        let old = self.values.borrow_mut().remove(name);
        let Some(old) = old else {
            return Ok(());
        };
        self.members.borrow_mut().insert(name.to_owned());
        self.dispatch(ChangeKind::Delete, name, old, Value::None)
    }

    /// The Local Storage slot for `key`, created empty if missing.
    pub fn local_slot(&self, key: ScopeKey) -> SharedNamespace {
        Rc::clone(self.storage.borrow_mut().entry(key).or_default())
    }

    /// Observe changes to `name` with a closure.
    pub fn subscribe(
        &self,
        name: &str,
        callback: impl Fn(&Rc<ChangeRecord>) + 'static,
    ) -> Subscription {
        self.observers.subscribe(name, Rc::new(callback))
    }

    fn as_object(&self) -> Option<ObjectRef> {
        self.weak_self.upgrade().map(|rc| rc as ObjectRef)
    }

    fn dispatch(&self, kind: ChangeKind, name: &str, old: Value, new: Value) -> Result<()> {
        let Some(owner) = self.as_object() else {
            return Ok(());
        };
        let change = Rc::new(ChangeRecord::new(kind, ObjectRef::clone(&owner), name, old, new));
        self.observers.notify(&change);
        if let Some(engine) = self.engine() {
            engine.write(&owner, name, &change)?;
        }
        Ok(())
    }

    fn engine_or_init(&self) -> Rc<ExpressionEngine> {
        let mut slot = self.engine.borrow_mut();
        let engine = slot.get_or_insert_with(|| match &self.config {
            Some(config) => ExpressionEngine::new(config.clone()),
            None => ExpressionEngine::with_global_config(),
        });
        Rc::clone(engine)
    }
}

impl Object for Declarative {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn has_attr(&self, name: &str) -> bool {
        self.values.borrow().contains_key(name) || self.members.borrow().contains(name)
    }

    fn get_attr(&self, name: &str) -> Result<Option<Value>> {
        if let Some(value) = self.value(name) {
            return Ok(Some(value));
        }
        if !self.has_attr(name) {
            return Ok(None);
        }
        if let (Some(engine), Some(owner)) = (self.engine(), self.as_object()) {
            if engine.has_reader(name) {
                engine.update(&owner, name)?;
            }
        }
        Ok(Some(self.value(name).unwrap_or_default()))
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<()> {
        if self.constants.contains(name) {
            return Err(AccessError::read_only(&self.type_name, name).into());
        }
        if !self.has_attr(name) {
            return Err(AccessError::no_such_attribute(&self.type_name, name).into());
        }
        let old = {
            let mut values = self.values.borrow_mut();
            if values.get(name) == Some(&value) {
                return Ok(());
            }
            values.insert(name.to_owned(), value.clone())
        };
        let kind = if old.is_some() {
            ChangeKind::Update
        } else {
            ChangeKind::Create
        };
        self.dispatch(kind, name, old.unwrap_or_default(), value)
    }

    fn local_storage(&self, key: &ScopeKey) -> Option<SharedNamespace> {
        self.storage.borrow().get(key).cloned()
    }

    fn parent(&self) -> Option<ObjectRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    fn observe(&self, name: &str, observer: Observer) -> Option<Subscription> {
        Some(self.observers.subscribe(name, observer))
    }
}

impl fmt::Debug for Declarative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declarative")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("values", &self.values.borrow())
            .field("engine", &self.engine.borrow().is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`Declarative`].
#[must_use]
pub struct DeclarativeBuilder {
    type_name: String,
    parent: Option<WeakObjectRef>,
    members: AHashSet<String>,
    constants: AHashSet<String>,
    values: AHashMap<String, Value>,
    storage: AHashMap<ScopeKey, SharedNamespace>,
    config: Option<EngineConfig>,
}

impl DeclarativeBuilder {
    /// A writable attribute with an initial value.
    pub fn attr(mut self, name: &str, value: Value) -> Self {
        self.values.insert(name.to_owned(), value);
        self
    }

    /// A writable attribute with no value yet.
    pub fn member(mut self, name: &str) -> Self {
        self.members.insert(name.to_owned());
        self
    }

    /// A read-only attribute.
    pub fn constant(mut self, name: &str, value: Value) -> Self {
        self.constants.insert(name.to_owned());
        self.values.insert(name.to_owned(), value);
        self
    }

    /// Next object in the dynamic lookup chain. Held weakly.
    pub fn parent(mut self, parent: ObjectRef) -> Self {
        self.parent = Some(Rc::downgrade(&parent));
        self
    }

    /// Pre-populated Local Storage for `key`.
    pub fn storage(mut self, key: ScopeKey, locals: Namespace) -> Self {
        self.storage.insert(key, Rc::new(RefCell::new(locals)));
        self
    }

    /// Config for this object's engine instead of the thread's global one.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn build(self) -> Rc<Declarative> {
        Rc::new_cyclic(|weak_self| Declarative {
            id: ObjectId::next(),
            type_name: self.type_name,
            weak_self: weak_self.clone(),
            parent: self.parent,
            members: RefCell::new(self.members),
            constants: self.constants,
            values: RefCell::new(self.values),
            storage: RefCell::new(self.storage),
            observers: Observers::new(),
            config: self.config,
            engine: RefCell::new(None),
        })
    }
}
