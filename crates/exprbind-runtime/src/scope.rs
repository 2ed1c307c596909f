#![forbid(unsafe_code)]

//! Layered dynamic name resolution for expression bodies.
//!
//! A [`DynamicScope`] is built fresh for every evaluation and discarded
//! afterwards. Reads search, in order:
//!
//! 1. reserved names: `self`, `change` (write handlers), `_[tracer]`
//!    (traced reads) and `nonlocals`,
//! 2. the locals layer (the binding's Local Storage slot),
//! 3. owner attributes, walking the owner's parent chain,
//! 4. module globals,
//! 5. builtins.
//!
//! Writes go to the first object on the owner chain that already has the
//! attribute, otherwise into the locals layer.
//!
//! # Invariants
//!
//! 1. Lookup order is fixed; a local shadows an attribute, an attribute
//!    shadows a global, a global shadows a builtin.
//! 2. With a tracer attached, every successful owner-attribute read is
//!    recorded as `(object, name)` where `object` is the object that
//!    supplied the value. Locals, globals and builtins are never traced.
//! 3. No `RefCell` borrow is held while an owner attribute is read, so
//!    nested evaluations triggered by that read may use the same Local
//!    Storage slot.

use std::fmt;
use std::rc::Rc;

use exprbind_core::{
    AccessError, BindError, ChangeRecord, Namespace, Object, ObjectId, ObjectRef, Opaque, Result,
    SharedNamespace, Value,
};

use crate::funchelper::ModuleEnv;
use crate::tracer::Tracer;

/// Reserved name resolving to the owner object.
pub const SELF_NAME: &str = "self";
/// Reserved name resolving to the change record in write handlers.
pub const CHANGE_NAME: &str = "change";
/// Reserved name resolving to the active tracer in traced reads.
pub const TRACER_NAME: &str = "_[tracer]";
/// Reserved name resolving to a view over the owner-attribute layer.
pub const NONLOCALS_NAME: &str = "nonlocals";

/// Read/write name-resolution context for one evaluation.
pub struct DynamicScope {
    owner: ObjectRef,
    locals: SharedNamespace,
    env: ModuleEnv,
    change: Option<Rc<ChangeRecord>>,
    tracer: Option<Rc<Tracer>>,
}

impl DynamicScope {
    /// A scope over `owner` with the given locals layer. `None` substitutes
    /// an empty, evaluation-private layer.
    pub fn new(owner: ObjectRef, locals: Option<SharedNamespace>, env: ModuleEnv) -> Self {
        Self {
            owner,
            locals: locals.unwrap_or_default(),
            env,
            change: None,
            tracer: None,
        }
    }

    #[must_use]
    pub fn with_change(mut self, change: Rc<ChangeRecord>) -> Self {
        self.change = Some(change);
        self
    }

    #[must_use]
    pub fn with_tracer(mut self, tracer: Rc<Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    #[must_use]
    pub fn owner(&self) -> &ObjectRef {
        &self.owner
    }

    #[must_use]
    pub fn change(&self) -> Option<&Rc<ChangeRecord>> {
        self.change.as_ref()
    }

    #[must_use]
    pub fn tracer(&self) -> Option<&Rc<Tracer>> {
        self.tracer.as_ref()
    }

    /// Resolve `name` through the reserved names and every layer.
    pub fn get_name(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.reserved(name) {
            return Ok(value);
        }
        let local = self.locals.borrow().get(name).cloned();
        if let Some(value) = local {
            return Ok(value);
        }
        if let Some(value) = load_dynamic_attr(&self.owner, name, self.tracer.as_deref())? {
            return Ok(value);
        }
        if let Some(value) = self.env.globals().get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.env.builtins().get(name) {
            return Ok(value.clone());
        }
        Err(BindError::name_resolution(name))
    }

    /// Bind `name`: write through to an existing owner-chain attribute, or
    /// create/overwrite an expression-local temporary.
    pub fn set_name(&self, name: &str, value: Value) -> Result<()> {
        if is_reserved(name) {
            return Err(BindError::evaluation(format!(
                "cannot assign to reserved name '{name}'"
            )));
        }
        if let Some(target) = find_attr_owner(&self.owner, name) {
            return target.set_attr(name, value);
        }
        self.locals.borrow_mut().insert(name.to_owned(), value);
        Ok(())
    }

    /// Remove an expression-local temporary.
    pub fn del_name(&self, name: &str) -> Result<()> {
        self.locals
            .borrow_mut()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BindError::name_resolution(name))
    }

    /// Whether `name` resolves anywhere. Does not trace and does not evaluate.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.reserved_available(name)
            || self.locals.borrow().contains_key(name)
            || find_attr_owner(&self.owner, name).is_some()
            || self.env.globals().contains_key(name)
            || self.env.builtins().contains_key(name)
    }

    /// Snapshot of the locals layer.
    #[must_use]
    pub fn locals(&self) -> Namespace {
        self.locals.borrow().clone()
    }

    fn reserved_available(&self, name: &str) -> bool {
        match name {
            SELF_NAME | NONLOCALS_NAME => true,
            CHANGE_NAME => self.change.is_some(),
            TRACER_NAME => self.tracer.is_some(),
            _ => false,
        }
    }

    fn reserved(&self, name: &str) -> Option<Value> {
        match name {
            SELF_NAME => Some(Value::Object(ObjectRef::clone(&self.owner))),
            CHANGE_NAME => self
                .change
                .as_ref()
                .map(|c| Value::Object(Rc::clone(c) as ObjectRef)),
            TRACER_NAME => self
                .tracer
                .as_ref()
                .map(|t| Value::Opaque(Opaque::new("Tracer", Rc::clone(t)))),
            NONLOCALS_NAME => Some(Value::Object(Rc::new(Nonlocals::new(
                ObjectRef::clone(&self.owner),
                self.tracer.clone(),
            )))),
            _ => None,
        }
    }
}

impl fmt::Debug for DynamicScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicScope")
            .field("owner", &exprbind_core::describe(self.owner.as_ref()))
            .field("locals", &self.locals.borrow().len())
            .field("change", &self.change.is_some())
            .field("tracer", &self.tracer.is_some())
            .finish()
    }
}

pub(crate) fn is_reserved(name: &str) -> bool {
    matches!(name, SELF_NAME | CHANGE_NAME | TRACER_NAME | NONLOCALS_NAME)
}

/// First object on the owner chain that has `name` as an attribute.
fn find_attr_owner(owner: &ObjectRef, name: &str) -> Option<ObjectRef> {
    let mut current = Some(ObjectRef::clone(owner));
    while let Some(obj) = current {
        if obj.has_attr(name) {
            return Some(obj);
        }
        current = obj.parent();
    }
    None
}

/// Owner-attribute layer read, tracing the object that supplied the value.
fn load_dynamic_attr(
    owner: &ObjectRef,
    name: &str,
    tracer: Option<&Tracer>,
) -> Result<Option<Value>> {
    let Some(obj) = find_attr_owner(owner, name) else {
        return Ok(None);
    };
    let value = obj.get_attr(name)?;
    if let (Some(_), Some(tracer)) = (&value, tracer) {
        tracer.trace(&obj, name);
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Nonlocals
// ---------------------------------------------------------------------------

/// View over the owner-attribute layer, bypassing locals, globals and
/// builtins. Bound to `nonlocals` in every scope.
pub struct Nonlocals {
    id: ObjectId,
    owner: ObjectRef,
    tracer: Option<Rc<Tracer>>,
}

impl Nonlocals {
    pub fn new(owner: ObjectRef, tracer: Option<Rc<Tracer>>) -> Self {
        Self {
            id: ObjectId::next(),
            owner,
            tracer,
        }
    }
}

impl Object for Nonlocals {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn type_name(&self) -> &str {
        "nonlocals"
    }

    fn has_attr(&self, name: &str) -> bool {
        find_attr_owner(&self.owner, name).is_some()
    }

    fn get_attr(&self, name: &str) -> Result<Option<Value>> {
        load_dynamic_attr(&self.owner, name, self.tracer.as_deref())
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<()> {
        match find_attr_owner(&self.owner, name) {
            Some(target) => target.set_attr(name, value),
            None => Err(AccessError::no_such_attribute(self.owner.type_name(), name).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::declarative::Declarative;
    use exprbind_core::ChangeKind;

    fn env(globals: &[(&str, Value)]) -> ModuleEnv {
        ModuleEnv::with_globals(
            globals
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
        )
    }

    fn shared(entries: &[(&str, Value)]) -> SharedNamespace {
        Rc::new(RefCell::new(
            entries
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
        ))
    }

    #[test]
    fn locals_shadow_attributes_and_globals() {
        let owner: ObjectRef = Declarative::new("Item").attr("x", Value::Int(1)).build();
        let scope = DynamicScope::new(
            owner,
            Some(shared(&[("x", Value::Int(0))])),
            env(&[("x", Value::Int(2))]),
        );
        assert_eq!(scope.get_name("x").unwrap(), Value::Int(0));
    }

    #[test]
    fn attributes_shadow_globals() {
        let owner: ObjectRef = Declarative::new("Item").attr("x", Value::Int(1)).build();
        let scope = DynamicScope::new(owner, None, env(&[("x", Value::Int(2))]));
        assert_eq!(scope.get_name("x").unwrap(), Value::Int(1));
    }

    #[test]
    fn globals_shadow_builtins() {
        let owner: ObjectRef = Declarative::new("Item").build();
        let scope = DynamicScope::new(owner, None, env(&[("len", Value::Int(2))]));
        assert_eq!(scope.get_name("len").unwrap(), Value::Int(2));
    }

    #[test]
    fn builtins_resolve_last() {
        let owner: ObjectRef = Declarative::new("Item").build();
        let scope = DynamicScope::new(owner, None, ModuleEnv::default());
        assert!(matches!(scope.get_name("len").unwrap(), Value::Native(_)));
    }

    #[test]
    fn missing_name_is_reported() {
        let owner: ObjectRef = Declarative::new("Item").build();
        let scope = DynamicScope::new(owner, None, ModuleEnv::default());
        let err = scope.get_name("zzz").unwrap_err();
        assert_eq!(err.unresolved_name(), Some("zzz"));
    }

    #[test]
    fn self_resolves_to_owner() {
        let owner: ObjectRef = Declarative::new("Item").build();
        let scope = DynamicScope::new(ObjectRef::clone(&owner), None, ModuleEnv::default());
        assert_eq!(scope.get_name("self").unwrap(), Value::Object(owner));
    }

    #[test]
    fn change_only_with_record() {
        let owner: ObjectRef = Declarative::new("Item").build();
        let plain = DynamicScope::new(ObjectRef::clone(&owner), None, ModuleEnv::default());
        assert!(plain.get_name(CHANGE_NAME).is_err());
        assert!(!plain.contains(CHANGE_NAME));

        let record = Rc::new(ChangeRecord::new(
            ChangeKind::Update,
            ObjectRef::clone(&owner),
            "x",
            Value::Int(0),
            Value::Int(5),
        ));
        let scope = plain.with_change(record);
        let change = scope.get_name(CHANGE_NAME).unwrap();
        assert_eq!(change.get_attr("value").unwrap(), Value::Int(5));
    }

    #[test]
    fn tracer_handle_only_when_attached() {
        let owner: ObjectRef = Declarative::new("Item").build();
        let scope = DynamicScope::new(ObjectRef::clone(&owner), None, ModuleEnv::default());
        assert!(scope.get_name(TRACER_NAME).is_err());

        let tracer = Rc::new(Tracer::new(ObjectRef::clone(&owner), "x"));
        let scope = scope.with_tracer(Rc::clone(&tracer));
        let Value::Opaque(handle) = scope.get_name(TRACER_NAME).unwrap() else {
            panic!("tracer should resolve to an opaque handle");
        };
        assert!(Rc::ptr_eq(&handle.downcast::<Tracer>().unwrap(), &tracer));
    }

    #[test]
    fn set_name_writes_through_to_attribute() {
        let item = Declarative::new("Item").attr("x", Value::Int(1)).build();
        let owner: ObjectRef = item.clone();
        let locals = shared(&[]);
        let scope = DynamicScope::new(owner, Some(Rc::clone(&locals)), ModuleEnv::default());

        scope.set_name("x", Value::Int(9)).unwrap();
        scope.set_name("tmp", Value::Int(3)).unwrap();

        assert_eq!(item.value("x"), Some(Value::Int(9)));
        assert!(!locals.borrow().contains_key("x"));
        assert_eq!(locals.borrow().get("tmp"), Some(&Value::Int(3)));
        assert_eq!(scope.get_name("tmp").unwrap(), Value::Int(3));
    }

    #[test]
    fn reserved_names_are_not_assignable() {
        let owner: ObjectRef = Declarative::new("Item").build();
        let scope = DynamicScope::new(owner, None, ModuleEnv::default());
        assert!(scope.set_name("self", Value::None).is_err());
    }

    #[test]
    fn del_name_removes_temporaries() {
        let owner: ObjectRef = Declarative::new("Item").build();
        let scope = DynamicScope::new(owner, None, ModuleEnv::default());
        scope.set_name("tmp", Value::Int(1)).unwrap();
        scope.del_name("tmp").unwrap();
        assert!(scope.get_name("tmp").is_err());
        assert!(scope.del_name("tmp").is_err());
    }

    #[test]
    fn attributes_resolve_through_parent_chain() {
        let root = Declarative::new("Window")
            .attr("title", Value::str("main"))
            .attr("x", Value::Int(100))
            .build();
        let child: ObjectRef = Declarative::new("Label")
            .attr("x", Value::Int(1))
            .parent(root.clone())
            .build();
        let root_obj: ObjectRef = root.clone();
        let tracer = Rc::new(Tracer::new(ObjectRef::clone(&child), "text"));
        let scope = DynamicScope::new(ObjectRef::clone(&child), None, ModuleEnv::default())
            .with_tracer(Rc::clone(&tracer));

        assert_eq!(scope.get_name("title").unwrap(), Value::str("main"));
        assert_eq!(scope.get_name("x").unwrap(), Value::Int(1));
        assert!(tracer.contains(&root_obj, "title"));
        assert!(tracer.contains(&child, "x"));
        assert!(!tracer.contains(&root_obj, "x"));

        scope.set_name("title", Value::str("renamed")).unwrap();
        assert_eq!(root.value("title"), Some(Value::str("renamed")));
    }

    #[test]
    fn nonlocals_skips_locals() {
        let owner: ObjectRef = Declarative::new("Item").attr("x", Value::Int(1)).build();
        let scope = DynamicScope::new(
            owner,
            Some(shared(&[("x", Value::Int(0))])),
            ModuleEnv::default(),
        );
        let nonlocals = scope.get_name(NONLOCALS_NAME).unwrap();
        assert_eq!(nonlocals.get_attr("x").unwrap(), Value::Int(1));
        nonlocals.set_attr("x", Value::Int(7)).unwrap();
        assert_eq!(nonlocals.get_attr("x").unwrap(), Value::Int(7));
        assert_eq!(scope.get_name("x").unwrap(), Value::Int(0));
        assert!(nonlocals.set_attr("nope", Value::None).is_err());
    }

    #[test]
    fn untraced_layers_are_not_recorded() {
        let owner: ObjectRef = Declarative::new("Item").attr("a", Value::Int(1)).build();
        let tracer = Rc::new(Tracer::new(ObjectRef::clone(&owner), "out"));
        let scope = DynamicScope::new(
            ObjectRef::clone(&owner),
            Some(shared(&[("tmp", Value::Int(0))])),
            env(&[("g", Value::Int(2))]),
        )
        .with_tracer(Rc::clone(&tracer));

        scope.get_name("tmp").unwrap();
        scope.get_name("g").unwrap();
        scope.get_name("len").unwrap();
        assert!(tracer.is_empty());
        scope.get_name("a").unwrap();
        assert_eq!(tracer.len(), 1);
    }
}
