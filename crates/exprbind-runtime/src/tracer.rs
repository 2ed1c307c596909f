#![forbid(unsafe_code)]

//! Dependency tracing for auto-updating reads.
//!
//! A [`Tracer`] is bound to one `(owner, attribute)` pair and lives for a
//! single evaluation. The scope records every owner-attribute read into it;
//! compiled bodies can also record explicit dependencies through
//! [`Tracer::load_attr`], [`Tracer::call_function`] and [`Tracer::trace`]
//! for attribute reads on objects other than the owner chain.
//!
//! # Invariants
//!
//! 1. The dependency set is duplicate-free and keeps first-read order.
//! 2. Nothing is pruned or cached within one evaluation: every observed
//!    read is recorded.
//! 3. A tracer is never shared between evaluations. Re-evaluating a traced
//!    binding creates a new tracer; the caller replaces the old dependency
//!    set wholesale.

use std::cell::RefCell;
use std::fmt;

use ahash::AHashSet;
use exprbind_core::{ObjectId, ObjectRef, Result, Value, describe};

use crate::builtins::GETATTR;

/// One `(object, attribute)` pair an evaluation read.
#[derive(Clone)]
pub struct Dependency {
    pub object: ObjectRef,
    pub name: String,
}

impl Dependency {
    #[must_use]
    pub fn key(&self) -> (ObjectId, &str) {
        (self.object.object_id(), &self.name)
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Dependency {}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {:?})", describe(self.object.as_ref()), self.name)
    }
}

/// Records the dependencies of one traced evaluation.
pub struct Tracer {
    owner: ObjectRef,
    name: String,
    items: RefCell<Vec<Dependency>>,
    seen: RefCell<AHashSet<(ObjectId, String)>>,
}

impl Tracer {
    pub fn new(owner: ObjectRef, name: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
            items: RefCell::new(Vec::new()),
            seen: RefCell::new(AHashSet::new()),
        }
    }

    /// The object whose attribute is being computed.
    #[must_use]
    pub fn owner(&self) -> &ObjectRef {
        &self.owner
    }

    /// The attribute being computed.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record a read of `obj.name`.
    pub fn trace(&self, obj: &ObjectRef, name: &str) {
        let key = (obj.object_id(), name.to_owned());
        if self.seen.borrow_mut().insert(key) {
            self.items.borrow_mut().push(Dependency {
                object: ObjectRef::clone(obj),
                name: name.to_owned(),
            });
        }
    }

    /// Traced attribute read on an arbitrary value. Only object reads are
    /// recorded.
    pub fn load_attr(&self, obj: &Value, name: &str) -> Result<Value> {
        let value = obj.get_attr(name)?;
        if let Value::Object(o) = obj {
            self.trace(o, name);
        }
        Ok(value)
    }

    /// Traced function call. `getattr(obj, "name")` records `(obj, name)`.
    pub fn call_function(&self, func: &Value, args: &[Value]) -> Result<Value> {
        let result = func.call(args)?;
        let native = func.as_native();
        if let (Some(native), [Value::Object(obj), Value::Str(attr), ..]) = (native, args) {
            if native.name() == GETATTR {
                self.trace(obj, attr);
            }
        }
        Ok(result)
    }

    #[must_use]
    pub fn contains(&self, obj: &ObjectRef, name: &str) -> bool {
        self.seen
            .borrow()
            .contains(&(obj.object_id(), name.to_owned()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Snapshot of the dependency set in first-read order.
    #[must_use]
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.items.borrow().clone()
    }

    /// Consume the recorded dependency set.
    #[must_use]
    pub fn finalize(&self) -> Vec<Dependency> {
        self.seen.borrow_mut().clear();
        std::mem::take(&mut *self.items.borrow_mut())
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("owner", &describe(self.owner.as_ref()))
            .field("name", &self.name)
            .field("dependencies", &self.items.borrow())
            .finish()
    }
}
