#![forbid(unsafe_code)]

//! Owner objects: the live objects expressions are bound to.
//!
//! An owner exposes ordinary named-attribute get/set, a Local Storage
//! mapping from [`ScopeKey`] to the per-binding local variables, an optional
//! parent for dynamic lookup, and optional attribute observation.
//!
//! The runtime never owns an object; it borrows an [`ObjectRef`] for the
//! duration of one evaluation.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;

use crate::error::Result;
use crate::observe::{Observer, Subscription};
use crate::value::Value;

/// Shared handle to a live owner object.
pub type ObjectRef = Rc<dyn Object>;

/// Non-owning handle to a live owner object.
pub type WeakObjectRef = Weak<dyn Object>;

/// A name → value layer.
pub type Namespace = AHashMap<String, Value>;

/// A locals layer shared between an owner's Local Storage and the scopes
/// evaluating against it.
pub type SharedNamespace = Rc<RefCell<Namespace>>;

/// Process-unique object identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

impl ObjectId {
    /// Allocate a fresh identity.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque key selecting one binding's local-variable slot in an owner's
/// Local Storage. Produced by the compiler, one per binding site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeKey(u64);

static NEXT_SCOPE_KEY: AtomicU64 = AtomicU64::new(1);

impl ScopeKey {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Allocate a key distinct from every other `fresh()` key.
    #[must_use]
    pub fn fresh() -> Self {
        Self(NEXT_SCOPE_KEY.fetch_add(1, Ordering::Relaxed) | (1 << 63))
    }
}

/// A live object that expressions can be bound to.
///
/// `get_attr` returns `Ok(None)` when the object has no such attribute; an
/// `Err` is a failure while producing the value (for example, a nested
/// binding that failed to evaluate).
pub trait Object {
    fn object_id(&self) -> ObjectId;

    fn type_name(&self) -> &str;

    /// Whether `name` is an attribute of this object. Never evaluates.
    fn has_attr(&self, name: &str) -> bool;

    fn get_attr(&self, name: &str) -> Result<Option<Value>>;

    fn set_attr(&self, name: &str, value: Value) -> Result<()>;

    /// Local Storage lookup. `None` means no expression-local state exists
    /// yet for this key.
    fn local_storage(&self, _key: &ScopeKey) -> Option<SharedNamespace> {
        None
    }

    /// The next object in the dynamic lookup chain.
    fn parent(&self) -> Option<ObjectRef> {
        None
    }

    /// Register an observer for changes to `name`. Objects whose attributes
    /// are not observable return `None`.
    fn observe(&self, _name: &str, _observer: Observer) -> Option<Subscription> {
        None
    }
}

/// Human-readable `Type#id` label for logs and errors.
#[must_use]
pub fn describe(obj: &dyn Object) -> String {
    format!("{}#{}", obj.type_name(), obj.object_id())
}
