#![forbid(unsafe_code)]

//! Dynamic values flowing through expression bodies.
//!
//! Containers are shared (`Rc<RefCell<..>>`), so an item assignment made
//! through one handle is visible through every clone. Equality on objects,
//! native functions and opaque handles is identity.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::error::{AccessError, BindError, Result};
use crate::object::ObjectRef;

/// Shared, mutable list storage.
pub type ListRef = Rc<RefCell<Vec<Value>>>;

/// Shared, mutable string-keyed map storage.
pub type MapRef = Rc<RefCell<AHashMap<String, Value>>>;

/// A value produced or consumed by an expression body.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(ListRef),
    Map(MapRef),
    Object(ObjectRef),
    Native(NativeFn),
    Opaque(Opaque),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Map(Rc::new(RefCell::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    pub fn object(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }

    /// Short type name used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "dict",
            Self::Object(obj) => obj.type_name(),
            Self::Native(_) => "builtin_function",
            Self::Opaque(o) => o.type_name,
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_native(&self) -> Option<&NativeFn> {
        match self {
            Self::Native(f) => Some(f),
            _ => None,
        }
    }

    /// Truthiness in the usual dynamic-language sense.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(l) => !l.borrow().is_empty(),
            Self::Map(m) => !m.borrow().is_empty(),
            Self::Object(_) | Self::Native(_) | Self::Opaque(_) => true,
        }
    }

    /// Attribute read. Only objects carry attributes.
    pub fn get_attr(&self, name: &str) -> Result<Value> {
        match self {
            Self::Object(obj) => obj
                .get_attr(name)?
                .ok_or_else(|| AccessError::no_such_attribute(obj.type_name(), name).into()),
            other => Err(AccessError::no_such_attribute(other.type_name(), name).into()),
        }
    }

    /// Attribute write. Only objects carry attributes.
    pub fn set_attr(&self, name: &str, value: Value) -> Result<()> {
        match self {
            Self::Object(obj) => obj.set_attr(name, value),
            other => Err(AccessError::no_such_attribute(other.type_name(), name).into()),
        }
    }

    /// Subscript read: integer index into lists and strings, string key into maps.
    pub fn get_item(&self, key: &Value) -> Result<Value> {
        match (self, key) {
            (Self::List(list), Self::Int(i)) => {
                let list = list.borrow();
                let idx = normalize_index(*i, list.len())
                    .ok_or_else(|| bad_key(self, key))?;
                Ok(list[idx].clone())
            }
            (Self::Str(s), Self::Int(i)) => {
                let count = s.chars().count();
                let idx = normalize_index(*i, count).ok_or_else(|| bad_key(self, key))?;
                s.chars()
                    .nth(idx)
                    .map(|c| Value::str(c.to_string()))
                    .ok_or_else(|| bad_key(self, key))
            }
            (Self::Map(map), Self::Str(k)) => map
                .borrow()
                .get(k.as_ref())
                .cloned()
                .ok_or_else(|| bad_key(self, key)),
            (Self::List(_) | Self::Str(_) | Self::Map(_), _) => Err(bad_key(self, key)),
            _ => Err(AccessError::NotSubscriptable {
                type_name: self.type_name().to_owned(),
            }
            .into()),
        }
    }

    /// Subscript write. Lists accept an in-range index; maps accept any string key.
    pub fn set_item(&self, key: &Value, value: Value) -> Result<()> {
        match (self, key) {
            (Self::List(list), Self::Int(i)) => {
                let mut list = list.borrow_mut();
                let len = list.len();
                let idx = normalize_index(*i, len).ok_or_else(|| bad_key(self, key))?;
                list[idx] = value;
                Ok(())
            }
            (Self::Map(map), Self::Str(k)) => {
                map.borrow_mut().insert(k.to_string(), value);
                Ok(())
            }
            (Self::List(_) | Self::Map(_), _) => Err(bad_key(self, key)),
            _ => Err(AccessError::NotSubscriptable {
                type_name: self.type_name().to_owned(),
            }
            .into()),
        }
    }

    /// Invoke a native function value.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        match self {
            Self::Native(f) => f.call(args),
            other => Err(BindError::evaluation(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }
}

fn normalize_index(i: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let idx = if i < 0 { i + len } else { i };
    if (0..len).contains(&idx) {
        usize::try_from(idx).ok()
    } else {
        None
    }
}

fn bad_key(container: &Value, key: &Value) -> BindError {
    AccessError::BadKey {
        type_name: container.type_name().to_owned(),
        key: format!("{key:?}"),
    }
    .into()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Map(a), Self::Map(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Object(a), Self::Object(b)) => a.object_id() == b.object_id(),
            (Self::Native(a), Self::Native(b)) => a.ptr_eq(b),
            (Self::Opaque(a), Self::Opaque(b)) => Rc::ptr_eq(&a.inner, &b.inner),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::List(l) => f.debug_list().entries(l.borrow().iter()).finish(),
            Self::Map(m) => f.debug_map().entries(m.borrow().iter()).finish(),
            Self::Object(obj) => write!(f, "<{} #{}>", obj.type_name(), obj.object_id()),
            Self::Native(n) => write!(f, "<built-in function {}>", n.name()),
            Self::Opaque(o) => write!(f, "<{}>", o.type_name),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }
}

// ---------------------------------------------------------------------------
// NativeFn
// ---------------------------------------------------------------------------

type NativeBody = dyn Fn(&[Value]) -> Result<Value>;

/// A named host function callable from expression bodies (builtins).
#[derive(Clone)]
pub struct NativeFn {
    name: Rc<str>,
    func: Rc<NativeBody>,
}

impl NativeFn {
    pub fn new(name: &str, func: impl Fn(&[Value]) -> Result<Value> + 'static) -> Self {
        Self {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.func)(args)
    }

    /// Identity comparison: two handles to the same function body.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn").field("name", &self.name).finish()
    }
}

// ---------------------------------------------------------------------------
// Opaque
// ---------------------------------------------------------------------------

/// A runtime handle that expression bodies may pass around but not inspect,
/// such as the active tracer.
#[derive(Clone)]
pub struct Opaque {
    type_name: &'static str,
    inner: Rc<dyn Any>,
}

impl Opaque {
    pub fn new<T: Any>(type_name: &'static str, inner: Rc<T>) -> Self {
        Self { type_name, inner }
    }

    /// Recover the concrete handle.
    #[must_use]
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.inner).downcast::<T>().ok()
    }
}
