#![forbid(unsafe_code)]

//! Inversion of read-expressions into a single assignment.
//!
//! The compiler describes the shape of an invertible expression with an
//! [`InvertTarget`]. The [`Inverter`] resolves the target's base through the
//! scope and performs exactly one attribute-set, item-set or name binding.
//!
//! | Expression | Descriptor | Assignment |
//! |------------|------------|------------|
//! | `foo` | [`InvertTarget::Name`] | `set_name("foo", v)` |
//! | `foo.bar.x` | [`InvertTarget::Attribute`] | `foo.bar.x = v` |
//! | `foo[k]` | [`InvertTarget::Item`] | `foo[k] = v` |
//! | `getattr(foo, "x")` | [`InvertTarget::Call`] | `foo.x = v` |
//! | anything else | [`InvertTarget::Unsupported`] | InversionError |
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | No inverse | shape unsupported, or a call to anything but `getattr` | `Inversion` |
//! | Unresolved base | base root or an attribute hop does not resolve | `Inversion` |
//! | Refused mutation | missing, read-only or reserved target; not subscriptable | `Inversion` |
//! | Downstream failure | the assignment triggered a failing binding | propagated unchanged |

use std::fmt;

use exprbind_core::{BindError, Result, Value};

use crate::builtins::GETATTR;
use crate::scope::{DynamicScope, is_reserved};

/// The base of an attribute or item target: a root name resolved through the
/// scope, then zero or more attribute hops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetBase {
    pub root: String,
    pub hops: Vec<String>,
}

impl TargetBase {
    pub fn name(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            hops: Vec::new(),
        }
    }

    #[must_use]
    pub fn hop(mut self, attr: impl Into<String>) -> Self {
        self.hops.push(attr.into());
        self
    }
}

impl fmt::Display for TargetBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for hop in &self.hops {
            write!(f, ".{hop}")?;
        }
        Ok(())
    }
}

/// Structural description of an expression the inverter may assign through.
#[derive(Debug, Clone)]
pub enum InvertTarget {
    Name { name: String },
    Attribute { base: TargetBase, attr: String },
    Item { base: TargetBase, key: Value },
    /// A call `func(args...)`. Invertible only for `getattr(obj, "attr")`.
    Call { func: String, args: Vec<Value> },
    Unsupported { shape: String },
}

impl InvertTarget {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name { name: name.into() }
    }

    pub fn attribute(base: TargetBase, attr: impl Into<String>) -> Self {
        Self::Attribute {
            base,
            attr: attr.into(),
        }
    }

    pub fn item(base: TargetBase, key: impl Into<Value>) -> Self {
        Self::Item {
            base,
            key: key.into(),
        }
    }

    pub fn call(func: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Call {
            func: func.into(),
            args,
        }
    }

    pub fn unsupported(shape: impl Into<String>) -> Self {
        Self::Unsupported {
            shape: shape.into(),
        }
    }
}

/// Performs the assignment an [`InvertTarget`] implies, within one scope.
#[derive(Clone, Copy)]
pub struct Inverter<'s> {
    scope: &'s DynamicScope,
}

impl<'s> Inverter<'s> {
    #[must_use]
    pub fn new(scope: &'s DynamicScope) -> Self {
        Self { scope }
    }

    #[must_use]
    pub fn scope(&self) -> &'s DynamicScope {
        self.scope
    }

    /// Assign `value` through `target`.
    pub fn invert(&self, target: &InvertTarget, value: Value) -> Result<()> {
        let result = self.assign(target, value);
        if let Err(err) = &result {
            tracing::warn!(descriptor = ?target, error = %err, "inversion failed");
        }
        result
    }

    fn assign(&self, target: &InvertTarget, value: Value) -> Result<()> {
        match target {
            InvertTarget::Name { name } => {
                if is_reserved(name) {
                    return Err(BindError::inversion(format!(
                        "cannot assign to reserved name '{name}'"
                    )));
                }
                self.scope.set_name(name, value).map_err(refused)
            }
            InvertTarget::Attribute { base, attr } => {
                let obj = self.resolve(base)?;
                set_attr(&obj, attr, value)
            }
            InvertTarget::Item { base, key } => {
                let obj = self.resolve(base)?;
                obj.set_item(key, value).map_err(refused)
            }
            InvertTarget::Call { func, args } => self.invert_call(func, args, value),
            InvertTarget::Unsupported { shape } => Err(BindError::inversion(format!(
                "no inverse for expression '{shape}'"
            ))),
        }
    }

    fn invert_call(&self, func: &str, args: &[Value], value: Value) -> Result<()> {
        let callee = self.scope.get_name(func).map_err(unresolved)?;
        let is_getattr = callee.as_native().is_some_and(|f| f.name() == GETATTR);
        if !is_getattr {
            return Err(BindError::inversion(format!(
                "no inverse for call to '{func}'"
            )));
        }
        match args {
            [obj, Value::Str(attr)] => set_attr(obj, attr, value),
            _ => Err(BindError::inversion(
                "getattr target must be (object, attribute name)",
            )),
        }
    }

    fn resolve(&self, base: &TargetBase) -> Result<Value> {
        let mut current = self.scope.get_name(&base.root).map_err(unresolved)?;
        for hop in &base.hops {
            current = current.get_attr(hop).map_err(|err| match err {
                BindError::Access(_) => BindError::inversion(format!(
                    "'{}' has no attribute '{hop}' while resolving '{base}'",
                    current.type_name()
                )),
                other => other,
            })?;
        }
        Ok(current)
    }
}

impl fmt::Debug for Inverter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inverter")
            .field("scope", self.scope)
            .finish()
    }
}

fn set_attr(obj: &Value, attr: &str, value: Value) -> Result<()> {
    obj.set_attr(attr, value).map_err(refused)
}

fn refused(err: BindError) -> BindError {
    match err {
        BindError::Access(access) => BindError::inversion(access.to_string()),
        other => other,
    }
}

fn unresolved(err: BindError) -> BindError {
    match err {
        BindError::NameResolution { name } => {
            BindError::inversion(format!("base name '{name}' does not resolve"))
        }
        other => other,
    }
}
