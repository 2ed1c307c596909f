#![forbid(unsafe_code)]

//! The four standard expression handlers.
//!
//! | Handler | Operator | Scope extras | Body arguments | Result |
//! |---------|----------|--------------|----------------|--------|
//! | [`Handler::StandardRead`] | `=` | none | none | the body's value |
//! | [`Handler::StandardWrite`] | `::` | `change` | none | discarded |
//! | [`Handler::TracedRead`] | `<<` | `_[tracer]` | tracer | value + tracer |
//! | [`Handler::InvertedWrite`] | `>>` | none | inverter, new value | discarded |
//!
//! Handlers are immutable and stateless. Every call builds a fresh
//! [`DynamicScope`], and a fresh [`Tracer`] or [`Inverter`] where needed,
//! so re-entrant calls on the same owner and scope key never share
//! mutable engine state.

use std::fmt;
use std::rc::Rc;

use exprbind_core::{
    BindError, ChangeRecord, ObjectRef, Result, ScopeKey, SharedNamespace, Value,
};

use crate::funchelper::{CallArgs, ExprFunction, call_func};
use crate::inverter::Inverter;
use crate::scope::DynamicScope;
use crate::tracer::Tracer;

/// `(expression function, scope key)`, shared by every handler variant.
#[derive(Debug, Clone)]
pub struct HandlerFunc {
    func: ExprFunction,
    scope_key: ScopeKey,
}

impl HandlerFunc {
    #[must_use]
    pub fn new(func: ExprFunction, scope_key: ScopeKey) -> Self {
        Self { func, scope_key }
    }

    #[must_use]
    pub fn func(&self) -> &ExprFunction {
        &self.func
    }

    #[must_use]
    pub fn scope_key(&self) -> ScopeKey {
        self.scope_key
    }

    /// The owner's locals for this binding, if Local Storage has any.
    fn get_locals(&self, owner: &ObjectRef) -> Option<SharedNamespace> {
        owner.local_storage(&self.scope_key)
    }

    fn scope(&self, owner: &ObjectRef) -> DynamicScope {
        DynamicScope::new(
            ObjectRef::clone(owner),
            self.get_locals(owner),
            self.func.env().clone(),
        )
    }
}

/// Which binding operator a handler realizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    StandardRead,
    StandardWrite,
    TracedRead,
    InvertedWrite,
}

impl HandlerKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StandardRead => "standard read",
            Self::StandardWrite => "standard write",
            Self::TracedRead => "traced read",
            Self::InvertedWrite => "inverted write",
        }
    }

    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::StandardRead | Self::TracedRead)
    }
}

/// One call into a handler.
#[derive(Clone, Copy)]
pub enum Invocation<'a> {
    Read {
        owner: &'a ObjectRef,
        name: &'a str,
    },
    Write {
        owner: &'a ObjectRef,
        name: &'a str,
        change: &'a Rc<ChangeRecord>,
    },
}

impl Invocation<'_> {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
        }
    }
}

/// What a handler call produced.
#[derive(Debug)]
pub enum Outcome {
    Value(Value),
    /// A traced read's value plus the tracer holding its dependency set.
    Traced { value: Value, tracer: Rc<Tracer> },
    Written,
}

impl Outcome {
    /// The read value, if this was a read.
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) | Self::Traced { value, .. } => Some(value),
            Self::Written => None,
        }
    }
}

/// An expression handler attached to one attribute binding.
#[derive(Debug, Clone)]
pub enum Handler {
    StandardRead(HandlerFunc),
    StandardWrite(HandlerFunc),
    TracedRead(HandlerFunc),
    InvertedWrite(HandlerFunc),
}

impl Handler {
    #[must_use]
    pub fn new(kind: HandlerKind, func: ExprFunction, scope_key: ScopeKey) -> Self {
        let hf = HandlerFunc::new(func, scope_key);
        match kind {
            HandlerKind::StandardRead => Self::StandardRead(hf),
            HandlerKind::StandardWrite => Self::StandardWrite(hf),
            HandlerKind::TracedRead => Self::TracedRead(hf),
            HandlerKind::InvertedWrite => Self::InvertedWrite(hf),
        }
    }

    #[must_use]
    pub fn kind(&self) -> HandlerKind {
        match self {
            Self::StandardRead(_) => HandlerKind::StandardRead,
            Self::StandardWrite(_) => HandlerKind::StandardWrite,
            Self::TracedRead(_) => HandlerKind::TracedRead,
            Self::InvertedWrite(_) => HandlerKind::InvertedWrite,
        }
    }

    #[must_use]
    pub fn func(&self) -> &HandlerFunc {
        match self {
            Self::StandardRead(hf)
            | Self::StandardWrite(hf)
            | Self::TracedRead(hf)
            | Self::InvertedWrite(hf) => hf,
        }
    }

    /// Dispatch one invocation. A read-type handler only accepts reads and a
    /// write-type handler only accepts writes.
    pub fn invoke(&self, invocation: Invocation<'_>) -> Result<Outcome> {
        match (self, invocation) {
            (Self::StandardRead(hf), Invocation::Read { owner, .. }) => {
                let scope = hf.scope(owner);
                call_func(&hf.func, &CallArgs::Empty, &scope).map(Outcome::Value)
            }
            (Self::TracedRead(hf), Invocation::Read { owner, name }) => {
                let tracer = Rc::new(Tracer::new(ObjectRef::clone(owner), name));
                let scope = hf.scope(owner).with_tracer(Rc::clone(&tracer));
                let args = CallArgs::Traced(Rc::clone(&tracer));
                let value = call_func(&hf.func, &args, &scope)?;
                Ok(Outcome::Traced { value, tracer })
            }
            (Self::StandardWrite(hf), Invocation::Write { owner, change, .. }) => {
                let scope = hf.scope(owner).with_change(Rc::clone(change));
                call_func(&hf.func, &CallArgs::Empty, &scope)?;
                Ok(Outcome::Written)
            }
            (Self::InvertedWrite(hf), Invocation::Write { owner, change, .. }) => {
                let scope = hf.scope(owner);
                let args = CallArgs::Inverted {
                    inverter: Inverter::new(&scope),
                    value: change.new_value().clone(),
                };
                call_func(&hf.func, &args, &scope)?;
                Ok(Outcome::Written)
            }
            (handler, invocation) => Err(BindError::OperatorMismatch {
                handler: handler.kind().as_str(),
                invocation: invocation.as_str(),
            }),
        }
    }

    /// `handler(owner, name) -> value` for read-type handlers. A traced
    /// read's dependency set is dropped; use [`Handler::read_traced`] to
    /// keep it.
    pub fn read(&self, owner: &ObjectRef, name: &str) -> Result<Value> {
        match self.invoke(Invocation::Read { owner, name })? {
            Outcome::Value(value) | Outcome::Traced { value, .. } => Ok(value),
            Outcome::Written => Err(mismatch(self.kind(), "read")),
        }
    }

    /// Traced read returning the value and the tracer with its dependencies.
    pub fn read_traced(&self, owner: &ObjectRef, name: &str) -> Result<(Value, Rc<Tracer>)> {
        if !matches!(self, Self::TracedRead(_)) {
            return Err(mismatch(self.kind(), "traced read"));
        }
        match self.invoke(Invocation::Read { owner, name })? {
            Outcome::Traced { value, tracer } => Ok((value, tracer)),
            _ => Err(mismatch(self.kind(), "traced read")),
        }
    }

    /// `handler(owner, name, change)` for write-type handlers.
    pub fn write(&self, owner: &ObjectRef, name: &str, change: &Rc<ChangeRecord>) -> Result<()> {
        self.invoke(Invocation::Write {
            owner,
            name,
            change,
        })
        .map(drop)
    }
}

fn mismatch(kind: HandlerKind, invocation: &'static str) -> BindError {
    BindError::OperatorMismatch {
        handler: kind.as_str(),
        invocation,
    }
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} handler for {}", self.kind().as_str(), self.func().func().name())
    }
}
