#![forbid(unsafe_code)]

//! Invocation harness for compiled expression bodies.
//!
//! An [`ExprFunction`] is the compiler's output for one binding site: a body
//! closure plus the module environment (globals and builtins) it was declared
//! in. [`call_func`] runs the body with a [`DynamicScope`] as its only
//! name-resolution context, so every name the body touches resolves through
//! the scope's layers instead of ordinary lexical scoping.
//!
//! # Invariants
//!
//! 1. The module environment is captured once and never mutated.
//! 2. Each call gets its own [`CallArgs`]; nothing is shared between calls.
//! 3. Nesting depth is bounded per thread; exceeding the bound fails with
//!    [`BindError::RecursionLimit`] instead of overflowing the stack.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use exprbind_core::{BindError, Namespace, Result, Value, describe};

use crate::builtins::default_builtins;
use crate::config;
use crate::inverter::Inverter;
use crate::scope::DynamicScope;
use crate::tracer::Tracer;

/// Signature of a compiled expression body.
pub type BodyFn = dyn Fn(&DynamicScope, &CallArgs<'_>) -> Result<Value>;

/// The globals and builtins layers an expression body was declared against.
#[derive(Clone)]
pub struct ModuleEnv {
    globals: Rc<Namespace>,
    builtins: Rc<Namespace>,
}

impl ModuleEnv {
    pub fn new(globals: Namespace, builtins: Rc<Namespace>) -> Self {
        Self {
            globals: Rc::new(globals),
            builtins,
        }
    }

    /// Module globals over the default builtin layer.
    pub fn with_globals(globals: Namespace) -> Self {
        Self::new(globals, default_builtins())
    }

    #[must_use]
    pub fn globals(&self) -> &Namespace {
        &self.globals
    }

    #[must_use]
    pub fn builtins(&self) -> &Namespace {
        &self.builtins
    }
}

impl Default for ModuleEnv {
    fn default() -> Self {
        Self::with_globals(Namespace::new())
    }
}

impl fmt::Debug for ModuleEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEnv")
            .field("globals", &self.globals.len())
            .field("builtins", &self.builtins.len())
            .finish()
    }
}

/// A compiled expression body closed over its module environment.
#[derive(Clone)]
pub struct ExprFunction {
    name: Rc<str>,
    env: ModuleEnv,
    body: Rc<BodyFn>,
}

impl ExprFunction {
    pub fn new(
        name: &str,
        env: ModuleEnv,
        body: impl Fn(&DynamicScope, &CallArgs<'_>) -> Result<Value> + 'static,
    ) -> Self {
        Self {
            name: Rc::from(name),
            env,
            body: Rc::new(body),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn env(&self) -> &ModuleEnv {
        &self.env
    }
}

impl fmt::Debug for ExprFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExprFunction")
            .field("name", &self.name)
            .field("env", &self.env)
            .finish()
    }
}

/// Extra positional arguments handed to an expression body.
pub enum CallArgs<'s> {
    /// Standard read and write: no extra arguments.
    Empty,
    /// Traced read: the tracer recording this evaluation.
    Traced(Rc<Tracer>),
    /// Inverted write: the inverter and the value to write.
    Inverted {
        inverter: Inverter<'s>,
        value: Value,
    },
}

impl CallArgs<'_> {
    /// Number of positional arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Traced(_) => 1,
            Self::Inverted { .. } => 2,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    #[must_use]
    pub fn tracer(&self) -> Option<&Rc<Tracer>> {
        match self {
            Self::Traced(tracer) => Some(tracer),
            _ => None,
        }
    }

    #[must_use]
    pub fn inverter(&self) -> Option<&Inverter<'_>> {
        match self {
            Self::Inverted { inverter, .. } => Some(inverter),
            _ => None,
        }
    }

    /// The value an inverted write should store.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Inverted { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Inverter and value together, or an evaluation error when the body
    /// was not invoked by the inverted-write handler.
    pub fn inversion(&self) -> Result<(&Inverter<'_>, &Value)> {
        match self {
            Self::Inverted { inverter, value } => Ok((inverter, value)),
            _ => Err(BindError::evaluation(
                "expression body expects an inverter argument",
            )),
        }
    }
}

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    fn enter(func: &ExprFunction, scope: &DynamicScope) -> Result<Self> {
        let limit = config::max_depth();
        let depth = DEPTH.with(|d| {
            let next = d.get() + 1;
            d.set(next);
            next
        });
        let guard = Self;
        if depth > limit {
            return Err(BindError::RecursionLimit {
                object: describe(scope.owner().as_ref()),
                name: func.name().to_owned(),
                depth: limit,
            });
        }
        Ok(guard)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Run `func`'s body against `scope` with the given extra arguments.
pub fn call_func(
    func: &ExprFunction,
    args: &CallArgs<'_>,
    scope: &DynamicScope,
) -> Result<Value> {
    let _span = tracing::trace_span!(
        "call_func",
        func = %func.name(),
        owner = %describe(scope.owner().as_ref()),
        nargs = args.len()
    )
    .entered();
    let _depth = DepthGuard::enter(func, scope)?;
    (func.body)(scope, args)
}
