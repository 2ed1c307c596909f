#![forbid(unsafe_code)]

//! Expression-binding runtime.
//!
//! Binds compiled expression bodies to attributes of live objects and
//! evaluates them in a layered dynamic scope:
//!
//! - [`DynamicScope`]: name resolution over reserved names, locals, owner
//!   attributes (walking the parent chain), module globals and builtins.
//! - [`Tracer`]: records the `(object, attribute)` pairs a traced read
//!   depended on.
//! - [`Inverter`]: turns a read-expression descriptor into one assignment.
//! - [`Handler`]: the four standard handlers (`=`, `::`, `<<`, `>>`).
//! - [`Operator`] / [`Binding`]: operator symbols and the handler pairs they
//!   install, including the two-way `:=`.
//! - [`ExpressionEngine`]: per-owner bindings, subscriptions and updates.
//! - [`Declarative`]: a concrete observable owner object.
//!
//! # Architecture
//!
//! Everything is single-threaded: shared state is `Rc<RefCell<..>>`, change
//! observers are held weakly and owned by RAII [`exprbind_core::Subscription`]
//! guards. Every evaluation builds its own scope, tracer and inverter, so
//! re-entrant evaluation (a handler reading an attribute whose own binding
//! is then evaluated) never shares mutable per-call state.

pub mod builtins;
pub mod config;
pub mod declarative;
pub mod engine;
pub mod funchelper;
pub mod handlers;
pub mod inverter;
pub mod operators;
pub mod scope;
pub mod subscription;
pub mod tracer;

pub use builtins::default_builtins;
pub use config::{EngineConfig, FailurePolicy};
pub use declarative::{Declarative, DeclarativeBuilder};
pub use engine::ExpressionEngine;
pub use funchelper::{CallArgs, ExprFunction, ModuleEnv, call_func};
pub use handlers::{Handler, HandlerFunc, HandlerKind, Invocation, Outcome};
pub use inverter::{InvertTarget, Inverter, TargetBase};
pub use operators::{Binding, Operator};
pub use scope::{DynamicScope, Nonlocals};
pub use subscription::SubscriptionSet;
pub use tracer::{Dependency, Tracer};

pub use exprbind_core::{
    AccessError, BindError, ChangeKind, ChangeRecord, Namespace, Object, ObjectId, ObjectRef,
    Result, ScopeKey, SharedNamespace, Subscription, Value,
};
