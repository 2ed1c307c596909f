#![forbid(unsafe_code)]

//! Core types for the exprbind expression-binding runtime.
//!
//! This crate provides:
//! - [`Value`] for the dynamic values expression bodies produce and consume
//! - [`Object`] for the live owner objects expressions are bound to
//! - [`ChangeRecord`] for the mutations delivered to write-type handlers
//! - [`Observers`] / [`Subscription`] for per-attribute change observation
//! - [`BindError`] for the error taxonomy shared by every layer

pub mod change;
pub mod error;
pub mod object;
pub mod observe;
pub mod value;

pub use change::{ChangeKind, ChangeRecord};
pub use error::{AccessError, BindError, Result};
pub use object::{
    Namespace, Object, ObjectId, ObjectRef, ScopeKey, SharedNamespace, WeakObjectRef, describe,
};
pub use observe::{Observer, Observers, Subscription};
pub use value::{ListRef, MapRef, NativeFn, Opaque, Value};
