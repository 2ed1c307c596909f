#![forbid(unsafe_code)]

//! Per-owner registry of attribute bindings.
//!
//! An [`ExpressionEngine`] maps attribute names to the [`Binding`] an
//! operator installed and drives the handlers:
//!
//! - [`ExpressionEngine::read`] evaluates the read handler. A traced read
//!   replaces the attribute's subscriptions with one per dependency its
//!   tracer recorded.
//! - [`ExpressionEngine::write`] dispatches the write handler for a change.
//! - [`ExpressionEngine::update`] re-evaluates a read and assigns the result
//!   back to the owner. Subscription observers call it when a dependency
//!   changes.
//!
//! # Invariants
//!
//! 1. An attribute's subscriptions always reflect its latest traced
//!    evaluation; old subscriptions are dropped on replacement.
//! 2. An attribute never subscribes to itself.
//! 3. While `update` assigns an attribute, the write handler of that same
//!    attribute is suppressed, so a `:=` binding does not write back the
//!    value it just read.
//! 4. No `RefCell` borrow is held while a handler runs.
//! 5. Handlers run under this engine's `max_depth`; the previous limit is
//!    restored when they return.
//!
//! # Failure Modes
//!
//! | Failure | Policy `Propagate` | Policy `LogAndContinue` |
//! |---------|--------------------|-------------------------|
//! | read fails | `Err` | `error!` log, `Ok(None)` |
//! | write fails | `Err` | `error!` log, `Ok(())` |
//! | update from a subscription fails | `error!` log | `error!` log |

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::{AHashMap, AHashSet};
use exprbind_core::{ChangeRecord, ObjectRef, Observer, Result, Value, describe};

use crate::config::{DepthLimit, EngineConfig, FailurePolicy};
use crate::handlers::HandlerKind;
use crate::operators::Binding;
use crate::subscription::SubscriptionSet;
use crate::tracer::Tracer;

/// Bindings and subscriptions for one owner object.
pub struct ExpressionEngine {
    config: EngineConfig,
    weak_self: Weak<ExpressionEngine>,
    bindings: RefCell<AHashMap<String, Rc<Binding>>>,
    subscriptions: RefCell<AHashMap<String, SubscriptionSet>>,
    guards: RefCell<AHashSet<String>>,
}

impl ExpressionEngine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            config,
            weak_self: weak_self.clone(),
            bindings: RefCell::new(AHashMap::new()),
            subscriptions: RefCell::new(AHashMap::new()),
            guards: RefCell::new(AHashSet::new()),
        })
    }

    /// An engine using the thread's global config.
    #[must_use]
    pub fn with_global_config() -> Rc<Self> {
        Self::new(EngineConfig::global())
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Install `binding` on `name`, replacing any earlier binding and
    /// dropping its subscriptions.
    pub fn add_binding(&self, name: &str, binding: Binding) {
        let previous = self
            .bindings
            .borrow_mut()
            .insert(name.to_owned(), Rc::new(binding));
        if previous.is_some() {
            let stale = self.subscriptions.borrow_mut().remove(name);
            drop(stale);
        }
    }

    #[must_use]
    pub fn has_binding(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
    }

    /// Whether `name` has a read handler.
    #[must_use]
    pub fn has_reader(&self, name: &str) -> bool {
        self.binding(name).is_some_and(|b| b.read().is_some())
    }

    #[must_use]
    pub fn binding(&self, name: &str) -> Option<Rc<Binding>> {
        self.bindings.borrow().get(name).cloned()
    }

    /// Bound attribute names, sorted.
    #[must_use]
    pub fn binding_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.borrow().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of live subscriptions held for `name`.
    #[must_use]
    pub fn subscription_count(&self, name: &str) -> usize {
        self.subscriptions
            .borrow()
            .get(name)
            .map_or(0, SubscriptionSet::len)
    }

    /// Evaluate the read handler of `name`. `Ok(None)` when `name` has no
    /// read handler.
    pub fn read(&self, owner: &ObjectRef, name: &str) -> Result<Option<Value>> {
        let Some(binding) = self.binding(name) else {
            return Ok(None);
        };
        let Some(handler) = binding.read() else {
            return Ok(None);
        };
        let _limit = DepthLimit::enter(self.config.max_depth);
        let result = if handler.kind() == HandlerKind::TracedRead {
            handler.read_traced(owner, name).map(|(value, tracer)| {
                self.resubscribe(owner, name, &tracer);
                Some(value)
            })
        } else {
            handler.read(owner, name).map(Some)
        };
        self.settle(owner, name, result)
    }

    /// Dispatch the write handler of `name` for `change`, unless `name` is
    /// being assigned by [`ExpressionEngine::update`].
    pub fn write(&self, owner: &ObjectRef, name: &str, change: &Rc<ChangeRecord>) -> Result<()> {
        if self.guards.borrow().contains(name) {
            tracing::trace!(
                owner = %describe(owner.as_ref()),
                attribute = name,
                "write suppressed during update"
            );
            return Ok(());
        }
        let Some(binding) = self.binding(name) else {
            return Ok(());
        };
        let Some(handler) = binding.write() else {
            return Ok(());
        };
        let _limit = DepthLimit::enter(self.config.max_depth);
        let result = handler.write(owner, name, change);
        self.settle(owner, name, result)
    }

    /// Re-evaluate `name` and assign the result to the owner attribute.
    pub fn update(&self, owner: &ObjectRef, name: &str) -> Result<()> {
        let Some(value) = self.read(owner, name)? else {
            return Ok(());
        };
        tracing::debug!(
            owner = %describe(owner.as_ref()),
            attribute = name,
            ?value,
            "binding updated"
        );
        let _guard = UpdateGuard::enter(&self.guards, name);
        owner.set_attr(name, value)
    }

    /// Drop every subscription this engine holds.
    pub fn clear_subscriptions(&self) {
        let stale = std::mem::take(&mut *self.subscriptions.borrow_mut());
        drop(stale);
    }

    fn settle<T: Default>(&self, owner: &ObjectRef, name: &str, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => match self.config.failure_policy {
                FailurePolicy::Propagate => Err(err),
                FailurePolicy::LogAndContinue => {
                    tracing::error!(
                        object = %describe(owner.as_ref()),
                        attribute = name,
                        error = %err,
                        "binding evaluation failed"
                    );
                    Ok(T::default())
                }
            },
        }
    }

    fn resubscribe(&self, owner: &ObjectRef, name: &str, tracer: &Tracer) {
        let mut set = SubscriptionSet::new();
        if self.config.trace_subscriptions {
            let owner_id = owner.object_id();
            for dep in tracer.finalize() {
                if dep.object.object_id() == owner_id && dep.name == name {
                    continue;
                }
                if let Some(sub) = dep.object.observe(&dep.name, self.observer(owner, name)) {
                    set.hold(sub);
                }
            }
            tracing::debug!(
                owner = %describe(owner.as_ref()),
                attribute = name,
                subscriptions = set.len(),
                "subscriptions installed"
            );
        }
        let stale = self.subscriptions.borrow_mut().insert(name.to_owned(), set);
        drop(stale);
    }

    fn observer(&self, owner: &ObjectRef, name: &str) -> Observer {
        let engine = self.weak_self.clone();
        let target = Rc::downgrade(owner);
        let name: Rc<str> = Rc::from(name);
        Rc::new(move |change: &Rc<ChangeRecord>| {
            let (Some(engine), Some(owner)) = (engine.upgrade(), target.upgrade()) else {
                return;
            };
            tracing::debug!(
                owner = %describe(owner.as_ref()),
                attribute = %name,
                source = %describe(change.owner().as_ref()),
                changed = change.name(),
                "dependency changed"
            );
            if let Err(err) = engine.update(&owner, &name) {
                tracing::error!(
                    object = %describe(owner.as_ref()),
                    attribute = %name,
                    error = %err,
                    "binding update failed"
                );
            }
        })
    }
}

impl fmt::Debug for ExpressionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionEngine")
            .field("config", &self.config)
            .field("bindings", &self.binding_names())
            .finish()
    }
}

/// Marks an attribute as being assigned by `update`. Only the guard that
/// inserted the name removes it, so nested updates of the same attribute
/// keep the outer guard in place.
struct UpdateGuard<'a> {
    guards: &'a RefCell<AHashSet<String>>,
    name: Option<String>,
}

impl<'a> UpdateGuard<'a> {
    fn enter(guards: &'a RefCell<AHashSet<String>>, name: &str) -> Self {
        let inserted = guards.borrow_mut().insert(name.to_owned());
        Self {
            guards,
            name: inserted.then(|| name.to_owned()),
        }
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        if let Some(name) = self.name.take() {
            self.guards.borrow_mut().remove(&name);
        }
    }
}
