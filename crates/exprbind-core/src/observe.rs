#![forbid(unsafe_code)]

//! Per-attribute change observation.
//!
//! [`Observers`] keeps, for each attribute name, a list of weakly-held
//! callbacks. The strong handle lives in the [`Subscription`] returned to the
//! subscriber, so dropping the subscription is enough to unsubscribe.
//!
//! # Invariants
//!
//! 1. Observers of one attribute are notified in registration order.
//! 2. A dropped [`Subscription`] is never notified again.
//! 3. Dead entries are pruned lazily during notification.
//! 4. Notification runs on a snapshot, so callbacks may subscribe,
//!    unsubscribe or trigger nested notifications without invalidating the
//!    iteration.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::change::ChangeRecord;

/// Callback invoked with the change record of an observed attribute.
pub type Observer = Rc<dyn Fn(&Rc<ChangeRecord>)>;

/// RAII guard for an attribute observer. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the observer"]
pub struct Subscription {
    name: Rc<str>,
    _callback: Observer,
}

impl Subscription {
    /// The attribute this subscription observes.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .finish()
    }
}

/// Observer registry for one object.
#[derive(Default)]
pub struct Observers {
    slots: RefCell<AHashMap<String, Vec<Weak<dyn Fn(&Rc<ChangeRecord>)>>>>,
}

impl Observers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, name: &str, observer: Observer) -> Subscription {
        self.slots
            .borrow_mut()
            .entry(name.to_owned())
            .or_default()
            .push(Rc::downgrade(&observer));
        Subscription {
            name: Rc::from(name),
            _callback: observer,
        }
    }

    /// Notify the live observers of `change.name()`. Returns how many ran.
    pub fn notify(&self, change: &Rc<ChangeRecord>) -> usize {
        let live: Vec<Observer> = {
            let mut slots = self.slots.borrow_mut();
            let Some(list) = slots.get_mut(change.name()) else {
                return 0;
            };
            list.retain(|w| w.strong_count() > 0);
            list.iter().filter_map(Weak::upgrade).collect()
        };
        tracing::trace!(
            attribute = change.name(),
            kind = change.kind().as_str(),
            observers = live.len(),
            "notifying observers"
        );
        for observer in &live {
            observer(change);
        }
        live.len()
    }

    /// Number of live observers for `name`.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.slots
            .borrow()
            .get(name)
            .map_or(0, |list| list.iter().filter(|w| w.strong_count() > 0).count())
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("attributes", &self.slots.borrow().len())
            .finish()
    }
}
