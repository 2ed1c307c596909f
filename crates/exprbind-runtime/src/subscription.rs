#![forbid(unsafe_code)]

//! Lifecycle of the change subscriptions a traced binding holds.
//!
//! A [`SubscriptionSet`] owns the [`Subscription`] guards installed for one
//! traced attribute. Re-evaluating the attribute builds a new set from the
//! new dependency set and drops the old one, which unsubscribes everything it
//! held.
//!
//! # Invariants
//!
//! 1. Subscriptions are released in reverse registration order.
//! 2. After a set is dropped or cleared, none of its observers fire again.
//! 3. `len()` counts exactly the guards held.

use std::fmt;

use exprbind_core::Subscription;

/// Subscriptions held on behalf of one binding.
#[derive(Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `sub` alive until the set is dropped or cleared.
    pub fn hold(&mut self, sub: Subscription) {
        self.subscriptions.push(sub);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Attribute names observed, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.subscriptions.iter().map(Subscription::name).collect()
    }

    /// Release every subscription now; the set stays usable.
    pub fn clear(&mut self) {
        while self.subscriptions.pop().is_some() {}
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for SubscriptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSet")
            .field("names", &self.names())
            .finish()
    }
}
