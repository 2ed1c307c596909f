#![forbid(unsafe_code)]

//! Engine configuration.
//!
//! [`EngineConfig`] is a plain value with builder-style setters. A
//! thread-local global copy, initialized from the environment on first use,
//! supplies defaults for engines created without an explicit config. While an
//! engine runs a handler it installs its own `max_depth` as the active
//! nesting limit; outside any engine the global limit applies.
//!
//! | Variable | Values | Default |
//! |----------|--------|---------|
//! | `EXPRBIND_FAILURE_POLICY` | `propagate`, `log` | `propagate` |
//! | `EXPRBIND_MAX_DEPTH` | positive integer | `64` |

use std::cell::{Cell, RefCell};
use std::env;

/// Default limit on nested expression evaluations.
pub const DEFAULT_MAX_DEPTH: usize = 64;

thread_local! {
    static GLOBAL_CONFIG: RefCell<EngineConfig> = RefCell::new(EngineConfig::from_env());
    static ACTIVE_DEPTH: Cell<Option<usize>> = const { Cell::new(None) };
}

/// What the expression engine does with a failed evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Return the error to the caller.
    #[default]
    Propagate,
    /// Log the error against the object and attribute, then continue
    /// as if the binding produced no value.
    LogAndContinue,
}

impl FailurePolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "propagate" | "raise" => Some(Self::Propagate),
            "log" | "log-and-continue" | "continue" => Some(Self::LogAndContinue),
            _ => None,
        }
    }
}

/// Runtime knobs for expression engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub failure_policy: FailurePolicy,
    /// Nesting limit for expression bodies run by this engine.
    pub max_depth: usize,
    /// Whether traced reads install change subscriptions.
    pub trace_subscriptions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Propagate,
            max_depth: DEFAULT_MAX_DEPTH,
            trace_subscriptions: true,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `EXPRBIND_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let policy = env::var("EXPRBIND_FAILURE_POLICY").ok();
        let depth = env::var("EXPRBIND_MAX_DEPTH").ok();
        Self::from_vars(policy.as_deref(), depth.as_deref())
    }

    fn from_vars(policy: Option<&str>, depth: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            failure_policy: policy
                .and_then(FailurePolicy::parse)
                .unwrap_or(defaults.failure_policy),
            max_depth: depth
                .and_then(|d| d.trim().parse::<usize>().ok())
                .filter(|&d| d > 0)
                .unwrap_or(defaults.max_depth),
            ..defaults
        }
    }

    #[must_use]
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    #[must_use]
    pub fn trace_subscriptions(mut self, enabled: bool) -> Self {
        self.trace_subscriptions = enabled;
        self
    }

    /// The thread-local global config.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL_CONFIG.with(|c| c.borrow().clone())
    }

    /// Replace the thread-local global config.
    pub fn set_global(config: Self) {
        GLOBAL_CONFIG.with(|c| *c.borrow_mut() = config);
    }
}

/// Nesting limit currently in force on this thread: the innermost engine's
/// limit, or the global one.
#[must_use]
pub(crate) fn max_depth() -> usize {
    ACTIVE_DEPTH
        .with(Cell::get)
        .unwrap_or_else(|| GLOBAL_CONFIG.with(|c| c.borrow().max_depth))
}

/// Makes `limit` the active nesting limit until dropped, then restores the
/// previous one.
pub(crate) struct DepthLimit {
    previous: Option<usize>,
}

impl DepthLimit {
    pub(crate) fn enter(limit: usize) -> Self {
        Self {
            previous: ACTIVE_DEPTH.with(|d| d.replace(Some(limit))),
        }
    }
}

impl Drop for DepthLimit {
    fn drop(&mut self) {
        ACTIVE_DEPTH.with(|d| d.set(self.previous));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_environment() {
        let config = EngineConfig::from_vars(None, None);
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert!(config.trace_subscriptions);
    }

    #[test]
    fn parses_policy_and_depth() {
        let config = EngineConfig::from_vars(Some("LOG"), Some(" 12 "));
        assert_eq!(config.failure_policy, FailurePolicy::LogAndContinue);
        assert_eq!(config.max_depth, 12);
    }

    #[test]
    fn rejects_garbage() {
        let config = EngineConfig::from_vars(Some("sometimes"), Some("0"));
        assert_eq!(config.failure_policy, FailurePolicy::Propagate);
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn builder_clamps_depth() {
        let config = EngineConfig::new().max_depth(0).trace_subscriptions(false);
        assert_eq!(config.max_depth, 1);
        assert!(!config.trace_subscriptions);
    }

    #[test]
    fn global_is_thread_local() {
        let custom = EngineConfig::new().max_depth(7);
        EngineConfig::set_global(custom.clone());
        assert_eq!(EngineConfig::global(), custom);
        assert_eq!(max_depth(), 7);
        let other = std::thread::spawn(|| EngineConfig::global().max_depth)
            .join()
            .unwrap();
        assert_ne!(other, 7);
        EngineConfig::set_global(EngineConfig::default());
    }

    #[test]
    fn active_limit_nests_and_restores() {
        let global = max_depth();
        {
            let _outer = DepthLimit::enter(9);
            assert_eq!(max_depth(), 9);
            {
                let _inner = DepthLimit::enter(3);
                assert_eq!(max_depth(), 3);
            }
            assert_eq!(max_depth(), 9);
        }
        assert_eq!(max_depth(), global);
    }
}
