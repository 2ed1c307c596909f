#![forbid(unsafe_code)]

//! Binding operators and the handler pairs they install.
//!
//! | Operator | Symbol | Read handler | Write handler |
//! |----------|--------|--------------|---------------|
//! | [`Operator::Simple`] | `=` | standard | none |
//! | [`Operator::Notify`] | `::` | none | standard |
//! | [`Operator::Subscribe`] | `<<` | traced | none |
//! | [`Operator::Update`] | `>>` | none | inverted |
//! | [`Operator::Delegate`] | `:=` | traced | inverted |
//!
//! A delegate binding hands the same body to both handlers; the body tells
//! the two invocations apart by its [`CallArgs`](crate::CallArgs).

use std::fmt;

use exprbind_core::ScopeKey;

use crate::funchelper::ExprFunction;
use crate::handlers::{Handler, HandlerKind};

/// A binding operator as written in a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Simple,
    Notify,
    Subscribe,
    Update,
    Delegate,
}

impl Operator {
    pub const ALL: [Self; 5] = [
        Self::Simple,
        Self::Notify,
        Self::Subscribe,
        Self::Update,
        Self::Delegate,
    ];

    /// Parse an operator symbol.
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(Self::Simple),
            "::" => Some(Self::Notify),
            "<<" => Some(Self::Subscribe),
            ">>" => Some(Self::Update),
            ":=" => Some(Self::Delegate),
            _ => None,
        }
    }

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Simple => "=",
            Self::Notify => "::",
            Self::Subscribe => "<<",
            Self::Update => ">>",
            Self::Delegate => ":=",
        }
    }

    #[must_use]
    pub const fn read_kind(self) -> Option<HandlerKind> {
        match self {
            Self::Simple => Some(HandlerKind::StandardRead),
            Self::Subscribe | Self::Delegate => Some(HandlerKind::TracedRead),
            Self::Notify | Self::Update => None,
        }
    }

    #[must_use]
    pub const fn write_kind(self) -> Option<HandlerKind> {
        match self {
            Self::Notify => Some(HandlerKind::StandardWrite),
            Self::Update | Self::Delegate => Some(HandlerKind::InvertedWrite),
            Self::Simple | Self::Subscribe => None,
        }
    }

    /// Build the handler pair for `func` bound under `scope_key`.
    #[must_use]
    pub fn bind(self, func: ExprFunction, scope_key: ScopeKey) -> Binding {
        Binding {
            operator: self,
            read: self
                .read_kind()
                .map(|kind| Handler::new(kind, func.clone(), scope_key)),
            write: self
                .write_kind()
                .map(|kind| Handler::new(kind, func, scope_key)),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The read/write handler pair one operator installs on an attribute.
#[derive(Debug, Clone)]
pub struct Binding {
    operator: Operator,
    read: Option<Handler>,
    write: Option<Handler>,
}

impl Binding {
    #[must_use]
    pub fn operator(&self) -> Operator {
        self.operator
    }

    #[must_use]
    pub fn read(&self) -> Option<&Handler> {
        self.read.as_ref()
    }

    #[must_use]
    pub fn write(&self) -> Option<&Handler> {
        self.write.as_ref()
    }

    /// Whether reads are traced and should keep the attribute subscribed.
    #[must_use]
    pub fn is_traced(&self) -> bool {
        self.read
            .as_ref()
            .is_some_and(|h| h.kind() == HandlerKind::TracedRead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funchelper::ModuleEnv;
    use exprbind_core::Value;

    fn body() -> ExprFunction {
        ExprFunction::new("body", ModuleEnv::default(), |_, _| Ok(Value::None))
    }

    #[test]
    fn symbols_round_trip() {
        for op in Operator::ALL {
            assert_eq!(Operator::from_symbol(op.symbol()), Some(op));
        }
        assert_eq!(Operator::from_symbol("<<="), None);
        assert_eq!(Operator::Delegate.to_string(), ":=");
    }

    #[test]
    fn handler_table() {
        let kinds = |op: Operator| {
            let b = op.bind(body(), ScopeKey::fresh());
            (b.read().map(Handler::kind), b.write().map(Handler::kind))
        };
        assert_eq!(kinds(Operator::Simple), (Some(HandlerKind::StandardRead), None));
        assert_eq!(kinds(Operator::Notify), (None, Some(HandlerKind::StandardWrite)));
        assert_eq!(kinds(Operator::Subscribe), (Some(HandlerKind::TracedRead), None));
        assert_eq!(kinds(Operator::Update), (None, Some(HandlerKind::InvertedWrite)));
        assert_eq!(
            kinds(Operator::Delegate),
            (Some(HandlerKind::TracedRead), Some(HandlerKind::InvertedWrite))
        );
    }

    #[test]
    fn traced_operators() {
        let traced: Vec<_> = Operator::ALL
            .into_iter()
            .filter(|op| op.bind(body(), ScopeKey::fresh()).is_traced())
            .collect();
        assert_eq!(traced, vec![Operator::Subscribe, Operator::Delegate]);
    }
}
