//! Literals: a bool plus a polarity

use std::fmt;
use std::sync::Arc;

use super::boolean::Bool;

/// A bool occurrence inside a clause
///
/// Negation is a polarity flip; the underlying bool is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    bool: Arc<Bool>,
    negated: bool,
}

impl Literal {
    pub fn new(bool: Bool) -> Self {
        Self::from_shared(Arc::new(bool), false)
    }

    pub fn negated(bool: Bool) -> Self {
        Self::from_shared(Arc::new(bool), true)
    }

    pub fn from_shared(bool: Arc<Bool>, negated: bool) -> Self {
        Self { bool, negated }
    }

    pub fn bool(&self) -> &Arc<Bool> {
        &self.bool
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn negate(&self) -> Self {
        Self {
            bool: self.bool.clone(),
            negated: !self.negated,
        }
    }

    /// Same underlying predicate, whatever the polarity
    pub fn shares_bool(&self, other: &Literal) -> bool {
        self.bool == other.bool
    }

    /// Same polarity, whatever the predicate
    pub fn shares_negation(&self, other: &Literal) -> bool {
        self.negated == other.negated
    }

    /// `other` is this literal with the opposite polarity
    pub fn contradicts(&self, other: &Literal) -> bool {
        self.shares_bool(other) && !self.shares_negation(other)
    }

    pub fn is_immutable(&self) -> bool {
        self.bool.is_immutable()
    }

    /// Truth value of a constant literal
    pub fn constant(&self) -> Option<bool> {
        self.bool.constant().map(|value| value != self.negated)
    }

    /// Apply the polarity to an evaluated bool
    pub fn apply(&self, value: bool) -> bool {
        value != self.negated
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!({})", self.bool)
        } else {
            write!(f, "{}", self.bool)
        }
    }
}
