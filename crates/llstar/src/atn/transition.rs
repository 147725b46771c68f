//! ATN transitions.

use std::sync::Arc;

use crate::atn::state::StateId;
use crate::interval::IntervalSet;
use crate::token::EOF;

/// An edge of the ATN graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub target: StateId,
    pub label: TransitionLabel,
}

/// What a transition is labelled with.
///
/// Epsilon-class labels (everything except `Range`, `Set`, `NotSet` and
/// `Wildcard`) consume no input; they are traversed during closure, not
/// reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionLabel {
    Epsilon,
    /// Inclusive symbol range; a single symbol is `from == to`.
    Range { from: i32, to: i32 },
    /// Invocation of another rule. `target` is the rule's start state;
    /// control returns to `follow` afterwards.
    Rule {
        rule: usize,
        /// Precedence of the call site; 0 for calls from outside the rule.
        precedence: i32,
        follow: StateId,
    },
    /// Gated by a user predicate, evaluated (or collected) during closure.
    Predicate {
        rule: usize,
        pred: usize,
        ctx_dependent: bool,
    },
    /// A lexer action to run when the surrounding rule matches.
    Action {
        rule: usize,
        action: usize,
        ctx_dependent: bool,
    },
    Set(Arc<IntervalSet>),
    NotSet(Arc<IntervalSet>),
    Wildcard,
    /// Precedence predicate `{n >= current}?` on left-recursive loop alts.
    Precedence(i32),
}

impl Transition {
    #[must_use]
    pub const fn new(target: StateId, label: TransitionLabel) -> Self {
        Self { target, label }
    }

    /// Whether this transition consumes no input symbol.
    #[must_use]
    pub const fn is_epsilon(&self) -> bool {
        matches!(
            self.label,
            TransitionLabel::Epsilon
                | TransitionLabel::Rule { .. }
                | TransitionLabel::Predicate { .. }
                | TransitionLabel::Action { .. }
                | TransitionLabel::Precedence(_)
        )
    }

    /// Whether this transition matches `symbol` given the vocabulary
    /// bounds (needed to ground `NotSet` and `Wildcard`).
    #[must_use]
    pub fn matches(&self, symbol: i32, min_vocab: i32, max_vocab: i32) -> bool {
        match &self.label {
            TransitionLabel::Range { from, to } => symbol >= *from && symbol <= *to,
            TransitionLabel::Set(set) => set.contains(symbol),
            TransitionLabel::NotSet(set) => {
                symbol >= min_vocab && symbol <= max_vocab && !set.contains(symbol)
            }
            TransitionLabel::Wildcard => symbol >= min_vocab && symbol <= max_vocab,
            _ => false,
        }
    }

    /// The label as a symbol set, for diagnostics and FIRST computation.
    /// `None` for epsilon-class transitions.
    #[must_use]
    pub fn label_set(&self, min_vocab: i32, max_vocab: i32) -> Option<IntervalSet> {
        match &self.label {
            TransitionLabel::Range { from, to } => Some(IntervalSet::of_range(*from, *to)),
            TransitionLabel::Set(set) => Some(set.as_ref().clone()),
            TransitionLabel::NotSet(set) => Some(set.complement(min_vocab, max_vocab)),
            TransitionLabel::Wildcard => Some(IntervalSet::of_range(min_vocab, max_vocab)),
            _ => None,
        }
    }

    /// Whether EOF is matched; wildcard and negated sets never match EOF.
    #[must_use]
    pub fn matches_eof(&self) -> bool {
        match &self.label {
            TransitionLabel::Range { from, to } => *from <= EOF && EOF <= *to,
            TransitionLabel::Set(set) => set.contains(EOF),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_matches() {
        let t = Transition::new(1, TransitionLabel::Range { from: 3, to: 5 });
        assert!(t.matches(3, 1, 10));
        assert!(t.matches(5, 1, 10));
        assert!(!t.matches(6, 1, 10));
        assert!(!t.is_epsilon());
    }

    #[test]
    fn test_not_set_respects_vocabulary() {
        let t = Transition::new(1, TransitionLabel::NotSet(Arc::new(IntervalSet::of(4))));
        assert!(t.matches(5, 1, 10));
        assert!(!t.matches(4, 1, 10));
        assert!(!t.matches(EOF, 1, 10));
        assert!(!t.matches(11, 1, 10));
    }

    #[test]
    fn test_wildcard_excludes_eof() {
        let t = Transition::new(1, TransitionLabel::Wildcard);
        assert!(t.matches(7, 1, 10));
        assert!(!t.matches(EOF, 1, 10));
        assert!(!t.matches_eof());
    }

    #[test]
    fn test_epsilon_class() {
        for label in [
            TransitionLabel::Epsilon,
            TransitionLabel::Rule { rule: 0, precedence: 0, follow: 9 },
            TransitionLabel::Predicate { rule: 0, pred: 0, ctx_dependent: false },
            TransitionLabel::Action { rule: 0, action: 0, ctx_dependent: false },
            TransitionLabel::Precedence(2),
        ] {
            assert!(Transition::new(1, label).is_epsilon());
        }
    }

    #[test]
    fn test_eof_range_matches_eof() {
        let t = Transition::new(1, TransitionLabel::Range { from: EOF, to: EOF });
        assert!(t.matches_eof());
        assert!(t.matches(EOF, 0, 10));
    }
}
