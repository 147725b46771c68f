//! # Error types
//!
//! Error types for recognition (parsing/lexing), ATN construction and
//! decoding, and runtime protocol misuse.
//!
//! Recognition errors are reported to [`listener`]s and handed to the
//! active [`strategy`] for recovery; they only escape `next_token` /
//! `adaptive_predict` when the strategy chooses to bail. The optional
//! `diagnostics` feature derives [`miette::Diagnostic`] with stable codes
//! on the public enums.

pub mod listener;
pub mod strategy;

use std::sync::Arc;
use thiserror::Error;

use crate::atn::state::StateId;
use crate::config::AtnConfigSet;
use crate::interval::IntervalSet;
use crate::token::Token;

#[cfg(feature = "diagnostics")]
use miette::Diagnostic;

/// A failure during recognition.
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum RecognitionError {
    /// Prediction's reach set became empty: no alternative of the decision
    /// matches the input from `start_index`.
    #[error("no viable alternative at input '{}'", .offending.as_ref().map_or("<EOF>", |t| t.text.as_str()))]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(llstar::no_viable_alt)))]
    NoViableAlt {
        decision: usize,
        /// Input index at which the failed prediction began.
        start_index: usize,
        /// Index of the token prediction died on.
        offending_index: usize,
        offending: Option<Token>,
        /// The last non-empty configuration set before the reach died.
        dead_end: Option<Arc<AtnConfigSet>>,
    },

    /// The current token does not satisfy the expected set at a match.
    #[error("mismatched input '{}' expecting {expected}", offending.text)]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(llstar::input_mismatch)))]
    InputMismatch {
        offending: Token,
        expected: IntervalSet,
        state: StateId,
    },

    /// A semantic predicate gating the only viable alternative failed.
    #[error("rule {rule} failed predicate {pred}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(llstar::failed_predicate)))]
    FailedPredicate {
        rule: usize,
        pred: usize,
        offending: Option<Token>,
    },

    /// The lexer could not reach any accept state.
    #[error("token recognition error at input index {start_index}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(llstar::lexer_no_viable_alt)))]
    LexerNoViableAlt {
        start_index: usize,
        /// Text from the token start to the point the scan died.
        bad_text: compact_str::CompactString,
        dead_end: Option<Arc<AtnConfigSet>>,
    },

    /// Runtime protocol misuse.
    #[error(transparent)]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(llstar::illegal_state)))]
    IllegalState(#[from] IllegalStateError),
}

impl RecognitionError {
    /// The token the error is anchored to, when there is one.
    #[must_use]
    pub fn offending_token(&self) -> Option<&Token> {
        match self {
            Self::NoViableAlt { offending, .. } | Self::FailedPredicate { offending, .. } => {
                offending.as_ref()
            }
            Self::InputMismatch { offending, .. } => Some(offending),
            Self::LexerNoViableAlt { .. } | Self::IllegalState(_) => None,
        }
    }

    /// Whether recovery makes sense for this error (protocol misuse is
    /// not recoverable).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::IllegalState(_))
    }
}

/// Violation of a runtime protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum IllegalStateError {
    #[error("cannot modify a frozen configuration set")]
    FrozenConfigSet,
    #[error("cannot pop the empty lexer mode stack")]
    EmptyModeStack,
}

/// A malformed ATN, from the builder or the wire decoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum AtnError {
    #[error("rule stop state {state} has outgoing transitions")]
    RuleStopHasTransitions { state: StateId },

    #[error("state {state} references nonexistent state {target}")]
    InvalidStateRef { state: StateId, target: StateId },

    #[error("state {state} references nonexistent rule {rule}")]
    InvalidRuleRef { state: StateId, rule: usize },

    #[error("rule call from state {state} does not target the start state of rule {rule}")]
    RuleCallTargetMismatch { state: StateId, rule: usize },

    #[error("decision {decision} maps to non-decision state {state}")]
    NotADecisionState { decision: usize, state: StateId },

    #[error("mode start state {state} is not a tokens-start state")]
    BadModeStart { state: StateId },

    #[error("state {state} references nonexistent lexer action {action}")]
    InvalidActionRef { state: StateId, action: usize },

    #[error("bad magic number {found:#010x} in serialized ATN")]
    BadMagic { found: u32 },

    #[error("unsupported serialized ATN version {version}")]
    UnsupportedVersion { version: u32 },

    #[error("serialized ATN is truncated")]
    Truncated,

    #[error("unknown tag {tag} at word {at} in serialized ATN")]
    BadTag { at: usize, tag: u32 },
}
