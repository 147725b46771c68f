//! ATN states.

use smallvec::SmallVec;

use crate::atn::transition::Transition;

/// Index of a state within [`crate::atn::Atn::states`]. Ids are dense in
/// `[0, N)`.
pub type StateId = usize;

/// Sentinel for "no state".
pub const INVALID_STATE: StateId = usize::MAX;

/// The kind of an ATN state, with the kind-specific companion links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtnStateKind {
    Basic,
    RuleStart {
        stop_state: StateId,
        is_left_recursive: bool,
    },
    /// Return point of a rule. Never has outgoing transitions; callers
    /// return through the prediction context (or the ATN's follow links
    /// when no context is available).
    RuleStop,
    /// Start of a `(...|...)` block; a decision when it has >1 alternative.
    BlockStart {
        end_state: StateId,
    },
    BlockEnd {
        start_state: StateId,
    },
    PlusBlockStart {
        end_state: StateId,
        loopback: StateId,
    },
    /// The loop-back decision of a `(...)+` block.
    PlusLoopBack,
    StarBlockStart {
        end_state: StateId,
    },
    /// Decision at the entry of a `(...)*` loop. For a left-recursive rule
    /// this is the precedence decision.
    StarLoopEntry {
        loopback: StateId,
        is_precedence_decision: bool,
    },
    StarLoopBack,
    /// Start state of a lexer mode; the decision over the mode's rules.
    TokensStart,
    LoopEnd {
        loopback: StateId,
    },
}

impl AtnStateKind {
    /// Whether states of this kind may carry a decision index.
    #[must_use]
    pub const fn is_decision(&self) -> bool {
        matches!(
            self,
            Self::BlockStart { .. }
                | Self::PlusBlockStart { .. }
                | Self::StarBlockStart { .. }
                | Self::PlusLoopBack
                | Self::StarLoopEntry { .. }
                | Self::TokensStart
        )
    }
}

/// A node of the ATN graph.
#[derive(Debug, Clone)]
pub struct AtnState {
    pub id: StateId,
    /// Index of the rule this state belongs to.
    pub rule: usize,
    pub kind: AtnStateKind,
    /// Decision index, for decision states registered with the ATN.
    pub decision: Option<usize>,
    /// Lexer non-greedy subrule marker on decision states.
    pub non_greedy: bool,
    pub transitions: SmallVec<[Transition; 2]>,
}

impl AtnState {
    #[must_use]
    pub fn new(id: StateId, rule: usize, kind: AtnStateKind) -> Self {
        Self {
            id,
            rule,
            kind,
            decision: None,
            non_greedy: false,
            transitions: SmallVec::new(),
        }
    }

    #[must_use]
    pub const fn is_rule_stop(&self) -> bool {
        matches!(self.kind, AtnStateKind::RuleStop)
    }

    /// True when every outgoing transition is an epsilon-class transition
    /// (consumes no input symbol).
    #[must_use]
    pub fn only_has_epsilon_transitions(&self) -> bool {
        !self.transitions.is_empty() && self.transitions.iter().all(Transition::is_epsilon)
    }
}
