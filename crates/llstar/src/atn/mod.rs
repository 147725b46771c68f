//! # The Augmented Transition Network
//!
//! The immutable graph a compiled grammar is represented as: states with
//! kind tags, tagged transitions, per-rule start/stop tables, the decision
//! index, and (for lexers) the action table and mode start states.
//!
//! An [`Atn`] is built once — by [`AtnBuilder`](builder::AtnBuilder) or
//! [`deserialize`](codec::deserialize) — wrapped in an `Arc`, and shared
//! read-only by every parser/lexer instance for the grammar.

pub mod builder;
pub mod codec;
pub mod state;
pub mod transition;

use hashbrown::HashSet;
use smallvec::SmallVec;
use std::sync::Arc;

use crate::bitset::BitSet;
use crate::interval::IntervalSet;
use crate::lexer::action::LexerAction;
use crate::parser::context::RuleContext;
use crate::token::{EOF, EPSILON, MAX_CHAR, MIN_CHAR};

pub use state::{AtnState, AtnStateKind, StateId, INVALID_STATE};
pub use transition::{Transition, TransitionLabel};

/// Whether the ATN was compiled from a lexer or a parser grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarKind {
    Lexer,
    Parser,
}

/// A rule-return edge reconstructed from a call site: when closure reaches
/// a rule stop with no context information, it continues at every `follow`
/// state of every call site of that rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowLink {
    pub follow: StateId,
    /// Set to the called rule's index when the call site is an outermost
    /// (precedence 0) call of a left-recursive rule. Closure uses this to
    /// suppress the precedence filter for configs that escaped through it.
    pub outermost_precedence_return: Option<usize>,
}

/// The compiled grammar graph. Immutable after construction.
#[derive(Debug)]
pub struct Atn {
    pub kind: GrammarKind,
    pub states: Vec<AtnState>,
    /// Decision index -> decision state id.
    pub decision_to_state: Vec<StateId>,
    pub rule_to_start: Vec<StateId>,
    pub rule_to_stop: Vec<StateId>,
    /// Lexer only: token type each rule emits ([`crate::token::INVALID_TYPE`]
    /// for fragment-like rules).
    pub rule_to_token_type: Vec<i32>,
    /// Lexer only: action table referenced by `Action` transitions.
    pub lexer_actions: Vec<LexerAction>,
    /// Lexer only: mode index -> `TokensStart` state id.
    pub mode_to_start: Vec<StateId>,
    pub max_token_type: i32,
    /// Per rule: return edges derived from that rule's call sites.
    pub follow_links: Vec<SmallVec<[FollowLink; 2]>>,
}

impl Atn {
    /// Check the graph invariants and compute the follow links, turning a
    /// raw graph into a shared, trusted ATN. Used by the builder and the
    /// wire decoder.
    pub(crate) fn validated(mut raw: Self) -> Result<Arc<Self>, crate::error::AtnError> {
        use crate::error::AtnError;
        let n = raw.states.len();
        let num_rules = raw.rule_to_start.len();
        for (rule, (&start, &stop)) in raw
            .rule_to_start
            .iter()
            .zip(raw.rule_to_stop.iter())
            .enumerate()
        {
            if start >= n || !matches!(raw.states[start].kind, AtnStateKind::RuleStart { .. }) {
                return Err(AtnError::InvalidRuleRef { state: start, rule });
            }
            if stop >= n || !matches!(raw.states[stop].kind, AtnStateKind::RuleStop) {
                return Err(AtnError::InvalidRuleRef { state: stop, rule });
            }
        }
        for state in &raw.states {
            if state.is_rule_stop() && !state.transitions.is_empty() {
                return Err(AtnError::RuleStopHasTransitions { state: state.id });
            }
            for t in &state.transitions {
                if t.target >= n {
                    return Err(AtnError::InvalidStateRef { state: state.id, target: t.target });
                }
                if let TransitionLabel::Rule { rule, follow, .. } = &t.label {
                    if *rule >= num_rules {
                        return Err(AtnError::InvalidRuleRef { state: state.id, rule: *rule });
                    }
                    if t.target != raw.rule_to_start[*rule] {
                        return Err(AtnError::RuleCallTargetMismatch {
                            state: state.id,
                            rule: *rule,
                        });
                    }
                    if *follow >= n {
                        return Err(AtnError::InvalidStateRef {
                            state: state.id,
                            target: *follow,
                        });
                    }
                }
                if let TransitionLabel::Action { action, .. } = &t.label
                    && raw.kind == GrammarKind::Lexer
                    && *action >= raw.lexer_actions.len()
                {
                    return Err(AtnError::InvalidActionRef { state: state.id, action: *action });
                }
            }
        }
        for (decision, &sid) in raw.decision_to_state.iter().enumerate() {
            if sid >= n || !raw.states[sid].kind.is_decision() {
                return Err(AtnError::NotADecisionState { decision, state: sid });
            }
        }
        for &sid in &raw.mode_to_start {
            if sid >= n || !matches!(raw.states[sid].kind, AtnStateKind::TokensStart) {
                return Err(AtnError::BadModeStart { state: sid });
            }
        }

        let mut follow_links: Vec<SmallVec<[FollowLink; 2]>> = vec![SmallVec::new(); num_rules];
        for state in &raw.states {
            for t in &state.transitions {
                if let TransitionLabel::Rule { rule, precedence, follow } = &t.label {
                    let left_recursive = matches!(
                        raw.states[raw.rule_to_start[*rule]].kind,
                        AtnStateKind::RuleStart { is_left_recursive: true, .. }
                    );
                    let outermost = (left_recursive && *precedence == 0).then_some(*rule);
                    follow_links[*rule].push(FollowLink {
                        follow: *follow,
                        outermost_precedence_return: outermost,
                    });
                }
            }
        }
        raw.follow_links = follow_links;
        Ok(Arc::new(raw))
    }

    #[must_use]
    pub fn state(&self, id: StateId) -> &AtnState {
        &self.states[id]
    }

    #[must_use]
    pub fn decision_state(&self, decision: usize) -> &AtnState {
        &self.states[self.decision_to_state[decision]]
    }

    #[must_use]
    pub fn num_decisions(&self) -> usize {
        self.decision_to_state.len()
    }

    #[must_use]
    pub fn num_rules(&self) -> usize {
        self.rule_to_start.len()
    }

    /// Vocabulary bounds used when matching transition labels.
    #[must_use]
    pub const fn vocab_bounds(&self) -> (i32, i32) {
        match self.kind {
            GrammarKind::Lexer => (MIN_CHAR, MAX_CHAR),
            GrammarKind::Parser => (0, self.max_token_type),
        }
    }

    /// FIRST set of `state`, ignoring any calling context. Contains
    /// [`EPSILON`] when the walk can fall off the end of the state's rule.
    ///
    /// Predicates are seen through (assumed true).
    #[must_use]
    pub fn next_tokens(&self, state: StateId) -> IntervalSet {
        let mut look = IntervalSet::new();
        let mut busy = HashSet::new();
        let mut called = BitSet::new();
        self.look(state, &mut Vec::new(), &mut look, &mut busy, &mut called);
        look
    }

    fn look(
        &self,
        s: StateId,
        stack: &mut Vec<StateId>,
        look: &mut IntervalSet,
        busy: &mut HashSet<(StateId, Vec<StateId>)>,
        called: &mut BitSet,
    ) {
        if !busy.insert((s, stack.clone())) {
            return;
        }
        let state = self.state(s);
        if state.is_rule_stop() {
            let Some(ret) = stack.pop() else {
                look.add(EPSILON);
                return;
            };
            let was_called = called.get(state.rule);
            called.clear(state.rule);
            self.look(ret, stack, look, busy, called);
            if was_called {
                called.set(state.rule);
            }
            stack.push(ret);
            return;
        }
        let (min_vocab, max_vocab) = self.vocab_bounds();
        for t in &state.transitions {
            match &t.label {
                TransitionLabel::Rule { rule, follow, .. } => {
                    if called.get(*rule) {
                        continue;
                    }
                    called.set(*rule);
                    stack.push(*follow);
                    self.look(t.target, stack, look, busy, called);
                    stack.pop();
                    called.clear(*rule);
                }
                TransitionLabel::Epsilon
                | TransitionLabel::Action { .. }
                | TransitionLabel::Predicate { .. }
                | TransitionLabel::Precedence(_) => {
                    self.look(t.target, stack, look, busy, called);
                }
                _ => {
                    if let Some(set) = t.label_set(min_vocab, max_vocab) {
                        look.add_set(&set);
                    }
                }
            }
        }
    }

    /// Tokens that can follow `state` given the live rule-invocation
    /// chain. Falls back to [`EOF`] when every enclosing rule can end.
    #[must_use]
    pub fn expected_tokens(&self, state: StateId, ctx: Option<&Arc<RuleContext>>) -> IntervalSet {
        let mut following = self.next_tokens(state);
        if !following.contains(EPSILON) {
            return following;
        }
        let mut expected = following.clone();
        expected.remove(EPSILON);
        let mut ctx = ctx.cloned();
        while let Some(c) = ctx {
            if c.invoking_state == INVALID_STATE || !following.contains(EPSILON) {
                break;
            }
            let invoking = self.state(c.invoking_state);
            let Some(TransitionLabel::Rule { follow, .. }) =
                invoking.transitions.first().map(|t| &t.label)
            else {
                break;
            };
            following = self.next_tokens(*follow);
            expected.add_set(&following);
            expected.remove(EPSILON);
            ctx = c.parent.clone();
        }
        if following.contains(EPSILON) {
            expected.add(EOF);
        }
        expected
    }
}

#[cfg(test)]
mod tests {
    use super::builder::AtnBuilder;
    use super::*;

    // S: 'a' 'b' ;  with token types a=1, b=2
    fn linear_atn() -> Arc<Atn> {
        let mut b = AtnBuilder::parser(1, 2);
        let (start, stop) = b.rule_states(0);
        let s1 = b.add_basic(0);
        let s2 = b.add_basic(0);
        let s3 = b.add_basic(0);
        b.epsilon(start, s1);
        b.atom(s1, s2, 1);
        b.atom(s2, s3, 2);
        b.epsilon(s3, stop);
        b.build().unwrap()
    }

    #[test]
    fn test_next_tokens_linear() {
        let atn = linear_atn();
        let start = atn.rule_to_start[0];
        let first = atn.next_tokens(start);
        assert!(first.contains(1));
        assert!(!first.contains(2));
        assert!(!first.contains(EPSILON));
    }

    #[test]
    fn test_next_tokens_at_rule_end() {
        let atn = linear_atn();
        let stop = atn.rule_to_stop[0];
        let follow = atn.next_tokens(stop);
        assert!(follow.contains(EPSILON));
    }

    #[test]
    fn test_expected_tokens_eof_at_end() {
        let atn = linear_atn();
        let stop = atn.rule_to_stop[0];
        let expected = atn.expected_tokens(stop, None);
        assert!(expected.contains(EOF));
    }
}
