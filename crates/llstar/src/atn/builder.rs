//! Programmatic ATN construction.
//!
//! The builder is how embedders (and this crate's tests) define grammars
//! without a serialized ATN: allocate states, wire transitions, register
//! decisions, then [`AtnBuilder::build`] validates the graph invariants
//! and produces the shared immutable [`Atn`].

use std::sync::Arc;

use crate::atn::state::{AtnState, AtnStateKind, StateId};
use crate::atn::transition::{Transition, TransitionLabel};
use crate::atn::{Atn, GrammarKind};
use crate::error::AtnError;
use crate::interval::IntervalSet;
use crate::lexer::action::LexerAction;
use crate::token::INVALID_TYPE;

/// States of a `( ... )*` loop allocated by [`AtnBuilder::add_star_loop`].
#[derive(Debug, Clone, Copy)]
pub struct StarLoop {
    pub entry: StateId,
    pub block_start: StateId,
    pub block_end: StateId,
    pub loop_back: StateId,
    pub loop_end: StateId,
}

/// Builds an [`Atn`] one state and transition at a time.
///
/// Rule start/stop states are allocated up front: rule `i` owns states
/// `2*i` (start) and `2*i + 1` (stop).
pub struct AtnBuilder {
    kind: GrammarKind,
    states: Vec<AtnState>,
    decision_to_state: Vec<StateId>,
    rule_to_start: Vec<StateId>,
    rule_to_stop: Vec<StateId>,
    rule_to_token_type: Vec<i32>,
    lexer_actions: Vec<LexerAction>,
    mode_to_start: Vec<StateId>,
    max_token_type: i32,
}

impl AtnBuilder {
    #[must_use]
    pub fn parser(num_rules: usize, max_token_type: i32) -> Self {
        Self::new(GrammarKind::Parser, num_rules, max_token_type)
    }

    #[must_use]
    pub fn lexer(num_rules: usize, max_token_type: i32) -> Self {
        Self::new(GrammarKind::Lexer, num_rules, max_token_type)
    }

    fn new(kind: GrammarKind, num_rules: usize, max_token_type: i32) -> Self {
        let mut b = Self {
            kind,
            states: Vec::with_capacity(num_rules * 2),
            decision_to_state: Vec::new(),
            rule_to_start: Vec::with_capacity(num_rules),
            rule_to_stop: Vec::with_capacity(num_rules),
            rule_to_token_type: vec![INVALID_TYPE; num_rules],
            lexer_actions: Vec::new(),
            mode_to_start: Vec::new(),
            max_token_type,
        };
        for rule in 0..num_rules {
            let start = b.alloc(
                rule,
                AtnStateKind::RuleStart {
                    stop_state: 0, // patched right below
                    is_left_recursive: false,
                },
            );
            let stop = b.alloc(rule, AtnStateKind::RuleStop);
            b.states[start].kind = AtnStateKind::RuleStart {
                stop_state: stop,
                is_left_recursive: false,
            };
            b.rule_to_start.push(start);
            b.rule_to_stop.push(stop);
        }
        b
    }

    fn alloc(&mut self, rule: usize, kind: AtnStateKind) -> StateId {
        let id = self.states.len();
        self.states.push(AtnState::new(id, rule, kind));
        id
    }

    /// The pre-allocated (start, stop) states of `rule`.
    #[must_use]
    pub fn rule_states(&self, rule: usize) -> (StateId, StateId) {
        (self.rule_to_start[rule], self.rule_to_stop[rule])
    }

    pub fn mark_left_recursive(&mut self, rule: usize) {
        let start = self.rule_to_start[rule];
        if let AtnStateKind::RuleStart { stop_state, .. } = self.states[start].kind {
            self.states[start].kind = AtnStateKind::RuleStart {
                stop_state,
                is_left_recursive: true,
            };
        }
    }

    pub fn add_basic(&mut self, rule: usize) -> StateId {
        self.alloc(rule, AtnStateKind::Basic)
    }

    /// Allocate a cross-linked `( ... )` block start/end pair.
    pub fn add_block(&mut self, rule: usize) -> (StateId, StateId) {
        let start = self.alloc(rule, AtnStateKind::BlockStart { end_state: 0 });
        let end = self.alloc(rule, AtnStateKind::BlockEnd { start_state: start });
        self.states[start].kind = AtnStateKind::BlockStart { end_state: end };
        (start, end)
    }

    /// Allocate the state cluster of a `( ... )*` loop, pre-wired:
    /// entry -> block start, entry -> loop end, block end -> loop back,
    /// loop back -> entry. The caller adds the block's alternatives
    /// between `block_start` and `block_end`.
    pub fn add_star_loop(&mut self, rule: usize, is_precedence_decision: bool) -> StarLoop {
        let entry = self.alloc(
            rule,
            AtnStateKind::StarLoopEntry { loopback: 0, is_precedence_decision },
        );
        let block_start = self.alloc(rule, AtnStateKind::StarBlockStart { end_state: 0 });
        let block_end = self.alloc(rule, AtnStateKind::BlockEnd { start_state: block_start });
        let loop_back = self.alloc(rule, AtnStateKind::StarLoopBack);
        let loop_end = self.alloc(rule, AtnStateKind::LoopEnd { loopback: loop_back });
        self.states[entry].kind =
            AtnStateKind::StarLoopEntry { loopback: loop_back, is_precedence_decision };
        self.states[block_start].kind = AtnStateKind::StarBlockStart { end_state: block_end };
        self.epsilon(entry, block_start);
        self.epsilon(entry, loop_end);
        self.epsilon(block_end, loop_back);
        self.epsilon(loop_back, entry);
        StarLoop { entry, block_start, block_end, loop_back, loop_end }
    }

    pub fn add_state(&mut self, rule: usize, kind: AtnStateKind) -> StateId {
        self.alloc(rule, kind)
    }

    /// Register `state` as the decision with the next free index.
    pub fn add_decision(&mut self, state: StateId) -> usize {
        let decision = self.decision_to_state.len();
        self.decision_to_state.push(state);
        self.states[state].decision = Some(decision);
        decision
    }

    pub fn set_non_greedy(&mut self, state: StateId) {
        self.states[state].non_greedy = true;
    }

    /// Allocate a new lexer mode with its `TokensStart` decision state.
    pub fn add_mode(&mut self) -> (usize, StateId) {
        let start = self.alloc(0, AtnStateKind::TokensStart);
        self.add_decision(start);
        let mode = self.mode_to_start.len();
        self.mode_to_start.push(start);
        (mode, start)
    }

    pub fn set_rule_token_type(&mut self, rule: usize, ty: i32) {
        self.rule_to_token_type[rule] = ty;
    }

    pub fn add_lexer_action(&mut self, action: LexerAction) -> usize {
        self.lexer_actions.push(action);
        self.lexer_actions.len() - 1
    }

    fn transition(&mut self, from: StateId, target: StateId, label: TransitionLabel) {
        self.states[from].transitions.push(Transition::new(target, label));
    }

    pub fn epsilon(&mut self, from: StateId, to: StateId) {
        self.transition(from, to, TransitionLabel::Epsilon);
    }

    /// Single-symbol transition (a degenerate range).
    pub fn atom(&mut self, from: StateId, to: StateId, symbol: i32) {
        self.range(from, to, symbol, symbol);
    }

    pub fn range(&mut self, from: StateId, to: StateId, lo: i32, hi: i32) {
        self.transition(from, to, TransitionLabel::Range { from: lo, to: hi });
    }

    pub fn set(&mut self, from: StateId, to: StateId, set: IntervalSet) {
        self.transition(from, to, TransitionLabel::Set(Arc::new(set)));
    }

    pub fn not_set(&mut self, from: StateId, to: StateId, set: IntervalSet) {
        self.transition(from, to, TransitionLabel::NotSet(Arc::new(set)));
    }

    pub fn wildcard(&mut self, from: StateId, to: StateId) {
        self.transition(from, to, TransitionLabel::Wildcard);
    }

    /// Call `rule` from `from`; control resumes at `follow`.
    pub fn rule_call(&mut self, from: StateId, rule: usize, follow: StateId, precedence: i32) {
        let target = self.rule_to_start[rule];
        self.transition(
            from,
            target,
            TransitionLabel::Rule { rule, precedence, follow },
        );
    }

    pub fn predicate(
        &mut self,
        from: StateId,
        to: StateId,
        rule: usize,
        pred: usize,
        ctx_dependent: bool,
    ) {
        self.transition(
            from,
            to,
            TransitionLabel::Predicate { rule, pred, ctx_dependent },
        );
    }

    pub fn action(
        &mut self,
        from: StateId,
        to: StateId,
        rule: usize,
        action: usize,
        ctx_dependent: bool,
    ) {
        self.transition(
            from,
            to,
            TransitionLabel::Action { rule, action, ctx_dependent },
        );
    }

    pub fn precedence(&mut self, from: StateId, to: StateId, precedence: i32) {
        self.transition(from, to, TransitionLabel::Precedence(precedence));
    }

    /// Validate the graph invariants and produce the immutable ATN.
    pub fn build(self) -> Result<Arc<Atn>, AtnError> {
        Atn::validated(Atn {
            kind: self.kind,
            states: self.states,
            decision_to_state: self.decision_to_state,
            rule_to_start: self.rule_to_start,
            rule_to_stop: self.rule_to_stop,
            rule_to_token_type: self.rule_to_token_type,
            lexer_actions: self.lexer_actions,
            mode_to_start: self.mode_to_start,
            max_token_type: self.max_token_type,
            follow_links: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_states_preallocated() {
        let b = AtnBuilder::parser(3, 5);
        assert_eq!(b.rule_states(0), (0, 1));
        assert_eq!(b.rule_states(2), (4, 5));
    }

    #[test]
    fn test_rule_stop_transitions_rejected() {
        let mut b = AtnBuilder::parser(1, 1);
        let (_, stop) = b.rule_states(0);
        let s = b.add_basic(0);
        b.epsilon(stop, s);
        assert!(matches!(
            b.build(),
            Err(AtnError::RuleStopHasTransitions { state }) if state == 1
        ));
    }

    #[test]
    fn test_follow_links_computed() {
        let mut b = AtnBuilder::parser(2, 3);
        let (start0, stop0) = b.rule_states(0);
        let (start1, stop1) = b.rule_states(1);
        let s1 = b.add_basic(0);
        b.rule_call(start0, 1, s1, 0);
        b.epsilon(s1, stop0);
        let s2 = b.add_basic(1);
        b.atom(start1, s2, 1);
        b.epsilon(s2, stop1);
        let atn = b.build().unwrap();
        assert_eq!(atn.follow_links[1].len(), 1);
        assert_eq!(atn.follow_links[1][0].follow, s1);
        assert_eq!(atn.follow_links[1][0].outermost_precedence_return, None);
        assert!(atn.follow_links[0].is_empty());
    }

    #[test]
    fn test_outermost_precedence_return_marked() {
        let mut b = AtnBuilder::parser(2, 3);
        b.mark_left_recursive(1);
        let (start0, stop0) = b.rule_states(0);
        let s1 = b.add_basic(0);
        b.rule_call(start0, 1, s1, 0);
        b.epsilon(s1, stop0);
        let (start1, stop1) = b.rule_states(1);
        let s2 = b.add_basic(1);
        b.atom(start1, s2, 1);
        // recursive call at elevated precedence
        b.rule_call(s2, 1, stop1, 2);
        let atn = b.build().unwrap();
        let links = &atn.follow_links[1];
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].outermost_precedence_return, Some(1));
        assert_eq!(links[1].outermost_precedence_return, None);
    }
}
