//! The lexer prediction engine: longest-match scanning over the ATN with
//! a DFA cache per lexer mode.
//!
//! Scanning advances character by character, remembering the most recent
//! configuration set that contained an accept (rule stop) state. When the
//! scan can no longer advance, the input rewinds to that snapshot and the
//! matched rule's token type and action executor are returned; if there is
//! no snapshot the scan fails. Ties go to the earliest rule because mode
//! start states try rules in declaration order and the ordered
//! configuration set preserves that order.

use std::sync::Arc;

use crate::atn::state::StateId;
use crate::atn::{Atn, Transition, TransitionLabel};
use crate::config::{AtnConfig, AtnConfigSet, INVALID_ALT};
use crate::context::{MergeCache, PredictionContext, PredictionContextCache, EMPTY_RETURN_STATE};
use crate::dfa::{Dfa, DfaState, EdgeTarget};
use crate::error::RecognitionError;
use crate::lexer::action::LexerActionExecutor;
use crate::semantic::PredicateEvaluator;
use crate::simulator::PredictionMetrics;
use crate::stream::CharStream;
use crate::token::EOF;

/// Characters cached in DFA edge arrays; anything outside goes through
/// the ATN every time.
pub const MIN_DFA_EDGE: i32 = 0;
pub const MAX_DFA_EDGE: i32 = 127;

/// Outcome of one `match_token` call.
#[derive(Debug, Clone)]
pub struct LexerMatch {
    /// Token type of the winning rule, or [`EOF`].
    pub token_type: i32,
    /// Actions of the winning rule, to be run by the driver once the
    /// token is definitely being emitted.
    pub executor: Option<Arc<LexerActionExecutor>>,
}

/// Most recent accept snapshot during a scan.
#[derive(Default, Clone)]
struct SimState {
    index: usize,
    line: u32,
    column: u32,
    dfa_state: Option<Arc<DfaState>>,
}

/// The lexer prediction engine. Tracks line/column as it consumes; the
/// driver reads them when stamping tokens.
pub struct LexerAtnSimulator {
    pub atn: Arc<Atn>,
    decision_to_dfa: Arc<Vec<Dfa>>,
    shared_context_cache: Arc<PredictionContextCache>,
    pub line: u32,
    pub column: u32,
    start_index: usize,
    metrics: PredictionMetrics,
}

impl LexerAtnSimulator {
    #[must_use]
    pub fn new(
        atn: Arc<Atn>,
        decision_to_dfa: Arc<Vec<Dfa>>,
        shared_context_cache: Arc<PredictionContextCache>,
    ) -> Self {
        Self {
            atn,
            decision_to_dfa,
            shared_context_cache,
            line: 1,
            column: 0,
            start_index: 0,
            metrics: PredictionMetrics::default(),
        }
    }

    #[must_use]
    pub fn dfa(&self, mode: usize) -> &Dfa {
        &self.decision_to_dfa[mode]
    }

    #[must_use]
    pub const fn metrics(&self) -> &PredictionMetrics {
        &self.metrics
    }

    pub fn reset_position(&mut self) {
        self.line = 1;
        self.column = 0;
    }

    /// Match one token in `mode` starting at the current input position.
    /// On success the input is left just past the matched text; on error
    /// it is left where the scan died.
    pub fn match_token<S, E>(
        &mut self,
        input: &mut S,
        mode: usize,
        eval: &mut E,
    ) -> Result<LexerMatch, RecognitionError>
    where
        S: CharStream + ?Sized,
        E: PredicateEvaluator + ?Sized,
    {
        self.metrics.decisions += 1;
        self.start_index = input.index();
        let marker = input.mark();
        let result = {
            let mut op = LexOp {
                atn: self.atn.as_ref(),
                dfa: &self.decision_to_dfa[mode],
                ctx_cache: self.shared_context_cache.as_ref(),
                input,
                eval,
                start_index: self.start_index,
                line: &mut self.line,
                column: &mut self.column,
                merge_cache: MergeCache::new(),
                metrics: &mut self.metrics,
                mode,
            };
            op.run()
        };
        input.release(marker);
        result
    }

    /// Consume one character, tracking line and column.
    pub fn consume<S: CharStream + ?Sized>(&mut self, input: &mut S) {
        if input.la(1) == i32::from(b'\n') {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        input.consume();
    }
}

struct LexOp<'a, S: CharStream + ?Sized, E: PredicateEvaluator + ?Sized> {
    atn: &'a Atn,
    dfa: &'a Dfa,
    ctx_cache: &'a PredictionContextCache,
    input: &'a mut S,
    eval: &'a mut E,
    start_index: usize,
    line: &'a mut u32,
    column: &'a mut u32,
    merge_cache: MergeCache,
    metrics: &'a mut PredictionMetrics,
    mode: usize,
}

impl<S: CharStream + ?Sized, E: PredicateEvaluator + ?Sized> LexOp<'_, S, E> {
    fn run(&mut self) -> Result<LexerMatch, RecognitionError> {
        match self.dfa.s0() {
            Some(s0) => self.exec_atn(s0),
            None => {
                let s0 = self.compute_and_install_start_state()?;
                self.exec_atn(s0)
            }
        }
    }

    fn compute_and_install_start_state(&mut self) -> Result<Arc<DfaState>, RecognitionError> {
        let start = self.atn.mode_to_start[self.mode];
        let mut s0_closure = self.compute_start_state(start)?;
        // Predicated start states depend on the evaluation; they must not
        // be cached as the mode's s0.
        let suppress = s0_closure.has_semantic_context;
        s0_closure.has_semantic_context = false;
        let s0 = self.install_dfa_state(s0_closure);
        if !suppress {
            self.dfa.set_s0(s0.clone());
        }
        Ok(s0)
    }

    fn exec_atn(&mut self, ds0: Arc<DfaState>) -> Result<LexerMatch, RecognitionError> {
        let mut prev_accept = SimState::default();
        if ds0.is_accept {
            self.capture(&mut prev_accept, &ds0);
        }
        let mut t = self.input.la(1);
        let mut s = ds0;
        loop {
            let target = match self.existing_target_state(&s, t) {
                Some(existing) => {
                    self.metrics.dfa_edge_hits += 1;
                    existing
                }
                None => self.compute_target_state(&s, t)?,
            };
            let target = match target {
                EdgeTarget::Error => break,
                EdgeTarget::State(st) => st,
            };
            if t != EOF {
                self.consume();
            }
            if target.is_accept {
                self.capture(&mut prev_accept, &target);
                if t == EOF {
                    break;
                }
            }
            t = self.input.la(1);
            s = target;
        }
        self.fail_or_accept(prev_accept, &s, t)
    }

    fn existing_target_state(&self, s: &DfaState, t: i32) -> Option<EdgeTarget> {
        if !(MIN_DFA_EDGE..=MAX_DFA_EDGE).contains(&t) {
            return None;
        }
        s.edge((t - MIN_DFA_EDGE) as usize)
    }

    fn compute_target_state(
        &mut self,
        s: &Arc<DfaState>,
        t: i32,
    ) -> Result<EdgeTarget, RecognitionError> {
        let mut reach = AtnConfigSet::new_ordered();
        self.reachable_config_set(&s.configs, &mut reach, t)?;
        if reach.is_empty() {
            if !reach.has_semantic_context {
                self.set_edge(s, t, EdgeTarget::Error);
            }
            return Ok(EdgeTarget::Error);
        }
        // Predicated reach sets are position-specific; keep them out of
        // the shared edge table.
        let suppress_edge = reach.has_semantic_context;
        reach.has_semantic_context = false;
        let target = self.install_dfa_state(reach);
        if !suppress_edge {
            self.set_edge(s, t, EdgeTarget::State(target.clone()));
        }
        Ok(EdgeTarget::State(target))
    }

    fn set_edge(&self, from: &DfaState, t: i32, target: EdgeTarget) {
        if (MIN_DFA_EDGE..=MAX_DFA_EDGE).contains(&t) {
            from.set_edge((t - MIN_DFA_EDGE) as usize, target);
        }
    }

    /// Freeze `configs` into a canonical DFA state, decorating accept
    /// states with the winning rule's token type and actions.
    fn install_dfa_state(&mut self, mut configs: AtnConfigSet) -> Arc<DfaState> {
        debug_assert!(!configs.has_semantic_context);
        let first_stop = configs
            .iter()
            .find(|c| self.atn.state(c.state).is_rule_stop())
            .cloned();
        configs.optimize_contexts(self.ctx_cache);
        configs.freeze();
        let mut state = DfaState::new(Arc::new(configs));
        if let Some(c) = first_stop {
            state.is_accept = true;
            state.lexer_action_executor = c.lexer_action_executor.clone();
            let token_type = self.atn.rule_to_token_type[self.atn.state(c.state).rule];
            state.prediction = usize::try_from(token_type).unwrap_or(INVALID_ALT);
        }
        let before = self.dfa.num_states();
        let canonical = self.dfa.add_state(state);
        if self.dfa.num_states() > before {
            self.metrics.dfa_states_created += 1;
        }
        canonical
    }

    fn capture(&mut self, prev: &mut SimState, state: &Arc<DfaState>) {
        *prev = SimState {
            index: self.input.index(),
            line: *self.line,
            column: *self.column,
            dfa_state: Some(state.clone()),
        };
    }

    fn fail_or_accept(
        &mut self,
        prev: SimState,
        last: &Arc<DfaState>,
        t: i32,
    ) -> Result<LexerMatch, RecognitionError> {
        if let Some(accept_state) = prev.dfa_state {
            // Rewind to the longest accept seen.
            self.input.seek(prev.index);
            *self.line = prev.line;
            *self.column = prev.column;
            let token_type = i32::try_from(accept_state.prediction).unwrap_or(EOF);
            return Ok(LexerMatch {
                token_type,
                executor: accept_state.lexer_action_executor.clone(),
            });
        }
        if t == EOF && self.input.index() == self.start_index {
            return Ok(LexerMatch { token_type: EOF, executor: None });
        }
        Err(RecognitionError::LexerNoViableAlt {
            start_index: self.start_index,
            bad_text: self.input.text(self.start_index, self.input.index()),
            dead_end: Some(last.configs.clone()),
        })
    }

    fn consume(&mut self) {
        if self.input.la(1) == i32::from(b'\n') {
            *self.line += 1;
            *self.column = 0;
        } else {
            *self.column += 1;
        }
        self.input.consume();
    }

    /// One reach step: advance every configuration over `t`. Once an
    /// accepting alternative has been extended, lower-priority
    /// configurations of the same alternative that crossed a non-greedy
    /// decision are dropped.
    fn reachable_config_set(
        &mut self,
        closure: &Arc<AtnConfigSet>,
        reach: &mut AtnConfigSet,
        t: i32,
    ) -> Result<(), RecognitionError> {
        let atn = self.atn;
        let (min_vocab, max_vocab) = atn.vocab_bounds();
        let mut skip_alt = INVALID_ALT;
        for c in closure.as_ref() {
            let current_alt_reached_accept = c.alt == skip_alt;
            if current_alt_reached_accept && c.passed_through_non_greedy_decision {
                continue;
            }
            let state = atn.state(c.state);
            for trans in &state.transitions {
                if !trans.matches(t, min_vocab, max_vocab) {
                    continue;
                }
                let executor = c
                    .lexer_action_executor
                    .as_ref()
                    .map(|e| e.fix_offset_before_match(self.input.index() - self.start_index));
                let mut next = self.transit(c, trans.target);
                next.lexer_action_executor = executor;
                let treat_eof_as_epsilon = t == EOF;
                if self.closure(next, reach, current_alt_reached_accept, true, treat_eof_as_epsilon)? {
                    // This alternative has an accept; skip its remaining
                    // configurations.
                    skip_alt = c.alt;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Derive a configuration at `target`, tracking passage through
    /// non-greedy decisions.
    fn transit(&self, config: &AtnConfig, target: StateId) -> AtnConfig {
        let mut c = config.transit(target);
        let ts = self.atn.state(target);
        c.passed_through_non_greedy_decision =
            config.passed_through_non_greedy_decision || (ts.kind.is_decision() && ts.non_greedy);
        c
    }

    fn compute_start_state(&mut self, p: StateId) -> Result<AtnConfigSet, RecognitionError> {
        let mut configs = AtnConfigSet::new_ordered();
        for (i, trans) in self.atn.state(p).transitions.iter().enumerate() {
            let mut c = AtnConfig::new(trans.target, i + 1, PredictionContext::empty());
            let ts = self.atn.state(trans.target);
            c.passed_through_non_greedy_decision = ts.kind.is_decision() && ts.non_greedy;
            self.closure(c, &mut configs, false, false, false)?;
        }
        Ok(configs)
    }

    /// Epsilon closure; returns whether the current alternative reached an
    /// accept state.
    fn closure(
        &mut self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        mut current_alt_reached_accept: bool,
        speculative: bool,
        treat_eof_as_epsilon: bool,
    ) -> Result<bool, RecognitionError> {
        let atn = self.atn;
        let state = atn.state(config.state);
        if state.is_rule_stop() {
            if config.context.is_empty_ctx() {
                configs.add(config, &mut self.merge_cache)?;
                return Ok(true);
            }
            if config.context.has_empty_path() {
                let c = AtnConfig { context: PredictionContext::empty(), ..config.clone() };
                configs.add(c, &mut self.merge_cache)?;
                current_alt_reached_accept = true;
            }
            for i in 0..config.context.len() {
                if config.context.return_state(i) == EMPTY_RETURN_STATE {
                    continue;
                }
                let new_context = config
                    .context
                    .parent(i)
                    .cloned()
                    .unwrap_or_else(PredictionContext::empty);
                let c = AtnConfig {
                    state: config.context.return_state(i),
                    context: new_context,
                    ..config.clone()
                };
                current_alt_reached_accept = self.closure(
                    c,
                    configs,
                    current_alt_reached_accept,
                    speculative,
                    treat_eof_as_epsilon,
                )?;
            }
            return Ok(current_alt_reached_accept);
        }

        if !state.only_has_epsilon_transitions()
            && (!current_alt_reached_accept || !config.passed_through_non_greedy_decision)
        {
            configs.add(config.clone(), &mut self.merge_cache)?;
        }

        for trans in &state.transitions {
            if let Some(c) =
                self.epsilon_target(&config, trans, configs, speculative, treat_eof_as_epsilon)?
            {
                current_alt_reached_accept = self.closure(
                    c,
                    configs,
                    current_alt_reached_accept,
                    speculative,
                    treat_eof_as_epsilon,
                )?;
            }
        }
        Ok(current_alt_reached_accept)
    }

    fn epsilon_target(
        &mut self,
        config: &AtnConfig,
        trans: &Transition,
        configs: &mut AtnConfigSet,
        speculative: bool,
        treat_eof_as_epsilon: bool,
    ) -> Result<Option<AtnConfig>, RecognitionError> {
        Ok(match &trans.label {
            TransitionLabel::Rule { follow, .. } => {
                let new_context = PredictionContext::singleton(config.context.clone(), *follow);
                let mut c = self.transit(config, trans.target);
                c.context = new_context;
                Some(c)
            }
            TransitionLabel::Predicate { rule, pred, .. } => {
                // Predicated paths poison DFA caching (the flag is checked
                // by the caller) and are re-evaluated on every scan.
                configs.has_semantic_context = true;
                if self.evaluate_predicate(*rule, *pred, speculative) {
                    Some(self.transit(config, trans.target))
                } else {
                    None
                }
            }
            TransitionLabel::Action { action, .. } => {
                if config.context.is_empty_ctx() || config.context.has_empty_path() {
                    // Collect the action; it runs only if this path wins.
                    let executor = LexerActionExecutor::append(
                        config.lexer_action_executor.as_ref(),
                        self.atn.lexer_actions[*action],
                    );
                    let mut c = self.transit(config, trans.target);
                    c.lexer_action_executor = Some(executor);
                    Some(c)
                } else {
                    // Inside a called rule: actions of the callee are not
                    // the token's actions.
                    Some(self.transit(config, trans.target))
                }
            }
            TransitionLabel::Epsilon => Some(self.transit(config, trans.target)),
            TransitionLabel::Precedence(_) => {
                debug_assert!(false, "precedence transitions cannot appear in lexer ATNs");
                None
            }
            _ => (treat_eof_as_epsilon && trans.matches_eof())
                .then(|| self.transit(config, trans.target)),
        })
    }

    /// Evaluate a lexer predicate. Off the codified DFA path
    /// (`speculative`), the character about to be matched is consumed
    /// first so predicates observe the same position as on-the-fly
    /// evaluation, then the stream is restored.
    fn evaluate_predicate(&mut self, rule: usize, pred: usize, speculative: bool) -> bool {
        if !speculative {
            return self.eval.sempred(None, rule, pred);
        }
        let saved_column = *self.column;
        let saved_line = *self.line;
        let index = self.input.index();
        let marker = self.input.mark();
        self.consume();
        let result = self.eval.sempred(None, rule, pred);
        *self.column = saved_column;
        *self.line = saved_line;
        self.input.seek(index);
        self.input.release(marker);
        result
    }
}
