//! The adaptive LL(*) parser prediction engine.
//!
//! `adaptive_predict` resolves one decision: it walks the decision's DFA
//! over the lookahead, and on a missing edge extends the DFA by one state
//! — a reach step over the current configuration set followed by the
//! epsilon closure. SLL simulation runs first; when a state reports an
//! SLL conflict the engine re-predicts from scratch with the true outer
//! context (full LL). Everything learned is cached in the shared DFA, so
//! repeated decisions on similar input reduce to edge lookups.
//!
//! Prediction is stream-neutral: the input is marked on entry and the
//! engine seeks back to the start index on every exit path.

use hashbrown::{HashMap, HashSet};
use std::sync::Arc;

use crate::atn::state::StateId;
use crate::atn::{Atn, Transition, TransitionLabel};
use crate::bitset::BitSet;
use crate::config::{AtnConfig, AtnConfigSet, INVALID_ALT};
use crate::context::{MergeCache, PredictionContext, PredictionContextCache};
use crate::dfa::{Dfa, DfaState, EdgeTarget, PredPrediction};
use crate::error::RecognitionError;
use crate::parser::context::RuleContext;
use crate::semantic::SemanticContext;
use crate::simulator::prediction_mode::{self, PredictionMode};
use crate::simulator::{PredictionHost, PredictionMetrics};
use crate::stream::TokenStream;
use crate::token::{EOF, EPSILON};

/// The parser prediction engine. One instance per parser; the ATN, the
/// decision DFAs, and the context cache are shared across instances for
/// the same grammar.
pub struct ParserAtnSimulator {
    pub atn: Arc<Atn>,
    decision_to_dfa: Arc<Vec<Dfa>>,
    shared_context_cache: Arc<PredictionContextCache>,
    pub mode: PredictionMode,
    metrics: PredictionMetrics,
}

impl ParserAtnSimulator {
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
            mode: PredictionMode::default(),
            metrics: PredictionMetrics::default(),
        }
    }

    #[must_use]
    pub fn dfa(&self, decision: usize) -> &Dfa {
        &self.decision_to_dfa[decision]
    }

    #[must_use]
    pub const fn metrics(&self) -> &PredictionMetrics {
        &self.metrics
    }

    /// Predict which alternative of `decision` the input starting at the
    /// current position takes. Restores the input position before
    /// returning, on success and on error alike.
    pub fn adaptive_predict<S, H>(
        &mut self,
        input: &mut S,
        decision: usize,
        outer_context: Option<&Arc<RuleContext>>,
        host: &mut H,
    ) -> Result<usize, RecognitionError>
    where
        S: TokenStream + ?Sized,
        H: PredictionHost + ?Sized,
    {
        self.metrics.decisions += 1;
        let start_index = input.index();
        let marker = input.mark();
        let result = {
            let mut op = PredictOp {
                atn: self.atn.as_ref(),
                dfa: &self.decision_to_dfa[decision],
                ctx_cache: self.shared_context_cache.as_ref(),
                input,
                start_index,
                outer_context: outer_context.cloned(),
                host,
                merge_cache: MergeCache::new(),
                mode: self.mode,
                metrics: &mut self.metrics,
            };
            op.run()
        };
        input.seek(start_index);
        input.release(marker);
        result
    }
}

/// Per-call state of one prediction. Lives exactly as long as one
/// `adaptive_predict` invocation; the merge cache and closure busy sets
/// never outlive it.
struct PredictOp<'a, S: TokenStream + ?Sized, H: PredictionHost + ?Sized> {
    atn: &'a Atn,
    dfa: &'a Dfa,
    ctx_cache: &'a PredictionContextCache,
    input: &'a mut S,
    start_index: usize,
    outer_context: Option<Arc<RuleContext>>,
    host: &'a mut H,
    merge_cache: MergeCache,
    mode: PredictionMode,
    metrics: &'a mut PredictionMetrics,
}

impl<S: TokenStream + ?Sized, H: PredictionHost + ?Sized> PredictOp<'_, S, H> {
    fn run(&mut self) -> Result<usize, RecognitionError> {
        let existing = if self.dfa.is_precedence {
            self.dfa.precedence_start_state(self.host.precedence())
        } else {
            self.dfa.s0()
        };
        let s0 = match existing {
            Some(s0) => s0,
            None => self.compute_and_install_start_state()?,
        };
        self.exec_atn(s0)
    }

    fn compute_and_install_start_state(&mut self) -> Result<Arc<DfaState>, RecognitionError> {
        let s0_closure = self.compute_start_state(self.dfa.atn_start_state, None, false)?;
        if self.dfa.is_precedence {
            let filtered = self.apply_precedence_filter(&s0_closure)?;
            let s0 = self.install_dfa_state(filtered, |_| {});
            self.dfa
                .set_precedence_start_state(self.host.precedence(), s0.clone());
            Ok(s0)
        } else {
            let s0 = self.install_dfa_state(s0_closure, |_| {});
            self.dfa.set_s0(s0.clone());
            Ok(s0)
        }
    }

    /// Freeze `configs` into a DFA state (decorated by `decorate`) and
    /// canonicalize it against the DFA's state table.
    fn install_dfa_state(
        &mut self,
        mut configs: AtnConfigSet,
        decorate: impl FnOnce(&mut DfaState),
    ) -> Arc<DfaState> {
        configs.optimize_contexts(self.ctx_cache);
        configs.freeze();
        let mut state = DfaState::new(Arc::new(configs));
        decorate(&mut state);
        let before = self.dfa.num_states();
        let canonical = self.dfa.add_state(state);
        if self.dfa.num_states() > before {
            self.metrics.dfa_states_created += 1;
        }
        canonical
    }

    /// The SLL simulation loop.
    fn exec_atn(&mut self, s0: Arc<DfaState>) -> Result<usize, RecognitionError> {
        let mut previous = s0;
        let mut t = self.input.la(1);
        loop {
            let target = match self.existing_target_state(&previous, t) {
                Some(existing) => {
                    self.metrics.dfa_edge_hits += 1;
                    existing
                }
                None => self.compute_target_state(&previous, t)?,
            };
            let d = match target {
                EdgeTarget::Error => {
                    // The reach died. Prefer an alternative that at least
                    // finished the decision entry rule before giving up.
                    let err = self.no_viable_alt(previous.configs.clone(), t);
                    self.input.seek(self.start_index);
                    let alt = self.syn_valid_or_sem_invalid_alt(&previous.configs);
                    if alt != INVALID_ALT {
                        return Ok(alt);
                    }
                    return Err(err);
                }
                EdgeTarget::State(d) => d,
            };

            if d.requires_full_context && self.mode != PredictionMode::Sll {
                return self.fall_back_to_full_context(&d);
            }

            if d.is_accept {
                return self.accept(&d, t);
            }

            previous = d;
            if t != EOF {
                self.input.consume();
                t = self.input.la(1);
            }
        }
    }

    fn existing_target_state(&self, previous: &DfaState, t: i32) -> Option<EdgeTarget> {
        let slot = usize::try_from(t + 1).ok()?;
        previous.edge(slot)
    }

    /// Extend the DFA by one state for symbol `t` out of `previous`.
    fn compute_target_state(
        &mut self,
        previous: &Arc<DfaState>,
        t: i32,
    ) -> Result<EdgeTarget, RecognitionError> {
        let Some(mut reach) = self.compute_reach_set(&previous.configs, t, false)? else {
            self.set_edge(previous, t, EdgeTarget::Error);
            return Ok(EdgeTarget::Error);
        };

        let predicted_alt = reach.unique_alt_of_configs();
        let mut is_accept = false;
        let mut prediction = INVALID_ALT;
        let mut requires_full_context = false;
        if predicted_alt != INVALID_ALT {
            reach.unique_alt = predicted_alt;
            is_accept = true;
            prediction = predicted_alt;
        } else if prediction_mode::has_sll_conflict_terminating_prediction(
            self.mode, &reach, self.atn,
        ) {
            let conflicting =
                prediction_mode::all_alts(&prediction_mode::conflicting_alt_subsets(&reach));
            prediction = conflicting.min().unwrap_or(INVALID_ALT);
            reach.conflicting_alts = Some(conflicting);
            requires_full_context = true;
            is_accept = true;
        }

        let mut predicates = None;
        if is_accept && reach.has_semantic_context {
            let decision_state = self.atn.decision_state(self.dfa.decision);
            let nalts = decision_state.transitions.len();
            predicates = Self::predicate_predictions(&reach, nalts);
            if predicates.is_some() {
                prediction = INVALID_ALT;
            }
        }

        let state = self.install_dfa_state(reach, |d| {
            d.is_accept = is_accept;
            d.prediction = prediction;
            d.requires_full_context = requires_full_context;
            d.predicates = predicates;
        });
        let target = EdgeTarget::State(state);
        self.set_edge(previous, t, target.clone());
        Ok(target)
    }

    fn set_edge(&self, from: &DfaState, t: i32, target: EdgeTarget) {
        if let Ok(slot) = usize::try_from(t + 1) {
            from.set_edge(slot, target);
        }
    }

    /// Collect per-alternative predicates for a conflicted or predicated
    /// accept state; `None` when no alternative is actually gated.
    fn predicate_predictions(configs: &AtnConfigSet, nalts: usize) -> Option<Vec<PredPrediction>> {
        let alts_to_collect = if configs.unique_alt != INVALID_ALT {
            BitSet::of(configs.unique_alt)
        } else {
            configs.conflicting_alts.clone().unwrap_or_else(|| configs.alts())
        };
        let mut alt_to_pred: Vec<Option<Arc<SemanticContext>>> = vec![None; nalts + 1];
        for c in configs {
            if alts_to_collect.get(c.alt) {
                let merged = match &alt_to_pred[c.alt] {
                    Some(existing) => SemanticContext::or(existing, &c.semantic_context),
                    None => c.semantic_context.clone(),
                };
                alt_to_pred[c.alt] = Some(merged);
            }
        }
        let mut pairs = Vec::new();
        let mut contains_predicate = false;
        for alt in 1..=nalts {
            if !alts_to_collect.get(alt) {
                continue;
            }
            let pred = alt_to_pred[alt].clone().unwrap_or_else(SemanticContext::none);
            if !pred.is_none() {
                contains_predicate = true;
            }
            pairs.push(PredPrediction { pred, alt });
        }
        contains_predicate.then_some(pairs)
    }

    fn accept(&mut self, d: &Arc<DfaState>, t: i32) -> Result<usize, RecognitionError> {
        let Some(predicates) = &d.predicates else {
            return Ok(d.prediction);
        };
        // Predicates are evaluated as if no lookahead had been consumed.
        let stop_index = self.input.index();
        self.input.seek(self.start_index);
        let alts = self.eval_semantic_contexts(predicates, true);
        match alts.cardinality() {
            0 => Err(self.no_viable_alt(d.configs.clone(), t)),
            1 => Ok(alts.min().unwrap_or(INVALID_ALT)),
            _ => {
                self.metrics.ambiguities += 1;
                self.host.report_ambiguity(
                    self.dfa,
                    self.start_index,
                    stop_index,
                    false,
                    &alts,
                    &d.configs,
                );
                Ok(alts.min().unwrap_or(INVALID_ALT))
            }
        }
    }

    /// An SLL conflict: re-predict with the real outer context.
    fn fall_back_to_full_context(
        &mut self,
        d: &Arc<DfaState>,
    ) -> Result<usize, RecognitionError> {
        let mut conflicting_alts = d
            .configs
            .conflicting_alts
            .clone()
            .unwrap_or_else(|| d.configs.alts());
        if let Some(predicates) = &d.predicates {
            // A predicate may prune the conflict down to one alternative
            // before we pay for full context.
            let conflict_index = self.input.index();
            if conflict_index != self.start_index {
                self.input.seek(self.start_index);
            }
            conflicting_alts = self.eval_semantic_contexts(predicates, true);
            if conflicting_alts.cardinality() == 1 {
                return Ok(conflicting_alts.min().unwrap_or(INVALID_ALT));
            }
            if conflict_index != self.start_index {
                self.input.seek(conflict_index);
            }
        }
        self.metrics.full_context_fallbacks += 1;
        let stop_index = self.input.index();
        self.host.report_attempting_full_context(
            self.dfa,
            &conflicting_alts,
            &d.configs,
            self.start_index,
            stop_index,
        );
        let s0_closure =
            self.compute_start_state(self.dfa.atn_start_state, self.outer_context.clone(), true)?;
        self.exec_atn_full_context(s0_closure)
    }

    /// The full-context (LL) simulation loop.
    fn exec_atn_full_context(
        &mut self,
        s0: AtnConfigSet,
    ) -> Result<usize, RecognitionError> {
        let mut found_exact_ambig = false;
        let mut previous = s0;
        self.input.seek(self.start_index);
        let mut t = self.input.la(1);
        let (reach, predicted_alt) = loop {
            let Some(mut reach) = self.compute_reach_set(&previous, t, true)? else {
                let err = self.no_viable_alt(Arc::new(previous.clone()), t);
                self.input.seek(self.start_index);
                let alt = self.syn_valid_or_sem_invalid_alt(&previous);
                if alt != INVALID_ALT {
                    return Ok(alt);
                }
                return Err(err);
            };
            let alt_subsets = prediction_mode::conflicting_alt_subsets(&reach);
            reach.unique_alt = reach.unique_alt_of_configs();
            if reach.unique_alt != INVALID_ALT {
                let alt = reach.unique_alt;
                break (reach, alt);
            }
            if self.mode == PredictionMode::LlExactAmbigDetection {
                if prediction_mode::all_subsets_conflict(&alt_subsets)
                    && prediction_mode::all_subsets_equal(&alt_subsets)
                {
                    found_exact_ambig = true;
                    break (reach, prediction_mode::single_viable_alt(&alt_subsets));
                }
            } else {
                let alt = prediction_mode::resolves_to_just_one_viable_alt(&alt_subsets);
                if alt != INVALID_ALT {
                    break (reach, alt);
                }
            }
            previous = reach;
            if t != EOF {
                self.input.consume();
                t = self.input.la(1);
            }
        };
        let stop_index = self.input.index();
        if reach.unique_alt != INVALID_ALT {
            // Full context disambiguated where SLL could not: the decision
            // is context-sensitive, not ambiguous.
            self.host.report_context_sensitivity(
                self.dfa,
                predicted_alt,
                &reach,
                self.start_index,
                stop_index,
            );
            return Ok(predicted_alt);
        }
        self.metrics.ambiguities += 1;
        let ambig_alts = reach.alts();
        self.host.report_ambiguity(
            self.dfa,
            self.start_index,
            stop_index,
            found_exact_ambig,
            &ambig_alts,
            &reach,
        );
        Ok(predicted_alt)
    }

    /// Advance every configuration over symbol `t`, then close over
    /// epsilon. `None` when nothing survives.
    fn compute_reach_set(
        &mut self,
        closure: &AtnConfigSet,
        t: i32,
        full_ctx: bool,
    ) -> Result<Option<AtnConfigSet>, RecognitionError> {
        let atn = self.atn;
        let (min_vocab, max_vocab) = atn.vocab_bounds();
        let mut intermediate = AtnConfigSet::new(full_ctx);
        let mut skipped_stop_states: Vec<AtnConfig> = Vec::new();
        for c in closure {
            let state = atn.state(c.state);
            if state.is_rule_stop() {
                // A config already at rule end only matters for EOF or
                // full-context decisions; park it until we know whether
                // the reach survives.
                debug_assert!(c.context.is_empty_ctx() || c.context.has_empty_path());
                if full_ctx || t == EOF {
                    skipped_stop_states.push(c.clone());
                }
                continue;
            }
            for trans in &state.transitions {
                if trans.matches(t, min_vocab, max_vocab) {
                    intermediate.add(c.transit(trans.target), &mut self.merge_cache)?;
                }
            }
        }

        let mut reach_is_intermediate = false;
        let mut reach = if skipped_stop_states.is_empty()
            && t != EOF
            && (intermediate.len() == 1 || intermediate.unique_alt_of_configs() != INVALID_ALT)
        {
            // No closure needed: the reach is already unambiguous.
            reach_is_intermediate = true;
            intermediate
        } else {
            let mut reach = AtnConfigSet::new(full_ctx);
            let mut busy = HashSet::new();
            let treat_eof_as_epsilon = t == EOF;
            for c in &intermediate {
                self.closure(c.clone(), &mut reach, &mut busy, false, full_ctx, treat_eof_as_epsilon)?;
            }
            reach
        };

        if t == EOF {
            // EOF accepts only configurations that made it to a rule end.
            reach = self.keep_rule_stop_configs(&reach, reach_is_intermediate)?;
        }

        if !skipped_stop_states.is_empty()
            && (!full_ctx || !prediction_mode::has_config_in_rule_stop_state(&reach, atn))
        {
            for c in skipped_stop_states {
                reach.add(c, &mut self.merge_cache)?;
            }
        }

        if reach.is_empty() {
            return Ok(None);
        }
        Ok(Some(reach))
    }

    /// Project a reach set down to its rule-stop configurations; with
    /// `look_to_end`, states that can still epsilon their way to the rule
    /// end are advanced there.
    fn keep_rule_stop_configs(
        &mut self,
        configs: &AtnConfigSet,
        look_to_end: bool,
    ) -> Result<AtnConfigSet, RecognitionError> {
        let atn = self.atn;
        if prediction_mode::all_configs_in_rule_stop_states(configs, atn) {
            return Ok(configs.clone());
        }
        let mut result = AtnConfigSet::new(configs.full_ctx);
        for c in configs {
            let state = atn.state(c.state);
            if state.is_rule_stop() {
                result.add(c.clone(), &mut self.merge_cache)?;
                continue;
            }
            if look_to_end && state.only_has_epsilon_transitions() {
                let next = atn.next_tokens(c.state);
                if next.contains(EPSILON) {
                    let end = atn.rule_to_stop[state.rule];
                    result.add(c.transit(end), &mut self.merge_cache)?;
                }
            }
        }
        Ok(result)
    }

    /// Closure of the decision state's alternatives, seeded with the
    /// given invocation context.
    fn compute_start_state(
        &mut self,
        p: StateId,
        ctx: Option<Arc<RuleContext>>,
        full_ctx: bool,
    ) -> Result<AtnConfigSet, RecognitionError> {
        let atn = self.atn;
        let initial_context = PredictionContext::from_rule_context(atn, ctx.as_ref());
        let mut configs = AtnConfigSet::new(full_ctx);
        for (i, trans) in atn.state(p).transitions.iter().enumerate() {
            let c = AtnConfig::new(trans.target, i + 1, initial_context.clone());
            let mut busy = HashSet::new();
            self.closure(c, &mut configs, &mut busy, true, full_ctx, false)?;
        }
        Ok(configs)
    }

    /// Prune configurations whose precedence predicate fails at the
    /// current parser precedence (the precedence-DFA specialization).
    ///
    /// An alternative other than the primary (alt 1) is dropped when alt 1
    /// reaches the same state with the same context — the recursive
    /// alternative would only re-derive what the primary already covers at
    /// this precedence — unless a previous escape through an outermost
    /// recursive call set `precedence_filter_suppressed`.
    fn apply_precedence_filter(
        &mut self,
        configs: &AtnConfigSet,
    ) -> Result<AtnConfigSet, RecognitionError> {
        let mut states_from_alt1: HashMap<StateId, Arc<PredictionContext>, ahash::RandomState> =
            HashMap::default();
        let mut result = AtnConfigSet::new(configs.full_ctx);
        for c in configs {
            if c.alt != 1 {
                continue;
            }
            let Some(updated) = c.semantic_context.eval_precedence(&*self.host) else {
                // Predicate rejected at this precedence.
                continue;
            };
            states_from_alt1.insert(c.state, c.context.clone());
            if Arc::ptr_eq(&updated, &c.semantic_context) {
                result.add(c.clone(), &mut self.merge_cache)?;
            } else {
                result.add(
                    AtnConfig { semantic_context: updated, ..c.clone() },
                    &mut self.merge_cache,
                )?;
            }
        }
        for c in configs {
            if c.alt == 1 {
                continue;
            }
            if !c.precedence_filter_suppressed
                && let Some(ctx1) = states_from_alt1.get(&c.state)
                && **ctx1 == *c.context
            {
                continue;
            }
            result.add(c.clone(), &mut self.merge_cache)?;
        }
        Ok(result)
    }

    /// Epsilon closure. `busy` breaks the recursion that left-recursive
    /// and empty-cycle grammars would otherwise cause.
    fn closure(
        &mut self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut HashSet<AtnConfig>,
        collect_predicates: bool,
        full_ctx: bool,
        treat_eof_as_epsilon: bool,
    ) -> Result<(), RecognitionError> {
        self.closure_at(config, configs, busy, collect_predicates, full_ctx, 0, treat_eof_as_epsilon)
    }

    /// Closure step that first resolves rule-stop states by popping the
    /// prediction context (or falling back to follow links when no
    /// context is available).
    #[allow(clippy::too_many_arguments)]
    fn closure_at(
        &mut self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut HashSet<AtnConfig>,
        collect_predicates: bool,
        full_ctx: bool,
        depth: i32,
        treat_eof_as_epsilon: bool,
    ) -> Result<(), RecognitionError> {
        let atn = self.atn;
        if atn.state(config.state).is_rule_stop() {
            if !config.context.is_empty_ctx() {
                for i in 0..config.context.len() {
                    if config.context.return_state(i) == crate::context::EMPTY_RETURN_STATE {
                        if full_ctx {
                            // Reached the end of the start rule with real
                            // context: record it as a stopped config.
                            let c = AtnConfig {
                                context: PredictionContext::empty(),
                                ..config.clone()
                            };
                            configs.add(c, &mut self.merge_cache)?;
                        } else {
                            // No context information on this path; chase
                            // the rule's follow links instead.
                            self.closure_step(
                                config.clone(),
                                configs,
                                busy,
                                collect_predicates,
                                full_ctx,
                                depth,
                                treat_eof_as_epsilon,
                            )?;
                        }
                        continue;
                    }
                    let return_state = config.context.return_state(i);
                    let new_context = config
                        .context
                        .parent(i)
                        .cloned()
                        .unwrap_or_else(PredictionContext::empty);
                    let mut c = AtnConfig::new(return_state, config.alt, new_context);
                    c.semantic_context = config.semantic_context.clone();
                    c.reaches_into_outer_context = config.reaches_into_outer_context;
                    self.closure_at(
                        c,
                        configs,
                        busy,
                        collect_predicates,
                        full_ctx,
                        depth - 1,
                        treat_eof_as_epsilon,
                    )?;
                }
                return Ok(());
            } else if full_ctx {
                // End of the start rule is a real stopping point in full
                // context.
                configs.add(config, &mut self.merge_cache)?;
                return Ok(());
            }
            // SLL with empty context falls through to follow links.
        }
        self.closure_step(config, configs, busy, collect_predicates, full_ctx, depth, treat_eof_as_epsilon)
    }

    /// Expand one state's outgoing epsilon transitions.
    #[allow(clippy::too_many_arguments)]
    fn closure_step(
        &mut self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut HashSet<AtnConfig>,
        collect_predicates: bool,
        full_ctx: bool,
        depth: i32,
        treat_eof_as_epsilon: bool,
    ) -> Result<(), RecognitionError> {
        let atn = self.atn;
        let state = atn.state(config.state);

        if state.is_rule_stop() {
            // Falling off the end of a rule with no context: continue at
            // every call site's follow state.
            let links = &atn.follow_links[state.rule];
            if links.is_empty() {
                configs.add(config, &mut self.merge_cache)?;
                return Ok(());
            }
            let suppression_rule = self
                .dfa
                .is_precedence
                .then(|| atn.state(self.dfa.atn_start_state).rule);
            for link in links {
                let mut c = config.transit(link.follow);
                if link.outermost_precedence_return.is_some()
                    && link.outermost_precedence_return == suppression_rule
                {
                    c.precedence_filter_suppressed = true;
                }
                c.reaches_into_outer_context += 1;
                if !busy.insert(c.clone()) {
                    continue;
                }
                configs.dips_into_outer_context = true;
                self.closure_at(
                    c,
                    configs,
                    busy,
                    collect_predicates,
                    full_ctx,
                    depth - 1,
                    treat_eof_as_epsilon,
                )?;
            }
            return Ok(());
        }

        if !state.only_has_epsilon_transitions() {
            configs.add(config.clone(), &mut self.merge_cache)?;
        }
        for trans in &state.transitions {
            let continue_collecting =
                collect_predicates && !matches!(trans.label, TransitionLabel::Action { .. });
            let Some(c) = self.epsilon_target(
                &config,
                trans,
                continue_collecting,
                depth == 0,
                full_ctx,
                treat_eof_as_epsilon,
            ) else {
                continue;
            };
            let mut new_depth = depth;
            // Non-epsilon traversals here are EOF-as-epsilon steps; bound
            // them or `(EOF)*` loops recurse forever.
            if !trans.is_epsilon() && !busy.insert(c.clone()) {
                continue;
            }
            if matches!(trans.label, TransitionLabel::Rule { .. }) && new_depth >= 0 {
                // Depth saturates below zero once we have left the entry
                // context for good.
                new_depth += 1;
            }
            self.closure_at(
                c,
                configs,
                busy,
                collect_predicates,
                full_ctx,
                new_depth,
                treat_eof_as_epsilon,
            )?;
        }
        Ok(())
    }

    /// Derive the configuration reached over an epsilon-class transition,
    /// or `None` when the transition is not traversable here.
    fn epsilon_target(
        &mut self,
        config: &AtnConfig,
        trans: &Transition,
        collect_predicates: bool,
        in_context: bool,
        full_ctx: bool,
        treat_eof_as_epsilon: bool,
    ) -> Option<AtnConfig> {
        match &trans.label {
            TransitionLabel::Rule { follow, .. } => {
                let new_context = PredictionContext::singleton(config.context.clone(), *follow);
                Some(config.transit_with_context(trans.target, new_context))
            }
            TransitionLabel::Precedence(precedence) => {
                if collect_predicates && in_context {
                    if full_ctx {
                        // Full context can evaluate immediately.
                        self.host
                            .precpred(*precedence)
                            .then(|| config.transit(trans.target))
                    } else {
                        let pred = Arc::new(SemanticContext::PrecedencePredicate {
                            precedence: *precedence,
                        });
                        let sem = SemanticContext::and(&config.semantic_context, &pred);
                        Some(config.transit_with_semantic(trans.target, sem))
                    }
                } else {
                    Some(config.transit(trans.target))
                }
            }
            TransitionLabel::Predicate { rule, pred, ctx_dependent } => {
                if collect_predicates && (!ctx_dependent || in_context) {
                    if full_ctx {
                        let passed = self.host.sempred(
                            if *ctx_dependent { self.outer_context.as_ref() } else { None },
                            *rule,
                            *pred,
                        );
                        passed.then(|| config.transit(trans.target))
                    } else {
                        let p = Arc::new(SemanticContext::Predicate {
                            rule: *rule,
                            pred: *pred,
                            ctx_dependent: *ctx_dependent,
                        });
                        let sem = SemanticContext::and(&config.semantic_context, &p);
                        Some(config.transit_with_semantic(trans.target, sem))
                    }
                } else {
                    Some(config.transit(trans.target))
                }
            }
            TransitionLabel::Action { .. } | TransitionLabel::Epsilon => {
                Some(config.transit(trans.target))
            }
            _ => {
                // EOF behaves like epsilon once the real EOF reach step
                // has happened.
                (treat_eof_as_epsilon && trans.matches_eof())
                    .then(|| config.transit(trans.target))
            }
        }
    }

    /// Evaluate an accept state's predicate pairs against the outer
    /// context; returns the surviving alternatives.
    fn eval_semantic_contexts(&mut self, predicates: &[PredPrediction], complete: bool) -> BitSet {
        let mut predictions = BitSet::new();
        for pair in predicates {
            if pair.pred.is_none() {
                predictions.set(pair.alt);
                if !complete {
                    break;
                }
                continue;
            }
            if pair.pred.eval(self.host, self.outer_context.as_ref()) {
                predictions.set(pair.alt);
                if !complete {
                    break;
                }
            }
        }
        predictions
    }

    /// Best-effort recovery alternative when the reach dies: an
    /// alternative that made it out of the decision entry rule, preferring
    /// semantically valid configurations.
    fn syn_valid_or_sem_invalid_alt(&mut self, configs: &AtnConfigSet) -> usize {
        let mut valid: Vec<&AtnConfig> = Vec::new();
        let mut invalid: Vec<&AtnConfig> = Vec::new();
        for c in configs {
            if c.semantic_context.is_none() {
                valid.push(c);
            } else if c.semantic_context.eval(self.host, self.outer_context.as_ref()) {
                valid.push(c);
            } else {
                invalid.push(c);
            }
        }
        let alt = self.alt_that_finished_decision_entry_rule(&valid);
        if alt != INVALID_ALT {
            return alt;
        }
        self.alt_that_finished_decision_entry_rule(&invalid)
    }

    fn alt_that_finished_decision_entry_rule(&self, configs: &[&AtnConfig]) -> usize {
        let mut alts = BitSet::new();
        for c in configs {
            if c.reaches_into_outer_context > 0
                || (self.atn.state(c.state).is_rule_stop() && c.context.has_empty_path())
            {
                alts.set(c.alt);
            }
        }
        alts.min().unwrap_or(INVALID_ALT)
    }

    fn no_viable_alt(&mut self, dead_end: Arc<AtnConfigSet>, _t: i32) -> RecognitionError {
        RecognitionError::NoViableAlt {
            decision: self.dfa.decision,
            start_index: self.start_index,
            offending_index: self.input.index(),
            offending: self.input.lt(1).cloned(),
            dead_end: Some(dead_end),
        }
    }
}
