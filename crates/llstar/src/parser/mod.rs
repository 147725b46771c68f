//! # The parser driver
//!
//! [`Parser`] is the glue a generated or hand-written recognizer runs on:
//! `match`/`consume`, rule entry and exit, the precedence stack for
//! left-recursive rules, error-listener dispatch, and delegation to
//! [`ParserAtnSimulator`] for every decision. It contains no prediction
//! logic of its own.

pub mod context;

use std::sync::Arc;

use crate::atn::state::{StateId, INVALID_STATE};
use crate::atn::Atn;
use crate::bitset::BitSet;
use crate::config::AtnConfigSet;
use crate::context::PredictionContextCache;
use crate::dfa::Dfa;
use crate::error::listener::{ConsoleErrorListener, ErrorListener};
use crate::error::strategy::{DefaultErrorStrategy, ErrorStrategy};
use crate::error::RecognitionError;
use crate::interval::IntervalSet;
use crate::semantic::PredicateEvaluator;
use crate::simulator::{decision_dfas, ParserAtnSimulator, PredictionHost};
use crate::stream::TokenStream;
use crate::token::{CommonTokenFactory, Token, TokenFactory};

use context::RuleContext;

/// User predicate bodies referenced by the grammar's ATN.
pub trait ParserHooks {
    /// Predicate `pred` of `rule`; `ctx` is the call stack for
    /// context-dependent predicates.
    fn sempred(&mut self, ctx: Option<&Arc<RuleContext>>, rule: usize, pred: usize) -> bool {
        let _ = (ctx, rule, pred);
        true
    }
}

/// Hooks for grammars without predicates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoParserHooks;

impl ParserHooks for NoParserHooks {}

/// A recognizer driving one token stream.
pub struct Parser<S: TokenStream, H: ParserHooks = NoParserHooks> {
    pub input: S,
    pub interp: ParserAtnSimulator,
    hooks: H,
    ctx: Option<Arc<RuleContext>>,
    state: StateId,
    precedence_stack: Vec<i32>,
    error_handler: Option<Box<dyn ErrorStrategy<S, H>>>,
    listeners: Vec<Arc<dyn ErrorListener>>,
    syntax_errors: usize,
    factory: Arc<dyn TokenFactory>,
}

impl<S: TokenStream> Parser<S, NoParserHooks> {
    /// Parser with private DFAs and the default error strategy.
    #[must_use]
    pub fn new(input: S, atn: Arc<Atn>) -> Self {
        Self::with_hooks(input, atn, NoParserHooks)
    }
}

impl<S: TokenStream, H: ParserHooks> Parser<S, H> {
    #[must_use]
    pub fn with_hooks(input: S, atn: Arc<Atn>, hooks: H) -> Self {
        let dfas = Arc::new(decision_dfas(&atn));
        let cache = Arc::new(PredictionContextCache::new());
        Self::with_shared(input, atn, dfas, cache, hooks)
    }

    /// Parser sharing DFAs and the context cache with other instances for
    /// the same grammar.
    #[must_use]
    pub fn with_shared(
        input: S,
        atn: Arc<Atn>,
        decision_to_dfa: Arc<Vec<Dfa>>,
        cache: Arc<PredictionContextCache>,
        hooks: H,
    ) -> Self {
        Self {
            input,
            interp: ParserAtnSimulator::new(atn, decision_to_dfa, cache),
            hooks,
            ctx: None,
            state: INVALID_STATE,
            precedence_stack: vec![0],
            error_handler: Some(Box::new(DefaultErrorStrategy::new())),
            listeners: vec![Arc::new(ConsoleErrorListener)],
            syntax_errors: 0,
            factory: Arc::new(CommonTokenFactory),
        }
    }

    pub fn set_error_handler(&mut self, handler: Box<dyn ErrorStrategy<S, H>>) {
        self.error_handler = Some(handler);
    }

    pub fn add_error_listener(&mut self, listener: Arc<dyn ErrorListener>) {
        self.listeners.push(listener);
    }

    pub fn remove_error_listeners(&mut self) {
        self.listeners.clear();
    }

    #[must_use]
    pub const fn state(&self) -> StateId {
        self.state
    }

    /// Record the ATN state the generated code is at; drives expected-token
    /// computation and recovery.
    pub fn set_state(&mut self, state: StateId) {
        self.state = state;
    }

    #[must_use]
    pub const fn context(&self) -> Option<&Arc<RuleContext>> {
        self.ctx.as_ref()
    }

    #[must_use]
    pub const fn number_of_syntax_errors(&self) -> usize {
        self.syntax_errors
    }

    #[must_use]
    pub fn token_factory(&self) -> Arc<dyn TokenFactory> {
        self.factory.clone()
    }

    /// The token `LT(1)`.
    pub fn current_token(&mut self) -> Token {
        self.input
            .lt(1)
            .cloned()
            .unwrap_or_else(|| Token::eof(0, 1, 0))
    }

    /// Match and consume `ty`, or hand the mismatch to the error strategy
    /// (which may delete or conjure a token).
    pub fn match_token(&mut self, ty: i32) -> Result<Token, RecognitionError> {
        let t = self.current_token();
        if t.ty == ty {
            self.with_strategy(|s, p| {
                s.report_match(p);
                Ok::<(), RecognitionError>(())
            })?;
            self.consume();
            return Ok(t);
        }
        self.with_strategy(|s, p| s.recover_inline(p))
    }

    /// Consume the current token and return it.
    pub fn consume(&mut self) -> Token {
        let t = self.current_token();
        self.input.consume();
        t
    }

    pub fn enter_rule(&mut self, state: StateId, rule_index: usize) {
        let invoking = self.state;
        self.ctx = Some(match self.ctx.take() {
            Some(parent) => RuleContext::child(parent, invoking, rule_index),
            None => RuleContext::root(rule_index),
        });
        self.state = state;
    }

    pub fn exit_rule(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.state = ctx.invoking_state;
            self.ctx = ctx.parent.clone();
        }
    }

    /// Enter a left-recursive rule at `precedence`.
    pub fn enter_recursion_rule(&mut self, state: StateId, rule_index: usize, precedence: i32) {
        self.precedence_stack.push(precedence);
        self.enter_rule(state, rule_index);
    }

    /// Leave a left-recursive rule, restoring the caller's precedence.
    pub fn unroll_recursion_context(&mut self) {
        self.precedence_stack.pop();
        self.exit_rule();
    }

    /// `{precedence >= current}?`, the predicate left-recursive loop
    /// alternatives are gated by.
    #[must_use]
    pub fn precpred(&self, precedence: i32) -> bool {
        precedence >= self.precedence_stack.last().copied().unwrap_or(0)
    }

    #[must_use]
    pub fn precedence(&self) -> i32 {
        self.precedence_stack.last().copied().unwrap_or(-1)
    }

    /// Resolve `decision` via the prediction engine.
    pub fn adaptive_predict(&mut self, decision: usize) -> Result<usize, RecognitionError> {
        let Self { input, interp, hooks, precedence_stack, listeners, ctx, .. } = self;
        let mut host = DriverHost {
            hooks,
            precedence_stack: precedence_stack.as_slice(),
            listeners: listeners.as_slice(),
        };
        interp.adaptive_predict(input, decision, ctx.as_ref(), &mut host)
    }

    /// Tokens acceptable at the current state given the rule stack.
    #[must_use]
    pub fn expected_tokens(&self) -> IntervalSet {
        self.interp.atn.expected_tokens(self.state, self.ctx.as_ref())
    }

    /// Hand a recognition error to the strategy for between-token
    /// recovery.
    pub fn recover(&mut self, e: &RecognitionError) -> Result<(), RecognitionError> {
        self.with_strategy(|s, p| {
            s.report_error(p, e);
            s.recover(p, e)
        })
    }

    /// Strategy sync point, called at loop entries and block starts.
    pub fn sync(&mut self) -> Result<(), RecognitionError> {
        self.with_strategy(|s, p| s.sync(p))
    }

    /// Report `e` through the strategy without recovering.
    pub fn report_error(&mut self, e: &RecognitionError) {
        self.with_strategy(|s, p| {
            s.report_error(p, e);
        });
    }

    /// Count and dispatch a syntax error to the listeners.
    pub fn notify_error_listeners(
        &mut self,
        msg: &str,
        offending: Option<&Token>,
        e: Option<&RecognitionError>,
    ) {
        self.syntax_errors += 1;
        let (line, column) = offending.map_or((0, 0), |t| (t.line, t.column));
        for listener in &self.listeners {
            listener.syntax_error(offending, line, column, msg, e);
        }
    }

    fn with_strategy<R>(
        &mut self,
        f: impl FnOnce(&mut dyn ErrorStrategy<S, H>, &mut Self) -> R,
    ) -> R {
        let mut handler: Box<dyn ErrorStrategy<S, H>> = match self.error_handler.take() {
            Some(h) => h,
            None => Box::new(DefaultErrorStrategy::new()),
        };
        let result = f(handler.as_mut(), self);
        self.error_handler = Some(handler);
        result
    }
}

/// Adapter exposing the parser's predicate hooks, precedence stack, and
/// listeners to the prediction engine.
struct DriverHost<'a, H: ParserHooks> {
    hooks: &'a mut H,
    precedence_stack: &'a [i32],
    listeners: &'a [Arc<dyn ErrorListener>],
}

impl<H: ParserHooks> PredicateEvaluator for DriverHost<'_, H> {
    fn sempred(&mut self, ctx: Option<&Arc<RuleContext>>, rule: usize, pred: usize) -> bool {
        self.hooks.sempred(ctx, rule, pred)
    }

    fn precpred(&self, precedence: i32) -> bool {
        precedence >= self.precedence_stack.last().copied().unwrap_or(0)
    }
}

impl<H: ParserHooks> PredictionHost for DriverHost<'_, H> {
    fn precedence(&self) -> i32 {
        self.precedence_stack.last().copied().unwrap_or(-1)
    }

    fn report_attempting_full_context(
        &mut self,
        dfa: &Dfa,
        conflicting_alts: &BitSet,
        configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
        for l in self.listeners {
            l.report_attempting_full_context(dfa, conflicting_alts, configs, start_index, stop_index);
        }
    }

    fn report_context_sensitivity(
        &mut self,
        dfa: &Dfa,
        prediction: usize,
        configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
        for l in self.listeners {
            l.report_context_sensitivity(dfa, prediction, configs, start_index, stop_index);
        }
    }

    fn report_ambiguity(
        &mut self,
        dfa: &Dfa,
        start_index: usize,
        stop_index: usize,
        exact: bool,
        ambig_alts: &BitSet,
        configs: &AtnConfigSet,
    ) {
        for l in self.listeners {
            l.report_ambiguity(dfa, start_index, stop_index, exact, ambig_alts, configs);
        }
    }
}
