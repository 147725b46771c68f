//! # The lexer driver
//!
//! [`Lexer`] owns a character stream and a [`LexerAtnSimulator`] and
//! turns longest matches into tokens: it loops over `match_token`,
//! runs the winning rule's actions, honors `skip`/`more`, maintains the
//! mode stack, and emits through a [`TokenFactory`].
//!
//! Recognition errors are reported to the error listeners and recovered
//! by consuming one character; only protocol misuse (an action popping
//! the empty mode stack) escapes [`Lexer::next_token`] as an error.

pub mod action;

use compact_str::CompactString;
use std::sync::Arc;

use crate::atn::Atn;
use crate::context::PredictionContextCache;
use crate::dfa::Dfa;
use crate::error::listener::{ConsoleErrorListener, ErrorListener};
use crate::error::{IllegalStateError, RecognitionError};
use crate::semantic::PredicateEvaluator;
use crate::simulator::{mode_dfas, LexerAtnSimulator};
use crate::stream::{CharStream, TokenSource};
use crate::token::{
    CommonTokenFactory, Token, TokenFactory, DEFAULT_CHANNEL, EOF, INVALID_TYPE,
};

use action::{LexerActionSink, LexerHooks};

/// The mode every lexer starts in.
pub const DEFAULT_MODE: usize = 0;

/// Pseudo token type: continue the current token into the next rule.
pub const MORE: i32 = -2;

/// Pseudo token type: drop the current token and rescan.
pub const SKIP: i32 = -3;

/// A lexer driving one char stream. `H` supplies predicate evaluation and
/// custom action bodies for generated/hand-written grammars.
pub struct Lexer<S: CharStream, H: LexerHooks = NoLexerHooks> {
    input: S,
    pub sim: LexerAtnSimulator,
    hooks: H,
    factory: Arc<dyn TokenFactory>,
    listeners: Vec<Arc<dyn ErrorListener>>,
    mode: usize,
    mode_stack: Vec<usize>,
    token_start_index: usize,
    token_start_line: u32,
    token_start_column: u32,
    hit_eof: bool,
    ty: i32,
    channel: usize,
    text_override: Option<CompactString>,
    name: String,
}

/// Hooks for lexers without predicates or custom actions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLexerHooks;

impl PredicateEvaluator for NoLexerHooks {}
impl LexerHooks for NoLexerHooks {}

impl<S: CharStream> Lexer<S, NoLexerHooks> {
    /// Lexer with private DFAs and the default token factory.
    #[must_use]
    pub fn new(input: S, atn: Arc<Atn>) -> Self {
        Self::with_hooks(input, atn, NoLexerHooks)
    }
}

impl<S: CharStream, H: LexerHooks> Lexer<S, H> {
    #[must_use]
    pub fn with_hooks(input: S, atn: Arc<Atn>, hooks: H) -> Self {
        let dfas = Arc::new(mode_dfas(&atn));
        let cache = Arc::new(PredictionContextCache::new());
        Self::with_shared(input, atn, dfas, cache, hooks)
    }

    /// Lexer sharing DFAs and the context cache with other instances for
    /// the same grammar.
    #[must_use]
    pub fn with_shared(
        input: S,
        atn: Arc<Atn>,
        decision_to_dfa: Arc<Vec<Dfa>>,
        cache: Arc<PredictionContextCache>,
        hooks: H,
    ) -> Self {
        let name = input.source_name().to_owned();
        Self {
            input,
            sim: LexerAtnSimulator::new(atn, decision_to_dfa, cache),
            hooks,
            factory: Arc::new(CommonTokenFactory),
            listeners: vec![Arc::new(ConsoleErrorListener)],
            mode: DEFAULT_MODE,
            mode_stack: Vec::new(),
            token_start_index: 0,
            token_start_line: 1,
            token_start_column: 0,
            hit_eof: false,
            ty: INVALID_TYPE,
            channel: DEFAULT_CHANNEL,
            text_override: None,
            name,
        }
    }

    pub fn set_token_factory(&mut self, factory: Arc<dyn TokenFactory>) {
        self.factory = factory;
    }

    pub fn add_error_listener(&mut self, listener: Arc<dyn ErrorListener>) {
        self.listeners.push(listener);
    }

    pub fn remove_error_listeners(&mut self) {
        self.listeners.clear();
    }

    #[must_use]
    pub const fn mode(&self) -> usize {
        self.mode
    }

    pub fn set_mode(&mut self, mode: usize) {
        self.mode = mode;
    }

    pub fn push_mode(&mut self, mode: usize) {
        self.mode_stack.push(self.mode);
        self.mode = mode;
    }

    /// Restore the previous mode. Popping with nothing pushed is protocol
    /// misuse.
    pub fn pop_mode(&mut self) -> Result<usize, IllegalStateError> {
        let previous = self.mode_stack.pop().ok_or(IllegalStateError::EmptyModeStack)?;
        self.mode = previous;
        Ok(previous)
    }

    #[must_use]
    pub fn input(&self) -> &S {
        &self.input
    }

    /// The next token on any channel.
    pub fn next_token(&mut self) -> Result<Token, RecognitionError> {
        let marker = self.input.mark();
        let result = self.next_token_inner();
        self.input.release(marker);
        result
    }

    fn next_token_inner(&mut self) -> Result<Token, RecognitionError> {
        'outer: loop {
            if self.hit_eof {
                return Ok(self.emit_eof());
            }
            self.token_start_index = self.input.index();
            self.token_start_line = self.sim.line;
            self.token_start_column = self.sim.column;
            self.text_override = None;
            self.channel = DEFAULT_CHANNEL;
            loop {
                self.ty = INVALID_TYPE;
                let ttype = match self.sim.match_token(&mut self.input, self.mode, &mut self.hooks)
                {
                    Ok(matched) => {
                        if let Some(executor) = &matched.executor {
                            let stop_index = self.input.index();
                            let mut sink = DriverSink {
                                ty: &mut self.ty,
                                channel: &mut self.channel,
                                mode: &mut self.mode,
                                mode_stack: &mut self.mode_stack,
                                hooks: &mut self.hooks,
                            };
                            executor.execute(&mut sink, self.token_start_index, stop_index)?;
                        }
                        matched.token_type
                    }
                    Err(e @ RecognitionError::LexerNoViableAlt { .. }) => {
                        self.notify_listeners(&e);
                        self.recover();
                        SKIP
                    }
                    Err(e) => return Err(e),
                };
                if self.input.la(1) == EOF {
                    self.hit_eof = true;
                }
                if self.ty == INVALID_TYPE {
                    self.ty = ttype;
                }
                if self.ty == SKIP {
                    continue 'outer;
                }
                if self.ty != MORE {
                    break;
                }
            }
            if self.ty == EOF {
                return Ok(self.emit_eof());
            }
            return Ok(self.emit());
        }
    }

    fn emit(&mut self) -> Token {
        let stop = self.input.index().saturating_sub(1);
        let source_text = self.input.text(self.token_start_index, stop);
        self.factory.create(
            self.ty,
            self.text_override.as_deref(),
            &source_text,
            self.channel,
            self.token_start_index,
            stop,
            self.token_start_line,
            self.token_start_column,
        )
    }

    fn emit_eof(&mut self) -> Token {
        Token::eof(self.input.index(), self.sim.line, self.sim.column)
    }

    /// Consume a single character so the scan can make progress after an
    /// unmatchable prefix.
    fn recover(&mut self) {
        if self.input.la(1) != EOF {
            self.sim.consume(&mut self.input);
        }
    }

    fn notify_listeners(&self, e: &RecognitionError) {
        let text = self
            .input
            .text(self.token_start_index, self.input.index());
        let msg = format!("token recognition error at: '{}'", text.escape_debug());
        for listener in &self.listeners {
            listener.syntax_error(
                None,
                self.token_start_line,
                self.token_start_column,
                &msg,
                Some(e),
            );
        }
    }
}

impl<S: CharStream, H: LexerHooks> TokenSource for Lexer<S, H> {
    fn next_token(&mut self) -> Result<Token, RecognitionError> {
        Lexer::next_token(self)
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// The action sink the driver hands to the executor: mutates the pending
/// token's fields and the mode stack.
struct DriverSink<'a, H: LexerHooks> {
    ty: &'a mut i32,
    channel: &'a mut usize,
    mode: &'a mut usize,
    mode_stack: &'a mut Vec<usize>,
    hooks: &'a mut H,
}

impl<H: LexerHooks> LexerActionSink for DriverSink<'_, H> {
    fn set_type(&mut self, ty: i32) {
        *self.ty = ty;
    }

    fn set_channel(&mut self, channel: usize) {
        *self.channel = channel;
    }

    fn set_mode(&mut self, mode: usize) {
        *self.mode = mode;
    }

    fn push_mode(&mut self, mode: usize) {
        self.mode_stack.push(*self.mode);
        *self.mode = mode;
    }

    fn pop_mode(&mut self) -> Result<(), IllegalStateError> {
        let previous = self.mode_stack.pop().ok_or(IllegalStateError::EmptyModeStack)?;
        *self.mode = previous;
        Ok(())
    }

    fn skip(&mut self) {
        *self.ty = SKIP;
    }

    fn more(&mut self) {
        *self.ty = MORE;
    }

    fn custom_action(&mut self, rule: usize, action: usize, input_index: usize) {
        self.hooks.custom_action(rule, action, input_index);
    }
}
