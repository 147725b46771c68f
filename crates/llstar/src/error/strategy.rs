//! Error strategies: how the parser reacts to recognition errors.
//!
//! [`DefaultErrorStrategy`] resynchronizes with single-token deletion,
//! single-token insertion (conjuring the missing token), and follow-set
//! recovery. [`BailErrorStrategy`] aborts on the first error.

use hashbrown::HashSet;

use crate::atn::state::StateId;
use crate::atn::{AtnStateKind, TransitionLabel};
use crate::error::RecognitionError;
use crate::interval::IntervalSet;
use crate::parser::{Parser, ParserHooks};
use crate::stream::TokenStream;
use crate::token::{Token, EOF, EPSILON};

/// Recovery policy consulted by the parser driver.
pub trait ErrorStrategy<S: TokenStream, H: ParserHooks> {
    /// Forget any recovery state (a fresh parse).
    fn reset(&mut self, parser: &mut Parser<S, H>);

    /// A token matched; leave error-recovery mode.
    fn report_match(&mut self, parser: &mut Parser<S, H>);

    /// Report `e` through the parser's listeners (once per error burst).
    fn report_error(&mut self, parser: &mut Parser<S, H>, e: &RecognitionError);

    /// Resynchronize after a reported error, typically by consuming until
    /// the follow set of the rule stack.
    fn recover(&mut self, parser: &mut Parser<S, H>, e: &RecognitionError)
        -> Result<(), RecognitionError>;

    /// Recover from a mismatch inside `match`: delete or conjure one
    /// token, or fail.
    fn recover_inline(&mut self, parser: &mut Parser<S, H>) -> Result<Token, RecognitionError>;

    /// Pre-emptive resynchronization at loop entries and block starts.
    fn sync(&mut self, parser: &mut Parser<S, H>) -> Result<(), RecognitionError>;

    fn in_error_recovery_mode(&self, parser: &Parser<S, H>) -> bool;
}

/// The standard recovery strategy.
#[derive(Debug, Default)]
pub struct DefaultErrorStrategy {
    error_recovery_mode: bool,
    last_error_index: Option<usize>,
    last_error_states: HashSet<StateId, ahash::RandomState>,
}

impl DefaultErrorStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn begin_error_condition(&mut self) {
        self.error_recovery_mode = true;
    }

    fn end_error_condition(&mut self) {
        self.error_recovery_mode = false;
        self.last_error_states.clear();
        self.last_error_index = None;
    }

    fn token_display(t: &Token) -> String {
        if t.ty == EOF {
            "<EOF>".to_owned()
        } else {
            format!("'{}'", t.text.escape_debug())
        }
    }

    /// Union of the follow sets along the rule invocation stack; the
    /// tokens that could legally continue an enclosing rule.
    fn error_recovery_set<S: TokenStream, H: ParserHooks>(parser: &Parser<S, H>) -> IntervalSet {
        let atn = parser.interp.atn.clone();
        let mut recover_set = IntervalSet::new();
        let mut ctx = parser.context().cloned();
        while let Some(c) = ctx {
            if c.is_root() {
                break;
            }
            let invoking = atn.state(c.invoking_state);
            let Some(TransitionLabel::Rule { follow, .. }) =
                invoking.transitions.first().map(|t| &t.label)
            else {
                break;
            };
            recover_set.add_set(&atn.next_tokens(*follow));
            ctx = c.parent.clone();
        }
        recover_set.remove(EPSILON);
        recover_set
    }

    fn consume_until<S: TokenStream, H: ParserHooks>(
        parser: &mut Parser<S, H>,
        set: &IntervalSet,
    ) {
        loop {
            let ttype = parser.input.la(1);
            if ttype == EOF || set.contains(ttype) {
                break;
            }
            parser.consume();
        }
    }

    /// If the *next* token is what the parser expects, the current one is
    /// extraneous: report it, delete it, and match the next.
    fn single_token_deletion<S: TokenStream, H: ParserHooks>(
        &mut self,
        parser: &mut Parser<S, H>,
    ) -> Option<Token> {
        let next_type = parser.input.la(2);
        let expecting = parser.expected_tokens();
        if !expecting.contains(next_type) {
            return None;
        }
        self.report_unwanted_token(parser);
        parser.consume();
        let matched = parser.current_token();
        self.report_match(parser);
        parser.consume();
        Some(matched)
    }

    /// If the current token would be accepted right after the expected
    /// one, the expected token is missing: report and conjure it.
    fn single_token_insertion<S: TokenStream, H: ParserHooks>(
        &mut self,
        parser: &mut Parser<S, H>,
    ) -> bool {
        let current_type = parser.input.la(1);
        let atn = parser.interp.atn.clone();
        let state = atn.state(parser.state());
        let Some(next) = state.transitions.first().map(|t| t.target) else {
            return false;
        };
        let expecting_at_ll2 = atn.expected_tokens(next, parser.context());
        if expecting_at_ll2.contains(current_type) {
            self.report_missing_token(parser);
            return true;
        }
        false
    }

    fn missing_symbol<S: TokenStream, H: ParserHooks>(parser: &mut Parser<S, H>) -> Token {
        let current = parser.current_token();
        let expecting = parser.expected_tokens();
        let expected_type = expecting.min_element().unwrap_or(crate::token::INVALID_TYPE);
        let text = format!("<missing {expected_type}>");
        // Conjured tokens carry an inverted range, like start index -1 in
        // serialized form; only line/column are meaningful.
        parser.token_factory().create(
            expected_type,
            Some(&text),
            "",
            crate::token::DEFAULT_CHANNEL,
            usize::MAX,
            0,
            current.line,
            current.column,
        )
    }

    fn report_unwanted_token<S: TokenStream, H: ParserHooks>(&mut self, parser: &mut Parser<S, H>) {
        if self.error_recovery_mode {
            return;
        }
        self.begin_error_condition();
        let t = parser.current_token();
        let msg = format!(
            "extraneous input {} expecting {}",
            Self::token_display(&t),
            parser.expected_tokens()
        );
        parser.notify_error_listeners(&msg, Some(&t), None);
    }

    fn report_missing_token<S: TokenStream, H: ParserHooks>(&mut self, parser: &mut Parser<S, H>) {
        if self.error_recovery_mode {
            return;
        }
        self.begin_error_condition();
        let t = parser.current_token();
        let msg = format!(
            "missing {} at {}",
            parser.expected_tokens(),
            Self::token_display(&t)
        );
        parser.notify_error_listeners(&msg, Some(&t), None);
    }
}

impl<S: TokenStream, H: ParserHooks> ErrorStrategy<S, H> for DefaultErrorStrategy {
    fn reset(&mut self, _parser: &mut Parser<S, H>) {
        self.end_error_condition();
    }

    fn report_match(&mut self, _parser: &mut Parser<S, H>) {
        self.end_error_condition();
    }

    fn report_error(&mut self, parser: &mut Parser<S, H>, e: &RecognitionError) {
        if self.error_recovery_mode {
            return;
        }
        self.begin_error_condition();
        let msg = match e {
            RecognitionError::NoViableAlt { offending, .. } => format!(
                "no viable alternative at input {}",
                offending.as_ref().map_or_else(|| "<EOF>".to_owned(), Self::token_display)
            ),
            RecognitionError::InputMismatch { offending, expected, .. } => format!(
                "mismatched input {} expecting {expected}",
                Self::token_display(offending)
            ),
            RecognitionError::FailedPredicate { rule, pred, .. } => {
                format!("rule {rule} failed predicate {pred}")
            }
            other => other.to_string(),
        };
        let offending = e.offending_token().cloned();
        parser.notify_error_listeners(&msg, offending.as_ref(), Some(e));
    }

    fn recover(
        &mut self,
        parser: &mut Parser<S, H>,
        _e: &RecognitionError,
    ) -> Result<(), RecognitionError> {
        // Seeing the same error at the same position twice means the
        // follow-set consume made no progress; force one token.
        if self.last_error_index == Some(parser.input.index())
            && self.last_error_states.contains(&parser.state())
        {
            parser.consume();
        }
        self.last_error_index = Some(parser.input.index());
        self.last_error_states.insert(parser.state());
        let follow_set = Self::error_recovery_set(parser);
        Self::consume_until(parser, &follow_set);
        Ok(())
    }

    fn recover_inline(&mut self, parser: &mut Parser<S, H>) -> Result<Token, RecognitionError> {
        if let Some(matched) = self.single_token_deletion(parser) {
            return Ok(matched);
        }
        if self.single_token_insertion(parser) {
            return Ok(Self::missing_symbol(parser));
        }
        Err(RecognitionError::InputMismatch {
            offending: parser.current_token(),
            expected: parser.expected_tokens(),
            state: parser.state(),
        })
    }

    fn sync(&mut self, parser: &mut Parser<S, H>) -> Result<(), RecognitionError> {
        if self.error_recovery_mode {
            return Ok(());
        }
        let atn = parser.interp.atn.clone();
        let state = atn.state(parser.state());
        let la = parser.input.la(1);
        let next_tokens = atn.next_tokens(parser.state());
        if next_tokens.contains(la) || next_tokens.contains(EPSILON) {
            return Ok(());
        }
        match state.kind {
            AtnStateKind::BlockStart { .. }
            | AtnStateKind::StarBlockStart { .. }
            | AtnStateKind::PlusBlockStart { .. }
            | AtnStateKind::PlusLoopBack
            | AtnStateKind::StarLoopEntry { .. }
            | AtnStateKind::StarLoopBack => {
                if self.single_token_deletion(parser).is_some() {
                    return Ok(());
                }
                Err(RecognitionError::InputMismatch {
                    offending: parser.current_token(),
                    expected: parser.expected_tokens(),
                    state: parser.state(),
                })
            }
            _ => Ok(()),
        }
    }

    fn in_error_recovery_mode(&self, _parser: &Parser<S, H>) -> bool {
        self.error_recovery_mode
    }
}

/// Strategy that turns the first recognition error into an unrecoverable
/// failure, for applications that two-stage parse (fast SLL attempt,
/// then full LL on failure).
#[derive(Debug, Default)]
pub struct BailErrorStrategy;

impl BailErrorStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl<S: TokenStream, H: ParserHooks> ErrorStrategy<S, H> for BailErrorStrategy {
    fn reset(&mut self, _parser: &mut Parser<S, H>) {}

    fn report_match(&mut self, _parser: &mut Parser<S, H>) {}

    fn report_error(&mut self, _parser: &mut Parser<S, H>, _e: &RecognitionError) {}

    fn recover(
        &mut self,
        _parser: &mut Parser<S, H>,
        e: &RecognitionError,
    ) -> Result<(), RecognitionError> {
        Err(e.clone())
    }

    fn recover_inline(&mut self, parser: &mut Parser<S, H>) -> Result<Token, RecognitionError> {
        Err(RecognitionError::InputMismatch {
            offending: parser.current_token(),
            expected: parser.expected_tokens(),
            state: parser.state(),
        })
    }

    fn sync(&mut self, _parser: &mut Parser<S, H>) -> Result<(), RecognitionError> {
        Ok(())
    }

    fn in_error_recovery_mode(&self, _parser: &Parser<S, H>) -> bool {
        false
    }
}
