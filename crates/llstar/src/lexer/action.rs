//! Lexer actions and their ordered executor.
//!
//! Actions collected along an accepting path run only when the rule
//! actually wins the longest-match race. Position-dependent actions are
//! wrapped with the offset (relative to the token start) at which they
//! were collected, so DFA states stay shareable between tokens of
//! different absolute positions.

use smallvec::SmallVec;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::IllegalStateError;
use crate::semantic::PredicateEvaluator;

/// What a grammar embeds into its lexer: predicate bodies and custom
/// action bodies.
pub trait LexerHooks: PredicateEvaluator {
    /// Body of user action `action` of `rule`, run at `input_index`.
    fn custom_action(&mut self, rule: usize, action: usize, input_index: usize) {
        let _ = (rule, action, input_index);
    }
}

/// A single lexer command or custom action reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LexerAction {
    Skip,
    More,
    /// Override the emitted token type.
    Type(i32),
    /// Route the token to a channel.
    Channel(usize),
    Mode(usize),
    PushMode(usize),
    PopMode,
    /// User action `action` of `rule`; executed at the input position it
    /// was collected at.
    Custom { rule: usize, action: usize },
    /// A position-dependent action pinned to `offset` characters past the
    /// token start.
    Indexed { offset: usize, action: usize, rule: usize },
}

impl LexerAction {
    /// Whether execution depends on the input position (and therefore
    /// needs offset fixing when collected mid-token).
    #[must_use]
    pub const fn is_position_dependent(&self) -> bool {
        matches!(self, Self::Custom { .. } | Self::Indexed { .. })
    }
}

/// What a lexer action is allowed to do to the lexer while executing.
pub trait LexerActionSink {
    fn set_type(&mut self, ty: i32);
    fn set_channel(&mut self, channel: usize);
    fn set_mode(&mut self, mode: usize);
    fn push_mode(&mut self, mode: usize);
    fn pop_mode(&mut self) -> Result<(), IllegalStateError>;
    fn skip(&mut self);
    fn more(&mut self);
    /// User action hook; `input_index` is the stream position the action
    /// was collected at.
    fn custom_action(&mut self, rule: usize, action: usize, input_index: usize);
}

/// An ordered list of actions attached to an accepting configuration.
#[derive(Debug, Clone)]
pub struct LexerActionExecutor {
    actions: SmallVec<[LexerAction; 2]>,
    hash: u64,
}

impl LexerActionExecutor {
    #[must_use]
    pub fn new(actions: SmallVec<[LexerAction; 2]>) -> Arc<Self> {
        let mut h = ahash::AHasher::default();
        actions.hash(&mut h);
        Arc::new(Self { hash: h.finish(), actions })
    }

    /// Executor running `prefix`'s actions followed by `action`.
    #[must_use]
    pub fn append(prefix: Option<&Arc<Self>>, action: LexerAction) -> Arc<Self> {
        let mut actions: SmallVec<[LexerAction; 2]> =
            prefix.map(|p| p.actions.clone()).unwrap_or_default();
        actions.push(action);
        Self::new(actions)
    }

    /// Pin every position-dependent action that is not already pinned to
    /// `offset`. Returns `self` unchanged when nothing needed fixing.
    #[must_use]
    pub fn fix_offset_before_match(self: &Arc<Self>, offset: usize) -> Arc<Self> {
        let mut updated: Option<SmallVec<[LexerAction; 2]>> = None;
        for (i, a) in self.actions.iter().enumerate() {
            if let LexerAction::Custom { rule, action } = *a {
                updated
                    .get_or_insert_with(|| self.actions.clone())
                    [i] = LexerAction::Indexed { offset, action, rule };
            }
        }
        match updated {
            Some(actions) => Self::new(actions),
            None => self.clone(),
        }
    }

    #[must_use]
    pub fn actions(&self) -> &[LexerAction] {
        &self.actions
    }

    /// Run the actions against `sink`.
    ///
    /// `start_index` is the char-stream index of the token start; indexed
    /// actions report `start_index + offset` as their execution position,
    /// plain actions the token stop position `stop_index`.
    pub fn execute<S: LexerActionSink + ?Sized>(
        &self,
        sink: &mut S,
        start_index: usize,
        stop_index: usize,
    ) -> Result<(), IllegalStateError> {
        for action in &self.actions {
            match *action {
                LexerAction::Skip => sink.skip(),
                LexerAction::More => sink.more(),
                LexerAction::Type(ty) => sink.set_type(ty),
                LexerAction::Channel(ch) => sink.set_channel(ch),
                LexerAction::Mode(m) => sink.set_mode(m),
                LexerAction::PushMode(m) => sink.push_mode(m),
                LexerAction::PopMode => sink.pop_mode()?,
                LexerAction::Custom { rule, action } => {
                    sink.custom_action(rule, action, stop_index);
                }
                LexerAction::Indexed { offset, action, rule } => {
                    sink.custom_action(rule, action, start_index + offset);
                }
            }
        }
        Ok(())
    }
}

impl PartialEq for LexerActionExecutor {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.actions == other.actions
    }
}

impl Eq for LexerActionExecutor {}

impl Hash for LexerActionExecutor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}
