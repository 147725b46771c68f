//! ATN wire codec.
//!
//! A version-tagged flat `u32` encoding of the ATN graph, for embedding
//! generated grammars as data. The format is a contract of this crate:
//! magic, version, grammar header, rule table, state table (with inline
//! transitions and interval sets), decision list, mode list, lexer action
//! table. Decoding re-validates every graph invariant, so a corrupt or
//! hostile payload fails with [`AtnError`] rather than producing a
//! malformed graph.

use smallvec::SmallVec;
use std::sync::Arc;

use crate::atn::state::{AtnState, AtnStateKind, StateId};
use crate::atn::transition::{Transition, TransitionLabel};
use crate::atn::{Atn, GrammarKind};
use crate::error::AtnError;
use crate::interval::IntervalSet;
use crate::lexer::action::LexerAction;

/// `b"LLSR"` interpreted big-endian.
pub const MAGIC: u32 = 0x4C4C_5352;

/// Current serialization version.
pub const VERSION: u32 = 1;

/// Serialize an ATN to the flat word format.
#[must_use]
pub fn serialize(atn: &Atn) -> Vec<u32> {
    let mut out = Writer::default();
    out.word(MAGIC);
    out.word(VERSION);
    out.word(match atn.kind {
        GrammarKind::Lexer => 0,
        GrammarKind::Parser => 1,
    });
    out.int(atn.max_token_type);

    out.len(atn.rule_to_start.len());
    for rule in 0..atn.rule_to_start.len() {
        out.int(atn.rule_to_token_type[rule]);
    }

    out.len(atn.states.len());
    for state in &atn.states {
        out.state(state);
    }

    out.len(atn.decision_to_state.len());
    for &sid in &atn.decision_to_state {
        out.id(sid);
    }

    out.len(atn.mode_to_start.len());
    for &sid in &atn.mode_to_start {
        out.id(sid);
    }

    out.len(atn.lexer_actions.len());
    for action in &atn.lexer_actions {
        out.action(*action);
    }

    out.words
}

/// Deserialize an ATN, re-establishing every §3 graph invariant.
pub fn deserialize(data: &[u32]) -> Result<Arc<Atn>, AtnError> {
    let mut r = Reader { data, at: 0 };
    let magic = r.word()?;
    if magic != MAGIC {
        return Err(AtnError::BadMagic { found: magic });
    }
    let version = r.word()?;
    if version != VERSION {
        return Err(AtnError::UnsupportedVersion { version });
    }
    let kind = match r.word()? {
        0 => GrammarKind::Lexer,
        1 => GrammarKind::Parser,
        tag => return Err(AtnError::BadTag { at: r.at - 1, tag }),
    };
    let max_token_type = r.int()?;

    let num_rules = r.len()?;
    let mut rule_to_token_type = Vec::with_capacity(num_rules);
    for _ in 0..num_rules {
        rule_to_token_type.push(r.int()?);
    }

    let num_states = r.len()?;
    let mut states = Vec::with_capacity(num_states);
    let mut rule_to_start = vec![usize::MAX; num_rules];
    let mut rule_to_stop = vec![usize::MAX; num_rules];
    for id in 0..num_states {
        let state = r.state(id)?;
        match state.kind {
            AtnStateKind::RuleStart { .. } if state.rule < num_rules => {
                rule_to_start[state.rule] = id;
            }
            AtnStateKind::RuleStop if state.rule < num_rules => {
                rule_to_stop[state.rule] = id;
            }
            _ => {}
        }
        states.push(state);
    }

    let num_decisions = r.len()?;
    let mut decision_to_state = Vec::with_capacity(num_decisions);
    for decision in 0..num_decisions {
        let sid = r.id()?;
        if let Some(state) = states.get_mut(sid) {
            state.decision = Some(decision);
        }
        decision_to_state.push(sid);
    }

    let num_modes = r.len()?;
    let mut mode_to_start = Vec::with_capacity(num_modes);
    for _ in 0..num_modes {
        mode_to_start.push(r.id()?);
    }

    let num_actions = r.len()?;
    let mut lexer_actions = Vec::with_capacity(num_actions);
    for _ in 0..num_actions {
        lexer_actions.push(r.action()?);
    }

    Atn::validated(Atn {
        kind,
        states,
        decision_to_state,
        rule_to_start,
        rule_to_stop,
        rule_to_token_type,
        lexer_actions,
        mode_to_start,
        max_token_type,
        follow_links: Vec::new(),
    })
}

#[derive(Default)]
struct Writer {
    words: Vec<u32>,
}

#[allow(clippy::cast_possible_truncation)] // state counts and ids fit u32 by construction
impl Writer {
    fn word(&mut self, w: u32) {
        self.words.push(w);
    }

    fn int(&mut self, v: i32) {
        self.words.push(v.cast_unsigned());
    }

    fn len(&mut self, n: usize) {
        self.words.push(n as u32);
    }

    fn id(&mut self, id: StateId) {
        self.words.push(id as u32);
    }

    fn flag(&mut self, b: bool) {
        self.words.push(u32::from(b));
    }

    fn state(&mut self, state: &AtnState) {
        match state.kind {
            AtnStateKind::Basic => self.word(0),
            AtnStateKind::RuleStart { stop_state, is_left_recursive } => {
                self.word(1);
                self.id(stop_state);
                self.flag(is_left_recursive);
            }
            AtnStateKind::RuleStop => self.word(2),
            AtnStateKind::BlockStart { end_state } => {
                self.word(3);
                self.id(end_state);
            }
            AtnStateKind::BlockEnd { start_state } => {
                self.word(4);
                self.id(start_state);
            }
            AtnStateKind::PlusBlockStart { end_state, loopback } => {
                self.word(5);
                self.id(end_state);
                self.id(loopback);
            }
            AtnStateKind::PlusLoopBack => self.word(6),
            AtnStateKind::StarBlockStart { end_state } => {
                self.word(7);
                self.id(end_state);
            }
            AtnStateKind::StarLoopEntry { loopback, is_precedence_decision } => {
                self.word(8);
                self.id(loopback);
                self.flag(is_precedence_decision);
            }
            AtnStateKind::StarLoopBack => self.word(9),
            AtnStateKind::TokensStart => self.word(10),
            AtnStateKind::LoopEnd { loopback } => {
                self.word(11);
                self.id(loopback);
            }
        }
        self.len(state.rule);
        self.flag(state.non_greedy);
        self.len(state.transitions.len());
        for t in &state.transitions {
            self.transition(t);
        }
    }

    fn transition(&mut self, t: &Transition) {
        match &t.label {
            TransitionLabel::Epsilon => self.word(0),
            TransitionLabel::Range { from, to } => {
                self.word(1);
                self.int(*from);
                self.int(*to);
            }
            TransitionLabel::Rule { rule, precedence, follow } => {
                self.word(2);
                self.len(*rule);
                self.int(*precedence);
                self.id(*follow);
            }
            TransitionLabel::Predicate { rule, pred, ctx_dependent } => {
                self.word(3);
                self.len(*rule);
                self.len(*pred);
                self.flag(*ctx_dependent);
            }
            TransitionLabel::Action { rule, action, ctx_dependent } => {
                self.word(4);
                self.len(*rule);
                self.len(*action);
                self.flag(*ctx_dependent);
            }
            TransitionLabel::Set(set) => {
                self.word(5);
                self.set(set);
            }
            TransitionLabel::NotSet(set) => {
                self.word(6);
                self.set(set);
            }
            TransitionLabel::Wildcard => self.word(7),
            TransitionLabel::Precedence(precedence) => {
                self.word(8);
                self.int(*precedence);
            }
        }
        self.id(t.target);
    }

    fn set(&mut self, set: &IntervalSet) {
        self.len(set.intervals().len());
        for iv in set.intervals() {
            self.int(iv.a);
            self.int(iv.b);
        }
    }

    fn action(&mut self, action: LexerAction) {
        match action {
            LexerAction::Skip => self.words.extend([0, 0, 0, 0]),
            LexerAction::More => self.words.extend([1, 0, 0, 0]),
            LexerAction::Type(ty) => {
                self.word(2);
                self.int(ty);
                self.words.extend([0, 0]);
            }
            LexerAction::Channel(ch) => {
                self.word(3);
                self.len(ch);
                self.words.extend([0, 0]);
            }
            LexerAction::Mode(m) => {
                self.word(4);
                self.len(m);
                self.words.extend([0, 0]);
            }
            LexerAction::PushMode(m) => {
                self.word(5);
                self.len(m);
                self.words.extend([0, 0]);
            }
            LexerAction::PopMode => self.words.extend([6, 0, 0, 0]),
            LexerAction::Custom { rule, action } => {
                self.word(7);
                self.len(rule);
                self.len(action);
                self.word(0);
            }
            LexerAction::Indexed { offset, action, rule } => {
                self.word(8);
                self.len(offset);
                self.len(action);
                self.len(rule);
            }
        }
    }
}

struct Reader<'a> {
    data: &'a [u32],
    at: usize,
}

impl Reader<'_> {
    fn word(&mut self) -> Result<u32, AtnError> {
        let w = self.data.get(self.at).copied().ok_or(AtnError::Truncated)?;
        self.at += 1;
        Ok(w)
    }

    fn int(&mut self) -> Result<i32, AtnError> {
        Ok(self.word()?.cast_signed())
    }

    fn len(&mut self) -> Result<usize, AtnError> {
        Ok(self.word()? as usize)
    }

    fn id(&mut self) -> Result<StateId, AtnError> {
        self.len()
    }

    fn flag(&mut self) -> Result<bool, AtnError> {
        Ok(self.word()? != 0)
    }

    fn state(&mut self, id: usize) -> Result<AtnState, AtnError> {
        let tag = self.word()?;
        let kind = match tag {
            0 => AtnStateKind::Basic,
            1 => AtnStateKind::RuleStart {
                stop_state: self.id()?,
                is_left_recursive: self.flag()?,
            },
            2 => AtnStateKind::RuleStop,
            3 => AtnStateKind::BlockStart { end_state: self.id()? },
            4 => AtnStateKind::BlockEnd { start_state: self.id()? },
            5 => AtnStateKind::PlusBlockStart {
                end_state: self.id()?,
                loopback: self.id()?,
            },
            6 => AtnStateKind::PlusLoopBack,
            7 => AtnStateKind::StarBlockStart { end_state: self.id()? },
            8 => AtnStateKind::StarLoopEntry {
                loopback: self.id()?,
                is_precedence_decision: self.flag()?,
            },
            9 => AtnStateKind::StarLoopBack,
            10 => AtnStateKind::TokensStart,
            11 => AtnStateKind::LoopEnd { loopback: self.id()? },
            tag => return Err(AtnError::BadTag { at: self.at - 1, tag }),
        };
        let rule = self.len()?;
        let non_greedy = self.flag()?;
        let num_transitions = self.len()?;
        let mut transitions = SmallVec::with_capacity(num_transitions);
        for _ in 0..num_transitions {
            transitions.push(self.transition()?);
        }
        let mut state = AtnState::new(id, rule, kind);
        state.non_greedy = non_greedy;
        state.transitions = transitions;
        Ok(state)
    }

    fn transition(&mut self) -> Result<Transition, AtnError> {
        let tag = self.word()?;
        let label = match tag {
            0 => TransitionLabel::Epsilon,
            1 => TransitionLabel::Range { from: self.int()?, to: self.int()? },
            2 => TransitionLabel::Rule {
                rule: self.len()?,
                precedence: self.int()?,
                follow: self.id()?,
            },
            3 => TransitionLabel::Predicate {
                rule: self.len()?,
                pred: self.len()?,
                ctx_dependent: self.flag()?,
            },
            4 => TransitionLabel::Action {
                rule: self.len()?,
                action: self.len()?,
                ctx_dependent: self.flag()?,
            },
            5 => TransitionLabel::Set(Arc::new(self.set()?)),
            6 => TransitionLabel::NotSet(Arc::new(self.set()?)),
            7 => TransitionLabel::Wildcard,
            8 => TransitionLabel::Precedence(self.int()?),
            tag => return Err(AtnError::BadTag { at: self.at - 1, tag }),
        };
        let target = self.id()?;
        Ok(Transition::new(target, label))
    }

    fn set(&mut self) -> Result<IntervalSet, AtnError> {
        let n = self.len()?;
        let mut set = IntervalSet::new();
        for _ in 0..n {
            let a = self.int()?;
            let b = self.int()?;
            set.add_range(a, b);
        }
        Ok(set)
    }

    fn action(&mut self) -> Result<LexerAction, AtnError> {
        let tag = self.word()?;
        let (a, b, c) = (self.word()?, self.word()?, self.word()?);
        Ok(match tag {
            0 => LexerAction::Skip,
            1 => LexerAction::More,
            2 => LexerAction::Type(a.cast_signed()),
            3 => LexerAction::Channel(a as usize),
            4 => LexerAction::Mode(a as usize),
            5 => LexerAction::PushMode(a as usize),
            6 => LexerAction::PopMode,
            7 => LexerAction::Custom { rule: a as usize, action: b as usize },
            8 => LexerAction::Indexed {
                offset: a as usize,
                action: b as usize,
                rule: c as usize,
            },
            tag => return Err(AtnError::BadTag { at: self.at - 4, tag }),
        })
    }
}
