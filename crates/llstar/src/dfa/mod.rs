//! # Decision DFAs
//!
//! One lazily built [`Dfa`] per parser decision (per lexer mode for
//! lexers), shared by every recognizer instance for the grammar.
//!
//! States are canonicalized on insertion: the table is keyed by the
//! frozen configuration set, so no two distinct states in a DFA are
//! configuration-set-equal. Insertion takes the table mutex; edge writes
//! go through the state's own lock and are idempotent because the target
//! is always canonical.
//!
//! A precedence DFA (decision of a left-recursive rule) keeps a sentinel
//! `s0` whose edge array is indexed by parser precedence and points at
//! the per-precedence start states; the sentinel itself is not in the
//! state table.

pub mod serializer;
pub mod state;

use hashbrown::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::atn::state::StateId;
use crate::atn::{AtnState, AtnStateKind};
use crate::config::AtnConfigSet;

pub use serializer::DfaSerializer;
pub use state::{DfaState, EdgeTarget, PredPrediction};

/// Key wrapper delegating hash/eq to the configuration set.
#[derive(Clone)]
struct SetKey(Arc<AtnConfigSet>);

impl PartialEq for SetKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for SetKey {}
impl Hash for SetKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

#[derive(Default)]
struct StateTable {
    by_configs: HashMap<SetKey, Arc<DfaState>, ahash::RandomState>,
    /// Insertion order, for stable diagnostics.
    ordered: Vec<Arc<DfaState>>,
}

/// The DFA cache for one decision.
pub struct Dfa {
    pub decision: usize,
    pub atn_start_state: StateId,
    /// True iff the ATN start state is the precedence decision of a
    /// left-recursive rule.
    pub is_precedence: bool,
    states: Mutex<StateTable>,
    s0: RwLock<Option<Arc<DfaState>>>,
}

impl Dfa {
    #[must_use]
    pub fn new(decision: usize, atn_start: &AtnState) -> Self {
        let is_precedence = matches!(
            atn_start.kind,
            AtnStateKind::StarLoopEntry { is_precedence_decision: true, .. }
        );
        let s0 = if is_precedence {
            // Sentinel start whose edges are the per-precedence starts.
            let mut configs = AtnConfigSet::new(false);
            configs.freeze();
            Some(Arc::new(DfaState::new(Arc::new(configs))))
        } else {
            None
        };
        Self {
            decision,
            atn_start_state: atn_start.id,
            is_precedence,
            states: Mutex::new(StateTable::default()),
            s0: RwLock::new(s0),
        }
    }

    #[must_use]
    pub fn s0(&self) -> Option<Arc<DfaState>> {
        self.s0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_s0(&self, state: Arc<DfaState>) {
        *self.s0.write().unwrap_or_else(PoisonError::into_inner) = Some(state);
    }

    /// Start state specialized for `precedence`, if already computed.
    #[must_use]
    pub fn precedence_start_state(&self, precedence: i32) -> Option<Arc<DfaState>> {
        let slot = usize::try_from(precedence).ok()?;
        match self.s0()?.edge(slot) {
            Some(EdgeTarget::State(s)) => Some(s),
            _ => None,
        }
    }

    /// Install the start state for `precedence`. Negative precedences are
    /// ignored.
    pub fn set_precedence_start_state(&self, precedence: i32, state: Arc<DfaState>) {
        let Ok(slot) = usize::try_from(precedence) else {
            return;
        };
        if let Some(s0) = self.s0() {
            s0.set_edge(slot, EdgeTarget::State(state));
        }
    }

    /// Canonicalize `pending` against the state table: an existing state
    /// with an equal configuration set wins, otherwise `pending` is
    /// assigned the next id and inserted.
    ///
    /// `pending.configs` must already be frozen.
    #[must_use]
    pub fn add_state(&self, mut pending: DfaState) -> Arc<DfaState> {
        debug_assert!(pending.configs.is_read_only());
        let mut table = self
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let key = SetKey(pending.configs.clone());
        if let Some(existing) = table.by_configs.get(&key) {
            return existing.clone();
        }
        pending.id = table.ordered.len();
        let state = Arc::new(pending);
        table.by_configs.insert(key, state.clone());
        table.ordered.push(state.clone());
        state
    }

    /// States in insertion order.
    #[must_use]
    pub fn states(&self) -> Vec<Arc<DfaState>> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ordered
            .clone()
    }

    #[must_use]
    pub fn num_states(&self) -> usize {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ordered
            .len()
    }
}

impl std::fmt::Debug for Dfa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dfa")
            .field("decision", &self.decision)
            .field("atn_start_state", &self.atn_start_state)
            .field("is_precedence", &self.is_precedence)
            .field("num_states", &self.num_states())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AtnConfig;
    use crate::context::{MergeCache, PredictionContext};

    fn decision_state(id: StateId) -> AtnState {
        let mut s = AtnState::new(id, 0, AtnStateKind::BlockStart { end_state: id + 1 });
        s.decision = Some(0);
        s
    }

    fn frozen(configs: Vec<AtnConfig>) -> Arc<AtnConfigSet> {
        let mut set = AtnConfigSet::new(false);
        let mut cache = MergeCache::new();
        for c in configs {
            set.add(c, &mut cache).unwrap();
        }
        set.freeze();
        Arc::new(set)
    }

    #[test]
    fn test_add_state_canonicalizes() {
        let dfa = Dfa::new(0, &decision_state(3));
        let configs = vec![AtnConfig::new(4, 1, PredictionContext::empty())];
        let a = dfa.add_state(DfaState::new(frozen(configs.clone())));
        let b = dfa.add_state(DfaState::new(frozen(configs)));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(dfa.num_states(), 1);
        assert_eq!(a.id, 0);
    }

    #[test]
    fn test_distinct_sets_distinct_states() {
        let dfa = Dfa::new(0, &decision_state(3));
        let a = dfa.add_state(DfaState::new(frozen(vec![AtnConfig::new(
            4,
            1,
            PredictionContext::empty(),
        )])));
        let b = dfa.add_state(DfaState::new(frozen(vec![AtnConfig::new(
            5,
            1,
            PredictionContext::empty(),
        )])));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.id, 1);
        assert_eq!(dfa.states().len(), 2);
    }

    #[test]
    fn test_precedence_dfa_start_states() {
        let mut s = AtnState::new(
            7,
            1,
            AtnStateKind::StarLoopEntry { loopback: 9, is_precedence_decision: true },
        );
        s.decision = Some(0);
        let dfa = Dfa::new(0, &s);
        assert!(dfa.is_precedence);
        assert!(dfa.precedence_start_state(2).is_none());
        let start = dfa.add_state(DfaState::new(frozen(vec![AtnConfig::new(
            8,
            1,
            PredictionContext::empty(),
        )])));
        dfa.set_precedence_start_state(2, start.clone());
        assert!(Arc::ptr_eq(&dfa.precedence_start_state(2).unwrap(), &start));
        assert!(dfa.precedence_start_state(3).is_none());
        dfa.set_precedence_start_state(-1, start);
        assert!(dfa.precedence_start_state(-1).is_none());
    }

    #[test]
    fn test_non_precedence_dfa_has_no_s0_initially() {
        let dfa = Dfa::new(0, &decision_state(3));
        assert!(!dfa.is_precedence);
        assert!(dfa.s0().is_none());
    }
}
