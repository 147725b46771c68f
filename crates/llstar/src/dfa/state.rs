//! DFA states.

use std::sync::{Arc, RwLock};

use crate::config::AtnConfigSet;
use crate::lexer::action::LexerActionExecutor;
use crate::semantic::SemanticContext;

/// A predicated prediction on an accept state: take `alt` if `pred`
/// evaluates true.
#[derive(Debug, Clone)]
pub struct PredPrediction {
    pub pred: Arc<SemanticContext>,
    pub alt: usize,
}

/// Target of a DFA edge. The error sentinel records "this symbol kills
/// the prediction" so the dead end is never recomputed.
#[derive(Debug, Clone)]
pub enum EdgeTarget {
    Error,
    State(Arc<DfaState>),
}

/// A state of a decision DFA, characterized by the frozen configuration
/// set prediction computed for it.
///
/// Everything except the edge array is immutable after construction; the
/// edge array is filled in lazily as prediction explores new symbols.
/// Identity within a DFA is configuration-set equality, never the id.
#[derive(Debug)]
pub struct DfaState {
    /// Insertion index in the owning DFA's state table.
    pub id: usize,
    pub configs: Arc<AtnConfigSet>,
    /// Sparse successor array indexed by `symbol + 1` for parsers (slot 0
    /// is EOF) and by the raw character for lexers.
    edges: RwLock<Vec<Option<EdgeTarget>>>,
    pub is_accept: bool,
    /// Alternative to return when accepting; [`crate::config::INVALID_ALT`]
    /// when `predicates` must be evaluated first.
    pub prediction: usize,
    /// An SLL conflict was detected here; prediction must re-run with
    /// full context.
    pub requires_full_context: bool,
    pub predicates: Option<Vec<PredPrediction>>,
    /// Lexer accept states: the actions of the winning rule.
    pub lexer_action_executor: Option<Arc<LexerActionExecutor>>,
}

impl DfaState {
    #[must_use]
    pub fn new(configs: Arc<AtnConfigSet>) -> Self {
        Self {
            id: 0,
            configs,
            edges: RwLock::new(Vec::new()),
            is_accept: false,
            prediction: crate::config::INVALID_ALT,
            requires_full_context: false,
            predicates: None,
            lexer_action_executor: None,
        }
    }

    /// The stored successor for `slot`, if any.
    #[must_use]
    pub fn edge(&self, slot: usize) -> Option<EdgeTarget> {
        self.edges
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(slot)
            .cloned()
            .flatten()
    }

    /// Install a successor. Idempotent: concurrent writers always store
    /// the canonical state for the same symbol, so last-write-wins is
    /// safe.
    pub fn set_edge(&self, slot: usize, target: EdgeTarget) {
        let mut edges = self
            .edges
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if edges.len() <= slot {
            edges.resize(slot + 1, None);
        }
        edges[slot] = Some(target);
    }

    /// Snapshot of the edge array for diagnostics.
    #[must_use]
    pub fn edges_snapshot(&self) -> Vec<Option<EdgeTarget>> {
        self.edges
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AtnConfigSet;

    fn frozen_set() -> Arc<AtnConfigSet> {
        let mut s = AtnConfigSet::new(false);
        s.freeze();
        Arc::new(s)
    }

    #[test]
    fn test_edges_lazily_sized() {
        let s = DfaState::new(frozen_set());
        assert!(s.edge(5).is_none());
        s.set_edge(5, EdgeTarget::Error);
        assert!(matches!(s.edge(5), Some(EdgeTarget::Error)));
        assert!(s.edge(4).is_none());
        assert!(s.edge(100).is_none());
    }

    #[test]
    fn test_edge_overwrite_is_idempotent() {
        let s = DfaState::new(frozen_set());
        let t = Arc::new(DfaState::new(frozen_set()));
        s.set_edge(0, EdgeTarget::State(t.clone()));
        s.set_edge(0, EdgeTarget::State(t.clone()));
        match s.edge(0) {
            Some(EdgeTarget::State(got)) => assert!(Arc::ptr_eq(&got, &t)),
            _ => panic!("expected state edge"),
        }
    }
}
