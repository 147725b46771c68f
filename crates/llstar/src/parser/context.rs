//! Rule invocation contexts.
//!
//! The live call chain the parser maintains as it enters and exits rules.
//! Prediction turns this chain into the initial
//! [`PredictionContext`](crate::context::PredictionContext) for
//! full-context simulation; the chain itself carries no parse-tree
//! payload.

use std::sync::Arc;

use crate::atn::state::{StateId, INVALID_STATE};

/// One frame of the rule invocation chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleContext {
    pub parent: Option<Arc<RuleContext>>,
    /// The ATN state holding the rule transition that invoked this rule;
    /// [`INVALID_STATE`] for the root.
    pub invoking_state: StateId,
    pub rule_index: usize,
}

impl RuleContext {
    /// The context a parse starts in.
    #[must_use]
    pub fn root(rule_index: usize) -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            invoking_state: INVALID_STATE,
            rule_index,
        })
    }

    /// The context entered by invoking `rule_index` from `invoking_state`.
    #[must_use]
    pub fn child(parent: Arc<Self>, invoking_state: StateId, rule_index: usize) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(parent),
            invoking_state,
            rule_index,
        })
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.invoking_state == INVALID_STATE
    }

    /// Number of frames above this one, root included.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut n = 1;
        let mut ctx = self;
        while let Some(parent) = &ctx.parent {
            n += 1;
            ctx = parent;
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain() {
        let root = RuleContext::root(0);
        assert!(root.is_root());
        assert_eq!(root.depth(), 1);
        let child = RuleContext::child(root.clone(), 7, 1);
        assert!(!child.is_root());
        assert_eq!(child.depth(), 2);
        assert_eq!(child.parent.as_ref().map(|p| p.rule_index), Some(0));
    }
}
