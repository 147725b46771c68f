//! # Semantic contexts
//!
//! The boolean lattice of predicate references a configuration is gated
//! by. Conjunction and disjunction normalize on construction: nested
//! same-operator nodes flatten, duplicates drop, and precedence
//! predicates reduce to the one that dominates (minimum under AND,
//! maximum under OR).

use std::sync::{Arc, OnceLock};

use crate::parser::context::RuleContext;

/// Evaluates predicates against the live recognizer.
pub trait PredicateEvaluator {
    /// User predicate `pred` of `rule`. `ctx` is the parser call stack for
    /// context-dependent predicates, `None` otherwise.
    fn sempred(&mut self, ctx: Option<&Arc<RuleContext>>, rule: usize, pred: usize) -> bool {
        let _ = (ctx, rule, pred);
        true
    }

    /// Precedence predicate `{precedence >= current}?`.
    fn precpred(&self, precedence: i32) -> bool {
        let _ = precedence;
        true
    }
}

/// A predicate expression attached to a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SemanticContext {
    /// No predicate; always true.
    None,
    Predicate {
        rule: usize,
        pred: usize,
        ctx_dependent: bool,
    },
    PrecedencePredicate {
        precedence: i32,
    },
    /// All operands must hold. Normalized: flat, deduped, sorted, at most
    /// one precedence predicate (the minimum).
    And(Vec<Arc<SemanticContext>>),
    /// Any operand must hold. Normalized like `And` but keeping the
    /// maximum precedence predicate.
    Or(Vec<Arc<SemanticContext>>),
}

impl SemanticContext {
    /// The shared "no predicate" context.
    #[must_use]
    pub fn none() -> Arc<Self> {
        static NONE: OnceLock<Arc<SemanticContext>> = OnceLock::new();
        NONE.get_or_init(|| Arc::new(Self::None)).clone()
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Conjunction of two contexts.
    #[must_use]
    pub fn and(a: &Arc<Self>, b: &Arc<Self>) -> Arc<Self> {
        if a.is_none() {
            return b.clone();
        }
        if b.is_none() {
            return a.clone();
        }
        Self::combine(a, b, /* conjunction */ true)
    }

    /// Disjunction of two contexts.
    #[must_use]
    pub fn or(a: &Arc<Self>, b: &Arc<Self>) -> Arc<Self> {
        if a.is_none() || b.is_none() {
            return Self::none();
        }
        Self::combine(a, b, /* conjunction */ false)
    }

    fn combine(a: &Arc<Self>, b: &Arc<Self>, conjunction: bool) -> Arc<Self> {
        let mut operands: Vec<Arc<Self>> = Vec::new();
        let mut precedence: Option<i32> = None;
        let mut push = |op: &Arc<Self>| match **op {
            Self::PrecedencePredicate { precedence: p } => {
                precedence = Some(match precedence {
                    // AND keeps the strictest (minimum) precedence test,
                    // OR the loosest (maximum).
                    Some(q) if conjunction => q.min(p),
                    Some(q) => q.max(p),
                    None => p,
                });
            }
            _ => operands.push(op.clone()),
        };
        for op in [a, b] {
            match (&**op, conjunction) {
                (Self::And(children), true) | (Self::Or(children), false) => {
                    for child in children {
                        push(child);
                    }
                }
                _ => push(op),
            }
        }
        if let Some(p) = precedence {
            operands.push(Arc::new(Self::PrecedencePredicate { precedence: p }));
        }
        operands.sort();
        operands.dedup();
        if operands.len() == 1 {
            return operands.into_iter().next().unwrap_or_else(Self::none);
        }
        Arc::new(if conjunction { Self::And(operands) } else { Self::Or(operands) })
    }

    /// Evaluate against the recognizer; short-circuits.
    pub fn eval<E: PredicateEvaluator + ?Sized>(
        &self,
        evaluator: &mut E,
        ctx: Option<&Arc<RuleContext>>,
    ) -> bool {
        match self {
            Self::None => true,
            Self::Predicate { rule, pred, ctx_dependent } => {
                evaluator.sempred(if *ctx_dependent { ctx } else { None }, *rule, *pred)
            }
            Self::PrecedencePredicate { precedence } => evaluator.precpred(*precedence),
            Self::And(ops) => ops.iter().all(|op| op.eval(evaluator, ctx)),
            Self::Or(ops) => ops.iter().any(|op| op.eval(evaluator, ctx)),
        }
    }

    /// Partially evaluate under the current parser precedence.
    ///
    /// Returns `Some(None-context)` for "accepted unconditionally",
    /// `Option::None` for "rejected", and a possibly simplified context
    /// otherwise.
    pub fn eval_precedence<E: PredicateEvaluator + ?Sized>(
        self: &Arc<Self>,
        evaluator: &E,
    ) -> Option<Arc<Self>> {
        match &**self {
            Self::None | Self::Predicate { .. } => Some(self.clone()),
            Self::PrecedencePredicate { precedence } => {
                if evaluator.precpred(*precedence) {
                    Some(Self::none())
                } else {
                    None
                }
            }
            Self::And(ops) => {
                let mut differs = false;
                let mut remaining: Vec<Arc<Self>> = Vec::new();
                for op in ops {
                    let evaluated = op.eval_precedence(evaluator)?;
                    differs |= !Arc::ptr_eq(&evaluated, op);
                    if !evaluated.is_none() {
                        remaining.push(evaluated);
                    }
                }
                if !differs {
                    return Some(self.clone());
                }
                let mut result = Self::none();
                for op in remaining {
                    result = Self::and(&result, &op);
                }
                Some(result)
            }
            Self::Or(ops) => {
                let mut differs = false;
                let mut remaining: Vec<Arc<Self>> = Vec::new();
                for op in ops {
                    match op.eval_precedence(evaluator) {
                        Some(evaluated) => {
                            differs |= !Arc::ptr_eq(&evaluated, op);
                            if evaluated.is_none() {
                                // One disjunct is unconditionally true.
                                return Some(Self::none());
                            }
                            remaining.push(evaluated);
                        }
                        None => differs = true,
                    }
                }
                if !differs {
                    return Some(self.clone());
                }
                if remaining.is_empty() {
                    return None;
                }
                let mut iter = remaining.into_iter();
                let mut result = iter.next().unwrap_or_else(Self::none);
                for op in iter {
                    result = Self::or(&result, &op);
                }
                Some(result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEval {
        precedence: i32,
        true_preds: Vec<(usize, usize)>,
    }

    impl PredicateEvaluator for FixedEval {
        fn sempred(&mut self, _ctx: Option<&Arc<RuleContext>>, rule: usize, pred: usize) -> bool {
            self.true_preds.contains(&(rule, pred))
        }

        fn precpred(&self, precedence: i32) -> bool {
            precedence >= self.precedence
        }
    }

    fn pred(rule: usize, pred: usize) -> Arc<SemanticContext> {
        Arc::new(SemanticContext::Predicate { rule, pred, ctx_dependent: false })
    }

    fn prec(precedence: i32) -> Arc<SemanticContext> {
        Arc::new(SemanticContext::PrecedencePredicate { precedence })
    }

    #[test]
    fn test_and_none_identity() {
        let p = pred(0, 1);
        assert_eq!(SemanticContext::and(&SemanticContext::none(), &p), p);
        assert_eq!(SemanticContext::and(&p, &SemanticContext::none()), p);
    }

    #[test]
    fn test_or_none_absorbs() {
        let p = pred(0, 1);
        assert!(SemanticContext::or(&p, &SemanticContext::none()).is_none());
    }

    #[test]
    fn test_and_dedupes() {
        let a = pred(0, 1);
        let b = pred(0, 1);
        assert_eq!(SemanticContext::and(&a, &b), a);
    }

    #[test]
    fn test_and_flattens_and_is_order_insensitive() {
        let (a, b, c) = (pred(0, 1), pred(0, 2), pred(0, 3));
        let left = SemanticContext::and(&SemanticContext::and(&a, &b), &c);
        let right = SemanticContext::and(&a, &SemanticContext::and(&c, &b));
        assert_eq!(left, right);
        assert!(matches!(&*left, SemanticContext::And(ops) if ops.len() == 3));
    }

    #[test]
    fn test_and_keeps_min_precedence() {
        let m = SemanticContext::and(&prec(3), &prec(1));
        assert!(matches!(&*m, SemanticContext::PrecedencePredicate { precedence: 1 }));
        let m = SemanticContext::or(&prec(3), &prec(1));
        assert!(matches!(&*m, SemanticContext::PrecedencePredicate { precedence: 3 }));
    }

    #[test]
    fn test_eval_short_circuit_semantics() {
        let mut eval = FixedEval { precedence: 0, true_preds: vec![(0, 1)] };
        let yes = pred(0, 1);
        let no = pred(0, 2);
        assert!(SemanticContext::and(&yes, &SemanticContext::none()).eval(&mut eval, None));
        assert!(!SemanticContext::and(&yes, &no).eval(&mut eval, None));
        assert!(SemanticContext::or(&no, &yes).eval(&mut eval, None));
    }

    #[test]
    fn test_eval_precedence_accepts() {
        let eval = FixedEval { precedence: 2, true_preds: vec![] };
        let ctx = prec(3);
        let r = ctx.eval_precedence(&eval).unwrap();
        assert!(r.is_none());
    }

    #[test]
    fn test_eval_precedence_rejects() {
        let eval = FixedEval { precedence: 5, true_preds: vec![] };
        assert!(prec(3).eval_precedence(&eval).is_none());
    }

    #[test]
    fn test_eval_precedence_simplifies_and() {
        let eval = FixedEval { precedence: 2, true_preds: vec![] };
        let p = pred(0, 1);
        let ctx = SemanticContext::and(&prec(3), &p);
        let r = ctx.eval_precedence(&eval).unwrap();
        assert_eq!(r, p);
    }

    #[test]
    fn test_eval_precedence_rejected_and() {
        let eval = FixedEval { precedence: 5, true_preds: vec![] };
        let ctx = SemanticContext::and(&prec(3), &pred(0, 1));
        assert!(ctx.eval_precedence(&eval).is_none());
    }
}
