//! Algebraic properties of prediction-context merging and interning.

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

use llstar::context::{merge, MergeCache, PredictionContext, PredictionContextCache};

/// Every stack path in a context, root-to-top reversed: the sequence of
/// return states from the node down to the root.
fn paths(ctx: &Arc<PredictionContext>) -> BTreeSet<Vec<usize>> {
    fn walk(ctx: &Arc<PredictionContext>, suffix: &[usize], out: &mut BTreeSet<Vec<usize>>) {
        if ctx.is_empty_ctx() {
            // The root contributes its empty-path marker, so a bare root
            // and an array's empty slot enumerate identically.
            let mut path = suffix.to_vec();
            path.push(llstar::context::EMPTY_RETURN_STATE);
            out.insert(path);
            return;
        }
        for i in 0..ctx.len() {
            let mut path = suffix.to_vec();
            path.push(ctx.return_state(i));
            match ctx.parent(i) {
                Some(parent) => walk(parent, &path, out),
                None => {
                    out.insert(path);
                }
            }
        }
    }
    let mut out = BTreeSet::new();
    walk(ctx, &[], &mut out);
    out
}

fn chain(states: &[usize]) -> Arc<PredictionContext> {
    let mut ctx = PredictionContext::empty();
    for &s in states.iter().rev() {
        ctx = PredictionContext::singleton(ctx, s);
    }
    ctx
}

/// An arbitrary context: several chains folded together with full-context
/// merges, which exercises singleton, array, and empty-path shapes.
fn arb_context() -> impl Strategy<Value = Arc<PredictionContext>> {
    prop::collection::vec(prop::collection::vec(1usize..40, 0..4), 1..4).prop_map(|chains| {
        let mut cache = MergeCache::new();
        let mut iter = chains.into_iter();
        let mut ctx = chain(&iter.next().unwrap_or_default());
        for states in iter {
            ctx = merge(&ctx, &chain(&states), false, &mut cache);
        }
        ctx
    })
}

proptest! {
    #[test]
    fn prop_merge_idempotent(a in arb_context()) {
        let mut cache = MergeCache::new();
        for root_is_wildcard in [false, true] {
            let m = merge(&a, &a, root_is_wildcard, &mut cache);
            prop_assert_eq!(&*m, &*a);
        }
    }

    #[test]
    fn prop_merge_commutative(a in arb_context(), b in arb_context()) {
        for root_is_wildcard in [false, true] {
            let ab = merge(&a, &b, root_is_wildcard, &mut MergeCache::new());
            let ba = merge(&b, &a, root_is_wildcard, &mut MergeCache::new());
            prop_assert_eq!(&*ab, &*ba);
        }
    }

    #[test]
    fn prop_merge_preserves_paths(a in arb_context(), b in arb_context()) {
        // In full-context mode a merge is a true union of stack paths.
        let m = merge(&a, &b, false, &mut MergeCache::new());
        let merged_paths = paths(&m);
        let mut expected = paths(&a);
        expected.extend(paths(&b));
        prop_assert_eq!(merged_paths, expected);
    }

    #[test]
    fn prop_merge_associative_on_paths(
        a in arb_context(),
        b in arb_context(),
        c in arb_context(),
    ) {
        let mut cache = MergeCache::new();
        let ab_c = merge(&merge(&a, &b, false, &mut cache), &c, false, &mut cache);
        let a_bc = merge(&a, &merge(&b, &c, false, &mut cache), false, &mut cache);
        prop_assert_eq!(paths(&ab_c), paths(&a_bc));
    }

    #[test]
    fn prop_wildcard_root_absorbs_everything(a in arb_context()) {
        let m = merge(&a, &PredictionContext::empty(), true, &mut MergeCache::new());
        prop_assert!(m.is_empty_ctx());
    }

    #[test]
    fn prop_equal_structures_hash_equal(states in prop::collection::vec(1usize..40, 0..5)) {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let a = chain(&states);
        let b = chain(&states);
        prop_assert_eq!(&*a, &*b);
        let hash = |ctx: &Arc<PredictionContext>| {
            let mut h = DefaultHasher::new();
            ctx.hash(&mut h);
            h.finish()
        };
        prop_assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn prop_intern_canonicalizes(states in prop::collection::vec(1usize..40, 0..5)) {
        let cache = PredictionContextCache::new();
        let a = cache.intern(&chain(&states));
        let b = cache.intern(&chain(&states));
        prop_assert!(Arc::ptr_eq(&a, &b));
    }
}

#[test]
fn test_merged_sorted_return_states() {
    let mut cache = MergeCache::new();
    let m = merge(&chain(&[9]), &chain(&[3]), true, &mut cache);
    let m = merge(&m, &chain(&[7]), true, &mut cache);
    let states: Vec<usize> = (0..m.len()).map(|i| m.return_state(i)).collect();
    assert_eq!(states, vec![3, 7, 9]);
}

#[test]
fn test_full_context_empty_merge_keeps_empty_path() {
    let mut cache = MergeCache::new();
    let m = merge(&chain(&[5]), &PredictionContext::empty(), false, &mut cache);
    assert!(m.has_empty_path());
    assert_eq!(m.len(), 2);
    // Merging the empty path in again is a no-op.
    let again = merge(&m, &PredictionContext::empty(), false, &mut MergeCache::new());
    assert_eq!(&*again, &*m);
}
