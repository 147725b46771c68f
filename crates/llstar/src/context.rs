//! # Prediction contexts
//!
//! A [`PredictionContext`] is the graph-structured stack of a prediction:
//! the set of rule-return paths a configuration may take out of its
//! current rule. Nodes are immutable, structurally hashed at construction,
//! and shared through `Arc`; [`merge`] keeps the configuration set finite
//! by folding stacks that rejoin.
//!
//! The empty context is special. Under SLL prediction
//! (`root_is_wildcard = true`) it is a wildcard that absorbs anything it
//! is merged with; under full-context LL it is a real "returned past the
//! start rule" marker that must be preserved.

use hashbrown::HashMap;
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use crate::atn::state::StateId;
use crate::atn::Atn;
use crate::parser::context::RuleContext;

/// Return-state payload meaning "returned to the caller of the outermost
/// rule"; sorts after every real state id.
pub const EMPTY_RETURN_STATE: StateId = usize::MAX;

type Parent = Option<Arc<PredictionContext>>;

/// One node of the context DAG.
#[derive(Debug)]
pub struct PredictionContext {
    hash: u64,
    data: ContextData,
}

#[derive(Debug)]
enum ContextData {
    /// The root: no caller information.
    Empty,
    Singleton {
        parent: Arc<PredictionContext>,
        return_state: StateId,
    },
    /// Parallel arrays sorted by return state; an `EMPTY_RETURN_STATE`
    /// slot (always last) has no parent.
    Array {
        parents: SmallVec<[Parent; 2]>,
        return_states: SmallVec<[StateId; 2]>,
    },
}

fn hash_node(parents: &[Parent], return_states: &[StateId]) -> u64 {
    let mut h = ahash::AHasher::default();
    for p in parents {
        match p {
            Some(p) => p.hash.hash(&mut h),
            None => 0u64.hash(&mut h),
        }
    }
    return_states.hash(&mut h);
    h.finish()
}

impl PredictionContext {
    /// The shared empty context.
    #[must_use]
    pub fn empty() -> Arc<Self> {
        static EMPTY: std::sync::OnceLock<Arc<PredictionContext>> = std::sync::OnceLock::new();
        EMPTY
            .get_or_init(|| {
                Arc::new(Self {
                    hash: hash_node(&[], &[EMPTY_RETURN_STATE]),
                    data: ContextData::Empty,
                })
            })
            .clone()
    }

    /// A stack frame on top of `parent`. Collapses to the empty context
    /// when asked for the empty payload on the empty parent.
    #[must_use]
    pub fn singleton(parent: Arc<Self>, return_state: StateId) -> Arc<Self> {
        if return_state == EMPTY_RETURN_STATE && parent.is_empty_ctx() {
            return Self::empty();
        }
        Arc::new(Self {
            hash: hash_node(&[Some(parent.clone())], &[return_state]),
            data: ContextData::Singleton { parent, return_state },
        })
    }

    fn array(parents: SmallVec<[Parent; 2]>, return_states: SmallVec<[StateId; 2]>) -> Arc<Self> {
        debug_assert!(return_states.windows(2).all(|w| w[0] < w[1]));
        Arc::new(Self {
            hash: hash_node(&parents, &return_states),
            data: ContextData::Array { parents, return_states },
        })
    }

    /// Build the context chain for a live rule-invocation stack.
    #[must_use]
    pub fn from_rule_context(atn: &Atn, ctx: Option<&Arc<RuleContext>>) -> Arc<Self> {
        let Some(ctx) = ctx else {
            return Self::empty();
        };
        if ctx.invoking_state == crate::atn::INVALID_STATE {
            return Self::empty();
        }
        let parent = Self::from_rule_context(atn, ctx.parent.as_ref());
        let invoking = atn.state(ctx.invoking_state);
        let crate::atn::TransitionLabel::Rule { follow, .. } = &invoking.transitions[0].label
        else {
            return parent;
        };
        Self::singleton(parent, *follow)
    }

    #[must_use]
    pub fn is_empty_ctx(&self) -> bool {
        matches!(self.data, ContextData::Empty)
    }

    /// Number of (parent, return-state) slots. The empty context reports
    /// one slot holding the empty payload.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.data {
            ContextData::Empty | ContextData::Singleton { .. } => 1,
            ContextData::Array { return_states, .. } => return_states.len(),
        }
    }

    #[must_use]
    pub fn return_state(&self, index: usize) -> StateId {
        match &self.data {
            ContextData::Empty => EMPTY_RETURN_STATE,
            ContextData::Singleton { return_state, .. } => *return_state,
            ContextData::Array { return_states, .. } => return_states[index],
        }
    }

    #[must_use]
    pub fn parent(&self, index: usize) -> Option<&Arc<Self>> {
        match &self.data {
            ContextData::Empty => None,
            ContextData::Singleton { parent, .. } => Some(parent),
            ContextData::Array { parents, .. } => parents[index].as_ref(),
        }
    }

    /// Whether one of the paths has returned past the outermost rule.
    #[must_use]
    pub fn has_empty_path(&self) -> bool {
        // Sorted arrays keep the empty payload last.
        self.return_state(self.len() - 1) == EMPTY_RETURN_STATE
    }
}

impl PartialEq for PredictionContext {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.hash != other.hash {
            return false;
        }
        match (&self.data, &other.data) {
            (ContextData::Empty, ContextData::Empty) => true,
            (
                ContextData::Singleton { parent: p1, return_state: r1 },
                ContextData::Singleton { parent: p2, return_state: r2 },
            ) => r1 == r2 && (Arc::ptr_eq(p1, p2) || p1 == p2),
            (
                ContextData::Array { parents: ps1, return_states: rs1 },
                ContextData::Array { parents: ps2, return_states: rs2 },
            ) => {
                rs1 == rs2
                    && ps1.iter().zip(ps2.iter()).all(|(a, b)| match (a, b) {
                        (None, None) => true,
                        (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a == b,
                        _ => false,
                    })
            }
            _ => false,
        }
    }
}

impl Eq for PredictionContext {}

impl Hash for PredictionContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Memo for one prediction call: merges already performed, keyed by the
/// identities of the operands.
#[derive(Default)]
pub struct MergeCache {
    map: HashMap<(u64, u64), Arc<PredictionContext>, ahash::RandomState>,
}

impl MergeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: &Arc<PredictionContext>, b: &Arc<PredictionContext>) -> (u64, u64) {
        (Arc::as_ptr(a) as u64, Arc::as_ptr(b) as u64)
    }

    fn get(
        &self,
        a: &Arc<PredictionContext>,
        b: &Arc<PredictionContext>,
    ) -> Option<Arc<PredictionContext>> {
        self.map
            .get(&Self::key(a, b))
            .or_else(|| self.map.get(&Self::key(b, a)))
            .cloned()
    }

    fn put(
        &mut self,
        a: &Arc<PredictionContext>,
        b: &Arc<PredictionContext>,
        r: Arc<PredictionContext>,
    ) {
        self.map.insert(Self::key(a, b), r);
    }
}

/// Merge two contexts.
///
/// With `root_is_wildcard` (SLL prediction) the empty context absorbs the
/// other operand; in full-context mode the empty path is a real payload
/// and merging preserves it. The result contains every stack path of
/// either operand, and the operation is commutative and idempotent up to
/// structural equality.
#[must_use]
pub fn merge(
    a: &Arc<PredictionContext>,
    b: &Arc<PredictionContext>,
    root_is_wildcard: bool,
    cache: &mut MergeCache,
) -> Arc<PredictionContext> {
    if Arc::ptr_eq(a, b) || a == b {
        return a.clone();
    }
    if let (ContextData::Singleton { .. } | ContextData::Empty, ContextData::Singleton { .. } | ContextData::Empty) =
        (&a.data, &b.data)
    {
        return merge_singletons(a, b, root_is_wildcard, cache);
    }
    if root_is_wildcard {
        if a.is_empty_ctx() {
            return a.clone();
        }
        if b.is_empty_ctx() {
            return b.clone();
        }
    }
    merge_arrays(a, b, root_is_wildcard, cache)
}

/// Merge where both operands are singleton (or empty) nodes.
fn merge_singletons(
    a: &Arc<PredictionContext>,
    b: &Arc<PredictionContext>,
    root_is_wildcard: bool,
    cache: &mut MergeCache,
) -> Arc<PredictionContext> {
    if let Some(hit) = cache.get(a, b) {
        return hit;
    }
    if let Some(root) = merge_root(a, b, root_is_wildcard) {
        cache.put(a, b, root.clone());
        return root;
    }
    let (ra, rb) = (a.return_state(0), b.return_state(0));
    let result = if ra == rb {
        // Same return state: merge parents and stack the shared frame.
        let pa = a.parent(0).cloned().unwrap_or_else(PredictionContext::empty);
        let pb = b.parent(0).cloned().unwrap_or_else(PredictionContext::empty);
        let parent = merge(&pa, &pb, root_is_wildcard, cache);
        if Arc::ptr_eq(&parent, &pa) {
            a.clone()
        } else if Arc::ptr_eq(&parent, &pb) {
            b.clone()
        } else {
            PredictionContext::singleton(parent, ra)
        }
    } else {
        // Distinct return states: promote to a two-slot array.
        let (first, second) = if ra < rb { (a, b) } else { (b, a) };
        let parents: SmallVec<[Parent; 2]> =
            smallvec::smallvec![first.parent(0).cloned(), second.parent(0).cloned()];
        let return_states: SmallVec<[StateId; 2]> =
            smallvec::smallvec![first.return_state(0), second.return_state(0)];
        PredictionContext::array(parents, return_states)
    };
    cache.put(a, b, result.clone());
    result
}

/// Handle merges involving the empty context.
fn merge_root(
    a: &Arc<PredictionContext>,
    b: &Arc<PredictionContext>,
    root_is_wildcard: bool,
) -> Option<Arc<PredictionContext>> {
    if root_is_wildcard {
        if a.is_empty_ctx() || b.is_empty_ctx() {
            return Some(PredictionContext::empty());
        }
        return None;
    }
    match (a.is_empty_ctx(), b.is_empty_ctx()) {
        (true, true) => Some(PredictionContext::empty()),
        (true, false) => Some(add_empty_path(b)),
        (false, true) => Some(add_empty_path(a)),
        (false, false) => None,
    }
}

/// `$ + x` in full-context mode: an array of x's slot plus the empty path.
fn add_empty_path(x: &Arc<PredictionContext>) -> Arc<PredictionContext> {
    let parents: SmallVec<[Parent; 2]> = smallvec::smallvec![x.parent(0).cloned(), None];
    let return_states: SmallVec<[StateId; 2]> =
        smallvec::smallvec![x.return_state(0), EMPTY_RETURN_STATE];
    PredictionContext::array(parents, return_states)
}

fn merge_arrays(
    a: &Arc<PredictionContext>,
    b: &Arc<PredictionContext>,
    root_is_wildcard: bool,
    cache: &mut MergeCache,
) -> Arc<PredictionContext> {
    if let Some(hit) = cache.get(a, b) {
        return hit;
    }
    let (mut i, mut j, la, lb) = (0usize, 0usize, a.len(), b.len());
    let mut parents: SmallVec<[Parent; 2]> = SmallVec::with_capacity(la + lb);
    let mut return_states: SmallVec<[StateId; 2]> = SmallVec::with_capacity(la + lb);
    while i < la && j < lb {
        let (ra, rb) = (a.return_state(i), b.return_state(j));
        if ra == rb {
            let pa = a.parent(i);
            let pb = b.parent(j);
            let both_empty = ra == EMPTY_RETURN_STATE && pa.is_none() && pb.is_none();
            let parent = if both_empty {
                None
            } else if let (Some(pa), Some(pb)) = (pa, pb) {
                if Arc::ptr_eq(pa, pb) || pa == pb {
                    Some(pa.clone())
                } else {
                    Some(merge(pa, pb, root_is_wildcard, cache))
                }
            } else {
                let pa = pa.cloned().unwrap_or_else(PredictionContext::empty);
                let pb = pb.cloned().unwrap_or_else(PredictionContext::empty);
                Some(merge(&pa, &pb, root_is_wildcard, cache))
            };
            parents.push(parent);
            return_states.push(ra);
            i += 1;
            j += 1;
        } else if ra < rb {
            parents.push(a.parent(i).cloned());
            return_states.push(ra);
            i += 1;
        } else {
            parents.push(b.parent(j).cloned());
            return_states.push(rb);
            j += 1;
        }
    }
    while i < la {
        parents.push(a.parent(i).cloned());
        return_states.push(a.return_state(i));
        i += 1;
    }
    while j < lb {
        parents.push(b.parent(j).cloned());
        return_states.push(b.return_state(j));
        j += 1;
    }
    let result = if return_states.len() == 1 {
        match parents.pop().flatten() {
            Some(parent) => PredictionContext::singleton(parent, return_states[0]),
            None => PredictionContext::empty(),
        }
    } else {
        let merged = PredictionContext::array(parents, return_states);
        if *merged == **a {
            a.clone()
        } else if *merged == **b {
            b.clone()
        } else {
            merged
        }
    };
    cache.put(a, b, result.clone());
    result
}

/// Process-wide intern table for contexts that outlive a single
/// prediction (everything reachable from a cached DFA state).
#[derive(Default)]
pub struct PredictionContextCache {
    map: Mutex<HashMap<ContextKey, Arc<PredictionContext>, ahash::RandomState>>,
}

/// Structural key wrapper so lookup goes through `PredictionContext`'s
/// deep equality.
#[derive(Clone)]
struct ContextKey(Arc<PredictionContext>);

impl PartialEq for ContextKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for ContextKey {}
impl Hash for ContextKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PredictionContextCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Intern `ctx` and (recursively) its parents, returning the canonical
    /// shared node for each distinct structure.
    #[must_use]
    pub fn intern(&self, ctx: &Arc<PredictionContext>) -> Arc<PredictionContext> {
        let mut visited = HashMap::default();
        let mut map = self.map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::intern_rec(&mut map, ctx, &mut visited)
    }

    fn intern_rec(
        map: &mut HashMap<ContextKey, Arc<PredictionContext>, ahash::RandomState>,
        ctx: &Arc<PredictionContext>,
        visited: &mut HashMap<*const PredictionContext, Arc<PredictionContext>>,
    ) -> Arc<PredictionContext> {
        if ctx.is_empty_ctx() {
            return ctx.clone();
        }
        let ptr = Arc::as_ptr(ctx);
        if let Some(hit) = visited.get(&ptr) {
            return hit.clone();
        }
        if let Some(hit) = map.get(&ContextKey(ctx.clone())) {
            visited.insert(ptr, hit.clone());
            return hit.clone();
        }
        // Intern parents first; rebuild only when one of them changed.
        let mut changed = false;
        let mut new_parents: SmallVec<[Parent; 2]> = SmallVec::with_capacity(ctx.len());
        for i in 0..ctx.len() {
            let parent = ctx.parent(i).map(|p| {
                let interned = Self::intern_rec(map, p, visited);
                if !Arc::ptr_eq(&interned, p) {
                    changed = true;
                }
                interned
            });
            new_parents.push(parent);
        }
        let canonical = if changed {
            let return_states: SmallVec<[StateId; 2]> =
                (0..ctx.len()).map(|i| ctx.return_state(i)).collect();
            if return_states.len() == 1 {
                match new_parents.pop().flatten() {
                    Some(p) => PredictionContext::singleton(p, return_states[0]),
                    None => PredictionContext::empty(),
                }
            } else {
                PredictionContext::array(new_parents, return_states)
            }
        } else {
            ctx.clone()
        };
        map.insert(ContextKey(canonical.clone()), canonical.clone());
        visited.insert(ptr, canonical.clone());
        canonical
    }
}
