//! # ATN configurations
//!
//! An [`AtnConfig`] is one point of a prediction: an ATN state, the
//! alternative being tried, the graph-structured return stack, and the
//! semantic context collected on the way. An [`AtnConfigSet`] holds the
//! configurations of one DFA state; its insert merges contexts so that a
//! `(state, alt, semantic-context)` triple appears at most once in parser
//! prediction.
//!
//! Sets become read-only ([`AtnConfigSet::freeze`]) before they are
//! published inside a DFA state; the lookup index is dropped and the hash
//! is cached at that point.

use hashbrown::HashMap;
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::atn::state::StateId;
use crate::bitset::BitSet;
use crate::context::{merge, MergeCache, PredictionContext};
use crate::error::IllegalStateError;
use crate::lexer::action::LexerActionExecutor;
use crate::semantic::SemanticContext;

/// Alternative number meaning "no single viable alternative".
pub const INVALID_ALT: usize = 0;

/// One NFA configuration: `(state, alt, context, semantic context)` plus
/// bookkeeping flags.
#[derive(Debug, Clone)]
pub struct AtnConfig {
    pub state: StateId,
    /// 1-based alternative of the decision this config belongs to.
    pub alt: usize,
    pub context: Arc<PredictionContext>,
    pub semantic_context: Arc<SemanticContext>,
    /// How many times closure fell off the end of the start rule and
    /// continued in the outer context.
    pub reaches_into_outer_context: u32,
    /// Survived the precedence filter through an outermost recursive call;
    /// must not be filtered again.
    pub precedence_filter_suppressed: bool,
    /// Lexer only: actions to run if this config's rule accepts.
    pub lexer_action_executor: Option<Arc<LexerActionExecutor>>,
    /// Lexer only: the path crossed a non-greedy subrule decision.
    pub passed_through_non_greedy_decision: bool,
}

impl AtnConfig {
    #[must_use]
    pub fn new(state: StateId, alt: usize, context: Arc<PredictionContext>) -> Self {
        Self {
            state,
            alt,
            context,
            semantic_context: SemanticContext::none(),
            reaches_into_outer_context: 0,
            precedence_filter_suppressed: false,
            lexer_action_executor: None,
            passed_through_non_greedy_decision: false,
        }
    }

    /// Same configuration at a different state.
    #[must_use]
    pub fn transit(&self, state: StateId) -> Self {
        Self { state, ..self.clone() }
    }

    /// Same configuration at a different state with a new context.
    #[must_use]
    pub fn transit_with_context(&self, state: StateId, context: Arc<PredictionContext>) -> Self {
        Self { state, context, ..self.clone() }
    }

    /// Same configuration at a different state with a new semantic context.
    #[must_use]
    pub fn transit_with_semantic(
        &self,
        state: StateId,
        semantic_context: Arc<SemanticContext>,
    ) -> Self {
        Self { state, semantic_context, ..self.clone() }
    }
}

impl PartialEq for AtnConfig {
    /// Full structural equality (used by closure's busy set). Note that
    /// `reaches_into_outer_context` is bookkeeping, not identity.
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
            && self.alt == other.alt
            && self.precedence_filter_suppressed == other.precedence_filter_suppressed
            && self.passed_through_non_greedy_decision == other.passed_through_non_greedy_decision
            && self.semantic_context == other.semantic_context
            && self.lexer_action_executor == other.lexer_action_executor
            && (Arc::ptr_eq(&self.context, &other.context) || self.context == other.context)
    }
}

impl Eq for AtnConfig {}

impl Hash for AtnConfig {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.state.hash(state);
        self.alt.hash(state);
        self.context.hash(state);
        self.semantic_context.hash(state);
        self.precedence_filter_suppressed.hash(state);
        self.passed_through_non_greedy_decision.hash(state);
        self.lexer_action_executor.hash(state);
    }
}

/// An ordered set of configurations with merge-on-insert.
#[derive(Debug, Clone)]
pub struct AtnConfigSet {
    configs: Vec<AtnConfig>,
    /// Key-hash -> indices into `configs`; dropped on freeze.
    lookup: Option<HashMap<u64, SmallVec<[usize; 1]>, ahash::RandomState>>,
    /// Set during full-context LL prediction; flips the merge root mode.
    pub full_ctx: bool,
    /// Lexer sets key on the full configuration instead of
    /// `(state, alt, semantic-context)`.
    ordered: bool,
    pub has_semantic_context: bool,
    pub dips_into_outer_context: bool,
    pub unique_alt: usize,
    pub conflicting_alts: Option<BitSet>,
    read_only: bool,
    frozen_hash: u64,
}

impl AtnConfigSet {
    #[must_use]
    pub fn new(full_ctx: bool) -> Self {
        Self {
            configs: Vec::new(),
            lookup: Some(HashMap::default()),
            full_ctx,
            ordered: false,
            has_semantic_context: false,
            dips_into_outer_context: false,
            unique_alt: INVALID_ALT,
            conflicting_alts: None,
            read_only: false,
            frozen_hash: 0,
        }
    }

    /// A lexer configuration set: insertion order preserved, identity is
    /// the whole configuration.
    #[must_use]
    pub fn new_ordered() -> Self {
        Self { ordered: true, ..Self::new(false) }
    }

    fn key_hash(&self, c: &AtnConfig) -> u64 {
        let mut h = ahash::AHasher::default();
        if self.ordered {
            c.hash(&mut h);
        } else {
            c.state.hash(&mut h);
            c.alt.hash(&mut h);
            c.semantic_context.hash(&mut h);
        }
        h.finish()
    }

    fn key_eq(&self, a: &AtnConfig, b: &AtnConfig) -> bool {
        if self.ordered {
            a == b
        } else {
            a.state == b.state && a.alt == b.alt && a.semantic_context == b.semantic_context
        }
    }

    /// Insert a configuration, merging contexts when the set already holds
    /// a configuration with the same identity key.
    ///
    /// Returns `true` when the set grew.
    pub fn add(
        &mut self,
        config: AtnConfig,
        merge_cache: &mut MergeCache,
    ) -> Result<bool, IllegalStateError> {
        if self.read_only {
            return Err(IllegalStateError::FrozenConfigSet);
        }
        if !config.semantic_context.is_none() {
            self.has_semantic_context = true;
        }
        if config.reaches_into_outer_context > 0 {
            self.dips_into_outer_context = true;
        }
        let hash = self.key_hash(&config);
        let existing_idx = self
            .lookup
            .as_ref()
            .and_then(|l| l.get(&hash))
            .and_then(|bucket| {
                bucket
                    .iter()
                    .copied()
                    .find(|&i| self.key_eq(&self.configs[i], &config))
            });
        if let Some(i) = existing_idx {
            let root_is_wildcard = !self.full_ctx;
            let existing = &mut self.configs[i];
            let merged = merge(&existing.context, &config.context, root_is_wildcard, merge_cache);
            existing.reaches_into_outer_context = existing
                .reaches_into_outer_context
                .max(config.reaches_into_outer_context);
            existing.precedence_filter_suppressed |= config.precedence_filter_suppressed;
            existing.context = merged;
            return Ok(false);
        }
        let index = self.configs.len();
        self.configs.push(config);
        if let Some(lookup) = self.lookup.as_mut() {
            lookup.entry(hash).or_default().push(index);
        }
        Ok(true)
    }

    /// Mark read-only: drops the lookup index and caches the hash.
    pub fn freeze(&mut self) {
        if self.read_only {
            return;
        }
        self.read_only = true;
        self.lookup = None;
        let mut h = ahash::AHasher::default();
        self.hash_content(&mut h);
        self.frozen_hash = h.finish();
    }

    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn hash_content<H: Hasher>(&self, h: &mut H) {
        for c in &self.configs {
            c.hash(h);
        }
        self.full_ctx.hash(h);
        self.unique_alt.hash(h);
        self.conflicting_alts.hash(h);
        self.has_semantic_context.hash(h);
        self.dips_into_outer_context.hash(h);
    }

    /// Re-point every context at its canonical interned node. Called once
    /// before the set is published inside a DFA state.
    pub fn optimize_contexts(&mut self, cache: &crate::context::PredictionContextCache) {
        if self.read_only {
            return;
        }
        for c in &mut self.configs {
            c.context = cache.intern(&c.context);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AtnConfig> {
        self.configs.iter()
    }

    #[must_use]
    pub fn get(&self, i: usize) -> &AtnConfig {
        &self.configs[i]
    }

    /// The set of alternatives represented.
    #[must_use]
    pub fn alts(&self) -> BitSet {
        self.configs.iter().map(|c| c.alt).collect()
    }

    /// The single alternative every configuration agrees on, or
    /// [`INVALID_ALT`].
    #[must_use]
    pub fn unique_alt_of_configs(&self) -> usize {
        let mut alt = INVALID_ALT;
        for c in &self.configs {
            if alt == INVALID_ALT {
                alt = c.alt;
            } else if c.alt != alt {
                return INVALID_ALT;
            }
        }
        alt
    }
}

impl PartialEq for AtnConfigSet {
    fn eq(&self, other: &Self) -> bool {
        self.configs == other.configs
            && self.full_ctx == other.full_ctx
            && self.unique_alt == other.unique_alt
            && self.conflicting_alts == other.conflicting_alts
            && self.has_semantic_context == other.has_semantic_context
            && self.dips_into_outer_context == other.dips_into_outer_context
    }
}

impl Eq for AtnConfigSet {}

impl Hash for AtnConfigSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if self.read_only {
            state.write_u64(self.frozen_hash);
        } else {
            self.hash_content(state);
        }
    }
}

impl<'a> IntoIterator for &'a AtnConfigSet {
    type Item = &'a AtnConfig;
    type IntoIter = std::slice::Iter<'a, AtnConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.configs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(ret: StateId) -> Arc<PredictionContext> {
        PredictionContext::singleton(PredictionContext::empty(), ret)
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut set = AtnConfigSet::new(false);
        let mut cache = MergeCache::new();
        let c = AtnConfig::new(3, 1, ctx(7));
        assert!(set.add(c.clone(), &mut cache).unwrap());
        assert!(!set.add(c, &mut cache).unwrap());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_add_merges_contexts() {
        let mut set = AtnConfigSet::new(false);
        let mut cache = MergeCache::new();
        set.add(AtnConfig::new(3, 1, ctx(7)), &mut cache).unwrap();
        set.add(AtnConfig::new(3, 1, ctx(9)), &mut cache).unwrap();
        assert_eq!(set.len(), 1);
        let merged = &set.get(0).context;
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.return_state(0), 7);
        assert_eq!(merged.return_state(1), 9);
    }

    #[test]
    fn test_add_distinct_alts_kept_separate() {
        let mut set = AtnConfigSet::new(false);
        let mut cache = MergeCache::new();
        set.add(AtnConfig::new(3, 1, ctx(7)), &mut cache).unwrap();
        set.add(AtnConfig::new(3, 2, ctx(7)), &mut cache).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.unique_alt_of_configs(), INVALID_ALT);
    }

    #[test]
    fn test_frozen_set_rejects_add() {
        let mut set = AtnConfigSet::new(false);
        let mut cache = MergeCache::new();
        set.add(AtnConfig::new(0, 1, ctx(2)), &mut cache).unwrap();
        set.freeze();
        let err = set.add(AtnConfig::new(1, 1, ctx(2)), &mut cache);
        assert_eq!(err, Err(IllegalStateError::FrozenConfigSet));
    }

    #[test]
    fn test_ordered_set_keeps_context_distinct() {
        let mut set = AtnConfigSet::new_ordered();
        let mut cache = MergeCache::new();
        set.add(AtnConfig::new(3, 1, ctx(7)), &mut cache).unwrap();
        set.add(AtnConfig::new(3, 1, ctx(9)), &mut cache).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_equal_sets_hash_equal() {
        let mut cache = MergeCache::new();
        let mut a = AtnConfigSet::new(false);
        a.add(AtnConfig::new(3, 1, ctx(7)), &mut cache).unwrap();
        let mut b = AtnConfigSet::new(false);
        b.add(AtnConfig::new(3, 1, ctx(7)), &mut cache).unwrap();
        a.freeze();
        b.freeze();
        assert_eq!(a, b);
        let hash = |s: &AtnConfigSet| {
            let mut h = ahash::AHasher::default();
            s.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn test_dips_into_outer_context_flag() {
        let mut set = AtnConfigSet::new(false);
        let mut cache = MergeCache::new();
        let mut c = AtnConfig::new(1, 1, PredictionContext::empty());
        c.reaches_into_outer_context = 1;
        set.add(c, &mut cache).unwrap();
        assert!(set.dips_into_outer_context);
    }
}
