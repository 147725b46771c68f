//! Prediction modes and the conflict analysis they share.
//!
//! The analysis functions operate on a configuration set after a reach
//! step. Configurations are partitioned by `(state, context)`; a decision
//! conflicts when some equivalence class is pulled toward more than one
//! alternative and no class has settled on exactly one.

use hashbrown::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::atn::state::StateId;
use crate::atn::Atn;
use crate::bitset::BitSet;
use crate::config::{AtnConfig, AtnConfigSet, INVALID_ALT};
use crate::context::{MergeCache, PredictionContext};
use crate::semantic::SemanticContext;

/// How aggressively prediction resolves decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictionMode {
    /// Strong-LL only: never fall back to full context; a conflict is
    /// reported as an ambiguity immediately.
    Sll,
    /// SLL with full-context fallback on conflict; reports ambiguity only
    /// when full context cannot resolve it. The default.
    #[default]
    Ll,
    /// Like `Ll` but keeps consuming until the conflicting alternative
    /// set stops shrinking, reporting the exact ambiguity set.
    LlExactAmbigDetection,
}

/// Key grouping configurations by `(state, context)` regardless of
/// alternative.
struct StateCtxKey(StateId, Arc<PredictionContext>);

impl PartialEq for StateCtxKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0 && (Arc::ptr_eq(&self.1, &other.1) || self.1 == other.1)
    }
}
impl Eq for StateCtxKey {}
impl Hash for StateCtxKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
        self.1.hash(state);
    }
}

/// The alternative sets of the `(state, context)` equivalence classes.
#[must_use]
pub fn conflicting_alt_subsets(configs: &AtnConfigSet) -> Vec<BitSet> {
    let mut map: HashMap<StateCtxKey, BitSet, ahash::RandomState> = HashMap::default();
    for c in configs {
        map.entry(StateCtxKey(c.state, c.context.clone()))
            .or_default()
            .set(c.alt);
    }
    map.into_values().collect()
}

/// Map from state to the alternatives predicted at that state.
#[must_use]
pub fn state_to_alt_map(configs: &AtnConfigSet) -> HashMap<StateId, BitSet, ahash::RandomState> {
    let mut map: HashMap<StateId, BitSet, ahash::RandomState> = HashMap::default();
    for c in configs {
        map.entry(c.state).or_default().set(c.alt);
    }
    map
}

/// Whether an SLL reach set is conflicted badly enough that prediction
/// must stop and escalate to full context.
///
/// Exact when every configuration is in a rule stop state; otherwise the
/// standard heuristic: some equivalence class sees more than one
/// alternative and no state has settled on exactly one.
#[must_use]
pub fn has_sll_conflict_terminating_prediction(
    mode: PredictionMode,
    configs: &AtnConfigSet,
    atn: &Atn,
) -> bool {
    if all_configs_in_rule_stop_states(configs, atn) {
        return true;
    }
    let stripped;
    let configs = if mode == PredictionMode::Sll && configs.has_semantic_context {
        // Pure SLL ignores predicates during conflict detection: strip
        // them so configs that differ only semantically collapse.
        let mut dup = AtnConfigSet::new(configs.full_ctx);
        let mut cache = MergeCache::new();
        for c in configs {
            let c = AtnConfig { semantic_context: SemanticContext::none(), ..c.clone() };
            // The duplicate set is local scratch; it is never frozen.
            let _ = dup.add(c, &mut cache);
        }
        stripped = dup;
        &stripped
    } else {
        configs
    };
    let altsets = conflicting_alt_subsets(configs);
    has_conflicting_alt_set(&altsets) && !has_state_associated_with_one_alt(configs)
}

/// Any equivalence class pulled toward more than one alternative?
#[must_use]
pub fn has_conflicting_alt_set(altsets: &[BitSet]) -> bool {
    altsets.iter().any(|alts| alts.cardinality() > 1)
}

/// Any state already committed to exactly one alternative?
#[must_use]
pub fn has_state_associated_with_one_alt(configs: &AtnConfigSet) -> bool {
    state_to_alt_map(configs)
        .values()
        .any(|alts| alts.cardinality() == 1)
}

#[must_use]
pub fn has_config_in_rule_stop_state(configs: &AtnConfigSet, atn: &Atn) -> bool {
    configs.iter().any(|c| atn.state(c.state).is_rule_stop())
}

#[must_use]
pub fn all_configs_in_rule_stop_states(configs: &AtnConfigSet, atn: &Atn) -> bool {
    configs.iter().all(|c| atn.state(c.state).is_rule_stop())
}

/// Full-context resolution: if the minimum alternative of every
/// equivalence class is the same, that alternative is the prediction.
#[must_use]
pub fn resolves_to_just_one_viable_alt(altsets: &[BitSet]) -> usize {
    single_viable_alt(altsets)
}

/// Every equivalence class conflicted?
#[must_use]
pub fn all_subsets_conflict(altsets: &[BitSet]) -> bool {
    !altsets.iter().any(|alts| alts.cardinality() == 1)
}

/// Every equivalence class the same alternative set?
#[must_use]
pub fn all_subsets_equal(altsets: &[BitSet]) -> bool {
    let mut iter = altsets.iter();
    let Some(first) = iter.next() else { return true };
    iter.all(|alts| alts == first)
}

/// Union of all alternative subsets.
#[must_use]
pub fn all_alts(altsets: &[BitSet]) -> BitSet {
    let mut union = BitSet::new();
    for alts in altsets {
        union.or_with(alts);
    }
    union
}

#[must_use]
pub fn single_viable_alt(altsets: &[BitSet]) -> usize {
    let mut viable = BitSet::new();
    for alts in altsets {
        if let Some(min) = alts.min() {
            viable.set(min);
        }
        if viable.cardinality() > 1 {
            return INVALID_ALT;
        }
    }
    viable.min().unwrap_or(INVALID_ALT)
}
