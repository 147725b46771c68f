//! Human-readable DFA dumps for diagnostics.

use std::fmt;

use crate::config::INVALID_ALT;
use crate::dfa::state::{DfaState, EdgeTarget};
use crate::dfa::Dfa;

/// Formats a DFA as one `source-symbol->target` line per edge.
///
/// Accept states render as `:sN=>alt`. Parser DFAs print token names when
/// provided (index = token type), lexer DFAs print the character.
pub struct DfaSerializer<'a> {
    dfa: &'a Dfa,
    token_names: Option<&'a [&'a str]>,
    lexer: bool,
}

impl<'a> DfaSerializer<'a> {
    /// Serializer for a parser decision DFA.
    #[must_use]
    pub fn new(dfa: &'a Dfa, token_names: Option<&'a [&'a str]>) -> Self {
        Self { dfa, token_names, lexer: false }
    }

    /// Serializer for a lexer mode DFA; edge slots are code points.
    #[must_use]
    pub fn lexer(dfa: &'a Dfa) -> Self {
        Self { dfa, token_names: None, lexer: true }
    }

    fn fmt_state(&self, f: &mut fmt::Formatter<'_>, s: &DfaState) -> fmt::Result {
        if s.is_accept {
            write!(f, ":s{}", s.id)?;
            if s.predicates.is_some() {
                write!(f, "=>pred")
            } else if s.prediction == INVALID_ALT {
                Ok(())
            } else {
                write!(f, "=>{}", s.prediction)
            }
        } else {
            write!(f, "s{}", s.id)
        }
    }

    fn fmt_symbol(&self, f: &mut fmt::Formatter<'_>, slot: usize) -> fmt::Result {
        if self.lexer {
            match u32::try_from(slot).ok().and_then(char::from_u32) {
                Some(c) if !c.is_control() => write!(f, "'{c}'"),
                _ => write!(f, "{slot}"),
            }
        } else {
            // Parser slots are symbol + 1, slot 0 being EOF.
            let symbol = slot as i64 - 1;
            if symbol < 0 {
                write!(f, "EOF")
            } else if let Some(name) =
                self.token_names.and_then(|names| names.get(symbol as usize))
            {
                write!(f, "{name}")
            } else {
                write!(f, "{symbol}")
            }
        }
    }
}

impl fmt::Display for DfaSerializer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for state in self.dfa.states() {
            for (slot, edge) in state.edges_snapshot().iter().enumerate() {
                let Some(edge) = edge else { continue };
                self.fmt_state(f, &state)?;
                write!(f, "-")?;
                self.fmt_symbol(f, slot)?;
                write!(f, "->")?;
                match edge {
                    EdgeTarget::Error => writeln!(f, "<error>")?,
                    EdgeTarget::State(target) => {
                        self.fmt_state(f, target)?;
                        writeln!(f)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atn::{AtnState, AtnStateKind};
    use crate::config::{AtnConfig, AtnConfigSet};
    use crate::context::{MergeCache, PredictionContext};
    use std::sync::Arc;

    #[test]
    fn test_serializer_lists_edges() {
        let mut decision = AtnState::new(0, 0, AtnStateKind::BlockStart { end_state: 1 });
        decision.decision = Some(0);
        let dfa = Dfa::new(0, &decision);

        let mut cache = MergeCache::new();
        let mut c0 = AtnConfigSet::new(false);
        c0.add(AtnConfig::new(2, 1, PredictionContext::empty()), &mut cache).unwrap();
        c0.freeze();
        let s0 = dfa.add_state(DfaState::new(Arc::new(c0)));

        let mut c1 = AtnConfigSet::new(false);
        c1.add(AtnConfig::new(3, 1, PredictionContext::empty()), &mut cache).unwrap();
        c1.freeze();
        let mut accept = DfaState::new(Arc::new(c1));
        accept.is_accept = true;
        accept.prediction = 1;
        let s1 = dfa.add_state(accept);

        // token type 2 -> slot 3
        s0.set_edge(3, EdgeTarget::State(s1));
        let out = DfaSerializer::new(&dfa, Some(&["<invalid>", "a", "b"])).to_string();
        assert_eq!(out, "s0-b->:s1=>1\n");
    }
}
