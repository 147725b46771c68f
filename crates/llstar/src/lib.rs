//! # llstar
//!
//! An adaptive LL(*) prediction runtime: the engine a generated (or
//! hand-written) recognizer drives to decide, at each decision point,
//! which alternative the input takes.
//!
//! ## Overview
//!
//! A compiled grammar is an [`Atn`](atn::Atn) — an NFA-like graph of
//! states and tagged transitions. At each decision the
//! [`ParserAtnSimulator`](simulator::ParserAtnSimulator) symbolically
//! executes that graph over the lookahead: configuration sets
//! ([`AtnConfigSet`](config::AtnConfigSet)) track every `(state,
//! alternative, call stack)` the grammar could be in, with the call
//! stacks folded into a hash-consed DAG
//! ([`PredictionContext`](context::PredictionContext)) so the sets stay
//! finite. Everything learned is cached in per-decision DFAs
//! ([`Dfa`](dfa::Dfa)) shared by every recognizer instance for the
//! grammar, so steady-state prediction is a handful of array lookups.
//!
//! Prediction starts in SLL mode (calling context approximated by a
//! wildcard); when a decision turns out to be context-sensitive the
//! engine escalates to full-context LL for that decision only, and
//! precedence-DFA specialization makes left-recursive rules cheap. The
//! [`LexerAtnSimulator`](simulator::LexerAtnSimulator) applies the same
//! machinery to characters, with longest-match accept tracking, lexer
//! modes, and position-independent caching of lexer actions.
//!
//! ## Quick start
//!
//! ```rust
//! use llstar::atn::builder::AtnBuilder;
//! use llstar::lexer::Lexer;
//! use llstar::stream::{BufferedTokenStream, IntStream, StringCharStream, TokenStream};
//! use llstar::token::EOF;
//!
//! // A one-mode lexer: A: 'a'; B: 'b';
//! let mut b = AtnBuilder::lexer(2, 2);
//! let (mode, tokens_start) = b.add_mode();
//! assert_eq!(mode, 0);
//! for (rule, (ch, ty)) in [('a', 1), ('b', 2)].into_iter().enumerate() {
//!     let (start, stop) = b.rule_states(rule);
//!     b.set_rule_token_type(rule, ty);
//!     let s = b.add_basic(rule);
//!     b.epsilon(tokens_start, start);
//!     b.atom(start, s, ch as i32);
//!     b.epsilon(s, stop);
//! }
//! let atn = b.build().expect("valid ATN");
//!
//! let lexer = Lexer::new(StringCharStream::new("ab"), atn);
//! let mut tokens = BufferedTokenStream::common(lexer);
//! assert_eq!(tokens.la(1), 1);
//! assert_eq!(tokens.la(2), 2);
//! assert_eq!(tokens.la(3), EOF);
//! ```
//!
//! ## Modules
//!
//! - [`atn`] - the grammar graph, its builder, and the wire codec
//! - [`context`] - graph-structured prediction stacks and merging
//! - [`config`] - configurations and configuration sets
//! - [`dfa`] - the lazily built decision DFA cache
//! - [`simulator`] - the parser and lexer prediction engines
//! - [`lexer`] / [`parser`] - the recognizer drivers
//! - [`stream`] - char/token stream abstractions
//! - [`error`] - recognition errors, listeners, and recovery strategies

pub mod atn;
pub mod bitset;
pub mod config;
pub mod context;
pub mod dfa;
pub mod error;
pub mod interval;
pub mod lexer;
pub mod parser;
pub mod semantic;
pub mod simulator;
pub mod stream;
pub mod token;

pub use atn::{Atn, GrammarKind};
pub use bitset::BitSet;
pub use config::{AtnConfig, AtnConfigSet};
pub use context::{MergeCache, PredictionContext, PredictionContextCache};
pub use dfa::{Dfa, DfaSerializer, DfaState};
pub use error::{AtnError, IllegalStateError, RecognitionError};
pub use interval::{Interval, IntervalSet};
pub use lexer::Lexer;
pub use parser::Parser;
pub use semantic::SemanticContext;
pub use simulator::{LexerAtnSimulator, ParserAtnSimulator, PredictionMode};
pub use stream::{BufferedTokenStream, StringCharStream};
pub use token::Token;
