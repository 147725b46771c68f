//! Error listeners.
//!
//! Listeners are invoked synchronously from the recognizers and the
//! prediction engine; implementations must be fast and reentrant-safe.
//! They take `&self` so a single listener can be shared by several
//! recognizers — use interior mutability to collect.

use std::sync::{Arc, Mutex, PoisonError};

use crate::bitset::BitSet;
use crate::config::AtnConfigSet;
use crate::dfa::Dfa;
use crate::error::RecognitionError;
use crate::token::Token;

/// Receives syntax errors and prediction diagnostics.
pub trait ErrorListener: Send + Sync {
    fn syntax_error(
        &self,
        offending: Option<&Token>,
        line: u32,
        column: u32,
        msg: &str,
        error: Option<&RecognitionError>,
    );

    fn report_ambiguity(
        &self,
        dfa: &Dfa,
        start_index: usize,
        stop_index: usize,
        exact: bool,
        ambig_alts: &BitSet,
        configs: &AtnConfigSet,
    ) {
        let _ = (dfa, start_index, stop_index, exact, ambig_alts, configs);
    }

    fn report_attempting_full_context(
        &self,
        dfa: &Dfa,
        conflicting_alts: &BitSet,
        configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
        let _ = (dfa, conflicting_alts, configs, start_index, stop_index);
    }

    fn report_context_sensitivity(
        &self,
        dfa: &Dfa,
        prediction: usize,
        configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
        let _ = (dfa, prediction, configs, start_index, stop_index);
    }
}

/// Writes `line L:C msg` to stderr. Installed on recognizers by default.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleErrorListener;

impl ErrorListener for ConsoleErrorListener {
    fn syntax_error(
        &self,
        _offending: Option<&Token>,
        line: u32,
        column: u32,
        msg: &str,
        _error: Option<&RecognitionError>,
    ) {
        eprintln!("line {line}:{column} {msg}");
    }
}

/// Turns prediction diagnostics into stderr messages; useful while
/// debugging a grammar's decision behavior.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiagnosticErrorListener {
    /// When set, context-sensitivity reports (full context resolved where
    /// SLL could not) are suppressed and only true ambiguities print.
    pub exact_only: bool,
}

impl ErrorListener for DiagnosticErrorListener {
    fn syntax_error(
        &self,
        _offending: Option<&Token>,
        _line: u32,
        _column: u32,
        _msg: &str,
        _error: Option<&RecognitionError>,
    ) {
    }

    fn report_ambiguity(
        &self,
        dfa: &Dfa,
        start_index: usize,
        stop_index: usize,
        exact: bool,
        ambig_alts: &BitSet,
        _configs: &AtnConfigSet,
    ) {
        if self.exact_only && !exact {
            return;
        }
        eprintln!(
            "reportAmbiguity d={}: ambigAlts={ambig_alts:?}, input=[{start_index}..{stop_index}]",
            dfa.decision
        );
    }

    fn report_attempting_full_context(
        &self,
        dfa: &Dfa,
        conflicting_alts: &BitSet,
        _configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
        if self.exact_only {
            return;
        }
        eprintln!(
            "reportAttemptingFullContext d={}: conflictingAlts={conflicting_alts:?}, input=[{start_index}..{stop_index}]",
            dfa.decision
        );
    }

    fn report_context_sensitivity(
        &self,
        dfa: &Dfa,
        prediction: usize,
        _configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
        if self.exact_only {
            return;
        }
        eprintln!(
            "reportContextSensitivity d={}: prediction={prediction}, input=[{start_index}..{stop_index}]",
            dfa.decision
        );
    }
}

/// Records everything it hears; the listener used by the test suites.
#[derive(Debug, Default)]
pub struct CollectingErrorListener {
    inner: Mutex<Collected>,
}

#[derive(Debug, Default, Clone)]
pub struct Collected {
    pub syntax_errors: Vec<String>,
    pub ambiguities: Vec<(usize, BitSet)>,
    pub full_context_attempts: Vec<usize>,
    pub context_sensitivities: Vec<(usize, usize)>,
}

impl CollectingErrorListener {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A snapshot of everything collected so far.
    #[must_use]
    pub fn collected(&self) -> Collected {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ErrorListener for CollectingErrorListener {
    fn syntax_error(
        &self,
        _offending: Option<&Token>,
        line: u32,
        column: u32,
        msg: &str,
        _error: Option<&RecognitionError>,
    ) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .syntax_errors
            .push(format!("line {line}:{column} {msg}"));
    }

    fn report_ambiguity(
        &self,
        dfa: &Dfa,
        _start_index: usize,
        _stop_index: usize,
        _exact: bool,
        ambig_alts: &BitSet,
        _configs: &AtnConfigSet,
    ) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ambiguities
            .push((dfa.decision, ambig_alts.clone()));
    }

    fn report_attempting_full_context(
        &self,
        dfa: &Dfa,
        _conflicting_alts: &BitSet,
        _configs: &AtnConfigSet,
        _start_index: usize,
        _stop_index: usize,
    ) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .full_context_attempts
            .push(dfa.decision);
    }

    fn report_context_sensitivity(
        &self,
        dfa: &Dfa,
        prediction: usize,
        _configs: &AtnConfigSet,
        _start_index: usize,
        _stop_index: usize,
    ) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .context_sensitivities
            .push((dfa.decision, prediction));
    }
}

/// Fans a callback out to a listener list.
#[derive(Default)]
pub struct ProxyErrorListener {
    delegates: Vec<Arc<dyn ErrorListener>>,
}

impl ProxyErrorListener {
    #[must_use]
    pub fn new(delegates: Vec<Arc<dyn ErrorListener>>) -> Self {
        Self { delegates }
    }
}

impl ErrorListener for ProxyErrorListener {
    fn syntax_error(
        &self,
        offending: Option<&Token>,
        line: u32,
        column: u32,
        msg: &str,
        error: Option<&RecognitionError>,
    ) {
        for d in &self.delegates {
            d.syntax_error(offending, line, column, msg, error);
        }
    }

    fn report_ambiguity(
        &self,
        dfa: &Dfa,
        start_index: usize,
        stop_index: usize,
        exact: bool,
        ambig_alts: &BitSet,
        configs: &AtnConfigSet,
    ) {
        for d in &self.delegates {
            d.report_ambiguity(dfa, start_index, stop_index, exact, ambig_alts, configs);
        }
    }

    fn report_attempting_full_context(
        &self,
        dfa: &Dfa,
        conflicting_alts: &BitSet,
        configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
        for d in &self.delegates {
            d.report_attempting_full_context(dfa, conflicting_alts, configs, start_index, stop_index);
        }
    }

    fn report_context_sensitivity(
        &self,
        dfa: &Dfa,
        prediction: usize,
        configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
        for d in &self.delegates {
            d.report_context_sensitivity(dfa, prediction, configs, start_index, stop_index);
        }
    }
}
