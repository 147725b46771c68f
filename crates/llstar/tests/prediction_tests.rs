//! End-to-end prediction scenarios: plain matching, ambiguity, and the
//! SLL to full-context escalation.

mod common;

use std::sync::Arc;

use llstar::error::listener::CollectingErrorListener;
use llstar::error::RecognitionError;
use llstar::lexer::Lexer;
use llstar::parser::Parser;
use llstar::simulator::PredictionMode;
use llstar::stream::{BufferedTokenStream, IntStream, ListTokenSource, StringCharStream};
use llstar::token::EOF;

use common::{
    ab_lexer_grammar, ambiguous_grammar, ctx_sensitive_grammar, linear_grammar, tok, AMB_X,
    CS_ID, CS_INT, LIN_A, LIN_B,
};

fn token_stream(tokens: Vec<llstar::token::Token>) -> BufferedTokenStream<ListTokenSource> {
    BufferedTokenStream::common(ListTokenSource::new(tokens))
}

#[test]
fn test_linear_match_through_lexer_pipeline() {
    // S1: lex "ab", parse S: 'a' 'b'.
    let lexer = Lexer::new(StringCharStream::new("ab"), ab_lexer_grammar().atn);
    let mut tokens = BufferedTokenStream::common(lexer);
    tokens.fill();
    let kinds: Vec<i32> = tokens.tokens().iter().map(|t| t.ty).collect();
    assert_eq!(kinds, vec![LIN_A, LIN_B, EOF]);

    let g = linear_grammar();
    let mut p = Parser::new(tokens, g.atn);
    p.enter_rule(g.s1, 0);
    p.set_state(g.s1);
    let a = p.match_token(LIN_A).expect("matches 'a'");
    assert_eq!(a.text, "a");
    p.set_state(g.s2);
    let b = p.match_token(LIN_B).expect("matches 'b'");
    assert_eq!(b.text, "b");
    p.set_state(g.s3);
    p.exit_rule();
    assert_eq!(p.number_of_syntax_errors(), 0);
    assert_eq!(p.input.la(1), EOF);
}

#[test]
fn test_ambiguity_reports_and_takes_minimum_alt() {
    // S2: S: A | A; input "x". Both alternatives viable forever; the
    // engine reports the ambiguity and resolves to alt 1.
    let g = ambiguous_grammar();
    let listener = CollectingErrorListener::new();
    let mut p = Parser::new(token_stream(vec![tok(AMB_X, "x", 0)]), g.atn);
    p.remove_error_listeners();
    p.add_error_listener(listener.clone());

    p.enter_rule(g.decision_state, 0);
    p.set_state(g.decision_state);
    let alt = p.adaptive_predict(g.decision).expect("prediction succeeds");
    assert_eq!(alt, 1);

    let collected = listener.collected();
    assert_eq!(collected.full_context_attempts, vec![g.decision]);
    assert_eq!(collected.ambiguities.len(), 1);
    let (decision, alts) = &collected.ambiguities[0];
    assert_eq!(*decision, g.decision);
    assert_eq!(alts.iter().collect::<Vec<_>>(), vec![1, 2]);
    assert!(collected.context_sensitivities.is_empty());
    assert_eq!(p.number_of_syntax_errors(), 0);
}

#[test]
fn test_prediction_is_stream_neutral() {
    let g = ambiguous_grammar();
    let mut p = Parser::new(token_stream(vec![tok(AMB_X, "x", 0)]), g.atn);
    p.remove_error_listeners();
    p.enter_rule(g.decision_state, 0);
    p.set_state(g.decision_state);
    let before = {
        // force lazy init so indices are comparable
        let _ = p.input.la(1);
        p.input.index()
    };
    p.adaptive_predict(g.decision).expect("prediction succeeds");
    assert_eq!(p.input.index(), before);
    // A second prediction hits the DFA cache and must also be neutral.
    p.adaptive_predict(g.decision).expect("prediction succeeds");
    assert_eq!(p.input.index(), before);
}

#[test]
fn test_sll_mode_resolves_conflict_without_fallback() {
    // Pure SLL never escalates; the conflict resolves to the minimum alt.
    let g = ambiguous_grammar();
    let listener = CollectingErrorListener::new();
    let mut p = Parser::new(token_stream(vec![tok(AMB_X, "x", 0)]), g.atn);
    p.remove_error_listeners();
    p.add_error_listener(listener.clone());
    p.interp.mode = PredictionMode::Sll;
    p.enter_rule(g.decision_state, 0);
    p.set_state(g.decision_state);
    let alt = p.adaptive_predict(g.decision).expect("prediction succeeds");
    assert_eq!(alt, 1);
    let collected = listener.collected();
    assert!(collected.full_context_attempts.is_empty());
    assert!(collected.ambiguities.is_empty());
}

#[test]
fn test_exact_ambiguity_detection_mode() {
    let g = ambiguous_grammar();
    let listener = CollectingErrorListener::new();
    let mut p = Parser::new(token_stream(vec![tok(AMB_X, "x", 0)]), g.atn);
    p.remove_error_listeners();
    p.add_error_listener(listener.clone());
    p.interp.mode = PredictionMode::LlExactAmbigDetection;
    p.enter_rule(g.decision_state, 0);
    p.set_state(g.decision_state);
    let alt = p.adaptive_predict(g.decision).expect("prediction succeeds");
    assert_eq!(alt, 1);
    let collected = listener.collected();
    assert_eq!(collected.ambiguities.len(), 1);
}

/// Drive the context-sensitive grammar to the decision inside `e` as if
/// the parser had consumed `'@'` and entered `b`.
fn at_e_decision_in_b(
    tokens: Vec<llstar::token::Token>,
) -> (Parser<BufferedTokenStream<ListTokenSource>>, common::CtxSensitiveGrammar, Arc<CollectingErrorListener>) {
    let g = ctx_sensitive_grammar();
    let listener = CollectingErrorListener::new();
    let mut p = Parser::new(token_stream(tokens), g.atn.clone());
    p.remove_error_listeners();
    p.add_error_listener(listener.clone());
    p.enter_rule(g.s_decision_state, 0);
    p.set_state(g.call_b);
    p.enter_rule(g.call_e_in_b, 2);
    p.set_state(g.call_e_in_b);
    p.enter_rule(g.e_decision_state, 3);
    p.set_state(g.e_decision_state);
    (p, g, listener)
}

#[test]
fn test_sll_conflict_escalates_and_full_context_resolves() {
    // S4: in `b`, on "34 abc" the empty alternative of `e` is correct;
    // SLL conflicts, full context resolves, and context sensitivity is
    // reported exactly once.
    let (mut p, g, listener) =
        at_e_decision_in_b(vec![tok(CS_INT, "34", 0), tok(CS_ID, "abc", 3)]);
    let alt = p.adaptive_predict(g.e_decision).expect("prediction succeeds");
    assert_eq!(alt, 2);

    let collected = listener.collected();
    assert_eq!(collected.full_context_attempts, vec![g.e_decision]);
    assert_eq!(collected.context_sensitivities, vec![(g.e_decision, 2)]);
    assert!(collected.ambiguities.is_empty());
}

#[test]
fn test_full_context_picks_int_alternative_in_a() {
    // Same decision from inside `a`: e must match the INT.
    let g = ctx_sensitive_grammar();
    let listener = CollectingErrorListener::new();
    let mut p = Parser::new(
        token_stream(vec![tok(CS_INT, "34", 0), tok(CS_ID, "abc", 3)]),
        g.atn.clone(),
    );
    p.remove_error_listeners();
    p.add_error_listener(listener.clone());
    p.enter_rule(g.s_decision_state, 0);
    p.set_state(g.call_a);
    p.enter_rule(g.call_e_in_a, 1);
    p.set_state(g.call_e_in_a);
    p.enter_rule(g.e_decision_state, 3);
    p.set_state(g.e_decision_state);
    let alt = p.adaptive_predict(g.e_decision).expect("prediction succeeds");
    assert_eq!(alt, 1);
    assert_eq!(listener.collected().context_sensitivities, vec![(g.e_decision, 1)]);
}

#[test]
fn test_no_viable_alt_carries_configs_and_restores_stream() {
    // Neither alternative of `s` starts with INT, and no configuration
    // can escape the decision entry rule.
    let g = ctx_sensitive_grammar();
    let mut p = Parser::new(token_stream(vec![tok(CS_INT, "34", 0)]), g.atn.clone());
    p.remove_error_listeners();
    p.enter_rule(g.s_decision_state, 0);
    p.set_state(g.s_decision_state);
    let before = {
        let _ = p.input.la(1);
        p.input.index()
    };
    let err = p.adaptive_predict(g.s_decision).expect_err("no viable alt");
    match &err {
        RecognitionError::NoViableAlt { decision, start_index, offending, dead_end, .. } => {
            assert_eq!(*decision, g.s_decision);
            assert_eq!(*start_index, before);
            assert_eq!(offending.as_ref().map(|t| t.ty), Some(CS_INT));
            assert!(dead_end.is_some());
        }
        other => panic!("expected NoViableAlt, got {other:?}"),
    }
    assert_eq!(p.input.index(), before);
}

#[test]
fn test_dead_decision_falls_back_to_escaped_alternative() {
    // Inside `b`, nothing matches '$' -- but the empty alternative of `e`
    // escapes the decision entry rule, so prediction prefers it over
    // failing outright.
    let (mut p, g, _listener) = at_e_decision_in_b(vec![tok(common::CS_DOLLAR, "$", 0)]);
    let alt = p.adaptive_predict(g.e_decision).expect("recovers to escaped alt");
    assert_eq!(alt, 2);
}

#[test]
fn test_sll_prediction_agrees_with_ll_when_no_conflict() {
    // SLL soundness on an unambiguous decision: both modes predict the
    // same alternative and SLL never set requires-full-context.
    let g = ctx_sensitive_grammar();
    for mode in [PredictionMode::Sll, PredictionMode::Ll] {
        let mut p = Parser::new(
            token_stream(vec![tok(common::CS_DOLLAR, "$", 0), tok(CS_INT, "1", 1)]),
            g.atn.clone(),
        );
        p.remove_error_listeners();
        p.interp.mode = mode;
        p.enter_rule(g.s_decision_state, 0);
        p.set_state(g.s_decision_state);
        let alt = p.adaptive_predict(g.s_decision).expect("prediction succeeds");
        assert_eq!(alt, 1, "mode {mode:?}");
        for state in p.interp.dfa(g.s_decision).states() {
            assert!(!state.requires_full_context);
        }
    }
}

#[test]
fn test_dfa_states_are_canonical() {
    // Repeated predictions never create configuration-set-equal twins.
    let g = ambiguous_grammar();
    let mut p = Parser::new(
        token_stream(vec![tok(AMB_X, "x", 0), tok(AMB_X, "x", 1)]),
        g.atn.clone(),
    );
    p.remove_error_listeners();
    p.enter_rule(g.decision_state, 0);
    p.set_state(g.decision_state);
    for _ in 0..3 {
        p.adaptive_predict(g.decision).expect("prediction succeeds");
    }
    let states = p.interp.dfa(g.decision).states();
    for (i, a) in states.iter().enumerate() {
        for b in &states[i + 1..] {
            assert_ne!(a.configs, b.configs, "states s{} and s{} are twins", a.id, b.id);
        }
    }
}

#[test]
fn test_shared_dfa_across_parser_instances() {
    // Two parsers for the same grammar share the decision DFA: the second
    // one predicts entirely from cache.
    let g = ambiguous_grammar();
    let dfas = Arc::new(llstar::simulator::decision_dfas(&g.atn));
    let cache = Arc::new(llstar::context::PredictionContextCache::new());

    let mut p1 = Parser::with_shared(
        token_stream(vec![tok(AMB_X, "x", 0)]),
        g.atn.clone(),
        dfas.clone(),
        cache.clone(),
        llstar::parser::NoParserHooks,
    );
    p1.remove_error_listeners();
    p1.enter_rule(g.decision_state, 0);
    p1.set_state(g.decision_state);
    p1.adaptive_predict(g.decision).expect("prediction succeeds");
    let states_after_first = dfas[g.decision].num_states();
    assert!(states_after_first > 0);

    let mut p2 = Parser::with_shared(
        token_stream(vec![tok(AMB_X, "x", 0)]),
        g.atn.clone(),
        dfas.clone(),
        cache,
        llstar::parser::NoParserHooks,
    );
    p2.remove_error_listeners();
    p2.enter_rule(g.decision_state, 0);
    p2.set_state(g.decision_state);
    let alt = p2.adaptive_predict(g.decision).expect("prediction succeeds");
    assert_eq!(alt, 1);
    assert_eq!(dfas[g.decision].num_states(), states_after_first);
}
