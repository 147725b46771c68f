//! Shared grammar fixtures for the integration suites, built with the
//! ATN builder exactly the way a code generator would emit them.

#![allow(dead_code)]

use std::sync::Arc;

use llstar::atn::builder::AtnBuilder;
use llstar::atn::state::StateId;
use llstar::atn::Atn;
use llstar::lexer::action::LexerAction;
use llstar::token::{Token, EOF, NO_TOKEN_INDEX};

pub fn tok(ty: i32, text: &str, start: usize) -> Token {
    Token {
        ty,
        text: text.into(),
        channel: 0,
        start,
        stop: start + text.len().saturating_sub(1),
        line: 1,
        column: start as u32,
        index: NO_TOKEN_INDEX,
    }
}

/// `S: 'a' 'b' ;` with a=1, b=2. No decisions.
pub struct LinearGrammar {
    pub atn: Arc<Atn>,
    pub s1: StateId,
    pub s2: StateId,
    pub s3: StateId,
}

pub const LIN_A: i32 = 1;
pub const LIN_B: i32 = 2;

pub fn linear_grammar() -> LinearGrammar {
    let mut b = AtnBuilder::parser(1, 2);
    let (start, stop) = b.rule_states(0);
    let s1 = b.add_basic(0);
    let s2 = b.add_basic(0);
    let s3 = b.add_basic(0);
    b.epsilon(start, s1);
    b.atom(s1, s2, LIN_A);
    b.atom(s2, s3, LIN_B);
    b.epsilon(s3, stop);
    LinearGrammar { atn: b.build().expect("valid ATN"), s1, s2, s3 }
}

/// `S: A | A ; A: 'x' ;` with x=1. Decision 0 is genuinely ambiguous.
pub struct AmbiguousGrammar {
    pub atn: Arc<Atn>,
    pub decision: usize,
    pub decision_state: StateId,
}

pub const AMB_X: i32 = 1;

pub fn ambiguous_grammar() -> AmbiguousGrammar {
    let mut b = AtnBuilder::parser(2, 1);
    let (start_s, stop_s) = b.rule_states(0);
    let (start_a, stop_a) = b.rule_states(1);

    let (d, end) = b.add_block(0);
    let decision = b.add_decision(d);
    b.epsilon(start_s, d);
    let alt1 = b.add_basic(0);
    let f1 = b.add_basic(0);
    b.epsilon(d, alt1);
    b.rule_call(alt1, 1, f1, 0);
    b.epsilon(f1, end);
    let alt2 = b.add_basic(0);
    let f2 = b.add_basic(0);
    b.epsilon(d, alt2);
    b.rule_call(alt2, 1, f2, 0);
    b.epsilon(f2, end);
    b.epsilon(end, stop_s);

    let ax = b.add_basic(1);
    let ax2 = b.add_basic(1);
    b.epsilon(start_a, ax);
    b.atom(ax, ax2, AMB_X);
    b.epsilon(ax2, stop_a);

    AmbiguousGrammar { atn: b.build().expect("valid ATN"), decision, decision_state: d }
}

/// The classic context-sensitive grammar:
///
/// ```text
/// s : '$' a | '@' b ;
/// a : e ID ;
/// b : e INT ID ;
/// e : INT | ;
/// ```
///
/// The decision in `e` conflicts under SLL (the merged follow of `a` and
/// `b` makes both alternatives viable) but resolves uniquely with the
/// real calling context.
pub struct CtxSensitiveGrammar {
    pub atn: Arc<Atn>,
    pub s_decision: usize,
    pub e_decision: usize,
    pub s_decision_state: StateId,
    pub e_decision_state: StateId,
    /// Call site of `b` inside `s`.
    pub call_b: StateId,
    /// Call site of `e` inside `b`.
    pub call_e_in_b: StateId,
    /// Call site of `a` inside `s`.
    pub call_a: StateId,
    /// Call site of `e` inside `a`.
    pub call_e_in_a: StateId,
}

pub const CS_DOLLAR: i32 = 1;
pub const CS_AT: i32 = 2;
pub const CS_INT: i32 = 3;
pub const CS_ID: i32 = 4;

pub fn ctx_sensitive_grammar() -> CtxSensitiveGrammar {
    let mut b = AtnBuilder::parser(4, 4);
    let (start_s, stop_s) = b.rule_states(0);
    let (start_a, stop_a) = b.rule_states(1);
    let (start_b, stop_b) = b.rule_states(2);
    let (start_e, stop_e) = b.rule_states(3);

    // s : '$' a | '@' b ;
    let (d0, end0) = b.add_block(0);
    let s_decision = b.add_decision(d0);
    b.epsilon(start_s, d0);
    let s_alt1 = b.add_basic(0);
    let call_a = b.add_basic(0);
    let f_a = b.add_basic(0);
    b.epsilon(d0, s_alt1);
    b.atom(s_alt1, call_a, CS_DOLLAR);
    b.rule_call(call_a, 1, f_a, 0);
    b.epsilon(f_a, end0);
    let s_alt2 = b.add_basic(0);
    let call_b = b.add_basic(0);
    let f_b = b.add_basic(0);
    b.epsilon(d0, s_alt2);
    b.atom(s_alt2, call_b, CS_AT);
    b.rule_call(call_b, 2, f_b, 0);
    b.epsilon(f_b, end0);
    b.epsilon(end0, stop_s);

    // a : e ID ;
    let call_e_in_a = b.add_basic(1);
    let fa1 = b.add_basic(1);
    let fa2 = b.add_basic(1);
    b.epsilon(start_a, call_e_in_a);
    b.rule_call(call_e_in_a, 3, fa1, 0);
    b.atom(fa1, fa2, CS_ID);
    b.epsilon(fa2, stop_a);

    // b : e INT ID ;
    let call_e_in_b = b.add_basic(2);
    let fb1 = b.add_basic(2);
    let fb2 = b.add_basic(2);
    let fb3 = b.add_basic(2);
    b.epsilon(start_b, call_e_in_b);
    b.rule_call(call_e_in_b, 3, fb1, 0);
    b.atom(fb1, fb2, CS_INT);
    b.atom(fb2, fb3, CS_ID);
    b.epsilon(fb3, stop_b);

    // e : INT | ;
    let (d3, end3) = b.add_block(3);
    let e_decision = b.add_decision(d3);
    b.epsilon(start_e, d3);
    let e_alt1 = b.add_basic(3);
    let e_alt1_end = b.add_basic(3);
    b.epsilon(d3, e_alt1);
    b.atom(e_alt1, e_alt1_end, CS_INT);
    b.epsilon(e_alt1_end, end3);
    let e_alt2 = b.add_basic(3);
    b.epsilon(d3, e_alt2);
    b.epsilon(e_alt2, end3);
    b.epsilon(end3, stop_e);

    CtxSensitiveGrammar {
        atn: b.build().expect("valid ATN"),
        s_decision,
        e_decision,
        s_decision_state: d0,
        e_decision_state: d3,
        call_b,
        call_e_in_b,
        call_a,
        call_e_in_a,
    }
}

/// Left-recursive expression grammar after the precedence transform:
///
/// ```text
/// s : e EOF ;
/// e : e '+' e | INT ;   =>   e[p] : INT ( {1 >= p}? '+' e[2] )* ;
/// ```
pub struct ExprGrammar {
    pub atn: Arc<Atn>,
    pub decision: usize,
    pub loop_entry: StateId,
    /// State in `s` whose transition invokes `e` at precedence 0.
    pub call_e: StateId,
    /// First state of rule `e`'s body (primary INT match).
    pub e_body: StateId,
    /// State whose transition is the recursive `e[2]` call.
    pub recurse_site: StateId,
    pub s_body: StateId,
}

pub const EXPR_PLUS: i32 = 1;
pub const EXPR_INT: i32 = 2;

pub fn expr_grammar() -> ExprGrammar {
    let mut b = AtnBuilder::parser(2, 2);
    b.mark_left_recursive(1);
    let (start_s, stop_s) = b.rule_states(0);
    let (start_e, stop_e) = b.rule_states(1);

    // s : e EOF ;
    let call_e = b.add_basic(0);
    let fs = b.add_basic(0);
    let fe = b.add_basic(0);
    b.epsilon(start_s, call_e);
    b.rule_call(call_e, 1, fs, 0);
    b.atom(fs, fe, EOF);
    b.epsilon(fe, stop_s);

    // e : INT ( {1 >= p}? '+' e[2] )* ;
    let p1 = b.add_basic(1);
    let p2 = b.add_basic(1);
    b.epsilon(start_e, p1);
    b.atom(p1, p2, EXPR_INT);
    let star = b.add_star_loop(1, true);
    let decision = b.add_decision(star.entry);
    b.epsilon(p2, star.entry);
    let q0 = b.add_basic(1);
    let q1 = b.add_basic(1);
    let q2 = b.add_basic(1);
    b.epsilon(star.block_start, q0);
    b.precedence(q0, q1, 1);
    b.atom(q1, q2, EXPR_PLUS);
    b.rule_call(q2, 1, star.block_end, 2);
    b.epsilon(star.loop_end, stop_e);

    ExprGrammar {
        atn: b.build().expect("valid ATN"),
        decision,
        loop_entry: star.entry,
        call_e,
        e_body: p1,
        recurse_site: q2,
        s_body: call_e,
    }
}

/// Lexer with modes:
///
/// ```text
/// // DEFAULT_MODE
/// LT : '<' -> pushMode(TAG) ;
/// // mode TAG
/// ID : [a-z]+ -> popMode ;
/// ```
pub struct ModesLexerGrammar {
    pub atn: Arc<Atn>,
}

pub const LEX_LT: i32 = 1;
pub const LEX_ID: i32 = 2;

pub fn modes_lexer_grammar() -> ModesLexerGrammar {
    let mut b = AtnBuilder::lexer(2, 2);
    let (_, default_start) = b.add_mode();
    let (tag_mode, tag_start) = b.add_mode();
    assert_eq!(tag_mode, 1);

    // LT : '<' -> pushMode(TAG)
    let push_tag = b.add_lexer_action(LexerAction::PushMode(1));
    b.set_rule_token_type(0, LEX_LT);
    let (lt_start, lt_stop) = b.rule_states(0);
    let l1 = b.add_basic(0);
    let l2 = b.add_basic(0);
    b.epsilon(default_start, lt_start);
    b.atom(lt_start, l1, i32::from(b'<'));
    b.action(l1, l2, 0, push_tag, false);
    b.epsilon(l2, lt_stop);

    // ID : [a-z]+ -> popMode
    let pop = b.add_lexer_action(LexerAction::PopMode);
    b.set_rule_token_type(1, LEX_ID);
    let (id_start, id_stop) = b.rule_states(1);
    let i1 = b.add_basic(1);
    let i2 = b.add_basic(1);
    b.epsilon(tag_start, id_start);
    b.range(id_start, i1, i32::from(b'a'), i32::from(b'z'));
    b.range(i1, i1, i32::from(b'a'), i32::from(b'z'));
    b.action(i1, i2, 1, pop, false);
    b.epsilon(i2, id_stop);

    ModesLexerGrammar { atn: b.build().expect("valid ATN") }
}

/// Single-mode lexer `A: 'a'; B: 'b';` used by the end-to-end pipeline.
pub struct AbLexerGrammar {
    pub atn: Arc<Atn>,
}

pub fn ab_lexer_grammar() -> AbLexerGrammar {
    let mut b = AtnBuilder::lexer(2, 2);
    let (_, start) = b.add_mode();
    for (rule, (ch, ty)) in [(b'a', LIN_A), (b'b', LIN_B)].into_iter().enumerate() {
        b.set_rule_token_type(rule, ty);
        let (rs, re) = b.rule_states(rule);
        let s = b.add_basic(rule);
        b.epsilon(start, rs);
        b.atom(rs, s, i32::from(ch));
        b.epsilon(s, re);
    }
    AbLexerGrammar { atn: b.build().expect("valid ATN") }
}
