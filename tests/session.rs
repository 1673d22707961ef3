//! End-to-end pipeline tests: source text through tokenizer, parser, IR
//! generation, and the execution engine, via the public session API.

use pretty_assertions::assert_eq;

use prism::backend::Backend;
use prism::error::{CodegenError, CompilerError};
use prism::session::{Reply, Session};

fn eval_value(session: &mut Session, source: &str) -> f64 {
    let mut replies = session.eval(source);
    assert_eq!(replies.len(), 1, "expected one statement in {source:?}");
    match replies.pop().unwrap() {
        Ok(Reply::Value(value)) => value,
        other => panic!("expected a value from {source:?}, got {other:?}"),
    }
}

fn eval_ok(session: &mut Session, source: &str) {
    for reply in session.eval(source) {
        reply.expect("statement failed");
    }
}

fn eval_err(session: &mut Session, source: &str) -> CompilerError {
    let mut replies = session.eval(source);
    assert_eq!(replies.len(), 1, "expected one statement in {source:?}");
    match replies.pop().unwrap() {
        Err(err) => err,
        other => panic!("expected an error from {source:?}, got {other:?}"),
    }
}

#[test]
fn arithmetic_precedence_and_associativity() {
    let mut session = Session::new();
    assert_eq!(eval_value(&mut session, "1+2*3;"), 7.0);
    assert_eq!(eval_value(&mut session, "1-2-3;"), -4.0);
    assert_eq!(eval_value(&mut session, "(1+2)*3;"), 9.0);
    assert_eq!(eval_value(&mut session, "2 < 3;"), 1.0);
    assert_eq!(eval_value(&mut session, "3 < 2;"), 0.0);
}

#[test]
fn user_binary_operator_defines_and_evaluates() {
    let mut session = Session::new();
    eval_ok(&mut session, "def binary > 10 (a b) b < a;");
    assert_eq!(eval_value(&mut session, "2 > 1;"), 1.0);
    assert_eq!(eval_value(&mut session, "1 > 2;"), 0.0);
    // Precedence 10 sits below '+': `1+1 > 1` groups as `(1+1) > 1`.
    assert_eq!(eval_value(&mut session, "1+1 > 1;"), 1.0);
}

#[test]
fn user_operator_is_unknown_before_its_definition() {
    let mut session = Session::new();
    let err = eval_err(&mut session, "1 > 2;");
    assert!(matches!(err, CompilerError::Parse { .. }));

    eval_ok(&mut session, "def binary > 10 (a b) b < a;");
    assert_eq!(eval_value(&mut session, "1 > 2;"), 0.0);
}

#[test]
fn operator_arity_mismatch_is_a_declaration_error() {
    let mut session = Session::new();
    let err = eval_err(&mut session, "def binary ~ (a b c) 0;");
    assert!(matches!(err, CompilerError::Parse { .. }));

    // '~' must not have been registered: using it infix still fails to
    // parse.
    let err = eval_err(&mut session, "1 ~ 2;");
    assert!(matches!(err, CompilerError::Parse { .. }));
}

#[test]
fn user_unary_operator() {
    let mut session = Session::new();
    eval_ok(&mut session, "def unary ! (v) if v then 0 else 1;");
    assert_eq!(eval_value(&mut session, "!0;"), 1.0);
    assert_eq!(eval_value(&mut session, "!5;"), 0.0);
    // Stacked prefixes apply innermost first.
    assert_eq!(eval_value(&mut session, "!!5;"), 1.0);
}

#[test]
fn var_shadowing_restores_outer_binding() {
    let mut session = Session::new();
    assert_eq!(
        eval_value(&mut session, "var x = 1 in (var x = 2 in x) + x;"),
        3.0
    );
}

#[test]
fn var_default_initializer_is_zero() {
    let mut session = Session::new();
    assert_eq!(eval_value(&mut session, "var a, b = 7 in a + b;"), 7.0);
}

#[test]
fn assignment_is_an_expression() {
    let mut session = Session::new();
    eval_ok(&mut session, "def f(x) var y = 0 in (y = x) + y;");
    assert_eq!(eval_value(&mut session, "f(3);"), 6.0);
}

#[test]
fn for_loop_with_zero_trip_count_yields_zero() {
    let mut session = Session::new();
    // The body never executes and the loop's own value is 0.
    assert_eq!(eval_value(&mut session, "for i = 1, i < 1, 1 in 99;"), 0.0);
}

#[test]
fn for_loop_accumulates_through_mutation() {
    let mut session = Session::new();
    eval_ok(
        &mut session,
        "def sum(n) var s = 0 in (for i = 0, i < n in s = s + i) + s;",
    );
    assert_eq!(eval_value(&mut session, "sum(5);"), 10.0);
    assert_eq!(eval_value(&mut session, "sum(0);"), 0.0);
}

#[test]
fn for_loop_default_step_is_one() {
    let mut session = Session::new();
    eval_ok(
        &mut session,
        "def count(n) var c = 0 in (for i = 0, i < n in c = c + 1) + c;",
    );
    assert_eq!(eval_value(&mut session, "count(4);"), 4.0);
}

#[test]
fn for_loop_with_explicit_step() {
    let mut session = Session::new();
    eval_ok(
        &mut session,
        "def evens(n) var s = 0 in (for i = 0, i < n, 2 in s = s + i) + s;",
    );
    // 0 + 2 + 4 + 6 + 8
    assert_eq!(eval_value(&mut session, "evens(10);"), 20.0);
}

#[test]
fn for_loop_variable_shadows_and_restores() {
    let mut session = Session::new();
    assert_eq!(
        eval_value(
            &mut session,
            "var i = 42 in (for i = 0, i < 3 in i) + i;"
        ),
        42.0
    );
}

#[test]
fn redefinition_with_different_arity_is_fatal() {
    let mut session = Session::new();
    eval_ok(&mut session, "extern foo(a b);");

    let err = eval_err(&mut session, "extern foo(a);");
    assert!(matches!(
        err,
        CompilerError::Codegen(CodegenError::Redefinition { .. })
    ));

    // Identical signature is an idempotent no-op.
    eval_ok(&mut session, "extern foo(a b);");
}

#[test]
fn recursion_evaluates_factorial() {
    let mut session = Session::new();
    eval_ok(
        &mut session,
        "def fact(n) if n < 2 then 1 else n*fact(n-1);",
    );
    assert_eq!(eval_value(&mut session, "fact(5);"), 120.0);
    assert_eq!(eval_value(&mut session, "fact(1);"), 1.0);
}

#[test]
fn mutual_recursion_through_forward_extern() {
    let mut session = Session::new();
    eval_ok(&mut session, "extern isodd(n);");
    eval_ok(
        &mut session,
        "def iseven(n) if n < 1 then 1 else isodd(n-1);",
    );
    eval_ok(
        &mut session,
        "def isodd(n) if n < 1 then 0 else iseven(n-1);",
    );
    assert_eq!(eval_value(&mut session, "iseven(10);"), 1.0);
    assert_eq!(eval_value(&mut session, "isodd(7);"), 1.0);
}

#[test]
fn failed_body_rolls_back_registry_and_backend() {
    let mut session = Session::new();
    let err = eval_err(&mut session, "def broken(x) y;");
    assert!(matches!(
        err,
        CompilerError::Codegen(CodegenError::UndefinedVariable(_))
    ));

    // No symbol was left behind in the backend.
    assert!(session.backend().address_of("broken").is_none());

    // And no prototype either: calling it is an undefined-callee error,
    // not an arity error against a phantom registration.
    let err = eval_err(&mut session, "broken(1);");
    assert!(matches!(
        err,
        CompilerError::Codegen(CodegenError::UndefinedCallee(_))
    ));

    // The name is fully usable afterwards.
    eval_ok(&mut session, "def broken(x) x;");
    assert_eq!(eval_value(&mut session, "broken(2);"), 2.0);
}

#[test]
fn failed_operator_body_unregisters_the_operator() {
    let mut session = Session::new();
    let err = eval_err(&mut session, "def binary > 10 (a b) nonsense;");
    assert!(matches!(
        err,
        CompilerError::Codegen(CodegenError::UndefinedVariable(_))
    ));

    // '>' must not parse as an operator afterwards.
    let err = eval_err(&mut session, "1 > 2;");
    assert!(matches!(err, CompilerError::Parse { .. }));
}

#[test]
fn function_redefinition_with_same_arity_takes_effect() {
    let mut session = Session::new();
    eval_ok(&mut session, "def f(x) x + 1;");
    assert_eq!(eval_value(&mut session, "f(1);"), 2.0);

    eval_ok(&mut session, "def f(x) x * 10;");
    assert_eq!(eval_value(&mut session, "f(1);"), 10.0);
}

#[test]
fn native_extern_is_callable() {
    let mut session = Session::new();
    eval_ok(&mut session, "extern sqrt(x);");
    assert_eq!(eval_value(&mut session, "sqrt(16);"), 4.0);
    eval_ok(&mut session, "extern sin(a);");
    assert_eq!(eval_value(&mut session, "sin(0);"), 0.0);
}

#[test]
fn extern_without_definition_fails_at_call_time() {
    let mut session = Session::new();
    eval_ok(&mut session, "extern ghost(a);");
    let err = eval_err(&mut session, "ghost(1);");
    assert!(matches!(err, CompilerError::Backend(_)));
}

#[test]
fn statement_recovery_continues_after_errors() {
    let mut session = Session::new();
    let replies = session.eval("def (x) 1; 42; undefinedvar; 7;");
    assert_eq!(replies.len(), 4);
    assert!(replies[0].is_err());
    assert!(matches!(replies[1], Ok(Reply::Value(v)) if v == 42.0));
    assert!(replies[2].is_err());
    assert!(matches!(replies[3], Ok(Reply::Value(v)) if v == 7.0));
}

#[test]
fn definitions_survive_across_eval_calls() {
    let mut session = Session::new();
    eval_ok(&mut session, "def double(x) x + x;");
    // The defining unit has long been handed off; the call still resolves.
    assert_eq!(eval_value(&mut session, "double(21);"), 42.0);
}

#[test]
fn session_reset_restores_initial_state() {
    let mut session = Session::new();
    eval_ok(&mut session, "def binary > 10 (a b) b < a;");
    eval_ok(&mut session, "def f(x) x;");

    session.reset();

    // The user operator is gone from the table.
    let err = eval_err(&mut session, "1 > 2;");
    assert!(matches!(err, CompilerError::Parse { .. }));
    // The function is gone from registry and backend.
    assert!(session.backend().address_of("f").is_none());
    let err = eval_err(&mut session, "f(1);");
    assert!(matches!(
        err,
        CompilerError::Codegen(CodegenError::UndefinedCallee(_))
    ));
    // Built-ins still work.
    assert_eq!(eval_value(&mut session, "2*3;"), 6.0);
}

#[test]
fn deep_recursion_is_a_backend_error_not_a_crash() {
    let mut session = Session::new();
    eval_ok(&mut session, "def loop(n) loop(n+1);");
    let err = eval_err(&mut session, "loop(0);");
    assert!(matches!(err, CompilerError::Backend(_)));
}

#[test]
fn conditional_branches_select_correct_values() {
    let mut session = Session::new();
    eval_ok(&mut session, "def pick(x) if x < 10 then x*2 else x-10;");
    assert_eq!(eval_value(&mut session, "pick(3);"), 6.0);
    assert_eq!(eval_value(&mut session, "pick(13);"), 3.0);

    // Nested conditionals exercise merge-block bookkeeping.
    eval_ok(
        &mut session,
        "def clamp(x) if x < 0 then 0 else if 10 < x then 10 else x;",
    );
    assert_eq!(eval_value(&mut session, "clamp(0-5);"), 0.0);
    assert_eq!(eval_value(&mut session, "clamp(5);"), 5.0);
    assert_eq!(eval_value(&mut session, "clamp(50);"), 10.0);
}

#[test]
fn tutorial_style_pipe_operator() {
    let mut session = Session::new();
    eval_ok(
        &mut session,
        "def binary | 5 (a b) if a then 1 else if b then 1 else 0;",
    );
    assert_eq!(eval_value(&mut session, "0 | 3;"), 1.0);
    assert_eq!(eval_value(&mut session, "0 | 0;"), 0.0);
}

#[test]
fn operator_redeclaration_updates_precedence_for_later_parses() {
    let mut session = Session::new();
    eval_ok(&mut session, "def binary > 10 (a b) b < a;");
    // Re-declare with multiplicative precedence: `1+2>3` now groups as
    // `1+(2>3)`.
    eval_ok(&mut session, "def binary > 50 (a b) b < a;");
    assert_eq!(eval_value(&mut session, "1 + 2 > 3;"), 1.0);
}
