use lzr_core::ast::build::*;
use lzr_core::ast::Expr;
use lzr_core::error::{ConditionKind, Error};
use lzr_core::promise::PromiseState;
use lzr_core::value::Value;
use lzr_core::Result;
use lzr_interpret::intrinsics::IntrinsicFunction;
use lzr_interpret::{Interpreter, InterpreterOptions};
use pretty_assertions::assert_eq;

fn interpreter() -> Interpreter {
    Interpreter::new(InterpreterOptions::default())
}

/// `bump <- function() { n <<- n + 1; n }` with `n <- 0`
fn define_counter(interp: &mut Interpreter) -> Result<()> {
    let bump = function(
        vec![],
        block(vec![
            super_assign("n", binary("+", sym("n"), num(1.0))),
            sym("n"),
        ]),
    )?;
    interp.eval_all(&[assign("n", num(0.0)), assign("bump", bump)])?;
    Ok(())
}

fn missing_of(name: &str) -> Expr {
    call_pos("missing", vec![sym(name)])
}

// ===== FORCING =====

#[test]
fn forcing_twice_evaluates_once() -> Result<()> {
    let mut interp = interpreter();
    define_counter(&mut interp)?;
    let twice = function(vec![formal("a")], block(vec![sym("a"), sym("a")]))?;
    interp.eval_toplevel(&assign("twice", twice))?;

    let value = interp.eval_toplevel(&call_pos("twice", vec![call_pos("bump", vec![])]))?;
    assert_eq!(value, Value::double(1.0));
    assert_eq!(interp.get_global("n"), Some(Value::double(1.0)));
    Ok(())
}

#[test]
fn host_forcing_is_memoized() -> Result<()> {
    let mut interp = interpreter();
    define_counter(&mut interp)?;
    let global = interp.global_env();
    let promise = interp.make_promise(call_pos("bump", vec![]), global);

    assert_eq!(interp.force_promise(&promise)?, Value::double(1.0));
    assert_eq!(interp.force_promise(&promise)?, Value::double(1.0));
    assert_eq!(promise.state(), PromiseState::Evaluated);
    assert_eq!(interp.stats().promises_forced, 1);
    Ok(())
}

#[test]
fn arguments_are_evaluated_in_order_of_first_use() -> Result<()> {
    let mut interp = interpreter();
    let f = function(vec![formal("a"), formal("b")], block(vec![sym("b"), sym("a")]))?;
    interp.eval_toplevel(&assign("f", f))?;

    interp.eval_toplevel(&call_pos(
        "f",
        vec![call_pos("cat", vec![text("a")]), call_pos("cat", vec![text("b")])],
    ))?;
    assert_eq!(interp.take_output(), "ba");
    Ok(())
}

#[test]
fn unused_argument_is_never_evaluated() -> Result<()> {
    let mut interp = interpreter();
    let f = function(vec![formal("a"), formal("b")], sym("a"))?;
    interp.eval_toplevel(&assign("f", f))?;

    let value = interp.eval_toplevel(&call_pos(
        "f",
        vec![num(1.0), call_pos("stop", vec![text("never")])],
    ))?;
    assert_eq!(value, Value::double(1.0));
    Ok(())
}

#[test]
fn failed_force_is_retried_after_try() -> Result<()> {
    let mut interp = interpreter();
    // flaky <- function() { n <<- n + 1; if (n < 2) stop("boom"); n }
    let flaky = function(
        vec![],
        block(vec![
            super_assign("n", binary("+", sym("n"), num(1.0))),
            if_(
                binary("<", sym("n"), num(2.0)),
                call_pos("stop", vec![text("boom")]),
                None,
            ),
            sym("n"),
        ]),
    )?;
    // f <- function(a) { try(a, silent = TRUE); a }
    let f = function(
        vec![formal("a")],
        block(vec![
            call("try", vec![arg(sym("a")), named("silent", lgl(true))]),
            sym("a"),
        ]),
    )?;
    interp.eval_all(&[assign("n", num(0.0)), assign("flaky", flaky), assign("f", f)])?;

    let value = interp.eval_toplevel(&call_pos("f", vec![call_pos("flaky", vec![])]))?;
    assert_eq!(value, Value::double(2.0));
    assert!(interp.diagnostics().get_diagnostics().is_empty());
    Ok(())
}

#[test]
fn try_returns_a_classed_error_string() -> Result<()> {
    let mut interp = interpreter();
    let g = function(vec![], call_pos("stop", vec![text("bad")]))?;
    interp.eval_toplevel(&assign("g", g))?;

    let value = interp.eval_toplevel(&call_pos("try", vec![call_pos("g", vec![])]))?;
    assert_eq!(value.as_symbol().map(|s| s.to_string()), Some("Error in g() : bad\n".to_string()));
    let class = value.as_vector().and_then(|v| v.attribute("class"));
    assert_eq!(class, Some(Value::string("try-error")));
    assert_eq!(interp.diagnostics().get_diagnostics().len(), 1);
    Ok(())
}

// ===== SELF REFERENCE =====

#[test]
fn self_referential_default_yields_missing() -> Result<()> {
    let mut interp = interpreter();
    let f = function(vec![formal_default("x", sym("x"))], sym("x"))?;
    interp.eval_toplevel(&assign("f", f))?;

    let value = interp.eval_toplevel(&call_pos("f", vec![]))?;
    assert!(value.is_missing());
    Ok(())
}

#[test]
fn strict_cycles_raise_a_condition() -> Result<()> {
    let mut interp = Interpreter::new(InterpreterOptions {
        strict_promise_cycles: true,
        ..InterpreterOptions::default()
    });
    let f = function(vec![formal_default("x", sym("x"))], sym("x"))?;
    interp.eval_toplevel(&assign("f", f))?;

    let err = interp.eval_toplevel(&call_pos("f", vec![])).unwrap_err();
    assert_eq!(err.kind(), Some(ConditionKind::CyclicPromise));
    assert!(err.to_string().contains("promise already under evaluation"));
    Ok(())
}

// ===== MISSINGNESS =====

#[test]
fn missing_reports_unsupplied_formals() -> Result<()> {
    let mut interp = interpreter();
    let f = function(vec![formal("x")], missing_of("x"))?;
    let g = function(vec![formal_default("x", num(1.0))], missing_of("x"))?;
    interp.eval_all(&[assign("f", f), assign("g", g)])?;

    assert_eq!(interp.eval_toplevel(&call_pos("f", vec![]))?, Value::logical(true));
    assert_eq!(interp.eval_toplevel(&call_pos("f", vec![null()]))?, Value::logical(false));
    assert_eq!(interp.eval_toplevel(&call_pos("g", vec![]))?, Value::logical(true));
    assert_eq!(interp.eval_toplevel(&call_pos("g", vec![num(2.0)]))?, Value::logical(false));
    Ok(())
}

#[test]
fn missing_propagates_through_bare_variables() -> Result<()> {
    let mut interp = interpreter();
    let f = function(vec![formal("x")], missing_of("x"))?;
    let outer = function(vec![formal("a")], call_pos("f", vec![sym("a")]))?;
    let outer2 = function(vec![formal("b")], call_pos("outer", vec![sym("b")]))?;
    interp.eval_all(&[assign("f", f), assign("outer", outer), assign("outer2", outer2)])?;

    assert_eq!(interp.eval_toplevel(&call_pos("outer", vec![]))?, Value::logical(true));
    assert_eq!(interp.eval_toplevel(&call_pos("outer2", vec![]))?, Value::logical(true));
    assert_eq!(
        interp.eval_toplevel(&call_pos("outer", vec![num(1.0)]))?,
        Value::logical(false)
    );
    Ok(())
}

#[test]
fn missing_varargs_and_empty_arguments() -> Result<()> {
    let mut interp = interpreter();
    let dots = function(vec![formal("...")], missing_of("..."))?;
    let pair = function(vec![formal("x"), formal("y")], missing_of("x"))?;
    interp.eval_all(&[assign("dots", dots), assign("pair", pair)])?;

    assert_eq!(interp.eval_toplevel(&call_pos("dots", vec![]))?, Value::logical(true));
    assert_eq!(
        interp.eval_toplevel(&call_pos("dots", vec![num(1.0)]))?,
        Value::logical(false)
    );
    assert_eq!(
        interp.eval_toplevel(&call_pos("pair", vec![empty(), num(2.0)]))?,
        Value::logical(true)
    );
    Ok(())
}

#[test]
fn reading_a_missing_argument_names_the_call() -> Result<()> {
    let mut interp = interpreter();
    interp.eval_toplevel(&assign("f", function(vec![formal("x")], sym("x"))?))?;

    let err = interp.eval_toplevel(&call_pos("f", vec![])).unwrap_err();
    assert_eq!(err.kind(), Some(ConditionKind::MissingArgument));
    assert_eq!(
        err.to_string(),
        "Error in f() : argument \"x\" is missing, with no default"
    );
    Ok(())
}

// ===== CONTROL FLOW =====

#[test]
fn return_leaves_the_enclosing_function() -> Result<()> {
    let mut interp = interpreter();
    let f = function(
        vec![formal("a")],
        block(vec![call_pos("return", vec![binary("*", sym("a"), num(2.0))]), num(0.0)]),
    )?;
    // return() evaluated as a builtin argument still leaves g
    let g = function(
        vec![],
        block(vec![call_pos("identity", vec![call_pos("return", vec![num(7.0)])]), num(0.0)]),
    )?;
    interp.eval_all(&[assign("f", f), assign("g", g)])?;

    assert_eq!(interp.eval_toplevel(&call_pos("f", vec![num(4.0)]))?, Value::double(8.0));
    assert_eq!(interp.eval_toplevel(&call_pos("g", vec![]))?, Value::double(7.0));

    let err = interp.eval_toplevel(&call_pos("return", vec![num(1.0)])).unwrap_err();
    assert!(err.to_string().contains("no function to return from"));
    Ok(())
}

#[test]
fn deep_recursion_hits_the_depth_limit() -> Result<()> {
    let mut interp = Interpreter::new(InterpreterOptions {
        max_depth: 20,
        ..InterpreterOptions::default()
    });
    let r = function(
        vec![formal("n")],
        call_pos("r", vec![binary("+", sym("n"), num(1.0))]),
    )?;
    interp.eval_toplevel(&assign("r", r))?;

    let err = interp.eval_toplevel(&call_pos("r", vec![num(1.0)])).unwrap_err();
    assert_eq!(err.kind(), Some(ConditionKind::RecursionLimit));
    Ok(())
}

#[test]
fn sys_call_sees_the_function_call() -> Result<()> {
    let mut interp = interpreter();
    let f = function(vec![formal("x")], call_pos("sys.call", vec![]))?;
    interp.eval_toplevel(&assign("f", f))?;

    let value = interp.eval_toplevel(&call_pos("f", vec![num(1.0)]))?;
    assert_eq!(value.to_string(), "f(1)");
    Ok(())
}

// ===== INTERRUPTS =====

fn intrinsic_trip() -> IntrinsicFunction {
    IntrinsicFunction::strict("trip", |interp, _args| {
        interp.interrupt_handle().interrupt();
        Ok(Value::Null)
    })
}

#[test]
fn interrupt_leaves_no_promise_under_evaluation() -> Result<()> {
    let mut interp = interpreter();
    interp.register_builtin(intrinsic_trip())?;
    let global = interp.global_env();
    let promise = interp.make_promise(
        block(vec![call_pos("trip", vec![]), call_pos("identity", vec![num(1.0)])]),
        global,
    );

    let err = interp.force_promise(&promise).unwrap_err();
    assert!(matches!(err, Error::Interrupted));
    assert_eq!(promise.state(), PromiseState::Unevaluated);

    // the request was consumed by the unwind
    assert_eq!(interp.eval_toplevel(&call_pos("identity", vec![num(2.0)]))?, Value::double(2.0));
    Ok(())
}

#[test]
fn try_does_not_catch_interrupts() -> Result<()> {
    let mut interp = interpreter();
    interp.register_builtin(intrinsic_trip())?;
    let f = function(vec![formal("a")], call_pos("try", vec![sym("a")]))?;
    interp.eval_toplevel(&assign("f", f))?;

    let err = interp
        .eval_toplevel(&call_pos(
            "f",
            vec![block(vec![call_pos("trip", vec![]), call_pos("identity", vec![num(1.0)])])],
        ))
        .unwrap_err();
    assert!(matches!(err, Error::Interrupted));
    Ok(())
}
