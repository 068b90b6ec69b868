use lzr_core::ast::build::*;
use lzr_core::caller::SuppliedArgs;
use lzr_core::error::ConditionKind;
use lzr_core::signature::ArgumentsSignature;
use lzr_core::value::{Symbol, Value};
use lzr_core::Result;
use lzr_interpret::engine::{match_arguments, FormalSlot, MatchError};
use lzr_interpret::{Interpreter, InterpreterOptions};
use pretty_assertions::assert_eq;

fn formals(names: &[&str]) -> ArgumentsSignature {
    ArgumentsSignature::formals(names.iter().map(|n| Symbol::new(n)).collect())
        .expect("valid formals")
}

fn supplied(names: &[Option<&str>]) -> ArgumentsSignature {
    ArgumentsSignature::supplied(names.iter().map(|n| n.map(Symbol::new)).collect())
}

/// `f <- function(x, y, ...) list(x, y, list(...))`
fn define_xy_dots(interp: &mut Interpreter) -> Result<()> {
    let f = function(
        vec![formal("x"), formal("y"), formal("...")],
        call_pos("list", vec![sym("x"), sym("y"), call_pos("list", vec![sym("...")])]),
    )?;
    interp.eval_toplevel(&assign("f", f))?;
    Ok(())
}

// ===== MATCHER =====

#[test]
fn named_then_positional_then_varargs() {
    let permutation = match_arguments(
        &formals(&["x", "y", "..."]),
        &supplied(&[Some("y"), None, None]),
        true,
    )
    .unwrap();
    assert_eq!(
        permutation.slots,
        vec![
            FormalSlot::Supplied(1),
            FormalSlot::Supplied(0),
            FormalSlot::Varargs(vec![2]),
        ]
    );
}

#[test]
fn formals_after_varargs_only_match_exactly() {
    let sig = formals(&["...", "sep"]);
    let permutation = match_arguments(&sig, &supplied(&[None, Some("se")]), true).unwrap();
    assert_eq!(
        permutation.slots,
        vec![FormalSlot::Varargs(vec![0, 1]), FormalSlot::Unfilled]
    );

    let permutation = match_arguments(&sig, &supplied(&[None, Some("sep")]), true).unwrap();
    assert_eq!(
        permutation.slots,
        vec![FormalSlot::Varargs(vec![0]), FormalSlot::Supplied(1)]
    );
}

#[test]
fn partial_names_resolve_unique_prefixes() {
    let sig = formals(&["value", "verbose"]);
    let permutation = match_arguments(&sig, &supplied(&[Some("val"), None]), true).unwrap();
    assert_eq!(
        permutation.slots,
        vec![FormalSlot::Supplied(0), FormalSlot::Supplied(1)]
    );

    let err = match_arguments(&sig, &supplied(&[Some("v")]), true).unwrap_err();
    assert_eq!(err, MatchError::AmbiguousPartialMatch(0));

    let err = match_arguments(&sig, &supplied(&[Some("val")]), false).unwrap_err();
    assert_eq!(err, MatchError::Unused(vec![0]));
}

#[test]
fn matching_errors() {
    let sig = formals(&["x"]);
    assert_eq!(
        match_arguments(&sig, &supplied(&[None, None]), true).unwrap_err(),
        MatchError::TooManyPositional(vec![1])
    );
    assert_eq!(
        match_arguments(&sig, &supplied(&[Some("x"), Some("x")]), true).unwrap_err(),
        MatchError::FormalMatchedMultiple(Symbol::new("x"))
    );
    assert_eq!(
        match_arguments(&sig, &supplied(&[None, Some("z")]), true).unwrap_err(),
        MatchError::Unused(vec![1])
    );
}

// ===== CALLS =====

#[test]
fn named_argument_fills_its_formal() -> Result<()> {
    let mut interp = Interpreter::new(InterpreterOptions::default());
    define_xy_dots(&mut interp)?;

    let value = interp.eval_toplevel(&call("f", vec![arg(num(3.0)), named("y", num(4.0))]))?;
    assert_eq!(
        value,
        Value::list(vec![Value::double(3.0), Value::double(4.0), Value::list(vec![])])
    );
    Ok(())
}

#[test]
fn leftover_positionals_go_to_varargs_in_call_order() -> Result<()> {
    let mut interp = Interpreter::new(InterpreterOptions::default());
    define_xy_dots(&mut interp)?;

    let value = interp.eval_toplevel(&call(
        "f",
        vec![named("y", num(4.0)), arg(num(3.0)), arg(num(5.0))],
    ))?;
    assert_eq!(
        value,
        Value::list(vec![
            Value::double(3.0),
            Value::double(4.0),
            Value::list(vec![Value::double(5.0)]),
        ])
    );
    Ok(())
}

#[test]
fn varargs_are_forwarded_without_rewrapping() -> Result<()> {
    let mut interp = Interpreter::new(InterpreterOptions::default());
    define_xy_dots(&mut interp)?;
    let g = function(vec![formal("...")], call_pos("f", vec![sym("...")]))?;
    interp.eval_toplevel(&assign("g", g))?;

    let value = interp.eval_toplevel(&call(
        "g",
        vec![arg(num(1.0)), named("y", num(2.0)), arg(num(3.0))],
    ))?;
    assert_eq!(
        value,
        Value::list(vec![
            Value::double(1.0),
            Value::double(2.0),
            Value::list(vec![Value::double(3.0)]),
        ])
    );
    Ok(())
}

#[test]
fn unused_named_argument_is_reported_with_its_text() -> Result<()> {
    let mut interp = Interpreter::new(InterpreterOptions::default());
    interp.eval_toplevel(&assign("h", function(vec![formal("x")], sym("x"))?))?;

    let err = interp
        .eval_toplevel(&call("h", vec![arg(num(1.0)), named("z", binary("+", num(1.0), num(1.0)))]))
        .unwrap_err();
    assert_eq!(err.kind(), Some(ConditionKind::UnusedArgument));
    assert_eq!(
        err.to_string(),
        "Error in h(1, z = 1 + 1) : unused argument (z = 1 + 1)"
    );

    let err = interp
        .eval_toplevel(&call_pos("h", vec![num(1.0), num(2.0)]))
        .unwrap_err();
    assert_eq!(err.kind(), Some(ConditionKind::Arity));
    Ok(())
}

#[test]
fn ambiguous_partial_name_is_an_error() -> Result<()> {
    let mut interp = Interpreter::new(InterpreterOptions::default());
    let g = function(vec![formal("value"), formal("verbose")], sym("value"))?;
    interp.eval_toplevel(&assign("g", g))?;

    let value = interp.eval_toplevel(&call("g", vec![named("val", num(1.0)), arg(num(2.0))]))?;
    assert_eq!(value, Value::double(1.0));

    let err = interp
        .eval_toplevel(&call("g", vec![named("v", num(1.0))]))
        .unwrap_err();
    assert_eq!(err.kind(), Some(ConditionKind::AmbiguousNameMatch));
    Ok(())
}

#[test]
fn build_frame_binds_defaults_and_missing() -> Result<()> {
    let mut interp = Interpreter::new(InterpreterOptions::default());
    let f = interp.eval_toplevel(&function(
        vec![formal("a"), formal_default("b", num(2.0)), formal("c")],
        sym("a"),
    )?)?;

    let env = interp.build_frame(
        &f,
        SuppliedArgs::new(vec![Some(Symbol::new("c"))], vec![Value::double(9.0)]),
    )?;
    let frame = interp.heap().frame(env)?;
    assert!(frame.get("a").is_some_and(Value::is_missing));
    assert_eq!(frame.get("c"), Some(&Value::double(9.0)));
    let b = frame.get("b").and_then(Value::as_promise).cloned();
    assert_eq!(b.and_then(|p| p.value()), Some(Value::double(2.0)));
    Ok(())
}
