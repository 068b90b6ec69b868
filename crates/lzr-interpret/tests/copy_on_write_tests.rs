use lzr_core::ast::build::*;
use lzr_core::ast::ExprKind;
use lzr_core::error::Error;
use lzr_core::sharing::{self, SharingState};
use lzr_core::value::Value;
use lzr_core::Result;
use lzr_interpret::{Interpreter, InterpreterOptions};
use pretty_assertions::assert_eq;

fn interpreter() -> Interpreter {
    Interpreter::new(InterpreterOptions::default())
}

fn nums(values: &[f64]) -> lzr_core::ast::Expr {
    call_pos("c", values.iter().map(|v| num(*v)).collect())
}

#[test]
fn writing_through_a_copy_leaves_the_original() -> Result<()> {
    let mut interp = interpreter();
    interp.eval_all(&[
        assign("x", nums(&[1.0, 2.0, 3.0])),
        assign("y", sym("x")),
        assign_to(index(sym("y"), num(1.0)), num(10.0)),
    ])?;

    assert_eq!(interp.eval_toplevel(&index(sym("x"), num(1.0)))?, Value::double(1.0));
    assert_eq!(interp.eval_toplevel(&index(sym("y"), num(1.0)))?, Value::double(10.0));
    Ok(())
}

#[test]
fn unshared_vectors_are_updated_in_place() -> Result<()> {
    let mut interp = interpreter();
    interp.eval_toplevel(&assign("x", nums(&[1.0, 2.0])))?;
    let before = interp.get_global("x").expect("x is bound");
    assert!(!sharing::is_shared(&before));

    interp.eval_toplevel(&assign_to(index(sym("x"), num(1.0)), num(5.0)))?;
    let after = interp.get_global("x").expect("x is bound");
    assert!(after.ptr_eq(&before));
    assert_eq!(before, Value::doubles(vec![5.0, 2.0]));
    Ok(())
}

#[test]
fn second_binding_marks_the_value_shared() -> Result<()> {
    let mut interp = interpreter();
    interp.eval_all(&[assign("x", nums(&[1.0])), assign("y", sym("x"))])?;

    let x = interp.get_global("x").expect("x is bound");
    assert!(sharing::is_shared(&x));
    assert!(interp.get_global("y").is_some_and(|y| y.ptr_eq(&x)));
    Ok(())
}

#[test]
fn callee_modifications_do_not_reach_the_caller() -> Result<()> {
    let mut interp = interpreter();
    // f <- function(v) { v[[1]] <- 99; v }
    let f = function(
        vec![formal("v")],
        block(vec![assign_to(index(sym("v"), num(1.0)), num(99.0)), sym("v")]),
    )?;
    interp.eval_all(&[
        assign("f", f),
        assign("x", nums(&[1.0, 2.0])),
        assign("y", call_pos("f", vec![sym("x")])),
    ])?;

    assert_eq!(interp.get_global("x"), Some(Value::doubles(vec![1.0, 2.0])));
    assert_eq!(interp.get_global("y"), Some(Value::doubles(vec![99.0, 2.0])));
    Ok(())
}

#[test]
fn nested_replacement_copies_a_shared_element() -> Result<()> {
    let mut interp = interpreter();
    interp.eval_all(&[
        assign("inner", nums(&[1.0, 2.0])),
        assign("l", call_pos("list", vec![sym("inner")])),
        assign_to(index(index(sym("l"), num(1.0)), num(1.0)), num(100.0)),
    ])?;

    assert_eq!(interp.get_global("inner"), Some(Value::doubles(vec![1.0, 2.0])));
    assert_eq!(
        interp.eval_toplevel(&index(index(sym("l"), num(1.0)), num(1.0)))?,
        Value::double(100.0)
    );
    Ok(())
}

#[test]
fn attribute_replacement_copies_shared_objects() -> Result<()> {
    let mut interp = interpreter();
    interp.eval_all(&[
        assign("x", nums(&[1.0])),
        assign("y", sym("x")),
        assign_to(
            call_pos("attr", vec![sym("y"), text("units")]),
            text("cm"),
        ),
    ])?;

    let units = call_pos("attr", vec![sym("x"), text("units")]);
    assert_eq!(interp.eval_toplevel(&units)?, Value::Null);
    let units = call_pos("attr", vec![sym("y"), text("units")]);
    assert_eq!(interp.eval_toplevel(&units)?, Value::string("cm"));
    Ok(())
}

#[test]
fn class_vector_is_copied_before_a_class_edit() -> Result<()> {
    let mut interp = interpreter();
    // x <- structure(1, class = c("a", "b")); y <- x; class(x)[[1]] <- "z"
    interp.eval_all(&[
        assign(
            "x",
            call(
                "structure",
                vec![arg(num(1.0)), named("class", call_pos("c", vec![text("a"), text("b")]))],
            ),
        ),
        assign("y", sym("x")),
        assign_to(index(call_pos("class", vec![sym("x")]), num(1.0)), text("z")),
    ])?;

    assert_eq!(
        interp.eval_toplevel(&call_pos("class", vec![sym("y")]))?,
        Value::strings(&["a", "b"])
    );
    assert_eq!(
        interp.eval_toplevel(&call_pos("class", vec![sym("x")]))?,
        Value::strings(&["z", "b"])
    );
    Ok(())
}

#[test]
fn group_method_cannot_modify_the_callers_operand() -> Result<()> {
    let mut interp = interpreter();
    // Ops.foo <- function(e1, e2) { e1[[1]] <- 100; e1 }
    let ops = function(
        vec![formal("e1"), formal("e2")],
        block(vec![assign_to(index(sym("e1"), num(1.0)), num(100.0)), sym("e1")]),
    )?;
    interp.eval_all(&[
        assign("Ops.foo", ops),
        assign(
            "x",
            call(
                "structure",
                vec![arg(nums(&[1.0, 2.0])), named("class", text("foo"))],
            ),
        ),
        assign("r", binary("+", sym("x"), num(1.0))),
    ])?;

    assert_eq!(interp.eval_toplevel(&index(sym("x"), num(1.0)))?, Value::double(1.0));
    assert_eq!(interp.eval_toplevel(&index(sym("r"), num(1.0)))?, Value::double(100.0));
    Ok(())
}

#[test]
fn literals_stay_permanent_through_replacement() -> Result<()> {
    let mut interp = interpreter();
    let literal = num(5.0);
    let ExprKind::Constant(constant) = &literal.kind else {
        unreachable!("num builds a constant");
    };
    interp.eval_all(&[
        assign("x", literal.clone()),
        assign("y", sym("x")),
        assign_to(index(sym("x"), num(1.0)), num(2.0)),
    ])?;

    assert_eq!(interp.get_global("x"), Some(Value::double(2.0)));
    assert_eq!(interp.eval_toplevel(&literal)?, Value::double(5.0));
    let vector = constant.as_vector().expect("numeric literal");
    assert_eq!(vector.sharing(), SharingState::SharedPermanent);
    assert!(matches!(
        vector.transition(SharingState::Shared),
        Err(Error::Internal(_))
    ));
    Ok(())
}
