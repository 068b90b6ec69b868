use lzr_core::ast::build::*;
use lzr_core::ast::Expr;
use lzr_core::error::ConditionKind;
use lzr_core::value::Value;
use lzr_core::Result;
use lzr_interpret::{Interpreter, InterpreterOptions};
use pretty_assertions::assert_eq;

fn interpreter() -> Interpreter {
    Interpreter::new(InterpreterOptions::default())
}

/// `structure(value, class = c(classes...))`
fn classed(value: Expr, classes: &[&str]) -> Expr {
    call(
        "structure",
        vec![
            arg(value),
            named("class", call_pos("c", classes.iter().map(|c| text(c)).collect())),
        ],
    )
}

/// `name <- function(x) UseMethod("name")`
fn define_generic(interp: &mut Interpreter, name: &str) -> Result<()> {
    let generic = function(vec![formal("x")], call_pos("UseMethod", vec![text(name)]))?;
    interp.eval_toplevel(&assign(name, generic))?;
    Ok(())
}

// ===== USEMETHOD / NEXTMETHOD =====

#[test]
fn next_method_walks_the_class_chain_to_the_default() -> Result<()> {
    let mut interp = interpreter();
    define_generic(&mut interp, "print_it")?;
    let step = |label: &str| {
        function(
            vec![formal("x")],
            block(vec![
                call_pos("cat", vec![text(label)]),
                call_pos("NextMethod", vec![]),
            ]),
        )
    };
    interp.eval_all(&[
        assign("print_it.foo", step("foo ")?),
        assign("print_it.bar", step("bar ")?),
        assign(
            "print_it.default",
            function(vec![formal("x")], call_pos("cat", vec![text("default")]))?,
        ),
        assign("obj", classed(num(1.0), &["foo", "bar"])),
    ])?;

    interp.eval_toplevel(&call_pos("print_it", vec![sym("obj")]))?;
    assert_eq!(interp.take_output(), "foo bar default");
    Ok(())
}

#[test]
fn use_method_leaves_the_generic_immediately() -> Result<()> {
    let mut interp = interpreter();
    // g <- function(x) { UseMethod("g"); cat("unreachable") }
    let g = function(
        vec![formal("x")],
        block(vec![
            call_pos("UseMethod", vec![text("g")]),
            call_pos("cat", vec![text("unreachable")]),
        ]),
    )?;
    interp.eval_all(&[
        assign("g", g),
        assign("g.default", function(vec![formal("x")], num(42.0))?),
    ])?;

    assert_eq!(interp.eval_toplevel(&call_pos("g", vec![num(1.0)]))?, Value::double(42.0));
    assert_eq!(interp.take_output(), "");
    Ok(())
}

#[test]
fn method_sees_generic_and_remaining_classes() -> Result<()> {
    let mut interp = interpreter();
    define_generic(&mut interp, "info")?;
    let method = function(
        vec![formal("x")],
        call_pos("list", vec![sym(".Generic"), sym(".Class")]),
    )?;
    interp.eval_all(&[
        assign("info.bar", method),
        assign("obj", classed(num(1.0), &["foo", "bar"])),
    ])?;

    let value = interp.eval_toplevel(&call_pos("info", vec![sym("obj")]))?;
    assert_eq!(
        value,
        Value::list(vec![Value::string("info"), Value::strings(&["bar"])])
    );
    Ok(())
}

#[test]
fn builtin_serves_as_the_last_fallback() -> Result<()> {
    let mut interp = interpreter();
    let size = function(vec![formal("x")], call_pos("UseMethod", vec![text("length")]))?;
    interp.eval_toplevel(&assign("size", size))?;

    let value = interp.eval_toplevel(&call_pos(
        "size",
        vec![call_pos("c", vec![num(1.0), num(2.0), num(3.0)])],
    ))?;
    assert_eq!(value, Value::integer(3));
    Ok(())
}

#[test]
fn missing_method_reports_the_class_chain() -> Result<()> {
    let mut interp = interpreter();
    define_generic(&mut interp, "describe")?;

    let err = interp
        .eval_toplevel(&call_pos("describe", vec![classed(num(1.0), &["a", "b"])]))
        .unwrap_err();
    assert_eq!(err.kind(), Some(ConditionKind::DispatchNotFound));
    let message = &err.as_condition().expect("condition").message;
    assert_eq!(
        message,
        "no applicable method for 'describe' applied to an object of class \"c('a', 'b')\""
    );
    Ok(())
}

#[test]
fn next_method_outside_dispatch_is_an_error() -> Result<()> {
    let mut interp = interpreter();
    let f = function(vec![], call_pos("NextMethod", vec![]))?;
    interp.eval_toplevel(&assign("f", f))?;

    let err = interp.eval_toplevel(&call_pos("f", vec![])).unwrap_err();
    assert_eq!(err.kind(), Some(ConditionKind::InvalidArgument));
    Ok(())
}

#[test]
fn registered_methods_are_found() -> Result<()> {
    let mut interp = interpreter();
    define_generic(&mut interp, "describe")?;
    interp.eval_toplevel(&call_pos(
        "registerS3method",
        vec![
            text("describe"),
            text("thing"),
            function(vec![formal("x")], text("a thing"))?,
        ],
    ))?;

    let value = interp.eval_toplevel(&call_pos("describe", vec![classed(num(1.0), &["thing"])]))?;
    assert_eq!(value, Value::string("a thing"));
    Ok(())
}

// ===== INTERNAL DISPATCH =====

#[test]
fn operators_dispatch_to_group_methods() -> Result<()> {
    let mut interp = interpreter();
    let ops = function(vec![formal("e1"), formal("e2")], sym(".Generic"))?;
    interp.eval_all(&[
        assign("Ops.money", ops),
        assign("m", classed(num(5.0), &["money"])),
    ])?;

    let value = interp.eval_toplevel(&binary("+", sym("m"), num(1.0)))?;
    assert_eq!(value, Value::string("+"));
    let value = interp.eval_toplevel(&binary("*", num(2.0), sym("m")))?;
    assert_eq!(value, Value::string("*"));
    Ok(())
}

#[test]
fn incompatible_operand_methods_warn_and_run_the_builtin() -> Result<()> {
    let mut interp = interpreter();
    interp.eval_all(&[
        assign("Ops.money", function(vec![formal("e1"), formal("e2")], text("money"))?),
        assign("Ops.cash", function(vec![formal("e1"), formal("e2")], text("cash"))?),
        assign("m", classed(num(5.0), &["money"])),
        assign("k", classed(num(1.0), &["cash"])),
    ])?;

    let value = interp.eval_toplevel(&binary("+", sym("m"), sym("k")))?;
    assert_eq!(value.as_f64(), Some(6.0));
    let warnings = interp.diagnostics().warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].message,
        "Incompatible methods (\"Ops.money\", \"Ops.cash\") for \"+\""
    );
    Ok(())
}

#[test]
fn unclassed_values_skip_internal_dispatch() -> Result<()> {
    let mut interp = interpreter();
    interp.eval_toplevel(&assign(
        "length.numeric",
        function(vec![formal("x")], num(-1.0))?,
    ))?;

    let value = interp.eval_toplevel(&call_pos("length", vec![call_pos("c", vec![num(1.0)])]))?;
    assert_eq!(value, Value::integer(1));
    Ok(())
}

// ===== CALL-SITE CACHE =====

#[test]
fn redefining_a_method_invalidates_the_cached_target() -> Result<()> {
    let mut interp = interpreter();
    define_generic(&mut interp, "kind")?;
    interp.eval_all(&[
        assign("kind.foo", function(vec![formal("x")], text("first"))?),
        assign("obj", classed(num(1.0), &["foo"])),
    ])?;
    let site = call_pos("kind", vec![sym("obj")]);

    assert_eq!(interp.eval_toplevel(&site)?, Value::string("first"));
    assert_eq!(interp.eval_toplevel(&site)?, Value::string("first"));
    assert_eq!(interp.stats().s3_slow_lookups, 1);

    interp.eval_toplevel(&assign("kind.foo", function(vec![formal("x")], text("second"))?))?;
    assert_eq!(interp.eval_toplevel(&site)?, Value::string("second"));
    assert_eq!(interp.stats().s3_slow_lookups, 2);
    Ok(())
}

#[test]
fn registering_a_method_invalidates_the_cached_target() -> Result<()> {
    let mut interp = interpreter();
    define_generic(&mut interp, "kind")?;
    interp.eval_all(&[
        assign("kind.default", function(vec![formal("x")], text("default"))?),
        assign("obj", classed(num(1.0), &["foo"])),
    ])?;
    let site = call_pos("kind", vec![sym("obj")]);
    assert_eq!(interp.eval_toplevel(&site)?, Value::string("default"));

    interp.eval_toplevel(&call_pos(
        "registerS3method",
        vec![text("kind"), text("foo"), function(vec![formal("x")], text("foo"))?],
    ))?;
    assert_eq!(interp.eval_toplevel(&site)?, Value::string("foo"));
    assert_eq!(interp.stats().s3_slow_lookups, 2);
    Ok(())
}

#[test]
fn editing_the_class_in_place_redispatches() -> Result<()> {
    let mut interp = interpreter();
    define_generic(&mut interp, "gen")?;
    interp.eval_all(&[
        assign("gen.a", function(vec![formal("x")], text("a"))?),
        assign("gen.z", function(vec![formal("x")], text("z"))?),
        assign("x", classed(num(1.0), &["a"])),
    ])?;
    let site = call_pos("gen", vec![sym("x")]);
    assert_eq!(interp.eval_toplevel(&site)?, Value::string("a"));
    assert_eq!(interp.eval_toplevel(&site)?, Value::string("a"));

    interp.eval_toplevel(&assign_to(
        index(call_pos("class", vec![sym("x")]), num(1.0)),
        text("z"),
    ))?;
    assert_eq!(
        interp.eval_toplevel(&call_pos("class", vec![sym("x")]))?,
        Value::string("z")
    );
    assert_eq!(interp.eval_toplevel(&site)?, Value::string("z"));
    Ok(())
}
