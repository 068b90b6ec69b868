use lzr_core::ast::build::*;
use lzr_core::diagnostics::DiagnosticTemplate;
use lzr_core::error::Error;
use lzr_core::value::Value;
use lzr_core::Result;
use lzr_interpret::{Interpreter, InterpreterOptions};
use pretty_assertions::assert_eq;
use tracing_subscriber::EnvFilter;

fn setup_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ===== OPTIONS =====

#[test]
fn options_from_partial_json_keep_defaults() -> Result<()> {
    let options = InterpreterOptions::from_json(r#"{ "eager_promises": false, "max_depth": 64 }"#)?;
    assert_eq!(
        options,
        InterpreterOptions {
            eager_promises: false,
            max_depth: 64,
            ..InterpreterOptions::default()
        }
    );
    Ok(())
}

#[test]
fn malformed_json_is_an_error() {
    let err = InterpreterOptions::from_json("{ eager_promises").unwrap_err();
    assert!(matches!(err, Error::Generic(_)));
}

#[test]
fn environment_overrides_defaults() {
    std::env::set_var("LZR_MAX_DEPTH", "32");
    std::env::set_var("LZR_STRICT_PROMISE_CYCLES", "1");
    let options = InterpreterOptions::from_env();
    std::env::remove_var("LZR_MAX_DEPTH");
    std::env::remove_var("LZR_STRICT_PROMISE_CYCLES");

    assert_eq!(options.max_depth, 32);
    assert!(options.strict_promise_cycles);
    assert!(options.eager_promises);
}

#[test]
fn options_load_from_a_file() -> Result<()> {
    let path = std::env::temp_dir().join(format!("lzr-options-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "partial_matching": false }"#).map_err(|e| Error::Generic(e.to_string()))?;
    let options = InterpreterOptions::from_file(&path);
    let _ = std::fs::remove_file(&path);

    assert!(!options?.partial_matching);
    Ok(())
}

#[test]
fn missing_options_file_names_the_path() {
    let path = std::env::temp_dir().join("lzr-no-such-options.json");
    let err = InterpreterOptions::from_file(&path).unwrap_err();
    assert!(err
        .to_string()
        .contains("failed to read interpreter options from"));
}

#[test]
fn partial_matching_can_be_disabled() -> Result<()> {
    let mut interp = Interpreter::new(InterpreterOptions {
        partial_matching: false,
        ..InterpreterOptions::default()
    });
    interp.eval_toplevel(&assign("f", function(vec![formal("value")], sym("value"))?))?;

    let err = interp
        .eval_toplevel(&call("f", vec![named("val", num(1.0))]))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Error in f(val = 1) : unused argument (val = 1)"
    );
    Ok(())
}

// ===== HOST API =====

#[test]
fn apply_calls_closures_with_host_values() -> Result<()> {
    setup_logs();
    let mut interp = Interpreter::new(InterpreterOptions::default());
    let f = interp.eval_toplevel(&function(
        vec![formal("a"), formal_default("b", num(10.0))],
        binary("-", sym("b"), sym("a")),
    )?)?;

    assert_eq!(interp.apply(&f, vec![(None, Value::double(3.0))])?, Value::double(7.0));
    assert_eq!(
        interp.apply(&f, vec![(Some("b"), Value::double(1.0)), (None, Value::double(3.0))])?,
        Value::double(-2.0)
    );
    Ok(())
}

#[test]
fn errors_are_recorded_as_diagnostics() {
    let mut interp = Interpreter::new(InterpreterOptions::default());
    let err = interp.eval_toplevel(&sym("nowhere")).unwrap_err();
    assert_eq!(err.to_string(), "Error: object 'nowhere' not found");

    let diagnostics = interp.diagnostics().get_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code.as_deref(), Some("lzr::object_not_found"));
    assert_eq!(diagnostics[0].source_context.as_deref(), Some("lzr"));
}

#[test]
fn host_builtins_can_be_registered() -> Result<()> {
    use lzr_interpret::intrinsics::IntrinsicFunction;

    let mut interp = Interpreter::new(InterpreterOptions::default());
    interp.register_builtin(
        IntrinsicFunction::strict("twice", |_interp, args| {
            let x = args.required("x", 0)?.as_f64().unwrap_or(0.0);
            Ok(Value::double(x * 2.0))
        })
        .pure(),
    )?;

    let value = interp.eval_toplevel(&call_pos("twice", vec![num(21.0)]))?;
    assert_eq!(value, Value::double(42.0));
    Ok(())
}

#[test]
fn integer_abs_widens_when_the_magnitude_overflows() -> Result<()> {
    let mut interp = Interpreter::new(InterpreterOptions::default());
    let abs = interp
        .heap()
        .get_local(interp.base_env(), "abs")?
        .expect("abs is a builtin");

    assert_eq!(interp.apply(&abs, vec![(None, Value::integer(-3))])?, Value::integer(3));
    assert_eq!(
        interp.apply(&abs, vec![(None, Value::integer(i64::MIN))])?,
        Value::double(-(i64::MIN as f64))
    );
    Ok(())
}

// ===== DIAGNOSTICS =====

#[test]
fn diagnostics_render_with_the_configured_context() -> Result<()> {
    let mut interp = Interpreter::new(InterpreterOptions {
        diagnostic_context: "script".to_string(),
        ..InterpreterOptions::default()
    });
    let f = function(vec![], call_pos("warning", vec![text("careful")]))?;
    interp.eval_all(&[assign("f", f), call_pos("f", vec![])])?;
    let _ = interp.eval_toplevel(&sym("nowhere"));

    assert_eq!(
        interp.render_diagnostics(DiagnosticTemplate::Plain),
        vec![
            "[script] WARNING: careful".to_string(),
            "   in f()".to_string(),
            "[script] ERROR: object 'nowhere' not found (lzr::object_not_found)".to_string(),
        ]
    );
    assert!(interp.diagnostics().has_errors());
    Ok(())
}

// ===== GARBAGE COLLECTION =====

#[test]
fn finished_frames_are_collected() -> Result<()> {
    setup_logs();
    let mut interp = Interpreter::new(InterpreterOptions::default());
    // f <- function(x) x; mk <- function() function() 1
    interp.eval_all(&[
        assign("f", function(vec![formal("x")], sym("x"))?),
        assign("mk", function(vec![], function(vec![], num(1.0))?)?),
    ])?;
    for _ in 0..3 {
        interp.eval_toplevel(&call_pos("f", vec![num(1.0)]))?;
    }
    interp.eval_toplevel(&assign("keep", call_pos("mk", vec![])))?;

    assert_eq!(interp.collect_garbage(), 3);
    // global, base and the frame `keep` closes over
    assert_eq!(interp.heap().live_frames(), 3);
    assert_eq!(interp.stats().frames_collected, 3);

    let keep = interp.get_global("keep").expect("keep is bound");
    assert_eq!(interp.apply(&keep, vec![])?, Value::double(1.0));
    Ok(())
}
