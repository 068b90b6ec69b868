//! Arithmetic, comparison and summary builtins.

use std::cmp::Ordering;

use lzr_core::value::{Value, VectorData};

use super::{BuiltinArgs, IntrinsicFunction, InternalDispatch};
use crate::condition_bail;
use crate::engine::EvalResult;

enum Numbers {
    Integer(Vec<i64>),
    Double(Vec<f64>),
}

impl Numbers {
    fn len(&self) -> usize {
        match self {
            Numbers::Integer(v) => v.len(),
            Numbers::Double(v) => v.len(),
        }
    }

    fn double(&self, index: usize) -> f64 {
        match self {
            Numbers::Integer(v) => v[index % v.len()] as f64,
            Numbers::Double(v) => v[index % v.len()],
        }
    }
}

fn numbers(value: &Value, op: &str) -> EvalResult<Numbers> {
    let data = value.as_vector().map(|v| v.data().clone());
    match data {
        Some(VectorData::Logical(v)) => Ok(Numbers::Integer(v.into_iter().map(i64::from).collect())),
        Some(VectorData::Integer(v)) => Ok(Numbers::Integer(v)),
        Some(VectorData::Double(v)) => Ok(Numbers::Double(v)),
        _ => condition_bail!(
            InvalidArgument,
            "non-numeric argument to binary operator '{}'",
            op
        ),
    }
}

fn recycled_len(a: usize, b: usize) -> usize {
    if a == 0 || b == 0 {
        0
    } else {
        a.max(b)
    }
}

// ===== ARITHMETIC =====

/// e1 + e2, e1 - e2, e1 * e2, e1 / e2 and unary minus
pub fn intrinsic_arith(op: &'static str) -> IntrinsicFunction {
    let func: fn(&mut crate::engine::Interpreter, &mut BuiltinArgs) -> EvalResult = match op {
        "+" => |_interp, args| arith(args, "+"),
        "-" => |_interp, args| arith(args, "-"),
        "*" => |_interp, args| arith(args, "*"),
        _ => |_interp, args| arith(args, "/"),
    };
    IntrinsicFunction::strict(op, func)
        .pure()
        .with_dispatch(InternalDispatch::Ops)
}

fn arith(args: &BuiltinArgs, op: &str) -> EvalResult {
    let lhs = numbers(args.required("e1", 0)?, op)?;
    let Some(rhs) = args.arg("e2", 1) else {
        return match (op, lhs) {
            ("-", Numbers::Integer(v)) => Ok(Value::vector(VectorData::Integer(
                v.into_iter().map(|x| -x).collect(),
            ))),
            ("-", Numbers::Double(v)) => Ok(Value::doubles(v.into_iter().map(|x| -x).collect())),
            ("+", Numbers::Integer(v)) => Ok(Value::vector(VectorData::Integer(v))),
            ("+", Numbers::Double(v)) => Ok(Value::doubles(v)),
            _ => condition_bail!(Arity, "invalid unary operator"),
        };
    };
    let rhs = numbers(rhs, op)?;
    let len = recycled_len(lhs.len(), rhs.len());
    match (&lhs, &rhs, op) {
        (Numbers::Integer(a), Numbers::Integer(b), "+" | "-" | "*") => {
            let values = (0..len)
                .map(|i| {
                    let (x, y) = (a[i % a.len()], b[i % b.len()]);
                    match op {
                        "+" => x.wrapping_add(y),
                        "-" => x.wrapping_sub(y),
                        _ => x.wrapping_mul(y),
                    }
                })
                .collect();
            Ok(Value::vector(VectorData::Integer(values)))
        }
        _ => {
            let values = (0..len)
                .map(|i| {
                    let (x, y) = (lhs.double(i), rhs.double(i));
                    match op {
                        "+" => x + y,
                        "-" => x - y,
                        "*" => x * y,
                        _ => x / y,
                    }
                })
                .collect();
            Ok(Value::doubles(values))
        }
    }
}

// ===== COMPARISON =====

/// e1 == e2 and the other relational operators
pub fn intrinsic_compare(op: &'static str) -> IntrinsicFunction {
    let func: fn(&mut crate::engine::Interpreter, &mut BuiltinArgs) -> EvalResult = match op {
        "==" => |_interp, args| compare(args, "=="),
        "!=" => |_interp, args| compare(args, "!="),
        "<" => |_interp, args| compare(args, "<"),
        ">" => |_interp, args| compare(args, ">"),
        "<=" => |_interp, args| compare(args, "<="),
        _ => |_interp, args| compare(args, ">="),
    };
    IntrinsicFunction::strict(op, func)
        .pure()
        .with_dispatch(InternalDispatch::Ops)
}

fn compare(args: &BuiltinArgs, op: &str) -> EvalResult {
    let lhs = args.required("e1", 0)?;
    let rhs = args.required("e2", 1)?;
    let ordering: Vec<Option<Ordering>> = match (lhs.as_vector(), rhs.as_vector()) {
        (Some(a), Some(b))
            if matches!(&*a.data(), VectorData::Character(_))
                || matches!(&*b.data(), VectorData::Character(_)) =>
        {
            let a = a.data().coerce_to(3);
            let b = b.data().coerce_to(3);
            let (VectorData::Character(a), VectorData::Character(b)) = (a, b) else {
                condition_bail!(InvalidArgument, "comparison is possible only for atomic types");
            };
            (0..recycled_len(a.len(), b.len()))
                .map(|i| Some(a[i % a.len()].cmp(&b[i % b.len()])))
                .collect()
        }
        _ => {
            let a = numbers(lhs, op)?;
            let b = numbers(rhs, op)?;
            (0..recycled_len(a.len(), b.len()))
                .map(|i| a.double(i).partial_cmp(&b.double(i)))
                .collect()
        }
    };
    let result = ordering
        .into_iter()
        .map(|ord| match (op, ord) {
            (_, None) => false,
            ("==", Some(o)) => o == Ordering::Equal,
            ("!=", Some(o)) => o != Ordering::Equal,
            ("<", Some(o)) => o == Ordering::Less,
            (">", Some(o)) => o == Ordering::Greater,
            ("<=", Some(o)) => o != Ordering::Greater,
            (_, Some(o)) => o != Ordering::Less,
        })
        .collect();
    Ok(Value::vector(VectorData::Logical(result)))
}

/// !x
pub fn intrinsic_not() -> IntrinsicFunction {
    IntrinsicFunction::strict("!", |_interp, args| {
        let values = match numbers(args.required("x", 0)?, "!")? {
            Numbers::Integer(v) => v.into_iter().map(|x| x == 0).collect(),
            Numbers::Double(v) => v.into_iter().map(|x| x == 0.0).collect(),
        };
        Ok(Value::vector(VectorData::Logical(values)))
    })
    .pure()
    .with_dispatch(InternalDispatch::Ops)
}

// ===== SUMMARIES =====

/// max(...), min(...), sum(...) over every element of every argument
pub fn intrinsic_summary(name: &'static str) -> IntrinsicFunction {
    let func: fn(&mut crate::engine::Interpreter, &mut BuiltinArgs) -> EvalResult = match name {
        "max" => |_interp, args| summary(args, "max"),
        "min" => |_interp, args| summary(args, "min"),
        _ => |_interp, args| summary(args, "sum"),
    };
    IntrinsicFunction::strict(name, func)
        .pure()
        .with_dispatch(InternalDispatch::Summary)
}

fn summary(args: &BuiltinArgs, name: &str) -> EvalResult {
    let mut all_integer = true;
    let mut values = Vec::new();
    for value in args.values.iter().filter(|v| !v.is_null()) {
        match numbers(value, name)? {
            Numbers::Integer(v) => values.extend(v.into_iter().map(|x| x as f64)),
            Numbers::Double(v) => {
                all_integer = false;
                values.extend(v);
            }
        }
    }
    let result = match name {
        "sum" => values.iter().sum(),
        "max" => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        _ => values.iter().copied().fold(f64::INFINITY, f64::min),
    };
    if all_integer && result.is_finite() {
        Ok(Value::integer(result as i64))
    } else {
        Ok(Value::double(result))
    }
}

/// abs(x)
pub fn intrinsic_abs() -> IntrinsicFunction {
    IntrinsicFunction::strict("abs", |_interp, args| {
        match numbers(args.required("x", 0)?, "abs")? {
            // the magnitude of the smallest integer only fits a double
            Numbers::Integer(v) => match v.iter().map(|x| x.checked_abs()).collect::<Option<Vec<i64>>>() {
                Some(magnitudes) => Ok(Value::vector(VectorData::Integer(magnitudes))),
                None => Ok(Value::doubles(v.into_iter().map(|x| (x as f64).abs()).collect())),
            },
            Numbers::Double(v) => Ok(Value::doubles(v.into_iter().map(f64::abs).collect())),
        }
    })
    .pure()
    .with_dispatch(InternalDispatch::Math)
}
