// Logical functions: IF, AND, OR, NOT, IFERROR, ISBLANK, ISNUMBER, ISTEXT, ISERROR

use rustc_hash::FxHashMap;

use super::eval::{evaluate, CellLookup, Value};
use super::functions::{add, FunctionDef};
use super::parser::BoundExpr;

pub(crate) fn register(map: &mut FxHashMap<&'static str, FunctionDef>) {
    for def in [
        FunctionDef { name: "IF", min_args: 2, max_args: Some(3), volatile: false, eval: if_fn },
        FunctionDef { name: "AND", min_args: 1, max_args: None, volatile: false, eval: and },
        FunctionDef { name: "OR", min_args: 1, max_args: None, volatile: false, eval: or },
        FunctionDef { name: "NOT", min_args: 1, max_args: Some(1), volatile: false, eval: not },
        FunctionDef { name: "IFERROR", min_args: 2, max_args: Some(2), volatile: false, eval: iferror },
        FunctionDef { name: "ISBLANK", min_args: 1, max_args: Some(1), volatile: false, eval: isblank },
        FunctionDef { name: "ISNUMBER", min_args: 1, max_args: Some(1), volatile: false, eval: isnumber },
        FunctionDef { name: "ISTEXT", min_args: 1, max_args: Some(1), volatile: false, eval: istext },
        FunctionDef { name: "ISERROR", min_args: 1, max_args: Some(1), volatile: false, eval: iserror },
    ] {
        add(map, def);
    }
}

fn if_fn(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    let condition = match evaluate(&args[0], lookup).to_bool() {
        Ok(b) => b,
        Err(e) => return Value::Error(e),
    };
    if condition {
        evaluate(&args[1], lookup)
    } else if args.len() == 3 {
        evaluate(&args[2], lookup)
    } else {
        Value::Boolean(false)
    }
}

fn and(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    for arg in args {
        match evaluate(arg, lookup).to_bool() {
            Ok(false) => return Value::Boolean(false),
            Err(e) => return Value::Error(e),
            _ => {}
        }
    }
    Value::Boolean(true)
}

fn or(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    for arg in args {
        match evaluate(arg, lookup).to_bool() {
            Ok(true) => return Value::Boolean(true),
            Err(e) => return Value::Error(e),
            _ => {}
        }
    }
    Value::Boolean(false)
}

fn not(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match evaluate(&args[0], lookup).to_bool() {
        Ok(b) => Value::Boolean(!b),
        Err(e) => Value::Error(e),
    }
}

/// The one sanctioned error-tolerant function: a first-argument error is
/// swallowed and the fallback evaluated instead.
fn iferror(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    let result = evaluate(&args[0], lookup);
    if result.is_error() {
        evaluate(&args[1], lookup)
    } else {
        result
    }
}

fn isblank(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    Value::Boolean(evaluate(&args[0], lookup).is_empty())
}

fn isnumber(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    Value::Boolean(matches!(evaluate(&args[0], lookup), Value::Number(_)))
}

fn istext(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    Value::Boolean(matches!(evaluate(&args[0], lookup), Value::Text(_)))
}

fn iserror(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    Value::Boolean(evaluate(&args[0], lookup).is_error())
}
