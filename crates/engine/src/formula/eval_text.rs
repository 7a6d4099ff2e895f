// Text functions: CONCAT, CONCATENATE, LEFT, RIGHT, MID, LEN, UPPER, LOWER,
// TRIM, SUBSTITUTE
//
// All position/length arguments are in characters, not bytes.

use rustc_hash::FxHashMap;

use super::eval::{CellLookup, ErrorKind, Value};
use super::functions::{add, collect_values, number_arg, text_arg, FunctionDef};
use super::parser::BoundExpr;

pub(crate) fn register(map: &mut FxHashMap<&'static str, FunctionDef>) {
    for def in [
        FunctionDef { name: "CONCAT", min_args: 1, max_args: None, volatile: false, eval: concat },
        FunctionDef { name: "CONCATENATE", min_args: 1, max_args: None, volatile: false, eval: concat },
        FunctionDef { name: "LEFT", min_args: 1, max_args: Some(2), volatile: false, eval: left },
        FunctionDef { name: "RIGHT", min_args: 1, max_args: Some(2), volatile: false, eval: right },
        FunctionDef { name: "MID", min_args: 3, max_args: Some(3), volatile: false, eval: mid },
        FunctionDef { name: "LEN", min_args: 1, max_args: Some(1), volatile: false, eval: len },
        FunctionDef { name: "UPPER", min_args: 1, max_args: Some(1), volatile: false, eval: upper },
        FunctionDef { name: "LOWER", min_args: 1, max_args: Some(1), volatile: false, eval: lower },
        FunctionDef { name: "TRIM", min_args: 1, max_args: Some(1), volatile: false, eval: trim },
        FunctionDef { name: "SUBSTITUTE", min_args: 3, max_args: Some(3), volatile: false, eval: substitute },
    ] {
        add(map, def);
    }
}

fn concat(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match collect_values(args, lookup) {
        Ok(vals) => {
            let mut out = String::new();
            for v in vals {
                out.push_str(&v.to_text());
            }
            Value::Text(out)
        }
        Err(e) => Value::Error(e),
    }
}

fn left(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    let text = match text_arg(&args[0], lookup) {
        Ok(s) => s,
        Err(e) => return Value::Error(e),
    };
    let n = match optional_count(args.get(1), lookup, 1) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    Value::Text(text.chars().take(n).collect())
}

fn right(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    let text = match text_arg(&args[0], lookup) {
        Ok(s) => s,
        Err(e) => return Value::Error(e),
    };
    let n = match optional_count(args.get(1), lookup, 1) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(n);
    Value::Text(chars[start..].iter().collect())
}

fn mid(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    let text = match text_arg(&args[0], lookup) {
        Ok(s) => s,
        Err(e) => return Value::Error(e),
    };
    let start = match number_arg(&args[1], lookup) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    let count = match number_arg(&args[2], lookup) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    // start is 1-based; non-positive start or negative count is a misuse.
    if start < 1.0 || count < 0.0 {
        return Value::Error(ErrorKind::Value);
    }
    Value::Text(
        text.chars()
            .skip(start as usize - 1)
            .take(count as usize)
            .collect(),
    )
}

fn len(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match text_arg(&args[0], lookup) {
        Ok(s) => Value::Number(s.chars().count() as f64),
        Err(e) => Value::Error(e),
    }
}

fn upper(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match text_arg(&args[0], lookup) {
        Ok(s) => Value::Text(s.to_uppercase()),
        Err(e) => Value::Error(e),
    }
}

fn lower(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match text_arg(&args[0], lookup) {
        Ok(s) => Value::Text(s.to_lowercase()),
        Err(e) => Value::Error(e),
    }
}

fn trim(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match text_arg(&args[0], lookup) {
        Ok(s) => Value::Text(s.trim().to_string()),
        Err(e) => Value::Error(e),
    }
}

fn substitute(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    let text = match text_arg(&args[0], lookup) {
        Ok(s) => s,
        Err(e) => return Value::Error(e),
    };
    let old = match text_arg(&args[1], lookup) {
        Ok(s) => s,
        Err(e) => return Value::Error(e),
    };
    let new = match text_arg(&args[2], lookup) {
        Ok(s) => s,
        Err(e) => return Value::Error(e),
    };
    if old.is_empty() {
        return Value::Text(text);
    }
    Value::Text(text.replace(&old, &new))
}

fn optional_count(
    arg: Option<&BoundExpr>,
    lookup: &dyn CellLookup,
    default: usize,
) -> Result<usize, ErrorKind> {
    match arg {
        None => Ok(default),
        Some(expr) => {
            let n = number_arg(expr, lookup)?;
            if n < 0.0 {
                Err(ErrorKind::Value)
            } else {
                Ok(n as usize)
            }
        }
    }
}
