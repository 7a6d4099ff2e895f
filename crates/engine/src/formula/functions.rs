//! Built-in function registry.
//!
//! Dispatch goes through an explicit name → descriptor map rather than a
//! match chain: each family module registers `FunctionDef` entries with
//! declared arity bounds and a volatile flag. The dispatcher resolves
//! `#NAME?` (unknown function) and `#VALUE!` (arity violation) before
//! invoking the handler, so handlers can assume their argument count.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use super::eval::{
    evaluate, lookup_cell, CellLookup, ErrorKind, NamedRangeResolution, Value,
};
use super::parser::{BoundExpr, Expr};
use super::{eval_datetime, eval_logical, eval_lookup, eval_math, eval_text};
use crate::sheet::SheetRef;

/// Handler signature. Arguments arrive unevaluated so functions like IF
/// can evaluate branches lazily and aggregates can expand ranges.
pub type Handler = fn(&[BoundExpr], &dyn CellLookup) -> Value;

/// Contract for one built-in function.
pub struct FunctionDef {
    pub name: &'static str,
    pub min_args: usize,
    /// None = variadic.
    pub max_args: Option<usize>,
    /// Volatile functions (NOW, TODAY, RAND-alikes) can change without any
    /// cell edit and are folded into every recalculation pass.
    pub volatile: bool,
    pub eval: Handler,
}

static REGISTRY: Lazy<FxHashMap<&'static str, FunctionDef>> = Lazy::new(|| {
    let mut map = FxHashMap::default();
    eval_math::register(&mut map);
    eval_logical::register(&mut map);
    eval_text::register(&mut map);
    eval_lookup::register(&mut map);
    eval_datetime::register(&mut map);
    map
});

pub(crate) fn add(map: &mut FxHashMap<&'static str, FunctionDef>, def: FunctionDef) {
    map.insert(def.name, def);
}

/// Look up a function descriptor by (uppercase) name.
pub fn lookup(name: &str) -> Option<&'static FunctionDef> {
    REGISTRY.get(name)
}

pub fn is_known_function(name: &str) -> bool {
    REGISTRY.contains_key(name)
}

pub fn is_volatile_function(name: &str) -> bool {
    REGISTRY.get(name).map(|def| def.volatile).unwrap_or(false)
}

/// Dispatch a function call: `#NAME?` for unknown names, `#VALUE!` for
/// arity violations, otherwise the handler's result.
pub(crate) fn call(name: &str, args: &[BoundExpr], lookup_ctx: &dyn CellLookup) -> Value {
    let Some(def) = lookup(name) else {
        return Value::Error(ErrorKind::Name);
    };
    if args.len() < def.min_args {
        return Value::Error(ErrorKind::Value);
    }
    if let Some(max) = def.max_args {
        if args.len() > max {
            return Value::Error(ErrorKind::Value);
        }
    }
    (def.eval)(args, lookup_ctx)
}

// =============================================================================
// Argument collection helpers shared by the family modules
// =============================================================================

/// A resolved rectangular range argument, normalized so start <= end.
pub(crate) struct RangeArg {
    pub sheet: SheetRef,
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl RangeArg {
    pub fn rows(&self) -> usize {
        self.end_row - self.start_row + 1
    }

    pub fn cols(&self) -> usize {
        self.end_col - self.start_col + 1
    }

    /// Read one cell of the range (0-based offsets within the rectangle).
    pub fn cell(&self, lookup: &dyn CellLookup, dr: usize, dc: usize) -> Value {
        lookup_cell(lookup, &self.sheet, self.start_row + dr, self.start_col + dc)
    }
}

/// Interpret an argument as a range, resolving named ranges.
///
/// Returns None when the argument is not range-shaped; callers report
/// `#VALUE!` (or fall back to scalar handling) as appropriate.
pub(crate) fn resolve_range_arg(
    arg: &BoundExpr,
    lookup: &dyn CellLookup,
) -> Option<RangeArg> {
    match arg {
        Expr::Range {
            sheet,
            start_row,
            start_col,
            end_row,
            end_col,
            ..
        } => Some(RangeArg {
            sheet: *sheet,
            start_row: (*start_row).min(*end_row),
            start_col: (*start_col).min(*end_col),
            end_row: (*start_row).max(*end_row),
            end_col: (*start_col).max(*end_col),
        }),
        Expr::NamedRange(name) => match lookup.resolve_named_range(name)? {
            NamedRangeResolution::Range {
                sheet,
                start_row,
                start_col,
                end_row,
                end_col,
            } => Some(RangeArg {
                sheet: sheet.map_or(SheetRef::Current, SheetRef::Id),
                start_row: start_row.min(end_row),
                start_col: start_col.min(end_col),
                end_row: start_row.max(end_row),
                end_col: start_col.max(end_col),
            }),
            NamedRangeResolution::Cell { .. } => None,
        },
        _ => None,
    }
}

/// Collect every argument value, expanding ranges lazily in row-major
/// order. The first error encountered (in left-to-right, depth-first
/// order) short-circuits, implementing the propagation rule.
pub(crate) fn collect_values(
    args: &[BoundExpr],
    lookup: &dyn CellLookup,
) -> Result<Vec<Value>, ErrorKind> {
    let mut values = Vec::new();
    for arg in args {
        if let Some(range) = resolve_range_arg(arg, lookup) {
            if let SheetRef::RefError = range.sheet {
                return Err(ErrorKind::Ref);
            }
            for dr in 0..range.rows() {
                for dc in 0..range.cols() {
                    let v = range.cell(lookup, dr, dc);
                    if let Value::Error(e) = v {
                        return Err(e);
                    }
                    values.push(v);
                }
            }
        } else {
            let v = evaluate(arg, lookup);
            if let Value::Error(e) = v {
                return Err(e);
            }
            values.push(v);
        }
    }
    Ok(values)
}

/// Collect numeric values for aggregates.
///
/// Range cells contribute only their numbers (text, booleans and empties
/// are skipped, matching spreadsheet aggregate semantics); direct scalar
/// arguments are coerced and error on non-numeric input.
pub(crate) fn collect_numbers(
    args: &[BoundExpr],
    lookup: &dyn CellLookup,
) -> Result<Vec<f64>, ErrorKind> {
    let mut values = Vec::new();
    for arg in args {
        if let Some(range) = resolve_range_arg(arg, lookup) {
            if let SheetRef::RefError = range.sheet {
                return Err(ErrorKind::Ref);
            }
            for dr in 0..range.rows() {
                for dc in 0..range.cols() {
                    match range.cell(lookup, dr, dc) {
                        Value::Number(n) => values.push(n),
                        Value::Error(e) => return Err(e),
                        _ => {}
                    }
                }
            }
        } else {
            match evaluate(arg, lookup) {
                Value::Empty => {}
                v => values.push(v.to_number()?),
            }
        }
    }
    Ok(values)
}

/// Evaluate a single scalar argument to a number.
pub(crate) fn number_arg(arg: &BoundExpr, lookup: &dyn CellLookup) -> Result<f64, ErrorKind> {
    evaluate(arg, lookup).to_number()
}

/// Evaluate a single scalar argument to text.
pub(crate) fn text_arg(arg: &BoundExpr, lookup: &dyn CellLookup) -> Result<String, ErrorKind> {
    let v = evaluate(arg, lookup);
    if let Value::Error(e) = v {
        return Err(e);
    }
    Ok(v.to_text())
}
