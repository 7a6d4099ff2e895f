// Formula evaluator - evaluates bound expressions (after sheet name resolution)

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::functions;
use super::parser::{self, bind_expr_same_sheet, BoundExpr, Expr, Op};
use crate::sheet::{SheetId, SheetRef};

/// Evaluation error taxonomy. Errors are values, never exceptions: they
/// propagate through expressions and functions like any other operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum ErrorKind {
    /// Division by a value that is exactly zero.
    #[error("#DIV/0!")]
    Div0,
    /// Type or arity mismatch.
    #[error("#VALUE!")]
    Value,
    /// Reference to a nonexistent sheet or deleted range.
    #[error("#REF!")]
    Ref,
    /// Unknown function or named range.
    #[error("#NAME?")]
    Name,
    /// Cycle detected in the dependency graph.
    #[error("#CIRCULAR!")]
    Circular,
    /// Formula failed to parse.
    #[error("#SYNTAX!")]
    Syntax,
}

// =============================================================================
// Value: The scalar primitive for all cell values
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(ErrorKind),
}

impl Value {
    pub fn to_number(&self) -> Result<f64, ErrorKind> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) if s.trim().is_empty() => Ok(0.0),
            Value::Text(s) => s.trim().parse::<f64>().map_err(|_| ErrorKind::Value),
            Value::Empty => Ok(0.0),
            Value::Error(e) => Err(*e),
        }
    }

    pub fn to_bool(&self) -> Result<bool, ErrorKind> {
        match self {
            Value::Boolean(b) => Ok(*b),
            Value::Number(n) => Ok(*n != 0.0),
            Value::Text(s) => {
                if s.eq_ignore_ascii_case("TRUE") {
                    Ok(true)
                } else if s.eq_ignore_ascii_case("FALSE") {
                    Ok(false)
                } else {
                    Err(ErrorKind::Value)
                }
            }
            Value::Empty => Ok(false),
            Value::Error(e) => Err(*e),
        }
    }

    /// Text form used for concatenation and text functions.
    pub fn to_text(&self) -> String {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Text(s) => s.clone(),
            Value::Boolean(b) => {
                if *b {
                    "TRUE".to_string()
                } else {
                    "FALSE".to_string()
                }
            }
            Value::Empty => String::new(),
            Value::Error(e) => e.to_string(),
        }
    }

    /// Display form shown to the user; identical to `to_text` today but
    /// kept separate so a formatting layer can hook in.
    pub fn to_display(&self) -> String {
        self.to_text()
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn as_error(&self) -> Option<ErrorKind> {
        match self {
            Value::Error(e) => Some(*e),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }
}

/// Result of resolving a named range. `sheet: None` targets the current
/// sheet of the evaluation context.
#[derive(Debug, Clone)]
pub enum NamedRangeResolution {
    Cell {
        sheet: Option<SheetId>,
        row: usize,
        col: usize,
    },
    Range {
        sheet: Option<SheetId>,
        start_row: usize,
        start_col: usize,
        end_row: usize,
        end_col: usize,
    },
}

/// Value provider for formula evaluation.
///
/// Implementations return *already computed* values; the evaluator never
/// triggers recursive evaluation through this trait. The workbook's
/// scheduler guarantees precedents are fresh before a dependent is
/// evaluated.
pub trait CellLookup {
    /// Value of a cell on the current sheet. Absent cells are `Empty`.
    fn value(&self, row: usize, col: usize) -> Value;

    /// Value of a cell on another sheet by SheetId.
    /// Default implementation reports #REF! (cross-sheet not supported).
    fn value_on(&self, _sheet: SheetId, _row: usize, _col: usize) -> Value {
        Value::Error(ErrorKind::Ref)
    }

    /// Resolve a named range. Default: named ranges not supported.
    fn resolve_named_range(&self, _name: &str) -> Option<NamedRangeResolution> {
        None
    }

    /// The cell being evaluated, if any (for future ROW()/COLUMN() support).
    fn current_cell(&self) -> Option<(usize, usize)> {
        None
    }
}

/// A lookup with no cells at all; every reference reads as empty.
///
/// Useful for evaluating self-contained formulas (`=1+2`) outside any sheet.
pub struct EmptyLookup;

impl CellLookup for EmptyLookup {
    fn value(&self, _row: usize, _col: usize) -> Value {
        Value::Empty
    }
}

/// Read a cell through the lookup, honoring the sheet qualifier.
pub(crate) fn lookup_cell(
    lookup: &dyn CellLookup,
    sheet: &SheetRef,
    row: usize,
    col: usize,
) -> Value {
    match sheet {
        SheetRef::Current => lookup.value(row, col),
        SheetRef::Id(id) => lookup.value_on(*id, row, col),
        SheetRef::RefError => Value::Error(ErrorKind::Ref),
    }
}

/// Evaluate a bound expression against a value provider.
///
/// Depth-first; the first error encountered in left-to-right order wins.
pub fn evaluate(expr: &BoundExpr, lookup: &dyn CellLookup) -> Value {
    match expr {
        Expr::Empty => Value::Empty,
        Expr::Number(n) => Value::Number(*n),
        Expr::Text(s) => Value::Text(s.clone()),
        Expr::Boolean(b) => Value::Boolean(*b),
        Expr::CellRef { sheet, col, row, .. } => lookup_cell(lookup, sheet, *row, *col),
        Expr::Range { .. } => {
            // Ranges are only meaningful as function arguments.
            Value::Error(ErrorKind::Value)
        }
        Expr::NamedRange(name) => match lookup.resolve_named_range(name) {
            None => Value::Error(ErrorKind::Name),
            Some(NamedRangeResolution::Cell { sheet, row, col }) => match sheet {
                None => lookup.value(row, col),
                Some(id) => lookup.value_on(id, row, col),
            },
            Some(NamedRangeResolution::Range { .. }) => Value::Error(ErrorKind::Value),
        },
        Expr::Function { name, args } => functions::call(name, args, lookup),
        Expr::BinaryOp { op, left, right } => {
            let left_val = evaluate(left, lookup);
            if let Value::Error(e) = left_val {
                return Value::Error(e);
            }
            let right_val = evaluate(right, lookup);
            if let Value::Error(e) = right_val {
                return Value::Error(e);
            }
            apply_binary_op(*op, &left_val, &right_val)
        }
    }
}

fn apply_binary_op(op: Op, left: &Value, right: &Value) -> Value {
    match op {
        Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Pow => {
            let a = match left.to_number() {
                Ok(n) => n,
                Err(e) => return Value::Error(e),
            };
            let b = match right.to_number() {
                Ok(n) => n,
                Err(e) => return Value::Error(e),
            };
            match op {
                Op::Add => Value::Number(a + b),
                Op::Sub => Value::Number(a - b),
                Op::Mul => Value::Number(a * b),
                Op::Div => {
                    if b == 0.0 {
                        Value::Error(ErrorKind::Div0)
                    } else {
                        Value::Number(a / b)
                    }
                }
                Op::Pow => Value::Number(a.powf(b)),
                _ => unreachable!(),
            }
        }

        Op::Lt | Op::Gt | Op::Eq | Op::LtEq | Op::GtEq | Op::NotEq => {
            Value::Boolean(compare(op, left, right))
        }

        Op::Concat => Value::Text(format!("{}{}", left.to_text(), right.to_text())),
    }
}

/// Compare two values: numbers numerically, text case-insensitively,
/// mixed types through numeric coercion first and text as fallback.
fn compare(op: Op, left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => compare_numbers(op, *a, *b),
        (Value::Text(a), Value::Text(b)) => {
            compare_ord(op, a.to_lowercase().cmp(&b.to_lowercase()))
        }
        (Value::Boolean(a), Value::Boolean(b)) => compare_ord(op, a.cmp(b)),
        _ => {
            if let (Ok(a), Ok(b)) = (left.to_number(), right.to_number()) {
                compare_numbers(op, a, b)
            } else {
                let a = left.to_text().to_lowercase();
                let b = right.to_text().to_lowercase();
                compare_ord(op, a.cmp(&b))
            }
        }
    }
}

fn compare_numbers(op: Op, a: f64, b: f64) -> bool {
    match op {
        Op::Lt => a < b,
        Op::Gt => a > b,
        Op::Eq => (a - b).abs() < f64::EPSILON,
        Op::LtEq => a <= b,
        Op::GtEq => a >= b,
        Op::NotEq => (a - b).abs() >= f64::EPSILON,
        _ => unreachable!(),
    }
}

fn compare_ord(op: Op, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        Op::Lt => ord == Less,
        Op::Gt => ord == Greater,
        Op::Eq => ord == Equal,
        Op::LtEq => ord != Greater,
        Op::GtEq => ord != Less,
        Op::NotEq => ord != Equal,
        _ => unreachable!(),
    }
}

/// Stateless formula evaluation, independent of any stored cell.
///
/// Parses, binds against the lookup's world (sheet-qualified references
/// resolve to #REF! since there is no sheet table), and evaluates.
/// A parse failure yields `#SYNTAX!` rather than an Err: the error
/// taxonomy is part of the value domain.
pub fn evaluate_formula(formula: &str, lookup: &dyn CellLookup) -> Value {
    match parser::parse(formula) {
        Ok(parsed) => evaluate(&bind_expr_same_sheet(&parsed), lookup),
        Err(_) => Value::Error(ErrorKind::Syntax),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use rustc_hash::FxHashMap;

    /// Map-backed lookup for evaluator and function tests.
    #[derive(Default)]
    pub struct MapLookup {
        pub cells: FxHashMap<(usize, usize), Value>,
    }

    impl MapLookup {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, row: usize, col: usize, value: Value) -> Self {
            self.cells.insert((row, col), value);
            self
        }

        pub fn number(self, row: usize, col: usize, n: f64) -> Self {
            self.with(row, col, Value::Number(n))
        }

        pub fn text(self, row: usize, col: usize, s: &str) -> Self {
            self.with(row, col, Value::Text(s.to_string()))
        }
    }

    impl CellLookup for MapLookup {
        fn value(&self, row: usize, col: usize) -> Value {
            self.cells.get(&(row, col)).cloned().unwrap_or(Value::Empty)
        }
    }

    pub fn eval_str(formula: &str, lookup: &dyn CellLookup) -> Value {
        evaluate_formula(formula, lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{eval_str, MapLookup};
    use super::*;

    #[test]
    fn test_arithmetic() {
        let ctx = EmptyLookup;
        assert_eq!(eval_str("=1+2*3", &ctx), Value::Number(7.0));
        assert_eq!(eval_str("=(1+2)*3", &ctx), Value::Number(9.0));
        assert_eq!(eval_str("=10-3-2", &ctx), Value::Number(5.0));
        assert_eq!(eval_str("=2^3^2", &ctx), Value::Number(512.0));
        assert_eq!(eval_str("=7/2", &ctx), Value::Number(3.5));
        assert_eq!(eval_str("=50%", &ctx), Value::Number(0.5));
        assert_eq!(eval_str("=-3+5", &ctx), Value::Number(2.0));
    }

    #[test]
    fn test_division_by_zero() {
        let ctx = EmptyLookup;
        assert_eq!(eval_str("=1/0", &ctx), Value::Error(ErrorKind::Div0));
        // A reference that reads as empty counts as exactly zero.
        assert_eq!(eval_str("=1/A1", &ctx), Value::Error(ErrorKind::Div0));
    }

    #[test]
    fn test_unknown_function() {
        let ctx = EmptyLookup;
        assert_eq!(
            eval_str("=UNKNOWNFN(1)", &ctx),
            Value::Error(ErrorKind::Name)
        );
    }

    #[test]
    fn test_syntax_error_is_value() {
        let ctx = EmptyLookup;
        assert_eq!(eval_str("=SUM(", &ctx), Value::Error(ErrorKind::Syntax));
        assert_eq!(eval_str("1+2", &ctx), Value::Error(ErrorKind::Syntax));
    }

    #[test]
    fn test_cell_references() {
        let ctx = MapLookup::new().number(0, 0, 5.0).number(0, 1, 3.0);
        assert_eq!(eval_str("=A1+B1", &ctx), Value::Number(8.0));
        assert_eq!(eval_str("=A1*2", &ctx), Value::Number(10.0));
    }

    #[test]
    fn test_empty_cell_is_zero() {
        let ctx = MapLookup::new();
        assert_eq!(eval_str("=Z99+1", &ctx), Value::Number(1.0));
    }

    #[test]
    fn test_error_propagates_through_operators() {
        let ctx = MapLookup::new().with(0, 0, Value::Error(ErrorKind::Div0));
        assert_eq!(eval_str("=A1+1", &ctx), Value::Error(ErrorKind::Div0));
        assert_eq!(eval_str("=1+A1", &ctx), Value::Error(ErrorKind::Div0));
        assert_eq!(eval_str("=A1&\"x\"", &ctx), Value::Error(ErrorKind::Div0));
    }

    #[test]
    fn test_first_error_wins_left_to_right() {
        let ctx = MapLookup::new()
            .with(0, 0, Value::Error(ErrorKind::Div0))
            .with(0, 1, Value::Error(ErrorKind::Name));
        assert_eq!(eval_str("=A1+B1", &ctx), Value::Error(ErrorKind::Div0));
        assert_eq!(eval_str("=B1+A1", &ctx), Value::Error(ErrorKind::Name));
    }

    #[test]
    fn test_comparisons() {
        let ctx = EmptyLookup;
        assert_eq!(eval_str("=1<2", &ctx), Value::Boolean(true));
        assert_eq!(eval_str("=2<=2", &ctx), Value::Boolean(true));
        assert_eq!(eval_str("=3>5", &ctx), Value::Boolean(false));
        assert_eq!(eval_str("=1<>2", &ctx), Value::Boolean(true));
        assert_eq!(eval_str("=\"abc\"=\"ABC\"", &ctx), Value::Boolean(true));
        assert_eq!(eval_str("=\"a\"<\"b\"", &ctx), Value::Boolean(true));
    }

    #[test]
    fn test_concat() {
        let ctx = MapLookup::new().number(0, 0, 3.0);
        assert_eq!(
            eval_str("=\"n=\"&A1", &ctx),
            Value::Text("n=3".to_string())
        );
    }

    #[test]
    fn test_text_coercion_in_arithmetic() {
        let ctx = MapLookup::new().text(0, 0, "4");
        assert_eq!(eval_str("=A1*2", &ctx), Value::Number(8.0));

        let ctx = MapLookup::new().text(0, 0, "abc");
        assert_eq!(eval_str("=A1*2", &ctx), Value::Error(ErrorKind::Value));
    }

    #[test]
    fn test_bare_range_is_value_error() {
        let ctx = EmptyLookup;
        assert_eq!(eval_str("=A1:A3", &ctx), Value::Error(ErrorKind::Value));
    }

    #[test]
    fn test_sheet_qualified_without_table_is_ref_error() {
        let ctx = EmptyLookup;
        assert_eq!(eval_str("=Sheet2!A1", &ctx), Value::Error(ErrorKind::Ref));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Value::Error(ErrorKind::Div0).to_display(), "#DIV/0!");
        assert_eq!(Value::Error(ErrorKind::Value).to_display(), "#VALUE!");
        assert_eq!(Value::Error(ErrorKind::Ref).to_display(), "#REF!");
        assert_eq!(Value::Error(ErrorKind::Name).to_display(), "#NAME?");
        assert_eq!(Value::Error(ErrorKind::Circular).to_display(), "#CIRCULAR!");
        assert_eq!(Value::Error(ErrorKind::Syntax).to_display(), "#SYNTAX!");
    }

    #[test]
    fn test_number_display() {
        assert_eq!(Value::Number(3.0).to_display(), "3");
        assert_eq!(Value::Number(3.5).to_display(), "3.5");
        assert_eq!(Value::Number(-2.0).to_display(), "-2");
    }
}
