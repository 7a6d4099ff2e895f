// Lookup functions: VLOOKUP, INDEX, MATCH, CHOOSE
//
// VLOOKUP and MATCH default to exact matching; pass TRUE as the optional
// trailing argument of VLOOKUP for approximate (sorted) search.

use rustc_hash::FxHashMap;

use super::eval::{evaluate, CellLookup, ErrorKind, Value};
use super::functions::{add, number_arg, resolve_range_arg, FunctionDef, RangeArg};
use super::parser::BoundExpr;

pub(crate) fn register(map: &mut FxHashMap<&'static str, FunctionDef>) {
    for def in [
        FunctionDef { name: "VLOOKUP", min_args: 3, max_args: Some(4), volatile: false, eval: vlookup },
        FunctionDef { name: "INDEX", min_args: 2, max_args: Some(3), volatile: false, eval: index },
        FunctionDef { name: "MATCH", min_args: 2, max_args: Some(3), volatile: false, eval: match_fn },
        FunctionDef { name: "CHOOSE", min_args: 2, max_args: None, volatile: false, eval: choose },
    ] {
        add(map, def);
    }
}

/// Loose equality used by lookup matching: numeric when both sides are
/// numeric, case-insensitive text otherwise.
fn values_match(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => (x - y).abs() < f64::EPSILON,
        _ => a.to_text().eq_ignore_ascii_case(&b.to_text()),
    }
}

fn table_arg(arg: &BoundExpr, lookup: &dyn CellLookup) -> Result<RangeArg, ErrorKind> {
    resolve_range_arg(arg, lookup).ok_or(ErrorKind::Value)
}

fn vlookup(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    let needle = evaluate(&args[0], lookup);
    if let Value::Error(e) = needle {
        return Value::Error(e);
    }
    let table = match table_arg(&args[1], lookup) {
        Ok(t) => t,
        Err(e) => return Value::Error(e),
    };
    let col_index = match number_arg(&args[2], lookup) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    if col_index < 1.0 || col_index as usize > table.cols() {
        return Value::Error(ErrorKind::Value);
    }
    let col = col_index as usize - 1;

    let approximate = match args.get(3) {
        None => false,
        Some(arg) => match evaluate(arg, lookup).to_bool() {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        },
    };

    if approximate {
        // Assumes the first column is sorted ascending: last row whose key
        // does not exceed the needle wins.
        let target = match needle.to_number() {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let mut found: Option<usize> = None;
        for dr in 0..table.rows() {
            match table.cell(lookup, dr, 0) {
                Value::Number(key) if key <= target => found = Some(dr),
                Value::Number(_) => break,
                _ => {}
            }
        }
        match found {
            Some(dr) => table.cell(lookup, dr, col),
            None => Value::Error(ErrorKind::Value),
        }
    } else {
        for dr in 0..table.rows() {
            let key = table.cell(lookup, dr, 0);
            if values_match(&key, &needle) {
                return table.cell(lookup, dr, col);
            }
        }
        Value::Error(ErrorKind::Value)
    }
}

fn index(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    let table = match table_arg(&args[0], lookup) {
        Ok(t) => t,
        Err(e) => return Value::Error(e),
    };
    let row = match number_arg(&args[1], lookup) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    let col = match args.get(2) {
        None => 1.0,
        Some(arg) => match number_arg(arg, lookup) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        },
    };
    if row < 1.0 || col < 1.0 {
        return Value::Error(ErrorKind::Value);
    }
    let (row, col) = (row as usize, col as usize);
    if row > table.rows() || col > table.cols() {
        return Value::Error(ErrorKind::Ref);
    }
    table.cell(lookup, row - 1, col - 1)
}

fn match_fn(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    let needle = evaluate(&args[0], lookup);
    if let Value::Error(e) = needle {
        return Value::Error(e);
    }
    let range = match table_arg(&args[1], lookup) {
        Ok(t) => t,
        Err(e) => return Value::Error(e),
    };
    // Only exact matching (match_type 0) is supported.
    if let Some(arg) = args.get(2) {
        match number_arg(arg, lookup) {
            Ok(n) if n == 0.0 => {}
            Ok(_) => return Value::Error(ErrorKind::Value),
            Err(e) => return Value::Error(e),
        }
    }
    // A MATCH range must be one row or one column.
    if range.rows() > 1 && range.cols() > 1 {
        return Value::Error(ErrorKind::Value);
    }
    let len = range.rows().max(range.cols());
    for i in 0..len {
        let (dr, dc) = if range.rows() >= range.cols() { (i, 0) } else { (0, i) };
        if values_match(&range.cell(lookup, dr, dc), &needle) {
            return Value::Number((i + 1) as f64);
        }
    }
    Value::Error(ErrorKind::Value)
}

fn choose(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    let index = match number_arg(&args[0], lookup) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    if index < 1.0 || index as usize >= args.len() {
        return Value::Error(ErrorKind::Value);
    }
    evaluate(&args[index as usize], lookup)
}

#[cfg(test)]
mod tests {
    use super::super::eval::test_support::{eval_str, MapLookup};
    use super::super::eval::{EmptyLookup, ErrorKind, Value};

    /// A1:B3 lookup table: keys in column A, labels in column B.
    fn table() -> MapLookup {
        MapLookup::new()
            .number(0, 0, 10.0)
            .text(0, 1, "ten")
            .number(1, 0, 20.0)
            .text(1, 1, "twenty")
            .number(2, 0, 30.0)
            .text(2, 1, "thirty")
    }

    #[test]
    fn test_vlookup_exact() {
        let ctx = table();
        assert_eq!(
            eval_str("=VLOOKUP(20,A1:B3,2)", &ctx),
            Value::Text("twenty".to_string())
        );
        assert_eq!(
            eval_str("=VLOOKUP(25,A1:B3,2)", &ctx),
            Value::Error(ErrorKind::Value)
        );
    }

    #[test]
    fn test_vlookup_approximate() {
        let ctx = table();
        assert_eq!(
            eval_str("=VLOOKUP(25,A1:B3,2,TRUE)", &ctx),
            Value::Text("twenty".to_string())
        );
        assert_eq!(
            eval_str("=VLOOKUP(5,A1:B3,2,TRUE)", &ctx),
            Value::Error(ErrorKind::Value)
        );
    }

    #[test]
    fn test_vlookup_bad_col_index() {
        let ctx = table();
        assert_eq!(
            eval_str("=VLOOKUP(10,A1:B3,3)", &ctx),
            Value::Error(ErrorKind::Value)
        );
    }

    #[test]
    fn test_index() {
        let ctx = table();
        assert_eq!(
            eval_str("=INDEX(A1:B3,2,2)", &ctx),
            Value::Text("twenty".to_string())
        );
        assert_eq!(eval_str("=INDEX(A1:A3,3)", &ctx), Value::Number(30.0));
        assert_eq!(
            eval_str("=INDEX(A1:B3,4,1)", &ctx),
            Value::Error(ErrorKind::Ref)
        );
    }

    #[test]
    fn test_match() {
        let ctx = table();
        assert_eq!(eval_str("=MATCH(20,A1:A3)", &ctx), Value::Number(2.0));
        assert_eq!(eval_str("=MATCH(20,A1:A3,0)", &ctx), Value::Number(2.0));
        assert_eq!(
            eval_str("=MATCH(99,A1:A3)", &ctx),
            Value::Error(ErrorKind::Value)
        );
        assert_eq!(
            eval_str("=MATCH(20,A1:A3,1)", &ctx),
            Value::Error(ErrorKind::Value)
        );
    }

    #[test]
    fn test_match_text_case_insensitive() {
        let ctx = MapLookup::new().text(0, 0, "Alpha").text(1, 0, "Beta");
        assert_eq!(
            eval_str("=MATCH(\"beta\",A1:A2)", &ctx),
            Value::Number(2.0)
        );
    }

    #[test]
    fn test_index_match_combo() {
        let ctx = table();
        assert_eq!(
            eval_str("=INDEX(B1:B3,MATCH(30,A1:A3))", &ctx),
            Value::Text("thirty".to_string())
        );
    }

    #[test]
    fn test_choose() {
        let ctx = EmptyLookup;
        assert_eq!(eval_str("=CHOOSE(2,\"a\",\"b\",\"c\")", &ctx), Value::Text("b".to_string()));
        assert_eq!(
            eval_str("=CHOOSE(4,\"a\",\"b\")", &ctx),
            Value::Error(ErrorKind::Value)
        );
    }

    #[test]
    fn test_vlookup_requires_range() {
        let ctx = table();
        assert_eq!(
            eval_str("=VLOOKUP(10,5,1)", &ctx),
            Value::Error(ErrorKind::Value)
        );
    }
}
