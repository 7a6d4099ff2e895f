// Math and aggregate functions: SUM, AVERAGE, COUNT, COUNTA, MIN, MAX,
// PRODUCT, MEDIAN, ABS, ROUND, INT, MOD, SQRT, POWER, EXP, LN

use rustc_hash::FxHashMap;

use super::eval::{CellLookup, ErrorKind, Value};
use super::functions::{add, collect_numbers, collect_values, number_arg, FunctionDef};
use super::parser::BoundExpr;

pub(crate) fn register(map: &mut FxHashMap<&'static str, FunctionDef>) {
    for def in [
        FunctionDef { name: "SUM", min_args: 1, max_args: None, volatile: false, eval: sum },
        FunctionDef { name: "AVERAGE", min_args: 1, max_args: None, volatile: false, eval: average },
        FunctionDef { name: "COUNT", min_args: 1, max_args: None, volatile: false, eval: count },
        FunctionDef { name: "COUNTA", min_args: 1, max_args: None, volatile: false, eval: counta },
        FunctionDef { name: "MIN", min_args: 1, max_args: None, volatile: false, eval: min },
        FunctionDef { name: "MAX", min_args: 1, max_args: None, volatile: false, eval: max },
        FunctionDef { name: "PRODUCT", min_args: 1, max_args: None, volatile: false, eval: product },
        FunctionDef { name: "MEDIAN", min_args: 1, max_args: None, volatile: false, eval: median },
        FunctionDef { name: "ABS", min_args: 1, max_args: Some(1), volatile: false, eval: abs },
        FunctionDef { name: "ROUND", min_args: 1, max_args: Some(2), volatile: false, eval: round },
        FunctionDef { name: "INT", min_args: 1, max_args: Some(1), volatile: false, eval: int },
        FunctionDef { name: "MOD", min_args: 2, max_args: Some(2), volatile: false, eval: modulo },
        FunctionDef { name: "SQRT", min_args: 1, max_args: Some(1), volatile: false, eval: sqrt },
        FunctionDef { name: "POWER", min_args: 2, max_args: Some(2), volatile: false, eval: power },
        FunctionDef { name: "EXP", min_args: 1, max_args: Some(1), volatile: false, eval: exp },
        FunctionDef { name: "LN", min_args: 1, max_args: Some(1), volatile: false, eval: ln },
    ] {
        add(map, def);
    }
}

fn sum(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match collect_numbers(args, lookup) {
        Ok(vals) => Value::Number(vals.iter().sum()),
        Err(e) => Value::Error(e),
    }
}

fn average(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match collect_numbers(args, lookup) {
        Ok(vals) => {
            if vals.is_empty() {
                Value::Error(ErrorKind::Div0)
            } else {
                Value::Number(vals.iter().sum::<f64>() / vals.len() as f64)
            }
        }
        Err(e) => Value::Error(e),
    }
}

fn count(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match collect_numbers(args, lookup) {
        Ok(vals) => Value::Number(vals.len() as f64),
        Err(e) => Value::Error(e),
    }
}

fn counta(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match collect_values(args, lookup) {
        Ok(vals) => {
            let n = vals.iter().filter(|v| !v.is_empty()).count();
            Value::Number(n as f64)
        }
        Err(e) => Value::Error(e),
    }
}

fn min(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match collect_numbers(args, lookup) {
        Ok(vals) => {
            if vals.is_empty() {
                Value::Number(0.0)
            } else {
                Value::Number(vals.iter().cloned().fold(f64::INFINITY, f64::min))
            }
        }
        Err(e) => Value::Error(e),
    }
}

fn max(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match collect_numbers(args, lookup) {
        Ok(vals) => {
            if vals.is_empty() {
                Value::Number(0.0)
            } else {
                Value::Number(vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
            }
        }
        Err(e) => Value::Error(e),
    }
}

fn product(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match collect_numbers(args, lookup) {
        Ok(vals) => {
            if vals.is_empty() {
                Value::Number(0.0)
            } else {
                Value::Number(vals.iter().product())
            }
        }
        Err(e) => Value::Error(e),
    }
}

fn median(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match collect_numbers(args, lookup) {
        Ok(mut vals) => {
            if vals.is_empty() {
                return Value::Error(ErrorKind::Div0);
            }
            vals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let mid = vals.len() / 2;
            if vals.len() % 2 == 1 {
                Value::Number(vals[mid])
            } else {
                Value::Number((vals[mid - 1] + vals[mid]) / 2.0)
            }
        }
        Err(e) => Value::Error(e),
    }
}

fn abs(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match number_arg(&args[0], lookup) {
        Ok(n) => Value::Number(n.abs()),
        Err(e) => Value::Error(e),
    }
}

fn round(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    let value = match number_arg(&args[0], lookup) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    let decimals = if args.len() == 2 {
        match number_arg(&args[1], lookup) {
            Ok(n) => n as i32,
            Err(e) => return Value::Error(e),
        }
    } else {
        0
    };
    let factor = 10_f64.powi(decimals);
    Value::Number((value * factor).round() / factor)
}

fn int(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match number_arg(&args[0], lookup) {
        Ok(n) => Value::Number(n.floor()),
        Err(e) => Value::Error(e),
    }
}

fn modulo(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    let number = match number_arg(&args[0], lookup) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    let divisor = match number_arg(&args[1], lookup) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    if divisor == 0.0 {
        return Value::Error(ErrorKind::Div0);
    }
    Value::Number(number % divisor)
}

fn sqrt(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match number_arg(&args[0], lookup) {
        Ok(n) if n < 0.0 => Value::Error(ErrorKind::Value),
        Ok(n) => Value::Number(n.sqrt()),
        Err(e) => Value::Error(e),
    }
}

fn power(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    let base = match number_arg(&args[0], lookup) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    let exponent = match number_arg(&args[1], lookup) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    Value::Number(base.powf(exponent))
}

fn exp(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match number_arg(&args[0], lookup) {
        Ok(n) => Value::Number(n.exp()),
        Err(e) => Value::Error(e),
    }
}

fn ln(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    match number_arg(&args[0], lookup) {
        Ok(n) if n <= 0.0 => Value::Error(ErrorKind::Value),
        Ok(n) => Value::Number(n.ln()),
        Err(e) => Value::Error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::super::eval::test_support::{eval_str, MapLookup};
    use super::super::eval::{EmptyLookup, ErrorKind, Value};

    fn column(values: &[f64]) -> MapLookup {
        let mut ctx = MapLookup::new();
        for (i, v) in values.iter().enumerate() {
            ctx = ctx.number(i, 0, *v);
        }
        ctx
    }

    #[test]
    fn test_sum_average_count() {
        let ctx = column(&[10.0, 20.0, 30.0]);
        assert_eq!(eval_str("=SUM(A1:A3)", &ctx), Value::Number(60.0));
        assert_eq!(eval_str("=AVERAGE(A1:A3)", &ctx), Value::Number(20.0));
        assert_eq!(eval_str("=COUNT(A1:A3)", &ctx), Value::Number(3.0));
        assert_eq!(eval_str("=SUM(A1:A3,5)", &ctx), Value::Number(65.0));
    }

    #[test]
    fn test_average_of_empty_range_is_div0() {
        let ctx = MapLookup::new();
        assert_eq!(
            eval_str("=AVERAGE(A1:A3)", &ctx),
            Value::Error(ErrorKind::Div0)
        );
    }

    #[test]
    fn test_min_max() {
        let ctx = column(&[7.0, -2.0, 4.0]);
        assert_eq!(eval_str("=MIN(A1:A3)", &ctx), Value::Number(-2.0));
        assert_eq!(eval_str("=MAX(A1:A3)", &ctx), Value::Number(7.0));
    }

    #[test]
    fn test_median() {
        let ctx = column(&[3.0, 1.0, 2.0]);
        assert_eq!(eval_str("=MEDIAN(A1:A3)", &ctx), Value::Number(2.0));
        let ctx = column(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(eval_str("=MEDIAN(A1:A4)", &ctx), Value::Number(2.5));
    }

    #[test]
    fn test_product() {
        let ctx = column(&[2.0, 3.0, 4.0]);
        assert_eq!(eval_str("=PRODUCT(A1:A3)", &ctx), Value::Number(24.0));
    }

    #[test]
    fn test_scalar_functions() {
        let ctx = EmptyLookup;
        assert_eq!(eval_str("=ABS(-3)", &ctx), Value::Number(3.0));
        assert_eq!(eval_str("=INT(3.9)", &ctx), Value::Number(3.0));
        assert_eq!(eval_str("=INT(-1.5)", &ctx), Value::Number(-2.0));
        assert_eq!(eval_str("=ROUND(3.14159,2)", &ctx), Value::Number(3.14));
        assert_eq!(eval_str("=ROUND(2.5)", &ctx), Value::Number(3.0));
        assert_eq!(eval_str("=MOD(10,3)", &ctx), Value::Number(1.0));
        assert_eq!(eval_str("=SQRT(9)", &ctx), Value::Number(3.0));
        assert_eq!(eval_str("=POWER(2,10)", &ctx), Value::Number(1024.0));
    }

    #[test]
    fn test_mod_by_zero() {
        let ctx = EmptyLookup;
        assert_eq!(eval_str("=MOD(10,0)", &ctx), Value::Error(ErrorKind::Div0));
    }

    #[test]
    fn test_sqrt_negative_and_ln_nonpositive() {
        let ctx = EmptyLookup;
        assert_eq!(eval_str("=SQRT(-1)", &ctx), Value::Error(ErrorKind::Value));
        assert_eq!(eval_str("=LN(0)", &ctx), Value::Error(ErrorKind::Value));
    }

    #[test]
    fn test_counta() {
        let ctx = MapLookup::new().number(0, 0, 1.0).text(1, 0, "x");
        assert_eq!(eval_str("=COUNTA(A1:A3)", &ctx), Value::Number(2.0));
    }
}
