// Date/time functions: NOW, TODAY, DATE, YEAR, MONTH, DAY
//
// Dates are serial numbers of days since 1899-12-30 (the spreadsheet
// epoch), so date arithmetic is plain subtraction: =TODAY()-A1.

use chrono::{Datelike, Duration, Local, NaiveDate, Timelike};
use rustc_hash::FxHashMap;

use super::eval::{CellLookup, ErrorKind, Value};
use super::functions::{add, number_arg, FunctionDef};
use super::parser::BoundExpr;

pub(crate) fn register(map: &mut FxHashMap<&'static str, FunctionDef>) {
    for def in [
        FunctionDef { name: "NOW", min_args: 0, max_args: Some(0), volatile: true, eval: now },
        FunctionDef { name: "TODAY", min_args: 0, max_args: Some(0), volatile: true, eval: today },
        FunctionDef { name: "DATE", min_args: 3, max_args: Some(3), volatile: false, eval: date },
        FunctionDef { name: "YEAR", min_args: 1, max_args: Some(1), volatile: false, eval: year },
        FunctionDef { name: "MONTH", min_args: 1, max_args: Some(1), volatile: false, eval: month },
        FunctionDef { name: "DAY", min_args: 1, max_args: Some(1), volatile: false, eval: day },
    ] {
        add(map, def);
    }
}

fn epoch() -> NaiveDate {
    // 1899-12-30 is a valid date; this cannot fail.
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap()
}

/// Serial day number for a date.
pub fn date_to_serial(date: NaiveDate) -> f64 {
    (date - epoch()).num_days() as f64
}

/// Date for a serial day number (fractional time-of-day is truncated).
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    epoch().checked_add_signed(Duration::days(serial.floor() as i64))
}

/// Parse an ISO `YYYY-MM-DD` date to its serial number.
pub fn parse_iso_date(text: &str) -> Option<f64> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .ok()
        .map(date_to_serial)
}

fn now(_args: &[BoundExpr], _lookup: &dyn CellLookup) -> Value {
    let local = Local::now().naive_local();
    let days = date_to_serial(local.date());
    let secs = local.time().num_seconds_from_midnight() as f64;
    Value::Number(days + secs / 86_400.0)
}

fn today(_args: &[BoundExpr], _lookup: &dyn CellLookup) -> Value {
    Value::Number(date_to_serial(Local::now().date_naive()))
}

fn date(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    let year = match number_arg(&args[0], lookup) {
        Ok(n) => n as i32,
        Err(e) => return Value::Error(e),
    };
    let month = match number_arg(&args[1], lookup) {
        Ok(n) => n as i64,
        Err(e) => return Value::Error(e),
    };
    let day = match number_arg(&args[2], lookup) {
        Ok(n) => n as i64,
        Err(e) => return Value::Error(e),
    };

    // Out-of-range months and days roll over, spreadsheet style:
    // DATE(2024,13,1) = 2025-01-01, DATE(2024,1,32) = 2024-02-01.
    let year_shift = (month - 1).div_euclid(12);
    let month_norm = (month - 1).rem_euclid(12) + 1;
    let year = year + year_shift as i32;

    let Some(first) = NaiveDate::from_ymd_opt(year, month_norm as u32, 1) else {
        return Value::Error(ErrorKind::Value);
    };
    Value::Number(date_to_serial(first) + (day - 1) as f64)
}

fn year(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    date_part(args, lookup, |d| d.year() as f64)
}

fn month(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    date_part(args, lookup, |d| d.month() as f64)
}

fn day(args: &[BoundExpr], lookup: &dyn CellLookup) -> Value {
    date_part(args, lookup, |d| d.day() as f64)
}

fn date_part(
    args: &[BoundExpr],
    lookup: &dyn CellLookup,
    part: fn(NaiveDate) -> f64,
) -> Value {
    let serial = match number_arg(&args[0], lookup) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    match serial_to_date(serial) {
        Some(d) => Value::Number(part(d)),
        None => Value::Error(ErrorKind::Value),
    }
}
