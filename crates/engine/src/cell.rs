//! Cell contents: raw input plus the cached computed value.

use serde::{Deserialize, Serialize};

use crate::formula::eval::{ErrorKind, Value};
use crate::formula::parser::{self, ParsedExpr};

/// What the user typed into a cell, classified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    /// Input began with `=`. `ast` is None when the source failed to parse;
    /// the source text is kept either way so the user can fix it.
    Formula {
        source: String,
        #[serde(skip)]
        ast: Option<ParsedExpr>,
    },
}

impl CellValue {
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return CellValue::Empty;
        }

        if trimmed.starts_with('=') {
            let ast = parser::parse(trimmed).ok();
            return CellValue::Formula {
                source: trimmed.to_string(),
                ast,
            };
        }

        if let Ok(num) = trimmed.parse::<f64>() {
            return CellValue::Number(num);
        }

        CellValue::Text(trimmed.to_string())
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Formula { .. })
    }

    pub fn formula_ast(&self) -> Option<&ParsedExpr> {
        match self {
            CellValue::Formula { ast, .. } => ast.as_ref(),
            _ => None,
        }
    }

    /// The raw input text: literal text, the number as typed, or the
    /// formula source including its leading `=`.
    pub fn raw_display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => Value::Number(*n).to_display(),
            CellValue::Formula { source, .. } => source.clone(),
        }
    }

    /// The literal value of a non-formula cell.
    pub fn literal_value(&self) -> Value {
        match self {
            CellValue::Empty => Value::Empty,
            CellValue::Number(n) => Value::Number(*n),
            CellValue::Text(s) => Value::Text(s.clone()),
            CellValue::Formula { .. } => Value::Empty,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cell {
    pub value: CellValue,
    /// Cached evaluation result. For non-formula cells this always equals
    /// the literal value; for formula cells the recalculation scheduler
    /// keeps it consistent with the current state of all precedents.
    #[serde(skip)]
    pub computed: Value,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, input: &str) {
        self.value = CellValue::from_input(input);
        match &self.value {
            CellValue::Formula { ast: Some(_), .. } => {
                // Stale until the scheduler evaluates it this pass.
            }
            CellValue::Formula { ast: None, .. } => {
                self.computed = Value::Error(ErrorKind::Syntax);
            }
            other => self.computed = other.literal_value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_input_classification() {
        assert!(matches!(CellValue::from_input(""), CellValue::Empty));
        assert!(matches!(CellValue::from_input("  "), CellValue::Empty));
        assert!(matches!(CellValue::from_input("42"), CellValue::Number(_)));
        assert!(matches!(
            CellValue::from_input("-1.5"),
            CellValue::Number(_)
        ));
        assert!(matches!(CellValue::from_input("abc"), CellValue::Text(_)));
        assert!(CellValue::from_input("=A1+1").is_formula());
    }

    #[test]
    fn test_bad_formula_keeps_source() {
        let mut cell = Cell::new();
        cell.set("=SUM(");
        match &cell.value {
            CellValue::Formula { source, ast } => {
                assert_eq!(source, "=SUM(");
                assert!(ast.is_none());
            }
            other => panic!("expected Formula, got {:?}", other),
        }
        assert_eq!(cell.computed, Value::Error(ErrorKind::Syntax));
    }

    #[test]
    fn test_literal_computed_in_sync() {
        let mut cell = Cell::new();
        cell.set("3.5");
        assert_eq!(cell.computed, Value::Number(3.5));
        cell.set("hello");
        assert_eq!(cell.computed, Value::Text("hello".to_string()));
        cell.set("");
        assert_eq!(cell.computed, Value::Empty);
    }

    #[test]
    fn test_raw_display_round_trip() {
        let mut cell = Cell::new();
        cell.set("=A1*2");
        assert_eq!(cell.value.raw_display(), "=A1*2");
        cell.set("7");
        assert_eq!(cell.value.raw_display(), "7");
    }
}
