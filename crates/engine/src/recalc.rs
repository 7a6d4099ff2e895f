//! Recalculation types and reporting.
//!
//! Defines the per-pass cell state machine and the report returned by
//! ordered recomputation.

use crate::cell_id::CellId;
use crate::formula::eval::ErrorKind;

/// Per-pass evaluation state of a cell.
///
/// `Clean → Dirty → Evaluating → Done` for every cell in the dirty set.
/// Cycle members never enter `Evaluating`; they are marked `#CIRCULAR!`
/// up front and jump straight to `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Clean,
    Dirty,
    Evaluating,
    Done,
}

/// Report from one ordered recalculation pass.
#[derive(Debug, Clone, Default)]
pub struct RecalcReport {
    /// Time taken for the pass in milliseconds.
    pub duration_ms: u64,

    /// Number of formula cells that were recomputed.
    pub cells_recomputed: usize,

    /// Maximum dependency depth encountered.
    /// A formula with no formula precedents has depth 1; otherwise
    /// depth = max(precedent depths) + 1.
    pub max_depth: usize,

    /// True if cycles were detected; cycle members carry `#CIRCULAR!`.
    pub had_cycles: bool,

    /// Number of cells participating in circular reference cycles.
    pub cycle_cells: usize,

    /// Cells whose evaluation produced an error value (truncated to 100).
    pub errors: Vec<RecalcError>,
}

impl RecalcReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concise one-line summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "{} cells in {}ms, depth={}, cycles={}, errors={}",
            self.cells_recomputed,
            self.duration_ms,
            self.max_depth,
            self.cycle_cells,
            self.errors.len()
        )
    }
}

/// An error value produced while recomputing a specific cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecalcError {
    pub cell: CellId,
    pub error: ErrorKind,
}

impl RecalcError {
    pub fn new(cell: CellId, error: ErrorKind) -> Self {
        Self { cell, error }
    }
}

impl std::fmt::Display for RecalcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.cell, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::SheetId;

    #[test]
    fn test_report_default() {
        let report = RecalcReport::default();
        assert_eq!(report.cells_recomputed, 0);
        assert_eq!(report.max_depth, 0);
        assert!(!report.had_cycles);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_summary() {
        let report = RecalcReport {
            duration_ms: 42,
            cells_recomputed: 100,
            max_depth: 5,
            had_cycles: false,
            cycle_cells: 0,
            errors: vec![],
        };
        assert_eq!(report.summary(), "100 cells in 42ms, depth=5, cycles=0, errors=0");
    }

    #[test]
    fn test_recalc_error_display() {
        let err = RecalcError::new(
            CellId::new(SheetId::from_raw(1), 0, 0),
            ErrorKind::Div0,
        );
        assert_eq!(format!("{}", err), "Sheet1!A1: #DIV/0!");
    }
}
