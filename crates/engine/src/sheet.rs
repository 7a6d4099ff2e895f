//! Sheets: the sparse per-sheet cell store.
//!
//! A sheet owns a sparse map of populated cells plus presentation metadata
//! (column widths, merge ranges) that evaluation ignores but reference
//! resolution must tolerate.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::formula::eval::Value;

/// Stable identifier for a sheet. Never reused after deletion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SheetId(pub u64);

impl SheetId {
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Sheet reference inside a formula, before name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnboundSheetRef {
    /// Reference to the sheet the formula lives on (no prefix).
    Current,
    /// Reference by sheet name (`Sheet2!A1`).
    Named(String),
}

/// Sheet reference after binding names to stable ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetRef {
    Current,
    Id(SheetId),
    /// The named sheet does not exist; evaluates to #REF!.
    RefError,
}

/// Normalize a sheet name for case-insensitive comparison.
pub fn normalize_sheet_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A sheet name is valid if it is non-empty after trimming and contains
/// no characters that would break formula syntax.
pub fn is_valid_sheet_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && !trimmed.contains(['!', ':', '[', ']'])
}

/// A rectangular group of cells sharing one logical value.
///
/// Merges carry no evaluation semantics; references into a merged
/// rectangle resolve like any other cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRange {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl MergeRange {
    pub fn new(start_row: usize, start_col: usize, end_row: usize, end_col: usize) -> Self {
        Self {
            start_row: start_row.min(end_row),
            start_col: start_col.min(end_col),
            end_row: start_row.max(end_row),
            end_col: start_col.max(end_col),
        }
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.start_row && row <= self.end_row && col >= self.start_col && col <= self.end_col
    }

    fn overlaps(&self, other: &MergeRange) -> bool {
        self.start_row <= other.end_row
            && other.start_row <= self.end_row
            && self.start_col <= other.end_col
            && other.start_col <= self.end_col
    }

    fn is_degenerate(&self) -> bool {
        self.start_row == self.end_row && self.start_col == self.end_col
    }
}

pub const DEFAULT_COL_WIDTH: u16 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sheet {
    pub id: SheetId,
    pub name: String,
    /// Case-folded name for lookups.
    pub(crate) name_key: String,
    cells: FxHashMap<(usize, usize), Cell>,
    pub rows: usize,
    pub cols: usize,
    col_widths: FxHashMap<usize, u16>,
    merges: Vec<MergeRange>,
}

impl Sheet {
    pub fn new(id: SheetId, rows: usize, cols: usize) -> Self {
        Self::new_with_name(id, rows, cols, "Sheet1")
    }

    pub fn new_with_name(id: SheetId, rows: usize, cols: usize, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            name_key: normalize_sheet_name(name),
            cells: FxHashMap::default(),
            rows,
            cols,
            col_widths: FxHashMap::default(),
            merges: Vec::new(),
        }
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.trim().to_string();
        self.name_key = normalize_sheet_name(name);
    }

    /// Write raw input into a cell, creating it on first write.
    ///
    /// Input classification (formula vs number vs text) happens in
    /// `CellValue::from_input`. The computed cache for formula cells is
    /// refreshed by the workbook's recalculation pass, not here.
    pub fn set_input(&mut self, row: usize, col: usize, input: &str) {
        let cell = self.cells.entry((row, col)).or_default();
        cell.set(input);
    }

    /// Overwrite a formula cell's cached computed value.
    pub(crate) fn set_computed(&mut self, row: usize, col: usize, value: Value) {
        if let Some(cell) = self.cells.get_mut(&(row, col)) {
            cell.computed = value;
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Cell snapshot; absent cells read as empty.
    pub fn get_cell(&self, row: usize, col: usize) -> Cell {
        self.cells.get(&(row, col)).cloned().unwrap_or_default()
    }

    /// Cached computed value; absent cells read as `Value::Empty`.
    pub fn computed(&self, row: usize, col: usize) -> Value {
        self.cells
            .get(&(row, col))
            .map(|c| c.computed.clone())
            .unwrap_or(Value::Empty)
    }

    /// Raw input text as the user typed it.
    pub fn raw(&self, row: usize, col: usize) -> String {
        self.cells
            .get(&(row, col))
            .map(|c| c.value.raw_display())
            .unwrap_or_default()
    }

    /// Display string for a cell (the computed value's text form).
    pub fn display(&self, row: usize, col: usize) -> String {
        self.computed(row, col).to_display()
    }

    /// Clear a cell completely (prune from the sparse map).
    pub fn clear_cell(&mut self, row: usize, col: usize) {
        self.cells.remove(&(row, col));
    }

    /// Iterate over all populated cells.
    pub fn cells_iter(&self) -> impl Iterator<Item = (&(usize, usize), &Cell)> {
        self.cells.iter()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    // =========================================================================
    // Column widths
    // =========================================================================

    pub fn set_col_width(&mut self, col: usize, width: u16) {
        self.col_widths.insert(col, width);
    }

    pub fn col_width(&self, col: usize) -> u16 {
        self.col_widths
            .get(&col)
            .copied()
            .unwrap_or(DEFAULT_COL_WIDTH)
    }

    // =========================================================================
    // Merge ranges
    // =========================================================================

    /// Add a merge range. Rejects single-cell rectangles and overlaps
    /// with existing merges.
    pub fn add_merge(&mut self, merge: MergeRange) -> bool {
        if merge.is_degenerate() {
            return false;
        }
        if self.merges.iter().any(|m| m.overlaps(&merge)) {
            return false;
        }
        self.merges.push(merge);
        true
    }

    pub fn remove_merge(&mut self, merge: &MergeRange) -> bool {
        let before = self.merges.len();
        self.merges.retain(|m| m != merge);
        self.merges.len() != before
    }

    pub fn merges(&self) -> &[MergeRange] {
        &self.merges
    }

    pub fn merge_containing(&self, row: usize, col: usize) -> Option<MergeRange> {
        self.merges.iter().find(|m| m.contains(row, col)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;

    #[test]
    fn test_sparse_store() {
        let mut sheet = Sheet::new(SheetId(1), 100, 26);
        assert_eq!(sheet.cell_count(), 0);
        assert_eq!(sheet.computed(5, 5), Value::Empty);

        sheet.set_input(5, 5, "42");
        assert_eq!(sheet.cell_count(), 1);
        assert_eq!(sheet.computed(5, 5), Value::Number(42.0));
        assert_eq!(sheet.raw(5, 5), "42");

        sheet.clear_cell(5, 5);
        assert_eq!(sheet.cell_count(), 0);
        assert_eq!(sheet.computed(5, 5), Value::Empty);
    }

    #[test]
    fn test_input_classification() {
        let mut sheet = Sheet::new(SheetId(1), 100, 26);
        sheet.set_input(0, 0, "hello");
        sheet.set_input(0, 1, "3.5");
        sheet.set_input(0, 2, "=A1");

        assert!(matches!(
            sheet.cell(0, 0).unwrap().value,
            CellValue::Text(_)
        ));
        assert!(matches!(
            sheet.cell(0, 1).unwrap().value,
            CellValue::Number(_)
        ));
        assert!(sheet.cell(0, 2).unwrap().value.is_formula());
    }

    #[test]
    fn test_name_key() {
        let mut sheet = Sheet::new_with_name(SheetId(1), 10, 10, "Data");
        assert_eq!(sheet.name_key, "data");
        sheet.set_name("  Budget ");
        assert_eq!(sheet.name, "Budget");
        assert_eq!(sheet.name_key, "budget");
    }

    #[test]
    fn test_sheet_name_validity() {
        assert!(is_valid_sheet_name("Sheet1"));
        assert!(is_valid_sheet_name("My Sheet"));
        assert!(!is_valid_sheet_name(""));
        assert!(!is_valid_sheet_name("   "));
        assert!(!is_valid_sheet_name("a!b"));
        assert!(!is_valid_sheet_name("a:b"));
    }

    #[test]
    fn test_col_widths() {
        let mut sheet = Sheet::new(SheetId(1), 10, 10);
        assert_eq!(sheet.col_width(3), DEFAULT_COL_WIDTH);
        sheet.set_col_width(3, 24);
        assert_eq!(sheet.col_width(3), 24);
    }

    #[test]
    fn test_merges_reject_overlap_and_degenerate() {
        let mut sheet = Sheet::new(SheetId(1), 10, 10);
        assert!(sheet.add_merge(MergeRange::new(0, 0, 1, 1)));
        assert!(!sheet.add_merge(MergeRange::new(1, 1, 2, 2)), "overlap");
        assert!(!sheet.add_merge(MergeRange::new(5, 5, 5, 5)), "degenerate");
        assert!(sheet.add_merge(MergeRange::new(2, 2, 3, 3)));
        assert_eq!(sheet.merges().len(), 2);

        assert_eq!(
            sheet.merge_containing(0, 1),
            Some(MergeRange::new(0, 0, 1, 1))
        );
        assert_eq!(sheet.merge_containing(9, 9), None);
    }

    #[test]
    fn test_merge_does_not_affect_cells() {
        let mut sheet = Sheet::new(SheetId(1), 10, 10);
        sheet.set_input(0, 0, "7");
        sheet.add_merge(MergeRange::new(0, 0, 0, 1));
        // The merged-away cell still resolves normally.
        assert_eq!(sheet.computed(0, 0), Value::Number(7.0));
        assert_eq!(sheet.computed(0, 1), Value::Empty);
    }
}
