//! Workbook: the sheet-evaluation context.
//!
//! Owns the sheets, the dependency graph, and the recalculation
//! scheduler. All writes go through `set_cell`/`clear_cell`/`bulk_import`
//! so invalidation bookkeeping cannot be bypassed; between calls every
//! cached computed value is consistent with its precedents.

use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::cell::{Cell, CellValue};
use crate::cell_id::CellId;
use crate::dep_graph::DepGraph;
use crate::formula::analyze::contains_volatile;
use crate::formula::eval::{
    evaluate, CellLookup, ErrorKind, NamedRangeResolution, Value,
};
use crate::formula::parser::{bind_expr, parse};
use crate::formula::refs::extract_cell_ids;
use crate::named_range::{NamedRange, NamedRangeStore, NamedRangeTarget};
use crate::recalc::{CellState, RecalcError, RecalcReport};
use crate::sheet::{is_valid_sheet_name, normalize_sheet_name, Sheet, SheetId};
use crate::solver::{self, CancelFlag, SolverConfig, SolverHost, SolverResult};

pub const DEFAULT_ROWS: usize = 65536;
pub const DEFAULT_COLS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("unknown sheet id {}", .0.raw())]
    UnknownSheet(SheetId),
    #[error("invalid sheet name '{0}'")]
    InvalidSheetName(String),
    #[error("sheet name '{0}' already in use")]
    DuplicateSheetName(String),
    #[error("cannot delete the last sheet")]
    LastSheet,
    #[error("cell ({row}, {col}) is out of sheet bounds")]
    OutOfBounds { row: usize, col: usize },
}

/// Result of one edit: every cell whose computed value changed, the edit
/// itself included, sorted by (sheet, row, col).
#[derive(Debug, Clone, Default)]
pub struct EditResult {
    pub updated: Vec<(CellId, Value)>,
}

/// A workbook containing multiple sheets and their dependency graph.
#[derive(Debug, Clone)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    /// Next ID to assign to a new sheet. Monotonically increasing, never reused.
    next_sheet_id: u64,
    named_ranges: NamedRangeStore,
    dep_graph: DepGraph,
    /// Formula cells calling a volatile function; folded into every pass.
    volatile_cells: FxHashSet<CellId>,
    /// Edits staged since the last scheduler pass.
    pending_dirty: FxHashSet<CellId>,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl Workbook {
    /// Create a new workbook with one default sheet.
    pub fn new() -> Self {
        Self {
            sheets: vec![Sheet::new(SheetId(1), DEFAULT_ROWS, DEFAULT_COLS)],
            next_sheet_id: 2,
            named_ranges: NamedRangeStore::new(),
            dep_graph: DepGraph::new(),
            volatile_cells: FxHashSet::default(),
            pending_dirty: FxHashSet::default(),
        }
    }

    fn generate_sheet_id(&mut self) -> SheetId {
        let id = SheetId(self.next_sheet_id);
        self.next_sheet_id += 1;
        id
    }

    // =========================================================================
    // Sheet management
    // =========================================================================

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn sheet_by_id(&self, id: SheetId) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.id == id)
    }

    fn sheet_by_id_mut(&mut self, id: SheetId) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.id == id)
    }

    /// Find a sheet by name (case-insensitive).
    pub fn sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        let key = normalize_sheet_name(name);
        self.sheets.iter().find(|s| s.name_key == key)
    }

    pub fn sheet_id_by_name(&self, name: &str) -> Option<SheetId> {
        self.sheet_by_name(name).map(|s| s.id)
    }

    pub fn sheet_name_exists(&self, name: &str) -> bool {
        self.sheet_by_name(name).is_some()
    }

    /// The first sheet's id (the default sheet for single-sheet use).
    pub fn primary_sheet_id(&self) -> SheetId {
        self.sheets[0].id
    }

    /// Add a sheet with an auto-generated unique name, returning its id.
    pub fn add_sheet(&mut self) -> SheetId {
        let mut n = self.sheets.len() + 1;
        while self.sheet_name_exists(&format!("Sheet{}", n)) {
            n += 1;
        }
        let name = format!("Sheet{}", n);
        let id = self.generate_sheet_id();
        self.sheets
            .push(Sheet::new_with_name(id, DEFAULT_ROWS, DEFAULT_COLS, &name));
        id
    }

    /// Add a sheet with a specific name.
    pub fn add_sheet_named(&mut self, name: &str) -> Result<SheetId, EngineError> {
        if !is_valid_sheet_name(name) {
            return Err(EngineError::InvalidSheetName(name.to_string()));
        }
        if self.sheet_name_exists(name) {
            return Err(EngineError::DuplicateSheetName(name.to_string()));
        }
        let id = self.generate_sheet_id();
        self.sheets
            .push(Sheet::new_with_name(id, DEFAULT_ROWS, DEFAULT_COLS, name));
        Ok(id)
    }

    /// Rename a sheet. Formulas reference sheets by name, so anything
    /// still using the old name resolves to #REF! afterwards; the full
    /// recalc makes that visible immediately.
    pub fn rename_sheet(&mut self, id: SheetId, new_name: &str) -> Result<RecalcReport, EngineError> {
        if !is_valid_sheet_name(new_name) {
            return Err(EngineError::InvalidSheetName(new_name.to_string()));
        }
        let key = normalize_sheet_name(new_name);
        if self.sheets.iter().any(|s| s.id != id && s.name_key == key) {
            return Err(EngineError::DuplicateSheetName(new_name.to_string()));
        }
        let sheet = self
            .sheet_by_id_mut(id)
            .ok_or(EngineError::UnknownSheet(id))?;
        sheet.set_name(new_name);
        self.rebuild_dep_graph();
        Ok(self.recalc_all())
    }

    /// Delete a sheet. References to it become #REF! on the recalc.
    pub fn delete_sheet(&mut self, id: SheetId) -> Result<RecalcReport, EngineError> {
        if self.sheets.len() <= 1 {
            return Err(EngineError::LastSheet);
        }
        let idx = self
            .sheets
            .iter()
            .position(|s| s.id == id)
            .ok_or(EngineError::UnknownSheet(id))?;
        self.sheets.remove(idx);
        self.named_ranges.remove_sheet(id);
        self.dep_graph.remove_sheet(id);
        self.volatile_cells.retain(|c| c.sheet != id);
        self.pending_dirty.retain(|c| c.sheet != id);
        Ok(self.recalc_all())
    }

    // =========================================================================
    // Named ranges
    // =========================================================================

    pub fn named_ranges(&self) -> &NamedRangeStore {
        &self.named_ranges
    }

    /// Define or redefine a named range. Formulas may resolve differently
    /// afterwards, so edges are rebuilt and everything recalculated.
    pub fn define_named_range(
        &mut self,
        range: NamedRange,
    ) -> Result<RecalcReport, crate::named_range::NamedRangeError> {
        self.named_ranges.set(range)?;
        self.rebuild_dep_graph();
        Ok(self.recalc_all())
    }

    pub fn delete_named_range(&mut self, name: &str) -> bool {
        let removed = self.named_ranges.remove(name).is_some();
        if removed {
            self.rebuild_dep_graph();
            self.recalc_all();
        }
        removed
    }

    // =========================================================================
    // Cell access
    // =========================================================================

    /// Read-only snapshot of a cell (empty default for absent cells).
    pub fn get_cell(&self, sheet: SheetId, row: usize, col: usize) -> Result<Cell, EngineError> {
        let s = self.sheet_by_id(sheet).ok_or(EngineError::UnknownSheet(sheet))?;
        Ok(s.get_cell(row, col))
    }

    /// Cached computed value of a cell.
    pub fn computed(&self, sheet: SheetId, row: usize, col: usize) -> Value {
        self.sheet_by_id(sheet)
            .map(|s| s.computed(row, col))
            .unwrap_or(Value::Error(ErrorKind::Ref))
    }

    /// Display string of a cell.
    pub fn display(&self, sheet: SheetId, row: usize, col: usize) -> String {
        self.computed(sheet, row, col).to_display()
    }

    // =========================================================================
    // Mutation: the single entry points
    // =========================================================================

    /// Set a cell from raw input text (`=`-prefixed input is a formula).
    ///
    /// Runs invalidation and the scheduler to completion; the returned
    /// result lists every cell whose computed value changed.
    pub fn set_cell(
        &mut self,
        sheet: SheetId,
        row: usize,
        col: usize,
        raw: &str,
    ) -> Result<EditResult, EngineError> {
        self.stage_edit(sheet, row, col, raw)?;
        Ok(self.flush())
    }

    /// Clear a cell entirely. Dependents re-evaluate treating it as empty.
    pub fn clear_cell(
        &mut self,
        sheet: SheetId,
        row: usize,
        col: usize,
    ) -> Result<EditResult, EngineError> {
        let id = CellId::new(sheet, row, col);
        {
            let s = self
                .sheet_by_id_mut(sheet)
                .ok_or(EngineError::UnknownSheet(sheet))?;
            s.clear_cell(row, col);
        }
        self.dep_graph.clear_cell(id);
        self.volatile_cells.remove(&id);
        self.pending_dirty.insert(id);
        Ok(self.flush())
    }

    /// Load many raw inputs at once, then rebuild edges and recalculate
    /// the whole book in one pass.
    pub fn bulk_import<I>(&mut self, sheet: SheetId, cells: I) -> Result<RecalcReport, EngineError>
    where
        I: IntoIterator<Item = (usize, usize, String)>,
    {
        {
            let s = self
                .sheet_by_id_mut(sheet)
                .ok_or(EngineError::UnknownSheet(sheet))?;
            for (row, col, raw) in cells {
                if row >= s.rows || col >= s.cols {
                    return Err(EngineError::OutOfBounds { row, col });
                }
                s.set_input(row, col, &raw);
            }
        }
        self.rebuild_dep_graph();
        Ok(self.recalc_all())
    }

    /// Force full recalculation of every formula cell (bulk import,
    /// volatile functions).
    pub fn recalc_all(&mut self) -> RecalcReport {
        let mut dirty = FxHashSet::default();
        for sheet in &self.sheets {
            for (&(row, col), cell) in sheet.cells_iter() {
                if cell.value.is_formula() {
                    dirty.insert(CellId::new(sheet.id, row, col));
                }
            }
        }
        self.pending_dirty.clear();
        let (_, report) = self.recalc_pass(dirty);
        tracing::debug!(target: "calcgrid::recalc", "full: {}", report.summary());
        report
    }

    /// Rebuild the dependency graph from scratch (after bulk loads).
    pub fn rebuild_dep_graph(&mut self) {
        self.dep_graph = DepGraph::new();
        self.volatile_cells.clear();
        let formula_cells: Vec<CellId> = self
            .sheets
            .iter()
            .flat_map(|sheet| {
                sheet
                    .cells_iter()
                    .filter(|(_, cell)| cell.value.is_formula())
                    .map(move |(&(row, col), _)| CellId::new(sheet.id, row, col))
            })
            .collect();
        for id in formula_cells {
            self.refresh_cell_deps(id);
        }
    }

    /// Evaluate a formula against this workbook without storing it.
    pub fn evaluate_formula_in(&self, sheet: SheetId, formula: &str) -> Value {
        match parse(formula) {
            Err(_) => Value::Error(ErrorKind::Syntax),
            Ok(parsed) => {
                let bound = bind_expr(&parsed, |name| self.sheet_id_by_name(name));
                let lookup = WorkbookLookup::new(self, sheet);
                evaluate(&bound, &lookup)
            }
        }
    }

    // =========================================================================
    // Solver
    // =========================================================================

    /// Run the goal-seeking solver against this workbook.
    pub fn solve(&mut self, config: &SolverConfig) -> SolverResult {
        self.solve_cancellable(config, &CancelFlag::new())
    }

    /// Solver entry point with a caller-owned cancellation flag, for
    /// driving long runs from a worker thread.
    pub fn solve_cancellable(
        &mut self,
        config: &SolverConfig,
        cancel: &CancelFlag,
    ) -> SolverResult {
        solver::solve(config, self, cancel)
    }

    // =========================================================================
    // Scheduler internals
    // =========================================================================

    /// Write raw input and refresh the cell's edges; no evaluation yet.
    fn stage_edit(
        &mut self,
        sheet: SheetId,
        row: usize,
        col: usize,
        raw: &str,
    ) -> Result<(), EngineError> {
        let id = CellId::new(sheet, row, col);
        {
            let s = self
                .sheet_by_id_mut(sheet)
                .ok_or(EngineError::UnknownSheet(sheet))?;
            if row >= s.rows || col >= s.cols {
                return Err(EngineError::OutOfBounds { row, col });
            }
            s.set_input(row, col, raw);
        }
        self.refresh_cell_deps(id);
        self.pending_dirty.insert(id);
        Ok(())
    }

    /// Replace the cell's precedent edges from its current formula (or
    /// clear them if it no longer has one). Stale edges for an old
    /// formula are removed first by `replace_edges`.
    fn refresh_cell_deps(&mut self, id: CellId) {
        let ast = self
            .sheet_by_id(id.sheet)
            .and_then(|s| s.cell(id.row, id.col))
            .and_then(|c| c.value.formula_ast().cloned());
        match ast {
            Some(ast) => {
                let bound = bind_expr(&ast, |name| self.sheet_id_by_name(name));
                let refs = extract_cell_ids(&bound, id.sheet, &self.named_ranges);
                self.dep_graph.replace_edges(id, refs.into_iter().collect());
                if contains_volatile(&ast) {
                    self.volatile_cells.insert(id);
                } else {
                    self.volatile_cells.remove(&id);
                }
            }
            None => {
                self.dep_graph.clear_cell(id);
                self.volatile_cells.remove(&id);
            }
        }
    }

    /// Run the scheduler over the staged edits plus their transitive
    /// dependents (volatile cells ride along in every pass).
    fn flush(&mut self) -> EditResult {
        let mut seeds = std::mem::take(&mut self.pending_dirty);
        if seeds.is_empty() {
            return EditResult::default();
        }
        seeds.extend(self.volatile_cells.iter().copied());
        let dirty = self.dep_graph.dependents_closure(seeds);
        let (updated, report) = self.recalc_pass(dirty);
        tracing::debug!(target: "calcgrid::recalc", "edit: {}", report.summary());
        EditResult { updated }
    }

    /// Ordered evaluation of one dirty set: mark cycles, topologically
    /// order the rest, evaluate in order against cached precedents. A
    /// failing cell contributes an error value and the pass continues.
    fn recalc_pass(&mut self, dirty: FxHashSet<CellId>) -> (Vec<(CellId, Value)>, RecalcReport) {
        let start = Instant::now();
        let mut report = RecalcReport::new();
        let mut updated: Vec<(CellId, Value)> = Vec::new();
        let mut states: FxHashMap<CellId, CellState> =
            dirty.iter().map(|&c| (c, CellState::Dirty)).collect();

        // Literal cells in the dirty set (edited or cleared seeds) already
        // carry their computed value; just surface them.
        let mut formula_cells: FxHashSet<CellId> = FxHashSet::default();
        for &id in &dirty {
            let is_formula = self
                .sheet_by_id(id.sheet)
                .and_then(|s| s.cell(id.row, id.col))
                .map(|c| c.value.is_formula())
                .unwrap_or(false);
            if is_formula {
                formula_cells.insert(id);
            } else {
                let value = self
                    .sheet_by_id(id.sheet)
                    .map(|s| s.computed(id.row, id.col))
                    .unwrap_or(Value::Empty);
                updated.push((id, value));
                states.insert(id, CellState::Done);
            }
        }

        // Cycle members get #CIRCULAR! and are excluded from ordering;
        // their dependents evaluate normally and propagate the error.
        let cycles = self.dep_graph.cycle_members(&formula_cells);
        if !cycles.is_empty() {
            report.had_cycles = true;
            report.cycle_cells = cycles.len();
            let mut cycle_sorted: Vec<CellId> = cycles.iter().copied().collect();
            cycle_sorted.sort();
            for id in cycle_sorted {
                if let Some(s) = self.sheet_by_id_mut(id.sheet) {
                    s.set_computed(id.row, id.col, Value::Error(ErrorKind::Circular));
                }
                if report.errors.len() < 100 {
                    report.errors.push(RecalcError::new(id, ErrorKind::Circular));
                }
                updated.push((id, Value::Error(ErrorKind::Circular)));
                states.insert(id, CellState::Done);
            }
        }

        let evaluable: FxHashSet<CellId> = formula_cells
            .iter()
            .filter(|c| !cycles.contains(c))
            .copied()
            .collect();
        let (order, leftover) = self.dep_graph.topo_order(&evaluable);

        let mut depths: FxHashMap<CellId, usize> = FxHashMap::default();
        for id in order {
            states.insert(id, CellState::Evaluating);

            let mut max_pred_depth = 0;
            for pred in self.dep_graph.precedents(id) {
                max_pred_depth = max_pred_depth.max(depths.get(&pred).copied().unwrap_or(0));
            }
            let depth = max_pred_depth + 1;
            depths.insert(id, depth);
            report.max_depth = report.max_depth.max(depth);

            let old = self
                .sheet_by_id(id.sheet)
                .map(|s| s.computed(id.row, id.col))
                .unwrap_or(Value::Empty);
            let value = self.evaluate_cell(id);
            if let Some(e) = value.as_error() {
                if report.errors.len() < 100 {
                    report.errors.push(RecalcError::new(id, e));
                }
            }
            if let Some(s) = self.sheet_by_id_mut(id.sheet) {
                s.set_computed(id.row, id.col, value.clone());
            }
            if value != old {
                updated.push((id, value));
            }
            report.cells_recomputed += 1;
            states.insert(id, CellState::Done);
        }

        // Unreachable with cycles already excluded, but never let a cell
        // stay silently stale.
        for id in leftover {
            if let Some(s) = self.sheet_by_id_mut(id.sheet) {
                s.set_computed(id.row, id.col, Value::Error(ErrorKind::Circular));
            }
            updated.push((id, Value::Error(ErrorKind::Circular)));
            states.insert(id, CellState::Done);
        }

        debug_assert!(states.values().all(|s| *s == CellState::Done));

        report.duration_ms = start.elapsed().as_millis() as u64;
        updated.sort_by_key(|(id, _)| *id);
        (updated, report)
    }

    /// Evaluate one formula cell against the current cached state.
    fn evaluate_cell(&self, id: CellId) -> Value {
        let Some(sheet) = self.sheet_by_id(id.sheet) else {
            return Value::Error(ErrorKind::Ref);
        };
        let Some(cell) = sheet.cell(id.row, id.col) else {
            return Value::Empty;
        };
        match &cell.value {
            CellValue::Formula { ast: Some(ast), .. } => {
                let bound = bind_expr(ast, |name| self.sheet_id_by_name(name));
                let lookup = WorkbookLookup::with_cell(self, id.sheet, id.row, id.col);
                evaluate(&bound, &lookup)
            }
            CellValue::Formula { ast: None, .. } => Value::Error(ErrorKind::Syntax),
            other => other.literal_value(),
        }
    }
}

impl SolverHost for Workbook {
    fn read(&self, cell: CellId) -> f64 {
        self.sheet_by_id(cell.sheet)
            .map(|s| s.computed(cell.row, cell.col).to_number().unwrap_or(0.0))
            .unwrap_or(0.0)
    }

    fn write(&mut self, cell: CellId, value: f64) {
        // Trial values go through the normal staging path so invalidation
        // bookkeeping holds; evaluation waits for recalc().
        let _ = self.stage_edit(cell.sheet, cell.row, cell.col, &format!("{}", value));
    }

    fn recalc(&mut self) {
        let _ = self.flush();
    }
}

// =============================================================================
// WorkbookLookup - CellLookup over cached computed values
// =============================================================================

/// Value provider for formula evaluation, reading cached computed values.
pub struct WorkbookLookup<'a> {
    workbook: &'a Workbook,
    current_sheet: SheetId,
    current_cell: Option<(usize, usize)>,
}

impl<'a> WorkbookLookup<'a> {
    pub fn new(workbook: &'a Workbook, current_sheet: SheetId) -> Self {
        Self {
            workbook,
            current_sheet,
            current_cell: None,
        }
    }

    pub fn with_cell(
        workbook: &'a Workbook,
        current_sheet: SheetId,
        row: usize,
        col: usize,
    ) -> Self {
        Self {
            workbook,
            current_sheet,
            current_cell: Some((row, col)),
        }
    }
}

impl CellLookup for WorkbookLookup<'_> {
    fn value(&self, row: usize, col: usize) -> Value {
        match self.workbook.sheet_by_id(self.current_sheet) {
            Some(s) => s.computed(row, col),
            None => Value::Error(ErrorKind::Ref),
        }
    }

    fn value_on(&self, sheet: SheetId, row: usize, col: usize) -> Value {
        match self.workbook.sheet_by_id(sheet) {
            Some(s) => s.computed(row, col),
            None => Value::Error(ErrorKind::Ref),
        }
    }

    fn resolve_named_range(&self, name: &str) -> Option<NamedRangeResolution> {
        self.workbook.named_ranges.get(name).map(|nr| match nr.target {
            NamedRangeTarget::Cell { sheet, row, col } => NamedRangeResolution::Cell {
                sheet: Some(sheet),
                row,
                col,
            },
            NamedRangeTarget::Range {
                sheet,
                start_row,
                start_col,
                end_row,
                end_col,
            } => NamedRangeResolution::Range {
                sheet: Some(sheet),
                start_row,
                start_col,
                end_row,
                end_col,
            },
        })
    }

    fn current_cell(&self) -> Option<(usize, usize)> {
        self.current_cell
    }
}
