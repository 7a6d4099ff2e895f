//! Reference extraction from formula AST.
//!
//! Extracts all cell references from a bound expression as `CellId`s
//! for dependency graph construction.

use rustc_hash::FxHashSet;

use crate::cell_id::CellId;
use crate::named_range::{NamedRangeStore, NamedRangeTarget};
use crate::sheet::{SheetId, SheetRef};

use super::parser::{BoundExpr, Expr};

/// Extract all cell references from a bound expression.
///
/// Returns a deduplicated list of `CellId`s the formula depends on.
/// Ranges (including named ranges) expand to their member cells; a range
/// over a deleted sheet contributes nothing (the formula errors at
/// evaluation time instead).
pub fn extract_cell_ids(
    expr: &BoundExpr,
    context_sheet: SheetId,
    named_ranges: &NamedRangeStore,
) -> Vec<CellId> {
    let mut refs = FxHashSet::default();
    collect_refs(expr, context_sheet, named_ranges, &mut refs);
    refs.into_iter().collect()
}

fn collect_refs(
    expr: &BoundExpr,
    context_sheet: SheetId,
    named_ranges: &NamedRangeStore,
    refs: &mut FxHashSet<CellId>,
) {
    match expr {
        Expr::Number(_) | Expr::Text(_) | Expr::Boolean(_) | Expr::Empty => {}

        Expr::CellRef { sheet, row, col, .. } => {
            if let Some(sheet_id) = resolve_sheet_ref(sheet, context_sheet) {
                refs.insert(CellId::new(sheet_id, *row, *col));
            }
        }

        Expr::Range {
            sheet,
            start_row,
            start_col,
            end_row,
            end_col,
            ..
        } => {
            if let Some(sheet_id) = resolve_sheet_ref(sheet, context_sheet) {
                let (r0, r1) = (*start_row.min(end_row), *start_row.max(end_row));
                let (c0, c1) = (*start_col.min(end_col), *start_col.max(end_col));
                for row in r0..=r1 {
                    for col in c0..=c1 {
                        refs.insert(CellId::new(sheet_id, row, col));
                    }
                }
            }
        }

        Expr::NamedRange(name) => {
            if let Some(named) = named_ranges.get(name) {
                match named.target {
                    NamedRangeTarget::Cell { sheet, row, col } => {
                        refs.insert(CellId::new(sheet, row, col));
                    }
                    NamedRangeTarget::Range {
                        sheet,
                        start_row,
                        start_col,
                        end_row,
                        end_col,
                    } => {
                        for row in start_row..=end_row {
                            for col in start_col..=end_col {
                                refs.insert(CellId::new(sheet, row, col));
                            }
                        }
                    }
                }
            }
            // Unknown named range: no edges; the evaluator reports #NAME?.
        }

        Expr::Function { args, .. } => {
            for arg in args {
                collect_refs(arg, context_sheet, named_ranges, refs);
            }
        }

        Expr::BinaryOp { left, right, .. } => {
            collect_refs(left, context_sheet, named_ranges, refs);
            collect_refs(right, context_sheet, named_ranges, refs);
        }
    }
}

/// Resolve a SheetRef to a SheetId. Returns None for a dangling reference.
fn resolve_sheet_ref(sheet_ref: &SheetRef, context_sheet: SheetId) -> Option<SheetId> {
    match sheet_ref {
        SheetRef::Current => Some(context_sheet),
        SheetRef::Id(id) => Some(*id),
        SheetRef::RefError => None,
    }
}
