// Formula analysis utilities
//
// Static inspection of formula ASTs without evaluation.

use super::functions::{is_known_function, is_volatile_function};
use super::parser::Expr;

/// Walk the AST and call the visitor for each function name encountered.
fn walk_functions<S, F: FnMut(&str)>(expr: &Expr<S>, visitor: &mut F) {
    match expr {
        Expr::Function { name, args } => {
            visitor(name);
            for arg in args {
                walk_functions(arg, visitor);
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            walk_functions(left, visitor);
            walk_functions(right, visitor);
        }
        Expr::Number(_)
        | Expr::Text(_)
        | Expr::Boolean(_)
        | Expr::CellRef { .. }
        | Expr::Range { .. }
        | Expr::NamedRange(_)
        | Expr::Empty => {}
    }
}

/// True if the formula calls any volatile function (NOW, TODAY).
///
/// Volatile formulas can change without a cell edit, so the scheduler
/// folds them into every recalculation pass.
pub fn contains_volatile<S>(expr: &Expr<S>) -> bool {
    let mut found = false;
    walk_functions(expr, &mut |name| {
        if !found && is_volatile_function(name) {
            found = true;
        }
    });
    found
}

/// True if at least one function in the AST is not registered.
pub fn has_unknown_functions<S>(expr: &Expr<S>) -> bool {
    let mut found = false;
    walk_functions(expr, &mut |name| {
        if !found && !is_known_function(name) {
            found = true;
        }
    });
    found
}
