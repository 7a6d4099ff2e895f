//! Goal-seeking solver: numeric gradient descent over a set of input cells.
//!
//! The algorithm drives the surrounding sheet only through the narrow
//! [`SolverHost`] trait, so it can be unit-tested against a mock provider
//! and run against a real workbook unchanged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cell_id::CellId;

/// What the solver optimizes the objective cell toward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Goal {
    Minimize,
    Maximize,
    /// Drive the objective to a specific value (squared-distance loss).
    Target(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    /// cell <= bound
    LessEq,
    /// cell >= bound
    GreaterEq,
    /// cell == bound (within tolerance)
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraint {
    pub cell: CellId,
    pub op: ConstraintOp,
    pub bound: f64,
}

#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub objective: CellId,
    pub goal: Goal,
    /// Variable cells, in the order their final values are reported.
    pub variables: Vec<CellId>,
    pub constraints: Vec<Constraint>,
    pub max_iterations: usize,
    /// Initial learning rate; adapted during the run (halved on a loss
    /// increase, grown 5% otherwise, capped at 1.0).
    pub learning_rate: f64,
}

impl SolverConfig {
    pub fn new(objective: CellId, goal: Goal) -> Self {
        Self {
            objective,
            goal,
            variables: Vec::new(),
            constraints: Vec::new(),
            max_iterations: 1_000,
            learning_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolverResult {
    /// True when the run was not cancelled and every constraint holds.
    pub success: bool,
    /// Objective cell value at the final variable assignment.
    pub objective_value: f64,
    /// Final variable values, in `config.variables` order. These are
    /// written through to the host even on failure; the solver reports
    /// infeasibility rather than silently reverting user state.
    pub variable_values: Vec<f64>,
    pub iterations: usize,
    pub message: String,
}

/// The narrow surface the solver needs from the surrounding sheet.
pub trait SolverHost {
    /// Current numeric value of a cell (non-numeric reads as 0).
    fn read(&self, cell: CellId) -> f64;
    /// Write a trial value into a variable cell without recalculating.
    fn write(&mut self, cell: CellId, value: f64);
    /// Recompute everything affected by pending writes.
    fn recalc(&mut self);
}

/// Cooperative cancellation token, checked between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Convergence threshold on successive loss deltas.
const LOSS_TOLERANCE: f64 = 1e-10;
/// Constraint satisfaction tolerance.
const CONSTRAINT_TOLERANCE: f64 = 1e-6;
/// Base finite-difference step, scaled by variable magnitude.
const GRADIENT_STEP: f64 = 1e-6;

/// Run gradient descent per the config.
///
/// Each iteration estimates the gradient by forward differences (perturb
/// one variable, recalc, measure the loss delta, restore), then steps all
/// variables against the gradient. Terminates on convergence,
/// `max_iterations`, or cancellation. Constraints are checked after the
/// loop; the best-found values stay written back either way.
pub fn solve(
    config: &SolverConfig,
    host: &mut dyn SolverHost,
    cancel: &CancelFlag,
) -> SolverResult {
    if config.variables.is_empty() {
        return SolverResult {
            success: false,
            objective_value: host.read(config.objective),
            variable_values: Vec::new(),
            iterations: 0,
            message: "no variable cells configured".to_string(),
        };
    }

    let n = config.variables.len();
    let mut learning_rate = if config.learning_rate > 0.0 {
        config.learning_rate
    } else {
        0.1
    };

    host.recalc();
    let mut prev_loss = loss(config, host);
    let mut iterations = 0;
    let mut cancelled = false;
    let mut converged = false;

    let mut gradient = vec![0.0; n];
    for _ in 0..config.max_iterations {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        iterations += 1;

        // Forward-difference gradient, one variable at a time.
        for (i, &cell) in config.variables.iter().enumerate() {
            let x = host.read(cell);
            let h = GRADIENT_STEP * (1.0 + x.abs());
            host.write(cell, x + h);
            host.recalc();
            let bumped = loss(config, host);
            host.write(cell, x);
            host.recalc();
            gradient[i] = (bumped - prev_loss) / h;
        }

        for (i, &cell) in config.variables.iter().enumerate() {
            let x = host.read(cell);
            host.write(cell, x - learning_rate * gradient[i]);
        }
        host.recalc();

        let current_loss = loss(config, host);
        if current_loss > prev_loss {
            learning_rate *= 0.5;
        } else {
            learning_rate = (learning_rate * 1.05).min(1.0);
        }

        let delta = (current_loss - prev_loss).abs();
        prev_loss = current_loss;
        tracing::trace!(
            target: "calcgrid::solver",
            iteration = iterations,
            loss = current_loss,
            learning_rate,
            "solver step"
        );
        if delta < LOSS_TOLERANCE {
            converged = true;
            break;
        }
    }

    let variable_values: Vec<f64> = config.variables.iter().map(|&c| host.read(c)).collect();
    let objective_value = host.read(config.objective);

    let violation = config
        .constraints
        .iter()
        .find(|c| !constraint_holds(c, host.read(c.cell)));

    let (success, message) = if cancelled {
        (false, format!("cancelled after {} iterations", iterations))
    } else if let Some(c) = violation {
        (false, format!("constraint violated: {}", describe(c)))
    } else if converged {
        (true, format!("converged in {} iterations", iterations))
    } else {
        (true, format!("stopped after {} iterations", iterations))
    };

    SolverResult {
        success,
        objective_value,
        variable_values,
        iterations,
        message,
    }
}

/// Effective loss for the configured goal: lower is always better.
fn loss(config: &SolverConfig, host: &dyn SolverHost) -> f64 {
    let objective = host.read(config.objective);
    match config.goal {
        Goal::Minimize => objective,
        Goal::Maximize => -objective,
        Goal::Target(target) => (objective - target) * (objective - target),
    }
}

fn constraint_holds(constraint: &Constraint, value: f64) -> bool {
    match constraint.op {
        ConstraintOp::LessEq => value <= constraint.bound + CONSTRAINT_TOLERANCE,
        ConstraintOp::GreaterEq => value >= constraint.bound - CONSTRAINT_TOLERANCE,
        ConstraintOp::Eq => (value - constraint.bound).abs() <= CONSTRAINT_TOLERANCE,
    }
}

fn describe(constraint: &Constraint) -> String {
    let op = match constraint.op {
        ConstraintOp::LessEq => "<=",
        ConstraintOp::GreaterEq => ">=",
        ConstraintOp::Eq => "=",
    };
    format!("{} {} {}", constraint.cell, op, constraint.bound)
}
