//! Solver backends for compiled programs
//!
//! A backend takes a [`Program`] and returns a value for every column. The
//! Cassowary backend wraps the kasuari solver and yields real values that go
//! through rounding; the difference backend (see [`super::difference`])
//! yields integers directly.

use kasuari::{
    Expression, Solver as KasuariSolver, Strength, Variable as KasuariVariable,
    WeightedRelation::*,
};
use thiserror::Error;

use crate::parser::ast::Relation;

use super::compiler::{Program, Row, RowOrigin};

/// Values for every column of a program
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// Real values, must be rounded before use
    Continuous(Vec<f64>),
    /// Grid values, usable as is
    Integral(Vec<i64>),
}

impl Assignment {
    pub fn len(&self) -> usize {
        match self {
            Assignment::Continuous(v) => v.len(),
            Assignment::Integral(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Errors from a solver backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    /// No assignment satisfies the rows
    #[error("{reason}")]
    Infeasible {
        /// Row that exposed the conflict, when the backend can tell
        origin: Option<RowOrigin>,
        reason: String,
    },

    /// The program uses a row shape the backend cannot handle
    #[error("backend '{backend}' cannot handle '{constraint}': {reason}")]
    Unsupported {
        backend: &'static str,
        constraint: String,
        reason: String,
    },

    #[error("internal solver error: {0}")]
    Internal(String),
}

impl SolverError {
    pub fn infeasible(origin: Option<&RowOrigin>, reason: impl Into<String>) -> Self {
        Self::Infeasible {
            origin: origin.cloned(),
            reason: reason.into(),
        }
    }
}

/// Anything that can solve a compiled program
pub trait SolverBackend {
    fn name(&self) -> &'static str;

    fn solve(&mut self, program: &Program) -> Result<Assignment, SolverError>;
}

/// Continuous backend on top of the kasuari Cassowary solver.
///
/// Rows are added as required constraints; each objective expression is
/// pulled towards zero by a weak constraint.
#[derive(Debug, Default)]
pub struct CassowaryBackend;

impl CassowaryBackend {
    pub fn new() -> Self {
        Self
    }
}

/// `sum(coefficient * variable)`, or `None` for an empty sum
fn expression(variables: &[KasuariVariable], terms: &[(usize, f64)]) -> Option<Expression> {
    terms
        .iter()
        .filter_map(|&(col, coef)| variables.get(col).map(|&v| coef * Expression::from(v)))
        .reduce(|acc, e| acc + e)
}

/// Convert a kasuari error to a SolverError with the row's origin
fn convert_kasuari_error(e: kasuari::AddConstraintError, row: &Row) -> SolverError {
    match e {
        kasuari::AddConstraintError::UnsatisfiableConstraint => SolverError::infeasible(
            Some(&row.origin),
            format!(
                "cannot satisfy '{}': conflicts with earlier constraints",
                row.origin.description
            ),
        ),
        kasuari::AddConstraintError::DuplicateConstraint => {
            SolverError::Internal(format!("duplicate constraint: {}", row.origin.description))
        }
        kasuari::AddConstraintError::InternalSolverError(msg) => SolverError::Internal(format!(
            "internal solver error for {}: {}",
            row.origin.description, msg
        )),
    }
}

impl SolverBackend for CassowaryBackend {
    fn name(&self) -> &'static str {
        "cassowary"
    }

    fn solve(&mut self, program: &Program) -> Result<Assignment, SolverError> {
        let mut solver = KasuariSolver::new();
        let variables: Vec<KasuariVariable> =
            (0..program.columns).map(|_| KasuariVariable::new()).collect();

        for row in &program.rows {
            let Some(expr) = expression(&variables, &row.terms) else {
                continue;
            };
            let constraint = match row.relation {
                Relation::Eq => expr | EQ(Strength::REQUIRED) | row.rhs,
                Relation::Le => expr | LE(Strength::REQUIRED) | row.rhs,
                Relation::Ge => expr | GE(Strength::REQUIRED) | row.rhs,
            };
            solver
                .add_constraint(constraint)
                .map_err(|e| convert_kasuari_error(e, row))?;
        }

        for goal in &program.objective {
            let Some(expr) = expression(&variables, goal) else {
                continue;
            };
            solver
                .add_constraint(expr | EQ(Strength::WEAK) | 0.0)
                .map_err(|e| SolverError::Internal(format!("failed to add objective: {:?}", e)))?;
        }

        // Variables kasuari never reports keep their initial value of zero
        let mut values = vec![0.0; program.columns];
        for (kvar, value) in solver.fetch_changes() {
            if let Some(col) = variables.iter().position(|v| v == kvar) {
                values[col] = *value;
            }
        }

        Ok(Assignment::Continuous(values))
    }
}
