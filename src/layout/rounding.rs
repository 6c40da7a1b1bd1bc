//! Rounding stage: continuous solutions onto the integer grid
//!
//! Columns start at their nearest integer. A bounded local repair then flips
//! fractional columns between floor and ceil whenever that lowers the total
//! weighted violation, so that satisfying a row wins over staying nearest.
//! Rows still violated afterwards are reported, not fatal.

use tracing::{debug, trace};

use crate::parser::ast::Relation;

use super::compiler::Program;

/// Values closer than this to an integer are taken as that integer
const SNAP_EPSILON: f64 = 1e-6;

/// Equalities must hold exactly; weigh them above inequalities when repairing
const EQUALITY_WEIGHT: f64 = 10.0;

/// Result of rounding a continuous assignment
#[derive(Debug, Clone, PartialEq)]
pub struct Rounded {
    pub values: Vec<i64>,
    /// Indices of program rows that do not hold after rounding
    pub violated: Vec<usize>,
}

/// Violation of a row beyond what is allowed after rounding
fn excess(program: &Program, row: usize, values: &[f64], tolerance: f64) -> f64 {
    let r = &program.rows[row];
    let v = r.violation(values);
    match r.relation {
        Relation::Eq if v > SNAP_EPSILON => v * EQUALITY_WEIGHT,
        Relation::Eq => 0.0,
        _ if v > tolerance => v,
        _ => 0.0,
    }
}

/// Rows that fail after rounding: equalities exactly, inequalities within `tolerance`
pub fn violated_rows(program: &Program, values: &[i64], tolerance: f64) -> Vec<usize> {
    let values: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    (0..program.rows.len())
        .filter(|&i| excess(program, i, &values, tolerance) > 0.0)
        .collect()
}

/// Round a continuous assignment of `program` onto the integer grid
pub fn round(program: &Program, continuous: &[f64], tolerance: f64, max_passes: usize) -> Rounded {
    let mut current: Vec<f64> = continuous.iter().map(|x| x.round()).collect();

    // Only columns that were genuinely fractional may flip
    let fractional: Vec<usize> = continuous
        .iter()
        .enumerate()
        .filter(|(_, x)| (*x - x.round()).abs() > SNAP_EPSILON)
        .map(|(i, _)| i)
        .collect();

    let mut rows_of: Vec<Vec<usize>> = vec![Vec::new(); continuous.len()];
    for (i, row) in program.rows.iter().enumerate() {
        for &(col, _) in &row.terms {
            if let Some(rows) = rows_of.get_mut(col) {
                rows.push(i);
            }
        }
    }

    let local = |values: &[f64], col: usize| -> f64 {
        rows_of[col]
            .iter()
            .map(|&r| excess(program, r, values, tolerance))
            .sum()
    };

    let mut passes = 0;
    while passes < max_passes {
        passes += 1;
        let mut improved = false;
        for &col in &fractional {
            let x = continuous[col];
            let alternative = if current[col] == x.floor() {
                x.ceil()
            } else {
                x.floor()
            };
            let before = local(&current, col);
            if before == 0.0 {
                continue;
            }
            let kept = current[col];
            current[col] = alternative;
            let after = local(&current, col);
            if after < before {
                trace!(column = col, from = kept, to = alternative, "rounding flip");
                improved = true;
            } else {
                current[col] = kept;
            }
        }
        if !improved {
            break;
        }
    }

    let values: Vec<i64> = current.iter().map(|&v| v as i64).collect();
    let violated = violated_rows(program, &values, tolerance);
    debug!(
        fractional = fractional.len(),
        passes,
        violated = violated.len(),
        "rounding complete"
    );
    Rounded { values, violated }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::solver::tests::row;

    #[test]
    fn test_near_integers_snap() {
        let program = Program {
            columns: 2,
            rows: vec![row(&[(0, 1.0), (1, -1.0)], Relation::Eq, -5.0)],
            objective: vec![],
        };
        let rounded = round(&program, &[9.9999999, 15.0000001], 1e-6, 8);
        assert_eq!(rounded.values, vec![10, 15]);
        assert!(rounded.violated.is_empty());
    }

    #[test]
    fn test_repair_prefers_satisfaction_over_nearest() {
        // x0 >= 2.4 solved as 2.4; nearest (2) would violate, ceil holds
        let program = Program {
            columns: 1,
            rows: vec![row(&[(0, 1.0)], Relation::Ge, 2.4)],
            objective: vec![],
        };
        let rounded = round(&program, &[2.4], 1e-6, 8);
        assert_eq!(rounded.values, vec![3]);
        assert!(rounded.violated.is_empty());
    }

    #[test]
    fn test_equality_keeps_exact_difference() {
        // x1 - x0 = 3 at (0.4, 3.4): both round down together
        let program = Program {
            columns: 2,
            rows: vec![row(&[(0, -1.0), (1, 1.0)], Relation::Eq, 3.0)],
            objective: vec![],
        };
        let rounded = round(&program, &[0.4, 3.4], 1e-6, 8);
        assert_eq!(rounded.values, vec![0, 3]);
        assert!(rounded.violated.is_empty());
    }

    #[test]
    fn test_impossible_equality_is_reported() {
        // 2 * x0 = 3 has no integer solution
        let program = Program {
            columns: 1,
            rows: vec![row(&[(0, 2.0)], Relation::Eq, 3.0)],
            objective: vec![],
        };
        let rounded = round(&program, &[1.5], 1e-6, 8);
        assert_eq!(rounded.violated, vec![0]);
    }

    #[test]
    fn test_violated_rows_on_integral_values() {
        let program = Program {
            columns: 1,
            rows: vec![row(&[(0, 1.0)], Relation::Le, 3.0)],
            objective: vec![],
        };
        assert!(violated_rows(&program, &[3], 1e-6).is_empty());
        assert_eq!(violated_rows(&program, &[4], 1e-6), vec![0]);
    }
}
