//! Integer backend for systems of difference constraints
//!
//! Rows of the form `x - y <= c` (and the one-variable `x <= c`) are solved
//! exactly on the integer grid as shortest paths in a constraint graph, using
//! petgraph's Bellman-Ford. A negative cycle means the rows are infeasible.

use petgraph::algo::bellman_ford;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::parser::ast::Relation;

use super::compiler::{Program, Row};
use super::solver::{Assignment, SolverBackend, SolverError};

/// Slack when flooring bounds that are integral up to float noise
const FLOOR_EPSILON: f64 = 1e-9;

/// `x[upper] - x[lower] <= bound`, with `None` standing for the zero reference
#[derive(Debug, Clone, Copy, PartialEq)]
struct Difference {
    upper: Option<usize>,
    lower: Option<usize>,
    bound: i64,
}

#[derive(Debug, Default)]
pub struct DifferenceBackend;

impl DifferenceBackend {
    pub fn new() -> Self {
        Self
    }
}

fn unsupported(row: &Row) -> SolverError {
    SolverError::Unsupported {
        backend: "difference",
        constraint: row.origin.description.clone(),
        reason: "only constraints of the form 'a - b <= c' can be solved on the integer grid"
            .to_string(),
    }
}

fn floor(value: f64) -> i64 {
    (value + FLOOR_EPSILON).floor() as i64
}

/// Normalize a row into one or two difference constraints
fn differences(row: &Row) -> Result<Vec<Difference>, SolverError> {
    if !row.is_difference() {
        return Err(unsupported(row));
    }
    let (upper, lower, scale) = match row.terms.as_slice() {
        [(a, k)] => (Some(*a), None, *k),
        [(a, k), (b, _)] => (Some(*a), Some(*b), *k),
        _ => return Err(unsupported(row)),
    };

    // k * (upper - lower) (rel) rhs; dividing by a negative k flips the relation
    let c = row.rhs / scale;
    let relation = match (row.relation, scale < 0.0) {
        (Relation::Le, true) => Relation::Ge,
        (Relation::Ge, true) => Relation::Le,
        (relation, _) => relation,
    };

    let le = Difference {
        upper,
        lower,
        bound: floor(c),
    };
    let ge = Difference {
        upper: lower,
        lower: upper,
        bound: floor(-c),
    };
    Ok(match relation {
        Relation::Le => vec![le],
        Relation::Ge => vec![ge],
        Relation::Eq => {
            if (c - c.round()).abs() > FLOOR_EPSILON {
                return Err(SolverError::infeasible(
                    Some(&row.origin),
                    format!(
                        "'{}' needs a non-integer difference of {}",
                        row.origin.description, c
                    ),
                ));
            }
            vec![le, ge]
        }
    })
}

impl SolverBackend for DifferenceBackend {
    fn name(&self) -> &'static str {
        "difference"
    }

    fn solve(&mut self, program: &Program) -> Result<Assignment, SolverError> {
        let mut constraints = Vec::new();
        for row in &program.rows {
            constraints.extend(differences(row)?);
        }

        // Nodes: one per column, then the zero reference, then a virtual source
        let mut graph: DiGraph<(), f64> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..program.columns + 2)
            .map(|_| graph.add_node(()))
            .collect();
        let zero = nodes[program.columns];
        let source = nodes[program.columns + 1];
        let node = |col: Option<usize>| col.map_or(zero, |c| nodes[c]);

        // With y = -x, `x_u - x_l <= c` becomes `y_l <= y_u + c`: edge u -> l.
        // Shortest paths then give the least solution above the reference.
        for d in &constraints {
            graph.add_edge(node(d.upper), node(d.lower), d.bound as f64);
        }
        for &n in &nodes[..=program.columns] {
            graph.add_edge(source, n, 0.0);
        }

        let paths = bellman_ford(&graph, source).map_err(|_| {
            SolverError::infeasible(None, "difference constraints contain a negative cycle")
        })?;
        let dist = |n: NodeIndex| paths.distances[n.index()];
        let reference = dist(zero);
        let mut values: Vec<i64> = (0..program.columns)
            .map(|c| (reference - dist(nodes[c])).round() as i64)
            .collect();

        tighten_lower_edges(program, &constraints, &mut values);
        debug!(
            columns = program.columns,
            rows = program.rows.len(),
            "difference solve complete"
        );

        Ok(Assignment::Integral(values))
    }
}

/// Raise every column that the objective wants large (negative coefficient)
/// to its tightest upper bound.
///
/// The shortest-path solution pins every column at its lower bound, which is
/// right for the high edges of a boundary but leaves its low edges loose.
fn tighten_lower_edges(program: &Program, constraints: &[Difference], values: &mut [i64]) {
    let mut raise: Vec<usize> = program
        .objective
        .iter()
        .flatten()
        .filter(|(_, coef)| *coef < 0.0)
        .map(|(col, _)| *col)
        .collect();
    raise.sort_unstable();
    raise.dedup();

    for col in raise {
        let limit = constraints
            .iter()
            .filter(|d| d.upper == Some(col))
            .map(|d| d.lower.map_or(0, |l| values[l]) + d.bound)
            .min();
        if let Some(limit) = limit {
            if limit > values[col] {
                values[col] = limit;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::solver::tests::row;

    fn integral(result: Result<Assignment, SolverError>) -> Vec<i64> {
        match result {
            Ok(Assignment::Integral(v)) => v,
            other => panic!("Expected integral assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_lower_bound() {
        let program = Program {
            columns: 1,
            rows: vec![row(&[(0, 1.0)], Relation::Ge, 5.0)],
            objective: vec![],
        };
        assert_eq!(integral(DifferenceBackend::new().solve(&program)), vec![5]);
    }

    #[test]
    fn test_chained_offsets() {
        // x0 = 2, x1 - x0 >= 3
        let program = Program {
            columns: 2,
            rows: vec![
                row(&[(0, 1.0)], Relation::Eq, 2.0),
                row(&[(0, -1.0), (1, 1.0)], Relation::Ge, 3.0),
            ],
            objective: vec![],
        };
        assert_eq!(integral(DifferenceBackend::new().solve(&program)), vec![2, 5]);
    }

    #[test]
    fn test_negative_cycle_is_infeasible() {
        let program = Program {
            columns: 1,
            rows: vec![
                row(&[(0, 1.0)], Relation::Ge, 5.0),
                row(&[(0, 1.0)], Relation::Le, 3.0),
            ],
            objective: vec![],
        };
        assert!(matches!(
            DifferenceBackend::new().solve(&program),
            Err(SolverError::Infeasible { .. })
        ));
    }

    #[test]
    fn test_general_row_is_unsupported() {
        let program = Program {
            columns: 2,
            rows: vec![row(&[(0, 1.0), (1, 1.0)], Relation::Le, 3.0)],
            objective: vec![],
        };
        assert!(matches!(
            DifferenceBackend::new().solve(&program),
            Err(SolverError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_scaled_row_is_normalized() {
        // -2 * x0 <= -7  =>  x0 >= 3.5  =>  x0 >= 4 on the grid
        let program = Program {
            columns: 1,
            rows: vec![row(&[(0, -2.0)], Relation::Le, -7.0)],
            objective: vec![],
        };
        assert_eq!(integral(DifferenceBackend::new().solve(&program)), vec![4]);
    }

    #[test]
    fn test_objective_tightens_low_edge() {
        // columns: lo, hi, p; p = 4, hi >= p, lo <= p, minimize hi - lo
        let program = Program {
            columns: 3,
            rows: vec![
                row(&[(2, 1.0)], Relation::Eq, 4.0),
                row(&[(1, 1.0), (2, -1.0)], Relation::Ge, 0.0),
                row(&[(0, 1.0), (2, -1.0)], Relation::Le, 0.0),
            ],
            objective: vec![vec![(0, -1.0), (1, 1.0)]],
        };
        assert_eq!(integral(DifferenceBackend::new().solve(&program)), vec![4, 4, 4]);
    }
}
