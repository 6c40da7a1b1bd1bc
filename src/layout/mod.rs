//! Layout engine: cells, constraint compilation, solving and freezing
//!
//! A [`Library`] owns every cell. Solving a cell builds a [`VariableIndex`]
//! over the free slots in scope, compiles the constraints of those cells into
//! a [`Program`], hands it to a [`SolverBackend`] and rounds the result onto
//! the integer grid before writing it back.

pub mod cell;
pub mod compiler;
pub mod config;
pub mod constraint;
pub mod difference;
pub mod engine;
pub mod error;
mod freeze;
pub mod index;
pub mod library;
pub mod rounding;
pub mod solver;
pub mod types;

pub use cell::Cell;
pub use compiler::{compile, Program, Row, RowKind, RowOrigin};
pub use config::{BackendKind, Objective, SolveConfig};
pub use constraint::LinearRelation;
pub use difference::DifferenceBackend;
pub use engine::execute;
pub use error::{CompileError, LayoutError, RoundingViolation};
pub use index::VariableIndex;
pub use library::{Library, SolveReport};
pub use solver::{Assignment, CassowaryBackend, SolverBackend, SolverError};
pub use types::*;
