//! cellsolve - hierarchical cell layout from rectangle constraints
//!
//! This library provides a parser for the cell layout language, a layout
//! engine that solves cell constraints onto an integer grid, and GDSII
//! export and import for the resulting hierarchy.
//!
//! # Example
//!
//! ```rust
//! use cellsolve::{build, Rect};
//!
//! let built = build(r#"
//!     cell pair {
//!         rect a on m1 [x1: 0, y1: 0, x2: 10, y2: 10]
//!         rect b on m1 [y1: 0, x2: 20, y2: 10]
//!         constrain a.x2 + 5 = b.x1
//!     }
//!     solve pair
//! "#).unwrap();
//!
//! let pair = built.library.cell_id("pair").unwrap();
//! assert_eq!(built.library.rect_of(pair, "b").unwrap(), Some(Rect::new(15, 0, 20, 10)));
//! ```

pub mod config;
pub mod error;
pub mod gds;
pub mod layout;
pub mod parser;

pub use config::{ConfigError, EngineConfig};
pub use error::ParseError;
pub use gds::{GdsError, LayerMap};
pub use layout::{
    BackendKind, CellId, Library, LayoutError, Objective, Rect, SolveConfig, SolveReport,
};
pub use parser::{parse, parse_constraint, Document};

use std::fmt::Write as _;

use thiserror::Error;

/// Errors that can occur while building a script
#[derive(Debug, Error)]
pub enum BuildError {
    /// Error during parsing
    #[error("parse errors: {}", format_parse_errors(.0))]
    Parse(Vec<ParseError>),

    /// Error while executing statements
    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),
}

impl From<Vec<ParseError>> for BuildError {
    fn from(errors: Vec<ParseError>) -> Self {
        BuildError::Parse(errors)
    }
}

fn format_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A library built from a script, with one report per `solve` statement
#[derive(Debug, Clone)]
pub struct Build {
    pub library: Library,
    pub reports: Vec<SolveReport>,
}

/// Parse and execute a script with default configuration
pub fn build(source: &str) -> Result<Build, BuildError> {
    build_with_config(source, &EngineConfig::default())
}

/// Parse and execute a script
///
/// # Example
///
/// ```rust
/// use cellsolve::{build_with_config, BackendKind, EngineConfig};
///
/// let mut config = EngineConfig::default();
/// config.solve = config.solve.with_backend(BackendKind::Difference);
///
/// let built = build_with_config("cell c { rect a on m1 [x1: 0, y1: 0, x2: 3] \
///     constrain a.y2 = a.y1 + 2 } solve c", &config).unwrap();
/// assert_eq!(built.reports[0].backend, "difference");
/// ```
pub fn build_with_config(source: &str, config: &EngineConfig) -> Result<Build, BuildError> {
    let doc = parse(source)?;
    let mut library = Library::new();
    let reports = layout::execute(&mut library, &doc, config.solve_config())?;
    Ok(Build { library, reports })
}

/// Human-readable summary of solves and cells
pub fn describe(build: &Build) -> String {
    let mut out = String::new();
    for report in &build.reports {
        let _ = writeln!(
            out,
            "solve {} [{}]: {} free slots, {} rows, {} rounding violations",
            report.cell,
            report.backend,
            report.columns,
            report.rows,
            report.violations.len()
        );
        for v in &report.violations {
            let _ = writeln!(out, "  warning: {}", v);
        }
    }
    out.push_str(&describe_library(&build.library));
    out
}

/// One line per cell: name, frozen flag and bounding box
pub fn describe_library(library: &Library) -> String {
    let mut out = String::new();
    for (_, cell) in library.cells() {
        let bbox = cell
            .bbox()
            .map_or_else(|| "unsolved".to_string(), |b| b.to_string());
        let _ = writeln!(
            out,
            "cell {}{}: {} primitives, {} instances, bbox {}",
            cell.name(),
            if cell.is_frozen() { " (frozen)" } else { "" },
            cell.primitives().len(),
            cell.instances().len(),
            bbox
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_simple_cell() {
        let built = build(
            r#"
            cell c { rect a on m1 [x1: 0, y1: 0, x2: 4, y2: 2] }
            solve c
        "#,
        )
        .unwrap();
        assert_eq!(built.reports.len(), 1);
        assert!(built.reports[0].is_clean());
        let c = built.library.cell_id("c").unwrap();
        assert_eq!(built.library.bounding_box(c), Some(Rect::new(0, 0, 4, 2)));
    }

    #[test]
    fn test_build_parse_error() {
        let result = build("cell c { rect }");
        assert!(matches!(result, Err(BuildError::Parse(_))));
    }

    #[test]
    fn test_build_layout_error() {
        let result = build("freeze missing");
        match result {
            Err(BuildError::Layout(LayoutError::UnknownCell { name })) => {
                assert_eq!(name, "missing");
            }
            other => panic!("Expected unknown cell, got {:?}", other.map(|b| b.reports)),
        }
    }

    #[test]
    fn test_describe_lists_cells() {
        let built = build(
            r#"
            cell leaf { rect a on m1 [x1: 0, y1: 0, x2: 2, y2: 2] }
            freeze leaf
            cell top { inst u of leaf at 3, 0 }
            solve top
        "#,
        )
        .unwrap();
        let text = describe(&built);
        assert!(text.contains("solve top [cassowary]"));
        assert!(text.contains("cell leaf (frozen): 1 primitives, 0 instances, bbox (0, 0, 2, 2)"));
        assert!(text.contains("cell top: 0 primitives, 1 instances, bbox (3, 0, 5, 2)"));
    }
}
