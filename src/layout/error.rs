//! Error types for the layout engine

use thiserror::Error;

use super::solver::SolverError;

/// A constraint could not be turned into solver rows
#[derive(Debug, Clone, PartialEq, Error)]
#[error("in cell '{cell}', constraint '{constraint}': {reason}")]
pub struct CompileError {
    pub cell: String,
    /// Rendered text of the offending constraint
    pub constraint: String,
    pub reason: String,
}

impl CompileError {
    pub fn new(
        cell: impl Into<String>,
        constraint: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            cell: cell.into(),
            constraint: constraint.into(),
            reason: reason.into(),
        }
    }
}

/// A row that no longer holds after rounding to integers.
///
/// Non-fatal: the solve still writes its geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundingViolation {
    pub cell: String,
    pub constraint: String,
    /// Amount by which the row is violated, in grid units
    pub residual: f64,
}

impl std::fmt::Display for RoundingViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cell '{}': '{}' violated by {} after rounding",
            self.cell, self.constraint, self.residual
        )
    }
}

/// Errors that can occur while building, solving or freezing cells
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("unknown cell '{name}'")]
    UnknownCell { name: String },

    #[error("cell '{name}' already exists")]
    DuplicateCell { name: String },

    #[error("cell '{cell}' already has an element named '{name}'")]
    DuplicateElement { cell: String, name: String },

    #[error("cell '{cell}' has no element named '{name}'")]
    UnknownElement { cell: String, name: String },

    /// Mutation attempted on a frozen cell
    #[error("cell '{cell}' is frozen")]
    Frozen { cell: String },

    /// Placing `template` inside `parent` would make a cell contain itself
    #[error("placing '{template}' in '{parent}' would create a hierarchy cycle")]
    HierarchyCycle { parent: String, template: String },

    /// Manual placement without a known template size
    #[error("cannot place instance '{instance}' in '{cell}': {reason}")]
    Unplaceable {
        cell: String,
        instance: String,
        reason: String,
    },

    /// Constraint text could not be parsed
    #[error("invalid constraint '{text}' in cell '{cell}': {reason}")]
    InvalidConstraint {
        cell: String,
        text: String,
        reason: String,
    },

    #[error("compile error {0}")]
    Compile(#[from] CompileError),

    /// No assignment satisfies the constraints
    #[error("cell '{cell}' is infeasible: {reason}")]
    Infeasible { cell: String, reason: String },

    /// Freeze attempted while a slot is still unresolved
    #[error("cannot freeze cell '{cell}': slot '{slot}' is unresolved")]
    FreezePrecondition { cell: String, slot: String },

    /// Freeze attempted while a rectangle has its edges out of order
    #[error("cannot freeze cell '{cell}': slot '{slot}' is smaller than its opposite edge")]
    InvertedRect { cell: String, slot: String },

    /// Freeze attempted while an instance places a template that can still change
    #[error("cannot freeze cell '{cell}': instance '{instance}' places unfrozen cell '{template}'")]
    UnfrozenTemplate {
        cell: String,
        instance: String,
        template: String,
    },

    /// Freeze attempted while an instance no longer matches its template's size
    #[error("cannot freeze cell '{cell}': instance '{instance}' does not match the size of '{template}'; solve it again")]
    StaleInstance {
        cell: String,
        instance: String,
        template: String,
    },

    /// Unfreeze attempted while a frozen cell still places this one
    #[error("cannot unfreeze cell '{cell}': frozen cell '{parent}' places it")]
    FrozenParent { cell: String, parent: String },

    /// Geometry requested from a cell that still has an unresolved slot
    #[error("cell '{cell}' has unresolved slot '{slot}'")]
    Unresolved { cell: String, slot: String },

    /// A coordinate written in a script is not a grid integer
    #[error("cell '{cell}': {what} = {value} is not on the integer grid")]
    OffGrid {
        cell: String,
        what: String,
        value: f64,
    },

    #[error("solver error: {0}")]
    Solver(#[from] SolverError),
}

impl LayoutError {
    pub fn unknown_cell(name: impl Into<String>) -> Self {
        Self::UnknownCell { name: name.into() }
    }

    pub fn unknown_element(cell: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownElement {
            cell: cell.into(),
            name: name.into(),
        }
    }

    pub fn duplicate_element(cell: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DuplicateElement {
            cell: cell.into(),
            name: name.into(),
        }
    }

    pub fn frozen(cell: impl Into<String>) -> Self {
        Self::Frozen { cell: cell.into() }
    }

    pub fn infeasible(cell: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Infeasible {
            cell: cell.into(),
            reason: reason.into(),
        }
    }

    pub fn unplaceable(
        cell: impl Into<String>,
        instance: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Unplaceable {
            cell: cell.into(),
            instance: instance.into(),
            reason: reason.into(),
        }
    }

    /// Name of the cell the error is about, if any
    pub fn cell(&self) -> Option<&str> {
        match self {
            Self::UnknownCell { name } | Self::DuplicateCell { name } => Some(name),
            Self::DuplicateElement { cell, .. }
            | Self::UnknownElement { cell, .. }
            | Self::Frozen { cell }
            | Self::Unplaceable { cell, .. }
            | Self::InvalidConstraint { cell, .. }
            | Self::Infeasible { cell, .. }
            | Self::FreezePrecondition { cell, .. }
            | Self::InvertedRect { cell, .. }
            | Self::UnfrozenTemplate { cell, .. }
            | Self::StaleInstance { cell, .. }
            | Self::FrozenParent { cell, .. }
            | Self::Unresolved { cell, .. }
            | Self::OffGrid { cell, .. } => Some(cell),
            Self::HierarchyCycle { parent, .. } => Some(parent),
            Self::Compile(e) => Some(&e.cell),
            Self::Solver(_) => None,
        }
    }
}
