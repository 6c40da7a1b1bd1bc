//! Configuration for solving cells

use serde::Deserialize;

/// Which solver backend runs the compiled program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Continuous Cassowary solve followed by rounding
    #[default]
    Cassowary,
    /// Integer solve restricted to difference constraints
    Difference,
}

impl BackendKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cassowary" => Some(Self::Cassowary),
            "difference" => Some(Self::Difference),
            _ => None,
        }
    }
}

/// What the solver optimizes beyond feasibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Objective {
    /// Minimize width + height of every boundary in the solve
    #[default]
    MinArea,
    /// Any feasible assignment
    Feasible,
}

/// Configuration options for a solve
#[derive(Debug, Clone, PartialEq)]
pub struct SolveConfig {
    pub backend: BackendKind,
    pub objective: Objective,

    /// Slack allowed on inequalities after rounding
    pub tolerance: f64,

    /// Upper bound on rounding repair sweeps
    pub max_passes: usize,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Cassowary,
            objective: Objective::MinArea,
            tolerance: 1e-6,
            max_passes: 16,
        }
    }
}

impl SolveConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    /// Set the rounding tolerance for inequalities
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SolveConfig::default();
        assert_eq!(config.backend, BackendKind::Cassowary);
        assert_eq!(config.objective, Objective::MinArea);
        assert_eq!(config.tolerance, 1e-6);
        assert_eq!(config.max_passes, 16);
    }

    #[test]
    fn test_builder_pattern() {
        let config = SolveConfig::new()
            .with_backend(BackendKind::Difference)
            .with_objective(Objective::Feasible)
            .with_tolerance(0.5);

        assert_eq!(config.backend, BackendKind::Difference);
        assert_eq!(config.objective, Objective::Feasible);
        assert_eq!(config.tolerance, 0.5);
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(BackendKind::from_str("difference"), Some(BackendKind::Difference));
        assert_eq!(BackendKind::from_str("simplex"), None);
    }
}
