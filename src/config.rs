//! Engine configuration loaded from TOML
//!
//! ```toml
//! [solver]
//! backend = "difference"
//! objective = "min-area"
//!
//! [rounding]
//! tolerance = 1e-6
//! max_passes = 16
//!
//! [layers]
//! m1 = [68, 20]
//! poly = [66, 20]
//!
//! [gds]
//! boundary = [0, 0]
//! ```
//!
//! Every section and key is optional; missing values fall back to
//! [`SolveConfig::default`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::gds::LayerMap;
use crate::layout::{BackendKind, Objective, SolveConfig};

/// Errors that can occur when loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlSolver {
    backend: Option<BackendKind>,
    objective: Option<Objective>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlRounding {
    tolerance: Option<f64>,
    max_passes: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlGds {
    boundary: Option<(i16, i16)>,
}

/// TOML structure for deserializing engine configs
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    #[serde(default)]
    solver: TomlSolver,
    #[serde(default)]
    rounding: TomlRounding,
    #[serde(default)]
    layers: BTreeMap<String, (i16, i16)>,
    #[serde(default)]
    gds: TomlGds,
}

/// Solver settings plus the GDSII layer assignment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub solve: SolveConfig,
    /// Layer tag to `(layer, datatype)`; empty means auto-assign on export
    pub layers: BTreeMap<String, (i16, i16)>,
    /// Pair carrying cell boundaries in GDSII; `None` keeps the default
    pub boundary_layer: Option<(i16, i16)>,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let parsed: TomlConfig = toml::from_str(content)?;

        let mut solve = SolveConfig::default();
        if let Some(backend) = parsed.solver.backend {
            solve = solve.with_backend(backend);
        }
        if let Some(objective) = parsed.solver.objective {
            solve = solve.with_objective(objective);
        }
        if let Some(tolerance) = parsed.rounding.tolerance {
            solve = solve.with_tolerance(tolerance);
        }
        if let Some(max_passes) = parsed.rounding.max_passes {
            solve = solve.with_max_passes(max_passes);
        }

        Ok(EngineConfig {
            solve,
            layers: parsed.layers,
            boundary_layer: parsed.gds.boundary,
        })
    }

    /// Solver settings for [`Library::solve_with`](crate::layout::Library::solve_with)
    pub fn solve_config(&self) -> &SolveConfig {
        &self.solve
    }

    /// Layer map for export and import; configured tags keep their numbers,
    /// tags seen in `used` but not configured are numbered after them
    pub fn layer_map<'a>(&self, used: impl IntoIterator<Item = &'a str>) -> LayerMap {
        let mut map = LayerMap::from_pairs(self.layers.iter().map(|(k, v)| (k.clone(), *v)));
        if let Some(pair) = self.boundary_layer {
            map.set_boundary_layer(pair);
        }
        map.assign_missing(used);
        map
    }
}
