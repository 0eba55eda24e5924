//! Model build and solve configuration.
//!
//! Configuration is plain TOML; every field is optional:
//!
//! ```toml
//! solver = "highs"
//! relax_binaries = false
//! gradient_costs = true
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// LP/MILP backend reached through `good_lp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// Interior-point conic solver; continuous problems only
    #[default]
    Clarabel,
    /// HiGHS simplex / branch-and-bound; handles binaries
    Highs,
}

impl SolverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverKind::Clarabel => "clarabel",
            SolverKind::Highs => "highs",
        }
    }

    /// Whether the backend was compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            SolverKind::Clarabel => cfg!(feature = "solver-clarabel"),
            SolverKind::Highs => cfg!(feature = "solver-highs"),
        }
    }

    pub fn supports_integers(&self) -> bool {
        matches!(self, SolverKind::Highs)
    }

    /// Backends compiled into this build.
    pub fn available() -> Vec<SolverKind> {
        [SolverKind::Clarabel, SolverKind::Highs]
            .into_iter()
            .filter(SolverKind::is_available)
            .collect()
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SolverKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clarabel" => Ok(SolverKind::Clarabel),
            "highs" => Ok(SolverKind::Highs),
            _ => Err(ModelError::config(format!("Unknown solver: {}", s))),
        }
    }
}

/// Settings for a model build and the subsequent solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub solver: SolverKind,
    /// Treat binary status variables as continuous in `[0, 1]`.
    /// Unset means "relax only if the solver cannot handle integers".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relax_binaries: Option<bool>,
    /// Charge declared ramping costs in the objective
    pub gradient_costs: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            solver: SolverKind::default(),
            relax_binaries: None,
            gradient_costs: true,
        }
    }
}

impl ModelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_solver(mut self, solver: SolverKind) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_relax_binaries(mut self, relax: bool) -> Self {
        self.relax_binaries = Some(relax);
        self
    }

    pub fn with_gradient_costs(mut self, enabled: bool) -> Self {
        self.gradient_costs = enabled;
        self
    }

    /// Effective binary relaxation setting.
    pub fn relax_binaries(&self) -> bool {
        self.relax_binaries
            .unwrap_or(!self.solver.supports_integers())
    }

    pub fn from_toml_str(contents: &str) -> ModelResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: impl AsRef<Path>) -> ModelResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ModelConfig::new();
        assert_eq!(config.solver, SolverKind::Clarabel);
        assert!(config.relax_binaries());
        assert!(config.gradient_costs);
        assert_eq!(ModelConfig::from_toml_str("").unwrap(), config);
    }

    #[test]
    fn test_highs_keeps_binaries() {
        let config = ModelConfig::from_toml_str("solver = \"highs\"").unwrap();
        assert_eq!(config.solver, SolverKind::Highs);
        assert!(!config.relax_binaries());
        assert!(config
            .clone()
            .with_relax_binaries(true)
            .relax_binaries());
    }

    #[test]
    fn test_partial_toml() {
        let config =
            ModelConfig::from_toml_str("relax_binaries = false\ngradient_costs = false").unwrap();
        assert_eq!(config.solver, SolverKind::Clarabel);
        assert!(!config.relax_binaries());
        assert!(!config.gradient_costs);
    }

    #[test]
    fn test_invalid_toml() {
        let err = ModelConfig::from_toml_str("solver = \"cplex\"").unwrap_err();
        assert!(matches!(err, ModelError::Toml(_)));
    }

    #[test]
    fn test_solver_kind_from_str() {
        assert_eq!("HiGHS".parse::<SolverKind>().unwrap(), SolverKind::Highs);
        assert!("glpk".parse::<SolverKind>().is_err());
        assert_eq!(SolverKind::Clarabel.to_string(), "clarabel");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.toml");
        std::fs::write(&path, "gradient_costs = false\n").unwrap();
        let config = ModelConfig::load_from(&path).unwrap();
        assert!(!config.gradient_costs);

        let missing = ModelConfig::load_from(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ModelError::Io(_))));
    }
}
