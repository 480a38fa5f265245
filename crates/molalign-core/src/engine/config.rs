use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// RMSD at or below which an exact superposition (`mols_align = true`) is
/// considered found.
pub const EXACT_RMSD_THRESHOLD: f64 = 1.0e-6;

/// Largest final RMSD accepted when the caller asserts an exact superposition.
pub const EXACT_RMSD_ACCEPTANCE: f64 = 1.0e-4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// When the correspondence search may stop early.
///
/// Written in TOML as `mols_align = true | false` or as a float tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "CriterionRepr", into = "CriterionRepr")]
pub enum ConvergenceCriterion {
    /// Always explore every candidate.
    #[default]
    Off,
    /// The caller asserts the two sets are superimposable with zero RMSD.
    Exact,
    /// Stop once the best RMSD falls to this tolerance.
    Tolerance(f64),
}

#[derive(Serialize, Deserialize, Clone, Copy)]
#[serde(untagged)]
enum CriterionRepr {
    Flag(bool),
    Tolerance(f64),
}

impl From<CriterionRepr> for ConvergenceCriterion {
    fn from(repr: CriterionRepr) -> Self {
        match repr {
            CriterionRepr::Flag(true) => Self::Exact,
            CriterionRepr::Flag(false) => Self::Off,
            CriterionRepr::Tolerance(t) => Self::Tolerance(t),
        }
    }
}

impl From<ConvergenceCriterion> for CriterionRepr {
    fn from(criterion: ConvergenceCriterion) -> Self {
        match criterion {
            ConvergenceCriterion::Off => Self::Flag(false),
            ConvergenceCriterion::Exact => Self::Flag(true),
            ConvergenceCriterion::Tolerance(t) => Self::Tolerance(t),
        }
    }
}

impl ConvergenceCriterion {
    /// The early-exit RMSD, if early exit is possible at all.
    pub fn threshold(&self) -> Option<f64> {
        match self {
            Self::Off => None,
            Self::Exact => Some(EXACT_RMSD_THRESHOLD),
            Self::Tolerance(t) => Some(*t),
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact)
    }
}

impl From<bool> for ConvergenceCriterion {
    fn from(flag: bool) -> Self {
        CriterionRepr::Flag(flag).into()
    }
}

/// Which per-atom weights enter the superposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    #[default]
    Uniform,
    /// Weights attached to the reference set, indexed by reference position.
    Reference,
}

/// Options steering one call to [`align`](crate::workflows::align::align).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Atom `i` of the reference already corresponds to atom `i` of the moving set.
    pub atoms_map: bool,
    pub mols_align: ConvergenceCriterion,
    /// Run the correspondence search even when `atoms_map` is set.
    pub run_resorting: bool,
    /// Ignore `mols_align` and score every candidate.
    pub run_to_completion: bool,
    /// Also search the mirror image of the moving set.
    pub run_mirror: bool,
    /// Treat every ghost atom as interchangeable with every other ghost.
    pub generic_ghosts: bool,
    /// Reduced-cost threshold below which atom pairs become enumeration
    /// edges. `None` enumerates each class's full cross product.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uno_cutoff: Option<f64>,
    pub weighting: Weighting,
}

impl AlignConfig {
    /// Whether the correspondence search machinery runs at all.
    pub fn resorts(&self) -> bool {
        self.run_resorting || !self.atoms_map
    }

    /// The effective early-exit threshold after `run_to_completion`.
    pub fn early_exit(&self) -> Option<f64> {
        if self.run_to_completion {
            None
        } else {
            self.mols_align.threshold()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let ConvergenceCriterion::Tolerance(t) = self.mols_align {
            if !t.is_finite() || t < 0.0 {
                return Err(ConfigError::InvalidParameter {
                    name: "mols_align",
                    reason: format!("tolerance must be finite and non-negative, got {t}"),
                });
            }
        }
        if let Some(cutoff) = self.uno_cutoff {
            if !cutoff.is_finite() || cutoff <= 0.0 {
                return Err(ConfigError::InvalidParameter {
                    name: "uno_cutoff",
                    reason: format!("cutoff must be finite and positive, got {cutoff}"),
                });
            }
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "<string>")
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::parse(&content, &path.to_string_lossy())
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Toml {
            path: origin.to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Default)]
pub struct AlignConfigBuilder {
    config: AlignConfig,
}

impl AlignConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn atoms_map(mut self, value: bool) -> Self {
        self.config.atoms_map = value;
        self
    }
    pub fn mols_align(mut self, criterion: impl Into<ConvergenceCriterion>) -> Self {
        self.config.mols_align = criterion.into();
        self
    }
    pub fn run_resorting(mut self, value: bool) -> Self {
        self.config.run_resorting = value;
        self
    }
    pub fn run_to_completion(mut self, value: bool) -> Self {
        self.config.run_to_completion = value;
        self
    }
    pub fn run_mirror(mut self, value: bool) -> Self {
        self.config.run_mirror = value;
        self
    }
    pub fn generic_ghosts(mut self, value: bool) -> Self {
        self.config.generic_ghosts = value;
        self
    }
    pub fn uno_cutoff(mut self, cutoff: Option<f64>) -> Self {
        self.config.uno_cutoff = cutoff;
        self
    }
    pub fn weighting(mut self, weighting: Weighting) -> Self {
        self.config.weighting = weighting;
        self
    }

    pub fn build(self) -> Result<AlignConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn defaults_search_everything_without_early_exit() {
        let config = AlignConfig::default();
        assert!(config.resorts());
        assert_eq!(config.early_exit(), None);
        assert_eq!(config.uno_cutoff, None);
        assert_eq!(config.weighting, Weighting::Uniform);
    }

    #[test]
    fn atoms_map_skips_resorting_unless_forced() {
        let config = AlignConfigBuilder::new().atoms_map(true).build().unwrap();
        assert!(!config.resorts());
        let config = AlignConfigBuilder::new()
            .atoms_map(true)
            .run_resorting(true)
            .build()
            .unwrap();
        assert!(config.resorts());
    }

    #[test]
    fn run_to_completion_disables_early_exit() {
        let config = AlignConfigBuilder::new().mols_align(true).build().unwrap();
        assert_eq!(config.early_exit(), Some(EXACT_RMSD_THRESHOLD));
        let config = AlignConfigBuilder::new()
            .mols_align(ConvergenceCriterion::Tolerance(0.01))
            .run_to_completion(true)
            .build()
            .unwrap();
        assert_eq!(config.early_exit(), None);
    }

    #[test]
    fn mols_align_accepts_bool_or_float_in_toml() {
        let config = AlignConfig::from_toml_str("mols_align = true").unwrap();
        assert_eq!(config.mols_align, ConvergenceCriterion::Exact);
        let config = AlignConfig::from_toml_str("mols_align = false").unwrap();
        assert_eq!(config.mols_align, ConvergenceCriterion::Off);
        let config = AlignConfig::from_toml_str("mols_align = 0.25").unwrap();
        assert_eq!(config.mols_align, ConvergenceCriterion::Tolerance(0.25));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = AlignConfigBuilder::new()
            .run_mirror(true)
            .mols_align(ConvergenceCriterion::Tolerance(1e-3))
            .uno_cutoff(Some(0.1))
            .weighting(Weighting::Reference)
            .build()
            .unwrap();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("weighting = \"reference\""));
        assert_eq!(AlignConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            AlignConfigBuilder::new().uno_cutoff(Some(-1.0)).build(),
            Err(ConfigError::InvalidParameter { name: "uno_cutoff", .. })
        ));
        assert!(matches!(
            AlignConfig::from_toml_str("mols_align = -0.5"),
            Err(ConfigError::InvalidParameter { name: "mols_align", .. })
        ));
    }

    #[test]
    fn load_succeeds_with_valid_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("align.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            r#"
            atoms_map = false
            mols_align = true
            run_mirror = true
            uno_cutoff = 0.001
            "#
        )
        .unwrap();

        let config = AlignConfig::load(&file_path).unwrap();
        assert!(config.run_mirror);
        assert!(config.mols_align.is_exact());
        assert_eq!(config.uno_cutoff, Some(0.001));
        assert!(!config.generic_ghosts);
    }

    #[test]
    fn load_fails_for_missing_file() {
        let dir = tempdir().unwrap();
        let result = AlignConfig::load(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn load_fails_for_malformed_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("malformed.toml");
        fs::write(&file_path, "this is not toml").unwrap();
        assert!(matches!(AlignConfig::load(&file_path), Err(ConfigError::Toml { .. })));
    }
}
