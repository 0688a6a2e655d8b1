//! Engine configuration
//!
//! Loaded from `<workspace>/remedy.toml` when present. Every field has a
//! default, so an empty file (or none) is a valid configuration.
//!
//! ```toml
//! max_files = 3
//! max_loc_per_file = 20
//! min_trust_threshold = 0.25
//!
//! [build]
//! command = ["cargo", "check", "--quiet"]
//!
//! [analysis]
//! command = ["remedy-analyze", "--json"]
//!
//! [[recipes.regex]]
//! id = "services-import"
//! category = "import-path"
//! pattern = "from '@core/services/([^']+)'"
//! replacement = "from '../core/services/$1'"
//! ```

use crate::error::ConfigError;
use crate::state_machine::CyclePhase;
use remedy_ledger::RetentionPolicy;
use remedy_recipe::{RecipeRegistry, RegexRewriteRecipe, RegexRewriteSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// File name looked up in the workspace root
pub const CONFIG_FILE: &str = "remedy.toml";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Distinct files one cycle may touch
    pub max_files: usize,
    /// Changed lines allowed per file
    pub max_loc_per_file: u32,
    /// Minimum `trust × confidence` for a candidate to be considered
    pub min_trust_threshold: f64,
    /// EMA learning rate α
    pub learning_rate: f64,
    /// Oldest acceptable analysis input
    pub max_input_age_secs: u64,
    /// Improvement fraction at or below which a cycle is only `partial`
    pub marginal_improvement: f64,
    /// State directory, relative to the workspace
    pub state_dir: PathBuf,
    /// How long to wait for another cycle's lock
    pub lock_wait_ms: u64,
    pub snapshot_retention: RetentionPolicy,
    pub phase_timeouts: PhaseTimeouts,
    pub parallel: ParallelConfig,
    pub analysis: AnalysisConfig,
    pub build: BuildConfig,
    pub recipes: RecipesConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_loc_per_file: 40,
            min_trust_threshold: 0.2,
            learning_rate: 0.1,
            max_input_age_secs: 300,
            marginal_improvement: 0.0,
            state_dir: PathBuf::from(".remedy"),
            lock_wait_ms: 0,
            snapshot_retention: RetentionPolicy::default(),
            phase_timeouts: PhaseTimeouts::default(),
            parallel: ParallelConfig::default(),
            analysis: AnalysisConfig::default(),
            build: BuildConfig::default(),
            recipes: RecipesConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `remedy.toml` from `workspace`, or defaults if absent
    ///
    /// # Errors
    /// Returns error if the file exists but is unreadable, malformed or out
    /// of range
    pub fn load(workspace: &Path) -> Result<Self, ConfigError> {
        let path = workspace.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_toml_str(&text).map_err(|e| match e {
                ConfigError::Parse { source, .. } => ConfigError::Parse { path, source },
                other => other,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// Returns error on malformed or out-of-range input
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from(CONFIG_FILE),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field is in range
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_files == 0 {
            return Err(ConfigError::invalid("max_files", "must be at least 1"));
        }
        if self.max_loc_per_file == 0 {
            return Err(ConfigError::invalid("max_loc_per_file", "must be at least 1"));
        }
        for (field, value) in [
            ("min_trust_threshold", self.min_trust_threshold),
            ("marginal_improvement", self.marginal_improvement),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, format!("{value} is outside [0, 1]")));
            }
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(ConfigError::invalid(
                "learning_rate",
                format!("{} is outside (0, 1]", self.learning_rate),
            ));
        }
        if self.max_input_age_secs == 0 {
            return Err(ConfigError::invalid("max_input_age_secs", "must be at least 1"));
        }
        if self.state_dir.as_os_str().is_empty() || self.state_dir.is_absolute() {
            return Err(ConfigError::invalid("state_dir", "must be a relative directory"));
        }
        if self.snapshot_retention.max_count == 0 {
            return Err(ConfigError::invalid(
                "snapshot_retention.max_count",
                "must keep at least 1",
            ));
        }
        if self.parallel.workers == Some(0) {
            return Err(ConfigError::invalid("parallel.workers", "must be at least 1"));
        }
        if self.analysis.command.as_ref().is_some_and(Vec::is_empty) {
            return Err(ConfigError::invalid("analysis.command", "must not be empty"));
        }
        if self.build.command.as_ref().is_some_and(Vec::is_empty) {
            return Err(ConfigError::invalid("build.command", "must not be empty"));
        }
        Ok(())
    }

    /// With max files
    #[inline]
    #[must_use]
    pub fn with_max_files(mut self, max: usize) -> Self {
        self.max_files = max;
        self
    }

    /// With max changed lines per file
    #[inline]
    #[must_use]
    pub fn with_max_loc_per_file(mut self, max: u32) -> Self {
        self.max_loc_per_file = max;
        self
    }

    /// With trust threshold
    #[inline]
    #[must_use]
    pub fn with_min_trust_threshold(mut self, threshold: f64) -> Self {
        self.min_trust_threshold = threshold;
        self
    }

    /// With analysis report path
    #[inline]
    #[must_use]
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.analysis.report_path = path.into();
        self
    }

    /// With build command
    #[inline]
    #[must_use]
    pub fn with_build_command(mut self, argv: Vec<String>) -> Self {
        self.build.command = Some(argv);
        self
    }

    /// Built-in recipes plus the configured rewrites
    ///
    /// # Errors
    /// Returns [`ConfigError::Recipe`] if a rewrite does not compile or
    /// reuses an id
    pub fn build_registry(&self) -> Result<RecipeRegistry, ConfigError> {
        let mut registry = RecipeRegistry::with_builtins();
        for spec in &self.recipes.regex {
            let recipe = RegexRewriteRecipe::from_spec(spec.clone())
                .map_err(|e| ConfigError::Recipe(e.to_string()))?;
            registry
                .register(Arc::new(recipe))
                .map_err(|e| ConfigError::Recipe(e.to_string()))?;
        }
        Ok(registry)
    }
}

/// Per-phase deadlines, in seconds (0 disables the deadline)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseTimeouts {
    pub observe: u64,
    pub decide: u64,
    pub act: u64,
    pub verify: u64,
}

impl Default for PhaseTimeouts {
    fn default() -> Self {
        Self {
            observe: 120,
            decide: 30,
            act: 120,
            verify: 900,
        }
    }
}

impl PhaseTimeouts {
    /// Deadline for `phase`, if it has one
    #[must_use]
    pub fn deadline(&self, phase: CyclePhase) -> Option<Duration> {
        let secs = match phase {
            CyclePhase::Observe => self.observe,
            CyclePhase::Decide => self.decide,
            CyclePhase::Act => self.act,
            CyclePhase::Verify => self.verify,
            _ => 0,
        };
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}

/// Optional parallel Act
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Worker threads; `None` keeps Act sequential
    pub workers: Option<usize>,
    /// Smallest batch (in files) written in parallel
    pub min_files: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            workers: None,
            min_files: 50,
        }
    }
}

impl ParallelConfig {
    /// Worker count to use for a batch of `files`, if parallel
    #[must_use]
    pub fn workers_for(&self, files: usize) -> Option<usize> {
        self.workers.filter(|w| *w > 1 && files >= self.min_files)
    }
}

/// Where analysis input comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Report file, relative to the workspace
    pub report_path: PathBuf,
    /// Analyzer command printing a report on stdout; preferred over the file
    pub command: Option<Vec<String>>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from(".remedy/analysis.json"),
            command: None,
        }
    }
}

/// Build step run during Verify
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub command: Option<Vec<String>>,
}

/// Extra recipes declared in configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipesConfig {
    pub regex: Vec<RegexRewriteSpec>,
}
