//! Configuration loading for agent-memory.
//!
//! Layered config: defaults -> config file -> explicit file -> env vars.
//! Default config file lives at ~/.config/agent-memory/config.toml.
//!
//! Every numeric constant used by ranking, decay and edge detection is a
//! setting here with a documented default. Nested keys are overridden from
//! the environment with a double underscore, e.g.
//! `MEMORY_DECAY__ARCHIVE_THRESHOLD=0.25`.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::MemoryError;
use crate::item::ItemKind;

/// Weight parameters shared by retrieval and decay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightConfig {
    /// Recency half-life for every kind except decisions (days)
    #[serde(default = "default_half_life_days")]
    pub default_half_life_days: f64,

    /// Recency half-life for decisions (days)
    #[serde(default = "default_decision_half_life_days")]
    pub decision_half_life_days: f64,

    /// Access count at which the frequency weight saturates
    #[serde(default = "default_freq_cap")]
    pub freq_cap: u32,

    /// Lower bound of the frequency weight during ranking, so never-read
    /// items are still reachable by semantic search
    #[serde(default = "default_frequency_floor")]
    pub frequency_floor: f64,
}

fn default_half_life_days() -> f64 {
    30.0
}

fn default_decision_half_life_days() -> f64 {
    90.0
}

fn default_freq_cap() -> u32 {
    20
}

fn default_frequency_floor() -> f64 {
    0.1
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            default_half_life_days: default_half_life_days(),
            decision_half_life_days: default_decision_half_life_days(),
            freq_cap: default_freq_cap(),
            frequency_floor: default_frequency_floor(),
        }
    }
}

impl WeightConfig {
    /// Half-life in days for the given item kind.
    pub fn half_life_days(&self, kind: ItemKind) -> f64 {
        match kind {
            ItemKind::Decision => self.decision_half_life_days,
            _ => self.default_half_life_days,
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_half_life_days <= 0.0 || self.decision_half_life_days <= 0.0 {
            return Err("half-life values must be positive".to_string());
        }
        if self.freq_cap == 0 {
            return Err("freq_cap must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.frequency_floor) {
            return Err(format!(
                "frequency_floor must be 0.0-1.0, got {}",
                self.frequency_floor
            ));
        }
        Ok(())
    }
}

/// Retrieval ranking configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Nearest neighbours requested from the vector index
    #[serde(default = "default_semantic_candidates")]
    pub semantic_candidates: usize,

    /// Result count when the caller does not specify one
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Base term of the relation weight
    #[serde(default = "default_relation_base")]
    pub relation_base: f64,

    /// Increment of the relation weight per shared link
    #[serde(default = "default_relation_step")]
    pub relation_step: f64,

    /// Recency tie-break scale inside the trigger tier (score = 1 + ε·recency)
    #[serde(default = "default_trigger_epsilon")]
    pub trigger_epsilon: f64,

    /// Multiplier applied to archived items
    #[serde(default = "default_archive_penalty")]
    pub archive_penalty: f64,

    /// Whether archived items are searchable at all
    #[serde(default = "default_true")]
    pub include_archived: bool,
}

fn default_semantic_candidates() -> usize {
    20
}

fn default_k() -> usize {
    5
}

fn default_relation_base() -> f64 {
    0.5
}

fn default_relation_step() -> f64 {
    0.1
}

fn default_trigger_epsilon() -> f64 {
    0.001
}

fn default_archive_penalty() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            semantic_candidates: default_semantic_candidates(),
            default_k: default_k(),
            relation_base: default_relation_base(),
            relation_step: default_relation_step(),
            trigger_epsilon: default_trigger_epsilon(),
            archive_penalty: default_archive_penalty(),
            include_archived: true,
        }
    }
}

impl ContextConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.semantic_candidates == 0 {
            return Err("semantic_candidates must be greater than 0".to_string());
        }
        if !(self.relation_base > 0.0 && self.relation_base <= 1.0) {
            return Err(format!(
                "relation_base must be in (0.0, 1.0], got {}",
                self.relation_base
            ));
        }
        if self.relation_step < 0.0 {
            return Err("relation_step must not be negative".to_string());
        }
        if !(0.0..1.0).contains(&self.trigger_epsilon) {
            return Err(format!(
                "trigger_epsilon must be in [0.0, 1.0), got {}",
                self.trigger_epsilon
            ));
        }
        if !(self.archive_penalty > 0.0 && self.archive_penalty <= 1.0) {
            return Err(format!(
                "archive_penalty must be in (0.0, 1.0], got {}",
                self.archive_penalty
            ));
        }
        Ok(())
    }
}

/// Decay sweep configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Whether the periodic sweep runs
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Active items below this salience are archived
    #[serde(default = "default_archive_threshold")]
    pub archive_threshold: f64,

    /// Archived items below this salience are deleted after the grace period
    #[serde(default = "default_delete_threshold")]
    pub delete_threshold: f64,

    /// Minimum time an item stays archived before deletion (days)
    #[serde(default = "default_grace_period_days")]
    pub grace_period_days: u32,

    /// Salience bonus when any link target is active
    #[serde(default = "default_bonus")]
    pub link_bonus: f64,

    /// Salience bonus when the item belongs to the active project
    #[serde(default = "default_bonus")]
    pub project_bonus: f64,

    /// Items read from the store per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Cron schedule for the periodic sweep (6-field, with seconds)
    #[serde(default = "default_decay_cron")]
    pub cron_schedule: String,
}

fn default_archive_threshold() -> f64 {
    0.3
}

fn default_delete_threshold() -> f64 {
    0.15
}

fn default_grace_period_days() -> u32 {
    14
}

fn default_bonus() -> f64 {
    0.2
}

fn default_page_size() -> usize {
    100
}

fn default_decay_cron() -> String {
    "0 0 3 * * *".to_string()
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            archive_threshold: default_archive_threshold(),
            delete_threshold: default_delete_threshold(),
            grace_period_days: default_grace_period_days(),
            link_bonus: default_bonus(),
            project_bonus: default_bonus(),
            page_size: default_page_size(),
            cron_schedule: default_decay_cron(),
        }
    }
}

impl DecayConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.delete_threshold > self.archive_threshold {
            return Err(format!(
                "delete_threshold ({}) must not exceed archive_threshold ({})",
                self.delete_threshold, self.archive_threshold
            ));
        }
        if self.page_size == 0 {
            return Err("page_size must be greater than 0".to_string());
        }
        if self.link_bonus < 0.0 || self.project_bonus < 0.0 {
            return Err("bonuses must not be negative".to_string());
        }
        Ok(())
    }

    /// Grace period as a chrono duration.
    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.grace_period_days))
    }
}

/// Sharp-edge detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Whether edge detection runs at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Allow near-miss spellings of single-word intent terms
    #[serde(default = "default_true")]
    pub fuzzy_intent: bool,

    /// Maximum Levenshtein distance for a fuzzy intent match
    #[serde(default = "default_max_edit_distance")]
    pub max_edit_distance: usize,

    /// Terms shorter than this only match exactly
    #[serde(default = "default_min_fuzzy_term_len")]
    pub min_fuzzy_term_len: usize,
}

fn default_max_edit_distance() -> usize {
    1
}

fn default_min_fuzzy_term_len() -> usize {
    5
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fuzzy_intent: true,
            max_edit_distance: default_max_edit_distance(),
            min_fuzzy_term_len: default_min_fuzzy_term_len(),
        }
    }
}

impl EdgeConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !self.fuzzy_intent {
            return Ok(());
        }
        if self.max_edit_distance == 0 {
            return Err(
                "max_edit_distance must be greater than 0 when fuzzy_intent is set".to_string(),
            );
        }
        // A term no longer than the distance would match any short word
        if self.min_fuzzy_term_len <= self.max_edit_distance {
            return Err(format!(
                "min_fuzzy_term_len ({}) must exceed max_edit_distance ({})",
                self.min_fuzzy_term_len, self.max_edit_distance
            ));
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Project considered active by the decay sweep
    #[serde(default)]
    pub active_project: Option<String>,

    #[serde(default)]
    pub weights: WeightConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub decay: DecayConfig,

    #[serde(default)]
    pub edges: EdgeConfig,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "agent-memory")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            active_project: None,
            weights: WeightConfig::default(),
            context: ContextConfig::default(),
            decay: DecayConfig::default(),
            edges: EdgeConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/agent-memory/config.toml)
    /// 3. Explicit config file (optional)
    /// 4. Environment variables (MEMORY_*)
    pub fn load(config_path: Option<&str>) -> Result<Self, MemoryError> {
        let config_dir = ProjectDirs::from("", "", "agent-memory")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // MEMORY_DB_PATH, MEMORY_DECAY__GRACE_PERIOD_DAYS, ...
        builder = builder.add_source(
            Environment::with_prefix("MEMORY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| MemoryError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| MemoryError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), MemoryError> {
        self.weights
            .validate()
            .and_then(|_| self.context.validate())
            .and_then(|_| self.decay.validate())
            .and_then(|_| self.edges.validate())
            .map_err(MemoryError::Config)
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}
