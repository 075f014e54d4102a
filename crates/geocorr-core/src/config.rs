use crate::classify::ConsistencyOrder;
use crate::error::{GeocorrError, Result};
use crate::models::params::{
    ExtrapolationPolicy, PipelineParams, DEFAULT_CHAINAGE_RANGE, DEFAULT_LAB_DEPTH_TOLERANCE,
    DEFAULT_PERPENDICULAR_THRESHOLD, DEFAULT_TANGENT_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CACHE_BUDGET_BYTES: u64 = 64 * 1024 * 1024;

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
    /// Provided via CLI argument
    Cli,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Cli => 3,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Execution settings that do not change results
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Size of the blocking worker pool
    pub workers: usize,
    /// Upper bound on any single parsing or registration task
    pub stage_timeout: Duration,
    /// Directory of the persistent cache tier; `None` keeps the cache in memory only
    pub cache_dir: Option<PathBuf>,
    pub cache_budget_bytes: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
            cache_dir: None,
            cache_budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
        }
    }
}

/// Layered configuration for geocorr
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub tangent_threshold: ConfigValue<f64>,
    pub perpendicular_threshold: ConfigValue<f64>,
    pub chainage_range: ConfigValue<f64>,
    pub lab_depth_tolerance: ConfigValue<f64>,
    pub consistency_order: ConfigValue<Vec<String>>,
    pub extrapolation: ConfigValue<ExtrapolationPolicy>,
    pub velocity_interval: ConfigValue<Option<f64>>,
    pub workers: ConfigValue<usize>,
    pub stage_timeout_secs: ConfigValue<u64>,
    pub cache_dir: ConfigValue<Option<PathBuf>>,
    pub cache_budget_bytes: ConfigValue<u64>,
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        Self {
            tangent_threshold: ConfigValue::new(DEFAULT_TANGENT_THRESHOLD, ConfigSource::Default),
            perpendicular_threshold: ConfigValue::new(
                DEFAULT_PERPENDICULAR_THRESHOLD,
                ConfigSource::Default,
            ),
            chainage_range: ConfigValue::new(DEFAULT_CHAINAGE_RANGE, ConfigSource::Default),
            lab_depth_tolerance: ConfigValue::new(DEFAULT_LAB_DEPTH_TOLERANCE, ConfigSource::Default),
            consistency_order: ConfigValue::new(Vec::new(), ConfigSource::Default),
            extrapolation: ConfigValue::new(ExtrapolationPolicy::Include, ConfigSource::Default),
            velocity_interval: ConfigValue::new(None, ConfigSource::Default),
            workers: ConfigValue::new(DEFAULT_WORKERS, ConfigSource::Default),
            stage_timeout_secs: ConfigValue::new(DEFAULT_STAGE_TIMEOUT_SECS, ConfigSource::Default),
            cache_dir: ConfigValue::new(None, ConfigSource::Default),
            cache_budget_bytes: ConfigValue::new(DEFAULT_CACHE_BUDGET_BYTES, ConfigSource::Default),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| GeocorrError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| GeocorrError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        if let Some(v) = file_config.tangent_threshold {
            self.tangent_threshold.update(v, ConfigSource::File);
        }
        if let Some(v) = file_config.perpendicular_threshold {
            self.perpendicular_threshold.update(v, ConfigSource::File);
        }
        if let Some(v) = file_config.chainage_range {
            self.chainage_range.update(v, ConfigSource::File);
        }
        if let Some(v) = file_config.lab_depth_tolerance {
            self.lab_depth_tolerance.update(v, ConfigSource::File);
        }
        if let Some(v) = file_config.consistency_order {
            self.consistency_order.update(v, ConfigSource::File);
        }
        if let Some(v) = file_config.extrapolation {
            self.extrapolation.update(v, ConfigSource::File);
        }
        if let Some(v) = file_config.velocity_interval {
            self.velocity_interval.update(Some(v), ConfigSource::File);
        }
        if let Some(v) = file_config.workers {
            self.workers.update(v, ConfigSource::File);
        }
        if let Some(v) = file_config.stage_timeout_secs {
            self.stage_timeout_secs.update(v, ConfigSource::File);
        }
        if let Some(v) = file_config.cache_dir {
            self.cache_dir.update(Some(v), ConfigSource::File);
        }
        if let Some(v) = file_config.cache_budget_bytes {
            self.cache_budget_bytes.update(v, ConfigSource::File);
        }

        Ok(self)
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        if let Some(v) = env_number("GEOCORR_TANGENT_THRESHOLD") {
            self.tangent_threshold.update(v, ConfigSource::Environment);
        }
        if let Some(v) = env_number("GEOCORR_PERPENDICULAR_THRESHOLD") {
            self.perpendicular_threshold.update(v, ConfigSource::Environment);
        }
        if let Some(v) = env_number("GEOCORR_CHAINAGE_RANGE") {
            self.chainage_range.update(v, ConfigSource::Environment);
        }
        if let Some(v) = env_number("GEOCORR_LAB_DEPTH_TOLERANCE") {
            self.lab_depth_tolerance.update(v, ConfigSource::Environment);
        }

        // GEOCORR_CONSISTENCY_ORDER is a comma separated list
        if let Ok(order) = env::var("GEOCORR_CONSISTENCY_ORDER") {
            self.consistency_order.update(parse_label_list(&order), ConfigSource::Environment);
        }

        if let Ok(policy) = env::var("GEOCORR_EXTRAPOLATION") {
            match parse_extrapolation_policy(&policy) {
                Ok(policy) => self.extrapolation.update(policy, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid GEOCORR_EXTRAPOLATION value '{}': expected include, exclude, or downweight:<weight>",
                    policy
                ),
            }
        }

        if let Some(v) = env_number("GEOCORR_VELOCITY_INTERVAL") {
            self.velocity_interval.update(Some(v), ConfigSource::Environment);
        }
        if let Some(v) = env_number("GEOCORR_WORKERS") {
            self.workers.update(v, ConfigSource::Environment);
        }
        if let Some(v) = env_number("GEOCORR_STAGE_TIMEOUT_SECS") {
            self.stage_timeout_secs.update(v, ConfigSource::Environment);
        }
        if let Ok(dir) = env::var("GEOCORR_CACHE_DIR") {
            self.cache_dir.update(Some(PathBuf::from(dir)), ConfigSource::Environment);
        }
        if let Some(v) = env_number("GEOCORR_CACHE_BUDGET_BYTES") {
            self.cache_budget_bytes.update(v, ConfigSource::Environment);
        }

        self
    }

    /// Update configuration from CLI arguments
    pub fn update_from_cli(&mut self, overrides: CliConfigOverrides) {
        if let Some(v) = overrides.tangent_threshold {
            self.tangent_threshold.update(v, ConfigSource::Cli);
        }
        if let Some(v) = overrides.perpendicular_threshold {
            self.perpendicular_threshold.update(v, ConfigSource::Cli);
        }
        if let Some(v) = overrides.chainage_range {
            self.chainage_range.update(v, ConfigSource::Cli);
        }
        if let Some(v) = overrides.lab_depth_tolerance {
            self.lab_depth_tolerance.update(v, ConfigSource::Cli);
        }
        if let Some(v) = overrides.consistency_order {
            self.consistency_order.update(v, ConfigSource::Cli);
        }
        if let Some(v) = overrides.extrapolation {
            self.extrapolation.update(v, ConfigSource::Cli);
        }
        if let Some(v) = overrides.velocity_interval {
            self.velocity_interval.update(Some(v), ConfigSource::Cli);
        }
        if let Some(v) = overrides.workers {
            self.workers.update(v, ConfigSource::Cli);
        }
        if let Some(v) = overrides.cache_dir {
            self.cache_dir.update(Some(v), ConfigSource::Cli);
        }
    }

    /// Validated pipeline parameters
    pub fn params(&self) -> Result<PipelineParams> {
        let consistency_order = if self.consistency_order.value.is_empty() {
            ConsistencyOrder::default()
        } else {
            ConsistencyOrder::with_override(&self.consistency_order.value)?
        };

        let params = PipelineParams {
            tangent_threshold: self.tangent_threshold.value,
            perpendicular_threshold: self.perpendicular_threshold.value,
            chainage_range: self.chainage_range.value,
            lab_depth_tolerance: self.lab_depth_tolerance.value,
            extrapolation: self.extrapolation.value,
            consistency_order,
            velocity_interval: self.velocity_interval.value,
        };
        params.validate()?;
        Ok(params)
    }

    /// Validated execution settings
    pub fn settings(&self) -> Result<PipelineSettings> {
        if self.workers.value == 0 {
            return Err(GeocorrError::ConfigInvalid {
                key: "workers".to_string(),
                reason: "at least one worker is required".to_string(),
            });
        }
        if self.stage_timeout_secs.value == 0 {
            return Err(GeocorrError::ConfigInvalid {
                key: "stage_timeout_secs".to_string(),
                reason: "timeout must be at least one second".to_string(),
            });
        }

        Ok(PipelineSettings {
            workers: self.workers.value,
            stage_timeout: Duration::from_secs(self.stage_timeout_secs.value),
            cache_dir: self.cache_dir.value.clone(),
            cache_budget_bytes: self.cache_budget_bytes.value,
        })
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        let mut map = HashMap::new();

        map.insert(
            "tangent_threshold".to_string(),
            (self.tangent_threshold.value.to_string(), self.tangent_threshold.source),
        );
        map.insert(
            "perpendicular_threshold".to_string(),
            (self.perpendicular_threshold.value.to_string(), self.perpendicular_threshold.source),
        );
        map.insert(
            "chainage_range".to_string(),
            (self.chainage_range.value.to_string(), self.chainage_range.source),
        );
        map.insert(
            "lab_depth_tolerance".to_string(),
            (self.lab_depth_tolerance.value.to_string(), self.lab_depth_tolerance.source),
        );

        let order = if self.consistency_order.value.is_empty() {
            "default".to_string()
        } else {
            self.consistency_order.value.join(",")
        };
        map.insert("consistency_order".to_string(), (order, self.consistency_order.source));

        map.insert(
            "extrapolation".to_string(),
            (format!("{:?}", self.extrapolation.value), self.extrapolation.source),
        );
        map.insert(
            "velocity_interval".to_string(),
            (
                self.velocity_interval.value.map(|v| v.to_string()).unwrap_or_else(|| "none".into()),
                self.velocity_interval.source,
            ),
        );
        map.insert("workers".to_string(), (self.workers.value.to_string(), self.workers.source));
        map.insert(
            "stage_timeout_secs".to_string(),
            (self.stage_timeout_secs.value.to_string(), self.stage_timeout_secs.source),
        );
        map.insert(
            "cache_dir".to_string(),
            (
                self.cache_dir
                    .value
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "memory only".into()),
                self.cache_dir.source,
            ),
        );
        map.insert(
            "cache_budget_bytes".to_string(),
            (self.cache_budget_bytes.value.to_string(), self.cache_budget_bytes.source),
        );

        map
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    tangent_threshold: Option<f64>,
    perpendicular_threshold: Option<f64>,
    chainage_range: Option<f64>,
    lab_depth_tolerance: Option<f64>,
    consistency_order: Option<Vec<String>>,
    extrapolation: Option<ExtrapolationPolicy>,
    velocity_interval: Option<f64>,
    workers: Option<usize>,
    stage_timeout_secs: Option<u64>,
    cache_dir: Option<PathBuf>,
    cache_budget_bytes: Option<u64>,
}

/// CLI configuration overrides
#[derive(Debug, Default)]
pub struct CliConfigOverrides {
    pub tangent_threshold: Option<f64>,
    pub perpendicular_threshold: Option<f64>,
    pub chainage_range: Option<f64>,
    pub lab_depth_tolerance: Option<f64>,
    pub consistency_order: Option<Vec<String>>,
    pub extrapolation: Option<ExtrapolationPolicy>,
    pub velocity_interval: Option<f64>,
    pub workers: Option<usize>,
    pub cache_dir: Option<PathBuf>,
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {} value '{}': expected a number", key, raw);
            None
        }
    }
}

/// Split a comma separated list of consistency labels
pub fn parse_label_list(s: &str) -> Vec<String> {
    s.split(',').map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect()
}

/// Parse an extrapolation policy: `include`, `exclude` or `downweight:<weight>`
pub fn parse_extrapolation_policy(s: &str) -> Result<ExtrapolationPolicy> {
    let lowered = s.trim().to_lowercase();
    match lowered.as_str() {
        "include" => Ok(ExtrapolationPolicy::Include),
        "exclude" => Ok(ExtrapolationPolicy::Exclude),
        other => {
            let weight = other
                .strip_prefix("downweight:")
                .and_then(|w| w.trim().parse::<f64>().ok())
                .ok_or_else(|| GeocorrError::ConfigInvalid {
                    key: "extrapolation".to_string(),
                    reason: format!(
                        "Invalid extrapolation policy: {}. Use include, exclude, or downweight:<weight>",
                        s
                    ),
                })?;
            Ok(ExtrapolationPolicy::Downweight { weight })
        }
    }
}
