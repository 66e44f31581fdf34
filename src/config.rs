//! Pipeline configuration: environment defaults with CLI-flag overrides
//! layered on top.

use std::env;

/// Errors validating a fully-assembled configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cqi weights must sum to 1.0 for the active component set, got {0}")]
    WeightsDoNotSumToOne(f64),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub max_chunk_lines: u32,
    pub bundle_max_lines: u32,
    pub bundle_window_min: i64,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_lines: 500,
            bundle_max_lines: 30,
            bundle_window_min: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CqiWeightsConfig {
    pub effort: f64,
    pub loc: f64,
    pub temporal: f64,
    pub ownership: f64,
    pub pair_programming: f64,
}

impl Default for CqiWeightsConfig {
    fn default() -> Self {
        Self {
            effort: 0.40,
            loc: 0.25,
            temporal: 0.20,
            ownership: 0.15,
            pair_programming: 0.10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ai_enabled: bool,
    pub ai_model: String,
    pub ai_base_url: String,
    pub ai_timeout_sec: u64,
    pub ai_workers: usize,
    pub orchestrator_workers: usize,
    pub cqi_weights: CqiWeightsConfig,
    pub cqi_penalties_enabled: bool,
    pub chunker: ChunkerConfig,
    pub prefilter_generated_file_patterns: Vec<String>,
    pub prefilter_trivial_message_patterns: Vec<String>,
    pub git_cache_dir: String,
    pub attendance_sessions_to_keep: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai_enabled: true,
            ai_model: "gpt-4o-mini".to_string(),
            ai_base_url: "https://api.openai.com/v1".to_string(),
            ai_timeout_sec: 60,
            ai_workers: 4,
            orchestrator_workers: 4,
            cqi_weights: CqiWeightsConfig::default(),
            cqi_penalties_enabled: false,
            chunker: ChunkerConfig::default(),
            prefilter_generated_file_patterns: crate::prefilter::default_generated_patterns(),
            prefilter_trivial_message_patterns: Vec::new(),
            git_cache_dir: "./.cqi-cache".to_string(),
            attendance_sessions_to_keep: 3,
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Read `CQI_*`-prefixed environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            ai_enabled: env_bool("CQI_AI_ENABLED", defaults.ai_enabled),
            ai_model: env_string("CQI_AI_MODEL", &defaults.ai_model),
            ai_base_url: env_string("CQI_AI_BASE_URL", &defaults.ai_base_url),
            ai_timeout_sec: env_u64("CQI_AI_TIMEOUT_SEC", defaults.ai_timeout_sec),
            ai_workers: env_usize("CQI_AI_WORKERS", defaults.ai_workers),
            orchestrator_workers: env_usize(
                "CQI_ORCHESTRATOR_WORKERS",
                defaults.orchestrator_workers,
            ),
            cqi_weights: CqiWeightsConfig {
                effort: env_f64("CQI_WEIGHTS_EFFORT", defaults.cqi_weights.effort),
                loc: env_f64("CQI_WEIGHTS_LOC", defaults.cqi_weights.loc),
                temporal: env_f64("CQI_WEIGHTS_TEMPORAL", defaults.cqi_weights.temporal),
                ownership: env_f64("CQI_WEIGHTS_OWNERSHIP", defaults.cqi_weights.ownership),
                pair_programming: env_f64(
                    "CQI_WEIGHTS_PAIR_PROGRAMMING",
                    defaults.cqi_weights.pair_programming,
                ),
            },
            cqi_penalties_enabled: env_bool(
                "CQI_PENALTIES_ENABLED",
                defaults.cqi_penalties_enabled,
            ),
            chunker: ChunkerConfig {
                max_chunk_lines: env_u32(
                    "CQI_CHUNKER_MAX_CHUNK_LINES",
                    defaults.chunker.max_chunk_lines,
                ),
                bundle_max_lines: env_u32(
                    "CQI_CHUNKER_BUNDLE_MAX_LINES",
                    defaults.chunker.bundle_max_lines,
                ),
                bundle_window_min: env_u64(
                    "CQI_CHUNKER_BUNDLE_WINDOW_MIN",
                    defaults.chunker.bundle_window_min as u64,
                ) as i64,
            },
            prefilter_generated_file_patterns: defaults.prefilter_generated_file_patterns,
            prefilter_trivial_message_patterns: defaults.prefilter_trivial_message_patterns,
            git_cache_dir: env_string("CQI_GIT_CACHE_DIR", &defaults.git_cache_dir),
            attendance_sessions_to_keep: env_u32(
                "CQI_ATTENDANCE_SESSIONS_TO_KEEP",
                defaults.attendance_sessions_to_keep,
            ),
        }
    }

    /// Apply CLI-provided values over whatever `from_env` produced; `None`
    /// leaves the existing value untouched. CLI always wins over environment.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        ai_enabled: Option<bool>,
        ai_model: Option<String>,
        ai_base_url: Option<String>,
        orchestrator_workers: Option<usize>,
        ai_workers: Option<usize>,
        cqi_penalties_enabled: Option<bool>,
    ) -> Self {
        if let Some(v) = ai_enabled {
            self.ai_enabled = v;
        }
        if let Some(v) = ai_model {
            self.ai_model = v;
        }
        if let Some(v) = ai_base_url {
            self.ai_base_url = v;
        }
        if let Some(v) = orchestrator_workers {
            self.orchestrator_workers = v;
        }
        if let Some(v) = ai_workers {
            self.ai_workers = v;
        }
        if let Some(v) = cqi_penalties_enabled {
            self.cqi_penalties_enabled = v;
        }
        self
    }

    /// Checks the active weight set sums to 1.0 within tolerance. Pair
    /// programming's weight only participates when a team has size 2, so it
    /// is validated separately from the four-weight core set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let core_sum = self.cqi_weights.effort
            + self.cqi_weights.loc
            + self.cqi_weights.temporal
            + self.cqi_weights.ownership;
        if (core_sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::WeightsDoNotSumToOne(core_sum));
        }
        if self.orchestrator_workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "orchestrator.workers".to_string(),
                value: "0".to_string(),
            });
        }
        if self.ai_workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ai.workers".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn bad_weights_rejected() {
        let mut config = Config::default();
        config.cqi_weights.effort = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overrides_take_precedence() {
        let config = Config::default().with_overrides(Some(false), None, None, Some(8), None, None);
        assert!(!config.ai_enabled);
        assert_eq!(config.orchestrator_workers, 8);
    }
}
