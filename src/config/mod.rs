// src/config/mod.rs

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Hard upper bound on research depth, enforced regardless of caller input.
pub const MAX_DEPTH_CAP: u32 = 7;

/// Hard upper bound on session wall-clock time, enforced regardless of caller input.
pub const TIME_LIMIT_CAP: Duration = Duration::from_secs(270);

/// Lower bound on the configurable time limit.
pub const TIME_LIMIT_FLOOR: Duration = Duration::from_secs(1);

/// Maximum accepted query length in characters.
pub const MAX_QUERY_CHARS: usize = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct DelveConfig {
    // ── Research Loop Configuration
    pub default_max_depth: u32,
    pub default_time_limit_secs: u64,
    pub extract_top_k: usize,
    pub planner_max_retries: u32,

    // ── Provider Timeouts (in seconds)
    pub search_timeout_secs: u64,
    pub extract_timeout_secs: u64,
    pub reasoning_timeout_secs: u64,

    // ── Search Provider Configuration
    pub search_max_results: usize,
    pub tavily_base_url: String,
    pub tavily_api_key: String,

    // ── Reasoning Engine Configuration
    pub openai_base_url: String,
    pub openai_api_key: String,
    pub model: String,
    pub max_output_tokens: usize,

    // ── Event Stream Settings
    pub event_queue_capacity: usize,

    // ── Logging Configuration
    pub log_level: String,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            // Trim whitespace and strip inline comments before parsing
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

impl DelveConfig {
    pub fn from_env() -> Self {
        // Load from .env file first if it exists
        dotenvy::dotenv().ok();

        Self {
            default_max_depth: env_var_or("DELVE_MAX_DEPTH", 7),
            default_time_limit_secs: env_var_or("DELVE_TIME_LIMIT_SECS", 270),
            extract_top_k: env_var_or("DELVE_EXTRACT_TOP_K", 3),
            planner_max_retries: env_var_or("DELVE_PLANNER_MAX_RETRIES", 2),
            search_timeout_secs: env_var_or("DELVE_SEARCH_TIMEOUT", 20),
            extract_timeout_secs: env_var_or("DELVE_EXTRACT_TIMEOUT", 15),
            reasoning_timeout_secs: env_var_or("DELVE_REASONING_TIMEOUT", 60),
            search_max_results: env_var_or("DELVE_SEARCH_MAX_RESULTS", 5),
            tavily_base_url: env_var_or("TAVILY_BASE_URL", "https://api.tavily.com".to_string()),
            tavily_api_key: env_var_or("TAVILY_API_KEY", String::new()),
            openai_base_url: env_var_or("OPENAI_BASE_URL", "https://api.openai.com".to_string()),
            openai_api_key: env_var_or("OPENAI_API_KEY", String::new()),
            model: env_var_or("DELVE_MODEL", "gpt-4o-mini".to_string()),
            max_output_tokens: env_var_or("DELVE_MAX_OUTPUT_TOKENS", 4096),
            event_queue_capacity: env_var_or("DELVE_EVENT_QUEUE_CAPACITY", 64),
            log_level: env_var_or("DELVE_LOG_LEVEL", "info".to_string()),
        }
    }

    // --- Convenience Methods for Common Operations ---

    /// Default time limit as a Duration, clamped to the hard caps
    pub fn default_time_limit(&self) -> Duration {
        Duration::from_secs(self.default_time_limit_secs).clamp(TIME_LIMIT_FLOOR, TIME_LIMIT_CAP)
    }

    /// Default max depth, clamped to the hard cap
    pub fn default_max_depth(&self) -> u32 {
        self.default_max_depth.clamp(1, MAX_DEPTH_CAP)
    }

    /// Per-call timeout for search provider requests
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    /// Per-call timeout for extraction provider requests
    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    /// Per-call timeout for reasoning engine requests
    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_secs(self.reasoning_timeout_secs)
    }
}

// Global config instance - loaded once at startup
pub static CONFIG: Lazy<DelveConfig> = Lazy::new(DelveConfig::from_env);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DelveConfig::from_env();

        assert!(config.default_max_depth() >= 1);
        assert!(config.default_max_depth() <= MAX_DEPTH_CAP);
        assert!(config.extract_top_k > 0);
    }

    #[test]
    fn test_time_limit_clamped() {
        let mut config = DelveConfig::from_env();
        config.default_time_limit_secs = 10_000;
        assert_eq!(config.default_time_limit(), TIME_LIMIT_CAP);

        config.default_time_limit_secs = 0;
        assert_eq!(config.default_time_limit(), TIME_LIMIT_FLOOR);
    }

    #[test]
    fn test_timeouts_are_nonzero() {
        let config = DelveConfig::from_env();
        assert!(config.search_timeout() > Duration::ZERO);
        assert!(config.extract_timeout() > Duration::ZERO);
        assert!(config.reasoning_timeout() > Duration::ZERO);
    }
}
