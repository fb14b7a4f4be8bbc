//! Runtime configuration
//!
//! Every option is a command-line flag with an environment fallback. The
//! loops and the job manager receive their own config structs rather than
//! reading settings directly.

use clap::builder::BoolishValueParser;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::providers::openrouter::{DEFAULT_BASE_URL, DEFAULT_MODEL, MAX_CANDIDATES};

#[derive(Debug, Clone, Parser)]
#[command(name = "clockchain")]
#[command(about = "Spatiotemporal graph of historical moments over JSON-RPC stdio")]
#[command(version)]
pub struct Settings {
    /// Directory holding the RocksDB store
    #[arg(long, env = "CLOCKCHAIN_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// JSON seed loaded into an empty store on startup
    #[arg(long, env = "CLOCKCHAIN_SEED_FILE")]
    pub seed_file: Option<PathBuf>,

    /// Base URL of the scene-rendering service
    #[arg(long, env = "FLASH_URL")]
    pub flash_url: Option<String>,

    #[arg(long, env = "FLASH_SERVICE_KEY", hide_env_values = true)]
    pub flash_service_key: Option<String>,

    /// Shared secret for bulk generation; bulk generation is refused when unset
    #[arg(long, env = "ADMIN_KEY", hide_env_values = true)]
    pub admin_key: Option<String>,

    /// Key for growth suggestions and moderation
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub openrouter_api_key: Option<String>,

    #[arg(long, env = "OPENROUTER_MODEL", default_value = DEFAULT_MODEL)]
    pub openrouter_model: String,

    #[arg(long, env = "OPENROUTER_URL", default_value = DEFAULT_BASE_URL)]
    pub openrouter_url: String,

    /// Run the frontier expansion loop
    #[arg(long, env = "EXPANSION_ENABLED", value_parser = BoolishValueParser::new())]
    pub expansion_enabled: bool,

    #[arg(long, env = "EXPANSION_INTERVAL_SECS", default_value_t = 300)]
    pub expansion_interval_secs: u64,

    /// Run the today-in-history render loop
    #[arg(long, env = "DAILY_CRON_ENABLED", value_parser = BoolishValueParser::new())]
    pub daily_enabled: bool,

    #[arg(long, env = "DAILY_INTERVAL_SECS", default_value_t = 86_400)]
    pub daily_interval_secs: u64,

    /// Timeout for every provider call
    #[arg(long, env = "PROVIDER_TIMEOUT_SECS", default_value_t = 180)]
    pub provider_timeout_secs: u64,

    #[arg(long, env = "MAX_CONCURRENT_JOBS", default_value_t = 4)]
    pub max_concurrent_jobs: usize,

    /// Verbose logging
    #[arg(long, env = "DEBUG", value_parser = BoolishValueParser::new())]
    pub debug: bool,
}

impl Settings {
    pub fn expansion(&self) -> ExpansionConfig {
        ExpansionConfig {
            enabled: self.expansion_enabled,
            interval: Duration::from_secs(self.expansion_interval_secs),
            ..Default::default()
        }
    }

    pub fn daily(&self) -> DailyConfig {
        DailyConfig {
            enabled: self.daily_enabled,
            interval: Duration::from_secs(self.daily_interval_secs),
            ..Default::default()
        }
    }

    pub fn jobs(&self) -> JobConfig {
        JobConfig {
            max_concurrent: self.max_concurrent_jobs.max(1),
            provider_timeout: self.provider_timeout(),
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Default tracing filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "clockchain_server=debug,clockchain_graph=debug"
        } else {
            "clockchain_server=info,clockchain_graph=info"
        }
    }
}

/// Frontier expansion loop settings
#[derive(Debug, Clone)]
pub struct ExpansionConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Nodes with fewer edges than this are frontier
    pub frontier_threshold: usize,
    pub max_candidates: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(300),
            frontier_threshold: 3,
            max_candidates: MAX_CANDIDATES,
        }
    }
}

/// Today-in-history loop settings
#[derive(Debug, Clone)]
pub struct DailyConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Jobs submitted per cycle
    pub cap: usize,
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(86_400),
            cap: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobConfig {
    pub max_concurrent: usize,
    pub provider_timeout: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            provider_timeout: Duration::from_secs(180),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::try_parse_from(["clockchain"]).unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("./data"));
        assert_eq!(settings.openrouter_model, "google/gemini-2.0-flash-001");
        assert_eq!(settings.expansion().interval, Duration::from_secs(300));
        assert_eq!(settings.expansion().frontier_threshold, 3);
        assert_eq!(settings.daily().interval, Duration::from_secs(86_400));
        assert_eq!(settings.daily().cap, 5);
        assert_eq!(settings.jobs().max_concurrent, 4);
        assert_eq!(settings.jobs().provider_timeout, Duration::from_secs(180));
    }

    #[test]
    fn test_flags() {
        let settings = Settings::try_parse_from([
            "clockchain",
            "--data-dir",
            "/tmp/cc",
            "--expansion-enabled",
            "--expansion-interval-secs",
            "60",
            "--max-concurrent-jobs",
            "0",
            "--debug",
        ])
        .unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/cc"));
        assert!(settings.expansion().enabled);
        assert!(!settings.daily().enabled);
        assert_eq!(settings.expansion().interval, Duration::from_secs(60));
        assert_eq!(settings.jobs().max_concurrent, 1);
        assert!(settings.log_filter().contains("debug"));
    }

    #[test]
    fn test_switches_accept_numeric_env_values() {
        std::env::set_var("EXPANSION_ENABLED", "1");
        let on = Settings::try_parse_from(["clockchain"]);
        std::env::set_var("EXPANSION_ENABLED", "off");
        let off = Settings::try_parse_from(["clockchain"]);
        std::env::remove_var("EXPANSION_ENABLED");

        assert!(on.unwrap().expansion().enabled);
        assert!(!off.unwrap().expansion().enabled);
    }

    #[test]
    fn test_switch_flags_still_work_without_value() {
        let settings =
            Settings::try_parse_from(["clockchain", "--daily-enabled", "--debug"]).unwrap();
        assert!(settings.daily().enabled);
        assert!(settings.debug);
    }
}
