//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: AAMI_)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/aami/{service_name}/config.toml
//! 4. System directory: /etc/aami/{service_name}/config.toml
//! 5. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Middleware configuration
    #[serde(default)]
    pub middleware: MiddlewareConfig,

    /// Database configuration
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// Rule-file manager configuration
    #[serde(default)]
    pub rule_files: RuleFileConfig,

    /// Metrics-engine client configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Job core configuration
    #[serde(default)]
    pub jobs: JobConfig,

    /// Fleet-wide defaults (staleness window, etc.)
    #[serde(default)]
    pub fleet: FleetConfig,

    /// OpenTelemetry configuration (optional)
    #[serde(default)]
    pub otlp: Option<OtlpConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum idle connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Maximum retry attempts for establishing database connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Whether database is optional (service can start without it)
    #[serde(default = "default_false")]
    pub optional: bool,

    /// Whether to initialize connection lazily (in background)
    #[serde(default = "default_lazy_init")]
    pub lazy_init: bool,
}

/// Rule-file manager configuration (§4.3)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFileConfig {
    /// Base directory rule files are written to
    #[serde(default = "default_rules_path")]
    pub base_path: PathBuf,

    /// Backup directory; defaults to `<base_path>/.backup`
    #[serde(default)]
    pub backup_path: Option<PathBuf>,

    /// Whether external validation is attempted
    #[serde(default = "default_false")]
    pub enable_validation: bool,

    /// Whether backups are written before overwrite/delete
    #[serde(default = "default_true")]
    pub enable_backup: bool,

    /// Path to the validator binary (e.g. `promtool`)
    #[serde(default = "default_validator_path")]
    pub validator_path: PathBuf,

    /// Timeout for a single validator invocation, in seconds
    #[serde(default = "default_validator_timeout")]
    pub validator_timeout_secs: u64,
}

impl Default for RuleFileConfig {
    fn default() -> Self {
        Self {
            base_path: default_rules_path(),
            backup_path: None,
            enable_validation: false,
            enable_backup: true,
            validator_path: default_validator_path(),
            validator_timeout_secs: default_validator_timeout(),
        }
    }
}

impl RuleFileConfig {
    /// Resolve the effective backup directory.
    pub fn backup_dir(&self) -> PathBuf {
        self.backup_path
            .clone()
            .unwrap_or_else(|| self.base_path.join(".backup"))
    }

    pub fn validator_timeout(&self) -> Duration {
        Duration::from_secs(self.validator_timeout_secs)
    }
}

/// Metrics-engine (Prometheus-compatible) client configuration (§4.4)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the metrics engine
    #[serde(default = "default_engine_url")]
    pub url: String,

    /// Whether the reload-on-regenerate flow is enabled
    #[serde(default = "default_true")]
    pub reload_enabled: bool,

    /// Timeout per HTTP attempt, in seconds
    #[serde(default = "default_reload_timeout")]
    pub reload_timeout_secs: u64,

    /// Maximum retry attempts for `Reload`
    #[serde(default = "default_engine_max_attempts")]
    pub max_attempts: usize,

    /// Initial backoff delay, in milliseconds
    #[serde(default = "default_engine_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Backoff multiplier applied between attempts
    #[serde(default = "default_engine_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            reload_enabled: true,
            reload_timeout_secs: default_reload_timeout(),
            max_attempts: default_engine_max_attempts(),
            initial_delay_ms: default_engine_initial_delay_ms(),
            backoff_multiplier: default_engine_backoff_multiplier(),
        }
    }
}

impl EngineConfig {
    pub fn reload_timeout(&self) -> Duration {
        Duration::from_secs(self.reload_timeout_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

/// Job core configuration (§4.6)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Bounded submission queue size
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Long-lived worker count
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// How often the reaper ticks, in seconds
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,

    /// How long a terminal job is retained before reaping, in seconds
    #[serde(default = "default_job_ttl")]
    pub job_ttl_secs: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
            max_workers: default_max_workers(),
            reap_interval_secs: default_reap_interval(),
            job_ttl_secs: default_job_ttl(),
        }
    }
}

impl JobConfig {
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }
}

/// Fleet-wide defaults not tied to a single subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// A target is healthy iff `last_seen` is within this window, in seconds.
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: i64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            staleness_secs: default_staleness_secs(),
        }
    }
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpConfig {
    /// OTLP endpoint URL
    pub endpoint: String,

    /// Service name for tracing
    #[serde(default)]
    pub service_name: Option<String>,

    /// Enable tracing
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Middleware configuration (all optional, feature-gated)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Resilience configuration (circuit breaker, retry, bulkhead)
    #[serde(default)]
    pub resilience: Option<ResilienceConfig>,

    /// Request body size limit in MB
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,

    /// Enable panic recovery middleware
    #[serde(default = "default_true")]
    pub catch_panic: bool,

    /// Enable compression
    #[serde(default = "default_true")]
    pub compression: bool,

    /// CORS configuration
    #[serde(default = "default_cors_mode")]
    pub cors_mode: String,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            resilience: None,
            body_limit_mb: default_body_limit_mb(),
            catch_panic: true,
            compression: true,
            cors_mode: default_cors_mode(),
        }
    }
}

/// Resilience configuration (circuit breaker, retry, bulkhead)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_true")]
    pub circuit_breaker_enabled: bool,
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: f64,
    #[serde(default = "default_circuit_breaker_min_requests")]
    pub circuit_breaker_min_requests: u64,
    #[serde(default = "default_circuit_breaker_wait_secs")]
    pub circuit_breaker_wait_secs: u64,
}

impl ResilienceConfig {
    pub fn circuit_breaker_wait_duration(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_wait_secs)
    }
}

// Default value functions

fn default_service_name() -> String {
    "aami-server".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_max_connections() -> u32 {
    50
}

fn default_min_connections() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2
}

fn default_lazy_init() -> bool {
    true
}

fn default_rules_path() -> PathBuf {
    PathBuf::from("/etc/prometheus/rules/generated")
}

fn default_validator_path() -> PathBuf {
    PathBuf::from("promtool")
}

fn default_validator_timeout() -> u64 {
    30
}

fn default_engine_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_reload_timeout() -> u64 {
    30
}

fn default_engine_max_attempts() -> usize {
    3
}

fn default_engine_initial_delay_ms() -> u64 {
    1000
}

fn default_engine_backoff_multiplier() -> f64 {
    2.0
}

fn default_queue_size() -> usize {
    100
}

fn default_max_workers() -> usize {
    5
}

fn default_reap_interval() -> u64 {
    300
}

fn default_job_ttl() -> u64 {
    3600
}

fn default_staleness_secs() -> i64 {
    300
}

fn default_body_limit_mb() -> usize {
    10
}

fn default_cors_mode() -> String {
    "permissive".to_string()
}

fn default_circuit_breaker_threshold() -> f64 {
    0.5
}

fn default_circuit_breaker_min_requests() -> u64 {
    10
}

fn default_circuit_breaker_wait_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Searches for config files in this order (first found is used):
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/aami/{service_name}/config.toml
    /// 3. System directory: /etc/aami/{service_name}/config.toml
    ///
    /// Environment variables (AAMI_ prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "aami-server".to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("AAMI_").split("_"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file, bypassing XDG directories.
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("AAMI_").split("_"))
            .extract()?;

        Ok(config)
    }

    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        paths.push(PathBuf::from("config.toml"));

        let xdg_dirs = xdg::BaseDirectories::with_prefix("aami");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Ok(path) = xdg_dirs.place_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(PathBuf::from("/etc/aami").join(service_name).join("config.toml"));

        paths
    }

    /// Get database URL
    pub fn database_url(&self) -> Option<&str> {
        self.database.as_ref().map(|db| db.url.as_str())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: default_service_name(),
                port: default_port(),
                log_level: default_log_level(),
                timeout_secs: default_timeout(),
                environment: default_environment(),
            },
            middleware: MiddlewareConfig::default(),
            database: None,
            rule_files: RuleFileConfig::default(),
            engine: EngineConfig::default(),
            jobs: JobConfig::default(),
            fleet: FleetConfig::default(),
            otlp: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.port, 8080);
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.jobs.max_workers, 5);
        assert_eq!(config.jobs.queue_size, 100);
        assert!(!config.rule_files.enable_validation);
        assert!(config.rule_files.enable_backup);
    }

    #[test]
    fn test_rule_file_backup_dir_default() {
        let cfg = RuleFileConfig::default();
        assert_eq!(cfg.backup_dir(), cfg.base_path.join(".backup"));
    }

    #[test]
    fn test_engine_config_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.initial_delay().as_secs(), 1);
        assert_eq!(cfg.backoff_multiplier, 2.0);
    }
}
