use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Placeholder written into generated configs; never a usable key.
pub const API_KEY_PLACEHOLDER: &str = "REPLACE_WITH_YOUR_LIDARR_API_KEY";

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub lidarr: LidarrConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub manual: ManualConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Config {
    /// Resolve relative file paths against `base_dir` (the config file's directory).
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                let stripped = path.strip_prefix("./").unwrap_or(path).to_path_buf();
                *path = base_dir.join(stripped);
            }
        };

        resolve(&mut self.ledger.artists_csv_path);
        resolve(&mut self.ledger.release_groups_csv_path);
        resolve(&mut self.ledger.db_path);
        resolve(&mut self.manual.entries_file);
        if let Some(dir) = self.monitoring.results_dir.as_mut() {
            resolve(dir);
        }
        if let Some(file) = self.monitoring.metrics_textfile.as_mut() {
            resolve(file);
        }
    }
}

/// Upstream inventory (Lidarr) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LidarrConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    /// Request timeout in seconds (large libraries need more)
    #[serde(default = "default_lidarr_timeout")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_lidarr_timeout() -> u64 {
    60
}

/// Probed target API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    #[serde(default = "default_target_base_url")]
    pub target_base_url: String,
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_delay_ms")]
    pub delay_between_attempts_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_second: f64,
    #[serde(default = "default_artist_attempts")]
    pub max_attempts_per_artist: u32,
    #[serde(default = "default_artist_attempts")]
    pub max_attempts_per_artist_textsearch: u32,
    #[serde(default = "default_rg_attempts")]
    pub max_attempts_per_rg: u32,
    /// Consecutive failures that abort a phase (0 = disabled)
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
}

fn default_target_base_url() -> String {
    "https://api.lidarr.audio/api/v0.4".to_string()
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_delay_ms() -> u64 {
    250
}

fn default_max_concurrent() -> usize {
    10
}

fn default_rate_limit() -> f64 {
    5.0
}

fn default_artist_attempts() -> u32 {
    25
}

fn default_rg_attempts() -> u32 {
    15
}

fn default_breaker_threshold() -> u32 {
    50
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            target_base_url: default_target_base_url(),
            timeout_secs: default_probe_timeout(),
            delay_between_attempts_ms: default_delay_ms(),
            max_concurrent_requests: default_max_concurrent(),
            rate_limit_per_second: default_rate_limit(),
            max_attempts_per_artist: default_artist_attempts(),
            max_attempts_per_artist_textsearch: default_artist_attempts(),
            max_attempts_per_rg: default_rg_attempts(),
            circuit_breaker_threshold: default_breaker_threshold(),
        }
    }
}

/// Available ledger backends
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LedgerBackend {
    #[default]
    Csv,
    Sqlite,
}

/// Ledger storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: LedgerBackend,
    #[serde(default = "default_artists_csv")]
    pub artists_csv_path: PathBuf,
    #[serde(default = "default_rg_csv")]
    pub release_groups_csv_path: PathBuf,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_artists_csv() -> PathBuf {
    PathBuf::from("mbid-artists.csv")
}

fn default_rg_csv() -> PathBuf {
    PathBuf::from("mbid-releasegroups.csv")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("mbid_cache.db")
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::default(),
            artists_csv_path: default_artists_csv(),
            release_groups_csv_path: default_rg_csv(),
            db_path: default_db_path(),
        }
    }
}

/// Per-run processing control
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default)]
    pub process_release_groups: bool,
    #[serde(default = "default_true")]
    pub process_artist_textsearch: bool,
    #[serde(default)]
    pub process_manual_entries: bool,
    #[serde(default)]
    pub force_artists: bool,
    #[serde(default)]
    pub force_rg: bool,
    #[serde(default)]
    pub force_text_search: bool,
    /// Commit the ledger after this many completed entities
    #[serde(default = "default_batch_write_frequency")]
    pub batch_write_frequency: usize,
    #[serde(default)]
    pub artist_textsearch_lowercase: bool,
    #[serde(default)]
    pub artist_textsearch_remove_symbols: bool,
    /// Hours before a successful entity is re-verified (0 = never)
    #[serde(default = "default_recheck_hours")]
    pub cache_recheck_hours: u32,
    /// Only search names of artists whose lookup is cached
    #[serde(default = "default_true")]
    pub textsearch_requires_artist_success: bool,
}

fn default_batch_write_frequency() -> usize {
    5
}

fn default_recheck_hours() -> u32 {
    72
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            process_release_groups: false,
            process_artist_textsearch: true,
            process_manual_entries: false,
            force_artists: false,
            force_rg: false,
            force_text_search: false,
            batch_write_frequency: default_batch_write_frequency(),
            artist_textsearch_lowercase: false,
            artist_textsearch_remove_symbols: false,
            cache_recheck_hours: default_recheck_hours(),
            textsearch_requires_artist_success: true,
        }
    }
}

/// Manual entries injection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManualConfig {
    #[serde(default = "default_manual_file")]
    pub entries_file: PathBuf,
}

fn default_manual_file() -> PathBuf {
    PathBuf::from("manual_entries.yml")
}

impl Default for ManualConfig {
    fn default() -> Self {
        Self {
            entries_file: default_manual_file(),
        }
    }
}

/// Repeat-run scheduling (used with `--schedule`)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_true")]
    pub run_at_start: bool,
    /// 0 = unlimited
    #[serde(default)]
    pub max_runs: u32,
}

fn default_interval() -> u64 {
    3600
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            run_at_start: true,
            max_runs: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging and run output
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "default_progress_every")]
    pub log_progress_every_n: usize,
    /// Directory for per-run `results_<ts>.json` summaries
    #[serde(default)]
    pub results_dir: Option<PathBuf>,
    /// Prometheus textfile written after each run
    #[serde(default)]
    pub metrics_textfile: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_progress_every() -> usize {
    25
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            log_progress_every_n: default_progress_every(),
            results_dir: None,
            metrics_textfile: None,
        }
    }
}

/// Sanitized config for logs and fingerprints (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub lidarr: SanitizedLidarrConfig,
    pub probe: ProbeConfig,
    pub ledger: LedgerConfig,
    pub run: RunConfig,
    pub manual: ManualConfig,
    pub schedule: ScheduleConfig,
}

/// Sanitized Lidarr config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedLidarrConfig {
    pub base_url: String,
    pub api_key_configured: bool,
    pub verify_ssl: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            lidarr: SanitizedLidarrConfig {
                base_url: config.lidarr.base_url.clone(),
                api_key_configured: !config.lidarr.api_key.is_empty()
                    && !config.lidarr.api_key.contains(API_KEY_PLACEHOLDER),
                verify_ssl: config.lidarr.verify_ssl,
                timeout_secs: config.lidarr.timeout_secs,
            },
            probe: config.probe.clone(),
            ledger: config.ledger.clone(),
            run: config.run.clone(),
            manual: config.manual.clone(),
            schedule: config.schedule.clone(),
        }
    }
}
