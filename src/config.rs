//! Runtime configuration: defaults, an optional TOML file layer, and
//! per-key environment variable overrides. Follows the load/save/
//! env-resolution pattern used elsewhere in this codebase for file-backed
//! settings, generalized to the full set of tracker tuning knobs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Full runtime configuration. Every field has a default so a config file
/// is optional; fields are individually overridable via `VATPAC_<KEY>`
/// environment variables (see [`Config::apply_env_overrides`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Postgres connection string. No built-in default: required via
    /// `DATABASE_URL` or the `database_url` config key.
    pub database_url: String,

    /// Upstream feed endpoint returning `pilots`/`controllers`/`general`.
    pub feed_url: String,
    /// Upstream transceivers endpoint.
    pub transceivers_url: String,

    /// Reference inputs: valid-controller list, region boundary, sector
    /// polygons, airport table.
    pub valid_controllers_path: PathBuf,
    pub region_boundary_path: PathBuf,
    pub sectors_path: PathBuf,
    pub airports_csv_path: PathBuf,

    pub poll_interval_s: u64,
    pub flush_interval_s: u64,
    pub batch_threshold: usize,
    pub stale_multiplier: f64,
    pub disconnect_check_interval_s: u64,
    pub landing_radius_nm: f64,
    pub landing_alt_ft: i32,
    pub landing_speed_kts: f64,
    pub landing_dup_minutes: i64,
    pub timeout_hours: i64,
    pub memory_cap_mb: usize,
    pub callsign_filter_enabled: bool,
    pub region_letter: char,

    /// Ambient additions not enumerated in the distilled config table.
    pub request_timeout_s: u64,
    pub max_fetch_retries: u32,
    pub max_flush_retries: u32,
    pub db_statement_timeout_bulk_s: u64,
    pub db_statement_timeout_single_s: u64,
    pub status_path: PathBuf,
    pub cleanup_interval_s: u64,
    pub stale_reap_hours: i64,
    pub archive_enabled: bool,
    pub archive_after_days: i64,
    pub pool_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            feed_url: "https://data.vatsim.net/v3/vatsim-data.json".to_string(),
            transceivers_url: "https://data.vatsim.net/v3/transceivers-data.json".to_string(),
            valid_controllers_path: PathBuf::from("reference_data/valid_controllers.txt"),
            region_boundary_path: PathBuf::from("reference_data/region_boundary.geojson"),
            sectors_path: PathBuf::from("reference_data/sectors.geojson"),
            airports_csv_path: PathBuf::from("reference_data/airports.csv"),
            poll_interval_s: 30,
            flush_interval_s: 300,
            batch_threshold: 10_000,
            stale_multiplier: 2.5,
            disconnect_check_interval_s: 30,
            landing_radius_nm: 15.0,
            landing_alt_ft: 1000,
            landing_speed_kts: 20.0,
            landing_dup_minutes: 5,
            timeout_hours: 1,
            memory_cap_mb: 2048,
            callsign_filter_enabled: true,
            region_letter: 'Y',
            request_timeout_s: 10,
            max_fetch_retries: 3,
            max_flush_retries: 5,
            db_statement_timeout_bulk_s: 30,
            db_statement_timeout_single_s: 5,
            status_path: PathBuf::from("/tmp/vatpac-tracker/status.json"),
            cleanup_interval_s: 3600,
            stale_reap_hours: 1,
            archive_enabled: true,
            archive_after_days: 7,
            pool_size: 6,
        }
    }
}

impl Config {
    /// Load configuration: defaults, overlaid by an optional TOML file,
    /// overlaid by environment variables. Fails fast if the result is out
    /// of range.
    pub fn load(toml_path: Option<&Path>) -> Result<Self> {
        let mut config = match toml_path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {path:?}"))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file {path:?}"))?
            }
            _ => Config::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `VATPAC_<KEY>` environment variable overrides, one per field.
    /// `DATABASE_URL` is accepted bare (without the `VATPAC_` prefix) since
    /// it is the conventional name for the connection string.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.database_url = v;
        }

        macro_rules! env_override {
            ($field:ident, $key:literal, str) => {
                if let Ok(v) = std::env::var(concat!("VATPAC_", $key)) {
                    self.$field = v;
                }
            };
            ($field:ident, $key:literal, path) => {
                if let Ok(v) = std::env::var(concat!("VATPAC_", $key)) {
                    self.$field = PathBuf::from(v);
                }
            };
            ($field:ident, $key:literal, parse) => {
                if let Ok(v) = std::env::var(concat!("VATPAC_", $key))
                    && let Ok(parsed) = v.parse()
                {
                    self.$field = parsed;
                }
            };
        }

        env_override!(database_url, "DATABASE_URL", str);
        env_override!(feed_url, "FEED_URL", str);
        env_override!(transceivers_url, "TRANSCEIVERS_URL", str);
        env_override!(valid_controllers_path, "VALID_CONTROLLERS_PATH", path);
        env_override!(region_boundary_path, "REGION_BOUNDARY_PATH", path);
        env_override!(sectors_path, "SECTORS_PATH", path);
        env_override!(airports_csv_path, "AIRPORTS_CSV_PATH", path);
        env_override!(poll_interval_s, "POLL_INTERVAL_S", parse);
        env_override!(flush_interval_s, "FLUSH_INTERVAL_S", parse);
        env_override!(batch_threshold, "BATCH_THRESHOLD", parse);
        env_override!(stale_multiplier, "STALE_MULTIPLIER", parse);
        env_override!(
            disconnect_check_interval_s,
            "DISCONNECT_CHECK_INTERVAL_S",
            parse
        );
        env_override!(landing_radius_nm, "LANDING_RADIUS_NM", parse);
        env_override!(landing_alt_ft, "LANDING_ALT_FT", parse);
        env_override!(landing_speed_kts, "LANDING_SPEED_KTS", parse);
        env_override!(landing_dup_minutes, "LANDING_DUP_MINUTES", parse);
        env_override!(timeout_hours, "TIMEOUT_HOURS", parse);
        env_override!(memory_cap_mb, "MEMORY_CAP_MB", parse);
        env_override!(callsign_filter_enabled, "CALLSIGN_FILTER_ENABLED", parse);
        env_override!(region_letter, "REGION_LETTER", parse);
        env_override!(request_timeout_s, "REQUEST_TIMEOUT_S", parse);
        env_override!(max_fetch_retries, "MAX_FETCH_RETRIES", parse);
        env_override!(max_flush_retries, "MAX_FLUSH_RETRIES", parse);
        env_override!(pool_size, "POOL_SIZE", parse);
        env_override!(status_path, "STATUS_PATH", path);
    }

    fn validate(&self) -> Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("database_url is required (set DATABASE_URL)");
        }
        if !self.region_letter.is_ascii_alphabetic() {
            anyhow::bail!("region_letter must be a single ASCII letter");
        }
        if self.poll_interval_s == 0 {
            anyhow::bail!("poll_interval_s must be greater than zero");
        }
        if self.flush_interval_s == 0 {
            anyhow::bail!("flush_interval_s must be greater than zero");
        }
        if self.stale_multiplier <= 0.0 {
            anyhow::bail!("stale_multiplier must be positive");
        }
        if self.landing_radius_nm <= 0.0 {
            anyhow::bail!("landing_radius_nm must be positive");
        }
        Ok(())
    }

    /// Duration after which an active flight not present in the latest
    /// filtered snapshot is marked stale.
    pub fn stale_cutoff_seconds(&self) -> i64 {
        (self.poll_interval_s as f64 * self.stale_multiplier) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fail_validation_without_database_url() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn stale_cutoff_uses_configured_multiplier() {
        let mut config = Config::default();
        config.poll_interval_s = 30;
        config.stale_multiplier = 2.5;
        assert_eq!(config.stale_cutoff_seconds(), 75);
    }

    #[test]
    fn toml_roundtrip_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let toml_str = r#"
            poll_interval_s = 15
            region_letter = "Z"
        "#;
        std::fs::write(&path, toml_str).unwrap();

        unsafe {
            std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        }
        let config = Config::load(Some(&path)).unwrap();
        unsafe {
            std::env::remove_var("DATABASE_URL");
        }

        assert_eq!(config.poll_interval_s, 15);
        assert_eq!(config.region_letter, 'Z');
        // Untouched fields keep their defaults.
        assert_eq!(config.flush_interval_s, 300);
    }

    #[test]
    fn env_override_takes_precedence_over_file() {
        unsafe {
            std::env::set_var("DATABASE_URL", "postgres://localhost/test");
            std::env::set_var("VATPAC_POLL_INTERVAL_S", "5");
        }
        let config = Config::load(None).unwrap();
        unsafe {
            std::env::remove_var("DATABASE_URL");
            std::env::remove_var("VATPAC_POLL_INTERVAL_S");
        }
        assert_eq!(config.poll_interval_s, 5);
    }
}
