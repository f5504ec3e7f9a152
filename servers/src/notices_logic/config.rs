use clap::Parser;
use lib_notify::{ConfigError, EngineSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "server_notices.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Public notice watcher with webhook fan-out", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "NOTICES_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "NOTICES_SOURCE_URL", help = "Listing page to watch for new notices.")]
    pub source_url: Option<String>,

    #[clap(long, env = "NOTICES_DATABASE_URL", help = "PostgreSQL URL. In-memory storage is used when absent.")]
    pub database_url: Option<String>,

    #[clap(long, env = "NOTICES_DB_MAX_CONNECTIONS", help = "Maximum pooled database connections.")]
    pub db_max_connections: Option<usize>,

    #[clap(long, env = "NOTICES_CHECK_INTERVAL_MINUTES", help = "Minutes between two checks of the source.")]
    pub check_interval_minutes: Option<u64>,

    #[clap(long, env = "NOTICES_DELIVERY_PACING_MS", help = "Minimum milliseconds between two messages to one tenant.")]
    pub delivery_pacing_ms: Option<u64>,

    #[clap(long, env = "NOTICES_MAX_CONCURRENT_TENANTS", help = "Tenants delivered to at the same time.")]
    pub max_concurrent_tenants: Option<usize>,

    #[clap(long, env = "NOTICES_MAX_PER_FETCH", help = "Upper bound on notices read from one fetch.")]
    pub max_notices_per_fetch: Option<usize>,

    #[clap(long, env = "NOTICES_OPS_PORT", help = "Port for the health and admin HTTP surface.")]
    pub ops_port: Option<u16>,

    #[clap(long, env = "NOTICES_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "NOTICES_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "NOTICES_MESSAGE_FOOTER", help = "Footer text shown under each notice.")]
    pub message_footer: Option<String>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            source_url: other.source_url.or(self.source_url),
            database_url: other.database_url.or(self.database_url),
            db_max_connections: other.db_max_connections.or(self.db_max_connections),
            check_interval_minutes: other.check_interval_minutes.or(self.check_interval_minutes),
            delivery_pacing_ms: other.delivery_pacing_ms.or(self.delivery_pacing_ms),
            max_concurrent_tenants: other.max_concurrent_tenants.or(self.max_concurrent_tenants),
            max_notices_per_fetch: other.max_notices_per_fetch.or(self.max_notices_per_fetch),
            ops_port: other.ops_port.or(self.ops_port),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            message_footer: other.message_footer.or(self.message_footer),
        }
    }

    fn defaults() -> Config {
        Config {
            source_url: Some("https://www.uepa.br/pt-br/editais".to_string()),
            db_max_connections: Some(8),
            check_interval_minutes: Some(5),
            delivery_pacing_ms: Some(1000),
            max_concurrent_tenants: Some(4),
            max_notices_per_fetch: Some(20),
            ops_port: Some(9003),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }

    pub fn source_url(&self) -> &str {
        self.source_url.as_deref().unwrap_or("https://www.uepa.br/pt-br/editais")
    }

    pub fn ops_port(&self) -> u16 {
        self.ops_port.unwrap_or(9003)
    }

    pub fn log_dir(&self) -> &Path {
        self.log_dir.as_deref().unwrap_or(Path::new("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn db_max_connections(&self) -> usize {
        self.db_max_connections.unwrap_or(8)
    }

    pub fn max_notices_per_fetch(&self) -> usize {
        self.max_notices_per_fetch.unwrap_or(20)
    }

    /// Validated engine knobs derived from the merged configuration.
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        let defaults = EngineSettings::default();
        EngineSettings::from_parts(
            self.check_interval_minutes
                .unwrap_or(defaults.check_interval.as_secs() / 60),
            self.delivery_pacing_ms
                .unwrap_or(defaults.delivery_pacing.as_millis() as u64),
            self.max_concurrent_tenants
                .unwrap_or(defaults.max_concurrent_tenants),
        )
    }
}

fn read_file_config(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }
    let Ok(config_str) = fs::read_to_string(path) else {
        log::warn!("Failed to read config file: {}. Falling back to other sources.", path.display());
        return None;
    };
    match serde_json::from_str::<Config>(&config_str) {
        Ok(file_config) => Some(file_config),
        Err(e) => {
            log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Layers defaults, the JSON file and the CLI/env values, later sources winning.
fn resolve(cli: Config) -> Config {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_file_config(&config_file_path) {
        current_config = current_config.merge(file_config);
    }
    current_config.merge(cli)
}

pub fn load_config() -> Config {
    // clap reads both the command line and the NOTICES_* environment.
    resolve(Config::parse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_file_or_cli() {
        let cli = Config {
            config_path: Some(PathBuf::from("/definitely/not/here.conf")),
            ..Default::default()
        };
        let config = resolve(cli);
        assert_eq!(config.ops_port(), 9003);
        assert_eq!(config.source_url(), "https://www.uepa.br/pt-br/editais");
        assert!(config.database_url.is_none());
        assert_eq!(config.engine_settings().unwrap(), EngineSettings::default());
    }

    #[test]
    fn cli_overrides_file_which_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"opsPort": 9100, "checkIntervalMinutes": 10, "logLevel": "debug"}}"#
        )
        .unwrap();

        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            ops_port: Some(9200),
            ..Default::default()
        };
        let config = resolve(cli);

        assert_eq!(config.ops_port(), 9200);
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.check_interval_minutes, Some(10));
        assert_eq!(config.max_notices_per_fetch(), 20);
    }

    #[test]
    fn malformed_file_is_ignored() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(resolve(cli).ops_port(), 9003);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = Config {
            check_interval_minutes: Some(0),
            ..Config::defaults()
        };
        assert!(config.engine_settings().is_err());
    }
}
