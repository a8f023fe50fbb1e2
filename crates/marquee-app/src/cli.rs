//! CLI argument definitions for the Marquee application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use marquee_core::config::{MarqueeConfig, SearchMode};

/// Marquee - hybrid search over a movie catalog.
#[derive(Parser, Debug)]
#[command(name = "marquee", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Data directory for the SQLite catalog.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Deployment mode (vector, full_text).
    #[arg(short = 'm', long = "mode")]
    pub mode: Option<SearchMode>,

    /// JSON catalog loaded at startup.
    #[arg(short = 's', long = "source")]
    pub source: Option<PathBuf>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > MARQUEE_CONFIG env var > platform default (~/.marquee/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("MARQUEE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > MARQUEE_PORT env var > config file value > 3030.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("MARQUEE_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        if config_port != 0 {
            return config_port;
        }
        3030
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut MarqueeConfig) {
        config.general.port = self.resolve_port(config.general.port);
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().to_string();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(mode) = self.mode {
            config.general.mode = mode;
        }
        if let Some(ref source) = self.source {
            config.ingest.source_path = source.to_string_lossy().to_string();
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".marquee").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".marquee").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let args = CliArgs::try_parse_from([
            "marquee",
            "--port",
            "8181",
            "--mode",
            "full_text",
            "--source",
            "/srv/movies.json",
            "--data-dir",
            "/var/lib/marquee",
            "-l",
            "debug",
        ])
        .unwrap();

        let mut config = MarqueeConfig::default();
        args.apply(&mut config);
        assert_eq!(config.general.port, 8181);
        assert_eq!(config.general.mode, SearchMode::FullText);
        assert_eq!(config.ingest.source_path, "/srv/movies.json");
        assert_eq!(config.general.data_dir, "/var/lib/marquee");
        assert_eq!(config.general.log_level, "debug");
    }

    #[test]
    fn test_no_flags_keep_config_values() {
        let args = CliArgs::try_parse_from(["marquee"]).unwrap();
        let mut config = MarqueeConfig::default();
        config.general.mode = SearchMode::FullText;
        config.ingest.source_path = "catalog.json".to_string();
        args.apply(&mut config);

        assert_eq!(config.general.mode, SearchMode::FullText);
        assert_eq!(config.ingest.source_path, "catalog.json");
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(CliArgs::try_parse_from(["marquee", "--mode", "graph"]).is_err());
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let args = CliArgs::try_parse_from(["marquee", "-c", "/etc/marquee.toml"]).unwrap();
        assert_eq!(args.resolve_config_path(), PathBuf::from("/etc/marquee.toml"));
    }
}
