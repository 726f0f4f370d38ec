//! Configuration module for the line-echo server.
//!
//! The port is the only required setting and always comes from the command
//! line. An optional TOML file can set the bind host, worker count and log
//! level; CLI arguments take precedence over config file values.

use clap::error::ErrorKind;
use clap::Parser;
use serde::Deserialize;
use std::ffi::OsString;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Command-line arguments for the echo server
#[derive(Parser, Debug)]
#[command(name = "line-echo")]
#[command(author = "line-echo authors")]
#[command(version = "0.1.0")]
#[command(about = "A line-oriented TCP echo server", long_about = None)]
pub struct CliArgs {
    /// TCP port to listen on (0 picks a free port)
    pub port: u16,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<NonZeroUsize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Interface address to bind to
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// Number of worker threads
    pub workers: Option<NonZeroUsize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            workers: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V6(Ipv6Addr::UNSPECIFIED) // all interfaces, IPv4 and IPv6
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub workers: Option<NonZeroUsize>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from the process arguments and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(std::env::args_os())
    }

    /// Load configuration from an explicit argument list.
    ///
    /// `--help` and `--version` print their output and exit the process.
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = match CliArgs::try_parse_from(args) {
            Ok(cli) => cli,
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                e.exit()
            }
            Err(e) => return Err(ConfigError::Usage(e.render().to_string())),
        };

        let toml_config = match cli.config {
            Some(ref config_path) => {
                let contents = std::fs::read_to_string(config_path)
                    .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
                toml::from_str(&contents)
                    .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
            }
            None => TomlConfig::default(),
        };

        Ok(Self::resolve(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence)
    fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            host: toml_config.server.host,
            port: cli.port,
            workers: cli.workers.or(toml_config.server.workers),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    /// Socket address the listener binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    /// Missing or malformed command-line arguments; carries the usage text.
    Usage(String),
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Usage(usage) => f.write_str(usage.trim_end()),
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Usage(_) => None,
            ConfigError::FileRead(_, e) => Some(e),
            ConfigError::TomlParse(_, e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, IpAddr::V6(Ipv6Addr::UNSPECIFIED));
        assert_eq!(config.server.workers, None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            workers = 4

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.server.workers, NonZeroUsize::new(4));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_port_only() {
        let config = Config::from_args(["line-echo", "9090"]).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.workers, None);
        assert_eq!(config.listen_addr(), "[::]:9090".parse().unwrap());
    }

    #[test]
    fn test_missing_port_is_usage_error() {
        match Config::from_args(["line-echo"]) {
            Err(ConfigError::Usage(usage)) => assert!(usage.contains("Usage")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_port_is_usage_error() {
        assert!(matches!(
            Config::from_args(["line-echo", "70000"]),
            Err(ConfigError::Usage(_))
        ));
        assert!(matches!(
            Config::from_args(["line-echo", "http"]),
            Err(ConfigError::Usage(_))
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            Config::from_args(["line-echo", "9090", "--workers", "0"]),
            Err(ConfigError::Usage(_))
        ));
    }

    #[test]
    fn test_cli_overrides_file() {
        let cli =
            CliArgs::try_parse_from(["line-echo", "7000", "-w", "2", "--log-level", "trace"])
                .unwrap();
        let file: TomlConfig = toml::from_str(
            r#"
            [server]
            host = "::1"
            workers = 8

            [logging]
            level = "warn"
        "#,
        )
        .unwrap();

        let config = Config::resolve(cli, file);
        assert_eq!(config.listen_addr(), "[::1]:7000".parse().unwrap());
        assert_eq!(config.workers, NonZeroUsize::new(2));
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_missing_config_file() {
        let result = Config::from_args(["line-echo", "9090", "-c", "/nonexistent/line-echo.toml"]);
        assert!(matches!(result, Err(ConfigError::FileRead(_, _))));
    }
}
