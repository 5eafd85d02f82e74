//! Configuration module for the ascii-reel server.
//!
//! Supports command-line arguments, environment variables and a TOML
//! configuration file. CLI arguments and environment variables take
//! precedence over config file values.

use crate::frames::LoadMode;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the animation server
#[derive(Parser, Debug)]
#[command(name = "ascii-reel")]
#[command(author = "ascii-reel authors")]
#[command(version = "0.1.0")]
#[command(about = "Streams looping text-art animations to telnet clients", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, env = "ASCII_REEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:1337)
    #[arg(short = 'l', long, env = "ASCII_REEL_LISTEN")]
    pub listen: Option<String>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long, env = "ASCII_REEL_WORKERS")]
    pub workers: Option<usize>,

    /// Directory holding the frame files
    #[arg(short = 'd', long, env = "ASCII_REEL_FRAME_DIR")]
    pub frame_dir: Option<PathBuf>,

    /// File extension (without the dot) that marks a frame file
    #[arg(long, env = "ASCII_REEL_EXTENSION")]
    pub extension: Option<String>,

    /// Read frames once at startup (eager) or from disk on every tick (lazy)
    #[arg(long, value_enum, env = "ASCII_REEL_LOAD_MODE")]
    pub load_mode: Option<LoadMode>,

    /// Milliseconds between frames
    #[arg(short = 't', long, env = "ASCII_REEL_TICK_MS")]
    pub tick_ms: Option<u64>,

    /// Text sent on every tick when no frames are available
    #[arg(long, env = "ASCII_REEL_PLACEHOLDER")]
    pub placeholder: Option<String>,

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
    pub frames: FramesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Number of worker threads
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: None,
        }
    }
}

/// Frame source and playback configuration
#[derive(Debug, Deserialize)]
pub struct FramesConfig {
    #[serde(default = "default_frame_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub load_mode: LoadMode,
    /// Milliseconds between frames
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            dir: default_frame_dir(),
            extension: default_extension(),
            load_mode: LoadMode::default(),
            tick_ms: default_tick_ms(),
            placeholder: default_placeholder(),
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

fn default_listen() -> String {
    "0.0.0.0:1337".to_string()
}

fn default_frame_dir() -> PathBuf {
    PathBuf::from("ascii_frames")
}

fn default_extension() -> String {
    "txt".to_string()
}

fn default_tick_ms() -> u64 {
    33 // ~30 frames per second
}

fn default_placeholder() -> String {
    "No frames loaded.\n".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub workers: Option<usize>,
    pub frame_dir: PathBuf,
    pub extension: String,
    pub load_mode: LoadMode,
    pub tick_ms: u64,
    pub placeholder: String,
    pub log_level: String,
}

impl Config {
    /// Load configuration from the process arguments, environment and
    /// optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Merge parsed CLI arguments with the TOML file they point at.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let config = Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            workers: cli.workers.or(toml_config.server.workers),
            frame_dir: cli.frame_dir.unwrap_or(toml_config.frames.dir),
            extension: cli.extension.unwrap_or(toml_config.frames.extension),
            load_mode: cli.load_mode.unwrap_or(toml_config.frames.load_mode),
            tick_ms: cli.tick_ms.unwrap_or(toml_config.frames.tick_ms),
            placeholder: cli.placeholder.unwrap_or(toml_config.frames.placeholder),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::InvalidTick);
        }
        let ext = self.extension.trim_start_matches('.');
        if ext.is_empty() {
            return Err(ConfigError::InvalidExtension(self.extension.clone()));
        }
        Ok(())
    }

    /// Interval between two ticks of a session.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Extension without any leading dot, so `.txt` and `txt` agree.
    pub fn frame_extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidTick,
    InvalidExtension(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidTick => write!(f, "Tick interval must be at least 1 ms"),
            ConfigError::InvalidExtension(ext) => {
                write!(f, "Invalid frame file extension '{ext}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::FileRead(_, e) => Some(e),
            ConfigError::TomlParse(_, e) => Some(e),
            _ => None,
        }
    }
}
