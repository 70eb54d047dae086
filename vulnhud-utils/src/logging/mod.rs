//! Logging setup on top of the tracing ecosystem
//!
//! `init_logging` installs a formatted subscriber whose default level can be
//! overridden with `RUST_LOG`. Components log through named [`Logger`]s so
//! every line carries the component it came from.

use std::io::IsTerminal;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log levels, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warning => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    pub level: LogLevel,
    /// Source file and line of every event
    pub include_location: bool,
    pub include_thread_id: bool,
    /// ANSI colours; off when stderr is not a terminal
    pub colored_output: bool,
}

impl LoggerConfig {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            include_location: false,
            include_thread_id: false,
            colored_output: std::io::stderr().is_terminal(),
        }
    }

    /// Add source locations and thread ids to every line
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.include_location = verbose;
        self.include_thread_id = verbose;
        self
    }

    #[must_use]
    pub fn colored(mut self, colored: bool) -> Self {
        self.colored_output = self.colored_output && colored;
        self
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

/// Initialize logging with configuration
pub fn init_logging(config: LoggerConfig) -> crate::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::from(config.level).into())
        .from_env_lossy();

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_thread_ids(config.include_thread_id)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_ansi(config.colored_output);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| crate::UtilError::Config(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// Named logger; the name prefixes every message it emits
///
/// Level filtering happens in the subscriber installed by [`init_logging`].
#[derive(Debug, Clone)]
pub struct Logger {
    name: String,
}

impl Logger {
    /// Create a new logger with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Logger name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!("[{}] {}", self.name, message);
    }

    pub fn info(&self, message: &str) {
        tracing::info!("[{}] {}", self.name, message);
    }

    pub fn warning(&self, message: &str) {
        tracing::warn!("[{}] {}", self.name, message);
    }

    pub fn error(&self, message: &str) {
        tracing::error!("[{}] {}", self.name, message);
    }

    /// Log an error value with context
    pub fn exception(&self, message: &str, error: &dyn std::error::Error) {
        tracing::error!("[{}] {}: {}", self.name, message, error);
    }
}

/// Get a logger by name
pub fn get_logger(name: &str) -> Logger {
    Logger::new(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels() {
        assert!(LogLevel::Error > LogLevel::Warning);
        assert!(LogLevel::Warning > LogLevel::Info);
        assert!(LogLevel::Info > LogLevel::Debug);
        assert!(LogLevel::Debug > LogLevel::Trace);
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("debug".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_logger_creation() {
        let logger = get_logger("vulnhud.scheduler");
        assert_eq!(logger.name(), "vulnhud.scheduler");
    }

    #[test]
    fn test_logger_config_builders() {
        let config = LoggerConfig::new(LogLevel::Debug).verbose(true).colored(false);

        assert_eq!(config.level, LogLevel::Debug);
        assert!(config.include_location);
        assert!(config.include_thread_id);
        assert!(!config.colored_output);

        let plain = LoggerConfig::default();
        assert_eq!(plain.level, LogLevel::Info);
        assert!(!plain.include_location);
        assert_eq!(plain.colored_output, std::io::stderr().is_terminal());
    }
}
