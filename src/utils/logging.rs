//! Logging infrastructure for upload-inspector.

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level
    pub level: LevelFilter,
    /// Show timestamps
    pub timestamps: bool,
    /// Show module path
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            timestamps: true,
            module_path: false,
        }
    }
}

impl LogConfig {
    /// Create a log config from application config.
    pub fn from_config(config: &Config) -> Self {
        if config.logging.verbose_console {
            return Self::verbose();
        }

        let level = parse_level(&config.logging.log_level).unwrap_or(LevelFilter::Info);
        Self {
            level,
            timestamps: true,
            module_path: level == LevelFilter::Debug || level == LevelFilter::Trace,
        }
    }

    /// Create a verbose log config for CLI.
    pub fn verbose() -> Self {
        Self {
            level: LevelFilter::Debug,
            timestamps: true,
            module_path: true,
        }
    }
}

/// Parse a configured level name.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    match name.to_lowercase().as_str() {
        "trace" => Some(LevelFilter::Trace),
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "error" => Some(LevelFilter::Error),
        "off" => Some(LevelFilter::Off),
        _ => None,
    }
}

/// Initialize the logging system.
///
/// The logger itself passes every record; the active level is the global
/// maximum, so [`set_level`] can change it once configuration is loaded.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let mut builder = Builder::new();

    builder.filter_level(LevelFilter::Trace);

    let timestamps = config.timestamps;
    let module_path = config.module_path;
    builder.format(move |buf, record| {
        let mut output = String::new();

        if timestamps {
            output.push_str(&format!("{} ", Local::now().format("%Y-%m-%d %H:%M:%S")));
        }

        let level_str = match record.level() {
            log::Level::Error => "\x1b[31mERROR\x1b[0m",
            log::Level::Warn => "\x1b[33mWARN\x1b[0m ",
            log::Level::Info => "\x1b[32mINFO\x1b[0m ",
            log::Level::Debug => "\x1b[34mDEBUG\x1b[0m",
            log::Level::Trace => "\x1b[35mTRACE\x1b[0m",
        };
        output.push_str(&format!("[{}] ", level_str));

        if module_path {
            if let Some(path) = record.module_path() {
                output.push_str(&format!("{}: ", path));
            }
        }

        output.push_str(&format!("{}", record.args()));

        writeln!(buf, "{}", output)
    });

    builder
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to initialize logging: {}", e)))?;
    log::set_max_level(config.level);

    log::debug!("Logging initialized with level: {:?}", config.level);
    Ok(())
}

/// Change the active log level after initialization.
pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
    log::debug!("Log level set to {:?}", level);
}
