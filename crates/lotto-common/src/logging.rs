//! Logging configuration and initialization
//!
//! Every binary in the workspace initializes `tracing` through this module so
//! that console and file output share one set of switches:
//!
//! - output target (console, file, both)
//! - format (text, JSON)
//! - level plus extra filter directives
//! - either daily rotated files or one explicit log file
//!
//! Use the structured macros (`info!`, `warn!`, ...) with fields rather than
//! `println!`:
//!
//! ```rust
//! use tracing::warn;
//!
//! let game_id = "pais_lotto";
//! let attempt = 2;
//! warn!(game_id, attempt, "fetch attempt failed");
//! ```
//!
//! # Example
//!
//! ```no_run
//! use lotto_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     // keep the guard alive so buffered file output is flushed on exit
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("ingestion started");
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Default directory for rotated log files
pub const DEFAULT_LOG_DIR: &str = "./logs";

/// Default prefix for rotated log files
pub const DEFAULT_LOG_PREFIX: &str = "lotto";

/// Minimum level of emitted events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(anyhow!("Invalid log level: {}", s)),
        }
    }
}

/// Where events are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    fn console(self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

impl FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "console" | "stdout" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" | "all" => Ok(LogOutput::Both),
            _ => Err(anyhow!("Invalid log output: {}", s)),
        }
    }
}

/// Line format, set through `LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow!("Invalid log format: {}", s)),
        }
    }
}

/// File target used when the output includes a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFile {
    /// `dir/prefix.YYYY-MM-DD`, a new file every day
    Daily { dir: PathBuf, prefix: String },
    /// Exactly this file, never rotated
    Exact(PathBuf),
}

impl Default for LogFile {
    fn default() -> Self {
        LogFile::Daily {
            dir: PathBuf::from(DEFAULT_LOG_DIR),
            prefix: DEFAULT_LOG_PREFIX.to_string(),
        }
    }
}

impl LogFile {
    /// Open the appender, creating the parent directory if needed
    pub fn appender(&self) -> Result<RollingFileAppender> {
        let (dir, name) = match self {
            LogFile::Daily { dir, prefix } => (dir.as_path(), prefix.as_str()),
            LogFile::Exact(path) => {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| anyhow!("Log path {} has no file name", path.display()))?;
                let dir = path.parent().filter(|d| !d.as_os_str().is_empty());
                (dir.unwrap_or(Path::new(".")), name)
            },
        };

        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

        Ok(match self {
            LogFile::Daily { .. } => rolling::daily(dir, name),
            LogFile::Exact(_) => rolling::never(dir, name),
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub output: LogOutput,
    pub format: LogFormat,
    pub file: LogFile,
    /// Extra `EnvFilter` directives, comma separated (e.g. "reqwest=warn,html5ever=error")
    pub filter_directives: Option<String>,
}

impl LogConfig {
    /// Defaults overlaid with environment variables
    ///
    /// Environment variables:
    /// - `LOG_LEVEL`: trace, debug, info, warn, error
    /// - `LOG_OUTPUT`: console, file, both
    /// - `LOG_FORMAT`: text, json
    /// - `LOG_DIR`, `LOG_FILE_PREFIX`: daily rotated files in that directory
    /// - `LOG_FILTER`: additional filter directives
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Overlay environment variables onto an existing configuration
    pub fn merge_env(self) -> Result<Self> {
        self.merge_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`LogConfig::merge_env`] with an explicit variable source
    pub fn merge_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("LOG_LEVEL") {
            self.level = level.parse()?;
        }
        if let Some(output) = lookup("LOG_OUTPUT") {
            self.output = output.parse()?;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.format = format.parse()?;
        }

        let dir = lookup("LOG_DIR");
        let prefix = lookup("LOG_FILE_PREFIX");
        if dir.is_some() || prefix.is_some() {
            let (current_dir, current_prefix) = match self.file {
                LogFile::Daily { dir, prefix } => (dir, prefix),
                LogFile::Exact(_) => (PathBuf::from(DEFAULT_LOG_DIR), DEFAULT_LOG_PREFIX.to_string()),
            };
            self.file = LogFile::Daily {
                dir: dir.map(PathBuf::from).unwrap_or(current_dir),
                prefix: prefix.unwrap_or(current_prefix),
            };
        }

        if let Some(filter) = lookup("LOG_FILTER") {
            self.filter_directives = Some(filter);
        }

        Ok(self)
    }

    /// Create a builder for fluent configuration
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }
}

/// Builder for LogConfig
#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    pub fn file(mut self, file: LogFile) -> Self {
        self.config.file = file;
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize the global subscriber.
///
/// Returns the file writer's guard when file output is enabled; dropping it
/// flushes and stops the background writer, so hold it for the life of the
/// process. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let mut filter = EnvFilter::from_default_env().add_directive(LevelFilter::from(config.level).into());

    if let Some(ref directives) = config.filter_directives {
        for directive in directives.split(',').filter(|d| !d.trim().is_empty()) {
            filter = filter.add_directive(
                directive
                    .trim()
                    .parse()
                    .with_context(|| format!("Failed to parse filter directive '{}'", directive))?,
            );
        }
    }

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if config.output.console() {
        layers.push(fmt_layer(config.format, std::io::stdout, true));
    }

    if config.output.file() {
        let (writer, file_guard) = tracing_appender::non_blocking(config.file.appender()?);
        guard = Some(file_guard);
        // no ANSI colors in files
        layers.push(fmt_layer(config.format, writer, false));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}
