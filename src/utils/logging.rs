//! Logging Module
//!
//! Structured logging on top of `tracing`. `RUST_LOG` overrides the configured
//! level when it is set.

use std::str::FromStr;
use std::time::Instant;

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::utils::error::{BirdsongError, Result};
use crate::utils::format_duration;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            timestamps: true,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose logging for debugging the pipeline
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            timestamps: true,
            include_target: true,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }

    /// Errors only
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            timestamps: false,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }

    /// Replace the level, keeping the output format
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    fn level_filter(&self) -> LevelFilter {
        LevelFilter::from_level(self.level.to_tracing_level())
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(self.level_filter().into())
            .from_env_lossy()
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = BirdsongError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(BirdsongError::Config(format!("unknown log level '{}'", other))),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Initialize the global subscriber
///
/// Fails if a global subscriber was already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let layer = fmt::layer()
        .compact()
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids);

    let registry = tracing_subscriber::registry().with(config.env_filter());

    let result = if config.timestamps {
        registry.with(layer).try_init()
    } else {
        registry.with(layer.without_time()).try_init()
    };

    result.map_err(|e| BirdsongError::Config(format!("Failed to initialize logging: {}", e)))
}

/// Progress logger for bulk operations (image loading, downloads)
pub struct ProgressLogger {
    operation: String,
    total: usize,
    current: usize,
    /// Log every N items
    log_interval: usize,
    start_time: Instant,
}

impl ProgressLogger {
    pub fn new(operation: &str, total: usize) -> Self {
        Self {
            operation: operation.to_string(),
            total,
            current: 0,
            log_interval: (total / 10).max(1),
            start_time: Instant::now(),
        }
    }

    /// Update progress
    pub fn update(&mut self, count: usize) {
        self.current = count;

        if self.total > 0 && (self.current % self.log_interval == 0 || self.current == self.total) {
            let percentage = 100.0 * self.current as f64 / self.total as f64;
            tracing::debug!(
                "{}: {}/{} ({:.1}%)",
                self.operation,
                self.current,
                self.total,
                percentage
            );
        }
    }

    /// Increment progress by 1
    pub fn increment(&mut self) {
        self.update(self.current + 1);
    }

    /// Log completion
    pub fn finish(&self) {
        tracing::info!(
            "{}: processed {} items in {}",
            self.operation,
            self.current,
            format_duration(self.start_time.elapsed().as_secs_f64())
        );
    }
}

/// Per-epoch timing for the training loop
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();
        tracing::debug!("Epoch {}/{} started", epoch + 1, self.total_epochs);
    }

    /// Log end of an epoch with its metrics
    pub fn end_epoch(&self, loss: f64, accuracy: f64, val_loss: Option<f64>, val_accuracy: Option<f64>) {
        let epochs_remaining = self.total_epochs.saturating_sub(self.epoch + 1);
        let avg_epoch_time =
            self.training_start.elapsed().as_secs_f64() / (self.epoch + 1) as f64;

        let validation = match (val_loss, val_accuracy) {
            (Some(vl), Some(va)) => format!(" | val_loss: {:.4} | val_acc: {:.2}%", vl, va * 100.0),
            _ => String::new(),
        };

        tracing::info!(
            "Epoch {}/{} in {} | loss: {:.4} | acc: {:.2}%{} | ETA: {}",
            self.epoch + 1,
            self.total_epochs,
            format_duration(self.epoch_start.elapsed().as_secs_f64()),
            loss,
            accuracy * 100.0,
            validation,
            format_duration(epochs_remaining as f64 * avg_epoch_time)
        );
    }

    /// Log training completion
    pub fn log_complete(&self) {
        tracing::info!(
            "Training complete: {} epochs in {}",
            self.total_epochs,
            format_duration(self.training_start.elapsed().as_secs_f64())
        );
    }
}
