//! Logging setup for hosts embedding the engine.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the host. [`init_logging`] is a ready-made setup: a session log file
//! under `~/.tilelayer/logs`, optionally mirrored to stdout, filtered by
//! `RUST_LOG` or a host-supplied directive.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Session log file name.
pub const DEFAULT_LOG_FILE: &str = "tilelayer.log";

/// Where and how much to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingOptions {
    pub log_dir: PathBuf,
    pub log_file: String,
    /// Directive used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Mirror events to stdout; GUI hosts usually turn this off
    pub stdout: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            log_file: DEFAULT_LOG_FILE.to_string(),
            default_filter: DEFAULT_FILTER.to_string(),
            stdout: true,
        }
    }
}

impl LoggingOptions {
    pub fn in_dir(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_file(mut self, log_file: impl Into<String>) -> Self {
        self.log_file = log_file.into();
        self
    }

    pub fn with_default_filter(mut self, directive: impl Into<String>) -> Self {
        self.default_filter = directive.into();
        self
    }

    pub fn without_stdout(mut self) -> Self {
        self.stdout = false;
        self
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file)
    }
}

/// Keeps the background log writer alive.
///
/// Dropping the guard flushes and closes the log file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    log_path: PathBuf,
}

impl LoggingGuard {
    /// File this session logs to.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// Installs the global subscriber described by `options`.
///
/// The log file is truncated so it only holds the current session.
///
/// # Errors
///
/// Fails if the file cannot be prepared, the default filter does not parse,
/// or a global subscriber is already installed.
pub fn init_logging(options: &LoggingOptions) -> Result<LoggingGuard, io::Error> {
    let log_path = prepare_log_file(&options.log_dir, &options.log_file)?;
    let filter = env_filter(&options.default_filter)?;

    let (writer, file_guard) = tracing_appender::non_blocking(
        tracing_appender::rolling::never(&options.log_dir, &options.log_file),
    );

    // Span close events carry timings, useful when chasing slow tiles
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .pretty();

    let stdout_layer = options.stdout.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(io::stdout)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(io::Error::other)?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        log_path,
    })
}

/// `RUST_LOG` when set, else `default_directive`.
///
/// A malformed `default_directive` is an error; a malformed `RUST_LOG` falls
/// back to it.
pub fn env_filter(default_directive: &str) -> Result<EnvFilter, io::Error> {
    EnvFilter::try_from_default_env().or_else(|_| parse_filter(default_directive))
}

fn parse_filter(directive: &str) -> Result<EnvFilter, io::Error> {
    EnvFilter::try_new(directive).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid log filter '{}': {}", directive, e),
        )
    })
}

/// Creates `log_dir` and empties `log_file`, returning the file path.
pub fn prepare_log_file(log_dir: &Path, log_file: &str) -> Result<PathBuf, io::Error> {
    fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(log_file);
    fs::write(&log_path, "")?;
    Ok(log_path)
}

/// Default log directory (~/.tilelayer/logs).
pub fn default_log_dir() -> PathBuf {
    crate::config::config_directory().join("logs")
}
