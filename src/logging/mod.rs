//! Logging System for Hayat
//!
//! Every failure the watchdog recovers from surfaces only as a timestamped
//! log line, so this module is the user-visible output of the process:
//! - Structured logs with configurable verbosity levels
//! - Console and/or rolling file output
//! - Text or JSON formatting

mod config;


pub use config::{LogFormat, LogLevel, LogOutput, LoggingConfig, RotationStrategy};

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::registry::{LookupSpan, Registry};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// File name prefix for rolled log files
const LOG_FILE_NAME: &str = "hayat.log";

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Subscriber the output layers sit on
type FilteredRegistry = Layered<EnvFilter, Registry>;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    InitializationError(String),

    #[error("Failed to create log directory {path:?}: {source}")]
    DirectoryCreationError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type LoggingResult<T> = Result<T, LoggingError>;

/// Keeps the non-blocking file writer alive; hold it until `main` returns
pub struct LoggingGuard {
    log_directory: Option<PathBuf>,
    _guards: Vec<WorkerGuard>,
}

impl LoggingGuard {
    /// Directory receiving log files, if file output is on
    pub fn log_directory(&self) -> Option<&PathBuf> {
        self.log_directory.as_ref()
    }
}

/// Install the global subscriber
pub fn init(config: &LoggingConfig) -> LoggingResult<LoggingGuard> {
    let registry = tracing_subscriber::registry().with(build_env_filter(config));

    let mut guards = Vec::new();
    let mut layers: Vec<BoxedLayer<FilteredRegistry>> = Vec::new();

    if config.output != LogOutput::File {
        layers.push(console_layer(config));
    }
    let log_directory = if config.output.writes_files() {
        let directory = config.effective_directory();
        let (layer, guard) = file_layer(config, &directory)?;
        layers.push(layer);
        guards.push(guard);
        Some(directory)
    } else {
        None
    };

    registry
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::InitializationError(e.to_string()))?;

    Ok(LoggingGuard {
        log_directory,
        _guards: guards,
    })
}

/// `RUST_LOG` wins when set; otherwise the configured level and overrides
pub(crate) fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = config.directives().into_iter();
    let global = directives.next().unwrap_or_else(|| LogLevel::Info.to_string());
    directives.fold(EnvFilter::new(global), |filter, directive| {
        match directive.parse::<Directive>() {
            Ok(parsed) => filter.add_directive(parsed),
            Err(e) => {
                eprintln!("Ignoring log directive '{}': {}", directive, e);
                filter
            }
        }
    })
}

fn console_layer<S>(config: &LoggingConfig) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_file(config.source_locations)
        .with_line_number(config.source_locations);

    match config.format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Text => layer.boxed(),
    }
}

fn file_layer<S>(
    config: &LoggingConfig,
    directory: &Path,
) -> LoggingResult<(BoxedLayer<S>, WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(directory).map_err(|source| LoggingError::DirectoryCreationError {
        path: directory.to_path_buf(),
        source,
    })?;

    let rotation = match config.rotation {
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
        RotationStrategy::Never => Rotation::NEVER,
    };
    let appender = RollingFileAppender::new(rotation, directory, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_file(config.source_locations)
        .with_line_number(config.source_locations);

    let layer = match config.format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Text => layer.boxed(),
    };
    Ok((layer, guard))
}
