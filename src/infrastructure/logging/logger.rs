use std::io;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use super::config::{LogConfig, LogFormat, RotationPolicy};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const LOG_FILE: &str = "taskwarden.log";

/// Keeps the background log-file writer alive.
///
/// Hold it for the life of the process; dropping it flushes and closes the
/// file. The console sink writes to stderr, leaving stdout to command output.
pub struct LogGuard {
    _file_writer: Option<WorkerGuard>,
}

impl LogGuard {
    /// Install the global subscriber described by `config`.
    ///
    /// `RUST_LOG` directives refine the configured level.
    ///
    /// # Errors
    /// Unknown level names, or a subscriber already installed.
    pub fn install(config: &LogConfig) -> Result<Self> {
        let level = parse_log_level(&config.level)?;
        let filter = || {
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy()
        };

        let mut layers: Vec<BoxedLayer> = Vec::new();
        if config.enable_stdout {
            layers.push(console_layer(config.format).with_filter(filter()).boxed());
        }

        let file_writer = match config.log_dir.as_deref() {
            Some(dir) => {
                let (writer, guard) = tracing_appender::non_blocking(appender(dir, config.rotation));
                layers.push(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_filter(filter())
                        .boxed(),
                );
                Some(guard)
            }
            None => None,
        };

        tracing_subscriber::registry().with(layers).try_init()?;
        tracing::debug!(
            level = %level,
            format = ?config.format,
            log_dir = ?config.log_dir,
            "tracing installed"
        );

        Ok(Self {
            _file_writer: file_writer,
        })
    }
}

fn appender(dir: &Path, rotation: RotationPolicy) -> RollingFileAppender {
    match rotation {
        RotationPolicy::Daily => rolling::daily(dir, LOG_FILE),
        RotationPolicy::Hourly => rolling::hourly(dir, LOG_FILE),
        RotationPolicy::Never => rolling::never(dir, LOG_FILE),
    }
}

fn console_layer(format: LogFormat) -> BoxedLayer {
    let layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    match format {
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_thread_ids(true)
            .boxed(),
        LogFormat::Pretty => layer.boxed(),
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim()).map_err(|_| anyhow!("unknown log level {level:?}"))
}
