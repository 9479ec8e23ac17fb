//! Subscriber construction.
//!
//! Aria writes tool output to stdout, so logs go to stderr unless a log
//! directory is configured. File output is written from a background thread;
//! keep the [`LogGuard`] alive until the process exits or buffered lines
//! are lost.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{TelemetryError, TelemetryResult};

/// Target the agent uses for lines a native worker writes to stderr.
pub const WORKER_OUTPUT_TARGET: &str = "aria::worker";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// How often log files roll over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    /// One file per day.
    #[default]
    Daily,
    /// One file per hour.
    Hourly,
    /// A single file.
    Never,
}

impl From<FileRotation> for Rotation {
    fn from(rotation: FileRotation) -> Self {
        match rotation {
            FileRotation::Daily => Self::DAILY,
            FileRotation::Hourly => Self::HOURLY,
            FileRotation::Never => Self::NEVER,
        }
    }
}

/// Line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per event.
    Json,
    /// The `fmt` default.
    Full,
}

impl LogFormat {
    /// Look a format up by its config name, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Pretty, Self::Compact, Self::Json, Self::Full]
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    /// Config name of the format.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
            Self::Full => "full",
        }
    }
}

/// Where log lines go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Standard error.
    #[default]
    Stderr,
    /// Standard output. Mixes with tool output; meant for debugging.
    Stdout,
    /// Rolling files in a directory.
    File(PathBuf),
}

/// Rolling file settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLogConfig {
    /// File name prefix; `aria` yields `aria.2026-01-15`.
    pub prefix: String,
    /// Rotation period.
    pub rotation: FileRotation,
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            prefix: "aria".to_owned(),
            rotation: FileRotation::Daily,
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base level (`info`, `debug`, ...) or any `EnvFilter` expression.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
    /// Output target.
    pub target: LogTarget,
    /// Used when `target` is [`LogTarget::File`].
    pub file: FileLogConfig,
    /// Prefix lines with a timestamp.
    pub timestamps: bool,
    /// Include source file and line.
    pub file_info: bool,
    /// Colorize output. Always off for files.
    pub ansi: bool,
    /// Keep worker stderr lines ([`WORKER_OUTPUT_TARGET`]).
    pub worker_output: bool,
    /// Extra filter directives such as `aria_sandbox=trace`.
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            file: FileLogConfig::default(),
            timestamps: true,
            file_info: false,
            ansi: true,
            worker_output: true,
            directives: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Defaults at `level`.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    /// Set the line format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the output target.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Log to rolling files under `directory`.
    #[must_use]
    pub fn with_file_logging(
        mut self,
        directory: impl Into<PathBuf>,
        prefix: impl Into<String>,
        rotation: FileRotation,
    ) -> Self {
        self.target = LogTarget::File(directory.into());
        self.file = FileLogConfig {
            prefix: prefix.into(),
            rotation,
        };
        self.ansi = false;
        self
    }

    /// Add a filter directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Drop timestamps.
    #[must_use]
    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    /// Include source locations.
    #[must_use]
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Silence worker stderr lines.
    #[must_use]
    pub fn without_worker_output(mut self) -> Self {
        self.worker_output = false;
        self
    }

    /// Filter from the level, the worker-output switch and the directives,
    /// in that order; later directives win for the same target.
    fn build_filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::Filter {
                input: self.level.clone(),
                reason: e.to_string(),
            })?;

        let worker = if self.worker_output { "info" } else { "off" };
        let mut directives = vec![format!("{WORKER_OUTPUT_TARGET}={worker}")];
        directives.extend(self.directives.iter().cloned());

        for directive in directives {
            let parsed = directive.parse().map_err(
                |e: tracing_subscriber::filter::ParseError| TelemetryError::Filter {
                    input: directive.clone(),
                    reason: e.to_string(),
                },
            )?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }

    fn fmt_layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let base = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_file(self.file_info)
            .with_line_number(self.file_info);

        match (self.format, self.timestamps) {
            (LogFormat::Pretty, true) => base.pretty().boxed(),
            (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (LogFormat::Compact, true) => base.compact().boxed(),
            (LogFormat::Compact, false) => base.compact().without_time().boxed(),
            (LogFormat::Json, true) => base.json().boxed(),
            (LogFormat::Json, false) => base.json().without_time().boxed(),
            (LogFormat::Full, true) => base.boxed(),
            (LogFormat::Full, false) => base.without_time().boxed(),
        }
    }

    fn file_appender(&self, dir: &Path) -> TelemetryResult<RollingFileAppender> {
        std::fs::create_dir_all(dir)?;
        RollingFileAppender::builder()
            .rotation(self.file.rotation.into())
            .filename_prefix(self.file.prefix.as_str())
            .build(dir)
            .map_err(|e| TelemetryError::Install(format!("log file in {}: {e}", dir.display())))
    }
}

#[cfg(feature = "config")]
impl From<&aria_config::LoggingSection> for LogConfig {
    fn from(section: &aria_config::LoggingSection) -> Self {
        let mut config = Self::new(section.level.clone())
            .with_format(LogFormat::from_name(&section.format).unwrap_or_default());
        config.directives.clone_from(&section.directives);
        config.worker_output = section.worker_output;
        if let Some(dir) = &section.directory {
            config = config.with_file_logging(dir, "aria", FileRotation::Daily);
        }
        config
    }
}

/// Flushes buffered file output when dropped.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug)]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns an error if a filter directive does not parse, the log directory
/// cannot be created, or a global subscriber is already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<LogGuard> {
    let filter = config.build_filter()?;

    let (layer, guard) = match &config.target {
        LogTarget::Stderr => (config.fmt_layer(std::io::stderr, config.ansi), None),
        LogTarget::Stdout => (config.fmt_layer(std::io::stdout, config.ansi), None),
        LogTarget::File(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(config.file_appender(dir)?);
            (config.fmt_layer(writer, false), Some(guard))
        },
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::Install(e.to_string()))?;

    Ok(LogGuard { _file: guard })
}
