//! Logging setup shared by SDB front-ends and tests
//!
//! Where log lines go depends on who owns the terminal:
//! - [`LogOutput::Console`]: pretty, colored lines on stderr
//! - [`LogOutput::ConsoleAndFile`]: the above plus a daily-rolling plain file
//! - [`LogOutput::FileOnly`]: for front-ends that draw on the terminal themselves
//!
//! Levels come from `RUST_LOG`, defaulting to INFO. Files live under
//! `<temp>/sdb-logs/<component>/<component>.log.<date>`.

use eyre::{eyre, Result};
use std::{env, fs, path::PathBuf, sync::Once};
use tracing::Level;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Destination of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Colored console output only
    Console,
    /// Console plus a rolling log file
    ConsoleAndFile,
    /// Rolling log file only
    FileOnly,
}

impl LogOutput {
    fn console(&self) -> bool {
        matches!(self, Self::Console | Self::ConsoleAndFile)
    }

    fn file(&self) -> bool {
        matches!(self, Self::ConsoleAndFile | Self::FileOnly)
    }
}

/// Install the global subscriber for a component.
///
/// Returns the path of today's log file when file output is enabled. Fails if a
/// subscriber is already installed.
pub fn init(component: &str, output: LogOutput) -> Result<Option<PathBuf>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut log_file = None;

    if output.console() {
        layers.push(console_layer().with_filter(env_filter("info")?).boxed());
    }

    if output.file() {
        let log_dir = create_log_directory(component)?;
        let file_name = format!("{component}.log");

        let (writer, guard) = non_blocking(rolling::daily(&log_dir, &file_name));
        // Lines buffered in the writer are lost if the guard drops; keep it for
        // the lifetime of the process.
        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(LocalTime::rfc_3339())
            .with_ansi(false)
            .with_writer(writer);
        layers.push(file_layer.with_filter(env_filter("info")?).boxed());

        log_file = Some(log_dir.join(file_name));
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| eyre!("Failed to initialize tracing subscriber: {e}"))?;

    tracing::info!(
        component,
        ?output,
        log_file = ?log_file.as_ref().map(|p| p.display().to_string()),
        rust_log = %env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        "Logging initialized"
    );
    if let Ok(cwd) = env::current_dir() {
        tracing::debug!(working_directory = %cwd.display(), "Working directory");
    }

    Ok(log_file)
}

/// Console logging, optionally mirrored to a rolling file
pub fn init_logging(component: &str, enable_file_logging: bool) -> Result<()> {
    let output = if enable_file_logging { LogOutput::ConsoleAndFile } else { LogOutput::Console };
    init(component, output).map(|_| ())
}

/// File-only logging; returns the path of today's log file
pub fn init_file_only_logging(component: &str) -> Result<PathBuf> {
    init(component, LogOutput::FileOnly)?
        .ok_or_else(|| eyre!("File logging was not set up for {component}"))
}

fn console_layer() -> impl Layer<Registry> + Send + Sync {
    fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(LocalTime::rfc_3339())
        .with_ansi(true)
        .pretty()
}

/// `RUST_LOG` if set and valid, `fallback` otherwise
fn env_filter(fallback: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .map_err(|e| eyre!("Failed to create environment filter: {e}"))
}

fn create_log_directory(component: &str) -> Result<PathBuf> {
    let log_dir = env::temp_dir().join("sdb-logs").join(component);
    fs::create_dir_all(&log_dir)?;
    Ok(log_dir)
}

static TEST_LOGGING: Once = Once::new();

/// Compact console logging for tests; safe to call from every test.
///
/// The first call wins. If another subscriber is already installed the call
/// is a no-op.
pub fn ensure_test_logging(default_level: Option<Level>) {
    TEST_LOGGING.call_once(|| {
        let level = default_level.unwrap_or(Level::INFO);
        let Ok(filter) = env_filter(level.as_str()) else {
            return;
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_test_writer()
            .compact()
            .try_init();
    });
}
