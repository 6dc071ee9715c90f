use std::{path::Path, sync::LazyLock};

use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::{format::FmtSpan, writer::MakeWriterExt};

const MAX_LOG_FILES: usize = 5;

/// Which command is writing logs. Each one keeps its own set of rotated files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFile {
    Serve,
    Report,
}

impl LogFile {
    fn prefix(self) -> &'static str {
        match self {
            LogFile::Serve => "serve",
            LogFile::Report => "report",
        }
    }

    /// `serve` runs unattended and keeps the per-event flow. `report` only records problems.
    fn default_level(self) -> LevelFilter {
        match self {
            LogFile::Serve => LevelFilter::DEBUG,
            LogFile::Report => LevelFilter::WARN,
        }
    }
}

/// Installs the global subscriber. Logs go to daily rotated files in `<app dir>/logs`. The console
/// copy goes to stderr: stdout is the browser's end of the pipe for `serve` and the report itself
/// for `report`.
pub fn enable_logging(
    file: LogFile,
    application_data_path: &Path,
    log_level: Option<LevelFilter>,
    mirror_to_stderr: bool,
) -> Result<()> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(file.prefix())
        .build(application_data_path.join("logs"))?;

    let stderr = std::io::stderr.with_filter(move |_| mirror_to_stderr);

    let level = log_level.map(|v| v.to_string()).unwrap_or_else(|| {
        std::env::var("RUST_LOG").unwrap_or_else(|_| file.default_level().to_string())
    });

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(crate_directive(&level)))
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(stderr.and(appender))
        .pretty()
        .init();
    Ok(())
}

/// Scopes `level` to this crate so dependencies stay quiet.
fn crate_directive(level: &str) -> String {
    format!(
        "{}={}",
        env!("CARGO_PKG_NAME").replace("-", "_"),
        level.to_lowercase()
    )
}

pub static TEST_LOGGING: LazyLock<()> = LazyLock::new(|| {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .pretty()
        .init()
});
