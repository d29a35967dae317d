use crate::config::Common;
use crate::host::Identity;
use anyhow::{Context, Result, anyhow};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::{Level, Span};
use tracing_subscriber::EnvFilter;

/// Targets the level applies to: this library and the `lk` binary.
const LOG_TARGETS: [&str; 2] = [env!("CARGO_CRATE_NAME"), "lk"];

/// Installs the global subscriber described by the `common` section.
///
/// Logs go to stderr so stdout only carries command output. When `log_to_file`
/// is set they are appended to `log_file` instead, without colors. At debug
/// level and below each event also carries the source file and line.
pub fn init_logging(common: &Common) -> Result<()> {
    let level = parse_level(&common.log_level);
    let verbose = level >= Level::DEBUG;
    let level_name = level.as_str().to_ascii_lowercase();
    let directives: Vec<String> = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level_name}"))
        .collect();
    let filter = EnvFilter::new(directives.join(","));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    if common.log_to_file {
        let file = open_log_file(&common.log_file)?;
        builder
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .try_init()
            .map_err(|e| anyhow!(e))
    } else {
        builder.with_writer(io::stderr).try_init().map_err(|e| anyhow!(e))
    }
}

/// Span tagging every event recorded inside it with the host and service.
pub fn identity_span(identity: &Identity) -> Span {
    tracing::info_span!(
        "labkit",
        hostname = %identity.hostname,
        service = %identity.service
    )
}

/// Parses a level name; unknown names fall back to debug.
pub fn parse_level(name: &str) -> Level {
    match name.trim().to_ascii_lowercase().as_str() {
        "warning" => Level::WARN,
        "fatal" | "panic" => Level::ERROR,
        other => other.parse().unwrap_or(Level::DEBUG),
    }
}

fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Couldn't open the log file '{}'", path.display()))
}
