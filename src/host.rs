//! Running commands on the local host and finding out who we are.

use crate::constants::UNKNOWN;
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

/// Timeout used for the commands run while resolving the [`Identity`].
const IDENTITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors returned by [`run_command`].
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("couldn't start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("couldn't collect the output of {program}: {source}")]
    Output {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("command {program} timed out after {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
    #[error("command {program} failed with non-zero exit code ({status}): {stderr}")]
    NonZeroExit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Runs `program` with `args` and returns what it wrote to stdout.
///
/// The child is killed if it is still running when `timeout` expires.
pub async fn run_command<S: AsRef<OsStr>>(
    timeout: Duration,
    program: &str,
    args: &[S],
) -> Result<String, CommandError> {
    let printable: Vec<_> = args.iter().map(|a| a.as_ref().to_string_lossy()).collect();
    info!("Running command -> {} {}", program, printable.join(" "));

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output.map_err(|source| CommandError::Output {
            program: program.to_string(),
            source,
        })?,
        Err(_) => {
            return Err(CommandError::TimedOut {
                program: program.to_string(),
                timeout,
            });
        }
    };

    if !output.status.success() {
        return Err(CommandError::NonZeroExit {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Who is logging: the machine and the service this toolkit runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub hostname: String,
    pub service: String,
}

impl Identity {
    /// Resolves the hostname and the service name, which is the name of the
    /// git checkout the process runs in. Either falls back to `Unknown`.
    pub async fn resolve() -> Self {
        let hostname = match hostname::get() {
            Ok(name) => name.to_string_lossy().into_owned(),
            Err(e) => {
                warn!("Couldn't get the hostname -> {e}");
                UNKNOWN.to_string()
            }
        };
        let service = match service_name().await {
            Ok(name) => name,
            Err(e) => {
                warn!("Couldn't get the service name -> {e}");
                UNKNOWN.to_string()
            }
        };
        Self { hostname, service }
    }
}

async fn service_name() -> Result<String, CommandError> {
    let toplevel = run_command(IDENTITY_TIMEOUT, "git", &["rev-parse", "--show-toplevel"]).await?;
    Ok(Path::new(toplevel.trim())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| UNKNOWN.to_string()))
}
