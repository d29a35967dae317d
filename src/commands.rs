//! Command-line interface definition for labkit.
//!
//! This module defines the `lk` commands, their arguments, and the handlers
//! that run them against an already loaded configuration.

use crate::archive::{self, ArchivePath};
use crate::check::{self, Mismatch};
use crate::config::{self, Config, ConfigError};
use crate::constants::DEFAULT_COMMAND_TIMEOUT;
use crate::copy;
use crate::file_util;
use crate::host::{self, CommandError, Identity};
use crate::sysexits;
use crate::telegram::{TelegramClient, TelegramError};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

/// Command-line interface definition for labkit.
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file to use instead of the default one.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Subcommand to execute.
    #[command(subcommand)]
    pub commands: Option<Commands>,
}

/// Supported labkit commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a .tar.gz archive from files and directories.
    Archive {
        /// Archive to create (or to read with --list).
        output: PathBuf,
        /// Files or directories to put in the archive.
        #[arg(required_unless_present = "list")]
        inputs: Vec<PathBuf>,
        /// Print the entries of an existing archive instead.
        #[arg(short, long, conflicts_with = "inputs")]
        list: bool,
    },
    /// Archive the backup paths of a node.
    Backup {
        /// Node name as found under [nodes] in the configuration.
        node: String,
        /// Directory the archive is written to.
        #[arg(short, long)]
        output_dir: PathBuf,
        /// Send a Telegram notification once the archive is written.
        #[arg(short, long)]
        notify: bool,
    },
    /// Copy a file or a directory, keeping permissions and ownership.
    Copy {
        /// Source file or directory path.
        source: PathBuf,
        /// Target path. A directory target must not exist yet.
        target: PathBuf,
        /// Verify the copy once it is done.
        #[arg(short, long)]
        verify: bool,
    },
    /// Compare two files (content, owner, mode) or two directories (count, size).
    Verify {
        source: PathBuf,
        target: PathBuf,
    },
    /// Print the SHA-256 digest of a file.
    Hash { file: PathBuf },
    /// Run a command with a timeout and print its output.
    Exec {
        /// Timeout in seconds.
        #[arg(short, long, default_value_t = DEFAULT_COMMAND_TIMEOUT)]
        timeout: u64,
        program: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Send a message to the configured Telegram chat.
    Notify { text: String },
    /// Print the last message sent to the Telegram bot.
    LastMessage,
    /// Display the absolute path of the configuration file.
    Config {
        /// Also load and validate the configuration.
        #[arg(long)]
        check: bool,
    },
}

/// Loads and validates the configuration, then loads the `.env` next to it.
///
/// Returns the configuration and, if the `.env` could not be loaded, the reason.
pub fn load_config(explicit: Option<&Path>) -> Result<(Config, Option<ConfigError>), ConfigError> {
    let path = config::config_file(explicit)?;
    let loaded = Config::load(&path)?;
    loaded.validate()?;
    let env_warning = config::load_env_file(&path).err();
    Ok((loaded, env_warning))
}

/// Prints the absolute configuration path, and validates the file if asked to.
pub fn config(explicit: Option<&Path>, check: bool) -> Result<()> {
    let path = config::config_file(explicit)?;
    let shown = config::absolute_path(&path).with_context(|| {
        format!("Couldn't resolve the config path '{}'", path.display())
    })?;
    println!("config file: {}", shown.display());
    if check {
        Config::load(&path)?.validate()?;
        println!("config is valid");
    }
    Ok(())
}

/// Creates an archive and prints where it was written.
pub fn archive(output: &Path, inputs: &[PathBuf]) -> Result<ArchivePath> {
    let created = archive::create_archive(output, inputs)?;
    println!("{created}");
    Ok(created)
}

/// Prints the entries of an existing archive.
pub fn list_archive(path: &Path) -> Result<()> {
    for name in archive::list_archive(path)? {
        println!("{name}");
    }
    Ok(())
}

/// Archives `common.backup` and the node's own backup paths into `output_dir`.
///
/// The archive is named `<node>-<unix seconds>.tar.gz`.
pub async fn backup(
    config: &Config,
    identity: &Identity,
    node: &str,
    output_dir: &Path,
    notify: bool,
) -> Result<ArchivePath> {
    let paths = config.backup_paths(node)?;
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Couldn't create '{}'", output_dir.display()))?;
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the Unix epoch")?
        .as_secs();
    let output = output_dir.join(format!("{node}-{stamp}.tar.gz"));

    info!("Backing up {} path(s) of node {node}", paths.len());
    let written = archive(&output, &paths)?;

    if notify {
        let client = TelegramClient::from_env(&config.common)?;
        client
            .send_message(&format!(
                "Backup of {node} created on {} ({}): {written}",
                identity.hostname, identity.service
            ))
            .await?;
    }
    Ok(written)
}

/// Copies `source` to `target`, optionally verifying the result.
pub fn copy(source: &Path, target: &Path, verify: bool) -> Result<()> {
    // Resolve the effective target before copying: a file copied into an
    // existing directory lands under its own name.
    let effective = if source.is_file() && target.is_dir() {
        let name = source
            .file_name()
            .with_context(|| format!("Invalid file name '{}'", source.display()))?;
        target.join(name)
    } else {
        target.to_path_buf()
    };

    copy::copy(source, target)?;
    if verify {
        check::verify(source, &effective)?;
        println!("'{}' matches '{}'", source.display(), effective.display());
    }
    Ok(())
}

/// Verifies two files or two directories and reports the outcome.
pub fn verify(source: &Path, target: &Path) -> Result<()> {
    check::verify(source, target)?;
    println!("'{}' matches '{}'", source.display(), target.display());
    Ok(())
}

/// Prints the SHA-256 digest of `file` in `sha256sum` format.
pub fn hash(file: &Path) -> Result<()> {
    let digest = file_util::hash_file(file)?;
    println!("{digest}  {}", file.display());
    Ok(())
}

/// Runs a command and prints whatever it wrote to stdout.
pub async fn exec(timeout: u64, program: &str, args: &[String]) -> Result<()> {
    let output = host::run_command(Duration::from_secs(timeout), program, args).await?;
    print!("{output}");
    Ok(())
}

/// Sends `text` to the configured chat.
pub async fn notify(config: &Config, text: &str) -> Result<()> {
    let client = TelegramClient::from_env(&config.common)?;
    let sent = client.send_message(text).await?;
    println!("{sent} message(s) sent");
    Ok(())
}

/// Prints the last message the bot received.
pub async fn last_message(config: &Config) -> Result<()> {
    let client = TelegramClient::from_env(&config.common)?;
    println!("{}", client.last_message().await?);
    Ok(())
}

/// Maps an error to the sysexits code the process should exit with.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.downcast_ref::<Mismatch>().is_some() {
            return sysexits::EX_DATAERR;
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return sysexits::EX_CONFIG;
        }
        if cause.downcast_ref::<TelegramError>().is_some() {
            return sysexits::EX_UNAVAILABLE;
        }
        if let Some(e) = cause.downcast_ref::<CommandError>() {
            return match e {
                CommandError::TimedOut { .. } => sysexits::EX_TEMPFAIL,
                _ => sysexits::EX_UNAVAILABLE,
            };
        }
        if let Some(e) = cause.downcast_ref::<io::Error>() {
            return match e.kind() {
                ErrorKind::NotFound => sysexits::EX_NOINPUT,
                ErrorKind::AlreadyExists => sysexits::EX_CANTCREAT,
                _ => sysexits::EX_IOERR,
            };
        }
    }
    sysexits::EX_SOFTWARE
}
