use anyhow::Result;
use clap::Parser;
use labkit::commands::{self, Cli, Commands};
use labkit::config::Config;
use labkit::host::Identity;
use labkit::{logging, sysexits};
use std::path::Path;
use std::process;
use tokio::runtime::Builder;
use tracing::{Instrument, error, warn};

/// Entry point for the labkit CLI application.
/// Loads the configuration, sets up logging and dispatches to the command handler.
fn main() {
    let cli = Cli::parse();
    let command = match cli.commands {
        Some(command) => command,
        None => {
            eprintln!("lk requires at least one command to execute. See 'lk --help' for usage.");
            process::exit(sysexits::EX_USAGE);
        }
    };

    // Printing the config path must work even when the config itself is broken.
    if let Commands::Config { check } = command {
        if let Err(e) = commands::config(cli.config.as_deref(), check) {
            eprintln!("ERROR: There is an issue in the config -> {e:#}");
            process::exit(commands::exit_code(&e));
        }
        return;
    }

    let (config, env_warning) = match commands::load_config(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("ERROR: There is an issue in the config -> {e}");
            process::exit(sysexits::EX_CONFIG);
        }
    };
    if let Err(e) = logging::init_logging(&config.common) {
        eprintln!("ERROR: Couldn't set up logging -> {e:#}");
        process::exit(sysexits::EX_CONFIG);
    }
    if let Some(e) = env_warning {
        warn!("Couldn't load the environment from .env -> {e}");
    }

    let rt = match Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("ERROR: Couldn't start the runtime -> {e}");
            process::exit(sysexits::EX_SOFTWARE);
        }
    };

    if let Err(e) = rt.block_on(run(command, &config, cli.config.as_deref())) {
        // Stderr already gets the message below unless logs go to a file.
        if config.common.log_to_file {
            error!("{e:#}");
        }
        eprintln!("ERROR: {e:#}");
        process::exit(commands::exit_code(&e));
    }
}

async fn run(command: Commands, config: &Config, explicit: Option<&Path>) -> Result<()> {
    let identity = Identity::resolve().await;
    let span = logging::identity_span(&identity);
    dispatch(command, config, &identity, explicit)
        .instrument(span)
        .await
}

async fn dispatch(
    command: Commands,
    config: &Config,
    identity: &Identity,
    explicit: Option<&Path>,
) -> Result<()> {
    match command {
        Commands::Archive {
            output,
            inputs,
            list,
        } => {
            if list {
                commands::list_archive(&output)?;
            } else {
                commands::archive(&output, &inputs)?;
            }
        }
        Commands::Backup {
            node,
            output_dir,
            notify,
        } => {
            commands::backup(config, identity, &node, &output_dir, notify).await?;
        }
        Commands::Copy {
            source,
            target,
            verify,
        } => {
            commands::copy(&source, &target, verify)?;
        }
        Commands::Verify { source, target } => {
            commands::verify(&source, &target)?;
        }
        Commands::Hash { file } => {
            commands::hash(&file)?;
        }
        Commands::Exec {
            timeout,
            program,
            args,
        } => {
            commands::exec(timeout, &program, &args).await?;
        }
        Commands::Notify { text } => {
            commands::notify(config, &text).await?;
        }
        Commands::LastMessage => {
            commands::last_message(config).await?;
        }
        Commands::Config { check } => {
            commands::config(explicit, check)?;
        }
    }
    Ok(())
}
