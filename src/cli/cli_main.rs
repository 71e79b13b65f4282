//! Main CLI for rfa
// (c) 2024 Ross Younger

use std::ffi::OsString;
use std::process::ExitCode;

use super::args::{CliArgs, MainMode};
use crate::{
    cli::styles::{RESET, configure_colours, error, header, use_colours},
    client::{MAX_UPDATE_FPS, Parameters, client_main},
    config::{Configuration, Manager},
    server::server_main,
    util::{ConsoleTraceType, setup_tracing, trace_level, tracing_is_initialized},
};

use anstream::{eprintln, println};
use anyhow::{Context as _, Result};
use indicatif::{MultiProgress, ProgressDrawTarget};
use tracing::{Instrument as _, info_span};

/// Main CLI entrypoint
///
/// Call this from `main`, passing the arguments to use.
/// Normally you will call `cli(std::env::args_os())` but you can pass in alternate arguments for CLI testing.
///
/// This function starts a tokio runtime and performs work in it.
#[must_use]
pub fn cli<I, T>(args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    cli_inner(args)
        .inspect_err(|e| {
            if tracing_is_initialized() {
                tracing::error!("{e:#}");
            } else {
                eprintln!("{ERROR}Error:{RESET} {e:#}", ERROR = error());
            }
        })
        .map_or(ExitCode::FAILURE, |success| {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        })
}

/// Inner CLI logic
///
/// # Return
/// true indicates success. false indicates a failure that has already been reported.
fn cli_inner<I, T>(args: I) -> Result<bool>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    use clap::error::ErrorKind::{DisplayHelp, DisplayVersion};

    configure_colours();
    let args = match CliArgs::custom_parse(args) {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), DisplayHelp | DisplayVersion) => {
            if use_colours() {
                println!("{}", e.render().ansi());
            } else {
                println!("{}", e.render());
            }
            return Ok(true);
        }
        Err(e) => return Err(e.into()),
    };
    let mode = MainMode::from(&args);

    // Fold the command line in with the configuration files (which may fail)
    let mut manager = Manager::standard(args.config.as_deref())?;
    manager.merge_provider(args.config_overrides);

    handle_mode(mode, &manager, &args.client_params)
}

// MODE HANDLERS ///////////////////////////////////////////////////////////

#[tokio::main(flavor = "current_thread")]
async fn handle_mode(mode: MainMode, manager: &Manager, params: &Parameters) -> Result<bool> {
    match mode {
        MainMode::ShowConfigFiles => {
            for f in Manager::config_files() {
                println!("{f}");
            }
            Ok(true)
        }
        MainMode::ShowConfig => {
            println!("{}", show_config_data(manager)?);
            Ok(true)
        }
        MainMode::Server => run_server(manager, params).await,
        MainMode::Client => run_client(manager, params).await,
    }
}

fn show_config_data(manager: &Manager) -> Result<String> {
    Ok(format!(
        "{HEADER}Configuration{RESET}\n{}",
        manager.describe()?,
        HEADER = header()
    ))
}

fn tracing_for(
    params: &Parameters,
    config: &Configuration,
    display: ConsoleTraceType,
) -> Result<()> {
    setup_tracing(
        trace_level(params),
        display,
        params.log_file.as_ref(),
        config.time_format,
        use_colours(),
    )
}

async fn run_server(manager: &Manager, params: &Parameters) -> Result<bool> {
    anyhow::ensure!(
        params.remote.is_none(),
        "a server does not connect anywhere; remove the SERVER argument"
    );
    let config = manager.get()?;
    tracing_for(params, &config, ConsoleTraceType::Standard)?;
    server_main(&config)
        .instrument(info_span!("server"))
        .await
        .context("[Server] failed")?;
    Ok(true)
}

async fn run_client(manager: &Manager, params: &Parameters) -> Result<bool> {
    let config = manager.get()?;
    let progress =
        MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(MAX_UPDATE_FPS));
    tracing_for(params, &config, ConsoleTraceType::Indicatif(progress.clone()))?;
    // this mode may return false
    client_main(&config, params, progress).await
}
