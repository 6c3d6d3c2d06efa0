//! officecal CLI entry point.

use std::io::IsTerminal;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use officecal_core::{ErrorKind, TracingConfig, init_tracing};
use officecal_graph::{CalendarApi, GraphClient};

use officecal_cli::cli::{AuthAction, Cli, Command, ConfigAction};
use officecal_cli::commands;
use officecal_cli::config::ClientConfig;
use officecal_cli::error::{CliError, CliResult};

/// How long an interrupted command waits for a sign-in it started.
const INLINE_SIGN_IN_TIMEOUT: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ClientConfig::load_from(path).map_err(CliError::Config),
        None => ClientConfig::load().map_err(CliError::Config),
    };

    let debug = cli.debug || config.as_ref().is_ok_and(|c| c.debug);
    let tracing = if debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {}", e);
    }

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn report(err: &CliError) {
    eprintln!("error: {}", err);
    if let CliError::Graph(e) = err
        && e.kind() == ErrorKind::AuthRequired
    {
        match e.sign_in() {
            Some(handle) => {
                eprintln!();
                eprintln!("{}", handle.message);
                eprintln!("Then run the command again, or sign in with: officecal auth login");
            }
            None => eprintln!("Sign in with: officecal auth login"),
        }
    }
}

async fn run(cli: Cli, config: ClientConfig) -> CliResult<()> {
    let client_id = cli.client_id.as_deref();
    let tenant_id = cli.tenant_id.as_deref();

    let command = match cli.command {
        Command::Config { action } => {
            return match action {
                ConfigAction::Dump => commands::config::dump(&config),
                ConfigAction::Validate => {
                    commands::config::validate(&config, client_id, tenant_id)
                }
                ConfigAction::Path => commands::config::path(),
            };
        }
        command => command,
    };

    let graph = config
        .to_graph_config(client_id, tenant_id)
        .map_err(CliError::Config)?;
    let api = CalendarApi::new(GraphClient::new(graph)?);
    let auth = api.client().authenticator();

    match command {
        Command::Auth { action } => match action {
            AuthAction::Login {
                timeout,
                open,
                force,
            } => commands::auth::login(auth, Duration::from_secs(timeout), open, force).await,
            AuthAction::Status => commands::auth::status(auth),
            AuthAction::Logout => commands::auth::logout(auth),
        },
        command => match dispatch(&api, &command).await {
            Err(CliError::Graph(mut e))
                if e.kind() == ErrorKind::AuthRequired && std::io::stderr().is_terminal() =>
            {
                // Someone is watching: finish the sign-in here and retry once.
                let Some(handle) = e.take_sign_in() else {
                    return Err(e.into());
                };
                commands::auth::wait_for_sign_in(auth, &handle, INLINE_SIGN_IN_TIMEOUT, false)
                    .await?;
                dispatch(&api, &command).await
            }
            other => other,
        },
    }
}

async fn dispatch(api: &CalendarApi, command: &Command) -> CliResult<()> {
    match command {
        Command::Me => commands::calendar::me(api).await,
        Command::Calendars => commands::calendar::calendars(api).await,
        Command::Events { start, end, user } => {
            commands::calendar::events(api, start, end, user.as_deref()).await
        }
        Command::Rooms { building } => commands::calendar::rooms(api, building.as_deref()).await,
        Command::Get { path, all } => commands::calendar::get(api, path, *all).await,
        Command::Auth { .. } | Command::Config { .. } => Ok(()),
    }
}
