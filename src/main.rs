use auction_pulse::app::App;
use auction_pulse::cli::{Args, Command, ServiceName};
use auction_pulse::config::Config;
use auction_pulse::logging::setup_logging;
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Logging depends on the config, so config errors go straight to stderr.
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:?}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    let command = args.command.unwrap_or(Command::Serve);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = %config.app_env,
        ?command,
        "starting auction-pulse"
    );

    let mut app = match App::new(config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = ?e, "Failed to initialize application");
            return ExitCode::FAILURE;
        }
    };

    match command {
        Command::Warm => {
            let outcome = app.warm_up().await;
            info!(outcome = outcome.label(), "warm-up finished");
            app.close().await;
            if outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Command::Serve => {
            app.warm_up().await;

            let enabled_services = ServiceName::all();
            if let Err(e) = app.setup_services(&enabled_services) {
                error!(error = ?e, "Failed to setup services");
                return ExitCode::FAILURE;
            }

            app.start_services();
            app.run().await
        }
    }
}
