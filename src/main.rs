use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use faultbus::bus::ErrorBus;
use faultbus::classify::{PatternClassifier, StatusCodeClassifier};
use faultbus::config::BusConfig;
use faultbus::error::{ErrorContextFragment, ErrorType, RaisedError, Transport};
use faultbus::handlers::{AlertingHandler, LoggingHandler, MonitoringHandler};
use faultbus::logging::{init_logging, LoggingConfig};
use faultbus::notify::{EmailNotifier, LogMailTransport, WebhookNotifier};
use faultbus::recovery::{DegradationRecovery, DegradationState, FallbackRecovery};

#[derive(Parser, Debug)]
#[command(name = "faultbus")]
#[command(version)]
#[command(about = "In-process error bus: classify, handle, notify and recover errors")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short, action = ArgAction::Count, global = true, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// TOML configuration file (FAULTBUS__* environment variables override it)
    #[arg(long, short, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish synthetic errors through a fully wired bus and print statistics
    Simulate {
        /// Number of errors to publish
        #[arg(long, short = 'n', default_value = "20")]
        count: usize,

        /// Deliver alerts to this webhook URL
        #[arg(long, value_name = "URL")]
        webhook_url: Option<String>,

        /// HMAC secret used to sign webhook payloads
        #[arg(long, requires = "webhook_url", value_name = "SECRET")]
        webhook_secret: Option<String>,

        /// Send alert e-mails (logged, not delivered) to this address
        #[arg(long, value_name = "ADDRESS")]
        email_to: Vec<String>,

        /// How long to let the drain tick run before stopping
        #[arg(long, default_value = "1500", value_name = "MS")]
        wait_ms: u64,
    },
    /// Print the effective configuration as TOML
    Config,
}

mod exit_codes {
    use std::process::ExitCode;

    pub fn runtime_failure() -> ExitCode {
        ExitCode::from(1)
    }

    pub fn config_error() -> ExitCode {
        ExitCode::from(2)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(LoggingConfig::from_verbosity(cli.verbose, cli.quiet));

    let config = match BusConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::config_error();
        }
    };

    match cli.command {
        Commands::Config => match toml::to_string(&config) {
            Ok(rendered) => {
                print!("{}", rendered);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: failed to render configuration: {}", e);
                exit_codes::runtime_failure()
            }
        },
        Commands::Simulate {
            count,
            webhook_url,
            webhook_secret,
            email_to,
            wait_ms,
        } => {
            let options = SimulateOptions {
                count,
                webhook_url,
                webhook_secret,
                email_to,
                wait: Duration::from_millis(wait_ms),
            };
            match simulate(config, options).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    exit_codes::runtime_failure()
                }
            }
        }
    }
}

struct SimulateOptions {
    count: usize,
    webhook_url: Option<String>,
    webhook_secret: Option<String>,
    email_to: Vec<String>,
    wait: Duration,
}

async fn simulate(
    config: BusConfig,
    options: SimulateOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let bus = build_bus(config, &options)?;
    bus.start()?;

    for i in 0..options.count {
        let (error, fragment) = synthetic_error(i);
        bus.publish(error, Some(fragment))?;
    }

    tokio::time::sleep(options.wait).await;
    bus.stop().await;

    let stats = bus.statistics();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn build_bus(
    config: BusConfig,
    options: &SimulateOptions,
) -> Result<ErrorBus, Box<dyn std::error::Error>> {
    let bus = ErrorBus::new(config)?;

    bus.add_classifier(Arc::new(StatusCodeClassifier::new()));
    bus.add_classifier(Arc::new(PatternClassifier::new()));

    bus.subscribe(Arc::new(LoggingHandler::new()));
    bus.subscribe(Arc::new(MonitoringHandler::new(5, Duration::from_secs(60))));
    bus.subscribe(Arc::new(AlertingHandler::new()));

    if let Some(url) = &options.webhook_url {
        let mut webhook = WebhookNotifier::new(url.clone())?;
        if let Some(secret) = &options.webhook_secret {
            webhook = webhook.with_secret(secret.clone());
        }
        bus.add_notifier(Arc::new(webhook));
    }
    if !options.email_to.is_empty() {
        bus.add_notifier(Arc::new(EmailNotifier::new(
            "faultbus@localhost",
            options.email_to.clone(),
            Arc::new(LogMailTransport),
        )));
    }

    bus.add_recovery(Arc::new(
        FallbackRecovery::new().for_type(ErrorType::Network, "cached-response"),
    ));
    bus.add_recovery(Arc::new(
        DegradationRecovery::new(DegradationState::new())
            .for_type(ErrorType::ExternalService, "recommendations"),
    ));

    Ok(bus)
}

/// The i-th error of the simulation. Cycles through a fixed mix of
/// failures and spreads them over three tenants and five users.
fn synthetic_error(i: usize) -> (RaisedError, ErrorContextFragment) {
    let error = match i % 7 {
        0 => RaisedError::new("ConnectionError", "connection refused by inventory-service"),
        1 => RaisedError::new("HttpError", "upstream unavailable").with_status(503),
        2 => RaisedError::new("HttpError", "order not found").with_status(404),
        3 => RaisedError::new("HttpError", "token expired").with_status(401),
        4 => RaisedError::new("TimeoutError", "request timed out after 30s"),
        5 => RaisedError::new("HttpError", "email is not a valid address").with_status(422),
        _ => RaisedError::new("DatabaseError", "deadlock detected while updating orders"),
    };

    let fragment = ErrorContextFragment::new()
        .with_tenant(format!("tenant-{}", i % 3))
        .with_user(format!("user-{}", i % 5))
        .with_request(format!("req-{:04}", i))
        .with_source(Transport::http("POST", "/orders"));

    (error, fragment)
}
