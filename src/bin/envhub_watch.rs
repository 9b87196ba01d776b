/// Watch tool - subscribe to a hub and print every update
///
/// Runs a reconnecting connector against a hub, subscribes to the given
/// environments and prints status updates, operation updates and connection
/// state changes until Ctrl-C (or `--duration` elapses).
///
/// Usage:
///   cargo run --bin envhub-watch -- --env env-1 --env env-2
///   cargo run --bin envhub-watch -- --url ws://10.0.0.5:8080/ws --env env-1 --token secret
use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use serde_json::json;
use std::time::Duration;

use envhub::{
    config::{self, ConnectorConfig},
    connector::{ConnectionState, Connector, ConnectorEvent},
    logger,
};

#[derive(Parser, Debug)]
#[clap(name = "envhub-watch")]
#[clap(about = "Print live status and operation updates from an envhub server")]
struct Args {
    /// Hub URL (defaults to the configured connector url)
    #[clap(long)]
    url: Option<String>,

    /// Environment to subscribe to (repeatable)
    #[clap(long = "env")]
    environments: Vec<String>,

    /// Token sent in an authenticate message after every connect
    #[clap(long)]
    token: Option<String>,

    /// Configuration file
    #[clap(long, default_value = envhub::arguments::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Use exponential reconnect backoff instead of a fixed delay
    #[clap(long)]
    backoff: bool,

    /// Give up after this many failed reconnect attempts (requires --backoff)
    #[clap(long)]
    max_attempts: Option<u32>,

    /// Stop after this many seconds
    #[clap(long)]
    duration: Option<u64>,
}

fn connector_config(args: &Args) -> anyhow::Result<ConnectorConfig> {
    let mut cfg = config::read_config_file(&args.config)
        .with_context(|| format!("loading {}", args.config))?
        .connector;

    if let Some(url) = &args.url {
        cfg.url = url.clone();
    }
    if args.backoff {
        cfg.backoff.enabled = true;
    }
    if let Some(max_attempts) = args.max_attempts {
        cfg.backoff.max_attempts = max_attempts;
    }
    cfg.validate().map_err(anyhow::Error::msg)?;
    Ok(cfg)
}

fn print_event(event: &ConnectorEvent) {
    let time = chrono::Local::now().format("%H:%M:%S");
    match event {
        ConnectorEvent::StateChanged(state) => {
            let label = match state {
                ConnectionState::Connected => state.to_string().green(),
                ConnectionState::Connecting => state.to_string().yellow(),
                ConnectionState::Disconnected => state.to_string().red(),
            };
            println!("{} {} {}", time, "STATE".bold(), label);
        }
        ConnectorEvent::StatusUpdate(update) => println!(
            "{} {} {} {}",
            time,
            "STATUS".cyan().bold(),
            update.environment_id.bold(),
            update.status
        ),
        ConnectorEvent::OperationUpdate(update) => println!(
            "{} {} {} {}",
            time,
            "OPERATION".magenta().bold(),
            update.operation_id.bold(),
            update.update
        ),
        ConnectorEvent::Subscribed(environments) => {
            println!("{} {} {:?}", time, "SUBSCRIBED".dimmed(), environments)
        }
        ConnectorEvent::Unsubscribed(environments) => {
            println!("{} {} {:?}", time, "UNSUBSCRIBED".dimmed(), environments)
        }
        ConnectorEvent::GaveUp { attempts } => println!(
            "{} {} after {} attempts",
            time,
            "GAVE UP".red().bold(),
            attempts
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init();

    let cfg = connector_config(&args)?;
    println!("Watching {} for {:?}", cfg.url.bold(), args.environments);

    let (handle, mut events) = Connector::spawn(&cfg)?;
    if let Some(token) = &args.token {
        handle.authenticate(json!({ "token": token }));
    }
    if !args.environments.is_empty() {
        handle.subscribe(args.environments.clone());
    }

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    print_event(&event);
                    if matches!(event, ConnectorEvent::GaveUp { .. }) {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
        }
    }

    handle.shutdown();
    handle.join().await;
    Ok(())
}
