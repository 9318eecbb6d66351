use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use location_cascade::cascade::{CascadeController, CascadeHandle, Snapshot};
use location_cascade::config::Settings;
use location_cascade::location::{Level, LocationService, Scope};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Location Cascade: country → state → city picker
///
/// Looks up countries, states and cities from the remote location service and
/// drives the dependent selection cascade.
///
/// Examples:
///   cascade countries
///   cascade states India
///   cascade cities India Goa
///   cascade pick --country India --state Goa --city Panaji
///   cascade serve --port 3000
#[derive(Parser)]
#[command(name = "cascade", version, about, long_about = None)]
struct Cli {
    /// Config file (TOML). Defaults to <config dir>/location-cascade/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Location service base URL.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all countries.
    Countries,
    /// List the states of a country.
    States { country: String },
    /// List the cities of a state.
    Cities { country: String, state: String },
    /// Walk the cascade and print the final state as JSON.
    Pick {
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        city: Option<String>,
    },
    /// Serve the cascade as a JSON API.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url {
        settings.base_url = base_url;
    }
    if let Some(timeout) = cli.timeout_secs {
        settings.timeout_secs = timeout;
    }
    let service = Arc::new(settings.location_service()?);

    match cli.command {
        Command::Countries => lookup(service.as_ref(), Scope::Countries).await,
        Command::States { country } => lookup(service.as_ref(), Scope::States { country }).await,
        Command::Cities { country, state } => {
            lookup(service.as_ref(), Scope::Cities { country, state }).await
        }
        Command::Pick { country, state, city } => {
            let cascade = CascadeController::spawn(service);
            let result = pick(&cascade, country, state, city).await;
            cascade.shutdown().await;
            result
        }
        Command::Serve { host, port } => {
            let host = host.unwrap_or(settings.server_host);
            let port = port.unwrap_or(settings.server_port);
            let cascade = CascadeController::spawn(service);
            location_cascade::server::start(&host, port, cascade)
                .await
                .with_context(|| format!("server on {}:{} failed", host, port))
        }
    }
}

async fn lookup(service: &dyn LocationService, scope: Scope) -> anyhow::Result<()> {
    let list = service
        .lookup(&scope)
        .await
        .with_context(|| scope.failure_message())?;
    println!("{}", serde_json::to_string_pretty(&list)?);
    Ok(())
}

async fn pick(
    cascade: &CascadeHandle,
    country: Option<String>,
    state: Option<String>,
    city: Option<String>,
) -> anyhow::Result<()> {
    let mut snapshot = cascade.wait_idle().await?;
    check(&snapshot)?;

    let steps = [(Level::Country, country), (Level::State, state), (Level::City, city)];
    for (level, value) in steps {
        let Some(value) = value else { continue };
        if !snapshot.level(level).options.contains(&value) {
            tracing::warn!("'{}' is not among the offered {}", value, level.plural());
        }
        cascade.select(level, value).await?;
        snapshot = cascade.wait_idle().await?;
        check(&snapshot)?;
    }

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    if let Some(summary) = &snapshot.summary {
        eprintln!("  {}", summary);
    }
    Ok(())
}

fn check(snapshot: &Snapshot) -> anyhow::Result<()> {
    if let Some(error) = &snapshot.error {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        bail!("{}", error);
    }
    Ok(())
}
