use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scavenger::coordinator::{CoordinatorConfig, CoordinatorServer};

#[derive(Parser)]
#[command(
    name = "scavenger",
    version,
    about = "Brute-force search coordinator for remote workers and live dashboards",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator
    Serve {
        /// Listen port (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Units per range (overrides SCAVENGER_RANGE_SIZE)
        #[arg(long)]
        range_size: Option<u64>,

        /// Search target (overrides SCAVENGER_TARGET)
        #[arg(long)]
        target: Option<String>,
    },

    /// Print the resolved configuration and command table
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    setup_tracing(&cli.log_format, cli.verbose)?;

    // Missing secret is fatal before anything binds
    let config = CoordinatorConfig::from_env().context("Failed to load coordinator configuration")?;

    match cli.command {
        Commands::Serve {
            port,
            range_size,
            target,
        } => {
            let config = apply_overrides(config, port, range_size, target)?;
            serve(config).await?;
        }

        Commands::Info => {
            let server = CoordinatorServer::new(config).context("Invalid coordinator configuration")?;
            println!("{}", server.info().display());
            println!();
            print!("{}", server.state().router.commands().display());
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("scavenger=debug,tower_http=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scavenger=info,warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

fn apply_overrides(
    mut config: CoordinatorConfig,
    port: Option<u16>,
    range_size: Option<u64>,
    target: Option<String>,
) -> Result<CoordinatorConfig> {
    if let Some(port) = port {
        config.bind_address.set_port(port);
    }
    if let Some(range_size) = range_size {
        config.range_size = range_size;
    }
    if let Some(target) = target {
        config.target = target;
    }

    config.validate().context("Invalid command-line override")?;
    Ok(config)
}

async fn serve(config: CoordinatorConfig) -> Result<()> {
    let server = CoordinatorServer::new(config).context("Failed to initialize coordinator")?;

    tracing::info!("scavenger coordinator starting");

    server
        .start_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("Coordinator server failed")?;

    Ok(())
}
