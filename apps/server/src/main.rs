use std::net::SocketAddr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use conducky_config::load as load_config;
use conducky_gateway::{create_router, GatewayState};
use conducky_runtime::{telemetry, BackendServices};
use tokio::net::TcpListener;
use tracing::info;

mod commands;

#[derive(Parser)]
#[command(name = "conducky-server")]
#[command(about = "Conducky backend (serves HTTP by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Grant the global SuperAdmin role to an existing user
    GrantSuperAdmin {
        #[arg(long)]
        email: String,
    },
    /// Delete a user and detach them from everything they authored
    CleanupUser {
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing().context("failed to initialise tracing")?;
    let config = load_config().context("failed to load configuration")?;

    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(services, &config).await,
        Commands::Migrate => {
            info!("database migrations applied");
            Ok(())
        }
        Commands::GrantSuperAdmin { email } => {
            let granted = commands::grant_super_admin(&services.db_pool, &email).await?;
            if granted {
                println!("{email} is now a SuperAdmin");
            } else {
                println!("{email} already holds SuperAdmin");
            }
            Ok(())
        }
        Commands::CleanupUser { email } => {
            let summary = commands::cleanup_user(&services.db_pool, &email).await?;
            println!("Removed {email}:");
            println!("  sessions:         {}", summary.sessions);
            println!("  reset tokens:     {}", summary.reset_tokens);
            println!("  social accounts:  {}", summary.social_accounts);
            println!("  event roles:      {}", summary.event_roles);
            println!("  global roles:     {}", summary.global_roles);
            println!("  memberships:      {}", summary.memberships);
            println!("  notifications:    {}", summary.notifications);
            println!("  detached records: {}", summary.detached_records);
            Ok(())
        }
    }
}

async fn run_server(
    services: BackendServices,
    config: &conducky_config::AppConfig,
) -> anyhow::Result<()> {
    info!("starting Conducky backend");

    let state = GatewayState::from_parts(
        services.db_pool,
        services.authenticator,
        services.email,
        config,
    );
    let app = create_router(state);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(conducky_runtime::shutdown_signal())
    .await
    .context("http server error")?;

    info!("backend shut down");
    Ok(())
}
