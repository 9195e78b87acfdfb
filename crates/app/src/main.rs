mod admin;
mod api;
mod breeds;
mod dogs;
mod problem;
mod router;
mod telemetry;
#[cfg(test)]
mod test_support;

use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use kennel_storage::Database;
use kennel_util::{load_env_file, AdminCredentials, AppConfig};
use tracing::info;

/// Kennel: dog and breed records over HTTP.
#[derive(Parser, Debug)]
#[command(name = "kennel")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create the admin console account from APP_ADMIN_* variables
    InitAdmin,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, database).await,
        Command::InitAdmin => {
            let credentials = AdminCredentials::from_env();
            let outcome = admin::init_admin(&database, &credentials).await?;
            println!("{outcome}");
            Ok(())
        }
    }
}

async fn serve(config: AppConfig, database: Database) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = telemetry::init_metrics()?;
    let state = router::AppState::new(metrics, database, config.page_size, config.public_url);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
