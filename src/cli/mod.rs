//! # Command Line Interface
//!
//! `serve` (the default) runs the HTTP API; `migrate` and
//! `bootstrap-super-admin` are one-shot maintenance commands.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::api::{start_api_server, ApiState};
use crate::auth::{bootstrap_super_admin, BootstrapOutcome};
use crate::config::AppConfig;
use crate::mail::{SharedMailer, SmtpMailer};
use crate::observability::{init_logging, init_observability, log_config_info};
use crate::storage::{create_pool, list_applied_migrations, run_migrations, SqlxUserRepository};
use crate::{APP_NAME, VERSION};

#[derive(Parser)]
#[command(name = "schoolhub")]
#[command(about = "Multi-tenant school management backend")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Database URL override
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP API server
    Serve,

    /// Apply pending database migrations
    Migrate {
        /// Print the applied migrations afterwards
        #[arg(long)]
        list: bool,
    },

    /// Create the configured super admin account if none exists
    BootstrapSuperAdmin,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = crate::config::load().context("failed to load configuration")?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Migrate { list } => {
            init_logging(&config.observability)?;
            migrate(&config, list).await
        }
        Commands::BootstrapSuperAdmin => {
            init_logging(&config.observability)?;
            bootstrap(&config).await
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    init_observability(&config.observability)?;
    info!(app_name = APP_NAME, version = VERSION, "Starting school management API");
    log_config_info(&config);

    let pool = create_pool(&config.database).await.context("failed to open database")?;
    let mailer: SharedMailer = Arc::new(SmtpMailer::new(&config.mail)?);

    let config = Arc::new(config);
    let state = ApiState::new(config.clone(), pool, mailer)?;
    start_api_server(&config.server, state).await?;
    Ok(())
}

async fn migrate(config: &AppConfig, list: bool) -> anyhow::Result<()> {
    let pool = create_pool(&config.database).await.context("failed to open database")?;
    run_migrations(&pool).await.context("failed to apply migrations")?;
    println!("Migrations completed successfully");

    if list {
        for migration in list_applied_migrations(&pool).await? {
            println!(
                "{:<16} {:<40} {}",
                migration.version,
                migration.description,
                migration.installed_on.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }
    Ok(())
}

async fn bootstrap(config: &AppConfig) -> anyhow::Result<()> {
    let pool = create_pool(&config.database).await.context("failed to open database")?;
    run_migrations(&pool).await.context("failed to apply migrations")?;

    let users = SqlxUserRepository::new(pool.clone());
    match bootstrap_super_admin(&pool, &users, &config.auth.super_admin).await? {
        BootstrapOutcome::Created(user) => println!("Super admin created: {}", user.email),
        BootstrapOutcome::AlreadyExists => println!("Super admin already exists"),
    }
    Ok(())
}
