use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use server::AppState;
use server::database::{NewUser, SqliteUserRepository, UserRepository};
use shared::config::load_config;

#[derive(Debug, Parser)]
#[command(name = "auth-server", version, about = "JWT authentication server")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "AUTH_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Add a user to the configured database
    CreateUser {
        #[arg(long)]
        username: String,

        #[arg(long, env = "AUTH_NEW_USER_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long, default_value = "")]
        nick_name: String,

        /// Current authority of the new user
        #[arg(long, default_value = "888")]
        authority: String,

        /// Additional authorities the user may switch to (repeatable)
        #[arg(long = "extra-authority")]
        extra_authorities: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.to_string_lossy().into_owned();
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let addr = config.server.addr();
            let state = AppState::from_config(config).await?;
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind to {}", addr))?;

            server::serve(listener, state, shutdown_signal()).await?;
            info!("Server stopped");
        }
        Command::CreateUser {
            username,
            password,
            nick_name,
            authority,
            extra_authorities,
        } => {
            let repo = SqliteUserRepository::connect(
                &config.database.url,
                config.database.max_connections,
            )
            .await
            .context("Failed to open user database")?;

            let identity = repo
                .create_user(NewUser {
                    nick_name: if nick_name.is_empty() {
                        username.clone()
                    } else {
                        nick_name
                    },
                    username,
                    password,
                    authority_id: authority,
                    extra_authorities,
                })
                .await
                .context("Failed to create user")?;

            info!(
                "Created user {} (id {}, uuid {}) with authorities {:?}",
                identity.username, identity.id, identity.uuid, identity.authority_ids
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
