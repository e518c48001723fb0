//! Surplus front-end binary.

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use surplus::cli::{self, CliError};
use surplus::config::{ApiArgs, DEFAULT_LOG_FILTER, GateArgs, ServeArgs, StoreArgs};
use surplus::unix_now;
use surplus_client::ApiClient;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "surplus")]
#[command(about = "Surplus marketplace front end", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve(ServeArgs),

    /// Print how a path is classified
    Classify {
        path: String,
        #[command(flatten)]
        gate: GateArgs,
    },

    /// Run the access gate for a path against the stored session
    Check {
        path: String,
        #[command(flatten)]
        gate: GateArgs,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Manage the stored session
    Session {
        #[command(subcommand)]
        action: SessionAction,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Manage the local cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Supplier verification
    Verification {
        #[command(subcommand)]
        action: VerificationAction,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        api: ApiArgs,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Resolve a bearer token with the backend and store the session
    Login {
        token: String,
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Forget the stored session
    Logout,
    /// Print the stored session
    Show,
    /// Switch the active role
    Role { role: String },
}

#[derive(Subcommand)]
enum CartAction {
    /// Add units of a product
    Add {
        product_id: String,
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
        /// Unit price in cents
        #[arg(short, long)]
        price: u64,
    },
    /// Remove a product
    Remove { product_id: String },
    /// Print the cart
    Show,
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum VerificationAction {
    /// Print the review state
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Cli(#[from] CliError),

    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

async fn run(command: Command) -> Result<(), AppError> {
    let now = unix_now();
    match command {
        Command::Serve(args) => surplus::api::serve(args).await?,
        Command::Classify { path, gate } => {
            cli::cmd_classify(gate.access_gate().routes(), &path);
        }
        Command::Check { path, gate, store } => {
            cli::cmd_check(&store.store, &gate.access_gate(), &path, now)?;
        }
        Command::Session { action, store } => match action {
            SessionAction::Login { token, api } => {
                let client = ApiClient::new(api.api_url);
                cli::cmd_session_login(&store.store, &client, &token, now).await?;
            }
            SessionAction::Logout => {
                cli::cmd_session_logout(&store.store, now)?;
            }
            SessionAction::Show => {
                cli::cmd_session_show(&store.store, now)?;
            }
            SessionAction::Role { role } => {
                cli::cmd_session_role(&store.store, &role, now)?;
            }
        },
        Command::Cart { action, store } => match action {
            CartAction::Add {
                product_id,
                quantity,
                price,
            } => {
                cli::cmd_cart_add(&store.store, &product_id, quantity, price)?;
            }
            CartAction::Remove { product_id } => {
                cli::cmd_cart_remove(&store.store, &product_id)?;
            }
            CartAction::Show => {
                cli::cmd_cart_show(&store.store)?;
            }
            CartAction::Clear => cli::cmd_cart_clear(&store.store)?,
        },
        Command::Verification { action, store, api } => match action {
            VerificationAction::Status => {
                let client = ApiClient::new(api.api_url);
                cli::cmd_verification_status(&store.store, &client, now).await?;
            }
        },
    }
    Ok(())
}
