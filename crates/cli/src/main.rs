//! Likeness CLI - Database migrations and identity diagnostics.
//!
//! # Usage
//!
//! ```bash
//! # Apply identity database migrations
//! likeness migrate
//!
//! # Show how an address is classified and canonicalized
//! likeness classify J.Doe+work@gmail.com
//!
//! # Find the user owning an address
//! likeness lookup jdoe@gmail.com
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `classify` - Print domain classification, canonical form and fingerprint
//! - `lookup` - Resolve the owning user of an address

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "likeness")]
#[command(author, version, about = "Likeness identity engine tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Classify an email address and print its canonical form
    Classify {
        /// Email address to classify
        email: String,
    },
    /// Look up the user owning an email address
    Lookup {
        /// Email address to resolve
        email: String,
    },
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Classify { email } => commands::identity::classify(&email).await?,
        Commands::Lookup { email } => commands::identity::lookup(&email).await?,
    }
    Ok(())
}
