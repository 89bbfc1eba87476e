//! Funnelkit CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! funnelkit migrate
//!
//! # Seed a demo funnel (and optionally an offline API credential)
//! funnelkit seed -s demo.myshopify.com -t 1 -o 2 -d 20 --access-token shpat_...
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Seed a funnel and offline credentials for local testing

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "funnelkit")]
#[command(author, version, about = "Funnelkit CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed a demo funnel for local testing
    Seed {
        /// Shop domain the funnel belongs to
        #[arg(short, long)]
        shop: String,

        /// Trigger product id (bare integer or gid)
        #[arg(short, long)]
        trigger: String,

        /// Offer product id (bare integer or gid)
        #[arg(short, long)]
        offer: String,

        /// Discount percentage (0-90)
        #[arg(short, long, default_value_t = 20)]
        discount: i32,

        /// Offline Admin API access token to store for the shop
        #[arg(long)]
        access_token: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed {
            shop,
            trigger,
            offer,
            discount,
            access_token,
        } => {
            commands::seed::run(&shop, &trigger, &offer, discount, access_token.as_deref())
                .await?;
        }
    }
    Ok(())
}
