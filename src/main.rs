//! Polymarket trade-mirroring bot.
//!
//! Watches a tracked wallet's trade activity, mirrors its trades on the
//! CLOB, tracks resulting positions in a local holdings ledger, and
//! periodically redeems positions in resolved markets.

mod api;
mod bot;
mod config;
mod ledger;
mod models;
mod onchain;
mod trading;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::bot::Bot;
use crate::config::Config;

/// Polymarket trade-mirroring bot CLI.
#[derive(Parser)]
#[command(name = "polymirror")]
#[command(about = "Mirror a Polymarket wallet's trades", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start mirroring the tracked wallet
    Run,

    /// List current ledger holdings
    Holdings,

    /// Run one redemption sweep and exit
    Sweep,

    /// Place a manual market buy (amount in USDC)
    Buy {
        /// Outcome token ID
        token_id: String,

        /// USDC to spend
        amount: Decimal,

        /// Optional limit price (0 to 1)
        #[arg(short, long)]
        limit: Option<Decimal>,
    },

    /// Place a manual market sell (amount in tokens)
    Sell {
        /// Outcome token ID
        token_id: String,

        /// Tokens to sell
        amount: Decimal,

        /// Optional limit price (0 to 1)
        #[arg(short, long)]
        limit: Option<Decimal>,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_env()?;

    match cli.command {
        Commands::Run => {
            info!(
                tracked = %config.tracked_wallet,
                multiplier = %config.size_multiplier,
                redeem_interval_mins = config.redeem_interval_mins,
                "Starting polymirror"
            );

            println!("\n=== Polymarket Trade Mirror ===");
            println!("Tracked wallet:  {}", config.tracked_wallet);
            println!("Size multiplier: {}", config.size_multiplier);
            println!(
                "Max order:       {}",
                config
                    .max_order_amount
                    .map(|c| format!("${c}"))
                    .unwrap_or_else(|| "unlimited".to_string())
            );
            println!(
                "Copy trading:    {}",
                if config.copy_enabled { "enabled" } else { "DISABLED (log only)" }
            );
            println!(
                "Redemption:      {}",
                if config.redeem_interval_mins > 0 {
                    format!("every {} min", config.redeem_interval_mins)
                } else {
                    "disabled".to_string()
                }
            );
            println!("\nPress Ctrl+C to stop.\n");

            let bot = Bot::new(config).await?;
            bot.run().await?;
        }

        Commands::Holdings => {
            let bot = Bot::new(config).await?;
            let entries = bot.ledger().entries().await?;

            if entries.is_empty() {
                println!("No holdings.");
                return Ok(());
            }

            println!("\n{:<46} {:<24} {:>14}", "MARKET", "TOKEN", "QUANTITY");
            println!("{}", "-".repeat(86));
            for entry in entries {
                println!(
                    "{:<46} {:<24} {:>14}",
                    truncate(&entry.condition_id, 44),
                    truncate(&entry.token_id, 22),
                    entry.quantity
                );
            }
        }

        Commands::Sweep => {
            let bot = Bot::new(config).await?;
            let outcome = bot.sweeper().sweep().await;
            println!("Sweep: {outcome}");
        }

        Commands::Buy { token_id, amount, limit } => {
            let bot = Bot::new(config).await?;
            let result = bot.copier().place_market_buy(&token_id, amount, limit).await;
            print_order_result(&result);
        }

        Commands::Sell { token_id, amount, limit } => {
            let bot = Bot::new(config).await?;
            let result = bot.copier().place_market_sell(&token_id, amount, limit).await;
            print_order_result(&result);
        }

        Commands::Config => {
            println!("\n=== Configuration ===\n");
            println!("Tracked wallet:    {}", config.tracked_wallet);
            println!("Size multiplier:   {}", config.size_multiplier);
            println!(
                "Max order amount:  {}",
                config
                    .max_order_amount
                    .map(|c| format!("${c}"))
                    .unwrap_or_else(|| "unlimited".to_string())
            );
            println!("Order type:        {}", config.order_type.as_str());
            println!("Tick size:         {}", config.tick_size.value());
            println!("Neg risk:          {}", config.neg_risk);
            println!("Copy enabled:      {}", config.copy_enabled);
            println!("Redeem interval:   {} min", config.redeem_interval_mins);
            println!("Chain ID:          {}", config.chain_id);
            println!("CLOB URL:          {}", config.clob_url);
            println!("Feed URL:          {}", config.feed_url);
            println!("RPC URL:           {}", config.rpc_url);
            println!("Database:          {}", config.database_url);
        }
    }

    Ok(())
}

fn print_order_result(result: &crate::models::OrderResult) {
    if result.success {
        println!("Order placed: {:?}", result.order_id);
        for tx in &result.transaction_hashes {
            println!("  settlement tx: {tx}");
        }
    } else {
        println!("Order failed: {}", result.error.as_deref().unwrap_or("unknown"));
    }
}

/// Truncate a string with ellipsis if too long.
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}
