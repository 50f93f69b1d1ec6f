//! Emergency liquidation: market-sell every position in the account
//!
//! Usage: cargo run --bin close_all -- --config config.yaml [--dry-run]

use anyhow::Context;
use clap::Parser;
use moextrader::broker::{Broker, TinkoffBroker};
use moextrader::execution::close_positions;
use moextrader::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "close_all", about = "Sell all open positions at market")]
struct Args {
    /// Path to the YAML config file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// List positions without placing orders
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let cfg = AppConfig::load(&args.config).context("failed to load configuration")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level)),
        )
        .init();

    let broker = TinkoffBroker::connect(&cfg.tinkoff)
        .await
        .context("failed to connect to broker")?;
    let portfolio = broker.portfolio().await.context("failed to load portfolio")?;

    if portfolio.positions.is_empty() {
        println!("No open positions.");
        return Ok(());
    }

    println!("Found {} position(s):\n", portfolio.positions.len());
    for p in &portfolio.positions {
        println!(
            "  {}: {:.0} шт ({:.0} лот), ср.цена {:.2}, текущая {:.2}, P&L {:.2}",
            p.ticker, p.quantity, p.quantity_lots, p.avg_price, p.current_price, p.pnl
        );
    }
    println!();

    if args.dry_run {
        println!("Dry run, no orders placed.");
        return Ok(());
    }

    let report = close_positions(&broker, &portfolio.positions).await;
    for (ticker, reason) in &report.failed {
        eprintln!("  [FAIL] {}: {}", ticker, reason);
    }
    println!(
        "\nDone: {} closed, {} failed.",
        report.closed.len(),
        report.failed.len()
    );

    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}
