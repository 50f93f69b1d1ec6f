use anyhow::Context;
use clap::Parser;
use moextrader::api::MoexClient;
use moextrader::broker::TinkoffBroker;
use moextrader::db::{self, Ledger, MemoryLedger, PostgresLedger};
use moextrader::llm::DeepSeekClient;
use moextrader::notify::{Notifier, TelegramNotifier};
use moextrader::{AppConfig, Scheduler, SchedulerSettings, Services};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "moextrader", about = "AI-driven trading bot for MOEX equities")]
struct Args {
    /// Path to the YAML config file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let cfg = AppConfig::load(&args.config).context("failed to load configuration")?;
    setup_logging(&cfg.logging.level);

    let mode = if cfg.is_sandbox() { "SANDBOX" } else { "LIVE" };
    tracing::info!("🚀 MOEX trader starting ({} mode)", mode);

    let ledger = open_ledger(&cfg).await?;
    match db::reconcile(ledger.as_ref()).await {
        Ok(report) if !report.unpaired_closed_buys.is_empty() => tracing::warn!(
            "⚠️  {} closed positions have no SELL record",
            report.unpaired_closed_buys.len()
        ),
        Ok(_) => {}
        Err(e) => tracing::warn!("Ledger check failed: {}", e),
    }

    let broker = Arc::new(
        TinkoffBroker::connect(&cfg.tinkoff)
            .await
            .context("failed to connect to broker")?,
    );
    tracing::info!("🏦 Trading account {}", broker.account_id());

    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(&cfg.telegram));
    let services = Services {
        broker,
        market: Arc::new(MoexClient::new()?),
        ai: Arc::new(DeepSeekClient::new(&cfg.deepseek)),
        ledger,
        notifier: notifier.clone(),
    };
    let scheduler = Arc::new(Scheduler::new(services, SchedulerSettings::from_config(&cfg)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut driver = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    notifier
        .notify_status(&format!("🤖 MOEX trader запущен ({})", mode))
        .await;
    tracing::info!("Press Ctrl+C to stop...");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, finishing current cycle...");
            let _ = shutdown_tx.send(true);
            if let Err(e) = driver.await {
                tracing::error!("Scheduler task failed: {}", e);
            }
        }
        result = &mut driver => {
            tracing::error!("Scheduler exited unexpectedly: {:?}", result);
        }
    }

    notifier.notify_status("🛑 MOEX trader остановлен").await;
    tracing::info!("👋 MOEX trader stopped");
    Ok(())
}

fn setup_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("moextrader={}", level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn open_ledger(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Ledger>> {
    let url = if cfg.database.url.is_empty() {
        std::env::var("DATABASE_URL").unwrap_or_default()
    } else {
        cfg.database.url.clone()
    };

    if url.is_empty() {
        tracing::warn!("No database configured, trade history is kept in memory only");
        return Ok(Arc::new(MemoryLedger::new()));
    }

    let ledger = PostgresLedger::connect(&url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(Arc::new(ledger))
}
