//! Dry-run the quoting loop against the in-memory paper exchange.
//!
//! The book follows a random walk; resting quotes fill whenever the walk
//! trades through them. Stop with Ctrl-C, which withdraws all quotes first.
//!
//! ```text
//! cargo run --example paper_quoter -- demos/quoter.toml
//! ```

use anyhow::{Context, Result};
use avellaneda_quoter::{
    logging::init_tracing, Granularity, InstrumentRules, PaperExchange, QuoteCycleController,
    QuoterConfig,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::Duration;
use tokio::{sync::watch, time::interval};
use tracing::{info, warn};

const START_MID: f64 = 2_000.0;
const HALF_SPREAD: f64 = 0.25;
const WALK_STEP_BPS: f64 = 3.0;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => QuoterConfig::from_file(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => {
            warn!("no config path given, using built-in defaults");
            QuoterConfig::new("ETH/USDT:USDT")
        }
    };

    let exchange = PaperExchange::new(InstrumentRules {
        min_quantity: 0.001,
        min_notional: Some(5.0),
        quantity_granularity: Granularity::Decimals(3),
        price_granularity: Granularity::Increment(0.01),
    });
    exchange.set_fee_rate(0.0002).await;
    exchange
        .set_balance(config.instrument.quote_currency(), 10_000.0)
        .await;
    exchange
        .set_book(START_MID - HALF_SPREAD, START_MID + HALF_SPREAD)
        .await;

    let (stop_tx, stop_rx) = watch::channel(false);

    let walker = exchange.clone();
    let mut walk_stop = stop_rx.clone();
    let walk = tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        let mut mid = START_MID;
        let mut ticker = interval(Duration::from_millis(250));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let step = rng.gen_range(-WALK_STEP_BPS..=WALK_STEP_BPS) / 10_000.0;
                    mid *= 1.0 + step;
                    walker.set_book(mid - HALF_SPREAD, mid + HALF_SPREAD).await;
                }
                _ = walk_stop.changed() => break,
            }
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received");
        }
        let _ = stop_tx.send(true);
    });

    let mut controller = QuoteCycleController::new(exchange.clone(), config)
        .context("invalid quoter configuration")?;
    controller.run(stop_rx).await.context("cleanup failed")?;
    walk.await.context("market walk task panicked")?;

    let snapshot = controller.state().inventory_snapshot();
    info!(
        summary = %serde_json::to_string(&snapshot).context("failed to encode summary")?,
        fees = controller.state().inventory().total_fees(),
        resting = exchange.resting_orders().await.len(),
        "session finished"
    );
    Ok(())
}
