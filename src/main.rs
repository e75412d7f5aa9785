use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use trendbot::api::{BinanceFuturesClient, Exchange};
use trendbot::config::BotConfig;
use trendbot::engine::{select_symbols, TradingEngine};
use trendbot::execution::Quantizer;
use trendbot::persistence::StateStore;
use trendbot::Result;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    tracing::info!("🚀 TrendBot starting");

    let config = BotConfig::load()?;
    if let Err(e) = config.validate_credentials() {
        tracing::error!("❌ {}", e);
        return Err(e.into());
    }

    let client = Arc::new(BinanceFuturesClient::new(
        config.binance_api_key.clone(),
        config.binance_api_secret.clone(),
        config.testnet,
    )?);

    let quantizer = load_quantizer(client.as_ref()).await;
    let symbols = select_symbols(&config, client.as_ref()).await;
    if symbols.is_empty() {
        return Err("No symbols to trade! Check SYMBOLS / MAX_PARALLEL_SYMBOLS.".into());
    }

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Network: {}", if config.testnet { "testnet" } else { "MAINNET" });
    tracing::info!("  Dry run: {}", config.dry_run);
    tracing::info!("  Timeframe: {}", config.timeframe);
    tracing::info!("  Risk: {}% (floor ${:.2})", config.risk_pct * 100.0, config.min_risk_usd);
    tracing::info!("  Leverage: {}x", config.leverage);
    tracing::info!("  Symbols: {}", symbols.join(", "));

    let store = StateStore::new(&config.state_file);
    tracing::info!("  State file: {}", store.path().display());
    let snapshot = store.load();

    let engine = TradingEngine::new(&config, client, quantizer, symbols);
    engine.configure_account().await;

    tracing::info!("\nPress Ctrl+C to stop...\n");
    engine.run(&store, snapshot).await?;

    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trendbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Exchange filters; an empty map leaves the fallback rounding in place
async fn load_quantizer<E: Exchange + ?Sized>(exchange: &E) -> Quantizer {
    match exchange.fetch_symbol_filters().await {
        Ok(filters) => {
            let quantizer = Quantizer::new(filters);
            if quantizer.is_empty() {
                tracing::warn!("Exchange returned no symbol filters, using fallback rounding");
            } else {
                tracing::info!("✅ Loaded symbol filters for {} markets", quantizer.len());
            }
            quantizer
        }
        Err(e) => {
            tracing::warn!("Failed to load symbol filters: {}", e);
            Quantizer::default()
        }
    }
}
