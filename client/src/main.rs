use auryx_client::{
    logging::init_tracing, AdjustedPriceFeed, OracleClient, OracleConfig, PriceFeed, TradingPair,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OracleConfig::from_env()?;
    init_tracing(config.log_level);

    tracing::info!("🚀 Starting Auryx client against {}", config.rpc_endpoint);
    let update_interval = config.update_interval();
    let client = OracleClient::new(config)?;

    let quote = client.get_price(TradingPair::SolUsd).await?;
    tracing::info!(
        "📊 SOL/USD: ${:.4} (confidence {:.2}, proof: {})",
        quote.price,
        quote.confidence,
        quote.proof.is_some()
    );

    let subscription = client.subscribe(TradingPair::SolUsd, |update| {
        tracing::info!("🔔 {} → ${:.4} at {}", update.pair, update.price, update.timestamp);
    });
    tokio::time::sleep(update_interval * 3 + update_interval / 2).await;
    subscription.unsubscribe();

    let adjusted = AdjustedPriceFeed::new(client.clone()).with_adjustment(TradingPair::SolUsd, 1.05)?;
    let quote = adjusted.get_price(TradingPair::SolUsd).await?;
    tracing::info!("📈 SOL/USD adjusted ×1.05: ${:.4}", quote.price);

    adjusted.set_adjustment(TradingPair::SolUsd, 1.10)?;
    let quote = adjusted.get_price(TradingPair::SolUsd).await?;
    tracing::info!("📈 SOL/USD adjusted ×1.10: ${:.4}", quote.price);

    tracing::info!("connected: {}", client.is_connected());
    client.cleanup();
    tracing::info!("✅ Done");

    Ok(())
}
