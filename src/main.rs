use arbitrix::engine::{AllocationEngine, RankedSelector, SpreadCalculator};
use arbitrix::models::funding::{ExchangeId, FundingRate, VenueSnapshot};
use arbitrix::models::strategy::StrategyConfig;
use chrono::Utc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = StrategyConfig::default();
    config.number_of_pairs = 3;
    config.min_spread_threshold_pct = 10.0;
    config.validate()?;

    let now = Utc::now();

    let mut aster = VenueSnapshot::new(ExchangeId::Aster, now);
    aster.insert(FundingRate::new(ExchangeId::Aster, "BTCUSDT", 0.000110, 65_000.0));
    aster.insert(FundingRate::new(ExchangeId::Aster, "ETHUSDT", 0.000160, 3_400.0));
    aster.insert(FundingRate::new(ExchangeId::Aster, "SOLUSDT", 0.000240, 150.0));
    aster.insert(FundingRate::new(ExchangeId::Aster, "DOGEUSDT", 0.000030, 0.12));

    let mut hyperliquid = VenueSnapshot::new(ExchangeId::Hyperliquid, now);
    hyperliquid.insert(FundingRate::new(ExchangeId::Hyperliquid, "BTC", 0.0000012, 65_010.0));
    hyperliquid.insert(FundingRate::new(ExchangeId::Hyperliquid, "ETH", 0.0000030, 3_401.0));
    hyperliquid.insert(FundingRate::new(ExchangeId::Hyperliquid, "SOL", 0.0000061, 150.1));
    hyperliquid.insert(FundingRate::new(ExchangeId::Hyperliquid, "DOGE", 0.0000029, 0.12));

    let calculator = SpreadCalculator::new(config.mappings.clone());
    let spreads = calculator.compute(&aster, &hyperliquid);

    println!("Computed {} cross-venue spreads:", spreads.len());
    for spread in &spreads {
        println!(
            "  {}: long {} ({:.4}%/period) / short {} ({:.4}%/period) -> {:.1}% APR",
            spread.canonical,
            spread.long_exchange,
            spread.long_rate * 100.0,
            spread.short_exchange,
            spread.short_rate * 100.0,
            spread.annual_spread_abs() * 100.0
        );
    }
    println!();

    let selector = RankedSelector::from_config(&config);
    let report = selector.select(spreads, &Default::default());

    println!("Selected top {} of {} pairs:", report.selected.len(), config.number_of_pairs);
    for skipped in &report.skipped {
        println!("  skipped {}: {}", skipped.canonical, skipped.reason);
    }
    if let Some(ref warning) = report.shortfall_warning {
        println!("  warning: {}", warning);
    }
    println!();

    let allocator = AllocationEngine::from_config(&config)?;
    let allocations = allocator.size(report.selected.len());

    println!("Planned positions (${:.2} total):", allocator.total_capital());
    for (spread, allocation) in report.selected.iter().zip(&allocations) {
        println!(
            "  rank {}: {} at {:.1}% -> ${:.2} (${:.2} long {} / ${:.2} short {})",
            allocation.rank,
            spread.canonical,
            allocation.pct,
            allocation.notional_usd,
            allocation.leg_usd,
            spread.long_exchange,
            allocation.leg_usd,
            spread.short_exchange
        );
    }

    Ok(())
}
