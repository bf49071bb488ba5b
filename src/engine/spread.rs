//! Cross-venue funding spread computation.

use crate::models::funding::{AssetMapping, FundingSpread, VenueSnapshot};

/// Computes normalized cross-venue spreads from two venue snapshots and a
/// curated mapping set.
pub struct SpreadCalculator {
    mappings: Vec<AssetMapping>,
}

impl SpreadCalculator {
    pub fn new(mappings: Vec<AssetMapping>) -> Self {
        Self { mappings }
    }

    /// Compute one spread per fully-mapped asset.
    ///
    /// Each side is annualized with its own venue's payment frequency
    /// before differencing; `spread` / `annual_spread` are `a` minus `b`
    /// per-period and annualized respectively. The venue with the higher
    /// rate pays more and becomes the short leg; if the rates are equal
    /// there is no trade and the asset is skipped. Assets missing a rate
    /// on either side are excluded: they stay visible in the all-rates
    /// listing but are not arbitrage candidates.
    pub fn compute(&self, a: &VenueSnapshot, b: &VenueSnapshot) -> Vec<FundingSpread> {
        let mut spreads = Vec::new();

        for mapping in &self.mappings {
            let rate_a = match a.rate(mapping.symbol_on(a.exchange)) {
                Some(rate) => rate,
                None => continue,
            };
            let rate_b = match b.rate(mapping.symbol_on(b.exchange)) {
                Some(rate) => rate,
                None => continue,
            };

            let annual_a = rate_a.annual_rate();
            let annual_b = rate_b.annual_rate();
            let annual_spread = annual_a - annual_b;
            if annual_spread == 0.0 {
                continue;
            }

            // Short the side paying more, long the side paying less.
            let (long_side, short_side) = if annual_spread > 0.0 {
                (rate_b, rate_a)
            } else {
                (rate_a, rate_b)
            };

            spreads.push(FundingSpread {
                canonical: mapping.canonical.clone(),
                long_exchange: long_side.exchange,
                short_exchange: short_side.exchange,
                long_rate: long_side.rate,
                short_rate: short_side.rate,
                spread: rate_a.rate - rate_b.rate,
                annual_spread,
                long_mark_price: long_side.mark_price,
                short_mark_price: short_side.mark_price,
            });
        }

        spreads
    }

    pub fn mappings(&self) -> &[AssetMapping] {
        &self.mappings
    }
}
