//! Price, market-cap, and curve-progress math.
//!
//! All reserve arithmetic stays in integers (u128 intermediates); the single
//! floating-point step is the final ratio division and USD scaling, which
//! bounds rounding error to the last conversion.

pub mod sol_price;

pub use sol_price::{FixedSolPrice, HttpSolPriceSource, SolPriceSource, DEFAULT_SOL_PRICE_USD};

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Launched tokens use 6 decimals on both the curve and the AMM.
pub const TOKEN_DECIMALS: u32 = 6;

/// Tokens allocated to the bonding curve at launch, in base units.
pub const DEFAULT_INITIAL_CURVE_TOKENS: u64 = 793_000_000_000_000;

/// A pool reserve at or above this share of total supply is treated as a
/// degenerate "pool holds everything" read.
const POOL_REMAINDER_SANITY_PCT: u128 = 98;

/// Circulating-supply estimate used when the pool-remainder read is
/// implausible.
const FALLBACK_CIRCULATING_RATIO: f64 = 0.80;

/// Token price in both quote units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenPrice {
    pub price_sol: f64,
    pub price_usd: f64,
}

impl TokenPrice {
    pub const ZERO: TokenPrice = TokenPrice { price_sol: 0.0, price_usd: 0.0 };
}

/// Price from a reserve pair: SOL-per-token after scaling each side by its
/// decimal precision, times the SOL/USD price.
///
/// A zero reserve on either side yields a zero price, not an error: freshly
/// created and fully drained curves both hit this.
pub fn price_from_reserves(token_reserve: u64, sol_reserve: u64, sol_price_usd: f64) -> TokenPrice {
    if token_reserve == 0 || sol_reserve == 0 {
        return TokenPrice::ZERO;
    }

    let numerator = sol_reserve as u128 * 10u128.pow(TOKEN_DECIMALS);
    let denominator = token_reserve as u128 * LAMPORTS_PER_SOL as u128;

    let price_sol = numerator as f64 / denominator as f64;
    TokenPrice {
        price_sol,
        price_usd: price_sol * sol_price_usd,
    }
}

/// Market capitalization in USD.
///
/// While a token trades on the curve (`pool_token_reserve = None`) the full
/// total supply counts as circulating. After graduation the tokens parked in
/// the pool are excluded; if the pool claims essentially the whole supply,
/// that read is treated as bogus and a fixed circulating ratio is used
/// instead.
pub fn market_cap_usd(price_usd: f64, total_supply: u64, pool_token_reserve: Option<u64>) -> f64 {
    let circulating_units: f64 = match pool_token_reserve {
        None => total_supply as f64,
        Some(pool_reserve) => {
            let implausible = total_supply == 0
                || pool_reserve as u128 * 100 >= total_supply as u128 * POOL_REMAINDER_SANITY_PCT;
            if implausible {
                total_supply as f64 * FALLBACK_CIRCULATING_RATIO
            } else {
                total_supply.saturating_sub(pool_reserve) as f64
            }
        }
    };

    price_usd * circulating_units / 10f64.powi(TOKEN_DECIMALS as i32)
}

/// Percentage of the curve allocation that has been sold, clamped to
/// [0, 100]. The account's `complete` flag is authoritative: when set,
/// progress is exactly 100 no matter what the reserves say.
pub fn curve_progress_pct(
    real_token_reserves: u64,
    initial_curve_tokens: u64,
    complete: bool,
) -> f64 {
    if complete {
        return 100.0;
    }
    if initial_curve_tokens == 0 {
        return 0.0;
    }

    let sold = initial_curve_tokens.saturating_sub(real_token_reserves);
    let pct = sold as f64 / initial_curve_tokens as f64 * 100.0;
    pct.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn test_price_basic() {
        // 30 SOL vs 1M tokens -> 0.00003 SOL per token.
        let price = price_from_reserves(1_000_000_000_000, 30_000_000_000, 100.0);
        assert!((price.price_sol - 0.00003).abs() < EPS);
        assert!((price.price_usd - 0.003).abs() < EPS);
    }

    #[test]
    fn test_price_zero_reserve_is_zero() {
        assert_eq!(price_from_reserves(0, 30_000_000_000, 100.0), TokenPrice::ZERO);
        assert_eq!(price_from_reserves(1_000_000, 0, 100.0), TokenPrice::ZERO);
    }

    #[test]
    fn test_price_symmetry_in_sol_usd() {
        // Doubling SOL/USD doubles the USD price and leaves price_sol alone.
        let base = price_from_reserves(500_000_000_000, 40_000_000_000, 80.0);
        let doubled = price_from_reserves(500_000_000_000, 40_000_000_000, 160.0);
        assert!((doubled.price_usd - 2.0 * base.price_usd).abs() < EPS);
        assert!((doubled.price_sol - base.price_sol).abs() < EPS);
    }

    #[test]
    fn test_market_cap_curve_phase_uses_full_supply() {
        // 1B tokens (6 decimals) at $0.001 -> $1M.
        let cap = market_cap_usd(0.001, 1_000_000_000_000_000, None);
        assert!((cap - 1_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_market_cap_graduated_excludes_pool() {
        // Pool holds 200M of the 1B supply -> 800M circulating.
        let cap = market_cap_usd(0.001, 1_000_000_000_000_000, Some(200_000_000_000_000));
        assert!((cap - 800_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_market_cap_degenerate_pool_read_falls_back() {
        // Pool claims 99% of supply: use the fixed 80% circulating estimate.
        let cap = market_cap_usd(0.001, 1_000_000_000_000_000, Some(990_000_000_000_000));
        assert!((cap - 800_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_progress_full_allocation_remaining_is_zero() {
        let pct = curve_progress_pct(793_000_000_000_000, 793_000_000_000_000, false);
        assert_eq!(pct, 0.0);
    }

    #[test]
    fn test_progress_midway() {
        // 400M of 793M remaining -> (393/793)*100 ~= 49.56%.
        let pct = curve_progress_pct(400_000_000_000_000, 793_000_000_000_000, false);
        assert!((pct - 49.558638).abs() < 1e-3);
    }

    #[test]
    fn test_progress_clamped() {
        // Reserves above the initial allocation clamp to 0, empty clamps to 100.
        assert_eq!(curve_progress_pct(900_000_000_000_000, 793_000_000_000_000, false), 0.0);
        assert_eq!(curve_progress_pct(0, 793_000_000_000_000, false), 100.0);
    }

    #[test]
    fn test_complete_flag_forces_100() {
        // Even with the full allocation still in reserve.
        let pct = curve_progress_pct(793_000_000_000_000, 793_000_000_000_000, true);
        assert_eq!(pct, 100.0);
    }
}
