//! Gas Price Oracle - submission pricing
//!
//! Oracle answers are priced off the destination chain's suggested gas
//! price with a fixed multiplier, enough to ride out short-lived spikes
//! without manual tuning.

use tracing::debug;

use crate::error::{RelayError, RelayResult};
use crate::relay::OracleChain;

// ============================================
// CONSTANTS
// ============================================

/// Default multiplier over the suggested price (1.5x)
pub const DEFAULT_GAS_MULTIPLIER_PCT: u64 = 150;

/// Default gas limit for a price submission
pub const DEFAULT_GAS_LIMIT: u64 = 1_500_000;

// ============================================
// GAS ORACLE
// ============================================

#[derive(Debug, Clone, Copy)]
pub struct GasOracle {
    multiplier_pct: u64,
    gas_limit: u64,
}

impl Default for GasOracle {
    fn default() -> Self {
        Self {
            multiplier_pct: DEFAULT_GAS_MULTIPLIER_PCT,
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

impl GasOracle {
    pub fn new(multiplier_pct: u64, gas_limit: u64) -> RelayResult<Self> {
        if multiplier_pct < 100 {
            return Err(RelayError::Config(format!(
                "gas multiplier must be at least 100%, got {}%",
                multiplier_pct
            )));
        }
        if gas_limit == 0 {
            return Err(RelayError::Config("gas limit must be non-zero".to_string()));
        }
        Ok(Self { multiplier_pct, gas_limit })
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// `suggested * multiplier / 100`, saturating
    pub fn apply(&self, suggested_wei: u128) -> u128 {
        suggested_wei.saturating_mul(self.multiplier_pct as u128) / 100
    }

    /// Gas price for the next submission, read fresh from the chain
    pub async fn submission_gas_price<C>(&self, chain: &C) -> RelayResult<u128>
    where
        C: OracleChain + ?Sized,
    {
        let suggested = chain.gas_price().await?;
        let price = self.apply(suggested);

        debug!(
            "⛽ Gas: suggested {:.2} gwei, submitting at {:.2} gwei",
            suggested as f64 / 1e9,
            price as f64 / 1e9
        );

        Ok(price)
    }
}

// ============================================
// TESTS
// ============================================
