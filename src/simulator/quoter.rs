//! Exchange quoter - bundle simulation against overridden state
//!
//! Each quote runs as a fresh throwaway account that holds one unit of the
//! input token only because of the storage overrides, approves the exchange
//! and swaps. The exchange call's return value is the quote.

use alloy_primitives::{Address, U256};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use serde::Serialize;
use tracing::debug;

use super::bundle::{IExchange, SimulationBundle};
use super::client::SimulationBackend;
use super::overrides::StorageOverrideComputer;
use crate::error::{RelayError, RelayResult};
use crate::relay::PriceRequest;
use crate::tokens::TokenSettings;

/// Result of one quote simulation.
///
/// `tokens_received == 0` means the exchange call failed in simulation: the
/// pair is unpriceable right now, which is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuoteResult {
    pub amount_in: U256,
    pub tokens_received: U256,
    pub decimals: Option<u8>,
}

impl QuoteResult {
    pub fn unavailable(amount_in: U256) -> Self {
        Self { amount_in, tokens_received: U256::ZERO, decimals: None }
    }

    pub fn is_available(&self) -> bool {
        !self.tokens_received.is_zero() && self.decimals.is_some()
    }
}

/// Quotes `fromToken -> toToken` by simulating an exchange swap
pub struct QuoteSimulator {
    exchange: Address,
    overrides: StorageOverrideComputer,
    tokens: TokenSettings,
}

impl QuoteSimulator {
    pub fn new(exchange: Address, overrides: StorageOverrideComputer, tokens: TokenSettings) -> Self {
        Self { exchange, overrides, tokens }
    }

    /// Decimals from the override table, else `decimals()` on chain
    pub async fn resolve_decimals<B>(&self, token: Address, backend: &B) -> RelayResult<u8>
    where
        B: SimulationBackend + ?Sized,
    {
        match self.tokens.decimals_override(&token) {
            Some(decimals) => Ok(decimals),
            None => backend.token_decimals(token).await,
        }
    }

    /// Simulate the swap for `request` and extract the output amount
    pub async fn simulate<B>(&self, request: &PriceRequest, backend: &B) -> RelayResult<QuoteResult>
    where
        B: SimulationBackend + ?Sized,
    {
        let from_decimals = self.resolve_decimals(request.from_token, backend).await?;

        let amount_in = match request.amount {
            Some(amount) if !amount.is_zero() => amount,
            _ => one_unit(from_decimals)?,
        };

        // never funded, never reused
        let sender = PrivateKeySigner::random().address();

        let skip = self.tokens.skip_slot(&request.from_token);
        let overrides = self.overrides.compute(request.from_token, sender, amount_in, skip)?;

        let bundle = SimulationBundle::quote(
            sender,
            self.exchange,
            request.from_token,
            request.to_token,
            amount_in,
        );

        let traces = backend.simulate_bundle(&bundle, &overrides).await?;

        let exchange_trace = traces.get(SimulationBundle::EXCHANGE_INDEX).ok_or_else(|| {
            RelayError::MalformedSimulationResult(format!(
                "expected {} call results, got {}",
                bundle.calls.len(),
                traces.len()
            ))
        })?;

        if !exchange_trace.success {
            debug!(
                "Exchange call failed in simulation: {:?} -> {:?}",
                request.from_token, request.to_token
            );
            return Ok(QuoteResult::unavailable(amount_in));
        }

        let tokens_received = IExchange::exchangeCall::abi_decode_returns(&exchange_trace.output)
            .map_err(|e| {
                RelayError::MalformedSimulationResult(format!("exchange output: {}", e))
            })?;

        // only needed once there is something to submit
        let to_decimals = self.resolve_decimals(request.to_token, backend).await?;

        debug!(
            "Quoted {} of {:?} -> {} of {:?} ({} decimals)",
            amount_in, request.from_token, tokens_received, request.to_token, to_decimals
        );

        Ok(QuoteResult {
            amount_in,
            tokens_received,
            decimals: Some(to_decimals),
        })
    }
}

/// `10^decimals`
fn one_unit(decimals: u8) -> RelayResult<U256> {
    U256::from(10u64)
        .checked_pow(U256::from(decimals))
        .ok_or_else(|| RelayError::InvalidInput(format!("{} decimals overflow a uint256", decimals)))
}
