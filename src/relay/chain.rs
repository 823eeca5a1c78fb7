//! Destination chain access
//!
//! The relay needs three things from the chain it answers on: the signer's
//! transaction count, the suggested gas price and raw transaction submission.

use alloy_primitives::{Address, Bytes, B256};
use alloy_provider::{Provider, ProviderBuilder};
use async_trait::async_trait;
use tracing::debug;

use super::decoder::RawLog;
use crate::error::{RelayError, RelayResult};

#[async_trait]
pub trait OracleChain: Send + Sync {
    async fn transaction_count(&self, account: Address) -> RelayResult<u64>;

    /// Network suggested gas price in wei
    async fn gas_price(&self) -> RelayResult<u128>;

    /// Broadcast a signed, EIP-2718 encoded transaction
    async fn send_raw_transaction(&self, raw: Bytes) -> RelayResult<B256>;
}

/// JSON-RPC implementation of [`OracleChain`]
pub struct RpcOracleChain {
    rpc_url: reqwest::Url,
}

impl RpcOracleChain {
    pub fn new(rpc_url: &str) -> RelayResult<Self> {
        let rpc_url = reqwest::Url::parse(rpc_url)
            .map_err(|e| RelayError::Config(format!("invalid destination RPC URL: {}", e)))?;
        Ok(Self { rpc_url })
    }

    /// Logs emitted by a mined transaction, for relaying a past request
    pub async fn transaction_logs(&self, tx_hash: B256) -> RelayResult<Vec<RawLog>> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.clone());

        let receipt = provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| RelayError::Submission(e.to_string()))?
            .ok_or_else(|| RelayError::InvalidInput(format!("no receipt for {}", tx_hash)))?;

        let logs: Vec<RawLog> = receipt
            .inner
            .logs()
            .iter()
            .map(|log| RawLog {
                address: log.inner.address,
                topics: log.inner.data.topics().to_vec(),
                data: log.inner.data.data.clone(),
            })
            .collect();

        debug!("Fetched {} logs from {}", logs.len(), tx_hash);
        Ok(logs)
    }
}

#[async_trait]
impl OracleChain for RpcOracleChain {
    async fn transaction_count(&self, account: Address) -> RelayResult<u64> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.clone());
        provider
            .get_transaction_count(account)
            .await
            .map_err(|e| RelayError::Submission(format!("nonce lookup failed: {}", e)))
    }

    async fn gas_price(&self) -> RelayResult<u128> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.clone());
        provider
            .get_gas_price()
            .await
            .map_err(|e| RelayError::Submission(format!("gas price lookup failed: {}", e)))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> RelayResult<B256> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url.clone());
        let pending = provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| RelayError::Submission(format!("send failed: {}", e)))?;
        Ok(*pending.tx_hash())
    }
}
