//! Relayer key and transaction signing
//!
//! The relayer key is the only credential this crate holds. Never log it.
//! Nonces are supplied by the caller: the batch context owns the sequence.

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use std::str::FromStr;
use tracing::debug;

use crate::error::{RelayError, RelayResult};

/// A signed transaction ready for broadcast
#[derive(Debug, Clone)]
pub struct SignedSubmission {
    pub hash: B256,
    pub raw: Bytes,
}

/// Signs oracle submissions on the destination chain
pub struct RelaySigner {
    signer: PrivateKeySigner,
    chain_id: u64,
}

impl RelaySigner {
    pub fn from_key(private_key: &str, chain_id: u64) -> RelayResult<Self> {
        let key = private_key.trim().trim_start_matches("0x");
        let signer = PrivateKeySigner::from_str(key)
            .map_err(|e| RelayError::Config(format!("invalid relayer private key: {}", e)))?;
        Ok(Self { signer, chain_id })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Sign a legacy (gas price) call with an explicit nonce
    pub async fn sign_legacy_transaction(
        &self,
        to: Address,
        calldata: Bytes,
        nonce: u64,
        gas_limit: u64,
        gas_price: u128,
    ) -> RelayResult<SignedSubmission> {
        let tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(to),
            value: U256::ZERO,
            input: calldata,
        };

        let sig_hash = tx.signature_hash();
        let signature = self
            .signer
            .sign_hash(&sig_hash)
            .await
            .map_err(|e| RelayError::Signing(e.to_string()))?;

        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        let hash = *envelope.tx_hash();
        let raw = Bytes::from(envelope.encoded_2718());

        debug!(
            "Signed legacy transaction: to={:?}, nonce={}, gas_limit={}, gas_price={}",
            to, nonce, gas_limit, gas_price
        );

        Ok(SignedSubmission { hash, raw })
    }
}
