//! Bundle simulation RPC client
//!
//! Talks to a node exposing a bundle simulation method
//! (`tenderly_simulateBundle` style): ordered call list, block tag and a
//! state override map in, one execution result per call out.

use alloy_primitives::{Address, Bytes};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::bundle::{SimulationBundle, IERC20};
use super::overrides::StateOverrideMap;
use crate::error::{RelayError, RelayResult};

/// Default simulation method
pub const DEFAULT_SIMULATION_METHOD: &str = "tenderly_simulateBundle";

/// Timeout for simulation requests
const SIMULATION_TIMEOUT_SECS: u64 = 30;

/// Outcome of one call in a simulated bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTrace {
    pub success: bool,
    /// Return data of the top-level call, empty when the node reported none
    pub output: Bytes,
}

/// Source-chain access needed by the quote simulator
#[async_trait]
pub trait SimulationBackend: Send + Sync {
    /// `decimals()` of an ERC20 on the source chain
    async fn token_decimals(&self, token: Address) -> RelayResult<u8>;

    /// Execute `bundle` in order on top of `overrides`, one trace per call
    async fn simulate_bundle(
        &self,
        bundle: &SimulationBundle,
        overrides: &StateOverrideMap,
    ) -> RelayResult<Vec<CallTrace>>;
}

#[derive(Debug, Deserialize)]
struct RawCallResult {
    status: Option<bool>,
    trace: Option<Vec<RawTraceFrame>>,
}

#[derive(Debug, Deserialize)]
struct RawTraceFrame {
    output: Option<Bytes>,
}

/// HTTP JSON-RPC implementation of [`SimulationBackend`]
pub struct BundleSimulationClient {
    http_client: Client,
    rpc_url: String,
    method: String,
    block_tag: String,
}

impl BundleSimulationClient {
    pub fn new(rpc_url: &str, method: &str, block_tag: &str) -> RelayResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(SIMULATION_TIMEOUT_SECS))
            .build()
            .map_err(|e| RelayError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            rpc_url: rpc_url.to_string(),
            method: method.to_string(),
            block_tag: block_tag.to_string(),
        })
    }

    /// JSON-RPC request body for `bundle`
    fn request_body(&self, bundle: &SimulationBundle, overrides: &StateOverrideMap) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": self.method,
            "params": [bundle.calls, self.block_tag, overrides],
        })
    }

    async fn call_contract(&self, to: Address, calldata: Vec<u8>) -> RelayResult<Bytes> {
        let url = reqwest::Url::parse(&self.rpc_url)
            .map_err(|e| RelayError::Config(format!("invalid simulation RPC URL: {}", e)))?;
        let provider = ProviderBuilder::new().connect_http(url);

        let tx = TransactionRequest::default().to(to).input(calldata.into());

        provider
            .call(tx)
            .await
            .map_err(|e| RelayError::SimulationUnavailable(format!("eth_call failed: {}", e)))
    }
}

#[async_trait]
impl SimulationBackend for BundleSimulationClient {
    async fn token_decimals(&self, token: Address) -> RelayResult<u8> {
        let calldata = IERC20::decimalsCall {}.abi_encode();
        let output = self.call_contract(token, calldata).await?;

        IERC20::decimalsCall::abi_decode_returns(&output).map_err(|e| {
            RelayError::MalformedSimulationResult(format!("decimals() of {}: {}", token, e))
        })
    }

    async fn simulate_bundle(
        &self,
        bundle: &SimulationBundle,
        overrides: &StateOverrideMap,
    ) -> RelayResult<Vec<CallTrace>> {
        let body = self.request_body(bundle, overrides);

        debug!(
            "Simulating {} calls from {:?} with {} overridden slots",
            bundle.calls.len(),
            bundle.sender,
            overrides.slot_count()
        );

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::SimulationUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::SimulationUnavailable(format!("HTTP {}", status)));
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| RelayError::MalformedSimulationResult(e.to_string()))?;

        parse_bundle_response(response_body)
    }
}

/// Turn a JSON-RPC response into per-call traces
pub fn parse_bundle_response(response_body: Value) -> RelayResult<Vec<CallTrace>> {
    if let Some(error) = response_body.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error");
        return Err(RelayError::SimulationUnavailable(message.to_string()));
    }

    let result = response_body
        .get("result")
        .cloned()
        .ok_or_else(|| RelayError::MalformedSimulationResult("missing result".to_string()))?;

    let calls: Vec<RawCallResult> = serde_json::from_value(result)
        .map_err(|e| RelayError::MalformedSimulationResult(e.to_string()))?;

    calls
        .into_iter()
        .enumerate()
        .map(|(i, call)| {
            let success = call.status.ok_or_else(|| {
                RelayError::MalformedSimulationResult(format!("call {} has no status", i))
            })?;
            let output = call
                .trace
                .into_iter()
                .flatten()
                .next()
                .and_then(|frame| frame.output)
                .unwrap_or_default();
            Ok(CallTrace { success, output })
        })
        .collect()
}
