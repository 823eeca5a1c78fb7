//! The relay loop
//!
//! Requests are handled strictly one after another: the nonce counter in the
//! batch context is only correct under that ordering.

use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::chain::OracleChain;
use super::context::BatchContext;
use super::decoder::{DedupKey, IKeyedOracle, IPairOracle, PriceRequest, RawLog, RequestDecoder};
use super::journal::SubmissionJournal;
use super::signer::RelaySigner;
use crate::error::{RelayError, RelayResult};
use crate::gas_oracle::GasOracle;
use crate::simulator::{QuoteResult, QuoteSimulator, SimulationBackend};

/// What happens to the rest of a batch when one request fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and move on to the next request
    #[default]
    Isolate,
    /// Stop the batch and return the error
    Abort,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Isolate => write!(f, "ISOLATE"),
            FailurePolicy::Abort => write!(f, "ABORT"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "isolate" => Ok(FailurePolicy::Isolate),
            "abort" => Ok(FailurePolicy::Abort),
            other => Err(RelayError::Config(format!("unknown failure policy '{}'", other))),
        }
    }
}

/// Result of relaying one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    /// Price sent to the oracle
    Submitted {
        key: DedupKey,
        oracle: Address,
        nonce: u64,
        tx_hash: B256,
        quote: QuoteResult,
    },

    /// Same request already handled earlier in the batch
    Duplicate { key: DedupKey },

    /// Exchange call failed in simulation; nothing sent
    Unpriceable { key: DedupKey },

    /// Simulation or submission failed; nothing sent, nonce not consumed
    Failed { key: DedupKey, reason: String },
}

impl SubmissionOutcome {
    pub fn key(&self) -> DedupKey {
        match self {
            SubmissionOutcome::Submitted { key, .. }
            | SubmissionOutcome::Duplicate { key }
            | SubmissionOutcome::Unpriceable { key }
            | SubmissionOutcome::Failed { key, .. } => *key,
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmissionOutcome::Submitted { .. })
    }
}

/// Calldata answering `request` with `quote`
pub fn submission_calldata(request: &PriceRequest, quote: &QuoteResult) -> RelayResult<Bytes> {
    let decimals = quote
        .decimals
        .ok_or_else(|| RelayError::InvalidInput("cannot submit a quote without decimals".to_string()))?;

    let calldata = match request.request_key {
        Some(request_key) => IKeyedOracle::submitPriceCall {
            requestKey: request_key,
            amount: quote.tokens_received,
            decimals,
        }
        .abi_encode(),
        None => IPairOracle::submitPriceCall {
            fromToken: request.from_token,
            toToken: request.to_token,
            amount: quote.tokens_received,
            decimals,
        }
        .abi_encode(),
    };

    Ok(calldata.into())
}

/// Prices requests by simulation and answers them on the destination chain
pub struct PriceRelay {
    simulator: QuoteSimulator,
    gas: GasOracle,
    failure_policy: FailurePolicy,
    journal: Option<SubmissionJournal>,
}

impl PriceRelay {
    pub fn new(simulator: QuoteSimulator, gas: GasOracle, failure_policy: FailurePolicy) -> Self {
        Self { simulator, gas, failure_policy, journal: None }
    }

    pub fn with_journal(mut self, journal: SubmissionJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Decode the requests in `logs` and relay them as one batch
    pub async fn relay_logs<S, C>(
        &self,
        logs: &[RawLog],
        decoder: &RequestDecoder,
        signer: &RelaySigner,
        backend: &S,
        chain: &C,
    ) -> RelayResult<Vec<SubmissionOutcome>>
    where
        S: SimulationBackend + ?Sized,
        C: OracleChain + ?Sized,
    {
        debug!(
            "Matching {} layout requests on topic0 {}",
            decoder.layout(),
            decoder.signature()
        );
        let requests = decoder.decode_requests(logs)?;
        info!("Decoded {} price requests from {} logs", requests.len(), logs.len());
        self.relay(&requests, signer, backend, chain).await
    }

    /// Relay one batch of requests
    pub async fn relay<S, C>(
        &self,
        batch: &[PriceRequest],
        signer: &RelaySigner,
        backend: &S,
        chain: &C,
    ) -> RelayResult<Vec<SubmissionOutcome>>
    where
        S: SimulationBackend + ?Sized,
        C: OracleChain + ?Sized,
    {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let base_nonce = chain.transaction_count(signer.address()).await?;
        let mut ctx = BatchContext::new(base_nonce);
        let mut outcomes = Vec::with_capacity(batch.len());

        debug!("Relaying {} requests from nonce {}", batch.len(), base_nonce);

        for request in batch {
            let key = request.dedup_key();

            let outcome = if !ctx.first_seen(key) {
                debug!("Skipping duplicate request {}", key);
                SubmissionOutcome::Duplicate { key }
            } else {
                match self.process(request, key, &mut ctx, signer, backend, chain).await {
                    Ok(outcome) => outcome,
                    Err(e) if self.failure_policy == FailurePolicy::Isolate => {
                        warn!("Request {} failed: {}", key, e);
                        SubmissionOutcome::Failed { key, reason: e.to_string() }
                    }
                    Err(e) => return Err(e),
                }
            };

            self.record(&outcome);
            outcomes.push(outcome);
        }

        info!(
            "Batch done: {} submitted, nonces {}..{}",
            ctx.records().len(),
            ctx.base_nonce(),
            ctx.peek_nonce()
        );

        Ok(outcomes)
    }

    async fn process<S, C>(
        &self,
        request: &PriceRequest,
        key: DedupKey,
        ctx: &mut BatchContext,
        signer: &RelaySigner,
        backend: &S,
        chain: &C,
    ) -> RelayResult<SubmissionOutcome>
    where
        S: SimulationBackend + ?Sized,
        C: OracleChain + ?Sized,
    {
        let quote = self.simulator.simulate(request, backend).await?;
        if !quote.is_available() {
            info!("No quote available for {}", key);
            return Ok(SubmissionOutcome::Unpriceable { key });
        }

        let calldata = submission_calldata(request, &quote)?;
        let gas_price = self.gas.submission_gas_price(chain).await?;
        let nonce = ctx.peek_nonce();

        let signed = signer
            .sign_legacy_transaction(
                request.oracle_address,
                calldata,
                nonce,
                self.gas.gas_limit(),
                gas_price,
            )
            .await?;

        let tx_hash = chain.send_raw_transaction(signed.raw).await?;
        ctx.commit(key);

        if tx_hash != signed.hash {
            warn!("Node reported {} for locally signed {}", tx_hash, signed.hash);
        }

        info!("📤 {} priced at {} -> {} nonce {}", key, quote.tokens_received, tx_hash, nonce);

        Ok(SubmissionOutcome::Submitted {
            key,
            oracle: request.oracle_address,
            nonce,
            tx_hash,
            quote,
        })
    }

    fn record(&self, outcome: &SubmissionOutcome) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(outcome) {
                warn!("Failed to journal outcome for {}: {}", outcome.key(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::decoder::{RequestLayout, TokenPairKey};
    use crate::relay::signer::tests::TEST_KEY;
    use crate::simulator::quoter::tests::{pair_request, FakeBackend, EXCHANGE, USDC, WETH};
    use crate::simulator::StorageOverrideComputer;
    use crate::tokens::TokenSettings;
    use alloy_consensus::TxEnvelope;
    use alloy_eips::eip2718::Decodable2718;
    use alloy_primitives::{address, keccak256, TxKind, U256};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    const DAI: Address = address!("8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063");
    const ORACLE: Address = address!("00000000000000000000000000000000000000fe");
    const BASE_NONCE: u64 = 12;
    const GAS_PRICE: u128 = 40_000_000_000;

    struct FakeChain {
        sent: Mutex<Vec<Bytes>>,
        nonce_reads: Mutex<usize>,
        send_attempts: Mutex<usize>,
        fail_attempts: HashSet<usize>,
    }

    impl FakeChain {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                nonce_reads: Mutex::new(0),
                send_attempts: Mutex::new(0),
                fail_attempts: HashSet::new(),
            }
        }

        fn failing(attempts: &[usize]) -> Self {
            Self { fail_attempts: attempts.iter().copied().collect(), ..Self::new() }
        }

        fn sent_txs(&self) -> Vec<TxEnvelope> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|raw| TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl OracleChain for FakeChain {
        async fn transaction_count(&self, _account: Address) -> RelayResult<u64> {
            *self.nonce_reads.lock().unwrap() += 1;
            Ok(BASE_NONCE)
        }

        async fn gas_price(&self) -> RelayResult<u128> {
            Ok(GAS_PRICE)
        }

        async fn send_raw_transaction(&self, raw: Bytes) -> RelayResult<B256> {
            let attempt = {
                let mut attempts = self.send_attempts.lock().unwrap();
                *attempts += 1;
                *attempts - 1
            };
            if self.fail_attempts.contains(&attempt) {
                return Err(RelayError::Submission("nonce too low".to_string()));
            }
            let hash = keccak256(&raw);
            self.sent.lock().unwrap().push(raw);
            Ok(hash)
        }
    }

    fn price_relay(policy: FailurePolicy) -> PriceRelay {
        let simulator = QuoteSimulator::new(
            EXCHANGE,
            StorageOverrideComputer::default(),
            TokenSettings::default(),
        );
        PriceRelay::new(simulator, GasOracle::default(), policy)
    }

    fn signer() -> RelaySigner {
        RelaySigner::from_key(TEST_KEY, 137).unwrap()
    }

    fn backend() -> FakeBackend {
        let mut backend = FakeBackend::quoting(1_000_000);
        backend.decimals.insert(DAI, 18);
        backend
    }

    fn nonces(chain: &FakeChain) -> Vec<u64> {
        chain
            .sent_txs()
            .iter()
            .map(|tx| tx.as_legacy().unwrap().tx().nonce)
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_single_log() {
        let log = RawLog {
            address: ORACLE,
            topics: vec![RequestLayout::Pair.signature_hash(), USDC.into_word(), WETH.into_word()],
            data: Bytes::new(),
        };
        let backend = backend();
        let chain = FakeChain::new();

        let outcomes = price_relay(FailurePolicy::Isolate)
            .relay_logs(&[log], &RequestDecoder::new(RequestLayout::Pair), &signer(), &backend, &chain)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_submitted());

        let txs = chain.sent_txs();
        assert_eq!(txs.len(), 1);
        let tx = txs[0].as_legacy().unwrap().tx();
        assert_eq!(tx.to, TxKind::Call(ORACLE));
        assert_eq!(tx.nonce, BASE_NONCE);
        assert_eq!(tx.gas_price, GAS_PRICE * 3 / 2);
        assert_eq!(tx.gas_limit, 1_500_000);
        assert!(matches!(
            outcomes[0],
            SubmissionOutcome::Submitted { tx_hash, .. } if tx_hash == *txs[0].tx_hash()
        ));

        let call = IPairOracle::submitPriceCall::abi_decode(&tx.input).unwrap();
        assert_eq!(call.fromToken, USDC);
        assert_eq!(call.toToken, WETH);
        assert_eq!(call.amount, U256::from(1_000_000u64));
        assert_eq!(call.decimals, 18);
    }

    #[tokio::test]
    async fn test_duplicate_pair_simulated_and_sent_once() {
        let backend = backend();
        let chain = FakeChain::new();
        let batch = vec![pair_request(WETH, USDC), pair_request(WETH, USDC)];

        let outcomes = price_relay(FailurePolicy::Isolate)
            .relay(&batch, &signer(), &backend, &chain)
            .await
            .unwrap();

        assert_eq!(backend.simulations(), 1);
        assert_eq!(chain.sent_txs().len(), 1);
        assert!(outcomes[0].is_submitted());
        assert_eq!(
            outcomes[1],
            SubmissionOutcome::Duplicate {
                key: DedupKey::Pair(TokenPairKey { from: WETH, to: USDC })
            }
        );
    }

    #[tokio::test]
    async fn test_reverse_pair_is_not_a_duplicate() {
        let backend = backend();
        let chain = FakeChain::new();
        let batch = vec![pair_request(WETH, USDC), pair_request(USDC, WETH)];

        price_relay(FailurePolicy::Isolate)
            .relay(&batch, &signer(), &backend, &chain)
            .await
            .unwrap();

        assert_eq!(backend.simulations(), 2);
    }

    #[tokio::test]
    async fn test_nonces_follow_request_order() {
        let backend = backend();
        let chain = FakeChain::new();
        let batch = vec![
            pair_request(WETH, USDC),
            pair_request(USDC, WETH),
            pair_request(WETH, DAI),
        ];

        price_relay(FailurePolicy::Isolate)
            .relay(&batch, &signer(), &backend, &chain)
            .await
            .unwrap();

        assert_eq!(nonces(&chain), vec![BASE_NONCE, BASE_NONCE + 1, BASE_NONCE + 2]);
        assert_eq!(*chain.nonce_reads.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unpriceable_consumes_no_nonce() {
        let mut backend = backend();
        backend.exchange_success = false;
        let chain = FakeChain::new();

        let outcomes = price_relay(FailurePolicy::Isolate)
            .relay(&[pair_request(WETH, USDC)], &signer(), &backend, &chain)
            .await
            .unwrap();

        assert!(matches!(outcomes[0], SubmissionOutcome::Unpriceable { .. }));
        assert!(chain.sent_txs().is_empty());
    }

    #[tokio::test]
    async fn test_isolated_failure_keeps_going() {
        let backend = backend();
        let chain = FakeChain::failing(&[0]);
        let batch = vec![pair_request(WETH, USDC), pair_request(USDC, WETH)];

        let outcomes = price_relay(FailurePolicy::Isolate)
            .relay(&batch, &signer(), &backend, &chain)
            .await
            .unwrap();

        assert!(matches!(&outcomes[0], SubmissionOutcome::Failed { reason, .. } if reason.contains("nonce too low")));
        assert!(outcomes[1].is_submitted());
        // the failed send did not use up its nonce
        assert_eq!(nonces(&chain), vec![BASE_NONCE]);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_batch() {
        let backend = backend();
        let chain = FakeChain::failing(&[0]);
        let batch = vec![pair_request(WETH, USDC), pair_request(USDC, WETH)];

        let result = price_relay(FailurePolicy::Abort)
            .relay(&batch, &signer(), &backend, &chain)
            .await;

        assert!(matches!(result, Err(RelayError::Submission(_))));
        assert_eq!(backend.simulations(), 1);
        assert!(chain.sent_txs().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_touches_nothing() {
        let backend = backend();
        let chain = FakeChain::new();

        let outcomes = price_relay(FailurePolicy::Isolate)
            .relay(&[], &signer(), &backend, &chain)
            .await
            .unwrap();

        assert!(outcomes.is_empty());
        assert_eq!(*chain.nonce_reads.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_keyed_request_submits_by_key() {
        let backend = backend();
        let chain = FakeChain::new();
        let key = keccak256("request-7");
        let mut request = pair_request(WETH, USDC);
        request.request_key = Some(key);
        request.oracle_address = ORACLE;

        price_relay(FailurePolicy::Isolate)
            .relay(&[request], &signer(), &backend, &chain)
            .await
            .unwrap();

        let txs = chain.sent_txs();
        let call = IKeyedOracle::submitPriceCall::abi_decode(&txs[0].as_legacy().unwrap().tx().input).unwrap();
        assert_eq!(call.requestKey, key);
        assert_eq!(call.amount, U256::from(1_000_000u64));
        assert_eq!(call.decimals, 6);
    }

    #[test]
    fn test_calldata_requires_decimals() {
        let quote = QuoteResult::unavailable(U256::from(1u64));
        assert!(submission_calldata(&pair_request(WETH, USDC), &quote).is_err());
    }

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!("isolate".parse::<FailurePolicy>().unwrap(), FailurePolicy::Isolate);
        assert_eq!("ABORT".parse::<FailurePolicy>().unwrap(), FailurePolicy::Abort);
        assert!("retry".parse::<FailurePolicy>().is_err());
    }
}
