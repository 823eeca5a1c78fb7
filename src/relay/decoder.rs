//! PriceRequested log decoding
//!
//! Only logs whose first topic is the configured request signature are
//! considered. Anything else in the batch is unrelated and skipped; a log that
//! carries the signature but not the expected shape is a hard error.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolEvent, SolValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RelayError, RelayResult};

sol! {
    /// Oracle answering requests identified by their token pair
    #[derive(Debug)]
    interface IPairOracle {
        event PriceRequested(address indexed fromToken, address indexed toToken);

        function submitPrice(address fromToken, address toToken, uint256 amount, uint8 decimals) external;
    }

    /// Oracle answering requests identified by an opaque key
    #[derive(Debug)]
    interface IKeyedOracle {
        event PriceRequested(bytes32 indexed requestKey, address fromToken, address toToken, uint256 amount);

        function submitPrice(bytes32 requestKey, uint256 amount, uint8 decimals) external;
    }
}

/// Raw chain log as delivered by the trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
}

/// Shape of the oracle's PriceRequested event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestLayout {
    /// `PriceRequested(address indexed fromToken, address indexed toToken)`
    #[default]
    Pair,
    /// `PriceRequested(bytes32 indexed requestKey, address fromToken, address toToken, uint256 amount)`
    Keyed,
}

impl RequestLayout {
    pub fn signature_hash(&self) -> B256 {
        match self {
            RequestLayout::Pair => IPairOracle::PriceRequested::SIGNATURE_HASH,
            RequestLayout::Keyed => IKeyedOracle::PriceRequested::SIGNATURE_HASH,
        }
    }
}

impl fmt::Display for RequestLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestLayout::Pair => write!(f, "pair"),
            RequestLayout::Keyed => write!(f, "keyed"),
        }
    }
}

impl FromStr for RequestLayout {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pair" => Ok(RequestLayout::Pair),
            "keyed" | "key" => Ok(RequestLayout::Keyed),
            other => Err(RelayError::Config(format!("unknown request layout '{}'", other))),
        }
    }
}

/// Canonical `fromToken -> toToken` identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TokenPairKey {
    pub from: Address,
    pub to: Address,
}

impl fmt::Display for TokenPairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}->{:?}", self.from, self.to)
    }
}

/// What makes two requests in a batch the same request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupKey {
    Pair(TokenPairKey),
    Request(B256),
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupKey::Pair(pair) => write!(f, "{}", pair),
            DedupKey::Request(key) => write!(f, "{}", key),
        }
    }
}

/// One decoded price request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceRequest {
    pub request_key: Option<B256>,
    pub from_token: Address,
    pub to_token: Address,
    /// Oracle that emitted the request and receives the answer
    pub oracle_address: Address,
    pub amount: Option<U256>,
}

impl PriceRequest {
    pub fn pair(&self) -> TokenPairKey {
        TokenPairKey { from: self.from_token, to: self.to_token }
    }

    pub fn dedup_key(&self) -> DedupKey {
        match self.request_key {
            Some(key) => DedupKey::Request(key),
            None => DedupKey::Pair(self.pair()),
        }
    }
}

/// Extracts [`PriceRequest`]s from a batch of logs
#[derive(Debug, Clone)]
pub struct RequestDecoder {
    layout: RequestLayout,
    signature: B256,
}

impl RequestDecoder {
    pub fn new(layout: RequestLayout) -> Self {
        Self { layout, signature: layout.signature_hash() }
    }

    /// Match a different first topic, e.g. for a renamed event with the same fields
    pub fn with_signature(mut self, signature: B256) -> Self {
        self.signature = signature;
        self
    }

    pub fn layout(&self) -> RequestLayout {
        self.layout
    }

    pub fn signature(&self) -> B256 {
        self.signature
    }

    pub fn matches(&self, log: &RawLog) -> bool {
        log.topics.first() == Some(&self.signature)
    }

    pub fn decode_requests(&self, logs: &[RawLog]) -> RelayResult<Vec<PriceRequest>> {
        logs.iter()
            .enumerate()
            .filter(|(_, log)| self.matches(log))
            .map(|(index, log)| {
                self.decode_log(log)
                    .map_err(|reason| RelayError::MalformedEvent { index, reason })
            })
            .collect()
    }

    fn decode_log(&self, log: &RawLog) -> Result<PriceRequest, String> {
        match self.layout {
            RequestLayout::Pair => {
                if log.topics.len() != 3 {
                    return Err(format!("expected 3 topics, got {}", log.topics.len()));
                }
                Ok(PriceRequest {
                    request_key: None,
                    from_token: topic_address(&log.topics[1])?,
                    to_token: topic_address(&log.topics[2])?,
                    oracle_address: log.address,
                    amount: None,
                })
            }
            RequestLayout::Keyed => {
                if log.topics.len() != 2 {
                    return Err(format!("expected 2 topics, got {}", log.topics.len()));
                }
                let (from_token, to_token, amount) =
                    <(Address, Address, U256)>::abi_decode(&log.data).map_err(|e| e.to_string())?;
                if from_token.is_zero() || to_token.is_zero() {
                    return Err("zero token address".to_string());
                }
                Ok(PriceRequest {
                    request_key: Some(log.topics[1]),
                    from_token,
                    to_token,
                    oracle_address: log.address,
                    amount: (!amount.is_zero()).then_some(amount),
                })
            }
        }
    }
}

/// An indexed address topic must be a left-padded, non-zero address
fn topic_address(topic: &B256) -> Result<Address, String> {
    if topic[..12].iter().any(|b| *b != 0) {
        return Err(format!("topic {} is not an address", topic));
    }
    let address = Address::from_word(*topic);
    if address.is_zero() {
        return Err("zero token address".to_string());
    }
    Ok(address)
}
