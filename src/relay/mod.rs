//! Destination-chain side: request decoding, batching and submission

pub mod chain;
pub mod context;
pub mod decoder;
pub mod engine;
pub mod journal;
pub mod signer;

pub use chain::{OracleChain, RpcOracleChain};
pub use decoder::{PriceRequest, RawLog, RequestDecoder, RequestLayout};
pub use engine::{FailurePolicy, PriceRelay, SubmissionOutcome};
pub use journal::SubmissionJournal;
pub use signer::RelaySigner;
