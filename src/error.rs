//! Error taxonomy for the quote pipeline.
//!
//! A failed exchange call inside a simulation is not an error: it comes back
//! as a zero [`QuoteResult`](crate::simulator::QuoteResult).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed address, amount or other local precondition
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Log matched the request signature but could not be decoded
    #[error("malformed PriceRequested event in log {index}: {reason}")]
    MalformedEvent { index: usize, reason: String },

    /// Transport or RPC failure while talking to the simulation endpoint
    #[error("simulation endpoint unavailable: {0}")]
    SimulationUnavailable(String),

    /// The simulation endpoint answered with an unexpected shape
    #[error("malformed simulation result: {0}")]
    MalformedSimulationResult(String),

    #[error("failed to sign transaction: {0}")]
    Signing(String),

    /// Reading from or sending to the destination chain failed
    #[error("destination chain error: {0}")]
    Submission(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type RelayResult<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = RelayError::MalformedEvent { index: 3, reason: "short data".into() };
        assert_eq!(
            err.to_string(),
            "malformed PriceRequested event in log 3: short data"
        );
    }
}
