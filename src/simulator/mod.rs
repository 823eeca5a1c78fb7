//! Source-chain quoting
//!
//! Responsible for:
//! - Storage overrides that fund a throwaway account with the input token
//! - Building the approve + exchange bundle
//! - Running it through the bundle simulation RPC and reading the quote

pub mod bundle;
pub mod client;
pub mod overrides;
pub mod quoter;

pub use client::{BundleSimulationClient, SimulationBackend, DEFAULT_SIMULATION_METHOD};
pub use overrides::{parse_amount, StorageOverrideComputer, DEFAULT_SLOT_RANGE};
pub use quoter::{QuoteResult, QuoteSimulator};
