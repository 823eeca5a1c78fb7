//! Relay configuration
//!
//! Loaded from environment variables (and `.env`) or from a TOML file.
//! The relayer key is the only secret here; it is never printed.

use alloy_primitives::{Address, B256};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::gas_oracle::{GasOracle, DEFAULT_GAS_LIMIT, DEFAULT_GAS_MULTIPLIER_PCT};
use crate::relay::{FailurePolicy, RequestDecoder, RequestLayout, SubmissionJournal};
use crate::simulator::{StorageOverrideComputer, DEFAULT_SIMULATION_METHOD, DEFAULT_SLOT_RANGE};
use crate::tokens::{parse_address, parse_token_pairs, DecimalsOverride, SkipSlot, TokenSettings};

/// Exchange the quotes are simulated against
pub const DEFAULT_EXCHANGE_ADDRESS: &str = "0xeE0674C1E7d0f64057B6eCFe845DC2519443567F";

/// Polygon PoS
pub const DEFAULT_CHAIN_ID: u64 = 137;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ========== Source Chain ==========
    /// RPC endpoint exposing the bundle simulation method
    pub simulation_rpc_url: String,

    /// JSON-RPC method used for bundle simulation
    pub simulation_method: String,

    /// Block the simulation runs against
    pub simulation_block: String,

    /// Exchange contract quoted through
    pub exchange_address: String,

    // ========== Destination Chain ==========
    /// RPC endpoint of the chain the oracle lives on
    pub rpc_url: String,

    pub chain_id: u64,

    /// Relayer signing key (KEEP SECRET!)
    pub relayer_private_key: Option<String>,

    // ========== Requests ==========
    pub request_layout: RequestLayout,

    /// Topic0 to match instead of the layout's canonical signature
    pub request_signature: Option<String>,

    // ========== Quoting ==========
    /// Mapping indices probed for the balance slot
    pub slot_range: u64,

    pub decimals_overrides: Vec<DecimalsOverride>,

    pub skip_slots: Vec<SkipSlot>,

    // ========== Submission ==========
    /// Percent of the suggested gas price to pay (150 = 1.5x)
    pub gas_multiplier_pct: u64,

    pub gas_limit: u64,

    pub failure_policy: FailurePolicy,

    /// Append-only JSON-lines record of outcomes
    pub journal_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simulation_rpc_url: "http://localhost:8545".to_string(),
            simulation_method: DEFAULT_SIMULATION_METHOD.to_string(),
            simulation_block: "latest".to_string(),
            exchange_address: DEFAULT_EXCHANGE_ADDRESS.to_string(),
            rpc_url: "https://polygon-rpc.com".to_string(),
            chain_id: DEFAULT_CHAIN_ID,
            relayer_private_key: None,
            request_layout: RequestLayout::Pair,
            request_signature: None,
            slot_range: DEFAULT_SLOT_RANGE,
            decimals_overrides: vec![],
            skip_slots: vec![],
            gas_multiplier_pct: DEFAULT_GAS_MULTIPLIER_PCT,
            gas_limit: DEFAULT_GAS_LIMIT,
            failure_policy: FailurePolicy::Isolate,
            journal_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from any `name -> value` lookup, falling back to defaults
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let request_layout = match var("REQUEST_LAYOUT") {
            Some(raw) => RequestLayout::from_str(&raw)?,
            None => defaults.request_layout,
        };
        let failure_policy = match var("FAILURE_POLICY") {
            Some(raw) => FailurePolicy::from_str(&raw)?,
            None => defaults.failure_policy,
        };

        Ok(Self {
            // Source chain
            simulation_rpc_url: var("SIMULATION_RPC_URL").unwrap_or(defaults.simulation_rpc_url),
            simulation_method: var("SIMULATION_METHOD").unwrap_or(defaults.simulation_method),
            simulation_block: var("SIMULATION_BLOCK").unwrap_or(defaults.simulation_block),
            exchange_address: var("EXCHANGE_ADDRESS").unwrap_or(defaults.exchange_address),

            // Destination chain
            rpc_url: var("RPC_URL").unwrap_or(defaults.rpc_url),
            chain_id: var("CHAIN_ID")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.chain_id),
            relayer_private_key: var("RELAYER_PRIVATE_KEY").filter(|s| !s.trim().is_empty()),

            // Requests
            request_layout,
            request_signature: var("REQUEST_SIGNATURE").filter(|s| !s.trim().is_empty()),

            // Quoting
            slot_range: var("SLOT_RANGE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.slot_range),
            decimals_overrides: var("DECIMALS_OVERRIDES")
                .map(|s| Self::parse_decimals_overrides(&s))
                .transpose()?
                .unwrap_or_default(),
            skip_slots: var("SKIP_SLOTS")
                .map(|s| Self::parse_skip_slots(&s))
                .transpose()?
                .unwrap_or_default(),

            // Submission
            gas_multiplier_pct: var("GAS_MULTIPLIER_PCT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.gas_multiplier_pct),
            gas_limit: var("GAS_LIMIT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.gas_limit),
            failure_policy,
            journal_path: var("JOURNAL_PATH").filter(|s| !s.trim().is_empty()),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    fn parse_decimals_overrides(raw: &str) -> Result<Vec<DecimalsOverride>> {
        parse_token_pairs(raw)
            .into_iter()
            .map(|(token, value)| {
                let decimals = value
                    .parse()
                    .map_err(|_| eyre::eyre!("invalid decimals '{}' for {}", value, token))?;
                Ok(DecimalsOverride { token, decimals })
            })
            .collect()
    }

    fn parse_skip_slots(raw: &str) -> Result<Vec<SkipSlot>> {
        parse_token_pairs(raw)
            .into_iter()
            .map(|(token, value)| {
                let slot = value
                    .parse()
                    .map_err(|_| eyre::eyre!("invalid skip slot '{}' for {}", value, token))?;
                Ok(SkipSlot { token, slot })
            })
            .collect()
    }

    /// Everything needed to quote; no key required
    pub fn validate_quoting(&self) -> Result<()> {
        if self.simulation_rpc_url.trim().is_empty() {
            return Err(eyre::eyre!("SIMULATION_RPC_URL must be set"));
        }
        if self.simulation_method.trim().is_empty() {
            return Err(eyre::eyre!("SIMULATION_METHOD must not be empty"));
        }
        if self.slot_range == 0 {
            return Err(eyre::eyre!("SLOT_RANGE must be at least 1"));
        }
        self.exchange()?;
        self.token_settings()?;
        Ok(())
    }

    /// Validate configuration for relaying
    pub fn validate(&self) -> Result<()> {
        self.validate_quoting()?;

        if self.rpc_url.trim().is_empty() {
            return Err(eyre::eyre!("RPC_URL must be set"));
        }
        if self.relayer_private_key.is_none() {
            return Err(eyre::eyre!("Relaying requires RELAYER_PRIVATE_KEY"));
        }
        self.gas_oracle()?;
        self.request_decoder()?;

        Ok(())
    }

    pub fn exchange(&self) -> Result<Address> {
        Ok(parse_address(&self.exchange_address)?)
    }

    pub fn token_settings(&self) -> Result<TokenSettings> {
        Ok(TokenSettings::new(&self.decimals_overrides, &self.skip_slots)?)
    }

    pub fn storage_overrides(&self) -> Result<StorageOverrideComputer> {
        Ok(StorageOverrideComputer::new(self.slot_range)?)
    }

    pub fn gas_oracle(&self) -> Result<GasOracle> {
        Ok(GasOracle::new(self.gas_multiplier_pct, self.gas_limit)?)
    }

    pub fn request_decoder(&self) -> Result<RequestDecoder> {
        let decoder = RequestDecoder::new(self.request_layout);
        match &self.request_signature {
            Some(raw) => {
                let signature = B256::from_str(raw.trim())
                    .map_err(|e| eyre::eyre!("invalid REQUEST_SIGNATURE '{}': {}", raw, e))?;
                Ok(decoder.with_signature(signature))
            }
            None => Ok(decoder),
        }
    }

    pub fn journal(&self) -> Option<SubmissionJournal> {
        self.journal_path.as_ref().map(SubmissionJournal::new)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              PRICE RELAY - CONFIGURATION                   ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SOURCE CHAIN                                               ║");
        println!("║ • Simulation:      {:<40} ║", self.simulation_method);
        println!("║ • Block:           {:<40} ║", self.simulation_block);
        println!("║ • Exchange:        {:<40} ║", short(&self.exchange_address));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ DESTINATION CHAIN                                          ║");
        println!("║ • Chain ID:        {:<40} ║", self.chain_id);
        println!("║ • Relayer Key:     {:<40} ║",
            if self.relayer_private_key.is_some() { "✓ Configured" } else { "✗ Not Set" }
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ REQUESTS & QUOTING                                         ║");
        println!("║ • Layout:          {:<40} ║", self.request_layout);
        println!("║ • Signature:       {:<40} ║",
            if self.request_signature.is_some() { "custom" } else { "canonical" }
        );
        println!("║ • Slot Range:      {:<40} ║", self.slot_range);
        println!("║ • Decimal Overr.:  {:<40} ║", self.decimals_overrides.len());
        println!("║ • Skip Slots:      {:<40} ║", self.skip_slots.len());
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SUBMISSION                                                 ║");
        println!("║ • Gas Multiplier:  {:<39}% ║", self.gas_multiplier_pct);
        println!("║ • Gas Limit:       {:<40} ║", self.gas_limit);
        println!("║ • On Failure:      {:<40} ║", self.failure_policy);
        println!("║ • Journal:         {:<40} ║",
            if self.journal_path.is_some() { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

fn short(address: &str) -> String {
    if address.is_ascii() && address.len() > 14 {
        format!("{}…{}", &address[..8], &address[address.len() - 4..])
    } else {
        address.to_string()
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RawLog;
    use alloy_primitives::{address, keccak256};
    use std::collections::HashMap;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn from_map(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_map(&[]).unwrap();
        assert_eq!(config.chain_id, 137);
        assert_eq!(config.simulation_method, "tenderly_simulateBundle");
        assert_eq!(config.simulation_block, "latest");
        assert_eq!(config.slot_range, 202);
        assert_eq!(config.gas_multiplier_pct, 150);
        assert_eq!(config.gas_limit, 1_500_000);
        assert_eq!(config.failure_policy, FailurePolicy::Isolate);
        assert_eq!(
            config.exchange().unwrap(),
            address!("eE0674C1E7d0f64057B6eCFe845DC2519443567F")
        );
    }

    #[test]
    fn test_env_lists() {
        let config = from_map(&[
            ("DECIMALS_OVERRIDES", "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174:6"),
            ("SKIP_SLOTS", "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619:3"),
            ("REQUEST_LAYOUT", "keyed"),
            ("FAILURE_POLICY", "abort"),
        ])
        .unwrap();

        let tokens = config.token_settings().unwrap();
        assert_eq!(
            tokens.decimals_override(&address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174")),
            Some(6)
        );
        assert_eq!(
            tokens.skip_slot(&address!("7ceB23fD6bC0adD59E62ac25578270cFf1b9f619")),
            Some(3)
        );
        assert_eq!(config.request_layout, RequestLayout::Keyed);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
    }

    #[test]
    fn test_bad_list_value_rejected() {
        assert!(from_map(&[("DECIMALS_OVERRIDES", "0xabc:six")]).is_err());
        assert!(from_map(&[("FAILURE_POLICY", "retry")]).is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        assert!(config.validate_quoting().is_ok());
        assert!(config.validate().is_err()); // no key

        config.relayer_private_key = Some(KEY.to_string());
        assert!(config.validate().is_ok());

        config.slot_range = 0;
        assert!(config.validate().is_err());
        config.slot_range = 202;

        config.gas_multiplier_pct = 90;
        assert!(config.validate().is_err());
        config.gas_multiplier_pct = 150;

        config.exchange_address = "0x1234".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_signature() {
        let custom = keccak256("PriceQuoteRequested(address,address)");
        let log = RawLog {
            address: Address::repeat_byte(0xfe),
            topics: vec![
                custom,
                Address::repeat_byte(1).into_word(),
                Address::repeat_byte(2).into_word(),
            ],
            data: Default::default(),
        };

        let mut config = Config::default();
        assert!(config.request_decoder().unwrap().decode_requests(&[log.clone()]).unwrap().is_empty());

        config.request_signature = Some(format!("{:?}", custom));
        assert_eq!(config.request_decoder().unwrap().decode_requests(&[log]).unwrap().len(), 1);

        config.request_signature = Some("0xdead".to_string());
        assert!(config.request_decoder().is_err());
    }

    #[test]
    fn test_from_toml() {
        let raw = r#"
            rpc_url = "https://dest.example"
            chain_id = 10
            request_layout = "keyed"
            failure_policy = "abort"

            [[decimals_overrides]]
            token = "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174"
            decimals = 6
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.chain_id, 10);
        assert_eq!(config.request_layout, RequestLayout::Keyed);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.decimals_overrides.len(), 1);
        // unset fields keep their defaults
        assert_eq!(config.slot_range, 202);
    }
}
