//! Per-token settings for the quote pipeline
//!
//! Some tokens report decimals that do not match how the oracle expects them
//! to be priced, and some have a non-balance variable sitting at one of the
//! candidate mapping indices. Both are looked up by exact address match.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{RelayError, RelayResult};

/// `token -> decimals` entry as it appears in config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecimalsOverride {
    pub token: String,
    pub decimals: u8,
}

/// `token -> storage index` entry as it appears in config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipSlot {
    pub token: String,
    pub slot: u64,
}

/// Typed lookups built from the config lists
#[derive(Debug, Clone, Default)]
pub struct TokenSettings {
    decimals: HashMap<Address, u8>,
    skip_slots: HashMap<Address, u64>,
}

impl TokenSettings {
    pub fn new(decimals: &[DecimalsOverride], skip_slots: &[SkipSlot]) -> RelayResult<Self> {
        let mut settings = Self::default();

        for entry in decimals {
            settings.decimals.insert(parse_address(&entry.token)?, entry.decimals);
        }
        for entry in skip_slots {
            settings.skip_slots.insert(parse_address(&entry.token)?, entry.slot);
        }

        Ok(settings)
    }

    pub fn decimals_override(&self, token: &Address) -> Option<u8> {
        self.decimals.get(token).copied()
    }

    pub fn skip_slot(&self, token: &Address) -> Option<u64> {
        self.skip_slots.get(token).copied()
    }
}

#[cfg(test)]
impl TokenSettings {
    pub fn with_decimals(mut self, token: Address, decimals: u8) -> Self {
        self.decimals.insert(token, decimals);
        self
    }

    pub fn with_skip_slot(mut self, token: Address, slot: u64) -> Self {
        self.skip_slots.insert(token, slot);
        self
    }
}

/// Parse a hex address, reporting the offending text on failure
pub fn parse_address(s: &str) -> RelayResult<Address> {
    Address::from_str(s.trim())
        .map_err(|e| RelayError::InvalidInput(format!("invalid address '{}': {}", s, e)))
}

/// Parse `0xTOKEN:value,0xTOKEN:value` lists used by the env config
pub fn parse_token_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|entry| {
            let (token, value) = entry.split_once(':')?;
            Some((token.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}
