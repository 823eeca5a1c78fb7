//! Balance storage overrides
//!
//! Where an ERC20 keeps `balances[holder]` depends on the compiler and on the
//! index of the mapping in the contract's storage. Rather than analyse
//! bytecode we write the target balance into every candidate slot:
//!
//! - Solidity `mapping(address => uint256)` at index N:
//!   `keccak256(abi.encode(holder, N))`
//! - Vyper `HashMap[address, uint256]` at index N:
//!   `keccak256(abi.encode(N, holder))`
//!
//! for every N in `0..slot_range`.

use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::SolValue;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{RelayError, RelayResult};

/// Mapping indices probed by default
pub const DEFAULT_SLOT_RANGE: u64 = 202;

/// Storage diff for a single contract, serialized as `{"stateDiff": {...}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStateDiff {
    pub state_diff: BTreeMap<B256, B256>,
}

/// `contract -> slot -> value` overrides applied for one simulation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StateOverrideMap(BTreeMap<Address, AccountStateDiff>);

impl StateOverrideMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force `slot` of `contract` to `value`
    pub fn set_slot(&mut self, contract: Address, slot: B256, value: U256) {
        self.0
            .entry(contract)
            .or_default()
            .state_diff
            .insert(slot, B256::from(value.to_be_bytes::<32>()));
    }

    /// Total number of overridden slots across all contracts
    pub fn slot_count(&self) -> usize {
        self.0.values().map(|diff| diff.state_diff.len()).sum()
    }
}

#[cfg(test)]
impl StateOverrideMap {
    pub fn slots(&self, contract: &Address) -> Option<&BTreeMap<B256, B256>> {
        self.0.get(contract).map(|diff| &diff.state_diff)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &Address> {
        self.0.keys()
    }
}

/// Computes balance overrides for throwaway simulation accounts
#[derive(Debug, Clone, Copy)]
pub struct StorageOverrideComputer {
    slot_range: u64,
}

impl Default for StorageOverrideComputer {
    fn default() -> Self {
        Self { slot_range: DEFAULT_SLOT_RANGE }
    }
}

impl StorageOverrideComputer {
    pub fn new(slot_range: u64) -> RelayResult<Self> {
        if slot_range == 0 {
            return Err(RelayError::InvalidInput("slot range must be non-zero".to_string()));
        }
        Ok(Self { slot_range })
    }

    /// Overrides giving `holder` a balance of `amount` in `token`.
    ///
    /// `skip` excludes one mapping index (both layouts) for tokens known to
    /// keep something other than balances there.
    pub fn compute(
        &self,
        token: Address,
        holder: Address,
        amount: U256,
        skip: Option<u64>,
    ) -> RelayResult<StateOverrideMap> {
        if token.is_zero() {
            return Err(RelayError::InvalidInput("token address is zero".to_string()));
        }
        if holder.is_zero() {
            return Err(RelayError::InvalidInput("holder address is zero".to_string()));
        }

        let mut overrides = StateOverrideMap::new();

        for index in 0..self.slot_range {
            if skip == Some(index) {
                continue;
            }
            overrides.set_slot(token, solidity_mapping_slot(holder, index), amount);
            overrides.set_slot(token, vyper_mapping_slot(holder, index), amount);
        }

        Ok(overrides)
    }
}

/// `keccak256(abi.encode(holder, index))`
pub fn solidity_mapping_slot(holder: Address, index: u64) -> B256 {
    keccak256((holder, U256::from(index)).abi_encode())
}

/// `keccak256(abi.encode(index, holder))`
pub fn vyper_mapping_slot(holder: Address, index: u64) -> B256 {
    keccak256((U256::from(index), holder).abi_encode())
}

/// Parse a decimal or `0x` hex amount that must fit in 32 bytes
pub fn parse_amount(raw: &str) -> RelayResult<U256> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x") {
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16),
        None => U256::from_str_radix(raw, 10),
    };
    parsed.map_err(|e| RelayError::InvalidInput(format!("amount '{}': {}", raw, e)))
}
