//! Approve + exchange bundle executed by the simulation endpoint

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use serde::Serialize;

sol! {
    /// ERC20 subset used by the simulator
    #[derive(Debug)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function decimals() external view returns (uint8);
    }

    /// Exchange entry point quoted against
    #[derive(Debug)]
    interface IExchange {
        function exchange(
            address fromToken,
            address toToken,
            uint256 amount,
            uint256 minReturn
        ) external returns (uint256 received);
    }
}

/// One call inside a simulated bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulatedCall {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
}

/// Ordered `[approve, exchange]` pair sharing one throwaway sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationBundle {
    pub sender: Address,
    pub calls: Vec<SimulatedCall>,
}

impl SimulationBundle {
    /// Index of the exchange call whose output carries the quote
    pub const EXCHANGE_INDEX: usize = 1;

    /// Build the bundle swapping `amount` of `from_token` into `to_token`.
    ///
    /// The approval is unlimited and the minimum return is zero; nothing here
    /// is ever broadcast.
    pub fn quote(
        sender: Address,
        exchange: Address,
        from_token: Address,
        to_token: Address,
        amount: U256,
    ) -> Self {
        let approve = IERC20::approveCall { spender: exchange, amount: U256::MAX }.abi_encode();
        let swap = IExchange::exchangeCall {
            fromToken: from_token,
            toToken: to_token,
            amount,
            minReturn: U256::ZERO,
        }
        .abi_encode();

        Self {
            sender,
            calls: vec![
                SimulatedCall { from: sender, to: from_token, data: approve.into() },
                SimulatedCall { from: sender, to: exchange, data: swap.into() },
            ],
        }
    }
}
