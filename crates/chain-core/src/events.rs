// chain-core/src/events.rs

use crate::{Address, NativeAmount, U256};
use serde::Serialize;

/// Event emitted by a contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Pool reserves were re-synced to balances
    ReservesChanged {
        reserve_native: NativeAmount,
        reserve_token: U256,
    },
    /// Liquidity was added and LP shares minted
    Mint {
        sender: Address,
        to: Address,
        amount_native: NativeAmount,
        amount_token: U256,
        amount_lpt: U256,
        total_supply: U256,
    },
    /// LP shares were burned for the underlying assets
    Burn {
        sender: Address,
        to: Address,
        amount_native: NativeAmount,
        amount_token: U256,
        amount_lpt: U256,
        total_supply: U256,
    },
    Swap {
        sender: Address,
        to: Address,
        amount_native_in: NativeAmount,
        amount_token_in: U256,
        amount_native_out: NativeAmount,
        amount_token_out: U256,
    },
    /// Token or LP-share transfer (mint: `from` is zero, burn: `to` is zero)
    Transfer {
        from: Address,
        to: Address,
        amount: U256,
    },
    Approval {
        owner: Address,
        spender: Address,
        amount: U256,
    },
    StartStaking {
        staker: Address,
        amount: U256,
        total_staked: U256,
    },
    StopStaking {
        staker: Address,
        amount: U256,
        total_staked: U256,
    },
    CollectStakingRewards {
        staker: Address,
        amount: U256,
    },
    PoolCreated {
        token: Address,
        pool: Address,
    },
}

/// Event log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Log {
    /// Contract address that emitted the event
    pub address: Address,
    pub event: Event,
}

impl Log {
    pub fn new(address: Address, event: Event) -> Self {
        Self { address, event }
    }
}
