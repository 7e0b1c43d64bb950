// chain-core/src/lib.rs

//! Ledger primitives shared by the exchange contracts
//!
//! This crate provides:
//! - 20-byte addresses and deterministic address derivation
//! - Native (`u64`) and token (`U256`) amount types
//! - A standard fungible-token balance/allowance ledger
//! - World state holding native balances, token ledgers and the event log

pub mod address;
pub mod events;
pub mod hash;
pub mod state;
pub mod token;
pub mod types;

pub use address::Address;
pub use events::{Event, Log};
pub use hash::Hash;
pub use state::{Snapshot, WorldState};
pub use token::TokenLedger;
pub use types::*;

/// Result type for ledger operations
pub type ChainResult<T> = Result<T, ChainError>;

/// Errors that can occur in ledger operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("Insufficient native balance: required {required}, available {available}")]
    InsufficientNativeBalance {
        required: NativeAmount,
        available: NativeAmount,
    },

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: U256, available: U256 },

    #[error("Insufficient allowance: required {required}, available {available}")]
    InsufficientAllowance { required: U256, available: U256 },

    #[error("Token not found: {0}")]
    TokenNotFound(Address),

    #[error("Token already deployed: {0}")]
    TokenExists(Address),

    #[error("Arithmetic overflow: {0}")]
    Overflow(&'static str),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}
