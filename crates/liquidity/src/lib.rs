// liquidity/src/lib.rs

//! Native/token automated market maker
//!
//! This crate implements constant-product liquidity pools pairing the native
//! currency with a fungible token:
//! - Pricing formulas (quotes, optimal liquidity, multi-hop through native)
//! - Pools with LP shares, protocol fee on mint and a reentrancy lock
//! - Staking of the market token against a pool's protocol-fee shares
//! - A router sequencing deposits, withdrawals and swaps with slippage and
//!   deadline checks
//! - An atomic runtime executing every entry point all-or-nothing

pub mod config;
pub mod market;
pub mod math;
pub mod pool;
pub mod router;
pub mod runtime;
pub mod staking;

pub use config::{FeeRecipient, MarketConfig, PoolConfig};
pub use market::{Market, MarketRegistry};
pub use math::Reserves;
pub use pool::LiquidityPool;
pub use router::{AddLiquidity, RemoveLiquidity, Router};
pub use runtime::{Runtime, SwapCallback, SwapReceiver};
pub use staking::StakingLedger;

use chain_core::{Address, BlockNumber, ChainError};

/// LP shares permanently locked on the first mint
pub const MINIMUM_LIQUIDITY: u64 = 1_000;

/// Denominator of the swap fee (fees are parts per thousand)
pub const FEE_DENOMINATOR: u32 = 1_000;

/// Highest accepted swap fee (1%)
pub const MAX_FEE: u32 = 10;

/// Scale of the reward-per-staked-token accumulator
pub const REWARD_SCALE: u64 = 100_000_000;

/// Result type for liquidity operations
pub type LiquidityResult<T> = Result<T, LiquidityError>;

/// Errors that can occur in liquidity operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LiquidityError {
    #[error("Insufficient input amount")]
    InsufficientInputAmount,

    #[error("Insufficient output amount")]
    InsufficientOutputAmount,

    #[error("Insufficient amount")]
    InsufficientAmount,

    #[error("Insufficient liquidity")]
    InsufficientLiquidity,

    #[error("Insufficient liquidity burned")]
    InsufficientLiquidityBurned,

    #[error("Insufficient native amount")]
    InsufficientNativeAmount,

    #[error("Insufficient token amount")]
    InsufficientTokenAmount,

    #[error("Excessive input amount")]
    ExcessiveInputAmount,

    #[error("Invariant check failed")]
    InvalidSwap,

    #[error("Invalid recipient")]
    InvalidTo,

    #[error("No swap receiver registered at {0}")]
    InvalidReceiver(Address),

    #[error("Invalid fee: {0} (maximum 10)")]
    InvalidFee(u32),

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Invalid pool: {0}")]
    InvalidPool(Address),

    #[error("Invalid token: {0}")]
    InvalidToken(Address),

    #[error("Pool already exists for token {0}")]
    PoolExists(Address),

    #[error("Staking is not enabled on this pool")]
    StakingUnavailable,

    #[error("Locked")]
    Locked,

    #[error("Expired deadline: {deadline} < block {height}")]
    ExpiredDeadline {
        deadline: BlockNumber,
        height: BlockNumber,
    },

    #[error("Invalid transfer: {0}")]
    InvalidTransfer(#[source] ChainError),

    #[error("Invalid transfer from: {0}")]
    InvalidTransferFrom(#[source] ChainError),

    #[error("Arithmetic overflow: {0}")]
    Overflow(&'static str),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reasons() {
        assert_eq!(LiquidityError::Locked.to_string(), "Locked");
        assert_eq!(
            LiquidityError::ExpiredDeadline { deadline: 4, height: 5 }.to_string(),
            "Expired deadline: 4 < block 5"
        );
        assert_eq!(LiquidityError::InvalidFee(11).to_string(), "Invalid fee: 11 (maximum 10)");
    }

    #[test]
    fn test_chain_error_conversion() {
        let err: LiquidityError = ChainError::Overflow("native balance").into();
        assert_eq!(err.to_string(), "Arithmetic overflow: native balance");
    }
}
