// chain-core/src/types.rs

use crate::{ChainError, ChainResult};

/// 256-bit unsigned integer used for token and LP-share amounts
pub use ethers_core::types::U256;

/// Block number/height
pub type BlockNumber = u64;

/// Native currency amount (64-bit, smallest unit)
pub type NativeAmount = u64;

/// Narrow a 256-bit value back into the native domain, failing instead of truncating
pub fn u256_to_native(value: U256) -> ChainResult<NativeAmount> {
    if value > U256::from(u64::MAX) {
        return Err(ChainError::Overflow("value exceeds native amount range"));
    }
    Ok(value.low_u64())
}
