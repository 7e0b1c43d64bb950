// liquidity/src/math.rs

//! Constant-product pricing
//!
//! All functions are pure integer arithmetic on `U256`. Every intermediate
//! product is checked, and divisions floor. Native amounts are widened to
//! `U256` by the caller; narrowing back is the caller's job as well.

use crate::{LiquidityError, LiquidityResult, FEE_DENOMINATOR, MAX_FEE, MINIMUM_LIQUIDITY};
use chain_core::{NativeAmount, U256};
use serde::{Deserialize, Serialize};

/// Pool reserves snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserves {
    pub native: NativeAmount,
    pub token: U256,
}

impl Reserves {
    pub fn new(native: NativeAmount, token: U256) -> Self {
        Self { native, token }
    }

    pub fn is_empty(&self) -> bool {
        self.native == 0 || self.token.is_zero()
    }

    /// `native * token`
    pub fn product(&self) -> LiquidityResult<U256> {
        mul(U256::from(self.native), self.token, "reserve product")
    }
}

/// Reject fees outside `0..=MAX_FEE`
pub fn validate_fee(fee: u32) -> LiquidityResult<()> {
    if fee > MAX_FEE {
        return Err(LiquidityError::InvalidFee(fee));
    }
    Ok(())
}

/// Output received for `amount_in` against the given reserves
pub fn quote_amount_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee: u32,
) -> LiquidityResult<U256> {
    validate_fee(fee)?;
    if amount_in.is_zero() {
        return Err(LiquidityError::InsufficientInputAmount);
    }
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(LiquidityError::InsufficientLiquidity);
    }

    let amount_in_with_fee = mul(amount_in, U256::from(FEE_DENOMINATOR - fee), "amount in with fee")?;
    let numerator = mul(amount_in_with_fee, reserve_out, "amount out numerator")?;
    let denominator = add(
        mul(reserve_in, U256::from(FEE_DENOMINATOR), "amount out denominator")?,
        amount_in_with_fee,
        "amount out denominator",
    )?;

    Ok(numerator / denominator)
}

/// Input required to receive exactly `amount_out` (rounded up by one unit)
pub fn quote_amount_in(
    amount_out: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee: u32,
) -> LiquidityResult<U256> {
    validate_fee(fee)?;
    if amount_out.is_zero() {
        return Err(LiquidityError::InsufficientOutputAmount);
    }
    if reserve_in.is_zero() || reserve_out.is_zero() || amount_out >= reserve_out {
        return Err(LiquidityError::InsufficientLiquidity);
    }

    let numerator = mul(
        mul(reserve_in, amount_out, "amount in numerator")?,
        U256::from(FEE_DENOMINATOR),
        "amount in numerator",
    )?;
    let denominator = mul(
        reserve_out - amount_out,
        U256::from(FEE_DENOMINATOR - fee),
        "amount in denominator",
    )?;

    add(numerator / denominator, U256::one(), "amount in")
}

/// Amount of the other asset matching `amount_a` at the current ratio
pub fn quote_liquidity(amount_a: U256, reserve_a: U256, reserve_b: U256) -> LiquidityResult<U256> {
    if amount_a.is_zero() {
        return Err(LiquidityError::InsufficientAmount);
    }
    if reserve_a.is_zero() || reserve_b.is_zero() {
        return Err(LiquidityError::InsufficientLiquidity);
    }

    Ok(mul(amount_a, reserve_b, "liquidity quote")? / reserve_a)
}

/// Token → native → token: returns `(native_mid, amount_out)`
///
/// `pool_in` holds the input token, `pool_out` the output token.
pub fn quote_multi_hop_out(
    amount_in: U256,
    pool_in: Reserves,
    pool_out: Reserves,
    fee: u32,
) -> LiquidityResult<(U256, U256)> {
    let native_mid = quote_amount_out(amount_in, pool_in.token, U256::from(pool_in.native), fee)?;
    let amount_out = quote_amount_out(native_mid, U256::from(pool_out.native), pool_out.token, fee)?;
    Ok((native_mid, amount_out))
}

/// Token → native → exact token: returns `(amount_in, native_mid)`
pub fn quote_multi_hop_in(
    amount_out: U256,
    pool_in: Reserves,
    pool_out: Reserves,
    fee: u32,
) -> LiquidityResult<(U256, U256)> {
    let native_mid = quote_amount_in(amount_out, U256::from(pool_out.native), pool_out.token, fee)?;
    let amount_in = quote_amount_in(native_mid, pool_in.token, U256::from(pool_in.native), fee)?;
    Ok((amount_in, native_mid))
}

/// Floor of the square root
pub fn isqrt(value: U256) -> U256 {
    value.integer_sqrt()
}

/// LP shares minted by the very first deposit, before the locked minimum
/// is subtracted from the provider's part
pub fn initial_liquidity(amount_native: NativeAmount, amount_token: U256) -> LiquidityResult<U256> {
    let root = isqrt(mul(U256::from(amount_native), amount_token, "initial liquidity")?);
    let minimum = U256::from(MINIMUM_LIQUIDITY);
    if root <= minimum {
        return Err(LiquidityError::InsufficientLiquidity);
    }
    Ok(root - minimum)
}

/// LP shares for a deposit into a funded pool (the smaller side wins)
pub fn proportional_liquidity(
    amount_native: NativeAmount,
    amount_token: U256,
    reserves: Reserves,
    total_supply: U256,
) -> LiquidityResult<U256> {
    if reserves.is_empty() {
        return Err(LiquidityError::InsufficientLiquidity);
    }
    let by_native = mul(U256::from(amount_native), total_supply, "native share")? / U256::from(reserves.native);
    let by_token = mul(amount_token, total_supply, "token share")? / reserves.token;
    Ok(by_native.min(by_token))
}

/// Protocol-fee shares owed for growth of `sqrt(k)` since `k_last`
///
/// One sixth of the fee growth: `supply * (√k - √k_last) / (5√k + √k_last)`.
pub fn protocol_fee_liquidity(
    reserves: Reserves,
    k_last: U256,
    total_supply: U256,
) -> LiquidityResult<U256> {
    if k_last.is_zero() {
        return Ok(U256::zero());
    }
    let root_k = isqrt(reserves.product()?);
    let root_k_last = isqrt(k_last);
    if root_k <= root_k_last {
        return Ok(U256::zero());
    }

    let numerator = mul(total_supply, root_k - root_k_last, "protocol fee numerator")?;
    let denominator = add(
        mul(root_k, U256::from(5u64), "protocol fee denominator")?,
        root_k_last,
        "protocol fee denominator",
    )?;
    Ok(numerator / denominator)
}

/// Fee-adjusted constant-product check after a swap
///
/// `(b_n*1000 - in_n*fee) * (b_t*1000 - in_t*fee) >= r_n * r_t * 1000²`
pub fn check_invariant(
    balances: Reserves,
    amounts_in: Reserves,
    reserves: Reserves,
    fee: u32,
) -> LiquidityResult<()> {
    let scale = U256::from(FEE_DENOMINATOR);
    let fee = U256::from(fee);

    let adjusted_native = sub(
        mul(U256::from(balances.native), scale, "adjusted native")?,
        mul(U256::from(amounts_in.native), fee, "native fee")?,
        "adjusted native",
    )?;
    let adjusted_token = sub(
        mul(balances.token, scale, "adjusted token")?,
        mul(amounts_in.token, fee, "token fee")?,
        "adjusted token",
    )?;

    let after = mul(adjusted_native, adjusted_token, "adjusted product")?;
    let before = mul(reserves.product()?, scale * scale, "reserve product")?;
    if after < before {
        return Err(LiquidityError::InvalidSwap);
    }
    Ok(())
}

fn mul(a: U256, b: U256, context: &'static str) -> LiquidityResult<U256> {
    a.checked_mul(b).ok_or(LiquidityError::Overflow(context))
}

fn add(a: U256, b: U256, context: &'static str) -> LiquidityResult<U256> {
    a.checked_add(b).ok_or(LiquidityError::Overflow(context))
}

fn sub(a: U256, b: U256, context: &'static str) -> LiquidityResult<U256> {
    a.checked_sub(b).ok_or(LiquidityError::Overflow(context))
}
