// liquidity/src/router.rs

//! Router: liquidity sizing, slippage and deadline checks, multi-hop swaps
//!
//! The router holds no funds between calls. Native sent with a call
//! (`value`) passes through the router address within the same atomic
//! operation; tokens and LP shares are pulled with `transfer_from`, so the
//! caller approves the router beforehand.

use crate::{
    market::Market,
    math::{self, Reserves},
    LiquidityError, LiquidityResult, Runtime,
};
use chain_core::{u256_to_native, Address, BlockNumber, NativeAmount, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Parameters of `add_liquidity` (the native side is the call's value)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLiquidity {
    pub token: Address,
    pub amount_token_desired: U256,
    pub amount_native_min: NativeAmount,
    pub amount_token_min: U256,
    pub to: Address,
    /// Last valid block height, `0` for none
    pub deadline: BlockNumber,
}

/// Parameters of `remove_liquidity`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLiquidity {
    pub token: Address,
    pub liquidity: U256,
    pub amount_native_min: NativeAmount,
    pub amount_token_min: U256,
    pub to: Address,
    pub deadline: BlockNumber,
}

pub struct Router {
    address: Address,
    fee: u32,
    /// token -> pool; filled lazily, never invalidated
    pool_cache: HashMap<Address, Address>,
}

impl Router {
    /// Create a router for `market`, capturing its fee once
    pub fn new(address: Address, market: &impl Market) -> Self {
        let fee = market.fee();
        info!("Router {} created for market {} (fee {}/1000)", address, market.address(), fee);
        Self {
            address,
            fee,
            pool_cache: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn fee(&self) -> u32 {
        self.fee
    }

    /// Cached pool for `token`, if resolved before
    pub fn cached_pool(&self, token: &Address) -> Option<Address> {
        self.pool_cache.get(token).copied()
    }

    /// Run a router call atomically; the cache is restored if it fails
    fn execute<T, F>(&mut self, runtime: &mut Runtime, op: F) -> LiquidityResult<T>
    where
        F: FnOnce(&mut Self, &mut Runtime) -> LiquidityResult<T>,
    {
        let cache = self.pool_cache.clone();
        let result = runtime.atomic(|rt| op(self, rt));
        if result.is_err() {
            self.pool_cache = cache;
        }
        result
    }

    /// Pool for `token`, through the cache
    fn resolve_pool(&mut self, runtime: &Runtime, token: &Address) -> LiquidityResult<Address> {
        if let Some(pool) = self.pool_cache.get(token) {
            return Ok(*pool);
        }
        let pool = self.lookup_pool(runtime, token)?;
        self.pool_cache.insert(*token, pool);
        Ok(pool)
    }

    /// Pool for `token` without filling the cache
    fn lookup_pool(&self, runtime: &Runtime, token: &Address) -> LiquidityResult<Address> {
        if let Some(pool) = self.pool_cache.get(token) {
            return Ok(*pool);
        }
        match runtime.market().pool(token) {
            Some(pool) if !pool.is_zero() => Ok(pool),
            _ => Err(LiquidityError::InvalidPool(*token)),
        }
    }

    fn reserves(&self, runtime: &Runtime, pool: &Address) -> LiquidityResult<Reserves> {
        Ok(runtime.pool(pool)?.reserves())
    }

    /// Native sent along with a call lands on the router first
    fn receive_value(&self, runtime: &mut Runtime, caller: &Address, value: NativeAmount) -> LiquidityResult<()> {
        runtime.transfer_native(caller, &self.address, value)
    }

    // ----- liquidity -----

    /// Deposit at the current ratio and mint LP shares to `params.to`
    ///
    /// Returns `(amount_native, amount_token, liquidity)`.
    pub fn add_liquidity(
        &mut self,
        runtime: &mut Runtime,
        caller: Address,
        value: NativeAmount,
        params: AddLiquidity,
    ) -> LiquidityResult<(NativeAmount, U256, U256)> {
        self.execute(runtime, |router, rt| {
            ensure_deadline(rt.block_height(), params.deadline)?;
            let pool = router.resolve_pool(rt, &params.token)?;
            let reserves = router.reserves(rt, &pool)?;

            let (amount_native, amount_token) = optimal_liquidity_amounts(
                value,
                params.amount_token_desired,
                params.amount_native_min,
                params.amount_token_min,
                reserves,
            )?;

            router.receive_value(rt, &caller, value)?;
            rt.transfer_token_from(&params.token, &router.address, &caller, &pool, amount_token)?;
            rt.transfer_native(&router.address, &pool, amount_native)?;
            let refund = value - amount_native;
            if refund > 0 {
                rt.transfer_native(&router.address, &caller, refund)?;
            }

            let liquidity = rt.mint(router.address, pool, params.to)?;
            debug!(
                "add_liquidity: {} native + {} token -> {} LP (refund {})",
                amount_native, amount_token, liquidity, refund
            );
            Ok((amount_native, amount_token, liquidity))
        })
    }

    /// Return LP shares to the pool and withdraw both assets to `params.to`
    pub fn remove_liquidity(
        &mut self,
        runtime: &mut Runtime,
        caller: Address,
        params: RemoveLiquidity,
    ) -> LiquidityResult<(NativeAmount, U256)> {
        self.execute(runtime, |router, rt| {
            ensure_deadline(rt.block_height(), params.deadline)?;
            let pool = router.resolve_pool(rt, &params.token)?;

            rt.transfer_lp_from(pool, router.address, caller, pool, params.liquidity)?;
            let (amount_native, amount_token) = rt.burn(router.address, pool, params.to)?;

            if amount_native < params.amount_native_min {
                return Err(LiquidityError::InsufficientNativeAmount);
            }
            if amount_token < params.amount_token_min {
                return Err(LiquidityError::InsufficientTokenAmount);
            }
            debug!(
                "remove_liquidity: {} LP -> {} native + {} token",
                params.liquidity, amount_native, amount_token
            );
            Ok((amount_native, amount_token))
        })
    }

    // ----- swaps -----

    /// Spend exactly `value` native on `token`
    #[allow(clippy::too_many_arguments)]
    pub fn swap_exact_native_for_tokens(
        &mut self,
        runtime: &mut Runtime,
        caller: Address,
        value: NativeAmount,
        token: Address,
        amount_out_min: U256,
        to: Address,
        deadline: BlockNumber,
    ) -> LiquidityResult<U256> {
        self.execute(runtime, |router, rt| {
            ensure_deadline(rt.block_height(), deadline)?;
            let pool = router.resolve_pool(rt, &token)?;
            let reserves = router.reserves(rt, &pool)?;

            let amount_out = math::quote_amount_out(
                U256::from(value),
                U256::from(reserves.native),
                reserves.token,
                router.fee,
            )?;
            if amount_out < amount_out_min {
                return Err(LiquidityError::InsufficientOutputAmount);
            }

            router.receive_value(rt, &caller, value)?;
            rt.transfer_native(&router.address, &pool, value)?;
            rt.swap(router.address, pool, 0, amount_out, to, &[])?;
            debug!("swap {} native -> {} token", value, amount_out);
            Ok(amount_out)
        })
    }

    /// Buy exactly `amount_out` of `token`, spending at most `value` native
    /// (the rest is refunded); returns the native spent
    #[allow(clippy::too_many_arguments)]
    pub fn swap_native_for_exact_tokens(
        &mut self,
        runtime: &mut Runtime,
        caller: Address,
        value: NativeAmount,
        token: Address,
        amount_out: U256,
        to: Address,
        deadline: BlockNumber,
    ) -> LiquidityResult<NativeAmount> {
        self.execute(runtime, |router, rt| {
            ensure_deadline(rt.block_height(), deadline)?;
            let pool = router.resolve_pool(rt, &token)?;
            let reserves = router.reserves(rt, &pool)?;

            let amount_in = u256_to_native(math::quote_amount_in(
                amount_out,
                U256::from(reserves.native),
                reserves.token,
                router.fee,
            )?)?;
            if amount_in > value {
                return Err(LiquidityError::ExcessiveInputAmount);
            }

            router.receive_value(rt, &caller, value)?;
            rt.transfer_native(&router.address, &pool, amount_in)?;
            rt.swap(router.address, pool, 0, amount_out, to, &[])?;
            let refund = value - amount_in;
            if refund > 0 {
                rt.transfer_native(&router.address, &caller, refund)?;
            }
            debug!("swap {} native -> {} token (refund {})", amount_in, amount_out, refund);
            Ok(amount_in)
        })
    }

    /// Sell exactly `amount_in` of `token` for native
    #[allow(clippy::too_many_arguments)]
    pub fn swap_exact_tokens_for_native(
        &mut self,
        runtime: &mut Runtime,
        caller: Address,
        token: Address,
        amount_in: U256,
        amount_out_min: NativeAmount,
        to: Address,
        deadline: BlockNumber,
    ) -> LiquidityResult<NativeAmount> {
        self.execute(runtime, |router, rt| {
            ensure_deadline(rt.block_height(), deadline)?;
            let pool = router.resolve_pool(rt, &token)?;
            let reserves = router.reserves(rt, &pool)?;

            let amount_out = u256_to_native(math::quote_amount_out(
                amount_in,
                reserves.token,
                U256::from(reserves.native),
                router.fee,
            )?)?;
            if amount_out < amount_out_min {
                return Err(LiquidityError::InsufficientOutputAmount);
            }

            rt.transfer_token_from(&token, &router.address, &caller, &pool, amount_in)?;
            rt.swap(router.address, pool, amount_out, U256::zero(), to, &[])?;
            debug!("swap {} token -> {} native", amount_in, amount_out);
            Ok(amount_out)
        })
    }

    /// Buy exactly `amount_out` native, selling at most `amount_in_max` of
    /// `token`; returns the tokens spent
    #[allow(clippy::too_many_arguments)]
    pub fn swap_tokens_for_exact_native(
        &mut self,
        runtime: &mut Runtime,
        caller: Address,
        token: Address,
        amount_out: NativeAmount,
        amount_in_max: U256,
        to: Address,
        deadline: BlockNumber,
    ) -> LiquidityResult<U256> {
        self.execute(runtime, |router, rt| {
            ensure_deadline(rt.block_height(), deadline)?;
            let pool = router.resolve_pool(rt, &token)?;
            let reserves = router.reserves(rt, &pool)?;

            let amount_in = math::quote_amount_in(
                U256::from(amount_out),
                reserves.token,
                U256::from(reserves.native),
                router.fee,
            )?;
            if amount_in > amount_in_max {
                return Err(LiquidityError::ExcessiveInputAmount);
            }

            rt.transfer_token_from(&token, &router.address, &caller, &pool, amount_in)?;
            rt.swap(router.address, pool, amount_out, U256::zero(), to, &[])?;
            debug!("swap {} token -> {} native", amount_in, amount_out);
            Ok(amount_in)
        })
    }

    /// Sell exactly `amount_in` of `token_in` for `token_out` through native
    #[allow(clippy::too_many_arguments)]
    pub fn swap_exact_tokens_for_tokens(
        &mut self,
        runtime: &mut Runtime,
        caller: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        amount_out_min: U256,
        to: Address,
        deadline: BlockNumber,
    ) -> LiquidityResult<U256> {
        self.execute(runtime, |router, rt| {
            ensure_deadline(rt.block_height(), deadline)?;
            let (pool_in, pool_out) = router.resolve_pair(rt, &token_in, &token_out)?;

            let (native_mid, amount_out) = math::quote_multi_hop_out(
                amount_in,
                router.reserves(rt, &pool_in)?,
                router.reserves(rt, &pool_out)?,
                router.fee,
            )?;
            if amount_out < amount_out_min {
                return Err(LiquidityError::InsufficientOutputAmount);
            }

            rt.transfer_token_from(&token_in, &router.address, &caller, &pool_in, amount_in)?;
            router.swap_through_native(rt, pool_in, pool_out, u256_to_native(native_mid)?, amount_out, to)?;
            debug!("swap {} token -> {} native -> {} token", amount_in, native_mid, amount_out);
            Ok(amount_out)
        })
    }

    /// Buy exactly `amount_out` of `token_out`, selling at most
    /// `amount_in_max` of `token_in`; returns the tokens spent
    #[allow(clippy::too_many_arguments)]
    pub fn swap_tokens_for_exact_tokens(
        &mut self,
        runtime: &mut Runtime,
        caller: Address,
        token_in: Address,
        token_out: Address,
        amount_out: U256,
        amount_in_max: U256,
        to: Address,
        deadline: BlockNumber,
    ) -> LiquidityResult<U256> {
        self.execute(runtime, |router, rt| {
            ensure_deadline(rt.block_height(), deadline)?;
            let (pool_in, pool_out) = router.resolve_pair(rt, &token_in, &token_out)?;

            let (amount_in, native_mid) = math::quote_multi_hop_in(
                amount_out,
                router.reserves(rt, &pool_in)?,
                router.reserves(rt, &pool_out)?,
                router.fee,
            )?;
            if amount_in > amount_in_max {
                return Err(LiquidityError::ExcessiveInputAmount);
            }

            rt.transfer_token_from(&token_in, &router.address, &caller, &pool_in, amount_in)?;
            router.swap_through_native(rt, pool_in, pool_out, u256_to_native(native_mid)?, amount_out, to)?;
            debug!("swap {} token -> {} native -> {} token", amount_in, native_mid, amount_out);
            Ok(amount_in)
        })
    }

    fn resolve_pair(
        &mut self,
        runtime: &Runtime,
        token_in: &Address,
        token_out: &Address,
    ) -> LiquidityResult<(Address, Address)> {
        if token_in == token_out {
            return Err(LiquidityError::InvalidToken(*token_out));
        }
        Ok((self.resolve_pool(runtime, token_in)?, self.resolve_pool(runtime, token_out)?))
    }

    /// First leg sends native straight into the second pool
    fn swap_through_native(
        &self,
        runtime: &mut Runtime,
        pool_in: Address,
        pool_out: Address,
        native_mid: NativeAmount,
        amount_out: U256,
        to: Address,
    ) -> LiquidityResult<()> {
        runtime.swap(self.address, pool_in, native_mid, U256::zero(), pool_out, &[])?;
        runtime.swap(self.address, pool_out, 0, amount_out, to, &[])
    }

    // ----- quotes -----

    pub fn get_liquidity_quote(
        &self,
        amount_a: U256,
        reserve_a: U256,
        reserve_b: U256,
    ) -> LiquidityResult<U256> {
        math::quote_liquidity(amount_a, reserve_a, reserve_b)
    }

    pub fn get_amount_out(
        &self,
        amount_in: U256,
        reserve_in: U256,
        reserve_out: U256,
    ) -> LiquidityResult<U256> {
        math::quote_amount_out(amount_in, reserve_in, reserve_out, self.fee)
    }

    pub fn get_amount_in(
        &self,
        amount_out: U256,
        reserve_in: U256,
        reserve_out: U256,
    ) -> LiquidityResult<U256> {
        math::quote_amount_in(amount_out, reserve_in, reserve_out, self.fee)
    }

    /// Output of selling `amount_in` of `token_in` for `token_out`
    pub fn get_amount_out_multi(
        &self,
        runtime: &Runtime,
        amount_in: U256,
        token_in: &Address,
        token_out: &Address,
    ) -> LiquidityResult<U256> {
        let pool_in = self.lookup_pool(runtime, token_in)?;
        let pool_out = self.lookup_pool(runtime, token_out)?;
        let (_, amount_out) = math::quote_multi_hop_out(
            amount_in,
            self.reserves(runtime, &pool_in)?,
            self.reserves(runtime, &pool_out)?,
            self.fee,
        )?;
        Ok(amount_out)
    }

    /// Input of `token_in` needed to buy `amount_out` of `token_out`
    pub fn get_amount_in_multi(
        &self,
        runtime: &Runtime,
        amount_out: U256,
        token_in: &Address,
        token_out: &Address,
    ) -> LiquidityResult<U256> {
        let pool_in = self.lookup_pool(runtime, token_in)?;
        let pool_out = self.lookup_pool(runtime, token_out)?;
        let (amount_in, _) = math::quote_multi_hop_in(
            amount_out,
            self.reserves(runtime, &pool_in)?,
            self.reserves(runtime, &pool_out)?,
            self.fee,
        )?;
        Ok(amount_in)
    }
}

/// `0` never expires; otherwise the call must land at or before `deadline`
pub fn ensure_deadline(height: BlockNumber, deadline: BlockNumber) -> LiquidityResult<()> {
    if deadline != 0 && height > deadline {
        return Err(LiquidityError::ExpiredDeadline { deadline, height });
    }
    Ok(())
}

/// Amounts to deposit so the pool ratio is kept
///
/// An empty pool takes the desired amounts verbatim. Otherwise the side
/// that fits within its desired amount is derived from the other.
pub fn optimal_liquidity_amounts(
    amount_native_desired: NativeAmount,
    amount_token_desired: U256,
    amount_native_min: NativeAmount,
    amount_token_min: U256,
    reserves: Reserves,
) -> LiquidityResult<(NativeAmount, U256)> {
    if reserves.native == 0 && reserves.token.is_zero() {
        return Ok((amount_native_desired, amount_token_desired));
    }

    let reserve_native = U256::from(reserves.native);
    let token_optimal =
        math::quote_liquidity(U256::from(amount_native_desired), reserve_native, reserves.token)?;
    if token_optimal <= amount_token_desired {
        if token_optimal < amount_token_min {
            return Err(LiquidityError::InsufficientTokenAmount);
        }
        return Ok((amount_native_desired, token_optimal));
    }

    let native_optimal = math::quote_liquidity(amount_token_desired, reserves.token, reserve_native)?;
    if native_optimal > U256::from(amount_native_desired)
        || native_optimal < U256::from(amount_native_min)
    {
        return Err(LiquidityError::InsufficientNativeAmount);
    }
    Ok((u256_to_native(native_optimal)?, amount_token_desired))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    #[test]
    fn test_quotes_use_market_fee() {
        let market = crate::MarketRegistry::new(Address::from_label("market"), Default::default()).unwrap();
        let router = Router::new(Address::from_label("router"), &market);
        assert_eq!(router.fee(), 3);
        assert_eq!(router.get_amount_out(u(17_000), u(450_000), u(200_000)).unwrap(), u(7_259));
        assert!(router.get_amount_in(u(7_259), u(450_000), u(200_000)).unwrap() <= u(17_000));
        assert_eq!(router.get_liquidity_quote(u(100), u(1_000), u(2_000)).unwrap(), u(200));
        assert_eq!(router.cached_pool(&Address::from_label("TKN")), None);
    }

    #[test]
    fn test_deadline() {
        assert!(ensure_deadline(1_000_000, 0).is_ok());
        assert!(ensure_deadline(10, 10).is_ok());
        assert_eq!(
            ensure_deadline(10, 9),
            Err(LiquidityError::ExpiredDeadline { deadline: 9, height: 10 })
        );
    }

    #[test]
    fn test_empty_pool_takes_desired() {
        let amounts = optimal_liquidity_amounts(7, u(11), 7, u(11), Reserves::default()).unwrap();
        assert_eq!(amounts, (7, u(11)));
    }

    #[test]
    fn test_token_side_derived() {
        // ratio 1 native : 2 token
        let reserves = Reserves::new(1_000, u(2_000));
        let amounts = optimal_liquidity_amounts(100, u(500), 0, u(150), reserves).unwrap();
        assert_eq!(amounts, (100, u(200)));

        assert_eq!(
            optimal_liquidity_amounts(100, u(500), 0, u(201), reserves),
            Err(LiquidityError::InsufficientTokenAmount)
        );
    }

    #[test]
    fn test_native_side_derived() {
        let reserves = Reserves::new(1_000, u(2_000));
        let amounts = optimal_liquidity_amounts(100, u(100), 40, U256::zero(), reserves).unwrap();
        assert_eq!(amounts, (50, u(100)));

        assert_eq!(
            optimal_liquidity_amounts(100, u(100), 51, U256::zero(), reserves),
            Err(LiquidityError::InsufficientNativeAmount)
        );
    }
}
