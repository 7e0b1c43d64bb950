// liquidity/src/runtime.rs

//! Execution runtime for the exchange
//!
//! Owns the world state, the deployed pools and the market. Every public
//! entry point runs atomically: state is checkpointed before the call,
//! committed on success and rolled back on any error, including errors
//! raised by nested calls (router legs, swap receivers).

use crate::{
    config::MarketConfig,
    market::{Market, MarketRegistry},
    math::{self, Reserves},
    LiquidityError, LiquidityPool, LiquidityResult, MINIMUM_LIQUIDITY,
};
use chain_core::{Address, BlockNumber, Event, Log, NativeAmount, Snapshot, WorldState, U256};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Arguments handed to a swap receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapCallback {
    pub sender: Address,
    pub pool: Address,
    pub amount_native_out: NativeAmount,
    pub amount_token_out: U256,
    pub data: Vec<u8>,
}

/// Contract called back by `swap` after the optimistic transfer
///
/// The receiver must leave the pool with enough input for the invariant
/// check to pass. Calls back into the same pool fail with `Locked`.
pub trait SwapReceiver {
    fn on_swap(&self, runtime: &mut Runtime, callback: &SwapCallback) -> LiquidityResult<()>;
}

struct Checkpoint {
    world: Snapshot,
    pools: BTreeMap<Address, LiquidityPool>,
    market: MarketRegistry,
}

/// World state plus exchange contracts
pub struct Runtime {
    world: WorldState,
    pools: BTreeMap<Address, LiquidityPool>,
    market: MarketRegistry,
    checkpoints: Vec<Checkpoint>,
    receivers: HashMap<Address, Rc<dyn SwapReceiver>>,
}

impl Runtime {
    pub fn new(market_address: Address, config: MarketConfig) -> LiquidityResult<Self> {
        Ok(Self {
            world: WorldState::new(),
            pools: BTreeMap::new(),
            market: MarketRegistry::new(market_address, config)?,
            checkpoints: Vec::new(),
            receivers: HashMap::new(),
        })
    }

    // ----- atomic execution -----

    /// Begin transaction (checkpoint)
    fn checkpoint(&mut self) {
        self.checkpoints.push(Checkpoint {
            world: self.world.snapshot(),
            pools: self.pools.clone(),
            market: self.market.clone(),
        });
    }

    /// Commit transaction
    fn commit(&mut self) {
        self.checkpoints.pop();
    }

    /// Rollback transaction
    fn rollback(&mut self) {
        if let Some(checkpoint) = self.checkpoints.pop() {
            self.world.restore(checkpoint.world);
            self.pools = checkpoint.pools;
            self.market = checkpoint.market;
        }
    }

    /// Run `op` all-or-nothing
    pub fn atomic<T, F>(&mut self, op: F) -> LiquidityResult<T>
    where
        F: FnOnce(&mut Self) -> LiquidityResult<T>,
    {
        self.checkpoint();
        match op(self) {
            Ok(value) => {
                self.commit();
                Ok(value)
            }
            Err(err) => {
                self.rollback();
                if self.checkpoints.is_empty() {
                    warn!("Operation rolled back: {}", err);
                }
                Err(err)
            }
        }
    }

    /// Run `op` with the pool's reentrancy lock held; the lock is released
    /// on every exit path
    fn with_lock<T, F>(&mut self, pool: &Address, op: F) -> LiquidityResult<T>
    where
        F: FnOnce(&mut Self) -> LiquidityResult<T>,
    {
        self.pool_mut(pool)?.lock()?;
        let result = op(self);
        if let Some(entry) = self.pools.get_mut(pool) {
            entry.unlock();
        }
        result
    }

    // ----- chain -----

    pub fn block_height(&self) -> BlockNumber {
        self.world.block_height()
    }

    pub fn set_block_height(&mut self, height: BlockNumber) {
        self.world.set_block_height(height);
    }

    pub fn advance_blocks(&mut self, blocks: u64) {
        self.world.advance_blocks(blocks);
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn logs(&self) -> &[Log] {
        self.world.logs()
    }

    pub fn native_balance(&self, owner: &Address) -> NativeAmount {
        self.world.native_balance(owner)
    }

    pub fn token_balance(&self, token: &Address, owner: &Address) -> U256 {
        self.world.token_balance(token, owner)
    }

    pub fn token_allowance(&self, token: &Address, owner: &Address, spender: &Address) -> U256 {
        self.world
            .token(token)
            .map(|ledger| ledger.allowance(owner, spender))
            .unwrap_or_default()
    }

    /// Faucet: create native currency for `to`
    pub fn credit_native(&mut self, to: &Address, amount: NativeAmount) -> LiquidityResult<()> {
        Ok(self.world.credit_native(to, amount)?)
    }

    pub fn deploy_token(&mut self, token: Address) -> LiquidityResult<()> {
        Ok(self.world.deploy_token(token)?)
    }

    /// Faucet: mint `amount` of `token` to `to`
    pub fn mint_token(&mut self, token: &Address, to: &Address, amount: U256) -> LiquidityResult<()> {
        Ok(self.world.token_mint(token, to, amount)?)
    }

    pub fn transfer_native(
        &mut self,
        from: &Address,
        to: &Address,
        amount: NativeAmount,
    ) -> LiquidityResult<()> {
        self.world
            .transfer_native(from, to, amount)
            .map_err(LiquidityError::InvalidTransfer)
    }

    pub fn transfer_token(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> LiquidityResult<()> {
        self.world
            .token_transfer(token, from, to, amount)
            .map_err(LiquidityError::InvalidTransfer)
    }

    pub fn transfer_token_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> LiquidityResult<()> {
        self.world
            .token_transfer_from(token, spender, from, to, amount)
            .map_err(LiquidityError::InvalidTransferFrom)
    }

    pub fn approve_token(
        &mut self,
        token: &Address,
        owner: &Address,
        spender: &Address,
        amount: U256,
    ) -> LiquidityResult<()> {
        Ok(self.world.token_approve(token, owner, spender, amount)?)
    }

    /// Install the swap receiver invoked for `address`
    pub fn register_receiver(&mut self, address: Address, receiver: Rc<dyn SwapReceiver>) {
        self.receivers.insert(address, receiver);
    }

    // ----- market -----

    pub fn market(&self) -> &MarketRegistry {
        &self.market
    }

    /// Deploy the pool for `token` at an address derived from (market, token)
    pub fn create_pool(&mut self, token: Address) -> LiquidityResult<Address> {
        self.atomic(|rt| {
            if !rt.world.has_token(&token) {
                return Err(LiquidityError::InvalidToken(token));
            }
            if rt.market.pool(&token).is_some() {
                return Err(LiquidityError::PoolExists(token));
            }

            let market = rt.market.address();
            let config = rt.market.pool_config_for(token);
            if let Some(staking_token) = config.staking_token {
                if !rt.world.has_token(&staking_token) {
                    return Err(LiquidityError::InvalidToken(staking_token));
                }
            }

            let address = Address::derive(b"pool", &[market.as_bytes(), token.as_bytes()]);
            let pool = LiquidityPool::new(address, config)?;
            rt.market.register(token, address)?;
            rt.pools.insert(address, pool);
            rt.world.emit(market, Event::PoolCreated { token, pool: address });

            info!("Created pool {} for token {}", address, token);
            Ok(address)
        })
    }

    pub fn pool(&self, pool: &Address) -> LiquidityResult<&LiquidityPool> {
        self.pools.get(pool).ok_or(LiquidityError::InvalidPool(*pool))
    }

    fn pool_mut(&mut self, pool: &Address) -> LiquidityResult<&mut LiquidityPool> {
        self.pools.get_mut(pool).ok_or(LiquidityError::InvalidPool(*pool))
    }

    /// Live balances of `pool` (as opposed to its recorded reserves)
    pub fn pool_balances(&self, pool: &Address) -> LiquidityResult<Reserves> {
        let token = self.pool(pool)?.token();
        Ok(Reserves::new(
            self.world.native_balance(pool),
            self.world.token_balance(&token, pool),
        ))
    }

    // ----- pool entry points -----

    /// Mint LP shares to `to` for the assets deposited since the last sync
    pub fn mint(&mut self, sender: Address, pool: Address, to: Address) -> LiquidityResult<U256> {
        self.atomic(|rt| {
            let liquidity = rt.with_lock(&pool, |rt| rt.mint_locked(sender, pool, to))?;
            rt.pool_mut(&pool)?.accrue_staking_rewards()?;
            Ok(liquidity)
        })
    }

    /// Burn the LP shares sent to the pool and pay out both assets to `to`
    pub fn burn(
        &mut self,
        sender: Address,
        pool: Address,
        to: Address,
    ) -> LiquidityResult<(NativeAmount, U256)> {
        self.atomic(|rt| {
            let amounts = rt.with_lock(&pool, |rt| {
                let liquidity = rt.pool(&pool)?.burnable_liquidity()?;
                rt.burn_liquidity(sender, pool, to, liquidity)
            })?;
            rt.pool_mut(&pool)?.accrue_staking_rewards()?;
            Ok(amounts)
        })
    }

    /// Send out the requested amounts; inputs must have arrived (or arrive
    /// during the receiver callback) for the invariant check to pass
    pub fn swap(
        &mut self,
        sender: Address,
        pool: Address,
        amount_native_out: NativeAmount,
        amount_token_out: U256,
        to: Address,
        data: &[u8],
    ) -> LiquidityResult<()> {
        self.atomic(|rt| {
            rt.with_lock(&pool, |rt| {
                rt.swap_locked(sender, pool, amount_native_out, amount_token_out, to, data)
            })
        })
    }

    /// Force reserves to match balances
    pub fn sync(&mut self, pool: Address) -> LiquidityResult<()> {
        self.atomic(|rt| {
            rt.with_lock(&pool, |rt| {
                let balances = rt.pool_balances(&pool)?;
                rt.pool_mut(&pool)?.update_reserves(balances);
                rt.emit_reserves(pool, balances);
                debug!("Synced pool {}: {} native, {} token", pool, balances.native, balances.token);
                Ok(())
            })
        })
    }

    /// Force balances to match reserves, sending the excess to `to`
    pub fn skim(&mut self, pool: Address, to: Address) -> LiquidityResult<()> {
        self.atomic(|rt| {
            rt.with_lock(&pool, |rt| {
                let balances = rt.pool_balances(&pool)?;
                let reserves = rt.pool(&pool)?.reserves();
                let token = rt.pool(&pool)?.token();

                let excess_native = balances
                    .native
                    .checked_sub(reserves.native)
                    .ok_or(LiquidityError::Overflow("native excess"))?;
                let excess_token = balances
                    .token
                    .checked_sub(reserves.token)
                    .ok_or(LiquidityError::Overflow("token excess"))?;

                rt.send_native(&pool, &to, excess_native)?;
                rt.send_token(&token, &pool, &to, excess_token)?;
                debug!("Skimmed pool {}: {} native, {} token", pool, excess_native, excess_token);
                Ok(())
            })
        })
    }

    // ----- staking entry points -----

    /// Lock `amount` staking tokens (pulled with `transfer_from`, the pool
    /// being the spender)
    pub fn stake(&mut self, sender: Address, pool: Address, amount: U256) -> LiquidityResult<()> {
        self.atomic(|rt| {
            rt.pool(&pool)?.staking()?;
            if amount.is_zero() {
                return Err(LiquidityError::InvalidAmount);
            }
            rt.with_lock(&pool, |rt| {
                let staking_token = rt.pool(&pool)?.staking()?.staking_token();
                rt.transfer_token_from(&staking_token, &pool, &sender, &pool, amount)?;

                let entry = rt.pool_mut(&pool)?;
                entry.settle_staker(&sender)?;
                entry.staking_mut()?.add_stake(&sender, amount)?;
                let total_staked = entry.staking()?.total_staked();

                rt.world.token_mut(&staking_token)?.nominate(&pool, total_staked);
                rt.world.emit(pool, Event::StartStaking { staker: sender, amount, total_staked });
                debug!("{} staked {} in pool {} (total {})", sender, amount, pool, total_staked);
                Ok(())
            })
        })
    }

    /// Pay the staker's reward, then return their whole stake
    ///
    /// With `burn` the reward shares are redeemed for native and token.
    /// Returns `(unstaked, reward)`.
    pub fn unstake(
        &mut self,
        staker: Address,
        pool: Address,
        burn: bool,
    ) -> LiquidityResult<(U256, U256)> {
        self.atomic(|rt| {
            rt.pool(&pool)?.staking()?;
            rt.with_lock(&pool, |rt| {
                rt.pool_mut(&pool)?.settle_staker(&staker)?;
                if rt.pool(&pool)?.staking()?.staked_balance(&staker).is_zero() {
                    return Err(LiquidityError::InvalidAmount);
                }

                let reward = rt.pay_staking_rewards(staker, pool, burn)?;

                let entry = rt.pool_mut(&pool)?;
                let staking = entry.staking_mut()?;
                let amount = staking.remove_stake(&staker)?;
                let total_staked = staking.total_staked();
                let staking_token = staking.staking_token();

                rt.send_token(&staking_token, &pool, &staker, amount)?;
                rt.world.token_mut(&staking_token)?.nominate(&pool, total_staked);
                rt.world.emit(pool, Event::StopStaking { staker, amount, total_staked });
                debug!("{} unstaked {} from pool {} (reward {})", staker, amount, pool, reward);
                Ok((amount, reward))
            })
        })
    }

    /// Pay the staker's reward without touching the stake
    pub fn collect_staking_rewards(
        &mut self,
        staker: Address,
        pool: Address,
        burn: bool,
    ) -> LiquidityResult<U256> {
        self.atomic(|rt| {
            rt.pool(&pool)?.staking()?;
            rt.with_lock(&pool, |rt| {
                rt.pool_mut(&pool)?.settle_staker(&staker)?;
                rt.pay_staking_rewards(staker, pool, burn)
            })
        })
    }

    /// Pending reward of `staker`, including not-yet-folded fee shares
    pub fn get_staking_rewards(&self, pool: &Address, staker: &Address) -> LiquidityResult<U256> {
        self.pool(pool)?.get_staking_rewards(staker)
    }

    // ----- LP shares -----

    pub fn lp_balance_of(&self, pool: &Address, owner: &Address) -> LiquidityResult<U256> {
        Ok(self.pool(pool)?.lp_balance_of(owner))
    }

    pub fn lp_allowance(
        &self,
        pool: &Address,
        owner: &Address,
        spender: &Address,
    ) -> LiquidityResult<U256> {
        Ok(self.pool(pool)?.lp_allowance(owner, spender))
    }

    pub fn lp_total_supply(&self, pool: &Address) -> LiquidityResult<U256> {
        Ok(self.pool(pool)?.total_supply())
    }

    pub fn transfer_lp(
        &mut self,
        pool: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> LiquidityResult<()> {
        self.atomic(|rt| {
            rt.pool_mut(&pool)?
                .shares_mut()
                .transfer(&from, &to, amount)
                .map_err(LiquidityError::InvalidTransfer)?;
            rt.world.emit(pool, Event::Transfer { from, to, amount });
            Ok(())
        })
    }

    pub fn transfer_lp_from(
        &mut self,
        pool: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> LiquidityResult<()> {
        self.atomic(|rt| {
            rt.pool_mut(&pool)?
                .shares_mut()
                .transfer_from(&spender, &from, &to, amount)
                .map_err(LiquidityError::InvalidTransferFrom)?;
            rt.world.emit(pool, Event::Transfer { from, to, amount });
            Ok(())
        })
    }

    pub fn approve_lp(
        &mut self,
        pool: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> LiquidityResult<()> {
        self.atomic(|rt| {
            rt.pool_mut(&pool)?.shares_mut().approve(&owner, &spender, amount);
            rt.world.emit(pool, Event::Approval { owner, spender, amount });
            Ok(())
        })
    }

    // ----- internals (lock held) -----

    fn mint_locked(&mut self, sender: Address, pool: Address, to: Address) -> LiquidityResult<U256> {
        let balances = self.pool_balances(&pool)?;
        let reserves = self.pool(&pool)?.reserves();
        let amount_native = balances
            .native
            .checked_sub(reserves.native)
            .ok_or(LiquidityError::Overflow("native deposit"))?;
        let amount_token = balances
            .token
            .checked_sub(reserves.token)
            .ok_or(LiquidityError::Overflow("token deposit"))?;

        self.mint_protocol_fee(&pool)?;

        let (liquidity, initial) = self
            .pool(&pool)?
            .liquidity_for_deposit(amount_native, amount_token)?;
        if initial {
            self.mint_shares(&pool, &Address::zero(), U256::from(MINIMUM_LIQUIDITY))?;
        }
        self.mint_shares(&pool, &to, liquidity)?;

        let entry = self.pool_mut(&pool)?;
        entry.update_reserves(balances);
        entry.refresh_k_last()?;
        let total_supply = entry.total_supply();

        self.emit_reserves(pool, balances);
        self.world.emit(
            pool,
            Event::Mint {
                sender,
                to,
                amount_native,
                amount_token,
                amount_lpt: liquidity,
                total_supply,
            },
        );
        debug!(
            "Mint on pool {}: {} native + {} token -> {} LP to {}",
            pool, amount_native, amount_token, liquidity, to
        );
        Ok(liquidity)
    }

    /// Burn `liquidity` pool-held shares and send the assets to `to`
    fn burn_liquidity(
        &mut self,
        sender: Address,
        pool: Address,
        to: Address,
        liquidity: U256,
    ) -> LiquidityResult<(NativeAmount, U256)> {
        self.mint_protocol_fee(&pool)?;

        let balances = self.pool_balances(&pool)?;
        let (amount_native, amount_token) = self.pool(&pool)?.amounts_for_burn(liquidity, balances)?;
        let token = self.pool(&pool)?.token();

        self.pool_mut(&pool)?.shares_mut().burn(&pool, liquidity)?;
        self.world.emit(pool, Event::Transfer { from: pool, to: Address::zero(), amount: liquidity });

        self.send_native(&pool, &to, amount_native)?;
        self.send_token(&token, &pool, &to, amount_token)?;

        let balances = self.pool_balances(&pool)?;
        let entry = self.pool_mut(&pool)?;
        entry.update_reserves(balances);
        entry.refresh_k_last()?;
        let total_supply = entry.total_supply();

        self.emit_reserves(pool, balances);
        self.world.emit(
            pool,
            Event::Burn {
                sender,
                to,
                amount_native,
                amount_token,
                amount_lpt: liquidity,
                total_supply,
            },
        );
        debug!(
            "Burn on pool {}: {} LP -> {} native + {} token to {}",
            pool, liquidity, amount_native, amount_token, to
        );
        Ok((amount_native, amount_token))
    }

    fn swap_locked(
        &mut self,
        sender: Address,
        pool: Address,
        amount_native_out: NativeAmount,
        amount_token_out: U256,
        to: Address,
        data: &[u8],
    ) -> LiquidityResult<()> {
        if amount_native_out == 0 && amount_token_out.is_zero() {
            return Err(LiquidityError::InsufficientOutputAmount);
        }
        let entry = self.pool(&pool)?;
        let reserves = entry.reserves();
        let token = entry.token();
        let fee = entry.fee();

        if amount_native_out >= reserves.native || amount_token_out >= reserves.token {
            return Err(LiquidityError::InsufficientLiquidity);
        }
        if to == token || to == pool {
            return Err(LiquidityError::InvalidTo);
        }

        self.send_native(&pool, &to, amount_native_out)?;
        self.send_token(&token, &pool, &to, amount_token_out)?;

        if !data.is_empty() {
            let receiver = self
                .receivers
                .get(&to)
                .cloned()
                .ok_or(LiquidityError::InvalidReceiver(to))?;
            let callback = SwapCallback {
                sender,
                pool,
                amount_native_out,
                amount_token_out,
                data: data.to_vec(),
            };
            receiver.on_swap(self, &callback)?;
        }

        let balances = self.pool_balances(&pool)?;
        let amounts_in = Reserves::new(
            balances.native.saturating_sub(reserves.native - amount_native_out),
            balances.token.saturating_sub(reserves.token - amount_token_out),
        );
        if amounts_in.native == 0 && amounts_in.token.is_zero() {
            return Err(LiquidityError::InsufficientInputAmount);
        }
        math::check_invariant(balances, amounts_in, reserves, fee)?;

        self.pool_mut(&pool)?.update_reserves(balances);
        self.emit_reserves(pool, balances);
        self.world.emit(
            pool,
            Event::Swap {
                sender,
                to,
                amount_native_in: amounts_in.native,
                amount_token_in: amounts_in.token,
                amount_native_out,
                amount_token_out,
            },
        );
        debug!(
            "Swap on pool {}: in {} native + {} token, out {} native + {} token",
            pool, amounts_in.native, amounts_in.token, amount_native_out, amount_token_out
        );
        Ok(())
    }

    /// Mint the protocol fee owed since `k_last` to the fee recipient
    fn mint_protocol_fee(&mut self, pool: &Address) -> LiquidityResult<()> {
        let entry = self.pool(pool)?;
        let Some(recipient) = entry.fee_recipient_address() else {
            return Ok(());
        };
        let share = entry.protocol_fee_share()?;
        if share.is_zero() {
            return Ok(());
        }
        self.mint_shares(pool, &recipient, share)?;
        debug!("Protocol fee on pool {}: {} LP to {}", pool, share, recipient);
        Ok(())
    }

    /// Hand the staker's settled reward over, as LP shares or redeemed
    fn pay_staking_rewards(
        &mut self,
        staker: Address,
        pool: Address,
        burn: bool,
    ) -> LiquidityResult<U256> {
        let reward = self.pool_mut(&pool)?.staking_mut()?.take_reward(&staker)?;
        if reward.is_zero() {
            return Ok(reward);
        }

        if burn {
            self.burn_liquidity(staker, pool, staker, reward)?;
        } else {
            self.pool_mut(&pool)?
                .shares_mut()
                .transfer(&pool, &staker, reward)
                .map_err(LiquidityError::InvalidTransfer)?;
            self.world.emit(pool, Event::Transfer { from: pool, to: staker, amount: reward });
        }

        self.world.emit(pool, Event::CollectStakingRewards { staker, amount: reward });
        debug!("{} collected {} LP of staking rewards from pool {}", staker, reward, pool);
        Ok(reward)
    }

    fn mint_shares(&mut self, pool: &Address, to: &Address, amount: U256) -> LiquidityResult<()> {
        self.pool_mut(pool)?.shares_mut().mint(to, amount)?;
        self.world.emit(*pool, Event::Transfer { from: Address::zero(), to: *to, amount });
        Ok(())
    }

    /// Pool-initiated native transfer (zero amounts are skipped)
    fn send_native(&mut self, from: &Address, to: &Address, amount: NativeAmount) -> LiquidityResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.transfer_native(from, to, amount)
    }

    /// Pool-initiated token transfer (zero amounts are skipped)
    fn send_token(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> LiquidityResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        self.transfer_token(token, from, to, amount)
    }

    fn emit_reserves(&mut self, pool: Address, reserves: Reserves) {
        self.world.emit(
            pool,
            Event::ReservesChanged {
                reserve_native: reserves.native,
                reserve_token: reserves.token,
            },
        );
    }
}
