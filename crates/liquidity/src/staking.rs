// liquidity/src/staking.rs

use crate::{LiquidityError, LiquidityResult, REWARD_SCALE};
use chain_core::{Address, U256};
use std::collections::HashMap;

/// Staking ledger of a pool whose protocol fee is paid to stakers
///
/// Protocol-fee LP shares are minted to the pool itself. Shares held by the
/// pool beyond `staking_rewards_balance` are "applicable": not yet folded
/// into the reward-per-staked-token accumulator. Folding happens lazily on
/// every settlement, so each stake change costs O(1) regardless of the
/// number of stakers.
#[derive(Debug, Clone)]
pub struct StakingLedger {
    staking_token: Address,
    total_staked: U256,
    staked_balances: HashMap<Address, U256>,
    /// LP shares owned by the pool that are already attributed to stakers
    staking_rewards_balance: U256,
    /// Accumulated reward per staked token, scaled by `REWARD_SCALE`
    reward_per_staked_token: U256,
    reward_checkpoints: HashMap<Address, U256>,
    stored_rewards: HashMap<Address, U256>,
}

impl StakingLedger {
    pub fn new(staking_token: Address) -> Self {
        Self {
            staking_token,
            total_staked: U256::zero(),
            staked_balances: HashMap::new(),
            staking_rewards_balance: U256::zero(),
            reward_per_staked_token: U256::zero(),
            reward_checkpoints: HashMap::new(),
            stored_rewards: HashMap::new(),
        }
    }

    pub fn staking_token(&self) -> Address {
        self.staking_token
    }

    pub fn total_staked(&self) -> U256 {
        self.total_staked
    }

    pub fn staked_balance(&self, staker: &Address) -> U256 {
        self.staked_balances.get(staker).copied().unwrap_or_default()
    }

    pub fn staking_rewards_balance(&self) -> U256 {
        self.staking_rewards_balance
    }

    pub fn reward_per_staked_token(&self) -> U256 {
        self.reward_per_staked_token
    }

    /// Pool-owned LP shares not yet attributed to stakers
    pub fn applicable_rewards(&self, pool_balance: U256) -> LiquidityResult<U256> {
        pool_balance
            .checked_sub(self.staking_rewards_balance)
            .ok_or(LiquidityError::Overflow("staking rewards balance"))
    }

    /// Fold applicable rewards into the accumulator (no-op without stakers)
    pub fn accrue(&mut self, pool_balance: U256) -> LiquidityResult<()> {
        let (reward_per_staked_token, applicable) = self.accrued(pool_balance)?;
        self.reward_per_staked_token = reward_per_staked_token;
        self.staking_rewards_balance = self
            .staking_rewards_balance
            .checked_add(applicable)
            .ok_or(LiquidityError::Overflow("staking rewards balance"))?;
        Ok(())
    }

    /// Accrue, then move the staker's pending reward into their stored reward
    pub fn settle(&mut self, staker: &Address, pool_balance: U256) -> LiquidityResult<()> {
        self.accrue(pool_balance)?;

        let pending = self.pending_since_checkpoint(staker, self.reward_per_staked_token)?;
        if !pending.is_zero() {
            let stored = self
                .stored_reward(staker)
                .checked_add(pending)
                .ok_or(LiquidityError::Overflow("stored reward"))?;
            self.stored_rewards.insert(*staker, stored);
        }
        self.reward_checkpoints.insert(*staker, self.reward_per_staked_token);
        Ok(())
    }

    /// Reward the staker would receive if settled now
    pub fn pending_rewards(&self, staker: &Address, pool_balance: U256) -> LiquidityResult<U256> {
        let (reward_per_staked_token, _) = self.accrued(pool_balance)?;
        self.stored_reward(staker)
            .checked_add(self.pending_since_checkpoint(staker, reward_per_staked_token)?)
            .ok_or(LiquidityError::Overflow("pending reward"))
    }

    pub fn add_stake(&mut self, staker: &Address, amount: U256) -> LiquidityResult<()> {
        let staked = self
            .staked_balance(staker)
            .checked_add(amount)
            .ok_or(LiquidityError::Overflow("staked balance"))?;
        let total = self
            .total_staked
            .checked_add(amount)
            .ok_or(LiquidityError::Overflow("total staked"))?;

        self.staked_balances.insert(*staker, staked);
        self.total_staked = total;
        Ok(())
    }

    /// Clear the staker's stored reward and release it from the rewards balance
    pub fn take_reward(&mut self, staker: &Address) -> LiquidityResult<U256> {
        let reward = self.stored_reward(staker);
        if reward.is_zero() {
            return Ok(reward);
        }
        self.staking_rewards_balance = self
            .staking_rewards_balance
            .checked_sub(reward)
            .ok_or(LiquidityError::Overflow("staking rewards balance"))?;
        self.stored_rewards.remove(staker);
        Ok(reward)
    }

    /// Remove the staker's whole stake, returning its amount
    ///
    /// When the last stake leaves, the rewards balance resets to zero and
    /// any rounding dust left on the pool becomes applicable again.
    pub fn remove_stake(&mut self, staker: &Address) -> LiquidityResult<U256> {
        let amount = self.staked_balance(staker);
        self.total_staked = self
            .total_staked
            .checked_sub(amount)
            .ok_or(LiquidityError::Overflow("total staked"))?;
        self.staked_balances.remove(staker);

        if self.total_staked.is_zero() {
            self.staking_rewards_balance = U256::zero();
        }
        Ok(amount)
    }

    fn stored_reward(&self, staker: &Address) -> U256 {
        self.stored_rewards.get(staker).copied().unwrap_or_default()
    }

    /// Accumulator value and folded amount after accruing `pool_balance`
    fn accrued(&self, pool_balance: U256) -> LiquidityResult<(U256, U256)> {
        if self.total_staked.is_zero() {
            return Ok((self.reward_per_staked_token, U256::zero()));
        }
        let applicable = self.applicable_rewards(pool_balance)?;
        if applicable.is_zero() {
            return Ok((self.reward_per_staked_token, applicable));
        }

        let increment = applicable
            .checked_mul(U256::from(REWARD_SCALE))
            .ok_or(LiquidityError::Overflow("reward per staked token"))?
            / self.total_staked;
        let reward_per_staked_token = self
            .reward_per_staked_token
            .checked_add(increment)
            .ok_or(LiquidityError::Overflow("reward per staked token"))?;
        Ok((reward_per_staked_token, applicable))
    }

    fn pending_since_checkpoint(
        &self,
        staker: &Address,
        reward_per_staked_token: U256,
    ) -> LiquidityResult<U256> {
        let checkpoint = self.reward_checkpoints.get(staker).copied().unwrap_or_default();
        let delta = reward_per_staked_token
            .checked_sub(checkpoint)
            .ok_or(LiquidityError::Overflow("reward checkpoint"))?;
        Ok(self
            .staked_balance(staker)
            .checked_mul(delta)
            .ok_or(LiquidityError::Overflow("pending reward"))?
            / U256::from(REWARD_SCALE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    #[test]
    fn test_no_accrual_without_stakers() {
        let mut ledger = StakingLedger::new(Address::from_label("STK"));
        ledger.accrue(u(500)).unwrap();
        assert!(ledger.reward_per_staked_token().is_zero());
        assert!(ledger.staking_rewards_balance().is_zero());
        assert_eq!(ledger.applicable_rewards(u(500)).unwrap(), u(500));
    }

    #[test]
    fn test_single_staker_earns_everything() {
        let alice = Address::from_label("alice");
        let mut ledger = StakingLedger::new(Address::from_label("STK"));

        ledger.settle(&alice, U256::zero()).unwrap();
        ledger.add_stake(&alice, u(1_000)).unwrap();

        // 40 fee shares minted to the pool
        assert_eq!(ledger.pending_rewards(&alice, u(40)).unwrap(), u(40));
        ledger.settle(&alice, u(40)).unwrap();
        assert_eq!(ledger.reward_per_staked_token(), u(40 * REWARD_SCALE / 1_000));
        assert_eq!(ledger.staking_rewards_balance(), u(40));

        // settling again is idempotent
        ledger.settle(&alice, u(40)).unwrap();
        assert_eq!(ledger.pending_rewards(&alice, u(40)).unwrap(), u(40));

        assert_eq!(ledger.take_reward(&alice).unwrap(), u(40));
        assert!(ledger.staking_rewards_balance().is_zero());
        assert!(ledger.take_reward(&alice).unwrap().is_zero());
    }

    #[test]
    fn test_rewards_split_by_stake_time() {
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        let mut ledger = StakingLedger::new(Address::from_label("STK"));

        ledger.settle(&alice, U256::zero()).unwrap();
        ledger.add_stake(&alice, u(300)).unwrap();

        // 90 shares accrue while alice is alone
        ledger.settle(&bob, u(90)).unwrap();
        ledger.add_stake(&bob, u(600)).unwrap();

        // 90 more shares accrue while both stake (1:2)
        let pool_balance = u(180);
        assert_eq!(ledger.pending_rewards(&alice, pool_balance).unwrap(), u(120));
        assert_eq!(ledger.pending_rewards(&bob, pool_balance).unwrap(), u(60));
    }

    #[test]
    fn test_last_unstake_resets_rewards_balance() {
        let alice = Address::from_label("alice");
        let mut ledger = StakingLedger::new(Address::from_label("STK"));

        ledger.settle(&alice, U256::zero()).unwrap();
        ledger.add_stake(&alice, u(3)).unwrap();
        ledger.settle(&alice, u(10)).unwrap();

        // 10 * 1e8 / 3 floors; the staker receives 9, one share is dust
        let reward = ledger.take_reward(&alice).unwrap();
        assert_eq!(reward, u(9));
        assert_eq!(ledger.staking_rewards_balance(), u(1));

        assert_eq!(ledger.remove_stake(&alice).unwrap(), u(3));
        assert!(ledger.total_staked().is_zero());
        assert!(ledger.staking_rewards_balance().is_zero());
        assert_eq!(ledger.applicable_rewards(u(1)).unwrap(), u(1));
    }

    #[test]
    fn test_applicable_underflow_is_an_error() {
        let alice = Address::from_label("alice");
        let mut ledger = StakingLedger::new(Address::from_label("STK"));
        ledger.add_stake(&alice, u(1)).unwrap();
        ledger.accrue(u(5)).unwrap();
        assert!(matches!(ledger.accrue(u(4)), Err(LiquidityError::Overflow(_))));
    }
}
