// liquidity/src/pool.rs

use crate::{
    config::{FeeRecipient, PoolConfig},
    math::{self, Reserves},
    staking::StakingLedger,
    LiquidityError, LiquidityResult,
};
use chain_core::{Address, NativeAmount, TokenLedger, U256};

/// Native/token liquidity pool
///
/// Holds the reserve bookkeeping, the LP-share ledger and, on staking
/// pools, the staking ledger. Live balances (the pool's native balance and
/// its balance on the token ledger) are owned by the world state and passed
/// in by the runtime.
#[derive(Debug, Clone)]
pub struct LiquidityPool {
    address: Address,
    token: Address,
    fee: u32,
    fee_recipient: FeeRecipient,
    reserve_native: NativeAmount,
    reserve_token: U256,
    /// `reserve_native * reserve_token` after the last liquidity event
    k_last: U256,
    locked: bool,
    shares: TokenLedger,
    staking: Option<StakingLedger>,
}

impl LiquidityPool {
    pub fn new(address: Address, config: PoolConfig) -> LiquidityResult<Self> {
        math::validate_fee(config.fee)?;
        Ok(Self {
            address,
            token: config.token,
            fee: config.fee,
            fee_recipient: config.fee_recipient,
            reserve_native: 0,
            reserve_token: U256::zero(),
            k_last: U256::zero(),
            locked: false,
            shares: TokenLedger::new(address),
            staking: config.staking_token.map(StakingLedger::new),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn token(&self) -> Address {
        self.token
    }

    pub fn fee(&self) -> u32 {
        self.fee
    }

    pub fn fee_recipient(&self) -> FeeRecipient {
        self.fee_recipient
    }

    pub fn reserves(&self) -> Reserves {
        Reserves::new(self.reserve_native, self.reserve_token)
    }

    pub fn k_last(&self) -> U256 {
        self.k_last
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Enter a mutating operation
    pub fn lock(&mut self) -> LiquidityResult<()> {
        if self.locked {
            return Err(LiquidityError::Locked);
        }
        self.locked = true;
        Ok(())
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Set reserves to the live balances
    pub fn update_reserves(&mut self, balances: Reserves) {
        self.reserve_native = balances.native;
        self.reserve_token = balances.token;
    }

    /// Record `k` after a liquidity event (kept at zero without a fee recipient)
    pub fn refresh_k_last(&mut self) -> LiquidityResult<()> {
        self.k_last = if self.fee_recipient.is_enabled() {
            self.reserves().product()?
        } else {
            U256::zero()
        };
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_k_last(&mut self, k_last: U256) {
        self.k_last = k_last;
    }

    /// Address receiving protocol-fee shares, if the protocol fee is on
    pub fn fee_recipient_address(&self) -> Option<Address> {
        match self.fee_recipient {
            FeeRecipient::None => None,
            FeeRecipient::Market(receiver) => Some(receiver),
            FeeRecipient::StakingLedger => Some(self.address),
        }
    }

    /// Protocol-fee shares owed since the last liquidity event
    pub fn protocol_fee_share(&self) -> LiquidityResult<U256> {
        if !self.fee_recipient.is_enabled() {
            return Ok(U256::zero());
        }
        math::protocol_fee_liquidity(self.reserves(), self.k_last, self.shares.total_supply())
    }

    /// LP shares for a deposit and whether it is the initial one
    /// (which also locks `MINIMUM_LIQUIDITY` at the zero address)
    pub fn liquidity_for_deposit(
        &self,
        amount_native: NativeAmount,
        amount_token: U256,
    ) -> LiquidityResult<(U256, bool)> {
        let supply = self.shares.total_supply();
        let (liquidity, initial) = if supply.is_zero() {
            (math::initial_liquidity(amount_native, amount_token)?, true)
        } else {
            (
                math::proportional_liquidity(amount_native, amount_token, self.reserves(), supply)?,
                false,
            )
        };
        if liquidity.is_zero() {
            return Err(LiquidityError::InsufficientLiquidity);
        }
        Ok((liquidity, initial))
    }

    /// Assets released by burning `liquidity` shares against `balances`
    pub fn amounts_for_burn(
        &self,
        liquidity: U256,
        balances: Reserves,
    ) -> LiquidityResult<(NativeAmount, U256)> {
        let supply = self.shares.total_supply();
        if supply.is_zero() {
            return Err(LiquidityError::InsufficientLiquidityBurned);
        }
        let amount_native = liquidity
            .checked_mul(U256::from(balances.native))
            .ok_or(LiquidityError::Overflow("burn native amount"))?
            / supply;
        let amount_token = liquidity
            .checked_mul(balances.token)
            .ok_or(LiquidityError::Overflow("burn token amount"))?
            / supply;

        if amount_native.is_zero() || amount_token.is_zero() {
            return Err(LiquidityError::InsufficientLiquidityBurned);
        }
        // amount_native <= balances.native, so this never truncates
        Ok((amount_native.low_u64(), amount_token))
    }

    /// LP shares held by the pool that a Burn may consume
    pub fn burnable_liquidity(&self) -> LiquidityResult<U256> {
        let own = self.own_shares();
        match &self.staking {
            Some(staking) => own
                .checked_sub(staking.staking_rewards_balance())
                .ok_or(LiquidityError::Overflow("burnable liquidity")),
            None => Ok(own),
        }
    }

    /// LP shares owned by the pool address itself
    pub fn own_shares(&self) -> U256 {
        self.shares.balance_of(&self.address)
    }

    pub fn shares(&self) -> &TokenLedger {
        &self.shares
    }

    pub fn shares_mut(&mut self) -> &mut TokenLedger {
        &mut self.shares
    }

    pub fn total_supply(&self) -> U256 {
        self.shares.total_supply()
    }

    pub fn lp_balance_of(&self, owner: &Address) -> U256 {
        self.shares.balance_of(owner)
    }

    pub fn lp_allowance(&self, owner: &Address, spender: &Address) -> U256 {
        self.shares.allowance(owner, spender)
    }

    pub fn is_staking_enabled(&self) -> bool {
        self.staking.is_some()
    }

    pub fn staking(&self) -> LiquidityResult<&StakingLedger> {
        self.staking.as_ref().ok_or(LiquidityError::StakingUnavailable)
    }

    pub fn staking_mut(&mut self) -> LiquidityResult<&mut StakingLedger> {
        self.staking.as_mut().ok_or(LiquidityError::StakingUnavailable)
    }

    /// Reward `staker` would receive if settled now
    pub fn get_staking_rewards(&self, staker: &Address) -> LiquidityResult<U256> {
        self.staking()?.pending_rewards(staker, self.own_shares())
    }

    pub fn applicable_staking_rewards(&self) -> LiquidityResult<U256> {
        self.staking()?.applicable_rewards(self.own_shares())
    }

    /// Fold applicable protocol-fee shares into the staking accumulator
    pub fn accrue_staking_rewards(&mut self) -> LiquidityResult<()> {
        let own = self.own_shares();
        match self.staking.as_mut() {
            Some(staking) => staking.accrue(own),
            None => Ok(()),
        }
    }

    /// Settle `staker` against the pool's current share balance
    pub fn settle_staker(&mut self, staker: &Address) -> LiquidityResult<()> {
        let own = self.own_shares();
        self.staking_mut()?.settle(staker, own)
    }
}
