// chain-core/src/state.rs

use crate::{
    events::{Event, Log},
    Address, BlockNumber, ChainError, ChainResult, NativeAmount, TokenLedger, U256,
};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// World state: native balances, deployed token ledgers and the event log
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    /// Current block height
    block_height: BlockNumber,
    /// Native currency balances
    native: HashMap<Address, NativeAmount>,
    /// Token ledgers by token address
    tokens: BTreeMap<Address, TokenLedger>,
    /// Append-only event log
    logs: Vec<Log>,
}

/// Balances and ledgers at a point in time, plus the log length then
///
/// The log is append-only, so restoring only truncates it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    block_height: BlockNumber,
    native: HashMap<Address, NativeAmount>,
    tokens: BTreeMap<Address, TokenLedger>,
    log_len: usize,
}

impl WorldState {
    /// Create new empty world state
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_height(&self) -> BlockNumber {
        self.block_height
    }

    pub fn set_block_height(&mut self, height: BlockNumber) {
        self.block_height = height;
    }

    /// Advance the chain by `blocks`, saturating at the maximum height
    pub fn advance_blocks(&mut self, blocks: u64) {
        self.block_height = self.block_height.saturating_add(blocks);
    }

    /// Get native balance (zero for unknown accounts)
    pub fn native_balance(&self, address: &Address) -> NativeAmount {
        self.native.get(address).copied().unwrap_or(0)
    }

    /// Create native currency out of thin air (genesis/faucet)
    pub fn credit_native(&mut self, address: &Address, amount: NativeAmount) -> ChainResult<()> {
        let balance = self
            .native_balance(address)
            .checked_add(amount)
            .ok_or(ChainError::Overflow("native balance"))?;
        self.native.insert(*address, balance);
        Ok(())
    }

    /// Transfer native currency between accounts
    pub fn transfer_native(
        &mut self,
        from: &Address,
        to: &Address,
        amount: NativeAmount,
    ) -> ChainResult<()> {
        let available = self.native_balance(from);
        let remaining = available
            .checked_sub(amount)
            .ok_or(ChainError::InsufficientNativeBalance { required: amount, available })?;

        if from == to {
            return Ok(());
        }

        let credited = self
            .native_balance(to)
            .checked_add(amount)
            .ok_or(ChainError::Overflow("native balance"))?;

        self.native.insert(*from, remaining);
        self.native.insert(*to, credited);
        Ok(())
    }

    /// Deploy an empty token ledger at `address`
    pub fn deploy_token(&mut self, address: Address) -> ChainResult<()> {
        if self.tokens.contains_key(&address) {
            return Err(ChainError::TokenExists(address));
        }
        self.tokens.insert(address, TokenLedger::new(address));
        debug!("Deployed token ledger {}", address);
        Ok(())
    }

    pub fn has_token(&self, token: &Address) -> bool {
        self.tokens.contains_key(token)
    }

    pub fn token(&self, token: &Address) -> ChainResult<&TokenLedger> {
        self.tokens.get(token).ok_or(ChainError::TokenNotFound(*token))
    }

    pub fn token_mut(&mut self, token: &Address) -> ChainResult<&mut TokenLedger> {
        self.tokens.get_mut(token).ok_or(ChainError::TokenNotFound(*token))
    }

    /// Token balance of `owner` (zero when the token is unknown)
    pub fn token_balance(&self, token: &Address, owner: &Address) -> U256 {
        self.tokens
            .get(token)
            .map(|ledger| ledger.balance_of(owner))
            .unwrap_or_default()
    }

    pub fn token_transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> ChainResult<()> {
        self.token_mut(token)?.transfer(from, to, amount)?;
        self.emit(*token, Event::Transfer { from: *from, to: *to, amount });
        Ok(())
    }

    pub fn token_transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> ChainResult<()> {
        self.token_mut(token)?.transfer_from(spender, from, to, amount)?;
        self.emit(*token, Event::Transfer { from: *from, to: *to, amount });
        Ok(())
    }

    pub fn token_approve(
        &mut self,
        token: &Address,
        owner: &Address,
        spender: &Address,
        amount: U256,
    ) -> ChainResult<()> {
        self.token_mut(token)?.approve(owner, spender, amount);
        self.emit(*token, Event::Approval { owner: *owner, spender: *spender, amount });
        Ok(())
    }

    /// Mint new token units to `to` (genesis/faucet)
    pub fn token_mint(&mut self, token: &Address, to: &Address, amount: U256) -> ChainResult<()> {
        self.token_mut(token)?.mint(to, amount)?;
        self.emit(*token, Event::Transfer { from: Address::zero(), to: *to, amount });
        Ok(())
    }

    /// Append an event to the log
    pub fn emit(&mut self, address: Address, event: Event) {
        self.logs.push(Log::new(address, event));
    }

    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    /// Capture everything but the event log
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            block_height: self.block_height,
            native: self.native.clone(),
            tokens: self.tokens.clone(),
            log_len: self.logs.len(),
        }
    }

    /// Return to `snapshot`, dropping events emitted since
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.block_height = snapshot.block_height;
        self.native = snapshot.native;
        self.tokens = snapshot.tokens;
        self.logs.truncate(snapshot.log_len);
    }
}
