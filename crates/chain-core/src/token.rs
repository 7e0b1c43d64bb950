// chain-core/src/token.rs

use crate::{Address, ChainError, ChainResult, U256};
use std::collections::{BTreeMap, HashMap};

/// Fungible token ledger (balances, allowances, total supply)
///
/// Used for the traded tokens, for pool LP shares and for the staking token.
/// The staking token additionally tracks nominations: the amount currently
/// staked in each pool, as reported by the pool after every stake change.
#[derive(Debug, Clone, Default)]
pub struct TokenLedger {
    address: Address,
    total_supply: U256,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    nominations: BTreeMap<Address, U256>,
}

impl TokenLedger {
    /// Create an empty ledger for the token at `address`
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    pub fn balance_of(&self, owner: &Address) -> U256 {
        self.balances.get(owner).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> U256 {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or_default()
    }

    /// Move `amount` from `from` to `to`
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: U256) -> ChainResult<()> {
        let available = self.balance_of(from);
        let remaining = available
            .checked_sub(amount)
            .ok_or(ChainError::InsufficientBalance { required: amount, available })?;

        if from == to {
            return Ok(());
        }

        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(ChainError::Overflow("token balance"))?;

        self.set_balance(*from, remaining);
        self.set_balance(*to, credited);
        Ok(())
    }

    /// Move `amount` from `from` to `to` on behalf of `spender`, consuming allowance
    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> ChainResult<()> {
        let allowed = self.allowance(from, spender);
        let remaining = allowed
            .checked_sub(amount)
            .ok_or(ChainError::InsufficientAllowance { required: amount, available: allowed })?;

        self.transfer(from, to, amount)?;
        self.allowances.insert((*from, *spender), remaining);
        Ok(())
    }

    /// Set the allowance of `spender` over `owner`'s balance
    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: U256) {
        self.allowances.insert((*owner, *spender), amount);
    }

    /// Create `amount` new units owned by `to`
    pub fn mint(&mut self, to: &Address, amount: U256) -> ChainResult<()> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(ChainError::Overflow("token supply"))?;
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(ChainError::Overflow("token balance"))?;

        self.total_supply = supply;
        self.set_balance(*to, balance);
        Ok(())
    }

    /// Destroy `amount` units owned by `from`
    pub fn burn(&mut self, from: &Address, amount: U256) -> ChainResult<()> {
        let available = self.balance_of(from);
        let balance = available
            .checked_sub(amount)
            .ok_or(ChainError::InsufficientBalance { required: amount, available })?;
        let supply = self
            .total_supply
            .checked_sub(amount)
            .ok_or(ChainError::Overflow("token supply"))?;

        self.total_supply = supply;
        self.set_balance(*from, balance);
        Ok(())
    }

    /// Record the amount currently staked in `pool`
    pub fn nominate(&mut self, pool: &Address, staked: U256) {
        if staked.is_zero() {
            self.nominations.remove(pool);
        } else {
            self.nominations.insert(*pool, staked);
        }
    }

    pub fn nomination(&self, pool: &Address) -> U256 {
        self.nominations.get(pool).copied().unwrap_or_default()
    }

    fn set_balance(&mut self, owner: Address, amount: U256) {
        if amount.is_zero() {
            self.balances.remove(&owner);
        } else {
            self.balances.insert(owner, amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with(owner: Address, amount: u64) -> TokenLedger {
        let mut ledger = TokenLedger::new(Address::from_label("TKN"));
        ledger.mint(&owner, U256::from(amount)).unwrap();
        ledger
    }

    #[test]
    fn test_mint_and_transfer() {
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        let mut ledger = ledger_with(alice, 1_000);

        ledger.transfer(&alice, &bob, U256::from(300)).unwrap();

        assert_eq!(ledger.balance_of(&alice), U256::from(700));
        assert_eq!(ledger.balance_of(&bob), U256::from(300));
        assert_eq!(ledger.total_supply(), U256::from(1_000));
    }

    #[test]
    fn test_transfer_insufficient() {
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        let mut ledger = ledger_with(alice, 10);

        let err = ledger.transfer(&alice, &bob, U256::from(11)).unwrap_err();
        assert_eq!(
            err,
            ChainError::InsufficientBalance {
                required: U256::from(11),
                available: U256::from(10),
            }
        );
        assert_eq!(ledger.balance_of(&alice), U256::from(10));
    }

    #[test]
    fn test_self_transfer_keeps_balance() {
        let alice = Address::from_label("alice");
        let mut ledger = ledger_with(alice, 50);
        ledger.transfer(&alice, &alice, U256::from(50)).unwrap();
        assert_eq!(ledger.balance_of(&alice), U256::from(50));
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let alice = Address::from_label("alice");
        let router = Address::from_label("router");
        let pool = Address::from_label("pool");
        let mut ledger = ledger_with(alice, 1_000);

        assert!(ledger
            .transfer_from(&router, &alice, &pool, U256::from(1))
            .is_err());

        ledger.approve(&alice, &router, U256::from(600));
        ledger
            .transfer_from(&router, &alice, &pool, U256::from(400))
            .unwrap();

        assert_eq!(ledger.allowance(&alice, &router), U256::from(200));
        assert_eq!(ledger.balance_of(&pool), U256::from(400));
    }

    #[test]
    fn test_burn() {
        let alice = Address::from_label("alice");
        let mut ledger = ledger_with(alice, 100);

        ledger.burn(&alice, U256::from(40)).unwrap();
        assert_eq!(ledger.total_supply(), U256::from(60));
        assert!(ledger.burn(&alice, U256::from(61)).is_err());
    }

    #[test]
    fn test_nomination() {
        let pool = Address::from_label("pool");
        let mut ledger = TokenLedger::new(Address::from_label("STK"));

        ledger.nominate(&pool, U256::from(5));
        assert_eq!(ledger.nomination(&pool), U256::from(5));

        ledger.nominate(&pool, U256::zero());
        assert!(ledger.nomination(&pool).is_zero());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_transfers_conserve_supply(
                minted in 0u64..1_000_000,
                moves in proptest::collection::vec((0usize..3, 0usize..3, 0u64..400_000), 0..20)
            ) {
                let holders = [
                    Address::from_label("a"),
                    Address::from_label("b"),
                    Address::from_label("c"),
                ];
                let mut ledger = ledger_with(holders[0], minted);

                for (from, to, amount) in moves {
                    let _ = ledger.transfer(&holders[from], &holders[to], U256::from(amount));
                }

                let sum = holders
                    .iter()
                    .fold(U256::zero(), |acc, h| acc + ledger.balance_of(h));
                prop_assert_eq!(sum, ledger.total_supply());
                prop_assert_eq!(sum, U256::from(minted));
            }
        }
    }
}
