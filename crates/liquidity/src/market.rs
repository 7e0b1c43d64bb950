// liquidity/src/market.rs

use crate::{config::MarketConfig, LiquidityError, LiquidityResult, PoolConfig};
use chain_core::Address;
use std::collections::BTreeMap;
use tracing::info;

/// Market lookups the router depends on
pub trait Market {
    /// Market contract address
    fn address(&self) -> Address;

    /// Pool registered for `token`, if any
    fn pool(&self, token: &Address) -> Option<Address>;

    /// Swap fee (parts per thousand)
    fn fee(&self) -> u32;
}

/// In-memory market: settings plus the token → pool registry
#[derive(Debug, Clone)]
pub struct MarketRegistry {
    address: Address,
    config: MarketConfig,
    pools: BTreeMap<Address, Address>,
}

impl MarketRegistry {
    pub fn new(address: Address, config: MarketConfig) -> LiquidityResult<Self> {
        config.validate()?;
        info!("Market {} created (fee {}/1000)", address, config.fee);
        Ok(Self {
            address,
            config,
            pools: BTreeMap::new(),
        })
    }

    /// Settings for a new pool trading `token`
    pub fn pool_config_for(&self, token: Address) -> PoolConfig {
        PoolConfig::from_market(token, &self.config)
    }

    /// Record the pool for `token`; one pool per token
    pub fn register(&mut self, token: Address, pool: Address) -> LiquidityResult<()> {
        if self.pools.contains_key(&token) {
            return Err(LiquidityError::PoolExists(token));
        }
        self.pools.insert(token, pool);
        Ok(())
    }

    /// Registered `(token, pool)` pairs
    pub fn pools(&self) -> impl Iterator<Item = (&Address, &Address)> {
        self.pools.iter()
    }
}

impl Market for MarketRegistry {
    fn address(&self) -> Address {
        self.address
    }

    fn pool(&self, token: &Address) -> Option<Address> {
        self.pools.get(token).copied()
    }

    fn fee(&self) -> u32 {
        self.config.fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_once() {
        let mut market = MarketRegistry::new(Address::from_label("market"), MarketConfig::default()).unwrap();
        let token = Address::from_label("TKN");
        let pool = Address::from_label("pool");

        assert_eq!(market.pool(&token), None);
        market.register(token, pool).unwrap();
        assert_eq!(market.pool(&token), Some(pool));
        assert_eq!(market.register(token, pool), Err(LiquidityError::PoolExists(token)));
        assert_eq!(market.pools().count(), 1);
    }

    #[test]
    fn test_rejects_invalid_fee() {
        let config = MarketConfig { fee: 20, ..MarketConfig::default() };
        assert!(matches!(
            MarketRegistry::new(Address::from_label("market"), config),
            Err(LiquidityError::InvalidFee(20))
        ));
    }
}
