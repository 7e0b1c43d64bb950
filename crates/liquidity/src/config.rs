// liquidity/src/config.rs
use crate::{math, LiquidityResult};
use chain_core::Address;
use serde::{Deserialize, Serialize};

/// Market-wide settings applied to every pool created by the market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Swap fee in parts per thousand (`0..=10`)
    pub fee: u32,
    /// Route protocol-fee shares of standard pools to `fee_receiver`
    pub market_fee_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_receiver: Option<Address>,
    /// Token stakers lock to earn protocol-fee shares; enables staking pools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staking_token: Option<Address>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            fee: 3,
            market_fee_enabled: false,
            fee_receiver: None,
            staking_token: None,
        }
    }
}

impl MarketConfig {
    pub fn validate(&self) -> LiquidityResult<()> {
        math::validate_fee(self.fee)
    }

    /// Staking token of the pool trading `token`
    ///
    /// The staking token's own pool is a standard pool: stake held there
    /// would be indistinguishable from deposits and reserves.
    pub fn staking_token_for(&self, token: &Address) -> Option<Address> {
        self.staking_token.filter(|staking_token| staking_token != token)
    }

    /// Where protocol-fee shares of the pool trading `token` go
    pub fn fee_recipient_for(&self, token: &Address) -> FeeRecipient {
        if self.staking_token_for(token).is_some() {
            return FeeRecipient::StakingLedger;
        }
        match (self.market_fee_enabled, self.fee_receiver) {
            (true, Some(receiver)) => FeeRecipient::Market(receiver),
            _ => FeeRecipient::None,
        }
    }
}

/// Destination of protocol-fee shares minted on liquidity changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeRecipient {
    /// Protocol fee disabled (`k_last` stays zero)
    None,
    /// Minted to the market's fee receiver
    Market(Address),
    /// Minted to the pool itself and distributed to stakers
    StakingLedger,
}

impl FeeRecipient {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, FeeRecipient::None)
    }
}

/// Settings a pool is created with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub token: Address,
    pub fee: u32,
    pub fee_recipient: FeeRecipient,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staking_token: Option<Address>,
}

impl PoolConfig {
    pub fn from_market(token: Address, market: &MarketConfig) -> Self {
        Self {
            token,
            fee: market.fee,
            fee_recipient: market.fee_recipient_for(&token),
            staking_token: market.staking_token_for(&token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LiquidityError;

    #[test]
    fn test_default_market() {
        let config = MarketConfig::default();
        assert_eq!(config.fee, 3);
        assert!(config.validate().is_ok());
        assert_eq!(config.fee_recipient_for(&Address::from_label("TKN")), FeeRecipient::None);
    }

    #[test]
    fn test_fee_recipient_selection() {
        let token = Address::from_label("TKN");
        let receiver = Address::from_label("treasury");
        let mut config = MarketConfig {
            market_fee_enabled: true,
            fee_receiver: Some(receiver),
            ..MarketConfig::default()
        };
        assert_eq!(config.fee_recipient_for(&token), FeeRecipient::Market(receiver));

        config.staking_token = Some(Address::from_label("STK"));
        assert_eq!(config.fee_recipient_for(&token), FeeRecipient::StakingLedger);

        config.staking_token = None;
        config.market_fee_enabled = false;
        assert!(!config.fee_recipient_for(&token).is_enabled());
    }

    #[test]
    fn test_staking_token_pool_is_standard() {
        let staking_token = Address::from_label("STK");
        let receiver = Address::from_label("treasury");
        let market = MarketConfig {
            market_fee_enabled: true,
            fee_receiver: Some(receiver),
            staking_token: Some(staking_token),
            ..MarketConfig::default()
        };

        let own = PoolConfig::from_market(staking_token, &market);
        assert_eq!(own.staking_token, None);
        assert_eq!(own.fee_recipient, FeeRecipient::Market(receiver));

        let other = PoolConfig::from_market(Address::from_label("TKN"), &market);
        assert_eq!(other.staking_token, Some(staking_token));
        assert_eq!(other.fee_recipient, FeeRecipient::StakingLedger);
    }

    #[test]
    fn test_invalid_fee() {
        let config = MarketConfig { fee: 11, ..MarketConfig::default() };
        assert_eq!(config.validate(), Err(LiquidityError::InvalidFee(11)));
    }

    #[test]
    fn test_pool_config_serde() {
        let market = MarketConfig {
            staking_token: Some(Address::from_label("STK")),
            ..MarketConfig::default()
        };
        let pool = PoolConfig::from_market(Address::from_label("TKN"), &market);
        let json = serde_json::to_string(&pool).unwrap();
        let back: PoolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pool);
        assert_eq!(back.fee_recipient, FeeRecipient::StakingLedger);
    }
}
