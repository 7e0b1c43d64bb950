// liquidity/tests/common/mod.rs
#![allow(dead_code)]

use chain_core::{Address, U256};
use liquidity::{AddLiquidity, MarketConfig, Router, Runtime};

pub fn label(name: &str) -> Address {
    Address::from_label(name)
}

pub fn u(value: u64) -> U256 {
    U256::from(value)
}

/// Runtime with one pool per token and a router
pub struct Env {
    pub rt: Runtime,
    pub router: Router,
}

impl Env {
    pub fn new(config: MarketConfig, tokens: &[&str]) -> Self {
        let staking_token = config.staking_token;
        let mut rt = Runtime::new(label("market"), config).unwrap();
        if let Some(staking_token) = staking_token {
            rt.deploy_token(staking_token).unwrap();
        }
        for token in tokens {
            if !rt.world().has_token(&label(token)) {
                rt.deploy_token(label(token)).unwrap();
            }
            rt.create_pool(label(token)).unwrap();
        }
        let router = Router::new(label("router"), rt.market());
        Self { rt, router }
    }

    pub fn pool(&self, token: &str) -> Address {
        use liquidity::Market;
        self.rt.market().pool(&label(token)).unwrap()
    }

    /// Give `who` native and tokens, approving the router for the tokens
    pub fn fund(&mut self, who: &str, native: u64, token: &str, amount: u64) {
        let who = label(who);
        let token = label(token);
        self.rt.credit_native(&who, native).unwrap();
        self.rt.mint_token(&token, &who, u(amount)).unwrap();
        self.rt
            .approve_token(&token, &who, &self.router.address(), U256::MAX)
            .unwrap();
    }

    /// Fund `who` and deposit everything through the router
    pub fn seed(&mut self, who: &str, token: &str, native: u64, amount: u64) -> U256 {
        self.fund(who, native, token, amount);
        let (_, _, liquidity) = self
            .router
            .add_liquidity(
                &mut self.rt,
                label(who),
                native,
                AddLiquidity {
                    token: label(token),
                    amount_token_desired: u(amount),
                    amount_native_min: 0,
                    amount_token_min: U256::zero(),
                    to: label(who),
                    deadline: 0,
                },
            )
            .unwrap();
        liquidity
    }

    pub fn product(&self, token: &str) -> U256 {
        let pool = self.pool(token);
        self.rt.pool(&pool).unwrap().reserves().product().unwrap()
    }
}
