// simulator/src/simulator.rs
use crate::scenario::{Scenario, Step, POOL_PREFIX, ROUTER};
use anyhow::Context;
use chain_core::{Address, BlockNumber, NativeAmount, U256};
use liquidity::{
    AddLiquidity, LiquidityError, LiquidityResult, Market, MarketConfig, RemoveLiquidity, Router,
    Runtime,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Address the market registry is deployed at
pub const MARKET: &str = "market";

/// Outcome of one step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub op: &'static str,
    pub block: BlockNumber,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolReport {
    pub token: String,
    pub address: Address,
    pub reserve_native: NativeAmount,
    pub reserve_token: String,
    pub total_supply: String,
    pub k_last: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_staked: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountReport {
    pub name: String,
    pub native: NativeAmount,
    pub tokens: BTreeMap<String, String>,
    /// LP shares per pool token (non-zero only)
    pub lp: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateReport {
    pub block: BlockNumber,
    pub pools: Vec<PoolReport>,
    pub accounts: Vec<AccountReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub steps: Vec<StepReport>,
    pub state: StateReport,
}

/// Runtime and router set up from a scenario
pub struct Simulator {
    runtime: Runtime,
    router: Router,
    tokens: Vec<String>,
    accounts: Vec<String>,
}

impl Simulator {
    /// Deploy the market, its tokens and pools, then fund the accounts
    pub fn new(scenario: &Scenario) -> anyhow::Result<Self> {
        let settings = &scenario.market;
        let config = MarketConfig {
            fee: settings.fee,
            market_fee_enabled: settings.market_fee_enabled,
            fee_receiver: settings.fee_receiver.as_deref().map(Address::from_label),
            staking_token: settings.staking_token.as_deref().map(Address::from_label),
        };
        let mut runtime = Runtime::new(Address::from_label(MARKET), config)
            .context("invalid market settings")?;

        let mut tokens = Vec::new();
        if let Some(staking_token) = &settings.staking_token {
            runtime
                .deploy_token(Address::from_label(staking_token))
                .with_context(|| format!("deploying staking token {}", staking_token))?;
            tokens.push(staking_token.clone());
        }
        for token in &scenario.tokens {
            let address = Address::from_label(token);
            if !tokens.contains(token) {
                runtime
                    .deploy_token(address)
                    .with_context(|| format!("deploying token {}", token))?;
                tokens.push(token.clone());
            }
            let pool = runtime
                .create_pool(address)
                .with_context(|| format!("creating pool for {}", token))?;
            info!("Pool {} trades {} ({})", pool, token, address);
        }

        let router = Router::new(Address::from_label(ROUTER), runtime.market());

        let mut accounts = Vec::new();
        for account in &scenario.accounts {
            let owner = Address::from_label(&account.name);
            runtime.credit_native(&owner, account.native)?;
            for (token, amount) in &account.tokens {
                if !tokens.contains(token) {
                    anyhow::bail!("account {} holds undeployed token {}", account.name, token);
                }
                runtime.mint_token(&Address::from_label(token), &owner, U256::from(*amount))?;
            }
            accounts.push(account.name.clone());
        }

        Ok(Self {
            runtime,
            router,
            tokens,
            accounts,
        })
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Run every step; a failed step is reported and leaves no state behind
    pub fn run(&mut self, steps: &[Step]) -> ScenarioReport {
        let steps = steps
            .iter()
            .enumerate()
            .map(|(index, step)| self.run_step(index, step))
            .collect();
        ScenarioReport {
            steps,
            state: self.state(),
        }
    }

    pub fn run_step(&mut self, index: usize, step: &Step) -> StepReport {
        let op = step.op();
        let outcome = self.execute(step);
        let block = self.runtime.block_height();
        match outcome {
            Ok(result) => {
                info!("Step {} ({}) succeeded: {}", index, op, result);
                StepReport {
                    step: index,
                    op,
                    block,
                    ok: true,
                    result: Some(result),
                    error: None,
                }
            }
            Err(err) => {
                warn!("Step {} ({}) failed: {}", index, op, err);
                StepReport {
                    step: index,
                    op,
                    block,
                    ok: false,
                    result: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Execute one step against the runtime
    pub fn execute(&mut self, step: &Step) -> LiquidityResult<Value> {
        match step {
            Step::AdvanceBlocks { blocks } => {
                self.runtime.advance_blocks(*blocks);
                Ok(json!({ "block": self.runtime.block_height() }))
            }
            Step::Approve { owner, token, spender, amount } => {
                let amount = allowance(*amount);
                let (owner, spender) = (self.resolve(owner)?, self.resolve(spender)?);
                self.runtime
                    .approve_token(&Address::from_label(token), &owner, &spender, amount)?;
                Ok(json!({ "allowance": amount.to_string() }))
            }
            Step::ApproveLp { owner, token, spender, amount } => {
                let amount = allowance(*amount);
                let pool = self.pool(token)?;
                let (owner, spender) = (self.resolve(owner)?, self.resolve(spender)?);
                self.runtime.approve_lp(pool, owner, spender, amount)?;
                Ok(json!({ "allowance": amount.to_string() }))
            }
            Step::TransferLp { from, token, to, amount } => {
                let pool = self.pool(token)?;
                let (from, to) = (self.resolve(from)?, self.resolve(to)?);
                self.runtime.transfer_lp(pool, from, to, U256::from(*amount))?;
                Ok(json!({ "amount": amount }))
            }
            Step::AddLiquidity {
                caller,
                token,
                value,
                amount_token,
                native_min,
                token_min,
                to,
                deadline,
            } => {
                let caller = self.resolve(caller)?;
                let params = AddLiquidity {
                    token: Address::from_label(token),
                    amount_token_desired: U256::from(*amount_token),
                    amount_native_min: *native_min,
                    amount_token_min: U256::from(*token_min),
                    to: self.recipient(to, caller)?,
                    deadline: *deadline,
                };
                let (native, token, liquidity) =
                    self.router.add_liquidity(&mut self.runtime, caller, *value, params)?;
                Ok(json!({
                    "amount_native": native,
                    "amount_token": token.to_string(),
                    "liquidity": liquidity.to_string(),
                }))
            }
            Step::RemoveLiquidity {
                caller,
                token,
                liquidity,
                native_min,
                token_min,
                to,
                deadline,
            } => {
                let caller = self.resolve(caller)?;
                let liquidity = match liquidity {
                    Some(amount) => U256::from(*amount),
                    None => self.runtime.lp_balance_of(&self.pool(token)?, &caller)?,
                };
                let params = RemoveLiquidity {
                    token: Address::from_label(token),
                    liquidity,
                    amount_native_min: *native_min,
                    amount_token_min: U256::from(*token_min),
                    to: self.recipient(to, caller)?,
                    deadline: *deadline,
                };
                let (native, token) = self.router.remove_liquidity(&mut self.runtime, caller, params)?;
                Ok(json!({
                    "liquidity": liquidity.to_string(),
                    "amount_native": native,
                    "amount_token": token.to_string(),
                }))
            }
            Step::SwapExactNativeForTokens { caller, token, value, amount_out_min, to, deadline } => {
                let caller = self.resolve(caller)?;
                let to = self.recipient(to, caller)?;
                let out = self.router.swap_exact_native_for_tokens(
                    &mut self.runtime,
                    caller,
                    *value,
                    Address::from_label(token),
                    U256::from(*amount_out_min),
                    to,
                    *deadline,
                )?;
                Ok(json!({ "amount_in": value, "amount_out": out.to_string() }))
            }
            Step::SwapNativeForExactTokens { caller, token, value, amount_out, to, deadline } => {
                let caller = self.resolve(caller)?;
                let to = self.recipient(to, caller)?;
                let spent = self.router.swap_native_for_exact_tokens(
                    &mut self.runtime,
                    caller,
                    *value,
                    Address::from_label(token),
                    U256::from(*amount_out),
                    to,
                    *deadline,
                )?;
                Ok(json!({ "amount_in": spent, "amount_out": amount_out, "refund": value - spent }))
            }
            Step::SwapExactTokensForNative { caller, token, amount_in, amount_out_min, to, deadline } => {
                let caller = self.resolve(caller)?;
                let to = self.recipient(to, caller)?;
                let out = self.router.swap_exact_tokens_for_native(
                    &mut self.runtime,
                    caller,
                    Address::from_label(token),
                    U256::from(*amount_in),
                    *amount_out_min,
                    to,
                    *deadline,
                )?;
                Ok(json!({ "amount_in": amount_in, "amount_out": out }))
            }
            Step::SwapTokensForExactNative { caller, token, amount_out, amount_in_max, to, deadline } => {
                let caller = self.resolve(caller)?;
                let to = self.recipient(to, caller)?;
                let spent = self.router.swap_tokens_for_exact_native(
                    &mut self.runtime,
                    caller,
                    Address::from_label(token),
                    *amount_out,
                    U256::from(*amount_in_max),
                    to,
                    *deadline,
                )?;
                Ok(json!({ "amount_in": spent.to_string(), "amount_out": amount_out }))
            }
            Step::SwapExactTokensForTokens {
                caller,
                token_in,
                token_out,
                amount_in,
                amount_out_min,
                to,
                deadline,
            } => {
                let caller = self.resolve(caller)?;
                let to = self.recipient(to, caller)?;
                let out = self.router.swap_exact_tokens_for_tokens(
                    &mut self.runtime,
                    caller,
                    Address::from_label(token_in),
                    Address::from_label(token_out),
                    U256::from(*amount_in),
                    U256::from(*amount_out_min),
                    to,
                    *deadline,
                )?;
                Ok(json!({ "amount_in": amount_in, "amount_out": out.to_string() }))
            }
            Step::SwapTokensForExactTokens {
                caller,
                token_in,
                token_out,
                amount_out,
                amount_in_max,
                to,
                deadline,
            } => {
                let caller = self.resolve(caller)?;
                let to = self.recipient(to, caller)?;
                let spent = self.router.swap_tokens_for_exact_tokens(
                    &mut self.runtime,
                    caller,
                    Address::from_label(token_in),
                    Address::from_label(token_out),
                    U256::from(*amount_out),
                    U256::from(*amount_in_max),
                    to,
                    *deadline,
                )?;
                Ok(json!({ "amount_in": spent.to_string(), "amount_out": amount_out }))
            }
            Step::Stake { staker, token, amount } => {
                let (staker, pool) = (self.resolve(staker)?, self.pool(token)?);
                self.runtime.stake(staker, pool, U256::from(*amount))?;
                let total = self.runtime.pool(&pool)?.staking()?.total_staked();
                Ok(json!({ "amount": amount, "total_staked": total.to_string() }))
            }
            Step::Unstake { staker, token, burn } => {
                let (staker, pool) = (self.resolve(staker)?, self.pool(token)?);
                let (amount, reward) = self.runtime.unstake(staker, pool, *burn)?;
                Ok(json!({ "amount": amount.to_string(), "reward": reward.to_string() }))
            }
            Step::CollectStakingRewards { staker, token, burn } => {
                let (staker, pool) = (self.resolve(staker)?, self.pool(token)?);
                let reward = self.runtime.collect_staking_rewards(staker, pool, *burn)?;
                Ok(json!({ "reward": reward.to_string() }))
            }
            Step::Sync { token } => {
                let pool = self.pool(token)?;
                self.runtime.sync(pool)?;
                self.reserves_json(&pool)
            }
            Step::Skim { token, to } => {
                let pool = self.pool(token)?;
                let to = self.resolve(to)?;
                self.runtime.skim(pool, to)?;
                self.reserves_json(&pool)
            }
        }
    }

    /// Address behind a scenario name
    pub fn resolve(&self, name: &str) -> LiquidityResult<Address> {
        if name == ROUTER {
            return Ok(self.router.address());
        }
        match name.strip_prefix(POOL_PREFIX) {
            Some(token) => self.pool(token),
            None => Ok(Address::from_label(name)),
        }
    }

    fn pool(&self, token: &str) -> LiquidityResult<Address> {
        let token = Address::from_label(token);
        self.runtime
            .market()
            .pool(&token)
            .ok_or(LiquidityError::InvalidPool(token))
    }

    fn recipient(&self, to: &Option<String>, caller: Address) -> LiquidityResult<Address> {
        match to {
            Some(name) => self.resolve(name),
            None => Ok(caller),
        }
    }

    fn reserves_json(&self, pool: &Address) -> LiquidityResult<Value> {
        let reserves = self.runtime.pool(pool)?.reserves();
        Ok(json!({
            "reserve_native": reserves.native,
            "reserve_token": reserves.token.to_string(),
        }))
    }

    /// Pools and account balances at the current block
    pub fn state(&self) -> StateReport {
        let market = self.runtime.market();
        let pools: Vec<PoolReport> = self
            .tokens
            .iter()
            .filter_map(|token| {
                let address = market.pool(&Address::from_label(token))?;
                let pool = self.runtime.pool(&address).ok()?;
                let reserves = pool.reserves();
                Some(PoolReport {
                    token: token.clone(),
                    address,
                    reserve_native: reserves.native,
                    reserve_token: reserves.token.to_string(),
                    total_supply: pool.total_supply().to_string(),
                    k_last: pool.k_last().to_string(),
                    total_staked: pool
                        .staking()
                        .ok()
                        .map(|staking| staking.total_staked().to_string()),
                })
            })
            .collect();

        let accounts = self
            .accounts
            .iter()
            .map(|name| {
                let owner = Address::from_label(name);
                let tokens = self
                    .tokens
                    .iter()
                    .map(|token| {
                        let balance = self.runtime.token_balance(&Address::from_label(token), &owner);
                        (token.clone(), balance.to_string())
                    })
                    .collect();
                let lp = pools
                    .iter()
                    .filter_map(|pool| {
                        let balance = self.runtime.lp_balance_of(&pool.address, &owner).ok()?;
                        (!balance.is_zero()).then(|| (pool.token.clone(), balance.to_string()))
                    })
                    .collect();
                AccountReport {
                    name: name.clone(),
                    native: self.runtime.native_balance(&owner),
                    tokens,
                    lp,
                }
            })
            .collect();

        StateReport {
            block: self.runtime.block_height(),
            pools,
            accounts,
        }
    }
}

fn allowance(amount: Option<u64>) -> U256 {
    amount.map(U256::from).unwrap_or(U256::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{Account, MarketSettings};

    fn staking_scenario() -> Scenario {
        Scenario {
            market: MarketSettings {
                staking_token: Some("STK".into()),
                ..MarketSettings::default()
            },
            tokens: vec!["TKN".into()],
            accounts: vec![
                Account {
                    name: "alice".into(),
                    native: 1_000_000_000,
                    tokens: BTreeMap::from([("TKN".into(), 1_000_000_000)]),
                },
                Account {
                    name: "carol".into(),
                    native: 0,
                    tokens: BTreeMap::from([("STK".into(), 1_000)]),
                },
            ],
            steps: Vec::new(),
        }
    }

    #[test]
    fn test_default_scenario_reference_numbers() {
        let scenario = Scenario::default();
        let mut sim = Simulator::new(&scenario).unwrap();
        let report = sim.run(&scenario.steps);

        assert!(report.steps.iter().all(|step| step.ok));
        assert_eq!(report.steps[1].result.as_ref().unwrap()["liquidity"], "435888894");

        let pool = &report.state.pools[0];
        assert_eq!(pool.reserve_native, 100_017_000);
        let bob = report.state.accounts.iter().find(|a| a.name == "bob").unwrap();
        assert_eq!(bob.native, 1_000_000 - 17_000);
        assert_eq!(
            bob.tokens["TKN"],
            report.steps[2].result.as_ref().unwrap()["amount_out"]
        );
    }

    #[test]
    fn test_failed_step_is_reported_and_run_continues() {
        let scenario = Scenario::default();
        let mut sim = Simulator::new(&scenario).unwrap();
        let steps = vec![
            Step::SwapExactNativeForTokens {
                caller: "bob".into(),
                token: "TKN".into(),
                value: 100,
                amount_out_min: 0,
                to: None,
                deadline: 0,
            },
            scenario.steps[0].clone(),
            scenario.steps[1].clone(),
        ];
        let report = sim.run(&steps);

        assert!(!report.steps[0].ok);
        assert!(report.steps[0].error.is_some());
        assert!(report.steps[1].ok && report.steps[2].ok);
        let bob = report.state.accounts.iter().find(|a| a.name == "bob").unwrap();
        assert_eq!(bob.native, 1_000_000);
    }

    #[test]
    fn test_name_resolution() {
        let sim = Simulator::new(&Scenario::default()).unwrap();
        assert_eq!(sim.resolve(ROUTER).unwrap(), sim.router().address());
        let pool = sim.resolve("pool:TKN").unwrap();
        assert_eq!(
            sim.runtime().market().pool(&Address::from_label("TKN")),
            Some(pool)
        );
        assert_eq!(sim.resolve("alice").unwrap(), Address::from_label("alice"));
        assert_eq!(
            sim.resolve("pool:NOPE"),
            Err(LiquidityError::InvalidPool(Address::from_label("NOPE")))
        );
    }

    #[test]
    fn test_undeployed_account_token_rejected() {
        let mut scenario = Scenario::default();
        scenario.accounts[1].tokens.insert("XYZ".into(), 5);
        assert!(Simulator::new(&scenario).is_err());
    }

    #[test]
    fn test_staking_steps() {
        let scenario = staking_scenario();
        let mut sim = Simulator::new(&scenario).unwrap();
        let steps = vec![
            Step::Approve {
                owner: "alice".into(),
                token: "TKN".into(),
                spender: ROUTER.into(),
                amount: None,
            },
            Step::AddLiquidity {
                caller: "alice".into(),
                token: "TKN".into(),
                value: 1_000_000,
                amount_token: 1_000_000,
                native_min: 0,
                token_min: 0,
                to: None,
                deadline: 0,
            },
            Step::Approve {
                owner: "carol".into(),
                token: "STK".into(),
                spender: "pool:TKN".into(),
                amount: Some(1_000),
            },
            Step::Stake {
                staker: "carol".into(),
                token: "TKN".into(),
                amount: 1_000,
            },
            Step::Unstake {
                staker: "carol".into(),
                token: "TKN".into(),
                burn: false,
            },
        ];
        let report = sim.run(&steps);

        assert!(report.steps.iter().all(|step| step.ok), "{:?}", report.steps);
        assert_eq!(report.steps[3].result.as_ref().unwrap()["total_staked"], "1000");
        assert_eq!(report.steps[4].result.as_ref().unwrap()["amount"], "1000");
        assert_eq!(report.state.pools[0].total_staked.as_deref(), Some("0"));
    }
}
