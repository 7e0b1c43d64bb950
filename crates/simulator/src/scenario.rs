// simulator/src/scenario.rs
use chain_core::BlockNumber;
use liquidity::MarketConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name resolving to the scenario's router
pub const ROUTER: &str = "router";

/// Prefix resolving `pool:<TOKEN>` to the pool of `<TOKEN>`
pub const POOL_PREFIX: &str = "pool:";

/// A market, its funded accounts and the steps to run against it
///
/// Accounts, tokens and receivers are plain names; each name maps to the
/// address derived from it, except for the router and `pool:` names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub market: MarketSettings,
    /// Tokens deployed with a pool each
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSettings {
    #[serde(default = "default_fee")]
    pub fee: u32,
    #[serde(default)]
    pub market_fee_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_receiver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staking_token: Option<String>,
}

fn default_fee() -> u32 {
    MarketConfig::default().fee
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            fee: default_fee(),
            market_fee_enabled: false,
            fee_receiver: None,
            staking_token: None,
        }
    }
}

/// Starting balances of a named account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    #[serde(default)]
    pub native: u64,
    /// Token name -> amount minted to the account
    #[serde(default)]
    pub tokens: BTreeMap<String, u64>,
}

/// One call against the runtime or the router
///
/// Unset `to` fields default to the caller; a `deadline` of `0` never
/// expires; an unset approval amount approves without limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    AdvanceBlocks {
        blocks: u64,
    },
    Approve {
        owner: String,
        token: String,
        spender: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<u64>,
    },
    ApproveLp {
        owner: String,
        token: String,
        spender: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<u64>,
    },
    TransferLp {
        from: String,
        token: String,
        to: String,
        amount: u64,
    },
    AddLiquidity {
        caller: String,
        token: String,
        value: u64,
        amount_token: u64,
        #[serde(default)]
        native_min: u64,
        #[serde(default)]
        token_min: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default)]
        deadline: BlockNumber,
    },
    RemoveLiquidity {
        caller: String,
        token: String,
        /// Unset burns the caller's whole LP balance
        #[serde(default, skip_serializing_if = "Option::is_none")]
        liquidity: Option<u64>,
        #[serde(default)]
        native_min: u64,
        #[serde(default)]
        token_min: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default)]
        deadline: BlockNumber,
    },
    SwapExactNativeForTokens {
        caller: String,
        token: String,
        value: u64,
        #[serde(default)]
        amount_out_min: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default)]
        deadline: BlockNumber,
    },
    SwapNativeForExactTokens {
        caller: String,
        token: String,
        value: u64,
        amount_out: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default)]
        deadline: BlockNumber,
    },
    SwapExactTokensForNative {
        caller: String,
        token: String,
        amount_in: u64,
        #[serde(default)]
        amount_out_min: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default)]
        deadline: BlockNumber,
    },
    SwapTokensForExactNative {
        caller: String,
        token: String,
        amount_out: u64,
        amount_in_max: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default)]
        deadline: BlockNumber,
    },
    SwapExactTokensForTokens {
        caller: String,
        token_in: String,
        token_out: String,
        amount_in: u64,
        #[serde(default)]
        amount_out_min: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default)]
        deadline: BlockNumber,
    },
    SwapTokensForExactTokens {
        caller: String,
        token_in: String,
        token_out: String,
        amount_out: u64,
        amount_in_max: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default)]
        deadline: BlockNumber,
    },
    Stake {
        staker: String,
        token: String,
        amount: u64,
    },
    Unstake {
        staker: String,
        token: String,
        #[serde(default)]
        burn: bool,
    },
    CollectStakingRewards {
        staker: String,
        token: String,
        #[serde(default)]
        burn: bool,
    },
    Sync {
        token: String,
    },
    Skim {
        token: String,
        to: String,
    },
}

impl Step {
    /// Operation name as written in scenario files
    pub fn op(&self) -> &'static str {
        match self {
            Step::AdvanceBlocks { .. } => "advance_blocks",
            Step::Approve { .. } => "approve",
            Step::ApproveLp { .. } => "approve_lp",
            Step::TransferLp { .. } => "transfer_lp",
            Step::AddLiquidity { .. } => "add_liquidity",
            Step::RemoveLiquidity { .. } => "remove_liquidity",
            Step::SwapExactNativeForTokens { .. } => "swap_exact_native_for_tokens",
            Step::SwapNativeForExactTokens { .. } => "swap_native_for_exact_tokens",
            Step::SwapExactTokensForNative { .. } => "swap_exact_tokens_for_native",
            Step::SwapTokensForExactNative { .. } => "swap_tokens_for_exact_native",
            Step::SwapExactTokensForTokens { .. } => "swap_exact_tokens_for_tokens",
            Step::SwapTokensForExactTokens { .. } => "swap_tokens_for_exact_tokens",
            Step::Stake { .. } => "stake",
            Step::Unstake { .. } => "unstake",
            Step::CollectStakingRewards { .. } => "collect_staking_rewards",
            Step::Sync { .. } => "sync",
            Step::Skim { .. } => "skim",
        }
    }
}

impl Default for Scenario {
    /// Seed a pool, then trade against it
    fn default() -> Self {
        Self {
            market: MarketSettings::default(),
            tokens: vec!["TKN".into()],
            accounts: vec![
                Account {
                    name: "alice".into(),
                    native: 100_000_000,
                    tokens: BTreeMap::from([("TKN".into(), 1_900_000_000)]),
                },
                Account {
                    name: "bob".into(),
                    native: 1_000_000,
                    tokens: BTreeMap::new(),
                },
            ],
            steps: vec![
                Step::Approve {
                    owner: "alice".into(),
                    token: "TKN".into(),
                    spender: ROUTER.into(),
                    amount: None,
                },
                Step::AddLiquidity {
                    caller: "alice".into(),
                    token: "TKN".into(),
                    value: 100_000_000,
                    amount_token: 1_900_000_000,
                    native_min: 0,
                    token_min: 0,
                    to: None,
                    deadline: 0,
                },
                Step::SwapExactNativeForTokens {
                    caller: "bob".into(),
                    token: "TKN".into(),
                    value: 17_000,
                    amount_out_min: 0,
                    to: None,
                    deadline: 0,
                },
            ],
        }
    }
}

impl Scenario {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let scenario = toml::from_str(&contents)?;
        Ok(scenario)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
