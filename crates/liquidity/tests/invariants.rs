// liquidity/tests/invariants.rs

mod common;

use common::{label, u, Env};
use chain_core::U256;
use liquidity::{AddLiquidity, MarketConfig, RemoveLiquidity};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Action {
    BuyTokens(u64),
    SellTokens(u64),
    Deposit(u64),
    Withdraw(u8),
    Transfer(u8),
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (1u64..5_000_000).prop_map(Action::BuyTokens),
        (1u64..5_000_000).prop_map(Action::SellTokens),
        (1_000u64..2_000_000).prop_map(Action::Deposit),
        (1u8..=100).prop_map(Action::Withdraw),
        (1u8..=100).prop_map(Action::Transfer),
    ]
}

const HOLDERS: [&str; 4] = ["alice", "bob", "carol", "market-fees"];

fn lp_holdings(env: &Env) -> U256 {
    let pool = env.pool("TKN");
    let mut total = env.rt.lp_balance_of(&pool, &chain_core::Address::zero()).unwrap();
    total += env.rt.lp_balance_of(&pool, &pool).unwrap();
    for holder in HOLDERS {
        total += env.rt.lp_balance_of(&pool, &label(holder)).unwrap();
    }
    total
}

/// Apply one action; failures (slippage, dust) must leave no trace
fn apply(env: &mut Env, action: &Action) {
    let pool = env.pool("TKN");
    let bob = label("bob");
    let _ = match *action {
        Action::BuyTokens(amount) => env
            .router
            .swap_exact_native_for_tokens(&mut env.rt, bob, amount, label("TKN"), U256::zero(), bob, 0)
            .map(|_| ()),
        Action::SellTokens(amount) => env
            .router
            .swap_exact_tokens_for_native(&mut env.rt, bob, label("TKN"), u(amount), 0, bob, 0)
            .map(|_| ()),
        Action::Deposit(amount) => env
            .router
            .add_liquidity(
                &mut env.rt,
                bob,
                amount,
                AddLiquidity {
                    token: label("TKN"),
                    amount_token_desired: u(amount * 100),
                    amount_native_min: 0,
                    amount_token_min: U256::zero(),
                    to: bob,
                    deadline: 0,
                },
            )
            .map(|_| ()),
        Action::Withdraw(percent) => {
            let held = env.rt.lp_balance_of(&pool, &bob).unwrap();
            env.router
                .remove_liquidity(
                    &mut env.rt,
                    bob,
                    RemoveLiquidity {
                        token: label("TKN"),
                        liquidity: held * U256::from(percent) / u(100),
                        amount_native_min: 0,
                        amount_token_min: U256::zero(),
                        to: bob,
                        deadline: 0,
                    },
                )
                .map(|_| ())
        }
        Action::Transfer(percent) => {
            let held = env.rt.lp_balance_of(&pool, &bob).unwrap();
            env.rt.transfer_lp(pool, bob, label("carol"), held * U256::from(percent) / u(100))
        }
    };
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_swaps_never_shrink_product(actions in prop::collection::vec(action(), 1..30)) {
        let config = MarketConfig {
            market_fee_enabled: true,
            fee_receiver: Some(label("market-fees")),
            ..MarketConfig::default()
        };
        let mut env = Env::new(config, &["TKN"]);
        env.seed("alice", "TKN", 50_000_000, 500_000_000);
        env.fund("bob", 1_000_000_000, "TKN", 10_000_000_000);
        let pool = env.pool("TKN");
        env.rt.approve_lp(pool, label("bob"), env.router.address(), U256::MAX).unwrap();

        for action in &actions {
            let product_before = env.product("TKN");
            let supply_before = env.rt.lp_total_supply(&pool).unwrap();
            apply(&mut env, action);

            let entry = env.rt.pool(&pool).unwrap();
            prop_assert!(!entry.is_locked());
            prop_assert_eq!(env.rt.pool_balances(&pool).unwrap(), entry.reserves());
            prop_assert_eq!(lp_holdings(&env), env.rt.lp_total_supply(&pool).unwrap());

            // swaps and transfers leave supply alone and never lose k
            if env.rt.lp_total_supply(&pool).unwrap() == supply_before {
                prop_assert!(env.product("TKN") >= product_before);
            }
        }
        prop_assert_eq!(env.rt.native_balance(&env.router.address()), 0);
    }
}
