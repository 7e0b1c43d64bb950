// liquidity/tests/reentrancy.rs

mod common;

use common::{label, u, Env};
use chain_core::{Address, U256};
use liquidity::{LiquidityError, LiquidityResult, MarketConfig, Runtime, SwapCallback, SwapReceiver};
use std::cell::RefCell;
use std::rc::Rc;

/// Borrows tokens and repays a fixed amount from its own balance
struct FlashBorrower {
    address: Address,
    token: Address,
    repay: U256,
}

impl SwapReceiver for FlashBorrower {
    fn on_swap(&self, runtime: &mut Runtime, callback: &SwapCallback) -> LiquidityResult<()> {
        assert_eq!(callback.data, vec![1u8]);
        runtime.transfer_token(&self.token, &self.address, &callback.pool, self.repay)
    }
}

/// Tries to re-enter the pool, then repays like a borrower
struct Reenterer {
    address: Address,
    token: Address,
    repay: U256,
    errors: RefCell<Vec<LiquidityError>>,
}

impl SwapReceiver for Reenterer {
    fn on_swap(&self, runtime: &mut Runtime, callback: &SwapCallback) -> LiquidityResult<()> {
        let pool = callback.pool;
        let attempts = [
            runtime.mint(self.address, pool, self.address).map(|_| ()),
            runtime.burn(self.address, pool, self.address).map(|_| ()),
            runtime.swap(self.address, pool, 1, U256::zero(), self.address, &[]),
            runtime.sync(pool),
            runtime.skim(pool, self.address),
        ];
        for attempt in attempts {
            if let Err(err) = attempt {
                self.errors.borrow_mut().push(err);
            }
        }
        runtime.transfer_token(&self.token, &self.address, &pool, self.repay)
    }
}

fn flash_env() -> Env {
    let mut env = Env::new(MarketConfig::default(), &["TKN"]);
    env.seed("alice", "TKN", 1_000_000, 1_000_000);
    env
}

fn register_borrower(env: &mut Env, repay: u64) -> Address {
    let borrower = label("borrower");
    env.rt.mint_token(&label("TKN"), &borrower, u(10)).unwrap();
    env.rt.register_receiver(
        borrower,
        Rc::new(FlashBorrower { address: borrower, token: label("TKN"), repay: u(repay) }),
    );
    borrower
}

#[test]
fn test_flash_swap_repaid_with_fee() {
    let mut env = flash_env();
    let pool = env.pool("TKN");
    let borrower = register_borrower(&mut env, 1_004);
    let product = env.product("TKN");

    env.rt
        .swap(borrower, pool, 0, u(1_000), borrower, &[1])
        .unwrap();

    // borrowed 1000, repaid 1004 out of 1010
    assert_eq!(env.rt.token_balance(&label("TKN"), &borrower), u(6));
    assert_eq!(env.rt.pool(&pool).unwrap().reserves().token, u(1_000_004));
    assert!(env.product("TKN") >= product);
    assert!(!env.rt.pool(&pool).unwrap().is_locked());
}

#[test]
fn test_flash_swap_underpaid_rolls_back() {
    let mut env = flash_env();
    let pool = env.pool("TKN");
    let borrower = register_borrower(&mut env, 1_003);
    let logs = env.rt.logs().len();

    let result = env.rt.swap(borrower, pool, 0, u(1_000), borrower, &[1]);
    assert_eq!(result, Err(LiquidityError::InvalidSwap));

    assert_eq!(env.rt.token_balance(&label("TKN"), &borrower), u(10));
    assert_eq!(env.rt.token_balance(&label("TKN"), &pool), u(1_000_000));
    assert_eq!(env.rt.pool(&pool).unwrap().reserves().token, u(1_000_000));
    assert_eq!(env.rt.logs().len(), logs);
    assert!(!env.rt.pool(&pool).unwrap().is_locked());
}

#[test]
fn test_callback_requires_registered_receiver() {
    let mut env = flash_env();
    let pool = env.pool("TKN");
    let stranger = label("stranger");

    let result = env.rt.swap(stranger, pool, 0, u(1_000), stranger, &[1]);
    assert_eq!(result, Err(LiquidityError::InvalidReceiver(stranger)));
    assert!(env.rt.token_balance(&label("TKN"), &stranger).is_zero());
}

#[test]
fn test_reentrant_calls_are_locked_out() {
    let mut env = flash_env();
    let pool = env.pool("TKN");
    let address = label("reenterer");
    env.rt.mint_token(&label("TKN"), &address, u(10)).unwrap();

    let reenterer = Rc::new(Reenterer {
        address,
        token: label("TKN"),
        repay: u(1_004),
        errors: RefCell::new(Vec::new()),
    });
    env.rt.register_receiver(address, reenterer.clone());

    env.rt.swap(address, pool, 0, u(1_000), address, &[7]).unwrap();

    let errors = reenterer.errors.borrow();
    assert_eq!(errors.len(), 5);
    assert!(errors.iter().all(|err| *err == LiquidityError::Locked));
    assert!(!env.rt.pool(&pool).unwrap().is_locked());

    // the lock is free again for ordinary calls
    env.rt.sync(pool).unwrap();
}
