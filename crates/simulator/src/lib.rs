// simulator/src/lib.rs

//! Scenario simulator for the native/token exchange
//!
//! Loads a TOML scenario, deploys a market with one pool per token, funds
//! the named accounts and replays router and pool calls step by step.

pub mod scenario;
pub mod simulator;

pub use scenario::{Account, MarketSettings, Scenario, Step};
pub use simulator::{ScenarioReport, Simulator, StateReport, StepReport};
