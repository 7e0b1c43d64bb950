// simulator/src/main.rs
use chain_core::U256;
use clap::{Parser, Subcommand};
use liquidity::math;
use simulator::{Scenario, Simulator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "amm-sim")]
#[command(about = "Native/token exchange scenario simulator", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example scenario
    Init {
        /// Output path
        #[arg(short, long, default_value = "./scenario.toml")]
        output: String,
    },

    /// Run a scenario and print a JSON report
    Run {
        /// Scenario file path
        #[arg(short, long, default_value = "./scenario.toml")]
        scenario: String,

        /// Print the final state as well as the step reports
        #[arg(long)]
        state: bool,
    },

    /// Price a single swap against given reserves
    Quote {
        #[command(subcommand)]
        command: QuoteCommands,
    },
}

#[derive(Subcommand)]
enum QuoteCommands {
    /// Output for an exact input
    Out {
        #[arg(long)]
        amount_in: u64,
        #[arg(long)]
        reserve_in: u64,
        #[arg(long)]
        reserve_out: u64,
        /// Fee in parts per thousand
        #[arg(long, default_value = "3")]
        fee: u32,
    },

    /// Input needed for an exact output
    In {
        #[arg(long)]
        amount_out: u64,
        #[arg(long)]
        reserve_in: u64,
        #[arg(long)]
        reserve_out: u64,
        #[arg(long, default_value = "3")]
        fee: u32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("amm_sim={0},simulator={0},liquidity={0},chain_core={0}", log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { output } => init_scenario(&output)?,
        Commands::Run { scenario, state } => run_scenario(&scenario, state)?,
        Commands::Quote { command } => quote(command)?,
    }

    Ok(())
}

fn init_scenario(output: &str) -> anyhow::Result<()> {
    Scenario::default().to_file(output)?;
    tracing::info!("Scenario written to {}", output);
    tracing::info!("Edit {} and run it with `amm-sim run -s {}`", output, output);
    Ok(())
}

fn run_scenario(path: &str, print_state: bool) -> anyhow::Result<()> {
    tracing::info!("Loading scenario from {}", path);
    let scenario = Scenario::from_file(path)?;

    let mut simulator = Simulator::new(&scenario)?;
    let report = simulator.run(&scenario.steps);

    for step in &report.steps {
        println!("{}", serde_json::to_string(step)?);
    }
    if print_state {
        println!("{}", serde_json::to_string_pretty(&report.state)?);
    }

    let failed = report.steps.iter().filter(|step| !step.ok).count();
    tracing::info!("{} steps run, {} failed", report.steps.len(), failed);
    Ok(())
}

fn quote(command: QuoteCommands) -> anyhow::Result<()> {
    let quote = match command {
        QuoteCommands::Out { amount_in, reserve_in, reserve_out, fee } => {
            let amount_out = math::quote_amount_out(
                U256::from(amount_in),
                U256::from(reserve_in),
                U256::from(reserve_out),
                fee,
            )?;
            serde_json::json!({ "amount_in": amount_in, "amount_out": amount_out.to_string() })
        }
        QuoteCommands::In { amount_out, reserve_in, reserve_out, fee } => {
            let amount_in = math::quote_amount_in(
                U256::from(amount_out),
                U256::from(reserve_in),
                U256::from(reserve_out),
                fee,
            )?;
            serde_json::json!({ "amount_in": amount_in.to_string(), "amount_out": amount_out })
        }
    };
    println!("{}", serde_json::to_string_pretty(&quote)?);
    Ok(())
}
