//! Karera DS console
//!
//! Command-line testing console for the horse racing contract.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use karera_console::{
    analytics::{
        logger::{print_summary, RunArchive},
        report::generate_report,
    },
    config::{ConsoleConfig, Pacing},
    ledger::{LedgerClient, MemoryLedger, RaceContract},
    race::{format_tokens, Horse, RaceStatus, RngShuffler, Shuffler},
    simulation::{
        log::console_directives, Delay, NoDelay, Orchestrator, Outcome, SimEvent, TokioDelay,
    },
};

/// Development account used when no signer is configured
const DEV_ACCOUNT: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

#[derive(Parser)]
#[command(name = "karera")]
#[command(version = "0.1.0")]
#[command(about = "Karera DS race contract testing console", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Ledger state file shared between commands
    #[arg(long, global = true, default_value = "output/ledger.json")]
    state: PathBuf,

    /// Address of the signing account
    #[arg(long, global = true)]
    signer: Option<String>,

    /// Skip the pauses between simulation steps
    #[arg(long, global = true)]
    fast: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full race simulation
    Run {
        /// Seed the race shuffles for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Output directory for run archives
        #[arg(short, long)]
        output: Option<String>,

        /// Skip saving the run archive and HTML report
        #[arg(long)]
        no_report: bool,
    },

    /// Reset status to PENDING and clear the winners
    Reset,

    /// Query one contract getter
    Query {
        #[arg(value_enum)]
        getter: Getter,
    },

    /// Submit one contract transaction
    Call {
        #[command(subcommand)]
        call: Call,
    },

    /// Render the HTML report of a saved run
    Report {
        /// Input JSON file of a saved run
        #[arg(short, long)]
        input: PathBuf,

        /// Output HTML file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print configuration info
    Info,
}

#[derive(Clone, Copy, ValueEnum)]
enum Getter {
    Status,
    Horses,
    Bets,
    Winners,
    Combinations,
    Rewards,
}

#[derive(Subcommand)]
enum Call {
    /// Set race status (0=pending, 1=started, 2=finished)
    SetStatus { status: u8 },
    /// Add a horse to the race
    AddHorse { id: u32, name: String },
    /// Bet `amount` units on a pair of horses
    AddBet { first: u32, second: u32, amount: u128 },
    /// Record first and second place
    SetWinners { first: u32, second: u32 },
    /// Add a payable pair of horses
    AddCombination { first: u32, second: u32 },
    /// Credit `amount` units to a bettor
    AddReward { bettor: String, amount: u128 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; the log panel is printed by `spawn_log_printer`
    let _subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(console_directives(cli.verbose)))
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let mut config = match &cli.config {
        Some(path) => ConsoleConfig::load(path)?,
        None => ConsoleConfig::default(),
    };
    if cli.fast {
        config.pacing = Pacing::none();
    }

    let signer = cli
        .signer
        .clone()
        .or_else(|| config.signer.clone())
        .unwrap_or_else(|| {
            info!("No signer configured, using development account");
            DEV_ACCOUNT.to_string()
        });

    match cli.command {
        Commands::Run {
            seed,
            output,
            no_report,
        } => {
            if let Some(output) = output {
                config.output_dir = output;
            }
            let ledger = MemoryLedger::load(&cli.state, Some(signer))?;
            run_simulation(&config, ledger.clone(), seed, !no_report).await?;
            ledger.save(&cli.state)?;
        }

        Commands::Reset => {
            let ledger = MemoryLedger::load(&cli.state, Some(signer))?;
            reset_contract(&config, ledger.clone()).await;
            ledger.save(&cli.state)?;
        }

        Commands::Query { getter } => {
            let ledger = MemoryLedger::load(&cli.state, Some(signer))?;
            query_contract(&RaceContract::new(ledger), getter).await?;
        }

        Commands::Call { call } => {
            let ledger = MemoryLedger::load(&cli.state, Some(signer))?;
            send_call(&RaceContract::new(ledger.clone()), call).await?;
            ledger.save(&cli.state)?;
        }

        Commands::Report { input, output } => {
            generate_report_from_file(&input, output.as_deref())?;
        }

        Commands::Info => {
            print_info(&config, &cli.state, &signer);
        }
    }

    Ok(())
}

async fn run_simulation(
    config: &ConsoleConfig,
    ledger: MemoryLedger,
    seed: Option<u64>,
    save_archive: bool,
) -> Result<()> {
    println!();
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║       Karera DS - Horse Racing Simulation                ║");
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let delay: Box<dyn Delay> = Box::new(TokioDelay);
    let shuffler: Box<dyn Shuffler> = match seed {
        Some(seed) => Box::new(RngShuffler::seeded(seed)),
        None => Box::new(RngShuffler::from_entropy()),
    };

    let orchestrator = Orchestrator::new(config.clone(), ledger, delay, shuffler);
    let printer = spawn_log_printer(orchestrator.subscribe());

    let outcome = orchestrator.run().await;

    // Closing the channel lets the printer drain and stop
    drop(orchestrator);
    printer.await.context("Log printer task failed")?;

    match outcome {
        Outcome::Completed(report) => {
            print_summary(&report);

            if save_archive {
                let archive = RunArchive::new(&config.output_dir);
                let json_path = archive.save_run(&report)?;
                archive.save_summary(&report)?;
                let report_path = generate_report(&report, &archive.report_path(&report))?;

                println!();
                println!("📊 Report generated: {}", report_path);
                println!("📁 Run saved to: {}", json_path);
                println!();
            }
        }
        Outcome::Aborted(error) => warn!("Simulation aborted: {}", error),
        Outcome::Rejected => warn!("A simulation is already running"),
        Outcome::NotReady => warn!("Ledger not ready, nothing was submitted"),
    }

    Ok(())
}

async fn reset_contract(config: &ConsoleConfig, ledger: MemoryLedger) {
    let orchestrator = Orchestrator::new(
        config.clone(),
        ledger,
        Box::new(NoDelay),
        Box::new(RngShuffler::from_entropy()),
    );
    let printer = spawn_log_printer(orchestrator.subscribe());

    let outcome = orchestrator.reset().await;
    drop(orchestrator);
    if let Err(e) = printer.await {
        warn!("Log printer task failed: {}", e);
    }

    if !outcome.is_completed() {
        warn!("Reset did not complete");
    }
}

/// Print log entries as they arrive, until the orchestrator goes away
fn spawn_log_printer(mut events: broadcast::Receiver<SimEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SimEvent::Log(entry)) => println!("{}", entry),
                Ok(SimEvent::Phase(phase)) => tracing::debug!("Phase: {}", phase),
                Ok(SimEvent::Cleared) => {}
                Err(RecvError::Lagged(missed)) => warn!("Log printer skipped {} entries", missed),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn query_contract<L: LedgerClient>(contract: &RaceContract<L>, getter: Getter) -> Result<()> {
    let output = match getter {
        Getter::Status => {
            let status = contract.status().await?;
            serde_json::json!({ "code": status.code(), "status": status.to_string() })
        }
        Getter::Horses => serde_json::to_value(contract.horses().await?)?,
        Getter::Bets => {
            let bets = contract.bets().await?;
            let rendered: Vec<_> = bets
                .iter()
                .map(|b| {
                    serde_json::json!({
                        "bettor": b.bettor,
                        "amount": b.amount.to_string(),
                        "tokens": format_tokens(b.amount),
                        "choice": b.choice,
                    })
                })
                .collect();
            serde_json::Value::Array(rendered)
        }
        Getter::Winners => serde_json::to_value(contract.winners().await?)?,
        Getter::Combinations => serde_json::to_value(contract.winning_combinations().await?)?,
        Getter::Rewards => {
            let rewards = contract.rewards().await?;
            let rendered: Vec<_> = rewards
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "bettor": r.bettor,
                        "amount": r.amount.to_string(),
                        "tokens": format_tokens(r.amount),
                    })
                })
                .collect();
            serde_json::Value::Array(rendered)
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn send_call<L: LedgerClient>(contract: &RaceContract<L>, call: Call) -> Result<()> {
    let hash = match call {
        Call::SetStatus { status } => {
            let status = RaceStatus::from_code(status)
                .with_context(|| format!("Unknown status {status}, expected 0, 1 or 2"))?;
            contract.set_status(status).await?
        }
        Call::AddHorse { id, name } => contract.add_horse(&Horse::new(id, &name)).await?,
        Call::AddBet {
            first,
            second,
            amount,
        } => contract.add_bet(&[first, second], amount).await?,
        Call::SetWinners { first, second } => contract.set_winners(first, second).await?,
        Call::AddCombination { first, second } => {
            contract.add_winning_combination(first, second).await?
        }
        Call::AddReward { bettor, amount } => contract.add_reward(&bettor, amount).await?,
    };

    println!("Transaction included in block {}", hash);
    Ok(())
}

fn generate_report_from_file(input: &Path, output: Option<&Path>) -> Result<()> {
    info!("Loading run from: {:?}", input);

    let report = RunArchive::load_run(input)?;

    let output_path = output
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "output/reports/report.html".to_string());

    generate_report(&report, &output_path)?;

    println!("📊 Report generated: {}", output_path);

    Ok(())
}

fn print_info(config: &ConsoleConfig, state: &Path, signer: &str) {
    println!();
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║       Karera DS Console - Info                           ║");
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();
    println!("CONNECTION:");
    println!("  Node:        {}", config.ws_url);
    println!("  Contract:    {}", config.contract_address);
    println!("  Signer:      {}", signer);
    println!("  State file:  {}", state.display());
    println!();
    println!("HORSES:");
    for horse in &config.horses {
        println!("  [{}] {}", horse.id, horse.name);
    }
    println!();
    println!("SIMULATED BETS:");
    for bet in &config.bets {
        println!(
            "  Horses [{}, {}] - {} tokens",
            bet.choice[0],
            bet.choice[1],
            format_tokens(bet.amount)
        );
    }
    println!();
    println!("USAGE:");
    println!("  karera run                      # Full race simulation");
    println!("  karera run --fast --seed 7      # Reproducible run without pauses");
    println!("  karera reset                    # Status PENDING, winners (0, 0)");
    println!("  karera query bets               # Read a contract getter");
    println!("  karera call set-status 1        # Submit one transaction");
    println!("  karera report -i run.json       # Re-render a saved run");
    println!();
}
