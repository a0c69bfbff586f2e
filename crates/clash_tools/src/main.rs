//! Lane Clash - Operator Tools
//!
//! ```bash
//! # Check the shipped catalog and a directory of deck files
//! clash-tools validate crates/clash_core/data
//!
//! # 1000 CPU-vs-CPU matches with random decks, JSON summary on stdout
//! clash-tools simulate --matches 1000 --seed 42 --json
//!
//! # Re-run a saved replay and compare its final hash
//! clash-tools verify-replay replays/match-17.bin
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clash_core::ability::AbilityBook;
use clash_core::replay::MatchReplay;
use clash_core::turn::{EnergyRule, EngineConfig};
use clash_tools::simulate::{run_simulation, SimConfig};
use clash_tools::validate::{load_deck, validate_path};

#[derive(Parser)]
#[command(name = "clash-tools")]
#[command(about = "Operator tools for Lane Clash")]
#[command(version)]
struct Cli {
    /// Ability catalog to use instead of the built-in one
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an ability catalog or deck file (or a directory of them)
    Validate {
        /// File or directory to check
        path: PathBuf,
    },
    /// Run CPU-vs-CPU matches and print balance statistics
    Simulate {
        /// Number of matches
        #[arg(short, long, default_value_t = 100)]
        matches: u32,
        /// Seed of the first match
        #[arg(short, long, default_value_t = 0)]
        seed: u64,
        /// Worker threads (0 = all cores)
        #[arg(short, long, default_value_t = 0)]
        threads: usize,
        /// Deck file for seat A (requires --deck-b)
        #[arg(long, requires = "deck_b")]
        deck_a: Option<PathBuf>,
        /// Deck file for seat B (requires --deck-a)
        #[arg(long, requires = "deck_a")]
        deck_b: Option<PathBuf>,
        /// Enforce per-turn energy instead of treating it as advisory
        #[arg(long)]
        enforce_energy: bool,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
        /// Write full results (every match) to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replay a saved match and check it reproduces its final hash
    VerifyReplay {
        /// Replay file
        path: PathBuf,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(message) = run(cli) {
        tracing::error!("{message}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let book = match &cli.catalog {
        Some(path) => AbilityBook::load(path),
        None => AbilityBook::builtin(),
    }
    .map_err(|e| e.to_string())?;

    match cli.command {
        Commands::Validate { path } => {
            tracing::info!("Validating data files in: {}", path.display());
            let reports = validate_path(&path, &book).map_err(|e| e.to_string())?;
            let mut failed = 0;
            for report in &reports {
                let status = if report.is_ok() { "ok" } else { "FAILED" };
                println!("{} [{:?}] {status}", report.path.display(), report.kind);
                for problem in &report.problems {
                    println!("  error: {problem}");
                }
                for note in &report.notes {
                    println!("  note: {note}");
                }
                failed += usize::from(!report.is_ok());
            }
            if failed > 0 {
                return Err(format!("{failed} of {} files failed validation", reports.len()));
            }
            tracing::info!("Validation passed");
        }
        Commands::Simulate {
            matches,
            seed,
            threads,
            deck_a,
            deck_b,
            enforce_energy,
            json,
            output,
        } => {
            let decks = match (deck_a, deck_b) {
                (Some(a), Some(b)) => Some([
                    load_deck(&a).map_err(|e| e.to_string())?,
                    load_deck(&b).map_err(|e| e.to_string())?,
                ]),
                _ => None,
            };
            let config = SimConfig {
                matches,
                seed_start: seed,
                threads,
                engine: EngineConfig {
                    energy_rule: if enforce_energy {
                        EnergyRule::Enforced
                    } else {
                        EnergyRule::Advisory
                    },
                },
                decks,
            };
            let results = run_simulation(&config, &book);
            if let Some(path) = output {
                results.save(&path).map_err(|e| e.to_string())?;
                tracing::info!("Results written to {}", path.display());
            }

            let summary = &results.summary;
            if json {
                let text = serde_json::to_string_pretty(summary).map_err(|e| e.to_string())?;
                println!("{text}");
            } else {
                println!("matches:      {}", summary.matches);
                println!("seat A wins:  {} ({:.1}%)", summary.wins_a, summary.win_rate_a() * 100.0);
                println!("seat B wins:  {} ({:.1}%)", summary.wins_b, summary.win_rate_b() * 100.0);
                println!("ties:         {} ({:.1}%)", summary.ties, summary.tie_rate() * 100.0);
                println!("power margin: {:.1}", summary.avg_power_margin);
                if !results.errors.is_empty() {
                    println!("failed:       {}", results.errors.len());
                }
            }
        }
        Commands::VerifyReplay { path } => {
            let replay = MatchReplay::load(&path).map_err(|e| e.to_string())?;
            let state = replay.verify(&book).map_err(|e| e.to_string())?;
            println!(
                "{}: {} turns, final hash {:016x} verified",
                path.display(),
                replay.turn_count(),
                state.state_hash()
            );
        }
    }
    Ok(())
}
