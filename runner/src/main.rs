// ═══════════════════════════════════════════════════════════════════════
// Runner — CLI entry point for simulating random sessions and replaying
// message scripts
// ═══════════════════════════════════════════════════════════════════════

mod driver;

use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Deserialize;
use throne_engine::setup::demo_session;
use throne_engine::{ClientMessage, Outbound, ServerMessage, UserId};
use throne_store::SqliteBackend;

#[derive(Parser)]
#[command(name = "throne-runner", about = "Board game session engine runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run many random sessions in parallel and summarize how they end
    Simulate {
        #[arg(short, long, default_value_t = 10)]
        games: u32,
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
        /// Persist every finished session into this SQLite store
        #[arg(short, long)]
        db: Option<String>,
    },
    /// Replay a JSON message script against a fresh demo session
    Replay {
        /// Script file: a JSON array of {"user": ..., "message": ...}
        script: String,
        /// Persist the final session into this SQLite store
        #[arg(short, long)]
        db: Option<String>,
    },
    /// Run one random session and print its game log
    Log {
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
    },
}

#[derive(Deserialize)]
struct ScriptEntry {
    user: UserId,
    message: ClientMessage,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Simulate { games, seed, db } => cmd_simulate(games, seed, db.as_deref()),
        Commands::Replay { script, db } => cmd_replay(&script, db.as_deref()),
        Commands::Log { seed } => cmd_log(seed),
    };
    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn cmd_simulate(games: u32, seed: u64, db: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    println!("simulating {games} random sessions (base seed {seed})...\n");
    let reports: Vec<Result<driver::DriveReport, String>> = (0..games)
        .into_par_iter()
        .map(|g| driver::play_random_session(seed + g as u64 * 1000))
        .collect();

    let mut finished = 0u32;
    for report in &reports {
        match report {
            Ok(r) => {
                finished += 1;
                println!(
                    "  seed-slot {:3}: {} after {} steps (turn {})",
                    finished,
                    r.session.state(),
                    r.steps,
                    r.session.ingame.game.turn,
                );
            }
            Err(e) => println!("  FAILED: {e}"),
        }
    }
    println!("\n{finished}/{games} sessions finished cleanly");

    if let Some(path) = db {
        let backend = SqliteBackend::new(path)?;
        for (g, report) in reports.into_iter().enumerate() {
            if let Ok(mut r) = report {
                r.session.id = format!("sim-{g}");
                r.session.save_to(&backend)?;
            }
        }
        println!("saved to {path}");
    }
    Ok(())
}

fn cmd_replay(script_path: &str, db: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let script: Vec<ScriptEntry> = serde_json::from_str(&std::fs::read_to_string(script_path)?)?;
    let (mut session, _) = demo_session();
    let mut rejected = 0u32;
    for (i, entry) in script.iter().enumerate() {
        for event in session.handle_message(&entry.user, &entry.message) {
            if let Outbound::Direct(_, ServerMessage::ActionRejected { reason }) = &event {
                rejected += 1;
                println!("  step {i}: rejected ({reason})");
            }
        }
    }
    println!(
        "replayed {} messages ({rejected} rejected), final state: {}",
        script.len(),
        session.state()
    );
    for entry in &session.ingame.game_log {
        println!("  {}", serde_json::to_string(entry)?);
    }
    if let Some(path) = db {
        let backend = SqliteBackend::new(path)?;
        session.save_to(&backend)?;
        println!("saved to {path}");
    }
    Ok(())
}

fn cmd_log(seed: u64) -> Result<(), Box<dyn std::error::Error>> {
    let report = driver::play_random_session(seed)?;
    for entry in &report.session.ingame.game_log {
        println!("{}", serde_json::to_string(entry)?);
    }
    println!(
        "// {} after {} steps",
        report.session.state(),
        report.steps
    );
    Ok(())
}
