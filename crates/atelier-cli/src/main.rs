//! Atelier CLI - ceremony orchestration from the command line
//!
//! Usage:
//!   atelier init                 Write default config to .atelier/config.toml
//!   atelier validate <plan>      Check a ceremony plan without running it
//!   atelier weave <plan>         Initiate a ceremony and run it to the end
//!   atelier status <ledger>      Summarise an existing ledger file

use anyhow::{bail, Context, Result};
use atelier_core::{AtelierConfig, CeremonyStatus, TaskStatus};
use atelier_ledger::load_ledger;
use atelier_orchestrator::{validate_specs, Orchestrator, ProcessApprentice, TaskSpec};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "atelier")]
#[command(author, version, about = "Durable ceremony orchestration")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration to .atelier/config.toml
    Init {
        /// Directory to initialise (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Check a ceremony plan without running it
    Validate {
        /// Plan file (TOML)
        plan: PathBuf,
    },

    /// Initiate a ceremony from a plan and run it until complete or blocked
    Weave {
        /// Plan file (TOML)
        plan: PathBuf,

        /// Directory holding .atelier/config.toml (defaults to current directory)
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Summarise an existing ledger file
    Status {
        /// Ledger file path
        ledger: PathBuf,

        /// Emit machine-readable JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

/// Declarative ceremony plan, the file-based front door to `initiate`
#[derive(Debug, Deserialize)]
struct CeremonyPlan {
    name: String,
    initiator: String,
    #[serde(default)]
    intention: String,
    #[serde(default)]
    tasks: Vec<TaskSpec>,
}

impl CeremonyPlan {
    fn load(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read plan file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Cannot parse plan file {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { path } => cmd_init(path),
        Commands::Validate { plan } => cmd_validate(plan),
        Commands::Weave { plan, root } => cmd_weave(plan, root).await,
        Commands::Status { ledger, json } => cmd_status(ledger, json).await,
    }
}

fn cmd_init(path: PathBuf) -> Result<()> {
    AtelierConfig::write_default(&path)
        .with_context(|| format!("Cannot write config under {}", path.display()))?;
    println!("Wrote {}", path.join(".atelier/config.toml").display());
    Ok(())
}

fn cmd_validate(plan_path: PathBuf) -> Result<()> {
    let plan = CeremonyPlan::load(&plan_path)?;
    validate_specs(&plan.tasks).context("Plan is not a valid ceremony")?;
    println!(
        "Plan '{}' is valid: {} task(s) for {}",
        plan.name,
        plan.tasks.len(),
        plan.initiator
    );
    Ok(())
}

async fn cmd_weave(plan_path: PathBuf, root: PathBuf) -> Result<()> {
    let plan = CeremonyPlan::load(&plan_path)?;
    let config = AtelierConfig::load_or_default(&root)?;
    let poll = config.poll_interval();

    let mut orch = Orchestrator::new(config, Arc::new(ProcessApprentice::new()));
    let handle = orch
        .initiate(plan.name, plan.initiator, plan.intention, plan.tasks)
        .await?;
    orch.start();

    let session = loop {
        let snap = handle.snapshot().await;
        if snap.status.is_terminal() {
            break snap;
        }
        tokio::time::sleep(poll.max(Duration::from_millis(100))).await;
    };
    orch.stop().await;

    println!();
    println!("Ceremony {} ({})", session.ceremony_id, session.status);
    println!("Ledger: {}", session.ledger_path.display());
    for task in &session.tasks {
        let note = match task.status {
            TaskStatus::Failed => task.error.clone().unwrap_or_default(),
            TaskStatus::Complete => task.output.clone().unwrap_or_default(),
            _ => String::new(),
        };
        if note.is_empty() {
            println!("  [{}] {}", task.status, task.task_id);
        } else {
            println!("  [{}] {}: {}", task.status, task.task_id, note);
        }
    }

    if session.status != CeremonyStatus::Complete {
        bail!("Ceremony ended {}", session.status);
    }
    Ok(())
}

async fn cmd_status(ledger: PathBuf, json: bool) -> Result<()> {
    let Some(session) = load_ledger(&ledger).await else {
        bail!("Ledger {} is missing or unusable", ledger.display());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    println!("Ceremony {} ({})", session.ceremony_id, session.status);
    println!("Name:      {}", session.name);
    println!("Initiator: {}", session.initiator);
    if !session.intention.is_empty() {
        println!("Intention: {}", session.intention);
    }
    let done = session
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Complete)
        .count();
    println!("Tasks:     {}/{} complete", done, session.tasks.len());
    for task in &session.tasks {
        let assigned = task.assigned_to.as_deref().unwrap_or("-");
        println!(
            "  [{}] {} ({}, {})",
            task.status, task.task_id, task.priority, assigned
        );
    }
    Ok(())
}
