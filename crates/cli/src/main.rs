//! The `axe` binary: run and resume sessions, validate configs, inspect
//! the agent roster and workshop stats.

mod config_load;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use axe_engine::SessionBuilder;
use axe_providers::scripted::{ScriptedProvider, StaticSummarizer};
use axe_store::{AgentFilter, Store};

#[derive(Parser)]
#[command(name = "axe", about = "Multi-agent execution engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a session (fresh, or resumed with --resume).
    Run {
        /// Path to the session config (TOML or YAML).
        #[arg(long, default_value = "axe.toml")]
        config: PathBuf,
        /// Resume the given session id instead of starting fresh.
        #[arg(long)]
        resume: Option<String>,
        /// Replay file for the scripted provider: replies separated by
        /// lines containing only `---`.
        #[arg(long)]
        script: Option<PathBuf>,
    },
    /// Validate a config file and exit.
    Validate {
        #[arg(long, default_value = "axe.toml")]
        config: PathBuf,
    },
    /// List known agents with XP, level, and status.
    Agents,
    /// Per-tool workshop analysis statistics.
    Stats {
        /// Restrict to one agent (alias or id).
        #[arg(long)]
        agent: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Run {
            config,
            resume,
            script,
        } => run(config, resume, script).await,
        Command::Validate { config } => {
            config_load::load(&config)?;
            println!("ok");
            Ok(())
        }
        Command::Agents => list_agents(),
        Command::Stats { agent } => stats(agent.as_deref()),
    }
}

async fn run(
    config_path: PathBuf,
    resume: Option<String>,
    script: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = config_load::load(&config_path)?;
    let store = Arc::new(Store::open_default()?);

    let provider = Arc::new(scripted_provider(script.as_deref())?);
    let builder = SessionBuilder::new(
        config,
        store,
        provider,
        Arc::new(StaticSummarizer::default()),
    );

    let mut scheduler = match &resume {
        Some(session_id) => builder.resume(session_id)?,
        None => builder.start()?,
    };
    tracing::info!(session_id = scheduler.session_id(), "session running");

    // Ctrl-C cancels the session; in-flight operations finish and their
    // results are persisted.
    let cancel = scheduler.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("cancellation requested");
            cancel.cancel();
        }
    });

    let summary = scheduler.run().await?;
    println!(
        "session {} ended: {} ({} tokens over {} turns)",
        summary.session_id, summary.end_status, summary.total_tokens, summary.turns
    );
    for (alias, delta) in &summary.xp_deltas {
        println!("  {alias}: {delta:+} xp");
    }
    if let Some(cause) = summary.fatal_cause {
        println!("fatal cause: {cause}");
        println!("resume with: axe run --resume {}", summary.session_id);
    }
    Ok(())
}

/// Until a real provider adapter is linked in, replies come from a
/// replay file: blocks separated by `---` lines.
fn scripted_provider(script: Option<&std::path::Path>) -> anyhow::Result<ScriptedProvider> {
    let provider = ScriptedProvider::new();
    let Some(path) = script else {
        anyhow::bail!(
            "no provider adapter configured; pass --script <file> with canned replies"
        );
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading script '{}'", path.display()))?;
    for block in raw.split("\n---\n") {
        let block = block.trim();
        if !block.is_empty() {
            provider.push_text(block);
        }
    }
    Ok(provider)
}

fn list_agents() -> anyhow::Result<()> {
    let store = Store::open_default()?;
    let agents = store.list_agents(&AgentFilter {
        status: None,
        include_retired: true,
    })?;
    if agents.is_empty() {
        println!("no agents recorded");
        return Ok(());
    }
    for agent in agents {
        println!(
            "{:<12} level {:<3} {:>8} xp  {:<9} {}",
            agent.alias,
            agent.level,
            agent.xp,
            agent.status.as_str(),
            agent.model_ref,
        );
    }
    Ok(())
}

fn stats(agent: Option<&str>) -> anyhow::Result<()> {
    let store = Store::open_default()?;
    let agent_id = match agent {
        Some(alias_or_id) => Some(store.require_agent(alias_or_id)?.agent_id),
        None => None,
    };
    let stats = store.stats_by_tool(agent_id.as_deref())?;
    if stats.is_empty() {
        println!("no analyses recorded");
        return Ok(());
    }
    println!("{:<20} {:>6} {:>8} {:>6} {:>6}", "tool", "runs", "avg(s)", "ok", "fail");
    for (tool, s) in stats {
        println!(
            "{:<20} {:>6} {:>8.2} {:>6} {:>6}",
            tool, s.count, s.avg_duration_s, s.ok, s.fail
        );
    }
    Ok(())
}
