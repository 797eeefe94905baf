use crate::chat::ChatAssistant;
use crate::config::Config;
use crate::conversation::TurnStore;
use crate::evolution::{EvolveOutcome, SelfEvolutionPipeline, VersionStore};
use crate::llm::LlmGateway;
use crate::persona::StyleProfileStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use dialoguer::Input;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Geist - a chat assistant that mirrors your voice and keeps its receipts.
#[derive(Parser, Debug)]
#[command(name = "geist")]
#[command(version, about = "Personalized chat assistant with an auditable self-evolution pipeline.", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chat interactively, or send a single message
    Chat {
        /// Single message mode (don't enter interactive mode)
        #[arg(short, long)]
        message: Option<String>,

        /// Session id to continue; a fresh one is generated when omitted
        #[arg(short, long)]
        session: Option<String>,

        /// Strict enforcement: corrective redirects instead of snark
        #[arg(long)]
        strict: bool,
    },

    /// Start the HTTP gateway
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Request an LLM rewrite of a source file and commit it to the ledger
    Evolve {
        /// Ledger key for the artifact (e.g. the file's repo-relative path)
        #[arg(short, long)]
        target: String,

        /// File to rewrite
        file: PathBuf,

        /// Rewrite instructions; a generic refactor prompt is used when omitted
        #[arg(short, long)]
        instructions: Option<String>,

        /// Write the committed content here (adoption is always explicit)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Re-commit an earlier version as the new tip
    Rollback {
        #[arg(short, long)]
        target: String,

        /// Committed version number to restore
        version: u32,
    },

    /// Show a target's full version history, failed attempts included
    History {
        target: String,
    },
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Chat {
            message,
            session,
            strict,
        } => run_chat(&config, message, session, strict).await,
        Commands::Serve { port, host } => {
            let mut config = config;
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(host) = host {
                config.gateway.host = host;
            }
            crate::gateway::run_gateway(&config).await
        }
        Commands::Evolve {
            target,
            file,
            instructions,
            out,
        } => run_evolve(&config, &target, &file, instructions.as_deref(), out.as_deref()).await,
        Commands::Rollback { target, version } => run_rollback(&config, &target, version).await,
        Commands::History { target } => run_history(&config, &target),
    }
}

fn build_assistant(config: &Config) -> Result<ChatAssistant> {
    let gateway = Arc::new(LlmGateway::from_config(config));
    let turns = Arc::new(TurnStore::open(&config.turns_db_path())?);
    let profile = StyleProfileStore::new(config.profile_path()).load()?;
    Ok(ChatAssistant::new(config, gateway, turns, profile))
}

fn build_pipeline(config: &Config) -> Result<SelfEvolutionPipeline> {
    let gateway = Arc::new(LlmGateway::from_config(config));
    let versions = Arc::new(VersionStore::open(&config.evolution_db_path())?);
    Ok(SelfEvolutionPipeline::new(
        gateway,
        versions,
        config.llm.evolve_model(),
        config.llm.max_tokens,
    ))
}

async fn run_chat(
    config: &Config,
    message: Option<String>,
    session: Option<String>,
    strict: bool,
) -> Result<()> {
    let assistant = build_assistant(config)?;
    let session_id = session.unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Some(message) = message {
        let reply = assistant.chat(&session_id, &message, strict).await?;
        println!("{}", reply.turn.assistant_text);
        return Ok(());
    }

    println!("{}", style("Geist interactive mode").bold());
    println!(
        "Session {}. Type {} to exit, {} for tone state.\n",
        style(&session_id).dim(),
        style("/quit").cyan(),
        style("/state").cyan()
    );

    loop {
        let line: String = Input::new().with_prompt("you").interact_text()?;
        let line = line.trim().to_string();
        match line.as_str() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/state" => {
                if let Some(state) = assistant.session_state(&session_id).await {
                    println!(
                        "  patience {:.2}  snark {:.2}  topic {:.0}  off-topic streak {}{}",
                        state.patience,
                        state.snark,
                        state.topic_match_score,
                        state.consecutive_off_topic,
                        if state.corrective { "  [corrective]" } else { "" }
                    );
                } else {
                    println!("  no turns yet");
                }
                continue;
            }
            "/history" => {
                for turn in assistant.history(&session_id)? {
                    println!("  {} {}", style("you:").dim(), turn.user_text);
                    println!("  {} {}", style("geist:").dim(), turn.assistant_text);
                }
                continue;
            }
            _ => {}
        }

        let reply = assistant.chat(&session_id, &line, strict).await?;
        println!("\n{}\n", reply.turn.assistant_text);
    }

    Ok(())
}

async fn run_evolve(
    config: &Config,
    target: &str,
    file: &std::path::Path,
    instructions: Option<&str>,
    out: Option<&std::path::Path>,
) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let pipeline = build_pipeline(config)?;

    match pipeline
        .evolve(target, &source, instructions.unwrap_or(""), None)
        .await?
    {
        EvolveOutcome::Committed(version) => {
            println!(
                "✓ Committed {} v{} ({} bytes)",
                target,
                version.version_number,
                version.result_content.len()
            );
            if let Some(out) = out {
                std::fs::write(out, &version.result_content)
                    .with_context(|| format!("Failed to write {}", out.display()))?;
                println!("  wrote {}", out.display());
            } else {
                println!("  content is in the ledger; pass --out to write it to disk");
            }
        }
        EvolveOutcome::Failed(failure) => {
            println!(
                "! Evolution of {} failed: {} (tip unchanged)",
                failure.target_id, failure.reason
            );
        }
    }
    Ok(())
}

async fn run_rollback(config: &Config, target: &str, version: u32) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let restored = pipeline.rollback(target, version).await?;
    println!(
        "✓ {} rolled back: v{} now carries the content of v{}",
        target, restored.version_number, version
    );
    Ok(())
}

fn run_history(config: &Config, target: &str) -> Result<()> {
    let versions = VersionStore::open(&config.evolution_db_path())?;
    let history = versions.history(target)?;
    if history.is_empty() {
        println!("No versions recorded for {target}");
        return Ok(());
    }
    for entry in history {
        match entry.failure_reason {
            None => println!(
                "  v{:<3} {}  {}  {}",
                entry.version_number,
                entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                style("committed").green(),
                entry.instructions.lines().next().unwrap_or(""),
            ),
            Some(reason) => println!(
                "  ---  {}  {}  {}",
                entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                style("failed").red(),
                reason,
            ),
        }
    }
    Ok(())
}
