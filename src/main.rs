// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! pipetrace main entry point - credential checks, replay and config display.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;

use pipetrace::config::{self, CliOptions, ResolvedConfig};
use pipetrace::replay::{parse_events, replay};
use pipetrace::telemetry::{init_telemetry, TelemetryConfig, GLOBAL_METRICS};
use pipetrace::{FilterPipeline, LangfuseClient, LangfuseFilter, TelemetryClient, TurnLimitFilter};

/// pipetrace version string.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// pipetrace - Langfuse tracing for chat pipelines.
#[derive(Parser)]
#[command(name = "pipetrace")]
#[command(author, version, about = "Session-scoped Langfuse tracing for chat pipelines", long_about = None)]
struct Cli {
    /// Langfuse host URL
    #[arg(long, global = true)]
    host: Option<String>,

    /// Langfuse public key
    #[arg(long, global = true)]
    public_key: Option<String>,

    /// Langfuse secret key
    #[arg(long, global = true)]
    secret_key: Option<String>,

    /// Do not tag traces
    #[arg(long, global = true)]
    no_tags: bool,

    /// Report model names instead of ids on generations
    #[arg(long, global = true)]
    use_model_name: bool,

    /// Maximum user turns per conversation
    #[arg(long, global = true)]
    max_turns: Option<usize>,

    /// Show debug output
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for pipetrace.
#[derive(Subcommand)]
enum Commands {
    /// Verify the Langfuse credentials
    Check,

    /// Replay recorded hook calls (JSON Lines) through the filters
    Replay {
        /// File with one `{"phase", "body", "user"}` object per line
        file: PathBuf,
    },

    /// Show the resolved configuration (secrets masked)
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

impl Cli {
    fn options(&self) -> CliOptions {
        CliOptions {
            host: self.host.clone(),
            public_key: self.public_key.clone(),
            secret_key: self.secret_key.clone(),
            insert_tags: if self.no_tags { Some(false) } else { None },
            prefer_model_name: if self.use_model_name { Some(true) } else { None },
            debug: if self.debug { Some(true) } else { None },
            max_turns: self.max_turns,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let workspace_root = std::env::current_dir()?;
    let config = config::load_config(&workspace_root, cli.options())?;
    config::validate_config(&config)?;

    let _telemetry = init_telemetry(&TelemetryConfig::from_debug(config.langfuse.debug))
        .context("failed to initialize logging")?;

    match cli.command {
        Commands::Check => handle_check(&config).await,
        Commands::Replay { file } => handle_replay(config, &file).await,
        Commands::Config { json } => handle_config(&config, json),
        Commands::Version => {
            println!("pipetrace {}", VERSION);
            Ok(())
        }
    }
}

async fn handle_check(config: &ResolvedConfig) -> anyhow::Result<()> {
    let langfuse = &config.langfuse;
    println!("Host: {}", langfuse.host.bright_blue());
    println!(
        "Public key: {}",
        if langfuse.has_public_key() { "set".green() } else { "missing".red() }
    );
    println!(
        "Secret key: {}",
        if langfuse.has_secret_key() { "set".green() } else { "missing".red() }
    );

    let client = LangfuseClient::new(langfuse)?;
    match client.authenticate().await {
        Ok(()) => {
            println!("{} Credentials accepted", "✓".green());
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e);
            anyhow::bail!("credential check failed")
        }
    }
}

async fn handle_replay(config: ResolvedConfig, file: &Path) -> anyhow::Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let events = parse_events(&input)?;

    let langfuse = Arc::new(LangfuseFilter::new(config.langfuse));
    let pipeline = FilterPipeline::new()
        .with_filter(langfuse.clone())
        .with_filter(Arc::new(TurnLimitFilter::new(config.turn_limit)));

    pipeline.startup().await;
    if !langfuse.is_enabled().await {
        println!(
            "{}",
            "Langfuse client disabled, replaying without recording".yellow()
        );
    }

    println!("{} Replaying {} events from {}", "→".cyan(), events.len(), file.display());
    let summary = replay(&pipeline, events).await;
    pipeline.shutdown().await;

    println!(
        "{} inlets, {} outlets, {} rejected",
        summary.inlets, summary.outlets, summary.rejected.len()
    );
    for (line, message) in &summary.rejected {
        println!("  line {}: {}", line, message.red());
    }
    println!("\n{}", GLOBAL_METRICS.snapshot().format_report());
    Ok(())
}

fn handle_config(config: &ResolvedConfig, json: bool) -> anyhow::Result<()> {
    let redacted = config.redacted();
    if json {
        println!("{}", serde_json::to_string_pretty(&redacted)?);
        return Ok(());
    }

    let langfuse = &redacted.langfuse;
    println!("{}", "Langfuse".bright_blue().bold());
    println!("  host: {}", langfuse.host);
    println!("  public key: {}", langfuse.public_key);
    println!("  secret key: {}", langfuse.secret_key);
    println!("  pipelines: {}", langfuse.pipelines.join(", "));
    println!("  priority: {}", langfuse.priority);
    println!("  insert tags: {}", langfuse.insert_tags);
    println!("  prefer model name: {}", langfuse.prefer_model_name);
    println!("  debug: {}", langfuse.debug);
    println!("  backend timeout: {}ms", langfuse.backend_timeout_ms);
    println!("  flush at: {} events", langfuse.flush_at);
    match langfuse.session_idle_ttl_secs {
        Some(ttl) => println!("  session idle ttl: {}s", ttl),
        None => println!("  session idle ttl: {}", "never".dimmed()),
    }

    let turn_limit = &redacted.turn_limit;
    println!("{}", "Turn limit".bright_blue().bold());
    println!("  max turns: {}", turn_limit.max_turns);
    println!("  roles: {}", turn_limit.target_user_roles.join(", "));
    println!("  priority: {}", turn_limit.priority);
    Ok(())
}
