//! Companion Chat - Terminal Host for the Conductor
//!
//! A line-oriented chat client: type a message, watch the persona's reply
//! arrive bubble by bubble. All orchestration (pacing, quota, session
//! continuity) lives in `companion-core`; this binary only reads lines and
//! prints conductor messages.
//!
//! # Usage
//!
//! ```bash
//! # Talk to "luna" on the configured service
//! companion-chat --user u-42 --persona luna
//!
//! # Point at another service and skip continuations
//! companion-chat --provider-url http://localhost:8080 --max-continuations 0
//!
//! # Machine-readable output
//! companion-chat --json
//!
//! # Verbose logging
//! RUST_LOG=companion_core=debug companion-chat
//! ```
//!
//! Type `/help` inside the chat for commands.

mod input;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use companion_core::backend::{HttpQuotaProvider, HttpTurnProvider};
use companion_core::config::{load_config, load_config_from_path, ConfigOverrides};
use companion_core::{
    Conductor, ConductorMessage, FallbackPolicy, PersonaId, QuotaEnforcer, SessionStore, UserId,
};

use input::{parse_line, Command, HELP};

/// Companion Chat - talk to a companion persona from the terminal
#[derive(Parser, Debug)]
#[command(name = "companion-chat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "COMPANION_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// User identifier sent with every request
    #[arg(short = 'u', long, env = "COMPANION_USER", default_value = "local")]
    user: String,

    /// Persona to talk to first
    #[arg(short = 'p', long, env = "COMPANION_PERSONA", default_value = "companion")]
    persona: String,

    /// Companion service base URL
    #[arg(long, value_name = "URL")]
    provider_url: Option<String>,

    /// Maximum unprompted continuation rounds per message
    #[arg(long, value_name = "N")]
    max_continuations: Option<u32>,

    /// Refuse to send when the quota service cannot be reached
    #[arg(long)]
    fail_closed: bool,

    /// Print conductor messages as JSON lines
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "COMPANION_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref url) = self.provider_url {
            overrides = overrides.with_provider_base_url(url.clone());
        }
        if let Some(max) = self.max_continuations {
            overrides = overrides.with_max_continuations(max);
        }
        if self.fail_closed {
            overrides = overrides.with_fallback(FallbackPolicy::FailClosed);
        }
        overrides
    }
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so they never interleave with chat output on stdout.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "companion_chat={level},companion_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn print_message(msg: &ConductorMessage, json: bool) {
    if json {
        match serde_json::to_string(msg) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "Failed to encode message"),
        }
    } else if let Some(line) = render::render(msg) {
        println!("{line}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = match args.config {
        Some(ref path) => load_config_from_path(Some(path.clone()))
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => load_config().context("Failed to load config")?,
    };
    args.overrides().apply(&mut config);
    info!(source = %config.source(), "Configuration resolved");

    let base_url = config.provider_base_url.clone().context(
        "No companion service configured: pass --provider-url, set COMPANION_PROVIDER_URL, \
         or add [provider].base_url to the config file",
    )?;

    let turns = HttpTurnProvider::new(&base_url, config.conductor.provider_timeout)
        .context("Failed to build turn provider")?
        .with_api_key(config.api_key.clone());
    let quota_source = HttpQuotaProvider::new(&base_url, config.conductor.quota.refresh_timeout)
        .context("Failed to build quota provider")?
        .with_api_key(config.api_key.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let quota = QuotaEnforcer::new(Arc::new(quota_source), config.conductor.quota.clone());
    let conductor = Arc::new(Conductor::new(
        UserId::new(args.user.clone()),
        Arc::new(turns),
        quota,
        SessionStore::new(),
        config.conductor,
        tx,
    ));
    let view = conductor.handle();

    conductor.open_view();
    let mut persona = PersonaId::new(args.persona.clone());
    if !args.json {
        println!("talking to {persona} on {base_url} (/help for commands)");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(msg) = rx.recv() => print_message(&msg, args.json),

            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match parse_line(&line) {
                    Command::Say(text) => {
                        let conductor = Arc::clone(&conductor);
                        let persona = persona.clone();
                        tokio::spawn(async move {
                            if let Err(e) = conductor.send_message(&persona, &text).await {
                                warn!(error = %e, "Send rejected");
                            }
                        });
                    }
                    Command::New(target) => conductor.new_conversation(target.as_ref()),
                    Command::Persona(next) => {
                        println!("now talking to {next}");
                        persona = next;
                    }
                    Command::Cancel => view.cancel_delivery(),
                    Command::Refresh => conductor.refresh_quota(),
                    Command::Quota => println!("{}", render::render_quota(&conductor.quota().snapshot())),
                    Command::Help => println!("{HELP}"),
                    Command::Quit => break,
                    Command::Empty => {}
                    Command::Unknown(cmd) => println!("unknown command: {cmd} (try /help)"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    conductor.close_view();
    while let Ok(msg) = rx.try_recv() {
        print_message(&msg, args.json);
    }
    Ok(())
}
