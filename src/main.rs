//! Tradedesk — natural-language trading assistant.
//!
//! Usage:
//!   tradedesk chat      Start the interactive assistant
//!   tradedesk tools     Print the tool catalog
//!   tradedesk status    Check gateway reachability and show limits

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tradedesk::agent;
use tradedesk::broker::{GatewayClient, SessionAdapter};
use tradedesk::config::{self, TradedeskConfig};
use tradedesk::dispatch::{AuthorizePolicy, DispatchEngine, NotionalGate, Permissive};
use tradedesk::llm::ModelClient;
use tradedesk::tools;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "tradedesk")]
#[command(version = "0.1.0")]
#[command(about = "Natural-language trading assistant")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file.
    #[arg(long, default_value = "~/.tradedesk/tradedesk.toml")]
    config: String,

    /// Log level (debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the interactive assistant.
    Chat,

    /// Print the tool catalog exposed to the model.
    Tools,

    /// Check gateway reachability and show the configured limits.
    Status,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config_path = PathBuf::from(shellexpand::tilde(&cli.config).into_owned());
    let mut cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    cfg.apply_env_overrides();

    match cli.command {
        Commands::Chat => cmd_chat(cfg).await,
        Commands::Tools => cmd_tools(),
        Commands::Status => cmd_status(cfg).await,
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_chat(cfg: TradedeskConfig) -> Result<()> {
    // A duplicate registration here is a configuration bug; fail fast.
    let registry = Arc::new(tools::build_registry().context("Tool catalog is inconsistent")?);

    let gateway = GatewayClient::new(&cfg.gateway_host, cfg.gateway_port, cfg.client_id);
    let opened = gateway.open().await.with_context(|| {
        format!(
            "Failed to open gateway session at {}:{}",
            cfg.gateway_host, cfg.gateway_port
        )
    })?;
    info!(
        "Gateway session open: account {}, first order id {}",
        opened.account, opened.next_order_id,
    );

    let session = Arc::new(SessionAdapter::new(
        Arc::new(gateway.clone()),
        opened.next_order_id,
        cfg.session_options(),
    ));

    let policy: Arc<dyn AuthorizePolicy> = if cfg.confirm_notional_usd > 0.0 {
        Arc::new(NotionalGate { confirm_above_usd: cfg.confirm_notional_usd })
    } else {
        Arc::new(Permissive)
    };

    let engine = DispatchEngine::new(
        registry.clone(),
        session.clone(),
        policy,
        cfg.order_limits(),
    );
    let model = ModelClient::new(&cfg.model_base_url, &cfg.model_api_key);

    println!(
        "{} Connected to gateway {}:{} (account {}, model {})",
        ">>>".green().bold(),
        cfg.gateway_host,
        cfg.gateway_port,
        opened.account,
        cfg.model,
    );

    // First ctrl-c cancels the current turn (before execution) and ends
    // the loop; the session is still closed cleanly below.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let outcome =
        agent::run_chat_loop(cfg, registry, engine, model, session, cancel).await;

    if let Err(e) = gateway.close().await {
        warn!("Failed to close gateway session: {}", e);
    }

    outcome
}

fn cmd_tools() -> Result<()> {
    let registry = tools::build_registry().context("Tool catalog is inconsistent")?;

    println!();
    println!("{}", "=== Tool Catalog ===".bold());
    println!();
    for spec in registry.iter() {
        let tag = match spec.side_effect {
            tradedesk::tools::SideEffect::Mutating => "mutating".red().bold(),
            tradedesk::tools::SideEffect::ReadOnly => "read-only".green(),
        };
        println!("  {} ({})", spec.name.bold(), tag);
        println!("    {}", spec.description);
        for param in &spec.params {
            let req = if param.required { "required" } else { "optional" };
            println!(
                "      - {} [{}, {}]: {}",
                param.name,
                param.kind.type_name(),
                req,
                param.description,
            );
        }
        println!();
    }

    Ok(())
}

async fn cmd_status(cfg: TradedeskConfig) -> Result<()> {
    let gateway = GatewayClient::new(&cfg.gateway_host, cfg.gateway_port, cfg.client_id);
    let reachable = gateway.ping().await;

    println!();
    println!("{}", "=== Tradedesk Status ===".bold());
    println!();
    println!("  {}:", "Gateway".bold());
    println!("    Endpoint:  {}:{}", cfg.gateway_host, cfg.gateway_port);
    println!("    Client id: {}", cfg.client_id);
    match reachable {
        Ok(()) => println!("    Reachable: {}", "yes".green()),
        Err(e) => println!("    Reachable: {} ({})", "no".red().bold(), e),
    }
    println!();
    println!("  {}:", "Model".bold());
    println!("    Endpoint:  {}", cfg.model_base_url);
    println!("    Model:     {}", cfg.model);
    println!(
        "    API key:   {}",
        if cfg.model_api_key.is_empty() { "missing".red().bold() } else { "set".green() },
    );
    println!();
    println!("  {}:", "Limits".bold());
    println!("    Max quantity:     {}", cfg.max_order_quantity);
    println!("    Max notional:     {} USD", cfg.max_order_notional_usd);
    if cfg.confirm_notional_usd > 0.0 {
        println!("    Confirm above:    {} USD", cfg.confirm_notional_usd);
    } else {
        println!("    Confirm above:    {}", "disabled".yellow());
    }
    println!();

    Ok(())
}
