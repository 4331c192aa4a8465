//! gift-sentry-bot: watches collectible gift pages and posts new ones to Telegram.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use gift_sentry::{
    CheckpointLedger, CheckpointMap, CheckpointStore, EngineConfig, EngineHandles, FetchGate,
    FrontierEstimator, PageSource, PremarketLedger, PremarketScan, Sender, SenderPool, SequenceId,
    Supervisor,
};
use gift_sentry_bot::logging::{self, LogOptions};
use gift_sentry_bot::{
    build_client, senders_from_tokens, BotConfig, Catalog, HttpGiftSource, PriceSource,
};

#[derive(Parser)]
#[command(
    name = "gift-sentry-bot",
    about = "Watch Telegram collectible gift pages and announce new mints",
    version
)]
struct Cli {
    /// Gift catalog (JSON).
    #[arg(long, global = true, default_value = "nft_catalog.json")]
    catalog: PathBuf,

    /// Checkpoint file.
    #[arg(long, global = true, default_value = "last_found.json")]
    checkpoint: PathBuf,

    /// Ledger of promoted premarket gifts.
    #[arg(long, global = true, default_value = "discovered_premarket.json")]
    premarket_ledger: PathBuf,

    /// Directory for app.log and errors.log.
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    /// Console log level (trace, debug, info, warn, error). RUST_LOG wins if set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// JSON console output.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk every catalog sequence until Ctrl-C (default).
    Run,

    /// Validate the catalog and print each sequence with its checkpoint.
    Check,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   gift-sentry-bot completions bash > ~/.local/share/bash-completion/completions/gift-sentry-bot
    ///   gift-sentry-bot completions zsh > ~/.zfunc/_gift-sentry-bot
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command.as_ref().unwrap_or(&Commands::Run) {
        Commands::Run => {
            let options = LogOptions {
                dir: cli.log_dir.clone(),
                level: cli.log_level.clone(),
                json: cli.log_json,
            };
            if let Err(e) = logging::init(&options) {
                eprintln!("Error: {e:#}");
                return ExitCode::FAILURE;
            }
            match run(&cli).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!("{e:#}");
                    ExitCode::FAILURE
                }
            }
        }

        Commands::Check => match check(&cli) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "gift-sentry-bot", &mut std::io::stdout());
            ExitCode::SUCCESS
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let bot = BotConfig::from_env().context("telegram configuration")?;
    let catalog = Catalog::load(&cli.catalog)?;
    let config = Arc::new(EngineConfig::from_env());
    tracing::info!(
        "profile {}: {} concurrent probe(s), re-anchor every {} miss(es)",
        config.profile.as_str(),
        config.max_concurrent_probes,
        config.reanchor_every
    );

    let client = build_client().context("failed to build HTTP client")?;
    let prices = Arc::new(PriceSource::new(client.clone()));
    let source: Arc<dyn PageSource> =
        Arc::new(HttpGiftSource::new(client.clone()).with_prices(prices));
    let gate = Arc::new(FetchGate::new(source, &config));
    let frontier = Arc::new(FrontierEstimator::new(Arc::clone(&gate), &config));

    let senders: Vec<Arc<dyn Sender>> =
        senders_from_tokens(&client, &bot.api_url, &bot.tokens, &bot.chat_id)
            .into_iter()
            .map(|s| Arc::new(s) as Arc<dyn Sender>)
            .collect();
    let pool = Arc::new(
        SenderPool::initialize(senders)
            .await
            .context("no Telegram bot passed its health check")?,
    );

    let ledger = CheckpointLedger::open(CheckpointStore::new(&cli.checkpoint));
    let handles = EngineHandles {
        gate: Arc::clone(&gate),
        frontier,
        pool: Arc::clone(&pool),
        ledger: ledger.clone(),
        config: Arc::clone(&config),
    };

    let promoted = PremarketLedger::load(&cli.premarket_ledger);
    let mut sequences = catalog.sequences.clone();
    let restored = promoted.restore_into(&mut sequences);
    if restored > 0 {
        tracing::info!("restored {restored} promoted premarket sequence(s)");
    }

    let pending = catalog.pending_premarket();
    let mut premarket_waiting = 0;
    let mut supervisor = Supervisor::new(handles, sequences.clone());
    if !pending.is_empty() {
        let scan = PremarketScan::new(pending, gate, pool, promoted, &config);
        premarket_waiting = scan.waiting().len();
        supervisor = supervisor.with_premarket(scan);
    }

    let checkpoints = ledger.snapshot().await;
    tracing::info!(
        "{} active sequence(s), {} premarket gift(s) waiting",
        sequences.len(),
        premarket_waiting
    );
    for sequence in sequences.iter().take(3) {
        tracing::info!(
            "  #{} {}: {}",
            sequence.id,
            sequence.label,
            describe_checkpoint(&checkpoints, sequence.id)
        );
    }

    let final_map = supervisor.run(shutdown_signal()).await;
    tracing::info!("stopped with {} checkpoint(s) saved", final_map.len());
    Ok(())
}

fn check(cli: &Cli) -> anyhow::Result<()> {
    let catalog = Catalog::load(&cli.catalog)?;
    let checkpoints = CheckpointStore::new(&cli.checkpoint).load();

    println!("Valid catalog: {}", cli.catalog.display());
    println!("  Sequences: {}", catalog.sequences.len());
    for sequence in &catalog.sequences {
        println!(
            "  #{:<4} {:<24} {:<40} {}",
            sequence.id.to_string(),
            sequence.label,
            sequence.base_url,
            describe_checkpoint(&checkpoints, sequence.id)
        );
    }

    let promoted = PremarketLedger::load(&cli.premarket_ledger);
    let mut all = catalog.sequences.clone();
    promoted.restore_into(&mut all);
    let restored = &all[catalog.sequences.len()..];
    if !restored.is_empty() {
        println!("  Promoted: {}", restored.len());
        for sequence in restored {
            println!(
                "  #{:<4} {:<24} {:<40} {}",
                sequence.id.to_string(),
                sequence.label,
                sequence.base_url,
                describe_checkpoint(&checkpoints, sequence.id)
            );
        }
    }

    let pending = catalog.pending_premarket();
    if !pending.is_empty() {
        println!("  Premarket: {}", pending.len());
        for name in &pending {
            let status = if promoted.contains(name) {
                "promoted"
            } else {
                "waiting"
            };
            println!("    {name} ({status})");
        }
    }
    Ok(())
}

fn describe_checkpoint(checkpoints: &CheckpointMap, id: SequenceId) -> String {
    match checkpoints.get(&id) {
        Some(index) => format!("last found #{index}"),
        None => "no checkpoint".to_string(),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Ctrl-C received, shutting down"),
        Err(e) => {
            tracing::error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
