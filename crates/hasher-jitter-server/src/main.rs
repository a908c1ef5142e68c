//! hasher-jitter command-line driver

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use hasher_jitter::{
    header, loader, FlashSearcher, GoldenNonceResult, JitterConfig, JitterEngine, Slots, SLOT_COUNT,
};
use hasher_jitter_server::ServerConfig;

#[derive(Parser)]
#[command(name = "hasher-jitter")]
#[command(about = "Temporal-loop jitter engine and flash-search RPC server", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory of training-frame JSON files
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve jitter lookups on a Unix socket
    Serve {
        /// Socket path (overrides the config file)
        #[arg(short, long)]
        socket: Option<PathBuf>,
    },

    /// Run the temporal loop once
    Run {
        /// Semantic slots, comma-separated (decimal or 0x hex, up to 12)
        #[arg(short, long)]
        slots: String,

        /// Target token id
        #[arg(short, long)]
        target: u32,

        /// Header nonce
        #[arg(short, long, default_value_t = 0)]
        nonce: u32,

        /// Print every pass
        #[arg(long)]
        history: bool,
    },

    /// Hunt for a golden nonce over a range of candidates
    Hunt {
        /// Semantic slots, comma-separated (decimal or 0x hex, up to 12)
        #[arg(short, long)]
        slots: String,

        /// Target token id
        #[arg(short, long)]
        target: u32,

        /// First candidate nonce
        #[arg(long, default_value_t = 0)]
        start: u32,

        /// Number of candidates
        #[arg(short = 'n', long, default_value_t = 256)]
        count: u32,
    },

    /// Resolve a token from the knowledge base
    Lookup {
        /// Golden nonce to map onto the vocabulary
        #[arg(long, requires = "vocab_size", conflicts_with = "context")]
        nonce: Option<u32>,

        /// Vocabulary size
        #[arg(long)]
        vocab_size: Option<u32>,

        /// Token context, comma-separated
        #[arg(long)]
        context: Option<String>,
    },
}

fn parse_u32(value: &str) -> Result<u32> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.with_context(|| format!("invalid number: {value:?}"))
}

fn parse_slots(input: &str) -> Result<Slots> {
    let values: Vec<u32> = input
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(parse_u32)
        .collect::<Result<_>>()?;
    if values.len() > SLOT_COUNT {
        bail!("at most {SLOT_COUNT} slots, got {}", values.len());
    }
    let mut slots = [0u32; SLOT_COUNT];
    slots[..values.len()].copy_from_slice(&values);
    Ok(slots)
}

fn parse_context(input: &str) -> Result<Vec<i32>> {
    input
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse::<i32>()
                .with_context(|| format!("invalid token id: {s:?}"))
        })
        .collect()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn summarize(result: &GoldenNonceResult, history: bool) -> serde_json::Value {
    let mut summary = json!({
        "nonce": result.nonce,
        "found": result.found,
        "alignment": result.alignment,
        "stability": result.stability,
        "passes_completed": result.passes_completed,
        "knowledge_hits": result.knowledge_hits(),
        "seed_nonce": result.seed_nonce,
        "target_token_id": result.target_token_id,
        "final_hash": hex(&result.final_hash),
    });
    if history {
        summary["history"] = result
            .jitter_history
            .iter()
            .map(|r| json!({ "pass": r.pass, "key": r.hash_key(), "jitter": r.jitter, "found": r.found }))
            .collect();
    }
    summary
}

fn load_searcher(config: &JitterConfig, data: Option<&PathBuf>) -> Result<Arc<FlashSearcher>> {
    let searcher = Arc::new(FlashSearcher::new(config));
    if let Some(dir) = data {
        loader::load_from_directory(&searcher, dir)
            .with_context(|| format!("failed to load frames from {}", dir.display()))?;
    }
    Ok(searcher)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.debug {
        "hasher_jitter=debug,hasher_jitter_server=debug"
    } else {
        "hasher_jitter=info,hasher_jitter_server=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => JitterConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => JitterConfig::default(),
    };
    if cli.debug {
        config.verbose = true;
    }

    match cli.command {
        Commands::Serve { socket } => {
            if let Some(socket) = socket {
                config.socket_path = socket;
            }
            hasher_jitter_server::run(ServerConfig {
                jitter: config,
                data_dir: cli.data,
            })
            .await?;
        }
        Commands::Run {
            slots,
            target,
            nonce,
            history,
        } => {
            let slots = parse_slots(&slots)?;
            let engine = JitterEngine::new(load_searcher(&config, cli.data.as_ref())?, config);
            let result = engine.execute_loop(header::encode(&slots, nonce), target);
            println!("{}", serde_json::to_string_pretty(&summarize(&result, history))?);
        }
        Commands::Hunt {
            slots,
            target,
            start,
            count,
        } => {
            let slots = parse_slots(&slots)?;
            let engine = JitterEngine::new(load_searcher(&config, cli.data.as_ref())?, config);
            let candidates: Vec<u32> = (0..count).map(|i| start.wrapping_add(i)).collect();
            let result = engine.hunt_golden_nonce(header::encode(&slots, start), target, &candidates)?;
            println!("{}", serde_json::to_string_pretty(&summarize(&result, false))?);
        }
        Commands::Lookup {
            nonce,
            vocab_size,
            context,
        } => {
            let searcher = load_searcher(&config, cli.data.as_ref())?;
            let token = match (nonce, vocab_size, context) {
                (Some(nonce), Some(vocab), _) => searcher.lookup_by_nonce(nonce, vocab),
                (_, _, Some(context)) => searcher.lookup_by_context(&parse_context(&context)?),
                _ => bail!("lookup needs --nonce with --vocab-size, or --context"),
            };
            println!("{}", json!({ "token": token }));
        }
    }

    Ok(())
}
