//! Titlewise command line.
//!
//! ```bash
//! # Load reviewed precedents into the LanceDB index
//! titlewise ingest data/precedents --clear
//!
//! # Review one merged case (needs ANTHROPIC_API_KEY, or OPENAI_API_KEY with --provider openai)
//! titlewise review cases/AP-1042.json --out reviews
//!
//! # Review a directory of cases; writes metrics and a scoring template
//! titlewise evaluate cases --out eval_results
//!
//! # Index size, and metrics for a saved review
//! titlewise stats
//! titlewise metrics reviews/review_AP-1042_20260301_101500.json
//! ```

mod display;
mod evaluate;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use titlewise_ai::{
    ClaudeClient, ClaudeConfig, DEFAULT_HASH_DIM, DEFAULT_MODEL, DEFAULT_OPENAI_EMBEDDING_MODEL,
    DEFAULT_OPENAI_MODEL, HashEmbedder, LanguageModel, OpenAiClient, OpenAiConfig, OpenAiEmbedder,
};
use titlewise_core::{Embed, MergedCase, ReviewObject};
use titlewise_review::{ReviewConfig, ReviewPipeline};
use titlewise_store::{LanceIndex, PrecedentStore};

#[derive(Parser, Debug)]
#[command(name = "titlewise", version)]
#[command(about = "Precedent-backed review of property title reports")]
struct Cli {
    /// LanceDB directory holding the precedent index
    #[arg(long, env = "TITLEWISE_DB", default_value = "data/titlewise.lance", global = true)]
    db: PathBuf,

    /// Embedding backend; must match the one the index was built with
    #[arg(long, env = "TITLEWISE_EMBEDDER", value_enum, default_value_t = EmbedderKind::Hash, global = true)]
    embedder: EmbedderKind,

    /// Sentence-transformer directory (model.onnx + tokenizer.json)
    #[arg(long, env = "TITLEWISE_MODEL_DIR", default_value = "models/all-MiniLM-L6-v2", global = true)]
    model_dir: PathBuf,

    /// Embedding model for `--embedder openai`
    #[arg(long, env = "TITLEWISE_EMBEDDING_MODEL", default_value = DEFAULT_OPENAI_EMBEDDING_MODEL, global = true)]
    embedding_model: String,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true, global = true)]
    anthropic_api_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    openai_api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest every precedent JSON file in a directory
    Ingest {
        dir: PathBuf,
        /// Drop all indexed precedents first
        #[arg(long)]
        clear: bool,
    },
    /// Review a merged case and write the review JSON
    Review {
        case: PathBuf,
        /// Output directory for review_<case_id>_<timestamp>.json
        #[arg(long, default_value = "reviews")]
        out: PathBuf,
        /// ReviewConfig JSON; defaults apply to missing fields
        #[arg(long)]
        config: Option<PathBuf>,
        /// Case id; defaults to the report code, then the file stem
        #[arg(long)]
        case_id: Option<String>,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Review every case JSON in a directory and write metrics plus a
    /// scoring template for manual annotation
    Evaluate {
        cases_dir: PathBuf,
        /// Output directory; reviews go to <out>/reviews
        #[arg(long, default_value = "eval_results")]
        out: PathBuf,
        /// ReviewConfig JSON; defaults apply to missing fields
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Show index size
    Stats,
    /// Print issue metrics for a saved review
    Metrics { review: PathBuf },
}

#[derive(clap::Args, Debug)]
struct ModelArgs {
    /// Language-model provider
    #[arg(long, env = "TITLEWISE_PROVIDER", value_enum, default_value_t = Provider::Anthropic)]
    provider: Provider,
    /// Model name; defaults to the provider's default model
    #[arg(long, env = "TITLEWISE_MODEL")]
    model: Option<String>,
    /// Key for the chosen provider; overrides the provider's environment key
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Provider {
    Anthropic,
    Openai,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// Feature hashing; no model files needed
    Hash,
    /// ONNX sentence-transformer (requires the `onnx` feature)
    Onnx,
    /// OpenAI embeddings API (needs OPENAI_API_KEY)
    Openai,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("titlewise v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Command::Ingest { dir, clear } => {
            let store = open_store(&cli).await?;
            if *clear {
                store.clear().await.context("clearing precedent index")?;
                info!("cleared precedent index");
            }
            let report = store
                .ingest_directory(dir)
                .await
                .with_context(|| format!("ingesting {}", dir.display()))?;
            display::print_ingest_report(&report);
            let stats = store.stats().await?;
            display::print_stats(&stats);
        }
        Command::Review {
            case,
            out,
            config,
            case_id,
            model,
        } => {
            let config = load_review_config(config.as_deref())?;
            let text = std::fs::read_to_string(case)
                .with_context(|| format!("reading {}", case.display()))?;
            let merged = MergedCase::from_json(&text)
                .with_context(|| format!("parsing {}", case.display()))?;
            let case_id = case_id.clone().unwrap_or_else(|| default_case_id(&merged, case));

            let llm = build_llm(&cli, model, config.llm_timeout_ms)?;
            let model_name = llm.model_name().to_string();
            let store = Arc::new(open_store(&cli).await?);
            let pipeline = ReviewPipeline::new(store, llm, config)?;
            let cancel = cancel_on_interrupt();

            info!(case_id = %case_id, model = %model_name, "starting review");
            let review = match pipeline.review(&case_id, &merged, &cancel).await {
                Ok(review) => review,
                Err(failure) => {
                    display::print_trail(&failure.trail);
                    return Err(failure.into());
                }
            };

            let path = write_review(&review, out)?;
            display::print_review(&review);
            display::print_metrics(&review.metrics());
            println!("\nSaved {}", path.display());
        }
        Command::Evaluate {
            cases_dir,
            out,
            config,
            model,
        } => {
            let config = load_review_config(config.as_deref())?;
            let files = evaluate::case_files(cases_dir)?;
            let llm = build_llm(&cli, model, config.llm_timeout_ms)?;
            let store = Arc::new(open_store(&cli).await?);
            let pipeline = ReviewPipeline::new(store, llm, config)?;
            let cancel = cancel_on_interrupt();

            info!(cases = files.len(), dir = %cases_dir.display(), "starting evaluation");
            let evaluation = evaluate::run(&pipeline, &files, &out.join("reviews"), &cancel).await?;
            let summary = evaluate::summarize(&evaluation, chrono::Utc::now());
            let (metrics_path, scoring_path) =
                evaluate::write_outputs(&summary, &evaluation.reviews, out)?;
            display::print_evaluation(&summary);
            println!("\nSaved {}", metrics_path.display());
            println!("Saved {}", scoring_path.display());
        }
        Command::Stats => {
            let store = open_store(&cli).await?;
            display::print_stats(&store.stats().await?);
        }
        Command::Metrics { review } => {
            let text = std::fs::read_to_string(review)
                .with_context(|| format!("reading {}", review.display()))?;
            let review: ReviewObject =
                serde_json::from_str(&text).context("parsing review JSON")?;
            display::print_metrics(&review.metrics());
        }
    }
    Ok(())
}

async fn open_store(cli: &Cli) -> anyhow::Result<PrecedentStore> {
    let embedder: Arc<dyn Embed> = match cli.embedder {
        EmbedderKind::Hash => Arc::new(HashEmbedder::new(DEFAULT_HASH_DIM)),
        EmbedderKind::Onnx => load_onnx(&cli.model_dir)?,
        EmbedderKind::Openai => {
            let api_key = cli
                .openai_api_key
                .clone()
                .context("OPENAI_API_KEY is not set (or pass --openai-api-key)")?;
            let config = OpenAiConfig {
                model: cli.embedding_model.clone(),
                ..OpenAiConfig::new(api_key)
            };
            Arc::new(OpenAiEmbedder::new(config).context("building OpenAI embedder")?)
        }
    };
    if let Some(parent) = cli.db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let index = LanceIndex::open(&cli.db, embedder.dim())
        .await
        .with_context(|| format!("opening precedent index at {}", cli.db.display()))?;
    Ok(PrecedentStore::new(Arc::new(index), embedder))
}

#[cfg(feature = "onnx")]
fn load_onnx(model_dir: &Path) -> anyhow::Result<Arc<dyn Embed>> {
    let embedder = titlewise_ai::Embedder::load(model_dir)
        .with_context(|| format!("loading embedding model from {}", model_dir.display()))?;
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(_model_dir: &Path) -> anyhow::Result<Arc<dyn Embed>> {
    anyhow::bail!("this build has no ONNX support; rebuild with `--features onnx`")
}

/// The chosen provider's client. `--api-key` wins over the provider's own
/// key (ANTHROPIC_API_KEY or OPENAI_API_KEY).
fn build_llm(cli: &Cli, args: &ModelArgs, timeout_ms: u64) -> anyhow::Result<Arc<dyn LanguageModel>> {
    let timeout = Duration::from_millis(timeout_ms);
    match args.provider {
        Provider::Anthropic => {
            let api_key = args
                .api_key
                .clone()
                .or_else(|| cli.anthropic_api_key.clone())
                .context("ANTHROPIC_API_KEY is not set (or pass --api-key)")?;
            let config = ClaudeConfig {
                model: args.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                timeout,
                ..ClaudeConfig::new(api_key)
            };
            Ok(Arc::new(ClaudeClient::new(config).context("building Claude client")?))
        }
        Provider::Openai => {
            let api_key = args
                .api_key
                .clone()
                .or_else(|| cli.openai_api_key.clone())
                .context("OPENAI_API_KEY is not set (or pass --api-key)")?;
            let config = OpenAiConfig {
                model: args.model.clone().unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                timeout,
                ..OpenAiConfig::new(api_key)
            };
            Ok(Arc::new(OpenAiClient::new(config).context("building OpenAI client")?))
        }
    }
}

fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling review");
            on_interrupt.cancel();
        }
    });
    cancel
}

fn load_review_config(path: Option<&Path>) -> anyhow::Result<ReviewConfig> {
    let Some(path) = path else {
        return Ok(ReviewConfig::default());
    };
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: ReviewConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing review config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// The report's case code, else the input file stem.
fn default_case_id(case: &MergedCase, path: &Path) -> String {
    case.report_json
        .as_ref()
        .and_then(|r| r.code.as_deref())
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "case".to_string())
}

fn review_file_name(review: &ReviewObject) -> String {
    let safe_id: String = review
        .case_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!(
        "review_{safe_id}_{}.json",
        review.timestamp.format("%Y%m%d_%H%M%S")
    )
}

fn write_review(review: &ReviewObject, out_dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let path = out_dir.join(review_file_name(review));
    let json = serde_json::to_string_pretty(review)?;
    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
