/*
newsdesk - command line entrypoint.
Runs the source filter, citation renumbering, source summaries, sector rotation and an
interactive article chat.
*/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use newsdesk::error::ChatError;
use newsdesk::llm::{self, LlmProvider, LlmTask};
use newsdesk::sectors::{SectorRotation, SectorTable};
use newsdesk::sessions::chat::{ChatService, SessionCreateRequest};
use newsdesk::sessions::SessionStore;
use newsdesk::sources::{self, upstream, SourceCandidate, SourceFilter};

const DEFAULT_ROTATION_STATE: &str = "data/sector_rotation.json";

#[derive(Parser, Debug)]
#[command(name = "newsdesk", about = "Source filtering, sector rotation and article chat")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter and renumber source candidates (JSON array or upstream search response)
    Filter {
        #[arg(value_name = "FILE")]
        input: PathBuf,
        /// Max candidates taken from an upstream response
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Keep cited sources only and renumber [n] markers in an article
    Renumber {
        #[arg(long, value_name = "FILE")]
        article: PathBuf,
        #[arg(long, value_name = "FILE")]
        sources: PathBuf,
        /// How many sources were given to the writer model (defaults to all)
        #[arg(long)]
        provided: Option<usize>,
    },
    /// Ask the search model for articles on a topic and filter them
    Search {
        topic: String,
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
    /// Write an article on a topic from trusted and uncertain sources
    Summarize {
        topic: String,
        /// Source candidates to use instead of asking the search model
        #[arg(long, value_name = "FILE")]
        sources: Option<PathBuf>,
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
    /// Sector rotation and categorization
    Sector {
        #[command(subcommand)]
        action: SectorAction,
    },
    /// Chat about an article on stdin/stdout
    Chat {
        #[arg(long)]
        article_id: String,
        #[arg(long)]
        title: Option<String>,
        /// File holding the article text
        #[arg(long, value_name = "FILE")]
        content: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum SectorAction {
    /// Print the next sector and its tags, advancing the rotation
    Next,
    /// Print the rotation state
    State,
    /// Rewind the rotation
    Reset,
    /// Print the sector a query belongs to
    Categorize { query: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays machine-readable
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config = load_config(args.config.as_deref()).await?;

    match args.command {
        Command::Filter { input, limit } => run_filter(&config, &input, limit).await,
        Command::Renumber {
            article,
            sources,
            provided,
        } => run_renumber(&article, &sources, provided).await,
        Command::Search { topic, count } => run_search(&config, &topic, count).await,
        Command::Summarize {
            topic,
            sources,
            count,
        } => run_summarize(&config, &topic, sources.as_deref(), count).await,
        Command::Sector { action } => run_sector(&config, action).await,
        Command::Chat {
            article_id,
            title,
            content,
        } => run_chat(&config, article_id, title, content).await,
    }
}

async fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = match explicit {
        Some(p) if !p.exists() => {
            error!(path = ?p, "specified config file not found");
            anyhow::bail!("Config file not found: {}", p.display());
        }
        Some(p) => Some(p.to_path_buf()),
        None => {
            let p = PathBuf::from("config.toml");
            p.exists().then_some(p)
        }
    };

    let config = Config::load_with_defaults(
        default_path.exists().then_some(default_path.as_path()),
        override_path.as_deref(),
    )
    .await?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", out);
    Ok(())
}

/// Candidates from a JSON array or a raw upstream search response
async fn read_candidates(input: &Path, limit: usize) -> Result<Vec<SourceCandidate>> {
    let data = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let value: serde_json::Value = serde_json::from_str(&data).context("Input is not valid JSON")?;

    if value.is_array() {
        serde_json::from_value(value).context("Input array is not a list of source candidates")
    } else {
        upstream::parse_search_results(&data, limit)
    }
}

async fn run_filter(config: &Config, input: &Path, limit: usize) -> Result<()> {
    let candidates = read_candidates(input, limit).await?;
    let candidates_count = candidates.len();
    let sources = sources::validate_candidates(candidates)?;
    let filter = SourceFilter::from_config(&config.sources);
    let filtered = filter.filter_and_renumber(sources);
    info!(candidates = candidates_count, kept = filtered.len(), "filter complete");
    print_json(&filtered)
}

async fn run_renumber(article: &Path, sources_path: &Path, provided: Option<usize>) -> Result<()> {
    let text = tokio::fs::read_to_string(article)
        .await
        .with_context(|| format!("Failed to read {}", article.display()))?;
    let data = tokio::fs::read_to_string(sources_path)
        .await
        .with_context(|| format!("Failed to read {}", sources_path.display()))?;
    let candidates: Vec<SourceCandidate> =
        serde_json::from_str(&data).context("Sources file is not a list of source candidates")?;
    let sources = sources::validate_candidates(candidates)?;

    let report = sources::renumber_citations(&text, &sources, provided.unwrap_or(sources.len()));
    print_json(&report)
}

fn build_provider(config: &Config, task: LlmTask) -> Result<Arc<dyn LlmProvider>> {
    let llm_config = config
        .llm
        .as_ref()
        .context("No [llm] section in configuration")?;
    let provider = llm::from_config(llm_config, task)?;
    let model = llm::endpoint_config(llm_config, task)
        .and_then(|c| c.model.as_deref())
        .unwrap_or("unknown");
    info!(?task, model, "LLM provider initialized");
    Ok(Arc::from(provider))
}

async fn run_search(config: &Config, topic: &str, count: usize) -> Result<()> {
    let provider = build_provider(config, LlmTask::Search)?;
    let filter = SourceFilter::from_config(&config.sources);
    let found = upstream::discover_sources(provider.as_ref(), &filter, topic, count).await?;
    print_json(&found)
}

async fn run_summarize(
    config: &Config,
    topic: &str,
    sources_path: Option<&Path>,
    count: usize,
) -> Result<()> {
    let provider = build_provider(config, LlmTask::Search)?;
    let filter = SourceFilter::from_config(&config.sources);

    let found = match sources_path {
        Some(path) => {
            let candidates = read_candidates(path, count).await?;
            filter.filter_and_renumber(sources::validate_candidates(candidates)?)
        }
        None => upstream::discover_sources(provider.as_ref(), &filter, topic, count).await?,
    };

    let summary = upstream::summarize_sources(provider.as_ref(), &filter, topic, &found).await?;
    info!(
        topic,
        cited = summary.sources.len(),
        provided = summary.stats.total_sources_provided,
        "summary written"
    );
    print_json(&summary)
}

async fn run_sector(config: &Config, action: SectorAction) -> Result<()> {
    let table = SectorTable::new(config.sectors.clone());
    let state_path = config
        .rotation
        .as_ref()
        .map(|r| r.state_path.clone())
        .unwrap_or_else(|| DEFAULT_ROTATION_STATE.to_string());

    match action {
        SectorAction::Categorize { query } => {
            println!("{}", table.categorize(&query));
            Ok(())
        }
        SectorAction::Next => {
            let mut rotation = SectorRotation::load(&state_path).await?;
            rotation.initialize(&table.enabled_sectors()).await?;
            match rotation.next().await? {
                Some(sector) => print_json(&serde_json::json!({
                    "sector": sector,
                    "tags": table.sector_tags(&sector),
                })),
                None => {
                    warn!("no enabled sectors configured");
                    Ok(())
                }
            }
        }
        SectorAction::State => {
            let rotation = SectorRotation::load(&state_path).await?;
            print_json(&rotation.state())
        }
        SectorAction::Reset => {
            let mut rotation = SectorRotation::load(&state_path).await?;
            rotation.reset().await?;
            info!(path = %rotation.path().display(), "rotation reset");
            Ok(())
        }
    }
}

async fn run_chat(
    config: &Config,
    article_id: String,
    title: Option<String>,
    content: Option<PathBuf>,
) -> Result<()> {
    let provider = build_provider(config, LlmTask::Chat)?;
    let store = Arc::new(SessionStore::new());
    let service = ChatService::new(store.clone(), provider)
        .with_greeting(config.greeting().map(str::to_string));

    let article_content = match content {
        Some(path) => Some(
            tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        None => None,
    };

    let (session_id, history) = match article_content {
        Some(article_content) => {
            let opened = service.open(SessionCreateRequest {
                article_title: title.unwrap_or_else(|| article_id.clone()),
                article_id,
                article_content,
                ..Default::default()
            })?;
            (opened.session_id, opened.messages)
        }
        None => {
            let id = store.create(article_id);
            (id, Vec::new())
        }
    };

    let mut stdout = tokio::io::stdout();
    for message in &history {
        stdout
            .write_all(format!("{}: {}\n", message.role, message.content).as_bytes())
            .await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }

        match service.send(session_id, line).await {
            Ok(reply) => {
                stdout
                    .write_all(format!("assistant: {}\n", reply.reply).as_bytes())
                    .await?;
            }
            Err(ChatError::Session(e)) => {
                error!(%e, "session is no longer usable");
                stdout.write_all(b"Session expired, start a new one.\n").await?;
                break;
            }
            Err(e) => {
                warn!(%e, "chat turn failed");
                stdout.write_all(format!("error: {}\n", e).as_bytes()).await?;
            }
        }
    }

    if let Err(e) = service.close(session_id) {
        warn!(%e, "failed to close session");
    }
    let cleared = store.clear();
    info!(cleared, "chat finished");
    Ok(())
}
