//! lurekb CLI - operate the fishing knowledge base

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use lurekb_core::config::Config;
use lurekb_core::knowledge::{AddOptions, KnowledgeSource, KnowledgeStore};
use lurekb_core::ledger::DEFAULT_AUTHOR;
use lurekb_core::retrieval::{RetrievalEngine, SearchHit};
use lurekb_core::schema::{Category, SchemaRegistry};
use lurekb_core::storage::JsonFileRepository;
use serde_json::Value;
use tracing::debug;

#[derive(Parser)]
#[command(name = "lurekb")]
#[command(author, version, about = "Versioned fishing knowledge base", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Verdict {
    Positive,
    Negative,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum SearchMode {
    #[default]
    Hybrid,
    Keyword,
    Semantic,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a record, or merge it into an existing item with the same name
    Add {
        /// Category (fish, lure, rig, spot_type, spot, equipment, technique)
        category: String,
        /// Record as a JSON object
        #[arg(long, conflicts_with = "file")]
        json: Option<String>,
        /// File holding a JSON object or an array of objects
        #[arg(long)]
        file: Option<PathBuf>,
        /// Where the knowledge came from
        #[arg(short, long, default_value = "manual")]
        source: String,
        /// Override the source's default confidence
        #[arg(long)]
        confidence: Option<f64>,
        /// Mark as verified
        #[arg(long)]
        verified: bool,
        /// Note for the version history
        #[arg(long)]
        note: Option<String>,
        /// Tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Author recorded in the version history
        #[arg(long, default_value = DEFAULT_AUTHOR)]
        author: String,
    },

    /// Record user feedback on an item
    Feedback {
        category: String,
        name: String,
        verdict: Verdict,
    },

    /// Mark an item as verified
    Verify {
        category: String,
        name: String,
        /// Who verified it
        #[arg(long, default_value = DEFAULT_AUTHOR)]
        by: String,
    },

    /// Search the knowledge base
    Search {
        query: String,
        /// Restrict to one category
        #[arg(short, long)]
        category: Option<String>,
        /// Number of results (defaults to retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        #[arg(short, long, default_value = "hybrid")]
        mode: SearchMode,
    },

    /// Show the version history of an item
    History { category: String, name: String },

    /// Show knowledge base statistics
    Stats,

    /// List items below a confidence threshold or not yet verified
    Audit {
        /// Confidence threshold (defaults to retrieval.audit_threshold)
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Write timestamped copies of the knowledge and history files
    Backup,

    /// Rebuild the semantic index
    Reindex {
        /// Re-embed every item, even unchanged ones
        #[arg(short, long)]
        force: bool,
    },

    /// Give items stored without metadata a metadata block
    Migrate,

    /// Show the field template of a category, or list categories
    Schema { category: Option<String> },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration
    List,
    /// List the settable keys
    Keys,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialise logging: {}", e);
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        report_error(&e);
        std::process::exit(1);
    }
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("lurekb=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn report_error(error: &anyhow::Error) {
    match error.downcast_ref::<lurekb_core::Error>() {
        Some(core) => {
            eprintln!("Error [{}]: {}", core.code(), core);
            if let Some(suggestion) = core.suggestion() {
                eprintln!("  Try: {}", suggestion);
            }
        }
        None => eprintln!("Error: {:#}", error),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Add {
            category,
            json,
            file,
            source,
            confidence,
            verified,
            note,
            tags,
            author,
        } => {
            let category: Category = category.parse()?;
            let source: KnowledgeSource = source.parse()?;
            let mut options = AddOptions::new()
                .with_verified(verified)
                .with_tags(tags)
                .with_author(author);
            if let Some(confidence) = confidence {
                options = options.with_confidence(confidence);
            }
            if let Some(note) = note {
                options = options.with_note(note);
            }
            let input = read_record_input(json, file).await?;
            let config = Config::load()?;
            let store = open_store(&config).await?;
            cmd_add(&store, input, category, source, &options, format, quiet).await
        }

        Commands::Feedback {
            category,
            name,
            verdict,
        } => {
            let category: Category = category.parse()?;
            let store = open_store(&Config::load()?).await?;
            let outcome = store
                .submit_feedback(category, &name, matches!(verdict, Verdict::Positive))
                .await?;
            emit(format, quiet, &outcome, || outcome.to_string())
        }

        Commands::Verify { category, name, by } => {
            let category: Category = category.parse()?;
            let store = open_store(&Config::load()?).await?;
            let outcome = store.verify(category, &name, &by).await?;
            emit(format, quiet, &outcome, || outcome.to_string())
        }

        Commands::Search {
            query,
            category,
            top_k,
            mode,
        } => {
            let category = category.map(|c| c.parse::<Category>()).transpose()?;
            let config = Config::load()?;
            let store = open_store(&config).await?;
            let engine = open_engine(&config, store).await?;
            let top_k = top_k.unwrap_or(config.retrieval.top_k);
            cmd_search(&engine, &query, category, top_k, mode, format).await
        }

        Commands::History { category, name } => {
            let category: Category = category.parse()?;
            let store = open_store(&Config::load()?).await?;
            let history = store.history(category, &name).await;
            if history.is_empty() {
                return Err(lurekb_core::Error::not_found(category.as_str(), &name).into());
            }
            emit(format, quiet, &history, || {
                history
                    .iter()
                    .map(|record| {
                        format!(
                            "v{}  {}  {}  confidence {:.2}  {}",
                            record.version,
                            record.changed_at.format("%Y-%m-%d %H:%M:%S"),
                            record.changed_by,
                            record.meta.confidence,
                            record.changes
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }

        Commands::Stats => {
            let store = open_store(&Config::load()?).await?;
            let stats = store.stats().await;
            emit(format, false, &stats, || stats.to_string())
        }

        Commands::Audit { threshold } => {
            let config = Config::load()?;
            let threshold = threshold.unwrap_or(config.retrieval.audit_threshold);
            let store = open_store(&config).await?;
            let entries = store.low_confidence_items(threshold).await;
            emit(format, false, &entries, || {
                if entries.is_empty() {
                    return format!("No items below confidence {:.2}", threshold);
                }
                let mut lines = vec![format!(
                    "{} items need review (threshold {:.2}):",
                    entries.len(),
                    threshold
                )];
                for entry in &entries {
                    lines.push(format!(
                        "  [{}] {}  confidence {:.2}  {}  {}{}",
                        entry.category,
                        entry.name,
                        entry.confidence,
                        entry.source,
                        entry.status,
                        if entry.verified { "" } else { "  unverified" }
                    ));
                }
                lines.join("\n")
            })
        }

        Commands::Backup => {
            let store = open_store(&Config::load()?).await?;
            let report = store.backup().await?;
            emit(format, quiet, &report, || report.to_string())
        }

        Commands::Reindex { force } => {
            let config = Config::load()?;
            let store = open_store(&config).await?;
            let engine = open_engine(&config, store).await?;
            let report = engine.rebuild_index(force).await?;
            emit(format, quiet, &report, || report.to_string())
        }

        Commands::Migrate => {
            let store = open_store(&Config::load()?).await?;
            let migrated = store.migrate_legacy().await?;
            emit(format, quiet, &serde_json::json!({ "migrated": migrated }), || {
                if migrated == 0 {
                    "Nothing to migrate".to_string()
                } else {
                    format!("Migrated {} items", migrated)
                }
            })
        }

        Commands::Schema { category } => cmd_schema(category.as_deref(), format),

        Commands::Config { action } => cmd_config(action, quiet),
    }
}

/// Print `value` as JSON, or the text rendering unless quiet
fn emit<T: serde::Serialize>(
    format: OutputFormat,
    quiet: bool,
    value: &T,
    text: impl FnOnce() -> String,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text if !quiet => println!("{}", text()),
        OutputFormat::Text => {}
    }
    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<KnowledgeStore>> {
    let repository = JsonFileRepository::new(
        config.storage.knowledge_path()?,
        config.storage.ledger_path()?,
    );
    debug!(path = %repository.knowledge_path().display(), "Opening knowledge store");
    let store = KnowledgeStore::open(Arc::new(repository), SchemaRegistry::builtin()).await?;
    Ok(Arc::new(store))
}

async fn open_engine(
    config: &Config,
    store: Arc<KnowledgeStore>,
) -> anyhow::Result<RetrievalEngine> {
    let mut engine = RetrievalEngine::new(store).with_config(config.retrieval.hybrid_config());
    if let Some(embedder) = config.embedding.build_embedder()? {
        engine = engine.with_embedder(Arc::new(embedder));
    }
    Ok(engine.with_index_path(config.storage.index_path()?).await?)
}

async fn read_record_input(json: Option<String>, file: Option<PathBuf>) -> anyhow::Result<Value> {
    let raw = match (json, file) {
        (Some(json), _) => json,
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => bail!("Provide a record with --json or --file"),
    };
    serde_json::from_str(&raw).context("Record input is not valid JSON")
}

async fn cmd_add(
    store: &KnowledgeStore,
    input: Value,
    category: Category,
    source: KnowledgeSource,
    options: &AddOptions,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    match input {
        Value::Array(records) => {
            let report = store.add_batch(&records, category, source, options).await?;
            emit(format, quiet, &report, || report.to_string())
        }
        record => {
            let outcome = store.add_or_merge(&record, category, source, options).await?;
            emit(format, quiet, &outcome, || outcome.to_string())
        }
    }
}

async fn cmd_search(
    engine: &RetrievalEngine,
    query: &str,
    category: Option<Category>,
    top_k: usize,
    mode: SearchMode,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let hits = match mode {
        SearchMode::Hybrid => engine.hybrid_search(query, category, top_k).await?,
        SearchMode::Keyword => engine.keyword_search(query, category, top_k).await,
        SearchMode::Semantic => engine.semantic_search(query, category, top_k).await?,
    };

    emit(format, false, &hits, || render_hits(query, &hits))
}

fn render_hits(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No results for '{}'", query);
    }
    let mut lines = Vec::with_capacity(hits.len() * 2);
    for (rank, hit) in hits.iter().enumerate() {
        let meta = &hit.item.meta;
        lines.push(format!(
            "{}. [{}] {}  (score {:.3}, {})",
            rank + 1,
            hit.category,
            hit.item.name(),
            hit.score,
            hit.kind
        ));
        let mut detail = format!(
            "   v{}, confidence {:.2}, {}",
            meta.version, meta.confidence, meta.status
        );
        if meta.verified {
            detail.push_str(", verified");
        }
        if !hit.item.aliases().is_empty() {
            detail.push_str(&format!(", aka {}", hit.item.aliases().join(", ")));
        }
        lines.push(detail);
    }
    lines.join("\n")
}

fn cmd_schema(category: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
    let registry = SchemaRegistry::builtin();
    match category {
        Some(category) => {
            let category: Category = category.parse()?;
            let template = registry
                .template(category)
                .with_context(|| format!("No schema registered for {}", category))?;
            println!("{}", serde_json::to_string_pretty(&template)?);
        }
        None => {
            let categories: Vec<Category> = registry.categories().collect();
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&categories)?);
            } else {
                println!("Categories:");
                for category in categories {
                    println!("  {:<12}{}", category.as_str(), category.label());
                }
            }
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Keys => {
            for key in Config::keys() {
                println!("{}", key);
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
