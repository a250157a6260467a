//! Delve CLI - command-line interface for iterative web research
//!
//! Runs quick or reasoning/acting research, raw web research, knowledge base
//! ingestion and questions, and configuration management.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use delve_core::{
    init_logging, log_operation_error, log_operation_start, log_operation_success, performance,
    DelveConfig, GenerationOptions, LlmBackend, LoggingConfig, AUTO_LLM_PROVIDER,
};
use delve_rag::{
    create_auto_client, create_embedder, format_context_for_prompt, DelveLlmClient, Retriever,
};
use delve_research::tools::SharedRetriever;
use delve_research::{
    default_registry, DuckDuckGoClient, ResearchAssistant, WebClient, WebResearcher,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "delve")]
#[command(about = "Iterative, tool-driven web research from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a question and print a cited answer
    Research {
        /// Question or topic to research
        query: String,

        /// Use the reasoning/acting loop instead of the quick pipeline
        #[arg(long)]
        react: bool,

        /// Maximum loop iterations (reasoning/acting mode)
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Save the research session as JSON in the sessions directory
        #[arg(long)]
        save: bool,
    },

    /// Run web research only and print the raw report
    Web {
        /// Search query
        query: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a local text file or a web page to the knowledge base
    Ingest {
        /// File path or http(s) URL
        source: String,

        /// Target collection (defaults to the configured collection)
        #[arg(long)]
        collection: Option<String>,
    },

    /// Answer a question from the knowledge base
    Ask {
        /// Question to ask
        question: String,

        /// Number of documents to retrieve
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// List the research tools
    Tools,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
    /// Check the effective configuration
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, config_path) = load_config(cli.config.as_deref())?;

    let logging_config = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        config.logging.clone()
    };
    init_logging(&logging_config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting Delve CLI v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("No configuration file found, using defaults"),
    }

    let command = cli.command;
    if !matches!(command, Commands::Config { .. }) {
        config.validate().context("Invalid configuration")?;
        config
            .ensure_directories()
            .context("Cannot create Delve storage directories")?;
    }

    match command {
        Commands::Research {
            query,
            react,
            max_iterations,
            save,
        } => handle_research(&config, &query, react, max_iterations, save).await,
        Commands::Web { query, json } => handle_web(&config, &query, json).await,
        Commands::Ingest { source, collection } => {
            handle_ingest(&config, &source, collection.as_deref()).await
        }
        Commands::Ask { question, k } => handle_ask(&config, &question, k).await,
        Commands::Tools => handle_tools(&config).await,
        Commands::Config { action } => handle_config(action, cli.config.as_deref(), &config),
    }
}

/// Configuration files in search order, after an explicit `--config`
fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::config_dir().map(|d| d.join("delve").join("config.toml")),
        dirs::home_dir().map(|d| d.join(".delve.toml")),
        Some(PathBuf::from("delve.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<(DelveConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let config = DelveConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?;
        return Ok((config, Some(path.to_path_buf())));
    }

    for path in default_config_paths() {
        if path.exists() {
            let config = DelveConfig::from_file(&path)
                .with_context(|| format!("Failed to load configuration from {:?}", path))?;
            return Ok((config, Some(path)));
        }
    }

    Ok((DelveConfig::default(), None))
}

fn web_researcher(config: &DelveConfig) -> anyhow::Result<Arc<WebResearcher>> {
    let client = DuckDuckGoClient::new(&config.web)?;
    Ok(Arc::new(WebResearcher::new(
        Arc::new(client),
        config.web.clone(),
    )))
}

async fn knowledge_base(config: &DelveConfig) -> anyhow::Result<SharedRetriever> {
    let embedder = create_embedder(&config.embedding)
        .await
        .context("Failed to create embedder")?;
    Ok(Arc::new(RwLock::new(Retriever::new(config, embedder))))
}

async fn llm_backend(config: &DelveConfig) -> anyhow::Result<Arc<dyn LlmBackend>> {
    let client = if config.llm.provider == AUTO_LLM_PROVIDER {
        create_auto_client(&config.llm)
            .await
            .context("No LLM provider could be detected; set an API key or run Ollama")?
    } else {
        DelveLlmClient::new(config.llm.clone())
            .await
            .context("Failed to create LLM client; check llm.provider and API keys")?
    };
    Ok(Arc::new(client))
}

async fn handle_research(
    config: &DelveConfig,
    query: &str,
    react: bool,
    max_iterations: Option<usize>,
    save: bool,
) -> anyhow::Result<()> {
    log_operation_start!("research", query = %query, react);

    let llm = llm_backend(config).await?;
    let web = web_researcher(config)?;
    let knowledge = knowledge_base(config).await?;
    let assistant = ResearchAssistant::new(llm, web, Some(knowledge), config.clone());

    println!("🔎 Researching: {}", query);

    let saved = if react {
        let context = performance::measure_async(
            "react_research",
            assistant.react_research(query, max_iterations),
        )
        .await
            .map_err(|e| {
                log_operation_error!("research", e, query = %query);
                e
            })?;

        println!("\n{}\n", context.final_answer.as_deref().unwrap_or_default());
        println!(
            "📊 {} iterations, {} tool calls, {} findings{}",
            context.iterations.len(),
            context.tools_used.len(),
            context.findings.len(),
            if context.completed { "" } else { " (iteration limit reached)" }
        );

        log_operation_success!("research", iterations = context.iterations.len());
        save.then(|| serde_json::to_string_pretty(&context)).transpose()?
    } else {
        if max_iterations.is_some() {
            warn!("--max-iterations only applies with --react");
        }
        let answer = performance::measure_async("quick_research", assistant.research(query))
            .await
            .map_err(|e| {
                log_operation_error!("research", e, query = %query);
                e
            })?;

        println!("\n{}\n", answer.answer);
        if !answer.sources.is_empty() {
            println!("📚 Sources:");
            for (i, source) in answer.sources.iter().enumerate() {
                println!("  [{}] {} - {}", i + 1, source.title, source.url);
            }
        }

        log_operation_success!("research", sources = answer.sources.len());
        save.then(|| serde_json::to_string_pretty(&answer)).transpose()?
    };

    if let Some(json) = saved {
        let path = save_session(config, &json).await?;
        println!("💾 Session saved to {:?}", path);
    }
    Ok(())
}

async fn save_session(config: &DelveConfig, json: &str) -> anyhow::Result<PathBuf> {
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let path = config
        .storage
        .sessions_path()
        .join(format!("research_{}.json", stamp));
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write session file {:?}", path))?;
    Ok(path)
}

async fn handle_web(config: &DelveConfig, query: &str, json: bool) -> anyhow::Result<()> {
    log_operation_start!("web_research", query = %query);
    let researcher = web_researcher(config)?;
    let report = performance::measure_async("web_research", researcher.research(query)).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("🔎 {} search results for: {}", report.search_results.len(), query);
        for (i, result) in report.search_results.iter().enumerate() {
            println!("  [{}] {}\n      {}", i + 1, result.title, result.url);
        }
        println!("\n📄 {} pages read:", report.content.len());
        for (i, item) in report.content.iter().enumerate() {
            println!(
                "  [{}] {} ({} chars)\n      {}",
                i + 1,
                item.title,
                item.content.chars().count(),
                item.url
            );
        }
    }

    log_operation_success!(
        "web_research",
        results = report.search_results.len(),
        content = report.content.len()
    );
    Ok(())
}

async fn handle_ingest(
    config: &DelveConfig,
    source: &str,
    collection: Option<&str>,
) -> anyhow::Result<()> {
    log_operation_start!("ingest", source = %source);
    let knowledge = knowledge_base(config).await?;
    let mut retriever = knowledge.write().await;

    if let Some(name) = collection {
        if !retriever.load_collection(name) {
            info!(collection = name, "Creating new collection");
        }
    }

    let chunks = if source.starts_with("http://") || source.starts_with("https://") {
        let client = DuckDuckGoClient::new(&config.web)?;
        let text = client
            .fetch_content(source)
            .await
            .with_context(|| format!("Failed to fetch {}", source))?;
        retriever
            .add_web_content(&text, source, None, collection)
            .await?
    } else {
        let path = Path::new(source);
        if !path.is_file() {
            bail!("{} is neither a URL nor a readable file", source);
        }
        retriever.add_file(path, collection).await?
    };

    let target = collection.unwrap_or(retriever.default_collection());
    println!("✅ Indexed {} chunks into collection '{}'", chunks, target);
    log_operation_success!("ingest", chunks);
    Ok(())
}

async fn handle_ask(config: &DelveConfig, question: &str, k: Option<usize>) -> anyhow::Result<()> {
    log_operation_start!("ask", question = %question);
    let knowledge = knowledge_base(config).await?;
    let k = k.unwrap_or(config.retrieval.top_k);

    let results = knowledge.read().await.query(question, k).await?;
    if results.is_empty() {
        println!("📭 The knowledge base is empty. Add content with `delve ingest` or `delve research` first.");
        return Ok(());
    }

    let prompt = format!(
        "{}Question: {}\n\nAnswer the question using only the documents above. \
         Cite the source of each fact and say so if the documents do not contain the answer.",
        format_context_for_prompt(&results),
        question
    );
    let llm = llm_backend(config).await?;
    let options = GenerationOptions::default().with_temperature(config.llm.temperature);
    let answer = llm.query(&prompt, &options).await?;

    println!("\n{}\n", answer);
    println!("📚 Retrieved documents:");
    for (i, (document, score)) in results.iter().enumerate() {
        println!(
            "  [{}] {:.3} {}",
            i + 1,
            score,
            document
                .url()
                .or(document.doc_id.as_deref())
                .unwrap_or("unknown")
        );
    }

    log_operation_success!("ask", documents = results.len());
    Ok(())
}

async fn handle_tools(config: &DelveConfig) -> anyhow::Result<()> {
    let web = web_researcher(config)?;
    let knowledge = knowledge_base(config).await?;
    let registry = default_registry(web, Some(knowledge));

    println!("🧰 {} research tools:", registry.len());
    for tool in registry.list() {
        println!("  {:<22} {}", tool.name, tool.description);
    }
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    explicit: Option<&Path>,
    config: &DelveConfig,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { force } => {
            let path = match explicit {
                Some(path) => path.to_path_buf(),
                None => default_config_paths()
                    .into_iter()
                    .next()
                    .context("Cannot determine a configuration directory; pass --config")?,
            };
            if path.exists() && !force {
                bail!("{:?} already exists; use --force to overwrite", path);
            }
            DelveConfig::default().save_to_file(&path)?;
            println!("✅ Configuration initialized at: {:?}", path);
            println!("📝 Edit the file to choose an LLM provider and add API keys.");
        }
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(config)?);
        }
        ConfigAction::Validate => match config.validate() {
            Ok(()) => println!("✅ Configuration is valid"),
            Err(e) => {
                println!("❌ Configuration validation failed: {}", e);
                return Err(e.into());
            }
        },
    }
    Ok(())
}
