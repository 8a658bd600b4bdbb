use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::Level;
use vault_search_retriever::config::{DEFAULT_DATA_FILE, DataStore, JsonFileStore, Settings};
use vault_search_retriever::retrieval::{
    AdapterRegistry, SearchView, TracingNotifier, VaultDirectory, VaultSearch, WATCH_DEBOUNCE,
};
use vault_search_retriever::storage::SearchMatch;

/// Semantic search over a vault of Markdown notes.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Vault directory to index
    #[arg(long, default_value = ".")]
    vault: PathBuf,

    /// Settings and sync-status file (default: <vault>/.vault-search.json)
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Update settings, rebuild the adapters and index anything not yet indexed
    Configure(ConfigureArgs),
    /// Index the vault into the configured vector store
    Index {
        /// Re-embed every document even if the store is already up to date
        #[arg(long)]
        force: bool,
    },
    /// Search the vault
    Search {
        /// Natural-language query
        query: String,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Index, then keep the index in sync with file changes until Ctrl-C
    Watch,
    /// Read queries from stdin and print results as they arrive
    Interactive,
    /// Show configuration and per-store sync status
    Status {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

/// Settings fields; an empty value clears the field.
#[derive(ClapArgs, Debug)]
struct ConfigureArgs {
    /// OpenAI API key
    #[arg(long)]
    provider_key: Option<String>,
    /// Embedding model name
    #[arg(long)]
    model: Option<String>,
    /// OpenAI-compatible API root
    #[arg(long)]
    base_url: Option<String>,
    /// Zilliz cluster endpoint
    #[arg(long)]
    store_url: Option<String>,
    /// Zilliz collection name
    #[arg(long)]
    collection: Option<String>,
    /// Zilliz API key
    #[arg(long)]
    store_key: Option<String>,
    /// Local SQLite vector store, used when Zilliz is not configured
    #[arg(long)]
    local_store: Option<String>,
    /// Indexed file extensions (comma-separated)
    #[arg(long, value_delimiter = ',')]
    extensions: Option<Vec<String>>,
}

impl ConfigureArgs {
    fn apply(self, mut settings: Settings) -> Settings {
        fn optional(value: String) -> Option<String> {
            if value.trim().is_empty() {
                None
            } else {
                Some(value)
            }
        }

        if let Some(key) = self.provider_key {
            settings.embedding_provider_key = key;
        }
        if let Some(model) = self.model {
            settings.embedding_model = optional(model);
        }
        if let Some(url) = self.base_url {
            settings.embedding_base_url = optional(url);
        }
        if let Some(url) = self.store_url {
            settings.vector_store_url = url;
        }
        if let Some(collection) = self.collection {
            settings.vector_store_collection_name = collection;
        }
        if let Some(key) = self.store_key {
            settings.vector_store_api_key = key;
        }
        if let Some(path) = self.local_store {
            settings.local_store_path = optional(path).map(PathBuf::from);
        }
        if let Some(extensions) = self.extensions {
            settings.indexed_extensions = extensions
                .into_iter()
                .filter(|ext| !ext.trim().is_empty())
                .collect();
        }
        settings
    }
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    // Watch events carry paths under the watched root, which must match the vault root
    let vault = args
        .vault
        .canonicalize()
        .with_context(|| format!("Vault directory {} not found", args.vault.display()))?;
    let data_file = args
        .data_file
        .clone()
        .unwrap_or_else(|| vault.join(DEFAULT_DATA_FILE));
    let service = open_service(&vault, &data_file).await?;

    match args.command {
        Commands::Configure(update) => {
            let settings = update.apply(service.settings().await);
            let outcome = service.reconfigure(settings).await?;
            println!("Settings saved to {}", data_file.display());
            println!("Indexing: {outcome}");
            service.shutdown().await?;
        }
        Commands::Index { force } => {
            let outcome = service.reindex(force).await?;
            println!("Indexing: {outcome}");
            service.shutdown().await?;
        }
        Commands::Search { query, format } => {
            let matches = service.search(&query).await;
            print_matches(&matches, &format)?;
        }
        Commands::Watch => {
            let watcher = service.watch(&vault, WATCH_DEBOUNCE)?;
            let interrupted = tokio::select! {
                outcome = service.start() => {
                    println!("Indexing: {}", outcome?);
                    println!("Watching {} (Ctrl-C to stop)", vault.display());
                    false
                }
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    true
                }
            };
            if !interrupted {
                tokio::signal::ctrl_c().await?;
            }
            watcher.stop().await;
            let stopped = service.shutdown().await?;
            if stopped > 0 {
                println!("Indexing interrupted; it will resume on the next start");
            }
        }
        Commands::Interactive => {
            interactive(&service).await?;
        }
        Commands::Status { format } => {
            print_status(&service, &data_file, &format).await?;
        }
    }

    Ok(())
}

async fn open_service(vault: &Path, data_file: &Path) -> anyhow::Result<VaultSearch> {
    let data_store = Arc::new(JsonFileStore::new(data_file));
    let settings = data_store.load().await?.settings;
    let documents =
        VaultDirectory::new(vault, &settings.indexed_extensions).exclude(data_file);

    let service = VaultSearch::open(
        data_store,
        Arc::new(documents),
        Arc::new(TracingNotifier),
        Arc::new(AdapterRegistry::new(vault)),
    )
    .await?;
    Ok(service)
}

fn print_matches(matches: &[SearchMatch], format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(matches)?);
        }
        OutputFormat::Full => {
            for (rank, hit) in matches.iter().enumerate() {
                println!("#{} {}", rank + 1, hit.filename);
                println!("{}", hit.matching_text);
                println!();
            }
        }
        OutputFormat::Summary => {
            if matches.is_empty() {
                println!("No matches");
            }
            for (rank, hit) in matches.iter().enumerate() {
                let preview: String = hit
                    .matching_text
                    .lines()
                    .find(|line| !line.trim().is_empty())
                    .unwrap_or_default()
                    .chars()
                    .take(80)
                    .collect();
                println!("{:>2}. {} | {}", rank + 1, hit.filename, preview);
            }
        }
    }
    Ok(())
}

async fn interactive(service: &VaultSearch) -> anyhow::Result<()> {
    let session = service.search_session();
    let mut updates = session.subscribe();

    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let view = updates.borrow_and_update().clone();
            match view {
                SearchView::Empty => {}
                SearchView::Searching { query } => eprintln!("Searching for {query:?}..."),
                SearchView::Results { query, matches } => {
                    println!("Results for {query:?}:");
                    if let Err(e) = print_matches(&matches, &OutputFormat::Summary) {
                        eprintln!("Error: {e}");
                    }
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        session.on_input(&line);
    }

    // Let the last query finish before exiting
    tokio::time::sleep(vault_search_retriever::retrieval::SEARCH_DEBOUNCE * 2).await;
    drop(session);
    printer.abort();
    Ok(())
}

async fn print_status(
    service: &VaultSearch,
    data_file: &Path,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let settings = service.settings().await;
    let adapters = service.adapters().await;
    let identity = adapters.identity();
    let statuses = service.context().state.statuses().await;

    if *format == OutputFormat::Json {
        let status = serde_json::json!({
            "dataFile": data_file,
            "settings": {
                "embeddingProviderKey": Settings::describe_secret(&settings.embedding_provider_key),
                "embeddingModel": settings.embedding_model,
                "embeddingBaseUrl": settings.embedding_base_url,
                "vectorStoreUrl": settings.vector_store_url,
                "vectorStoreCollectionName": settings.vector_store_collection_name,
                "vectorStoreApiKey": Settings::describe_secret(&settings.vector_store_api_key),
                "localStorePath": settings.local_store_path,
                "indexedExtensions": settings.indexed_extensions,
            },
            "embedder": adapters.embedder.as_ref().map(|e| e.adapter_name().to_string()),
            "store": identity,
            "ready": adapters.ready().is_some(),
            "statuses": statuses,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Data file: {}", data_file.display());
    println!();
    println!("Settings:");
    println!(
        "  Embedding provider key: {}",
        Settings::describe_secret(&settings.embedding_provider_key)
    );
    if let Some(model) = &settings.embedding_model {
        println!("  Embedding model: {model}");
    }
    if let Some(base_url) = &settings.embedding_base_url {
        println!("  Embedding base URL: {base_url}");
    }
    println!("  Zilliz URL: {}", or_unset(&settings.vector_store_url));
    println!(
        "  Zilliz collection: {}",
        or_unset(&settings.vector_store_collection_name)
    );
    println!(
        "  Zilliz API key: {}",
        Settings::describe_secret(&settings.vector_store_api_key)
    );
    match &settings.local_store_path {
        Some(path) => println!("  Local store: {}", path.display()),
        None => println!("  Local store: <unset>"),
    }
    println!("  Indexed extensions: {}", settings.indexed_extensions.join(", "));
    println!();

    println!("Adapters:");
    match &adapters.embedder {
        Some(embedder) => println!("  Embedder: {}", embedder.adapter_name()),
        None => println!("  Embedder: not configured"),
    }
    match &identity {
        Some(identity) => println!("  Vector store: {identity}"),
        None => println!("  Vector store: not configured"),
    }
    println!(
        "  Ready to index: {}",
        if adapters.ready().is_some() { "yes" } else { "no" }
    );
    println!();

    println!("Sync status:");
    if statuses.is_empty() {
        println!("  (no stores indexed yet)");
    }
    for (store, status) in &statuses {
        let marker = if identity.as_ref() == Some(store) { " (active)" } else { "" };
        println!("  {store}: {status}{marker}");
    }
    Ok(())
}

fn or_unset(value: &str) -> &str {
    if value.trim().is_empty() {
        "<unset>"
    } else {
        value
    }
}
