//! # solr-fusion CLI
//!
//! The `solr-fusion` binary runs searches, suggestions and index
//! maintenance against the backends described in a TOML configuration file,
//! and serves the same operations over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! solr-fusion --config ./config/search.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `solr-fusion check` | Load and validate the configuration |
//! | `solr-fusion search <query_id>` | Run one search and print the canonical response |
//! | `solr-fusion suggest "<text>"` | Print typeahead suggestions |
//! | `solr-fusion refresh <url>...` | Recrawl pages through the Fusion datasource |
//! | `solr-fusion delete <path>` | Remove a document from the index |
//! | `solr-fusion serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Keyword search restricted to news
//! solr-fusion search search -q "annual report" -f bundle:news
//!
//! # Admin report across every language
//! solr-fusion search admin_search --keys budget -f bundle:news -f bundle:blog
//!
//! # Recrawl an edited page
//! solr-fusion refresh /en/news/annual-report
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use solr_fusion::refresh::{is_page_url, IndexRefreshWorkflow};
use solr_fusion::search::{SearchInput, SearchService};
use solr_fusion::server;
use solr_fusion::store::ConfigStore;

/// Query compiler and response normalizer for Solr and Fusion backends.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "solr-fusion",
    about = "Config-driven search front end for Solr and Fusion",
    version,
    long_about = "Compiles configured query definitions into Solr/Fusion requests, dispatches \
    them, and normalizes the replies into one canonical JSON shape. Also drives Fusion \
    datasource recrawls and index deletes."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/search.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the configuration, then print a summary.
    Check,

    /// Run a search and print the canonical JSON response.
    Search {
        /// Query id, e.g. `search`, `news`, `admin_search`.
        query_id: String,

        /// Free text.
        #[arg(short, long)]
        q: Option<String>,

        /// Admin report free text (`admin_search` only).
        #[arg(long)]
        keys: Option<String>,

        /// `field:value` filter; repeatable.
        #[arg(short = 'f', long = "filter")]
        filters: Vec<String>,

        /// Zero-based page number.
        #[arg(long)]
        page: Option<String>,

        #[arg(long)]
        language: Option<String>,

        /// Content language for `admin_search`.
        #[arg(long)]
        content_language: Option<String>,

        /// Extra filter value for blog query ids.
        #[arg(long)]
        fq: Option<String>,

        /// `previous` to list past events newest first.
        #[arg(long)]
        date_sort: Option<String>,
    },

    /// Print typeahead suggestions for a prefix.
    Suggest {
        text: String,
    },

    /// Recrawl pages through the configured Fusion datasource.
    ///
    /// Relative paths are joined with `[recrawl].domain`.
    Refresh {
        #[arg(required = true)]
        urls: Vec<String>,

        /// Query id whose connector owns the datasource. Defaults to
        /// `[recrawl].query_id`.
        #[arg(long)]
        query_id: Option<String>,
    },

    /// Remove a document from the index.
    ///
    /// Without `--query-id` the path must be an absolute http(s) page URL
    /// and the recrawl query id is used.
    Delete {
        path: String,

        #[arg(long)]
        query_id: Option<String>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("solr_fusion=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = Arc::new(ConfigStore::from_path(&cli.config)?);

    match cli.command {
        Commands::Check => {
            let snapshot = store.snapshot();
            let cfg = &snapshot.config;
            println!("Configuration OK: {}", cli.config.display());
            println!(
                "  languages: {} (default {})",
                cfg.settings.languages.join(", "),
                cfg.settings.default_language
            );
            println!("  connectors:");
            for (id, connector) in &cfg.connectors {
                println!(
                    "    {} ({}) {}://{}:{}{}",
                    id,
                    connector.backend,
                    connector.scheme,
                    connector.host,
                    connector.port,
                    connector.path
                );
            }
            println!("  query bindings:");
            for (query_id, binding) in &cfg.query_connectors {
                println!(
                    "    {} -> connector {}, query {}",
                    query_id, binding.connector, binding.query
                );
            }
            println!(
                "  recrawl: {}",
                if cfg.recrawl.enabled { "enabled" } else { "disabled" }
            );
        }
        Commands::Search {
            query_id,
            q,
            keys,
            filters,
            page,
            language,
            content_language,
            fq,
            date_sort,
        } => {
            let input = SearchInput {
                q,
                keys,
                filters,
                page,
                language,
                content_language,
                fq,
                date_sort,
            };
            let service = SearchService::new(store);
            let response = service.search(&query_id, &input).await;
            print_json(&response)?;
        }
        Commands::Suggest { text } => {
            let service = SearchService::new(store);
            match service.suggest(&text).await {
                Some(response) => print_json(&response)?,
                None => println!("[]"),
            }
        }
        Commands::Refresh { urls, query_id } => {
            let workflow = IndexRefreshWorkflow::new(store);
            let accepted = match query_id {
                Some(query_id) => workflow.refresh_index(&query_id, &urls).await,
                None => workflow.refresh_content(&urls).await,
            };
            if accepted {
                println!("Crawl job accepted for {} url(s).", urls.len());
            } else {
                anyhow::bail!("crawl job was not started; see the log for details");
            }
        }
        Commands::Delete { path, query_id } => {
            let workflow = IndexRefreshWorkflow::new(store);
            let outcome = match query_id {
                Some(query_id) => workflow.delete_document(&query_id, &path).await,
                None => {
                    if !is_page_url(&path) {
                        anyhow::bail!(
                            "page URL must be a valid http(s) URL (example: https://www.example.com/en/page-path)"
                        );
                    }
                    workflow.delete_page(&path).await
                }
            };
            print_json(&outcome)?;
            if !outcome.is_deleted() {
                anyhow::bail!("document {} was not deleted (status {})", path, outcome.status_code);
            }
        }
        Commands::Serve => {
            server::run_server(store).await?;
        }
    }

    Ok(())
}
