use anyhow::Context;
use clap::{Parser, Subcommand};
use es_indexable::config::SettingsBuilder;
use es_indexable::{HttpBackend, SearchBackend, Settings};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "es-indexable")]
#[command(about = "Inspect and maintain the indices of es-indexable models", long_about = None)]
#[command(version)]
struct Cli {
    /// Cluster URL (overrides the configured one)
    #[arg(short, long, env = "ES_INDEXABLE_URL")]
    url: Option<String>,

    /// Settings file layered over the defaults
    #[arg(short, long, env = "ES_INDEXABLE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the cluster answers
    Ping,

    /// Make recent writes searchable
    Refresh {
        #[arg(short, long)]
        index: Option<String>,
    },

    /// Show the stored mapping of a document type
    Mapping {
        #[arg(value_name = "DOC_TYPE")]
        doc_type: String,

        #[arg(short, long)]
        index: Option<String>,
    },

    /// Show index settings
    Settings {
        #[arg(short, long)]
        index: Option<String>,
    },

    /// Count documents, optionally matching a free-text query
    Count {
        #[arg(value_name = "DOC_TYPE")]
        doc_type: String,

        #[arg(short, long)]
        query: Option<String>,

        #[arg(short, long)]
        index: Option<String>,
    },

    /// Fetch one document
    Get {
        #[arg(value_name = "DOC_TYPE")]
        doc_type: String,

        #[arg(value_name = "ID")]
        id: String,

        #[arg(short, long)]
        index: Option<String>,
    },

    /// Delete an index and every document in it
    DeleteIndex {
        #[arg(value_name = "INDEX")]
        index: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "es_indexable=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::load_with(cli.config.as_deref()).context("loading settings")?;
    if let Some(url) = cli.url {
        settings = SettingsBuilder::from_settings(&settings).url(url).build();
    }
    let backend = HttpBackend::new(&settings)?;
    let default_index = settings.default_index.clone();
    let index_or_default = |index: Option<String>| index.unwrap_or_else(|| default_index.clone());

    tracing::debug!(url = %backend.base_url(), "Using cluster");

    let body = match cli.command {
        Commands::Ping => {
            let up = backend.ping().await?;
            json!({"url": backend.base_url(), "available": up})
        }

        Commands::Refresh { index } => backend.refresh(&index_or_default(index)).await?,

        Commands::Mapping { doc_type, index } => {
            backend
                .get_mapping(&index_or_default(index), &doc_type)
                .await?
        }

        Commands::Settings { index } => backend.get_settings(&index_or_default(index)).await?,

        Commands::Count {
            doc_type,
            query,
            index,
        } => {
            let body = query.map(|q| json!({"query": {"match": {"_all": {"query": q}}}}));
            backend
                .count(&index_or_default(index), &doc_type, body.as_ref())
                .await?
        }

        Commands::Get {
            doc_type,
            id,
            index,
        } => backend.get(&index_or_default(index), &doc_type, &id).await?,

        Commands::DeleteIndex { index } => {
            let response = backend.delete_index(&index).await?;
            tracing::info!(index = %index, "Deleted index");
            response
        }
    };

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
