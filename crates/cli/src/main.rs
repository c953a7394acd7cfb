//! Trellis command-line tool.
//!
//! Loads a persistence configuration, builds the adapter registries and
//! runs read-only inspection commands against named adapters.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::info;
use trellis_persistence::core::{MetadataAdapter, QueryServiceExt};
use trellis_persistence::mapping::document;
use trellis_persistence::{PersistenceConfig, PersistenceContext, Resource, ResourceId};

/// Command-line options.
#[derive(Debug, Parser)]
#[command(name = "trellis")]
#[command(about = "Inspect Trellis metadata adapters", version)]
struct Cli {
    /// Path to the persistence configuration (JSON).
    #[arg(short, long, env = "TRELLIS_CONFIG", default_value = "trellis.json")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "TRELLIS_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List registered metadata and storage adapters.
    Adapters,

    /// List configured resource types and their capabilities.
    Types,

    /// Count resources, scanning every kind when none is given.
    Count {
        /// Metadata adapter name.
        #[arg(short, long)]
        adapter: String,
        /// Resource kind.
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Print a resource in its document form.
    Show {
        /// Metadata adapter name.
        #[arg(short, long)]
        adapter: String,
        /// Resource identifier.
        id: String,
    },

    /// Print the members of a resource.
    Members {
        /// Metadata adapter name.
        #[arg(short, long)]
        adapter: String,
        /// Resource identifier.
        id: String,
    },

    /// Print the resources listing a resource as a member.
    Parents {
        /// Metadata adapter name.
        #[arg(short, long)]
        adapter: String,
        /// Resource identifier.
        id: String,
    },
}

/// Installs the tracing subscriber; `RUST_LOG` overrides `level`.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("trellis_persistence={0},trellis={0}", level)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_context(path: &Path) -> anyhow::Result<PersistenceContext> {
    let config = PersistenceConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    config
        .build()
        .with_context(|| format!("Failed to build adapters from {}", path.display()))
}

/// Renders a resource the way the document backend stores it.
fn document_json(resource: &Resource) -> anyhow::Result<Value> {
    let mut object = document::write_attributes(resource, &document::writer())?;
    object.insert("id".to_string(), json!(resource.id().map(ResourceId::as_str)));
    object.insert("internal_resource".to_string(), json!(resource.kind()));
    for (key, at) in [
        ("created_at", resource.created_at()),
        ("updated_at", resource.updated_at()),
    ] {
        object.insert(key.to_string(), json!(at.map(|t| document::format_datetime(&t))));
    }
    Ok(Value::Object(object))
}

fn print_summaries(resources: &[Resource]) {
    for resource in resources {
        let id = resource.id().map(ResourceId::as_str).unwrap_or("-");
        println!("{}\t{}", id, resource.kind());
    }
}

async fn run(command: Command, context: &PersistenceContext) -> anyhow::Result<()> {
    let adapter = |name: &str| -> anyhow::Result<Arc<dyn MetadataAdapter>> {
        Ok(context.adapter(name)?)
    };

    match command {
        Command::Adapters => {
            for name in context.adapters().names() {
                println!("metadata\t{}\t{}", name, context.adapter(&name)?.backend_name());
            }
            for name in context.storage().names() {
                let store = context.storage().find(&name)?;
                println!("storage\t{}\t{}", name, store.backend_name());
            }
        }
        Command::Types => {
            for definition in context.types().iter() {
                let capabilities: Vec<String> = definition
                    .capabilities()
                    .map(|c| format!("{:?}", c))
                    .collect();
                println!("{}\t{}", definition.name(), capabilities.join(","));
            }
        }
        Command::Count { adapter: name, kind } => {
            let query = adapter(&name)?.query_service();
            let count = match kind {
                Some(kind) => query.count_all_of_type(&kind).await?,
                None => query.find_all().count().await?,
            };
            println!("{}", count);
        }
        Command::Show { adapter: name, id } => {
            let query = adapter(&name)?.query_service();
            let resource = query.find_by_id(&ResourceId::new(id)).await?;
            println!("{}", serde_json::to_string_pretty(&document_json(&resource)?)?);
        }
        Command::Members { adapter: name, id } => {
            let query = adapter(&name)?.query_service();
            let resource = query.find_by_id(&ResourceId::new(id)).await?;
            print_summaries(&query.find_members(&resource).await?);
        }
        Command::Parents { adapter: name, id } => {
            let query = adapter(&name)?.query_service();
            let resource = query.find_by_id(&ResourceId::new(id)).await?;
            print_summaries(&query.find_parents(&resource).await?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let context = load_context(&cli.config)?;
    info!(
        config = %cli.config.display(),
        adapters = context.adapters().len(),
        "Loaded persistence context"
    );
    run(cli.command, &context).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_count() {
        let cli = Cli::try_parse_from(["trellis", "--config", "x.json", "count", "--adapter", "primary"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("x.json"));
        assert!(matches!(cli.command, Command::Count { kind: None, .. }));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trellis.json");
        std::fs::write(
            &path,
            r#"{ "adapters": [
                { "name": "primary", "type": "memory" },
                { "name": "primary", "type": "memory" }
            ] }"#,
        )
        .unwrap();

        let err = load_context(&path).unwrap_err();
        assert!(err.to_string().starts_with("Invalid configuration in"));
        assert!(format!("{err:#}").contains("duplicate adapter name 'primary'"));
    }

    #[test]
    fn test_document_json() {
        let resource = Resource::new("Page")
            .with_id("p1")
            .with("title", "Preface")
            .with_members(["a"]);
        let value = document_json(&resource).unwrap();
        assert_eq!(value["id"], "p1");
        assert_eq!(value["internal_resource"], "Page");
        assert_eq!(value["title"], "Preface");
        assert_eq!(value["member_ids"], json!([{ "id": "a" }]));
        assert_eq!(value["created_at"], Value::Null);
    }
}
