// SPDX-License-Identifier: MIT

use attribute_routing::catalog::{CatalogLoader, InMemoryCatalogStore};
use attribute_routing::config::EngineConfig;
use attribute_routing::logic::{self, DynamicOperandBindings, OperandResolver, QueryNode};
use attribute_routing::routing::{FindMatchingMembersRequest, RoutingService};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde::de::DeserializeOwned;

use std::path::Path;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find the members a booking would be routed to
    Evaluate {
        /// Path to the attribute catalog (YAML or JSON)
        #[arg(short, long)]
        catalog: String,

        /// Path to the primary query tree
        #[arg(short, long)]
        query: Option<String>,

        /// Path to the fallback query tree
        #[arg(short, long)]
        fallback: Option<String>,

        /// Path to dynamic operand bindings
        #[arg(short, long)]
        operands: Option<String>,

        /// Attach a troubleshooter record to the outcome
        #[arg(short, long)]
        troubleshoot: bool,

        /// Path to the engine config
        #[arg(long)]
        config: Option<String>,
    },
    /// Check a query tree against a catalog without evaluating members
    Validate {
        /// Path to the attribute catalog (YAML or JSON)
        #[arg(short, long)]
        catalog: String,

        /// Path to the query tree
        #[arg(short, long)]
        query: String,

        /// Path to dynamic operand bindings
        #[arg(short, long)]
        operands: Option<String>,

        /// Path to the engine config
        #[arg(long)]
        config: Option<String>,
    },
}

/// Read a JSON or YAML document, choosing the format from the extension
fn read_document<T: DeserializeOwned>(
    path: &str,
) -> Result<T, Box<dyn std::error::Error + Send + Sync>> {
    let content = std::fs::read_to_string(path)?;
    let value = match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };
    Ok(value)
}

fn load_config(path: Option<&str>) -> Result<EngineConfig, attribute_routing::error::RoutingError> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::default().with_env_overrides(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Evaluate {
            catalog,
            query,
            fallback,
            operands,
            troubleshoot,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let catalog = CatalogLoader::new().load_catalog(&catalog)?;
            log::info!(
                "Loaded catalog for team {} with {} members",
                catalog.team_id,
                catalog.members.len()
            );

            let mut request = FindMatchingMembersRequest::new(&catalog.team_id, &catalog.org_id)
                .with_troubleshooter(troubleshoot);
            if let Some(path) = query {
                request = request.with_primary(read_document::<QueryNode>(&path)?);
            }
            if let Some(path) = fallback {
                request = request.with_fallback(read_document::<QueryNode>(&path)?);
            }
            if let Some(path) = operands {
                request = request.with_operands(read_document::<DynamicOperandBindings>(&path)?);
            }

            let store = InMemoryCatalogStore::new();
            store.register(catalog).await;

            let service = RoutingService::new(Arc::new(store), &config);
            let outcome = service.find_matching_members(&request).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Validate {
            catalog,
            query,
            operands,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let catalog = CatalogLoader::new().load_catalog(&catalog)?;
            let tree = read_document::<QueryNode>(&query)?;
            let operands = match operands {
                Some(path) => read_document::<DynamicOperandBindings>(&path)?,
                None => DynamicOperandBindings::new(),
            };

            let resolver = OperandResolver::new(config.operand_sources.iter().cloned());
            let resolved = resolver
                .resolve(&tree, &operands)
                .and_then(|resolution| {
                    for warning in &resolution.warnings {
                        log::warn!("{}", warning);
                    }
                    logic::validate(resolution.tree, &catalog)
                });

            match resolved {
                Ok(validation) => {
                    for warning in &validation.warnings {
                        log::warn!("{}", warning);
                    }
                    println!("ok: {} rules", validation.tree.rule_count())
                }
                Err(e) => {
                    eprintln!("invalid: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
