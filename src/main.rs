use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use queryverse::credentials::JsonCredentialStore;
use queryverse::llm::{ProviderKind, ProviderSelection};
use queryverse::pipeline::{OptimizationOutcome, QueryOptimizer};
use queryverse::warehouse::{self, ConnectionProfile, SnowflakeConnector};
use queryverse::OptimizerConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "queryverse")]
#[command(about = "LLM-assisted Snowflake SQL optimizer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a SELECT/WITH query and compare the EXPLAIN plans
    Optimize {
        /// The SQL query to optimize
        sql: String,

        /// Stored connection name (defaults to the only stored connection)
        #[arg(short, long)]
        connection: Option<String>,

        /// together, groq or ollama
        #[arg(short, long)]
        provider: Option<ProviderKind>,

        #[arg(short, long)]
        model: Option<String>,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,

        /// Also print the unsanitized model response
        #[arg(long)]
        show_raw: bool,
    },

    /// Verify a stored connection with CURRENT_USER() / CURRENT_TIMESTAMP()
    CheckConnection {
        #[arg(short, long)]
        connection: Option<String>,
    },

    /// Store the API key (and optionally the model) for a hosted provider
    SetApiKey {
        provider: ProviderKind,
        api_key: String,
        #[arg(short, long, default_value = "")]
        model: String,
    },

    /// List stored warehouse connections
    ListConnections,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = OptimizerConfig::from_env()?;
    let store = JsonCredentialStore::new(&config.credentials_file);

    match cli.command {
        Commands::Optimize {
            sql,
            connection,
            provider,
            model,
            json,
            show_raw,
        } => {
            let profile = resolve_connection(&store, connection.as_deref())?;
            let connector = SnowflakeConnector::new(profile)?
                .with_statement_timeout(config.warehouse_timeout.as_secs());
            let optimizer = QueryOptimizer::from_config(&config)?;

            let selection = match (provider, model) {
                (None, None) => None,
                (provider, model) => Some(ProviderSelection::new(
                    provider.unwrap_or(config.default_provider),
                    model.unwrap_or_default(),
                )),
            };

            let outcome = optimizer.optimize(&sql, selection, &connector).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome, show_raw);
            }
            if let OptimizationOutcome::Rejected { .. } = outcome {
                std::process::exit(2);
            }
        }
        Commands::CheckConnection { connection } => {
            let profile = resolve_connection(&store, connection.as_deref())?;
            let connector = SnowflakeConnector::new(profile)?;
            match warehouse::check_connection(&connector, config.warehouse_timeout).await {
                Ok(check) => println!("✅ Connected as {} at {}", check.user, check.timestamp),
                Err(e) => {
                    error!("Connection check failed: {}", e);
                    bail!("❌ Connection failed: {}", e);
                }
            }
        }
        Commands::SetApiKey {
            provider,
            api_key,
            model,
        } => {
            if provider == ProviderKind::Ollama {
                bail!("ollama runs locally and does not use an API key");
            }
            store.update_api_credentials(provider, &api_key, &model)?;
            println!("✅ Stored {} credentials in {}", provider, store.path().display());
        }
        Commands::ListConnections => {
            let connections = store.connections()?;
            if connections.is_empty() {
                println!("No connections stored in {}", store.path().display());
            }
            for (name, profile) in connections {
                println!(
                    "{}\t{}@{}\t{}.{} ({})",
                    name, profile.user, profile.account, profile.database, profile.schema, profile.warehouse
                );
            }
        }
    }

    Ok(())
}

/// Named connection, or the single stored one when no name is given
fn resolve_connection(store: &JsonCredentialStore, name: Option<&str>) -> Result<ConnectionProfile> {
    let connections = store
        .connections()
        .with_context(|| format!("Failed to read {}", store.path().display()))?;

    match name {
        Some(name) => connections
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("No connection named '{}' in {}", name, store.path().display())),
        None => {
            let mut iter = connections.into_iter();
            match (iter.next(), iter.next()) {
                (Some((name, profile)), None) => {
                    info!("Using connection '{}'", name);
                    Ok(profile)
                }
                (None, _) => bail!("No connections stored in {}", store.path().display()),
                _ => bail!("Several connections are stored; choose one with --connection"),
            }
        }
    }
}

fn print_outcome(outcome: &OptimizationOutcome, show_raw: bool) {
    match outcome {
        OptimizationOutcome::Rejected { reason, .. } => {
            println!("⚠️ {}", reason);
        }
        OptimizationOutcome::InvalidCandidate(invalid) => {
            println!("=== Original Plan ===\n{}\n", invalid.original_plan);
            if show_raw {
                println!("=== Raw Model Response ===\n{}\n", invalid.raw_response);
            }
            println!("⚠️ {}", invalid.message);
        }
        OptimizationOutcome::Compared(report) => {
            println!("=== Optimized Query ===\n{}\n", report.optimized_query);
            if show_raw {
                println!("=== Raw Model Response ===\n{}\n", report.raw_response);
            }
            println!("=== Original Plan ===\n{}\n", report.original_plan);
            println!("=== Optimized Plan ===\n{}\n", report.optimized_plan);
            println!("=== Comparison ({} / {}) ===\n{}", report.selection.provider, report.selection.model, report.comparison);
        }
    }
}
