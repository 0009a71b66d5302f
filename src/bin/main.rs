//! qmodel CLI - evaluate quality models over metric data
//!
//! Usage:
//!   qmodel compute --data <rows.json> --model <model.json> [--node <name>] [--format json]
//!   qmodel cost --data <rows.json> --model <model.json>
//!   qmodel tree --data <rows.json> --model <model.json>
//!   qmodel validate --data <rows.json> --model <model.json>
//!
//! Input paths fall back to the `[data]` section of the settings file.

use clap::{Args, Parser, Subcommand, ValueEnum};
use qmodel::compute::ComputedData;
use qmodel::config::{Settings, SettingsError};
use qmodel::data::InMemoryDataset;
use qmodel::events::ModelEvent;
use qmodel::model::{Model, ModelDescription, ModelError};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qmodel")]
#[command(about = "qmodel - multivariate CDF/CCDF quality models over entity metrics")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to $QMODEL_CONFIG, ./qmodel.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recompute the model and print every node's distributions
    Compute {
        #[command(flatten)]
        inputs: InputArgs,

        /// Only recompute this node's subtree
        #[arg(short, long)]
        node: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the outstanding recompute cost
    Cost {
        #[command(flatten)]
        inputs: InputArgs,
    },

    /// Print the model as a tree
    Tree {
        #[command(flatten)]
        inputs: InputArgs,
    },

    /// Load the data and model without computing
    Validate {
        #[command(flatten)]
        inputs: InputArgs,
    },
}

#[derive(Args)]
struct InputArgs {
    /// JSON array of data rows
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Model description (JSON)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Row field holding the entity id (ignored when the model generates ids)
    #[arg(long)]
    id_column: Option<String>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Per-node summary with entity values
    Text,
    /// All results as JSON
    Json,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Settings(#[from] SettingsError),

    #[error("Error reading '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing --{0} argument and no default in the settings file")]
    MissingInput(&'static str),

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(cli.verbose, &settings.logging.level);

    let result = match cli.command {
        Commands::Compute {
            inputs,
            node,
            format,
        } => cmd_compute(&settings, &inputs, node.as_deref(), format).await,
        Commands::Cost { inputs } => cmd_cost(&settings, &inputs),
        Commands::Tree { inputs } => cmd_tree(&settings, &inputs),
        Commands::Validate { inputs } => cmd_validate(&settings, &inputs),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise `-v` flags, then the settings file.
fn init_logging(verbose: u8, configured: &str) {
    let fallback = match verbose {
        0 => configured.to_string(),
        1 => "qmodel=info".to_string(),
        2 => "qmodel=debug".to_string(),
        _ => "qmodel=trace".to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_model(settings: &Settings, inputs: &InputArgs) -> Result<Model, CliError> {
    let data_path = match &inputs.data {
        Some(path) => path.clone(),
        None => settings
            .data
            .resolved_rows()?
            .ok_or(CliError::MissingInput("data"))?,
    };
    let model_path = match &inputs.model {
        Some(path) => path.clone(),
        None => settings
            .data
            .resolved_model()?
            .ok_or(CliError::MissingInput("model"))?,
    };

    let description = ModelDescription::from_file(&model_path).map_err(ModelError::from)?;

    let raw = fs::read_to_string(&data_path).map_err(|source| CliError::Read {
        path: data_path.clone(),
        source,
    })?;
    let mut rows: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(&raw)?;

    let id_column = match &description.entity_id {
        Some(spec) => {
            spec.apply(&mut rows);
            spec.generate_col_name.clone()
        }
        None => inputs
            .id_column
            .clone()
            .unwrap_or_else(|| settings.data.id_column.clone()),
    };

    let dataset = InMemoryDataset::from_rows(&rows, &id_column).map_err(ModelError::from)?;
    info!(
        rows = rows.len(),
        columns = dataset.column_names().len(),
        "loaded dataset"
    );

    let mut model = Model::new(Arc::new(dataset)).with_options(settings.compute_options());
    model.load(&description)?;
    Ok(model)
}

async fn cmd_compute(
    settings: &Settings,
    inputs: &InputArgs,
    node: Option<&str>,
    format: OutputFormat,
) -> Result<(), CliError> {
    let model = load_model(settings, inputs)?;

    let mut progress = model.subscribe();
    tokio::spawn(async move {
        while let Some(event) = progress.receiver.recv().await {
            if let ModelEvent::Progress(fraction) = event {
                info!(progress = format!("{:.1}%", fraction * 100.0), "recompute");
            }
        }
    });

    match node {
        Some(name) => model.recompute_node(name).await?,
        None => model.recompute().await?,
    }

    // Nodes outside the recomputed subtrees have no results.
    let names: Vec<String> = model
        .topological_order()?
        .into_iter()
        .filter(|n| model.node(n).is_ok_and(|r| r.is_computed()))
        .collect();

    let mut results: BTreeMap<String, Vec<ComputedData>> = BTreeMap::new();
    for name in &names {
        results.insert(name.clone(), model.node(name)?.computed_data(None)?);
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        OutputFormat::Text => {
            for name in &names {
                let node = model.node(name)?;
                println!("{} ({})", name, node.kind());
                if results[name].is_empty() {
                    println!("  (no results)");
                }
                for data in &results[name] {
                    match (data.min(), data.max()) {
                        (Some(min), Some(max)) => {
                            println!("  {}: min {:.4}, max {:.4}", data.kind(), min, max)
                        }
                        _ => println!("  {}: empty", data.kind()),
                    }
                    for entity in data.data() {
                        println!("    {} = {:.4}", entity.id, entity.val);
                    }
                }
            }
        }
    }

    Ok(())
}

fn cmd_cost(settings: &Settings, inputs: &InputArgs) -> Result<(), CliError> {
    let model = load_model(settings, inputs)?;
    println!("Recompute cost: {}", model.recompute_cost());
    println!("Unique work:    {}", model.recompute_cost_unique());
    Ok(())
}

fn cmd_tree(settings: &Settings, inputs: &InputArgs) -> Result<(), CliError> {
    let model = load_model(settings, inputs)?;
    print!("{}", model.render_tree());
    Ok(())
}

fn cmd_validate(settings: &Settings, inputs: &InputArgs) -> Result<(), CliError> {
    let model = load_model(settings, inputs)?;
    println!(
        "OK: {} nodes, {} edges, {} roots",
        model.node_count(),
        model.edges().len(),
        model.root_nodes().len()
    );
    Ok(())
}
