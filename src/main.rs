use anyhow::Context;
use clap::{Parser, Subcommand};
use damage_classifier::{
    config::Config,
    ml::ClassifierService,
    models::{DamageFeatures, DamageLevel},
    state::{create_stores, JsonFileFeed, PredictionFilter, Stores},
    AppError,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "damage-classifier")]
#[command(about = "Vehicle body damage severity classifier", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a new model from a JSON array of labeled damage records
    Train {
        /// Path to the records file
        #[arg(short, long)]
        data: PathBuf,

        /// Fraction of samples held out for evaluation
        #[arg(short, long)]
        test_fraction: Option<f64>,

        /// Notes stored with the training report
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Classify one feature vector
    Predict {
        /// Seven comma-separated values: area, depth, point count, age,
        /// usage frequency, corrosion level, deformation
        #[arg(short, long, value_delimiter = ',', required = true)]
        features: Vec<f64>,

        /// Component the measurements were taken from
        #[arg(short, long)]
        component_id: Option<String>,

        /// Skip range checks and do not keep the prediction in history
        #[arg(long)]
        no_record: bool,
    },

    /// List recorded predictions, newest first
    Predictions {
        /// Only predictions for this component
        #[arg(short, long)]
        component_id: Option<String>,

        /// Only predictions of these levels
        #[arg(short, long, value_delimiter = ',')]
        level: Vec<DamageLevel>,

        #[arg(short, long, default_value = "0")]
        page: u32,

        #[arg(short = 's', long, default_value = "20")]
        page_size: u32,
    },

    /// Show one recorded prediction
    Prediction {
        /// Prediction id
        id: Uuid,
    },

    /// Show whether a model is installed
    Status,

    /// Show the installed model's fitted parameters
    ModelInfo,

    /// List recorded training runs, newest first
    History {
        #[arg(short, long, default_value = "0")]
        page: u32,

        #[arg(short = 's', long, default_value = "20")]
        page_size: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    init_tracing(&config);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<AppError>()
                .map(|app| app.error_code().to_string())
                .unwrap_or_else(|| "ERROR".to_string());
            eprintln!("{}: {:#}", code, e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("damage_classifier={}", config.observability.log_level).into()
    });

    // Logs go to stderr so stdout carries only command output.
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(command: Commands, config: Config) -> anyhow::Result<()> {
    tracing::debug!(backend = ?config.storage.backend, "Opening model storage");
    let Stores {
        snapshots,
        history,
        predictions,
    } =
        create_stores(&config.storage).context("Failed to initialize storage")?;

    let service = ClassifierService::new(config.engine.clone(), snapshots);
    service
        .restore()
        .await
        .context("Failed to read persisted model")?;

    match command {
        Commands::Train {
            data,
            test_fraction,
            notes,
        } => {
            let feed = JsonFileFeed::new(&data);
            let result = service.train(&feed, test_fraction, notes).await?;

            if let Err(e) = history.record(&result).await {
                tracing::warn!("Failed to record training report: {}", e);
            }
            print_json(&result)
        }

        Commands::Predict {
            features,
            no_record: true,
            ..
        } => print_json(&service.predict(&features)?),

        Commands::Predict {
            features,
            component_id,
            no_record: false,
        } => {
            let features = DamageFeatures::from_slice(&features)?;
            let record = service
                .predict_and_record(&features, component_id, predictions.as_ref())
                .await?;
            print_json(&record)
        }

        Commands::Predictions {
            component_id,
            level,
            page,
            page_size,
        } => {
            let filter = PredictionFilter {
                component_id,
                levels: level,
            };
            let total = predictions.count(&filter).await?;
            let items = predictions.list(&filter, page, page_size).await?;
            print_json(&serde_json::json!({
                "total": total,
                "page": page,
                "page_size": page_size,
                "items": items,
            }))
        }

        Commands::Prediction { id } => match predictions.get(&id).await? {
            Some(record) => print_json(&record),
            None => Err(AppError::NotFound(format!("Prediction {} not found", id)).into()),
        },

        Commands::Status => print_json(&service.status_with_history(history.as_ref()).await?),

        Commands::ModelInfo => print_json(&service.model_info()?),

        Commands::History { page, page_size } => {
            print_json(&history.list(page, page_size).await?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
