use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use smartsight::{
    Connectivity, HistoryRecord, HistoryStore, ImageSource, NetworkStatus, Pipeline,
    PipelineConfig, RemoteInferenceClient, initialize_ort,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

#[derive(Parser)]
#[command(name = "smartsight")]
#[command(about = "Screen eye images for cataract, diabetic retinopathy and glaucoma")]
struct Args {
    /// Treat the device as disconnected, skipping the remote service
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze one or more images and print the results as JSON
    Analyze {
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Do not record the results in the history
        #[arg(long)]
        no_history: bool,

        /// Free-form note stored with each history record
        #[arg(long)]
        notes: Option<String>,
    },
    /// Inspect or edit the analysis history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Check whether the remote prediction service is reachable
    Health,
    /// Show model details and, when reachable, remote service metadata
    Info {
        /// Load the on-device model before reporting
        #[arg(long)]
        warm_up: bool,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    List,
    Show { id: String },
    Delete { id: String },
    Clear,
    /// Count stored analyses per urgency bucket
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let app_config = config::Config::from_env()?;
    let pipeline_config = PipelineConfig::from_env()?;
    let history = HistoryStore::new(&app_config.history_path).with_limit(app_config.history_limit);

    let connectivity = Arc::new(NetworkStatus::new(!args.offline));

    match args.command {
        Command::Analyze {
            images,
            no_history,
            notes,
        } => {
            let ep = initialize_ort();
            tracing::debug!(providers = ?ep.active_providers, "Execution providers");

            let pipeline = Pipeline::from_config(pipeline_config, connectivity)?;
            for image in images {
                let uri = image.display().to_string();
                let result = pipeline
                    .analyze(ImageSource::from_path(&image))
                    .await
                    .with_context(|| format!("cannot analyze {uri}"))?;
                if result.source().is_synthetic() {
                    tracing::warn!(image = %uri, "Offline placeholder result, not a diagnosis");
                }
                println!("{}", serde_json::to_string_pretty(&result)?);

                if !no_history {
                    let mut record = HistoryRecord::new(result, uri);
                    if let Some(notes) = &notes {
                        record = record.with_notes(notes.clone());
                    }
                    history.save(record).await?;
                }
            }
        }
        Command::History { action } => match action {
            HistoryAction::List => {
                let records = history.list().await?;
                println!("{}", serde_json::to_string_pretty(&records)?);
            }
            HistoryAction::Show { id } => match history.get(&id).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => anyhow::bail!("no history record with id {id}"),
            },
            HistoryAction::Delete { id } => {
                if !history.delete(&id).await? {
                    anyhow::bail!("no history record with id {id}");
                }
                tracing::info!(id = %id, "Deleted history record");
            }
            HistoryAction::Stats => {
                let stats = history.statistics().await?;
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
            HistoryAction::Clear => {
                history.clear().await?;
                tracing::info!(path = %history.path().display(), "History cleared");
            }
        },
        Command::Health => {
            let pipeline = Pipeline::from_config(pipeline_config, connectivity)?;
            let healthy = pipeline.check_remote_health().await;
            println!("{}", serde_json::json!({ "healthy": healthy }));
        }
        Command::Info { warm_up } => {
            initialize_ort();
            let remote = RemoteInferenceClient::new(
                pipeline_config.remote.clone(),
                connectivity.clone() as Arc<dyn Connectivity>,
            )?;
            let pipeline = Pipeline::from_config(pipeline_config, connectivity)?;
            if warm_up {
                if let Err(e) = pipeline.warm_up().await {
                    tracing::warn!(error = %e, "Model warm-up failed");
                }
            }
            let service = match remote.service_info().await {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::warn!(error = %e, "Remote service info unavailable");
                    None
                }
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "model": pipeline.model_info(),
                    "service": service,
                }))?
            );
        }
    }

    Ok(())
}
