//! Hearth CLI: ingest files into the household archive from the command line.
//!
//! Reads the same environment as the server (MEDIA_PATH, DATABASE_URL, ...).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use hearth_cli::{guess_mime, init_tracing, log_error, render_error};
use hearth_core::{AppError, ArchiveConfig};
use hearth_db::{MediaRecordStore, PgMediaRecordStore};
use hearth_processing::{
    ExifMetadataExtractor, IngestionOrchestrator, MetadataExtractor, UploadSource,
};
use hearth_services::{resolve_kind, MediaUploadService, UploadRequest, WebBackfillService};
use serde::Serialize;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "hearth", about = "Household media archive")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a photo or video and catalog it
    Ingest {
        /// Path to the file to ingest
        file: PathBuf,
        /// Household that owns the file
        #[arg(long)]
        household: Uuid,
        /// Uploading member
        #[arg(long)]
        uploader: Option<Uuid>,
        /// photo or video; derived from the content type when omitted
        #[arg(long)]
        kind: Option<String>,
        /// Content type; guessed from the extension when omitted
        #[arg(long)]
        mime: Option<String>,
        /// Store and enrich the file without writing a catalog record
        #[arg(long)]
        no_catalog: bool,
    },
    /// Generate web copies for every photo catalogued without one
    BackfillWeb {
        /// Photos fetched from the catalog per batch
        #[arg(long, default_value = "100")]
        batch_size: i64,
    },
    /// Print the EXIF metadata of a local file
    Info {
        /// Path to a JPEG or other EXIF-bearing file
        file: PathBuf,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

async fn connect_store(config: &ArchiveConfig) -> anyhow::Result<PgMediaRecordStore> {
    let Some(url) = config.database_url.as_deref() else {
        bail!("DATABASE_URL must be set for catalog operations");
    };
    let store = PgMediaRecordStore::connect(url)
        .await
        .context("Failed to connect to database")?;
    store.migrate().await.context("Failed to run migrations")?;
    Ok(store)
}

fn file_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))
}

fn report(err: &anyhow::Error, is_production: bool) -> ExitCode {
    log_error(err);
    eprintln!("{}", render_error(err, is_production));
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let config = match ArchiveConfig::from_env().context("Failed to load configuration") {
        Ok(config) => config,
        Err(err) => return report(&err, false),
    };

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err, config.is_production()),
    }
}

async fn run(command: Commands, config: &ArchiveConfig) -> anyhow::Result<()> {
    match command {
        Commands::Ingest {
            file,
            household,
            uploader,
            kind,
            mime,
            no_catalog,
        } => {
            let filename = file_name(&file)?;
            let mime = mime.unwrap_or_else(|| guess_mime(&file).to_string());
            let reader = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let orchestrator = IngestionOrchestrator::from_config(config)
                .context("Failed to set up ingestion")?;

            if no_catalog {
                let kind = resolve_kind(kind.as_deref(), &mime)?;
                let result = orchestrator
                    .ingest(UploadSource::new(reader, filename, mime, kind))
                    .await
                    .map_err(AppError::from)?;
                return print_json(&result);
            }

            let store: Arc<dyn MediaRecordStore> = Arc::new(connect_store(config).await?);
            let service = MediaUploadService::new(orchestrator, store);
            let mut request = UploadRequest::new(household, reader, filename, mime);
            if let Some(uploader) = uploader {
                request = request.uploader(uploader);
            }
            if let Some(kind) = kind {
                request = request.kind(kind);
            }
            let outcome = service.upload(request).await?;
            print_json(&outcome)?;
        }
        Commands::BackfillWeb { batch_size } => {
            let store: Arc<dyn MediaRecordStore> = Arc::new(connect_store(config).await?);
            let orchestrator = IngestionOrchestrator::from_config(config)
                .context("Failed to set up ingestion")?;
            let service = WebBackfillService::new(
                orchestrator.locator().clone(),
                *orchestrator.web_optimizer(),
                store,
            );
            let report = service.run(batch_size).await?;
            print_json(&report)?;
        }
        Commands::Info { file } => {
            let metadata = ExifMetadataExtractor
                .extract(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            print_json(&metadata)?;
        }
    }

    Ok(())
}
