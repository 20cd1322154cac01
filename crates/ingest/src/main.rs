//! Command-line client for the docket ingestion pipeline.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use docket_core::config::ClientConfig;
use docket_ingest::{
    ConversionClient, Orchestrator, Reconciler, SourceFile, UploadContext, UploadSupervisor,
};
use docket_metadata::FileRecordRepo;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "docket")]
#[command(about = "Upload documents into docket storage")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    /// Client config file path
    #[arg(
        short,
        long,
        global = true,
        env = "DOCKET_CONFIG",
        default_value = "config/client.toml"
    )]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert, store and record a batch of documents
    Upload {
        /// Parent record the documents are attached to
        #[arg(long)]
        parent: String,

        /// User recorded as the uploader
        #[arg(long)]
        creator: String,

        /// Documents to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Create the storage bucket if it does not exist
    Provision,
    /// Remove stored documents that have no file record
    Reconcile {
        /// Report orphans without deleting them
        #[arg(long)]
        dry_run: bool,
    },
    /// Check the conversion service's tool status
    Health,
}

fn load_config(path: &str) -> Result<ClientConfig> {
    let mut figment = Figment::new();
    if std::path::Path::new(path).exists() {
        tracing::debug!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    }

    let config: ClientConfig = figment
        .merge(Env::prefixed("DOCKET_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

struct Clients {
    storage: docket_storage::Storage,
    records: Arc<dyn FileRecordRepo>,
}

async fn connect(config: &ClientConfig) -> Result<Clients> {
    let storage = docket_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    let metadata = docket_metadata::from_config(&config.metadata)
        .await
        .context("failed to open metadata store")?;
    let records: Arc<dyn FileRecordRepo> = metadata;
    Ok(Clients { storage, records })
}

fn conversion_client(config: &ClientConfig) -> Result<Option<Arc<ConversionClient>>> {
    config
        .ingest
        .conversion_url
        .as_deref()
        .map(|url| {
            ConversionClient::new(url, config.ingest.conversion_request_timeout())
                .map(Arc::new)
                .context("failed to create conversion client")
        })
        .transpose()
}

async fn handle_upload(
    config: ClientConfig,
    parent: String,
    creator: String,
    paths: Vec<PathBuf>,
) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let file = SourceFile::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        files.push(file);
    }

    let clients = connect(&config).await?;
    let client = conversion_client(&config)?;
    let optimize = config.ingest.optimize_pdfs;

    let mut orchestrator = Orchestrator::new(config.ingest, &clients.storage, clients.records);
    if let Some(client) = client {
        orchestrator = orchestrator.with_converter(client.clone());
        if optimize {
            orchestrator = orchestrator.with_optimizer(client);
        }
    } else {
        tracing::info!("No conversion service configured, storing documents as submitted");
    }

    let supervisor = UploadSupervisor::new(Arc::new(orchestrator));
    let ticket = supervisor
        .submit(UploadContext::new(parent, creator), files)
        .await;
    let report = ticket.wait().await.context("upload batch did not complete")?;

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(record) => println!("  ok    {} -> {}", outcome.task.source_name, record.url),
            Err(e) => println!("  fail  {}: {e}", outcome.task.source_name),
        }
    }
    println!("{}", report.summary());

    if report.failed() > 0 {
        anyhow::bail!("{} of {} files failed", report.failed(), report.total());
    }
    Ok(())
}

async fn handle_provision(config: ClientConfig) -> Result<()> {
    let clients = connect(&config).await?;
    let orchestrator = Orchestrator::new(config.ingest, &clients.storage, clients.records);
    let provisioner = orchestrator.provisioner();
    provisioner
        .ensure()
        .await
        .with_context(|| format!("failed to provision bucket {}", provisioner.bucket()))?;
    println!("Bucket {} is ready", provisioner.bucket());
    Ok(())
}

async fn handle_reconcile(config: ClientConfig, dry_run: bool) -> Result<()> {
    let clients = connect(&config).await?;
    let reconciler = Reconciler::new(
        clients.storage.objects.clone(),
        clients.records,
        &config.ingest.namespace,
        config.ingest.orphan_grace(),
    )
    .dry_run(dry_run);

    let stats = reconciler.sweep().await.context("reconciliation failed")?;
    println!(
        "Scanned {}, orphaned {}, removed {}, skipped (recent) {}, errors {}",
        stats.scanned, stats.orphaned, stats.removed, stats.skipped_recent, stats.errors
    );
    Ok(())
}

async fn handle_health(config: ClientConfig) -> Result<()> {
    let client = conversion_client(&config)?
        .context("ingest.conversion_url is not configured")?;
    let health = client.health().await.context("health check failed")?;
    println!("status: {}", health.status);
    if let Some(v) = &health.ghostscript_version {
        println!("ghostscript: {v}");
    }
    if let Some(v) = &health.libreoffice_version {
        println!("libreoffice: {v}");
    }
    if let Some(e) = &health.ghostscript_error {
        println!("ghostscript error: {e}");
    }
    if let Some(e) = &health.libreoffice_error {
        println!("libreoffice error: {e}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,docket_ingest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Cli { config, command } = Cli::parse();
    let config = load_config(&config.config)?;

    match command {
        Commands::Upload {
            parent,
            creator,
            files,
        } => handle_upload(config, parent, creator, files).await,
        Commands::Provision => handle_provision(config).await,
        Commands::Reconcile { dry_run } => handle_reconcile(config, dry_run).await,
        Commands::Health => handle_health(config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_core::config::StorageConfig;

    #[test]
    fn load_config_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("client.toml");
        std::fs::write(
            &path,
            r#"
[ingest]
namespace = "matters"
conversion_url = "http://convert:3000"

[storage]
type = "filesystem"
path = "/var/lib/docket"
bucket = "docs"
"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.ingest.namespace, "matters");
        assert!(config.ingest.optimize_pdfs);
        assert!(matches!(config.storage, StorageConfig::Filesystem { ref bucket, .. } if bucket == "docs"));
    }

    #[test]
    fn cli_parses_upload() {
        let cli = Cli::try_parse_from([
            "docket", "upload", "--parent", "case-1", "--creator", "u1", "a.pdf", "b.docx",
        ])
        .unwrap();
        match cli.command {
            Commands::Upload { parent, files, .. } => {
                assert_eq!(parent, "case-1");
                assert_eq!(files.len(), 2);
            }
            _ => panic!("expected upload"),
        }
    }

    #[test]
    fn cli_requires_files_for_upload() {
        assert!(
            Cli::try_parse_from(["docket", "upload", "--parent", "p", "--creator", "c"]).is_err()
        );
    }
}
