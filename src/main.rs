//! # Kafunel Optimizer - Main Entry Point
//!
//! Punto di ingresso della command line.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti con `clap`
//! - Inizializzazione del logging con `tracing`
//! - Caricamento della configurazione e override da CLI
//! - Collegamento di resolver, metadata store e motore di ottimizzazione
//!
//! ## Comandi:
//! - `optimize <ID...>` / `optimize --all`: ottimizza le immagini sotto la upload root
//! - `scan`: elenca le immagini e il loro stato di ottimizzazione
//! - `status <ID>`: stato di una singola immagine in JSON
//! - `validate-key` / `account`: interrogano il servizio remoto
//! - `formats`: formati supportati e encoder disponibili
//!
//! ## Esempio di utilizzo:
//! ```bash
//! kafunel-optimizer --upload-root /var/www/uploads optimize --all --level aggressive --resize 1920x1080
//! ```

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kafunel_optimizer::formats::{SUPPORTED_INPUT_FORMATS, SUPPORTED_OUTPUT_FORMATS};
use kafunel_optimizer::remote::validate_api_key_format;
use kafunel_optimizer::{
    AttachmentResolver, Capabilities, CompressionLevel, Config, FileManager, HttpRemoteClient, ImageIdentity,
    JsonMetadataStore, MetadataStore, OptimizationStatus, Optimizer, OutputFormat, ProgressManager,
    UploadDirResolver,
};

#[derive(Parser)]
#[command(name = "kafunel-optimizer")]
#[command(about = "Optimize uploaded images in place, with optional remote AI processing")]
struct Cli {
    /// Configuration file (default: ~/.kafunel-optimizer/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Upload root the image identities are relative to
    #[arg(short, long, global = true, default_value = ".")]
    upload_root: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Optimize images and replace them in place
    Optimize(OptimizeArgs),
    /// List images under the upload root with their status
    Scan,
    /// Show the optimization status of one image
    Status { id: String },
    /// Check the configured API key against the remote service
    ValidateKey,
    /// Show remote account information
    Account,
    /// List supported formats and available encoders
    Formats,
}

#[derive(Args)]
struct OptimizeArgs {
    /// Image identities, relative to the upload root
    ids: Vec<String>,

    /// Optimize every image found under the upload root
    #[arg(long, conflicts_with = "ids")]
    all: bool,

    /// Compression level (lossless, optimal, aggressive, maximum)
    #[arg(short, long)]
    level: Option<String>,

    /// Output format (original, jpeg, png, webp, avif)
    #[arg(short, long, value_parser = parse_output_format)]
    format: Option<OutputFormat>,

    /// Convert to WebP when the output format is original
    #[arg(long)]
    auto_convert: bool,

    /// Maximum dimensions, e.g. 1920x1080
    #[arg(short, long, value_parser = parse_dimensions)]
    resize: Option<(u32, u32)>,

    /// Number of parallel workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Save the resulting configuration back to the config file
    #[arg(long)]
    save_config: bool,
}

impl OptimizeArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(level) = &self.level {
            config.compression_level = CompressionLevel::from_name(level);
        }
        if let Some(format) = self.format {
            config.output_format = format;
        }
        if self.auto_convert {
            config.auto_convert = true;
        }
        if let Some((width, height)) = self.resize {
            config.resize_enabled = true;
            config.resize_width = width;
            config.resize_height = height;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
    }
}

fn parse_output_format(value: &str) -> Result<OutputFormat, String> {
    serde_json::from_value(serde_json::Value::String(value.to_lowercase()))
        .map_err(|_| format!("unknown output format: {}", value))
}

fn parse_dimensions(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {}", value))?;
    let width = w.trim().parse::<u32>().map_err(|e| e.to_string())?;
    let height = h.trim().parse::<u32>().map_err(|e| e.to_string())?;
    if width == 0 || height == 0 {
        return Err("dimensions must be greater than 0".to_string());
    }
    Ok((width, height))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging, RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };
    let mut config = Config::from_file(&config_path).await?;

    match cli.command {
        Command::Optimize(args) => {
            args.apply(&mut config);
            config.validate()?;
            if args.save_config {
                config.save_to_file(&config_path).await?;
                info!("Configuration saved to {}", config_path.display());
            }
            run_optimize(&cli.upload_root, config, &args).await
        }
        Command::Scan => run_scan(&cli.upload_root, &config).await,
        Command::Status { id } => {
            let store = JsonMetadataStore::open(config.metadata_file()?).await?;
            let status = store.status(&ImageIdentity::new(id)).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Command::ValidateKey => run_validate_key(&config).await,
        Command::Account => {
            let client = remote_client(&config)?;
            let info = client.get_account_info().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Command::Formats => {
            print_formats();
            Ok(())
        }
    }
}

async fn run_optimize(upload_root: &Path, config: Config, args: &OptimizeArgs) -> Result<()> {
    if !upload_root.is_dir() {
        return Err(anyhow::anyhow!("Upload root does not exist: {}", upload_root.display()));
    }

    let resolver = Arc::new(UploadDirResolver::new(upload_root));
    let ids: Vec<ImageIdentity> = if args.all {
        FileManager::find_images(upload_root)
            .iter()
            .filter_map(|path| resolver.identity_for(path))
            .collect()
    } else {
        args.ids.iter().map(|id| ImageIdentity::new(id.as_str())).collect()
    };

    if ids.is_empty() {
        info!("No images to optimize");
        return Ok(());
    }

    let store = Arc::new(JsonMetadataStore::open(config.metadata_file()?).await?);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: finishing images in progress, skipping the rest");
            let _ = stop_tx.send(true);
        }
    });

    let optimizer = Arc::new(Optimizer::new(config, resolver, store)?.with_cancellation(stop_rx));

    let progress = ProgressManager::new(ids.len() as u64);
    let report = optimizer.optimize_many(ids, &progress).await;
    progress.finish(&report.stats.format_summary());

    info!("=== Optimization Complete ===");
    info!("{}", report.stats.format_summary());

    if report.stats.failed > 0 {
        return Err(anyhow::anyhow!("{} images could not be optimized", report.stats.failed));
    }
    Ok(())
}

async fn run_scan(upload_root: &Path, config: &Config) -> Result<()> {
    let resolver = UploadDirResolver::new(upload_root);
    let store = JsonMetadataStore::open(config.metadata_file()?).await?;

    let images = FileManager::find_images(resolver.upload_root());
    for path in &images {
        let Some(id) = resolver.identity_for(path) else {
            continue;
        };
        let status = store.status(&id).await?;
        let label = match &status {
            OptimizationStatus::Optimized { message, .. } => message.clone(),
            OptimizationStatus::NotOptimized => "Not optimized".to_string(),
        };
        println!("{}\t{}", id, label);
    }

    let stats = store.stats().await?;
    info!(
        "{} images found, {} optimized, {} saved in total (average {:.2}%)",
        images.len(),
        stats.count,
        FileManager::format_signed_size(stats.total_saved),
        stats.average_percent
    );
    Ok(())
}

fn remote_client(config: &Config) -> Result<HttpRemoteClient> {
    if !config.has_api_key() {
        return Err(anyhow::anyhow!("No API key configured"));
    }
    Ok(HttpRemoteClient::new(
        config.api_key.clone(),
        config.api_base_url.clone(),
        config.remote_timeout(),
    )?)
}

async fn run_validate_key(config: &Config) -> Result<()> {
    if !validate_api_key_format(&config.api_key) {
        return Err(anyhow::anyhow!("API key is missing or malformed"));
    }
    let client = remote_client(config)?;

    let spinner = ProgressManager::spinner("Validating API key...");
    let valid = client.validate_api_key().await;
    spinner.finish_and_clear();

    if valid {
        println!("API key is valid");
        Ok(())
    } else {
        Err(anyhow::anyhow!("API key was rejected by {}", client.base_url()))
    }
}

fn print_formats() {
    let capabilities = Capabilities::detect();
    println!("Input formats:  {}", SUPPORTED_INPUT_FORMATS.join(", "));
    println!("Output formats: {}", SUPPORTED_OUTPUT_FORMATS.join(", "));
    let encoders: Vec<&str> = capabilities
        .encodable_formats()
        .into_iter()
        .map(|f| f.extension())
        .collect();
    println!("Encoders in this build: {}", encoders.join(", "));
}
