//! # Optimization Engine
//!
//! Orchestratore di una singola immagine.
//!
//! ## Macchina a stati:
//! ```text
//! Start -> ResolvePlan -> (Resize?) -> Remote -> ok? ----------------> (Convert?) -> Commit
//!                                        \-> recuperabile -> Local -/
//! ```
//!
//! ## Regole:
//! - Il resize precede sempre ottimizzazione e conversione
//! - Le strategie (remota, locale) sono provate in ordine; `RemoteUnavailable`
//!   passa alla successiva, ogni altro errore termina la chiamata
//! - Il remoto è tentato al massimo una volta, e solo con una API key
//! - La conversione, se ancora dovuta, è l'ultimo passo raster
//! - Tutti gli intermedi sono `TempPath`: spariscono alla fine della chiamata
//! - Solo `FileTransaction::commit` tocca il file originale

use crate::attachment::{AttachmentResolver, ImageIdentity};
use crate::codec::RasterCodec;
use crate::config::Config;
use crate::convert::FormatConverter;
use crate::error::{OptimizeError, Result};
use crate::file_manager::FileManager;
use crate::formats::ImageFormat;
use crate::optimizer::locks::KeyedLocks;
use crate::optimizer::plan::ProcessingPlan;
use crate::remote::{HttpRemoteClient, NoRemote, RemoteDelegate};
use crate::resize::{ImageResizer, ResizeOutcome};
use crate::scratch::{stem_of, ScratchDir, TempPath};
use crate::store::{MetadataStore, OptimizationRecord};
use crate::transaction::FileTransaction;
use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Ways of producing an optimized artifact, tried in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Remote,
    Local,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Remote => f.write_str("remote"),
            Strategy::Local => f.write_str("local"),
        }
    }
}

/// An optimized intermediate in the scratch directory
#[derive(Debug)]
pub struct Artifact {
    pub path: TempPath,
    pub format: ImageFormat,
    pub strategy: Strategy,
}

/// Tagged result of a single strategy
#[derive(Debug)]
pub enum StrategyOutcome {
    Ok(Artifact),
    /// The next strategy may still succeed
    Recoverable(OptimizeError),
    Fatal(OptimizeError),
}

impl From<Result<Artifact>> for StrategyOutcome {
    fn from(result: Result<Artifact>) -> Self {
        match result {
            Ok(artifact) => StrategyOutcome::Ok(artifact),
            Err(e) if e.is_recoverable() => StrategyOutcome::Recoverable(e),
            Err(e) => StrategyOutcome::Fatal(e),
        }
    }
}

/// Optimized file ready to be committed
#[derive(Debug)]
pub struct ProcessedImage {
    pub path: TempPath,
    pub format: ImageFormat,
    pub strategy: Strategy,
    /// Dimensions after resizing, when a resize happened
    pub resized: Option<(u32, u32)>,
    pub original_size: u64,
    pub new_size: u64,
    pub savings_bytes: i64,
    pub savings_percent: f64,
}

/// Outcome of a committed optimization
#[derive(Debug, Clone)]
pub struct OptimizationReport {
    pub identity: ImageIdentity,
    pub path: PathBuf,
    pub format: ImageFormat,
    pub strategy: Strategy,
    pub record: OptimizationRecord,
}

/// Result of `Optimizer::optimize`
pub type OptimizationResult = Result<OptimizationReport>;

/// Run a raster stage off the async workers
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| OptimizeError::Worker(e.to_string()))?
}

/// Image optimization engine
pub struct Optimizer {
    config: Config,
    codec: RasterCodec,
    remote: Arc<dyn RemoteDelegate>,
    /// Client built from the config, kept to rewire its cancellation
    http: Option<HttpRemoteClient>,
    resolver: Arc<dyn AttachmentResolver>,
    store: Arc<dyn MetadataStore>,
    locks: KeyedLocks,
    scratch: ScratchDir,
    cancel: Option<watch::Receiver<bool>>,
}

impl Optimizer {
    /// Build an engine; the remote client is created only when an API key is set.
    pub fn new(
        config: Config,
        resolver: Arc<dyn AttachmentResolver>,
        store: Arc<dyn MetadataStore>,
    ) -> Result<Self> {
        let http = if config.has_api_key() {
            Some(HttpRemoteClient::new(
                config.api_key.clone(),
                config.api_base_url.clone(),
                config.remote_timeout(),
            )?)
        } else {
            None
        };
        let remote: Arc<dyn RemoteDelegate> = match &http {
            Some(client) => Arc::new(client.clone()),
            None => Arc::new(NoRemote),
        };
        let scratch = ScratchDir::under(resolver.upload_root());

        Ok(Self {
            config,
            codec: RasterCodec::default(),
            remote,
            http,
            resolver,
            store,
            locks: KeyedLocks::new(),
            scratch,
            cancel: None,
        })
    }

    pub fn with_codec(mut self, codec: RasterCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteDelegate>) -> Self {
        self.remote = remote;
        self.http = None;
        self
    }

    /// Once `cancel` reads `true`, images not yet started are refused and the
    /// built-in remote client issues no further requests.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        if let Some(client) = self.http.take() {
            let client = client.with_cancellation(cancel.clone());
            self.remote = Arc::new(client.clone());
            self.http = Some(client);
        }
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(cancel) if *cancel.borrow() => Err(OptimizeError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Optimize `identity` with the engine's configuration.
    pub async fn optimize(&self, identity: &ImageIdentity) -> OptimizationResult {
        self.optimize_with(identity, &self.config).await
    }

    /// Optimize, commit and record `identity` using `config`.
    ///
    /// On any error the file reachable by `identity` is left untouched.
    pub async fn optimize_with(&self, identity: &ImageIdentity, config: &Config) -> OptimizationResult {
        let _guard = self.locks.lock(identity).await;
        self.check_cancelled()?;

        let path = self.resolver.resolve(identity)?;
        let processed = self.process_file(&path, config).await.map_err(|e| {
            warn!("Optimization of {} failed ({}): {}", identity, e.kind(), e);
            e
        })?;

        let original_size = processed.original_size;
        let format = processed.format;
        let strategy = processed.strategy;
        let new_size = FileTransaction::commit(&path, processed.path).await?;

        let record = OptimizationRecord::new(original_size, new_size, Utc::now());
        self.store.put(identity, record.clone()).await?;

        info!(
            "Optimized {}: {} -> {} ({}%, {})",
            identity,
            FileManager::format_size(original_size),
            FileManager::format_size(new_size),
            record.savings_percent,
            strategy
        );

        Ok(OptimizationReport {
            identity: identity.clone(),
            path,
            format,
            strategy,
            record,
        })
    }

    /// Run the raster pipeline on `path` without touching it.
    pub async fn process_file(&self, path: &Path, config: &Config) -> Result<ProcessedImage> {
        let original_size = FileManager::file_size(path).await?;
        let codec = self.codec;

        let info = {
            let source = path.to_path_buf();
            blocking(move || codec.probe(&source)).await?
        };
        let plan = ProcessingPlan::resolve(path, &info, config)?;
        debug!("Plan for {}: {:?}", path.display(), plan);

        let mut resized_to = None;
        let resized = match plan.resize {
            Some(bounds) => {
                let resizer = ImageResizer::new(codec, self.scratch.clone()).with_algorithm(config.resize_algorithm);
                let source = path.to_path_buf();
                match blocking(move || resizer.resize(&source, bounds)).await? {
                    ResizeOutcome::Resized { path, width, height } => {
                        resized_to = Some((width, height));
                        Some(path)
                    }
                    ResizeOutcome::Unchanged => None,
                }
            }
            None => None,
        };
        let working = resized
            .as_ref()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| path.to_path_buf());

        let artifact = self.run_strategies(&working, &stem_of(path), &plan, config).await?;
        drop(resized);

        let artifact = if artifact.format != plan.target_format {
            debug!(
                "Converting {} artifact from {} to {}",
                artifact.strategy, artifact.format, plan.target_format
            );
            let converter = FormatConverter::new(codec, self.scratch.clone());
            let target = plan.target_format;
            let source = artifact.path.to_path_buf();
            let converted = blocking(move || converter.convert(&source, target)).await?;
            Artifact {
                path: converted,
                format: target,
                strategy: artifact.strategy,
            }
        } else {
            artifact
        };

        let new_size = FileManager::file_size(&artifact.path).await?;

        Ok(ProcessedImage {
            path: artifact.path,
            format: artifact.format,
            strategy: artifact.strategy,
            resized: resized_to,
            original_size,
            new_size,
            savings_bytes: original_size as i64 - new_size as i64,
            savings_percent: FileManager::savings_percent(original_size, new_size),
        })
    }

    /// Try each strategy once, in order, stopping at the first non-recoverable result.
    async fn run_strategies(
        &self,
        working: &Path,
        stem: &str,
        plan: &ProcessingPlan,
        config: &Config,
    ) -> Result<Artifact> {
        let mut chain = Vec::with_capacity(2);
        if config.has_api_key() && self.remote.is_configured() {
            chain.push(Strategy::Remote);
        }
        chain.push(Strategy::Local);

        let mut last_error = None;
        for strategy in chain {
            self.check_cancelled()?;
            let outcome: StrategyOutcome = match strategy {
                Strategy::Remote => self.optimize_remote(working, plan, config).await.into(),
                Strategy::Local => self.optimize_local(working, stem, plan).await.into(),
            };
            match outcome {
                StrategyOutcome::Ok(artifact) => return Ok(artifact),
                StrategyOutcome::Recoverable(e) => {
                    warn!("{} optimization unavailable, falling back: {}", strategy, e);
                    last_error = Some(e);
                }
                StrategyOutcome::Fatal(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            OptimizeError::EncodeFailure("no optimization strategy available".to_string())
        }))
    }

    async fn optimize_remote(&self, working: &Path, plan: &ProcessingPlan, config: &Config) -> Result<Artifact> {
        let outcome = self
            .remote
            .optimize_image(working, &plan.remote_options(config), &self.scratch)
            .await?;

        let codec = self.codec;
        let downloaded = outcome.path.to_path_buf();
        let info = blocking(move || codec.probe(&downloaded))
            .await
            .map_err(|e| OptimizeError::RemoteUnavailable(format!("unusable download: {}", e)))?;

        if info.format != plan.target_format && !codec.capabilities().can_decode(info.format) {
            return Err(OptimizeError::RemoteUnavailable(format!(
                "remote returned {} which cannot be converted",
                info.format
            )));
        }

        Ok(Artifact {
            path: outcome.path,
            format: info.format,
            strategy: Strategy::Remote,
        })
    }

    /// Decode and re-encode straight into the target format.
    async fn optimize_local(&self, working: &Path, stem: &str, plan: &ProcessingPlan) -> Result<Artifact> {
        let codec = self.codec;
        let scratch = self.scratch.clone();
        let source = working.to_path_buf();
        let stem = stem.to_string();
        let target = plan.target_format;
        let settings = plan.settings;

        let path = blocking(move || {
            if !codec.supports(target) {
                return Err(OptimizeError::UnsupportedOutputFormat(format!(
                    "no {} encoder available",
                    target
                )));
            }
            let decoded = codec.decode(&source)?;
            let dest = scratch.reserve(&stem, "optimized", target.extension())?;
            codec.encode(decoded, target, settings, &dest)?;
            Ok(dest)
        })
        .await?;

        Ok(Artifact {
            path,
            format: target,
            strategy: Strategy::Local,
        })
    }
}
