//! # Batch Optimization
//!
//! Ottimizzazione di molte immagini con concorrenza limitata.
//!
//! ## Strategia:
//! - Un task tokio per immagine, al massimo `workers` in esecuzione
//! - La stessa identità non viene mai elaborata in parallelo (lock per chiave)
//! - Un errore su un'immagine non ferma le altre: finisce nelle statistiche

use crate::attachment::ImageIdentity;
use crate::error::OptimizeError;
use crate::optimizer::engine::{OptimizationResult, Optimizer};
use crate::progress::{BatchStats, ProgressManager};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

/// Per-image results plus aggregate counters
#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<(ImageIdentity, OptimizationResult)>,
    pub stats: BatchStats,
}

impl Optimizer {
    /// Optimize every identity, at most `workers` at a time.
    pub async fn optimize_many(
        self: &Arc<Self>,
        identities: Vec<ImageIdentity>,
        progress: &ProgressManager,
    ) -> BatchReport {
        let workers = self.config().workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        info!("Optimizing {} images with {} workers", identities.len(), workers);

        let mut tasks = Vec::with_capacity(identities.len());
        for identity in &identities {
            let optimizer = Arc::clone(self);
            let semaphore = semaphore.clone();
            let progress = progress.clone();
            let identity = identity.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| OptimizeError::Worker(e.to_string()))?;
                let result = optimizer.optimize(&identity).await;
                progress.update(&describe(&identity, &result));
                result
            }));
        }

        let mut stats = BatchStats::new();
        let mut results = Vec::with_capacity(identities.len());
        for (identity, joined) in identities.into_iter().zip(join_all(tasks).await) {
            let result = joined.unwrap_or_else(|e| Err(OptimizeError::Worker(e.to_string())));
            match &result {
                Ok(report) => stats.add_optimized(report.record.original_size, report.record.new_size),
                Err(e) => {
                    error!("Failed to optimize {}: {}", identity, e);
                    stats.add_failed();
                }
            }
            results.push((identity, result));
        }

        BatchReport { results, stats }
    }
}

fn describe(identity: &ImageIdentity, result: &OptimizationResult) -> String {
    match result {
        Ok(report) => format!("{}: {}% saved", identity, report.record.savings_percent),
        Err(e) => format!("{}: failed ({})", identity, e.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::UploadDirResolver;
    use crate::config::Config;
    use crate::store::{MemoryMetadataStore, MetadataStore};
    use crate::test_support::write_jpeg;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_batch_counts_failures_separately() {
        let dir = TempDir::new().unwrap();
        write_jpeg(&dir.path().join("a.jpg"), 64, 64, 95);
        write_jpeg(&dir.path().join("b.jpg"), 48, 32, 95);
        std::fs::write(dir.path().join("c.png"), b"definitely not a png").unwrap();

        let store = Arc::new(MemoryMetadataStore::new());
        let config = Config {
            workers: 2,
            ..Default::default()
        };
        let optimizer = Arc::new(
            Optimizer::new(config, Arc::new(UploadDirResolver::new(dir.path())), store.clone()).unwrap(),
        );

        let ids: Vec<ImageIdentity> = ["a.jpg", "b.jpg", "c.png", "missing.gif"]
            .into_iter()
            .map(ImageIdentity::from)
            .collect();
        let report = optimizer.optimize_many(ids, &ProgressManager::hidden()).await;

        assert_eq!(report.stats.processed, 4);
        assert_eq!(report.stats.optimized, 2);
        assert_eq!(report.stats.failed, 2);
        assert_eq!(report.results[0].0.as_str(), "a.jpg");
        assert!(report.results[0].1.is_ok());
        assert!(matches!(report.results[2].1, Err(OptimizeError::UnsupportedInputFormat(_))));
        assert!(matches!(report.results[3].1, Err(OptimizeError::FileNotFound(_))));
        assert_eq!(store.stats().await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_duplicate_identities_are_serialized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("same.jpg");
        write_jpeg(&path, 96, 96, 95);

        let optimizer = Arc::new(
            Optimizer::new(
                Config::default(),
                Arc::new(UploadDirResolver::new(dir.path())),
                Arc::new(MemoryMetadataStore::new()),
            )
            .unwrap(),
        );

        let ids = vec![ImageIdentity::from("same.jpg"); 4];
        let report = optimizer.optimize_many(ids, &ProgressManager::hidden()).await;

        assert_eq!(report.stats.optimized, 4);
        assert!(crate::codec::RasterCodec::default().decode(&path).is_ok());
        assert!(!crate::transaction::FileTransaction::backup_path(&path).exists());
    }
}
