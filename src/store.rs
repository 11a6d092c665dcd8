//! # Metadata Store Module
//!
//! Questo modulo persiste il risultato dell'ultima ottimizzazione di ogni immagine.
//!
//! ## Responsabilità:
//! - Definisce `OptimizationRecord`, scritto dopo ogni commit riuscito
//! - Sovrascrive (non accoda) il record ad ogni nuova ottimizzazione
//! - Fornisce lo stato di ottimizzazione leggibile di una singola immagine
//! - Fornisce statistiche aggregate sui record salvati
//!
//! ## Implementazioni:
//! - `JsonMetadataStore`: un file JSON, di default `~/.kafunel-optimizer/metadata.json`
//! - `MemoryMetadataStore`: solo in memoria, per test ed embedding
//!
//! ## Esempio struttura file:
//! ```json
//! {
//!   "records": {
//!     "2024/05/cat.jpg": {
//!       "original_size": 1048576,
//!       "new_size": 524288,
//!       "savings_bytes": 524288,
//!       "savings_percent": 50.0,
//!       "optimized_timestamp": 1716200000,
//!       "optimized": true,
//!       "optimized_date": "2024-05-20T10:13:20Z"
//!     }
//!   }
//! }
//! ```

use crate::attachment::ImageIdentity;
use crate::error::{OptimizeError, Result};
use crate::file_manager::FileManager;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Latest optimization result of an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecord {
    pub original_size: u64,
    pub new_size: u64,
    pub savings_bytes: i64,
    pub savings_percent: f64,
    /// Unix seconds
    pub optimized_timestamp: u64,
    pub optimized: bool,
    pub optimized_date: DateTime<Utc>,
}

impl OptimizationRecord {
    pub fn new(original_size: u64, new_size: u64, at: DateTime<Utc>) -> Self {
        Self {
            original_size,
            new_size,
            savings_bytes: original_size as i64 - new_size as i64,
            savings_percent: FileManager::savings_percent(original_size, new_size),
            optimized_timestamp: at.timestamp().max(0) as u64,
            optimized: true,
            optimized_date: at,
        }
    }
}

/// Optimization status shown to users
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OptimizationStatus {
    NotOptimized,
    Optimized {
        original_size: u64,
        new_size: u64,
        savings_bytes: i64,
        savings_percent: f64,
        message: String,
    },
}

impl OptimizationStatus {
    pub fn from_record(record: Option<&OptimizationRecord>) -> Self {
        match record {
            Some(r) if r.optimized => OptimizationStatus::Optimized {
                original_size: r.original_size,
                new_size: r.new_size,
                savings_bytes: r.savings_bytes,
                savings_percent: r.savings_percent,
                message: format!(
                    "Optimized: {} saved ({}%)",
                    FileManager::format_signed_size(r.savings_bytes),
                    r.savings_percent
                ),
            },
            _ => OptimizationStatus::NotOptimized,
        }
    }

    pub fn is_optimized(&self) -> bool {
        matches!(self, OptimizationStatus::Optimized { .. })
    }
}

/// Aggregates over every stored record
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StoreStats {
    pub count: usize,
    pub total_saved: i64,
    pub average_percent: f64,
}

fn stats_of<'a>(records: impl Iterator<Item = &'a OptimizationRecord>) -> StoreStats {
    let mut stats = StoreStats::default();
    let mut percent_sum = 0.0;
    for record in records {
        stats.count += 1;
        stats.total_saved += record.savings_bytes;
        percent_sum += record.savings_percent;
    }
    if stats.count > 0 {
        stats.average_percent = percent_sum / stats.count as f64;
    }
    stats
}

/// Caller-owned sink for optimization results.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, identity: &ImageIdentity) -> Result<Option<OptimizationRecord>>;

    /// Replace whatever was stored for `identity`.
    async fn put(&self, identity: &ImageIdentity, record: OptimizationRecord) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;

    async fn status(&self, identity: &ImageIdentity) -> Result<OptimizationStatus> {
        Ok(OptimizationStatus::from_record(self.get(identity).await?.as_ref()))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    records: BTreeMap<ImageIdentity, OptimizationRecord>,
}

/// Records kept in a single JSON file
pub struct JsonMetadataStore {
    path: PathBuf,
    state: Mutex<StoreFile>,
}

impl JsonMetadataStore {
    /// Load `path`, starting empty when it is missing or unreadable.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = fs::read_to_string(&path).await?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring corrupt metadata file {}: {}", path.display(), e);
                StoreFile::default()
            })
        } else {
            StoreFile::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self, state: &StoreFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| OptimizeError::Metadata(e.to_string()))?;
        fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for JsonMetadataStore {
    async fn get(&self, identity: &ImageIdentity) -> Result<Option<OptimizationRecord>> {
        Ok(self.state.lock().await.records.get(identity).cloned())
    }

    async fn put(&self, identity: &ImageIdentity, record: OptimizationRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        state.records.insert(identity.clone(), record);
        self.save(&state).await?;
        debug!("Stored record for {} in {}", identity, self.path.display());
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(stats_of(self.state.lock().await.records.values()))
    }
}

/// In-memory store
#[derive(Default)]
pub struct MemoryMetadataStore {
    records: Mutex<BTreeMap<ImageIdentity, OptimizationRecord>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, identity: &ImageIdentity) -> Result<Option<OptimizationRecord>> {
        Ok(self.records.lock().await.get(identity).cloned())
    }

    async fn put(&self, identity: &ImageIdentity, record: OptimizationRecord) -> Result<()> {
        self.records.lock().await.insert(identity.clone(), record);
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(stats_of(self.records.lock().await.values()))
    }
}
