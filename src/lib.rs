//! # Kafunel Optimizer Library
//!
//! Motore di ottimizzazione immagini: ricompressione, resize, conversione di
//! formato, delega a un servizio remoto e sostituzione sicura del file originale.
//!
//! ## Architettura dei moduli:
//! - `formats`: Catalogo formati e mappatura livelli di compressione
//! - `codec`: Decodifica/codifica in memoria e capacità della piattaforma
//! - `resize`: Ridimensionamento con aspect ratio e trasparenza preservati
//! - `convert`: Conversione di formato, sempre ultimo passo raster
//! - `remote`: Client HTTP del servizio remoto
//! - `transaction`: Commit con backup e rollback
//! - `optimizer`: Orchestratore (piano, strategie, batch)
//! - `store`: Persistenza dei risultati per identità
//! - `attachment`: Identità delle immagini e risoluzione su disco
//! - `config`, `error`, `file_manager`, `progress`, `scratch`: supporto
//!
//! ## Utilizzo:
//! ```rust,no_run
//! use kafunel_optimizer::{Config, ImageIdentity, MemoryMetadataStore, Optimizer, UploadDirResolver};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let optimizer = Optimizer::new(
//!     Config::default(),
//!     Arc::new(UploadDirResolver::new("/var/www/uploads")),
//!     Arc::new(MemoryMetadataStore::new()),
//! )?;
//! let report = optimizer.optimize(&ImageIdentity::from("2024/05/cat.jpg")).await?;
//! println!("saved {}%", report.record.savings_percent);
//! # Ok::<(), kafunel_optimizer::OptimizeError>(())
//! # });
//! ```

pub mod attachment;
pub mod codec;
pub mod config;
pub mod convert;
pub mod error;
pub mod file_manager;
pub mod formats;
pub mod optimizer;
pub mod progress;
pub mod remote;
pub mod resize;
pub mod scratch;
pub mod store;
pub mod transaction;

#[cfg(test)]
mod test_support;

pub use attachment::{AttachmentResolver, ImageIdentity, UploadDirResolver};
pub use codec::{Capabilities, RasterCodec};
pub use config::Config;
pub use error::{OptimizeError, Result};
pub use file_manager::FileManager;
pub use formats::{CompressionLevel, ImageFormat, OutputFormat};
pub use optimizer::{BatchReport, OptimizationReport, OptimizationResult, Optimizer, Strategy};
pub use progress::{BatchStats, ProgressManager};
pub use remote::{HttpRemoteClient, RemoteDelegate, RemoteFeature, RemoteOptions};
pub use store::{JsonMetadataStore, MemoryMetadataStore, MetadataStore, OptimizationRecord, OptimizationStatus};
pub use transaction::FileTransaction;
