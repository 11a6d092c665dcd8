//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore del motore di ottimizzazione.
//!
//! ## Categorie di errori:
//! - `FileNotFound`: il file associato all'immagine non esiste
//! - `UnsupportedInputFormat` / `UnsupportedOutputFormat`: formato fuori catalogo
//!   o encoder non disponibile sulla piattaforma
//! - `DecodeFailure` / `EncodeFailure`: dati immagine corrotti o scrittura fallita
//! - `ResizeFailure`: ridimensionamento fallito
//! - `RemoteUnavailable`: servizio remoto assente, irraggiungibile o con risposta non valida
//! - `BackupFailure` / `CommitFailure`: sostituzione del file originale fallita
//!
//! ## Politica di propagazione:
//! `RemoteUnavailable` è sempre recuperabile: l'orchestratore ripiega
//! sull'ottimizzazione locale. Tutti gli altri errori terminano la chiamata
//! senza toccare il file originale.
//!
//! ## Esempio:
//! ```rust
//! use kafunel_optimizer::OptimizeError;
//!
//! let err = OptimizeError::RemoteUnavailable("no API key configured".to_string());
//! assert!(err.is_recoverable());
//! ```

use std::path::PathBuf;

/// Custom error types for image optimization
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Unsupported input format: {0}")]
    UnsupportedInputFormat(String),

    #[error("Unsupported output format: {0}")]
    UnsupportedOutputFormat(String),

    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    #[error("Encode failure: {0}")]
    EncodeFailure(String),

    #[error("Resize failure: {0}")]
    ResizeFailure(String),

    #[error("Remote delegate unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Backup failure: {0}")]
    BackupFailure(String),

    #[error("Commit failure (original restored): {0}")]
    CommitFailure(String),

    #[error("Metadata store error: {0}")]
    Metadata(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl OptimizeError {
    /// Whether the orchestrator may fall through to the next strategy.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, OptimizeError::RemoteUnavailable(_))
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            OptimizeError::FileNotFound(_) => "file_not_found",
            OptimizeError::UnsupportedInputFormat(_) => "unsupported_input_format",
            OptimizeError::UnsupportedOutputFormat(_) => "unsupported_output_format",
            OptimizeError::DecodeFailure(_) => "decode_failure",
            OptimizeError::EncodeFailure(_) => "encode_failure",
            OptimizeError::ResizeFailure(_) => "resize_failure",
            OptimizeError::RemoteUnavailable(_) => "remote_unavailable",
            OptimizeError::BackupFailure(_) => "backup_failure",
            OptimizeError::CommitFailure(_) => "commit_failure",
            OptimizeError::Metadata(_) => "metadata",
            OptimizeError::Cancelled => "cancelled",
            OptimizeError::Worker(_) => "worker",
            OptimizeError::Io(_) => "io",
            OptimizeError::Image(_) => "image",
        }
    }
}

pub type Result<T, E = OptimizeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_remote_failures_are_recoverable() {
        assert!(OptimizeError::RemoteUnavailable("timeout".into()).is_recoverable());
        assert!(!OptimizeError::DecodeFailure("bad header".into()).is_recoverable());
        assert!(!OptimizeError::CommitFailure("disk full".into()).is_recoverable());
        assert!(!OptimizeError::Cancelled.is_recoverable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: OptimizeError = io.into();
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("denied"));
    }
}
