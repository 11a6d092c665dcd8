//! # File Transaction Module
//!
//! Unico punto del motore autorizzato a modificare il file originale.
//!
//! ## Protocollo di commit:
//! 1. Copia `originale` -> `originale.bak` (il backup è il log di undo);
//!    se la copia fallisce si abbandona senza toccare l'originale
//! 2. Copia il file ottimizzato in un file di staging nella stessa directory,
//!    con i permessi dell'originale, poi `rename` atomico sopra l'originale
//! 3. Successo: rimozione del backup e del file temporaneo ottimizzato
//! 4. Errore: il backup viene rinominato sopra l'originale e sparisce;
//!    l'originale resta identico byte per byte

use crate::error::{OptimizeError, Result};
use crate::scratch::TempPath;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info};

/// Backup/rollback replacement of an original file
pub struct FileTransaction;

impl FileTransaction {
    /// `<original>.bak`
    pub fn backup_path(original: &Path) -> PathBuf {
        append_to_name(original, ".bak")
    }

    fn staging_path(original: &Path) -> PathBuf {
        append_to_name(original, ".kafunel-staged")
    }

    /// Replace `original` with `optimized` and return the new size.
    ///
    /// `optimized` is consumed and deleted whatever the outcome.
    pub async fn commit(original: &Path, optimized: TempPath) -> Result<u64> {
        let backup = Self::backup_path(original);

        if let Err(e) = fs::copy(original, &backup).await {
            let _ = fs::remove_file(&backup).await;
            return Err(OptimizeError::BackupFailure(format!(
                "cannot back up {}: {}",
                original.display(),
                e
            )));
        }
        debug!("Backup written to {}", backup.display());

        match Self::swap_in(original, &optimized).await {
            Ok(new_size) => {
                let _ = fs::remove_file(&backup).await;
                drop(optimized);
                info!("Committed {} ({} bytes)", original.display(), new_size);
                Ok(new_size)
            }
            Err(e) => {
                Self::rollback(original, &backup).await;
                Err(OptimizeError::CommitFailure(format!(
                    "replacing {}: {}",
                    original.display(),
                    e
                )))
            }
        }
    }

    /// Stage `optimized` next to `original` with the original's permissions,
    /// then rename it into place. Returns the bytes written.
    async fn swap_in(original: &Path, optimized: &Path) -> std::io::Result<u64> {
        let staged = Self::staging_path(original);
        let result = async {
            let permissions = fs::metadata(original).await?.permissions();
            let written = fs::copy(optimized, &staged).await?;
            fs::set_permissions(&staged, permissions).await?;
            fs::rename(&staged, original).await?;
            Ok(written)
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&staged).await;
        }
        result
    }

    /// Put the backup back in place; it never survives this call.
    async fn rollback(original: &Path, backup: &Path) {
        if let Err(e) = fs::rename(backup, original).await {
            error!(
                "Restoring {} from {} failed: {}",
                original.display(),
                backup.display(),
                e
            );
            let _ = fs::remove_file(backup).await;
        }
    }
}

fn append_to_name(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
