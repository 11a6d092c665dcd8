//! # File Management Module
//!
//! Questo modulo raccoglie le operazioni sui file e la discovery delle immagini.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva delle immagini sotto la upload root
//! - Esclusione della directory temporanea `kafunel_temp` dalla discovery
//! - Lettura della dimensione dei file
//! - Calcolo del risparmio percentuale e formattazione human-readable delle dimensioni
//!
//! ## Formati scansionati:
//! JPG, JPEG, PNG, GIF, WebP (il catalogo degli input)
//!
//! ## Esempio:
//! ```rust
//! use kafunel_optimizer::FileManager;
//!
//! assert_eq!(FileManager::format_size(1536), "1.50 KB");
//! assert_eq!(FileManager::savings_percent(300, 200), 33.33);
//! ```

use crate::error::{OptimizeError, Result};
use crate::formats::supports_input_format;
use crate::scratch::SCRATCH_DIR_NAME;
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// File helpers shared by the engine and the CLI
pub struct FileManager;

impl FileManager {
    /// Size in bytes; a missing file is `FileNotFound`.
    pub async fn file_size(path: &Path) -> Result<u64> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OptimizeError::FileNotFound(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Find all supported images under `root`, skipping the scratch directory
    pub fn find_images(root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == SCRATCH_DIR_NAME))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| Self::is_image(p))
            .collect();
        files.sort();
        files
    }

    /// Check if a file has a supported input extension
    pub fn is_image(path: &Path) -> bool {
        path.extension()
            .map(|ext| supports_input_format(&ext.to_string_lossy()))
            .unwrap_or(false)
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// `format_size` for savings, which can be negative
    pub fn format_signed_size(bytes: i64) -> String {
        if bytes < 0 {
            format!("-{}", Self::format_size(bytes.unsigned_abs()))
        } else {
            Self::format_size(bytes as u64)
        }
    }

    /// Percentage saved, rounded to 2 decimals; 0 for an empty original
    pub fn savings_percent(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            return 0.0;
        }
        let percent = (original_size as f64 - new_size as f64) / original_size as f64 * 100.0;
        (percent * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_savings_percent() {
        assert_eq!(FileManager::savings_percent(0, 10), 0.0);
        assert_eq!(FileManager::savings_percent(1000, 750), 25.0);
        assert_eq!(FileManager::savings_percent(3, 2), 33.33);
        assert_eq!(FileManager::savings_percent(3, 1), 66.67);
        assert_eq!(FileManager::savings_percent(100, 150), -50.0);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(2048), "2.00 KB");
        assert_eq!(FileManager::format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(FileManager::format_signed_size(-2048), "-2.00 KB");
    }

    #[test]
    fn test_find_images_skips_scratch() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("2024/01")).unwrap();
        std::fs::create_dir_all(root.join(SCRATCH_DIR_NAME)).unwrap();
        for name in ["a.JPG", "2024/01/b.png", "2024/01/c.gif", "notes.txt", "d.jpg.bak"] {
            std::fs::write(root.join(name), b"x").unwrap();
        }
        std::fs::write(root.join(SCRATCH_DIR_NAME).join("tmp_resized_abc.jpg"), b"x").unwrap();

        let found = FileManager::find_images(root);
        assert_eq!(
            found,
            vec![root.join("2024/01/b.png"), root.join("2024/01/c.gif"), root.join("a.JPG")]
        );
    }

    #[tokio::test]
    async fn test_file_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, vec![0u8; 123]).unwrap();
        assert_eq!(FileManager::file_size(&path).await.unwrap(), 123);

        let err = FileManager::file_size(&dir.path().join("none")).await.unwrap_err();
        assert!(matches!(err, OptimizeError::FileNotFound(_)));
    }
}
