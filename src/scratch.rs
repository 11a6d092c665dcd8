//! Shared scratch directory for intermediate artifacts.
//!
//! Every resized, downloaded or converted file is reserved here as a
//! [`TempPath`], which deletes the file when dropped. A pipeline call that
//! returns early, successfully or not, therefore leaves nothing behind.

use crate::error::Result;
use std::path::{Path, PathBuf};
pub use tempfile::TempPath;

/// Directory name under the upload root.
pub const SCRATCH_DIR_NAME: &str = "kafunel_temp";

#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// `<upload_root>/kafunel_temp`
    pub fn under(upload_root: &Path) -> Self {
        Self {
            root: upload_root.join(SCRATCH_DIR_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create the directory if missing. Safe to race.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Reserve `<stem>_<tag>_XXXXXX.<extension>`.
    pub fn reserve(&self, stem: &str, tag: &str, extension: &str) -> Result<TempPath> {
        self.reserve_raw(&format!("{}_{}_", stem, tag), &format!(".{}", extension))
    }

    /// Reserve a file with an arbitrary prefix and suffix around the random part.
    pub fn reserve_raw(&self, prefix: &str, suffix: &str) -> Result<TempPath> {
        self.ensure()?;
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .rand_bytes(6)
            .tempfile_in(&self.root)?;
        Ok(file.into_temp_path())
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }
}

/// File stem used to name intermediates derived from `path`.
pub fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reserve_and_drop() {
        let upload = TempDir::new().unwrap();
        let scratch = ScratchDir::under(upload.path());
        scratch.ensure().unwrap();
        scratch.ensure().unwrap();

        let reserved = scratch.reserve("photo", "resized", "jpg").unwrap();
        let kept_path = reserved.to_path_buf();
        assert!(kept_path.exists());
        assert!(scratch.contains(&kept_path));
        let name = kept_path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("photo_resized_"));
        assert!(name.ends_with(".jpg"));

        drop(reserved);
        assert!(!kept_path.exists());
        assert_eq!(scratch.path(), upload.path().join("kafunel_temp"));
    }

    #[test]
    fn test_reservations_are_unique() {
        let upload = TempDir::new().unwrap();
        let scratch = ScratchDir::under(upload.path());
        let a = scratch.reserve("same", "optimized", "png").unwrap();
        let b = scratch.reserve("same", "optimized", "png").unwrap();
        assert_ne!(a.to_path_buf(), b.to_path_buf());
    }

    #[test]
    fn test_stem_of() {
        assert_eq!(stem_of(Path::new("/x/holiday.final.JPG")), "holiday.final");
        assert_eq!(stem_of(Path::new("/")), "image");
    }
}
