//! Image identities and their mapping to files on disk.
//!
//! The engine never receives a bare path: callers hand it an
//! [`ImageIdentity`] and an [`AttachmentResolver`] turns it into the file to
//! optimize. Records are persisted under the same identity.

use crate::error::{OptimizeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Caller-defined key of an image, e.g. an attachment reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageIdentity(String);

impl ImageIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageIdentity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Maps identities to files.
pub trait AttachmentResolver: Send + Sync {
    /// Path of an existing file for `identity`.
    fn resolve(&self, identity: &ImageIdentity) -> Result<PathBuf>;

    /// Root under which the scratch directory lives.
    fn upload_root(&self) -> &Path;
}

/// Identities are paths relative to an upload directory.
#[derive(Debug, Clone)]
pub struct UploadDirResolver {
    root: PathBuf,
}

impl UploadDirResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Inverse of `resolve`, for files found by walking the root.
    pub fn identity_for(&self, path: &Path) -> Option<ImageIdentity> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Option<_>>()?;
        if parts.is_empty() {
            return None;
        }
        Some(ImageIdentity::new(parts.join("/")))
    }
}

impl AttachmentResolver for UploadDirResolver {
    fn resolve(&self, identity: &ImageIdentity) -> Result<PathBuf> {
        let relative = Path::new(identity.as_str());
        // identities never escape the upload root
        if identity.as_str().is_empty()
            || !relative.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(OptimizeError::FileNotFound(relative.to_path_buf()));
        }

        let path = self.root.join(relative);
        if !path.is_file() {
            return Err(OptimizeError::FileNotFound(path));
        }
        Ok(path)
    }

    fn upload_root(&self) -> &Path {
        &self.root
    }
}
