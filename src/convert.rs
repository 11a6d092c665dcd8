//! Format conversion, always the last raster step of the pipeline.

use crate::codec::RasterCodec;
use crate::error::{OptimizeError, Result};
use crate::formats::{EncodeSettings, ImageFormat};
use crate::scratch::{stem_of, ScratchDir, TempPath};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct FormatConverter {
    codec: RasterCodec,
    scratch: ScratchDir,
}

impl FormatConverter {
    pub fn new(codec: RasterCodec, scratch: ScratchDir) -> Self {
        Self { codec, scratch }
    }

    /// Re-encode `path` as `target` at the fixed conversion quality.
    pub fn convert(&self, path: &Path, target: ImageFormat) -> Result<TempPath> {
        if !self.codec.supports(target) {
            return Err(OptimizeError::UnsupportedOutputFormat(format!(
                "cannot convert {} to {}",
                path.display(),
                target
            )));
        }

        let decoded = self.codec.decode(path)?;
        let source = decoded.format();
        let dest = self.scratch.reserve(&stem_of(path), "converted", target.extension())?;
        self.codec.encode(decoded, target, EncodeSettings::CONVERT, &dest)?;

        info!("Converted {} from {} to {}", path.display(), source, target);
        Ok(dest)
    }
}
