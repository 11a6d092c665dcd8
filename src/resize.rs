//! # Image Resize Module
//!
//! Ridimensionamento in memoria che preserva l'aspect ratio, eseguito prima
//! di qualsiasi compressione.
//!
//! ## Caratteristiche
//! - **SOLO RESIZE**: qualità fissa (90 per i formati lossy, livello 6 per PNG),
//!   indipendente dal livello di compressione configurato
//! - **No-op**: se l'immagine sta già nei limiti restituisce il path originale
//! - **Fit in due passi**: prima sulla larghezza, poi, se serve, sull'altezza
//! - **Trasparenza**: per PNG e GIF la tela di destinazione è RGBA, riempita
//!   di pixel completamente trasparenti e sostituita (non fusa) dal risultato
//!
//! ## Esempio
//! ```text
//! 3000x1500, limiti 1920x1080
//!   passo 1 (larghezza): 1920x960
//!   passo 2 (altezza):   960 <= 1080, niente da fare
//! ```

use crate::codec::{DecodedImage, RasterCodec};
use crate::error::{OptimizeError, Result};
use crate::formats::{EncodeSettings, ImageFormat};
use crate::scratch::{stem_of, ScratchDir, TempPath};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Resampling filters available to the resizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeAlgorithm {
    /// Lanczos - best quality for downscaling
    #[default]
    Lanczos,
    /// Catmull-Rom - good general quality
    CatmullRom,
    /// Triangle - fast, acceptable for previews
    Triangle,
    /// Nearest - pixel perfect, no smoothing
    Nearest,
}

impl ResizeAlgorithm {
    pub fn filter(self) -> FilterType {
        match self {
            ResizeAlgorithm::Lanczos => FilterType::Lanczos3,
            ResizeAlgorithm::CatmullRom => FilterType::CatmullRom,
            ResizeAlgorithm::Triangle => FilterType::Triangle,
            ResizeAlgorithm::Nearest => FilterType::Nearest,
        }
    }
}

/// Maximum output dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeBounds {
    pub max_width: u32,
    pub max_height: u32,
}

impl ResizeBounds {
    pub fn new(max_width: u32, max_height: u32) -> Result<Self> {
        if max_width == 0 || max_height == 0 {
            return Err(OptimizeError::ResizeFailure(format!(
                "bounds must be positive, got {}x{}",
                max_width, max_height
            )));
        }
        Ok(Self { max_width, max_height })
    }

    pub fn fits(&self, width: u32, height: u32) -> bool {
        width <= self.max_width && height <= self.max_height
    }
}

/// Target dimensions for `width`x`height`, or `None` when no resize is needed.
///
/// Width is fitted first; height is fitted afterwards only if it still
/// exceeds the bound.
pub fn fit_dimensions(width: u32, height: u32, bounds: ResizeBounds) -> Option<(u32, u32)> {
    if bounds.fits(width, height) {
        return None;
    }

    let mut new_width = width as f64;
    let mut new_height = height as f64;

    if new_width > bounds.max_width as f64 {
        let ratio = bounds.max_width as f64 / new_width;
        new_width = bounds.max_width as f64;
        new_height *= ratio;
    }

    if new_height > bounds.max_height as f64 {
        let ratio = bounds.max_height as f64 / new_height;
        new_height = bounds.max_height as f64;
        new_width *= ratio;
    }

    Some((
        (new_width.round() as u32).max(1),
        (new_height.round() as u32).max(1),
    ))
}

/// Result of a resize request.
#[derive(Debug)]
pub enum ResizeOutcome {
    /// Source already fits; keep using the original path.
    Unchanged,
    /// A downscaled copy in the scratch directory.
    Resized {
        path: TempPath,
        width: u32,
        height: u32,
    },
}

/// Downscales images into the scratch directory
#[derive(Debug, Clone)]
pub struct ImageResizer {
    codec: RasterCodec,
    scratch: ScratchDir,
    algorithm: ResizeAlgorithm,
}

impl ImageResizer {
    pub fn new(codec: RasterCodec, scratch: ScratchDir) -> Self {
        Self {
            codec,
            scratch,
            algorithm: ResizeAlgorithm::default(),
        }
    }

    pub fn with_algorithm(mut self, algorithm: ResizeAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Fit `path` inside `bounds`.
    ///
    /// # Errors
    /// - `FileNotFound` / `UnsupportedInputFormat` when the source cannot be opened
    /// - `ResizeFailure` for any decode, encode or write problem
    pub fn resize(&self, path: &Path, bounds: ResizeBounds) -> Result<ResizeOutcome> {
        let info = self.codec.probe(path).map_err(to_resize_failure)?;

        let Some((width, height)) = fit_dimensions(info.width, info.height, bounds) else {
            debug!(
                "{} is {}x{}, within {}x{}: no resize",
                path.display(),
                info.width,
                info.height,
                bounds.max_width,
                bounds.max_height
            );
            return Ok(ResizeOutcome::Unchanged);
        };

        let decoded = self.codec.decode(path).map_err(to_resize_failure)?;
        let format = decoded.format();
        let resized = resample(decoded.into_pixels(), format, width, height, self.algorithm.filter());

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| ImageFormat::from_extension(e) == Some(format))
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| format.extension().to_string());
        let dest = self.scratch.reserve(&stem_of(path), "resized", &extension)?;

        self.codec
            .encode(DecodedImage::new(resized, format), format, EncodeSettings::RESIZE, &dest)
            .map_err(to_resize_failure)?;

        info!(
            "Resized {} from {}x{} to {}x{}",
            path.display(),
            info.width,
            info.height,
            width,
            height
        );

        Ok(ResizeOutcome::Resized {
            path: dest,
            width,
            height,
        })
    }
}

fn to_resize_failure(err: OptimizeError) -> OptimizeError {
    match err {
        OptimizeError::FileNotFound(_) | OptimizeError::UnsupportedInputFormat(_) => err,
        other => OptimizeError::ResizeFailure(other.to_string()),
    }
}

/// Resample `pixels`; PNG/GIF go through a transparent RGBA canvas.
fn resample(pixels: DynamicImage, format: ImageFormat, width: u32, height: u32, filter: FilterType) -> DynamicImage {
    if format.preserves_transparency() {
        let source = pixels.to_rgba8();
        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 0]));
        let scaled = imageops::resize(&source, width, height, filter);
        // replace, not overlay: no alpha blending onto the canvas
        imageops::replace(&mut canvas, &scaled, 0, 0);
        DynamicImage::ImageRgba8(canvas)
    } else {
        pixels.resize_exact(width, height, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Capabilities;
    use crate::test_support::{write_jpeg, write_png_with_alpha};
    use tempfile::TempDir;

    fn resizer(dir: &TempDir) -> ImageResizer {
        ImageResizer::new(RasterCodec::new(Capabilities::baseline()), ScratchDir::under(dir.path()))
    }

    #[test]
    fn test_fit_width_first() {
        let bounds = ResizeBounds::new(1920, 1080).unwrap();
        assert_eq!(fit_dimensions(3000, 1500, bounds), Some((1920, 960)));
    }

    #[test]
    fn test_fit_height_second() {
        let bounds = ResizeBounds::new(1920, 1080).unwrap();
        // 2000x2000 -> 1920x1920 -> 1080x1080
        assert_eq!(fit_dimensions(2000, 2000, bounds), Some((1080, 1080)));
        // tall image only exceeds height
        assert_eq!(fit_dimensions(1000, 4000, bounds), Some((270, 1080)));
    }

    #[test]
    fn test_fit_noop_within_bounds() {
        let bounds = ResizeBounds::new(1920, 1080).unwrap();
        assert_eq!(fit_dimensions(1920, 1080, bounds), None);
        assert_eq!(fit_dimensions(10, 10, bounds), None);
    }

    #[test]
    fn test_fit_preserves_aspect_ratio() {
        let bounds = ResizeBounds::new(800, 600).unwrap();
        for (w, h) in [(4000u32, 3000u32), (1234, 5678), (3001, 1999), (1600, 900)] {
            let (nw, nh) = fit_dimensions(w, h, bounds).unwrap();
            assert!(bounds.fits(nw, nh), "{}x{} -> {}x{}", w, h, nw, nh);
            let original = w as f64 / h as f64;
            let resized = nw as f64 / nh as f64;
            // half a pixel of rounding on each side
            let tolerance = 0.5 / nw as f64 + 0.5 / nh as f64 + 1e-9;
            assert!((resized / original - 1.0).abs() <= tolerance, "{}x{} -> {}x{}", w, h, nw, nh);
        }
    }

    #[test]
    fn test_zero_bounds_rejected() {
        assert!(matches!(ResizeBounds::new(0, 10), Err(OptimizeError::ResizeFailure(_))));
    }

    #[test]
    fn test_resize_noop_returns_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("small.jpg");
        write_jpeg(&path, 50, 40, 90);

        let outcome = resizer(&dir).resize(&path, ResizeBounds::new(100, 100).unwrap()).unwrap();
        assert!(matches!(outcome, ResizeOutcome::Unchanged));
        assert!(!dir.path().join("kafunel_temp").exists());
    }

    #[test]
    fn test_resize_jpeg_into_scratch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wide.jpg");
        write_jpeg(&path, 300, 150, 90);

        let r = resizer(&dir);
        let outcome = r.resize(&path, ResizeBounds::new(192, 108).unwrap()).unwrap();
        let ResizeOutcome::Resized { path: out, width, height } = outcome else {
            panic!("expected a resize");
        };
        assert_eq!((width, height), (192, 96));
        assert!(out.starts_with(dir.path().join("kafunel_temp")));
        assert_eq!(out.extension().unwrap(), "jpg");

        let info = RasterCodec::default().probe(&out).unwrap();
        assert_eq!((info.width, info.height), (192, 96));
        assert_eq!(info.format, ImageFormat::Jpeg);

        let out_path = out.to_path_buf();
        drop(out);
        assert!(!out_path.exists());
    }

    #[test]
    fn test_resize_png_keeps_transparency() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logo.png");
        write_png_with_alpha(&path, 200, 100);

        let outcome = resizer(&dir).resize(&path, ResizeBounds::new(100, 100).unwrap()).unwrap();
        let ResizeOutcome::Resized { path: out, width, height } = outcome else {
            panic!("expected a resize");
        };
        assert_eq!((width, height), (100, 50));

        let decoded = RasterCodec::default().decode(&out).unwrap();
        let rgba = decoded.pixels().to_rgba8();
        for (x, y) in [(0, 0), (10, 10), (30, 49)] {
            assert_eq!(rgba.get_pixel(x, y)[3], 0, "pixel {},{} should stay transparent", x, y);
        }
        assert_eq!(rgba.get_pixel(90, 25)[3], 255);
    }

    #[test]
    fn test_resize_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = resizer(&dir)
            .resize(&dir.path().join("nope.png"), ResizeBounds::new(10, 10).unwrap())
            .unwrap_err();
        assert!(matches!(err, OptimizeError::FileNotFound(_)));
    }
}
