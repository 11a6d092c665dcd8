//! # Format Catalog
//!
//! Tabelle statiche dei formati supportati e mapping livello di
//! compressione → parametri numerici degli encoder.
//!
//! | Livello    | Qualità (1-100) | PNG (0-9) |
//! |------------|-----------------|-----------|
//! | lossless   | 95              | 0         |
//! | optimal    | 85              | 3         |
//! | aggressive | 70              | 6         |
//! | maximum    | 50              | 9         |
//!
//! Un livello sconosciuto ricade sempre su `optimal`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Extensions accepted as optimization input.
pub const SUPPORTED_INPUT_FORMATS: &[&str] = &["jpeg", "jpg", "png", "gif", "webp"];

/// Extensions that can be requested as an explicit output format.
pub const SUPPORTED_OUTPUT_FORMATS: &[&str] = &["jpeg", "jpg", "png", "webp", "avif"];

/// Case-insensitive membership test against the input table.
pub fn supports_input_format(format: &str) -> bool {
    let format = format.to_lowercase();
    SUPPORTED_INPUT_FORMATS.contains(&format.as_str())
}

/// Case-insensitive membership test against the output table.
pub fn supports_output_format(format: &str) -> bool {
    let format = format.to_lowercase();
    SUPPORTED_OUTPUT_FORMATS.contains(&format.as_str())
}

/// Named compression policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum CompressionLevel {
    Lossless,
    #[default]
    Optimal,
    Aggressive,
    Maximum,
}

impl CompressionLevel {
    /// Parse a level name; anything unrecognized is `Optimal`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "lossless" => Self::Lossless,
            "optimal" => Self::Optimal,
            "aggressive" => Self::Aggressive,
            "maximum" => Self::Maximum,
            _ => Self::Optimal,
        }
    }

    /// Lossy quality used by JPEG, WebP and AVIF encoders.
    pub fn quality(self) -> u8 {
        match self {
            Self::Lossless => 95,
            Self::Optimal => 85,
            Self::Aggressive => 70,
            Self::Maximum => 50,
        }
    }

    /// PNG compression level, 0 (largest) to 9 (smallest).
    pub fn png_level(self) -> u8 {
        match self {
            Self::Lossless => 0,
            Self::Optimal => 3,
            Self::Aggressive => 6,
            Self::Maximum => 9,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lossless => "lossless",
            Self::Optimal => "optimal",
            Self::Aggressive => "aggressive",
            Self::Maximum => "maximum",
        }
    }

    pub fn encode_settings(self) -> EncodeSettings {
        EncodeSettings {
            quality: self.quality(),
            png_level: self.png_level(),
        }
    }
}

impl From<String> for CompressionLevel {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lossy quality for a level name, falling back to the optimal row.
pub fn quality_for_level(level: &str) -> u8 {
    CompressionLevel::from_name(level).quality()
}

/// PNG level for a level name, falling back to the optimal row.
pub fn png_level_for_level(level: &str) -> u8 {
    CompressionLevel::from_name(level).png_level()
}

/// Numeric encoder parameters. Each encoder reads the one that applies to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    pub quality: u8,
    pub png_level: u8,
}

impl EncodeSettings {
    /// Settings used for resized intermediates.
    pub const RESIZE: EncodeSettings = EncodeSettings { quality: 90, png_level: 6 };
    /// Settings used by the format converter.
    pub const CONVERT: EncodeSettings = EncodeSettings { quality: 85, png_level: 6 };
}

/// Raster encodings the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
    Avif,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 5] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Gif,
        ImageFormat::WebP,
        ImageFormat::Avif,
    ];

    /// Map a file extension (without dot, any case).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Canonical extension used for files this crate writes.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
            Self::Avif => "avif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
            Self::Avif => "image/avif",
        }
    }

    /// Formats whose encoders take a 1-100 quality.
    pub fn is_lossy(self) -> bool {
        matches!(self, Self::Jpeg | Self::WebP | Self::Avif)
    }

    /// Formats whose resize canvas must keep an alpha channel.
    pub fn preserves_transparency(self) -> bool {
        matches!(self, Self::Png | Self::Gif)
    }

    pub(crate) fn from_image_crate(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Gif => Some(Self::Gif),
            image::ImageFormat::WebP => Some(Self::WebP),
            image::ImageFormat::Avif => Some(Self::Avif),
            _ => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Output format requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Original,
    Jpeg,
    Png,
    #[serde(rename = "webp")]
    WebP,
    Avif,
    Gif,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Avif => "avif",
            Self::Gif => "gif",
        }
    }

    /// Concrete format, or `None` for `Original`.
    pub fn format(self) -> Option<ImageFormat> {
        match self {
            Self::Original => None,
            Self::Jpeg => Some(ImageFormat::Jpeg),
            Self::Png => Some(ImageFormat::Png),
            Self::WebP => Some(ImageFormat::WebP),
            Self::Avif => Some(ImageFormat::Avif),
            Self::Gif => Some(ImageFormat::Gif),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_table() {
        let table = [
            (CompressionLevel::Lossless, 95, 0),
            (CompressionLevel::Optimal, 85, 3),
            (CompressionLevel::Aggressive, 70, 6),
            (CompressionLevel::Maximum, 50, 9),
        ];
        for (level, quality, png) in table {
            assert_eq!(level.quality(), quality, "{level}");
            assert_eq!(level.png_level(), png, "{level}");
            assert_eq!(quality_for_level(level.as_str()), quality);
            assert_eq!(png_level_for_level(level.as_str()), png);
        }
    }

    #[test]
    fn test_unknown_level_is_optimal() {
        assert_eq!(quality_for_level("ultra"), 85);
        assert_eq!(png_level_for_level(""), 3);
        assert_eq!(CompressionLevel::from_name("MAXIMUM"), CompressionLevel::Maximum);

        let level: CompressionLevel = serde_json::from_str("\"bogus\"").unwrap();
        assert_eq!(level, CompressionLevel::Optimal);
    }

    #[test]
    fn test_format_membership_is_case_insensitive() {
        assert!(supports_input_format("JPG"));
        assert!(supports_input_format("Gif"));
        assert!(!supports_input_format("avif"));
        assert!(supports_output_format("AVIF"));
        assert!(!supports_output_format("gif"));
        assert!(!supports_output_format("tiff"));
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(ImageFormat::from_extension("JPEG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("jpg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_path(Path::new("/a/b.WebP")), Some(ImageFormat::WebP));
        assert_eq!(ImageFormat::from_path(Path::new("/a/b")), None);
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(ImageFormat::WebP.mime_type(), "image/webp");
    }

    #[test]
    fn test_lossy_formats() {
        let lossy: Vec<ImageFormat> = ImageFormat::ALL.into_iter().filter(|f| f.is_lossy()).collect();
        assert_eq!(lossy, vec![ImageFormat::Jpeg, ImageFormat::WebP, ImageFormat::Avif]);
    }

    #[test]
    fn test_output_format_serde() {
        let f: OutputFormat = serde_json::from_str("\"webp\"").unwrap();
        assert_eq!(f, OutputFormat::WebP);
        assert_eq!(serde_json::to_string(&OutputFormat::Original).unwrap(), "\"original\"");
        assert_eq!(OutputFormat::Original.format(), None);
    }
}
