//! # Processing Plan
//!
//! Calcolo centralizzato di cosa fare con un'immagine, prima di toccarla.
//! Derivato ad ogni chiamata, mai salvato.

use crate::codec::ImageInfo;
use crate::config::Config;
use crate::error::{OptimizeError, Result};
use crate::formats::{supports_input_format, CompressionLevel, EncodeSettings, ImageFormat, OutputFormat};
use crate::remote::RemoteOptions;
use crate::resize::ResizeBounds;
use std::path::Path;

/// What a single optimization will do
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingPlan {
    pub target_format: ImageFormat,
    /// Output format after `auto_convert`, as sent to the remote service
    pub output_format: OutputFormat,
    pub compression_level: CompressionLevel,
    pub settings: EncodeSettings,
    /// Set only when the source exceeds the bounds
    pub resize: Option<ResizeBounds>,
}

impl ProcessingPlan {
    /// Resolve the plan for `path`, whose header was read into `info`.
    ///
    /// `Original` resolves to the format named by the file extension, or to
    /// the content format when the extension is unknown.
    pub fn resolve(path: &Path, info: &ImageInfo, config: &Config) -> Result<Self> {
        if !supports_input_format(info.format.extension()) {
            return Err(OptimizeError::UnsupportedInputFormat(format!(
                "{} is {}",
                path.display(),
                info.format
            )));
        }

        let output_format = config.resolved_output_format();
        let target_format = match output_format {
            OutputFormat::Original => ImageFormat::from_path(path).unwrap_or(info.format),
            OutputFormat::Gif => {
                return Err(OptimizeError::UnsupportedOutputFormat(
                    "gif is not an output format".to_string(),
                ))
            }
            explicit => explicit.format().unwrap_or(info.format),
        };

        let resize = config
            .resize_bounds()
            .filter(|bounds| !bounds.fits(info.width, info.height));

        Ok(Self {
            target_format,
            output_format,
            compression_level: config.compression_level,
            settings: config.compression_level.encode_settings(),
            resize,
        })
    }

    pub fn remote_options(&self, config: &Config) -> RemoteOptions {
        let mut options = RemoteOptions::new(self.compression_level, self.output_format);
        for feature in &config.remote_features {
            options = options.with_feature(*feature);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteFeature;

    fn info(format: ImageFormat, width: u32, height: u32) -> ImageInfo {
        ImageInfo { format, width, height }
    }

    #[test]
    fn test_original_resolves_to_extension() {
        let config = Config::default();
        let plan = ProcessingPlan::resolve(Path::new("a.JPEG"), &info(ImageFormat::Jpeg, 10, 10), &config).unwrap();
        assert_eq!(plan.target_format, ImageFormat::Jpeg);
        assert_eq!(plan.settings, EncodeSettings { quality: 85, png_level: 3 });
        assert!(plan.resize.is_none());

        // GIF in, GIF out is fine when nothing else was asked
        let plan = ProcessingPlan::resolve(Path::new("anim.gif"), &info(ImageFormat::Gif, 10, 10), &config).unwrap();
        assert_eq!(plan.target_format, ImageFormat::Gif);
    }

    #[test]
    fn test_explicit_and_auto_convert() {
        let mut config = Config {
            output_format: OutputFormat::WebP,
            ..Default::default()
        };
        let plan = ProcessingPlan::resolve(Path::new("a.jpg"), &info(ImageFormat::Jpeg, 10, 10), &config).unwrap();
        assert_eq!(plan.target_format, ImageFormat::WebP);

        config.output_format = OutputFormat::Original;
        config.auto_convert = true;
        let plan = ProcessingPlan::resolve(Path::new("a.png"), &info(ImageFormat::Png, 10, 10), &config).unwrap();
        assert_eq!(plan.target_format, ImageFormat::WebP);
        assert_eq!(plan.output_format, OutputFormat::WebP);
    }

    #[test]
    fn test_rejections() {
        let config = Config {
            output_format: OutputFormat::Gif,
            ..Default::default()
        };
        let err = ProcessingPlan::resolve(Path::new("a.png"), &info(ImageFormat::Png, 1, 1), &config).unwrap_err();
        assert!(matches!(err, OptimizeError::UnsupportedOutputFormat(_)));

        let err = ProcessingPlan::resolve(Path::new("a.avif"), &info(ImageFormat::Avif, 1, 1), &Config::default())
            .unwrap_err();
        assert!(matches!(err, OptimizeError::UnsupportedInputFormat(_)));
    }

    #[test]
    fn test_resize_only_when_exceeding() {
        let config = Config {
            resize_enabled: true,
            compression_level: CompressionLevel::Maximum,
            remote_features: vec![RemoteFeature::Upscale, RemoteFeature::Upscale],
            ..Default::default()
        };
        let big = ProcessingPlan::resolve(Path::new("a.jpg"), &info(ImageFormat::Jpeg, 3000, 1500), &config).unwrap();
        assert_eq!(big.resize, Some(ResizeBounds::new(1920, 1080).unwrap()));
        assert_eq!(big.remote_options(&config).features, vec![RemoteFeature::Upscale]);
        assert_eq!(big.remote_options(&config).compression_level, CompressionLevel::Maximum);

        let small = ProcessingPlan::resolve(Path::new("a.jpg"), &info(ImageFormat::Jpeg, 1920, 1080), &config).unwrap();
        assert!(small.resize.is_none());
    }
}
