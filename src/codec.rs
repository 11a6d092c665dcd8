//! # Raster Codec Adapter
//!
//! Decodifica e codifica immagini in memoria con il crate `image`.
//!
//! ## Responsabilità:
//! - Riconosce il formato reale dal contenuto del file (magic bytes), non dall'estensione
//! - Decodifica JPEG, PNG, GIF e WebP (AVIF solo se la piattaforma lo consente)
//! - Codifica con la semantica di qualità del formato di destinazione
//! - Espone le capacità della piattaforma tramite [`Capabilities`], risolte una volta all'avvio
//!
//! ## Ciclo di vita del buffer:
//! [`RasterCodec::encode`] prende possesso del [`DecodedImage`]: il buffer
//! decodificato viene rilasciato alla fine della chiamata in ogni caso,
//! anche quando la codifica fallisce.
//!
//! ## Encoder per formato:
//! | Formato | Parametro         | Implementazione                  |
//! |---------|-------------------|----------------------------------|
//! | JPEG    | qualità 1-100     | `image::codecs::jpeg`            |
//! | PNG     | livello 0-9       | `image::codecs::png`             |
//! | GIF     | nessuno           | `image::codecs::gif`             |
//! | WebP    | qualità 1-100     | `webp` (feature `webp-encode`)   |
//! | AVIF    | qualità 1-100     | `ravif` (feature `avif-encode`)  |

use crate::error::{OptimizeError, Result};
use crate::formats::{EncodeSettings, ImageFormat};
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, ImageEncoder};
use std::path::Path;
use tracing::debug;

/// What the running build can decode and encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub webp_encode: bool,
    pub avif_encode: bool,
    pub avif_decode: bool,
}

impl Capabilities {
    /// Probe the compiled-in codecs.
    pub fn detect() -> Self {
        Self {
            webp_encode: cfg!(feature = "webp-encode"),
            avif_encode: cfg!(feature = "avif-encode"),
            // the `image` build carries no AV1 decoder
            avif_decode: false,
        }
    }

    /// JPEG, PNG and GIF only.
    pub fn baseline() -> Self {
        Self {
            webp_encode: false,
            avif_encode: false,
            avif_decode: false,
        }
    }

    pub fn can_decode(&self, format: ImageFormat) -> bool {
        match format {
            ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif | ImageFormat::WebP => true,
            ImageFormat::Avif => self.avif_decode,
        }
    }

    pub fn can_encode(&self, format: ImageFormat) -> bool {
        match format {
            ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif => true,
            ImageFormat::WebP => self.webp_encode,
            ImageFormat::Avif => self.avif_encode,
        }
    }

    /// Encoders available in this build.
    pub fn encodable_formats(&self) -> Vec<ImageFormat> {
        ImageFormat::ALL
            .into_iter()
            .filter(|f| self.can_encode(*f))
            .collect()
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect()
    }
}

/// A decoded raster together with the format it was read from.
pub struct DecodedImage {
    pixels: DynamicImage,
    format: ImageFormat,
}

impl DecodedImage {
    pub fn new(pixels: DynamicImage, format: ImageFormat) -> Self {
        Self { pixels, format }
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> DynamicImage {
        self.pixels
    }
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("format", &self.format)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Header facts read without decoding pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Decode/encode front end bound to a set of capabilities.
#[derive(Debug, Clone, Copy)]
pub struct RasterCodec {
    capabilities: Capabilities,
}

impl RasterCodec {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Whether `format` can be produced by this codec.
    pub fn supports(&self, format: ImageFormat) -> bool {
        self.capabilities.can_encode(format)
    }

    /// Open without an extension hint so the format comes from the magic bytes alone.
    fn open(path: &Path) -> Result<image::io::Reader<std::io::BufReader<std::fs::File>>> {
        let file = std::fs::File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => OptimizeError::FileNotFound(path.to_path_buf()),
            _ => OptimizeError::Io(e),
        })?;
        image::io::Reader::new(std::io::BufReader::new(file))
            .with_guessed_format()
            .map_err(|e| OptimizeError::DecodeFailure(format!("{}: {}", path.display(), e)))
    }

    fn sniffed_format(
        path: &Path,
        reader: &image::io::Reader<std::io::BufReader<std::fs::File>>,
    ) -> Result<ImageFormat> {
        reader
            .format()
            .and_then(ImageFormat::from_image_crate)
            .ok_or_else(|| {
                OptimizeError::UnsupportedInputFormat(format!(
                    "unrecognized image data in {}",
                    path.display()
                ))
            })
    }

    /// Read format and dimensions from the file header.
    pub fn probe(&self, path: &Path) -> Result<ImageInfo> {
        let reader = Self::open(path)?;
        let format = Self::sniffed_format(path, &reader)?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| OptimizeError::DecodeFailure(format!("{}: {}", path.display(), e)))?;
        Ok(ImageInfo {
            format,
            width,
            height,
        })
    }

    /// Decode a file, dispatching on its declared container type.
    pub fn decode(&self, path: &Path) -> Result<DecodedImage> {
        let reader = Self::open(path)?;
        let format = Self::sniffed_format(path, &reader)?;

        if !self.capabilities.can_decode(format) {
            return Err(OptimizeError::UnsupportedInputFormat(format!(
                "no {} decoder available",
                format
            )));
        }

        let pixels = reader.decode().map_err(|e| match e {
            image::ImageError::Unsupported(u) => {
                OptimizeError::UnsupportedInputFormat(u.to_string())
            }
            other => OptimizeError::DecodeFailure(format!("{}: {}", path.display(), other)),
        })?;

        debug!(
            "Decoded {} ({}x{}, {})",
            path.display(),
            pixels.width(),
            pixels.height(),
            format
        );

        Ok(DecodedImage::new(pixels, format))
    }

    /// Encode `image` as `format` into `dest`. The image is consumed.
    pub fn encode(
        &self,
        image: DecodedImage,
        format: ImageFormat,
        settings: EncodeSettings,
        dest: &Path,
    ) -> Result<()> {
        if !self.capabilities.can_encode(format) {
            return Err(OptimizeError::UnsupportedOutputFormat(format!(
                "no {} encoder available",
                format
            )));
        }

        let bytes = encode_to_vec(image.into_pixels(), format, settings)?;

        std::fs::write(dest, &bytes).map_err(|e| {
            OptimizeError::EncodeFailure(format!("writing {}: {}", dest.display(), e))
        })?;

        if format.is_lossy() {
            debug!(
                "Encoded {} as {} at quality {} ({} bytes)",
                dest.display(),
                format,
                settings.quality,
                bytes.len()
            );
        } else {
            debug!("Encoded {} as {} ({} bytes)", dest.display(), format, bytes.len());
        }
        Ok(())
    }
}

impl Default for RasterCodec {
    fn default() -> Self {
        Self::new(Capabilities::detect())
    }
}

fn encode_to_vec(pixels: DynamicImage, format: ImageFormat, settings: EncodeSettings) -> Result<Vec<u8>> {
    let encoded = match format {
        ImageFormat::Jpeg => encode_jpeg(&pixels, settings.quality),
        ImageFormat::Png => encode_png(&pixels, settings.png_level),
        ImageFormat::Gif => encode_gif(&pixels),
        ImageFormat::WebP => encode_webp(&pixels, settings.quality),
        ImageFormat::Avif => encode_avif(&pixels, settings.quality),
    };
    encoded.map_err(|e| match e {
        OptimizeError::Image(inner) => OptimizeError::EncodeFailure(format!("{}: {}", format, inner)),
        other => other,
    })
}

fn encode_jpeg(pixels: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = pixels.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
    Ok(buf)
}

/// Map the 0-9 scale onto the encoder's presets. 0 is the largest output.
fn png_params(level: u8) -> (CompressionType, FilterType) {
    match level {
        0 => (CompressionType::Fast, FilterType::NoFilter),
        1..=3 => (CompressionType::Fast, FilterType::Adaptive),
        4..=6 => (CompressionType::Default, FilterType::Adaptive),
        _ => (CompressionType::Best, FilterType::Adaptive),
    }
}

fn encode_png(pixels: &DynamicImage, level: u8) -> Result<Vec<u8>> {
    let (compression, filter) = png_params(level);
    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, compression, filter);
    if pixels.color().has_alpha() {
        let rgba = pixels.to_rgba8();
        encoder.write_image(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)?;
    } else {
        let rgb = pixels.to_rgb8();
        encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
    }
    Ok(buf)
}

fn encode_gif(pixels: &DynamicImage) -> Result<Vec<u8>> {
    let rgba = pixels.to_rgba8();
    let mut buf = Vec::new();
    {
        // trailer is written when the encoder drops
        let mut encoder = GifEncoder::new(&mut buf);
        encoder.encode(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)?;
    }
    Ok(buf)
}

#[cfg(feature = "webp-encode")]
fn encode_webp(pixels: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgba = pixels.to_rgba8();
    let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());
    let memory = encoder
        .encode_simple(false, quality.clamp(1, 100) as f32)
        .map_err(|e| OptimizeError::EncodeFailure(format!("webp: {:?}", e)))?;
    Ok(memory.to_vec())
}

#[cfg(not(feature = "webp-encode"))]
fn encode_webp(_pixels: &DynamicImage, _quality: u8) -> Result<Vec<u8>> {
    Err(OptimizeError::UnsupportedOutputFormat("webp encoder not built".to_string()))
}

#[cfg(feature = "avif-encode")]
fn encode_avif(pixels: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgba = pixels.to_rgba8();
    let buffer: Vec<ravif::RGBA8> = rgba
        .pixels()
        .map(|p| ravif::RGBA8::new(p[0], p[1], p[2], p[3]))
        .collect();
    let img = ravif::Img::new(buffer.as_slice(), rgba.width() as usize, rgba.height() as usize);
    let encoded = ravif::Encoder::new()
        .with_quality(quality.clamp(1, 100) as f32)
        .with_speed(6)
        .encode_rgba(img)
        .map_err(|e| OptimizeError::EncodeFailure(format!("avif: {}", e)))?;
    Ok(encoded.avif_file)
}

#[cfg(not(feature = "avif-encode"))]
fn encode_avif(_pixels: &DynamicImage, _quality: u8) -> Result<Vec<u8>> {
    Err(OptimizeError::UnsupportedOutputFormat("avif encoder not built".to_string()))
}
