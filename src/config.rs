//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione del motore di ottimizzazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config`, passata esplicitamente al motore ad ogni chiamata
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `compression_level`: lossless | optimal | aggressive | maximum (default: optimal)
//! - `output_format`: original | jpeg | png | webp | avif | gif (default: original)
//! - `auto_convert`: con output `original` converte comunque in WebP (default: false)
//! - `resize_enabled` / `resize_width` / `resize_height`: limiti di resize (default: off, 1920x1080)
//! - `resize_algorithm`: filtro di ricampionamento (default: lanczos)
//! - `api_key`: chiave del servizio remoto (vuota = solo locale)
//! - `api_base_url` / `remote_timeout_secs`: endpoint e timeout remoto (default: 30s)
//! - `remote_features`: funzioni AI richieste al servizio remoto
//! - `workers`: ottimizzazioni parallele nel batch (default: 4)
//! - `metadata_path`: file JSON dei risultati (default: `~/.kafunel-optimizer/metadata.json`)
//!
//! ## Esempio:
//! ```rust
//! use kafunel_optimizer::{CompressionLevel, Config};
//!
//! let config = Config {
//!     compression_level: CompressionLevel::Aggressive,
//!     resize_enabled: true,
//!     ..Default::default()
//! };
//! config.validate().unwrap();
//! ```

use crate::formats::{CompressionLevel, OutputFormat};
use crate::remote::{validate_api_key_format, RemoteFeature, DEFAULT_API_BASE_URL};
use crate::resize::{ResizeAlgorithm, ResizeBounds};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory under the home folder holding config and metadata.
pub const APP_DIR_NAME: &str = ".kafunel-optimizer";

/// Configuration for image optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Named compression policy
    pub compression_level: CompressionLevel,
    /// Requested output format
    pub output_format: OutputFormat,
    /// Convert to WebP when the output format is `original`
    pub auto_convert: bool,
    /// Downscale images larger than the bounds below
    pub resize_enabled: bool,
    pub resize_width: u32,
    pub resize_height: u32,
    pub resize_algorithm: ResizeAlgorithm,
    /// Remote service API key; empty means local-only
    pub api_key: String,
    pub api_base_url: String,
    pub remote_timeout_secs: u64,
    pub remote_features: Vec<RemoteFeature>,
    /// Number of parallel workers
    pub workers: usize,
    /// Where optimization records are kept (None = under the home directory)
    pub metadata_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compression_level: CompressionLevel::Optimal,
            output_format: OutputFormat::Original,
            auto_convert: false,
            resize_enabled: false,
            resize_width: 1920,
            resize_height: 1080,
            resize_algorithm: ResizeAlgorithm::Lanczos,
            api_key: String::new(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            remote_timeout_secs: 30,
            remote_features: Vec::new(),
            workers: 4,
            metadata_path: None,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.resize_enabled && (self.resize_width == 0 || self.resize_height == 0) {
            return Err(anyhow::anyhow!("Resize width and height must be greater than 0"));
        }

        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        if self.remote_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Remote timeout must be greater than 0"));
        }

        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(anyhow::anyhow!("API base URL must be http(s): {}", self.api_base_url));
        }

        if self.has_api_key() && !validate_api_key_format(&self.api_key) {
            return Err(anyhow::anyhow!("API key is malformed (at least 10 characters expected)"));
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Output format after applying `auto_convert`.
    pub fn resolved_output_format(&self) -> OutputFormat {
        match self.output_format {
            OutputFormat::Original if self.auto_convert => OutputFormat::WebP,
            other => other,
        }
    }

    /// Resize bounds, when resizing is enabled.
    pub fn resize_bounds(&self) -> Option<ResizeBounds> {
        if !self.resize_enabled {
            return None;
        }
        ResizeBounds::new(self.resize_width, self.resize_height).ok()
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    /// `~/.kafunel-optimizer/config.json`
    pub fn default_path() -> Result<PathBuf> {
        Ok(app_dir()?.join("config.json"))
    }

    /// Configured metadata file or `~/.kafunel-optimizer/metadata.json`
    pub fn metadata_file(&self) -> Result<PathBuf> {
        match &self.metadata_path {
            Some(path) => Ok(path.clone()),
            None => Ok(app_dir()?.join("metadata.json")),
        }
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

fn app_dir() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?
        .join(APP_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.resize_enabled = true;
        config.resize_width = 0;
        assert!(config.validate().is_err());

        config.resize_width = 800;
        config.workers = 0;
        assert!(config.validate().is_err());

        config.workers = 2;
        config.api_key = "short".to_string();
        assert!(config.validate().is_err());

        config.api_key = "long-enough-key".to_string();
        assert!(config.validate().is_ok());

        config.api_base_url = "ftp://api".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.compression_level, CompressionLevel::Optimal);
        assert_eq!(config.output_format, OutputFormat::Original);
        assert!(!config.auto_convert);
        assert!(!config.resize_enabled);
        assert_eq!((config.resize_width, config.resize_height), (1920, 1080));
        assert_eq!(config.api_base_url, "https://api.kafunel.com/v1");
        assert_eq!(config.remote_timeout(), Duration::from_secs(30));
        assert!(!config.has_api_key());
        assert_eq!(config.workers, 4);
        assert!(config.resize_bounds().is_none());
    }

    #[test]
    fn test_auto_convert_resolution() {
        let mut config = Config {
            auto_convert: true,
            ..Default::default()
        };
        assert_eq!(config.resolved_output_format(), OutputFormat::WebP);

        config.output_format = OutputFormat::Png;
        assert_eq!(config.resolved_output_format(), OutputFormat::Png);

        config.auto_convert = false;
        config.output_format = OutputFormat::Original;
        assert_eq!(config.resolved_output_format(), OutputFormat::Original);
    }

    #[test]
    fn test_partial_json_and_unknown_level() {
        let config: Config =
            serde_json::from_str(r#"{"compression_level": "ultra", "resize_enabled": true}"#).unwrap();
        assert_eq!(config.compression_level, CompressionLevel::Optimal);
        assert_eq!(config.resize_bounds(), Some(ResizeBounds::new(1920, 1080).unwrap()));
        assert_eq!(config.workers, 4);
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.json");

        let original_config = Config {
            compression_level: CompressionLevel::Maximum,
            output_format: OutputFormat::WebP,
            resize_enabled: true,
            resize_width: 800,
            resize_height: 600,
            api_key: "abcdefghijklmnop".to_string(),
            remote_features: vec![RemoteFeature::Upscale],
            workers: 8,
            ..Default::default()
        };

        // Save config
        original_config.save_to_file(&config_path).await.unwrap();

        // Load config
        let loaded_config = Config::from_file(&config_path).await.unwrap();
        assert_eq!(loaded_config, original_config);

        let missing = Config::from_file(&temp_dir.path().join("missing.json")).await.unwrap();
        assert_eq!(missing, Config::default());
    }
}
