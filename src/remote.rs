//! # Remote Delegate Module
//!
//! Client HTTP per il servizio di ottimizzazione remoto di Kafunel.
//!
//! ## Responsabilità:
//! - Caricare il file con una richiesta multipart autenticata (bearer token)
//! - Validare la risposta JSON (`200` + JSON valido + `success: true`)
//! - Scaricare l'artefatto ottimizzato in streaming nella directory temporanea
//!   condivisa, con un limite di dimensione
//! - Validare la API key e leggere le informazioni dell'account
//!
//! ## Protocollo:
//! ```text
//! POST {base_url}/optimize   multipart: file, compression_level, output_format, features[]
//! GET  {optimized_file_url}  bytes dell'immagine ottimizzata
//! GET  {base_url}/validate   {"valid": true}
//! GET  {base_url}/account    JSON arbitrario
//! ```
//!
//! Qualsiasi errore (chiave assente, rete, timeout, status diverso da 200,
//! JSON malformato, `success` falso) diventa `RemoteUnavailable`, che
//! l'orchestratore recupera ripiegando sull'ottimizzazione locale.

use crate::error::{OptimizeError, Result};
use crate::formats::{CompressionLevel, ImageFormat, OutputFormat};
use crate::scratch::{ScratchDir, TempPath};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const DEFAULT_API_BASE_URL: &str = "https://api.kafunel.com/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum accepted API key length.
pub const MIN_API_KEY_LEN: usize = 10;

/// Largest optimized artifact accepted from the service.
pub const DEFAULT_MAX_DOWNLOAD: u64 = 100 * 1024 * 1024;

/// Longest URL basename kept in a download file name.
const MAX_BASENAME_LEN: usize = 64;

/// AI features the remote service can apply on top of compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteFeature {
    BackgroundRemoval,
    Upscale,
}

impl RemoteFeature {
    /// Value sent in the `features[]` form field.
    pub fn wire_name(self) -> &'static str {
        match self {
            RemoteFeature::BackgroundRemoval => "background_removal",
            RemoteFeature::Upscale => "upscale",
        }
    }
}

/// Parameters of a single remote optimization request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteOptions {
    pub compression_level: CompressionLevel,
    pub output_format: OutputFormat,
    pub features: Vec<RemoteFeature>,
    pub scale_factor: Option<u32>,
}

impl RemoteOptions {
    pub fn new(compression_level: CompressionLevel, output_format: OutputFormat) -> Self {
        Self {
            compression_level,
            output_format,
            ..Default::default()
        }
    }

    pub fn with_feature(mut self, feature: RemoteFeature) -> Self {
        if !self.features.contains(&feature) {
            self.features.push(feature);
        }
        self
    }

    fn into_form(self, file_name: String, mime: &str, content: Vec<u8>) -> Result<Form> {
        let part = Part::bytes(content)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(unavailable)?;

        let mut form = Form::new()
            .part("file", part)
            .text("compression_level", self.compression_level.as_str())
            .text("output_format", self.output_format.as_str());

        for feature in &self.features {
            form = form.text("features[]", feature.wire_name());
        }
        if let Some(factor) = self.scale_factor {
            form = form.text("scale_factor", factor.to_string());
        }
        Ok(form)
    }
}

/// A downloaded remote result, living in the scratch directory.
#[derive(Debug)]
pub struct RemoteOutcome {
    pub path: TempPath,
    pub original_size: u64,
    pub new_size: u64,
    pub savings: i64,
    /// Raw JSON returned by `/optimize`.
    pub details: Value,
}

/// External optimizer consulted before local processing.
#[async_trait]
pub trait RemoteDelegate: Send + Sync {
    /// `false` means the orchestrator should not even try.
    fn is_configured(&self) -> bool {
        true
    }

    async fn optimize_image(
        &self,
        path: &Path,
        options: &RemoteOptions,
        scratch: &ScratchDir,
    ) -> Result<RemoteOutcome>;
}

/// Delegate used when no API key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemote;

#[async_trait]
impl RemoteDelegate for NoRemote {
    fn is_configured(&self) -> bool {
        false
    }

    async fn optimize_image(&self, _: &Path, _: &RemoteOptions, _: &ScratchDir) -> Result<RemoteOutcome> {
        Err(OptimizeError::RemoteUnavailable("no API key configured".to_string()))
    }
}

/// Cheap local check of an API key's shape, before any network call.
pub fn validate_api_key_format(api_key: &str) -> bool {
    let key = api_key.trim();
    !key.is_empty() && key.chars().count() >= MIN_API_KEY_LEN
}

fn unavailable(err: impl std::fmt::Display) -> OptimizeError {
    OptimizeError::RemoteUnavailable(err.to_string())
}

/// reqwest implementation of the remote protocol
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_download: u64,
    cancel: Option<watch::Receiver<bool>>,
}

impl HttpRemoteClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(unavailable)?;

        Ok(Self {
            client,
            api_key: api_key.into().trim().to_string(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_download: DEFAULT_MAX_DOWNLOAD,
            cancel: None,
        })
    }

    /// Downloads larger than `bytes` are abandoned.
    pub fn with_max_download(mut self, bytes: u64) -> Self {
        self.max_download = bytes;
        self
    }

    /// Requests are refused once `cancel` reads `true`.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    /// Checked right before every request is issued.
    fn ensure_ready(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(OptimizeError::RemoteUnavailable("no API key configured".to_string()));
        }
        if let Some(cancel) = &self.cancel {
            if *cancel.borrow() {
                return Err(OptimizeError::Cancelled);
            }
        }
        Ok(())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Body of a `200` response parsed as JSON.
    async fn read_json(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body = response.text().await.map_err(unavailable)?;

        if status != StatusCode::OK {
            return Err(OptimizeError::RemoteUnavailable(format!(
                "API returned {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| OptimizeError::RemoteUnavailable(format!("invalid JSON response: {}", e)))
    }

    async fn get_json(&self, name: &str) -> Result<Value> {
        self.ensure_ready()?;
        let response = self
            .authorized(self.client.get(self.endpoint(name)))
            .send()
            .await
            .map_err(unavailable)?;
        Self::read_json(response).await
    }

    /// `true` only for a `200` whose JSON carries `valid: true`.
    pub async fn validate_api_key(&self) -> bool {
        match self.get_json("validate").await {
            Ok(body) => body.get("valid").and_then(Value::as_bool) == Some(true),
            Err(e) => {
                debug!("API key validation failed: {}", e);
                false
            }
        }
    }

    pub async fn get_account_info(&self) -> Result<Value> {
        self.get_json("account").await
    }

    /// Background removal, returned as PNG to keep transparency.
    pub async fn remove_background(&self, path: &Path, scratch: &ScratchDir) -> Result<RemoteOutcome> {
        let options = RemoteOptions::new(CompressionLevel::Optimal, OutputFormat::Png)
            .with_feature(RemoteFeature::BackgroundRemoval);
        self.optimize_image(path, &options, scratch).await
    }

    pub async fn upscale_image(&self, path: &Path, scale_factor: u32, scratch: &ScratchDir) -> Result<RemoteOutcome> {
        let mut options = RemoteOptions::new(CompressionLevel::Optimal, OutputFormat::Original)
            .with_feature(RemoteFeature::Upscale);
        options.scale_factor = Some(scale_factor);
        self.optimize_image(path, &options, scratch).await
    }

    /// Stream `url` into `optimized_<random>_<basename>` in the scratch dir.
    ///
    /// Returns the file and its size. Every failure, local ones included, is
    /// `RemoteUnavailable`: the name and the size both come from the service.
    async fn download(&self, url: &str, scratch: &ScratchDir) -> Result<(TempPath, u64)> {
        self.ensure_ready()?;

        let mut response = self.client.get(url).send().await.map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(OptimizeError::RemoteUnavailable(format!(
                "download of {} returned {}",
                url,
                response.status().as_u16()
            )));
        }
        if let Some(len) = response.content_length() {
            if len > self.max_download {
                return Err(self.too_large(url));
            }
        }

        let dest = scratch
            .reserve_raw("optimized_", &format!("_{}", url_basename(url)))
            .map_err(|e| OptimizeError::RemoteUnavailable(format!("reserving download file: {}", e)))?;
        let mut file = tokio::fs::File::create(&dest)
            .await
            .map_err(|e| OptimizeError::RemoteUnavailable(format!("opening download file: {}", e)))?;

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(unavailable)? {
            written += chunk.len() as u64;
            if written > self.max_download {
                return Err(self.too_large(url));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| OptimizeError::RemoteUnavailable(format!("writing download: {}", e)))?;
        }
        file.flush()
            .await
            .map_err(|e| OptimizeError::RemoteUnavailable(format!("writing download: {}", e)))?;

        if written == 0 {
            return Err(OptimizeError::RemoteUnavailable(format!("empty download from {}", url)));
        }

        debug!("Downloaded {} bytes from {}", written, url);
        Ok((dest, written))
    }

    fn too_large(&self, url: &str) -> OptimizeError {
        OptimizeError::RemoteUnavailable(format!(
            "download from {} exceeds {} bytes",
            url, self.max_download
        ))
    }
}

#[async_trait]
impl RemoteDelegate for HttpRemoteClient {
    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn optimize_image(
        &self,
        path: &Path,
        options: &RemoteOptions,
        scratch: &ScratchDir,
    ) -> Result<RemoteOutcome> {
        self.ensure_ready()?;

        let content = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => OptimizeError::FileNotFound(path.to_path_buf()),
            _ => unavailable(e),
        })?;
        let original_size = content.len() as u64;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let mime = ImageFormat::from_path(path)
            .map(ImageFormat::mime_type)
            .unwrap_or("application/octet-stream");
        let form = options.clone().into_form(file_name, mime, content)?;

        let response = self
            .authorized(self.client.post(self.endpoint("optimize")))
            .multipart(form)
            .send()
            .await
            .map_err(unavailable)?;
        let details = Self::read_json(response).await?;

        if details.get("success").and_then(Value::as_bool) != Some(true) {
            warn!("Remote optimizer reported failure for {}", path.display());
            return Err(OptimizeError::RemoteUnavailable(
                "API returned unsuccessful result".to_string(),
            ));
        }

        let url = details
            .get("optimized_file_url")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                OptimizeError::RemoteUnavailable("response carried no optimized_file_url".to_string())
            })?
            .to_string();

        let (downloaded, new_size) = self.download(&url, scratch).await?;

        info!(
            "Remote optimization of {}: {} -> {} bytes",
            path.display(),
            original_size,
            new_size
        );

        Ok(RemoteOutcome {
            path: downloaded,
            original_size,
            new_size,
            savings: original_size as i64 - new_size as i64,
            details,
        })
    }
}

/// Last path segment of `url`, reduced to a short filesystem-safe name.
fn url_basename(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let segment = without_query.rsplit('/').next().unwrap_or("");
    let safe: String = segment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    // keep the tail so the extension survives
    let tail = safe[safe.len().saturating_sub(MAX_BASENAME_LEN)..].trim_start_matches('.');
    if tail.is_empty() {
        "download".to_string()
    } else {
        tail.to_string()
    }
}
