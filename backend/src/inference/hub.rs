use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use url::Url;

use super::InferenceError;
use crate::config::ModelConfig;

pub const PREPROCESSOR_FILE: &str = "preprocessor_config.json";
pub const CONFIG_FILE: &str = "config.json";

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Local paths of everything needed to build the detector.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub weights: PathBuf,
    pub preprocessor: PathBuf,
    pub config: Option<PathBuf>,
}

enum FetchError {
    NotFound,
    Failed(String),
}

/// Fetches model files from a HuggingFace-style registry into a local cache.
#[derive(Clone)]
pub struct ModelHub {
    client: reqwest::Client,
    base_url: Url,
    attempts: u32,
    initial_backoff: Duration,
}

impl ModelHub {
    pub fn new(base_url: &str, attempts: u32) -> Result<Self, InferenceError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).map_err(|e| {
            InferenceError::ModelLoad(format!("invalid registry url {:?}: {}", base_url, e))
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            attempts: attempts.max(1),
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn file_url(&self, model_id: &str, file: &str) -> Result<Url, InferenceError> {
        self.base_url
            .join(&format!("{}/resolve/main/{}", model_id, file))
            .map_err(|e| InferenceError::ModelLoad(format!("invalid model url: {}", e)))
    }

    pub async fn resolve(&self, config: &ModelConfig) -> Result<ModelArtifacts, InferenceError> {
        let dir = config.local_dir();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            InferenceError::ModelLoad(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let weights = self.require(&config.model_id, &config.model_file, &dir).await?;
        let preprocessor = self.require(&config.model_id, PREPROCESSOR_FILE, &dir).await?;
        let model_config = match self.fetch(&config.model_id, CONFIG_FILE, &dir).await {
            Ok(found) => found,
            Err(e) => {
                log::warn!("Skipping {}: {}", CONFIG_FILE, e);
                None
            }
        };

        Ok(ModelArtifacts {
            weights,
            preprocessor,
            config: model_config,
        })
    }

    async fn require(&self, model_id: &str, file: &str, dir: &Path) -> Result<PathBuf, InferenceError> {
        self.fetch(model_id, file, dir).await?.ok_or_else(|| {
            InferenceError::ModelLoad(format!("{} not found in registry for {}", file, model_id))
        })
    }

    /// Returns the cached file, downloading it first if absent.
    /// `Ok(None)` means the registry has no such file.
    pub async fn fetch(
        &self,
        model_id: &str,
        file: &str,
        dir: &Path,
    ) -> Result<Option<PathBuf>, InferenceError> {
        let dest = dir.join(file);
        if dest.is_file() {
            log::debug!("Using cached {}", dest.display());
            return Ok(Some(dest));
        }

        let url = self.file_url(model_id, file)?;
        let mut backoff = self.initial_backoff;
        for attempt in 1..=self.attempts {
            log::info!("Downloading {} (attempt {}/{})", url, attempt, self.attempts);
            match self.download(&url, &dest).await {
                Ok(()) => {
                    log::info!("Model file saved to {}", dest.display());
                    return Ok(Some(dest));
                }
                Err(FetchError::NotFound) => return Ok(None),
                Err(FetchError::Failed(reason)) if attempt < self.attempts => {
                    let jitter = rand::rng().random_range(0..=backoff.as_millis() as u64 / 4);
                    log::warn!("Download of {} failed: {}, retrying", url, reason);
                    actix_web::rt::time::sleep(backoff + Duration::from_millis(jitter)).await;
                    backoff *= 2;
                }
                Err(FetchError::Failed(reason)) => {
                    return Err(InferenceError::ModelLoad(format!(
                        "giving up on {} after {} attempts: {}",
                        url, self.attempts, reason
                    )));
                }
            }
        }
        Err(InferenceError::ModelLoad(format!("no download attempted for {}", url)))
    }

    async fn download(&self, url: &Url, dest: &Path) -> Result<(), FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound),
            status if !status.is_success() => {
                return Err(FetchError::Failed(format!("HTTP {}", status)));
            }
            _ => {}
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))?;

        let mut partial = dest.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);
        tokio::fs::write(&partial, &body)
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))?;
        tokio::fs::rename(&partial, dest)
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))
    }
}
