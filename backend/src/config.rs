use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL_ID: &str = "smutuvi/flower_count_model";
pub const DEFAULT_FLOWER_CLASS_INDEX: usize = 2;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model_id: String,
    pub model_dir: PathBuf,
    pub base_url: String,
    pub model_file: String,
    pub flower_class_index: usize,
    pub download_attempts: u32,
    pub load_timeout: Duration,
}

impl ModelConfig {
    /// Local directory holding this model's artefacts.
    pub fn local_dir(&self) -> PathBuf {
        self.model_dir.join(&self.model_id)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub media_dir: PathBuf,
    pub allow_origins: Option<Vec<String>>,
    pub host: String,
    pub port: u16,
    pub model: ModelConfig,
    pub inference_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let model = ModelConfig {
            model_id: string_or("MODEL_ID", DEFAULT_MODEL_ID),
            model_dir: PathBuf::from(string_or("MODEL_DIR", "models")),
            base_url: string_or("MODEL_BASE_URL", "https://huggingface.co"),
            model_file: string_or("MODEL_FILE", "model.pt"),
            flower_class_index: parse_or(&lookup, "FLOWER_CLASS_INDEX", DEFAULT_FLOWER_CLASS_INDEX)?,
            download_attempts: parse_or(&lookup, "MODEL_DOWNLOAD_ATTEMPTS", 3u32)?.max(1),
            load_timeout: Duration::from_secs(parse_or(&lookup, "MODEL_LOAD_TIMEOUT_SECS", 300u64)?),
        };

        Ok(Self {
            media_dir: PathBuf::from(string_or("MEDIA_DIRECTORY_PATH", "media")),
            allow_origins: lookup("ALLOW_ORIGINS").and_then(|raw| parse_origins(&raw)),
            host: string_or("HOST", "0.0.0.0"),
            port: parse_or(&lookup, "PORT", 8000u16)?,
            model,
            inference_timeout: Duration::from_secs(parse_or(&lookup, "INFERENCE_TIMEOUT_SECS", 60u64)?),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        _ => Ok(default),
    }
}

fn parse_origins(raw: &str) -> Option<Vec<String>> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect();
    if origins.is_empty() { None } else { Some(origins) }
}
