use serde::{Deserialize, Serialize};

pub const UPLOAD_SUCCESS_MESSAGE: &str = "File uploaded successfully";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub flowers_count: u64,
}

impl UploadResponse {
    pub fn success(filename: impl Into<String>, flowers_count: u64) -> Self {
        Self {
            message: UPLOAD_SUCCESS_MESSAGE.to_string(),
            filename: filename.into(),
            flowers_count,
        }
    }
}

/// Body returned with every non-2xx response.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Stable machine-readable kind, e.g. `decode_error`.
    pub error: String,
    pub message: String,
}
