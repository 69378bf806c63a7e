use std::path::PathBuf;
use std::time::Duration;

use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use shared::UploadResponse;

use crate::error::ApiError;
use crate::inference::{FlowerPipeline, InferenceError};
use crate::storage::media_store::MediaStore;

pub const UPLOAD_FIELD: &str = "file";

#[derive(Clone, Debug)]
pub struct UploadLimits {
    pub max_upload_bytes: usize,
    pub inference_timeout: Duration,
}

/// Mounts the API at the root and again under `/api`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api").configure(api_routes))
        .configure(api_routes);
}

fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ping/").route(web::get().to(ping)))
        .service(web::resource("/upload/").route(web::post().to(upload)));
}

async fn ping() -> HttpResponse {
    HttpResponse::Ok().json("pong")
}

struct ReceivedFile {
    filename: String,
    data: Vec<u8>,
}

async fn read_upload(mut payload: Multipart, limit: usize) -> Result<ReceivedFile, ApiError> {
    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            // drain fields we do not use
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| ApiError::BadRequest(e.to_string()))?;
            }
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default()
            .to_string();

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| ApiError::BadRequest(e.to_string()))?;
            if data.len() + chunk.len() > limit {
                return Err(ApiError::PayloadTooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }
        return Ok(ReceivedFile { filename, data });
    }

    Err(ApiError::BadRequest(format!(
        "Missing multipart field `{}`",
        UPLOAD_FIELD
    )))
}

async fn store_upload(store: MediaStore, data: Vec<u8>) -> Result<PathBuf, ApiError> {
    web::block(move || store.store(&data))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

async fn count_stored(
    pipeline: FlowerPipeline,
    path: PathBuf,
    timeout: Duration,
) -> Result<u64, ApiError> {
    let counted = actix_web::rt::time::timeout(
        timeout,
        web::block(move || pipeline.count_flowers(&path)),
    )
    .await
    .map_err(|_| InferenceError::Timeout(timeout))?
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(counted)
}

async fn upload(
    pipeline: web::Data<FlowerPipeline>,
    store: web::Data<MediaStore>,
    limits: web::Data<UploadLimits>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let received = read_upload(payload, limits.max_upload_bytes).await?;
    let path = store_upload(store.get_ref().clone(), received.data).await?;

    match count_stored(pipeline.get_ref().clone(), path.clone(), limits.inference_timeout).await {
        Ok(flowers_count) => {
            info!(
                "Counted {} flowers in {} ({:?})",
                flowers_count,
                path.display(),
                received.filename
            );
            Ok(HttpResponse::Ok().json(UploadResponse::success(received.filename, flowers_count)))
        }
        Err(e) => {
            error!("Counting failed for {}: {}", path.display(), e);
            Err(e)
        }
    }
}
