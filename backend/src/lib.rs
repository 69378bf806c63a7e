pub mod config;
pub mod error;
pub mod inference;
pub mod routes;
pub mod storage;

use actix_cors::Cors;
use actix_web::middleware::Condition;
use actix_web::web;

use crate::config::Config;
use crate::inference::FlowerPipeline;
use crate::routes::{UploadLimits, configure_routes};
use crate::storage::media_store::MediaStore;

/// Everything a worker needs to serve requests; cheap to clone per worker.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: FlowerPipeline,
    pub store: MediaStore,
    pub limits: UploadLimits,
}

impl AppState {
    pub fn new(config: &Config, pipeline: FlowerPipeline, store: MediaStore) -> Self {
        Self {
            pipeline,
            store,
            limits: UploadLimits {
                max_upload_bytes: config.max_upload_bytes,
                inference_timeout: config.inference_timeout,
            },
        }
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.pipeline.clone()))
            .app_data(web::Data::new(self.store.clone()))
            .app_data(web::Data::new(self.limits.clone()))
            .configure(configure_routes);
    }
}

/// CORS for the configured origins; disabled when none are configured.
pub fn cors_layer(allow_origins: Option<&[String]>) -> Condition<Cors> {
    match allow_origins {
        Some(origins) if !origins.is_empty() => {
            let cors = origins
                .iter()
                .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
                .allow_any_method()
                .allow_any_header()
                .supports_credentials()
                .max_age(3600);
            Condition::new(true, cors)
        }
        _ => Condition::new(false, Cors::default()),
    }
}
