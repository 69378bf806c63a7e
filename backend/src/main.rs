use std::env;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer};
use flowercount_backend::config::Config;
use flowercount_backend::inference::FlowerPipeline;
use flowercount_backend::storage::media_store::MediaStore;
use flowercount_backend::{AppState, cors_layer};

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, err);
    std::io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = Config::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let store = MediaStore::new(&config.media_dir)
        .map_err(|e| startup_error("Cannot prepare media directory", e))?;
    log::info!("Storing uploads in {}", store.root().display());

    log::info!(
        "Loading model {} from {} (cache {})",
        config.model.model_id,
        config.model.base_url,
        config.model.local_dir().display()
    );
    let pipeline = FlowerPipeline::load(&config.model)
        .await
        .map_err(|e| startup_error("Model loading failed", e))?;
    log::info!("Counting detections of class {}", pipeline.flower_class_index());

    match &config.allow_origins {
        Some(origins) => log::info!("CORS enabled for {}", origins.join(", ")),
        None => log::info!("CORS disabled"),
    }

    let state = AppState::new(&config, pipeline, store);
    let allow_origins = config.allow_origins.clone();
    let bind_address = config.bind_address();

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(cors_layer(allow_origins.as_deref()))
            .wrap(Logger::default())
            .configure(move |cfg| state.configure(cfg))
    })
    .bind(&bind_address)?
    .run()
    .await
}
