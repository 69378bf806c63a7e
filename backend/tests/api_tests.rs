use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use actix_web::http::{StatusCode, header};
use actix_web::{App, test};
use flowercount_backend::config::Config;
use flowercount_backend::inference::{Detector, FlowerPipeline, InferenceError};
use flowercount_backend::storage::media_store::MediaStore;
use flowercount_backend::{AppState, cors_layer};
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::Array2;
use shared::{ErrorResponse, UploadResponse};
use tempfile::{TempDir, tempdir};

const CELL: u32 = 8;
const BOUNDARY: &str = "----flowercount-test-boundary";

/// Proposes one detection per 8x8 cell; a mostly-red cell is a flower (class 2).
struct GridDetector;

impl Detector for GridDetector {
    fn class_logits(&self, image: &RgbImage) -> Result<Array2<f32>, InferenceError> {
        let cols = image.width() / CELL;
        let rows = image.height() / CELL;
        let mut logits = Array2::<f32>::zeros(((cols * rows) as usize, 4));
        for row in 0..rows {
            for col in 0..cols {
                let center = image.get_pixel(col * CELL + CELL / 2, row * CELL + CELL / 2);
                let class = if center[0] > 200 && center[1] < 50 { 2 } else { 0 };
                logits[[(row * cols + col) as usize, class]] = 6.0;
            }
        }
        Ok(logits)
    }
}

struct UnavailableDetector;

impl Detector for UnavailableDetector {
    fn class_logits(&self, _image: &RgbImage) -> Result<Array2<f32>, InferenceError> {
        Err(InferenceError::ModelLoad("registry offline".to_string()))
    }
}

struct SlowDetector;

impl Detector for SlowDetector {
    fn class_logits(&self, _image: &RgbImage) -> Result<Array2<f32>, InferenceError> {
        std::thread::sleep(Duration::from_millis(500));
        Ok(Array2::zeros((1, 3)))
    }
}

fn state_with(detector: Arc<dyn Detector>, media: &Path, vars: &[(&str, &str)]) -> (AppState, Config) {
    let config = Config::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    })
    .unwrap();
    let pipeline = FlowerPipeline::new(detector, config.model.flower_class_index);
    let store = MediaStore::new(media).unwrap();
    (AppState::new(&config, pipeline, store), config)
}

/// 32x32 green field with three red flowers in known cells.
fn three_flower_png() -> Vec<u8> {
    let flowers = [(0, 0), (2, 1), (3, 3)];
    let img = RgbImage::from_fn(32, 32, |x, y| {
        if flowers.contains(&(x / CELL, y / CELL)) {
            Rgb([230, 20, 40])
        } else {
            Rgb([30, 160, 40])
        }
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(uri: &str, field: &str, filename: &str, data: &[u8]) -> test::TestRequest {
    test::TestRequest::post()
        .uri(uri)
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(multipart_body(field, filename, data))
}

fn stored_files(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

#[actix_web::test]
async fn ping_answers_pong_on_both_prefixes() {
    let media = tempdir().unwrap();
    let (state, _) = state_with(Arc::new(GridDetector), media.path(), &[]);
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    for uri in ["/ping/", "/api/ping/"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "\"pong\"");
    }
}

#[actix_web::test]
async fn upload_counts_three_flowers() {
    let media = tempdir().unwrap();
    let (state, _) = state_with(Arc::new(GridDetector), media.path(), &[]);
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let req = upload_request("/api/upload/", "file", "meadow.jpg", &three_flower_png()).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: UploadResponse = test::read_body_json(resp).await;
    assert_eq!(body, UploadResponse::success("meadow.jpg", 3));

    // stored under a content-derived extension, not the client name
    let entry = std::fs::read_dir(media.path()).unwrap().next().unwrap().unwrap();
    assert_eq!(entry.path().extension().unwrap(), "png");
}

#[actix_web::test]
async fn same_upload_twice_is_stored_twice() {
    let media = tempdir().unwrap();
    let (state, _) = state_with(Arc::new(GridDetector), media.path(), &[]);
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;
    let png = three_flower_png();

    for _ in 0..2 {
        let resp = test::call_service(&app, upload_request("/upload/", "file", "a.png", &png).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
    assert_eq!(stored_files(&media), 2);
}

#[actix_web::test]
async fn text_upload_is_a_decode_error_not_zero() {
    let media = tempdir().unwrap();
    let (state, _) = state_with(Arc::new(GridDetector), media.path(), &[]);
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let req = upload_request("/upload/", "file", "notes.png", b"these are not pixels").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.error, "decode_error");
    assert_eq!(stored_files(&media), 1);
}

#[actix_web::test]
async fn missing_file_field_is_a_bad_request() {
    let media = tempdir().unwrap();
    let (state, _) = state_with(Arc::new(GridDetector), media.path(), &[]);
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let req = upload_request("/upload/", "photo", "a.png", &three_flower_png()).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.error, "bad_request");
    assert_eq!(stored_files(&media), 0);
}

#[actix_web::test]
async fn oversized_upload_is_rejected() {
    let media = tempdir().unwrap();
    let (state, _) = state_with(
        Arc::new(GridDetector),
        media.path(),
        &[("MAX_UPLOAD_BYTES", "16")],
    );
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let resp = test::call_service(
        &app,
        upload_request("/upload/", "file", "big.png", &three_flower_png()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(stored_files(&media), 0);
}

#[actix_web::test]
async fn model_failure_is_service_unavailable() {
    let media = tempdir().unwrap();
    let (state, _) = state_with(Arc::new(UnavailableDetector), media.path(), &[]);
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let resp = test::call_service(
        &app,
        upload_request("/upload/", "file", "a.png", &three_flower_png()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.error, "model_unavailable");
}

#[actix_web::test]
async fn slow_inference_times_out() {
    let media = tempdir().unwrap();
    let (mut state, _) = state_with(Arc::new(SlowDetector), media.path(), &[]);
    state.limits.inference_timeout = Duration::from_millis(50);
    let app = test::init_service(App::new().configure(|cfg| state.configure(cfg))).await;

    let resp = test::call_service(
        &app,
        upload_request("/upload/", "file", "a.png", &three_flower_png()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[actix_web::test]
async fn configured_origin_gets_cors_headers() {
    let media = tempdir().unwrap();
    let (state, config) = state_with(
        Arc::new(GridDetector),
        media.path(),
        &[("ALLOW_ORIGINS", "http://localhost:3000,http://example.test")],
    );
    let app = test::init_service(
        App::new()
            .wrap(cors_layer(config.allow_origins.as_deref()))
            .configure(|cfg| state.configure(cfg)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/ping/")
        .insert_header((header::ORIGIN, "http://example.test"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://example.test"
    );
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );
}

#[actix_web::test]
async fn no_cors_headers_without_configuration() {
    let media = tempdir().unwrap();
    let (state, config) = state_with(Arc::new(GridDetector), media.path(), &[]);
    let app = test::init_service(
        App::new()
            .wrap(cors_layer(config.allow_origins.as_deref()))
            .configure(|cfg| state.configure(cfg)),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/ping/")
        .insert_header((header::ORIGIN, "http://example.test"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}
