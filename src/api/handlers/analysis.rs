use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Responder};
use log::info;
use serde::Serialize;

use crate::analysis::Analyzer;
use crate::api::upload::read_capture_upload;
use crate::utils::error::AppResult;

/// Response for the health check
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    engine_enabled: bool,
}

/// Analyze an uploaded capture file
///
/// The whole analysis runs inside the request: dropping the request (client
/// disconnect) cancels it and removes its work directory.
pub async fn analyze_capture(analyzer: web::Data<Analyzer>, payload: Multipart) -> AppResult<HttpResponse> {
    let upload = read_capture_upload(payload, analyzer.config().max_capture_bytes).await?;
    info!("Received capture '{}' ({} bytes)", upload.file_name, upload.data.len());

    let result = analyzer.analyze(&upload.file_name, upload.data).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// Liveness and configuration summary
pub async fn health(analyzer: web::Data<Analyzer>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        engine_enabled: analyzer.engine_enabled(),
    })
}
