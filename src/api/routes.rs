use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::analysis::Analyzer;
use crate::api::handlers::analysis::{analyze_capture, health};
use crate::api::upload::{CAPTURE_EXTENSIONS, CAPTURE_MIME_TYPES, FILE_FIELD};
use crate::models::result::STREAM_ORDERING;

/// Root endpoint to provide information about the API
async fn index(analyzer: web::Data<Analyzer>) -> impl Responder {
    let config = analyzer.config();

    HttpResponse::Ok().json(json!({
        "name": "capscope API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Capture-file analyzer: protocol hierarchy, endpoints, streams and IDS results",
        "endpoints": [
            {
                "path": "/api/health",
                "method": "GET",
                "description": "Service status"
            },
            {
                "path": "/api/analyze",
                "method": "POST",
                "description": "Analyze a pcap or pcap-ng file sent as multipart field 'file'"
            },
            {
                "path": "/analyze",
                "method": "POST",
                "description": "Alias of /api/analyze"
            }
        ],
        "limits": {
            "max_upload_bytes": config.max_capture_bytes,
            "analysis_timeout_secs": config.analysis_timeout_secs,
            "engine_timeout_secs": config.engine.timeout_secs,
        },
        "upload": {
            "field": FILE_FIELD,
            "extensions": CAPTURE_EXTENSIONS,
            "content_types": CAPTURE_MIME_TYPES,
        },
        "stream_ordering": {
            "value": STREAM_ORDERING,
            "note": "Stream text is rebuilt in capture order. Retransmitted and out-of-order TCP segments appear as observed; there is no sequence-number reassembly."
        },
        "engine_enabled": analyzer.engine_enabled(),
    }))
}

/// Configure API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // Root endpoint
        .route("/", web::get().to(index))
        // Path used by the upload form
        .route("/analyze", web::post().to(analyze_capture))
        .service(
            web::scope("/api")
                .route("/health", web::get().to(health))
                .route("/analyze", web::post().to(analyze_capture)),
        );
}
