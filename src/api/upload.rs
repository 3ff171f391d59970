use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::mime::Mime;
use futures_util::TryStreamExt;
use log::debug;
use std::path::Path;

use crate::utils::error::{AppError, AppResult};

/// Multipart field carrying the capture
pub const FILE_FIELD: &str = "file";

/// File name extensions accepted as captures
pub const CAPTURE_EXTENSIONS: &[&str] = &["pcap", "pcapng", "cap"];

/// Content types accepted as captures regardless of the file name
pub const CAPTURE_MIME_TYPES: &[&str] = &["application/vnd.tcpdump.pcap", "application/x-pcapng"];

/// A capture received from a client
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Decide from the part headers whether a file looks like a capture
///
/// A capture extension is enough; otherwise the content type must be one of
/// the capture types. `application/octet-stream` alone is not.
pub fn is_capture_upload(file_name: Option<&str>, content_type: Option<&Mime>) -> bool {
    let has_capture_extension = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            CAPTURE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known))
        });
    if has_capture_extension {
        return true;
    }

    content_type.map_or(false, |mime| {
        let essence = mime.essence_str();
        CAPTURE_MIME_TYPES.iter().any(|known| essence.eq_ignore_ascii_case(known))
    })
}

/// Read the capture out of a multipart body
///
/// The size ceiling is enforced while the body streams in, so an oversized
/// upload is never buffered completely.
pub async fn read_capture_upload(mut payload: Multipart, limit: usize) -> AppResult<Upload> {
    while let Some(field) = payload.try_next().await.map_err(malformed_body)? {
        if field.content_disposition().get_name() != Some(FILE_FIELD) {
            debug!("Ignoring multipart field {:?}", field.content_disposition().get_name());
            continue;
        }
        return read_file_field(field, limit).await;
    }

    Err(AppError::InvalidUpload(format!("missing multipart field '{}'", FILE_FIELD)))
}

async fn read_file_field(mut field: Field, limit: usize) -> AppResult<Upload> {
    let file_name = field
        .content_disposition()
        .get_filename()
        .map(str::to_string)
        .unwrap_or_default();

    if !is_capture_upload(Some(&file_name), field.content_type()) {
        return Err(AppError::InvalidUpload(format!(
            "'{}' ({}) is not a pcap or pcap-ng capture",
            file_name,
            field
                .content_type()
                .map_or_else(|| "no content type".to_string(), |mime| mime.to_string())
        )));
    }

    let mut data = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(malformed_body)? {
        append_within_limit(&mut data, &chunk, limit)?;
    }

    if data.is_empty() {
        return Err(AppError::InvalidUpload(format!("'{}' is empty", file_name)));
    }

    Ok(Upload { file_name, data })
}

/// Grow the upload buffer, rejecting the upload once it passes the ceiling
fn append_within_limit(data: &mut Vec<u8>, chunk: &[u8], limit: usize) -> AppResult<()> {
    if data.len() + chunk.len() > limit {
        return Err(AppError::InvalidUpload(format!(
            "upload exceeds the {} byte size limit",
            limit
        )));
    }
    data.extend_from_slice(chunk);
    Ok(())
}

fn malformed_body(e: MultipartError) -> AppError {
    AppError::InvalidUpload(format!("unreadable multipart body: {}", e))
}
