use std::path::Path;
use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use super::{models::HealthResponse, state::AppState};
use crate::api::error::ApiError;
use crate::artifacts::{ArtifactManager, InFlightRequest, RequestState};
use crate::detect::OCTET_STREAM;
use crate::forward::{self, Upload};

pub const READY_TEXT: &str =
    "Re-encoding gateway is active and listening, please use POST method";

/// Readiness probe (GET /)
pub async fn status() -> impl IntoResponse {
    (StatusCode::OK, READY_TEXT)
}

/// Diagnostic snapshot (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let admission = state.pipeline.admission();
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        in_flight: state.artifacts.registry().len(),
        encoders_running: admission.running(),
        encoders_waiting: admission.waiting(),
        encoder_limit: admission.limit(),
        pending_cleanups: state.artifacts.scheduler().pending(),
        metrics: state.metrics.snapshot(),
    };

    (StatusCode::OK, Json(response))
}

/// Upload interception endpoint (POST /)
///
/// Accepts a `multipart/form-data` body with exactly one file part and a
/// `TargetUrl` header naming where the result should go.
///
/// ## Flow:
/// 1. Validate the request content type and the destination URL
/// 2. Stream the file part to a fresh temp path
/// 3. Optionally correct the content type, probe, select a profile, encode
/// 4. Post the final artifact downstream as a streamed multipart body
/// 5. Relay the downstream status, headers and body to the caller
///
/// The temp artifacts are owned by an [`InFlightRequest`] that travels with
/// the relayed body, so cleanup is scheduled once streaming finishes. On
/// every error path it is dropped early and cleanup is scheduled then.
pub async fn forward_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    match handle_upload(&state, &headers, multipart).await {
        Ok(response) => Ok(response),
        Err(e) => {
            state.metrics.request_failed();
            if e.status_code().is_server_error() {
                error!(code = e.code(), error = %e, "Upload failed");
            } else {
                warn!(code = e.code(), error = %e, "Upload rejected");
            }
            Err(e)
        }
    }
}

async fn handle_upload(
    state: &AppState,
    headers: &HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("Only accepting form requests".into()))?;
    super::utils::parse_content_type(content_type)?;

    // Before any file I/O
    let target = forward::target_url(headers)?;
    let outbound_headers = forward::forwarded_headers(headers);

    let mut multipart =
        multipart.map_err(|e| ApiError::InvalidPayload(e.body_text()))?;

    let (mut request, field_name) = read_single_file(&mut multipart, &state.artifacts).await?;
    request.advance(RequestState::Downloaded)?;
    info!(
        file_name = request.original_name(),
        content_type = request.content_type(),
        path = %request.temp_path().display(),
        target = %target,
        "Upload received"
    );
    state.metrics.request_accepted();

    state.pipeline.prepare(&mut request).await?;

    request.advance(RequestState::Forwarding)?;
    info!(
        path = %request.final_path().display(),
        file_name = request.final_filename(),
        content_type = request.final_content_type(),
        target = %target,
        "Forwarding"
    );

    let sent = state
        .forwarder
        .send(
            target,
            outbound_headers,
            Upload {
                field_name: &field_name,
                path: request.final_path(),
                file_name: request.final_filename(),
                content_type: request.final_content_type(),
            },
        )
        .await;

    let downstream = match sent {
        Ok(downstream) => downstream,
        Err(e) => {
            request.finish_forward(false)?;
            return Err(e.into());
        }
    };

    let status = downstream.status();
    request.finish_forward(status.is_success())?;
    state.metrics.request_forwarded();
    info!(status = status.as_u16(), path = %request.temp_path().display(), "Downstream responded");

    Ok(forward::relay(downstream, request))
}

/// Reads the form to its end and stores its single file part in a new
/// request. Non-file fields are skipped.
///
/// The request comes back in `Received`; the caller advances it to
/// `Downloaded` only after the whole form has been accepted.
async fn read_single_file(
    multipart: &mut Multipart,
    artifacts: &Arc<ArtifactManager>,
) -> Result<(InFlightRequest, String), ApiError> {
    let mut upload: Option<(InFlightRequest, String)> = None;
    while let Some(mut field) = multipart.next_field().await? {
        let Some(raw_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        if upload.is_some() {
            return Err(ApiError::InvalidPayload(
                "Only accepting form requests with a single file".into(),
            ));
        }

        let file_name = super::utils::upload_file_name(&raw_name)?;
        let field_name = field.name().unwrap_or("file").to_owned();
        let declared = field.content_type().unwrap_or(OCTET_STREAM).to_owned();

        let request = artifacts.open(&file_name, &declared).await?;
        let written = store_field(&mut field, request.temp_path()).await?;
        debug!(path = %request.temp_path().display(), bytes = written, "Upload stored");

        upload = Some((request, field_name));
    }

    upload.ok_or_else(|| {
        ApiError::InvalidPayload("Only accepting form requests with a single file".into())
    })
}

/// Streams one multipart field to `path`, returning the byte count.
async fn store_field(field: &mut Field<'_>, path: &Path) -> Result<u64, ApiError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
