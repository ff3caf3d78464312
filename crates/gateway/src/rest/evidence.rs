//! Evidence files attached to reports.

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use conducky_database::{EvidenceFile, NewEvidence, MEMBERS};
use tracing::info;

use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::rate_limit::{throttled, RateLimitPolicy};
use crate::rbac::guarded;
use crate::rest::reports::report_access;
use crate::session::CurrentUser;
use crate::state::GatewayState;

const EVIDENCE_FIELD: &str = "evidence";
const FALLBACK_MIME: &str = "application/octet-stream";

pub fn routes(state: &GatewayState) -> Router<GatewayState> {
    let upload_limit = state.settings().uploads.evidence_max_bytes;
    Router::new()
        .route(
            "/api/reports/:reportId/evidence",
            throttled(
                guarded(post(upload_evidence), state, MEMBERS),
                state,
                RateLimitPolicy::EvidenceUpload,
            )
            .layer(DefaultBodyLimit::max(upload_limit))
            .merge(guarded(get(list_evidence), state, MEMBERS)),
        )
        .route(
            "/api/reports/:reportId/evidence/:evidence_id",
            guarded(get(download_evidence), state, MEMBERS),
        )
}

#[utoipa::path(
    post,
    path = "/api/reports/{reportId}/evidence",
    tag = "Evidence",
    params(("reportId" = String, Path, description = "Report id")),
    request_body(content = Vec<u8>, content_type = "multipart/form-data", description = "One or more `evidence` file fields"),
    responses(
        (status = 201, description = "Files stored", body = [EvidenceFile]),
        (status = 400, description = "No files or empty file", body = ErrorResponse),
        (status = 403, description = "Neither the reporter nor a responder", body = ErrorResponse),
        (status = 413, description = "Upload too large", body = ErrorResponse),
        (status = 429, description = "Too many uploads", body = ErrorResponse)
    )
)]
pub async fn upload_evidence(
    State(state): State<GatewayState>,
    current: CurrentUser,
    Path(report_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Vec<EvidenceFile>>)> {
    let (report, _) = report_access(&state, &current, &report_id).await?;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::new(error.status(), error.body_text()))?
    {
        if field.name() != Some(EVIDENCE_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "evidence".to_string());
        let mime_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| FALLBACK_MIME.to_string());
        let data = field
            .bytes()
            .await
            .map_err(|error| ApiError::new(error.status(), error.body_text()))?;
        files.push(NewEvidence {
            filename,
            mime_type,
            data: data.to_vec(),
        });
    }

    if files.is_empty() {
        return Err(ApiError::bad_request("No evidence files uploaded"));
    }

    let stored = state
        .evidence()
        .create_many(&report.id, current.id(), files)
        .await?;
    info!(report_id = %report.id, count = stored.len(), "evidence uploaded");

    Ok((StatusCode::CREATED, Json(stored)))
}

#[utoipa::path(
    get,
    path = "/api/reports/{reportId}/evidence",
    tag = "Evidence",
    params(("reportId" = String, Path, description = "Report id")),
    responses(
        (status = 200, description = "Evidence metadata", body = [EvidenceFile]),
        (status = 403, description = "Neither the reporter nor a responder", body = ErrorResponse)
    )
)]
pub async fn list_evidence(
    State(state): State<GatewayState>,
    current: CurrentUser,
    Path(report_id): Path<String>,
) -> ApiResult<Json<Vec<EvidenceFile>>> {
    let (report, _) = report_access(&state, &current, &report_id).await?;
    Ok(Json(state.evidence().list_for_report(&report.id).await?))
}

#[utoipa::path(
    get,
    path = "/api/reports/{reportId}/evidence/{evidence_id}",
    tag = "Evidence",
    params(
        ("reportId" = String, Path, description = "Report id"),
        ("evidence_id" = String, Path, description = "Evidence file id")
    ),
    responses(
        (status = 200, description = "File content with its original type"),
        (status = 403, description = "Neither the reporter nor a responder", body = ErrorResponse),
        (status = 404, description = "Evidence not found", body = ErrorResponse)
    )
)]
pub async fn download_evidence(
    State(state): State<GatewayState>,
    current: CurrentUser,
    Path((report_id, evidence_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let (report, _) = report_access(&state, &current, &report_id).await?;
    let content = state.evidence().content(&report.id, &evidence_id).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content.mime_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", disposition_filename(&content.filename)),
        )
        .header(header::CONTENT_LENGTH, content.data.len())
        .body(Body::from(content.data))
        .map_err(ApiError::internal)
}

/// Keep the quoted `filename` parameter well formed.
fn disposition_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    if cleaned.trim().is_empty() {
        "evidence".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::disposition_filename;

    #[test]
    fn disposition_filename_strips_quotes_and_control_characters() {
        assert_eq!(disposition_filename("photo.png"), "photo.png");
        assert_eq!(disposition_filename("a\"b\r\n.txt"), "ab.txt");
        assert_eq!(disposition_filename("\"\""), "evidence");
    }
}
