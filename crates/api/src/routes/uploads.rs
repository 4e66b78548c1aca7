//! Serves stored files from the default disk.
//!
//! Objects on a private disk are only served with a valid `expires` and
//! `signature` query, as produced by the disk's signed URLs.

use axum::{
    Router,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use stowage_core::attachment::{OCTET_STREAM, detect};
use stowage_core::storage::Visibility;
use stowage_shared::AppError;

use crate::AppState;
use crate::error::ApiError;

/// Signature query of a locally signed URL.
#[derive(Debug, Default, Deserialize)]
pub struct SignatureQuery {
    /// Expiry as unix seconds.
    pub expires: Option<i64>,
    /// URL-safe base64 signature.
    pub signature: Option<String>,
}

/// GET /uploads/{*key}
async fn serve_upload(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignatureQuery>,
) -> Result<Response, ApiError> {
    let disk = state.drive.disk(None)?;

    if disk.visibility(&key).await? == Visibility::Private {
        let (Some(expires), Some(signature)) = (query.expires, query.signature.as_deref()) else {
            return Err(AppError::Forbidden("signature required".into()).into());
        };
        let signer = disk
            .signer()
            .ok_or_else(|| AppError::Forbidden("disk does not sign URLs".into()))?;
        let now = chrono::Utc::now().timestamp();
        if !signer.verify(&key, expires, signature, now) {
            tracing::debug!(key = %key, "Rejected upload request with bad signature");
            return Err(AppError::Forbidden("invalid or expired signature".into()).into());
        }
    }

    let data = disk.get(&key).await?;
    let content_type = detect(&data).map_or_else(|_| OCTET_STREAM.to_string(), |t| t.mime_type);

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from(data),
    )
        .into_response())
}

/// Creates the file serving route.
pub fn routes() -> Router<AppState> {
    Router::new().route("/uploads/{*key}", get(serve_upload))
}
