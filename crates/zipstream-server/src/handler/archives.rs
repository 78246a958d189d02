//! Archive download handler.
//!
//! The response is committed as soon as the archiver is running; from then on
//! failures can only cut the body short, never change the status code.

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use crate::handler::{Error, ErrorKind, Result};
use crate::service::{ArchiveService, ServiceState};

/// Tracing target for archive downloads.
const TRACING_TARGET: &str = "zipstream_server::handler::archives";

/// Content type sent with every archive.
const ARCHIVE_CONTENT_TYPE: &str = "application/zip, application/octet-stream";

/// Streams the ZIP archive of the directory named by `archive_id`.
async fn download_archive(
    State(archive_service): State<ArchiveService>,
    Path(archive_id): Path<String>,
) -> Result<Response> {
    if archive_service.resolve(&archive_id).await.is_none() {
        tracing::info!(
            target: TRACING_TARGET,
            archive_id = %archive_id,
            "archive not found"
        );
        return Err(ErrorKind::ArchiveNotFound.with_resource(archive_id));
    }

    let content_disposition = content_disposition(&archive_id)?;
    let stream = archive_service
        .open(&archive_id)
        .map_err(|err| Error::from(err).with_resource(archive_id.clone()))?;

    tracing::info!(
        target: TRACING_TARGET,
        archive_id = %archive_id,
        "streaming archive"
    );

    let headers = [
        (CONTENT_DISPOSITION, content_disposition),
        (CONTENT_TYPE, HeaderValue::from_static(ARCHIVE_CONTENT_TYPE)),
    ];

    Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
}

/// Builds `attachment; filename="{archive_id}.zip"`.
fn content_disposition(archive_id: &str) -> Result<HeaderValue> {
    let value = format!("attachment; filename=\"{archive_id}.zip\"");
    HeaderValue::from_bytes(value.as_bytes()).map_err(|err| {
        ErrorKind::BadRequest
            .with_message("The archive name cannot be used as a file name")
            .with_resource(archive_id.to_owned())
            .with_context(err.to_string())
    })
}

/// Returns a [`Router`] with the archive routes.
pub fn routes() -> Router<ServiceState> {
    Router::new().route("/archive/{archive_id}/", get(download_archive))
}
