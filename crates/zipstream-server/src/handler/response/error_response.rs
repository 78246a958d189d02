use std::borrow::Cow;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Tracing target for error responses.
const TRACING_TARGET: &str = "zipstream_server::handler::response";

/// Plain-text HTTP error response.
///
/// Only `message` reaches the client; `resource` and `context` are logged.
#[must_use = "error responses do nothing unless serialized"]
#[derive(Debug, Clone)]
pub struct ErrorResponse<'a> {
    /// The error name/type identifier
    pub name: Cow<'a, str>,
    /// User-facing message, sent verbatim as the response body
    pub message: Cow<'a, str>,
    /// The resource that the error relates to
    pub resource: Option<Cow<'a, str>>,
    /// Internal context for debugging
    pub context: Option<Cow<'a, str>>,
    /// HTTP status code
    pub status: StatusCode,
}

impl<'a> ErrorResponse<'a> {
    // 4xx Client Errors
    pub const ARCHIVE_NOT_FOUND: Self = Self::new(
        "archive_not_found",
        "Ошибка 404: Архив не существует или был удалён",
        StatusCode::NOT_FOUND,
    );
    pub const BAD_REQUEST: Self = Self::new(
        "bad_request",
        "The request could not be processed",
        StatusCode::BAD_REQUEST,
    );
    pub const NOT_FOUND: Self = Self::new("not_found", "Not Found", StatusCode::NOT_FOUND);

    // 5xx Server Errors
    pub const INTERNAL_SERVER_ERROR: Self = Self::new(
        "internal_server_error",
        "An internal server error occurred. Please try again later",
        StatusCode::INTERNAL_SERVER_ERROR,
    );

    /// Creates a new error response.
    #[inline]
    pub const fn new(name: &'a str, message: &'a str, status: StatusCode) -> Self {
        Self {
            name: Cow::Borrowed(name),
            message: Cow::Borrowed(message),
            resource: None,
            context: None,
            status,
        }
    }

    /// Sets the resource, joining it to an existing one with `/`.
    pub fn with_resource(mut self, resource: impl Into<Cow<'a, str>>) -> Self {
        let resource = resource.into();
        self.resource = Some(match self.resource {
            Some(existing) => Cow::Owned(format!("{existing}/{resource}")),
            None => resource,
        });
        self
    }

    /// Appends `message` to the default message.
    pub fn with_message(mut self, message: impl Into<Cow<'a, str>>) -> Self {
        self.message = Cow::Owned(format!("{}. {}", self.message, message.into()));
        self
    }

    /// Sets the internal context.
    pub fn with_context(mut self, context: impl Into<Cow<'a, str>>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl IntoResponse for ErrorResponse<'_> {
    fn into_response(self) -> Response {
        tracing::debug!(
            target: TRACING_TARGET,
            name = %self.name,
            status = %self.status,
            resource = self.resource.as_deref(),
            context = self.context.as_deref(),
            "sending error response"
        );

        (self.status, self.message.into_owned()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::header;

    use super::*;

    #[tokio::test]
    async fn archive_not_found_body_is_verbatim() -> anyhow::Result<()> {
        let response = ErrorResponse::ARCHIVE_NOT_FOUND
            .with_resource("7kna")
            .with_context("missing directory")
            .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );

        let body = to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(body, "Ошибка 404: Архив не существует или был удалён".as_bytes());
        Ok(())
    }

    #[test]
    fn with_message_appends() {
        let response = ErrorResponse::INTERNAL_SERVER_ERROR.with_message("Archiver missing");
        assert_eq!(
            response.message,
            "An internal server error occurred. Please try again later. Archiver missing"
        );
    }

    #[test]
    fn with_resource_joins() {
        let response = ErrorResponse::NOT_FOUND
            .with_resource("archive")
            .with_resource("7kna");
        assert_eq!(response.resource.as_deref(), Some("archive/7kna"));
    }
}
