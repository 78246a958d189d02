//! Index page handler.

use axum::Router;
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;

use crate::handler::Result;
use crate::service::{IndexPage, ServiceState};

/// Serves the index page, re-read from disk on every request.
async fn index(State(index_page): State<IndexPage>) -> Result<Html<String>> {
    Ok(Html(index_page.load().await?))
}

/// Returns a [`Router`] with the page routes.
pub fn routes() -> Router<ServiceState> {
    Router::new().route("/", get(index))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::http::header::CONTENT_TYPE;

    use crate::handler::test::create_test_server;
    use crate::service::{ArchiveService, IndexPage, ServiceState};

    fn state(index_page: IndexPage) -> ServiceState {
        ServiceState::new(ArchiveService::new("photos", 1000), index_page)
    }

    #[tokio::test]
    async fn index_serves_html() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("index.html");
        std::fs::write(&path, "<h1>Фотоархив</h1>")?;
        let server = create_test_server(state(IndexPage::new(&path)))?;

        let response = server.get("/").await;
        response.assert_status_ok();
        assert_eq!(response.header(CONTENT_TYPE), "text/html; charset=utf-8");
        assert_eq!(response.text(), "<h1>Фотоархив</h1>");

        // Edits are visible without a restart.
        std::fs::write(&path, "<h1>Обновлено</h1>")?;
        assert_eq!(server.get("/").await.text(), "<h1>Обновлено</h1>");
        Ok(())
    }

    #[tokio::test]
    async fn missing_index_is_internal_error() -> anyhow::Result<()> {
        let server = create_test_server(state(IndexPage::new("/nonexistent/index.html")))?;

        let response = server.get("/").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        Ok(())
    }
}
