//! All `axum::`[`Router`]s with related `axum::`[`Handler`]s.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use zipstream_server::handler::routes;
//! use zipstream_server::service::{ServiceConfig, ServiceState};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = ServiceConfig::default();
//! let state = ServiceState::from_config(&config)?;
//! let router: axum::Router = routes().with_state(state);
//! # Ok(())
//! # }
//! ```
//!
//! [`Router`]: axum::routing::Router
//! [`Handler`]: axum::handler::Handler

mod archives;
mod error;
mod pages;
mod response;

use axum::Router;
use axum::response::{IntoResponse, Response};

pub use crate::handler::error::{Error, ErrorKind, Result};
use crate::service::ServiceState;

#[inline]
async fn handler() -> Response {
    ErrorKind::NotFound.into_response()
}

/// Returns a [`Router`] with all routes and a plain-text 404 fallback.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .merge(pages::routes())
        .merge(archives::routes())
        .fallback(handler)
}

#[cfg(test)]
pub(crate) mod test {
    use axum_test::TestServer;

    use crate::handler::routes;
    use crate::service::ServiceState;

    /// Returns a new [`TestServer`] serving all routes with the given state.
    pub fn create_test_server(state: ServiceState) -> anyhow::Result<TestServer> {
        let app = routes().with_state(state);
        let server = TestServer::new(app)?;
        Ok(server)
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() -> anyhow::Result<()> {
        let server = create_test_server(ServiceState::from_config(&Default::default())?)?;

        let response = server.get("/archive/7kna").await;
        response.assert_status_not_found();
        assert_eq!(response.text(), "Not Found");
        Ok(())
    }
}
