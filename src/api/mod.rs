//! HTTP layer: route handlers, OpenAPI document and router composition.
//!
//! Session endpoints live under `/api`, which is also the prefix the
//! dev proxy forwards to this service.

pub mod handlers;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// OpenAPI description of the HTTP endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "tally-gateway", description = "Shared session counters over WebSocket"),
    paths(handlers::system::health_handler, handlers::sessions::list_sessions_handler),
    tags(
        (name = "System", description = "Service status"),
        (name = "Sessions", description = "Saved counter sessions"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api", handlers::routes())
        .merge(handlers::system::routes())
}

/// Builds the full application: REST routes, the session socket and the
/// tracing and CORS layers.
pub fn build_app(state: AppState) -> Router {
    let app = Router::new()
        .merge(build_router())
        .route("/api/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    #[cfg(feature = "swagger-ui")]
    let app = app.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    app
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::SessionSettings;
    use crate::domain::SessionRegistry;

    fn app() -> Router {
        build_app(AppState {
            sessions: SessionRegistry::start(None, SessionSettings::default()),
        })
    }

    #[tokio::test]
    async fn health_is_ok() {
        let Ok(request) = Request::builder().uri("/health").body(Body::empty()) else {
            panic!("valid request");
        };
        let Ok(response) = app().oneshot(request).await else {
            panic!("router is infallible");
        };
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn sessions_without_persistence_is_empty_list() {
        let Ok(request) = Request::builder().uri("/api/sessions").body(Body::empty()) else {
            panic!("valid request");
        };
        let Ok(response) = app().oneshot(request).await else {
            panic!("router is infallible");
        };
        assert_eq!(response.status(), StatusCode::OK);
        let Ok(body) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body readable");
        };
        assert_eq!(body.as_ref(), b"[]");
    }

    #[test]
    fn openapi_lists_both_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/health"));
        assert!(doc.paths.paths.contains_key("/api/sessions"));
    }
}
