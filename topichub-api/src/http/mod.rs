// Module: http
// HTTP/JSON surface for the registry's four remote operations.

pub mod error;
pub mod health;
pub mod registry;

use axum::{routing::post, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use topichub_core::registry::TopicRegistry;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TopicRegistry>,
}

/// Create the HTTP router with all routes
pub fn create_router(registry: Arc<TopicRegistry>) -> Router {
    let state = AppState { registry };

    Router::new()
        .route("/api/identity", post(registry::generate_identity))
        .route("/api/subscribe", post(registry::subscribe))
        .route("/api/unsubscribe", post(registry::unsubscribe))
        .route("/api/channel", post(registry::resolve_channel))
        .merge(health::create_health_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use topichub_core::provider::MemoryProvider;
    use topichub_core::registry::QueueLifecycle;

    use super::registry::{ChannelResponse, IdentityResponse, StatusResponse};

    fn router() -> Router {
        let provider = Arc::new(MemoryProvider::new());
        let lifecycle = QueueLifecycle::new(provider, "rome");
        create_router(Arc::new(TopicRegistry::new(lifecycle, 10)))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_of<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn test_health() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_full_subscription_round() {
        let app = router();

        let response = app
            .clone()
            .oneshot(post_json("/api/identity", json!({})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let identity: IdentityResponse = body_of(response).await;
        assert!(!identity.identity.is_empty());

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/subscribe",
                json!({"identity": identity.identity, "topic": "weather"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let subscribed: ChannelResponse = body_of(response).await;
        assert!(!subscribed.channel.is_empty());

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/channel",
                json!({"identity": identity.identity, "topic": "weather"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let resolved: ChannelResponse = body_of(response).await;
        assert_eq!(resolved.channel, subscribed.channel);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/unsubscribe",
                json!({"identity": identity.identity, "topic": "weather"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let status: StatusResponse = body_of(response).await;
        assert_eq!(status.status, 0);
    }

    #[tokio::test]
    async fn test_unknown_identity_is_404() {
        let response = router()
            .oneshot(post_json(
                "/api/subscribe",
                json!({"identity": "ghost", "topic": "weather"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_is_409() {
        let app = router();
        let identity: IdentityResponse = body_of(
            app.clone()
                .oneshot(post_json("/api/identity", json!({})))
                .await
                .expect("response"),
        )
        .await;

        let subscribe = post_json(
            "/api/subscribe",
            json!({"identity": identity.identity, "topic": "weather"}),
        );
        let first = app.clone().oneshot(subscribe).await.expect("response");
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .clone()
            .oneshot(post_json(
                "/api/subscribe",
                json!({"identity": identity.identity, "topic": "weather"}),
            ))
            .await
            .expect("response");
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_resolve_without_subscription_is_404() {
        let app = router();
        let identity: IdentityResponse = body_of(
            app.clone()
                .oneshot(post_json("/api/identity", json!({})))
                .await
                .expect("response"),
        )
        .await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/channel",
                json!({"identity": identity.identity, "topic": "weather"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
