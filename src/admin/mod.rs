//! Admin API: store health, breaker inspection and the manual reset override.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::store::ResilientClient;

#[derive(Clone)]
pub struct AdminState {
    pub client: Arc<ResilientClient>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/health", get(get_health))
        .route("/admin/breaker", get(get_breaker))
        .route("/admin/breaker/reset", post(reset_breaker))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API until the shutdown signal fires.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Admin API listening");
    }
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::store::ClientOptions;

    fn state() -> AdminState {
        AdminState {
            client: Arc::new(ResilientClient::in_memory(ClientOptions::default())),
            api_key: Arc::from("secret"),
        }
    }

    fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_missing_or_wrong_key() {
        let router = setup_admin_router(state());

        let res = router.clone().oneshot(request("GET", "/admin/health", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = router.oneshot(request("GET", "/admin/health", Some("nope"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let router = setup_admin_router(state());
        let res = router.oneshot(request("GET", "/admin/health", Some("secret"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body = json(res).await;
        assert_eq!(body["healthy"], true);
        assert_eq!(body["state"], "CLOSED");
        assert_eq!(body["mode"], "in_memory");
        assert_eq!(body["failure_count"], 0);
    }

    #[tokio::test]
    async fn test_reset_endpoint_closes_breaker() {
        let state = state();
        state.client.breaker().force_open();
        let router = setup_admin_router(state.clone());

        let res = router
            .clone()
            .oneshot(request("GET", "/admin/breaker", Some("secret")))
            .await
            .unwrap();
        assert_eq!(json(res).await["state"], "OPEN");

        let res = router
            .oneshot(request("POST", "/admin/breaker/reset", Some("secret")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json(res).await["state"], "CLOSED");
        assert_eq!(state.client.breaker().state(), crate::resilience::CircuitState::Closed);
    }
}
