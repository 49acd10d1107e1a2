//! HTTP surface of the identity bridge
//!
//! Twelve JSON auth routes plus a health check. Responses use one envelope:
//! `{status, data?, message?, redirect?}`; errors come from `BridgeError`'s
//! `IntoResponse` and never leak raw provider or database detail.
mod handlers;

use crate::services::IdentityBridge;
use axum::http::{header, HeaderMap};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{BridgeError, Result};

#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<IdentityBridge>,
}

/// Uniform response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success",
            data: Some(data),
            message: None,
            redirect: None,
        }
    }

    pub fn redirect(mut self, target: impl Into<String>) -> Self {
        self.redirect = Some(target.into());
        self
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            data: None,
            message: Some(message.into()),
            redirect: None,
        }
    }
}

/// Extract the bearer token from the Authorization header
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(BridgeError::TokenInvalid)
}

pub fn build_router(bridge: Arc<IdentityBridge>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/signup", post(handlers::sign_up))
        .route("/auth/signin", post(handlers::sign_in))
        .route("/auth/signout", post(handlers::sign_out))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/verify-email", post(handlers::request_email_verification))
        .route("/auth/verify-email-code", post(handlers::verify_email_code))
        .route("/auth/reset-password", post(handlers::request_password_reset))
        .route(
            "/auth/verify-password-reset-code",
            post(handlers::verify_password_reset_code),
        )
        .route("/auth/update-password", post(handlers::update_password))
        .route("/auth/request-new-email", post(handlers::request_new_email))
        .route("/auth/confirm-new-email", post(handlers::confirm_new_email))
        .route(
            "/auth/verify-change-email-code",
            post(handlers::verify_email_change_code),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { bridge })
}

pub async fn serve(bridge: Arc<IdentityBridge>, host: &str, port: u16) -> anyhow::Result<()> {
    let app = build_router(bridge);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install shutdown handler");
        return;
    }
    info!("Shutdown signal received");
}
