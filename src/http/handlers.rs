//! Route handlers
//!
//! Each handler validates its request body, delegates to the bridge, and
//! wraps the outcome in the response envelope. Authorization is a bearer
//! session token verified against both signature and directory.
use crate::error::{BridgeError, Result};
use crate::http::{bearer_token, ApiResponse, AppState};
use crate::models::Role;
use crate::services::{ChangeEmailProgress, PermissionState, SignInInput, SignUpInput};
use crate::validators::validate_phone_shape;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(custom(function = validate_phone_shape))]
    pub phone: String,
    pub address: Option<String>,
    pub role: Option<Role>,
    pub device_token: Option<String>,
    pub notification_permission: Option<PermissionState>,
}

pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;

    let outcome = state
        .bridge
        .sign_up(SignUpInput {
            email: req.email,
            password: req.password,
            name: req.name,
            phone: req.phone,
            address: req.address,
            role: req.role.unwrap_or_default(),
            device_token: req.device_token,
            notification_permission: req.notification_permission,
        })
        .await?;

    let redirect = outcome.redirect;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(outcome).redirect(redirect)),
    ))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
    pub device_token: Option<String>,
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;

    let outcome = state
        .bridge
        .sign_in(SignInInput {
            email: req.email,
            password: req.password,
            device_token: req.device_token,
        })
        .await?;

    let redirect = outcome.redirect;
    Ok(Json(ApiResponse::success(outcome).redirect(redirect)))
}

#[derive(Debug, Deserialize)]
pub struct SignOutRequest {
    pub provider_token: String,
}

pub async fn sign_out(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SignOutRequest>,
) -> Result<impl IntoResponse> {
    state.bridge.authorize(bearer_token(&headers)?).await?;
    let outcome = state.bridge.sign_out(&req.provider_token).await;
    Ok(Json(ApiResponse::success(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub provider_token: String,
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse> {
    let outcome = state.bridge.refresh(&req.provider_token).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct RequestEmailVerification {
    pub email: Option<String>,
}

/// Session bearer or a bare email in the body; the session wins when both
/// are present
pub async fn request_email_verification(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RequestEmailVerification>,
) -> Result<impl IntoResponse> {
    let email = match bearer_token(&headers) {
        Ok(token) => state.bridge.authorize(token).await?.email,
        Err(_) => req.email.ok_or_else(|| {
            BridgeError::InvalidInput("Email address or session required".into())
        })?,
    };

    state.bridge.request_email_verification(&email).await?;
    Ok(Json(ApiResponse::message("Verification code sent")))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CodeCheckRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 12))]
    pub code: String,
}

pub async fn verify_email_code(
    State(state): State<AppState>,
    Json(req): Json<CodeCheckRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let redirect = state.bridge.verify_email_code(&req.email, &req.code).await?;
    Ok(Json(ApiResponse::message("Email verified").redirect(redirect)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email)]
    pub email: String,
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    state.bridge.request_password_reset(&req.email).await?;
    Ok(Json(ApiResponse::message(
        "If the address is registered, a reset code has been sent",
    )))
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub ticket: String,
}

pub async fn verify_password_reset_code(
    State(state): State<AppState>,
    Json(req): Json<CodeCheckRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let ticket = state
        .bridge
        .verify_password_reset_code(&req.email, &req.code)
        .await?;
    Ok(Json(ApiResponse::success(TicketResponse { ticket })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePasswordRequest {
    #[validate(email)]
    pub email: String,
    pub ticket: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

pub async fn update_password(
    State(state): State<AppState>,
    Json(req): Json<UpdatePasswordRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    state
        .bridge
        .update_password(&req.email, &req.ticket, &req.new_password)
        .await?;
    Ok(Json(ApiResponse::message("Password updated")))
}

pub async fn request_new_email(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let user = state.bridge.authorize(bearer_token(&headers)?).await?;
    state.bridge.request_email_change(&user).await?;
    Ok(Json(ApiResponse::message(
        "A confirmation code was sent to your current address",
    )))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmNewEmailRequest {
    pub ticket: String,
    #[validate(email)]
    pub new_email: String,
}

pub async fn confirm_new_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ConfirmNewEmailRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let user = state.bridge.authorize(bearer_token(&headers)?).await?;
    state
        .bridge
        .confirm_new_email(&user, &req.ticket, &req.new_email)
        .await?;
    Ok(Json(ApiResponse::message(
        "A confirmation code was sent to the new address",
    )))
}

pub async fn verify_email_change_code(
    State(state): State<AppState>,
    Json(req): Json<CodeCheckRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let progress = state
        .bridge
        .verify_email_change_code(&req.email, &req.code)
        .await?;

    let completed = matches!(progress, ChangeEmailProgress::Completed { .. });
    let mut response = ApiResponse::success(progress);
    if completed {
        response = response.redirect("/account");
    }
    Ok(Json(response))
}
