//! `/auth` endpoints: login, password setup and the signed-in caller.

use axum::{
    extract::{Query, State},
    Extension, Form, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::error::ApiError;
use crate::api::routes::ApiState;
use crate::auth::models::AuthContext;
use crate::auth::User;
use crate::errors::{SchoolError, SetupTokenError};

/// OAuth2 password-grant style form body. `username` carries the email.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginJson {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyTokenQuery {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyTokenResponse {
    pub valid: bool,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

async fn login(state: &ApiState, email: &str, password: &str) -> Result<Json<TokenResponse>, ApiError> {
    let issued = state.login.login(email, password).await?;
    Ok(Json(TokenResponse { access_token: issued.token, token_type: "bearer".to_string() }))
}

#[instrument(skip(state, form), name = "login_form")]
pub async fn login_form_handler(
    State(state): State<ApiState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    login(&state, &form.username, &form.password).await
}

#[instrument(skip(state, payload), name = "login_json")]
pub async fn login_json_handler(
    State(state): State<ApiState>,
    Json(payload): Json<LoginJson>,
) -> Result<Json<TokenResponse>, ApiError> {
    login(&state, &payload.email, &payload.password).await
}

#[instrument(skip(state, payload), name = "set_password")]
pub async fn set_password_handler(
    State(state): State<ApiState>,
    Json(payload): Json<SetPasswordRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.setup_tokens.set_password(&payload.token, &payload.new_password).await?;

    Ok(Json(ActionResponse {
        success: true,
        message: "Password set successfully. You can now log in.".to_string(),
    }))
}

/// Check a setup token without consuming it.
#[instrument(skip(state, query), name = "verify_setup_token")]
pub async fn verify_token_handler(
    State(state): State<ApiState>,
    Query(query): Query<VerifyTokenQuery>,
) -> Result<Json<VerifyTokenResponse>, ApiError> {
    let record = state.setup_tokens.validate(&query.token).await?;
    let user = state
        .users
        .get_user(record.user_id)
        .await?
        .filter(|user| user.is_active)
        .ok_or(SchoolError::SetupToken(SetupTokenError::Invalid))?;

    Ok(Json(VerifyTokenResponse { valid: true, email: user.email, expires_at: record.expires_at }))
}

pub async fn me_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .users
        .get_user(context.user_id)
        .await?
        .ok_or_else(|| SchoolError::not_found("User", context.user_id.to_string()))?;
    Ok(Json(user))
}

pub async fn logout_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.auth.logout(&context).await?;
    Ok(Json(ActionResponse { success: true, message: "Logged out".to_string() }))
}
