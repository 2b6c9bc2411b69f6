use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::auth::models::AuthError;
use crate::errors::{AuthErrorType, Error};

/// Message for every rejected access token. The cause is only logged.
pub const TOKEN_REJECTED_MESSAGE: &str = "Could not validate credentials";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let error_kind = match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Internal(_) => "internal_error",
        };

        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::Internal(msg) => msg,
        };

        let mut response = (status, Json(ErrorBody { error: error_kind, message })).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation { message, .. } => ApiError::BadRequest(message),
            Error::SetupToken(inner) => ApiError::BadRequest(inner.to_string()),
            Error::Conflict { message, .. } => ApiError::BadRequest(message),
            Error::NotFound { .. } => ApiError::NotFound(err.to_string()),
            Error::Auth { message, error_type: AuthErrorType::InsufficientPermissions } => {
                ApiError::Forbidden(message)
            }
            Error::Auth { message, .. } => ApiError::Unauthorized(message),
            other => {
                error!(error = %other, "request failed with internal error");
                ApiError::Internal("Internal server error".to_string())
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingBearer
            | AuthError::MalformedBearer
            | AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::RevokedToken
            | AuthError::InactiveAccount => ApiError::unauthorized(TOKEN_REJECTED_MESSAGE),
            AuthError::Forbidden => ApiError::forbidden("Not enough permissions"),
            AuthError::Persistence(inner) => inner.into(),
        }
    }
}

impl ApiError {
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        ApiError::Forbidden(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SetupTokenError;
    use axum::body::to_bytes;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value, Option<HeaderValue>) {
        let response = err.into_response();
        let status = response.status();
        let header = response.headers().get(WWW_AUTHENTICATE).cloned();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap(), header)
    }

    #[tokio::test]
    async fn invalid_credentials_is_401_with_bearer_challenge() {
        let err = Error::auth("Incorrect email or password", AuthErrorType::InvalidCredentials);
        let (status, body, header) = body_json(err.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
        assert_eq!(body["message"], "Incorrect email or password");
        assert_eq!(header.unwrap(), "Bearer");
    }

    #[tokio::test]
    async fn setup_token_errors_are_400_with_distinct_messages() {
        for (inner, message) in [
            (SetupTokenError::Invalid, "Invalid token"),
            (SetupTokenError::AlreadyUsed, "Token has already been used"),
            (SetupTokenError::Expired, "Token has expired"),
        ] {
            let (status, body, _) = body_json(Error::SetupToken(inner).into()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["message"], message);
        }
    }

    #[tokio::test]
    async fn token_failures_share_one_message() {
        for err in [AuthError::MissingBearer, AuthError::ExpiredToken, AuthError::RevokedToken] {
            let (status, body, _) = body_json(err.into()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["message"], TOKEN_REJECTED_MESSAGE);
        }
    }

    #[tokio::test]
    async fn internal_errors_are_masked() {
        let (status, body, _) =
            body_json(Error::internal("disk on fire at /var/lib/db").into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn duplicate_email_is_400() {
        let (status, body, _) =
            body_json(Error::conflict("Email already exists", "user").into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email already exists");
    }
}
