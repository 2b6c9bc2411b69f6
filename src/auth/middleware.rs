//! Axum middleware for authentication and role checks.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Extension, State},
    http::{header::AUTHORIZATION, Method, Request},
    middleware::Next,
    response::Response,
};
use tracing::{field, warn};

use crate::api::error::ApiError;
use crate::auth::auth_service::AuthService;
use crate::auth::models::{AuthContext, Role};

pub type AuthServiceState = Arc<AuthService>;

/// Roles allowed through [`require_role`].
#[derive(Debug, Clone, Copy)]
pub struct RequiredRoles(pub &'static [Role]);

/// Authenticate the bearer token and attach the [`AuthContext`] to the request.
pub async fn authenticate(
    State(auth_service): State<AuthServiceState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let header =
        request.headers().get(AUTHORIZATION).and_then(|value| value.to_str().ok()).unwrap_or("");

    match auth_service.authenticate(header).await {
        Ok(context) => {
            let span = tracing::Span::current();
            span.record("user_id", field::display(context.user_id));
            if let Some(school_id) = context.school_id() {
                span.record("school_id", field::display(school_id));
            }
            request.extensions_mut().insert(context);
            Ok(next.run(request).await)
        }
        Err(err) => {
            warn!(path = %request.uri().path(), error = %err, "authentication failed");
            Err(err.into())
        }
    }
}

/// Reject callers whose role is not in the allowed set with 403.
pub async fn require_role(
    State(RequiredRoles(allowed)): State<RequiredRoles>,
    Extension(context): Extension<AuthContext>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if allowed.contains(&context.role) {
        return Ok(next.run(request).await);
    }

    warn!(
        user_id = %context.user_id,
        role = %context.role,
        path = %request.uri().path(),
        "role check failed"
    );
    Err(ApiError::forbidden("Not enough permissions"))
}
