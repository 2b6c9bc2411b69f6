//! Request authentication: bearer parsing, token verification, revocation and
//! account status.

use std::sync::Arc;

use chrono::Utc;
use tracing::{field, info, instrument};

use crate::auth::jwt::TokenVerifier;
use crate::auth::models::{AuthContext, AuthError};
use crate::errors::Result;
use crate::observability::metrics;
use crate::storage::repositories::{
    RevokedTokenRepository, SqlxRevokedTokenRepository, SqlxUserRepository, UserRepository,
};

#[derive(Clone)]
pub struct AuthService {
    verifier: Arc<TokenVerifier>,
    revoked_tokens: Arc<dyn RevokedTokenRepository>,
    user_repository: Arc<dyn UserRepository>,
}

impl AuthService {
    pub fn new(
        verifier: Arc<TokenVerifier>,
        revoked_tokens: Arc<dyn RevokedTokenRepository>,
        user_repository: Arc<dyn UserRepository>,
    ) -> Self {
        Self { verifier, revoked_tokens, user_repository }
    }

    pub fn with_sqlx(pool: crate::storage::DbPool, verifier: Arc<TokenVerifier>) -> Self {
        Self::new(
            verifier,
            Arc::new(SqlxRevokedTokenRepository::new(pool.clone())),
            Arc::new(SqlxUserRepository::new(pool)),
        )
    }

    /// Turn an `Authorization` header value into a verified context.
    #[instrument(skip(self, header), fields(user_id = field::Empty))]
    pub async fn authenticate(&self, header: &str) -> std::result::Result<AuthContext, AuthError> {
        let header = header.trim();
        if header.is_empty() {
            metrics::record_token_rejection("missing_bearer");
            return Err(AuthError::MissingBearer);
        }

        let token = match header.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
                token.trim()
            }
            _ => {
                metrics::record_token_rejection("malformed");
                return Err(AuthError::MalformedBearer);
            }
        };

        let context = match self.verifier.verify(token) {
            Ok(context) => context,
            Err(err) => {
                metrics::record_token_rejection(match err {
                    AuthError::ExpiredToken => "expired",
                    _ => "invalid",
                });
                return Err(err);
            }
        };
        tracing::Span::current().record("user_id", field::display(context.user_id));

        if self.revoked_tokens.is_revoked(&context.jti).await? {
            metrics::record_token_rejection("revoked");
            return Err(AuthError::RevokedToken);
        }

        match self.user_repository.get_user(context.user_id).await? {
            Some(user) if user.is_active => Ok(context),
            _ => {
                metrics::record_token_rejection("inactive_account");
                Err(AuthError::InactiveAccount)
            }
        }
    }

    /// Deny the presented token for the rest of its lifetime.
    #[instrument(skip(self, context), fields(user_id = %context.user_id), name = "logout")]
    pub async fn logout(&self, context: &AuthContext) -> Result<()> {
        self.revoked_tokens.revoke(&context.jti, context.user_id, context.expires_at).await?;

        // Drop entries whose tokens have expired.
        let purged = self.revoked_tokens.purge_expired(Utc::now().timestamp()).await?;
        info!(purged, "access token revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::TokenIssuer;
    use crate::auth::models::{Role, TenantScope};
    use crate::auth::user::NewUser;
    use crate::domain::UserId;
    use crate::storage::repositories::user::insert_user;
    use crate::storage::test_helpers::{insert_school, migrated_pool};
    use chrono::Duration;

    const SECRET: &[u8] = b"auth-service-test-secret-with-enough-bytes";

    async fn fixture() -> (AuthService, TokenIssuer, UserId, TenantScope, crate::storage::DbPool) {
        let pool = migrated_pool().await;
        let scope = TenantScope::for_tests(insert_school(&pool, "A").await);
        let mut conn = pool.acquire().await.unwrap();
        let user = insert_user(
            &mut conn,
            &NewUser::member(&scope, Role::Admin, "Ada", "ada@a.io", None).unwrap(),
        )
        .await
        .unwrap();
        drop(conn);

        let verifier = Arc::new(TokenVerifier::new(SECRET, "HS256").unwrap());
        let service = AuthService::with_sqlx(pool.clone(), verifier);
        (service, TokenIssuer::new(SECRET, "HS256").unwrap(), user.id, scope, pool)
    }

    #[tokio::test]
    async fn header_parsing() {
        let (service, ..) = fixture().await;
        assert!(matches!(service.authenticate("").await, Err(AuthError::MissingBearer)));
        assert!(matches!(service.authenticate("Basic abc").await, Err(AuthError::MalformedBearer)));
        assert!(matches!(service.authenticate("Bearer").await, Err(AuthError::MalformedBearer)));
        assert!(matches!(service.authenticate("Bearer junk").await, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn valid_token_then_logout_revokes_it() {
        let (service, issuer, user_id, scope, _pool) = fixture().await;
        let issued = issuer
            .issue(user_id, Role::Admin, Some(scope.school_id()), Duration::minutes(5))
            .unwrap();
        let header = format!("bearer {}", issued.token);

        let context = service.authenticate(&header).await.unwrap();
        assert_eq!(context.user_id, user_id);

        service.logout(&context).await.unwrap();
        assert!(matches!(service.authenticate(&header).await, Err(AuthError::RevokedToken)));
    }

    #[tokio::test]
    async fn deactivated_account_is_rejected() {
        let (service, issuer, user_id, scope, pool) = fixture().await;
        let issued = issuer
            .issue(user_id, Role::Admin, Some(scope.school_id()), Duration::minutes(5))
            .unwrap();
        SqlxUserRepository::new(pool).deactivate_member(&scope, user_id, Role::Admin).await.unwrap();

        let result = service.authenticate(&format!("Bearer {}", issued.token)).await;
        assert!(matches!(result, Err(AuthError::InactiveAccount)));
    }
}
