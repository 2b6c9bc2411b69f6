//! Login service for email/password authentication.

use std::sync::{Arc, LazyLock};

use chrono::Duration;
use tracing::{info, instrument, warn};

use crate::auth::jwt::{IssuedToken, TokenIssuer};
use crate::auth::{hashing, User};
use crate::errors::{AuthErrorType, Error, Result};
use crate::observability::metrics;
use crate::storage::repositories::{SqlxUserRepository, UserRepository};

/// The only message a failed login ever produces.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Incorrect email or password";

/// Verified against whenever there is no real hash to check, so a missing
/// account costs the same Argon2 work as a wrong password.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| {
    hashing::hash_password("dummy_startup_value")
        .unwrap_or_else(|_| "$argon2id$v=19$m=19456,t=2,p=1$dW5rbm93bg$dW5rbm93bg".to_string())
});

async fn burn_dummy_verification(password: &str) {
    if let Err(e) = hashing::verify_password_blocking(password, &DUMMY_HASH).await {
        warn!(error = %e, "dummy hash verification failed unexpectedly");
    }
}

/// Checks credentials and mints access tokens.
#[derive(Clone)]
pub struct LoginService {
    user_repository: Arc<dyn UserRepository>,
    issuer: Arc<TokenIssuer>,
    access_token_ttl: Duration,
}

impl LoginService {
    pub fn new(
        user_repository: Arc<dyn UserRepository>,
        issuer: Arc<TokenIssuer>,
        access_token_ttl: Duration,
    ) -> Self {
        LazyLock::force(&DUMMY_HASH);
        Self { user_repository, issuer, access_token_ttl }
    }

    pub fn with_sqlx(
        pool: crate::storage::DbPool,
        issuer: Arc<TokenIssuer>,
        access_token_ttl: Duration,
    ) -> Self {
        Self::new(Arc::new(SqlxUserRepository::new(pool)), issuer, access_token_ttl)
    }

    /// Return the account when `email` and `password` match an active user
    /// that has a password; `None` for every other case.
    #[instrument(skip(self, email, password), name = "authenticate_credentials")]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let Some(credentials) = self.user_repository.find_credentials_by_email(email).await? else {
            burn_dummy_verification(password).await;
            warn!("login attempt for unknown email");
            return Ok(None);
        };

        let Some(stored_hash) = credentials.password_hash.as_deref() else {
            burn_dummy_verification(password).await;
            warn!(user_id = %credentials.user.id, "login attempt before password setup");
            return Ok(None);
        };

        if !hashing::verify_password_blocking(password, stored_hash).await? {
            warn!(user_id = %credentials.user.id, "login attempt with incorrect password");
            return Ok(None);
        }

        if !credentials.user.is_active {
            warn!(user_id = %credentials.user.id, "login attempt for deactivated account");
            return Ok(None);
        }

        Ok(Some(credentials.user))
    }

    /// Authenticate and issue an access token.
    ///
    /// # Errors
    ///
    /// Every credential failure maps to the same `InvalidCredentials` error
    /// so callers cannot tell an unknown email from a wrong password.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedToken> {
        let Some(user) = self.authenticate(email, password).await? else {
            metrics::record_login("invalid_credentials");
            return Err(Error::auth(INVALID_CREDENTIALS_MESSAGE, AuthErrorType::InvalidCredentials));
        };

        let issued = self.issuer.issue(user.id, user.role, user.school_id, self.access_token_ttl)?;

        metrics::record_login("success");
        info!(user_id = %user.id, role = %user.role, "user logged in");
        Ok(issued)
    }
}
