//! Access token issuing and verification (HMAC-signed JWTs).
//!
//! The issuer and verifier are immutable after construction and shared
//! through `Arc`; neither performs I/O. Revocation is checked separately by
//! the authentication middleware.

use std::str::FromStr;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::models::{AuthContext, AuthError, Role};
use crate::config::AuthConfig;
use crate::domain::{SchoolId, UserId};
use crate::errors::{Result, SchoolError};

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// User id rendered as a decimal string
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub school_id: Option<i64>,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub jti: String,
}

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

fn hmac_algorithm(name: &str) -> Result<Algorithm> {
    match Algorithm::from_str(name) {
        Ok(alg @ (Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)) => Ok(alg),
        _ => Err(SchoolError::config(format!("Unsupported signing algorithm: {}", name))),
    }
}

/// Signs access tokens with the process-wide secret.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    header: Header,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], algorithm: &str) -> Result<Self> {
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            header: Header::new(hmac_algorithm(algorithm)?),
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Self::new(config.secret_key.as_bytes(), &config.algorithm)
    }

    /// Issue a token valid for `ttl` from now.
    pub fn issue(
        &self,
        user_id: UserId,
        role: Role,
        school_id: Option<SchoolId>,
        ttl: Duration,
    ) -> Result<IssuedToken> {
        self.issue_at(Utc::now().timestamp(), user_id, role, school_id, ttl)
    }

    /// Issue a token as if the clock read `now` (unix seconds).
    pub fn issue_at(
        &self,
        now: i64,
        user_id: UserId,
        role: Role,
        school_id: Option<SchoolId>,
        ttl: Duration,
    ) -> Result<IssuedToken> {
        let claims = Claims {
            sub: user_id.to_string(),
            role: Some(role.as_str().to_string()),
            school_id: school_id.map(SchoolId::get),
            iat: now,
            exp: now + ttl.num_seconds(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let token = self.sign(&claims)?;
        Ok(IssuedToken { token, claims })
    }

    /// Sign an explicit claim set. Identical claims yield an identical token.
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&self.header, claims, &self.encoding_key)
            .map_err(|e| SchoolError::internal(format!("Failed to sign access token: {}", e)))
    }
}

/// Verifies access tokens and turns them into an [`AuthContext`].
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &[u8], algorithm: &str) -> Result<Self> {
        let mut validation = Validation::new(hmac_algorithm(algorithm)?);
        // Expiry is compared by hand against an injectable clock, without leeway.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self { decoding_key: DecodingKey::from_secret(secret), validation })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Self::new(config.secret_key.as_bytes(), &config.algorithm)
    }

    pub fn verify(&self, token: &str) -> std::result::Result<AuthContext, AuthError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify as if the clock read `now` (unix seconds).
    pub fn verify_at(&self, token: &str, now: i64) -> std::result::Result<AuthContext, AuthError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?
            .claims;

        if now >= claims.exp {
            return Err(AuthError::ExpiredToken);
        }

        let user_id = claims.sub.parse::<UserId>().map_err(|_| AuthError::InvalidToken)?;
        let role = claims
            .role
            .as_deref()
            .ok_or(AuthError::InvalidToken)?
            .parse::<Role>()
            .map_err(|_| AuthError::InvalidToken)?;
        let school_id = claims.school_id.map(SchoolId::new);

        if role.requires_school() && school_id.is_none() {
            return Err(AuthError::InvalidToken);
        }

        Ok(AuthContext::new(user_id, role, school_id, claims.jti, claims.exp))
    }
}
