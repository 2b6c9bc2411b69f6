//! Roles, request-scoped authentication context and the tenant scope derived from it.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

use crate::domain::{SchoolId, UserId};
use crate::errors::Error;

/// Account role. Every role except `SuperAdmin` is bound to exactly one school.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    Admin,
    Teacher,
    Parent,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::Admin => "ADMIN",
            Role::Teacher => "TEACHER",
            Role::Parent => "PARENT",
            Role::Student => "STUDENT",
        }
    }

    /// Whether accounts with this role must carry a school id.
    pub fn requires_school(&self) -> bool {
        !matches!(self, Role::SuperAdmin)
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            "ADMIN" => Ok(Role::Admin),
            "TEACHER" => Ok(Role::Teacher),
            "PARENT" => Ok(Role::Parent),
            "STUDENT" => Ok(Role::Student),
            other => Err(RoleParseError(other.to_string())),
        }
    }
}

/// Error returned when role parsing fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid role: {0}")]
pub struct RoleParseError(pub String);

/// Request-scoped authentication context derived from a verified access token.
///
/// Only the token verifier can build one, so holding an `AuthContext` proves
/// the signature, expiry and claim shape were checked.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: UserId,
    pub role: Role,
    school_id: Option<SchoolId>,
    /// Unique token id, used by the revocation denylist
    pub jti: String,
    /// `exp` claim of the presented token (unix seconds)
    pub expires_at: i64,
}

impl AuthContext {
    pub(crate) fn new(
        user_id: UserId,
        role: Role,
        school_id: Option<SchoolId>,
        jti: String,
        expires_at: i64,
    ) -> Self {
        Self { user_id, role, school_id, jti, expires_at }
    }

    pub fn school_id(&self) -> Option<SchoolId> {
        self.school_id
    }

    /// The caller's own tenant. Fails for accounts without a school.
    pub fn tenant_scope(&self) -> Result<TenantScope, AuthError> {
        self.school_id.map(|school_id| TenantScope { school_id }).ok_or(AuthError::Forbidden)
    }

    /// Act inside an arbitrary school. Reserved for the platform super admin.
    pub fn delegated_scope(&self, school_id: SchoolId) -> Result<TenantScope, AuthError> {
        if self.role == Role::SuperAdmin {
            Ok(TenantScope { school_id })
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

/// Proof that the holder may read and write inside one school.
///
/// Tenant-scoped repository operations take this instead of a raw school id,
/// so a client-supplied id can never widen a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantScope {
    school_id: SchoolId,
}

impl TenantScope {
    pub fn school_id(&self) -> SchoolId {
        self.school_id
    }

    #[cfg(test)]
    pub(crate) fn for_tests(school_id: SchoolId) -> Self {
        Self { school_id }
    }
}

/// Errors returned by authentication middleware/services.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unauthorized: bearer token missing")]
    MissingBearer,
    #[error("unauthorized: malformed bearer token")]
    MalformedBearer,
    #[error("unauthorized: invalid token")]
    InvalidToken,
    #[error("unauthorized: token expired")]
    ExpiredToken,
    #[error("unauthorized: token revoked")]
    RevokedToken,
    #[error("unauthorized: account inactive")]
    InactiveAccount,
    #[error("forbidden: insufficient role")]
    Forbidden,
    #[error(transparent)]
    Persistence(#[from] Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip() {
        for (input, expected) in [
            ("SUPER_ADMIN", Role::SuperAdmin),
            ("ADMIN", Role::Admin),
            ("TEACHER", Role::Teacher),
            ("PARENT", Role::Parent),
            ("STUDENT", Role::Student),
        ] {
            let parsed = input.parse::<Role>().unwrap();
            assert_eq!(parsed, expected);
            assert_eq!(parsed.to_string(), input);
        }

        let err = "admin".parse::<Role>().unwrap_err();
        assert_eq!(err.0, "admin");
    }

    #[test]
    fn role_serializes_screaming_snake_case() {
        assert_eq!(serde_json::to_string(&Role::SuperAdmin).unwrap(), "\"SUPER_ADMIN\"");
    }

    #[test]
    fn tenant_scope_comes_from_context_school() {
        let ctx = AuthContext::new(
            UserId::new(1),
            Role::Admin,
            Some(SchoolId::new(9)),
            "jti".into(),
            0,
        );
        assert_eq!(ctx.tenant_scope().unwrap().school_id(), SchoolId::new(9));
        assert!(matches!(ctx.delegated_scope(SchoolId::new(3)), Err(AuthError::Forbidden)));
    }

    #[test]
    fn super_admin_has_no_own_scope_but_can_delegate() {
        let ctx = AuthContext::new(UserId::new(1), Role::SuperAdmin, None, "jti".into(), 0);
        assert!(matches!(ctx.tenant_scope(), Err(AuthError::Forbidden)));
        assert_eq!(ctx.delegated_scope(SchoolId::new(3)).unwrap().school_id(), SchoolId::new(3));
    }
}
