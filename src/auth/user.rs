//! User account models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::models::{Role, TenantScope};
use crate::domain::{SchoolId, UserId};
use crate::errors::{Result, SchoolError};

/// A persisted account, without its password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub school_id: Option<SchoolId>,
    pub subject: Option<String>,
    pub is_active: bool,
    /// False until the first password has been set through a setup token
    pub has_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account row together with its stored hash, for credential checks only.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: Option<String>,
}

/// Insert payload. Built through [`NewUser::member`] or [`NewUser::super_admin`]
/// so the tenant rule holds before the row ever reaches the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    name: String,
    email: String,
    role: Role,
    school_id: Option<SchoolId>,
    subject: Option<String>,
    password_hash: Option<String>,
}

impl NewUser {
    /// A school member without a password; the first password comes from a setup token.
    pub fn member(
        scope: &TenantScope,
        role: Role,
        name: impl Into<String>,
        email: impl Into<String>,
        subject: Option<String>,
    ) -> Result<Self> {
        if !role.requires_school() {
            return Err(SchoolError::validation_field(
                "Super admin accounts cannot belong to a school",
                "role",
            ));
        }

        Ok(Self {
            name: name.into(),
            email: email.into(),
            role,
            school_id: Some(scope.school_id()),
            subject,
            password_hash: None,
        })
    }

    /// The platform super admin, created with a ready password.
    pub fn super_admin(
        name: impl Into<String>,
        email: impl Into<String>,
        password_hash: String,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            role: Role::SuperAdmin,
            school_id: None,
            subject: None,
            password_hash: Some(password_hash),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn school_id(&self) -> Option<SchoolId> {
        self.school_id
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }
}

/// Request body for adding a member to the caller's school.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMemberRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,

    #[validate(length(max = 200, message = "Subject must be at most 200 characters"))]
    pub subject: Option<String>,

    /// Students only: link the new student to this school's parent with that email
    #[validate(email(message = "Parent email must be a valid address"))]
    pub parent_email: Option<String>,
}

/// Partial update for a member. Role and school are immutable.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateMemberRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,

    #[validate(length(max = 200, message = "Subject must be at most 200 characters"))]
    pub subject: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_takes_school_from_scope() {
        let scope = TenantScope::for_tests(SchoolId::new(4));
        let user = NewUser::member(&scope, Role::Teacher, "Ana", "ana@s.io", Some("Math".into()))
            .unwrap();
        assert_eq!(user.school_id(), Some(SchoolId::new(4)));
        assert_eq!(user.subject(), Some("Math"));
        assert!(user.password_hash().is_none());
    }

    #[test]
    fn member_cannot_be_super_admin() {
        let scope = TenantScope::for_tests(SchoolId::new(4));
        assert!(NewUser::member(&scope, Role::SuperAdmin, "X", "x@s.io", None).is_err());
    }

    #[test]
    fn super_admin_has_no_school() {
        let user = NewUser::super_admin("Root", "root@s.io", "$argon2id$hash".into());
        assert_eq!(user.role(), Role::SuperAdmin);
        assert!(user.school_id().is_none());
    }

    #[test]
    fn create_member_request_validates_email() {
        let req = CreateMemberRequest {
            name: "A".into(),
            email: "nope".into(),
            subject: None,
            parent_email: None,
        };
        assert!(req.validate().is_err());

        let req = CreateMemberRequest {
            name: "A".into(),
            email: "a@s.io".into(),
            subject: None,
            parent_email: Some("nope".into()),
        };
        assert!(req.validate().is_err());
    }
}
