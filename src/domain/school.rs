//! School (tenant) entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::SchoolId;

/// A tenant. Every non-super-admin account belongs to exactly one school.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct School {
    pub id: SchoolId,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for registering a new school.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewSchool {
    #[validate(length(min = 1, max = 200, message = "School name must be 1-200 characters"))]
    pub name: String,

    #[validate(length(max = 500, message = "Address must be at most 500 characters"))]
    pub address: Option<String>,

    #[validate(length(max = 50, message = "Phone must be at most 50 characters"))]
    pub phone: Option<String>,

    #[validate(email(message = "School email must be a valid address"))]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_school_requires_name() {
        let school = NewSchool { name: String::new(), address: None, phone: None, email: None };
        assert!(school.validate().is_err());
    }

    #[test]
    fn new_school_rejects_bad_email() {
        let school = NewSchool {
            name: "Riverside".into(),
            address: None,
            phone: None,
            email: Some("not-an-email".into()),
        };
        assert!(school.validate().is_err());
    }
}
