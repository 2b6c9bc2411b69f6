//! Repository modules for data access
//!
//! One file per table. Pool-backed repositories sit behind `async_trait`
//! traits; operations that must share a transaction are free functions
//! taking `&mut SqliteConnection`.

pub mod password_token;
pub mod revoked_token;
pub mod school;
pub mod student_parent;
pub mod user;

pub use password_token::PasswordTokenRecord;
pub use revoked_token::{RevokedTokenRepository, SqlxRevokedTokenRepository};
pub use school::{SchoolRepository, SqlxSchoolRepository};
pub use student_parent::{
    SqlxStudentParentRepository, StudentParentLink, StudentParentRepository,
};
pub use user::{MemberCounts, SqlxUserRepository, UserRepository};
