//! Domain layer
//!
//! Plain domain entities with no HTTP or database dependencies beyond the
//! sqlx encodings of the id newtypes.

pub mod id;
pub mod school;

pub use id::{SchoolId, UserId};
pub use school::{NewSchool, School};
