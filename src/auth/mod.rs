//! Authentication and authorization module entry point.
//!
//! Password hashing, access tokens, one-time setup tokens, account
//! provisioning and the axum middleware that turns a bearer token into an
//! [`AuthContext`].

pub mod auth_service;
pub mod bootstrap;
mod hashing;
pub mod invitation_service;
pub mod jwt;
pub mod login_service;
pub mod middleware;
pub mod models;
pub mod setup_token;
pub mod user;

pub use auth_service::AuthService;
pub use bootstrap::{bootstrap_super_admin, BootstrapOutcome};
pub use invitation_service::{InvitationService, ProvisionedAccount};
pub use jwt::{Claims, IssuedToken, TokenIssuer, TokenVerifier};
pub use login_service::LoginService;
pub use models::{AuthContext, AuthError, Role, TenantScope};
pub use setup_token::SetupTokenService;
pub use user::{CreateMemberRequest, UpdateMemberRequest, User};
