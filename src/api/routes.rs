use std::sync::Arc;

use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method, Request,
    },
    middleware,
    routing::{delete, get, post, put},
    Extension, Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::auth::middleware::{authenticate, require_role, RequiredRoles};
use crate::auth::models::Role;
use crate::auth::{
    AuthService, InvitationService, LoginService, SetupTokenService, TokenIssuer, TokenVerifier,
};
use crate::config::{AppConfig, ServerConfig};
use crate::errors::Result;
use crate::mail::SharedMailer;
use crate::observability::record_http_metrics;
use crate::request_span;
use crate::storage::repositories::{
    SchoolRepository, SqlxSchoolRepository, SqlxStudentParentRepository, SqlxUserRepository,
    StudentParentRepository, UserRepository,
};
use crate::storage::DbPool;

use super::handlers::{
    admin::{self, MemberRole},
    auth as auth_handlers, health, super_admin,
};

/// Shared, immutable handler state built once at startup.
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<AppConfig>,
    pub pool: DbPool,
    pub users: Arc<dyn UserRepository>,
    pub schools: Arc<dyn SchoolRepository>,
    pub links: Arc<dyn StudentParentRepository>,
    pub login: Arc<LoginService>,
    pub setup_tokens: Arc<SetupTokenService>,
    pub invitations: Arc<InvitationService>,
    pub auth: Arc<AuthService>,
}

impl ApiState {
    pub fn new(config: Arc<AppConfig>, pool: DbPool, mailer: SharedMailer) -> Result<Self> {
        let issuer = Arc::new(TokenIssuer::from_config(&config.auth)?);
        let verifier = Arc::new(TokenVerifier::from_config(&config.auth)?);
        let users: Arc<dyn UserRepository> = Arc::new(SqlxUserRepository::new(pool.clone()));

        let login = LoginService::new(users.clone(), issuer, config.auth.access_token_ttl());
        let setup_tokens = SetupTokenService::from_config(pool.clone(), &config.auth);
        let invitations = InvitationService::new(
            pool.clone(),
            users.clone(),
            mailer,
            Arc::new(config.mail.clone()),
            config.auth.password_token_ttl(),
        );
        let auth = AuthService::with_sqlx(pool.clone(), verifier);

        Ok(Self {
            schools: Arc::new(SqlxSchoolRepository::new(pool.clone())),
            links: Arc::new(SqlxStudentParentRepository::new(pool.clone())),
            users,
            login: Arc::new(login),
            setup_tokens: Arc::new(setup_tokens),
            invitations: Arc::new(invitations),
            auth: Arc::new(auth),
            config,
            pool,
        })
    }
}

/// CRUD routes for one member collection (`/admin/teachers` etc.).
fn member_routes(collection: &str, role: Role) -> Router<ApiState> {
    Router::new()
        .route(
            &format!("/admin/{}", collection),
            get(admin::list_members_handler).post(admin::create_member_handler),
        )
        .route(
            &format!("/admin/{}/{{id}}", collection),
            put(admin::update_member_handler).delete(admin::delete_member_handler),
        )
        .layer(Extension(MemberRole(role)))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn build_router(state: ApiState) -> Router {
    let auth_layer = middleware::from_fn_with_state(state.auth.clone(), authenticate);
    let role_layer = |roles: &'static [Role]| {
        middleware::from_fn_with_state(RequiredRoles(roles), require_role)
    };

    let public = Router::new()
        .route("/", get(health::root_handler))
        .route("/health", get(health::health_handler))
        .route("/auth/login", post(auth_handlers::login_form_handler))
        .route("/auth/login-json", post(auth_handlers::login_json_handler))
        .route("/auth/set-password", post(auth_handlers::set_password_handler))
        .route("/auth/verify-token", get(auth_handlers::verify_token_handler))
        .route("/super-admin/setup", post(super_admin::setup_handler));

    let signed_in = Router::new()
        .route("/auth/me", get(auth_handlers::me_handler))
        .route("/auth/logout", post(auth_handlers::logout_handler));

    let super_admin_api = Router::new()
        .route(
            "/super-admin/schools",
            get(super_admin::list_schools_handler).post(super_admin::create_school_handler),
        )
        .route("/super-admin/schools/{id}", get(super_admin::get_school_handler))
        .route("/super-admin/schools/{id}/admins", post(super_admin::invite_admin_handler))
        .route_layer(role_layer(&[Role::SuperAdmin]));

    let school_admin_api = Router::new()
        .route("/admin/dashboard/stats", get(admin::dashboard_stats_handler))
        .route("/admin/users/{id}/password-reset", post(admin::password_reset_handler))
        .route("/admin/students/{id}/parents", get(admin::student_parents_handler))
        .route("/admin/parents/{id}/students", get(admin::parent_students_handler))
        .route("/admin/parent-student/link", post(admin::create_link_handler))
        .route("/admin/parent-student/link/{id}", delete(admin::delete_link_handler))
        .merge(member_routes("teachers", Role::Teacher))
        .merge(member_routes("students", Role::Student))
        .merge(member_routes("parents", Role::Parent))
        .route_layer(role_layer(&[Role::Admin]));

    let secured = signed_in.merge(super_admin_api).merge(school_admin_api).route_layer(auth_layer);

    let cors = cors_layer(&state.config.server);

    public
        .merge(secured)
        .with_state(state)
        .layer(middleware::from_fn(record_http_metrics))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    request_span!(request.method(), request.uri().path())
                }),
        )
}
