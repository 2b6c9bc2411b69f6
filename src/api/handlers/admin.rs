//! `/admin` endpoints for school administrators.
//!
//! Every handler derives its [`TenantScope`](crate::auth::TenantScope) from the
//! verified caller; ids in the path are only ever looked up inside that scope.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use tracing::{info, instrument};
use validator::Validate;

use crate::api::error::ApiError;
use crate::api::handlers::auth::ActionResponse;
use crate::api::routes::ApiState;
use crate::auth::models::{AuthContext, Role};
use crate::auth::{CreateMemberRequest, ProvisionedAccount, UpdateMemberRequest, User};
use crate::domain::UserId;
use crate::errors::SchoolError;
use crate::storage::repositories::student_parent::DEFAULT_RELATIONSHIP;
use crate::storage::repositories::{MemberCounts, StudentParentLink};

/// Role served by a member collection route, attached as a request extension.
#[derive(Debug, Clone, Copy)]
pub struct MemberRole(pub Role);

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

fn default_relationship() -> String {
    DEFAULT_RELATIONSHIP.to_string()
}

#[derive(Debug, Deserialize, Validate)]
pub struct LinkRequest {
    pub student_id: i64,
    pub parent_id: i64,
    #[serde(default = "default_relationship")]
    #[validate(length(min = 1, max = 50, message = "Relationship type must be 1-50 characters"))]
    pub relationship_type: String,
}

fn member_label(role: Role) -> &'static str {
    match role {
        Role::Teacher => "Teacher",
        Role::Student => "Student",
        Role::Parent => "Parent",
        Role::Admin => "Admin",
        Role::SuperAdmin => "User",
    }
}

fn member_not_found(role: Role, id: i64) -> ApiError {
    SchoolError::not_found(member_label(role), id.to_string()).into()
}

pub async fn dashboard_stats_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<MemberCounts>, ApiError> {
    let scope = context.tenant_scope()?;
    Ok(Json(state.users.count_members(&scope).await?))
}

pub async fn list_members_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Extension(MemberRole(role)): Extension<MemberRole>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<User>>, ApiError> {
    let scope = context.tenant_scope()?;
    let members = state.users.list_members(&scope, role, query.search.as_deref()).await?;
    Ok(Json(members))
}

#[instrument(skip(state, context, payload), fields(role = %role), name = "create_member")]
pub async fn create_member_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Extension(MemberRole(role)): Extension<MemberRole>,
    Json(payload): Json<CreateMemberRequest>,
) -> Result<(StatusCode, Json<ProvisionedAccount>), ApiError> {
    let scope = context.tenant_scope()?;
    let account = state.invitations.invite_member(&scope, role, &payload).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

#[instrument(skip(state, context, payload), fields(role = %role, user_id = id), name = "update_member")]
pub async fn update_member_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Extension(MemberRole(role)): Extension<MemberRole>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateMemberRequest>,
) -> Result<Json<User>, ApiError> {
    let scope = context.tenant_scope()?;
    payload.validate().map_err(SchoolError::from)?;

    state
        .users
        .update_member(&scope, UserId::new(id), role, &payload)
        .await?
        .map(Json)
        .ok_or_else(|| member_not_found(role, id))
}

#[instrument(skip(state, context), fields(role = %role, user_id = id), name = "deactivate_member")]
pub async fn delete_member_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Extension(MemberRole(role)): Extension<MemberRole>,
    Path(id): Path<i64>,
) -> Result<Json<ActionResponse>, ApiError> {
    let scope = context.tenant_scope()?;

    if !state.users.deactivate_member(&scope, UserId::new(id), role).await? {
        return Err(member_not_found(role, id));
    }

    info!(user_id = id, "member deactivated");
    Ok(Json(ActionResponse {
        success: true,
        message: format!("{} deactivated", member_label(role)),
    }))
}

/// Issue and email a fresh setup token for a member of the caller's school.
#[instrument(skip(state, context), fields(user_id = id), name = "member_password_reset")]
pub async fn password_reset_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<ProvisionedAccount>, ApiError> {
    let scope = context.tenant_scope()?;
    let account = state.invitations.reset_password(&scope, UserId::new(id)).await?;
    Ok(Json(account))
}

#[instrument(skip(state, context, payload), fields(student_id = payload.student_id, parent_id = payload.parent_id), name = "link_parent")]
pub async fn create_link_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Json(payload): Json<LinkRequest>,
) -> Result<(StatusCode, Json<StudentParentLink>), ApiError> {
    let scope = context.tenant_scope()?;
    payload.validate().map_err(SchoolError::from)?;

    let link = state
        .links
        .create_link(
            &scope,
            UserId::new(payload.student_id),
            UserId::new(payload.parent_id),
            &payload.relationship_type,
        )
        .await?;

    info!(link_id = link.id, "parent linked to student");
    Ok((StatusCode::CREATED, Json(link)))
}

#[instrument(skip(state, context), fields(link_id = id), name = "unlink_parent")]
pub async fn delete_link_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let scope = context.tenant_scope()?;

    if !state.links.delete_link(&scope, id).await? {
        return Err(SchoolError::not_found("Link", id.to_string()).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn student_parents_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<StudentParentLink>>, ApiError> {
    let scope = context.tenant_scope()?;
    state
        .links
        .parents_of(&scope, UserId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| member_not_found(Role::Student, id))
}

pub async fn parent_students_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<StudentParentLink>>, ApiError> {
    let scope = context.tenant_scope()?;
    state
        .links
        .students_of(&scope, UserId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| member_not_found(Role::Parent, id))
}
