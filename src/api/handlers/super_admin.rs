//! `/super-admin` endpoints: bootstrap and platform-wide school management.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::api::error::ApiError;
use crate::api::routes::ApiState;
use crate::auth::models::{AuthContext, Role};
use crate::auth::{bootstrap_super_admin, CreateMemberRequest, ProvisionedAccount};
use crate::domain::{NewSchool, School, SchoolId};
use crate::errors::SchoolError;

#[derive(Debug, Serialize, Deserialize)]
pub struct SetupResponse {
    pub success: bool,
    pub message: String,
    pub already_exists: bool,
}

/// Create the configured super admin once. Takes no input.
#[instrument(skip(state), name = "super_admin_setup")]
pub async fn setup_handler(State(state): State<ApiState>) -> Result<Json<SetupResponse>, ApiError> {
    let outcome =
        bootstrap_super_admin(&state.pool, state.users.as_ref(), &state.config.auth.super_admin)
            .await?;

    let response = if outcome.already_exists() {
        SetupResponse {
            success: false,
            message: "Super Admin already exists. Setup is disabled.".to_string(),
            already_exists: true,
        }
    } else {
        SetupResponse {
            success: true,
            message: "Super admin created successfully".to_string(),
            already_exists: false,
        }
    };

    Ok(Json(response))
}

pub async fn list_schools_handler(
    State(state): State<ApiState>,
) -> Result<Json<Vec<School>>, ApiError> {
    Ok(Json(state.schools.list_schools().await?))
}

#[instrument(skip(state, payload), name = "create_school")]
pub async fn create_school_handler(
    State(state): State<ApiState>,
    Json(payload): Json<NewSchool>,
) -> Result<(StatusCode, Json<School>), ApiError> {
    payload.validate().map_err(SchoolError::from)?;
    let school = state.schools.create_school(&payload).await?;
    info!(school_id = %school.id, "school created");
    Ok((StatusCode::CREATED, Json(school)))
}

async fn load_school(state: &ApiState, id: i64) -> Result<School, ApiError> {
    let school_id = SchoolId::new(id);
    state
        .schools
        .get_school(school_id)
        .await?
        .ok_or_else(|| SchoolError::not_found("School", school_id.to_string()).into())
}

pub async fn get_school_handler(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<School>, ApiError> {
    Ok(Json(load_school(&state, id).await?))
}

/// Invite the administrator of a school: passwordless account plus setup email.
#[instrument(skip(state, context, payload), fields(school_id = id), name = "invite_school_admin")]
pub async fn invite_admin_handler(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Extension(context): Extension<AuthContext>,
    Json(payload): Json<CreateMemberRequest>,
) -> Result<(StatusCode, Json<ProvisionedAccount>), ApiError> {
    let school = load_school(&state, id).await?;
    let scope = context.delegated_scope(school.id)?;

    let account = state.invitations.invite_member(&scope, Role::Admin, &payload).await?;
    Ok((StatusCode::CREATED, Json(account)))
}
