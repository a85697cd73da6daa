/*
 * Responsibility
 * - /users 系 CRUD handler
 * - Path/Json を extractor で受け、DTO validation → keycloak/repo 呼び出し
 * - ユーザー作成は Keycloak 登録 → DB insert の順（原本は Keycloak が正）
 */
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::api::v1::dto::auth::ProfileResponse;
use crate::api::v1::dto::users::{CreateUserRequest, UpdateUserRequest, UserResponse};
use crate::api::v1::extractors::AuthCtxExtractor;
use crate::error::AppError;
use crate::repos::user_repo;
use crate::services::keycloak::UserRegistration;
use crate::state::AppState;

pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let rows = user_repo::list(&state.db).await?;
    let res = rows.into_iter().map(UserResponse::from).collect();

    Ok(Json(res))
}

pub async fn me(
    AuthCtxExtractor(ctx): AuthCtxExtractor,
) -> Result<Json<ProfileResponse>, AppError> {
    Ok(Json(ProfileResponse::from(&ctx)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    let row = user_repo::get(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;

    Ok(Json(row.into()))
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_REQUEST", msg))?;

    // Keycloak 側を先に作成する。失敗したら DB には何も残さない
    state
        .keycloak
        .register_user(&UserRegistration {
            email: req.email.clone(),
            username: req.username.clone(),
            password: req.password.clone(),
            first_name: req.first_name.clone(),
            last_name: req.last_name.clone(),
            roles: req.role.clone().into_iter().collect(),
        })
        .await?;

    let row = user_repo::create(
        &state.db,
        Uuid::new_v4(),
        &req.username,
        &req.email,
        req.first_name.as_deref(),
        req.last_name.as_deref(),
        req.role.as_deref().unwrap_or("viewer"),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(row.into())))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_REQUEST", msg))?;

    let row = user_repo::update(
        &state.db,
        user_id,
        req.username.as_deref(),
        req.email.as_deref(),
        req.first_name.as_deref(),
        req.last_name.as_deref(),
        req.role.as_deref(),
    )
    .await?
    .ok_or_else(|| AppError::not_found("user"))?;

    Ok(Json(row.into()))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = user_repo::delete(&state.db, user_id).await?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("user"))
    }
}
