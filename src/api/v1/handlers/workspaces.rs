/*
 * Responsibility
 * - /workspaces 系 handler
 * - owner は呼び出し元の AuthCtx から決める
 */
use axum::{Json, extract::State, http::StatusCode};
use uuid::Uuid;

use crate::api::v1::dto::ApiResponse;
use crate::api::v1::dto::workspaces::{CreateWorkspaceRequest, WorkspaceResponse};
use crate::api::v1::extractors::AuthCtxExtractor;
use crate::error::AppError;
use crate::repos::workspace_repo;
use crate::state::AppState;

pub async fn list_workspaces(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<WorkspaceResponse>>>, AppError> {
    let rows = workspace_repo::list(&state.db).await?;
    let data = rows.into_iter().map(WorkspaceResponse::from).collect();

    Ok(Json(ApiResponse::new("workspaces retrieved", data)))
}

pub async fn create_workspace(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Json(req): Json<CreateWorkspaceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<WorkspaceResponse>>), AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_REQUEST", msg))?;

    // Keycloak の subject は UUID。そうでないトークンはここまで来ない想定
    let owner_id = Uuid::parse_str(&ctx.id).map_err(|_| {
        tracing::warn!(sub = %ctx.id, "subject is not a UUID");
        AppError::Internal
    })?;

    let row = workspace_repo::create(
        &state.db,
        &req.name,
        &req.slug,
        req.description.as_deref(),
        owner_id,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            "workspace created successfully",
            row.into(),
        )),
    ))
}
