/*
 * Responsibility
 * - /auth 系 handler
 * - DTO validation → KeycloakClient 呼び出し → response DTO への詰め替え
 * - トークンの発行・失効は全て Keycloak 側。ここは relying party として中継するだけ
 */
use axum::{Json, extract::State, http::StatusCode};
use serde_json::Value;

use crate::api::v1::dto::auth::{
    ExchangeCodeRequest, IntrospectRequest, IntrospectResponse, LoginRequest, LogoutRequest,
    MessageResponse, ProfileResponse, RefreshRequest, SignUpRequest, SignUpResponse, SignUpUser,
    TokenResponse,
};
use crate::api::v1::extractors::AuthCtxExtractor;
use crate::error::AppError;
use crate::services::keycloak::UserRegistration;
use crate::state::AppState;

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_REQUEST", msg))?;

    tracing::info!(username = %req.username, "login attempt");

    let tokens = state.keycloak.login(&req.username, &req.password).await?;

    Ok(Json(tokens.into()))
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SignUpResponse>), AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_REQUEST", msg))?;

    state
        .keycloak
        .register_user(&UserRegistration {
            email: req.email.clone(),
            username: req.username.clone(),
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
            roles: Vec::new(),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            message: "user registered successfully".into(),
            user: SignUpUser {
                email: req.email,
                username: req.username,
            },
        }),
    ))
}

pub async fn exchange_code(
    State(state): State<AppState>,
    Json(req): Json<ExchangeCodeRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_REQUEST", msg))?;

    let tokens = state
        .keycloak
        .exchange_code(&req.code, &req.redirect_uri)
        .await?;

    Ok(Json(tokens.into()))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_REQUEST", msg))?;

    let tokens = state.keycloak.refresh(&req.refresh_token).await?;

    Ok(Json(tokens.into()))
}

pub async fn logout(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Json(req): Json<LogoutRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    tracing::info!(username = %ctx.username, "logout");

    state.keycloak.logout(&req.refresh_token).await?;

    Ok(Json(MessageResponse {
        message: "successfully logged out".into(),
    }))
}

pub async fn profile(
    AuthCtxExtractor(ctx): AuthCtxExtractor,
) -> Result<Json<ProfileResponse>, AppError> {
    Ok(Json(ProfileResponse::from(&ctx)))
}

/// Keycloak の userinfo エンドポイントをそのまま問い合わせる。
/// ロールはトークン由来でないため空で返る。
pub async fn userinfo(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
) -> Result<Json<ProfileResponse>, AppError> {
    let info = state.keycloak.userinfo(&ctx.access_token).await?;

    Ok(Json(ProfileResponse {
        id: info.sub,
        email: info.email,
        username: info.preferred_username.unwrap_or_default(),
        first_name: info.given_name,
        last_name: info.family_name,
        full_name: info.name,
        email_verified: info.email_verified.unwrap_or(false),
        roles: Vec::new(),
    }))
}

/// 明示的な liveness チェック。下流が保持しているトークンを Keycloak に問い合わせる。
pub async fn introspect(
    State(state): State<AppState>,
    AuthCtxExtractor(_ctx): AuthCtxExtractor,
    Json(req): Json<IntrospectRequest>,
) -> Result<Json<IntrospectResponse>, AppError> {
    let result = state.keycloak.introspect(&req.token).await?;

    Ok(Json(IntrospectResponse {
        active: result.active,
    }))
}

pub async fn openid_configuration(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let document = state.keycloak.openid_configuration().await?;
    Ok(Json(document))
}
