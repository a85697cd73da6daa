/*
 * Responsibility
 * - Auth 系の request/response DTO
 * - validation (形式チェック) 用の validate() を持たせる
 */
use serde::{Deserialize, Serialize};

use crate::api::v1::extractors::AuthCtx;
use crate::services::keycloak::TokenSet;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.username.trim().is_empty() {
            return Err("username is required");
        }
        if self.password.is_empty() {
            return Err("password is required");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl SignUpRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.email.trim().is_empty() {
            return Err("email is required");
        }
        if self.username.trim().is_empty() {
            return Err("username is required");
        }
        if self.password.is_empty() {
            return Err("password is required");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ExchangeCodeRequest {
    pub code: String,
    pub redirect_uri: String,
}

impl ExchangeCodeRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.code.trim().is_empty() {
            return Err("code is required");
        }
        if self.redirect_uri.trim().is_empty() {
            return Err("redirect_uri is required");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

impl RefreshRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.refresh_token.trim().is_empty() {
            return Err("refresh_token is required");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct IntrospectRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    pub refresh_expires_in: u64,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub session_state: Option<String>,
    pub scope: String,
}

impl From<TokenSet> for TokenResponse {
    fn from(t: TokenSet) -> Self {
        Self {
            access_token: t.access_token,
            expires_in: t.expires_in,
            refresh_expires_in: t.refresh_expires_in,
            refresh_token: t.refresh_token,
            token_type: t.token_type,
            session_state: t.session_state,
            scope: t.scope,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: String,
    pub email: Option<String>,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub email_verified: bool,
    pub roles: Vec<String>,
}

impl From<&AuthCtx> for ProfileResponse {
    fn from(ctx: &AuthCtx) -> Self {
        Self {
            id: ctx.id.clone(),
            email: ctx.email.clone(),
            username: ctx.username.clone(),
            first_name: ctx.first_name.clone(),
            last_name: ctx.last_name.clone(),
            full_name: ctx.full_name.clone(),
            email_verified: ctx.email_verified,
            roles: ctx.role_names(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub message: String,
    pub user: SignUpUser,
}

#[derive(Debug, Serialize)]
pub struct SignUpUser {
    pub email: String,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct IntrospectResponse {
    pub active: bool,
}
