//! Keycloak REST client.
//!
//! Thin reqwest wrapper over the realm's OpenID Connect endpoints (token,
//! userinfo, logout, introspection, discovery) plus the admin endpoints used
//! for user registration. Every call is a single request with the configured
//! timeout; retries, if any, belong to the caller.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum KeycloakError {
    #[error("invalid credentials")]
    Unauthorized,

    #[error("user already exists")]
    UserExists,

    #[error("{0}")]
    Rejected(String),

    #[error("identity provider unavailable: {0}")]
    Upstream(String),
}

/// OAuth2 トークンエンドポイントのレスポンス。
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_type: String,
    #[serde(default)]
    pub session_state: Option<String>,
    #[serde(default)]
    pub scope: String,
}

/// userinfo エンドポイントのレスポンス。
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// introspection エンドポイントのレスポンス。
/// Keycloak は active 以外にも多数のフィールドを返すが、ここでは読まない。
#[derive(Debug, Clone, Deserialize)]
pub struct Introspection {
    pub active: bool,
}

/// 管理 API へのユーザー登録内容。
#[derive(Debug, Clone)]
pub struct UserRegistration {
    pub email: String,
    pub username: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Serialize)]
struct NewKeycloakUser<'a> {
    username: &'a str,
    email: &'a str,
    #[serde(rename = "firstName")]
    first_name: &'a str,
    #[serde(rename = "lastName")]
    last_name: &'a str,
    enabled: bool,
    #[serde(rename = "emailVerified")]
    email_verified: bool,
    credentials: [NewCredential<'a>; 1],
}

#[derive(Serialize)]
struct NewCredential<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
    temporary: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RealmRole {
    id: String,
    name: String,
}

/// KeycloakClient はレルムのエンドポイント群を呼び出す HTTP クライアント。
pub struct KeycloakClient {
    http: reqwest::Client,
    auth_server_url: String,
    realm: String,
    client_id: String,
    client_secret: String,
}

impl KeycloakClient {
    pub fn new(config: &Config) -> Result<Self, KeycloakError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.keycloak_timeout_seconds))
            .build()
            .map_err(|e| KeycloakError::Upstream(e.to_string()))?;

        Ok(Self {
            http,
            auth_server_url: config.keycloak_auth_server_url.clone(),
            realm: config.keycloak_realm.clone(),
            client_id: config.keycloak_client_id.clone(),
            client_secret: config.keycloak_client_secret.clone(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// `iss` Claim に現れるレルム URL。
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.auth_server_url, self.realm)
    }

    pub fn jwks_url(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.issuer())
    }

    fn token_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.issuer())
    }

    fn userinfo_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/userinfo", self.issuer())
    }

    fn logout_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/logout", self.issuer())
    }

    fn introspection_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/token/introspect", self.issuer())
    }

    fn admin_url(&self, path: &str) -> String {
        format!("{}/admin/realms/{}{}", self.auth_server_url, self.realm, path)
    }

    /// Resource Owner Password Grant によるログイン。
    /// 信頼できる第一者クライアント向けのフローである点に注意。
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenSet, KeycloakError> {
        let params = [
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("username", username),
            ("password", password),
            ("scope", "openid profile email"),
        ];

        let response = self.post_form(&self.token_endpoint(), &params).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "login failed");
            return Err(match status {
                s if s.is_client_error() => KeycloakError::Unauthorized,
                s => KeycloakError::Upstream(format!("HTTP {s}")),
            });
        }

        self.parse_token_set(response).await
    }

    /// 認可コードをトークンに交換する。
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, KeycloakError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let response = self.post_form(&self.token_endpoint(), &params).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "token exchange failed");
            return Err(match status {
                s if s.is_client_error() => {
                    KeycloakError::Rejected("failed to exchange code for tokens".into())
                }
                s => KeycloakError::Upstream(format!("HTTP {s}")),
            });
        }

        self.parse_token_set(response).await
    }

    /// リフレッシュトークンでアクセストークンを更新する。
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, KeycloakError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];

        let response = self.post_form(&self.token_endpoint(), &params).await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(status = %status, "token refresh failed");
            return Err(match status {
                s if s.is_client_error() => KeycloakError::Unauthorized,
                s => KeycloakError::Upstream(format!("HTTP {s}")),
            });
        }

        self.parse_token_set(response).await
    }

    /// リフレッシュトークンを無効化してログアウトする。
    pub async fn logout(&self, refresh_token: &str) -> Result<(), KeycloakError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];

        let response = self.post_form(&self.logout_endpoint(), &params).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "logout failed");
            return Err(match status {
                s if s.is_client_error() => KeycloakError::Rejected("logout failed".into()),
                s => KeycloakError::Upstream(format!("HTTP {s}")),
            });
        }

        Ok(())
    }

    /// アクセストークンでユーザー情報を取得する。
    pub async fn userinfo(&self, access_token: &str) -> Result<UserInfo, KeycloakError> {
        let response = self
            .http
            .get(self.userinfo_endpoint())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| KeycloakError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeycloakError::Unauthorized);
        }

        response
            .json()
            .await
            .map_err(|e| KeycloakError::Upstream(e.to_string()))
    }

    /// トークンが有効（active）か確認する。
    pub async fn introspect(&self, token: &str) -> Result<Introspection, KeycloakError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("token", token),
        ];

        let response = self.post_form(&self.introspection_endpoint(), &params).await?;

        if !response.status().is_success() {
            return Err(KeycloakError::Upstream(format!(
                "HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| KeycloakError::Upstream(e.to_string()))
    }

    /// OpenID Connect ディスカバリードキュメントを取得する。
    pub async fn openid_configuration(&self) -> Result<serde_json::Value, KeycloakError> {
        let url = format!("{}/.well-known/openid-configuration", self.issuer());

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| KeycloakError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeycloakError::Upstream(format!(
                "HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| KeycloakError::Upstream(e.to_string()))
    }

    /// 管理 API 経由でユーザーを新規登録し、必要ならレルムロールを割り当てる。
    pub async fn register_user(&self, signup: &UserRegistration) -> Result<(), KeycloakError> {
        let admin_token = self.admin_token().await?;

        let body = NewKeycloakUser {
            username: &signup.username,
            email: &signup.email,
            first_name: signup.first_name.as_deref().unwrap_or(""),
            last_name: signup.last_name.as_deref().unwrap_or(""),
            enabled: true,
            email_verified: false,
            credentials: [NewCredential {
                kind: "password",
                value: &signup.password,
                temporary: false,
            }],
        };

        let response = self
            .http
            .post(self.admin_url("/users"))
            .bearer_auth(&admin_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| KeycloakError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "user registration failed");
            return Err(match status {
                StatusCode::CONFLICT => KeycloakError::UserExists,
                StatusCode::FORBIDDEN => KeycloakError::Rejected(
                    "admin account lacks permissions to create users".into(),
                ),
                s if s.is_client_error() => {
                    KeycloakError::Rejected("failed to register user".into())
                }
                s => KeycloakError::Upstream(format!("HTTP {s}")),
            });
        }

        if signup.roles.is_empty() {
            return Ok(());
        }

        // 作成されたユーザー ID は Location ヘッダーの末尾セグメント
        let user_id = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|loc| loc.rsplit('/').next())
            .map(|id| id.to_string());

        match user_id {
            Some(user_id) => {
                self.assign_realm_roles(&user_id, &signup.roles, &admin_token)
                    .await
            }
            None => {
                warn!("user created but Location header is missing; skipping role assignment");
                Ok(())
            }
        }
    }

    /// 既存レルムロールのうち要求された名前のものをユーザーへ割り当てる。
    async fn assign_realm_roles(
        &self,
        user_id: &str,
        roles: &[String],
        admin_token: &str,
    ) -> Result<(), KeycloakError> {
        let response = self
            .http
            .get(self.admin_url("/roles"))
            .bearer_auth(admin_token)
            .send()
            .await
            .map_err(|e| KeycloakError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeycloakError::Upstream(format!(
                "failed to fetch available roles: HTTP {}",
                response.status()
            )));
        }

        let available: Vec<RealmRole> = response
            .json()
            .await
            .map_err(|e| KeycloakError::Upstream(e.to_string()))?;

        let to_assign: Vec<serde_json::Value> = available
            .into_iter()
            .filter(|role| roles.contains(&role.name))
            .map(|role| serde_json::json!({ "id": role.id, "name": role.name }))
            .collect();

        if to_assign.is_empty() {
            warn!(user_id = %user_id, "no valid roles found to assign");
            return Ok(());
        }

        let response = self
            .http
            .post(self.admin_url(&format!("/users/{user_id}/role-mappings/realm")))
            .bearer_auth(admin_token)
            .json(&to_assign)
            .send()
            .await
            .map_err(|e| KeycloakError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "failed to assign roles to user");
            return Err(KeycloakError::Upstream(format!("HTTP {status}")));
        }

        debug!(user_id = %user_id, count = to_assign.len(), "assigned realm roles");
        Ok(())
    }

    /// Client Credentials フローで管理操作用のアクセストークンを取得する。
    async fn admin_token(&self) -> Result<String, KeycloakError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self.post_form(&self.token_endpoint(), &params).await?;

        if !response.status().is_success() {
            let status = response.status();
            error!(status = %status, "failed to get admin token");
            return Err(KeycloakError::Upstream(format!("HTTP {status}")));
        }

        let token_set = self.parse_token_set(response).await?;
        Ok(token_set.access_token)
    }

    async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, KeycloakError> {
        self.http
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "request to identity provider failed");
                KeycloakError::Upstream(e.to_string())
            })
    }

    async fn parse_token_set(&self, response: reqwest::Response) -> Result<TokenSet, KeycloakError> {
        response
            .json()
            .await
            .map_err(|e| KeycloakError::Upstream(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_client() -> KeycloakClient {
        let config = Config {
            addr: "0.0.0.0:3000".parse().unwrap(),
            database_url: "postgres://localhost/test".into(),
            app_env: crate::config::AppEnv::Development,
            cors_allowed_origins: vec![],
            keycloak_auth_server_url: "https://auth.example.com".into(),
            keycloak_realm: "smart-queue".into(),
            keycloak_client_id: "smart-queue-api".into(),
            keycloak_client_secret: "secret".into(),
            keycloak_public_key: None,
            keycloak_timeout_seconds: 10,
        };
        KeycloakClient::new(&config).unwrap()
    }

    #[test]
    fn endpoint_urls_follow_realm_layout() {
        let client = make_client();

        assert_eq!(
            client.issuer(),
            "https://auth.example.com/realms/smart-queue"
        );
        assert_eq!(
            client.jwks_url(),
            "https://auth.example.com/realms/smart-queue/protocol/openid-connect/certs"
        );
        assert_eq!(
            client.token_endpoint(),
            "https://auth.example.com/realms/smart-queue/protocol/openid-connect/token"
        );
        assert_eq!(
            client.introspection_endpoint(),
            "https://auth.example.com/realms/smart-queue/protocol/openid-connect/token/introspect"
        );
        assert_eq!(
            client.admin_url("/users"),
            "https://auth.example.com/admin/realms/smart-queue/users"
        );
    }

    #[test]
    fn token_set_tolerates_missing_optional_fields() {
        // client_credentials responses carry no refresh_token / session_state
        let token_set: TokenSet = serde_json::from_value(serde_json::json!({
            "access_token": "eyJ...",
            "expires_in": 300,
            "token_type": "Bearer"
        }))
        .unwrap();

        assert_eq!(token_set.refresh_token, None);
        assert_eq!(token_set.refresh_expires_in, 0);
        assert_eq!(token_set.scope, "");
    }

    #[test]
    fn introspection_ignores_extra_fields() {
        let introspection: Introspection = serde_json::from_value(serde_json::json!({
            "active": true,
            "username": "john.doe",
            "exp": 1234567890
        }))
        .unwrap();

        assert!(introspection.active);
    }
}
