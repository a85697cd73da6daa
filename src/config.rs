/*
 * Responsibility
 * - 環境変数や設定の読み込み (DATABASE_URL, CORS 許可、Keycloak 設定など)
 * - 設定値のバリデーション (不足なら起動失敗)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,

    pub app_env: AppEnv,
    pub cors_allowed_origins: Vec<String>,

    pub keycloak_auth_server_url: String,
    pub keycloak_realm: String,
    pub keycloak_client_id: String,
    pub keycloak_client_secret: String,
    // Static RS256 public key (PEM). When set, token verification skips JWKS.
    pub keycloak_public_key: Option<String>,
    pub keycloak_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let app_env = AppEnv::from_env();

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        let keycloak_auth_server_url = std::env::var("KEYCLOAK_AUTH_SERVER_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();

        url::Url::parse(&keycloak_auth_server_url)
            .map_err(|_| ConfigError::Invalid("KEYCLOAK_AUTH_SERVER_URL"))?;

        let keycloak_realm =
            std::env::var("KEYCLOAK_REALM").unwrap_or_else(|_| "smart-queue".to_string());

        let keycloak_client_id =
            std::env::var("KEYCLOAK_CLIENT_ID").unwrap_or_else(|_| "smart-queue-api".to_string());

        let keycloak_client_secret = std::env::var("KEYCLOAK_CLIENT_SECRET").unwrap_or_default();

        let keycloak_public_key = std::env::var("KEYCLOAK_PUBLIC_KEY")
            .ok()
            .map(|pem| pem.replace("\\n", "\n"))
            .filter(|pem| !pem.trim().is_empty());

        let keycloak_timeout_seconds = std::env::var("KEYCLOAK_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10);

        Ok(Self {
            addr,
            database_url,
            app_env,
            cors_allowed_origins,
            keycloak_auth_server_url,
            keycloak_realm,
            keycloak_client_id,
            keycloak_client_secret,
            keycloak_public_key,
            keycloak_timeout_seconds,
        })
    }

    /// Issuer URL of the configured realm, as it appears in the `iss` claim.
    pub fn keycloak_issuer(&self) -> String {
        format!(
            "{}/realms/{}",
            self.keycloak_auth_server_url, self.keycloak_realm
        )
    }
}
