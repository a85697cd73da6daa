//! Bearer トークンの検証器。
//!
//! 静的公開鍵が設定されていればそれで直接検証し（オフライン運用向け）、
//! なければ JWKS から kid で鍵を解決して検証する（鍵ローテーション対応）。
//! どちらのモードでも受け付けるアルゴリズムは RS256 のみ。

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use jsonwebtoken::errors::ErrorKind;

use crate::services::auth::claims::TokenClaims;
use crate::services::auth::jwks::KeyResolver;

/// AuthError は認証・認可パイプラインのエラーを表す。
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingToken,

    #[error("invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    TokenExpired,

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("key resolution failed: {0}")]
    KeyResolutionFailed(String),

    #[error("unknown signing key: {0}")]
    KeyNotFound(String),

    #[error("JWKS fetch failed: {0}")]
    JwksFetchFailed(String),

    #[error("JWKS fetch rate limit exceeded")]
    JwksRateLimited,
}

/// TokenVerifier は Bearer トークンを検証し Claims を返す。
pub struct TokenVerifier {
    issuer: String,
    static_key: Option<DecodingKey>,
    resolver: KeyResolver,
}

impl TokenVerifier {
    /// `static_public_key_pem` は RS256 検証用の SPKI PEM。
    /// 設定されている場合、JWKS には一切アクセスしない。
    pub fn new(
        issuer: String,
        static_public_key_pem: Option<&str>,
        resolver: KeyResolver,
    ) -> Result<Self, AuthError> {
        let static_key = match static_public_key_pem {
            Some(pem) => Some(DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                tracing::warn!(error = %e, "failed to parse static Keycloak public key PEM");
                AuthError::InvalidToken(format!("invalid static public key: {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            issuer,
            static_key,
            resolver,
        })
    }

    /// トークンを検証して Claims を返す。
    pub async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        if let Some(key) = &self.static_key {
            // 静的鍵モードは issuer 検証を行わない（署名と有効期限のみ）
            return decode_claims(token, key, None);
        }

        let header =
            decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("token missing key id".into()))?;

        let jwk = self
            .resolver
            .resolve(&kid)
            .await
            .map_err(|e| AuthError::KeyResolutionFailed(e.to_string()))?;

        let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        decode_claims(token, &key, Some(&self.issuer))
    }
}

fn decode_claims(
    token: &str,
    key: &DecodingKey,
    expected_issuer: Option<&str>,
) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::RS256);
    // aud は固定しない（Keycloak のデフォルトでは account が入る）
    validation.validate_aud = false;
    if let Some(issuer) = expected_issuer {
        validation.set_issuer(&[issuer]);
    }

    match decode::<TokenClaims>(token, key, &validation) {
        Ok(data) => Ok(data.claims),
        Err(e) => Err(match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidIssuer => AuthError::IssuerMismatch,
            _ => AuthError::InvalidToken(e.to_string()),
        }),
    }
}
