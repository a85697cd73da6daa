//! テスト用の鍵ペア生成・トークン発行・モックフェッチャー。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::traits::PublicKeyParts;
use serde::Serialize;

use crate::services::auth::jwks::{JwkKey, JwksFetcher};
use crate::services::auth::verifier::AuthError;

pub const TEST_ISSUER: &str = "https://auth.example.com/realms/smart-queue";
pub const TEST_CLIENT_ID: &str = "smart-queue-api";
pub const TEST_KID: &str = "test-key-1";

/// RSA 鍵ペアを生成して (秘密鍵, JWK, SPKI PEM) を返す。
pub fn generate_test_keypair() -> (RsaPrivateKey, JwkKey, String) {
    let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
    let public_key = private_key.to_public_key();

    let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
    let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());

    let jwk = JwkKey {
        kid: TEST_KID.into(),
        n,
        e,
    };

    let public_pem = public_key
        .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
        .unwrap();

    (private_key, jwk, public_pem)
}

#[derive(Serialize)]
pub struct TestAccess {
    pub roles: Vec<String>,
}

/// jsonwebtoken でそのまま署名できる Claims ビルダー。
#[derive(Serialize)]
pub struct TestClaims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: u64,
    pub iat: u64,
    pub typ: String,
    pub azp: String,
    pub scope: String,
    pub email_verified: bool,
    pub name: String,
    pub preferred_username: String,
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    pub realm_access: TestAccess,
    pub resource_access: HashMap<String, TestAccess>,
}

impl TestClaims {
    /// 15分有効な user ロールのトークン Claims。
    pub fn valid() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        Self {
            sub: "8f14e45f-ea6f-4e3f-9a9d-0f39b0c1a2b3".into(),
            iss: TEST_ISSUER.into(),
            aud: "account".into(),
            exp: now + 900,
            iat: now,
            typ: "Bearer".into(),
            azp: TEST_CLIENT_ID.into(),
            scope: "openid profile email".into(),
            email_verified: true,
            name: "John Doe".into(),
            preferred_username: "john.doe".into(),
            given_name: "John".into(),
            family_name: "Doe".into(),
            email: "john.doe@example.com".into(),
            realm_access: TestAccess {
                roles: vec!["user".into()],
            },
            resource_access: HashMap::new(),
        }
    }

    pub fn expired(mut self) -> Self {
        self.exp = self.iat.saturating_sub(3600);
        self.iat = self.iat.saturating_sub(7200);
        self
    }

    pub fn issuer(mut self, iss: &str) -> Self {
        self.iss = iss.into();
        self
    }

    pub fn realm_roles(mut self, roles: &[&str]) -> Self {
        self.realm_access = TestAccess {
            roles: roles.iter().map(|r| r.to_string()).collect(),
        };
        self
    }

    pub fn client_roles(mut self, client_id: &str, roles: &[&str]) -> Self {
        self.resource_access.insert(
            client_id.into(),
            TestAccess {
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
        );
        self
    }
}

/// TEST_KID 付きヘッダーで署名したトークンを発行する。
pub fn mint_token(private_key: &RsaPrivateKey, claims: TestClaims) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_KID.into());
    sign(private_key, &header, &claims)
}

/// kid を持たないヘッダーで署名したトークンを発行する。
pub fn mint_token_without_kid(private_key: &RsaPrivateKey, claims: TestClaims) -> String {
    let header = Header::new(Algorithm::RS256);
    sign(private_key, &header, &claims)
}

fn sign(private_key: &RsaPrivateKey, header: &Header, claims: &TestClaims) -> String {
    let pem = private_key
        .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
        .unwrap();
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();

    encode(header, claims, &key).unwrap()
}

/// 固定の鍵セットを返すフェッチャー。
pub struct MockFetcher {
    keys: Vec<JwkKey>,
}

impl MockFetcher {
    pub fn new(keys: Vec<JwkKey>) -> Self {
        Self { keys }
    }
}

#[async_trait::async_trait]
impl JwksFetcher for MockFetcher {
    async fn fetch_keys(&self, _jwks_url: &str) -> Result<Vec<JwkKey>, AuthError> {
        Ok(self.keys.clone())
    }
}

/// フェッチ回数を記録するフェッチャー。
pub struct CountingFetcher {
    inner: MockFetcher,
    count: Arc<AtomicU32>,
}

impl CountingFetcher {
    pub fn new(keys: Vec<JwkKey>) -> (Self, Arc<AtomicU32>) {
        let count = Arc::new(AtomicU32::new(0));
        (
            Self {
                inner: MockFetcher::new(keys),
                count: count.clone(),
            },
            count,
        )
    }
}

#[async_trait::async_trait]
impl JwksFetcher for CountingFetcher {
    async fn fetch_keys(&self, jwks_url: &str) -> Result<Vec<JwkKey>, AuthError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_keys(jwks_url).await
    }
}
