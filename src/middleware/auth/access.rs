//! Access token 検証 → AuthCtx を extensions に入れる認可パイプライン。
//!
//! ルート登録時に RoutePolicy を宣言し、リクエストごとに
//! 公開ルート判定 → Bearer 抽出 → 署名検証 → AuthCtx 付与 →
//! ロール判定 → パーミッション判定 の順でゲートを通す。
//! トークン系の失敗は 401、ロール/パーミッション不足は 403 で区別する。

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};

use crate::api::v1::extractors::AuthCtx;
use crate::error::AppError;
use crate::services::auth::rbac::{self, Permission, Role};
use crate::services::auth::verifier::{AuthError, TokenVerifier};
use crate::state::AppState;

/// ミドルウェアファクトリの戻り値型。
type AccessMiddlewareFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AppError>> + Send>>;

/// ルートごとの認可要求。Router 組み立て時に宣言して guard() に渡す。
#[derive(Debug, Clone, Copy)]
pub struct RoutePolicy {
    /// true なら全ゲートを免除し、匿名のまま通す
    pub public: bool,
    /// いずれかを保持していれば通過（admin は常に通過）
    pub roles: &'static [Role],
    /// 全て保持している場合のみ通過
    pub permissions: &'static [Permission],
}

impl RoutePolicy {
    pub const PUBLIC: Self = Self {
        public: true,
        roles: &[],
        permissions: &[],
    };

    pub const AUTHENTICATED: Self = Self {
        public: false,
        roles: &[],
        permissions: &[],
    };

    pub const fn roles(roles: &'static [Role]) -> Self {
        Self {
            public: false,
            roles,
            permissions: &[],
        }
    }

    pub const fn permissions(mut self, permissions: &'static [Permission]) -> Self {
        self.permissions = permissions;
        self
    }
}

/// RoutePolicy を適用する middleware を生成する。
///
/// 例：
/// ```ignore
/// router.route_layer(middleware::from_fn(access::guard(
///     state.clone(),
///     RoutePolicy::roles(&[Role::Admin]),
/// )))
/// ```
pub fn guard(
    state: AppState,
    policy: RoutePolicy,
) -> impl Fn(Request<Body>, Next) -> AccessMiddlewareFuture + Clone {
    move |mut req: Request<Body>, next: Next| {
        let state = state.clone();
        Box::pin(async move {
            let ctx =
                check_access(&state.auth, state.keycloak.client_id(), &policy, req.headers())
                    .await?;

            // 公開ルートは匿名のまま。認証済みなら AuthCtx を extractor へ受け渡す
            if let Some(ctx) = ctx {
                req.extensions_mut().insert(ctx);
            }

            Ok(next.run(req).await)
        })
    }
}

/// ゲート判定の本体。公開ルートは None、認証済みは Some(AuthCtx) を返す。
pub async fn check_access(
    verifier: &TokenVerifier,
    client_id: &str,
    policy: &RoutePolicy,
    headers: &HeaderMap,
) -> Result<Option<AuthCtx>, AppError> {
    if policy.public {
        return Ok(None);
    }

    let token = match extract_bearer_token(headers) {
        Ok(token) => token,
        Err(err) => {
            tracing::warn!(error = %err, "no usable bearer token on request");
            return Err(AppError::Unauthorized);
        }
    };

    // 検証失敗の詳細はログにのみ残し、クライアントへは一律 401 を返す
    let claims = match verifier.verify(token).await {
        Ok(claims) => claims,
        Err(err) => {
            tracing::warn!(error = %err, "access token verification failed");
            return Err(AppError::Unauthorized);
        }
    };

    tracing::debug!(
        sub = %claims.sub,
        sid = ?claims.sid,
        iat = claims.iat,
        exp = claims.exp,
        "access token verified"
    );

    let ctx = AuthCtx::from_claims(&claims, token, client_id);

    if !rbac::has_required_roles(&ctx.roles, policy.roles) {
        tracing::warn!(
            username = %ctx.username,
            required = ?policy.roles,
            "request rejected: missing required role"
        );
        return Err(AppError::Forbidden);
    }

    if !rbac::has_required_permissions(&ctx.permissions(), policy.permissions) {
        tracing::warn!(
            username = %ctx.username,
            required = ?policy.permissions,
            "request rejected: missing required permission"
        );
        return Err(AppError::Forbidden);
    }

    Ok(Some(ctx))
}

/// Bearer トークンを Authorization ヘッダーから取得する。
fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let mut parts = auth_header.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::jwks::KeyResolver;
    use crate::services::auth::testutil::{
        MockFetcher, TEST_CLIENT_ID, TEST_ISSUER, TestClaims, generate_test_keypair, mint_token,
    };
    use axum::http::HeaderValue;
    use rsa::RsaPrivateKey;
    use std::sync::Arc;

    fn verifier_for(keys: Vec<crate::services::auth::jwks::JwkKey>) -> TokenVerifier {
        let resolver = KeyResolver::new(
            "https://auth.example.com/certs",
            crate::services::auth::jwks::DEFAULT_KEY_MAX_AGE,
            Arc::new(MockFetcher::new(keys)),
        );
        TokenVerifier::new(TEST_ISSUER.into(), None, resolver).unwrap()
    }

    fn bearer_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    fn setup() -> (RsaPrivateKey, TokenVerifier) {
        let (private_key, jwk, _) = generate_test_keypair();
        let verifier = verifier_for(vec![jwk]);
        (private_key, verifier)
    }

    const STAFF: RoutePolicy = RoutePolicy::roles(&[Role::Manager, Role::Admin]);

    #[tokio::test]
    async fn public_route_admits_without_token() {
        let (_, verifier) = setup();

        let ctx = check_access(&verifier, TEST_CLIENT_ID, &RoutePolicy::PUBLIC, &HeaderMap::new())
            .await
            .unwrap();

        // identity is absent on exempt operations
        assert!(ctx.is_none());
    }

    #[tokio::test]
    async fn public_route_ignores_presented_token() {
        let (private_key, verifier) = setup();
        let token = mint_token(&private_key, TestClaims::valid());

        let ctx = check_access(
            &verifier,
            TEST_CLIENT_ID,
            &RoutePolicy::PUBLIC,
            &bearer_headers(&token),
        )
        .await
        .unwrap();

        assert!(ctx.is_none());
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let (_, verifier) = setup();

        let err = check_access(
            &verifier,
            TEST_CLIENT_ID,
            &RoutePolicy::AUTHENTICATED,
            &HeaderMap::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_unauthorized() {
        let (_, verifier) = setup();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );

        let err = check_access(&verifier, TEST_CLIENT_ID, &RoutePolicy::AUTHENTICATED, &headers)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn invalid_token_is_unauthorized() {
        let (_, verifier) = setup();

        let err = check_access(
            &verifier,
            TEST_CLIENT_ID,
            &RoutePolicy::AUTHENTICATED,
            &bearer_headers("garbage"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn expired_token_is_unauthorized() {
        let (private_key, verifier) = setup();
        let token = mint_token(&private_key, TestClaims::valid().expired());

        let err = check_access(
            &verifier,
            TEST_CLIENT_ID,
            &RoutePolicy::AUTHENTICATED,
            &bearer_headers(&token),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn valid_token_attaches_identity() {
        let (private_key, verifier) = setup();
        let token = mint_token(&private_key, TestClaims::valid());

        let ctx = check_access(
            &verifier,
            TEST_CLIENT_ID,
            &RoutePolicy::AUTHENTICATED,
            &bearer_headers(&token),
        )
        .await
        .unwrap()
        .expect("identity must be attached");

        assert_eq!(ctx.username, "john.doe");
        assert_eq!(ctx.roles, vec![Role::User]);
        assert_eq!(ctx.access_token, token);
    }

    #[tokio::test]
    async fn user_role_fails_staff_route() {
        let (private_key, verifier) = setup();
        let token = mint_token(&private_key, TestClaims::valid().realm_roles(&["user"]));

        let err = check_access(&verifier, TEST_CLIENT_ID, &STAFF, &bearer_headers(&token))
            .await
            .unwrap_err();

        // valid identity, insufficient rights: 403, not 401
        assert!(matches!(err, AppError::Forbidden));
    }

    #[tokio::test]
    async fn manager_role_passes_staff_route() {
        let (private_key, verifier) = setup();
        let token = mint_token(&private_key, TestClaims::valid().realm_roles(&["manager"]));

        let ctx = check_access(&verifier, TEST_CLIENT_ID, &STAFF, &bearer_headers(&token))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(ctx.roles, vec![Role::Manager]);
    }

    #[tokio::test]
    async fn admin_passes_any_role_requirement() {
        let (private_key, verifier) = setup();
        let token = mint_token(&private_key, TestClaims::valid().realm_roles(&["admin"]));

        let guest_only = RoutePolicy::roles(&[Role::Guest]);
        let ctx = check_access(&verifier, TEST_CLIENT_ID, &guest_only, &bearer_headers(&token))
            .await
            .unwrap();

        assert!(ctx.is_some());
    }

    #[tokio::test]
    async fn client_roles_satisfy_role_gate() {
        let (private_key, verifier) = setup();
        let token = mint_token(
            &private_key,
            TestClaims::valid()
                .realm_roles(&[])
                .client_roles(TEST_CLIENT_ID, &["manager"]),
        );

        let ctx = check_access(&verifier, TEST_CLIENT_ID, &STAFF, &bearer_headers(&token))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(ctx.roles, vec![Role::Manager]);
    }

    #[tokio::test]
    async fn permission_gate_requires_all_declared() {
        let (private_key, verifier) = setup();

        // user holds queue:read but the route also demands queue:manage
        const POLICY: RoutePolicy = RoutePolicy::AUTHENTICATED
            .permissions(&[Permission::QueueRead, Permission::QueueManage]);

        let user_token = mint_token(&private_key, TestClaims::valid().realm_roles(&["user"]));
        let err = check_access(&verifier, TEST_CLIENT_ID, &POLICY, &bearer_headers(&user_token))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        let manager_token =
            mint_token(&private_key, TestClaims::valid().realm_roles(&["manager"]));
        let ctx = check_access(
            &verifier,
            TEST_CLIENT_ID,
            &POLICY,
            &bearer_headers(&manager_token),
        )
        .await
        .unwrap();
        assert!(ctx.is_some());
    }

    #[test]
    fn bearer_extraction_rejects_malformed_values() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert!(matches!(
            extract_bearer_token(&headers),
            Err(AuthError::MissingToken)
        ));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert!(matches!(
            extract_bearer_token(&headers),
            Err(AuthError::MissingToken)
        ));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Token abc"),
        );
        assert!(matches!(
            extract_bearer_token(&headers),
            Err(AuthError::InvalidAuthHeader)
        ));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("bearer abc"),
        );
        assert!(extract_bearer_token(&headers).is_ok());
    }
}
