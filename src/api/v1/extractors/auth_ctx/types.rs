/*
 * Responsibility
 * - Handler から見える「認証済みコンテキスト」の型
 * - middleware が検証して request extensions に格納し、handler はこの型だけを受け取る
 *
 * Notes
 * - トークンの署名検証は middleware/services 側の責務
 * - ここは検証済み Claims → AuthCtx の純粋な対応付けのみ
 */

use std::collections::BTreeSet;

use crate::services::auth::claims::TokenClaims;
use crate::services::auth::rbac::{self, Permission, Role};

/// 認証済みのリクエストに付与されるコンテキスト
///
/// - `id` は Keycloak の subject（UUID 文字列）
/// - `roles` は既知ロールへ対応付けた結果（必ず 1 件以上）
/// - `realm_roles` / `client_roles` はトークン上の生の値
/// - `access_token` は下流の Keycloak 呼び出し（introspection 等）用に保持
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCtx {
    pub id: String,
    pub email: Option<String>,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub email_verified: bool,
    pub roles: Vec<Role>,
    pub realm_roles: Vec<String>,
    pub client_roles: Vec<String>,
    pub access_token: String,
}

impl AuthCtx {
    /// 検証済み Claims から AuthCtx を構築する。
    ///
    /// レルムロールと当該クライアントのロールを重複排除して合算し、
    /// 既知の Role だけを残す。どれにも該当しなければ user ロールに
    /// フォールバックするため、roles が空になることはない。
    pub fn from_claims(claims: &TokenClaims, token: &str, client_id: &str) -> Self {
        let realm_roles = claims.realm_roles().to_vec();
        let client_roles = claims.client_roles(client_id).to_vec();

        let mut seen = BTreeSet::new();
        let mut roles: Vec<Role> = realm_roles
            .iter()
            .chain(client_roles.iter())
            .filter_map(|r| Role::from_claim(r))
            .filter(|r| seen.insert(*r))
            .collect();

        if roles.is_empty() {
            roles.push(Role::User);
        }

        let username = claims
            .preferred_username
            .clone()
            .unwrap_or_else(|| claims.sub.clone());

        Self {
            id: claims.sub.clone(),
            email: claims.email.clone(),
            username,
            first_name: claims.given_name.clone(),
            last_name: claims.family_name.clone(),
            full_name: claims.name.clone(),
            email_verified: claims.email_verified.unwrap_or(false),
            roles,
            realm_roles,
            client_roles,
            access_token: token.to_string(),
        }
    }

    /// 保持ロールから導出されるパーミッションの集合。
    pub fn permissions(&self) -> BTreeSet<Permission> {
        rbac::permissions_for(&self.roles)
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(value: serde_json::Value) -> TokenClaims {
        serde_json::from_value(value).unwrap()
    }

    fn base_claims() -> serde_json::Value {
        serde_json::json!({
            "sub": "8f14e45f-ea6f-4e3f-9a9d-0f39b0c1a2b3",
            "iss": "https://auth.example.com/realms/smart-queue",
            "exp": 9999999999u64,
            "iat": 1000000000u64,
        })
    }

    #[test]
    fn maps_profile_fields_and_token() {
        let mut value = base_claims();
        value["preferred_username"] = "john.doe".into();
        value["email"] = "john.doe@example.com".into();
        value["given_name"] = "John".into();
        value["family_name"] = "Doe".into();
        value["name"] = "John Doe".into();
        value["email_verified"] = true.into();

        let ctx = AuthCtx::from_claims(&claims(value), "raw-token", "smart-queue-api");

        assert_eq!(ctx.id, "8f14e45f-ea6f-4e3f-9a9d-0f39b0c1a2b3");
        assert_eq!(ctx.username, "john.doe");
        assert_eq!(ctx.email.as_deref(), Some("john.doe@example.com"));
        assert_eq!(ctx.full_name.as_deref(), Some("John Doe"));
        assert!(ctx.email_verified);
        assert_eq!(ctx.access_token, "raw-token");
    }

    #[test]
    fn username_falls_back_to_subject() {
        let ctx = AuthCtx::from_claims(&claims(base_claims()), "t", "smart-queue-api");
        assert_eq!(ctx.username, ctx.id);
        assert!(!ctx.email_verified);
    }

    #[test]
    fn unions_realm_and_client_roles_deduplicated() {
        let mut value = base_claims();
        value["realm_access"] = serde_json::json!({ "roles": ["user", "manager"] });
        value["resource_access"] = serde_json::json!({
            "smart-queue-api": { "roles": ["manager", "admin"] },
            "account": { "roles": ["guest"] }
        });

        let ctx = AuthCtx::from_claims(&claims(value), "t", "smart-queue-api");

        assert_eq!(ctx.roles, vec![Role::User, Role::Manager, Role::Admin]);
        // raw role lists are kept as-is
        assert_eq!(ctx.realm_roles, vec!["user", "manager"]);
        assert_eq!(ctx.client_roles, vec!["manager", "admin"]);
    }

    #[test]
    fn unknown_roles_fall_back_to_user() {
        let mut value = base_claims();
        value["realm_access"] =
            serde_json::json!({ "roles": ["offline_access", "uma_authorization"] });

        let ctx = AuthCtx::from_claims(&claims(value), "t", "smart-queue-api");

        assert_eq!(ctx.roles, vec![Role::User]);
        assert_eq!(ctx.realm_roles, vec!["offline_access", "uma_authorization"]);
    }

    #[test]
    fn no_roles_at_all_falls_back_to_user() {
        let ctx = AuthCtx::from_claims(&claims(base_claims()), "t", "smart-queue-api");
        assert_eq!(ctx.roles, vec![Role::User]);
        assert!(!ctx.permissions().is_empty());
    }

    #[test]
    fn user_role_resolves_to_base_permissions() {
        let mut value = base_claims();
        value["realm_access"] = serde_json::json!({ "roles": ["user"] });

        let ctx = AuthCtx::from_claims(&claims(value), "t", "smart-queue-api");
        let expected: BTreeSet<Permission> = [
            Permission::UserRead,
            Permission::QueueRead,
            Permission::QueueCreate,
        ]
        .into_iter()
        .collect();

        assert_eq!(ctx.permissions(), expected);
    }

    #[test]
    fn other_clients_roles_are_ignored() {
        let mut value = base_claims();
        value["resource_access"] = serde_json::json!({
            "other-client": { "roles": ["admin"] }
        });

        let ctx = AuthCtx::from_claims(&claims(value), "t", "smart-queue-api");
        assert_eq!(ctx.roles, vec![Role::User]);
        assert!(ctx.client_roles.is_empty());
    }

    #[test]
    fn mapping_is_idempotent() {
        let mut value = base_claims();
        value["realm_access"] = serde_json::json!({ "roles": ["manager", "guest"] });
        value["preferred_username"] = "jane".into();
        let claims = claims(value);

        let first = AuthCtx::from_claims(&claims, "t", "smart-queue-api");
        let second = AuthCtx::from_claims(&claims, "t", "smart-queue-api");

        assert_eq!(first, second);
    }
}
