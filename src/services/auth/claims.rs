//! Keycloak が発行するアクセストークンの Claims 構造体。
//!
//! 署名検証を通過するまでは信頼できない値として扱うこと。

use serde::Deserialize;
use std::collections::HashMap;

/// realm_access Claim（レルム全体のロール一覧）。
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// resource_access Claim のクライアント単位エントリ。
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClientAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// 検証済みトークンからデコードされる Claims。
///
/// プロフィール系のフィールドはスコープ次第で欠けるため全て Option。
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// ユーザーの一意識別子（UUID）
    pub sub: String,

    /// トークン発行者（`{authServerUrl}/realms/{realm}`）
    pub iss: String,

    /// トークンの対象オーディエンス
    #[serde(default)]
    pub aud: Audience,

    /// 有効期限（Unix タイムスタンプ）
    pub exp: u64,

    /// 発行時刻（Unix タイムスタンプ）
    pub iat: u64,

    /// セッション ID
    #[serde(default)]
    pub sid: Option<String>,

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

    /// レルムスコープのロール
    #[serde(default)]
    pub realm_access: Option<RealmAccess>,

    /// クライアントスコープのロール（client_id → roles）
    #[serde(default)]
    pub resource_access: Option<HashMap<String, ClientAccess>>,
}

/// aud Claim は文字列または文字列配列のどちらも取りうる。
#[derive(Debug, Clone, Default)]
pub struct Audience(pub Vec<String>);

impl<'de> Deserialize<'de> for Audience {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de;

        struct AudienceVisitor;

        impl<'de> de::Visitor<'de> for AudienceVisitor {
            type Value = Audience;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a string or array of strings")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Audience(vec![v.to_string()]))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut values = Vec::new();
                while let Some(v) = seq.next_element::<String>()? {
                    values.push(v);
                }
                Ok(Audience(values))
            }
        }

        deserializer.deserialize_any(AudienceVisitor)
    }
}

impl TokenClaims {
    /// 最初のオーディエンスを返す。
    pub fn audience(&self) -> Option<&str> {
        self.aud.0.first().map(|s| s.as_str())
    }

    /// realm_access のロール一覧を返す。
    pub fn realm_roles(&self) -> &[String] {
        self.realm_access
            .as_ref()
            .map(|ra| ra.roles.as_slice())
            .unwrap_or(&[])
    }

    /// 指定クライアントのロール一覧を返す。
    pub fn client_roles(&self, client_id: &str) -> &[String] {
        self.resource_access
            .as_ref()
            .and_then(|ra| ra.get(client_id))
            .map(|a| a.roles.as_slice())
            .unwrap_or(&[])
    }
}

impl std::fmt::Display for TokenClaims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TokenClaims{{sub={}, iss={}, aud={:?}, username={:?}, email={:?}}}",
            self.sub,
            self.iss,
            self.audience(),
            self.preferred_username,
            self.email,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_accepts_string() {
        let claims: TokenClaims = serde_json::from_value(serde_json::json!({
            "sub": "user-1",
            "iss": "https://auth.example.com/realms/smart-queue",
            "aud": "account",
            "exp": 9999999999u64,
            "iat": 1000000000u64,
        }))
        .unwrap();

        assert_eq!(claims.audience(), Some("account"));
    }

    #[test]
    fn audience_accepts_array() {
        let claims: TokenClaims = serde_json::from_value(serde_json::json!({
            "sub": "user-1",
            "iss": "https://auth.example.com/realms/smart-queue",
            "aud": ["account", "smart-queue-api"],
            "exp": 9999999999u64,
            "iat": 1000000000u64,
        }))
        .unwrap();

        assert_eq!(claims.aud.0, vec!["account", "smart-queue-api"]);
    }

    #[test]
    fn display_does_not_leak_role_details() {
        let claims: TokenClaims = serde_json::from_value(serde_json::json!({
            "sub": "user-1",
            "iss": "https://auth.example.com/realms/smart-queue",
            "aud": "account",
            "exp": 9999999999u64,
            "iat": 1000000000u64,
            "preferred_username": "john.doe",
        }))
        .unwrap();

        let s = format!("{claims}");
        assert!(s.contains("user-1"));
        assert!(s.contains("john.doe"));
    }

    #[test]
    fn role_accessors_default_to_empty() {
        let claims: TokenClaims = serde_json::from_value(serde_json::json!({
            "sub": "user-1",
            "iss": "iss",
            "exp": 0u64,
            "iat": 0u64,
        }))
        .unwrap();

        assert!(claims.realm_roles().is_empty());
        assert!(claims.client_roles("smart-queue-api").is_empty());
    }

    #[test]
    fn role_accessors_read_both_scopes() {
        let claims: TokenClaims = serde_json::from_value(serde_json::json!({
            "sub": "user-1",
            "iss": "iss",
            "exp": 0u64,
            "iat": 0u64,
            "realm_access": { "roles": ["user", "manager"] },
            "resource_access": {
                "smart-queue-api": { "roles": ["admin"] },
                "account": { "roles": ["view-profile"] }
            }
        }))
        .unwrap();

        assert_eq!(claims.realm_roles(), &["user", "manager"]);
        assert_eq!(claims.client_roles("smart-queue-api"), &["admin"]);
        assert!(claims.client_roles("other-client").is_empty());
    }
}
