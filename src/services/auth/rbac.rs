//! RBAC/PBAC の判定: ロール・パーミッション定義とロール→パーミッション対応表。

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// システムで認識するロール。トークン上のこれ以外のロール文字列は無視される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    User,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::User => "user",
            Role::Guest => "guest",
        }
    }

    /// トークン上のロール文字列を既知のロールへ対応付ける。
    pub fn from_claim(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "user" => Some(Role::User),
            "guest" => Some(Role::Guest),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 細粒度の操作パーミッション。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Permission {
    #[serde(rename = "user:read")]
    UserRead,
    #[serde(rename = "user:create")]
    UserCreate,
    #[serde(rename = "user:update")]
    UserUpdate,
    #[serde(rename = "user:delete")]
    UserDelete,

    #[serde(rename = "queue:read")]
    QueueRead,
    #[serde(rename = "queue:create")]
    QueueCreate,
    #[serde(rename = "queue:update")]
    QueueUpdate,
    #[serde(rename = "queue:delete")]
    QueueDelete,
    #[serde(rename = "queue:manage")]
    QueueManage,

    #[serde(rename = "admin:access")]
    AdminAccess,
    #[serde(rename = "admin:manage")]
    AdminManage,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::UserRead => "user:read",
            Permission::UserCreate => "user:create",
            Permission::UserUpdate => "user:update",
            Permission::UserDelete => "user:delete",
            Permission::QueueRead => "queue:read",
            Permission::QueueCreate => "queue:create",
            Permission::QueueUpdate => "queue:update",
            Permission::QueueDelete => "queue:delete",
            Permission::QueueManage => "queue:manage",
            Permission::AdminAccess => "admin:access",
            Permission::AdminManage => "admin:manage",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ロールに付与されるパーミッションの固定対応表。プロセス起動後は不変。
pub fn role_permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Admin => &[
            Permission::UserRead,
            Permission::UserCreate,
            Permission::UserUpdate,
            Permission::UserDelete,
            Permission::QueueRead,
            Permission::QueueCreate,
            Permission::QueueUpdate,
            Permission::QueueDelete,
            Permission::QueueManage,
            Permission::AdminAccess,
            Permission::AdminManage,
        ],
        Role::Manager => &[
            Permission::UserRead,
            Permission::UserCreate,
            Permission::UserUpdate,
            Permission::QueueRead,
            Permission::QueueCreate,
            Permission::QueueUpdate,
            Permission::QueueDelete,
            Permission::QueueManage,
        ],
        Role::User => &[
            Permission::UserRead,
            Permission::QueueRead,
            Permission::QueueCreate,
        ],
        Role::Guest => &[Permission::QueueRead],
    }
}

/// 保持ロール全体から得られるパーミッションの和集合。
pub fn permissions_for(roles: &[Role]) -> BTreeSet<Permission> {
    roles
        .iter()
        .flat_map(|r| role_permissions(*r).iter().copied())
        .collect()
}

/// ロール要求の判定。
///
/// - 要求なしは素通し
/// - admin は常に許可
/// - それ以外は要求ロールのいずれかを保持していれば許可（OR）
pub fn has_required_roles(user_roles: &[Role], required: &[Role]) -> bool {
    if required.is_empty() {
        return true;
    }
    if user_roles.contains(&Role::Admin) {
        return true;
    }
    required.iter().any(|r| user_roles.contains(r))
}

/// パーミッション要求の判定。
///
/// 要求された全パーミッションを保持している場合のみ許可（AND）。
/// ロール判定より厳しい点に注意。
pub fn has_required_permissions(granted: &BTreeSet<Permission>, required: &[Permission]) -> bool {
    if required.is_empty() {
        return true;
    }
    required.iter().all(|p| granted.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ROLES: [Role; 4] = [Role::Admin, Role::Manager, Role::User, Role::Guest];

    #[test]
    fn catalog_is_total() {
        for role in ALL_ROLES {
            assert!(
                !role_permissions(role).is_empty(),
                "role {role} has no permissions"
            );
        }
    }

    #[test]
    fn admin_has_every_permission() {
        let admin = permissions_for(&[Role::Admin]);
        for role in ALL_ROLES {
            for p in role_permissions(role) {
                assert!(admin.contains(p));
            }
        }
    }

    #[test]
    fn user_permissions_match_catalog() {
        let granted = permissions_for(&[Role::User]);
        let expected: BTreeSet<Permission> = [
            Permission::UserRead,
            Permission::QueueRead,
            Permission::QueueCreate,
        ]
        .into_iter()
        .collect();

        assert_eq!(granted, expected);
    }

    #[test]
    fn role_gate_passes_with_no_requirements() {
        assert!(has_required_roles(&[Role::Guest], &[]));
        assert!(has_required_roles(&[], &[]));
    }

    #[test]
    fn role_gate_is_any_of() {
        let required = [Role::Manager, Role::Admin];
        assert!(has_required_roles(&[Role::Manager], &required));
        assert!(has_required_roles(&[Role::Guest, Role::Manager], &required));
        assert!(!has_required_roles(&[Role::User], &required));
        assert!(!has_required_roles(&[Role::Guest], &required));
    }

    #[test]
    fn admin_passes_any_role_gate() {
        assert!(has_required_roles(&[Role::Admin], &[Role::Manager]));
        assert!(has_required_roles(&[Role::Admin], &[Role::Guest]));
        assert!(has_required_roles(&[Role::User, Role::Admin], &[Role::Manager]));
    }

    #[test]
    fn permission_gate_is_all_of() {
        // user holds queue:read but not queue:manage; AND semantics reject
        let required = [Permission::QueueRead, Permission::QueueManage];
        assert!(!has_required_permissions(
            &permissions_for(&[Role::User]),
            &required
        ));
        assert!(has_required_permissions(
            &permissions_for(&[Role::Manager]),
            &required
        ));
        assert!(has_required_permissions(
            &permissions_for(&[Role::Admin]),
            &required
        ));
    }

    #[test]
    fn permission_gate_passes_with_no_requirements() {
        assert!(has_required_permissions(&permissions_for(&[Role::Guest]), &[]));
        assert!(has_required_permissions(&BTreeSet::new(), &[]));
    }

    #[test]
    fn permissions_union_over_roles() {
        let granted = permissions_for(&[Role::Guest, Role::User]);
        assert!(granted.contains(&Permission::UserRead));
        assert!(granted.contains(&Permission::QueueRead));
        assert!(granted.contains(&Permission::QueueCreate));
        assert!(!granted.contains(&Permission::QueueManage));
    }

    #[test]
    fn role_from_claim_ignores_unknown() {
        assert_eq!(Role::from_claim("manager"), Some(Role::Manager));
        assert_eq!(Role::from_claim("offline_access"), None);
        assert_eq!(Role::from_claim("uma_authorization"), None);
    }
}
