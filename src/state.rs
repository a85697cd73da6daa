/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - ex: db: PgPool, keycloak: KeycloakClient, auth: TokenVerifier など
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::services::{auth::TokenVerifier, keycloak::KeycloakClient, queue::QueueStore};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub keycloak: Arc<KeycloakClient>,
    pub auth: Arc<TokenVerifier>,
    pub queues: Arc<RwLock<QueueStore>>,
}

impl AppState {
    pub fn new(
        db: sqlx::PgPool,
        keycloak: Arc<KeycloakClient>,
        auth: Arc<TokenVerifier>,
    ) -> Self {
        Self {
            db,
            keycloak,
            auth,
            queues: Arc::new(RwLock::new(QueueStore::new())),
        }
    }
}
