/*
 * Responsibility
 * - ドメインサービス層の公開インターフェース (re-export)
 */
pub mod auth;
pub mod keycloak;
pub mod queue;
