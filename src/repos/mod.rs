/*
 * Responsibility
 * - repo 層の公開インターフェース (re-export)
 */
pub mod error;
pub mod user_repo;
pub mod workspace_repo;
