/*
 * Responsibility
 * - v1 の request/response DTO の公開インターフェース
 */
use serde::Serialize;

pub mod auth;
pub mod queue;
pub mod users;
pub mod workspaces;

/// message + data 形式の共通レスポンスラッパー。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}
