/*
 * Responsibility
 * - Queue の request DTO
 * - レスポンスは services::queue の型をそのまま ApiResponse で包む
 */
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct JoinQueueRequest {
    pub queue_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQueueRequest {
    pub name: Option<String>,
    pub status: Option<String>,
}

impl UpdateQueueRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err("name cannot be empty");
        }
        if let Some(status) = &self.status
            && !matches!(status.as_str(), "active" | "paused")
        {
            return Err("status must be 'active' or 'paused'");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ManageQueueRequest {
    pub operation: String,
}
