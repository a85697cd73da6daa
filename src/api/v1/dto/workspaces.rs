/*
 * Responsibility
 * - Workspaces の request/response DTO
 */
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repos::workspace_repo::WorkspaceRow;

#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceRequest {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

impl CreateWorkspaceRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.trim().is_empty() {
            return Err("name is required");
        }
        if self.slug.trim().is_empty() {
            return Err("slug is required");
        }
        if !self
            .slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err("slug must be lowercase alphanumeric with dashes");
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct WorkspaceResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
}

impl From<WorkspaceRow> for WorkspaceResponse {
    fn from(row: WorkspaceRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            owner_id: row.owner_id,
        }
    }
}
