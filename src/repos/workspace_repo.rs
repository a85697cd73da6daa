/*
 * Responsibility
 * - workspaces テーブル向け SQLx 操作
 */
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::repos::error::RepoError;

#[derive(Debug, FromRow)]
pub struct WorkspaceRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    #[sqlx(rename = "ownerId")]
    pub owner_id: Uuid,
}

pub async fn list(db: &PgPool) -> Result<Vec<WorkspaceRow>, RepoError> {
    let rows = sqlx::query_as::<_, WorkspaceRow>(
        r#"
        SELECT id, name, slug, description, "ownerId"
        FROM workspaces
        ORDER BY "createdAt" DESC
        "#,
    )
    .fetch_all(db)
    .await?;

    Ok(rows)
}

pub async fn create(
    db: &PgPool,
    name: &str,
    slug: &str,
    description: Option<&str>,
    owner_id: Uuid,
) -> Result<WorkspaceRow, RepoError> {
    let row = sqlx::query_as::<_, WorkspaceRow>(
        r#"
        INSERT INTO workspaces (id, name, slug, description, "ownerId")
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, name, slug, description, "ownerId"
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(slug)
    .bind(description)
    .bind(owner_id)
    .fetch_one(db)
    .await?;

    Ok(row)
}
