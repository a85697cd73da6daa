//! In-memory queue store.
//!
//! Holds the demo queues behind the shared state; callers take the RwLock in
//! AppState. Positions are 1-based and renumbered when the head is popped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue {0} not found")]
    NotFound(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    pub id: String,
    pub user_id: String,
    pub position: usize,
    pub joined_at: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Queue {
    pub id: String,
    pub name: String,
    pub status: String,
    pub items: Vec<QueueItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueOverview {
    pub total_queues: usize,
    pub active_queues: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinReceipt {
    pub queue_id: String,
    pub queue_name: String,
    pub position: usize,
    pub estimated_wait: String,
}

/// manage 操作の種別。未知の文字列は Unknown として扱う（エラーにしない）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOperation {
    Clear,
    Pause,
    Resume,
    Next,
    Unknown,
}

impl QueueOperation {
    pub fn parse(op: &str) -> Self {
        match op {
            "clear" => Self::Clear,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "next" => Self::Next,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug)]
pub enum ManageOutcome {
    Cleared(Queue),
    Paused(Queue),
    Resumed(Queue),
    Next(Option<QueueItem>),
    Unknown,
}

#[derive(Debug)]
pub struct QueueStore {
    queues: Vec<Queue>,
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStore {
    pub fn new() -> Self {
        Self {
            queues: vec![
                Queue {
                    id: "1".into(),
                    name: "Main Queue".into(),
                    status: "active".into(),
                    items: Vec::new(),
                },
                Queue {
                    id: "2".into(),
                    name: "VIP Queue".into(),
                    status: "active".into(),
                    items: Vec::new(),
                },
            ],
        }
    }

    pub fn overview(&self) -> QueueOverview {
        QueueOverview {
            total_queues: self.queues.len(),
            active_queues: self
                .queues
                .iter()
                .filter(|q| q.status == "active")
                .count(),
        }
    }

    pub fn all(&self) -> Vec<Queue> {
        self.queues.clone()
    }

    /// キューへ参加し、受付内容を返す。queue_id 未指定は "1" (Main Queue)。
    pub fn join(&mut self, user_id: &str, queue_id: Option<&str>) -> Result<JoinReceipt, QueueError> {
        let queue_id = queue_id.unwrap_or("1");
        let queue = self
            .queues
            .iter_mut()
            .find(|q| q.id == queue_id)
            .ok_or_else(|| QueueError::NotFound(queue_id.to_string()))?;

        let position = queue.items.len() + 1;
        let item = QueueItem {
            id: position.to_string(),
            user_id: user_id.to_string(),
            position,
            joined_at: Utc::now(),
            status: "waiting".into(),
        };
        queue.items.push(item);

        Ok(JoinReceipt {
            queue_id: queue.id.clone(),
            queue_name: queue.name.clone(),
            position,
            estimated_wait: format!("{} minutes", position * 5),
        })
    }

    pub fn update(
        &mut self,
        id: &str,
        name: Option<String>,
        status: Option<String>,
    ) -> Result<Queue, QueueError> {
        let queue = self
            .queues
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        if let Some(name) = name {
            queue.name = name;
        }
        if let Some(status) = status {
            queue.status = status;
        }

        Ok(queue.clone())
    }

    pub fn delete(&mut self, id: &str) -> Result<Queue, QueueError> {
        let index = self
            .queues
            .iter()
            .position(|q| q.id == id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        Ok(self.queues.remove(index))
    }

    pub fn manage(&mut self, id: &str, operation: QueueOperation) -> Result<ManageOutcome, QueueError> {
        let queue = self
            .queues
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        let outcome = match operation {
            QueueOperation::Clear => {
                queue.items.clear();
                ManageOutcome::Cleared(queue.clone())
            }
            QueueOperation::Pause => {
                queue.status = "paused".into();
                ManageOutcome::Paused(queue.clone())
            }
            QueueOperation::Resume => {
                queue.status = "active".into();
                ManageOutcome::Resumed(queue.clone())
            }
            QueueOperation::Next => {
                if queue.items.is_empty() {
                    ManageOutcome::Next(None)
                } else {
                    let next = queue.items.remove(0);
                    for (index, item) in queue.items.iter_mut().enumerate() {
                        item.position = index + 1;
                    }
                    ManageOutcome::Next(Some(next))
                }
            }
            QueueOperation::Unknown => ManageOutcome::Unknown,
        };

        Ok(outcome)
    }
}
