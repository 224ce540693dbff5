use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::TaskKind;

/// Processing-log record for one background task cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: Uuid,
    pub task: TaskKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub patients_considered: i64,
    pub successes: i64,
    pub failures: i64,
    pub detail: Option<String>,
}

impl TaskRun {
    pub fn begin(task: TaskKind) -> Self {
        TaskRun {
            id: Uuid::new_v4(),
            task,
            started_at: Utc::now(),
            finished_at: None,
            patients_considered: 0,
            successes: 0,
            failures: 0,
            detail: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}
