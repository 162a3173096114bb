use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Assignment, NewAssignment, QuizResult, QuizScore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// All assignments, earliest due date first.
    async fn list(&self) -> Result<Vec<Assignment>, StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<Assignment>, StoreError>;
    async fn create(&self, new: NewAssignment) -> Result<Assignment, StoreError>;
}

#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Upsert keyed by (user, assignment): a retake overwrites the previous score.
    async fn save(&self, result: &QuizResult) -> Result<(), StoreError>;
    async fn get(&self, user_id: &str, assignment_id: Uuid)
        -> Result<Option<QuizScore>, StoreError>;
}

/// Process-local stores, used when no database is configured.
#[derive(Clone, Default)]
pub struct MemoryStore {
    assignments: Arc<Mutex<Vec<Assignment>>>,
    scores: Arc<Mutex<HashMap<(String, Uuid), QuizScore>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned<T>(_: T) -> StoreError {
        StoreError::Unavailable("memory store lock poisoned".into())
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn list(&self) -> Result<Vec<Assignment>, StoreError> {
        let mut all = self.assignments.lock().map_err(Self::poisoned)?.clone();
        all.sort_by_key(|a| a.due_date);
        Ok(all)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Assignment>, StoreError> {
        let all = self.assignments.lock().map_err(Self::poisoned)?;
        Ok(all.iter().find(|a| a.id == id).cloned())
    }

    async fn create(&self, new: NewAssignment) -> Result<Assignment, StoreError> {
        let assignment = Assignment {
            id: Uuid::new_v4(),
            subject: new.subject,
            due_date: new.due_date,
            teacher_id: new.teacher_id,
            questions: new.questions,
            created_at: Utc::now(),
        };
        self.assignments
            .lock()
            .map_err(Self::poisoned)?
            .push(assignment.clone());
        Ok(assignment)
    }
}

#[async_trait]
impl ScoreStore for MemoryStore {
    async fn save(&self, result: &QuizResult) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut scores = self.scores.lock().map_err(Self::poisoned)?;
        let key = (result.user_id.clone(), result.assignment_id);
        let (id, created_at) = scores
            .get(&key)
            .map(|s| (s.id, s.created_at))
            .unwrap_or_else(|| (Uuid::new_v4(), now));
        scores.insert(
            key,
            QuizScore {
                id,
                user_id: result.user_id.clone(),
                assignment_id: result.assignment_id,
                score: result.score,
                correct_answers: result.correct_count,
                total_questions: result.total_questions,
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn get(
        &self,
        user_id: &str,
        assignment_id: Uuid,
    ) -> Result<Option<QuizScore>, StoreError> {
        let scores = self.scores.lock().map_err(Self::poisoned)?;
        Ok(scores.get(&(user_id.to_string(), assignment_id)).cloned())
    }
}
