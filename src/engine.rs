//! Drives quiz sessions for the HTTP layer: looks up the assignment,
//! keeps live sessions by id and reports the result once a session completes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::level::{classify, LevelInfo};
use crate::session::{Advance, Feedback, Phase, QuizSession, SessionError, QUESTIONS_PER_QUIZ};
use crate::store::{AssignmentStore, ScoreStore, StoreError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("learner id is required")]
    MissingLearner,
    #[error("assignment not found")]
    AssignmentNotFound,
    #[error("session not found")]
    SessionNotFound,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub text: String,
    pub options: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// 1-based.
    pub current: usize,
    pub total: usize,
    pub score: u32,
    pub percent: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResultView {
    pub score: u32,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub level: LevelInfo,
}

/// Snapshot of a session as shown to the learner. The correct option stays
/// hidden until the current question has been answered.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub phase: Phase,
    pub progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultView>,
}

impl SessionView {
    pub fn of(id: Uuid, session: &QuizSession) -> Self {
        let total = session.drawn().len();
        let current = (session.cursor() + 1).min(total);
        let percent = if total == 0 {
            0.0
        } else {
            current as f64 * 100.0 / total as f64
        };

        let question = session.current_question().map(|q| QuestionView {
            text: q.text.clone(),
            options: q.options.clone(),
        });

        let feedback = match (session.current_question(), session.selected()) {
            (Some(q), Some(selected)) => Some(Feedback {
                selected,
                correct: selected == q.correct_answer,
                correct_answer: q.correct_answer,
                explanation: q.explanation.clone(),
                score: session.score(),
                correct_count: session.correct_count(),
            }),
            _ => None,
        };

        let result = (session.phase() == Phase::Completed).then(|| {
            let r = session.result();
            ResultView {
                score: r.score,
                correct_answers: r.correct_count,
                total_questions: r.total_questions,
                level: classify(r.score),
            }
        });

        Self {
            id,
            assignment_id: session.assignment_id(),
            phase: session.phase(),
            progress: Progress {
                current,
                total,
                score: session.score(),
                percent,
            },
            question,
            feedback,
            result,
        }
    }
}

/// Sessions untouched for this long are dropped on the next `start`.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

struct LiveSession {
    session: QuizSession,
    touched: Instant,
}

type Registry = HashMap<Uuid, LiveSession>;

pub struct QuizEngine {
    assignments: Arc<dyn AssignmentStore>,
    scores: Arc<dyn ScoreStore>,
    sessions: Mutex<Registry>,
    per_quiz: usize,
    idle_timeout: Duration,
}

impl QuizEngine {
    pub fn new(assignments: Arc<dyn AssignmentStore>, scores: Arc<dyn ScoreStore>) -> Self {
        Self {
            assignments,
            scores,
            sessions: Mutex::new(HashMap::new()),
            per_quiz: QUESTIONS_PER_QUIZ,
            idle_timeout: SESSION_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Opens a session for `user_id`. A failed preparation is returned to the
    /// caller and nothing is kept.
    pub async fn start(&self, assignment_id: Uuid, user_id: &str) -> Result<SessionView, EngineError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(EngineError::MissingLearner);
        }

        let assignment = self
            .assignments
            .get(assignment_id)
            .await?
            .ok_or(EngineError::AssignmentNotFound)?;

        let mut session = QuizSession::new(&assignment, user_id);
        session.prepare(self.per_quiz, &mut rand::thread_rng())?;

        let id = Uuid::new_v4();
        let view = SessionView::of(id, &session);
        {
            let mut sessions = self.lock()?;
            self.prune_idle(&mut sessions);
            sessions.insert(
                id,
                LiveSession {
                    session,
                    touched: Instant::now(),
                },
            );
        }
        tracing::info!(%id, %assignment_id, user_id, questions = view.progress.total, "session started");
        Ok(view)
    }

    pub fn view(&self, id: Uuid) -> Result<SessionView, EngineError> {
        let mut sessions = self.lock()?;
        let live = Self::touch(&mut sessions, id)?;
        Ok(SessionView::of(id, &live.session))
    }

    pub fn answer(&self, id: Uuid, option: usize) -> Result<Feedback, EngineError> {
        let mut sessions = self.lock()?;
        let live = Self::touch(&mut sessions, id)?;
        Ok(live.session.submit_answer(option)?)
    }

    /// Moves to the next question. On the last one the session completes,
    /// leaves the registry and its result goes to the score store; a failed
    /// save is logged and the learner still gets the result.
    pub async fn advance(&self, id: Uuid) -> Result<SessionView, EngineError> {
        let (step, view) = {
            let mut sessions = self.lock()?;
            let live = Self::touch(&mut sessions, id)?;
            let step = live.session.advance()?;
            let view = SessionView::of(id, &live.session);
            if matches!(step, Advance::Completed(_)) {
                sessions.remove(&id);
            }
            (step, view)
        };

        if let Advance::Completed(result) = step {
            tracing::info!(%id, score = result.score, correct = result.correct_count, total = result.total_questions, "session completed");
            if let Err(e) = self.scores.save(&result).await {
                tracing::warn!(%id, error = %e, "failed to save quiz score");
            }
        }
        Ok(view)
    }

    /// Drops a live session.
    pub fn discard(&self, id: Uuid) -> Result<(), EngineError> {
        self.lock()?
            .remove(&id)
            .map(|_| ())
            .ok_or(EngineError::SessionNotFound)
    }

    fn touch(sessions: &mut Registry, id: Uuid) -> Result<&mut LiveSession, EngineError> {
        let live = sessions.get_mut(&id).ok_or(EngineError::SessionNotFound)?;
        live.touched = Instant::now();
        Ok(live)
    }

    fn prune_idle(&self, sessions: &mut Registry) {
        let before = sessions.len();
        sessions.retain(|_, live| live.touched.elapsed() < self.idle_timeout);
        let dropped = before - sessions.len();
        if dropped > 0 {
            tracing::info!(dropped, "dropped idle sessions");
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Registry>, EngineError> {
        self.sessions
            .lock()
            .map_err(|_| EngineError::Store(StoreError::Unavailable("session registry lock poisoned".into())))
    }
}
