//! In-memory quiz session: draws a random subset of an assignment's
//! questions and walks one learner through them.
//!
//! A session is an owned value. The transition methods check their
//! preconditions first and leave the session untouched when a check fails.

use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Assignment, Question, QuizResult};

pub const QUESTIONS_PER_QUIZ: usize = 10;
pub const PURIFICOIN_CORRECT: u32 = 10;
/// Wrong answers still earn coins, just fewer.
pub const PURIFICOIN_INCORRECT: u32 = 3;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Loading,
    Active,
    Completed,
    Failed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("assignment has no questions")]
    EmptyPool,
    #[error("session is {0:?}, expected {1:?}")]
    WrongPhase(Phase, Phase),
    #[error("current question already answered")]
    AlreadyAnswered,
    #[error("current question not answered yet")]
    NotAnswered,
    #[error("option {option} out of range (question has {count} options)")]
    InvalidOption { option: usize, count: usize },
}

/// What the learner sees right after answering.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub selected: usize,
    pub correct: bool,
    pub correct_answer: usize,
    pub explanation: String,
    pub score: u32,
    pub correct_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Next,
    Completed(QuizResult),
}

#[derive(Debug, Clone)]
pub struct QuizSession {
    user_id: String,
    assignment_id: Uuid,
    pool: Vec<Question>,
    drawn: Vec<Question>,
    cursor: usize,
    score: u32,
    correct_count: u32,
    selected: Option<usize>,
    phase: Phase,
}

impl QuizSession {
    pub fn new(assignment: &Assignment, user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            assignment_id: assignment.id,
            pool: assignment.questions.clone(),
            drawn: Vec::new(),
            cursor: 0,
            score: 0,
            correct_count: 0,
            selected: None,
            phase: Phase::Loading,
        }
    }

    /// Draws up to `per_quiz` questions without replacement.
    ///
    /// An assignment with fewer questions than `per_quiz` yields a shorter
    /// session. An empty pool moves the session to `Failed`.
    pub fn prepare<R: Rng + ?Sized>(
        &mut self,
        per_quiz: usize,
        rng: &mut R,
    ) -> Result<(), SessionError> {
        if self.phase != Phase::Loading {
            return Err(SessionError::WrongPhase(self.phase, Phase::Loading));
        }
        if self.pool.is_empty() {
            self.phase = Phase::Failed;
            return Err(SessionError::EmptyPool);
        }

        while self.drawn.len() < per_quiz && !self.pool.is_empty() {
            let idx = rng.gen_range(0..self.pool.len());
            self.drawn.push(self.pool.swap_remove(idx));
        }

        self.cursor = 0;
        self.phase = Phase::Active;
        Ok(())
    }

    pub fn submit_answer(&mut self, option: usize) -> Result<Feedback, SessionError> {
        self.expect_active()?;
        if self.selected.is_some() {
            return Err(SessionError::AlreadyAnswered);
        }
        let question = &self.drawn[self.cursor];
        if option >= question.options.len() {
            return Err(SessionError::InvalidOption {
                option,
                count: question.options.len(),
            });
        }

        let correct_answer = question.correct_answer;
        let explanation = question.explanation.clone();
        let correct = option == correct_answer;
        self.selected = Some(option);
        if correct {
            self.correct_count += 1;
            self.score += PURIFICOIN_CORRECT;
        } else {
            self.score += PURIFICOIN_INCORRECT;
        }

        Ok(Feedback {
            selected: option,
            correct,
            correct_answer,
            explanation,
            score: self.score,
            correct_count: self.correct_count,
        })
    }

    pub fn advance(&mut self) -> Result<Advance, SessionError> {
        self.expect_active()?;
        if self.selected.is_none() {
            return Err(SessionError::NotAnswered);
        }

        if self.cursor + 1 < self.drawn.len() {
            self.cursor += 1;
            self.selected = None;
            return Ok(Advance::Next);
        }

        self.phase = Phase::Completed;
        Ok(Advance::Completed(self.result()))
    }

    pub fn result(&self) -> QuizResult {
        QuizResult {
            user_id: self.user_id.clone(),
            assignment_id: self.assignment_id,
            score: self.score,
            correct_count: self.correct_count,
            total_questions: self.drawn.len() as u32,
        }
    }

    fn expect_active(&self) -> Result<(), SessionError> {
        if self.phase != Phase::Active {
            return Err(SessionError::WrongPhase(self.phase, Phase::Active));
        }
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn drawn(&self) -> &[Question] {
        &self.drawn
    }

    pub fn assignment_id(&self) -> Uuid {
        self.assignment_id
    }

    /// `None` unless the session is active.
    pub fn current_question(&self) -> Option<&Question> {
        match self.phase {
            Phase::Active => self.drawn.get(self.cursor),
            _ => None,
        }
    }
}
