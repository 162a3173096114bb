use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{query, query_as, Pool, Postgres};
use uuid::Uuid;

use crate::models::{Assignment, NewAssignment, Question, QuizResult, QuizScore};
use crate::store::{AssignmentStore, ScoreStore, StoreError};

pub type Db = Pool<Postgres>;

pub async fn connect(url: &str) -> anyhow::Result<Db> {
    Ok(Pool::<Postgres>::connect(url).await?)
}

/// Assignment and score storage backed by Postgres.
#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct AssignmentRow {
    id: Uuid,
    subject: String,
    due_date: NaiveDate,
    teacher_id: String,
    questions: Json<Vec<Question>>,
    created_at: DateTime<Utc>,
}

impl From<AssignmentRow> for Assignment {
    fn from(r: AssignmentRow) -> Self {
        Assignment {
            id: r.id,
            subject: r.subject,
            due_date: r.due_date,
            teacher_id: r.teacher_id,
            questions: r.questions.0,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ScoreRow {
    id: Uuid,
    user_id: String,
    assignment_id: Uuid,
    score: i32,
    correct_answers: i32,
    total_questions: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ScoreRow> for QuizScore {
    fn from(r: ScoreRow) -> Self {
        // columns carry CHECK (>= 0)
        QuizScore {
            id: r.id,
            user_id: r.user_id,
            assignment_id: r.assignment_id,
            score: r.score.max(0) as u32,
            correct_answers: r.correct_answers.max(0) as u32,
            total_questions: r.total_questions.max(0) as u32,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

const ASSIGNMENT_COLUMNS: &str = "id, subject, due_date, teacher_id, questions, created_at";

#[async_trait]
impl AssignmentStore for PgStore {
    async fn list(&self) -> Result<Vec<Assignment>, StoreError> {
        let rows: Vec<AssignmentRow> = query_as(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments ORDER BY due_date ASC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Assignment::from).collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Assignment>, StoreError> {
        let row: Option<AssignmentRow> = query_as(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Assignment::from))
    }

    async fn create(&self, new: NewAssignment) -> Result<Assignment, StoreError> {
        let row: AssignmentRow = query_as(&format!(
            r#"
            INSERT INTO assignments (id, subject, due_date, teacher_id, questions)
            VALUES ($1,$2,$3,$4,$5)
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.subject)
        .bind(new.due_date)
        .bind(new.teacher_id)
        .bind(Json(new.questions))
        .fetch_one(&self.db)
        .await?;
        Ok(row.into())
    }
}

#[async_trait]
impl ScoreStore for PgStore {
    async fn save(&self, result: &QuizResult) -> Result<(), StoreError> {
        query(
            r#"
            INSERT INTO quiz_scores (id, user_id, assignment_id, score, correct_answers, total_questions)
            VALUES ($1,$2,$3,$4,$5,$6)
            ON CONFLICT (user_id, assignment_id)
            DO UPDATE SET score=EXCLUDED.score,
                          correct_answers=EXCLUDED.correct_answers,
                          total_questions=EXCLUDED.total_questions,
                          updated_at=now()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&result.user_id)
        .bind(result.assignment_id)
        .bind(result.score as i32)
        .bind(result.correct_count as i32)
        .bind(result.total_questions as i32)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get(
        &self,
        user_id: &str,
        assignment_id: Uuid,
    ) -> Result<Option<QuizScore>, StoreError> {
        let row: Option<ScoreRow> = query_as(
            r#"
            SELECT id, user_id, assignment_id, score, correct_answers, total_questions, created_at, updated_at
            FROM quiz_scores WHERE user_id = $1 AND assignment_id = $2
            "#,
        )
        .bind(user_id)
        .bind(assignment_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(QuizScore::from))
    }
}
