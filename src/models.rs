use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A multiple-choice question as produced by the question generator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    pub explanation: String,
}

impl Question {
    /// At least two options and a correct answer that points at one of them.
    pub fn is_well_formed(&self) -> bool {
        self.options.len() >= 2 && self.correct_answer < self.options.len()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: Uuid,
    pub subject: String,
    pub due_date: NaiveDate,
    pub teacher_id: String,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewAssignment {
    pub subject: String,
    pub due_date: NaiveDate,
    pub teacher_id: String,
    pub questions: Vec<Question>,
}

/// What a finished session reports to the score store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub user_id: String,
    pub assignment_id: Uuid,
    pub score: u32,
    pub correct_count: u32,
    pub total_questions: u32,
}

/// Stored score row, one per (user, assignment).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuizScore {
    pub id: Uuid,
    pub user_id: String,
    pub assignment_id: Uuid,
    pub score: u32,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// subject id, display name
const SUBJECTS: &[(&str, &str)] = &[
    ("math", "Matematica"),
    ("science", "Scienze"),
    ("history", "Storia"),
    ("geography", "Geografia"),
    ("literature", "Letteratura"),
];

pub fn subject_name(subject: &str) -> &str {
    SUBJECTS
        .iter()
        .find(|(id, _)| *id == subject)
        .map(|(_, name)| *name)
        .unwrap_or(subject)
}

// --- requests ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GenerateQuestionsReq {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub subject: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GenerateQuestionsResp {
    pub questions: Vec<Question>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssignmentReq {
    pub subject: String,
    pub due_date: NaiveDate,
    pub teacher_id: String,
    /// Text extracted from each photographed page.
    pub pages: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionReq {
    pub assignment_id: Uuid,
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnswerReq {
    pub option: usize,
}

// --- responses ---

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DashboardEntry {
    pub assignment: AssignmentSummary,
    pub score: Option<QuizScore>,
}

/// Assignment without its question pool, for listings.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSummary {
    pub id: Uuid,
    pub subject: String,
    pub due_date: NaiveDate,
    pub question_count: usize,
}

impl From<&Assignment> for AssignmentSummary {
    fn from(a: &Assignment) -> Self {
        Self {
            id: a.id,
            subject: a.subject.clone(),
            due_date: a.due_date,
            question_count: a.questions.len(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubjectGroup {
    pub subject: String,
    pub name: String,
    pub assignments: Vec<DashboardEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Dashboard {
    pub subjects: Vec<SubjectGroup>,
    pub error: bool,
}
