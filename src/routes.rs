use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::engine::{EngineError, QuizEngine, SessionView};
use crate::generator::{GenerateError, QuestionGenerator};
use crate::models::*;
use crate::session::{Feedback, SessionError};
use crate::store::{AssignmentStore, ScoreStore};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QuizEngine>,
    pub assignments: Arc<dyn AssignmentStore>,
    pub scores: Arc<dyn ScoreStore>,
    pub generator: Arc<dyn QuestionGenerator>,
}

impl AppState {
    pub fn new(
        assignments: Arc<dyn AssignmentStore>,
        scores: Arc<dyn ScoreStore>,
        generator: Arc<dyn QuestionGenerator>,
        session_idle_timeout: Duration,
    ) -> Self {
        let engine = QuizEngine::new(assignments.clone(), scores.clone())
            .with_idle_timeout(session_idle_timeout);
        Self {
            engine: Arc::new(engine),
            assignments,
            scores,
            generator,
        }
    }
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // teacher side
        .route("/api/generate-questions", post(generate_questions))
        .route("/api/assignments", get(list_assignments).post(create_assignment))
        // learner side
        .route("/api/learners/:user_id/dashboard", get(dashboard))
        .route("/api/scores/:user_id/:assignment_id", get(get_score))
        .route("/api/sessions", post(start_session))
        .route("/api/sessions/:id", get(get_session).delete(discard_session))
        .route("/api/sessions/:id/answer", post(answer))
        .route("/api/sessions/:id/next", post(next_question))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn generate_questions(
    State(st): State<AppState>,
    Json(req): Json<GenerateQuestionsReq>,
) -> ApiResult<GenerateQuestionsResp> {
    if req.text.trim().is_empty() || req.subject.trim().is_empty() {
        return Err(e400("Text and subject are required"));
    }
    let questions = st
        .generator
        .generate(&req.text, &req.subject)
        .await
        .map_err(generate_err)?;
    Ok(Json(GenerateQuestionsResp { questions }))
}

async fn create_assignment(
    State(st): State<AppState>,
    Json(req): Json<CreateAssignmentReq>,
) -> Result<(StatusCode, Json<Assignment>), (StatusCode, String)> {
    if req.subject.trim().is_empty() {
        return Err(e400("subject is required"));
    }
    let text = req
        .pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    if text.is_empty() {
        return Err(e400("at least one page of text is required"));
    }

    let generated = st
        .generator
        .generate(&text, &req.subject)
        .await
        .map_err(generate_err)?;
    let total = generated.len();
    let questions: Vec<Question> = generated
        .into_iter()
        .filter(Question::is_well_formed)
        .collect();
    if questions.len() < total {
        tracing::warn!(dropped = total - questions.len(), total, "dropping malformed generated questions");
    }
    if questions.is_empty() {
        return Err((
            StatusCode::BAD_GATEWAY,
            "no usable questions were generated".into(),
        ));
    }

    let assignment = st
        .assignments
        .create(NewAssignment {
            subject: req.subject,
            due_date: req.due_date,
            teacher_id: req.teacher_id,
            questions,
        })
        .await
        .map_err(e500)?;
    tracing::info!(id = %assignment.id, subject = %assignment.subject, questions = assignment.questions.len(), "assignment created");

    Ok((StatusCode::CREATED, Json(assignment)))
}

async fn list_assignments(State(st): State<AppState>) -> ApiResult<Vec<AssignmentSummary>> {
    let all = st.assignments.list().await.map_err(e500)?;
    Ok(Json(all.iter().map(AssignmentSummary::from).collect()))
}

async fn dashboard(
    State(st): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Dashboard> {
    let assignments = match st.assignments.list().await {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, "failed to load assignments");
            return Json(Dashboard {
                subjects: Vec::new(),
                error: true,
            });
        }
    };

    let mut subjects: Vec<SubjectGroup> = Vec::new();
    for a in &assignments {
        let score = match st.scores.get(&user_id, a.id).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(assignment = %a.id, error = %e, "failed to load score");
                None
            }
        };
        let entry = DashboardEntry {
            assignment: a.into(),
            score,
        };
        match subjects.iter_mut().find(|g| g.subject == a.subject) {
            Some(group) => group.assignments.push(entry),
            None => subjects.push(SubjectGroup {
                subject: a.subject.clone(),
                name: subject_name(&a.subject).to_string(),
                assignments: vec![entry],
            }),
        }
    }

    Json(Dashboard {
        subjects,
        error: false,
    })
}

async fn get_score(
    State(st): State<AppState>,
    Path((user_id, assignment_id)): Path<(String, Uuid)>,
) -> ApiResult<QuizScore> {
    st.scores
        .get(&user_id, assignment_id)
        .await
        .map_err(e500)?
        .map(Json)
        .ok_or_else(|| e404("score not found"))
}

async fn start_session(
    State(st): State<AppState>,
    Json(req): Json<StartSessionReq>,
) -> Result<(StatusCode, Json<SessionView>), (StatusCode, String)> {
    let view = st
        .engine
        .start(req.assignment_id, &req.user_id)
        .await
        .map_err(engine_err)?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_session(State(st): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    st.engine.view(id).map(Json).map_err(engine_err)
}

async fn discard_session(
    State(st): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    st.engine.discard(id).map_err(engine_err)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn answer(
    State(st): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AnswerReq>,
) -> ApiResult<Feedback> {
    st.engine.answer(id, req.option).map(Json).map_err(engine_err)
}

async fn next_question(State(st): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    st.engine.advance(id).await.map(Json).map_err(engine_err)
}

// --- helpers ---
fn e400<T: Into<String>>(msg: T) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg.into())
}

fn e404<T: Into<String>>(msg: T) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, msg.into())
}

fn e500<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    tracing::error!(error=%e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn engine_err(e: EngineError) -> (StatusCode, String) {
    match e {
        EngineError::MissingLearner => e400(e.to_string()),
        EngineError::AssignmentNotFound | EngineError::SessionNotFound => e404(e.to_string()),
        EngineError::Session(SessionError::EmptyPool) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "this assignment has no questions yet".into(),
        ),
        EngineError::Session(SessionError::InvalidOption { .. }) => e400(e.to_string()),
        EngineError::Session(_) => (StatusCode::CONFLICT, e.to_string()),
        EngineError::Store(_) => e500(e),
    }
}

fn generate_err(e: GenerateError) -> (StatusCode, String) {
    match e {
        GenerateError::Disabled => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        _ => {
            tracing::error!(error = %e, "error generating questions");
            (
                StatusCode::BAD_GATEWAY,
                format!("Error generating questions: {e}"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SESSION_IDLE_TIMEOUT;
    use crate::session::tests::question;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::NaiveDate;
    use tower::ServiceExt;

    /// Returns the same questions regardless of input.
    struct FixedGenerator(Vec<Question>);

    #[async_trait]
    impl QuestionGenerator for FixedGenerator {
        async fn generate(&self, _: &str, _: &str) -> Result<Vec<Question>, GenerateError> {
            Ok(self.0.clone())
        }
    }

    fn app_with(generated: Vec<Question>) -> (Router, MemoryStore) {
        let store = MemoryStore::new();
        let state = AppState::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(FixedGenerator(generated)),
            SESSION_IDLE_TIMEOUT,
        );
        (router(state), store)
    }

    fn app(generated: usize) -> (Router, MemoryStore) {
        app_with((0..generated).map(question).collect())
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn seed(store: &MemoryStore, subject: &str, n: usize) -> Uuid {
        store
            .create(NewAssignment {
                subject: subject.into(),
                due_date: NaiveDate::from_ymd_opt(2026, 11, 15).unwrap(),
                teacher_id: "teacher-1".into(),
                questions: (0..n).map(question).collect(),
            })
            .await
            .unwrap()
            .id
    }

    fn correct_option(view: &Value) -> usize {
        let text = view["question"]["text"].as_str().unwrap();
        let n: usize = text["Domanda ".len()..].parse().unwrap();
        n % 4
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (app, _) = app(0);
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn generate_requires_text_and_subject() {
        let (app, _) = app(3);
        let (status, _) = call(
            &app,
            "POST",
            "/api/generate-questions",
            Some(json!({ "text": "", "subject": "math" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            "POST",
            "/api/generate-questions",
            Some(json!({ "text": "Pitagora", "subject": "math" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["questions"].as_array().unwrap().len(), 3);
        assert!(body["questions"][0]["correctAnswer"].is_number());
    }

    #[tokio::test]
    async fn create_then_list_assignments() {
        let (app, _) = app(12);
        let (status, created) = call(
            &app,
            "POST",
            "/api/assignments",
            Some(json!({
                "subject": "geography",
                "dueDate": "2026-11-30",
                "teacherId": "teacher-9",
                "pages": ["Il Po è il fiume più lungo d'Italia.", "  "]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["questions"].as_array().unwrap().len(), 12);

        let (status, list) = call(&app, "GET", "/api/assignments", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list[0]["id"], created["id"]);
        assert_eq!(list[0]["questionCount"], 12);

        let (status, _) = call(
            &app,
            "POST",
            "/api/assignments",
            Some(json!({
                "subject": "geography",
                "dueDate": "2026-11-30",
                "teacherId": "teacher-9",
                "pages": []
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn full_session_records_score_on_dashboard() {
        let (app, store) = app(0);
        let assignment_id = seed(&store, "history", 3).await;

        let (status, mut view) = call(
            &app,
            "POST",
            "/api/sessions",
            Some(json!({ "assignmentId": assignment_id, "userId": "learner-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(view["progress"]["total"], 3);
        assert!(view["question"].get("correctAnswer").is_none());
        let id = view["id"].as_str().unwrap().to_string();

        let (status, _) = call(&app, "POST", &format!("/api/sessions/{id}/next"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        while view["phase"] == "active" {
            let option = correct_option(&view);
            let (status, feedback) = call(
                &app,
                "POST",
                &format!("/api/sessions/{id}/answer"),
                Some(json!({ "option": option })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(feedback["correct"], true);

            let (status, _) = call(
                &app,
                "POST",
                &format!("/api/sessions/{id}/answer"),
                Some(json!({ "option": option })),
            )
            .await;
            assert_eq!(status, StatusCode::CONFLICT);

            let (status, next) = call(&app, "POST", &format!("/api/sessions/{id}/next"), None).await;
            assert_eq!(status, StatusCode::OK);
            view = next;
        }

        assert_eq!(view["phase"], "completed");
        assert_eq!(view["result"]["score"], 30);
        assert_eq!(view["result"]["level"]["label"], "Lupo Giovane");

        let (status, score) = call(
            &app,
            "GET",
            &format!("/api/scores/learner-1/{assignment_id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(score["correctAnswers"], 3);

        let (_, dash) = call(&app, "GET", "/api/learners/learner-1/dashboard", None).await;
        assert_eq!(dash["error"], false);
        assert_eq!(dash["subjects"][0]["name"], "Storia");
        assert_eq!(dash["subjects"][0]["assignments"][0]["score"]["score"], 30);

        // finished sessions leave the registry
        let (status, _) = call(&app, "GET", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "DELETE", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn abandoned_session_can_be_discarded() {
        let (app, store) = app(0);
        let assignment_id = seed(&store, "science", 5).await;
        let (_, view) = call(
            &app,
            "POST",
            "/api/sessions",
            Some(json!({ "assignmentId": assignment_id, "userId": "learner-3" })),
        )
        .await;
        let id = view["id"].as_str().unwrap().to_string();

        let (status, _) = call(&app, "DELETE", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "GET", &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(ScoreStore::get(&store, "learner-3", assignment_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn blank_learner_id_is_rejected() {
        let (app, store) = app(0);
        let assignment_id = seed(&store, "history", 2).await;
        for user_id in ["", "   "] {
            let (status, _) = call(
                &app,
                "POST",
                "/api/sessions",
                Some(json!({ "assignmentId": assignment_id, "userId": user_id })),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        for user_id in ["", "   "] {
            assert!(ScoreStore::get(&store, user_id, assignment_id)
                .await
                .unwrap()
                .is_none());
        }
    }

    #[tokio::test]
    async fn malformed_generated_questions_are_dropped() {
        let mut generated: Vec<Question> = (0..3).map(question).collect();
        let mut no_options = question(3);
        no_options.options.clear();
        let mut out_of_range = question(4);
        out_of_range.correct_answer = out_of_range.options.len();
        generated.push(no_options);
        generated.push(out_of_range);

        let (app, _) = app_with(generated);
        let (status, created) = call(
            &app,
            "POST",
            "/api/assignments",
            Some(json!({
                "subject": "science",
                "dueDate": "2026-12-01",
                "teacherId": "teacher-2",
                "pages": ["La fotosintesi avviene nelle foglie."]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let questions = created["questions"].as_array().unwrap();
        assert_eq!(questions.len(), 3);
        assert!(questions
            .iter()
            .all(|q| q["correctAnswer"].as_u64().unwrap() < q["options"].as_array().unwrap().len() as u64));
    }

    #[tokio::test]
    async fn all_malformed_questions_fail_creation() {
        let mut broken = question(1);
        broken.options.truncate(1);
        let (app, store) = app_with(vec![broken]);
        let (status, _) = call(
            &app,
            "POST",
            "/api/assignments",
            Some(json!({
                "subject": "math",
                "dueDate": "2026-12-01",
                "teacherId": "teacher-2",
                "pages": ["Le frazioni."]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(AssignmentStore::list(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_assignment_cannot_start() {
        let (app, store) = app(0);
        let assignment_id = seed(&store, "math", 0).await;
        let (status, _) = call(
            &app,
            "POST",
            "/api/sessions",
            Some(json!({ "assignmentId": assignment_id, "userId": "learner-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(
            &app,
            "GET",
            &format!("/api/scores/learner-1/{assignment_id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dashboard_groups_by_subject() {
        let (app, store) = app(0);
        seed(&store, "math", 2).await;
        seed(&store, "science", 2).await;
        seed(&store, "math", 2).await;
        seed(&store, "music", 2).await;

        let (_, dash) = call(&app, "GET", "/api/learners/learner-2/dashboard", None).await;
        let groups = dash["subjects"].as_array().unwrap();
        assert_eq!(groups.len(), 3);
        let math = groups.iter().find(|g| g["subject"] == "math").unwrap();
        assert_eq!(math["name"], "Matematica");
        assert_eq!(math["assignments"].as_array().unwrap().len(), 2);
        assert!(math["assignments"][0]["score"].is_null());
        let music = groups.iter().find(|g| g["subject"] == "music").unwrap();
        assert_eq!(music["name"], "music");
    }
}
