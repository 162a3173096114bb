//! Question generation through an OpenAI-compatible chat completions API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::models::Question;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TIMEOUT_SECS: u64 = 120;
const TEMPERATURE: f64 = 0.7;
const QUESTIONS_REQUESTED: usize = 50;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("question generation is not configured")]
    Disabled,
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("network error: {0}")]
    Network(String),
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("no response received from the model")]
    EmptyResponse,
    #[error("error parsing response: {0}")]
    Parse(String),
    #[error("invalid response format")]
    InvalidFormat,
}

#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// Multiple-choice questions about `subject`, drawn only from `text`.
    async fn generate(&self, text: &str, subject: &str) -> Result<Vec<Question>, GenerateError>;
}

pub struct OpenAiGenerator {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(
        api_key: &str,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Result<Self, GenerateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| GenerateError::Network(e.to_string()))?;

        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client,
        })
    }
}

/// Stand-in used when no API key is configured.
pub struct DisabledGenerator;

#[async_trait]
impl QuestionGenerator for DisabledGenerator {
    async fn generate(&self, _text: &str, _subject: &str) -> Result<Vec<Question>, GenerateError> {
        Err(GenerateError::Disabled)
    }
}

pub fn build_prompt(text: &str, subject: &str) -> String {
    format!(
        r#"Generate {QUESTIONS_REQUESTED} multiple choice questions in Italian about "{subject}" based on this text: {text}.
Only generate questions based on information present in the text.
The response must contain ONLY a valid JSON with this exact structure:
{{
  "questions": [
    {{
      "text": "question text",
      "options": ["answer1", "answer2", "answer3", "answer4"],
      "correctAnswer": 0,
      "explanation": "explanation for the correct answer"
    }}
  ]
}}"#
    )
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct GeneratedQuestions {
    questions: Option<Vec<Question>>,
}

/// Pulls the question array out of the model's JSON reply.
pub fn parse_questions(content: &str) -> Result<Vec<Question>, GenerateError> {
    let parsed: GeneratedQuestions = serde_json::from_str(content.trim())
        .map_err(|e| GenerateError::Parse(e.to_string()))?;
    parsed.questions.ok_or(GenerateError::InvalidFormat)
}

#[async_trait]
impl QuestionGenerator for OpenAiGenerator {
    #[instrument(skip(self, text), fields(model = %self.model, text_len = text.len()))]
    async fn generate(&self, text: &str, subject: &str) -> Result<Vec<Question>, GenerateError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: TEMPERATURE,
            messages: vec![ChatMessage {
                role: "user",
                content: build_prompt(text, subject),
            }],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerateError::Timeout(TIMEOUT_SECS)
                } else {
                    GenerateError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerateError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::Parse(e.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(GenerateError::EmptyResponse)?;

        let questions = parse_questions(&content)?;
        tracing::info!(count = questions.len(), "generated questions");
        Ok(questions)
    }
}
