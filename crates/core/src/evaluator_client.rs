use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::EvaluationError;
use crate::evaluation::{Evaluation, EvaluationRequest, Evaluator};

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "openai/gpt-oss-20b:free";
/// Upper bound on one scoring request, connect to last byte.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);

const SYSTEM_PROMPT: &str = "You are a helpful technical interview coach. Always respond with valid JSON only, no additional text or formatting.";

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

// What the model is asked to return. Everything is optional here so that
// missing fields can be reported as a format error rather than a parse error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvaluation {
    ideal_answer: Option<String>,
    score: Option<f64>,
    strengths: Option<Vec<String>>,
    missing_concepts: Option<Vec<String>>,
    suggestions: Option<Vec<String>>,
}

pub struct EvaluatorConfig {
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

pub struct EvaluatorConfigBuilder {
    config: EvaluatorConfig,
}

impl EvaluatorConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EvaluatorConfig::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.config.endpoint = endpoint.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.config.api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn build(self) -> EvaluatorConfig {
        self.config
    }
}

impl Default for EvaluatorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluatorConfig {
    pub fn builder() -> EvaluatorConfigBuilder {
        EvaluatorConfigBuilder::new()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 1500,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Scores answers through an OpenAI-compatible chat-completions endpoint.
pub struct EvaluatorClient {
    client: Client,
    config: EvaluatorConfig,
}

impl EvaluatorClient {
    pub fn new(config: EvaluatorConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client, using defaults: {}", e);
                Client::new()
            });
        Self { client, config }
    }

    fn prompt(request: &EvaluationRequest) -> String {
        format!(
            r#"You are an expert technical interviewer specializing in {role} roles.

Question: "{question}"
Difficulty: {difficulty}

User's Answer:
"{answer}"

Your task:
1. Generate an ideal/reference answer for this question (comprehensive, accurate, well-structured)
2. Evaluate the user's answer on a scale of 0-10
3. Identify specific strengths in the user's answer
4. Identify missing concepts or areas for improvement
5. Provide actionable improvement suggestions

Return your response as a JSON object with the following structure:
{{
  "idealAnswer": "The ideal answer text here...",
  "score": 7.5,
  "strengths": ["Strength 1", "Strength 2"],
  "missingConcepts": ["Missing concept 1"],
  "suggestions": ["Suggestion 1", "Suggestion 2"]
}}

Guidelines:
- Score should be between 0-10 (can include decimals)
- Be constructive and specific
- Consider the difficulty level when evaluating"#,
            role = request.role,
            question = request.question,
            difficulty = request.difficulty,
            answer = request.answer,
        )
    }
}

#[async_trait]
impl Evaluator for EvaluatorClient {
    async fn evaluate(&self, request: EvaluationRequest) -> Result<Evaluation, EvaluationError> {
        let Some(api_key) = self.config.api_key.as_ref() else {
            return Err(EvaluationError::Configuration(
                "EVALUATOR_API_KEY is not set".to_string(),
            ));
        };
        if request.answer.trim().is_empty() {
            return Err(EvaluationError::Validation(
                "an answer is required before evaluation".to_string(),
            ));
        }

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": Self::prompt(&request) }
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens
        });

        let resp = self
            .client
            .post(self.config.endpoint.as_str())
            .bearer_auth(api_key.expose_secret())
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(EvaluationError::Service(service_error_message(
                status.as_u16(),
                &text,
            )));
        }

        let resp = resp.json::<LlmResponse>().await?;
        let content = resp
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| EvaluationError::Service("no content received from API".to_string()))?;

        parse_evaluation(content)
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }
}

/// Prefers the remote `error.message`, falling back to the status code.
pub(crate) fn service_error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("request failed with status {status}"))
}

/// Parses model output into an `Evaluation`, tolerating a Markdown code fence.
pub(crate) fn parse_evaluation(content: &str) -> Result<Evaluation, EvaluationError> {
    let cleaned = strip_code_fence(content);
    let raw: RawEvaluation = serde_json::from_str(cleaned)
        .map_err(|e| EvaluationError::Service(format!("failed to parse evaluation: {e}")))?;

    let (Some(ideal_answer), Some(score)) = (raw.ideal_answer, raw.score) else {
        return Err(EvaluationError::Service(
            "invalid evaluation format received from API".to_string(),
        ));
    };
    if ideal_answer.trim().is_empty() || !score.is_finite() {
        return Err(EvaluationError::Service(
            "invalid evaluation format received from API".to_string(),
        ));
    }

    Ok(Evaluation {
        ideal_answer,
        score: score.clamp(0.0, 10.0),
        strengths: raw.strengths.unwrap_or_default(),
        missing_concepts: raw.missing_concepts.unwrap_or_default(),
        suggestions: raw.suggestions.unwrap_or_default(),
    })
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
