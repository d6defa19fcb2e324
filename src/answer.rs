use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::dom::Document;
use crate::questions::{DetectedQuestion, ANSWER_ERROR_PREFIX};
use crate::typing::{sleep_interruptible, type_answer, SessionOutcome, StopFlag};

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Pause between typing one answer and the next.
pub const ANSWER_PAUSE: Duration = Duration::from_secs(1);

/// API key for the answer model, supplied per request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn is_empty(&self) -> bool {
        self.api_key.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    #[error("API key is required")]
    MissingCredentials,

    #[error("answer request failed: {0}")]
    Request(String),

    #[error("No answer received from the model")]
    EmptyAnswer,

    #[error("LLM support is disabled (build with --features llm)")]
    Disabled,
}

/// Produces an answer for a question given its page context.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn answer(
        &self,
        question: &str,
        context: &str,
        credentials: &Credentials,
    ) -> Result<String, AnswerError>;
}

pub fn build_answer_prompt(question: &str, context: &str) -> String {
    format!(
        "Context: {context}\n\nQuestion: {question}\n\nProvide a direct, concise answer suitable for typing into a form field. Keep it under 500 characters unless it's clearly an essay question."
    )
}

/// Trimmed answer, or `None` if nothing is left.
pub fn clean_answer(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Ask `generator` for one answer, rejecting blank keys and blank answers.
pub async fn request_answer(
    generator: &dyn AnswerGenerator,
    question: &str,
    context: &str,
    credentials: &Credentials,
) -> Result<String, AnswerError> {
    if credentials.is_empty() {
        return Err(AnswerError::MissingCredentials);
    }
    let raw = generator.answer(question, context, credentials).await?;
    clean_answer(&raw).ok_or(AnswerError::EmptyAnswer)
}

/// Fill in `answer` for every question without a usable one.
///
/// Questions are answered one at a time. A failure is recorded on the question
/// as `"Error: <message>"` and the batch continues; a later batch retries it.
/// Returns how many questions received a real answer.
pub async fn answer_all(
    questions: &mut [DetectedQuestion],
    generator: &dyn AnswerGenerator,
    credentials: &Credentials,
) -> usize {
    let mut answered = 0usize;
    for question in questions
        .iter_mut()
        .filter(|q| q.usable_answer().is_none())
    {
        match request_answer(generator, &question.text, &question.context, credentials).await {
            Ok(answer) => {
                info!(id = %question.id, "question answered");
                question.answer = Some(answer);
                answered += 1;
            }
            Err(err) => {
                warn!(id = %question.id, %err, "failed to answer question");
                question.answer = Some(format!("{ANSWER_ERROR_PREFIX}{err}"));
            }
        }
    }
    answered
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Questions holding a usable answer after the answer pass.
    pub answered: usize,
    /// Answers typed to completion.
    pub typed: usize,
    /// Questions left unanswered or whose field could not be typed into.
    pub failed: usize,
    pub cancelled: bool,
}

/// Answer every question, then type each usable answer into its field.
///
/// Answers go in document order at `speed_wpm` with [`ANSWER_PAUSE`] between
/// fields. Failed answers are skipped, a missing field is counted and skipped,
/// and a set `stop` flag ends the batch.
pub async fn answer_and_type_all(
    doc: &mut Document,
    questions: &mut [DetectedQuestion],
    generator: &dyn AnswerGenerator,
    credentials: &Credentials,
    speed_wpm: u32,
    rng: &mut impl Rng,
    stop: &StopFlag,
) -> BatchReport {
    answer_all(questions, generator, credentials).await;

    let ready: Vec<&DetectedQuestion> = questions
        .iter()
        .filter(|q| q.usable_answer().is_some())
        .collect();
    let mut report = BatchReport {
        answered: ready.len(),
        failed: questions.len() - ready.len(),
        ..BatchReport::default()
    };

    for (index, question) in ready.into_iter().enumerate() {
        if index > 0 {
            sleep_interruptible(stop, ANSWER_PAUSE).await;
        }
        if stop.is_stopped() {
            report.cancelled = true;
            break;
        }
        let Some(answer) = question.usable_answer() else {
            continue;
        };

        match type_answer(doc, &question.input_selector, answer, speed_wpm, rng, stop).await {
            Ok(typing) if typing.outcome == SessionOutcome::Cancelled => {
                report.cancelled = true;
                break;
            }
            Ok(typing) => {
                info!(id = %question.id, chars = typing.chars_typed, "answer typed");
                report.typed += 1;
            }
            Err(err) => {
                warn!(id = %question.id, %err, "could not type answer");
                report.failed += 1;
            }
        }
    }

    info!(
        answered = report.answered,
        typed = report.typed,
        failed = report.failed,
        cancelled = report.cancelled,
        "answer batch finished"
    );
    report
}

#[cfg(feature = "llm")]
pub mod openai {
    use super::*;

    use anyhow::{Context, Result};
    use async_openai::{
        config::OpenAIConfig,
        types::chat::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
        Client,
    };

    pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
    pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

    const MAX_COMPLETION_TOKENS: u32 = 500;
    const TEMPERATURE: f32 = 0.7;

    /// Chat-completion backed [`AnswerGenerator`].
    #[derive(Debug, Clone)]
    pub struct OpenAiAnswerClient {
        model: String,
        api_base: String,
    }

    impl Default for OpenAiAnswerClient {
        fn default() -> Self {
            Self {
                model: DEFAULT_MODEL.to_string(),
                api_base: DEFAULT_API_BASE.to_string(),
            }
        }
    }

    impl OpenAiAnswerClient {
        pub fn with_model(mut self, model: impl Into<String>) -> Self {
            self.model = model.into();
            self
        }

        pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
            self.api_base = api_base.into();
            self
        }

        pub fn model(&self) -> &str {
            &self.model
        }

        async fn request(&self, prompt: &str, credentials: &Credentials) -> Result<String> {
            let config = OpenAIConfig::new()
                .with_api_key(credentials.api_key())
                .with_api_base(self.api_base.as_str());
            let client = Client::with_config(config);

            let request = CreateChatCompletionRequestArgs::default()
                .model(self.model.as_str())
                .messages([ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?
                    .into()])
                .max_completion_tokens(MAX_COMPLETION_TOKENS)
                .temperature(TEMPERATURE)
                .build()
                .context("failed to build chat completion request")?;

            let response = client
                .chat()
                .create(request)
                .await
                .context("chat completion request failed")?;

            Ok(response
                .choices
                .first()
                .and_then(|c| c.message.content.clone())
                .unwrap_or_default())
        }
    }

    #[async_trait]
    impl AnswerGenerator for OpenAiAnswerClient {
        async fn answer(
            &self,
            question: &str,
            context: &str,
            credentials: &Credentials,
        ) -> Result<String, AnswerError> {
            let prompt = build_answer_prompt(question, context);
            self.request(&prompt, credentials)
                .await
                .map_err(|err| AnswerError::Request(format!("{err:#}")))
        }
    }
}

#[cfg(not(feature = "llm"))]
pub mod openai {
    use super::*;

    pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
    pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

    /// Stand-in that reports [`AnswerError::Disabled`] for every question.
    #[derive(Debug, Clone, Default)]
    pub struct OpenAiAnswerClient;

    impl OpenAiAnswerClient {
        pub fn with_model(self, _model: impl Into<String>) -> Self {
            self
        }

        pub fn with_api_base(self, _api_base: impl Into<String>) -> Self {
            self
        }

        pub fn model(&self) -> &str {
            DEFAULT_MODEL
        }
    }

    #[async_trait]
    impl AnswerGenerator for OpenAiAnswerClient {
        async fn answer(
            &self,
            _question: &str,
            _context: &str,
            _credentials: &Credentials,
        ) -> Result<String, AnswerError> {
            Err(AnswerError::Disabled)
        }
    }
}
