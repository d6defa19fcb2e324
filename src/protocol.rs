//! JSON request/response surface between a controller (popup, CLI, test
//! harness) and the page-side agent.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::answer::{request_answer, AnswerGenerator, Credentials};
use crate::dom::Document;
use crate::questions::{detect_questions, DetectedQuestion};
use crate::settings::TypingSettings;
use crate::text_locator::{DebugDetection, TextLocator};
use crate::typing::{start_typing, type_answer, AnswerTyping, StopFlag, TypingSessionSummary};

pub const DEFAULT_ANSWER_SPEED_WPM: u32 = 60;

const ACTIONS: &[&str] = &[
    "detectText",
    "startTyping",
    "debugDetection",
    "detectQuestions",
    "answerQuestion",
    "typeAIAnswer",
];

fn default_answer_speed() -> u32 {
    DEFAULT_ANSWER_SPEED_WPM
}

/// The question part of an `answerQuestion` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionPayload {
    pub text: String,
    #[serde(default)]
    pub context: String,
}

impl From<&DetectedQuestion> for QuestionPayload {
    fn from(question: &DetectedQuestion) -> Self {
        Self {
            text: question.text.clone(),
            context: question.context.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    DetectText,
    StartTyping {
        text: String,
        #[serde(default)]
        settings: TypingSettings,
    },
    DebugDetection,
    DetectQuestions,
    AnswerQuestion {
        question: QuestionPayload,
        api_key: String,
    },
    #[serde(rename = "typeAIAnswer")]
    TypeAiAnswer {
        input_selector: String,
        answer: String,
        #[serde(default = "default_answer_speed")]
        speed: u32,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Text {
        text: Option<String>,
    },
    Typed {
        success: bool,
        summary: TypingSessionSummary,
    },
    /// `{success, outcome, charsTyped}` for a typed answer.
    AnswerTyped {
        success: bool,
        #[serde(flatten)]
        typing: AnswerTyping,
    },
    Debug(DebugDetection),
    Questions {
        questions: Vec<DetectedQuestion>,
    },
    Answer {
        answer: String,
    },
    Error {
        error: String,
    },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            error: message.into(),
        }
    }
}

/// Page-side handler: owns the document and answers one request at a time.
///
/// The stop flag is cleared at the start of each typing request, so a stop
/// only cancels the session in progress.
pub struct ContentAgent<G> {
    doc: Document,
    generator: G,
    text_locator: TextLocator,
    rng: StdRng,
    stop: StopFlag,
}

impl<G: AnswerGenerator> ContentAgent<G> {
    pub fn new(doc: Document, generator: G) -> Self {
        Self {
            doc,
            generator,
            text_locator: TextLocator::default(),
            rng: StdRng::from_entropy(),
            stop: StopFlag::new(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_text_locator(mut self, text_locator: TextLocator) -> Self {
        self.text_locator = text_locator;
        self
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    pub async fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::DetectText => Response::Text {
                text: self.text_locator.locate(&self.doc),
            },
            Request::StartTyping { text, settings } => {
                self.stop.reset();
                match start_typing(&mut self.doc, &text, &settings, &mut self.rng, &self.stop)
                    .await
                {
                    Ok(summary) => Response::Typed {
                        success: true,
                        summary,
                    },
                    Err(err) => Response::error(err.to_string()),
                }
            }
            Request::DebugDetection => Response::Debug(self.text_locator.debug_detection(&self.doc)),
            Request::DetectQuestions => Response::Questions {
                questions: detect_questions(&self.doc),
            },
            Request::AnswerQuestion { question, api_key } => {
                let credentials = Credentials::new(api_key);
                match request_answer(
                    &self.generator,
                    &question.text,
                    &question.context,
                    &credentials,
                )
                .await
                {
                    Ok(answer) => Response::Answer { answer },
                    Err(err) => {
                        warn!(%err, "answer request failed");
                        Response::error(err.to_string())
                    }
                }
            }
            Request::TypeAiAnswer {
                input_selector,
                answer,
                speed,
            } => {
                self.stop.reset();
                match type_answer(
                    &mut self.doc,
                    &input_selector,
                    &answer,
                    speed,
                    &mut self.rng,
                    &self.stop,
                )
                .await
                {
                    Ok(typing) => Response::AnswerTyped {
                        success: true,
                        typing,
                    },
                    Err(err) => Response::error(err.to_string()),
                }
            }
        }
    }

    /// Decode one JSON request, handle it, and encode the response.
    pub async fn handle_json(&mut self, message: &str) -> String {
        let response = match parse_request(message) {
            Ok(request) => self.handle(request).await,
            Err(response) => response,
        };
        serde_json::to_string(&response)
            .unwrap_or_else(|err| format!("{{\"error\":\"failed to encode response: {err}\"}}"))
    }
}

fn parse_request(message: &str) -> Result<Request, Response> {
    let value: Value = serde_json::from_str(message)
        .map_err(|err| Response::error(format!("invalid message: {err}")))?;

    let action = value.get("action").and_then(Value::as_str);
    if !action.is_some_and(|a| ACTIONS.contains(&a)) {
        debug!(?action, "unknown action");
        return Err(Response::error("Unknown action"));
    }

    serde_json::from_value(value).map_err(|err| Response::error(format!("invalid message: {err}")))
}
