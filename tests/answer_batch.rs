use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use autotype::answer::{
    answer_all, answer_and_type_all, request_answer, AnswerError, AnswerGenerator, BatchReport,
    Credentials,
};
use autotype::dom::{Document, ElementSpec};
use autotype::questions::DetectedQuestion;
use autotype::typing::StopFlag;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::Instant;

/// Canned answers keyed by question text; records every prompt it sees.
#[derive(Default)]
struct ScriptedGenerator {
    answers: HashMap<String, Result<String, AnswerError>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    fn answer_with(mut self, question: &str, answer: Result<&str, AnswerError>) -> Self {
        self.answers
            .insert(question.to_string(), answer.map(str::to_string));
        self
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerGenerator for ScriptedGenerator {
    async fn answer(
        &self,
        question: &str,
        context: &str,
        _credentials: &Credentials,
    ) -> Result<String, AnswerError> {
        self.calls
            .lock()
            .unwrap()
            .push((question.to_string(), context.to_string()));
        self.answers
            .get(question)
            .cloned()
            .unwrap_or_else(|| Err(AnswerError::Request("no script".to_string())))
    }
}

fn question(id: &str, text: &str) -> DetectedQuestion {
    DetectedQuestion {
        id: id.to_string(),
        text: text.to_string(),
        input_selector: format!("#{id}"),
        context: "Page: Quiz".to_string(),
        answer: None,
    }
}

#[tokio::test]
async fn answer_is_trimmed() {
    let generator = ScriptedGenerator::default().answer_with("What is 2+2?", Ok("  4\n"));

    let answer = request_answer(&generator, "What is 2+2?", "Page: Quiz", &Credentials::new("sk-test"))
        .await
        .unwrap();

    assert_eq!(answer, "4");
    assert_eq!(
        generator.calls(),
        vec![("What is 2+2?".to_string(), "Page: Quiz".to_string())]
    );
}

#[tokio::test]
async fn blank_key_is_rejected_without_calling_the_model() {
    let generator = ScriptedGenerator::default().answer_with("What is 2+2?", Ok("4"));

    let err = request_answer(&generator, "What is 2+2?", "", &Credentials::new("  "))
        .await
        .unwrap_err();

    assert_eq!(err, AnswerError::MissingCredentials);
    assert_eq!(err.to_string(), "API key is required");
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn blank_answer_is_an_error() {
    let generator = ScriptedGenerator::default().answer_with("Why?", Ok("   "));

    let err = request_answer(&generator, "Why?", "", &Credentials::new("sk-test"))
        .await
        .unwrap_err();

    assert_eq!(err, AnswerError::EmptyAnswer);
}

#[tokio::test]
async fn batch_records_failures_and_keeps_going() {
    let generator = ScriptedGenerator::default()
        .answer_with("What is the capital of France?", Ok("Paris"))
        .answer_with(
            "Explain photosynthesis.",
            Err(AnswerError::Request("rate limited".to_string())),
        )
        .answer_with("Who wrote Hamlet?", Ok("William Shakespeare"));
    let mut questions = vec![
        question("q_0", "What is the capital of France?"),
        question("q_1", "Explain photosynthesis."),
        question("q_2", "Who wrote Hamlet?"),
    ];

    let answered = answer_all(&mut questions, &generator, &Credentials::new("sk-test")).await;

    assert_eq!(answered, 2);
    assert_eq!(questions[0].answer.as_deref(), Some("Paris"));
    assert_eq!(
        questions[1].answer.as_deref(),
        Some("Error: answer request failed: rate limited")
    );
    assert_eq!(questions[2].answer.as_deref(), Some("William Shakespeare"));

    let asked: Vec<String> = generator.calls().into_iter().map(|(q, _)| q).collect();
    assert_eq!(
        asked,
        vec![
            "What is the capital of France?",
            "Explain photosynthesis.",
            "Who wrote Hamlet?"
        ]
    );
}

#[tokio::test]
async fn batch_skips_questions_that_already_have_answers() {
    let generator = ScriptedGenerator::default().answer_with("Who wrote Hamlet?", Ok("Shakespeare"));
    let mut done = question("q_0", "What is the capital of France?");
    done.answer = Some("Paris".to_string());
    let mut questions = vec![done, question("q_1", "Who wrote Hamlet?")];

    let answered = answer_all(&mut questions, &generator, &Credentials::new("sk-test")).await;

    assert_eq!(answered, 1);
    assert_eq!(generator.calls().len(), 1);
    assert_eq!(questions[0].answer.as_deref(), Some("Paris"));
}

#[tokio::test]
async fn batch_without_key_marks_every_question() {
    let generator = ScriptedGenerator::default();
    let mut questions = vec![question("q_0", "Why?"), question("q_1", "How?")];

    let answered = answer_all(&mut questions, &generator, &Credentials::new("")).await;

    assert_eq!(answered, 0);
    for q in &questions {
        assert_eq!(q.answer.as_deref(), Some("Error: API key is required"));
    }
}

#[tokio::test]
async fn failed_questions_are_retried_on_the_next_batch() {
    let generator = ScriptedGenerator::default().answer_with("Who wrote Hamlet?", Ok("Shakespeare"));
    let mut questions = vec![question("q_0", "Who wrote Hamlet?")];

    let first = answer_all(&mut questions, &generator, &Credentials::new("")).await;
    assert_eq!(first, 0);
    assert_eq!(questions[0].usable_answer(), None);

    let second = answer_all(&mut questions, &generator, &Credentials::new("sk-valid")).await;

    assert_eq!(second, 1);
    assert_eq!(questions[0].answer.as_deref(), Some("Shakespeare"));
    assert_eq!(questions[0].usable_answer(), Some("Shakespeare"));
}

fn quiz_page(ids: &[&str]) -> Document {
    let mut body = ElementSpec::new("body");
    for id in ids {
        body = body.child(ElementSpec::new("textarea").id(*id));
    }
    Document::new("Quiz", body)
}

fn field_value(doc: &Document, selector: &str) -> String {
    let node = doc.query_selector(selector).unwrap().unwrap();
    doc.element(node).unwrap().value.clone().unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn answers_then_types_each_usable_answer() {
    let generator = ScriptedGenerator::default()
        .answer_with("What is the capital of France?", Ok("Paris"))
        .answer_with(
            "Explain photosynthesis.",
            Err(AnswerError::Request("rate limited".to_string())),
        )
        .answer_with("Who wrote Hamlet?", Ok("Shakespeare"));
    let mut doc = quiz_page(&["q_0", "q_1", "q_2"]);
    let mut questions = vec![
        question("q_0", "What is the capital of France?"),
        question("q_1", "Explain photosynthesis."),
        question("q_2", "Who wrote Hamlet?"),
    ];

    let started = Instant::now();
    let report = answer_and_type_all(
        &mut doc,
        &mut questions,
        &generator,
        &Credentials::new("sk-test"),
        600,
        &mut StdRng::seed_from_u64(4),
        &StopFlag::new(),
    )
    .await;
    let elapsed = started.elapsed().as_millis();

    assert_eq!(
        report,
        BatchReport {
            answered: 2,
            typed: 2,
            failed: 1,
            cancelled: false,
        }
    );
    assert_eq!(field_value(&doc, "#q_0"), "Paris");
    assert_eq!(field_value(&doc, "#q_1"), "");
    assert_eq!(field_value(&doc, "#q_2"), "Shakespeare");
    // One pause between the two typed answers, 20 ms per character plus jitter.
    assert!((1000 + 16 * 20..1000 + 16 * 40 + 40).contains(&elapsed), "{elapsed}");
}

#[tokio::test(start_paused = true)]
async fn missing_field_is_counted_and_skipped() {
    let generator = ScriptedGenerator::default()
        .answer_with("Why?", Ok("Because"))
        .answer_with("How?", Ok("Carefully"));
    let mut doc = quiz_page(&["q_1"]);
    let mut questions = vec![question("q_0", "Why?"), question("q_1", "How?")];

    let report = answer_and_type_all(
        &mut doc,
        &mut questions,
        &generator,
        &Credentials::new("sk-test"),
        600,
        &mut StdRng::seed_from_u64(4),
        &StopFlag::new(),
    )
    .await;

    assert_eq!(report.typed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(field_value(&doc, "#q_1"), "Carefully");
}

#[tokio::test(start_paused = true)]
async fn stopped_batch_types_nothing() {
    let generator = ScriptedGenerator::default().answer_with("Why?", Ok("Because"));
    let mut doc = quiz_page(&["q_0"]);
    let mut questions = vec![question("q_0", "Why?")];
    let stop = StopFlag::new();
    stop.stop();

    let report = answer_and_type_all(
        &mut doc,
        &mut questions,
        &generator,
        &Credentials::new("sk-test"),
        600,
        &mut StdRng::seed_from_u64(4),
        &stop,
    )
    .await;

    assert!(report.cancelled);
    assert_eq!(report.typed, 0);
    assert_eq!(questions[0].answer.as_deref(), Some("Because"));
    assert_eq!(field_value(&doc, "#q_0"), "");
}

#[cfg(not(feature = "llm"))]
#[tokio::test]
async fn disabled_client_reports_missing_feature() {
    use autotype::answer::openai::OpenAiAnswerClient;

    let err = request_answer(
        &OpenAiAnswerClient::default(),
        "What is 2+2?",
        "",
        &Credentials::new("sk-test"),
    )
    .await
    .unwrap_err();

    assert_eq!(err, AnswerError::Disabled);
}
