use async_trait::async_trait;
use autotype::answer::{AnswerError, AnswerGenerator, Credentials};
use autotype::dom::{Document, ElementSpec};
use autotype::protocol::{ContentAgent, Request};
use autotype::typing::StopFlag;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

struct FixedAnswer(&'static str);

#[async_trait]
impl AnswerGenerator for FixedAnswer {
    async fn answer(
        &self,
        _question: &str,
        _context: &str,
        _credentials: &Credentials,
    ) -> Result<String, AnswerError> {
        Ok(self.0.to_string())
    }
}

const PASSAGE: &str = "The quick brown fox jumps over the lazy dog near the quiet river bank.";

fn typing_test_page() -> Document {
    Document::new(
        "Typing Test",
        ElementSpec::new("body")
            .child(
                ElementSpec::new("div").id("words").children(
                    PASSAGE
                        .split(' ')
                        .map(|w| ElementSpec::new("span").class("word").text(w)),
                ),
            )
            .child(ElementSpec::new("input").id("wordsInput")),
    )
}

fn quiz_page() -> Document {
    Document::new(
        "Quiz",
        ElementSpec::new("body").child(
            ElementSpec::new("div")
                .child(ElementSpec::new("p").text("What is the capital of France?"))
                .child(ElementSpec::new("input").attr("type", "text").id("capital")),
        ),
    )
}

fn agent(doc: Document) -> ContentAgent<FixedAnswer> {
    ContentAgent::new(doc, FixedAnswer("Paris")).with_seed(7)
}

async fn send(agent: &mut ContentAgent<FixedAnswer>, message: Value) -> Value {
    let reply = agent.handle_json(&message.to_string()).await;
    serde_json::from_str(&reply).unwrap()
}

#[tokio::test]
async fn detect_text_returns_the_passage() {
    let mut agent = agent(typing_test_page());

    let reply = send(&mut agent, json!({ "action": "detectText" })).await;

    assert_eq!(reply, json!({ "text": PASSAGE }));
}

#[tokio::test]
async fn detect_text_on_empty_page_returns_null() {
    let mut agent = agent(Document::new("Blank", ElementSpec::new("body")));

    let reply = send(&mut agent, json!({ "action": "detectText" })).await;

    assert_eq!(reply, json!({ "text": null }));
}

#[tokio::test]
async fn unknown_or_missing_action_is_rejected() {
    let mut agent = agent(typing_test_page());

    for message in [json!({ "action": "launchRocket" }), json!({ "text": "hi" })] {
        let reply = send(&mut agent, message).await;
        assert_eq!(reply, json!({ "error": "Unknown action" }));
    }
}

#[tokio::test]
async fn malformed_message_is_reported() {
    let mut agent = agent(typing_test_page());

    let reply = agent.handle_json("{not json").await;
    let reply: Value = serde_json::from_str(&reply).unwrap();

    assert!(reply["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid message"));
}

#[tokio::test]
async fn missing_field_is_reported() {
    let mut agent = agent(typing_test_page());

    let reply = send(&mut agent, json!({ "action": "startTyping" })).await;

    assert!(reply["error"].as_str().unwrap().contains("text"));
}

#[tokio::test(start_paused = true)]
async fn start_typing_fills_the_input_and_reports_a_summary() {
    let mut agent = agent(typing_test_page());

    let reply = send(
        &mut agent,
        json!({
            "action": "startTyping",
            "text": "hello world",
            "settings": { "targetWpm": 120, "addRandomness": false, "startDelay": 0 }
        }),
    )
    .await;

    assert_eq!(reply["success"], true);
    assert_eq!(reply["summary"]["outcome"], "completed");
    assert_eq!(reply["summary"]["totalChars"], 11);
    assert_eq!(reply["summary"]["targetWpm"], 120);
    assert_eq!(reply["summary"]["charDelayMs"], 85);

    let doc = agent.into_document();
    let input = doc.query_selector("#wordsInput").unwrap().unwrap();
    assert_eq!(doc.element(input).unwrap().value.as_deref(), Some("hello world"));
}

#[tokio::test(start_paused = true)]
async fn start_typing_rejects_out_of_range_wpm() {
    let mut agent = agent(typing_test_page());

    let reply = send(
        &mut agent,
        json!({ "action": "startTyping", "text": "hi", "settings": { "targetWpm": 500 } }),
    )
    .await;

    assert!(reply.get("error").is_some());
    assert!(reply.get("success").is_none());
}

#[tokio::test]
async fn debug_detection_includes_report() {
    let mut agent = agent(typing_test_page());

    let reply = send(&mut agent, json!({ "action": "debugDetection" })).await;

    assert_eq!(reply["text"], PASSAGE);
    assert!(reply["debug"]["elementsFound"].as_u64().unwrap() > 0);
    assert!(reply["debug"]["allCandidates"].is_array());
}

#[tokio::test]
async fn detect_questions_lists_questions() {
    let mut agent = agent(quiz_page());

    let reply = send(&mut agent, json!({ "action": "detectQuestions" })).await;

    assert_eq!(
        reply,
        json!({
            "questions": [{
                "id": "q_0",
                "text": "What is the capital of France?",
                "inputField": "#capital",
                "context": "Page: Quiz"
            }]
        })
    );
}

#[tokio::test]
async fn answer_question_uses_generator() {
    let mut agent = agent(quiz_page());

    let reply = send(
        &mut agent,
        json!({
            "action": "answerQuestion",
            "question": { "text": "What is the capital of France?", "context": "Page: Quiz" },
            "apiKey": "sk-test"
        }),
    )
    .await;

    assert_eq!(reply, json!({ "answer": "Paris" }));
}

#[tokio::test]
async fn answer_question_requires_key() {
    let mut agent = agent(quiz_page());

    let reply = send(
        &mut agent,
        json!({
            "action": "answerQuestion",
            "question": { "text": "What is the capital of France?" },
            "apiKey": ""
        }),
    )
    .await;

    assert_eq!(reply, json!({ "error": "API key is required" }));
}

#[tokio::test(start_paused = true)]
async fn type_ai_answer_types_into_selected_field() {
    let mut agent = agent(quiz_page());

    let reply = send(
        &mut agent,
        json!({
            "action": "typeAIAnswer",
            "inputSelector": "#capital",
            "answer": "Paris",
            "speed": 90
        }),
    )
    .await;

    assert_eq!(
        reply,
        json!({ "success": true, "outcome": "completed", "charsTyped": 5 })
    );
    let doc = agent.document();
    let input = doc.query_selector("#capital").unwrap().unwrap();
    assert_eq!(doc.element(input).unwrap().value.as_deref(), Some("Paris"));
}

#[tokio::test(start_paused = true)]
async fn stopped_type_ai_answer_is_marked_cancelled() {
    let stop = StopFlag::new();
    let mut agent = agent(quiz_page()).with_stop_flag(stop.clone());
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        stop.stop();
    });

    let reply = send(
        &mut agent,
        json!({
            "action": "typeAIAnswer",
            "inputSelector": "#capital",
            "answer": "Paris is the capital",
            "speed": 60
        }),
    )
    .await;
    stopper.await.unwrap();

    assert_eq!(reply["success"], true);
    assert_eq!(reply["outcome"], "cancelled");
    let typed = reply["charsTyped"].as_u64().unwrap();
    assert!(typed > 0 && typed < 20, "{typed}");
}

#[tokio::test(start_paused = true)]
async fn type_ai_answer_reports_missing_field() {
    let mut agent = agent(quiz_page());

    let reply = send(
        &mut agent,
        json!({ "action": "typeAIAnswer", "inputSelector": "#nope", "answer": "Paris" }),
    )
    .await;

    assert_eq!(reply, json!({ "error": "Input field not found" }));
}

#[test]
fn requests_decode_from_wire_names() {
    let request: Request = serde_json::from_value(json!({
        "action": "typeAIAnswer",
        "inputSelector": "#a",
        "answer": "42"
    }))
    .unwrap();

    assert_eq!(
        request,
        Request::TypeAiAnswer {
            input_selector: "#a".to_string(),
            answer: "42".to_string(),
            speed: 60,
        }
    );
}
