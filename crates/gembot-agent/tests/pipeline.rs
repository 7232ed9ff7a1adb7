//! End-to-end behaviour of the shared ask pipeline against fake collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use gembot_agent::pipeline::{FETCH_FAILED_TEXT, IMAGE_REACTION, TEXT_REACTION};
use gembot_agent::{
    run_ask, run_history, run_reset, AskOutcome, AskRequest, AttachmentFetcher, AttachmentRef,
    GenerationClient, GenerationResult, ImageInput, MessageContext, PipelineError, ReplyTarget,
    TransportError, Trigger,
};
use gembot_core::types::{Role, SessionKey, Turn};
use gembot_sessions::SessionStore;

/// Echoes the prompt after a short delay; fails when the prompt says "fail".
#[derive(Default)]
struct EchoModel {
    calls: AtomicUsize,
}

#[async_trait]
impl GenerationClient for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate_text(&self, _history: &[Turn], prompt: &str) -> GenerationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        if prompt == "fail" {
            GenerationResult::Failure("quota".into())
        } else {
            GenerationResult::Text(format!("echo {prompt}"))
        }
    }

    async fn generate_from_image(&self, image: &ImageInput, prompt: &str) -> GenerationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        GenerationResult::Text(format!("{} bytes: {prompt}", image.bytes.len()))
    }
}

struct TestContext {
    sessions: SessionStore,
    model: EchoModel,
    fetcher: AttachmentFetcher,
}

impl TestContext {
    fn new() -> Self {
        Self {
            sessions: SessionStore::new(),
            model: EchoModel::default(),
            fetcher: AttachmentFetcher::new(1024 * 1024),
        }
    }
}

impl MessageContext for TestContext {
    fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
    fn generator(&self) -> &dyn GenerationClient {
        &self.model
    }
    fn fetcher(&self) -> &AttachmentFetcher {
        &self.fetcher
    }
}

#[derive(Default)]
struct Channel {
    said: Mutex<Vec<String>>,
    reactions: Mutex<Vec<String>>,
}

#[async_trait]
impl ReplyTarget for Channel {
    async fn say(&self, text: &str) -> Result<(), TransportError> {
        self.said.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn react(&self, emoji: &str) -> Result<(), TransportError> {
        self.reactions.lock().unwrap().push(emoji.to_string());
        Err(TransportError::React("missing permission".into()))
    }

    async fn attach(
        &self,
        _filename: &str,
        _bytes: Vec<u8>,
        _caption: Option<&str>,
    ) -> Result<(), TransportError> {
        Ok(())
    }
}

/// A channel the bot can no longer post to.
struct ClosedChannel;

#[async_trait]
impl ReplyTarget for ClosedChannel {
    async fn say(&self, _text: &str) -> Result<(), TransportError> {
        Err(TransportError::Send("missing access".into()))
    }

    async fn react(&self, _emoji: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn attach(
        &self,
        _filename: &str,
        _bytes: Vec<u8>,
        _caption: Option<&str>,
    ) -> Result<(), TransportError> {
        Err(TransportError::Attach("missing access".into()))
    }
}

fn ask<'a>(key: &SessionKey, content: &'a str, attachments: &'a [AttachmentRef]) -> AskRequest<'a> {
    AskRequest {
        session: key.clone(),
        content,
        attachments,
        trigger: Trigger::Command,
    }
}

#[tokio::test]
async fn concurrent_asks_keep_history_alternating() {
    let ctx = Arc::new(TestContext::new());
    let key = SessionKey::from("channel:1");

    let mut tasks = Vec::new();
    for i in 0..10 {
        let ctx = Arc::clone(&ctx);
        let key = key.clone();
        tasks.push(tokio::spawn(async move {
            let channel = Channel::default();
            let prompt = format!("q{i}");
            run_ask(ctx.as_ref(), &channel, ask(&key, &prompt, &[]))
                .await
                .unwrap()
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    let turns = ctx.sessions.snapshot(&key).await;
    assert_eq!(turns.len(), 20);
    for pair in turns.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Model);
        assert_eq!(pair[1].text(), format!("echo {}", pair[0].text()));
    }
}

#[tokio::test]
async fn failed_download_skips_generation_and_records_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let ctx = TestContext::new();
    let key = SessionKey::from("channel:2");
    let channel = Channel::default();
    let atts = vec![AttachmentRef::new(format!("{}/cat.png", server.uri()), "cat.png")];

    let outcome = run_ask(&ctx, &channel, ask(&key, "what is this", &atts))
        .await
        .unwrap();

    assert_eq!(outcome, AskOutcome::FetchFailed);
    assert_eq!(ctx.model.calls.load(Ordering::SeqCst), 0);
    assert!(ctx.sessions.snapshot(&key).await.is_empty());
    assert_eq!(*channel.said.lock().unwrap(), vec![FETCH_FAILED_TEXT]);
}

#[tokio::test]
async fn unsupported_attachment_is_never_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let ctx = TestContext::new();
    let key = SessionKey::from("channel:3");
    let channel = Channel::default();
    let atts = vec![AttachmentRef::new(format!("{}/scan.bmp", server.uri()), "scan.bmp")];

    let outcome = run_ask(&ctx, &channel, ask(&key, "hello", &atts)).await.unwrap();
    assert!(matches!(outcome, AskOutcome::Answered { .. }));
    assert_eq!(ctx.sessions.snapshot(&key).await.len(), 2);
}

#[tokio::test]
async fn image_answer_is_recorded_with_default_caption() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4]))
        .mount(&server)
        .await;

    let ctx = TestContext::new();
    let key = SessionKey::from("user:7");
    let channel = Channel::default();
    let atts = vec![AttachmentRef::new(format!("{}/cat.JPG", server.uri()), "cat.JPG")];
    let req = AskRequest {
        trigger: Trigger::Passive,
        ..ask(&key, "<@42>", &atts)
    };

    run_ask(&ctx, &channel, req).await.unwrap();

    // Reaction failure does not stop delivery.
    assert_eq!(*channel.reactions.lock().unwrap(), vec![IMAGE_REACTION]);
    assert_eq!(
        *channel.said.lock().unwrap(),
        vec!["4 bytes: What is this a picture of?"]
    );
    let turns = ctx.sessions.snapshot(&key).await;
    assert_eq!(turns[0].text(), "What is this a picture of?");
    assert_eq!(turns[1].role, Role::Model);
}

#[tokio::test]
async fn failure_is_shown_and_user_turn_retracted() {
    let ctx = TestContext::new();
    let key = SessionKey::from("channel:4");
    let channel = Channel::default();

    run_ask(&ctx, &channel, ask(&key, "hi", &[])).await.unwrap();
    let outcome = run_ask(&ctx, &channel, ask(&key, "fail", &[])).await.unwrap();

    assert!(matches!(
        outcome,
        AskOutcome::Answered { result: GenerationResult::Failure(_), .. }
    ));
    assert_eq!(channel.said.lock().unwrap()[1], "\u{274c}quota");
    assert_eq!(ctx.sessions.snapshot(&key).await.len(), 2);
}

#[tokio::test]
async fn undelivered_answer_stays_recorded() {
    let ctx = TestContext::new();
    let key = SessionKey::from("channel:10");

    let err = run_ask(&ctx, &ClosedChannel, ask(&key, "hi", &[]))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Delivery { sent: 0, .. }));
    let turns = ctx.sessions.snapshot(&key).await;
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].text(), "hi");
    assert_eq!(turns[1].role, Role::Model);
    assert_eq!(turns[1].text(), "echo hi");
}

#[tokio::test]
async fn long_answers_are_split_at_1700_chars() {
    let ctx = TestContext::new();
    let key = SessionKey::from("channel:5");
    let channel = Channel::default();
    let prompt = "x".repeat(3000);

    let outcome = run_ask(&ctx, &channel, ask(&key, &prompt, &[])).await.unwrap();

    // "echo " + 3000 chars = 3005 chars.
    assert!(matches!(outcome, AskOutcome::Answered { chunks: 2, .. }));
    let said = channel.said.lock().unwrap();
    assert_eq!(said[0].chars().count(), 1700);
    assert_eq!(said.concat(), format!("echo {prompt}"));
}

#[tokio::test]
async fn passive_text_message_gets_speech_bubble() {
    let ctx = TestContext::new();
    let key = SessionKey::from("channel:6");
    let channel = Channel::default();
    let req = AskRequest {
        trigger: Trigger::Passive,
        ..ask(&key, "<@1> hello", &[])
    };

    run_ask(&ctx, &channel, req).await.unwrap();
    assert_eq!(*channel.reactions.lock().unwrap(), vec![TEXT_REACTION]);
    assert_eq!(ctx.sessions.snapshot(&key).await[0].text(), " hello");
}

#[tokio::test]
async fn mention_only_message_gets_hint_and_no_turns() {
    let ctx = TestContext::new();
    let key = SessionKey::from("channel:8");
    let channel = Channel::default();

    let outcome = run_ask(&ctx, &channel, ask(&key, "<@1>  ", &[])).await.unwrap();
    assert_eq!(outcome, AskOutcome::EmptyPrompt);
    assert_eq!(ctx.model.calls.load(Ordering::SeqCst), 0);
    assert!(ctx.sessions.snapshot(&key).await.is_empty());
}

#[tokio::test]
async fn reset_then_history_reports_empty() {
    let ctx = TestContext::new();
    let key = SessionKey::from("global");
    let channel = Channel::default();

    run_ask(&ctx, &channel, ask(&key, "hi", &[])).await.unwrap();
    run_history(&ctx, &channel, &key).await.unwrap();
    run_reset(&ctx, &channel, &key).await.unwrap();
    run_history(&ctx, &channel, &key).await.unwrap();

    let said = channel.said.lock().unwrap();
    assert_eq!(said[1], "**User:** hi\n**Model:** echo hi");
    assert_eq!(said[2], "\u{1f916} Chat history has been reset.");
    assert_eq!(said[3], "No conversation history available.");
}
