//! Voice session state machine against fake connector, prompt and recognizer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use gembot_agent::{ReplyTarget, TransportError};
use gembot_core::config::{LanguageChoice, VoiceConfig};
use gembot_voice::manager::{
    DISCONNECTED_TEXT, NOT_CONNECTED_TEXT, NOT_IN_VOICE_TEXT, NO_SELECTION_TEXT,
    STT_CANCELED_TEXT,
};
use gembot_voice::{
    JoinOutcome, JoinRequest, LanguagePrompt, LeaveOutcome, Recognition, RecognitionError,
    SpeechRecognizer, Utterance, UtteranceSource, VoiceConnector, VoiceError, VoiceManager,
};

const GUILD: u64 = 10;

struct ChannelSource(mpsc::Receiver<Utterance>);

#[async_trait]
impl UtteranceSource for ChannelSource {
    async fn next_utterance(&mut self) -> Result<Option<Utterance>, VoiceError> {
        Ok(self.0.recv().await)
    }
}

struct FakeConnector {
    source: Mutex<Option<mpsc::Receiver<Utterance>>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    disconnected: Notify,
}

impl FakeConnector {
    fn new() -> (Arc<Self>, mpsc::Sender<Utterance>) {
        let (tx, rx) = mpsc::channel(8);
        let connector = Arc::new(Self {
            source: Mutex::new(Some(rx)),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            disconnected: Notify::new(),
        });
        (connector, tx)
    }
}

#[async_trait]
impl VoiceConnector for FakeConnector {
    async fn connect(
        &self,
        _guild_id: u64,
        _channel_id: u64,
    ) -> Result<Box<dyn UtteranceSource>, VoiceError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let rx = self
            .source
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| VoiceError::Connect("already used".into()))?;
        Ok(Box::new(ChannelSource(rx)))
    }

    async fn disconnect(&self, _guild_id: u64) -> Result<(), VoiceError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.disconnected.notify_one();
        Ok(())
    }
}

/// Picks the choice at `pick`, or never answers when `pick` is `None`.
struct FakePrompt {
    pick: Option<usize>,
    dismissed: AtomicUsize,
}

impl FakePrompt {
    fn picking(pick: Option<usize>) -> Self {
        Self {
            pick,
            dismissed: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LanguagePrompt for FakePrompt {
    async fn choose(
        &self,
        choices: &[LanguageChoice; 2],
        _timeout: Duration,
    ) -> Result<Option<LanguageChoice>, VoiceError> {
        match self.pick {
            Some(i) => Ok(Some(choices[i].clone())),
            None => std::future::pending().await,
        }
    }

    async fn dismiss(&self) {
        self.dismissed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transcribes loud audio, ignores silence, fails on an empty utterance.
struct FakeRecognizer;

#[async_trait]
impl SpeechRecognizer for FakeRecognizer {
    fn name(&self) -> &str {
        "fake"
    }

    async fn recognize(
        &self,
        utterance: &Utterance,
        language: &str,
    ) -> Result<Recognition, RecognitionError> {
        if utterance.samples.is_empty() {
            return Err(RecognitionError::Api {
                status: 503,
                message: "unavailable".into(),
            });
        }
        if utterance.samples.iter().all(|s| *s == 0) {
            return Ok(Recognition::Unrecognized);
        }
        Ok(Recognition::Transcript(format!(
            "[{language}] {} samples",
            utterance.samples.len()
        )))
    }
}

#[derive(Default)]
struct Channel {
    said: Mutex<Vec<String>>,
    posted: Notify,
}

impl Channel {
    fn said(&self) -> Vec<String> {
        self.said.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplyTarget for Channel {
    async fn say(&self, text: &str) -> Result<(), TransportError> {
        self.said.lock().unwrap().push(text.to_string());
        self.posted.notify_one();
        Ok(())
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
        Ok(())
    }
}

/// Posts status lines at once but holds every transcript until released.
#[derive(Default)]
struct StalledChannel {
    said: Mutex<Vec<String>>,
    stalled: Notify,
    release: Notify,
}

#[async_trait]
impl ReplyTarget for StalledChannel {
    async fn say(&self, text: &str) -> Result<(), TransportError> {
        if text.starts_with('[') {
            self.stalled.notify_one();
            self.release.notified().await;
        }
        self.said.lock().unwrap().push(text.to_string());
        Ok(())
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
        Ok(())
    }
}

/// A text channel the bot lost access to.
struct UnreachableChannel;

#[async_trait]
impl ReplyTarget for UnreachableChannel {
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
        Ok(())
    }
}

fn manager(connector: Arc<FakeConnector>) -> VoiceManager {
    let config = VoiceConfig {
        loop_delay_ms: 1,
        ..VoiceConfig::default()
    };
    VoiceManager::new(connector, Some(Arc::new(FakeRecognizer)), &config)
        .with_selection_timeout(Duration::from_millis(50))
}

fn in_voice() -> JoinRequest {
    JoinRequest {
        guild_id: GUILD,
        voice_channel: Some((99, "General".into())),
    }
}

fn speech(len: usize) -> Utterance {
    Utterance {
        samples: vec![500; len],
        sample_rate: 48_000,
    }
}

async fn wait_for(notify: &Notify) {
    tokio::time::timeout(Duration::from_secs(2), notify.notified())
        .await
        .expect("timed out waiting for notification");
}

#[tokio::test]
async fn join_without_selection_leaves_bot_disconnected() {
    let (connector, _tx) = FakeConnector::new();
    let mgr = manager(Arc::clone(&connector));
    let prompt = FakePrompt::picking(None);
    let channel = Arc::new(Channel::default());

    let outcome = mgr.join(in_voice(), &prompt, channel.clone()).await.unwrap();

    assert_eq!(outcome, JoinOutcome::NoSelection);
    assert!(!mgr.is_active(GUILD));
    assert_eq!(mgr.active_count(), 0);
    assert_eq!(connector.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(prompt.dismissed.load(Ordering::SeqCst), 1);
    assert_eq!(channel.said(), vec!["Joined General!", NO_SELECTION_TEXT]);
}

#[tokio::test]
async fn leave_when_never_connected_reports_state() {
    let (connector, _tx) = FakeConnector::new();
    let mgr = manager(Arc::clone(&connector));
    let channel = Channel::default();

    let outcome = mgr.leave(GUILD, &channel).await.unwrap();

    assert_eq!(outcome, LeaveOutcome::NotConnected);
    assert_eq!(channel.said(), vec![NOT_CONNECTED_TEXT]);
    assert_eq!(connector.disconnects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn join_requires_caller_in_voice() {
    let (connector, _tx) = FakeConnector::new();
    let mgr = manager(Arc::clone(&connector));
    let channel = Arc::new(Channel::default());
    let req = JoinRequest {
        guild_id: GUILD,
        voice_channel: None,
    };

    let outcome = mgr
        .join(req, &FakePrompt::picking(Some(0)), channel.clone())
        .await
        .unwrap();

    assert_eq!(outcome, JoinOutcome::NotInVoice);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    assert_eq!(channel.said(), vec![NOT_IN_VOICE_TEXT]);
}

#[tokio::test]
async fn transcripts_are_posted_until_leave() {
    let (connector, tx) = FakeConnector::new();
    let mgr = manager(Arc::clone(&connector));
    let channel = Arc::new(Channel::default());

    let outcome = mgr
        .join(in_voice(), &FakePrompt::picking(Some(1)), channel.clone())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        JoinOutcome::Listening {
            language: "vi-VN".into()
        }
    );
    assert_eq!(mgr.language(GUILD).as_deref(), Some("vi-VN"));

    // Silence is skipped without a message.
    tx.send(Utterance {
        samples: vec![0; 10],
        sample_rate: 48_000,
    })
    .await
    .unwrap();
    tx.send(speech(4)).await.unwrap();
    loop {
        wait_for(&channel.posted).await;
        if channel.said().len() >= 3 {
            break;
        }
    }

    let outcome = mgr.leave(GUILD, channel.as_ref()).await.unwrap();
    assert_eq!(
        outcome,
        LeaveOutcome::Left {
            stopped_listening: true
        }
    );
    assert!(!mgr.is_active(GUILD));
    assert_eq!(connector.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(
        channel.said(),
        vec![
            "Joined General!".to_string(),
            "Selected language: vi-VN".to_string(),
            "[vi-VN] 4 samples".to_string(),
            STT_CANCELED_TEXT.to_string(),
            DISCONNECTED_TEXT.to_string(),
        ]
    );
}

#[tokio::test]
async fn service_error_is_posted_and_ends_session() {
    let (connector, tx) = FakeConnector::new();
    let mgr = manager(Arc::clone(&connector));
    let channel = Arc::new(Channel::default());

    mgr.join(in_voice(), &FakePrompt::picking(Some(0)), channel.clone())
        .await
        .unwrap();
    tx.send(Utterance {
        samples: vec![],
        sample_rate: 48_000,
    })
    .await
    .unwrap();

    wait_for(&connector.disconnected).await;
    assert!(!mgr.is_active(GUILD));
    let said = channel.said();
    assert!(said[2].starts_with("Could not request results from the speech recognition service;"));

    // Nothing left to leave.
    let outcome = mgr.leave(GUILD, channel.as_ref()).await.unwrap();
    assert_eq!(outcome, LeaveOutcome::NotConnected);
}

#[tokio::test]
async fn leave_during_selection_cancels_join() {
    let (connector, _tx) = FakeConnector::new();
    let mgr = Arc::new(
        manager(Arc::clone(&connector)).with_selection_timeout(Duration::from_secs(30)),
    );
    let channel = Arc::new(Channel::default());

    let joining = {
        let mgr = Arc::clone(&mgr);
        let channel = Arc::clone(&channel);
        tokio::spawn(async move {
            let prompt = FakePrompt::picking(None);
            mgr.join(in_voice(), &prompt, channel).await
        })
    };
    wait_for(&channel.posted).await; // "Joined General!"

    let left = mgr.leave(GUILD, channel.as_ref()).await.unwrap();
    assert_eq!(
        left,
        LeaveOutcome::Left {
            stopped_listening: false
        }
    );
    assert_eq!(joining.await.unwrap().unwrap(), JoinOutcome::Cancelled);
    assert!(!mgr.is_active(GUILD));
}

#[tokio::test]
async fn second_join_in_same_guild_is_refused() {
    let (connector, _tx) = FakeConnector::new();
    let mgr = manager(Arc::clone(&connector));
    let channel = Arc::new(Channel::default());

    mgr.join(in_voice(), &FakePrompt::picking(Some(0)), channel.clone())
        .await
        .unwrap();
    let again = mgr
        .join(in_voice(), &FakePrompt::picking(Some(0)), channel.clone())
        .await
        .unwrap();

    assert_eq!(again, JoinOutcome::AlreadyConnected);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    mgr.shutdown().await;
    assert_eq!(mgr.active_count(), 0);
}

#[tokio::test]
async fn pending_transcript_is_dropped_on_leave() {
    let (connector, tx) = FakeConnector::new();
    let mgr = manager(Arc::clone(&connector));
    let channel = Arc::new(StalledChannel::default());

    mgr.join(in_voice(), &FakePrompt::picking(Some(0)), channel.clone())
        .await
        .unwrap();
    tx.send(speech(960)).await.unwrap();
    wait_for(&channel.stalled).await;

    let outcome = mgr.leave(GUILD, channel.as_ref()).await.unwrap();
    assert_eq!(
        outcome,
        LeaveOutcome::Left {
            stopped_listening: true
        }
    );

    channel.release.notify_waiters();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        *channel.said.lock().unwrap(),
        vec![
            "Joined General!".to_string(),
            "Selected language: en-US".to_string(),
            STT_CANCELED_TEXT.to_string(),
            DISCONNECTED_TEXT.to_string(),
        ]
    );
    assert!(!mgr.is_active(GUILD));
    assert_eq!(connector.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_status_message_releases_the_guild() {
    let (connector, _tx) = FakeConnector::new();
    let mgr = manager(Arc::clone(&connector));

    let result = mgr
        .join(
            in_voice(),
            &FakePrompt::picking(Some(0)),
            Arc::new(UnreachableChannel),
        )
        .await;

    assert!(matches!(result, Err(VoiceError::Transport(_))));
    assert!(!mgr.is_active(GUILD));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(connector.disconnects.load(Ordering::SeqCst), 1);
}
