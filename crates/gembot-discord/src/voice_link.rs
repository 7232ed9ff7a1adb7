//! Songbird-backed voice connector: joins a channel, decodes everyone's audio
//! and hands finished utterances to the voice manager.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::driver::DecodeMode;
use songbird::events::{CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler};
use songbird::{Config, Songbird};
use tokio::sync::mpsc;
use tracing::{debug, info};

use gembot_voice::segment::{downmix_stereo, mix};
use gembot_voice::{Utterance, UtteranceSegmenter, UtteranceSource, VoiceConnector, VoiceError};

/// Utterances queued between the voice driver and the listen loop.
const QUEUE: usize = 8;

pub struct SongbirdLink {
    songbird: Arc<Songbird>,
    silence: Duration,
}

impl SongbirdLink {
    pub fn new(silence: Duration) -> Self {
        let config = Config::default().decode_mode(DecodeMode::Decode);
        Self {
            songbird: Songbird::serenity_from_config(config),
            silence,
        }
    }

    /// The manager to register on the serenity client.
    pub fn songbird(&self) -> Arc<Songbird> {
        Arc::clone(&self.songbird)
    }
}

#[async_trait]
impl VoiceConnector for SongbirdLink {
    async fn connect(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Result<Box<dyn UtteranceSource>, VoiceError> {
        let call = self
            .songbird
            .join(GuildId::new(guild_id), ChannelId::new(channel_id))
            .await
            .map_err(|e| VoiceError::Connect(e.to_string()))?;

        let (tx, rx) = mpsc::channel(QUEUE);
        let mut handler = call.lock().await;
        handler.remove_all_global_events();
        handler.add_global_event(
            CoreEvent::VoiceTick.into(),
            TickReceiver {
                tx,
                segmenter: Mutex::new(UtteranceSegmenter::new(self.silence)),
            },
        );
        info!(guild = guild_id, channel = channel_id, "voice receive attached");

        Ok(Box::new(QueuedUtterances(rx)))
    }

    async fn disconnect(&self, guild_id: u64) -> Result<(), VoiceError> {
        self.songbird
            .remove(GuildId::new(guild_id))
            .await
            .map_err(|e| VoiceError::Connect(e.to_string()))
    }
}

/// Runs on every 20 ms voice tick.
struct TickReceiver {
    tx: mpsc::Sender<Utterance>,
    segmenter: Mutex<UtteranceSegmenter>,
}

#[async_trait]
impl VoiceEventHandler for TickReceiver {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::VoiceTick(tick) = ctx else {
            return None;
        };

        let frames: Vec<Vec<i16>> = tick
            .speaking
            .values()
            .filter_map(|data| data.decoded_voice.as_deref())
            .map(downmix_stereo)
            .collect();
        let frame = (!frames.is_empty()).then(|| mix(&frames));

        let utterance = self.segmenter.lock().ok()?.push(frame.as_deref());
        if let Some(utterance) = utterance {
            if self.tx.try_send(utterance).is_err() {
                debug!("listen loop is behind, utterance dropped");
            }
        }
        None
    }
}

/// Ends when the call is removed and the tick handler is dropped.
struct QueuedUtterances(mpsc::Receiver<Utterance>);

#[async_trait]
impl UtteranceSource for QueuedUtterances {
    async fn next_utterance(&mut self) -> Result<Option<Utterance>, VoiceError> {
        Ok(self.0.recv().await)
    }
}
