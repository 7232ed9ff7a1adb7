//! Host context for the Discord adapter.
//!
//! Extends the shared pipeline's `MessageContext` with the pieces only the
//! chat adapter drives: voice sessions and slide generation.

use gembot_agent::MessageContext;
use gembot_slides::SlideGenerator;
use gembot_voice::VoiceManager;

pub trait DiscordAppContext: MessageContext + 'static {
    /// `None` when this build or configuration has no voice support.
    fn voice(&self) -> Option<&VoiceManager>;

    fn slides(&self) -> &SlideGenerator;
}
