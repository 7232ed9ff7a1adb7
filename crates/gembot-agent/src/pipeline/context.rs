//! Host context for the shared pipeline.
//!
//! `MessageContext` is implemented by the gateway's `AppState`. Keeping it here
//! lets `gembot-agent` stay transport-agnostic: channel crates depend on the
//! agent, never the other way round.

use gembot_core::types::SessionScope;
use gembot_sessions::SessionStore;

use crate::fetch::AttachmentFetcher;
use crate::provider::GenerationClient;

pub trait MessageContext: Send + Sync {
    fn sessions(&self) -> &SessionStore;
    fn generator(&self) -> &dyn GenerationClient;
    fn fetcher(&self) -> &AttachmentFetcher;

    /// How inbound messages are mapped to session keys.
    fn session_scope(&self) -> SessionScope {
        SessionScope::default()
    }
}
