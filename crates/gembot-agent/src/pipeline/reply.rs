use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Send(String),

    #[error("reaction failed: {0}")]
    React(String),

    #[error("attachment upload failed: {0}")]
    Attach(String),
}

/// Where pipeline output goes: a channel, a DM, or an interaction response.
///
/// Each `say` is one transport message and must be awaited before the next
/// so that chunks arrive in order.
#[async_trait]
pub trait ReplyTarget: Send + Sync {
    async fn say(&self, text: &str) -> Result<(), TransportError>;

    /// React to the triggering message. Callers treat failures as non-fatal.
    async fn react(&self, emoji: &str) -> Result<(), TransportError>;

    /// Show a typing indicator, if the transport has one.
    async fn typing(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Upload a file with an optional caption.
    async fn attach(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<(), TransportError>;
}
