pub mod adapter;
pub mod attach;
pub mod commands;
pub mod context;
pub mod error;
pub mod handler;
pub mod language;
pub mod reply;
#[cfg(feature = "voice")]
pub mod voice_link;

pub use adapter::DiscordAdapter;
pub use context::DiscordAppContext;
pub use error::DiscordError;
#[cfg(feature = "voice")]
pub use voice_link::SongbirdLink;
