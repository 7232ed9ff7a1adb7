pub mod config;
pub mod error;
pub mod types;

pub use config::GembotConfig;
pub use error::{GembotError, Result};
pub use types::{Role, SessionKey, SessionScope, Turn};
