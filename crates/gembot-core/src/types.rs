use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a recorded turn.
///
/// Serialized with the generative API's own role names (`user` / `model`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }

    /// Capitalized display name, e.g. `User`.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Model => "Model",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded exchange unit. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<String>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![text.into()],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![text.into()],
        }
    }

    /// All parts joined without a separator.
    pub fn text(&self) -> String {
        self.parts.concat()
    }
}

/// How conversations are partitioned across the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionScope {
    /// One conversation per chat channel (DMs are their own channel).
    #[default]
    Channel,
    /// One conversation per user, shared across channels.
    User,
    /// A single conversation for the whole process.
    Global,
}

impl SessionScope {
    /// Derive the session key for a message from `user_id` in `channel_id`.
    pub fn key_for(&self, user_id: u64, channel_id: u64) -> SessionKey {
        match self {
            SessionScope::Channel => SessionKey(format!("channel:{channel_id}")),
            SessionScope::User => SessionKey(format!("user:{user_id}")),
            SessionScope::Global => SessionKey("global".to_string()),
        }
    }
}

impl std::str::FromStr for SessionScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "channel" => Ok(SessionScope::Channel),
            "user" => Ok(SessionScope::User),
            "global" => Ok(SessionScope::Global),
            other => Err(format!("unknown session scope: {other}")),
        }
    }
}

/// Key of one conversation in the session store.
///
/// Format: `channel:{id}`, `user:{id}` or `global`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_derives_expected_keys() {
        assert_eq!(SessionScope::Channel.key_for(7, 42).as_str(), "channel:42");
        assert_eq!(SessionScope::User.key_for(7, 42).as_str(), "user:7");
        assert_eq!(SessionScope::Global.key_for(7, 42).as_str(), "global");
    }

    #[test]
    fn role_serializes_with_api_names() {
        let json = serde_json::to_string(&Turn::model("hi")).unwrap();
        assert!(json.contains(r#""role":"model""#));
        assert_eq!(Role::User.label(), "User");
    }

    #[test]
    fn turn_text_joins_parts() {
        let turn = Turn {
            role: Role::User,
            parts: vec!["a".into(), "b".into()],
        };
        assert_eq!(turn.text(), "ab");
    }

    #[test]
    fn scope_parses_from_str() {
        assert_eq!("user".parse::<SessionScope>(), Ok(SessionScope::User));
        assert!("team".parse::<SessionScope>().is_err());
    }
}
