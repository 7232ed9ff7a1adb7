use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe, returns process metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at.to_rfc3339(),
        "uptime_secs": state.started.elapsed().as_secs(),
        "active_sessions": state.sessions.active_sessions(),
        "voice_enabled": state.voice.is_some(),
        "voice_sessions": state.voice.as_ref().map_or(0, |v| v.active_count()),
        "model": state.generator.model(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gembot_core::config::GembotConfig;
    use gembot_core::types::{SessionKey, Turn};

    #[tokio::test]
    async fn reports_session_counts() {
        let state = Arc::new(AppState::new(GembotConfig::default(), None));
        state
            .sessions
            .append(&SessionKey::from("channel:1"), Turn::user("hi"))
            .await;

        let Json(body) = health_handler(State(Arc::clone(&state))).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_sessions"], 1);
        assert_eq!(body["voice_enabled"], false);
        assert_eq!(body["voice_sessions"], 0);
        assert_eq!(body["model"], GembotConfig::default().gemini.model.as_str());
    }
}
