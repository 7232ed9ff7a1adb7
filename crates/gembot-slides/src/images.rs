//! Stock-image lookup for image slides.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::SlideError;

#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// URL of the best match for `query`, if any.
    async fn first_image(&self, query: &str) -> Result<Option<String>, SlideError>;
}

/// Pexels photo search (`GET /search?query=…&per_page=1`).
pub struct PexelsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PexelsClient {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Deserialize)]
struct Photo {
    src: PhotoSources,
}

#[derive(Deserialize)]
struct PhotoSources {
    original: String,
}

#[async_trait]
impl ImageSearch for PexelsClient {
    async fn first_image(&self, query: &str) -> Result<Option<String>, SlideError> {
        let resp = self
            .client
            .get(format!("{}/search", self.base_url))
            .header("Authorization", &self.api_key)
            .query(&[("query", query), ("page", "1"), ("per_page", "1")])
            .send()
            .await
            .map_err(|e| SlideError::ImageSearch(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SlideError::ImageSearch(format!(
                "Pexels returned {}",
                status.as_u16()
            )));
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| SlideError::ImageSearch(e.to_string()))?;
        let url = parsed.photos.into_iter().next().map(|p| p.src.original);
        debug!(query, found = url.is_some(), "pexels search");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_original_url_of_first_photo() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(header("Authorization", "px-key"))
            .and(query_param("query", "red crab"))
            .and(query_param("per_page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "photos": [{ "id": 1, "src": { "original": "https://img/1.jpg", "small": "https://img/1s.jpg" } }]
            })))
            .mount(&server)
            .await;

        let px = PexelsClient::new("px-key", &server.uri());
        assert_eq!(
            px.first_image("red crab").await.unwrap().as_deref(),
            Some("https://img/1.jpg")
        );
    }

    #[tokio::test]
    async fn no_photos_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "photos": [] })))
            .mount(&server)
            .await;

        let px = PexelsClient::new("k", &server.uri());
        assert!(px.first_image("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unauthorized_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let px = PexelsClient::new("bad", &server.uri());
        assert!(matches!(
            px.first_image("x").await,
            Err(SlideError::ImageSearch(_))
        ));
    }
}
