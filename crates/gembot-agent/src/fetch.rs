//! Attachment fetching: picks the first supported image from a message and
//! downloads its bytes for the multimodal generation call.

use tracing::{debug, warn};

/// Image extensions the generation service accepts.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Transport-neutral view of a chat attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub url: String,
    pub filename: String,
    /// Declared MIME type, if the platform supplied one.
    pub content_type: Option<String>,
    /// Declared size in bytes, if known.
    pub size: Option<u64>,
}

impl AttachmentRef {
    pub fn new(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
            content_type: None,
            size: None,
        }
    }

    pub fn is_supported_image(&self) -> bool {
        is_supported_image(&self.filename)
    }

    /// MIME type to send to the model: the declared `image/*` type when present,
    /// otherwise derived from the extension.
    pub fn mime_type(&self) -> String {
        match self.content_type.as_deref() {
            Some(ct) if ct.starts_with("image/") => ct.to_string(),
            _ => mime_for_filename(&self.filename).to_string(),
        }
    }
}

/// Downloaded image, ready for [`crate::provider::ImageInput`].
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub filename: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("download of '{filename}' returned status {status}")]
    Status { filename: String, status: u16 },

    #[error("attachment '{filename}' is {size} bytes (limit {limit})")]
    TooLarge {
        filename: String,
        size: u64,
        limit: u64,
    },
}

/// Case-insensitive extension check against [`IMAGE_EXTENSIONS`].
pub fn is_supported_image(filename: &str) -> bool {
    extension(filename).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// First attachment whose filename is a supported image. Others are ignored.
pub fn select_image(attachments: &[AttachmentRef]) -> Option<&AttachmentRef> {
    attachments.iter().find(|a| a.is_supported_image())
}

fn extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

fn mime_for_filename(filename: &str) -> &'static str {
    match extension(filename).as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Single-shot HTTP downloader for chat attachments.
#[derive(Clone)]
pub struct AttachmentFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl AttachmentFetcher {
    pub fn new(max_bytes: u64) -> Self {
        Self::with_client(reqwest::Client::new(), max_bytes)
    }

    pub fn with_client(client: reqwest::Client, max_bytes: u64) -> Self {
        Self { client, max_bytes }
    }

    /// Download one image attachment with a single GET.
    ///
    /// Non-2xx responses, network failures and oversized files are all
    /// [`FetchError`]; the caller aborts the request on any of them.
    pub async fn fetch(&self, attachment: &AttachmentRef) -> Result<FetchedImage, FetchError> {
        if let Some(size) = attachment.size.filter(|s| *s > self.max_bytes) {
            return Err(FetchError::TooLarge {
                filename: attachment.filename.clone(),
                size,
                limit: self.max_bytes,
            });
        }

        debug!(filename = %attachment.filename, "downloading attachment");
        let resp = self.client.get(&attachment.url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            warn!(filename = %attachment.filename, status = status.as_u16(), "attachment download failed");
            return Err(FetchError::Status {
                filename: attachment.filename.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = resp.bytes().await?.to_vec();
        if bytes.len() as u64 > self.max_bytes {
            return Err(FetchError::TooLarge {
                filename: attachment.filename.clone(),
                size: bytes.len() as u64,
                limit: self.max_bytes,
            });
        }

        Ok(FetchedImage {
            bytes,
            mime_type: attachment.mime_type(),
            filename: attachment.filename.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert!(is_supported_image("cat.PNG"));
        assert!(is_supported_image("photo.JpEg"));
        assert!(is_supported_image("anim.gif"));
        assert!(!is_supported_image("scan.bmp"));
        assert!(!is_supported_image("notes.txt"));
        assert!(!is_supported_image("png"));
    }

    #[test]
    fn select_image_skips_unsupported_files() {
        let atts = vec![
            AttachmentRef::new("http://x/a.bmp", "a.bmp"),
            AttachmentRef::new("http://x/b.webp", "b.webp"),
        ];
        assert_eq!(select_image(&atts).unwrap().filename, "b.webp");
        assert!(select_image(&atts[..1]).is_none());
    }

    #[test]
    fn mime_type_prefers_declared_image_type() {
        let mut att = AttachmentRef::new("http://x/a.png", "a.png");
        assert_eq!(att.mime_type(), "image/png");
        att.content_type = Some("image/webp".into());
        assert_eq!(att.mime_type(), "image/webp");
        att.content_type = Some("application/octet-stream".into());
        assert_eq!(att.mime_type(), "image/png");
        assert_eq!(AttachmentRef::new("u", "a.JPG").mime_type(), "image/jpeg");
    }

    #[tokio::test]
    async fn fetch_returns_bytes_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cat.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = AttachmentFetcher::new(1024);
        let att = AttachmentRef::new(format!("{}/cat.png", server.uri()), "cat.png");
        let img = fetcher.fetch(&att).await.unwrap();
        assert_eq!(img.bytes, vec![1, 2, 3]);
        assert_eq!(img.mime_type, "image/png");
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = AttachmentFetcher::new(1024);
        let att = AttachmentRef::new(format!("{}/gone.jpg", server.uri()), "gone.jpg");
        match fetcher.fetch(&att).await {
            Err(FetchError::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn declared_oversize_is_rejected_before_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let fetcher = AttachmentFetcher::new(10);
        let mut att = AttachmentRef::new(format!("{}/big.png", server.uri()), "big.png");
        att.size = Some(11);
        assert!(matches!(
            fetcher.fetch(&att).await,
            Err(FetchError::TooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_host_is_fetch_error() {
        let fetcher = AttachmentFetcher::new(1024);
        let att = AttachmentRef::new("http://127.0.0.1:9/nothing.png", "nothing.png");
        assert!(matches!(fetcher.fetch(&att).await, Err(FetchError::Http(_))));
    }
}
