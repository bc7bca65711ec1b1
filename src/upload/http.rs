//! `reqwest`-backed upload transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, Url};
use tracing::info;

use crate::error::{Result, UploadError};
use crate::upload::{UploadRequest, UploadResponse, UploadTransport};

/// POSTs the composed body with an explicit `Content-Length`. No retries.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport with an optional overall request timeout.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| UploadError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client))
    }

    /// Use a preconfigured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn upload(&self, request: UploadRequest) -> Result<UploadResponse> {
        let url = Url::parse(&request.url)
            .map_err(|e| UploadError::Transport(format!("invalid URL '{}': {e}", request.url)))?;

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, request.content_type)
            .header(CONTENT_LENGTH, request.content_length)
            .body(Body::from(request.body))
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?;
        info!(
            url = %request.url,
            status,
            response_bytes = body.len(),
            "Upload finished"
        );

        Ok(UploadResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use httpmock::MockServer;

    async fn body_file(contents: &[u8]) -> (tempfile::TempDir, tokio::fs::File) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("body");
        std::fs::write(&path, contents).expect("write body");
        let file = tokio::fs::File::open(&path).await.expect("open body");
        (tmp, file)
    }

    #[tokio::test]
    async fn test_posts_body_with_length_and_type() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/upload")
                .header("content-type", "multipart/form-data; boundary=B")
                .header("content-length", "5")
                .body("hello");
            then.status(201).body("stored");
        });

        let (_tmp, body) = body_file(b"hello").await;
        let transport = HttpTransport::new(Some(Duration::from_secs(10))).expect("client");
        let response = transport
            .upload(UploadRequest {
                url: server.url("/upload"),
                content_type: "multipart/form-data; boundary=B".to_string(),
                content_length: 5,
                body,
            })
            .await
            .expect("upload");

        mock.assert();
        assert_eq!(response.status, 201);
        assert!(response.is_success());
        assert_eq!(response.body_text(), "stored");
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/upload");
            then.status(500).body("nope");
        });

        let (_tmp, body) = body_file(b"x").await;
        let transport = HttpTransport::new(None).expect("client");
        let response = transport
            .upload(UploadRequest {
                url: server.url("/upload"),
                content_type: "multipart/form-data; boundary=B".to_string(),
                content_length: 1,
                body,
            })
            .await
            .expect("upload");
        assert_eq!(response.status, 500);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_invalid_url_is_transport_error() {
        let (_tmp, body) = body_file(b"x").await;
        let transport = HttpTransport::new(None).expect("client");
        let err = transport
            .upload(UploadRequest {
                url: "not a url".to_string(),
                content_type: "multipart/form-data; boundary=B".to_string(),
                content_length: 1,
                body,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "transport");
    }
}
