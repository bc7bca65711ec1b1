//! Upload of a composed body to an HTTP endpoint.

pub mod http;

use std::borrow::Cow;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::fs::File;

use crate::error::Result;

/// Everything the transport needs for one upload.
#[derive(Debug)]
pub struct UploadRequest {
    /// Target endpoint.
    pub url: String,
    /// `multipart/form-data; boundary=...`
    pub content_type: String,
    /// Exact number of bytes `body` yields.
    pub content_length: u64,
    /// Composed body, positioned at offset zero.
    pub body: File,
}

/// Response metadata and body of a completed upload.
///
/// Any HTTP status counts as a completed upload; interpreting it is up to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(skip)]
    pub body: Bytes,
}

impl UploadResponse {
    /// `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, lossily.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Sends a composed body somewhere and reports the response.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Perform exactly one upload attempt.
    async fn upload(&self, request: UploadRequest) -> Result<UploadResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_serializes_without_body() {
        let response = UploadResponse {
            status: 201,
            headers: vec![("location".to_string(), "/m/1".to_string())],
            body: Bytes::from_static(b"created"),
        };
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["status"], 201);
        assert_eq!(value["headers"][0][0], "location");
        assert!(value.get("body").is_none());
        assert!(response.is_success());
        assert_eq!(response.body_text(), "created");
    }
}
