use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::error::{CloudError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Uploads and bulk downloads move multi-megabyte image buffers.
const BULK_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP boundary used by the client.
///
/// Object-safe so tests and embedders can substitute their own
/// implementation; all URLs are absolute by the time they reach here.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and parse the response body as JSON.
    async fn get(&self, url: &str, bearer: Option<&str>) -> Result<Value>;

    /// POST a JSON `body` to `url` and parse the response body as JSON.
    async fn post(&self, url: &str, body: Value, bearer: Option<&str>) -> Result<Value>;

    /// PUT raw bytes to a (typically pre-signed) URL. No bearer token.
    async fn put(&self, url: &str, data: Vec<u8>) -> Result<()>;

    /// Download raw bytes from an absolute URL.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// [`Transport`] over a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(http: Client) -> Self {
        Self { http }
    }

    fn authorized(builder: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
        match bearer {
            Some(token) if !token.is_empty() => builder.bearer_auth(token),
            _ => builder,
        }
    }

    async fn send(builder: RequestBuilder, context: &str) -> Result<reqwest::Response> {
        let resp = builder.send().await.map_err(|e| CloudError::Network {
            context: context.to_string(),
            source: e,
        })?;

        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    async fn json_body(resp: reqwest::Response, context: &str) -> Result<Value> {
        resp.json().await.map_err(|e| CloudError::Network {
            context: context.to_string(),
            source: e,
        })
    }
}

/// Build the typed error for a non-success status, pulling a message and
/// structured data out of the body when it is JSON.
fn status_error(status: u16, body: &str) -> CloudError {
    let data: Option<Value> = serde_json::from_str(body).ok();
    let message = data
        .as_ref()
        .and_then(|d| d.get("error"))
        .and_then(|e| e.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("server returned HTTP {status}")
            } else {
                body.trim().to_string()
            }
        });
    CloudError::Http {
        status,
        message,
        data,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, bearer: Option<&str>) -> Result<Value> {
        let builder = Self::authorized(self.http.get(url), bearer).timeout(REQUEST_TIMEOUT);
        let resp = Self::send(builder, &format!("GET {url} failed")).await?;
        Self::json_body(resp, &format!("failed to parse response from {url}")).await
    }

    async fn post(&self, url: &str, body: Value, bearer: Option<&str>) -> Result<Value> {
        let builder = Self::authorized(self.http.post(url), bearer)
            .timeout(REQUEST_TIMEOUT)
            .json(&body);
        let resp = Self::send(builder, &format!("POST {url} failed")).await?;
        Self::json_body(resp, &format!("failed to parse response from {url}")).await
    }

    async fn put(&self, url: &str, data: Vec<u8>) -> Result<()> {
        let builder = self.http.put(url).timeout(BULK_TIMEOUT).body(data);
        Self::send(builder, &format!("PUT {url} failed")).await?;
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let builder = self.http.get(url).timeout(BULK_TIMEOUT);
        let resp = Self::send(builder, &format!("download from {url} failed")).await?;
        let bytes = resp.bytes().await.map_err(|e| CloudError::Network {
            context: format!("failed to read download body from {url}"),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_with_json_body() {
        let err = status_error(402, r#"{"error": "payment required", "credits": 5, "cost": 3}"#);
        match err {
            CloudError::Http {
                status,
                message,
                data,
            } => {
                assert_eq!(status, 402);
                assert_eq!(message, "payment required");
                let data = data.unwrap();
                assert_eq!(data["credits"], 5);
                assert_eq!(data["cost"], 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_status_error_with_plain_body() {
        let err = status_error(500, "internal server error\n");
        match err {
            CloudError::Http {
                status,
                message,
                data,
            } => {
                assert_eq!(status, 500);
                assert_eq!(message, "internal server error");
                assert!(data.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_status_error_with_empty_body() {
        let err = status_error(401, "");
        assert_eq!(err.to_string(), "server returned HTTP 401");
    }

    #[test]
    fn test_status_error_json_without_error_field() {
        let err = status_error(400, r#"{"detail": "nope"}"#);
        match err {
            CloudError::Http { message, data, .. } => {
                assert_eq!(message, r#"{"detail": "nope"}"#);
                assert!(data.is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
