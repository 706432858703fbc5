//! Thin `reqwest` wrapper shared by every node call: builds the client once
//! with sane pool/timeout defaults, stamps every request with a trace id and
//! bearer token, and maps transport/status-code failures onto
//! [`FederationError`] so the forwarder's retry predicate can branch on them
//! without re-parsing status codes itself.

use crate::auth::TokenSigner;
use crate::federation_error::FederationError;
use bytes::Bytes;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("request build failed: {0}")]
    Build(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// HTTP client used for every outbound call to a node.
pub struct HttpClient {
    client: reqwest::Client,
    signer: TokenSigner,
}

impl HttpClient {
    pub fn new(call_timeout: Duration, signer: TokenSigner) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(call_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client config is valid");
        Self { client, signer }
    }

    #[cfg(test)]
    pub(crate) fn with_client(client: reqwest::Client, signer: TokenSigner) -> Self {
        Self { client, signer }
    }

    /// POST `body` as JSON to `url` and decode the response as JSON,
    /// translating transport/status failures into [`FederationError`].
    pub async fn post_json<Req, Resp>(
        &self,
        node_slug: &str,
        url: &str,
        body: &Req,
    ) -> Result<Resp, FederationError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let trace_id = Uuid::new_v4();
        let token = self.signer.issue(node_slug);

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .header("X-Trace-Id", trace_id.to_string())
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(node_slug, &e))?;

        self.into_federation_result(node_slug, response).await
    }

    /// POST `body` and stream the response back as newline-delimited JSON,
    /// invoking `on_line` for each decoded object as it arrives rather than
    /// buffering the whole body (mirrors how a long chat completion or bulk
    /// ingest progress stream is consumed).
    pub async fn post_streaming<Req, Line>(
        &self,
        node_slug: &str,
        url: &str,
        body: &Req,
        mut on_line: impl FnMut(Line),
    ) -> Result<(), FederationError>
    where
        Req: Serialize,
        Line: DeserializeOwned,
    {
        let trace_id = Uuid::new_v4();
        let token = self.signer.issue(node_slug);

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .header("X-Trace-Id", trace_id.to_string())
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(node_slug, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error(node_slug, status, response).await);
        }

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk: Bytes = chunk.map_err(|e| self.transport_error(node_slug, &e))?;
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line = buffer.drain(..=pos).collect::<Vec<u8>>();
                let line = &line[..line.len().saturating_sub(1)];
                let trimmed = std::str::from_utf8(line).unwrap_or("").trim();
                if trimmed.is_empty() {
                    continue;
                }
                if let Ok(parsed) = serde_json::from_str::<Line>(trimmed) {
                    on_line(parsed);
                }
            }
        }

        Ok(())
    }

    async fn into_federation_result<Resp>(
        &self,
        node_slug: &str,
        response: reqwest::Response,
    ) -> Result<Resp, FederationError>
    where
        Resp: DeserializeOwned,
    {
        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error(node_slug, status, response).await);
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| FederationError::transient(node_slug, format!("malformed response body: {e}")))
    }

    async fn status_error(
        &self,
        node_slug: &str,
        status: reqwest::StatusCode,
        response: reqwest::Response,
    ) -> FederationError {
        let body = response.text().await.unwrap_or_default();
        let code = status.as_u16();

        if code == 401 || code == 403 {
            return FederationError::auth(node_slug, body);
        }
        if code == 429 {
            let retry_after = response_retry_after(&body).unwrap_or(Duration::from_secs(1));
            return FederationError::rate_limited(node_slug, retry_after);
        }
        if status.is_server_error() {
            return FederationError::transient(node_slug, format!("{code}: {body}"));
        }
        FederationError::permanent(node_slug, code, body)
    }

    fn transport_error(&self, node_slug: &str, error: &reqwest::Error) -> FederationError {
        if error.is_timeout() || error.is_connect() {
            FederationError::transient(node_slug, error.to_string())
        } else {
            FederationError::permanent(node_slug, 0, error.to_string())
        }
    }
}

/// Best-effort `Retry-After`-style hint parsed out of a JSON error body
/// (`{"retry_after_secs": N}`), since plain-text bodies carry no header.
fn response_retry_after(body: &str) -> Option<Duration> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("retry_after_secs")
        .and_then(|v| v.as_u64())
        .map(Duration::from_secs)
}
