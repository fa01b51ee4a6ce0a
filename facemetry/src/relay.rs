//! Relay client: forwards a frame to a remote analysis instance.
//!
//! Used when `analysis.mode` is `remote`. The frame is re-encoded as JPEG,
//! base64ed and POSTed to the remote `/recognize/` endpoint as
//! `{"image": "<base64>"}`. The round trip is bounded by one configurable
//! timeout; transport failures are classified so callers can tell "upstream
//! slow" (504) from "upstream down" (502) from "upstream returned garbage"
//! (502). No retries are performed.

use std::time::Duration;

use image::RgbImage;
use reqwest::Client;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::api::models::analysis::AnalysisData;
use crate::errors::{Error, Result};
use crate::imaging;

/// Cap on how much of an upstream error body is echoed into responses and
/// logs.
const EXCERPT_LIMIT: usize = 500;

pub struct RelayClient {
    client: Client,
    recognize_url: Url,
    timeout: Duration,
}

impl RelayClient {
    /// Build a client for the analysis service at `base_url`.
    pub fn new(base_url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to create relay HTTP client: {e}"))?;

        let recognize_url = ensure_slash(&base_url)
            .join("recognize/")
            .map_err(|e| anyhow::anyhow!("failed to construct recognize URL: {e}"))?;

        Ok(Self {
            client,
            recognize_url,
            timeout,
        })
    }

    /// Where this client sends frames; handy for wiring tests and logs.
    pub fn endpoint(&self) -> &Url {
        &self.recognize_url
    }

    /// Forward one frame and return the remote analysis result.
    pub async fn analyze(&self, frame: &RgbImage) -> Result<AnalysisData> {
        let encoded = imaging::encode_jpeg_base64(frame)?;
        debug!(url = %self.recognize_url, "relaying frame to analysis service");

        let response = self
            .client
            .post(self.recognize_url.clone())
            .json(&json!({ "image": encoded }))
            .send()
            .await
            .map_err(|e| self.classify_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                Error::RelayTimeout { timeout: self.timeout }
            } else {
                Error::RelayBody {
                    detail: format!("failed to read response body: {e}"),
                }
            }
        })?;

        if !status.is_success() {
            return Err(Error::RelayStatus {
                status: status.as_u16(),
                excerpt: excerpt(&body),
            });
        }

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| Error::RelayBody {
            detail: format!("response is not valid JSON: {e}"),
        })?;
        if !value.is_object() {
            return Err(Error::RelayBody {
                detail: "response is not a JSON object".to_string(),
            });
        }

        serde_json::from_value(value).map_err(|e| Error::RelayBody {
            detail: format!("response shape not understood: {e}"),
        })
    }

    fn classify_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::RelayTimeout { timeout: self.timeout }
        } else if e.is_connect() {
            Error::RelayUnavailable { detail: e.to_string() }
        } else {
            Error::Other(anyhow::anyhow!("relay request failed: {e}"))
        }
    }
}

/// Makes sure a url has a trailing slash, so `join` appends rather than
/// replaces the final path segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

fn excerpt(body: &str) -> String {
    if body.len() <= EXCERPT_LIMIT {
        return body.to_string();
    }
    let mut end = EXCERPT_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
