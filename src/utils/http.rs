use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;

use crate::{ImagegateError, Result};

const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;
pub(crate) const MAX_RESPONSE_BODY_BYTES: usize = 16 * 1024 * 1024;

pub(crate) fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// What a bounded read does once the body passes its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overflow {
    /// Keep the prefix. Used for error bodies, which only feed messages.
    Truncate,
    /// Fail the call. Used for payloads the caller will decode.
    Reject,
}

/// Streams at most `max_bytes` of the body. The flag reports truncation.
async fn read_bounded(
    response: reqwest::Response,
    max_bytes: usize,
    overflow: Overflow,
) -> Result<(Vec<u8>, bool)> {
    let mut out = Vec::<u8>::new();
    let mut stream = response.bytes_stream();
    while let Some(next) = stream.next().await {
        let chunk = match next {
            Ok(chunk) => chunk,
            Err(_) if overflow == Overflow::Truncate => break,
            Err(err) => return Err(err.into()),
        };
        let room = max_bytes.saturating_sub(out.len());
        if chunk.len() > room {
            if overflow == Overflow::Reject {
                return Err(ImagegateError::InvalidResponse(format!(
                    "response exceeded max bytes ({max_bytes})"
                )));
            }
            out.extend_from_slice(&chunk[..room]);
            return Ok((out, true));
        }
        out.extend_from_slice(&chunk);
    }
    Ok((out, false))
}

/// Turns a non-success response into [`ImagegateError::Api`] carrying the
/// upstream status and the start of its body.
async fn upstream_error(response: reqwest::Response) -> ImagegateError {
    let status = response.status();
    let body = match read_bounded(response, MAX_ERROR_BODY_BYTES, Overflow::Truncate).await {
        Ok((bytes, truncated)) => {
            let mut body = String::from_utf8_lossy(&bytes).into_owned();
            if truncated {
                body.push_str(if body.is_empty() {
                    "...(truncated)"
                } else {
                    "\n...(truncated)"
                });
            }
            body
        }
        Err(_) => String::new(),
    };
    ImagegateError::Api { status, body }
}

pub(crate) async fn send_checked(req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
    let response = req.send().await?;
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(upstream_error(response).await)
    }
}

pub(crate) async fn send_checked_json<T: DeserializeOwned>(
    req: reqwest::RequestBuilder,
) -> Result<T> {
    let bytes = send_checked_bytes(req, MAX_RESPONSE_BODY_BYTES).await?;
    Ok(serde_json::from_slice::<T>(&bytes)?)
}

/// Sends the request and returns the raw body, bounded by `max_bytes`.
pub(crate) async fn send_checked_bytes(
    req: reqwest::RequestBuilder,
    max_bytes: usize,
) -> Result<Bytes> {
    let response = send_checked(req).await?;
    let (bytes, _) = read_bounded(response, max_bytes, Overflow::Reject).await?;
    Ok(Bytes::from(bytes))
}
