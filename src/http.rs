//! HTTP plumbing shared by the completion and retrieval clients.

use std::time::Duration;

use reqwest::{Client as ReqwestClient, Response};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Builds a `reqwest` client with the given overall timeout.
pub(crate) fn build_client(timeout: Duration) -> Result<ReqwestClient> {
    ReqwestClient::builder().timeout(timeout).build().map_err(|e| {
        Error::http_client(
            format!("Failed to build HTTP client: {e}"),
            Some(Box::new(e)),
        )
    })
}

/// Maps a transport failure from `reqwest` into our error type.
pub(crate) fn request_error(e: reqwest::Error, timeout: Duration) -> Error {
    if e.is_timeout() {
        Error::timeout(
            format!("Request timed out: {e}"),
            Some(timeout.as_secs_f64()),
        )
    } else if e.is_connect() {
        Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
    } else {
        Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
    }
}

/// Process API response errors and convert to our Error type.
///
/// Understands the `{"error": {"type", "message", "param"}}` body of OpenAI-compatible
/// services and the flat `{"message": ...}` body of Pinecone; anything else is reported
/// verbatim.
pub(crate) async fn error_from_response(response: Response) -> Error {
    let status_code = response.status().as_u16();

    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .map(String::from);

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.parse::<u64>().ok());

    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
        message: Option<String>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
        param: Option<String>,
    }

    let error_body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return Error::http_client(
                format!("Failed to read error response: {e}"),
                Some(Box::new(e)),
            );
        }
    };

    let parsed = serde_json::from_str::<ErrorResponse>(&error_body).ok();
    let flat_message = parsed.as_ref().and_then(|e| e.message.clone());
    let detail = parsed.and_then(|e| e.error);
    let error_type = detail.as_ref().and_then(|e| e.error_type.clone());
    let error_message = detail
        .as_ref()
        .and_then(|e| e.message.clone())
        .or(flat_message)
        .unwrap_or_else(|| error_body.clone());
    let error_param = detail.and_then(|e| e.param);

    match status_code {
        400 | 422 => Error::bad_request(error_message, error_param),
        401 => Error::authentication(error_message),
        403 => Error::permission(error_message),
        404 => Error::not_found(error_message),
        408 => Error::timeout(error_message, None),
        429 => Error::rate_limit(error_message, retry_after),
        500 => Error::internal_server(error_message, request_id),
        502..=504 => Error::service_unavailable(error_message, retry_after),
        _ => Error::api(status_code, error_type, error_message, request_id),
    }
}
