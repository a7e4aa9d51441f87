// Response envelope: `{"data": T}` on success, `{"error": "..."}` on failure,
// with the HTTP status carrying the error category.

use super::transport::ApiResponse;
use crate::core::{ApiError, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(alias = "message", alias = "detail")]
    error: String,
}

pub(crate) fn decode_data<T: DeserializeOwned>(resource: &str, response: &ApiResponse) -> Result<T> {
    serde_json::from_slice::<DataEnvelope<T>>(&response.body)
        .map(|envelope| envelope.data)
        .map_err(|e| ApiError::decode(resource, e.to_string()))
}

pub(crate) fn decode_error(resource: &str, response: &ApiResponse) -> ApiError {
    let message = serde_json::from_slice::<ErrorEnvelope>(&response.body)
        .map(|envelope| envelope.error)
        .unwrap_or_else(|_| {
            let text = String::from_utf8_lossy(&response.body).trim().to_string();
            if text.is_empty() {
                format!("request failed with status {}", response.status)
            } else {
                text
            }
        });
    ApiError::from_status(response.status, resource, message)
}
