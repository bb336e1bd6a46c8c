//! Translation of Docker engine responses into `SyncerError` values

use crate::error::SyncerError;
use reqwest::StatusCode;
use serde::Deserialize;

/// Error body returned by the Docker engine on non-2xx responses
#[derive(Debug, Deserialize)]
struct EngineErrorBody {
    message: String,
}

/// Standard error handler for Docker engine HTTP responses
pub struct EngineErrorHandler;

impl EngineErrorHandler {
    /// Extract the `message` field from an engine error body, falling back to the raw text
    pub fn extract_message(body: &str) -> String {
        match serde_json::from_str::<EngineErrorBody>(body) {
            Ok(parsed) => parsed.message,
            Err(_) => {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    "no error message returned".to_string()
                } else {
                    trimmed.to_string()
                }
            }
        }
    }

    /// Map an engine status and body to an error for the given operation
    pub fn handle_engine_error(status: StatusCode, body: &str, operation: &str) -> SyncerError {
        let message = Self::extract_message(body);
        let error_msg = match status.as_u16() {
            400 => format!("bad parameter for {}: {}", operation, message),
            401 => format!("unauthorized to {}: {}", operation, message),
            403 => format!("forbidden to {}: {}", operation, message),
            404 => format!("no such image for {}: {}", operation, message),
            409 => format!("conflict during {}: {}", operation, message),
            500 => format!("engine server error during {}: {}", operation, message),
            502 | 503 => format!("engine unavailable for {}: {}", operation, message),
            _ => format!("{} failed (status {}): {}", operation, status, message),
        };

        SyncerError::Engine(error_msg)
    }

    /// Categorize transport failures against the engine
    pub fn handle_network_error(error: reqwest::Error, endpoint: &str, operation: &str) -> SyncerError {
        if error.is_connect() {
            SyncerError::EngineUnreachable {
                endpoint: endpoint.to_string(),
                message: error.to_string(),
            }
        } else if error.is_timeout() {
            SyncerError::Engine(format!("{} timed out: {}", operation, error))
        } else {
            SyncerError::Engine(format!("{} network error: {}", operation, error))
        }
    }
}
