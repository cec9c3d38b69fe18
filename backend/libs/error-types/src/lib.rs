//! Shared API error body and error code vocabulary.
//!
//! Services map their internal error enums onto [`ErrorResponse`] at the HTTP
//! boundary so every client sees one JSON error shape.

use serde::{Deserialize, Serialize};

/// Uniform JSON error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short reason phrase, e.g. "Forbidden"
    pub error: String,

    /// Human readable description
    pub message: String,

    /// HTTP status code
    pub status: u16,

    /// Error family used by clients for routing, see [`error_types`]
    pub error_type: String,

    /// Stable machine readable code, see [`error_codes`]
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            details: None,
            trace_id: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Reason phrase for a status code.
    pub fn reason_for(status: u16) -> &'static str {
        match status {
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            409 => "Conflict",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Error",
        }
    }
}

/// Stable error codes.
pub mod error_codes {
    // Identity
    pub const TOKEN_MISSING: &str = "TOKEN_MISSING";
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";

    // Messaging
    pub const CONVERSATION_NOT_FOUND: &str = "CONVERSATION_NOT_FOUND";
    pub const MESSAGE_NOT_FOUND: &str = "MESSAGE_NOT_FOUND";
    pub const NOT_CONVERSATION_MEMBER: &str = "NOT_CONVERSATION_MEMBER";
    pub const INVALID_REPLY_REFERENCE: &str = "INVALID_REPLY_REFERENCE";
    pub const INVALID_MESSAGE_STATE: &str = "INVALID_MESSAGE_STATE";

    // Database/System
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
}

/// Error families.
pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const SERVER_ERROR: &str = "server_error";
    pub const SERVICE_UNAVAILABLE_ERROR: &str = "service_unavailable_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_creation() {
        let error = ErrorResponse::new(
            "Not Found",
            "conversation does not exist",
            404,
            error_types::NOT_FOUND_ERROR,
            error_codes::CONVERSATION_NOT_FOUND,
        );

        assert_eq!(error.status, 404);
        assert_eq!(error.error_type, "not_found_error");
        assert_eq!(error.code, "CONVERSATION_NOT_FOUND");
        assert!(error.details.is_none());
    }

    #[test]
    fn test_optional_fields_are_skipped_when_absent() {
        let error = ErrorResponse::new(
            "Forbidden",
            "forbidden",
            403,
            error_types::AUTHORIZATION_ERROR,
            error_codes::NOT_CONVERSATION_MEMBER,
        );
        let json = serde_json::to_value(&error).unwrap();
        assert!(json.get("details").is_none());
        assert!(json.get("trace_id").is_none());

        let json = serde_json::to_value(error.with_trace_id("abc".into())).unwrap();
        assert_eq!(json["trace_id"], "abc");
    }

    #[test]
    fn test_reason_phrases() {
        assert_eq!(ErrorResponse::reason_for(400), "Bad Request");
        assert_eq!(ErrorResponse::reason_for(403), "Forbidden");
        assert_eq!(ErrorResponse::reason_for(418), "Error");
    }
}
