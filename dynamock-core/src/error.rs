//! AWS error types and formatting

use serde::Serialize;
use thiserror::Error;

/// Error namespace used in the `__type` field of DynamoDB JSON errors
pub const DYNAMODB_ERROR_PREFIX: &str = "com.amazonaws.dynamodb.v20120810#";

/// Wire error codes understood by DynamoDB clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Request level
    MissingAction,
    SerializationException,
    UnknownOperationException,
    InternalServerError,

    // Resource level
    ResourceNotFoundException,
    ResourceInUseException,
    ValidationException,
    ConditionalCheckFailedException,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingAction => "MissingAction",
            Self::SerializationException => "SerializationException",
            Self::UnknownOperationException => "UnknownOperationException",
            Self::InternalServerError => "InternalServerError",
            Self::ResourceNotFoundException => "ResourceNotFoundException",
            Self::ResourceInUseException => "ResourceInUseException",
            Self::ValidationException => "ValidationException",
            Self::ConditionalCheckFailedException => "ConditionalCheckFailedException",
        }
    }

    /// DynamoDB reports every client fault as 400; only server faults differ.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InternalServerError => 500,
            _ => 400,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AWS-style error
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct AwsError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
}

impl AwsError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Qualified `__type` value, e.g. `com.amazonaws.dynamodb.v20120810#ValidationException`
    pub fn error_type(&self) -> String {
        format!("{}{}", DYNAMODB_ERROR_PREFIX, self.code.as_str())
    }

    /// Format as DynamoDB-style JSON error
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        struct JsonError<'a> {
            #[serde(rename = "__type")]
            error_type: String,
            message: &'a str,
        }

        let error = JsonError {
            error_type: self.error_type(),
            message: &self.message,
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(
                r#"{{"__type":"{}","message":"{}"}}"#,
                self.error_type(),
                self.message.replace('"', "'")
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_json_format() {
        let error = AwsError::new(ErrorCode::ResourceNotFoundException, "Table not found");

        let json = error.to_json();
        assert!(json.contains("com.amazonaws.dynamodb.v20120810#ResourceNotFoundException"));
        assert!(json.contains("Table not found"));
    }

    #[test]
    fn test_error_json_escapes_message() {
        let error = AwsError::new(ErrorCode::ValidationException, r#"bad "token""#);

        let parsed: serde_json::Value = serde_json::from_str(&error.to_json()).unwrap();
        assert_eq!(parsed["message"], r#"bad "token""#);
    }

    #[test]
    fn test_http_status() {
        assert_eq!(ErrorCode::ConditionalCheckFailedException.http_status(), 400);
        assert_eq!(ErrorCode::ResourceNotFoundException.http_status(), 400);
        assert_eq!(ErrorCode::InternalServerError.http_status(), 500);
    }

    #[test]
    fn test_with_request_id() {
        let error = AwsError::new(ErrorCode::ValidationException, "nope").with_request_id("abc");
        assert_eq!(error.request_id, "abc");
        assert_eq!(error.to_string(), "ValidationException: nope");
    }
}
