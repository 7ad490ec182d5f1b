//! Request ID generation

use base64::Engine;
use uuid::Uuid;

/// AWS-style request ID
#[derive(Debug, Clone)]
pub struct RequestId {
    /// Primary request ID (x-amzn-RequestId)
    pub id: String,
    /// Extended request ID (x-amz-id-2), base64 encoded
    pub extended_id: String,
}

impl RequestId {
    /// Generate a new request ID pair
    pub fn new() -> Self {
        let id = Uuid::new_v4().simple().to_string().to_uppercase();
        let extended_id =
            base64::engine::general_purpose::STANDARD.encode(Uuid::new_v4().as_bytes());

        Self { id, extended_id }
    }

    /// Create a request ID with a specific value (for testing)
    pub fn with_id(id: impl Into<String>) -> Self {
        let id = id.into();
        let extended_id = base64::engine::general_purpose::STANDARD.encode(id.as_bytes());
        Self { id, extended_id }
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}
