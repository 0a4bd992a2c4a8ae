use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

/// Failure details carried by an unsuccessful response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// Additional metadata about the response
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Number of records in `data` for list endpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
    /// Processing duration in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.metadata.get_or_insert_with(ResponseMetadata::default).total_count = Some(count);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.metadata.get_or_insert_with(ResponseMetadata::default).duration_ms = Some(duration_ms);
        self
    }
}

impl ApiResponse<()> {
    /// Acknowledgement for writes that return no body.
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn failure(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                kind: kind.into(),
                message: message.into(),
            }),
            timestamp: Utc::now(),
            metadata: None,
        }
    }
}

/// Wraps a listing with its record count.
pub fn listing<T: Serialize>(items: Vec<T>) -> ApiResponse<Vec<T>> {
    let count = items.len();
    ApiResponse::success(items).with_count(count)
}
