//! Status codes reported to delivery clients

use serde::{Deserialize, Serialize};

/// Outcome class of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    Unavailable,
    ResourceExhausted,
    Internal,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_display() {
        for code in [
            StatusCode::InvalidArgument,
            StatusCode::Unauthenticated,
            StatusCode::PermissionDenied,
            StatusCode::NotFound,
            StatusCode::Unavailable,
            StatusCode::ResourceExhausted,
            StatusCode::Internal,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code));
        }
    }
}
