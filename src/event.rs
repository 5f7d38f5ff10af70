//! Content-created events
//!
//! The content service publishes one `ContentEvent` per created item. Payloads are
//! JSON objects. Older producers emit protobuf-JSON, which renders 64-bit integers
//! as strings and uses `userOrigin`/`typeId` field names, so both spellings and
//! both integer forms are accepted.

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};

use crate::notification::UserId;

/// Error decoding or encoding an event payload
#[derive(Debug)]
pub enum EventError {
    /// Payload had no bytes
    Empty,
    /// Payload was not a valid event object
    Json(serde_json::Error),
    /// Originating user id is not a valid user
    InvalidOrigin(UserId),
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventError::Empty => write!(f, "Empty event payload"),
            EventError::Json(e) => write!(f, "Malformed event payload: {}", e),
            EventError::InvalidOrigin(id) => write!(f, "Invalid origin user id: {}", id),
        }
    }
}

impl std::error::Error for EventError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EventError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for EventError {
    fn from(e: serde_json::Error) -> Self {
        EventError::Json(e)
    }
}

/// A content item was created by `origin_user_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEvent {
    /// Author of the content
    #[serde(alias = "userOrigin", deserialize_with = "int64")]
    pub origin_user_id: UserId,
    /// Id of the created content
    #[serde(alias = "typeId", alias = "tweetId", deserialize_with = "int64")]
    pub content_id: i64,
    /// Title shown in the notification
    #[serde(default)]
    pub title: String,
}

impl ContentEvent {
    pub fn new(origin_user_id: UserId, content_id: i64, title: impl Into<String>) -> Self {
        Self {
            origin_user_id,
            content_id,
            title: title.into(),
        }
    }

    /// Decode a raw broker payload
    pub fn decode(payload: &[u8]) -> Result<Self, EventError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Err(EventError::Empty);
        }

        let event: ContentEvent = serde_json::from_slice(payload)?;
        if event.origin_user_id <= 0 {
            return Err(EventError::InvalidOrigin(event.origin_user_id));
        }

        Ok(event)
    }

    /// Encode into the canonical payload form
    pub fn encode(&self) -> Result<Bytes, EventError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

fn int64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(i64),
        Text(String),
    }

    match Int64::deserialize(deserializer)? {
        Int64::Number(n) => Ok(n),
        Int64::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_canonical() {
        let event =
            ContentEvent::decode(br#"{"originUserId":1,"contentId":10,"title":"hello"}"#).unwrap();

        assert_eq!(event, ContentEvent::new(1, 10, "hello"));
    }

    #[test]
    fn test_decode_protobuf_json() {
        let event =
            ContentEvent::decode(br#"{"userOrigin":"12","typeId":"99","title":"hi"}"#).unwrap();

        assert_eq!(event.origin_user_id, 12);
        assert_eq!(event.content_id, 99);
        assert_eq!(event.title, "hi");
    }

    #[test]
    fn test_decode_missing_title_defaults_empty() {
        let event = ContentEvent::decode(br#"{"originUserId":3,"contentId":4}"#).unwrap();
        assert_eq!(event.title, "");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(ContentEvent::decode(b"not json"), Err(EventError::Json(_))));
        assert!(matches!(ContentEvent::decode(b""), Err(EventError::Empty)));
        assert!(matches!(ContentEvent::decode(b"  \n"), Err(EventError::Empty)));
        assert!(matches!(
            ContentEvent::decode(br#"{"originUserId":"abc","contentId":1}"#),
            Err(EventError::Json(_))
        ));
        assert!(matches!(
            ContentEvent::decode(br#"{"contentId":1,"title":"x"}"#),
            Err(EventError::Json(_))
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_origin() {
        let result = ContentEvent::decode(br#"{"originUserId":0,"contentId":1}"#);
        assert!(matches!(result, Err(EventError::InvalidOrigin(0))));
    }

    #[test]
    fn test_encode_uses_canonical_names() {
        let payload = ContentEvent::new(5, 6, "t").encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(value["originUserId"], 5);
        assert_eq!(value["contentId"], 6);
        assert_eq!(ContentEvent::decode(&payload).unwrap(), ContentEvent::new(5, 6, "t"));
    }
}
