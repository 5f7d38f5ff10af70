//! Notification records
//!
//! A `Notification` is the durable, per-recipient row produced by fan-out.
//! `NewNotification` is the same row before the store has assigned it an id.

use serde::{Deserialize, Serialize};

use crate::event::ContentEvent;

/// Identifier of a user in the identity service
pub type UserId = i64;

/// Store-assigned notification identifier
pub type NotificationId = i64;

/// What kind of action produced a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// A followed user created a piece of content
    Content,
}

impl NotificationType {
    /// Stable name used in storage and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Content => "CONTENT",
        }
    }

    /// Parse a stored name back into a type
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CONTENT" => Some(NotificationType::Content),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Store-assigned id, increasing with insertion order
    pub id: NotificationId,
    /// User whose action produced the notification
    pub origin_user_id: UserId,
    /// Kind of the originating action
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Id of the originating object (e.g. the content id)
    pub type_id: i64,
    /// Short human-readable title
    pub title: String,
    /// The single user this row is addressed to
    pub recipient_user_id: UserId,
    /// Whether the recipient has opened it
    pub opened: bool,
}

/// A notification row that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub origin_user_id: UserId,
    pub kind: NotificationType,
    pub type_id: i64,
    pub title: String,
    pub recipient_user_id: UserId,
    pub opened: bool,
}

impl NewNotification {
    /// Build the unopened row a content event produces for one recipient
    pub fn for_content(event: &ContentEvent, recipient: UserId) -> Self {
        Self {
            origin_user_id: event.origin_user_id,
            kind: NotificationType::Content,
            type_id: event.content_id,
            title: event.title.clone(),
            recipient_user_id: recipient,
            opened: false,
        }
    }

    /// Attach the id assigned by the store
    pub fn into_notification(self, id: NotificationId) -> Notification {
        Notification {
            id,
            origin_user_id: self.origin_user_id,
            kind: self.kind,
            type_id: self.type_id,
            title: self.title,
            recipient_user_id: self.recipient_user_id,
            opened: self.opened,
        }
    }
}
