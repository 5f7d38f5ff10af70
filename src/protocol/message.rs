//! Request and response messages
//!
//! Every frame body is one JSON object. Requests are tagged by `op`, responses
//! by `type`:
//!
//! ```text
//! -> {"op":"subscribe","token":"t-b"}
//! <- {"type":"notification","notification":{"id":1,"origin_user_id":1,...}}
//!
//! -> {"op":"list","token":"t-b","recipient":2,"limit":20}
//! <- {"type":"page","notifications":[...],"next_before":41}
//!
//! -> {"op":"mark_opened","token":"t-b","id":41,"opened":true}
//! <- {"type":"ack"}
//!
//! <- {"type":"status","code":"UNAUTHENTICATED","message":"..."}
//! ```

use serde::{Deserialize, Serialize};

use crate::notification::{Notification, NotificationId, UserId};

use super::status::StatusCode;

/// Client to server message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Turn the connection into a live stream for the caller
    Subscribe { token: String },

    /// Fetch one page of a recipient's history, newest first
    List {
        token: String,
        recipient: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        before: Option<NotificationId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },

    /// Set the read flag of one of the caller's notifications
    MarkOpened {
        token: String,
        id: NotificationId,
        opened: bool,
    },
}

impl Request {
    /// Bearer token carried by the request
    pub fn token(&self) -> &str {
        match self {
            Request::Subscribe { token }
            | Request::List { token, .. }
            | Request::MarkOpened { token, .. } => token,
        }
    }

    /// Operation name, for logging
    pub fn op(&self) -> &'static str {
        match self {
            Request::Subscribe { .. } => "subscribe",
            Request::List { .. } => "list",
            Request::MarkOpened { .. } => "mark_opened",
        }
    }
}

/// Server to client message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// One live notification on a subscribed connection
    Notification { notification: Notification },

    /// Answer to `list`
    Page {
        notifications: Vec<Notification>,
        /// Pass as `before` to fetch the next page; absent on the last page
        #[serde(default)]
        next_before: Option<NotificationId>,
    },

    /// Answer to `mark_opened`
    Ack,

    /// Request failed, or a subscription ended
    Status { code: StatusCode, message: String },
}

impl Response {
    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        Response::Status {
            code,
            message: message.into(),
        }
    }

    /// Message type name, for logging and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Notification { .. } => "notification",
            Response::Page { .. } => "page",
            Response::Ack => "ack",
            Response::Status { .. } => "status",
        }
    }
}
