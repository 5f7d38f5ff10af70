//! Delivery client connection
//!
//! # Example
//! ```no_run
//! use fanout_rs::client::DeliveryClient;
//! use fanout_rs::service::ListRequest;
//!
//! # async fn example() -> fanout_rs::error::Result<()> {
//! let mut client = DeliveryClient::connect("127.0.0.1:7070", "token-b").await?;
//! let page = client.list(ListRequest::first(2).limit(20)).await?;
//! println!("{} notifications", page.notifications.len());
//!
//! let mut stream = client.subscribe().await?;
//! while let Some(notification) = stream.next().await? {
//!     println!("{}: {}", notification.origin_user_id, notification.title);
//! }
//! # Ok(())
//! # }
//! ```

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::{Error, Result};
use crate::notification::{Notification, NotificationId};
use crate::protocol::{FrameReader, FrameWriter, ProtocolError, Request, Response};
use crate::service::{ListRequest, Page};

/// Connection to a delivery server, authenticated by a bearer token
pub struct DeliveryClient {
    token: String,
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl DeliveryClient {
    /// Connect to a delivery server
    pub async fn connect(addr: impl ToSocketAddrs, token: impl Into<String>) -> Result<Self> {
        let socket = TcpStream::connect(addr).await?;
        socket.set_nodelay(true)?;
        let (read_half, write_half) = socket.into_split();

        Ok(Self {
            token: token.into(),
            reader: FrameReader::new(read_half),
            writer: FrameWriter::new(write_half),
        })
    }

    /// Fetch one page of history
    pub async fn list(&mut self, request: ListRequest) -> Result<Page> {
        let response = self
            .call(Request::List {
                token: self.token.clone(),
                recipient: request.recipient,
                before: request.before,
                limit: request.limit,
            })
            .await?;

        match response {
            Response::Page {
                notifications,
                next_before,
            } => Ok(Page {
                notifications,
                next_before,
            }),
            other => Err(unexpected(&other)),
        }
    }

    /// Set the read flag of one notification
    pub async fn mark_opened(&mut self, id: NotificationId, opened: bool) -> Result<()> {
        let response = self
            .call(Request::MarkOpened {
                token: self.token.clone(),
                id,
                opened,
            })
            .await?;

        match response {
            Response::Ack => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Turn this connection into a live stream
    ///
    /// An authentication failure is reported by the first call to
    /// [`NotificationStream::next`].
    pub async fn subscribe(mut self) -> Result<NotificationStream> {
        self.writer
            .write(&Request::Subscribe {
                token: self.token.clone(),
            })
            .await?;

        Ok(NotificationStream {
            reader: self.reader,
            _writer: self.writer,
        })
    }

    async fn call(&mut self, request: Request) -> Result<Response> {
        self.writer.write(&request).await?;
        match self.reader.read::<Response>().await? {
            Some(Response::Status { code, message }) => Err(Error::Status { code, message }),
            Some(response) => Ok(response),
            None => Err(ProtocolError::UnexpectedEof.into()),
        }
    }
}

/// Live notifications for the authenticated user
pub struct NotificationStream {
    reader: FrameReader<OwnedReadHalf>,
    // Dropping the write half would signal a disconnect to the server.
    _writer: FrameWriter<OwnedWriteHalf>,
}

impl NotificationStream {
    /// Wait for the next notification
    ///
    /// Returns `Ok(None)` when the server closes the stream without a status,
    /// and [`Error::Status`] when it ends the stream with one.
    pub async fn next(&mut self) -> Result<Option<Notification>> {
        match self.reader.read::<Response>().await? {
            Some(Response::Notification { notification }) => Ok(Some(notification)),
            Some(Response::Status { code, message }) => Err(Error::Status { code, message }),
            Some(other) => Err(unexpected(&other)),
            None => Ok(None),
        }
    }
}

fn unexpected(response: &Response) -> Error {
    ProtocolError::UnexpectedMessage(format!("unexpected {} response", response.kind())).into()
}
