//! Delivery wire protocol
//!
//! Length-delimited JSON frames over a byte stream. See [`message`] for the
//! request and response shapes and [`frame`] for the framing.

pub mod constants;
pub mod error;
pub mod frame;
pub mod message;
pub mod status;

pub use error::ProtocolError;
pub use frame::{FrameReader, FrameWriter};
pub use message::{Request, Response};
pub use status::StatusCode;
