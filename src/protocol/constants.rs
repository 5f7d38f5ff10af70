//! Wire protocol constants

/// Length prefix size in bytes (u32, big-endian)
pub const FRAME_HEADER_LEN: usize = 4;

/// Default maximum frame body size (1 MiB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Initial read buffer capacity
pub const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Default delivery server port
pub const DEFAULT_PORT: u16 = 7070;
