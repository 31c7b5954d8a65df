//! Crate-wide error type for driver operations.
//!
//! Every failure is locally contained and reported as a value; nothing in
//! the driver panics or aborts on a bad frame or a silent sensor.

/// All ways a driver operation can fail.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Frame-level validation failed (byte count, checksum or write echo).
    #[error(transparent)]
    Protocol(#[from] crate::protocol::Error),

    /// The underlying transport reported an I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The expected byte count did not arrive before the response deadline.
    /// Whatever partial buffer had accumulated is discarded.
    #[error("response timeout: expected {expected} bytes, received {received}")]
    Timeout { expected: usize, received: usize },
}

/// The result type of all driver operations.
pub type Result<T> = std::result::Result<T, Error>;
