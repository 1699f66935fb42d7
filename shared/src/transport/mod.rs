//! The byte-stream boundary a node speaks through.
//!
//! A transport backend provides an [`IoDevice`] per connection and an
//! [`IoServer`] per listening address, created by a [`TransportFactory`]
//! registered for a URL scheme (`tcp`, `local`, ...).

mod error;

pub use error::TransportError;

use url::Url;

use crate::connection_config::ConnectionConfig;

/// Edge-triggered notifications raised by a device since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoNotification {
    /// New bytes became available
    ReadyRead,
    /// The peer closed the stream
    Disconnected,
    /// The stream failed and is no longer usable
    Error(TransportError),
}

/// A connected, ordered byte stream.
pub trait IoDevice {
    fn is_open(&self) -> bool;

    /// Number of bytes that can be read without blocking
    fn bytes_available(&mut self) -> usize;

    /// Reads up to `buffer.len()` bytes, returning how many were read
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError>;

    /// Queues all of `bytes` for delivery
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    fn close(&mut self);

    /// Drains notifications raised since the last call
    fn take_notifications(&mut self) -> Vec<IoNotification>;
}

/// A listening endpoint producing one device per accepted peer.
pub trait IoServer {
    /// The address actually bound, with any wildcard port resolved
    fn url(&self) -> &Url;

    /// Returns the next accepted connection, if one is waiting
    fn accept(&mut self) -> Option<Box<dyn IoDevice>>;

    fn close(&mut self);
}

/// Creates devices and servers for one URL scheme.
pub trait TransportFactory {
    fn connect(
        &self,
        url: &Url,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn IoDevice>, TransportError>;

    fn listen(&self, url: &Url, config: &ConnectionConfig)
        -> Result<Box<dyn IoServer>, TransportError>;
}
