use thiserror::Error;

/// Errors that can occur while opening or using a byte-stream transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No transport is registered for the URL scheme
    #[error("No transport registered for url scheme '{scheme}'")]
    UnsupportedScheme { scheme: String },

    /// The URL cannot be mapped to an address for its scheme
    #[error("Invalid address in url '{url}': {reason}")]
    InvalidAddress { url: String, reason: String },

    /// Nothing is listening at the address
    #[error("Connection to '{url}' was refused")]
    ConnectionRefused { url: String },

    /// Something is already listening at the address
    #[error("Address '{url}' is already in use")]
    AddressInUse { url: String },

    /// The device was closed locally or by the peer
    #[error("Device is closed")]
    Closed,

    /// The operating system reported an I/O failure
    #[error("I/O error: {reason}")]
    Io { reason: String },
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::UnexpectedEof => TransportError::Closed,
            _ => TransportError::Io {
                reason: error.to_string(),
            },
        }
    }
}
