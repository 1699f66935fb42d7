use thiserror::Error;

/// Errors that can occur while decoding bytes received from a peer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerdeErr {
    /// The payload ended before the value was complete
    #[error("Unexpected end of payload: needed {needed} more bytes but only {remaining} remain")]
    UnexpectedEnd { needed: usize, remaining: usize },

    /// A string field did not contain valid UTF-8
    #[error("String field is not valid UTF-8")]
    InvalidUtf8,

    /// A tag or enum discriminant had no known meaning (possible malformed or malicious data)
    #[error("Invalid {what} tag {tag} (possible malformed or malicious data)")]
    InvalidTag { what: &'static str, tag: i64 },

    /// Nested values exceeded the supported depth
    #[error("Nested value depth exceeds the maximum of {max}")]
    NestingTooDeep { max: usize },
}
