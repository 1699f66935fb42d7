use thiserror::Error;

/// Errors raised while a source serves a request from a replica
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The live object was dropped; the source is torn down on the next receive
    #[error("Live object behind source '{name}' was dropped")]
    ObjectDropped { name: String },

    /// The live object is mutably borrowed elsewhere
    #[error("Live object behind source '{name}' is already borrowed")]
    ObjectBusy { name: String },

    /// Index does not resolve through the descriptor (signature drift)
    #[error("Source '{name}' has no {kind} at index {index}")]
    IndexOutOfRange {
        name: String,
        kind: &'static str,
        index: i32,
    },

    /// Arguments do not match the declared parameters
    #[error("Arguments for '{member}' on source '{name}' do not match its declaration")]
    ArgumentMismatch { name: String, member: String },
}
