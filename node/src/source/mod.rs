mod directory;
mod error;
mod root_source;
mod source_object;

pub(crate) use directory::SourceDirectory;
pub use error::SourceError;
pub(crate) use root_source::{InvokeOutcome, RootSource};
pub use source_object::{DeferredReply, MethodResult, SourceNotifier, SourceObject};
