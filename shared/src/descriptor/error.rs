use thiserror::Error;

/// Errors found while building or validating a capability descriptor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// The descriptor has no type name
    #[error("Descriptor type name must not be empty")]
    EmptyTypeName,

    /// Two members of the same kind share a name
    #[error("Duplicate {kind} name '{name}' in descriptor '{type_name}'")]
    DuplicateName {
        type_name: String,
        kind: &'static str,
        name: String,
    },

    /// A property references a notify event that does not exist
    #[error("Property '{property}' references notify event {index}, but the descriptor only has {event_count} events")]
    UnknownNotifyEvent {
        property: String,
        index: usize,
        event_count: usize,
    },

    /// A member references an enumeration, gadget or object type the descriptor
    /// does not declare
    #[error("Descriptor '{type_name}' references undeclared type '{name}'")]
    UnknownType { type_name: String, name: String },
}
