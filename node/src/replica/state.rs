/// Lifecycle of a replica.
///
/// `Uninitialized` (dynamic) or `Default` (static) until the first snapshot,
/// `Valid` while bound to a live source, `Suspect` after losing it.
/// `SignatureMismatch` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicaState {
    Uninitialized,
    Default,
    Valid,
    Suspect,
    SignatureMismatch,
}

impl ReplicaState {
    pub fn is_terminal(&self) -> bool {
        *self == ReplicaState::SignatureMismatch
    }
}
