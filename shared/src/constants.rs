/// Version string exchanged in the Handshake packet. Peers with a different
/// string cannot talk to each other.
pub const PROTOCOL_VERSION: &str = "remora 1.0";

/// Object name of the built-in discovery source.
pub const REGISTRY_NAME: &str = "Registry";
