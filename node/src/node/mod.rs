mod node;
pub use node::Node;

mod node_config;
pub use node_config::NodeConfig;

mod client;
mod discovery;
mod host;
mod maintenance;
