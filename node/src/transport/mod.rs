//! Transport backends and the per-node registry that picks one by URL
//! scheme.

mod memory;
mod stream;
mod tcp;

cfg_if! {
    if #[cfg(unix)] {
        mod local;
        pub use local::LocalTransport;
    }
}

pub use memory::MemoryNetwork;
pub use tcp::TcpTransport;

use std::collections::HashMap;

use log::info;
use url::Url;

use remora_shared::{ConnectionConfig, IoDevice, IoServer, TransportError, TransportFactory};

/// Transport factories keyed by URL scheme.
pub struct TransportRegistry {
    factories: HashMap<String, Box<dyn TransportFactory>>,
}

impl TransportRegistry {
    /// A registry without any backend
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// `tcp`, plus `local` on unix
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("tcp", Box::new(TcpTransport));
        #[cfg(unix)]
        registry.register("local", Box::new(LocalTransport));
        registry
    }

    /// Registers a factory, replacing any previous one for the scheme
    pub fn register(&mut self, scheme: &str, factory: Box<dyn TransportFactory>) {
        info!("transport registered for scheme '{}'", scheme);
        self.factories.insert(scheme.to_string(), factory);
    }

    pub fn supports(&self, scheme: &str) -> bool {
        self.factories.contains_key(scheme)
    }

    pub fn connect(
        &self,
        url: &Url,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn IoDevice>, TransportError> {
        self.factory(url)?.connect(url, config)
    }

    pub fn listen(
        &self,
        url: &Url,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn IoServer>, TransportError> {
        self.factory(url)?.listen(url, config)
    }

    fn factory(&self, url: &Url) -> Result<&dyn TransportFactory, TransportError> {
        self.factories
            .get(url.scheme())
            .map(|factory| factory.as_ref())
            .ok_or_else(|| TransportError::UnsupportedScheme {
                scheme: url.scheme().to_string(),
            })
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Endpoint name of a URL without a socket address: `mem:alpha`,
/// `mem://alpha` and `local:alpha` all name `alpha`.
pub(crate) fn address_of(url: &Url) -> String {
    match url.host_str() {
        Some(host) => format!("{}{}", host, url.path()),
        None => url.path().to_string(),
    }
}
