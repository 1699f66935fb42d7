use std::{
    io::ErrorKind,
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
};

use log::{info, warn};
use url::Url;

use remora_shared::{ConnectionConfig, IoDevice, IoServer, TransportError, TransportFactory};

use super::stream::{SplitStream, StreamDevice};

impl SplitStream for TcpStream {
    fn try_split(&self) -> std::io::Result<Self> {
        self.try_clone()
    }

    fn shutdown(&self) {
        let _ = TcpStream::shutdown(self, Shutdown::Both);
    }
}

/// `tcp://host:port`
pub struct TcpTransport;

fn socket_address(url: &Url) -> Result<SocketAddr, TransportError> {
    let invalid = |reason: &str| TransportError::InvalidAddress {
        url: url.to_string(),
        reason: reason.to_string(),
    };
    if url.port().is_none() {
        return Err(invalid("missing port"));
    }
    url.socket_addrs(|| None)
        .map_err(|error| invalid(&error.to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| invalid("host did not resolve"))
}

impl TransportFactory for TcpTransport {
    fn connect(
        &self,
        url: &Url,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn IoDevice>, TransportError> {
        let address = socket_address(url)?;
        let stream = TcpStream::connect_timeout(&address, config.connect_timeout).map_err(
            |error| match error.kind() {
                ErrorKind::ConnectionRefused | ErrorKind::TimedOut => {
                    TransportError::ConnectionRefused {
                        url: url.to_string(),
                    }
                }
                _ => error.into(),
            },
        )?;
        stream.set_nodelay(true)?;
        Ok(Box::new(StreamDevice::new(stream, config.read_chunk_size)?))
    }

    fn listen(
        &self,
        url: &Url,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn IoServer>, TransportError> {
        let address = socket_address(url)?;
        let listener = TcpListener::bind(address).map_err(|error| match error.kind() {
            ErrorKind::AddrInUse => TransportError::AddressInUse {
                url: url.to_string(),
            },
            _ => error.into(),
        })?;
        listener.set_nonblocking(true)?;

        let mut bound = url.clone();
        let port = listener.local_addr()?.port();
        bound
            .set_port(Some(port))
            .map_err(|_| TransportError::InvalidAddress {
                url: url.to_string(),
                reason: "cannot carry a port".to_string(),
            })?;
        info!("tcp server listening on {}", bound);

        Ok(Box::new(TcpServer {
            listener: Some(listener),
            url: bound,
            read_chunk_size: config.read_chunk_size,
        }))
    }
}

pub(crate) struct TcpServer {
    listener: Option<TcpListener>,
    url: Url,
    read_chunk_size: usize,
}

impl IoServer for TcpServer {
    fn url(&self) -> &Url {
        &self.url
    }

    fn accept(&mut self) -> Option<Box<dyn IoDevice>> {
        let listener = self.listener.as_ref()?;
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let device = stream
                        .set_nonblocking(false)
                        .and_then(|_| stream.set_nodelay(true))
                        .map_err(TransportError::from)
                        .and_then(|_| StreamDevice::new(stream, self.read_chunk_size));
                    match device {
                        Ok(device) => return Some(Box::new(device)),
                        Err(error) => warn!("dropping tcp peer {}: {}", peer, error),
                    }
                }
                Err(error) if error.kind() == ErrorKind::WouldBlock => return None,
                Err(error) => {
                    warn!("tcp accept on {} failed: {}", self.url, error);
                    return None;
                }
            }
        }
    }

    fn close(&mut self) {
        self.listener = None;
    }
}
