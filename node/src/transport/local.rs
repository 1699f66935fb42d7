use std::{
    fs,
    io::ErrorKind,
    net::Shutdown,
    os::unix::net::{UnixListener, UnixStream},
    path::PathBuf,
};

use log::{info, warn};
use url::Url;

use remora_shared::{ConnectionConfig, IoDevice, IoServer, TransportError, TransportFactory};

use super::{
    address_of,
    stream::{SplitStream, StreamDevice},
};

impl SplitStream for UnixStream {
    fn try_split(&self) -> std::io::Result<Self> {
        self.try_clone()
    }

    fn shutdown(&self) {
        let _ = UnixStream::shutdown(self, Shutdown::Both);
    }
}

/// `local:name` over a unix domain socket. Relative names live in the
/// temporary directory.
pub struct LocalTransport;

fn socket_path(url: &Url) -> Result<PathBuf, TransportError> {
    let address = address_of(url);
    if address.is_empty() {
        return Err(TransportError::InvalidAddress {
            url: url.to_string(),
            reason: "missing socket name".to_string(),
        });
    }
    let path = PathBuf::from(&address);
    Ok(if path.is_absolute() {
        path
    } else {
        std::env::temp_dir().join(path)
    })
}

impl TransportFactory for LocalTransport {
    fn connect(
        &self,
        url: &Url,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn IoDevice>, TransportError> {
        let path = socket_path(url)?;
        let stream = UnixStream::connect(&path).map_err(|error| match error.kind() {
            ErrorKind::NotFound | ErrorKind::ConnectionRefused => {
                TransportError::ConnectionRefused {
                    url: url.to_string(),
                }
            }
            _ => error.into(),
        })?;
        Ok(Box::new(StreamDevice::new(stream, config.read_chunk_size)?))
    }

    fn listen(
        &self,
        url: &Url,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn IoServer>, TransportError> {
        let path = socket_path(url)?;
        if path.exists() {
            if UnixStream::connect(&path).is_ok() {
                return Err(TransportError::AddressInUse {
                    url: url.to_string(),
                });
            }
            warn!("removing stale socket {}", path.display());
            fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        listener.set_nonblocking(true)?;
        info!("local server listening on {}", path.display());

        Ok(Box::new(LocalServer {
            listener: Some(listener),
            path,
            url: url.clone(),
            read_chunk_size: config.read_chunk_size,
        }))
    }
}

pub(crate) struct LocalServer {
    listener: Option<UnixListener>,
    path: PathBuf,
    url: Url,
    read_chunk_size: usize,
}

impl IoServer for LocalServer {
    fn url(&self) -> &Url {
        &self.url
    }

    fn accept(&mut self) -> Option<Box<dyn IoDevice>> {
        let listener = self.listener.as_ref()?;
        match listener.accept() {
            Ok((stream, _)) => match stream
                .set_nonblocking(false)
                .map_err(TransportError::from)
                .and_then(|_| StreamDevice::new(stream, self.read_chunk_size))
            {
                Ok(device) => Some(Box::new(device)),
                Err(error) => {
                    warn!("dropping local peer on {}: {}", self.url, error);
                    None
                }
            },
            Err(error) if error.kind() == ErrorKind::WouldBlock => None,
            Err(error) => {
                warn!("local accept on {} failed: {}", self.url, error);
                None
            }
        }
    }

    fn close(&mut self) {
        if self.listener.take().is_some() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl Drop for LocalServer {
    fn drop(&mut self) {
        self.close();
    }
}
