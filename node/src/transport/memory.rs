use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::Rc,
};

use log::info;
use url::Url;

use remora_shared::{
    ConnectionConfig, IoDevice, IoNotification, IoServer, TransportError, TransportFactory,
};

use super::address_of;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Client,
    Host,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::Client => 0,
            Side::Host => 1,
        }
    }

    fn peer(self) -> Side {
        match self {
            Side::Client => Side::Host,
            Side::Host => Side::Client,
        }
    }
}

struct Link {
    address: String,
    /// Bytes waiting to be read, indexed by the reading side
    inboxes: [VecDeque<u8>; 2],
    open: bool,
    frozen: bool,
}

#[derive(Default)]
struct NetworkState {
    listeners: HashMap<String, VecDeque<MemoryDevice>>,
    links: HashMap<u64, Link>,
    next_link: u64,
    fragment_size: Option<usize>,
}

/// An in-process network for `mem:` URLs.
///
/// Every clone shares the same endpoints, so two nodes registering clones of
/// one network can reach each other. Links can be frozen to simulate a hung
/// peer or severed to simulate a dropped connection.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Rc<RefCell<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_listening(&self, address: &str) -> bool {
        self.state.borrow().listeners.contains_key(address)
    }

    /// Open links to `address`
    pub fn connection_count(&self, address: &str) -> usize {
        self.state
            .borrow()
            .links
            .values()
            .filter(|link| link.open && link.address == address)
            .count()
    }

    /// Stops delivering bytes on every link to `address` until thawed.
    /// Writes are still buffered. Returns how many links were frozen.
    pub fn freeze(&self, address: &str) -> usize {
        self.set_frozen(address, true)
    }

    pub fn thaw(&self, address: &str) -> usize {
        self.set_frozen(address, false)
    }

    /// Drops every link to `address` as if the peer vanished. Returns how
    /// many links were severed.
    pub fn sever(&self, address: &str) -> usize {
        let mut state = self.state.borrow_mut();
        let mut count = 0;
        for link in state.links.values_mut() {
            if link.open && link.address == address {
                link.open = false;
                count += 1;
            }
        }
        count
    }

    /// Limits every read to at most `size` bytes, so frames arrive in pieces
    pub fn set_fragment_size(&self, size: Option<usize>) {
        self.state.borrow_mut().fragment_size = size.map(|size| size.max(1));
    }

    fn set_frozen(&self, address: &str, frozen: bool) -> usize {
        let mut state = self.state.borrow_mut();
        let mut count = 0;
        for link in state.links.values_mut() {
            if link.open && link.address == address {
                link.frozen = frozen;
                count += 1;
            }
        }
        count
    }
}

impl TransportFactory for MemoryNetwork {
    fn connect(
        &self,
        url: &Url,
        _config: &ConnectionConfig,
    ) -> Result<Box<dyn IoDevice>, TransportError> {
        let address = address_of(url);
        let mut state = self.state.borrow_mut();
        if !state.listeners.contains_key(&address) {
            return Err(TransportError::ConnectionRefused {
                url: url.to_string(),
            });
        }

        let link = state.next_link;
        state.next_link += 1;
        state.links.insert(
            link,
            Link {
                address: address.clone(),
                inboxes: [VecDeque::new(), VecDeque::new()],
                open: true,
                frozen: false,
            },
        );

        let host = MemoryDevice::new(&self.state, link, Side::Host);
        if let Some(queue) = state.listeners.get_mut(&address) {
            queue.push_back(host);
        }
        Ok(Box::new(MemoryDevice::new(&self.state, link, Side::Client)))
    }

    fn listen(
        &self,
        url: &Url,
        _config: &ConnectionConfig,
    ) -> Result<Box<dyn IoServer>, TransportError> {
        let address = address_of(url);
        let mut state = self.state.borrow_mut();
        if state.listeners.contains_key(&address) {
            return Err(TransportError::AddressInUse {
                url: url.to_string(),
            });
        }
        state.listeners.insert(address.clone(), VecDeque::new());
        info!("memory server listening on {}", url);

        Ok(Box::new(MemoryServer {
            state: self.state.clone(),
            address,
            url: url.clone(),
            open: true,
        }))
    }
}

struct MemoryDevice {
    state: Rc<RefCell<NetworkState>>,
    link: u64,
    side: Side,
    closed: bool,
    reported_disconnect: bool,
}

impl MemoryDevice {
    fn new(state: &Rc<RefCell<NetworkState>>, link: u64, side: Side) -> Self {
        Self {
            state: state.clone(),
            link,
            side,
            closed: false,
            reported_disconnect: false,
        }
    }

    fn link_open(&self) -> bool {
        self.state
            .borrow()
            .links
            .get(&self.link)
            .map_or(false, |link| link.open)
    }
}

impl IoDevice for MemoryDevice {
    fn is_open(&self) -> bool {
        !self.closed && self.link_open()
    }

    fn bytes_available(&mut self) -> usize {
        let state = self.state.borrow();
        match state.links.get(&self.link) {
            Some(link) if !link.frozen => link.inboxes[self.side.index()].len(),
            _ => 0,
        }
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.state.borrow_mut();
        let fragment = state.fragment_size.unwrap_or(usize::MAX);
        let Some(link) = state.links.get_mut(&self.link) else {
            return Err(TransportError::Closed);
        };
        if link.frozen {
            return Ok(0);
        }
        let inbox = &mut link.inboxes[self.side.index()];
        let count = buffer.len().min(inbox.len()).min(fragment);
        for (slot, byte) in buffer.iter_mut().zip(inbox.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut state = self.state.borrow_mut();
        match state.links.get_mut(&self.link) {
            Some(link) if link.open => {
                link.inboxes[self.side.peer().index()].extend(bytes);
                Ok(())
            }
            _ => Err(TransportError::Closed),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.state.borrow_mut();
        let peer_closed = match state.links.get_mut(&self.link) {
            Some(link) => {
                let peer_closed = !link.open;
                link.open = false;
                peer_closed
            }
            None => false,
        };
        // both ends gone
        if peer_closed {
            state.links.remove(&self.link);
        }
    }

    fn take_notifications(&mut self) -> Vec<IoNotification> {
        let mut notifications = Vec::new();
        if self.bytes_available() > 0 {
            notifications.push(IoNotification::ReadyRead);
        }
        if !self.closed && !self.reported_disconnect && !self.link_open() {
            self.reported_disconnect = true;
            notifications.push(IoNotification::Disconnected);
        }
        notifications
    }
}

impl Drop for MemoryDevice {
    fn drop(&mut self) {
        self.close();
    }
}

struct MemoryServer {
    state: Rc<RefCell<NetworkState>>,
    address: String,
    url: Url,
    open: bool,
}

impl IoServer for MemoryServer {
    fn url(&self) -> &Url {
        &self.url
    }

    fn accept(&mut self) -> Option<Box<dyn IoDevice>> {
        if !self.open {
            return None;
        }
        let device = self
            .state
            .borrow_mut()
            .listeners
            .get_mut(&self.address)?
            .pop_front()?;
        Some(Box::new(device))
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let pending = self.state.borrow_mut().listeners.remove(&self.address);
        // dropping unaccepted devices closes their links
        drop(pending);
    }
}

impl Drop for MemoryServer {
    fn drop(&mut self) {
        self.close();
    }
}
