use url::Url;

use remora::shared::{
    encode_packet, ConnectionConfig, FrameBuffer, IoDevice, IoServer, Packet, TransportFactory,
};
use remora::transport::MemoryNetwork;

/// A hand-driven end of a channel, for feeding a node exact packets and
/// bytes.
pub struct FakePeer {
    device: Box<dyn IoDevice>,
    frames: FrameBuffer,
}

impl FakePeer {
    /// Connects to a node listening at `url` on `network`
    pub fn connect(network: &MemoryNetwork, url: &str) -> Self {
        let url = Url::parse(url).expect("valid url");
        let device = network
            .connect(&url, &ConnectionConfig::default())
            .expect("node is listening");
        Self::from_device(device)
    }

    /// Listens on `url` so a node can connect to this peer
    pub fn listen(network: &MemoryNetwork, url: &str) -> Box<dyn IoServer> {
        let url = Url::parse(url).expect("valid url");
        network
            .listen(&url, &ConnectionConfig::default())
            .expect("address is free")
    }

    pub fn from_device(device: Box<dyn IoDevice>) -> Self {
        Self {
            device,
            frames: FrameBuffer::new(ConnectionConfig::default().max_packet_size),
        }
    }

    pub fn send(&mut self, packet: &Packet) {
        self.send_bytes(&encode_packet(packet));
    }

    pub fn send_bytes(&mut self, bytes: &[u8]) {
        self.device.write(bytes).expect("link is open");
    }

    /// Every packet received so far
    pub fn receive(&mut self) -> Vec<Packet> {
        let mut buffer = [0; 1024];
        while self.device.bytes_available() > 0 {
            let count = self.device.read(&mut buffer).expect("link is readable");
            self.frames.push(&buffer[..count]);
        }
        let mut packets = Vec::new();
        while let Some(packet) = self.frames.next_packet().expect("node sent valid frames") {
            packets.push(packet);
        }
        packets
    }

    pub fn is_open(&self) -> bool {
        self.device.is_open()
    }
}
