use std::{
    collections::VecDeque,
    io::{ErrorKind, Read, Write},
    thread,
};

use log::debug;
use smol::channel::{self, Receiver, Sender, TryRecvError};

use remora_shared::{IoDevice, IoNotification, TransportError};

/// A blocking stream that can be cloned into a read half for a background
/// thread.
pub(crate) trait SplitStream: Read + Write + Send + Sized + 'static {
    fn try_split(&self) -> std::io::Result<Self>;

    fn shutdown(&self);
}

enum StreamMessage {
    Data(Box<[u8]>),
    Closed,
    Failed(TransportError),
}

/// Device over a blocking stream. A reader thread forwards incoming bytes
/// through a channel that the node drains without blocking.
pub(crate) struct StreamDevice<S: SplitStream> {
    stream: S,
    receiver: Receiver<StreamMessage>,
    pending: VecDeque<u8>,
    notifications: Vec<IoNotification>,
    open: bool,
}

impl<S: SplitStream> StreamDevice<S> {
    pub fn new(stream: S, read_chunk_size: usize) -> Result<Self, TransportError> {
        let reader = stream.try_split()?;
        let (sender, receiver) = channel::unbounded();
        let chunk = read_chunk_size.max(1);
        thread::spawn(move || read_loop(reader, sender, chunk));

        Ok(Self {
            stream,
            receiver,
            pending: VecDeque::new(),
            notifications: Vec::new(),
            open: true,
        })
    }

    fn pump(&mut self) {
        loop {
            match self.receiver.try_recv() {
                Ok(StreamMessage::Data(bytes)) => {
                    self.pending.extend(bytes.iter());
                    self.notifications.push(IoNotification::ReadyRead);
                }
                Ok(StreamMessage::Closed) | Err(TryRecvError::Closed) => {
                    if self.open {
                        self.open = false;
                        self.notifications.push(IoNotification::Disconnected);
                    }
                    break;
                }
                Ok(StreamMessage::Failed(error)) => {
                    if self.open {
                        self.open = false;
                        self.notifications.push(IoNotification::Error(error));
                    }
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }
    }
}

fn read_loop<S: Read>(mut reader: S, sender: Sender<StreamMessage>, chunk: usize) {
    let mut buffer = vec![0; chunk];
    loop {
        let message = match reader.read(&mut buffer) {
            Ok(0) => StreamMessage::Closed,
            Ok(count) => StreamMessage::Data(buffer[..count].into()),
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => StreamMessage::Failed(error.into()),
        };
        let last = !matches!(message, StreamMessage::Data(_));
        if sender.send_blocking(message).is_err() || last {
            debug!("stream reader finished");
            return;
        }
    }
}

impl<S: SplitStream> IoDevice for StreamDevice<S> {
    fn is_open(&self) -> bool {
        self.open
    }

    fn bytes_available(&mut self) -> usize {
        self.pump();
        self.pending.len()
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        self.pump();
        let count = buffer.len().min(self.pending.len());
        for (slot, byte) in buffer.iter_mut().zip(self.pending.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.stream.shutdown();
        }
    }

    fn take_notifications(&mut self) -> Vec<IoNotification> {
        self.pump();
        std::mem::take(&mut self.notifications)
    }
}

impl<S: SplitStream> Drop for StreamDevice<S> {
    fn drop(&mut self) {
        self.close();
    }
}
