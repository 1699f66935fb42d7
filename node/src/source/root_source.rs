use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use log::{debug, warn};

use remora_shared::{
    Descriptor, InvokeCall, ObjectInfo, Packet, SourceLocation, Value, NO_SERIAL_ID,
};

use crate::connection::ChannelKey;

use super::{
    error::SourceError,
    source_object::{DeferredReply, MethodResult, SourceNotifier, SourceObject, SourceSignal},
};

pub(crate) enum InvokeOutcome {
    Reply(Value),
    Deferred(DeferredReply),
    None,
}

/// A live object enabled for remoting under one name, with the channels
/// subscribed to it.
pub(crate) struct RootSource {
    name: String,
    descriptor: Rc<Descriptor>,
    object: Weak<RefCell<dyn SourceObject>>,
    notifier: SourceNotifier,
    listeners: Vec<ChannelKey>,
}

impl RootSource {
    pub fn new(
        name: &str,
        descriptor: Descriptor,
        object: &Rc<RefCell<dyn SourceObject>>,
    ) -> Result<Self, SourceError> {
        let notifier = SourceNotifier::new();
        object
            .try_borrow_mut()
            .map_err(|_| SourceError::ObjectBusy {
                name: name.to_string(),
            })?
            .attach(notifier.clone());

        Ok(Self {
            name: name.to_string(),
            descriptor: Rc::new(descriptor),
            object: Rc::downgrade(object),
            notifier,
            listeners: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_alive(&self) -> bool {
        self.object.strong_count() > 0
    }

    pub fn object_info(&self) -> ObjectInfo {
        ObjectInfo {
            name: self.name.clone(),
            type_name: self.descriptor.type_name().to_string(),
            signature: self.descriptor.signature(),
        }
    }

    pub fn location(&self, url: &str) -> SourceLocation {
        SourceLocation::new(&self.name, self.descriptor.type_name(), url)
    }

    pub fn listeners(&self) -> &[ChannelKey] {
        &self.listeners
    }

    /// Subscribes a channel and returns the Init or InitDynamic packet to
    /// send it. A channel already subscribed gets a fresh snapshot but is
    /// not added twice.
    pub fn add_listener(&mut self, key: ChannelKey, dynamic: bool) -> Result<Packet, SourceError> {
        let values = self.snapshot()?;
        if !self.listeners.contains(&key) {
            self.listeners.push(key);
        }

        Ok(if dynamic {
            Packet::InitDynamic {
                name: self.name.clone(),
                descriptor: (*self.descriptor).clone(),
                values,
            }
        } else {
            Packet::Init {
                name: self.name.clone(),
                values,
            }
        })
    }

    /// Returns how many listeners remain.
    pub fn remove_listener(&mut self, key: ChannelKey) -> usize {
        self.listeners.retain(|listener| *listener != key);
        self.listeners.len()
    }

    pub fn snapshot(&self) -> Result<Vec<Value>, SourceError> {
        let object = self.upgrade()?;
        let object = object.try_borrow().map_err(|_| self.busy())?;
        Ok((0..self.descriptor.property_count())
            .map(|index| object.property(index))
            .collect())
    }

    /// Turns queued notifications into PropertyChange and event Invoke
    /// packets for every listener.
    pub fn take_signal_packets(&mut self) -> Result<Vec<Packet>, SourceError> {
        let signals = self.notifier.take();
        if signals.is_empty() {
            return Ok(Vec::new());
        }

        let object = self.upgrade()?;
        let object = object.try_borrow().map_err(|_| self.busy())?;
        let mut packets = Vec::new();

        for signal in signals {
            match signal {
                SourceSignal::PropertyChanged(index) => {
                    let Some(property) = self.descriptor.property(index) else {
                        warn!("source '{}' reported change of unknown property {}", self.name, index);
                        continue;
                    };
                    let Some(notify) = property.notify else {
                        debug!("source '{}' property '{}' does not notify", self.name, property.name);
                        continue;
                    };
                    let value = object.property(index);
                    packets.push(Packet::PropertyChange {
                        name: self.name.clone(),
                        index: index as i32,
                        value: value.clone(),
                    });
                    let args = match self.descriptor.event(notify) {
                        Some(event) if event.params.len() == 1 => vec![value],
                        _ => Vec::new(),
                    };
                    packets.push(event_packet(&self.name, notify, args));
                }
                SourceSignal::Event { index, args } => {
                    if self.descriptor.event(index).is_none() {
                        warn!("source '{}' emitted unknown event {}", self.name, index);
                        continue;
                    }
                    packets.push(event_packet(&self.name, index, args));
                }
            }
        }

        Ok(packets)
    }

    /// Applies an Invoke packet from a replica to the live object.
    pub fn handle_invoke(
        &mut self,
        call: InvokeCall,
        index: i32,
        args: Vec<Value>,
    ) -> Result<InvokeOutcome, SourceError> {
        let object = self.upgrade()?;
        let mut object = object.try_borrow_mut().map_err(|_| self.busy())?;

        match call {
            InvokeCall::WriteProperty => {
                let slot = self.resolve_property(index)?;
                let property = &self.descriptor.properties()[slot];
                let mut args = args.into_iter();
                let (Some(value), None) = (args.next(), args.next()) else {
                    return Err(self.mismatch(&property.name));
                };
                if !self.descriptor.accepts(&property.value_type, &value) {
                    return Err(self.mismatch(&property.name));
                }
                if object.set_property(slot, value) {
                    self.notifier.property_changed(slot);
                }
                Ok(InvokeOutcome::None)
            }
            InvokeCall::ReadProperty => {
                let slot = self.resolve_property(index)?;
                Ok(InvokeOutcome::Reply(object.property(slot)))
            }
            InvokeCall::InvokeMethod => {
                let slot = usize::try_from(index)
                    .ok()
                    .filter(|slot| *slot < self.descriptor.methods().len())
                    .ok_or_else(|| self.out_of_range("method", index))?;
                let method = &self.descriptor.methods()[slot];
                let arity_ok = method.params.len() == args.len();
                let typed_ok = args
                    .iter()
                    .zip(&method.params)
                    .all(|(arg, value_type)| self.descriptor.accepts(value_type, arg));
                if !arity_ok || !typed_ok {
                    return Err(self.mismatch(&method.name));
                }
                Ok(match object.invoke(slot, args) {
                    MethodResult::Return(value) => InvokeOutcome::Reply(value),
                    MethodResult::Deferred(reply) => InvokeOutcome::Deferred(reply),
                })
            }
        }
    }

    fn resolve_property(&self, index: i32) -> Result<usize, SourceError> {
        usize::try_from(index)
            .ok()
            .filter(|slot| *slot < self.descriptor.property_count())
            .ok_or_else(|| self.out_of_range("property", index))
    }

    fn upgrade(&self) -> Result<Rc<RefCell<dyn SourceObject>>, SourceError> {
        self.object.upgrade().ok_or_else(|| SourceError::ObjectDropped {
            name: self.name.clone(),
        })
    }

    fn busy(&self) -> SourceError {
        SourceError::ObjectBusy {
            name: self.name.clone(),
        }
    }

    fn out_of_range(&self, kind: &'static str, index: i32) -> SourceError {
        SourceError::IndexOutOfRange {
            name: self.name.clone(),
            kind,
            index,
        }
    }

    fn mismatch(&self, member: &str) -> SourceError {
        SourceError::ArgumentMismatch {
            name: self.name.clone(),
            member: member.to_string(),
        }
    }
}

fn event_packet(name: &str, index: usize, args: Vec<Value>) -> Packet {
    Packet::Invoke {
        name: name.to_string(),
        call: InvokeCall::InvokeMethod,
        index: index as i32,
        args,
        serial_id: NO_SERIAL_ID,
        property_index: -1,
    }
}
