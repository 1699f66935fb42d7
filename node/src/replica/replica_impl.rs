use std::rc::Rc;

use remora_shared::{Descriptor, InvokeCall, Packet, Value, NO_SERIAL_ID};

use crate::{
    error::NodeError,
    pending_call::{CallError, PendingCall, PendingCallTable},
};

use super::state::ReplicaState;

/// What became of a PropertyChange from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PropertyUpdate {
    Applied,
    UnknownIndex,
    WrongType,
}

/// State shared by every `Replica` handle acquired under one name.
pub(crate) struct ReplicaImpl {
    name: String,
    state: ReplicaState,
    dynamic: bool,
    descriptor: Option<Rc<Descriptor>>,
    values: Vec<Value>,
    initialized: bool,
    outbox: Vec<Packet>,
    pending: PendingCallTable,
}

impl ReplicaImpl {
    pub fn new_static(name: &str, descriptor: Descriptor) -> Self {
        let values = descriptor.default_values();
        Self {
            name: name.to_string(),
            state: ReplicaState::Default,
            dynamic: false,
            descriptor: Some(Rc::new(descriptor)),
            values,
            initialized: false,
            outbox: Vec::new(),
            pending: PendingCallTable::new(name),
        }
    }

    pub fn new_dynamic(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: ReplicaState::Uninitialized,
            dynamic: true,
            descriptor: None,
            values: Vec::new(),
            initialized: false,
            outbox: Vec::new(),
            pending: PendingCallTable::new(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ReplicaState {
        self.state
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn descriptor(&self) -> Option<&Rc<Descriptor>> {
        self.descriptor.as_ref()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the transition, or `None` if nothing changed. Nothing leaves
    /// `SignatureMismatch`.
    pub fn set_state(&mut self, state: ReplicaState) -> Option<(ReplicaState, ReplicaState)> {
        if self.state == state || self.state.is_terminal() {
            return None;
        }
        let old = self.state;
        self.state = state;
        Some((old, state))
    }

    /// Binds the descriptor learned from an InitDynamic packet. Returns false
    /// if a different descriptor was bound before.
    pub fn set_descriptor(&mut self, descriptor: Rc<Descriptor>) -> bool {
        match &self.descriptor {
            Some(current) if **current != *descriptor => false,
            _ => {
                self.descriptor = Some(descriptor);
                true
            }
        }
    }

    /// Replaces the whole cache and returns the indices whose value differs
    /// from the previous cache.
    pub fn initialize(&mut self, values: Vec<Value>) -> Vec<usize> {
        let changed = values
            .iter()
            .enumerate()
            .filter(|(index, value)| self.values.get(*index) != Some(*value))
            .map(|(index, _)| index)
            .collect();
        self.values = values;
        self.initialized = true;
        changed
    }

    /// Whether `values` is a complete, well typed snapshot for the bound
    /// descriptor
    pub fn accepts_snapshot(&self, values: &[Value]) -> bool {
        self.descriptor
            .as_ref()
            .map_or(false, |descriptor| descriptor.accepts_values(values))
    }

    /// Stores a changed value unless the slot is unknown or declared with
    /// another type.
    pub fn apply_property_change(&mut self, index: usize, value: Value) -> PropertyUpdate {
        let Some(descriptor) = self.descriptor.as_ref() else {
            return PropertyUpdate::UnknownIndex;
        };
        let Some(property) = descriptor.property(index) else {
            return PropertyUpdate::UnknownIndex;
        };
        if !descriptor.accepts(&property.value_type, &value) {
            return PropertyUpdate::WrongType;
        }
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                PropertyUpdate::Applied
            }
            None => PropertyUpdate::UnknownIndex,
        }
    }

    pub fn resolve_reply(&mut self, serial_id: i32, value: Value) -> bool {
        self.pending.resolve(serial_id, value)
    }

    pub fn fail_call(&mut self, serial_id: i32, error: CallError) -> bool {
        self.pending.fail(serial_id, error)
    }

    pub fn forget_call(&mut self, serial_id: i32) -> bool {
        self.pending.forget(serial_id)
    }

    pub fn fail_pending(&mut self, error: CallError) {
        self.pending.fail_all(error);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn take_outbox(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outbox)
    }

    /// Queues a method call, registering a pending call first if a reply is
    /// wanted.
    pub fn queue_invoke(
        &mut self,
        index: usize,
        args: Vec<Value>,
        wants_reply: bool,
    ) -> Result<Option<PendingCall>, NodeError> {
        let descriptor = self.valid_descriptor()?;
        let method = descriptor
            .method(index)
            .ok_or_else(|| self.out_of_range("method", index))?;
        let arity_ok = method.params.len() == args.len();
        let typed_ok = args
            .iter()
            .zip(&method.params)
            .all(|(arg, value_type)| descriptor.accepts(value_type, arg));
        if !arity_ok || !typed_ok {
            return Err(NodeError::ArgumentMismatch {
                name: self.name.clone(),
                member: method.name.clone(),
            });
        }

        let call = wants_reply.then(|| self.pending.register());
        self.outbox.push(Packet::Invoke {
            name: self.name.clone(),
            call: InvokeCall::InvokeMethod,
            index: index as i32,
            args,
            serial_id: call.as_ref().map_or(NO_SERIAL_ID, PendingCall::serial_id),
            property_index: -1,
        });
        Ok(call)
    }

    /// Queues a property write. The cache is only updated when the source
    /// echoes the change.
    pub fn queue_write(&mut self, index: usize, value: Value) -> Result<(), NodeError> {
        let descriptor = self.valid_descriptor()?;
        let property = descriptor
            .property(index)
            .ok_or_else(|| self.out_of_range("property", index))?;
        if !descriptor.accepts(&property.value_type, &value) {
            return Err(NodeError::ArgumentMismatch {
                name: self.name.clone(),
                member: property.name.clone(),
            });
        }

        self.outbox.push(Packet::Invoke {
            name: self.name.clone(),
            call: InvokeCall::WriteProperty,
            index: index as i32,
            args: vec![value],
            serial_id: NO_SERIAL_ID,
            property_index: index as i32,
        });
        Ok(())
    }

    fn valid_descriptor(&self) -> Result<Rc<Descriptor>, NodeError> {
        match (&self.descriptor, self.state) {
            (Some(descriptor), ReplicaState::Valid) => Ok(descriptor.clone()),
            _ => Err(NodeError::ReplicaNotValid {
                name: self.name.clone(),
                state: self.state,
            }),
        }
    }

    fn out_of_range(&self, kind: &'static str, index: usize) -> NodeError {
        NodeError::IndexOutOfRange {
            name: self.name.clone(),
            kind,
            index,
        }
    }
}

impl Drop for ReplicaImpl {
    fn drop(&mut self) {
        self.pending.fail_all(CallError::ReplicaDropped);
    }
}
