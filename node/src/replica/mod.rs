mod replica_impl;
mod state;

pub(crate) use replica_impl::{PropertyUpdate, ReplicaImpl};
pub use state::ReplicaState;

use std::{cell::RefCell, rc::Rc};

use remora_shared::{Descriptor, Value};

use crate::{error::NodeError, pending_call::PendingCall};

/// Handle to a replica acquired from a [`Node`](crate::Node).
///
/// Handles acquired under the same name share one implementation and one
/// subscription. The subscription ends when the last handle is dropped.
/// Requests are queued here and sent on the next `Node::receive()`.
#[derive(Clone)]
pub struct Replica {
    inner: Rc<RefCell<ReplicaImpl>>,
}

impl Replica {
    pub(crate) fn new(inner: Rc<RefCell<ReplicaImpl>>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> String {
        self.inner.borrow().name().to_string()
    }

    pub fn state(&self) -> ReplicaState {
        self.inner.borrow().state()
    }

    /// Whether a snapshot was ever received, even if the source was lost since
    pub fn is_initialized(&self) -> bool {
        self.inner.borrow().is_initialized()
    }

    pub fn is_valid(&self) -> bool {
        self.state() == ReplicaState::Valid
    }

    /// Known up front for static replicas, learned on initialization for
    /// dynamic ones
    pub fn descriptor(&self) -> Option<Rc<Descriptor>> {
        self.inner.borrow().descriptor().cloned()
    }

    pub fn property(&self, index: usize) -> Option<Value> {
        self.inner.borrow().values().get(index).cloned()
    }

    pub fn property_by_name(&self, name: &str) -> Option<Value> {
        let inner = self.inner.borrow();
        let index = inner.descriptor()?.property_index(name)?;
        inner.values().get(index).cloned()
    }

    pub fn properties(&self) -> Vec<Value> {
        self.inner.borrow().values().to_vec()
    }

    /// Fire-and-forget method call
    pub fn invoke(&self, index: usize, args: Vec<Value>) -> Result<(), NodeError> {
        self.inner.borrow_mut().queue_invoke(index, args, false)?;
        Ok(())
    }

    /// Method call whose reply is delivered through the returned handle
    pub fn invoke_with_reply(&self, index: usize, args: Vec<Value>) -> Result<PendingCall, NodeError> {
        let call = self.inner.borrow_mut().queue_invoke(index, args, true)?;
        call.ok_or_else(|| NodeError::ReplicaNotValid {
            name: self.name(),
            state: self.state(),
        })
    }

    /// Asks the source to write a property. The cached value changes when
    /// the source reports the new value back.
    pub fn set_property(&self, index: usize, value: Value) -> Result<(), NodeError> {
        self.inner.borrow_mut().queue_write(index, value)
    }

    pub fn shares_implementation(&self, other: &Replica) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Calls awaiting a reply
    pub fn pending_calls(&self) -> usize {
        self.inner.borrow().pending_count()
    }
}
