use std::{cell::RefCell, collections::HashMap, rc::Rc};

use remora_shared::Value;
use thiserror::Error;

/// Why a pending call has no return value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CallError {
    /// No reply has arrived yet
    #[error("Call has not finished")]
    InvalidMessage,

    /// The caller stopped waiting; a later reply is discarded
    #[error("Call timed out before a reply arrived")]
    Timeout,

    /// The channel to the source closed before a reply arrived
    #[error("Channel to the source was lost before a reply arrived")]
    Disconnected,

    /// The replica was destroyed before a reply arrived
    #[error("Replica was destroyed before a reply arrived")]
    ReplicaDropped,
}

struct CallState {
    finished: bool,
    value: Option<Value>,
    error: Option<CallError>,
}

/// Handle to the outcome of `Replica::invoke_with_reply`.
///
/// Exactly one outcome is ever recorded: either the reply value or an error.
#[derive(Clone)]
pub struct PendingCall {
    replica_name: Rc<str>,
    serial_id: i32,
    state: Rc<RefCell<CallState>>,
}

impl PendingCall {
    fn new(replica_name: Rc<str>, serial_id: i32) -> Self {
        Self {
            replica_name,
            serial_id,
            state: Rc::new(RefCell::new(CallState {
                finished: false,
                value: None,
                error: Some(CallError::InvalidMessage),
            })),
        }
    }

    pub fn serial_id(&self) -> i32 {
        self.serial_id
    }

    pub fn replica_name(&self) -> &str {
        &self.replica_name
    }

    pub fn is_finished(&self) -> bool {
        self.state.borrow().finished
    }

    pub fn return_value(&self) -> Option<Value> {
        self.state.borrow().value.clone()
    }

    pub fn error(&self) -> Option<CallError> {
        self.state.borrow().error
    }

    pub(crate) fn finish(&self, value: Value) -> bool {
        let mut state = self.state.borrow_mut();
        if state.finished {
            return false;
        }
        state.finished = true;
        state.value = Some(value);
        state.error = None;
        true
    }

    pub(crate) fn fail(&self, error: CallError) -> bool {
        let mut state = self.state.borrow_mut();
        if state.finished {
            return false;
        }
        state.finished = true;
        state.error = Some(error);
        true
    }
}

/// Calls awaiting a reply, keyed by serial id.
///
/// Serial ids start at 1 and wrap back to 1, so 0 (heartbeats) and negative
/// ids ("no reply wanted") are never handed out.
pub(crate) struct PendingCallTable {
    replica_name: Rc<str>,
    next_serial_id: i32,
    calls: HashMap<i32, PendingCall>,
}

impl PendingCallTable {
    pub fn new(replica_name: &str) -> Self {
        Self {
            replica_name: Rc::from(replica_name),
            next_serial_id: 1,
            calls: HashMap::new(),
        }
    }

    fn take_serial_id(&mut self) -> i32 {
        loop {
            let serial_id = self.next_serial_id;
            self.next_serial_id = if serial_id == i32::MAX { 1 } else { serial_id + 1 };
            if !self.calls.contains_key(&serial_id) {
                return serial_id;
            }
        }
    }

    pub fn register(&mut self) -> PendingCall {
        let serial_id = self.take_serial_id();
        let call = PendingCall::new(self.replica_name.clone(), serial_id);
        self.calls.insert(serial_id, call.clone());
        call
    }

    /// Records a reply. Returns false if no call is waiting on this id.
    pub fn resolve(&mut self, serial_id: i32, value: Value) -> bool {
        match self.calls.remove(&serial_id) {
            Some(call) => call.finish(value),
            None => false,
        }
    }

    /// Ends one call with an error. Returns false if no call is waiting on
    /// this id.
    pub fn fail(&mut self, serial_id: i32, error: CallError) -> bool {
        match self.calls.remove(&serial_id) {
            Some(call) => call.fail(error),
            None => false,
        }
    }

    pub fn forget(&mut self, serial_id: i32) -> bool {
        self.calls.remove(&serial_id).is_some()
    }

    pub fn fail_all(&mut self, error: CallError) {
        for (_, call) in self.calls.drain() {
            call.fail(error);
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }
}
