use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use remora_shared::Value;

/// An object whose state is replicated to remote nodes.
///
/// Indices follow the [`Descriptor`](remora_shared::Descriptor) the object
/// was enabled with. The node never calls back into the object while one of
/// these methods is running.
pub trait SourceObject {
    /// Called once when the object is enabled for remoting. Keep the notifier
    /// to report local property changes and events.
    fn attach(&mut self, notifier: SourceNotifier) {
        let _ = notifier;
    }

    fn property(&self, index: usize) -> Value;

    /// Stores a value written by a replica. Returns whether the stored value
    /// changed; the node broadcasts the change itself.
    fn set_property(&mut self, index: usize, value: Value) -> bool;

    fn invoke(&mut self, index: usize, args: Vec<Value>) -> MethodResult;
}

pub enum MethodResult {
    Return(Value),
    /// The reply is sent once the `DeferredReply` is completed
    Deferred(DeferredReply),
}

impl From<Value> for MethodResult {
    fn from(value: Value) -> Self {
        MethodResult::Return(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SourceSignal {
    PropertyChanged(usize),
    Event { index: usize, args: Vec<Value> },
}

/// Queues property changes and events raised by a live object. The node
/// drains the queue on every `receive()`.
#[derive(Clone)]
pub struct SourceNotifier {
    queue: Rc<RefCell<VecDeque<SourceSignal>>>,
}

impl SourceNotifier {
    pub(crate) fn new() -> Self {
        Self {
            queue: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Reports that the property at `index` changed; its current value is
    /// read back from the object when broadcasting.
    pub fn property_changed(&self, index: usize) {
        self.queue
            .borrow_mut()
            .push_back(SourceSignal::PropertyChanged(index));
    }

    pub fn emit(&self, event_index: usize, args: Vec<Value>) {
        self.queue.borrow_mut().push_back(SourceSignal::Event {
            index: event_index,
            args,
        });
    }

    pub(crate) fn take(&self) -> Vec<SourceSignal> {
        self.queue.borrow_mut().drain(..).collect()
    }
}

/// A method result that arrives later.
///
/// Return a clone in `MethodResult::Deferred` and call `complete` on the one
/// you keep. Only the first value is used. Dropping every kept clone without
/// completing abandons the reply.
#[derive(Clone, Default)]
pub struct DeferredReply {
    slot: Rc<RefCell<Option<Value>>>,
    completed: Rc<RefCell<bool>>,
}

impl DeferredReply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete(&self, value: Value) {
        let mut completed = self.completed.borrow_mut();
        if *completed {
            return;
        }
        *completed = true;
        *self.slot.borrow_mut() = Some(value);
    }

    pub fn is_complete(&self) -> bool {
        *self.completed.borrow()
    }

    pub(crate) fn take(&self) -> Option<Value> {
        self.slot.borrow_mut().take()
    }

    /// No clone other than this one is left to complete it
    pub(crate) fn is_abandoned(&self) -> bool {
        !self.is_complete() && Rc::strong_count(&self.slot) == 1
    }
}
