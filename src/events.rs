use crate::network::NetworkAddress;
use std::cell::RefCell;
use std::rc::Rc;

/// things the simulation tells whoever is watching (normally the view)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// something about the device changed and it should be redrawn
    DeviceDirty(NetworkAddress),
    InstructionExecuted(NetworkAddress),
    ErrorRaised {
        device: NetworkAddress,
        message: String,
    },
    PuzzleSolved,
}

type Listener = Box<dyn FnMut(&Event)>;

/// Observer list owned by a puzzle and handed to each of its devices.
/// Delivery is synchronous, in subscription order. Listeners must not
/// subscribe or emit from inside a callback.
#[derive(Default)]
pub struct EventBus {
    listeners: RefCell<Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Rc<Self> {
        Rc::new(EventBus::default())
    }

    pub fn subscribe(&self, listener: impl FnMut(&Event) + 'static) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    pub fn emit(&self, event: Event) {
        for listener in self.listeners.borrow_mut().iter_mut() {
            listener(&event);
        }
    }

    /// subscribe a listener that just keeps everything it hears
    pub fn record(&self) -> Rc<RefCell<Vec<Event>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        self.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        log
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    /// drop every listener
    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.len())
            .finish()
    }
}
