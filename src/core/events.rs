use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Typed fan-out channel between components.
///
/// Every subscriber gets its own unbounded queue and sees events in emission
/// order. Subscribers that dropped their receiver are pruned on the next emit.
pub struct EventBus<T: Clone> {
    listeners: Vec<UnboundedSender<T>>,
}

impl<T: Clone> EventBus<T> {
    pub fn new() -> Self {
        Self { listeners: Vec::new() }
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.push(tx);
        rx
    }

    pub fn emit(&mut self, event: T) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Takes everything currently queued on a receiver without blocking.
pub fn drain<T>(receiver: &mut UnboundedReceiver<T>) -> Vec<T> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
