use core::slice;

use tokio::sync::mpsc;
use tracing::warn;
use vigil_core::{AbortNotice, Fragment};

/// Receives the output of a race, in order.
///
/// A race produces either an optional released block followed by live
/// fragments, or exactly one abort notice and nothing else.
pub trait Consumer {
    /// Buffered fragments released in one block when the race clears.
    ///
    /// Not called when the buffer is empty.
    fn on_release(&mut self, block: Vec<Fragment>);

    /// A fragment passed through after the race cleared.
    fn on_fragment(&mut self, fragment: Fragment);

    /// The race was blocked; nothing was or will be delivered.
    fn on_abort(&mut self, notice: AbortNotice);

    /// The stream ended before the verdict and the race is now waiting on it.
    fn on_blocked_wait(&mut self) {}
}

/// One consumer callback, as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// Buffered fragments released together
    Released(Vec<Fragment>),
    /// Live pass-through fragment
    Fragment(Fragment),
    /// Race aborted
    Aborted(AbortNotice),
}

impl GateEvent {
    /// Fragments carried by this event, in delivery order.
    pub fn fragments(&self) -> &[Fragment] {
        match self {
            Self::Released(block) => block,
            Self::Fragment(fragment) => slice::from_ref(fragment),
            Self::Aborted(_) => &[],
        }
    }
}

/// Records every callback in order.
impl Consumer for Vec<GateEvent> {
    fn on_release(&mut self, block: Vec<Fragment>) {
        self.push(GateEvent::Released(block));
    }

    fn on_fragment(&mut self, fragment: Fragment) {
        self.push(GateEvent::Fragment(fragment));
    }

    fn on_abort(&mut self, notice: AbortNotice) {
        self.push(GateEvent::Aborted(notice));
    }
}

/// Channel for forwarding gate events to another task
#[derive(Clone, Debug)]
pub struct EventChannel {
    sender: mpsc::UnboundedSender<GateEvent>,
}

impl EventChannel {
    /// Creates a channel and its receiving end.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GateEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Sends an event through the channel.
    ///
    /// Events are dropped if the receiver has been closed.
    pub fn send(&self, event: GateEvent) {
        if let Err(error) = self.sender.send(event) {
            warn!("Failed to send gate event: {}", error);
        }
    }
}

impl Consumer for EventChannel {
    fn on_release(&mut self, block: Vec<Fragment>) {
        self.send(GateEvent::Released(block));
    }

    fn on_fragment(&mut self, fragment: Fragment) {
        self.send(GateEvent::Fragment(fragment));
    }

    fn on_abort(&mut self, notice: AbortNotice) {
        self.send(GateEvent::Aborted(notice));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_consumer_keeps_order() {
        let mut events: Vec<GateEvent> = Vec::new();
        events.on_release(vec![Fragment::new("a"), Fragment::new("b")]);
        events.on_fragment(Fragment::new("c"));

        let delivered: Vec<&str> = events
            .iter()
            .flat_map(GateEvent::fragments)
            .map(Fragment::as_str)
            .collect();
        assert_eq!(delivered, ["a", "b", "c"]);
    }

    #[test]
    fn test_abort_event_carries_no_fragments() {
        let event = GateEvent::Aborted(AbortNotice::blocked(&[Fragment::new("x")], 10));
        assert!(event.fragments().is_empty());
    }

    #[test]
    fn test_event_channel_forwards() {
        let (mut channel, mut receiver) = EventChannel::new();
        channel.on_fragment(Fragment::new("live"));
        assert_eq!(
            receiver.try_recv().ok(),
            Some(GateEvent::Fragment(Fragment::new("live")))
        );
    }

    #[test]
    fn test_event_channel_closed_receiver_is_ignored() {
        let (mut channel, receiver) = EventChannel::new();
        drop(receiver);
        channel.on_abort(AbortNotice::blocked(&[], 10));
    }
}
