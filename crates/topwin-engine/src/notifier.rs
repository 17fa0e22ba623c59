//! In-process broadcast of "state may have changed, re-read it" signals.

use tokio::sync::broadcast;

/// Payload-free change marker. Listeners re-read
/// [`Coordinator::current_state`](crate::Coordinator::current_state) rather
/// than trusting any value carried here.
#[derive(Debug, Clone, Copy)]
pub struct StateChanged;

/// Broadcast, not a queue: no history, no replay, no cross-process
/// durability. A receiver dropped (or never created) simply misses the
/// signal and must re-read state on its own resume.
#[derive(Clone)]
pub struct StateNotifier {
    /// Underlying broadcast sender; receivers are subscriptions.
    tx: broadcast::Sender<StateChanged>,
}

impl StateNotifier {
    /// Create a notifier with a small event buffer.
    pub fn new() -> Self {
        // Keep the buffer moderate; a lagged listener re-reads state anyway.
        let (tx, _rx) = broadcast::channel(16);
        Self { tx }
    }

    /// Subscribe to change signals. Unsubscribing is dropping the receiver;
    /// doing so twice is inherently a no-op.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChanged> {
        self.tx.subscribe()
    }

    /// Publish a change signal to all current subscribers. Having no
    /// subscribers is not an error, and one slow listener cannot block or
    /// fail delivery to the others.
    pub(crate) fn publish(&self) {
        let _ = self.tx.send(StateChanged);
    }
}

impl Default for StateNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let notifier = StateNotifier::new();
        notifier.publish();
    }

    #[tokio::test]
    async fn dropped_receiver_misses_later_publishes() {
        let notifier = StateNotifier::new();
        let mut rx = notifier.subscribe();
        notifier.publish();
        assert!(rx.try_recv().is_ok());

        drop(rx);
        notifier.publish();
        let mut late = notifier.subscribe();
        // No replay for late subscribers.
        assert!(late.try_recv().is_err());
    }
}
