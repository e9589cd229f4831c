//! Live scene publisher.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

use crate::types::SceneState;

/// Latest-value broadcast of a session's scene.
///
/// Backed by a `watch` channel: publishing overwrites the stored state and
/// never waits, and a subscriber that falls behind only sees the newest
/// state on its next read.
#[derive(Debug)]
pub struct LivePublisher {
    sender: watch::Sender<SceneState>,
    live: AtomicBool,
}

impl LivePublisher {
    pub fn new(initial: SceneState) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender,
            live: AtomicBool::new(true),
        }
    }

    pub fn publish(&self, state: SceneState) {
        self.sender.send_replace(state);
    }

    /// Publish the final state and mark the stream as finished.
    pub fn finish(&self, state: SceneState) {
        self.live.store(false, Ordering::Release);
        self.sender.send_replace(state);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> watch::Receiver<SceneState> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> SceneState {
        self.sender.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
