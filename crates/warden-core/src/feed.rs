//! In-process change feed
//!
//! Lock Pick publishes every mutation it completes so watchers in this process
//! wake without waiting for their next store poll. Events are hints only:
//! a watcher always re-reads the store before answering.

use tokio::sync::broadcast;

const FEED_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEvent {
    pub key: String,
    /// Index after the change, `None` when the record was removed.
    pub modification_index: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<LockEvent>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, key: &str, modification_index: Option<i64>) {
        // No subscribers is not an error.
        let _ = self.sender.send(LockEvent {
            key: key.to_string(),
            modification_index,
        });
    }

    pub fn subscribe(&self) -> FeedSubscription {
        FeedSubscription {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FeedSubscription {
    receiver: broadcast::Receiver<LockEvent>,
}

impl FeedSubscription {
    /// Resolve on the next event for `key`.
    ///
    /// A lagged receiver may have missed it, so lag counts as a change.
    pub async fn changed(&mut self, key: &str) {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.key == key => return,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => return,
                Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
            }
        }
    }
}
