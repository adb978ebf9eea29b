//! Process-fatal signal
//!
//! Raised when the store is unusable in a way no retry can fix. The first
//! reason wins; later raises are logged and dropped. `main` waits on it and
//! shuts the process down.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone, Debug)]
pub struct FatalSignal {
    sender: Arc<watch::Sender<Option<String>>>,
}

impl FatalSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Raise the signal. Returns `true` if this call set the reason.
    pub fn raise(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let raised = self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason.clone());
            true
        });
        if raised {
            tracing::error!(reason = %reason, "Fatal store failure, shutting down");
        } else {
            tracing::warn!(reason = %reason, "Fatal signal already raised");
        }
        raised
    }

    pub fn is_raised(&self) -> bool {
        self.sender.borrow().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.sender.borrow().clone()
    }

    /// Wait until the signal is raised and return its reason.
    pub async fn raised(&self) -> String {
        let mut receiver = self.sender.subscribe();
        loop {
            if let Some(reason) = receiver.borrow_and_update().clone() {
                return reason;
            }
            // The sender lives in `self`, so the channel cannot close here.
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for FatalSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_first_reason_wins() {
        let signal = FatalSignal::new();
        assert!(!signal.is_raised());
        assert!(signal.raise("schema corrupt"));
        assert!(!signal.raise("second"));
        assert_eq!(signal.reason().as_deref(), Some("schema corrupt"));
    }

    #[tokio::test]
    async fn test_raised_wakes_waiter() {
        let signal = FatalSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.raised().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.raise("no such table: locks");

        let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, "no such table: locks");
    }

    #[tokio::test]
    async fn test_raised_before_wait() {
        let signal = FatalSignal::new();
        signal.raise("early");
        assert_eq!(signal.raised().await, "early");
    }
}
