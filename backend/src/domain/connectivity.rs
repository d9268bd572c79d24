//! Network reachability as seen by the core.
//!
//! The host application reports connectivity changes through
//! [`ConnectivityMonitor::set_online`]; the fallback executor reads the
//! current value and the sync queue listens for offline→online transitions.

use log::info;
use std::sync::Arc;
use tokio::sync::watch;

/// Anything that can tell whether the device is online.
pub trait NetworkStatus: Send + Sync {
    fn is_online(&self) -> bool;
}

#[derive(Clone)]
pub struct ConnectivityMonitor {
    sender: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (sender, _receiver) = watch::channel(online);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish the current reachability. Only actual changes notify listeners.
    pub fn set_online(&self, online: bool) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl NetworkStatus for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.sender.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_transitions_are_published() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();

        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());

        monitor.set_online(false);
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
        assert!(!monitor.is_online());
    }
}
