//! Typed change notifications published by the repository facades.
//!
//! Each facade owns one [`ChangeFeed`]; consumers subscribe to exactly the
//! entity streams they care about.

use shared::{Kid, Prefs, Redemption, Reward, Tx, User};
use tokio::sync::broadcast;

use super::fallback::Source;

const FEED_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct ChangeFeed<E: Clone> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> ChangeFeed<E> {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    /// Send an event to current subscribers. Nobody listening is fine.
    pub fn publish(&self, event: E) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

impl<E: Clone> Default for ChangeFeed<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum KidEvent {
    Created(Kid),
    Updated(Kid),
    Removed { kid_id: String },
    BalanceChanged { kid_id: String, saldo: f64, source: Source },
    ListRefreshed { parent_id: String, count: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TxEvent {
    Added(Tx),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RewardEvent {
    CatalogUpdated { parent_id: String, count: usize },
    Redeemed(Redemption),
}

impl RewardEvent {
    pub fn catalog_updated(parent_id: &str, rewards: &[Reward]) -> Self {
        RewardEvent::CatalogUpdated {
            parent_id: parent_id.to_string(),
            count: rewards.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrefsEvent {
    Changed { owner_id: String, prefs: Prefs },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn(User),
    SignedOut,
    ProfileUpdated(User),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let feed: ChangeFeed<SessionEvent> = ChangeFeed::new();
        feed.publish(SessionEvent::SignedOut);

        let mut rx = feed.subscribe();
        feed.publish(SessionEvent::SignedOut);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::SignedOut);
    }
}
