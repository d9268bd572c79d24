//! # Sync Queue Processor
//!
//! Replays remote mutations that were applied locally while the remote store
//! was out of reach.
//!
//! A pass walks the queue front to back, one item at a time. A replayed item
//! is dropped; a failed one stays where it was, unchanged, and the pass moves
//! on to the next item. Items enqueued while a pass is running are kept behind
//! the retained ones. Only one pass runs at a time; an overlapping call
//! returns immediately.
//!
//! Passes run at startup and whenever connectivity comes back. They never
//! return an error: failures are logged and the items wait for the next pass.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use log::{debug, error, info, warn};
use shared::{QueueItem, SyncState};
use tokio::task::JoinHandle;

use super::connectivity::ConnectivityMonitor;
use super::fallback::FallbackExecutor;
use crate::storage::local::{LocalKidRepository, LocalQueueRepository};
use crate::storage::remote::RemoteKidRepository;

/// What a single pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    pub retained: usize,
    /// Another pass was already running.
    pub skipped: bool,
}

/// Clears the in-flight flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct SyncQueueProcessor {
    executor: FallbackExecutor,
    queue: LocalQueueRepository,
    remote: RemoteKidRepository,
    local: LocalKidRepository,
    in_flight: Arc<AtomicBool>,
}

impl SyncQueueProcessor {
    pub fn new(
        executor: FallbackExecutor,
        queue: LocalQueueRepository,
        remote: RemoteKidRepository,
        local: LocalKidRepository,
    ) -> Self {
        Self {
            executor,
            queue,
            remote,
            local,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pending_count(&self) -> Result<usize> {
        self.queue.len()
    }

    /// Queued items in replay order.
    pub fn pending_items(&self) -> Result<Vec<QueueItem>> {
        self.queue.read_all()
    }

    pub async fn process_queue(&self) -> SyncReport {
        let Some(_guard) = PassGuard::acquire(&self.in_flight) else {
            debug!("Sync pass already running; skipping");
            return SyncReport {
                skipped: true,
                ..SyncReport::default()
            };
        };

        if !self.executor.remote_reachable() {
            debug!("Remote store not reachable; leaving the queue for later");
            return SyncReport::default();
        }

        let items = match self.queue.read_all() {
            Ok(items) => items,
            Err(e) => {
                error!("Could not read the sync queue: {:#}", e);
                return SyncReport::default();
            }
        };
        if items.is_empty() {
            return SyncReport::default();
        }

        info!("Replaying {} queued mutations", items.len());
        let mut report = SyncReport {
            attempted: items.len(),
            ..SyncReport::default()
        };
        let mut retained = Vec::new();
        let mut replayed_kids = HashSet::new();
        let mut failed_kids = HashSet::new();

        for item in &items {
            match self.replay(item).await {
                Ok(()) => {
                    report.synced += 1;
                    replayed_kids.insert(item.kid_id().to_string());
                }
                Err(e) => {
                    warn!("Replay of {} for kid {} failed: {:#}", item.kind(), item.kid_id(), e);
                    failed_kids.insert(item.kid_id().to_string());
                    retained.push(item.clone());
                }
            }
        }
        report.retained = retained.len();

        if let Err(e) = self.queue.commit_pass(items.len(), &retained) {
            error!("Could not rewrite the sync queue: {:#}", e);
            return report;
        }
        self.update_sync_states(&replayed_kids, &failed_kids);

        info!(
            "Sync pass done: {} replayed, {} retained",
            report.synced, report.retained
        );
        report
    }

    async fn replay(&self, item: &QueueItem) -> Result<()> {
        match item {
            QueueItem::UpdateBalance {
                kid_id,
                parent_id,
                new_balance,
                ..
            } => self.remote.update_balance(kid_id, parent_id, *new_balance).await?,
            QueueItem::MarkAllowance { kid_id, when_iso, .. } => {
                self.remote.mark_allowance(kid_id, *when_iso).await?
            }
        }
        Ok(())
    }

    /// Kids with nothing left in the queue are synced; kids whose replay
    /// failed are flagged.
    fn update_sync_states(&self, replayed: &HashSet<String>, failed: &HashSet<String>) {
        let still_queued: HashSet<String> = match self.queue.read_all() {
            Ok(items) => items.iter().map(|i| i.kid_id().to_string()).collect(),
            Err(e) => {
                warn!("Could not re-read the sync queue: {:#}", e);
                return;
            }
        };
        for kid_id in replayed.iter().filter(|k| !still_queued.contains(*k)) {
            if let Err(e) = self.local.set_sync_state(kid_id, SyncState::Synced) {
                warn!("Could not mark kid {} synced: {:#}", kid_id, e);
            }
        }
        for kid_id in failed {
            if let Err(e) = self.local.set_sync_state(kid_id, SyncState::Failed) {
                warn!("Could not mark kid {} failed: {:#}", kid_id, e);
            }
        }
    }

    /// Run a pass every time connectivity goes from offline to online.
    pub fn spawn_reconnect_listener(&self, connectivity: &ConnectivityMonitor) -> JoinHandle<()> {
        let mut updates = connectivity.subscribe();
        let processor = self.clone();
        // The receiver starts with the current value marked seen, so a flip
        // made before the task is first polled still wakes it. The monitor
        // only notifies on real changes: seeing `true` means the device went
        // offline and came back since the last look.
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let online = *updates.borrow_and_update();
                if online {
                    info!("Back online; draining the sync queue");
                    processor.process_queue().await;
                }
            }
            debug!("Connectivity monitor closed; reconnect listener stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendMode;
    use crate::storage::test_utils::{sample_kid, TestApp};
    use chrono::Utc;
    use shared::{NewKid, TxType};
    use std::time::Duration;

    fn balance(kid: &str, value: f64) -> QueueItem {
        QueueItem::UpdateBalance {
            kid_id: kid.to_string(),
            parent_id: "parent-1".to_string(),
            new_balance: value,
            ts: 1,
        }
    }

    #[tokio::test]
    async fn test_failed_item_stays_in_place_while_others_drain() {
        let app = TestApp::new(BackendMode::Auto, true).await;
        for kid in ["kid-a", "kid-b", "kid-c"] {
            app.remote.seed_kid(&sample_kid(kid, "parent-1", 0.0, 10.0));
        }
        app.context.kids.list_by_parent("parent-1").await.unwrap();
        let queue = LocalQueueRepository::new(app.connection.clone());
        queue.enqueue(&balance("kid-a", 1.0)).unwrap();
        queue.enqueue(&balance("kid-b", 2.0)).unwrap();
        queue.enqueue(&balance("kid-c", 3.0)).unwrap();
        app.remote.fail_updates_for("kid-b");

        let report = app.context.sync.process_queue().await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.synced, 2);
        assert_eq!(report.retained, 1);
        assert_eq!(app.context.sync.pending_items().unwrap(), vec![balance("kid-b", 2.0)]);
        assert_eq!(app.remote.kid_balance("kid-a"), Some(1.0));
        assert_eq!(app.remote.kid_balance("kid-b"), Some(0.0));
        assert_eq!(app.remote.kid_balance("kid-c"), Some(3.0));

        let local = LocalKidRepository::new(app.connection.clone());
        assert_eq!(local.get_by_id("kid-b").unwrap().unwrap().sync_state, SyncState::Failed);
        assert_eq!(local.get_by_id("kid-c").unwrap().unwrap().sync_state, SyncState::Synced);
    }

    #[tokio::test]
    async fn test_allowance_marker_is_replayed() {
        let app = TestApp::new(BackendMode::Auto, true).await;
        app.remote.seed_kid(&sample_kid("kid-a", "parent-1", 0.0, 10.0));
        let when = Utc::now();
        LocalQueueRepository::new(app.connection.clone())
            .enqueue(&QueueItem::MarkAllowance {
                kid_id: "kid-a".to_string(),
                when_iso: when,
                ts: 1,
            })
            .unwrap();

        let report = app.context.sync.process_queue().await;
        assert_eq!(report.synced, 1);
        let kid = app.context.kids.get_by_id("kid-a").await.unwrap().unwrap();
        assert!(kid.last_allowance_at.is_some());
    }

    #[tokio::test]
    async fn test_queue_waits_while_offline() {
        let app = TestApp::new(BackendMode::Auto, true).await;
        app.connectivity.set_online(false);
        LocalQueueRepository::new(app.connection.clone())
            .enqueue(&balance("kid-a", 1.0))
            .unwrap();

        let report = app.context.sync.process_queue().await;
        assert_eq!(report.attempted, 0);
        assert_eq!(app.context.sync.pending_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let app = TestApp::new(BackendMode::Auto, true).await;
        let processor = app.context.sync.clone();
        processor.in_flight.store(true, Ordering::SeqCst);

        let report = processor.process_queue().await;
        assert!(report.skipped);

        processor.in_flight.store(false, Ordering::SeqCst);
        assert!(!processor.process_queue().await.skipped);
        assert!(!processor.in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_reconnect_triggers_a_pass() {
        let app = TestApp::new(BackendMode::Auto, true).await;
        app.remote.seed_kid(&sample_kid("kid-a", "parent-1", 0.0, 10.0));
        app.connectivity.set_online(false);
        let listener = app.context.sync.spawn_reconnect_listener(&app.connectivity);
        LocalQueueRepository::new(app.connection.clone())
            .enqueue(&balance("kid-a", 4.0))
            .unwrap();

        app.connectivity.set_online(true);
        for _ in 0..100 {
            if app.context.sync.pending_count().unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(app.context.sync.pending_count().unwrap(), 0);
        assert_eq!(app.remote.kid_balance("kid-a"), Some(4.0));
        listener.abort();
    }

    #[tokio::test]
    async fn test_offline_created_kid_keeps_balance_after_drain() {
        let app = TestApp::new(BackendMode::Auto, true).await;
        app.connectivity.set_online(false);
        let created = app
            .context
            .kids
            .create(NewKid {
                parent_id: "parent-1".to_string(),
                user_id: None,
                nome: "Leo".to_string(),
                avatar: None,
                mesada_semanal: 10.0,
            })
            .await
            .unwrap();
        let kid_id = created.value.unwrap().id;
        let credited = app.context.kids.credit(&kid_id, 15.5, TxType::Extra, None).await.unwrap();
        assert!(credited.ok);

        app.connectivity.set_online(true);
        let report = app.context.sync.process_queue().await;

        assert_eq!(report.synced, 0);
        assert_eq!(report.retained, 1);
        assert_eq!(app.context.sync.pending_count().unwrap(), 1);
        let kids = app.context.kids.list_by_parent("parent-1").await.unwrap();
        let kid = kids.iter().find(|k| k.id == kid_id).unwrap();
        assert_eq!(kid.saldo, 15.5);
        assert_ne!(kid.sync_state, SyncState::Synced);
    }

    #[tokio::test]
    async fn test_reconnect_before_listener_first_runs() {
        let app = TestApp::new(BackendMode::Auto, true).await;
        app.remote.seed_kid(&sample_kid("kid-a", "parent-1", 0.0, 10.0));
        LocalQueueRepository::new(app.connection.clone())
            .enqueue(&balance("kid-a", 6.0))
            .unwrap();

        let listener = app.context.sync.spawn_reconnect_listener(&app.connectivity);
        app.connectivity.set_online(false);
        app.connectivity.set_online(true);
        for _ in 0..100 {
            if app.context.sync.pending_count().unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(app.context.sync.pending_count().unwrap(), 0);
        assert_eq!(app.remote.kid_balance("kid-a"), Some(6.0));
        listener.abort();
    }
}
