use anyhow::Result;
use log::{debug, warn};
use serde_json::Value;
use shared::QueueItem;

use super::connection::LocalConnection;
use super::keys;

/// Durable FIFO of pending remote mutations under `finedu_queue`.
#[derive(Clone)]
pub struct LocalQueueRepository {
    connection: LocalConnection,
}

fn parse_item(row: &Value) -> Option<QueueItem> {
    serde_json::from_value(row.clone()).ok()
}

impl LocalQueueRepository {
    pub fn new(connection: LocalConnection) -> Self {
        Self { connection }
    }

    /// Items in enqueue order. Unrecognised entries are dropped from the view.
    pub fn read_all(&self) -> Result<Vec<QueueItem>> {
        self.connection.read_rows(keys::QUEUE, parse_item)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read_all()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Append an item at the tail.
    pub fn enqueue(&self, item: &QueueItem) -> Result<()> {
        let row = serde_json::to_value(item)?;
        let depth = self
            .connection
            .update_json(keys::QUEUE, |current: Option<Vec<Value>>| {
                let mut rows = current.unwrap_or_default();
                rows.push(row);
                let depth = rows.len();
                Ok((rows, depth))
            })?;
        debug!("Queued {} for kid {} (depth {})", item.kind(), item.kid_id(), depth);
        Ok(())
    }

    /// Finish a drain pass over the first `processed` items.
    ///
    /// The processed prefix is replaced by `retained` (the items that failed,
    /// in their original order); anything enqueued while the pass was running
    /// stays behind them. Rows this build cannot read are left in the queue.
    pub fn commit_pass(&self, processed: usize, retained: &[QueueItem]) -> Result<()> {
        let retained = retained
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.connection
            .update_json(keys::QUEUE, |current: Option<Vec<Value>>| {
                let mut seen = 0;
                let mut rest = Vec::new();
                for row in current.unwrap_or_default() {
                    if parse_item(&row).is_none() {
                        debug!("Keeping unrecognised queue row {}", row);
                        rest.push(row);
                    } else if seen < processed {
                        seen += 1;
                    } else {
                        rest.push(row);
                    }
                }
                if seen < processed {
                    warn!(
                        "Queue shrank during a drain pass ({} < {}); keeping retained items only",
                        seen, processed
                    );
                }
                let mut next = retained;
                next.extend(rest);
                Ok((next, ()))
            })
    }
}
