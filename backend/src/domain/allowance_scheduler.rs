//! # Allowance Scheduler
//!
//! Credits the weekly allowance when the app opens. A kid is due when its
//! allowance was never credited, or when at least a full week passed since
//! the last credit. Each due kid is claimed first so a second run in the same
//! week finds nothing to do, even while the first one is still going.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use shared::TxType;

use super::clock::Clock;
use super::kids_repository::KidsRepository;

pub const ALLOWANCE_INTERVAL_SECS: i64 = 7 * 24 * 60 * 60;

/// Ledger description of an automatic allowance credit.
pub const AUTO_ALLOWANCE_LABEL: &str = "Mesada automática semanal";

pub fn is_due(last_allowance_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_allowance_at {
        None => true,
        Some(last) => (now - last).num_seconds() >= ALLOWANCE_INTERVAL_SECS,
    }
}

#[derive(Clone)]
pub struct AllowanceScheduler {
    kids: KidsRepository,
    clock: Arc<dyn Clock>,
}

impl AllowanceScheduler {
    pub fn new(kids: KidsRepository, clock: Arc<dyn Clock>) -> Self {
        Self { kids, clock }
    }

    /// Credit every due kid of `parent_id` once. Returns how many were credited.
    pub async fn run_weekly_auto_allowance(&self, parent_id: &str) -> Result<u32> {
        let now = self.clock.now();
        let kids = self.kids.list_by_parent(parent_id).await?;
        let mut credited = 0;

        for kid in kids {
            if kid.mesada_semanal <= 0.0 || !is_due(kid.last_allowance_at, now) {
                continue;
            }
            let Some(before) = self.kids.claim_allowance(&kid.id, now)? else {
                debug!("Allowance for kid {} already claimed", kid.id);
                continue;
            };

            let outcome = self
                .kids
                .credit(
                    &kid.id,
                    before.mesada_semanal,
                    TxType::Mesada,
                    Some(AUTO_ALLOWANCE_LABEL.to_string()),
                )
                .await;
            let failure = match outcome {
                Ok(outcome) if outcome.ok => None,
                Ok(outcome) => Some(outcome.error.unwrap_or_default()),
                Err(e) => Some(format!("{:#}", e)),
            };
            if let Some(reason) = failure {
                warn!("Auto allowance for kid {} not credited: {}", kid.id, reason);
                self.kids
                    .release_allowance_claim(&kid.id, now, before.last_allowance_at)?;
                continue;
            }

            if let Err(e) = self.kids.mark_allowance_pending(&kid.id, now) {
                warn!("Could not queue allowance marker for kid {}: {:#}", kid.id, e);
            }
            credited += 1;
        }

        if credited > 0 {
            info!("Credited weekly allowance to {} kids of parent {}", credited, parent_id);
        }
        Ok(credited)
    }

    /// App-open hook: never fails, never blocks on errors.
    pub async fn auto_credit_on_app_open(&self, parent_id: &str) -> u32 {
        match self.run_weekly_auto_allowance(parent_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Auto allowance run failed for parent {}: {:#}", parent_id, e);
                0
            }
        }
    }
}
