use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::db::ActivityStore;
use crate::moderation::{Moderator, ban_with_migration_fallback, permanent_ban_until};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nobody was active within the window; the store looks empty or unpopulated.
    Skipped,
    /// The store could not be queried; retried next interval.
    QueryFailed,
    Completed {
        candidates: usize,
        banned: usize,
        failed: usize,
    },
}

/// Periodically bans members whose last activity is older than `inactivity`.
pub struct Scanner {
    store: Arc<dyn ActivityStore>,
    moderator: Arc<dyn Moderator>,
    chat_id: i64,
    inactivity: Duration,
    interval: Duration,
}

impl Scanner {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        moderator: Arc<dyn Moderator>,
        chat_id: i64,
        inactivity: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            moderator,
            chat_id,
            inactivity,
            interval,
        }
    }

    /// Runs forever, one cycle per interval; the first cycle starts immediately.
    pub async fn run(self) {
        info!(
            "Scanner started: inactivity {}s, interval {}s",
            self.inactivity.as_secs(),
            self.interval.as_secs()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.run_cycle(Utc::now()).await {
                CycleOutcome::Completed {
                    candidates,
                    banned,
                    failed,
                } => info!(candidates, banned, failed, "scan cycle finished"),
                other => info!(outcome = ?other, "scan cycle finished"),
            }
        }
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleOutcome {
        let threshold = now.timestamp() - self.inactivity.as_secs() as i64;

        // Count and fetch are separate reads; a member may change in between.
        match self.store.count_active(threshold) {
            Ok(0) => {
                info!("no activity since {}s ago, skipping scan", self.inactivity.as_secs());
                return CycleOutcome::Skipped;
            }
            Ok(_) => {}
            Err(e) => {
                error!(op = "count_active", threshold, "scan query failed: {e}");
                return CycleOutcome::QueryFailed;
            }
        }

        let candidates = match self.store.find_stale(threshold) {
            Ok(c) => c,
            Err(e) => {
                error!(op = "find_stale", threshold, "scan query failed: {e}");
                return CycleOutcome::QueryFailed;
            }
        };

        let until = permanent_ban_until(now);
        let mut banned = 0;
        let mut failed = 0;

        for candidate in &candidates {
            let member_id = candidate.member_id;
            info!(member_id, last_activity = candidate.last_activity, "kick");

            match ban_with_migration_fallback(self.moderator.as_ref(), self.chat_id, member_id, until)
                .await
            {
                Ok(()) => banned += 1,
                Err(e) => {
                    error!(op = "ban", member_id, "ban failed: {e}");
                    failed += 1;
                }
            }
        }

        CycleOutcome::Completed {
            candidates: candidates.len(),
            banned,
            failed,
        }
    }
}
