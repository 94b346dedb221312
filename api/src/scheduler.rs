//! Time-based raid transitions and the reward reconciliation sweep.
//!
//! ```text
//!            start_at                    end_at
//!               v                          v
//! READY --------|---------- ACTIVE --------|-------> FAIL (hp > 0)
//!                              |
//!                              +--- hp reaches 0 ---> SUCCESS
//!                                                       |
//!                          unpaid solvers are paid on every tick
//! ```
//!
//! Attacks never rely on these transitions having run: the attack path
//! checks both status and window itself. The sweep only keeps stored status
//! in line with the clock and heals reward distributions that failed
//! part-way.

use sqlx::PgPool;
use std::time::Duration;
use tokio::time;

use crate::{store, telemetry::log_error, time::TimeSource};

pub struct Scheduler {
    pool: PgPool,
    time_source: TimeSource,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        pool: PgPool,
        time_source: TimeSource,
        tick_interval: Duration,
    ) -> Self {
        Self {
            pool,
            time_source,
            tick_interval,
        }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.tick_interval);
        loop {
            interval.tick().await;
            let _ = schedule_tick(&self.pool, &self.time_source)
                .await
                .map_err(log_error);
        }
    }
}

/// Update state once right now.
#[tracing::instrument(skip(pool, time_source))]
pub async fn schedule_tick(
    pool: &PgPool,
    time_source: &TimeSource,
) -> anyhow::Result<()> {
    for raid_id in store::activate_opened_raids(pool, time_source).await? {
        tracing::info!(%raid_id, "raid window opened");
    }

    for raid_id in store::fail_expired_raids(pool, time_source).await? {
        tracing::info!(%raid_id, "raid window closed without a clear");
    }

    reconcile_rewards(pool, time_source).await?;

    Ok(())
}

/// Retry distribution for every cleared raid that still owes a bonus.
#[tracing::instrument(skip(pool, time_source))]
async fn reconcile_rewards(
    pool: &PgPool,
    time_source: &TimeSource,
) -> anyhow::Result<()> {
    for raid_id in store::raids_with_unpaid_rewards(pool).await? {
        match store::distribute_rewards(&raid_id, pool, time_source).await {
            Ok(awarded) => {
                tracing::info!(%raid_id, awarded, "reconciled raid rewards");
            }
            // Log error but continue to the next raid
            Err(e) => log_error(e),
        }
    }
    Ok(())
}
