//! A single attack on a raid boss, from precondition checks to settlement.
//!
//! ```text
//! authenticated? -> raid exists? -> ACTIVE? -> inside window?
//!     -> not already solved? -> off cooldown?
//!     -> solve check (no transaction held)
//!     -> tx { CAS upsert participation; if solved: floored HP decrement }
//!     -> if the hit was lethal: distribute rewards
//! ```
//!
//! Nothing is written unless every precondition passes and the solve check
//! completes. A failed solve check does not consume the cooldown.

use jiff::{SignedDuration, Timestamp};
use payloads::{RaidId, RaidStatus, responses::AttackOutcome};
use sqlx::PgPool;

use crate::solved_ac::{CheckerError, SolveChecker};
use crate::store::{self, StoreError};
use crate::telemetry::log_error;
use crate::time::TimeSource;

/// Minimum interval between two attack attempts by one user on one raid.
pub const COOLDOWN: SignedDuration = SignedDuration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum AttackError {
    #[error("Please log in to attack")]
    Unauthenticated,
    #[error("Raid not found")]
    NotFound,
    #[error("Raid is not active")]
    NotActive,
    #[error("Raid is outside of its attack window")]
    WindowClosed,
    #[error("You already cleared this raid")]
    AlreadySolved,
    #[error("Attack is on cooldown for {remaining_seconds} more seconds")]
    OnCooldown { remaining_seconds: i64 },
    #[error("Solve checker is unavailable, please try again")]
    CheckerUnavailable(#[source] CheckerError),
    #[error("Failed to settle attack")]
    SettlementFailed(#[source] StoreError),
}

impl From<StoreError> for AttackError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RaidNotFound => AttackError::NotFound,
            e => AttackError::SettlementFailed(e),
        }
    }
}

/// Status and window checks, in that order.
pub fn check_raid_attackable(
    raid: &store::Raid,
    now: Timestamp,
) -> Result<(), AttackError> {
    if !raid.status.accepts_attacks() {
        return Err(AttackError::NotActive);
    }
    if !raid.window_contains(now) {
        return Err(AttackError::WindowClosed);
    }
    Ok(())
}

/// Whole seconds (rounded up) until the next attempt is allowed, or `None`
/// if the cooldown has elapsed.
pub fn cooldown_remaining(
    last_attempt_at: Timestamp,
    now: Timestamp,
) -> Option<i64> {
    let remaining = COOLDOWN - now.duration_since(last_attempt_at);
    if !remaining.is_positive() {
        return None;
    }
    let millis = remaining.as_millis();
    Some(((millis + 999) / 1000) as i64)
}

fn check_participation(
    participation: &store::RaidParticipation,
    now: Timestamp,
) -> Result<(), AttackError> {
    if participation.is_solved {
        return Err(AttackError::AlreadySolved);
    }
    if let Some(last_attempt_at) = participation.last_attempt_at
        && let Some(remaining_seconds) = cooldown_remaining(last_attempt_at, now)
    {
        return Err(AttackError::OnCooldown { remaining_seconds });
    }
    Ok(())
}

#[tracing::instrument(
    skip(user, pool, time_source, checker),
    fields(user_id = tracing::field::Empty)
)]
pub async fn attack(
    raid_id: &RaidId,
    user: Option<&store::User>,
    pool: &PgPool,
    time_source: &TimeSource,
    checker: &SolveChecker,
) -> Result<AttackOutcome, AttackError> {
    let user = user.ok_or(AttackError::Unauthenticated)?;
    tracing::Span::current()
        .record("user_id", tracing::field::display(&user.id));

    let raid = store::get_raid(raid_id, pool).await?;
    check_raid_attackable(&raid, time_source.now())?;

    let existing = store::get_participation(raid_id, &user.id, pool).await?;
    if let Some(participation) = &existing {
        check_participation(participation, time_source.now())?;
    }
    let observed_last_attempt =
        existing.and_then(|participation| participation.last_attempt_at);

    let solved = checker
        .check_solved(&user.handle, raid.problem_id)
        .await
        .map_err(AttackError::CheckerUnavailable)?;

    // the check may have taken a while
    let now = time_source.now();
    let mut tx = pool.begin().await.map_err(StoreError::from)?;

    let recorded = store::record_attempt(
        &mut tx,
        raid_id,
        &user.id,
        solved,
        observed_last_attempt,
        now,
    )
    .await?;
    if recorded.is_none() {
        // another request by this user settled first
        let winner = store::get_participation(raid_id, &user.id, &mut *tx)
            .await?
            .ok_or_else(|| {
                StoreError::UnexpectedError(anyhow::anyhow!(
                    "participation vanished during settlement"
                ))
            })?;
        check_participation(&winner, now)?;
        return Err(AttackError::OnCooldown {
            remaining_seconds: COOLDOWN.as_secs(),
        });
    }

    if !solved {
        // the raid may have been cleared, failed or closed during the check;
        // a rejection here drops the transaction and the attempt with it
        let current = store::get_raid(raid_id, &mut *tx).await?;
        check_raid_attackable(&current, now)?;
        tx.commit().await.map_err(StoreError::from)?;
        return Ok(AttackOutcome {
            solved: false,
            damage: 0,
            new_hp: current.current_hp,
            raid_cleared: false,
            message: format!(
                "Problem {} is not solved yet. Try again in {} seconds.",
                raid.problem_id,
                COOLDOWN.as_secs()
            ),
        });
    }

    let Some(hit) = store::apply_damage(&mut tx, raid_id, now).await? else {
        // raid left ACTIVE (or its window) since the precondition checks;
        // dropping the transaction discards the ledger write
        let current = store::get_raid(raid_id, &mut *tx).await?;
        check_raid_attackable(&current, now)?;
        return Err(AttackError::NotActive);
    };

    tx.commit().await.map_err(StoreError::from)?;

    let raid_cleared = hit.status == RaidStatus::Success;
    let message = if raid_cleared {
        tracing::info!(raid_id = %raid_id, "raid boss defeated");
        if let Err(e) =
            store::distribute_rewards(raid_id, pool, time_source).await
        {
            // left for the reconciliation sweep
            log_error(e);
        }
        "Critical hit! The boss has been defeated.".to_string()
    } else {
        format!("Hit! The boss has {} HP left.", hit.current_hp)
    };

    Ok(AttackOutcome {
        solved: true,
        damage: hit.damage_per_hit,
        new_hp: hit.current_hp,
        raid_cleared,
        message,
    })
}
