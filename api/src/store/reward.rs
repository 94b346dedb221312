//! Reward settlement for cleared raids.

use super::*;

use crate::telemetry::log_error;

#[derive(Debug, FromRow)]
struct UnpaidParticipation {
    id: ParticipationId,
    user_id: UserId,
}

/// Pay the raid's bonus to every solver that has not been paid yet.
///
/// Each participation is claimed and paid in its own transaction, so a
/// failure on one row neither blocks nor rolls back the others. Running
/// this concurrently or repeatedly pays each solver at most once. Returns
/// the number of participations paid by this call.
#[tracing::instrument(skip(pool, time_source))]
pub async fn distribute_rewards(
    raid_id: &RaidId,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<u64, StoreError> {
    let raid = get_raid(raid_id, pool).await?;
    if raid.status != RaidStatus::Success {
        return Err(StoreError::RaidNotCleared);
    }
    if raid.bonus_point == 0 {
        return Ok(0);
    }

    let unpaid = sqlx::query_as::<_, UnpaidParticipation>(
        "SELECT id, user_id FROM raid_participations
        WHERE raid_id = $1 AND is_solved AND NOT point_awarded
        ORDER BY solved_at ASC",
    )
    .bind(raid_id)
    .fetch_all(pool)
    .await?;

    let mut awarded = 0;
    let mut failed = 0;
    for participation in unpaid {
        match award_participation(
            &participation.id,
            raid.bonus_point,
            pool,
            time_source,
        )
        .await
        {
            Ok(true) => awarded += 1,
            // someone else paid this row in the meantime
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    user_id = %participation.user_id,
                    "failed to award raid bonus"
                );
                log_error(e);
                failed += 1;
            }
        }
    }

    tracing::info!(awarded, failed, "distributed raid rewards");
    if failed > 0 {
        return Err(StoreError::DistributionPartialFailure { awarded, failed });
    }
    Ok(awarded)
}

/// Claim one participation's reward flag and credit the user, atomically.
///
/// Returns `Ok(false)` if the row was already paid (or is not eligible).
async fn award_participation(
    participation_id: &ParticipationId,
    bonus_point: i32,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<bool, StoreError> {
    let now = time_source.now();
    let mut tx = pool.begin().await?;

    let Some(user_id) = sqlx::query_scalar::<_, UserId>(
        "UPDATE raid_participations p SET point_awarded = true, updated_at = $2
        WHERE p.id = $1
            AND p.is_solved
            AND NOT p.point_awarded
            AND EXISTS (
                SELECT 1 FROM raids r
                WHERE r.id = p.raid_id AND r.status = 'success'
            )
        RETURNING p.user_id",
    )
    .bind(participation_id)
    .bind(now.to_sqlx())
    .fetch_optional(&mut *tx)
    .await?
    else {
        return Ok(false);
    };

    sqlx::query(
        "UPDATE users SET total_point = total_point + $2, updated_at = $3
        WHERE id = $1",
    )
    .bind(user_id)
    .bind(i64::from(bonus_point))
    .bind(now.to_sqlx())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

/// SUCCESS raids that still owe a bonus to at least one solver.
pub async fn raids_with_unpaid_rewards(
    pool: &PgPool,
) -> Result<Vec<RaidId>, StoreError> {
    Ok(sqlx::query_scalar::<_, RaidId>(
        "SELECT r.id FROM raids r
        WHERE r.status = 'success'
            AND r.bonus_point > 0
            AND EXISTS (
                SELECT 1 FROM raid_participations p
                WHERE p.raid_id = r.id AND p.is_solved AND NOT p.point_awarded
            )",
    )
    .fetch_all(pool)
    .await?)
}
