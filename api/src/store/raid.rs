//! Raid registry, participation ledger and administrative lifecycle.

use super::*;
use payloads::requests::{self, RAID_TITLE_MAX_LEN};
use sqlx::{PgExecutor, Postgres, Transaction};

use crate::telemetry::log_error;

/// The editable fields of a raid after a create or a patch is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RaidFields {
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub problem_id: i32,
    pub max_hp: i32,
    pub current_hp: i32,
    pub damage_per_hit: i32,
    pub bonus_point: i32,
    pub status: RaidStatus,
    pub start_at: Timestamp,
    pub end_at: Timestamp,
}

impl RaidFields {
    fn from_create(details: &requests::CreateRaid) -> Self {
        Self {
            title: details.title.clone(),
            description: details.description.clone(),
            image_url: details.image_url.clone(),
            problem_id: details.problem_id,
            max_hp: details.max_hp,
            current_hp: details.max_hp,
            damage_per_hit: details.damage_per_hit,
            bonus_point: details.bonus_point,
            status: RaidStatus::Ready,
            start_at: details.start_at,
            end_at: details.end_at,
        }
    }

    fn from_raid(raid: &Raid) -> Self {
        Self {
            title: raid.title.clone(),
            description: raid.description.clone(),
            image_url: raid.image_url.clone(),
            problem_id: raid.problem_id,
            max_hp: raid.max_hp,
            current_hp: raid.current_hp,
            damage_per_hit: raid.damage_per_hit,
            bonus_point: raid.bonus_point,
            status: raid.status,
            start_at: raid.start_at,
            end_at: raid.end_at,
        }
    }

    /// Apply a patch on top of the current values. Entering SUCCESS always
    /// leaves the boss at 0 HP, whatever the patch says.
    fn apply(mut self, patch: &requests::UpdateRaid) -> Self {
        let previous_status = self.status;
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(image_url) = &patch.image_url {
            self.image_url = image_url.clone();
        }
        self.problem_id = patch.problem_id.unwrap_or(self.problem_id);
        self.max_hp = patch.max_hp.unwrap_or(self.max_hp);
        self.current_hp = patch.current_hp.unwrap_or(self.current_hp);
        self.damage_per_hit = patch.damage_per_hit.unwrap_or(self.damage_per_hit);
        self.bonus_point = patch.bonus_point.unwrap_or(self.bonus_point);
        self.status = patch.status.unwrap_or(self.status);
        self.start_at = patch.start_at.unwrap_or(self.start_at);
        self.end_at = patch.end_at.unwrap_or(self.end_at);
        if previous_status.enters_success(self.status) {
            self.current_hp = 0;
        }
        self
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.title.trim().is_empty() {
            return Err(StoreError::InvalidRaid("title must not be empty"));
        }
        if self.title.len() > RAID_TITLE_MAX_LEN {
            return Err(StoreError::FieldTooLong);
        }
        if self.problem_id <= 0 {
            return Err(StoreError::InvalidRaid("problem_id must be positive"));
        }
        if self.max_hp <= 0 {
            return Err(StoreError::InvalidRaid("max_hp must be positive"));
        }
        if self.damage_per_hit <= 0 {
            return Err(StoreError::InvalidRaid(
                "damage_per_hit must be positive",
            ));
        }
        if self.bonus_point < 0 {
            return Err(StoreError::InvalidRaid(
                "bonus_point must not be negative",
            ));
        }
        if self.current_hp < 0 || self.current_hp > self.max_hp {
            return Err(StoreError::InvalidRaid(
                "current_hp must be between 0 and max_hp",
            ));
        }
        // hp is 0 exactly when the boss has been cleared
        if (self.current_hp == 0) != (self.status == RaidStatus::Success) {
            return Err(StoreError::InvalidRaid(
                "current_hp must be 0 if and only if the raid is SUCCESS",
            ));
        }
        if self.start_at >= self.end_at {
            return Err(StoreError::InvalidRaid("start_at must precede end_at"));
        }
        Ok(())
    }
}

#[tracing::instrument(skip(pool, time_source), ret)]
pub async fn create_raid(
    details: &requests::CreateRaid,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<RaidId, StoreError> {
    let fields = RaidFields::from_create(details);
    fields.validate()?;

    let raid_id = sqlx::query_scalar::<_, RaidId>(
        "INSERT INTO raids (
            title, description, image_url, problem_id, max_hp, current_hp,
            damage_per_hit, bonus_point, status, start_at, end_at,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $5, $6, $7, 'ready', $8, $9, $10, $10)
        RETURNING id",
    )
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(&fields.image_url)
    .bind(fields.problem_id)
    .bind(fields.max_hp)
    .bind(fields.damage_per_hit)
    .bind(fields.bonus_point)
    .bind(fields.start_at.to_sqlx())
    .bind(fields.end_at.to_sqlx())
    .bind(time_source.now().to_sqlx())
    .fetch_one(pool)
    .await?;

    Ok(raid_id)
}

pub async fn get_raid(
    raid_id: &RaidId,
    executor: impl PgExecutor<'_>,
) -> Result<Raid, StoreError> {
    sqlx::query_as::<_, Raid>("SELECT * FROM raids WHERE id = $1")
        .bind(raid_id)
        .fetch_one(executor)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => StoreError::RaidNotFound,
            e => StoreError::Database(e),
        })
}

#[derive(Debug, FromRow)]
struct RaidCounts {
    participant_count: i64,
    solved_count: i64,
}

#[derive(Debug, FromRow)]
struct FirstBloodRow {
    #[sqlx(flatten)]
    user: responses::UserIdentity,
    #[sqlx(try_from = "SqlxTs")]
    solved_at: Timestamp,
}

/// Raid with participation statistics and the first solver, if any.
#[tracing::instrument(skip(pool))]
pub async fn get_raid_detail(
    raid_id: &RaidId,
    pool: &PgPool,
) -> Result<responses::RaidDetail, StoreError> {
    let raid = get_raid(raid_id, pool).await?;

    let counts = sqlx::query_as::<_, RaidCounts>(
        "SELECT
            COUNT(*) AS participant_count,
            COUNT(*) FILTER (WHERE is_solved) AS solved_count
        FROM raid_participations
        WHERE raid_id = $1",
    )
    .bind(raid_id)
    .fetch_one(pool)
    .await?;

    let first_blood = sqlx::query_as::<_, FirstBloodRow>(
        "SELECT u.id AS user_id, u.handle, u.display_name, p.solved_at
        FROM raid_participations p
        JOIN users u ON u.id = p.user_id
        WHERE p.raid_id = $1 AND p.is_solved
        ORDER BY p.solved_at ASC, p.updated_at ASC
        LIMIT 1",
    )
    .bind(raid_id)
    .fetch_optional(pool)
    .await?
    .map(|row| responses::FirstBlood {
        user: row.user,
        solved_at: row.solved_at,
    });

    Ok(responses::RaidDetail {
        raid: raid.into(),
        participant_count: counts.participant_count,
        solved_count: counts.solved_count,
        first_blood,
    })
}

#[derive(Debug, FromRow)]
struct RaidWithCount {
    #[sqlx(flatten)]
    raid: Raid,
    participant_count: i64,
}

/// Newest raids first, optionally restricted to one status.
#[tracing::instrument(skip(pool))]
pub async fn list_raids(
    filter: &requests::ListRaids,
    pool: &PgPool,
) -> Result<Vec<responses::RaidSummary>, StoreError> {
    let rows = sqlx::query_as::<_, RaidWithCount>(
        "SELECT raids.*, (
            SELECT COUNT(*) FROM raid_participations p
            WHERE p.raid_id = raids.id
        ) AS participant_count
        FROM raids
        WHERE $1::raid_status IS NULL OR status = $1
        ORDER BY created_at DESC, id",
    )
    .bind(filter.status)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| responses::RaidSummary {
            raid: row.raid.into(),
            participant_count: row.participant_count,
        })
        .collect())
}

/// Delete a raid. Participation records go with it via ON DELETE CASCADE.
#[tracing::instrument(skip(pool))]
pub async fn delete_raid(
    raid_id: &RaidId,
    pool: &PgPool,
) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM raids WHERE id = $1")
        .bind(raid_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::RaidNotFound);
    }
    Ok(())
}

/// Apply an administrative patch, including status transitions.
///
/// The raid row is locked for the duration of the update so a concurrent
/// attack either lands before (and the transition is validated against its
/// result) or after (and sees the new status). Rewards are distributed after
/// commit, only when this call moved the raid into SUCCESS; a failed
/// distribution is logged and left for the scheduler to retry.
#[tracing::instrument(skip(pool, time_source))]
pub async fn update_raid(
    patch: &requests::UpdateRaid,
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<Raid, StoreError> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, Raid>(
        "SELECT * FROM raids WHERE id = $1 FOR UPDATE",
    )
    .bind(patch.raid_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::RaidNotFound)?;

    if let Some(next) = patch.status
        && !current.status.can_transition_to(next)
    {
        return Err(StoreError::InvalidStatusTransition {
            from: current.status,
            to: next,
        });
    }

    let fields = RaidFields::from_raid(&current).apply(patch);
    fields.validate()?;

    let updated = sqlx::query_as::<_, Raid>(
        "UPDATE raids SET
            title = $2,
            description = $3,
            image_url = $4,
            problem_id = $5,
            max_hp = $6,
            current_hp = $7,
            damage_per_hit = $8,
            bonus_point = $9,
            status = $10,
            start_at = $11,
            end_at = $12,
            updated_at = $13
        WHERE id = $1
        RETURNING *",
    )
    .bind(current.id)
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(&fields.image_url)
    .bind(fields.problem_id)
    .bind(fields.max_hp)
    .bind(fields.current_hp)
    .bind(fields.damage_per_hit)
    .bind(fields.bonus_point)
    .bind(fields.status)
    .bind(fields.start_at.to_sqlx())
    .bind(fields.end_at.to_sqlx())
    .bind(time_source.now().to_sqlx())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    if current.status.enters_success(updated.status) {
        tracing::info!(raid_id = %updated.id, "raid cleared by administrator");
        if let Err(e) = distribute_rewards(&updated.id, pool, time_source).await
        {
            log_error(e);
        }
    }

    Ok(updated)
}

pub async fn get_participation(
    raid_id: &RaidId,
    user_id: &UserId,
    executor: impl PgExecutor<'_>,
) -> Result<Option<RaidParticipation>, StoreError> {
    Ok(sqlx::query_as::<_, RaidParticipation>(
        "SELECT * FROM raid_participations
        WHERE raid_id = $1 AND user_id = $2",
    )
    .bind(raid_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await?)
}

/// Participants that solved the raid problem, first blood first.
#[tracing::instrument(skip(pool))]
pub async fn list_participants(
    raid_id: &RaidId,
    pool: &PgPool,
) -> Result<Vec<responses::Participant>, StoreError> {
    // distinguish "no solvers yet" from a missing raid
    get_raid(raid_id, pool).await?;

    Ok(sqlx::query_as::<_, responses::Participant>(
        "SELECT u.id AS user_id, u.handle, u.display_name, p.solved_at,
            p.point_awarded
        FROM raid_participations p
        JOIN users u ON u.id = p.user_id
        WHERE p.raid_id = $1 AND p.is_solved
        ORDER BY p.solved_at ASC, p.updated_at ASC",
    )
    .bind(raid_id)
    .fetch_all(pool)
    .await?)
}

/// Record an attack attempt in the ledger.
///
/// This is a compare-and-swap on the participation row: it only applies if
/// the row is still unsolved and its `last_attempt_at` equals
/// `observed_last_attempt` (both `None` for a first attempt, where the
/// unique constraint arbitrates between concurrent inserts). Returns `None`
/// if another request settled first.
pub async fn record_attempt(
    tx: &mut Transaction<'_, Postgres>,
    raid_id: &RaidId,
    user_id: &UserId,
    solved: bool,
    observed_last_attempt: Option<Timestamp>,
    now: Timestamp,
) -> Result<Option<RaidParticipation>, StoreError> {
    Ok(sqlx::query_as::<_, RaidParticipation>(
        "INSERT INTO raid_participations (
            raid_id, user_id, is_solved, solved_at, last_attempt_at,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $5, $5)
        ON CONFLICT (raid_id, user_id) DO UPDATE SET
            is_solved = EXCLUDED.is_solved,
            solved_at = EXCLUDED.solved_at,
            last_attempt_at = EXCLUDED.last_attempt_at,
            updated_at = EXCLUDED.updated_at
        WHERE NOT raid_participations.is_solved
            AND raid_participations.last_attempt_at IS NOT DISTINCT FROM $6
        RETURNING *",
    )
    .bind(raid_id)
    .bind(user_id)
    .bind(solved)
    .bind(solved.then(|| now.to_sqlx()))
    .bind(now.to_sqlx())
    .bind(observed_last_attempt.map(|t| t.to_sqlx()))
    .fetch_optional(&mut **tx)
    .await?)
}

/// Deal one hit of damage to an ACTIVE raid, flooring HP at 0 and flipping
/// the raid to SUCCESS in the same statement when it reaches 0.
///
/// Returns `None` if the raid is no longer ACTIVE or `now` is outside its
/// window.
pub async fn apply_damage(
    tx: &mut Transaction<'_, Postgres>,
    raid_id: &RaidId,
    now: Timestamp,
) -> Result<Option<Raid>, StoreError> {
    Ok(sqlx::query_as::<_, Raid>(
        "UPDATE raids SET
            current_hp = GREATEST(current_hp - damage_per_hit, 0),
            status = CASE
                WHEN current_hp - damage_per_hit <= 0 THEN 'success'::raid_status
                ELSE status
            END,
            updated_at = $2
        WHERE id = $1
            AND status = 'active'
            AND start_at <= $2 AND $2 <= end_at
        RETURNING *",
    )
    .bind(raid_id)
    .bind(now.to_sqlx())
    .fetch_optional(&mut **tx)
    .await?)
}

/// READY raids whose window has opened become ACTIVE.
#[tracing::instrument(skip(pool, time_source))]
pub async fn activate_opened_raids(
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<Vec<RaidId>, StoreError> {
    Ok(sqlx::query_scalar::<_, RaidId>(
        "UPDATE raids SET status = 'active', updated_at = $1
        WHERE status = 'ready' AND start_at <= $1 AND $1 < end_at
        RETURNING id",
    )
    .bind(time_source.now().to_sqlx())
    .fetch_all(pool)
    .await?)
}

/// ACTIVE raids whose window closed with the boss still standing become
/// FAIL.
#[tracing::instrument(skip(pool, time_source))]
pub async fn fail_expired_raids(
    pool: &PgPool,
    time_source: &TimeSource,
) -> Result<Vec<RaidId>, StoreError> {
    Ok(sqlx::query_scalar::<_, RaidId>(
        "UPDATE raids SET status = 'fail', updated_at = $1
        WHERE status = 'active' AND end_at < $1 AND current_hp > 0
        RETURNING id",
    )
    .bind(time_source.now().to_sqlx())
    .fetch_all(pool)
    .await?)
}
