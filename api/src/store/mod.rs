//! Database store module for the raid API
//!
//! ## Design Decisions
//!
//! ### Atomic updates instead of read-modify-write
//! - **Boss HP**: attacks decrement `raids.current_hp` with a single
//!   `UPDATE ... SET current_hp = GREATEST(current_hp - damage_per_hit, 0)`
//!   guarded by `status = 'active'`, so concurrent attackers never lose
//!   each other's damage and HP never goes negative.
//! - **Points**: `users.total_point` is only ever changed with
//!   `total_point = total_point + $n` inside the same transaction that
//!   claims the participation's `point_awarded` flag.
//!
//! ### Participation ledger
//! - **One row per (raid, user)**: enforced by a unique constraint, which
//!   is what serializes two concurrent first attempts by one user.
//! - **Compare-and-swap upsert**: the settlement upsert only applies if the
//!   row still has the `last_attempt_at` observed when the attack passed its
//!   precondition checks, so a request that lost a race cannot settle.
//!
//! ### Time Source Dependency
//! - **Mocked time for testing**: every timestamp written by this module
//!   comes from a `TimeSource` passed in by the caller, never from `now()`
//!   in SQL, so tests control cooldowns and raid windows.
//!
//! ### Type Safety
//! - **Id newtypes with sqlx::Type**: `UserId`, `RaidId` and
//!   `ParticipationId` bind directly in queries without reaching for the
//!   inner UUID.

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTs;
use jiff_sqlx::ToSqlx;
use sqlx::{FromRow, PgPool};

use payloads::{
    OptionalTimestamp, ParticipationId, RaidId, RaidStatus, UserGroup, UserId,
    responses,
};

use crate::time::TimeSource;

pub mod raid;
pub mod reward;

pub use raid::*;
pub use reward::*;

/// A complete user row that stays in the backend.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: UserId,
    pub handle: String,
    pub display_name: Option<String>,
    pub password_hash: String,
    pub total_point: i64,
    pub campus: Option<String>,
    pub class_num: Option<i32>,
    #[sqlx(try_from = "SqlxTs")]
    pub created_at: Timestamp,
    #[sqlx(try_from = "SqlxTs")]
    pub updated_at: Timestamp,
}

impl User {
    pub fn identity(&self) -> responses::UserIdentity {
        responses::UserIdentity {
            user_id: self.id,
            handle: self.handle.clone(),
            display_name: self.display_name.clone(),
        }
    }

    pub fn group(&self) -> Option<UserGroup> {
        Some(UserGroup {
            campus: self.campus.clone()?,
            class_num: self.class_num?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Raid {
    pub id: RaidId,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub problem_id: i32,
    pub max_hp: i32,
    pub current_hp: i32,
    pub damage_per_hit: i32,
    pub bonus_point: i32,
    pub status: RaidStatus,
    #[sqlx(try_from = "SqlxTs")]
    pub start_at: Timestamp,
    #[sqlx(try_from = "SqlxTs")]
    pub end_at: Timestamp,
    #[sqlx(try_from = "SqlxTs")]
    pub created_at: Timestamp,
    #[sqlx(try_from = "SqlxTs")]
    pub updated_at: Timestamp,
}

impl Raid {
    /// Whether `now` lies inside the inclusive attack window.
    pub fn window_contains(&self, now: Timestamp) -> bool {
        self.start_at <= now && now <= self.end_at
    }
}

impl From<Raid> for responses::Raid {
    fn from(raid: Raid) -> Self {
        Self {
            raid_id: raid.id,
            raid_details: payloads::RaidDetails {
                title: raid.title,
                description: raid.description,
                image_url: raid.image_url,
                problem_id: raid.problem_id,
                max_hp: raid.max_hp,
                damage_per_hit: raid.damage_per_hit,
                bonus_point: raid.bonus_point,
                start_at: raid.start_at,
                end_at: raid.end_at,
            },
            current_hp: raid.current_hp,
            status: raid.status,
            created_at: raid.created_at,
            updated_at: raid.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RaidParticipation {
    pub id: ParticipationId,
    pub raid_id: RaidId,
    pub user_id: UserId,
    pub is_solved: bool,
    #[sqlx(try_from = "OptionalTimestamp")]
    pub solved_at: Option<Timestamp>,
    #[sqlx(try_from = "OptionalTimestamp")]
    pub last_attempt_at: Option<Timestamp>,
    pub point_awarded: bool,
    #[sqlx(try_from = "SqlxTs")]
    pub created_at: Timestamp,
    #[sqlx(try_from = "SqlxTs")]
    pub updated_at: Timestamp,
}

impl From<RaidParticipation> for responses::Participation {
    fn from(p: RaidParticipation) -> Self {
        Self {
            raid_id: p.raid_id,
            user_id: p.user_id,
            is_solved: p.is_solved,
            solved_at: p.solved_at,
            last_attempt_at: p.last_attempt_at,
            point_awarded: p.point_awarded,
        }
    }
}

/// Create a new user as would happen during signup.
#[tracing::instrument(skip(pool, password_hash, time_source))]
pub async fn create_user(
    pool: &PgPool,
    handle: &str,
    display_name: Option<&str>,
    group: Option<&UserGroup>,
    password_hash: &str,
    time_source: &TimeSource,
) -> Result<User, StoreError> {
    let validation = payloads::requests::validate_handle(handle);
    if let Some(message) = validation.error_message() {
        return Err(StoreError::InvalidHandle(message));
    }
    if display_name
        .is_some_and(|n| n.len() > payloads::requests::DISPLAY_NAME_MAX_LEN)
    {
        return Err(StoreError::FieldTooLong);
    }
    if let Some(group) = group {
        validate_group(group)?;
    }
    sqlx::query_as::<_, User>(
        "INSERT INTO users (
                handle,
                display_name,
                password_hash,
                campus,
                class_num,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *;",
    )
    .bind(handle)
    .bind(display_name)
    .bind(password_hash)
    .bind(group.map(|g| g.campus.as_str()))
    .bind(group.map(|g| g.class_num))
    .bind(time_source.now().to_sqlx())
    .fetch_one(pool)
    .await
    .map_err(|e| match StoreError::from(e) {
        StoreError::NotUnique(_) => StoreError::HandleTaken,
        e => e,
    })
}

fn validate_group(group: &UserGroup) -> Result<(), StoreError> {
    if group.campus.trim().is_empty() {
        return Err(StoreError::InvalidGroup("campus must not be empty"));
    }
    if group.campus.len() > payloads::requests::CAMPUS_MAX_LEN {
        return Err(StoreError::FieldTooLong);
    }
    if group.class_num <= 0 {
        return Err(StoreError::InvalidGroup("class number must be positive"));
    }
    Ok(())
}

pub async fn read_user(pool: &PgPool, id: &UserId) -> Result<User, StoreError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1;")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => StoreError::UserNotFound,
            e => StoreError::Database(e),
        })
}

pub async fn read_user_by_handle(
    pool: &PgPool,
    handle: &str,
) -> Result<Option<User>, StoreError> {
    Ok(
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE handle = $1;")
            .bind(handle)
            .fetch_optional(pool)
            .await?,
    )
}

/// Leaderboard by total points. Equal totals share a rank.
#[tracing::instrument(skip(pool))]
pub async fn get_ranking(
    pool: &PgPool,
) -> Result<Vec<responses::RankingEntry>, StoreError> {
    Ok(sqlx::query_as::<_, responses::RankingEntry>(
        "SELECT
            RANK() OVER (ORDER BY total_point DESC) AS rank,
            id AS user_id,
            handle,
            display_name,
            total_point
        FROM users
        ORDER BY total_point DESC, handle ASC",
    )
    .fetch_all(pool)
    .await?)
}

/// Leaderboard of classes by the sum of their members' points, optionally
/// restricted to one campus. Users without a class are left out.
#[tracing::instrument(skip(pool))]
pub async fn get_group_ranking(
    pool: &PgPool,
    campus: Option<&str>,
) -> Result<Vec<responses::GroupRankingEntry>, StoreError> {
    Ok(sqlx::query_as::<_, responses::GroupRankingEntry>(
        "SELECT
            RANK() OVER (ORDER BY SUM(total_point) DESC) AS rank,
            campus,
            class_num,
            COUNT(*) AS member_count,
            SUM(total_point)::BIGINT AS total_point,
            ROUND(AVG(total_point))::BIGINT AS avg_point
        FROM users
        WHERE campus IS NOT NULL
            AND ($1::TEXT IS NULL OR campus = $1)
        GROUP BY campus, class_num
        ORDER BY SUM(total_point) DESC, campus ASC, class_num ASC",
    )
    .bind(campus)
    .fetch_all(pool)
    .await?)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid handle: {0}")]
    InvalidHandle(&'static str),
    #[error("Handle is already registered")]
    HandleTaken,
    #[error("Field too long")]
    FieldTooLong,
    #[error("Invalid group: {0}")]
    InvalidGroup(&'static str),
    #[error("User not found")]
    UserNotFound,
    #[error("Raid not found")]
    RaidNotFound,
    #[error("Invalid raid: {0}")]
    InvalidRaid(&'static str),
    #[error("Cannot change raid status from {from} to {to}")]
    InvalidStatusTransition { from: RaidStatus, to: RaidStatus },
    #[error("Raid has not been cleared")]
    RaidNotCleared,
    #[error(
        "Reward distribution incomplete: {awarded} awarded, {failed} failed"
    )]
    DistributionPartialFailure { awarded: u64, failed: u64 },
    #[error("Unique constraint violation")]
    NotUnique(#[source] sqlx::Error),
    #[error("Database error")]
    Database(#[source] sqlx::Error),
    #[error("Unexpected error")]
    UnexpectedError(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e
            && db_err.is_unique_violation()
        {
            return StoreError::NotUnique(e);
        }
        StoreError::Database(e)
    }
}
