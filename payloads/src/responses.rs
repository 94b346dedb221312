use crate::{RaidDetails, RaidId, RaidStatus, UserGroup, UserId};
use jiff::Timestamp;
#[cfg(feature = "use-sqlx")]
use jiff_sqlx::Timestamp as SqlxTs;
use serde::{Deserialize, Serialize};

/// User identification bundled with display information
///
/// This is the standard way to reference users in API responses.
/// The frontend should display display_name (if present) or handle,
/// but use user_id for any API calls that reference the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct UserIdentity {
    pub user_id: UserId,
    pub handle: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user: UserIdentity,
    pub group: Option<UserGroup>,
    pub total_point: i64,
    pub is_admin: bool,
}

/// One row of the leaderboard. Ties share neither rank nor order
/// guarantees beyond handle ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct RankingEntry {
    pub rank: i64,
    #[cfg_attr(feature = "use-sqlx", sqlx(flatten))]
    pub user: UserIdentity,
    pub total_point: i64,
}

/// One class on the group leaderboard, ranked by the sum of its members'
/// points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct GroupRankingEntry {
    pub rank: i64,
    #[cfg_attr(feature = "use-sqlx", sqlx(flatten))]
    pub group: UserGroup,
    pub member_count: i64,
    pub total_point: i64,
    /// Mean points per member, rounded to the nearest integer.
    pub avg_point: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Raid {
    pub raid_id: RaidId,
    pub raid_details: RaidDetails,
    pub current_hp: i32,
    pub status: RaidStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaidSummary {
    pub raid: Raid,
    pub participant_count: i64,
}

/// The earliest participant to clear a raid's problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstBlood {
    pub user: UserIdentity,
    pub solved_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaidDetail {
    pub raid: Raid,
    pub participant_count: i64,
    pub solved_count: i64,
    pub first_blood: Option<FirstBlood>,
}

/// The caller's own ledger entry for a raid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    pub raid_id: RaidId,
    pub user_id: UserId,
    pub is_solved: bool,
    pub solved_at: Option<Timestamp>,
    pub last_attempt_at: Option<Timestamp>,
    pub point_awarded: bool,
}

/// A participant who solved the raid problem, ordered by solve time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct Participant {
    #[cfg_attr(feature = "use-sqlx", sqlx(flatten))]
    pub user: UserIdentity,
    #[cfg_attr(feature = "use-sqlx", sqlx(try_from = "SqlxTs"))]
    pub solved_at: Timestamp,
    pub point_awarded: bool,
}

/// Result of an attack that reached the solve check. Not having solved the
/// problem yet is a successful outcome with `solved = false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub solved: bool,
    pub damage: i32,
    pub new_hp: i32,
    /// Whether this attack brought the boss down.
    pub raid_cleared: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttackRejectionCode {
    NotLoggedIn,
    RaidNotFound,
    RaidNotActive,
    RaidTimeInvalid,
    AlreadySolved,
    Cooldown,
    CheckerUnavailable,
    SettlementFailed,
}

/// JSON body returned when an attack is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackRejection {
    pub code: AttackRejectionCode,
    pub message: String,
    /// Only set for cooldown rejections.
    pub remaining_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionResult {
    pub awarded: u64,
}
