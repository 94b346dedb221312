pub mod api_client;
pub mod requests;
pub mod responses;

pub use api_client::{APIClient, ClientError};

use derive_more::Display;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    Serialize,
    Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct UserId(pub Uuid);

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    Serialize,
    Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct RaidId(pub Uuid);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct ParticipationId(pub Uuid);

/// Lifecycle of a raid.
///
/// ```text
/// READY --(window opens / admin)--> ACTIVE --(hp reaches 0 / admin)--> SUCCESS
///                                      |
///                                      +--(window closes / admin)--> FAIL
/// ```
///
/// SUCCESS and FAIL are terminal. Only ACTIVE raids accept attacks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(
    feature = "use-sqlx",
    derive(sqlx::Type),
    sqlx(type_name = "raid_status", rename_all = "snake_case")
)]
pub enum RaidStatus {
    Ready,
    Active,
    Success,
    Fail,
}

impl RaidStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Fail)
    }

    pub fn accepts_attacks(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether an administrator (or the scheduler) may move a raid from
    /// `self` to `next`. Staying in the same status is always allowed so
    /// that unrelated field edits go through.
    pub fn can_transition_to(self, next: RaidStatus) -> bool {
        use RaidStatus::*;
        self == next
            || matches!(
                (self, next),
                (Ready, Active) | (Active, Success) | (Active, Fail)
            )
    }

    /// True if moving from `self` to `next` enters SUCCESS, which is the
    /// trigger for reward distribution.
    pub fn enters_success(self, next: RaidStatus) -> bool {
        self != Self::Success && next == Self::Success
    }
}

/// Nullable timestamp column wrapper, since the orphan rule prevents
/// implementing the conversion on `Option<jiff_sqlx::Timestamp>` directly.
#[cfg(feature = "use-sqlx")]
#[derive(Debug, sqlx::Type)]
#[sqlx(transparent)]
pub struct OptionalTimestamp(pub Option<jiff_sqlx::Timestamp>);

#[cfg(feature = "use-sqlx")]
impl From<OptionalTimestamp> for Option<Timestamp> {
    fn from(value: OptionalTimestamp) -> Self {
        value.0.map(|ts| ts.to_jiff())
    }
}

/// The class a user belongs to: a campus and a class number within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::FromRow))]
pub struct UserGroup {
    pub campus: String,
    pub class_num: i32,
}

/// The fields that describe a raid, independent of its progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaidDetails {
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Problem number on the external judge.
    pub problem_id: i32,
    pub max_hp: i32,
    pub damage_per_hit: i32,
    pub bonus_point: i32,
    pub start_at: Timestamp,
    pub end_at: Timestamp,
}
