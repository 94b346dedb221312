use crate::{RaidId, RaidStatus, UserGroup};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

pub const HANDLE_MAX_LEN: usize = 20;
pub const DISPLAY_NAME_MAX_LEN: usize = 255;
pub const RAID_TITLE_MAX_LEN: usize = 255;
pub const CAMPUS_MAX_LEN: usize = 50;

/// Validation result for judge handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleValidation {
    Valid,
    Empty,
    TooLong,
    InvalidCharacters,
}

impl HandleValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn error_message(&self) -> Option<&'static str> {
        match self {
            Self::Valid => None,
            Self::Empty => Some("Handle must not be empty"),
            Self::TooLong => Some("Handle must be at most 20 characters"),
            Self::InvalidCharacters => Some(
                "Handle can only contain letters, numbers, and underscores",
            ),
        }
    }
}

/// Validate a handle on the external judge.
///
/// Rules:
/// - 1-20 characters
/// - ASCII letters, numbers, and underscores only
pub fn validate_handle(handle: &str) -> HandleValidation {
    if handle.is_empty() {
        return HandleValidation::Empty;
    }
    if handle.len() > HANDLE_MAX_LEN {
        return HandleValidation::TooLong;
    }
    if !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return HandleValidation::InvalidCharacters;
    }
    HandleValidation::Valid
}

#[derive(Serialize, Deserialize)]
pub struct LoginCredentials {
    pub handle: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct CreateAccount {
    pub handle: String,
    pub display_name: Option<String>,
    pub password: String,
    /// Class the user belongs to, for the group leaderboard.
    #[serde(default)]
    pub group: Option<UserGroup>,
}

fn default_damage_per_hit() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRaid {
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub problem_id: i32,
    pub max_hp: i32,
    #[serde(default = "default_damage_per_hit")]
    pub damage_per_hit: i32,
    #[serde(default)]
    pub bonus_point: i32,
    pub start_at: Timestamp,
    pub end_at: Timestamp,
}

/// Deserialize a present field, `null` included, as `Some`. Paired with
/// `#[serde(default)]` so that an absent field stays `None`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Administrative patch of a raid. Absent fields are left untouched.
///
/// `description` and `image_url` are nullable: `Some(None)` (an explicit
/// `null` on the wire) clears them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRaid {
    pub raid_id: RaidId,
    pub status: Option<RaidStatus>,
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_url: Option<Option<String>>,
    pub problem_id: Option<i32>,
    pub max_hp: Option<i32>,
    pub current_hp: Option<i32>,
    pub damage_per_hit: Option<i32>,
    pub bonus_point: Option<i32>,
    pub start_at: Option<Timestamp>,
    pub end_at: Option<Timestamp>,
}

impl UpdateRaid {
    /// An empty patch.
    pub fn new(raid_id: RaidId) -> Self {
        Self {
            raid_id,
            status: None,
            title: None,
            description: None,
            image_url: None,
            problem_id: None,
            max_hp: None,
            current_hp: None,
            damage_per_hit: None,
            bonus_point: None,
            start_at: None,
            end_at: None,
        }
    }

    /// A patch that only changes the status.
    pub fn status(raid_id: RaidId, status: RaidStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::new(raid_id)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRaids {
    pub status: Option<RaidStatus>,
}

/// Group leaderboard filter. `None` ranks classes across every campus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupRanking {
    pub campus: Option<String>,
}
