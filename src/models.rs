//! Data models for the clan activity reports.
//!
//! Everything the entry points emit is defined here as typed serde
//! models. Remote documents stay as `serde_json::Value` until the
//! pipeline distills them into these shapes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::QueryError;

/// The result envelope every entry point produces. Serialized directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub data: Value,
}

impl Outcome {
    /// Wrap a payload in a success envelope.
    pub fn ok(data: impl Serialize) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }

    /// Wrap an error code in a failure envelope.
    pub fn error(code: &str) -> Self {
        Self {
            success: false,
            data: json!({ "code": code }),
        }
    }
}

impl From<&QueryError> for Outcome {
    fn from(error: &QueryError) -> Self {
        Self::error(&error.code())
    }
}

/// A character attached to the requested account.
#[derive(Debug, Clone)]
pub struct Character {
    pub id: String,
    pub last_played_at: DateTime<Utc>,
}

impl Character {
    /// Whether the character has played since `cutoff`.
    pub fn is_active(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_played_at > cutoff
    }
}

/// One activity from a character's history, annotated with its parsed
/// period. Rebuilt on every request.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub period: DateTime<Utc>,
    pub duration_seconds: i64,
    pub mode: i64,
    pub reference_id: String,
    pub instance_id: String,
}

/// Per-activity-type metadata merged from the history responses'
/// definitions blocks, keyed by the type's reference hash.
#[derive(Debug, Clone)]
pub struct ActivityTypeInfo {
    pub title: String,
    pub max_party: i64,
}

/// How a participant relates to the requesting member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerKind {
    You,
    Ally,
    External,
    Unconsidered,
}

impl PlayerKind {
    /// Display rank: the member first, then allies, externals, and
    /// unconsidered entries.
    pub fn rank(&self) -> u8 {
        match self {
            PlayerKind::You => 0,
            PlayerKind::Ally => 1,
            PlayerKind::External => 2,
            PlayerKind::Unconsidered => 3,
        }
    }
}

/// A participant row in the detail view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerEntry {
    #[serde(rename = "type")]
    pub kind: PlayerKind,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Aggregate score of one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub score: i64,
}

/// The summary report: one aggregate score per category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityReport {
    pub general: CategoryScore,
    pub clan: CategoryScore,
    pub raid: CategoryScore,
    pub crucible: CategoryScore,
    pub osiris: CategoryScore,
}

impl ActivityReport {
    /// Mutable access to a category slot by name.
    pub fn category_mut(&mut self, name: &str) -> Option<&mut CategoryScore> {
        match name {
            "general" => Some(&mut self.general),
            "clan" => Some(&mut self.clan),
            "raid" => Some(&mut self.raid),
            "crucible" => Some(&mut self.crucible),
            "osiris" => Some(&mut self.osiris),
            _ => None,
        }
    }
}

/// One activity in the detail view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityBreakdown {
    pub period: String,
    pub title: String,
    pub players: Vec<PlayerEntry>,
    pub score_entanglement: i64,
    pub score_recency: i64,
}

/// Clan metadata with its administrator roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanInfo {
    pub id: String,
    pub name: String,
    pub admin_ids: Vec<String>,
}

/// One clan roster row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanMember {
    pub member_id: String,
    pub membership_id: String,
    pub membership_display_name: String,
    pub is_founder: bool,
    pub is_admin: bool,
}

/// Member rosters keyed by clan id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanMembersReport {
    pub clan_members: BTreeMap<String, Vec<ClanMember>>,
}
