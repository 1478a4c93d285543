//! Score computation: recency decay and party composition.
//!
//! Two models share the recency table. Categories that ignore clan
//! composition sum decayed weights alone; clan-aware categories combine
//! the recency weight with a party credit derived from how many of the
//! fireteam's slots were filled by clanmates.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::api::id_string;
use crate::models::{ActivityBreakdown, ActivityTypeInfo, PlayerEntry, PlayerKind};
use crate::ordering::natural_cmp;

/// Activities considered per category.
pub const ACTIVITY_COUNT_LIMIT: usize = 25;

/// Trailing window, in days, for an activity to count at all.
pub const ACTIVITY_DAYS_LIMIT: i64 = 60;

/// Activities shorter than this are discarded as aborted launches.
pub const MIN_ACTIVITY_SECONDS: i64 = 120;

/// Points available from party composition.
pub const POINTS_ENTANGLEMENT: f64 = 200.0;

/// Points available from recency.
pub const POINTS_RECENCY: f64 = 200.0;

/// Scale applied to the summed recency weights in the no-clan model.
pub const MODEL_A_SCALE: f64 = 400.0;

/// Modes that award completion credit by objective rather than kills;
/// zero-kill participants still count there.
const OBJECTIVE_MODES: [i64; 2] = [4, 16];

/// Decay table over the 60-day window, one entry per 7.5-day bucket.
const RECENCY_WEIGHTS: [f64; 8] = [1.0, 0.9, 0.6, 0.4, 0.2, 0.1, 0.1, 0.1];

const PARTY_SOLO: &[f64] = &[1.0];
const PARTY_DUO: &[f64] = &[1.0, 0.0];
const PARTY_TRIO: &[f64] = &[1.0, 0.80, 0.0];
const PARTY_FIRETEAM: &[f64] = &[1.0, 0.90, 0.75, 0.50, 0.25, 0.0];
const PARTY_RAID: &[f64] = &[
    1.0, 0.95, 0.90, 0.80, 0.70, 0.60, 0.50, 0.40, 0.30, 0.20, 0.10, 0.0,
];

/// Days elapsed between an activity period and `now`, floored at zero.
pub fn days_ago(period: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - period).num_days().max(0)
}

/// Recency weight for an activity `days_ago` old. Ages at or beyond
/// the window land in the last bucket.
pub fn recency_weight(days_ago: i64) -> f64 {
    let bucket = ((days_ago.max(0) * 8) / ACTIVITY_DAYS_LIMIT).min(7) as usize;
    RECENCY_WEIGHTS[bucket]
}

pub fn is_objective_mode(mode: i64) -> bool {
    OBJECTIVE_MODES.contains(&mode)
}

/// Credit distribution for each supported fireteam size, keyed by the
/// maximum number of co-players (`max_party - 1`). The domain is
/// closed: the game only ships fireteams of 1, 2, 3, 6 and 12.
fn party_distribution(party_allies: i64) -> Option<&'static [f64]> {
    match party_allies {
        0 => Some(PARTY_SOLO),
        1 => Some(PARTY_DUO),
        2 => Some(PARTY_TRIO),
        5 => Some(PARTY_FIRETEAM),
        11 => Some(PARTY_RAID),
        _ => None,
    }
}

/// Party credit in [0, 1] given how many of the possible co-player
/// slots were filled by allies. Unknown fireteam sizes earn nothing.
pub fn party_credit(party_allies: i64, ally_count: i64) -> f64 {
    let Some(distribution) = party_distribution(party_allies) else {
        debug!("no party distribution for {} co-players", party_allies);
        return 0.0;
    };

    let index = (party_allies - ally_count).max(0) as usize;
    distribution.get(index).copied().unwrap_or(0.0)
}

/// A carnage-report participant after ranking.
#[derive(Debug, Clone)]
pub struct RankedEntry {
    pub membership_id: String,
    pub display_name: String,
    pub kills: i64,
}

/// Rank a report's entries by kills, descending, and deduplicate by
/// membership id keeping the highest-kill occurrence.
pub fn ranked_entries(report: &Value) -> Vec<RankedEntry> {
    let mut entries: Vec<RankedEntry> = report
        .pointer("/Response/data/entries")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_entry).collect())
        .unwrap_or_default();

    entries.sort_by(|a, b| b.kills.cmp(&a.kills));

    let mut seen = HashSet::new();
    entries.retain(|entry| seen.insert(entry.membership_id.clone()));
    entries
}

fn parse_entry(entry: &Value) -> Option<RankedEntry> {
    Some(RankedEntry {
        membership_id: id_string(entry.pointer("/player/destinyUserInfo/membershipId"))?,
        display_name: entry
            .pointer("/player/destinyUserInfo/displayName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        kills: entry
            .pointer("/values/kills/basic/value")
            .and_then(Value::as_f64)
            .unwrap_or(0.0) as i64,
    })
}

/// Place one participant relative to the requesting member. `None`
/// means the entry earns no listing at all: zero kills outside the
/// objective-credit modes.
pub fn classify(
    entry: &RankedEntry,
    membership_id: &str,
    ally_ids: &HashSet<String>,
    mode: i64,
) -> Option<PlayerKind> {
    if entry.membership_id == membership_id {
        return Some(PlayerKind::You);
    }
    if entry.kills == 0 {
        return is_objective_mode(mode).then_some(PlayerKind::Unconsidered);
    }
    if ally_ids.contains(&entry.membership_id) {
        return Some(PlayerKind::Ally);
    }
    Some(PlayerKind::External)
}

/// Distinct allies present in the report, the member excluded.
pub fn ally_count(
    entries: &[RankedEntry],
    membership_id: &str,
    ally_ids: &HashSet<String>,
    mode: i64,
) -> i64 {
    entries
        .iter()
        .filter(|entry| classify(entry, membership_id, ally_ids, mode) == Some(PlayerKind::Ally))
        .count() as i64
}

/// The detail view's participant list: the member first, then allies,
/// externals and unconsidered entries, names in natural order,
/// deduplicated by display name.
pub fn player_list(
    entries: &[RankedEntry],
    membership_id: &str,
    ally_ids: &HashSet<String>,
    mode: i64,
) -> Vec<PlayerEntry> {
    let mut players: Vec<PlayerEntry> = entries
        .iter()
        .filter_map(|entry| {
            classify(entry, membership_id, ally_ids, mode).map(|kind| PlayerEntry {
                kind,
                display_name: entry.display_name.clone(),
            })
        })
        .collect();

    players.sort_by(|a, b| {
        a.kind
            .rank()
            .cmp(&b.kind.rank())
            .then_with(|| natural_cmp(&a.display_name, &b.display_name))
    });

    let mut seen = HashSet::new();
    players.retain(|player| seen.insert(player.display_name.clone()));
    players
}

/// The carnage document's own period, raw and parsed.
fn report_period(report: &Value) -> Option<(String, DateTime<Utc>)> {
    let raw = report
        .pointer("/Response/data/period")
        .and_then(Value::as_str)?
        .to_string();
    let parsed = DateTime::parse_from_rfc3339(&raw).ok()?.with_timezone(&Utc);
    Some((raw, parsed))
}

fn report_recency(report: &Value, now: DateTime<Utc>) -> f64 {
    report_period(report)
        .map(|(_, period)| recency_weight(days_ago(period, now).min(ACTIVITY_DAYS_LIMIT - 1)))
        .unwrap_or(0.0)
}

/// One clan-aware activity's contribution to the summary score,
/// unrounded.
pub fn activity_contribution(
    report: &Value,
    mode: i64,
    party_allies: i64,
    membership_id: &str,
    ally_ids: &HashSet<String>,
    now: DateTime<Utc>,
) -> f64 {
    let entries = ranked_entries(report);
    let allies = ally_count(&entries, membership_id, ally_ids, mode);

    party_credit(party_allies, allies) * POINTS_ENTANGLEMENT + report_recency(report, now) * POINTS_RECENCY
}

/// One activity's detail-view record, with the sub-scores rounded
/// individually.
pub fn activity_breakdown(
    report: &Value,
    type_info: Option<&ActivityTypeInfo>,
    mode: i64,
    party_allies: i64,
    membership_id: &str,
    ally_ids: &HashSet<String>,
    now: DateTime<Utc>,
) -> ActivityBreakdown {
    let entries = ranked_entries(report);
    let allies = ally_count(&entries, membership_id, ally_ids, mode);
    let players = player_list(&entries, membership_id, ally_ids, mode);

    ActivityBreakdown {
        period: report_period(report).map(|(raw, _)| raw).unwrap_or_default(),
        title: type_info.map(|info| info.title.clone()).unwrap_or_default(),
        players,
        score_entanglement: (party_credit(party_allies, allies) * POINTS_ENTANGLEMENT).round() as i64,
        score_recency: (report_recency(report, now) * POINTS_RECENCY).round() as i64,
    }
}
