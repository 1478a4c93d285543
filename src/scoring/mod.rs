//! The scoring pipeline: categories, collection and the report entry
//! points.

pub mod activities;
pub mod calculator;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::api::{
    QueryError, QueryPool, RemoteSource, SOFT_UNRESOLVED_ACCOUNT, TTL_IMMUTABLE, TTL_VOLATILE,
};
use crate::cache::QueryCache;
use crate::models::{ActivityBreakdown, ActivityRecord, ActivityReport, ActivityTypeInfo};

use activities::{collect_category_activities, collect_characters, prepare_activities, DEFAULT_MAX_PARTY};
use calculator::{activity_breakdown, activity_contribution, days_ago, recency_weight, MODEL_A_SCALE};

/// A named grouping of mode codes sharing one scoring model.
#[derive(Debug, Clone, Copy)]
pub struct Category {
    pub name: &'static str,
    pub modes: &'static [i64],
    pub with_clan: bool,
}

/// Every category, in report order.
pub const CATEGORIES: [Category; 5] = [
    Category { name: "general", modes: &[0], with_clan: false },
    Category { name: "clan", modes: &[2, 6, 18, 20], with_clan: true },
    Category { name: "raid", modes: &[4], with_clan: true },
    Category { name: "crucible", modes: &[5], with_clan: true },
    Category { name: "osiris", modes: &[14], with_clan: true },
];

/// Look up a category by name.
pub fn category(name: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|category| category.name == name)
}

fn account_path(membership_id: &str) -> String {
    format!("/Destiny/1/Account/{membership_id}/")
}

fn carnage_path(instance_id: &str) -> String {
    format!("/Destiny/Stats/PostGameCarnageReport/{instance_id}/")
}

/// Possible co-player slots for an activity type.
fn party_allies_for(types: &HashMap<String, ActivityTypeInfo>, reference_id: &str) -> i64 {
    types
        .get(reference_id)
        .map(|info| info.max_party - 1)
        .unwrap_or(DEFAULT_MAX_PARTY - 1)
}

/// Fetch the account document. The unresolved-account code is a soft
/// miss: `Ok(None)` and the caller emits a default report.
async fn fetch_account<S: RemoteSource>(
    source: &S,
    cache: &dyn QueryCache,
    membership_id: &str,
) -> Result<Option<serde_json::Value>, QueryError> {
    match QueryPool::unique(source, cache, &account_path(membership_id), Some(TTL_VOLATILE)).await {
        Ok(account) => Ok(Some(account)),
        Err(QueryError::Upstream(code)) if code == SOFT_UNRESOLVED_ACCOUNT => {
            debug!("account {} cannot be resolved; default report", membership_id);
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

/// The summary report: one aggregate score per category.
pub async fn member_activities<S: RemoteSource>(
    source: &S,
    cache: &dyn QueryCache,
    membership_id: &str,
    ally_ids: &[String],
    now: DateTime<Utc>,
) -> Result<ActivityReport, QueryError> {
    if membership_id.is_empty() {
        return Err(QueryError::MissingInput("MembershipIdIsEmpty"));
    }
    if ally_ids.is_empty() {
        return Err(QueryError::MissingInput("MemberIdsIsEmpty"));
    }

    let mut report = ActivityReport::default();

    let Some(account) = fetch_account(source, cache, membership_id).await? else {
        return Ok(report);
    };

    let characters = collect_characters(&account, now);
    if characters.is_empty() {
        return Ok(report);
    }

    let ally_ids: HashSet<String> = ally_ids.iter().cloned().collect();

    for category in &CATEGORIES {
        let (records, types) =
            collect_category_activities(source, cache, membership_id, &characters, category.modes).await?;
        let retained = prepare_activities(records, now);
        if retained.is_empty() {
            continue;
        }
        info!("{}: {} activities retained", category.name, retained.len());

        let score = if category.with_clan {
            clan_category_score(source, cache, membership_id, &ally_ids, &types, &retained, now).await?
        } else {
            let weights: f64 = retained
                .iter()
                .map(|record| recency_weight(days_ago(record.period, now)))
                .sum();
            weights * MODEL_A_SCALE
        };

        if let Some(slot) = report.category_mut(category.name) {
            slot.score = score.round() as i64;
        }
    }

    Ok(report)
}

/// Model B: fetch each retained activity's carnage report and sum the
/// party and recency contributions. The sum stays unrounded; the
/// caller rounds the category total once.
async fn clan_category_score<S: RemoteSource>(
    source: &S,
    cache: &dyn QueryCache,
    membership_id: &str,
    ally_ids: &HashSet<String>,
    types: &HashMap<String, ActivityTypeInfo>,
    retained: &[ActivityRecord],
    now: DateTime<Utc>,
) -> Result<f64, QueryError> {
    let total = RefCell::new(0.0_f64);

    let mut pool = QueryPool::new(source, cache);
    for record in retained {
        let mode = record.mode;
        let party_allies = party_allies_for(types, &record.reference_id);
        let total = &total;
        pool.add_query_with(carnage_path(&record.instance_id), Some(TTL_IMMUTABLE), move |report| {
            *total.borrow_mut() +=
                activity_contribution(report, mode, party_allies, membership_id, ally_ids, now);
        });
    }

    if !pool.process().await {
        return Err(pool.take_last_error());
    }
    drop(pool);

    Ok(total.into_inner())
}

/// The detail view for one clan-aware category: a per-activity
/// breakdown instead of an aggregate score.
pub async fn member_details<S: RemoteSource>(
    source: &S,
    cache: &dyn QueryCache,
    membership_id: &str,
    ally_ids: &[String],
    category_name: &str,
    now: DateTime<Utc>,
) -> Result<Vec<ActivityBreakdown>, QueryError> {
    if membership_id.is_empty() {
        return Err(QueryError::MissingInput("MembershipIdIsEmpty"));
    }
    if ally_ids.is_empty() {
        return Err(QueryError::MissingInput("MemberIdsIsEmpty"));
    }
    let selected = category(category_name)
        .filter(|category| category.with_clan)
        .ok_or(QueryError::MissingInput("GameModeIsEmpty"))?;

    let Some(account) = fetch_account(source, cache, membership_id).await? else {
        return Ok(Vec::new());
    };

    let characters = collect_characters(&account, now);
    if characters.is_empty() {
        return Ok(Vec::new());
    }

    let (records, types) =
        collect_category_activities(source, cache, membership_id, &characters, selected.modes).await?;
    let retained = prepare_activities(records, now);
    if retained.is_empty() {
        return Ok(Vec::new());
    }

    let ally_ids: HashSet<String> = ally_ids.iter().cloned().collect();
    let breakdowns = RefCell::new(Vec::new());

    let mut pool = QueryPool::new(source, cache);
    for record in &retained {
        let mode = record.mode;
        let party_allies = party_allies_for(&types, &record.reference_id);
        let type_info = types.get(&record.reference_id);
        let breakdowns = &breakdowns;
        let ally_ids = &ally_ids;
        pool.add_query_with(carnage_path(&record.instance_id), Some(TTL_IMMUTABLE), move |report| {
            breakdowns.borrow_mut().push(activity_breakdown(
                report,
                type_info,
                mode,
                party_allies,
                membership_id,
                ally_ids,
                now,
            ));
        });
    }

    if !pool.process().await {
        return Err(pool.take_last_error());
    }
    drop(pool);

    Ok(breakdowns.into_inner())
}
