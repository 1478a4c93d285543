//! Activity collection and retention.
//!
//! One pool per category pulls recent history for every (character,
//! mode) pair; the merged working set is then filtered to the activity
//! window, ranked newest first and truncated.

use std::cell::RefCell;
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::api::{id_string, QueryError, QueryPool, RemoteSource, TTL_VOLATILE};
use crate::cache::QueryCache;
use crate::models::{ActivityRecord, ActivityTypeInfo, Character};

use super::calculator::{ACTIVITY_COUNT_LIMIT, ACTIVITY_DAYS_LIMIT, MIN_ACTIVITY_SECONDS};

/// Fireteam size assumed when the definitions block omits one.
pub const DEFAULT_MAX_PARTY: i64 = 3;

/// History rows requested per query: three times the retention cap, to
/// tolerate post-filtering shrinkage.
const HISTORY_REQUEST_COUNT: usize = ACTIVITY_COUNT_LIMIT * 3;

/// Characters on the account that played within the activity window.
pub fn collect_characters(account: &Value, now: DateTime<Utc>) -> Vec<Character> {
    let cutoff = now - Duration::days(ACTIVITY_DAYS_LIMIT);

    account
        .pointer("/Response/data/characters")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let base = item.pointer("/characterBase")?;
                    let id = id_string(base.pointer("/characterId"))?;
                    let last_played_at = base
                        .pointer("/dateLastPlayed")
                        .and_then(Value::as_str)
                        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())?
                        .with_timezone(&Utc);
                    Some(Character { id, last_played_at })
                })
                .filter(|character| character.is_active(cutoff))
                .collect()
        })
        .unwrap_or_default()
}

/// Parse one history row; rows without a readable period are skipped.
fn parse_activity(item: &Value) -> Option<ActivityRecord> {
    let period = item
        .pointer("/period")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())?
        .with_timezone(&Utc);

    Some(ActivityRecord {
        period,
        duration_seconds: item
            .pointer("/values/activityDurationSeconds/basic/value")
            .and_then(Value::as_f64)
            .unwrap_or(0.0) as i64,
        mode: item.pointer("/activityDetails/mode").and_then(Value::as_i64).unwrap_or(0),
        reference_id: id_string(item.pointer("/activityDetails/referenceId")).unwrap_or_default(),
        instance_id: id_string(item.pointer("/activityDetails/instanceId")).unwrap_or_default(),
    })
}

/// Fold one history page into the working set: its activity rows and
/// its activity-type definitions. The definitions block arrives either
/// as an array or keyed by hash; both carry `activityHash` rows.
fn merge_history_page(
    document: &Value,
    records: &mut Vec<ActivityRecord>,
    types: &mut HashMap<String, ActivityTypeInfo>,
) {
    if let Some(items) = document.pointer("/Response/data/activities").and_then(Value::as_array) {
        records.extend(items.iter().filter_map(parse_activity));
    }

    let definitions: Vec<&Value> = match document.pointer("/Response/definitions/activities") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(map)) => map.values().collect(),
        _ => Vec::new(),
    };

    for definition in definitions {
        let Some(hash) = id_string(definition.pointer("/activityHash")) else {
            continue;
        };
        types.insert(
            hash,
            ActivityTypeInfo {
                title: definition
                    .pointer("/activityName")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                max_party: definition
                    .pointer("/maxParty")
                    .and_then(Value::as_i64)
                    .unwrap_or(DEFAULT_MAX_PARTY),
            },
        );
    }
}

/// Pull recent history for every (character, mode) pair of a category
/// and merge the pages into one working set plus the accompanying
/// activity-type metadata.
pub async fn collect_category_activities<S: RemoteSource>(
    source: &S,
    cache: &dyn QueryCache,
    membership_id: &str,
    characters: &[Character],
    modes: &[i64],
) -> Result<(Vec<ActivityRecord>, HashMap<String, ActivityTypeInfo>), QueryError> {
    let merged = RefCell::new((Vec::new(), HashMap::new()));

    let mut pool = QueryPool::new(source, cache);
    for mode in modes {
        for character in characters {
            let path = format!(
                "/Destiny/Stats/ActivityHistory/1/{}/{}/?mode={}&count={}&definitions=true",
                membership_id, character.id, mode, HISTORY_REQUEST_COUNT,
            );
            pool.add_query_with(path, Some(TTL_VOLATILE), |document| {
                let mut merged = merged.borrow_mut();
                let (records, types) = &mut *merged;
                merge_history_page(document, records, types);
            });
        }
    }

    if !pool.process().await {
        return Err(pool.take_last_error());
    }
    drop(pool);

    Ok(merged.into_inner())
}

/// Filter, rank and truncate the merged history: drop activities
/// outside the window or shorter than the minimum duration, newest
/// first, at most [`ACTIVITY_COUNT_LIMIT`] retained.
pub fn prepare_activities(mut records: Vec<ActivityRecord>, now: DateTime<Utc>) -> Vec<ActivityRecord> {
    let cutoff = now - Duration::days(ACTIVITY_DAYS_LIMIT);

    records.retain(|record| record.period >= cutoff && record.duration_seconds >= MIN_ACTIVITY_SECONDS);
    records.sort_by(|a, b| b.period.cmp(&a.period));
    records.truncate(ACTIVITY_COUNT_LIMIT);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeSource;
    use crate::cache::MemoryCache;
    use serde_json::json;

    fn account_doc(characters: Vec<Value>) -> Value {
        json!({ "data": { "characters": characters } })
    }

    fn character_entry(id: &str, last_played: DateTime<Utc>) -> Value {
        json!({
            "characterBase": { "characterId": id, "dateLastPlayed": last_played.to_rfc3339() }
        })
    }

    fn history_item(period: DateTime<Utc>, duration: i64, instance: &str) -> Value {
        json!({
            "period": period.to_rfc3339(),
            "values": { "activityDurationSeconds": { "basic": { "value": duration } } },
            "activityDetails": { "mode": 4, "referenceId": "900", "instanceId": instance }
        })
    }

    fn record(period: DateTime<Utc>, duration: i64) -> ActivityRecord {
        ActivityRecord {
            period,
            duration_seconds: duration,
            mode: 4,
            reference_id: "900".to_string(),
            instance_id: "1".to_string(),
        }
    }

    #[test]
    fn test_collect_characters_filters_inactive() {
        let now = Utc::now();
        let account = json!({
            "ErrorCode": 1,
            "Response": account_doc(vec![
                character_entry("alive", now - Duration::days(3)),
                character_entry("dormant", now - Duration::days(90)),
                json!({ "characterBase": { "characterId": "broken" } }),
            ])
        });

        let characters = collect_characters(&account, now);
        assert_eq!(characters.len(), 1);
        assert_eq!(characters[0].id, "alive");
    }

    #[test]
    fn test_parse_activity_skips_unreadable_periods() {
        assert!(parse_activity(&json!({ "period": "garbage" })).is_none());
        assert!(parse_activity(&json!({ "values": {} })).is_none());
    }

    #[test]
    fn test_merge_accepts_array_and_keyed_definitions() {
        let mut records = Vec::new();
        let mut types = HashMap::new();

        merge_history_page(
            &json!({ "Response": { "definitions": { "activities": [
                { "activityHash": 900, "activityName": "Vault of Glass", "maxParty": 6 }
            ] } } }),
            &mut records,
            &mut types,
        );
        merge_history_page(
            &json!({ "Response": { "definitions": { "activities": {
                "901": { "activityHash": "901", "activityName": "Skirmish" }
            } } } }),
            &mut records,
            &mut types,
        );

        assert_eq!(types.get("900").unwrap().max_party, 6);
        assert_eq!(types.get("900").unwrap().title, "Vault of Glass");
        // Missing maxParty falls back to the smallest standard fireteam.
        assert_eq!(types.get("901").unwrap().max_party, DEFAULT_MAX_PARTY);
    }

    #[tokio::test]
    async fn test_collect_merges_every_character_and_mode() {
        let now = Utc::now();
        let source = FakeSource::new();
        let cache = MemoryCache::new();

        let characters = vec![
            Character { id: "c1".to_string(), last_played_at: now },
            Character { id: "c2".to_string(), last_played_at: now },
        ];

        for mode in [2i64, 6] {
            for character in &characters {
                let path = format!(
                    "/Destiny/Stats/ActivityHistory/1/member/{}/?mode={}&count=75&definitions=true",
                    character.id, mode
                );
                source.insert_ok(
                    &path,
                    json!({
                        "data": { "activities": [history_item(now, 600, &format!("{mode}-{}", character.id))] },
                        "definitions": { "activities": [
                            { "activityHash": 900, "activityName": "Strike", "maxParty": 3 }
                        ] }
                    }),
                );
            }
        }

        let (records, types) =
            collect_category_activities(&source, &cache, "member", &characters, &[2, 6])
                .await
                .unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(source.fetch_count(), 4);
        assert_eq!(types.len(), 1);
    }

    #[tokio::test]
    async fn test_collect_propagates_batch_failure() {
        let now = Utc::now();
        let source = FakeSource::new();
        let cache = MemoryCache::new();

        let characters = vec![Character { id: "c1".to_string(), last_played_at: now }];
        source.insert_error(
            "/Destiny/Stats/ActivityHistory/1/member/c1/?mode=4&count=75&definitions=true",
            "DestinyAccountNotFound",
        );

        let error = collect_category_activities(&source, &cache, "member", &characters, &[4])
            .await
            .unwrap_err();
        assert_eq!(error, QueryError::Upstream("DestinyAccountNotFound".to_string()));
    }

    #[test]
    fn test_retention_keeps_25_recent_ordered() {
        let now = Utc::now();
        // 30 activities spanning 0..90 days old, all longer than the
        // minimum duration; 27 fall inside the window.
        let mut records: Vec<ActivityRecord> =
            (0..27).map(|i| record(now - Duration::days(i * 2), 600)).collect();
        records.extend([70, 80, 90].into_iter().map(|days| record(now - Duration::days(days), 600)));
        assert_eq!(records.len(), 30);

        let retained = prepare_activities(records, now);

        assert_eq!(retained.len(), ACTIVITY_COUNT_LIMIT);
        let cutoff = now - Duration::days(ACTIVITY_DAYS_LIMIT);
        for pair in retained.windows(2) {
            assert!(pair[0].period >= pair[1].period);
        }
        assert!(retained.iter().all(|r| r.period >= cutoff));
    }

    #[test]
    fn test_retention_drops_short_activities() {
        let now = Utc::now();
        let records = vec![record(now, 119), record(now, 120), record(now, 600)];

        let retained = prepare_activities(records, now);
        assert_eq!(retained.len(), 2);
        assert!(retained.iter().all(|r| r.duration_seconds >= 120));
    }

    #[test]
    fn test_retention_is_idempotent() {
        let now = Utc::now();
        let records: Vec<ActivityRecord> =
            (0..40).map(|i| record(now - Duration::days(i * 2), 300 + i)).collect();

        let once = prepare_activities(records, now);
        let twice = prepare_activities(once.clone(), now);

        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.period, b.period);
            assert_eq!(a.instance_id, b.instance_id);
        }
    }
}
