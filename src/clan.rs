//! Clan metadata and roster operations.
//!
//! Resolves a clan identifier into its group document, walks the
//! paginated admin and member lists, and orders the roster the way the
//! clan page presents it: founder first, then admins, then everyone
//! else by display name.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use tracing::info;

use crate::api::{
    collect_paginated, id_string, QueryError, QueryPool, RemoteSource, TTL_IMMUTABLE, TTL_PAGE_TAIL,
    TTL_VOLATILE,
};
use crate::cache::QueryCache;
use crate::models::{ClanInfo, ClanMember, ClanMembersReport};
use crate::ordering::natural_cmp;

/// Roster rows the upstream serves per member page.
const MEMBERS_PER_PAGE: i64 = 10;

fn group_path(clan_id: &str) -> String {
    format!("/Group/{clan_id}/")
}

fn group_name_path(name: &str) -> String {
    format!("/Group/Name/{name}/")
}

fn admins_path(clan_id: &str, page: u32) -> String {
    format!("/Group/{clan_id}/AdminsV2/?currentPage={page}&itemsPerPage=50")
}

fn members_path(clan_id: &str, page: i64) -> String {
    format!("/Group/{clan_id}/ClanMembers/?currentPage={page}&platformType=1")
}

/// Resolve a clan identifier (numeric id or name) into the clan's
/// metadata and administrator roster.
pub async fn clan_info<S: RemoteSource>(
    source: &S,
    cache: &dyn QueryCache,
    identifier: &str,
) -> Result<ClanInfo, QueryError> {
    let identifier = identifier.trim().to_lowercase();
    if identifier.is_empty() {
        return Err(QueryError::MissingInput("ClanIdentifierIsEmpty"));
    }

    let clan_id = if identifier.chars().all(|c| c.is_ascii_digit()) {
        identifier
    } else {
        let resolved =
            QueryPool::unique(source, cache, &group_name_path(&identifier), Some(TTL_IMMUTABLE)).await?;
        id_string(resolved.pointer("/Response/detail/groupId"))
            .ok_or_else(|| QueryError::Upstream("ClanNotFound".to_string()))?
    };

    let group = QueryPool::unique(source, cache, &group_path(&clan_id), Some(TTL_IMMUTABLE)).await?;

    let mut admin_ids = Vec::new();
    collect_paginated(
        source,
        cache,
        Some(TTL_PAGE_TAIL),
        |page| admins_path(&clan_id, page),
        |document| {
            if let Some(results) = document.pointer("/Response/results").and_then(Value::as_array) {
                admin_ids.extend(
                    results
                        .iter()
                        .filter_map(|result| id_string(result.pointer("/user/membershipId"))),
                );
            }
        },
    )
    .await?;

    info!("clan {} has {} admins", clan_id, admin_ids.len());

    Ok(ClanInfo {
        id: id_string(group.pointer("/Response/detail/groupId")).unwrap_or(clan_id),
        name: group
            .pointer("/Response/detail/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        admin_ids,
    })
}

/// Collect the rosters of one or more clans, each ordered founder
/// first, then admins, then natural display-name order.
pub async fn clan_members<S: RemoteSource>(
    source: &S,
    cache: &dyn QueryCache,
    clan_ids: &[String],
) -> Result<ClanMembersReport, QueryError> {
    if clan_ids.is_empty() {
        return Err(QueryError::MissingInput("ClanIdsIsEmpty"));
    }

    let rosters: RefCell<BTreeMap<String, Vec<ClanMember>>> =
        RefCell::new(clan_ids.iter().map(|clan_id| (clan_id.clone(), Vec::new())).collect());

    for clan_id in clan_ids {
        let mut pool = QueryPool::new(source, cache);
        pool.add_query(group_path(clan_id), Some(TTL_IMMUTABLE));
        pool.add_query(admins_path(clan_id, 1), Some(TTL_VOLATILE));

        let rosters = &rosters;
        pool.then(move |carry, documents| async move {
            if carry.is_some() {
                return carry;
            }

            let group = &documents[0];
            let admins = &documents[1];

            let admin_ids: HashSet<String> = admins
                .pointer("/Response/results")
                .and_then(Value::as_array)
                .map(|results| {
                    results
                        .iter()
                        .filter_map(|result| id_string(result.pointer("/user/membershipId")))
                        .collect()
                })
                .unwrap_or_default();
            let founder_id = id_string(group.pointer("/Response/founderMembershipId"));

            let member_count = group
                .pointer("/Response/clanMembershipTypes/0/memberCount")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            let total_pages = (member_count + MEMBERS_PER_PAGE - 1) / MEMBERS_PER_PAGE;

            let collected = RefCell::new(Vec::new());
            let mut member_pool = QueryPool::new(source, cache);
            for page in 1..=total_pages {
                // The final page is the one that grows as members join.
                let ttl = if page == total_pages { TTL_PAGE_TAIL } else { TTL_VOLATILE };
                let collected = &collected;
                let admin_ids = &admin_ids;
                let founder_id = founder_id.as_deref();
                member_pool.add_query_with(members_path(clan_id, page), Some(ttl), move |document| {
                    collected
                        .borrow_mut()
                        .extend(parse_member_page(document, admin_ids, founder_id));
                });
            }

            if !member_pool.process().await {
                return Some(member_pool.take_last_error());
            }
            drop(member_pool);

            let mut members = collected.into_inner();
            members.sort_by(|a, b| {
                b.is_founder
                    .cmp(&a.is_founder)
                    .then_with(|| b.is_admin.cmp(&a.is_admin))
                    .then_with(|| natural_cmp(&a.membership_display_name, &b.membership_display_name))
            });

            rosters.borrow_mut().insert(clan_id.clone(), members);
            None
        });

        if !pool.process().await {
            return Err(pool.take_last_error());
        }
        if let Some(error) = pool.take_carry() {
            return Err(error);
        }
    }

    Ok(ClanMembersReport { clan_members: rosters.into_inner() })
}

fn parse_member_page(
    document: &Value,
    admin_ids: &HashSet<String>,
    founder_id: Option<&str>,
) -> Vec<ClanMember> {
    document
        .pointer("/Response/results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|result| {
                    let membership_id = id_string(result.pointer("/destinyUserInfo/membershipId"))?;
                    let member_id =
                        id_string(result.pointer("/bungieNetUserInfo/membershipId")).unwrap_or_default();
                    let is_founder = founder_id == Some(member_id.as_str());
                    let is_admin = admin_ids.contains(&member_id);

                    Some(ClanMember {
                        member_id,
                        membership_id,
                        membership_display_name: result
                            .pointer("/destinyUserInfo/displayName")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        is_founder,
                        is_admin,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeSource;
    use crate::cache::MemoryCache;
    use serde_json::json;

    fn admin_result(member_id: &str) -> Value {
        json!({ "user": { "membershipId": member_id } })
    }

    fn member_result(member_id: &str, membership_id: &str, display_name: &str) -> Value {
        json!({
            "bungieNetUserInfo": { "membershipId": member_id },
            "destinyUserInfo": { "membershipId": membership_id, "displayName": display_name }
        })
    }

    #[tokio::test]
    async fn test_clan_info_rejects_empty_identifier() {
        let source = FakeSource::new();
        let cache = MemoryCache::new();

        let error = clan_info(&source, &cache, "  ").await.unwrap_err();
        assert_eq!(error, QueryError::MissingInput("ClanIdentifierIsEmpty"));
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_clan_info_by_numeric_id() {
        let source = FakeSource::new();
        let cache = MemoryCache::new();

        source.insert_ok(
            "/Group/1961495/",
            json!({ "detail": { "groupId": "1961495", "name": "The Vanguard" } }),
        );
        source.insert_ok(
            &admins_path("1961495", 1),
            json!({ "results": [admin_result("10"), admin_result("11")], "hasMore": true }),
        );
        source.insert_ok(
            &admins_path("1961495", 2),
            json!({ "results": [admin_result("12")], "hasMore": false }),
        );

        let info = clan_info(&source, &cache, "1961495").await.unwrap();
        assert_eq!(info.id, "1961495");
        assert_eq!(info.name, "The Vanguard");
        assert_eq!(info.admin_ids, vec!["10", "11", "12"]);
    }

    #[tokio::test]
    async fn test_clan_info_resolves_names_case_insensitively() {
        let source = FakeSource::new();
        let cache = MemoryCache::new();

        source.insert_ok(
            "/Group/Name/the vanguard/",
            json!({ "detail": { "groupId": 1961495 } }),
        );
        source.insert_ok(
            "/Group/1961495/",
            json!({ "detail": { "groupId": "1961495", "name": "The Vanguard" } }),
        );
        source.insert_ok(
            &admins_path("1961495", 1),
            json!({ "results": [], "hasMore": false }),
        );

        let info = clan_info(&source, &cache, "The Vanguard").await.unwrap();
        assert_eq!(info.id, "1961495");
        assert!(info.admin_ids.is_empty());
    }

    #[tokio::test]
    async fn test_clan_info_propagates_upstream_errors() {
        let source = FakeSource::new();
        let cache = MemoryCache::new();

        source.insert_error("/Group/Name/ghosts/", "GroupNotFound");

        let error = clan_info(&source, &cache, "ghosts").await.unwrap_err();
        assert_eq!(error, QueryError::Upstream("GroupNotFound".to_string()));
    }

    #[tokio::test]
    async fn test_clan_members_orders_founder_admins_then_names() {
        let source = FakeSource::new();
        let cache = MemoryCache::new();

        source.insert_ok(
            "/Group/7/",
            json!({
                "detail": { "groupId": "7" },
                "founderMembershipId": 1,
                "clanMembershipTypes": [ { "memberCount": 12 } ]
            }),
        );
        source.insert_ok(
            &admins_path("7", 1),
            json!({ "results": [admin_result("1"), admin_result("2")] }),
        );
        source.insert_ok(
            &members_path("7", 1),
            json!({ "results": [
                member_result("3", "103", "zeta"),
                member_result("2", "102", "Admiral"),
                member_result("4", "104", "guard10"),
            ] }),
        );
        source.insert_ok(
            &members_path("7", 2),
            json!({ "results": [
                member_result("5", "105", "Guard2"),
                member_result("1", "101", "Founder"),
            ] }),
        );

        let report = clan_members(&source, &cache, &["7".to_string()]).await.unwrap();
        let roster = &report.clan_members["7"];

        let names: Vec<&str> =
            roster.iter().map(|m| m.membership_display_name.as_str()).collect();
        assert_eq!(names, vec!["Founder", "Admiral", "Guard2", "guard10", "zeta"]);

        assert!(roster[0].is_founder && roster[0].is_admin);
        assert!(!roster[1].is_founder && roster[1].is_admin);
        assert!(!roster[2].is_founder && !roster[2].is_admin);
    }

    #[tokio::test]
    async fn test_clan_members_propagates_inner_pool_failure() {
        let source = FakeSource::new();
        let cache = MemoryCache::new();

        source.insert_ok(
            "/Group/7/",
            json!({
                "detail": { "groupId": "7" },
                "founderMembershipId": 1,
                "clanMembershipTypes": [ { "memberCount": 12 } ]
            }),
        );
        source.insert_ok(&admins_path("7", 1), json!({ "results": [] }));
        source.insert_ok(&members_path("7", 1), json!({ "results": [] }));
        source.insert_error(&members_path("7", 2), "GroupNotFound");

        let error = clan_members(&source, &cache, &["7".to_string()]).await.unwrap_err();
        assert_eq!(error, QueryError::Upstream("GroupNotFound".to_string()));
    }

    #[tokio::test]
    async fn test_clan_members_requires_ids() {
        let source = FakeSource::new();
        let cache = MemoryCache::new();

        let error = clan_members(&source, &cache, &[]).await.unwrap_err();
        assert_eq!(error, QueryError::MissingInput("ClanIdsIsEmpty"));
    }

    #[tokio::test]
    async fn test_clan_members_with_empty_roster() {
        let source = FakeSource::new();
        let cache = MemoryCache::new();

        source.insert_ok(
            "/Group/9/",
            json!({ "detail": { "groupId": "9" }, "clanMembershipTypes": [ { "memberCount": 0 } ] }),
        );
        source.insert_ok(&admins_path("9", 1), json!({ "results": [] }));

        let report = clan_members(&source, &cache, &["9".to_string()]).await.unwrap();
        assert!(report.clan_members["9"].is_empty());
    }
}
