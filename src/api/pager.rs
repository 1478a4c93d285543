//! Pagination over multi-page result sets.

use serde_json::Value;
use tracing::warn;

use super::{QueryError, QueryPool, RemoteSource};
use crate::cache::QueryCache;

/// Upper bound on pages walked before the loop is declared runaway.
/// The upstream signals exhaustion itself; this guards against an API
/// that never stops reporting `hasMore`.
pub const PAGE_SAFETY_LIMIT: u32 = 500;

/// Walk a paginated resource from page 1 until the response clears its
/// `hasMore` flag, handing every page document to `on_page`. The first
/// failed page aborts the walk; no further pages are issued.
pub async fn collect_paginated<S, P, F>(
    source: &S,
    cache: &dyn QueryCache,
    ttl_minutes: Option<i64>,
    mut page_path: P,
    mut on_page: F,
) -> Result<(), QueryError>
where
    S: RemoteSource,
    P: FnMut(u32) -> String,
    F: FnMut(&Value),
{
    for page in 1..=PAGE_SAFETY_LIMIT {
        let document = QueryPool::unique(source, cache, &page_path(page), ttl_minutes).await?;
        on_page(&document);

        let has_more = document
            .pointer("/Response/hasMore")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !has_more {
            return Ok(());
        }
    }

    warn!("pagination exceeded {} pages without completing", PAGE_SAFETY_LIMIT);
    Err(QueryError::PageOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeSource;
    use crate::cache::MemoryCache;
    use serde_json::json;

    fn page_path(page: u32) -> String {
        format!("/Group/42/AdminsV2/?currentPage={page}&itemsPerPage=50")
    }

    #[test]
    fn test_walk_stops_when_has_more_clears() {
        let source = FakeSource::new();
        source.insert_ok(&page_path(1), json!({ "results": ["a"], "hasMore": true }));
        source.insert_ok(&page_path(2), json!({ "results": ["b"], "hasMore": true }));
        source.insert_ok(&page_path(3), json!({ "results": ["c"], "hasMore": false }));
        let cache = MemoryCache::new();

        let mut collected = Vec::new();
        tokio_test::block_on(collect_paginated(&source, &cache, None, page_path, |document| {
            if let Some(results) = document.pointer("/Response/results").and_then(|v| v.as_array()) {
                collected.extend(results.iter().filter_map(|v| v.as_str().map(String::from)));
            }
        }))
        .unwrap();

        assert_eq!(collected, vec!["a", "b", "c"]);
        assert_eq!(source.fetch_count(), 3);
    }

    #[test]
    fn test_failed_page_aborts_the_walk() {
        let source = FakeSource::new();
        source.insert_ok(&page_path(1), json!({ "results": [], "hasMore": true }));
        source.insert_error(&page_path(2), "GroupNotFound");
        source.insert_ok(&page_path(3), json!({ "results": [], "hasMore": false }));
        let cache = MemoryCache::new();

        let error = tokio_test::block_on(collect_paginated(&source, &cache, None, page_path, |_| {}))
            .unwrap_err();

        assert_eq!(error, QueryError::Upstream("GroupNotFound".to_string()));
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn test_runaway_pagination_hits_the_safety_bound() {
        let source = FakeSource::new();
        for page in 1..=PAGE_SAFETY_LIMIT {
            source.insert_ok(&page_path(page), json!({ "results": [], "hasMore": true }));
        }
        let cache = MemoryCache::new();

        let error = tokio_test::block_on(collect_paginated(&source, &cache, None, page_path, |_| {}))
            .unwrap_err();

        assert_eq!(error, QueryError::PageOverflow);
        assert_eq!(source.fetch_count(), PAGE_SAFETY_LIMIT as usize);
    }
}
