//! Bidirectional course-identifier cache: Canvas numeric course IDs on one
//! side, SIS-style course codes on the other. Resolving the same identifier
//! twice within the TTL window never re-hits Canvas.

use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::Mutex;

struct CacheEntry {
    value: String,
    refreshed_at: Instant,
}

/// Owned by the server for its whole lifetime; not a process-global.
pub struct CourseCache {
    code_to_id: Mutex<HashMap<String, CacheEntry>>,
    id_to_code: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl CourseCache {
    pub fn new(ttl: Duration) -> Self {
        CourseCache {
            code_to_id: Mutex::new(HashMap::new()),
            id_to_code: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Replaces the entire cache in both directions from a fresh full course
    /// listing. Called after a miss so later lookups in this refresh window
    /// are served from memory.
    pub async fn refresh(&self, courses: &[(String, String)]) {
        let now = Instant::now();
        let mut code_to_id = self.code_to_id.lock().await;
        let mut id_to_code = self.id_to_code.lock().await;
        code_to_id.clear();
        id_to_code.clear();
        for (id, code) in courses {
            code_to_id.insert(
                code.clone(),
                CacheEntry {
                    value: id.clone(),
                    refreshed_at: now,
                },
            );
            id_to_code.insert(
                id.clone(),
                CacheEntry {
                    value: code.clone(),
                    refreshed_at: now,
                },
            );
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.code_to_id.lock().await.is_empty()
    }

    /// Canvas numeric ID for `course_code`, if cached and not stale.
    pub async fn lookup_id(&self, course_code: &str) -> Option<String> {
        lookup(&self.code_to_id, course_code, self.ttl).await
    }

    /// Course code for a Canvas numeric ID, if cached and not stale.
    pub async fn lookup_code(&self, course_id: &str) -> Option<String> {
        lookup(&self.id_to_code, course_id, self.ttl).await
    }

    /// Inserts or refreshes a single resolved pair, e.g. after a direct
    /// single-course fetch fallback.
    pub async fn put(&self, course_id: &str, course_code: &str) {
        let now = Instant::now();
        self.code_to_id.lock().await.insert(
            course_code.to_string(),
            CacheEntry {
                value: course_id.to_string(),
                refreshed_at: now,
            },
        );
        self.id_to_code.lock().await.insert(
            course_id.to_string(),
            CacheEntry {
                value: course_code.to_string(),
                refreshed_at: now,
            },
        );
    }
}

async fn lookup(map: &Mutex<HashMap<String, CacheEntry>>, key: &str, ttl: Duration) -> Option<String> {
    let map = map.lock().await;
    let entry = map.get(key)?;
    if entry.refreshed_at.elapsed() > ttl {
        return None;
    }
    Some(entry.value.clone())
}

/// Classifies a raw course identifier the way `resolveToId` does, ahead of
/// any cache/network lookup: a plain digit string or an explicit
/// `sis_course_id:` prefix is already resolvable without Canvas involvement.
pub fn is_numeric_course_id(identifier: &str) -> bool {
    !identifier.is_empty() && identifier.chars().all(|c| c.is_ascii_digit())
}

pub fn is_explicit_sis_id(identifier: &str) -> bool {
    identifier.starts_with("sis_course_id:")
}

/// Course-code heuristic: by the time this is consulted, the identifier has
/// already failed the numeric-ID and explicit-SIS-prefix checks, so any
/// remaining non-digit character is enough to treat it as a human course
/// code (e.g. `CS225_SP24`, but also a bare `CS225`).
pub fn looks_like_course_code(identifier: &str) -> bool {
    !identifier.is_empty() && !identifier.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[tokio::test]
    async fn lookup_misses_before_any_refresh() {
        let cache = CourseCache::new(Duration::from_secs(300));
        assert_eq!(cache.lookup_id("CS225_SP24").await, None);
    }

    #[tokio::test]
    async fn refresh_populates_both_directions() {
        let cache = CourseCache::new(Duration::from_secs(300));
        cache
            .refresh(&[("101".to_string(), "CS225_SP24".to_string())])
            .await;
        assert_eq!(cache.lookup_id("CS225_SP24").await, Some("101".to_string()));
        assert_eq!(cache.lookup_code("101").await, Some("CS225_SP24".to_string()));
    }

    #[tokio::test]
    async fn stale_entries_are_treated_as_misses() {
        let cache = CourseCache::new(Duration::from_millis(1));
        cache
            .refresh(&[("101".to_string(), "CS225_SP24".to_string())])
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.lookup_id("CS225_SP24").await, None);
    }

    #[test]
    fn identifier_classification_matches_resolution_rules() {
        assert!(is_numeric_course_id("12345"));
        assert!(!is_numeric_course_id("CS225_SP24"));
        assert!(is_explicit_sis_id("sis_course_id:abc"));
        assert!(looks_like_course_code("CS225_SP24"));
        assert!(looks_like_course_code("CS225"));
        assert!(!looks_like_course_code("12345"));
    }
}
