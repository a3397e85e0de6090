//! Digest-keyed cache for AI-derived structured queries.
//!
//! Identical media uploads hash to the same key, so repeat uploads within
//! the TTL never reach the AI collaborator. Entries expire by TTL only;
//! there is no explicit invalidation. Concurrent misses for the same key
//! may both call the AI and race the write, which is benign — the results
//! are equivalent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::models::StructuredQuery;

/// Voice-derived queries are kept for a day.
pub const VOICE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Image-derived queries are kept for a week.
pub const IMAGE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Content-addressed digest of an uploaded payload.
pub fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

struct Entry {
    query: StructuredQuery,
    expires_at: Instant,
}

pub struct QueryCache {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl QueryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn get(&self, digest: &str) -> Option<StructuredQuery> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(digest) {
            Some(entry) if entry.expires_at > self.clock.now() => Some(entry.query.clone()),
            Some(_) => {
                entries.remove(digest);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, digest: &str, query: StructuredQuery, ttl: Duration) {
        let entry = Entry {
            query,
            expires_at: self.clock.now() + ttl,
        };
        self.entries.lock().unwrap().insert(digest.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_digest_is_stable_and_content_addressed() {
        let a = digest_hex(b"same bytes");
        let b = digest_hex(b"same bytes");
        let c = digest_hex(b"other bytes");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hit_within_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = QueryCache::new(clock.clone());
        cache.put("k", StructuredQuery::from_text("lamp"), VOICE_TTL);

        clock.advance(Duration::from_secs(12 * 60 * 60));
        let hit = cache.get("k").unwrap();
        assert_eq!(hit.query, "lamp");
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = QueryCache::new(clock.clone());
        cache.put("k", StructuredQuery::from_text("lamp"), VOICE_TTL);

        clock.advance(VOICE_TTL + Duration::from_secs(1));
        assert!(cache.get("k").is_none());
        // Expired entry was dropped, not resurrected
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_overwrite_replaces_entry() {
        let clock = Arc::new(ManualClock::new());
        let cache = QueryCache::new(clock.clone());
        cache.put("k", StructuredQuery::from_text("first"), VOICE_TTL);
        cache.put("k", StructuredQuery::from_text("second"), IMAGE_TTL);

        clock.advance(Duration::from_secs(2 * 24 * 60 * 60));
        // Still alive under the longer image TTL, holding the later value
        assert_eq!(cache.get("k").unwrap().query, "second");
    }
}
