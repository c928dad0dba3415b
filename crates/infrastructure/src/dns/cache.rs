//! Response cache keyed by question and DO bit.
//!
//! TTL-bounded LRU. Entries expire at the smallest TTL found in the response;
//! answerless responses use a short negative TTL so upstream hiccups are not
//! pinned in memory.

use hickory_proto::op::Message;
use hickory_proto::rr::RecordType;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

const NEGATIVE_TTL_SECS: u64 = 30;
const MAX_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    qname: String,
    qtype: RecordType,
    dnssec_ok: bool,
}

impl CacheKey {
    pub fn from_message(msg: &Message) -> Option<Self> {
        let query = msg.queries().first()?;
        let dnssec_ok = msg
            .extensions()
            .as_ref()
            .map(|edns| edns.dnssec_ok())
            .unwrap_or(false);
        Some(CacheKey {
            qname: query.name().to_utf8().to_lowercase(),
            qtype: query.query_type(),
            dnssec_ok,
        })
    }
}

struct CacheEntry {
    response: Message,
    expires_at: Instant,
}

pub struct ResponseCache {
    entries: LruCache<CacheKey, CacheEntry>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        ResponseCache {
            entries: LruCache::new(capacity),
        }
    }

    /// Cached response for `key`, with its id rewritten to `id`.
    pub fn get(&mut self, key: &CacheKey, id: u16) -> Option<Message> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                let mut response = entry.response.clone();
                response.set_id(id);
                Some(response)
            }
            Some(_) => {
                self.entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, key: CacheKey, response: Message) {
        let ttl = response_ttl(&response);
        if ttl.is_zero() {
            return;
        }
        self.entries.put(
            key,
            CacheEntry {
                response,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn response_ttl(response: &Message) -> Duration {
    let min_ttl = response.answers().iter().map(|r| r.ttl()).min();
    let secs = match min_ttl {
        Some(ttl) => u64::from(ttl).min(MAX_TTL_SECS),
        None => NEGATIVE_TTL_SECS,
    };
    Duration::from_secs(secs)
}
