use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::KeyValueBackend;
use crate::clock::TimeSource;
use crate::error::BackendError;

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn insert(&mut self, score: i64, member: &str) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(old, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn range(&self, min: i64, max: i64) -> impl Iterator<Item = &(i64, String)> + '_ {
        self.ordered
            .range((min, String::new())..)
            .take_while(move |(score, _)| *score <= max)
    }
}

#[derive(Debug)]
enum Value {
    Hash(HashMap<String, String>),
    Sorted(SortedSet),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    // epoch millis
    expires_at: Option<i64>,
}

/// In-process key-value backend with hashes, sorted sets and whole-key TTL.
///
/// Expiry is checked against the injected clock, so tests can fast-forward
/// retention without sleeping. Expired keys are dropped lazily on access.
pub struct MemoryBackend {
    data: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn TimeSource>,
}

impl MemoryBackend {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self { data: Mutex::new(HashMap::new()), clock }
    }

    fn purge_if_expired(data: &mut HashMap<String, Entry>, key: &str, now: i64) {
        let expired = matches!(data.get(key), Some(Entry { expires_at: Some(at), .. }) if *at <= now);
        if expired {
            data.remove(key);
        }
    }
}

fn wrong_type(operation: &'static str, key: &str) -> BackendError {
    BackendError::store(operation, key, "WRONGTYPE operation against a key holding the wrong kind of value")
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), BackendError> {
        let now = self.clock.now_millis();
        let mut data = self.data.lock().await;
        Self::purge_if_expired(&mut data, key, now);
        let entry = data.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Hash(map) => {
                map.insert(field.to_string(), value.to_string());
                Ok(())
            }
            Value::Sorted(_) => Err(wrong_type("hset", key)),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, BackendError> {
        let now = self.clock.now_millis();
        let mut data = self.data.lock().await;
        Self::purge_if_expired(&mut data, key, now);
        match data.get(key) {
            None => Ok(HashMap::new()),
            Some(Entry { value: Value::Hash(map), .. }) => Ok(map.clone()),
            Some(_) => Err(wrong_type("hgetall", key)),
        }
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), BackendError> {
        let now = self.clock.now_millis();
        let mut data = self.data.lock().await;
        Self::purge_if_expired(&mut data, key, now);
        let entry = data.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Sorted(SortedSet::default()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Sorted(set) => {
                set.insert(score, member);
                Ok(())
            }
            Value::Hash(_) => Err(wrong_type("zadd", key)),
        }
    }

    async fn zrange_by_score(&self, key: &str, min: i64, max: i64) -> Result<Vec<String>, BackendError> {
        let now = self.clock.now_millis();
        let mut data = self.data.lock().await;
        Self::purge_if_expired(&mut data, key, now);
        match data.get(key) {
            None => Ok(Vec::new()),
            Some(Entry { value: Value::Sorted(set), .. }) => {
                Ok(set.range(min, max).map(|(_, member)| member.clone()).collect())
            }
            Some(_) => Err(wrong_type("zrangebyscore", key)),
        }
    }

    async fn zrem_range_by_score(&self, key: &str, min: i64, max: i64) -> Result<u64, BackendError> {
        let now = self.clock.now_millis();
        let mut data = self.data.lock().await;
        Self::purge_if_expired(&mut data, key, now);
        let set = match data.get_mut(key) {
            None => return Ok(0),
            Some(Entry { value: Value::Sorted(set), .. }) => set,
            Some(_) => return Err(wrong_type("zremrangebyscore", key)),
        };
        let doomed: Vec<(i64, String)> = set.range(min, max).cloned().collect();
        for item in &doomed {
            set.ordered.remove(item);
            set.scores.remove(&item.1);
        }
        // an emptied sorted set ceases to exist
        if set.ordered.is_empty() {
            data.remove(key);
        }
        Ok(doomed.len() as u64)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        let now = self.clock.now_millis();
        let mut data = self.data.lock().await;
        data.retain(|_, entry| entry.expires_at.map_or(true, |at| at > now));
        let mut keys: Vec<String> = data.keys().filter(|k| glob_match(pattern, k)).cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), BackendError> {
        let now = self.clock.now_millis();
        let mut data = self.data.lock().await;
        Self::purge_if_expired(&mut data, key, now);
        if let Some(entry) = data.get_mut(key) {
            let ttl_millis = i64::try_from(ttl_secs).unwrap_or(i64::MAX).saturating_mul(1000);
            entry.expires_at = Some(now.saturating_add(ttl_millis));
        }
        Ok(())
    }
}

/// Glob matching with `*` (any run) and `?` (any single char).
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            resume = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            resume += 1;
            ti = resume;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
