//!
//! Topics: the message bus shared by independently scheduled processes.
//!
//! A topic is a named list of [`Request`]s kept sorted ascending by priority,
//! so the highest-priority request always sits at the tail. Every request
//! carries an absolute expiry cycle (`ttl`); once the current cycle exceeds
//! it the request is never handed out again and is dropped on access or by
//! [`Topics::sweep_expired`].
//!
//! Payloads are typed per topic through [`TopicKey`]. The first publish to a
//! name binds that topic to the key's payload type.

use std::any::{type_name, Any};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::types::Cycle;

/// One message on a topic.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Request<T> {
    /// Higher values are served first.
    pub priority: f64,
    /// Last cycle (inclusive) at which the request may be returned.
    pub ttl: Cycle,
    pub details: T,
}

impl<T> Request<T> {
    #[inline]
    pub fn is_expired(&self, cycle: Cycle) -> bool {
        cycle > self.ttl
    }
}

/// Typed handle to a topic. The name is the topic identifier; `T` is the
/// payload type carried on it.
pub struct TopicKey<T> {
    name: Cow<'static, str>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> TopicKey<T> {
    pub const fn new(name: &'static str) -> Self {
        TopicKey { name: Cow::Borrowed(name), _payload: PhantomData }
    }

    /// Key for a name built at runtime (e.g. one topic per room).
    pub fn owned(name: impl Into<String>) -> Self {
        TopicKey { name: Cow::Owned(name.into()), _payload: PhantomData }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for TopicKey<T> {
    fn clone(&self) -> Self {
        TopicKey { name: self.name.clone(), _payload: PhantomData }
    }
}

impl<T> fmt::Debug for TopicKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicKey")
            .field("name", &self.name)
            .field("payload", &type_name::<T>())
            .finish()
    }
}

struct Topic<T> {
    requests: Vec<Request<T>>,
}

impl<T> Topic<T> {
    fn new() -> Self {
        Topic { requests: Vec::new() }
    }

    fn insert(&mut self, request: Request<T>) {
        // Equal priorities: the newest lands closest to the tail.
        let at = self
            .requests
            .partition_point(|r| r.priority.total_cmp(&request.priority) != Ordering::Greater);
        self.requests.insert(at, request);
    }

    fn drop_expired(&mut self, cycle: Cycle) -> usize {
        let before = self.requests.len();
        self.requests.retain(|r| !r.is_expired(cycle));
        before - self.requests.len()
    }
}

/// Type-erased view of a topic, used for sweeps and untyped queries.
trait ErasedTopic {
    fn sweep(&mut self, cycle: Cycle) -> usize;
    fn live_len(&self, cycle: Cycle) -> usize;
    fn is_empty(&self) -> bool;
    fn payload_type(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> ErasedTopic for Topic<T> {
    fn sweep(&mut self, cycle: Cycle) -> usize {
        self.drop_expired(cycle)
    }

    fn live_len(&self, cycle: Cycle) -> usize {
        self.requests.iter().filter(|r| !r.is_expired(cycle)).count()
    }

    fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn payload_type(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Keyed collection of priority-ordered, time-bounded message queues.
pub struct Topics {
    topics: BTreeMap<String, Box<dyn ErasedTopic>>,
    cycle: Cycle,
    last_sweep: Option<Cycle>,
    default_ttl: Cycle,
}

impl Default for Topics {
    fn default() -> Self {
        Topics::new(KernelConfig::default().default_ttl)
    }
}

impl fmt::Debug for Topics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sizes: BTreeMap<&str, usize> = self
            .topics
            .iter()
            .map(|(name, topic)| (name.as_str(), topic.live_len(self.cycle)))
            .collect();
        f.debug_struct("Topics")
            .field("cycle", &self.cycle)
            .field("default_ttl", &self.default_ttl)
            .field("topics", &sizes)
            .finish()
    }
}

impl Topics {
    pub fn new(default_ttl: Cycle) -> Self {
        Topics { topics: BTreeMap::new(), cycle: 0, last_sweep: None, default_ttl }
    }

    pub fn from_config(config: &KernelConfig) -> Self {
        Self::new(config.default_ttl)
    }

    /// Advances the bus to the host's current cycle. Expiry is judged against it.
    pub fn set_cycle(&mut self, cycle: Cycle) {
        if cycle < self.cycle {
            tracing::warn!(from = self.cycle, to = cycle, "Topics cycle moved backwards");
        }
        self.cycle = cycle;
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    pub fn default_ttl(&self) -> Cycle {
        self.default_ttl
    }

    /// Publishes with the default ttl. See [`Topics::publish_with_ttl`].
    pub fn publish<T: 'static>(
        &mut self,
        key: &TopicKey<T>,
        priority: f64,
        details: T,
    ) -> Result<(), KernelError> {
        self.publish_with_ttl(key, priority, details, self.default_ttl)
    }

    /// Inserts a request that stays valid for `ttl` more cycles, creating
    /// the topic if needed.
    pub fn publish_with_ttl<T: 'static>(
        &mut self,
        key: &TopicKey<T>,
        priority: f64,
        details: T,
        ttl: Cycle,
    ) -> Result<(), KernelError> {
        let expires = self.cycle.saturating_add(ttl);
        let entry = self
            .topics
            .entry(key.name().to_owned())
            .or_insert_with(|| Box::new(Topic::<T>::new()) as Box<dyn ErasedTopic>);
        let topic = entry.as_any_mut().downcast_mut::<Topic<T>>().ok_or_else(|| {
            KernelError::TopicTypeMismatch { topic: key.name().to_owned(), expected: type_name::<T>() }
        })?;
        topic.insert(Request { priority, ttl: expires, details });
        tracing::trace!(topic = key.name(), priority, ttl = expires, "Request published");
        Ok(())
    }

    /// Removes and returns the highest-priority unexpired request. Expired
    /// requests met on the way are discarded.
    pub fn consume_highest_priority<T: 'static>(&mut self, key: &TopicKey<T>) -> Option<Request<T>> {
        let cycle = self.cycle;
        let topic = self.topic_mut(key)?;
        while let Some(request) = topic.requests.pop() {
            if request.is_expired(cycle) {
                tracing::trace!(topic = key.name(), ttl = request.ttl, "Expired request discarded");
                continue;
            }
            return Some(request);
        }
        None
    }

    /// Same selection as [`Topics::consume_highest_priority`] without removal.
    pub fn peek_highest_priority<T: 'static>(&self, key: &TopicKey<T>) -> Option<&Request<T>> {
        let cycle = self.cycle;
        self.topic(key)?.requests.iter().rev().find(|r| !r.is_expired(cycle))
    }

    /// Lets the caller pick a request by arbitrary criteria and removes it.
    ///
    /// Expired requests are dropped first, so `chooser` only sees live ones,
    /// ordered ascending by priority. It returns the index of its choice.
    pub fn consume_matching<T: 'static, F>(&mut self, key: &TopicKey<T>, chooser: F) -> Option<Request<T>>
    where
        F: FnOnce(&[Request<T>]) -> Option<usize>,
    {
        let cycle = self.cycle;
        let topic = self.topic_mut(key)?;
        topic.drop_expired(cycle);
        let index = chooser(&topic.requests)?;
        if index >= topic.requests.len() {
            tracing::warn!(topic = key.name(), index, len = topic.requests.len(), "Chooser returned out-of-range index");
            return None;
        }
        Some(topic.requests.remove(index))
    }

    /// Live requests satisfying `predicate`, highest priority first. Nothing is consumed.
    pub fn filter<T: 'static, P>(&self, key: &TopicKey<T>, mut predicate: P) -> Vec<&Request<T>>
    where
        P: FnMut(&Request<T>) -> bool,
    {
        let cycle = self.cycle;
        match self.topic(key) {
            Some(topic) => topic
                .requests
                .iter()
                .rev()
                .filter(|r| !r.is_expired(cycle) && predicate(r))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Number of live requests on a topic; `0` when absent.
    pub fn len(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |t| t.live_len(self.cycle))
    }

    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }

    /// Drops every expired request on every topic. Runs at most once per
    /// cycle; later calls in the same cycle return `0`.
    pub fn sweep_expired(&mut self) -> usize {
        if self.last_sweep == Some(self.cycle) {
            return 0;
        }
        self.last_sweep = Some(self.cycle);
        let cycle = self.cycle;
        let removed: usize = self.topics.values_mut().map(|t| t.sweep(cycle)).sum();
        self.topics.retain(|_, t| !t.is_empty());
        if removed > 0 {
            tracing::debug!(cycle, removed, "Expired requests swept");
        }
        removed
    }

    pub fn topic_names(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    /// Discards a topic and its requests. Returns whether it existed.
    pub fn remove_topic(&mut self, topic: &str) -> bool {
        self.topics.remove(topic).is_some()
    }

    pub fn clear(&mut self) {
        self.topics.clear();
    }

    fn topic<T: 'static>(&self, key: &TopicKey<T>) -> Option<&Topic<T>> {
        let erased = self.topics.get(key.name())?;
        let found = erased.payload_type();
        let topic = erased.as_any().downcast_ref::<Topic<T>>();
        if topic.is_none() {
            Self::warn_mismatch::<T>(key.name(), found);
        }
        topic
    }

    fn topic_mut<T: 'static>(&mut self, key: &TopicKey<T>) -> Option<&mut Topic<T>> {
        let erased = self.topics.get_mut(key.name())?;
        let found = erased.payload_type();
        let topic = erased.as_any_mut().downcast_mut::<Topic<T>>();
        if topic.is_none() {
            Self::warn_mismatch::<T>(key.name(), found);
        }
        topic
    }

    fn warn_mismatch<T>(topic: &str, found: &'static str) {
        tracing::warn!(topic, expected = type_name::<T>(), found, "Topic read with mismatched payload type");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Haul {
        x: u32,
    }

    const HAUL: TopicKey<Haul> = TopicKey::new("haul");

    fn topics_at(cycle: Cycle) -> Topics {
        let mut topics = Topics::new(100);
        topics.set_cycle(cycle);
        topics
    }

    #[test]
    fn test_peek_then_consume_scenario() {
        let mut topics = topics_at(0);
        topics.publish_with_ttl(&HAUL, 5.0, Haul { x: 1 }, 100).unwrap();
        topics.publish_with_ttl(&HAUL, 9.0, Haul { x: 2 }, 100).unwrap();

        assert_eq!(topics.peek_highest_priority(&HAUL).map(|r| r.priority), Some(9.0));
        let consumed = topics.consume_highest_priority(&HAUL).unwrap();
        assert_eq!(consumed.details, Haul { x: 2 });
        assert_eq!(topics.len("haul"), 1);
        assert_eq!(topics.peek_highest_priority(&HAUL).map(|r| r.priority), Some(5.0));
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut topics = topics_at(3);
        topics.publish(&HAUL, 1.0, Haul { x: 7 }).unwrap();
        assert!(topics.peek_highest_priority(&HAUL).is_some());
        assert!(topics.peek_highest_priority(&HAUL).is_some());
        assert_eq!(topics.len("haul"), 1);
    }

    #[test]
    fn test_absent_topic_reads_are_empty() {
        let mut topics = topics_at(0);
        assert!(topics.consume_highest_priority(&HAUL).is_none());
        assert!(topics.peek_highest_priority(&HAUL).is_none());
        assert!(topics.filter(&HAUL, |_| true).is_empty());
        assert_eq!(topics.len("haul"), 0);
    }

    #[test]
    fn test_ttl_boundary() {
        let mut topics = topics_at(10);
        // Expires at cycle 12 (inclusive).
        topics.publish_with_ttl(&HAUL, 1.0, Haul { x: 1 }, 2).unwrap();

        topics.set_cycle(12);
        assert!(topics.peek_highest_priority(&HAUL).is_some(), "ttl == current cycle is still live");

        topics.set_cycle(13);
        assert!(topics.peek_highest_priority(&HAUL).is_none(), "ttl == current cycle - 1 is expired");
        assert!(topics.consume_highest_priority(&HAUL).is_none());
    }

    #[test]
    fn test_consume_skips_expired_entries() {
        let mut topics = topics_at(0);
        topics.publish_with_ttl(&HAUL, 1.0, Haul { x: 1 }, 50).unwrap();
        topics.publish_with_ttl(&HAUL, 9.0, Haul { x: 9 }, 5).unwrap();

        topics.set_cycle(6);
        let request = topics.consume_highest_priority(&HAUL).unwrap();
        assert_eq!(request.details, Haul { x: 1 });
        assert_eq!(topics.len("haul"), 0);
    }

    #[test]
    fn test_equal_priority_serves_newest_first() {
        let mut topics = topics_at(0);
        topics.publish(&HAUL, 3.0, Haul { x: 1 }).unwrap();
        topics.publish(&HAUL, 3.0, Haul { x: 2 }).unwrap();
        assert_eq!(topics.consume_highest_priority(&HAUL).unwrap().details, Haul { x: 2 });
        assert_eq!(topics.consume_highest_priority(&HAUL).unwrap().details, Haul { x: 1 });
    }

    #[test]
    fn test_consume_matching_picks_by_criteria() {
        let mut topics = topics_at(0);
        for x in [10, 3, 7] {
            topics.publish(&HAUL, x as f64, Haul { x }).unwrap();
        }
        // Nearest to 6.
        let chosen = topics
            .consume_matching(&HAUL, |requests| {
                requests
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, r)| (r.details.x as i64 - 6).abs())
                    .map(|(i, _)| i)
            })
            .unwrap();
        assert_eq!(chosen.details, Haul { x: 7 });
        assert_eq!(topics.len("haul"), 2);
    }

    #[test]
    fn test_consume_matching_ignores_bad_index() {
        let mut topics = topics_at(0);
        topics.publish(&HAUL, 1.0, Haul { x: 1 }).unwrap();
        assert!(topics.consume_matching(&HAUL, |_| Some(5)).is_none());
        assert!(topics.consume_matching(&HAUL, |_| None).is_none());
        assert_eq!(topics.len("haul"), 1);
    }

    #[test]
    fn test_consume_matching_hides_expired() {
        let mut topics = topics_at(0);
        topics.publish_with_ttl(&HAUL, 1.0, Haul { x: 1 }, 1).unwrap();
        topics.publish_with_ttl(&HAUL, 2.0, Haul { x: 2 }, 10).unwrap();
        topics.set_cycle(5);
        let seen = std::cell::Cell::new(0);
        topics.consume_matching(&HAUL, |requests| {
            seen.set(requests.len());
            None
        });
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_filter_inspects_without_consuming() {
        let mut topics = topics_at(0);
        for x in 1..=5 {
            topics.publish(&HAUL, x as f64, Haul { x }).unwrap();
        }
        let even: Vec<u32> = topics.filter(&HAUL, |r| r.details.x % 2 == 0).iter().map(|r| r.details.x).collect();
        assert_eq!(even, vec![4, 2]);
        assert_eq!(topics.len("haul"), 5);
    }

    #[test]
    fn test_type_mismatch() {
        let mut topics = topics_at(0);
        topics.publish(&HAUL, 1.0, Haul { x: 1 }).unwrap();

        let wrong: TopicKey<String> = TopicKey::new("haul");
        assert_eq!(
            topics.publish(&wrong, 1.0, "oops".to_string()),
            Err(KernelError::TopicTypeMismatch { topic: "haul".into(), expected: type_name::<String>() })
        );
        assert!(topics.peek_highest_priority(&wrong).is_none());
        assert!(topics.consume_highest_priority(&wrong).is_none());
        assert_eq!(topics.len("haul"), 1);
    }

    #[test]
    fn test_owned_keys_address_same_topic() {
        let mut topics = topics_at(0);
        let room = TopicKey::<u8>::owned(format!("spawn_{}", "W1N1"));
        topics.publish(&room, 1.0, 4).unwrap();
        assert_eq!(topics.consume_highest_priority(&TopicKey::<u8>::new("spawn_W1N1")).unwrap().details, 4);
    }

    #[test]
    fn test_sweep_is_memoized_per_cycle() {
        let mut topics = topics_at(0);
        topics.publish_with_ttl(&HAUL, 1.0, Haul { x: 1 }, 0).unwrap();
        topics.publish_with_ttl(&HAUL, 2.0, Haul { x: 2 }, 1).unwrap();

        topics.set_cycle(1);
        assert_eq!(topics.sweep_expired(), 1);
        topics.set_cycle(2);
        assert_eq!(topics.sweep_expired(), 1);
        // Same cycle: no second pass.
        topics.publish_with_ttl(&HAUL, 3.0, Haul { x: 3 }, 0).unwrap();
        assert_eq!(topics.sweep_expired(), 0);
        assert_eq!(topics.topic_names().collect::<Vec<_>>(), vec!["haul"]);

        topics.set_cycle(3);
        assert_eq!(topics.sweep_expired(), 1);
        assert_eq!(topics.topic_names().count(), 0, "empty topics are dropped by the sweep");
    }

    #[test]
    fn test_remove_and_clear() {
        let mut topics = topics_at(0);
        topics.publish(&HAUL, 1.0, Haul { x: 1 }).unwrap();
        topics.publish(&TopicKey::<u8>::new("other"), 1.0, 1).unwrap();
        assert!(topics.remove_topic("haul"));
        assert!(!topics.remove_topic("haul"));
        assert_eq!(topics.topic_names().collect::<Vec<_>>(), vec!["other"]);
        topics.clear();
        assert_eq!(topics.topic_names().count(), 0);
    }
}
