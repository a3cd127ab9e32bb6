//! Insertion-ordered string set with a timestamp per entry.
//!
//! Backs the seen-state collections (known followings, recently checked
//! users). Serializes as a JSON object mapping entry to RFC 3339 timestamp,
//! in insertion order, so truncation to the newest N entries survives a
//! round-trip.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Default)]
pub struct OrderedSet {
    order: Vec<String>,
    times: HashMap<String, DateTime<Utc>>,
}

impl OrderedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `item` stamped with the current time. Returns `false` (and
    /// keeps the original timestamp) if the item was already present.
    pub fn add(&mut self, item: impl Into<String>) -> bool {
        self.add_at(item, Utc::now())
    }

    /// Insert `item` with an explicit timestamp.
    pub fn add_at(&mut self, item: impl Into<String>, time: DateTime<Utc>) -> bool {
        let item = item.into();
        if self.times.contains_key(&item) {
            return false;
        }
        self.order.push(item.clone());
        self.times.insert(item, time);
        true
    }

    pub fn remove(&mut self, item: &str) -> bool {
        if self.times.remove(item).is_none() {
            return false;
        }
        self.order.retain(|i| i != item);
        true
    }

    pub fn contains(&self, item: &str) -> bool {
        self.times.contains_key(item)
    }

    /// The timestamp the item was added at, if present.
    pub fn time_of(&self, item: &str) -> Option<DateTime<Utc>> {
        self.times.get(item).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn extend<I: IntoIterator<Item = S>, S: Into<String>>(&mut self, items: I) {
        for item in items {
            self.add(item);
        }
    }

    /// Drop everything but the most recently inserted `n` entries.
    pub fn truncate_to_last(&mut self, n: usize) {
        if self.order.len() <= n {
            return;
        }
        let cut = self.order.len() - n;
        for dropped in self.order.drain(..cut) {
            self.times.remove(&dropped);
        }
    }

    /// Remove entries whose timestamp is older than `horizon`.
    pub fn expire_older_than(&mut self, horizon: DateTime<Utc>) -> usize {
        let stale: Vec<String> = self
            .order
            .iter()
            .filter(|item| self.times.get(*item).is_some_and(|t| *t < horizon))
            .cloned()
            .collect();
        for item in &stale {
            self.remove(item);
        }
        stale.len()
    }
}

impl<S: Into<String>> FromIterator<S> for OrderedSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Serialize for OrderedSet {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut map = serializer.serialize_map(Some(self.order.len()))?;
        for item in &self.order {
            map.serialize_entry(item, &self.times[item])?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OrderedSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SetVisitor;

        impl<'de> Visitor<'de> for SetVisitor {
            type Value = OrderedSet;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of entry to RFC 3339 timestamp")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<OrderedSet, A::Error> {
                let mut set = OrderedSet::new();
                while let Some((item, time)) = access.next_entry::<String, DateTime<Utc>>()? {
                    set.add_at(item, time);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(SetVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn keeps_insertion_order() {
        let set: OrderedSet = ["c", "a", "b"].into_iter().collect();
        let order: Vec<&str> = set.iter().collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn duplicate_add_keeps_first_timestamp() {
        let mut set = OrderedSet::new();
        let early = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        assert!(set.add_at("user@peer.example", early));
        assert!(!set.add("user@peer.example"));
        assert_eq!(set.time_of("user@peer.example"), Some(early));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn truncate_keeps_newest_entries() {
        let mut set = OrderedSet::new();
        for i in 0..10 {
            set.add(format!("user{i}"));
        }
        set.truncate_to_last(3);
        let order: Vec<&str> = set.iter().collect();
        assert_eq!(order, vec!["user7", "user8", "user9"]);
        assert!(!set.contains("user0"));
    }

    #[test]
    fn expire_drops_only_old_entries() {
        let mut set = OrderedSet::new();
        let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        set.add_at("stale@peer.example", old);
        set.add("fresh@peer.example");
        let horizon = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(set.expire_older_than(horizon), 1);
        assert!(!set.contains("stale@peer.example"));
        assert!(set.contains("fresh@peer.example"));
    }

    #[test]
    fn json_round_trip_preserves_order_and_times() {
        let mut set = OrderedSet::new();
        let t1 = Utc.with_ymd_and_hms(2023, 5, 1, 10, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2023, 5, 2, 10, 0, 0).unwrap();
        set.add_at("b@x.example", t1);
        set.add_at("a@y.example", t2);

        let json = serde_json::to_string(&set).unwrap();
        let restored: OrderedSet = serde_json::from_str(&json).unwrap();

        let order: Vec<&str> = restored.iter().collect();
        assert_eq!(order, vec!["b@x.example", "a@y.example"]);
        assert_eq!(restored.time_of("b@x.example"), Some(t1));
        assert_eq!(restored.time_of("a@y.example"), Some(t2));
    }
}
