//! Session-scoped, in-memory storage for resolved users.
//!
//! Nothing here survives the process: the directory is small relative to a
//! session, so entries are never evicted, and a re-authorization or region
//! change simply starts over with a fresh session.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::directory::types::User;

/// Map from user id to the last resolved snapshot of that user.
///
/// A later fetch of the same id overwrites the entry wholesale; there is no
/// merging of partial records.
#[derive(Debug, Default)]
pub struct UserCache {
  users: Mutex<HashMap<String, User>>,
}

impl UserCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Store `user` under its own id. Users without an id are skipped.
  pub fn put(&self, user: &User) {
    if user.id.is_empty() {
      return;
    }
    let mut users = self.users.lock().expect("user cache poisoned");
    users.insert(user.id.clone(), user.clone());
  }

  /// Look up a cached user. Absence never triggers a fetch here; callers
  /// decide whether to go to the network.
  pub fn get(&self, id: &str) -> Option<User> {
    let users = self.users.lock().expect("user cache poisoned");
    users.get(id).cloned()
  }

  #[allow(dead_code)]
  pub fn len(&self) -> usize {
    self.users.lock().expect("user cache poisoned").len()
  }

  #[allow(dead_code)]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Every user ever seen as a direct report this traversal, deduplicated by
/// id with first-seen order preserved. Feeds the CSV export.
#[derive(Debug, Default)]
pub struct SubordinateAccumulator {
  inner: Mutex<AccumulatorState>,
}

#[derive(Debug, Default)]
struct AccumulatorState {
  seen: HashSet<String>,
  users: Vec<User>,
}

impl SubordinateAccumulator {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append every user whose id has not been seen yet, in the order given.
  pub fn add(&self, users: &[User]) {
    if users.is_empty() {
      return;
    }
    let mut inner = self.inner.lock().expect("accumulator poisoned");
    for user in users {
      if user.id.is_empty() || !inner.seen.insert(user.id.clone()) {
        continue;
      }
      inner.users.push(user.clone());
    }
  }

  /// Forget everything; called when the chart recenters on a new target.
  pub fn clear(&self) {
    let mut inner = self.inner.lock().expect("accumulator poisoned");
    inner.seen.clear();
    inner.users.clear();
  }

  /// Read-only copy of the accumulated users, in first-seen order.
  pub fn snapshot(&self) -> Vec<User> {
    let inner = self.inner.lock().expect("accumulator poisoned");
    inner.users.clone()
  }

  pub fn len(&self) -> usize {
    self.inner.lock().expect("accumulator poisoned").users.len()
  }

  #[allow(dead_code)]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn user(id: &str, name: &str) -> User {
    User {
      id: id.to_string(),
      name: Some(name.to_string()),
      ..User::default()
    }
  }

  #[test]
  fn test_put_and_get() {
    let cache = UserCache::new();
    cache.put(&user("u1", "Ada"));

    let found = cache.get("u1").unwrap();
    assert_eq!(found.name.as_deref(), Some("Ada"));
    assert!(cache.get("u2").is_none());
  }

  #[test]
  fn test_put_overwrites_wholesale() {
    let cache = UserCache::new();
    let mut first = user("u1", "Ada");
    first.title = Some("Engineer".to_string());
    cache.put(&first);

    // Second snapshot has no title; the cached entry must not keep it.
    cache.put(&user("u1", "Ada L."));
    let found = cache.get("u1").unwrap();
    assert_eq!(found.name.as_deref(), Some("Ada L."));
    assert!(found.title.is_none());
  }

  #[test]
  fn test_put_without_id_is_noop() {
    let cache = UserCache::new();
    cache.put(&user("", "Nobody"));
    assert!(cache.is_empty());
  }

  #[test]
  fn test_accumulator_dedupes_in_first_seen_order() {
    let acc = SubordinateAccumulator::new();
    acc.add(&[user("a", "A"), user("b", "B")]);
    acc.add(&[user("b", "B again"), user("c", "C"), user("a", "A again")]);

    let ids: Vec<String> = acc.snapshot().into_iter().map(|u| u.id).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    // First occurrence wins: "b" kept its original name.
    let names: Vec<Option<String>> = acc.snapshot().into_iter().map(|u| u.name).collect();
    assert_eq!(names[1].as_deref(), Some("B"));
  }

  #[test]
  fn test_accumulator_clear() {
    let acc = SubordinateAccumulator::new();
    acc.add(&[user("a", "A")]);
    acc.clear();
    assert!(acc.is_empty());

    // Ids seen before the clear may be accumulated again.
    acc.add(&[user("a", "A")]);
    assert_eq!(acc.len(), 1);
  }

  #[test]
  fn test_accumulator_skips_empty_input_and_blank_ids() {
    let acc = SubordinateAccumulator::new();
    acc.add(&[]);
    acc.add(&[user("", "ghost")]);
    assert!(acc.is_empty());
  }
}
