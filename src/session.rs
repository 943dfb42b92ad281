//! Session-scoped context shared between the client and the UI.
//!
//! One `Session` lives for the lifetime of one authorized API session and
//! is rebuilt from scratch on re-authorization or region change.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::cache::{SubordinateAccumulator, UserCache};

#[derive(Debug, Default)]
pub struct Session {
  pub cache: UserCache,
  pub subordinates: SubordinateAccumulator,
  auth_failed: AtomicBool,
}

impl Session {
  pub fn new() -> Self {
    Self::default()
  }

  /// Whether the last authorization probe failed. Read by the UI to show
  /// the not-authorized call to action.
  pub fn auth_failed(&self) -> bool {
    self.auth_failed.load(Ordering::Relaxed)
  }

  pub fn set_auth_failed(&self, failed: bool) {
    self.auth_failed.store(failed, Ordering::Relaxed);
  }
}
