//! User-facing notifications for class-management actions.
//!
//! Every store-backed action ends in exactly one notification. Notifications
//! expire on their own after a bounded number of seconds; there is no retry.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::NotificationDurations;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
  Success,
  Error,
  Warning,
  Info,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
  pub id: String,
  pub kind: NotificationKind,
  pub title: String,
  pub message: String,
  pub created_at: DateTime<Utc>,
  pub duration_secs: u32,
}

impl Notification {
  pub fn expires_at(&self) -> DateTime<Utc> {
    self.created_at + Duration::seconds(self.duration_secs as i64)
  }
}

/// Bounded queue of live notifications for one dashboard.
#[derive(Debug)]
pub struct NotificationCenter {
  durations: NotificationDurations,
  queue: VecDeque<Notification>,
  capacity: usize,
}

impl NotificationCenter {
  pub fn new(durations: NotificationDurations, capacity: usize) -> Self {
    Self { durations, queue: VecDeque::new(), capacity: capacity.max(1) }
  }

  pub fn duration_for(&self, kind: NotificationKind) -> u32 {
    let secs = match kind {
      NotificationKind::Success => self.durations.success_secs,
      NotificationKind::Error => self.durations.error_secs,
      NotificationKind::Warning => self.durations.warning_secs,
      NotificationKind::Info => self.durations.info_secs,
    };
    secs.clamp(NotificationDurations::MIN_SECS, NotificationDurations::MAX_SECS)
  }

  /// Build and queue a notification. The oldest one is dropped when full.
  pub fn push(&mut self, kind: NotificationKind, title: &str, message: impl Into<String>, now: DateTime<Utc>) -> Notification {
    let n = Notification {
      id: Uuid::new_v4().to_string(),
      kind,
      title: title.to_string(),
      message: message.into(),
      created_at: now,
      duration_secs: self.duration_for(kind),
    };
    if self.queue.len() == self.capacity {
      self.queue.pop_front();
    }
    self.queue.push_back(n.clone());
    n
  }

  /// Live notifications at `now`, dropping expired ones.
  pub fn active(&mut self, now: DateTime<Utc>) -> Vec<Notification> {
    self.queue.retain(|n| n.expires_at() > now);
    self.queue.iter().cloned().collect()
  }

  pub fn dismiss(&mut self, id: &str) -> bool {
    let before = self.queue.len();
    self.queue.retain(|n| n.id != id);
    self.queue.len() != before
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn center() -> NotificationCenter {
    NotificationCenter::new(NotificationDurations::default(), 3)
  }

  #[test]
  fn notifications_expire_after_their_duration() {
    let mut c = center();
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
    let ok = c.push(NotificationKind::Success, "Turma criada", "ok", t0);
    let err = c.push(NotificationKind::Error, "Falha", "boom", t0);
    assert_eq!(c.active(t0).len(), 2);
    let after_success = t0 + Duration::seconds(ok.duration_secs as i64);
    let live = c.active(after_success);
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, err.id);
    assert!(c.active(err.expires_at()).is_empty());
  }

  #[test]
  fn durations_are_clamped() {
    let mut d = NotificationDurations::default();
    d.error_secs = 0;
    d.info_secs = 999;
    let c = NotificationCenter::new(d, 5);
    assert_eq!(c.duration_for(NotificationKind::Error), NotificationDurations::MIN_SECS);
    assert_eq!(c.duration_for(NotificationKind::Info), NotificationDurations::MAX_SECS);
  }

  #[test]
  fn queue_is_bounded_and_dismissable() {
    let mut c = center();
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
    let first = c.push(NotificationKind::Info, "a", "1", t0);
    for i in 0..3 {
      c.push(NotificationKind::Info, "b", i.to_string(), t0);
    }
    let live = c.active(t0);
    assert_eq!(live.len(), 3);
    assert!(live.iter().all(|n| n.id != first.id));
    assert!(c.dismiss(&live[0].id));
    assert!(!c.dismiss("missing"));
    assert_eq!(c.active(t0).len(), 2);
  }
}
