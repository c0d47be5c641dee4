//! Domain models: difficulty levels, quiz questions, matching items,
//! simulation parameters, classes and their trash records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Difficulty ladder shared by every game. The order is fixed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Difficulty {
  VeryEasy,
  Easy,
  Medium,
  Hard,
  VeryHard,
}

impl Difficulty {
  pub const ALL: [Difficulty; 5] = [
    Difficulty::VeryEasy,
    Difficulty::Easy,
    Difficulty::Medium,
    Difficulty::Hard,
    Difficulty::VeryHard,
  ];

  pub fn first() -> Self { Difficulty::VeryEasy }

  /// Next level up, or `None` at the top of the ladder.
  pub fn next(self) -> Option<Self> {
    match self {
      Difficulty::VeryEasy => Some(Difficulty::Easy),
      Difficulty::Easy => Some(Difficulty::Medium),
      Difficulty::Medium => Some(Difficulty::Hard),
      Difficulty::Hard => Some(Difficulty::VeryHard),
      Difficulty::VeryHard => None,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Difficulty::VeryEasy => "Muito Fácil",
      Difficulty::Easy => "Fácil",
      Difficulty::Medium => "Médio",
      Difficulty::Hard => "Difícil",
      Difficulty::VeryHard => "Muito Difícil",
    }
  }
}

impl Default for Difficulty {
  fn default() -> Self { Difficulty::first() }
}

impl std::fmt::Display for Difficulty {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Difficulty::VeryEasy => "very-easy",
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
      Difficulty::VeryHard => "very-hard",
    };
    f.write_str(s)
  }
}

/// Multiple-choice question. Authored content, never mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub id: String,
  pub difficulty: Difficulty,
  pub prompt: String,
  pub options: Vec<String>,
  pub correct_option: usize,
  #[serde(default)] pub explanation: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchRole {
  Concept,
  Example,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchingItem {
  pub id: String,
  pub role: MatchRole,
  pub group_key: String,
  pub text: String,
  #[serde(default)] pub explanation: String,
  #[serde(default)] pub analogy: Option<String>,
}

/// Slider definition for a simulation. `min <= default_value <= max`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationParameter {
  pub id: String,
  pub label: String,
  pub min: f64,
  pub max: f64,
  pub step: f64,
  pub default_value: f64,
  #[serde(default)] pub unit: Option<String>,
  #[serde(default)] pub description: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassStatus {
  Active,
  Deleted,
}

/// A professor's class as stored in the document store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassEntity {
  pub id: String,
  pub name: String,
  #[serde(default)] pub description: Option<String>,
  pub semester: String,
  pub year: i32,
  pub capacity: u32,
  pub invite_code: String,
  pub professor_id: String,
  pub professor_name: String,
  pub students_count: u32,
  pub avg_progress: f64,
  pub status: ClassStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Trash entry written on soft delete. Restorable while `now < expires_at`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeletedClassRecord {
  pub class: ClassEntity,
  pub deleted_at: DateTime<Utc>,
  pub deleted_by: String,
  pub deleted_by_name: String,
  pub expires_at: DateTime<Utc>,
  pub reason: String,
}

impl DeletedClassRecord {
  pub fn can_restore(&self, now: DateTime<Utc>) -> bool {
    now < self.expires_at
  }

  /// Whole days left before expiry, rounded up, never negative.
  pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
    let left = self.expires_at - now;
    if left <= Duration::zero() {
      return 0;
    }
    let day = Duration::days(1).num_milliseconds();
    (left.num_milliseconds() + day - 1) / day
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassInvite {
  pub code: String,
  pub class_id: String,
  pub created_at: DateTime<Utc>,
  #[serde(default)] pub expires_at: Option<DateTime<Utc>>,
  pub is_active: bool,
  #[serde(default)] pub max_uses: Option<u32>,
  pub current_uses: u32,
  pub created_by: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Enrollment {
  pub class_id: String,
  pub student_id: String,
  pub student_name: String,
  pub student_email: String,
  pub invite_code: String,
  pub enrolled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn record(expires_at: DateTime<Utc>) -> DeletedClassRecord {
    let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    DeletedClassRecord {
      class: ClassEntity {
        id: "c1".into(),
        name: "Bioestatística".into(),
        description: None,
        semester: "2024.1".into(),
        year: 2024,
        capacity: 40,
        invite_code: "BIOE24AB".into(),
        professor_id: "p1".into(),
        professor_name: "Prof".into(),
        students_count: 0,
        avg_progress: 0.0,
        status: ClassStatus::Deleted,
        created_at: t,
        updated_at: t,
      },
      deleted_at: t,
      deleted_by: "p1".into(),
      deleted_by_name: "Prof".into(),
      expires_at,
      reason: "test".into(),
    }
  }

  #[test]
  fn difficulty_ladder_is_fixed() {
    let mut seen = vec![Difficulty::first()];
    while let Some(n) = seen.last().unwrap().next() {
      seen.push(n);
    }
    assert_eq!(seen, Difficulty::ALL.to_vec());
  }

  #[test]
  fn difficulty_serializes_kebab_case() {
    assert_eq!(serde_json::to_string(&Difficulty::VeryHard).unwrap(), "\"very-hard\"");
    let d: Difficulty = serde_json::from_str("\"very-easy\"").unwrap();
    assert_eq!(d, Difficulty::VeryEasy);
  }

  #[test]
  fn restore_window_is_exclusive_at_expiry() {
    let exp = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
    let r = record(exp);
    assert!(r.can_restore(exp - Duration::seconds(1)));
    assert!(!r.can_restore(exp));
  }

  #[test]
  fn days_remaining_rounds_up() {
    let exp = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
    let r = record(exp);
    assert_eq!(r.days_remaining(exp - Duration::hours(1)), 1);
    assert_eq!(r.days_remaining(exp - Duration::days(2)), 2);
    assert_eq!(r.days_remaining(exp + Duration::days(2)), 0);
  }
}
