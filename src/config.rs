//! Loading application configuration (tuning knobs + optional quiz bank) from TOML.
//!
//! See `AppConfig` for the expected schema. Every section is optional.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Question;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub classes: ClassSettings,
  #[serde(default)]
  pub games: GameSettings,
  #[serde(default)]
  pub notifications: NotificationDurations,
  #[serde(default)]
  pub quizzes: Vec<QuizCfg>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ClassSettings {
  /// How long a soft-deleted class stays restorable.
  #[serde(default = "default_retention_days")]
  pub retention_days: i64,
  /// Trash entries expiring within this many days count as "expiring soon".
  #[serde(default = "default_expiring_soon_days")]
  pub expiring_soon_days: i64,
  /// Period of the background purge of expired trash; 0 disables it.
  #[serde(default = "default_cleanup_interval_secs")]
  pub cleanup_interval_secs: u64,
}

fn default_retention_days() -> i64 { 30 }
fn default_expiring_soon_days() -> i64 { 3 }
fn default_cleanup_interval_secs() -> u64 { 3600 }

impl ClassSettings {
  pub const RETENTION_DAYS_MAX: i64 = 3650;

  /// Replace out-of-range values with their defaults, logging each one.
  pub fn validated(self) -> Self {
    let mut out = self;
    if !(1..=Self::RETENTION_DAYS_MAX).contains(&out.retention_days) {
      error!(target: "nutrilab", retention_days = out.retention_days, "retention_days out of range; using default");
      out.retention_days = default_retention_days();
    }
    if !(0..=out.retention_days).contains(&out.expiring_soon_days) {
      error!(target: "nutrilab", expiring_soon_days = out.expiring_soon_days, "expiring_soon_days out of range; using default");
      out.expiring_soon_days = default_expiring_soon_days().min(out.retention_days);
    }
    out
  }
}

impl Default for ClassSettings {
  fn default() -> Self {
    Self {
      retention_days: default_retention_days(),
      expiring_soon_days: default_expiring_soon_days(),
      cleanup_interval_secs: default_cleanup_interval_secs(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
pub struct GameSettings {
  #[serde(default = "default_points")]
  pub points_per_question: u32,
  /// Sessions untouched for this long are dropped by the sweep.
  #[serde(default = "default_session_idle_secs")]
  pub session_idle_secs: u64,
  /// Period of the idle-session sweep; 0 disables it.
  #[serde(default = "default_session_sweep_secs")]
  pub session_sweep_secs: u64,
}

fn default_points() -> u32 { 40 }
fn default_session_idle_secs() -> u64 { 1800 }
fn default_session_sweep_secs() -> u64 { 60 }

impl Default for GameSettings {
  fn default() -> Self {
    Self {
      points_per_question: default_points(),
      session_idle_secs: default_session_idle_secs(),
      session_sweep_secs: default_session_sweep_secs(),
    }
  }
}

/// Auto-dismiss time per notification kind, in seconds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NotificationDurations {
  pub success_secs: u32,
  pub info_secs: u32,
  pub warning_secs: u32,
  pub error_secs: u32,
}

impl NotificationDurations {
  pub const MIN_SECS: u32 = 1;
  pub const MAX_SECS: u32 = 30;
}

impl Default for NotificationDurations {
  fn default() -> Self {
    Self { success_secs: 3, info_secs: 4, warning_secs: 5, error_secs: 6 }
  }
}

/// Extra quiz game from the TOML bank.
#[derive(Clone, Debug, Deserialize)]
pub struct QuizCfg {
  pub id: String,
  pub title: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub points_per_question: Option<u32>,
  pub questions: Vec<Question>,
}

pub fn parse_app_config(s: &str) -> Result<AppConfig, toml::de::Error> {
  toml::from_str::<AppConfig>(s)
}

/// Attempt to load `AppConfig` from APP_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_app_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("APP_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_app_config(&s) {
      Ok(mut cfg) => {
        cfg.classes = cfg.classes.validated();
        info!(target: "nutrilab", %path, quizzes = cfg.quizzes.len(), "Loaded app config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "nutrilab", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "nutrilab", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Difficulty;

  #[test]
  fn empty_config_uses_defaults() {
    let cfg = parse_app_config("").unwrap();
    assert_eq!(cfg.classes.retention_days, 30);
    assert_eq!(cfg.games.points_per_question, 40);
    assert_eq!(cfg.notifications.error_secs, 6);
    assert!(cfg.quizzes.is_empty());
  }

  #[test]
  fn parses_sections_and_quiz_bank() {
    let src = r#"
      [classes]
      retention_days = 20

      [notifications]
      success_secs = 2

      [[quizzes]]
      id = "anthropometry"
      title = "Antropometria"
      points_per_question = 25

      [[quizzes.questions]]
      id = "imc-1"
      difficulty = "very-easy"
      prompt = "IMC de 70 kg e 1,75 m?"
      options = ["18,5", "22,9", "27,1"]
      correct_option = 1
      explanation = "70 / 1,75² = 22,9"
    "#;
    let cfg = parse_app_config(src).unwrap();
    assert_eq!(cfg.classes.retention_days, 20);
    assert_eq!(cfg.classes.expiring_soon_days, 3);
    assert_eq!(cfg.classes.cleanup_interval_secs, 3600);
    assert_eq!(cfg.notifications.success_secs, 2);
    assert_eq!(cfg.notifications.error_secs, 6);
    let quiz = &cfg.quizzes[0];
    assert_eq!(quiz.points_per_question, Some(25));
    assert_eq!(quiz.questions[0].difficulty, Difficulty::VeryEasy);
    assert_eq!(quiz.questions[0].correct_option, 1);
  }

  #[test]
  fn out_of_range_class_settings_fall_back_to_defaults() {
    let cfg = parse_app_config("[classes]\nretention_days = 1000000000000\nexpiring_soon_days = -2").unwrap();
    let checked = cfg.classes.validated();
    assert_eq!(checked.retention_days, 30);
    assert_eq!(checked.expiring_soon_days, 3);

    let negative = ClassSettings { retention_days: -5, ..ClassSettings::default() }.validated();
    assert_eq!(negative.retention_days, 30);

    let short = ClassSettings { retention_days: 2, expiring_soon_days: 3, ..ClassSettings::default() }.validated();
    assert_eq!((short.retention_days, short.expiring_soon_days), (2, 2));
  }

  #[test]
  fn session_sweep_settings_have_defaults() {
    let cfg = parse_app_config("[games]\nsession_idle_secs = 600").unwrap();
    assert_eq!(cfg.games.session_idle_secs, 600);
    assert_eq!(cfg.games.session_sweep_secs, 60);
  }

  #[test]
  fn malformed_config_is_an_error() {
    assert!(parse_app_config("[classes]\nretention_days = \"soon\"").is_err());
  }
}
