//! Game shell: wraps a quiz `GameState` with a running clock, completion
//! detection and progress reporting.
//!
//! Identity and persistence are injected (`AuthProvider`, `ProgressStore`)
//! rather than looked up globally. A session's clock is a tokio task that is
//! aborted when the session is dropped, so removed sessions never leak timers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::classes::StudentProgress;
use crate::domain::Question;
use crate::engine::{AnswerRecord, GameState, QuestionBank, QuizContent};

/// Who is playing. `None` means anonymous: games still work, progress is not saved.
pub trait AuthProvider {
  fn current_user(&self) -> Option<String>;
}

impl AuthProvider for Option<String> {
  fn current_user(&self) -> Option<String> { self.clone() }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressError {
  Unavailable(String),
}

impl std::fmt::Display for ProgressError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ProgressError::Unavailable(m) => write!(f, "progress store unavailable: {}", m),
    }
  }
}

impl std::error::Error for ProgressError {}

#[allow(async_fn_in_trait)]
pub trait ProgressStore {
  async fn update_progress(&self, user_id: &str, game_id: &str, score: u32, completed: bool) -> Result<(), ProgressError>;
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ProgressRecord {
  pub user_id: String,
  pub game_id: String,
  pub best_score: u32,
  pub attempts: u32,
  pub completed: bool,
  pub updated_at: DateTime<Utc>,
}

/// Keeps the best score per (user, game).
#[derive(Default)]
pub struct InMemoryProgressStore {
  records: RwLock<HashMap<(String, String), ProgressRecord>>,
  offline: AtomicBool,
}

impl InMemoryProgressStore {
  pub fn new() -> Self { Self::default() }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub async fn get(&self, user_id: &str, game_id: &str) -> Option<ProgressRecord> {
    self.records.read().await.get(&(user_id.to_string(), game_id.to_string())).cloned()
  }

  pub async fn for_user(&self, user_id: &str) -> Vec<ProgressRecord> {
    let mut out: Vec<ProgressRecord> =
      self.records.read().await.values().filter(|r| r.user_id == user_id).cloned().collect();
    out.sort_by(|a, b| a.game_id.cmp(&b.game_id));
    out
  }
}

impl ProgressStore for InMemoryProgressStore {
  async fn update_progress(&self, user_id: &str, game_id: &str, score: u32, completed: bool) -> Result<(), ProgressError> {
    if self.offline.load(Ordering::SeqCst) {
      return Err(ProgressError::Unavailable("connection lost".into()));
    }
    let mut g = self.records.write().await;
    let rec = g.entry((user_id.to_string(), game_id.to_string())).or_insert_with(|| ProgressRecord {
      user_id: user_id.to_string(),
      game_id: game_id.to_string(),
      best_score: 0,
      attempts: 0,
      completed: false,
      updated_at: Utc::now(),
    });
    rec.best_score = rec.best_score.max(score);
    rec.attempts += 1;
    rec.completed |= completed;
    rec.updated_at = Utc::now();
    Ok(())
  }
}

/// Fold one learner's per-game records into ranking input.
pub fn summarize_progress(records: &[ProgressRecord]) -> StudentProgress {
  if records.is_empty() {
    return StudentProgress::default();
  }
  let total: u32 = records.iter().map(|r| r.best_score.min(100)).sum();
  StudentProgress {
    score_percent: total as f64 / records.len() as f64,
    completed_games: records.iter().filter(|r| r.completed).count() as u32,
    last_activity: records.iter().map(|r| r.updated_at).max(),
  }
}

/// Report a finished game. Failures are logged and swallowed; the learner
/// never sees them.
pub async fn record_completion<P: ProgressStore>(store: &P, user_id: Option<&str>, game_id: &str, score_percent: u32) {
  let Some(user_id) = user_id else {
    debug!(target: "game", %game_id, "Anonymous completion; progress not saved");
    return;
  };
  match store.update_progress(user_id, game_id, score_percent, true).await {
    Ok(()) => info!(target: "game", %user_id, %game_id, score_percent, "Progress saved"),
    Err(e) => warn!(target: "game", %user_id, %game_id, error = %e, "Failed to save progress"),
  }
}

/// One-second ticker feeding a session's elapsed counter.
pub struct SessionTimer {
  handle: JoinHandle<()>,
}

impl SessionTimer {
  /// Needs a running tokio runtime.
  pub fn start(elapsed: Arc<AtomicU64>) -> Self {
    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(Duration::from_secs(1));
      ticker.tick().await;
      loop {
        ticker.tick().await;
        elapsed.fetch_add(1, Ordering::Relaxed);
      }
    });
    Self { handle }
  }

  pub fn is_running(&self) -> bool {
    !self.handle.is_finished()
  }
}

impl Drop for SessionTimer {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Completion {
  pub game_id: String,
  pub score: u32,
  pub max_score: u32,
  pub final_score_percent: u32,
  pub elapsed_seconds: u64,
}

/// A learner's run through one quiz game.
pub struct GameSession {
  pub id: String,
  pub game_id: String,
  pub user_id: Option<String>,
  content: Arc<QuestionBank>,
  state: GameState,
  elapsed: Arc<AtomicU64>,
  timer: Option<SessionTimer>,
  completion_reported: bool,
  last_active: Instant,
}

impl GameSession {
  pub fn new(id: String, game_id: String, user_id: Option<String>, content: Arc<QuestionBank>) -> Self {
    let state = GameState::new(content.as_ref());
    let elapsed = Arc::new(AtomicU64::new(0));
    let timer = if state.is_completed { None } else { Some(SessionTimer::start(elapsed.clone())) };
    Self { id, game_id, user_id, content, state, elapsed, timer, completion_reported: false, last_active: Instant::now() }
  }

  /// Mark the session as used now; the idle sweep measures from here.
  pub fn touch(&mut self) {
    self.last_active = Instant::now();
  }

  pub fn idle_for(&self, now: Instant) -> Duration {
    now.saturating_duration_since(self.last_active)
  }

  /// Current state with the clock folded in.
  pub fn snapshot(&self) -> GameState {
    let mut s = self.state.clone();
    s.elapsed_seconds = self.elapsed.load(Ordering::Relaxed);
    s
  }

  pub fn current_question(&self) -> Option<&Question> {
    if self.state.is_completed {
      return None;
    }
    self.content.question(self.state.current_level, self.state.current_question)
  }

  pub fn timer_running(&self) -> bool {
    self.timer.as_ref().map(SessionTimer::is_running).unwrap_or(false)
  }

  pub fn answer(&mut self, chosen_index: usize) -> Option<AnswerRecord> {
    self.touch();
    self.state.submit_answer(self.content.as_ref(), chosen_index)
  }

  /// Move on. Returns the completion the first time the game ends; the clock
  /// stops at that point.
  pub fn advance(&mut self) -> Option<Completion> {
    self.touch();
    self.state.advance(self.content.as_ref());
    self.completion()
  }

  pub fn toggle_education(&mut self) {
    self.touch();
    self.state.toggle_education();
  }

  pub fn restart(&mut self) {
    self.touch();
    self.state.restart(self.content.as_ref());
    self.elapsed.store(0, Ordering::Relaxed);
    self.completion_reported = false;
    self.timer = if self.state.is_completed { None } else { Some(SessionTimer::start(self.elapsed.clone())) };
  }

  pub fn final_score_percent(&self) -> Option<u32> {
    self.state.is_completed.then(|| self.state.final_score_percent(self.content.as_ref()))
  }

  pub fn progress_percent(&self) -> u32 {
    self.state.progress_percent(self.content.as_ref())
  }

  fn completion(&mut self) -> Option<Completion> {
    if !self.state.is_completed || self.completion_reported {
      return None;
    }
    self.completion_reported = true;
    self.timer = None;
    Some(Completion {
      game_id: self.game_id.clone(),
      score: self.state.score,
      max_score: self.content.max_score(),
      final_score_percent: self.state.final_score_percent(self.content.as_ref()),
      elapsed_seconds: self.elapsed.load(Ordering::Relaxed),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Difficulty;

  fn bank() -> Arc<QuestionBank> {
    let q = |id: &str, d: Difficulty| Question {
      id: id.into(),
      difficulty: d,
      prompt: "?".into(),
      options: vec!["a".into(), "b".into()],
      correct_option: 0,
      explanation: String::new(),
    };
    Arc::new(QuestionBank::new(vec![q("q1", Difficulty::VeryEasy), q("q2", Difficulty::Medium)], 40))
  }

  fn session() -> GameSession {
    GameSession::new("s1".into(), "demo".into(), Some("u1".into()), bank())
  }

  #[tokio::test(start_paused = true)]
  async fn clock_ticks_every_second() {
    let s = session();
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(s.snapshot().elapsed_seconds, 3);
  }

  #[tokio::test(start_paused = true)]
  async fn completion_stops_the_clock_and_fires_once() {
    let mut s = session();
    s.answer(0);
    assert!(s.advance().is_none());
    s.answer(1);
    let done = s.advance().unwrap();
    assert_eq!(done.final_score_percent, 50);
    assert_eq!(done.max_score, 80);
    assert!(!s.timer_running());
    assert!(s.advance().is_none());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(s.snapshot().elapsed_seconds, done.elapsed_seconds);
    assert!(s.current_question().is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn restart_resets_clock_and_allows_another_completion() {
    let mut s = session();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    s.answer(0);
    s.advance();
    s.answer(0);
    assert!(s.advance().is_some());

    s.restart();
    assert_eq!(s.snapshot().elapsed_seconds, 0);
    assert!(s.timer_running());
    assert_eq!(s.current_question().map(|q| q.id.as_str()), Some("q1"));
    s.answer(0);
    s.advance();
    s.answer(0);
    assert_eq!(s.advance().map(|c| c.final_score_percent), Some(100));
  }

  #[tokio::test(start_paused = true)]
  async fn dropping_the_timer_stops_the_clock() {
    let elapsed = Arc::new(AtomicU64::new(0));
    let timer = SessionTimer::start(elapsed.clone());
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(elapsed.load(Ordering::Relaxed), 1);
    drop(timer);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(elapsed.load(Ordering::Relaxed), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn idle_time_resets_on_activity() {
    let mut s = session();
    tokio::time::sleep(Duration::from_secs(40)).await;
    assert_eq!(s.idle_for(Instant::now()), Duration::from_secs(40));
    s.answer(0);
    assert_eq!(s.idle_for(Instant::now()), Duration::ZERO);
    tokio::time::sleep(Duration::from_secs(5)).await;
    s.toggle_education();
    assert_eq!(s.idle_for(Instant::now()), Duration::ZERO);
  }

  #[tokio::test]
  async fn progress_keeps_best_score() {
    let store = InMemoryProgressStore::new();
    record_completion(&store, Some("u1"), "demo", 60).await;
    record_completion(&store, Some("u1"), "demo", 40).await;
    let rec = store.get("u1", "demo").await.unwrap();
    assert_eq!(rec.best_score, 60);
    assert_eq!(rec.attempts, 2);
    assert!(rec.completed);
  }

  #[tokio::test]
  async fn summary_averages_best_scores() {
    let store = InMemoryProgressStore::new();
    record_completion(&store, Some("u1"), "p-value", 80).await;
    record_completion(&store, Some("u1"), "coffee-energy", 50).await;
    record_completion(&store, Some("u1"), "p-value", 20).await;
    let summary = summarize_progress(&store.for_user("u1").await);
    assert_eq!(summary.score_percent, 65.0);
    assert_eq!(summary.completed_games, 2);
    assert!(summary.last_activity.is_some());
    assert_eq!(summarize_progress(&[]), StudentProgress::default());
  }

  #[tokio::test]
  async fn progress_failures_are_swallowed() {
    let store = InMemoryProgressStore::new();
    store.set_offline(true);
    record_completion(&store, Some("u1"), "demo", 60).await;
    record_completion(&store, None, "demo", 60).await;
    store.set_offline(false);
    assert!(store.get("u1", "demo").await.is_none());
    assert!(store.for_user("u1").await.is_empty());
  }
}
