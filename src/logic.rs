//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Quiz sessions (start, answer, advance, restart, end)
//!   - Matching validation and simulations
//!   - Class-management actions, each ending in one notification
//!   - Class ranking from recorded progress
//!   - Idle session sweep
//!   - Date inspection
//!
//! Finished games report progress on a spawned task; the caller never waits
//! on the progress store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::classes::{Actor, ClassError, ClassForm, ClassRanking, Student, StudentProgress};
use crate::dates;
use crate::domain::{ClassEntity, DeletedClassRecord, Enrollment};
use crate::matching::{validate, MatchError, MatchOutcome};
use crate::notify::{Notification, NotificationKind};
use crate::protocol::{to_question_out, AnswerOut, DateOut, SessionOut, SimulationOut};
use crate::shell::{record_completion, summarize_progress, AuthProvider, GameSession};
use crate::simulation::{histogram, stats, SimulationError};
use crate::state::AppState;

pub const HISTOGRAM_BINS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum GameError {
  UnknownGame(String),
  UnknownSession(String),
  UnknownDeck(String),
  UnknownScenario(String),
  /// Feedback is showing or the game is over.
  AnswerLocked,
  Matching(MatchError),
  Simulation(SimulationError),
}

impl std::fmt::Display for GameError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      GameError::UnknownGame(id) => write!(f, "Unknown game: {}", id),
      GameError::UnknownSession(id) => write!(f, "Unknown session: {}", id),
      GameError::UnknownDeck(id) => write!(f, "Unknown matching deck: {}", id),
      GameError::UnknownScenario(id) => write!(f, "Unknown simulation: {}", id),
      GameError::AnswerLocked => f.write_str("Answer not accepted: advance to the next question first"),
      GameError::Matching(e) => write!(f, "{}", e),
      GameError::Simulation(e) => write!(f, "{}", e),
    }
  }
}

impl std::error::Error for GameError {}

impl From<MatchError> for GameError {
  fn from(e: MatchError) -> Self { GameError::Matching(e) }
}

impl From<SimulationError> for GameError {
  fn from(e: SimulationError) -> Self { GameError::Simulation(e) }
}

//
// Quiz sessions
//

pub fn session_out(s: &GameSession) -> SessionOut {
  let state = s.snapshot();
  SessionOut {
    session_id: s.id.clone(),
    game_id: s.game_id.clone(),
    question: s.current_question().map(to_question_out),
    progress_percent: s.progress_percent(),
    elapsed: dates::format_elapsed(state.elapsed_seconds),
    final_score_percent: s.final_score_percent(),
    state,
  }
}

#[instrument(level = "info", skip(state, auth), fields(%game_id))]
pub async fn start_session(state: &AppState, game_id: &str, auth: &impl AuthProvider) -> Result<SessionOut, GameError> {
  let bank = state.catalog.quiz(game_id).ok_or_else(|| GameError::UnknownGame(game_id.to_string()))?;
  let id = Uuid::new_v4().to_string();
  let session = GameSession::new(id.clone(), game_id.to_string(), auth.current_user(), bank);
  let out = session_out(&session);
  state.sessions.write().await.insert(id.clone(), session);
  info!(target: "game", %game_id, session_id = %id, "Game session started");
  Ok(out)
}

pub async fn session_snapshot(state: &AppState, session_id: &str) -> Result<SessionOut, GameError> {
  let mut sessions = state.sessions.write().await;
  let s = sessions.get_mut(session_id).ok_or_else(|| GameError::UnknownSession(session_id.to_string()))?;
  s.touch();
  Ok(session_out(s))
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn submit_answer(state: &AppState, session_id: &str, choice: usize) -> Result<AnswerOut, GameError> {
  let mut sessions = state.sessions.write().await;
  let s = sessions.get_mut(session_id).ok_or_else(|| GameError::UnknownSession(session_id.to_string()))?;
  let (correct_option, explanation) = s
    .current_question()
    .map(|q| (q.correct_option, q.explanation.clone()))
    .ok_or(GameError::AnswerLocked)?;
  let record = s.answer(choice).ok_or(GameError::AnswerLocked)?;
  info!(target: "game", %session_id, question = %record.question_id, correct = record.is_correct, "Answer evaluated");
  Ok(AnswerOut {
    session_id: session_id.to_string(),
    correct_option,
    explanation,
    score: s.snapshot().score,
    record,
  })
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn advance_session(state: &Arc<AppState>, session_id: &str) -> Result<SessionOut, GameError> {
  let mut sessions = state.sessions.write().await;
  let s = sessions.get_mut(session_id).ok_or_else(|| GameError::UnknownSession(session_id.to_string()))?;
  if let Some(done) = s.advance() {
    info!(
      target: "game",
      %session_id,
      game_id = %done.game_id,
      final_score = done.final_score_percent,
      elapsed = done.elapsed_seconds,
      "Game completed"
    );
    spawn_progress(state.clone(), s.user_id.clone(), done.game_id.clone(), done.final_score_percent);
  }
  Ok(session_out(s))
}

pub async fn restart_session(state: &AppState, session_id: &str) -> Result<SessionOut, GameError> {
  let mut sessions = state.sessions.write().await;
  let s = sessions.get_mut(session_id).ok_or_else(|| GameError::UnknownSession(session_id.to_string()))?;
  s.restart();
  Ok(session_out(s))
}

pub async fn toggle_education(state: &AppState, session_id: &str) -> Result<SessionOut, GameError> {
  let mut sessions = state.sessions.write().await;
  let s = sessions.get_mut(session_id).ok_or_else(|| GameError::UnknownSession(session_id.to_string()))?;
  s.toggle_education();
  Ok(session_out(s))
}

/// Drop the session; its clock stops with it.
pub async fn end_session(state: &AppState, session_id: &str) -> Result<(), GameError> {
  match state.sessions.write().await.remove(session_id) {
    Some(_) => {
      info!(target: "game", %session_id, "Game session ended");
      Ok(())
    }
    None => Err(GameError::UnknownSession(session_id.to_string())),
  }
}

/// Drop every session idle for at least `max_idle`. Returns how many went.
pub async fn sweep_idle_sessions(state: &AppState, max_idle: Duration) -> usize {
  let now = tokio::time::Instant::now();
  let mut sessions = state.sessions.write().await;
  let before = sessions.len();
  sessions.retain(|id, s| {
    let keep = s.idle_for(now) < max_idle;
    if !keep {
      info!(target: "game", session_id = %id, game_id = %s.game_id, "Idle game session dropped");
    }
    keep
  });
  before - sessions.len()
}

/// Background sweep of abandoned sessions. Runs until the task is aborted.
pub async fn run_session_sweep(state: Arc<AppState>, every: Duration, max_idle: Duration) {
  let mut ticker = tokio::time::interval(every);
  loop {
    ticker.tick().await;
    let dropped = sweep_idle_sessions(&state, max_idle).await;
    if dropped > 0 {
      info!(target: "game", dropped, "Idle session sweep finished");
    }
  }
}

fn spawn_progress(state: Arc<AppState>, user_id: Option<String>, game_id: String, score: u32) {
  tokio::spawn(async move {
    record_completion(&state.progress, user_id.as_deref(), &game_id, score).await;
  });
}

//
// Matching & simulations
//

#[instrument(level = "info", skip(state, pairs, auth), fields(%deck_id, pairs = pairs.len()))]
pub async fn validate_matching(
  state: &Arc<AppState>,
  deck_id: &str,
  pairs: &HashMap<String, String>,
  auth: &impl AuthProvider,
) -> Result<MatchOutcome, GameError> {
  let (_, set) = state.catalog.deck(deck_id).ok_or_else(|| GameError::UnknownDeck(deck_id.to_string()))?;
  let outcome = validate(pairs, set)?;
  info!(target: "game", %deck_id, score = outcome.score_percent, all_correct = outcome.all_correct, "Matching validated");
  spawn_progress(state.clone(), auth.current_user(), deck_id.to_string(), outcome.score_percent);
  Ok(outcome)
}

#[instrument(level = "info", skip(state, params), fields(%scenario_id))]
pub fn run_simulation(
  state: &AppState,
  scenario_id: &str,
  params: &HashMap<String, f64>,
  bins: Option<usize>,
) -> Result<SimulationOut, GameError> {
  let scenario = state
    .catalog
    .scenario(scenario_id)
    .ok_or_else(|| GameError::UnknownScenario(scenario_id.to_string()))?;
  let values = scenario.simulate(params, &mut rand::thread_rng())?;
  let summary = stats(&values);
  let target_met = match (&scenario.target, &summary) {
    (Some(t), Some(s)) => Some(t.contains(s.mean)),
    _ => None,
  };
  Ok(SimulationOut {
    scenario_id: scenario_id.to_string(),
    histogram: histogram(&values, bins.unwrap_or(HISTOGRAM_BINS).clamp(1, 50)),
    stats: summary,
    target_met,
    values,
  })
}

//
// Class management: every action yields exactly one notification.
//

fn failure_kind(e: &ClassError) -> NotificationKind {
  match e {
    ClassError::Validation(_) | ClassError::NotAuthorized | ClassError::Invite(_) => NotificationKind::Warning,
    _ => NotificationKind::Error,
  }
}

async fn report_failure(state: &AppState, user: &str, title: &str, e: &ClassError, now: DateTime<Utc>) -> Notification {
  match e {
    ClassError::Store(_) => error!(target: "classes", %user, error = %e, "{}", title),
    _ => warn!(target: "classes", %user, error = %e, "{}", title),
  }
  let message = match e {
    ClassError::Validation(_) => "Verifique os campos destacados".to_string(),
    ClassError::Store(_) => "Erro de conexão. Tente novamente.".to_string(),
    other => other.to_string(),
  };
  state.notify(Some(user), failure_kind(e), title, message, now).await
}

#[instrument(level = "info", skip(state, form), fields(professor = %actor.id))]
pub async fn create_class(state: &AppState, actor: &Actor, form: ClassForm) -> (Result<ClassEntity, ClassError>, Notification) {
  let now = Utc::now();
  match state.classes.create_class(actor, form, now).await {
    Ok(c) => {
      let msg = format!("Código de convite: {}", c.invite_code);
      let n = state.notify(Some(&actor.id), NotificationKind::Success, "Turma criada com sucesso!", msg, now).await;
      (Ok(c), n)
    }
    Err(e) => {
      let n = report_failure(state, &actor.id, "Erro ao criar turma", &e, now).await;
      (Err(e), n)
    }
  }
}

#[instrument(level = "info", skip(state, reason), fields(professor = %actor.id))]
pub async fn soft_delete_class(
  state: &AppState,
  actor: &Actor,
  class_id: &str,
  reason: Option<String>,
) -> (Result<DeletedClassRecord, ClassError>, Notification) {
  let now = Utc::now();
  match state.classes.soft_delete(class_id, actor, reason, now).await {
    Ok(rec) => {
      let msg = format!(
        "\"{}\" pode ser restaurada até {}",
        rec.class.name,
        dates::format_date(&rec.expires_at)
      );
      let n = state.notify(Some(&actor.id), NotificationKind::Success, "Turma movida para a lixeira", msg, now).await;
      (Ok(rec), n)
    }
    Err(e) => {
      let n = report_failure(state, &actor.id, "Erro ao excluir turma", &e, now).await;
      (Err(e), n)
    }
  }
}

#[instrument(level = "info", skip(state), fields(professor = %actor.id))]
pub async fn restore_class(state: &AppState, actor: &Actor, class_id: &str) -> (Result<ClassEntity, ClassError>, Notification) {
  let now = Utc::now();
  match state.classes.restore(class_id, actor, now).await {
    Ok(c) => {
      let msg = format!("\"{}\" está ativa novamente", c.name);
      let n = state.notify(Some(&actor.id), NotificationKind::Success, "Turma restaurada", msg, now).await;
      (Ok(c), n)
    }
    Err(e) => {
      let n = report_failure(state, &actor.id, "Erro ao restaurar turma", &e, now).await;
      (Err(e), n)
    }
  }
}

#[instrument(level = "info", skip(state), fields(professor = %actor.id))]
pub async fn force_delete_class(state: &AppState, actor: &Actor, class_id: &str) -> (Result<(), ClassError>, Notification) {
  let now = Utc::now();
  match state.classes.force_delete(class_id, actor).await {
    Ok(()) => {
      let n = state
        .notify(Some(&actor.id), NotificationKind::Success, "Turma excluída permanentemente", "", now)
        .await;
      (Ok(()), n)
    }
    Err(e) => {
      let n = report_failure(state, &actor.id, "Erro ao excluir permanentemente", &e, now).await;
      (Err(e), n)
    }
  }
}

#[instrument(level = "info", skip(state), fields(professor = %actor.id))]
pub async fn cleanup_trash(state: &AppState, actor: &Actor) -> (Result<usize, ClassError>, Notification) {
  let now = Utc::now();
  match state.classes.cleanup_expired(now).await {
    Ok(n_removed) => {
      let msg = format!("{} turma(s) expirada(s) removida(s)", n_removed);
      let n = state.notify(Some(&actor.id), NotificationKind::Info, "Limpeza da lixeira", msg, now).await;
      (Ok(n_removed), n)
    }
    Err(e) => {
      let n = report_failure(state, &actor.id, "Erro na limpeza da lixeira", &e, now).await;
      (Err(e), n)
    }
  }
}

#[instrument(level = "info", skip(state, student), fields(student = %student.id))]
pub async fn join_class(state: &AppState, student: &Student, code: &str) -> (Result<Enrollment, ClassError>, Notification) {
  let now = Utc::now();
  let code = code.trim().to_uppercase();
  match state.classes.join_with_code(&code, student, now).await {
    Ok(e) => {
      let n = state
        .notify(Some(&student.id), NotificationKind::Success, "Matrícula realizada!", "Bem-vindo(a) à turma", now)
        .await;
      (Ok(e), n)
    }
    Err(e) => {
      let n = report_failure(state, &student.id, "Não foi possível entrar na turma", &e, now).await;
      (Err(e), n)
    }
  }
}

/// Rank a class's students by their recorded game progress.
#[instrument(level = "info", skip(state, actor), fields(by = %actor.id))]
pub async fn class_ranking(state: &AppState, actor: &Actor, class_id: &str) -> Result<ClassRanking, ClassError> {
  let mut progress: HashMap<String, StudentProgress> = HashMap::new();
  for e in state.classes.enrollments(class_id).await? {
    let records = state.progress.for_user(&e.student_id).await;
    progress.insert(e.student_id, summarize_progress(&records));
  }
  state.classes.class_ranking(class_id, actor, &progress, Utc::now()).await
}

/// Background purge of expired trash. Runs until the task is aborted.
pub async fn run_trash_cleanup(state: Arc<AppState>, every: Duration) {
  let mut ticker = tokio::time::interval(every);
  loop {
    ticker.tick().await;
    if let Err(e) = state.classes.cleanup_expired(Utc::now()).await {
      error!(target: "classes", error = %e, "Scheduled trash cleanup failed");
    }
  }
}

//
// Dates
//

/// Run a raw value through the date helpers. JSON input (numbers, timestamp
/// objects) is honoured; anything else is treated as a plain string.
pub fn inspect_date(raw: Option<&str>, now: DateTime<Utc>) -> DateOut {
  let value = match raw {
    Some(s) => serde_json::from_str::<Value>(s).unwrap_or_else(|_| Value::String(s.to_string())),
    None => Value::Null,
  };
  DateOut {
    parsed: dates::parse_date(&value).map(|d| d.to_rfc3339()),
    date: dates::format_date(&value),
    date_time: dates::format_date_time(&value),
    time_ago: dates::time_ago(&value, now),
    hours_since: dates::hours_diff(&value, &now),
    is_recent: dates::is_recent_activity(&value, now),
    timestamp_millis: dates::timestamp_millis(&value),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AppConfig;
  use crate::dates::{INVALID_DATE, NOT_AVAILABLE};

  fn state() -> Arc<AppState> {
    Arc::new(AppState::from_config(AppConfig::default()))
  }

  fn user(id: &str) -> Option<String> {
    Some(id.to_string())
  }

  fn prof() -> Actor {
    Actor { id: "prof-1".into(), name: "Ana".into() }
  }

  async fn settle() {
    for _ in 0..50 {
      tokio::task::yield_now().await;
    }
  }

  #[tokio::test]
  async fn quiz_session_runs_to_completion_and_saves_progress() {
    let st = state();
    let s = start_session(&st, "basic-probability", &user("u1")).await.unwrap();
    assert_eq!(s.question.as_ref().unwrap().id, "prob-1");
    let sid = s.session_id.clone();

    let mut last = s;
    while last.final_score_percent.is_none() {
      let correct = submit_answer(&st, &sid, 0).await.unwrap();
      assert!(correct.record.is_correct);
      assert_eq!(submit_answer(&st, &sid, 0).await.unwrap_err(), GameError::AnswerLocked);
      last = advance_session(&st, &sid).await.unwrap();
    }
    assert_eq!(last.final_score_percent, Some(100));
    assert!(last.question.is_none());

    settle().await;
    let rec = st.progress.get("u1", "basic-probability").await.unwrap();
    assert_eq!(rec.best_score, 100);

    end_session(&st, &sid).await.unwrap();
    assert!(matches!(session_snapshot(&st, &sid).await, Err(GameError::UnknownSession(_))));
  }

  #[tokio::test]
  async fn unknown_game_is_rejected() {
    let st = state();
    assert!(matches!(start_session(&st, "nope", &None).await, Err(GameError::UnknownGame(_))));
  }

  #[tokio::test]
  async fn matching_scores_and_records() {
    let st = state();
    let pairs: HashMap<String, String> = [
      ("mean-concept", "mean-example"),
      ("correlation-concept", "sample-example"),
      ("sample-concept", "correlation-example"),
    ]
    .iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect();
    let out = validate_matching(&st, "everyday-concepts", &pairs, &user("u2")).await.unwrap();
    assert_eq!(out.correct, 1);
    assert_eq!(out.score_percent, 33);
    settle().await;
    assert_eq!(st.progress.get("u2", "everyday-concepts").await.unwrap().best_score, 33);
  }

  #[tokio::test]
  async fn simulation_reports_stats_and_histogram() {
    let st = state();
    let params: HashMap<String, f64> = [("people".to_string(), 30.0)].into_iter().collect();
    let out = run_simulation(&st, "coffee-energy", &params, None).unwrap();
    assert_eq!(out.values.len(), 30);
    assert_eq!(out.histogram.len(), HISTOGRAM_BINS);
    assert_eq!(out.stats.unwrap().count, 30);
    assert!(out.target_met.is_some());
    assert!(matches!(
      run_simulation(&st, "coffee-energy", &[("cups".to_string(), 42.0)].into_iter().collect(), None),
      Err(GameError::Simulation(SimulationError::OutOfRange { .. }))
    ));
  }

  #[tokio::test]
  async fn class_actions_always_notify() {
    let st = state();
    let bad = ClassForm { name: "AB".into(), description: None, semester: "2024.1".into(), year: None, capacity: 10 };
    let (res, n) = create_class(&st, &prof(), bad).await;
    assert!(matches!(res, Err(ClassError::Validation(_))));
    assert_eq!(n.kind, NotificationKind::Warning);
    assert_eq!(st.classes.store().calls(), 0);

    let good = ClassForm { name: "Bioestatística".into(), description: None, semester: "2024.1".into(), year: None, capacity: 10 };
    let (res, n) = create_class(&st, &prof(), good).await;
    let class = res.unwrap();
    assert_eq!(n.kind, NotificationKind::Success);
    assert!(n.message.contains(&class.invite_code));

    st.classes.store().set_offline(true);
    let (res, n) = soft_delete_class(&st, &prof(), &class.id, None).await;
    assert!(matches!(res, Err(ClassError::Store(_))));
    assert_eq!(n.kind, NotificationKind::Error);
    st.classes.store().set_offline(false);

    let (res, _) = soft_delete_class(&st, &prof(), &class.id, None).await;
    res.unwrap();
    let (res, n) = restore_class(&st, &prof(), &class.id).await;
    assert!(res.is_ok());
    assert_eq!(n.title, "Turma restaurada");

    assert_eq!(st.active_notifications(Some("prof-1"), Utc::now()).await.len(), 5);
  }

  #[tokio::test(start_paused = true)]
  async fn idle_sessions_are_swept_and_active_ones_kept() {
    let st = state();
    let idle = start_session(&st, "p-value", &user("u1")).await.unwrap().session_id;
    let busy = start_session(&st, "p-value", &user("u2")).await.unwrap().session_id;
    assert!(st.sessions.read().await[&idle].timer_running());

    tokio::time::sleep(Duration::from_secs(25 * 60)).await;
    session_snapshot(&st, &busy).await.unwrap();
    tokio::time::sleep(Duration::from_secs(15 * 60)).await;

    assert_eq!(sweep_idle_sessions(&st, Duration::from_secs(30 * 60)).await, 1);
    assert!(matches!(session_snapshot(&st, &idle).await, Err(GameError::UnknownSession(_))));
    assert!(st.sessions.read().await[&busy].timer_running());
  }

  #[tokio::test(start_paused = true)]
  async fn background_sweep_empties_abandoned_sessions() {
    let st = state();
    start_session(&st, "p-value", &None::<String>).await.unwrap();
    let task = tokio::spawn(run_session_sweep(st.clone(), Duration::from_secs(60), Duration::from_secs(120)));
    tokio::time::sleep(Duration::from_secs(200)).await;
    assert!(st.sessions.read().await.is_empty());
    task.abort();
  }

  #[tokio::test]
  async fn ranking_reads_student_progress() {
    let st = state();
    let form = ClassForm { name: "Bioestatística".into(), description: None, semester: "2024.1".into(), year: None, capacity: 10 };
    let class = create_class(&st, &prof(), form).await.0.unwrap();
    for (id, name) in [("s1", "Bruna"), ("s2", "Caio")] {
      let student = Student { id: id.into(), name: name.into(), email: format!("{}@uni.br", id) };
      join_class(&st, &student, &class.invite_code).await.0.unwrap();
    }
    record_completion(&st.progress, Some("s2"), "p-value", 90).await;
    record_completion(&st.progress, Some("s1"), "p-value", 40).await;

    let ranking = class_ranking(&st, &prof(), &class.id).await.unwrap();
    let order: Vec<&str> = ranking.entries.iter().map(|e| e.student_id.as_str()).collect();
    assert_eq!(order, ["s2", "s1"]);
    assert_eq!(ranking.average_score, 65.0);
    assert_eq!(st.classes.get_class(&class.id).await.unwrap().avg_progress, 65.0);
  }

  #[test]
  fn date_inspection_accepts_json_and_plain_strings() {
    let now = Utc::now();
    let ts = inspect_date(Some(r#"{"seconds": 1700000000}"#), now);
    assert_eq!(ts.timestamp_millis, 1_700_000_000_000);
    let iso = inspect_date(Some("2024-05-17"), now);
    assert_eq!(iso.date, "17/05/2024");
    let bad = inspect_date(Some("not-a-date"), now);
    assert_eq!(bad.date, INVALID_DATE);
    assert_eq!(bad.time_ago, NOT_AVAILABLE);
    assert_eq!(bad.hours_since, 0.0);
    assert!(iso.hours_since > 24.0);
    assert!(inspect_date(None, now).parsed.is_none());
  }
}
