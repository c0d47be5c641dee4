//! Class lifecycle: create, invite, soft delete, restore, purge.
//!
//! ```text
//! active --soft_delete--> deleted --restore (now < expires_at)--> active
//!                            \--cleanup_expired / force_delete--> gone
//! ```
//!
//! All persistence goes through `ClassStore`. Each store call is a single
//! atomic write (class + trash + invite together), so a failed call leaves
//! nothing half-done. Form validation happens before any store call.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Datelike, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::ClassSettings;
use crate::domain::{ClassEntity, ClassInvite, ClassStatus, DeletedClassRecord, Enrollment};

pub const NAME_MIN_CHARS: usize = 3;
pub const CAPACITY_MIN: u32 = 1;
pub const CAPACITY_MAX: u32 = 200;
const CODE_ATTEMPTS: usize = 5;

//
// Form validation
//

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClassForm {
  pub name: String,
  #[serde(default)] pub description: Option<String>,
  pub semester: String,
  #[serde(default)] pub year: Option<i32>,
  pub capacity: u32,
}

/// Per-field messages, keyed by form field name.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct FieldErrors(pub BTreeMap<String, String>);

impl FieldErrors {
  pub fn get(&self, field: &str) -> Option<&str> {
    self.0.get(field).map(String::as_str)
  }
}

pub fn validate_form(form: &ClassForm) -> Result<(), FieldErrors> {
  let mut errors = BTreeMap::new();
  let name = form.name.trim();
  if name.is_empty() {
    errors.insert("name".to_string(), "Nome da turma é obrigatório".to_string());
  } else if name.chars().count() < NAME_MIN_CHARS {
    errors.insert("name".to_string(), "Nome deve ter pelo menos 3 caracteres".to_string());
  }
  if form.semester.trim().is_empty() {
    errors.insert("semester".to_string(), "Semestre é obrigatório".to_string());
  }
  if form.capacity < CAPACITY_MIN || form.capacity > CAPACITY_MAX {
    errors.insert("capacity".to_string(), "Capacidade deve estar entre 1 e 200".to_string());
  }
  if errors.is_empty() { Ok(()) } else { Err(FieldErrors(errors)) }
}

/// `NAME` letters (4, padded with X) + 2-digit year + 2 random base-36 chars.
pub fn generate_invite_code<R: Rng + ?Sized>(class_name: &str, year: i32, rng: &mut R) -> String {
  const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
  let mut prefix: String = class_name
    .chars()
    .filter(|c| c.is_ascii_alphabetic())
    .map(|c| c.to_ascii_uppercase())
    .take(4)
    .collect();
  while prefix.len() < 4 {
    prefix.push('X');
  }
  let suffix: String = (0..2).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect();
  format!("{}{:02}{}", prefix, year.rem_euclid(100), suffix)
}

//
// Errors
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
  Unavailable(String),
  Conflict(String),
  Missing(String),
}

impl std::fmt::Display for StoreError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      StoreError::Unavailable(m) => write!(f, "store unavailable: {}", m),
      StoreError::Conflict(m) => write!(f, "store conflict: {}", m),
      StoreError::Missing(m) => write!(f, "store record missing: {}", m),
    }
  }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteError {
  NotFound,
  Inactive,
  Expired,
  UsesExhausted,
  ClassUnavailable,
  ClassFull,
  AlreadyEnrolled,
}

impl std::fmt::Display for InviteError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      InviteError::NotFound => "Código de convite não encontrado",
      InviteError::Inactive => "Código de convite desativado",
      InviteError::Expired => "Código de convite expirado",
      InviteError::UsesExhausted => "Limite de usos do convite atingido",
      InviteError::ClassUnavailable => "Turma não encontrada",
      InviteError::ClassFull => "Turma lotada",
      InviteError::AlreadyEnrolled => "Estudante já matriculado nesta turma",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassError {
  Validation(FieldErrors),
  NotFound(String),
  NotInTrash(String),
  AlreadyDeleted(String),
  RestoreExpired { class_id: String, expired_at: DateTime<Utc> },
  NotAuthorized,
  /// Retention does not fit a timestamp; settings were not validated.
  InvalidRetention(i64),
  Invite(InviteError),
  Store(StoreError),
}

impl std::fmt::Display for ClassError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ClassError::Validation(errs) => {
        let fields: Vec<&str> = errs.0.keys().map(String::as_str).collect();
        write!(f, "invalid class form ({})", fields.join(", "))
      }
      ClassError::NotFound(id) => write!(f, "Turma não encontrada: {}", id),
      ClassError::NotInTrash(id) => write!(f, "Turma não encontrada na lixeira: {}", id),
      ClassError::AlreadyDeleted(id) => write!(f, "Turma já está na lixeira: {}", id),
      ClassError::RestoreExpired { class_id, expired_at } => write!(
        f,
        "O prazo para restauração da turma {} expirou (prazo expirado em {})",
        class_id,
        expired_at.to_rfc3339()
      ),
      ClassError::NotAuthorized => f.write_str("Não autorizado"),
      ClassError::InvalidRetention(days) => write!(f, "Prazo de retenção inválido: {} dias", days),
      ClassError::Invite(e) => write!(f, "{}", e),
      ClassError::Store(e) => write!(f, "{}", e),
    }
  }
}

impl std::error::Error for ClassError {}

impl From<StoreError> for ClassError {
  fn from(e: StoreError) -> Self {
    ClassError::Store(e)
  }
}

impl From<InviteError> for ClassError {
  fn from(e: InviteError) -> Self {
    ClassError::Invite(e)
  }
}

//
// Store
//

#[derive(Clone, Debug, Default)]
pub struct ClassFilter {
  pub professor_id: Option<String>,
  pub status: Option<ClassStatus>,
}

impl ClassFilter {
  fn matches(&self, c: &ClassEntity) -> bool {
    self.professor_id.as_ref().map(|p| &c.professor_id == p).unwrap_or(true)
      && self.status.map(|s| c.status == s).unwrap_or(true)
  }
}

/// Remote document store holding classes, the class trash, invites and
/// enrollments. Each method is one atomic write or read.
#[allow(async_fn_in_trait)]
pub trait ClassStore {
  async fn insert_class(&self, class: ClassEntity, invite: ClassInvite) -> Result<String, StoreError>;
  async fn get_class(&self, id: &str) -> Result<Option<ClassEntity>, StoreError>;
  async fn query_classes(&self, filter: &ClassFilter) -> Result<Vec<ClassEntity>, StoreError>;
  /// Mark the class deleted, write the trash record, deactivate its invite.
  async fn soft_delete(&self, record: DeletedClassRecord) -> Result<(), StoreError>;
  /// Mark the class active, drop the trash record, reactivate its invite.
  async fn restore(&self, class_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
  /// Remove class, trash record, invite and enrollments for good.
  async fn purge(&self, class_id: &str) -> Result<(), StoreError>;
  async fn get_trash(&self, class_id: &str) -> Result<Option<DeletedClassRecord>, StoreError>;
  async fn query_trash(&self, deleted_by: Option<&str>) -> Result<Vec<DeletedClassRecord>, StoreError>;
  async fn get_invite(&self, code: &str) -> Result<Option<ClassInvite>, StoreError>;
  /// Record an enrollment, bump the class head count and the invite uses.
  /// Capacity, invite uses and duplicates are checked in the same write.
  async fn enroll(&self, enrollment: Enrollment) -> Result<EnrollOutcome, StoreError>;
  async fn enrollments(&self, class_id: &str) -> Result<Vec<Enrollment>, StoreError>;
  async fn set_avg_progress(&self, class_id: &str, avg_progress: f64, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Result of an enrollment write. Anything but `Enrolled` left the store untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnrollOutcome {
  Enrolled,
  ClassFull,
  UsesExhausted,
  AlreadyEnrolled,
}

#[derive(Default)]
struct StoreInner {
  classes: HashMap<String, ClassEntity>,
  trash: HashMap<String, DeletedClassRecord>,
  invites: HashMap<String, ClassInvite>,
  enrollments: HashMap<String, Vec<Enrollment>>,
}

/// In-process `ClassStore`. `set_offline(true)` makes every call fail, the
/// way a dropped connection would.
#[derive(Default)]
pub struct InMemoryClassStore {
  inner: RwLock<StoreInner>,
  offline: AtomicBool,
  calls: AtomicUsize,
}

impl InMemoryClassStore {
  pub fn new() -> Self { Self::default() }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Number of store calls served so far.
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  fn enter(&self) -> Result<(), StoreError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.offline.load(Ordering::SeqCst) {
      return Err(StoreError::Unavailable("connection lost".into()));
    }
    Ok(())
  }
}

impl ClassStore for InMemoryClassStore {
  async fn insert_class(&self, class: ClassEntity, invite: ClassInvite) -> Result<String, StoreError> {
    self.enter()?;
    let mut g = self.inner.write().await;
    if g.classes.contains_key(&class.id) {
      return Err(StoreError::Conflict(format!("class {} exists", class.id)));
    }
    if g.invites.contains_key(&invite.code) {
      return Err(StoreError::Conflict(format!("invite {} exists", invite.code)));
    }
    let id = class.id.clone();
    g.invites.insert(invite.code.clone(), invite);
    g.classes.insert(id.clone(), class);
    Ok(id)
  }

  async fn get_class(&self, id: &str) -> Result<Option<ClassEntity>, StoreError> {
    self.enter()?;
    Ok(self.inner.read().await.classes.get(id).cloned())
  }

  async fn query_classes(&self, filter: &ClassFilter) -> Result<Vec<ClassEntity>, StoreError> {
    self.enter()?;
    let g = self.inner.read().await;
    let mut out: Vec<ClassEntity> = g.classes.values().filter(|c| filter.matches(c)).cloned().collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(out)
  }

  async fn soft_delete(&self, record: DeletedClassRecord) -> Result<(), StoreError> {
    self.enter()?;
    let mut g = self.inner.write().await;
    let id = record.class.id.clone();
    let code = {
      let class = g.classes.get_mut(&id).ok_or_else(|| StoreError::Missing(id.clone()))?;
      class.status = ClassStatus::Deleted;
      class.updated_at = record.deleted_at;
      class.invite_code.clone()
    };
    if let Some(inv) = g.invites.get_mut(&code) {
      inv.is_active = false;
    }
    g.trash.insert(id, record);
    Ok(())
  }

  async fn restore(&self, class_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
    self.enter()?;
    let mut g = self.inner.write().await;
    if !g.trash.contains_key(class_id) || !g.classes.contains_key(class_id) {
      return Err(StoreError::Missing(class_id.to_string()));
    }
    g.trash.remove(class_id);
    let code = {
      let class = g.classes.get_mut(class_id).ok_or_else(|| StoreError::Missing(class_id.to_string()))?;
      class.status = ClassStatus::Active;
      class.updated_at = at;
      class.invite_code.clone()
    };
    if let Some(inv) = g.invites.get_mut(&code) {
      inv.is_active = true;
    }
    Ok(())
  }

  async fn purge(&self, class_id: &str) -> Result<(), StoreError> {
    self.enter()?;
    let mut g = self.inner.write().await;
    let code = g
      .classes
      .remove(class_id)
      .map(|c| c.invite_code)
      .or_else(|| g.trash.get(class_id).map(|r| r.class.invite_code.clone()));
    g.trash.remove(class_id);
    g.enrollments.remove(class_id);
    if let Some(code) = code {
      g.invites.remove(&code);
    }
    Ok(())
  }

  async fn get_trash(&self, class_id: &str) -> Result<Option<DeletedClassRecord>, StoreError> {
    self.enter()?;
    Ok(self.inner.read().await.trash.get(class_id).cloned())
  }

  async fn query_trash(&self, deleted_by: Option<&str>) -> Result<Vec<DeletedClassRecord>, StoreError> {
    self.enter()?;
    let g = self.inner.read().await;
    let mut out: Vec<DeletedClassRecord> = g
      .trash
      .values()
      .filter(|r| deleted_by.map(|p| r.deleted_by == p).unwrap_or(true))
      .cloned()
      .collect();
    out.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
    Ok(out)
  }

  async fn get_invite(&self, code: &str) -> Result<Option<ClassInvite>, StoreError> {
    self.enter()?;
    Ok(self.inner.read().await.invites.get(code).cloned())
  }

  async fn enroll(&self, enrollment: Enrollment) -> Result<EnrollOutcome, StoreError> {
    self.enter()?;
    let mut g = self.inner.write().await;
    let class = g
      .classes
      .get(&enrollment.class_id)
      .ok_or_else(|| StoreError::Missing(enrollment.class_id.clone()))?;
    if class.students_count >= class.capacity {
      return Ok(EnrollOutcome::ClassFull);
    }
    if let Some(inv) = g.invites.get(&enrollment.invite_code) {
      if inv.max_uses.map(|m| inv.current_uses >= m).unwrap_or(false) {
        return Ok(EnrollOutcome::UsesExhausted);
      }
    }
    let enrolled = g.enrollments.get(&enrollment.class_id);
    if enrolled.map(|list| list.iter().any(|e| e.student_id == enrollment.student_id)).unwrap_or(false) {
      return Ok(EnrollOutcome::AlreadyEnrolled);
    }
    if let Some(class) = g.classes.get_mut(&enrollment.class_id) {
      class.students_count += 1;
    }
    if let Some(inv) = g.invites.get_mut(&enrollment.invite_code) {
      inv.current_uses += 1;
    }
    g.enrollments.entry(enrollment.class_id.clone()).or_default().push(enrollment);
    Ok(EnrollOutcome::Enrolled)
  }

  async fn enrollments(&self, class_id: &str) -> Result<Vec<Enrollment>, StoreError> {
    self.enter()?;
    Ok(self.inner.read().await.enrollments.get(class_id).cloned().unwrap_or_default())
  }

  async fn set_avg_progress(&self, class_id: &str, avg_progress: f64, at: DateTime<Utc>) -> Result<(), StoreError> {
    self.enter()?;
    let mut g = self.inner.write().await;
    let class = g.classes.get_mut(class_id).ok_or_else(|| StoreError::Missing(class_id.to_string()))?;
    class.avg_progress = avg_progress;
    class.updated_at = at;
    Ok(())
  }
}

//
// Service
//

/// Who is acting on the dashboard.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Actor {
  pub id: String,
  pub name: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Student {
  pub id: String,
  pub name: String,
  pub email: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct TrashEntry {
  #[serde(flatten)]
  pub record: DeletedClassRecord,
  pub can_restore: bool,
  pub days_remaining: i64,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct TrashStats {
  pub total_deleted: usize,
  pub expiring_soon: usize,
  /// Rough size of the trashed snapshots, in bytes of JSON.
  pub total_size: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct InviteInfo {
  pub class_id: String,
  pub name: String,
  pub semester: String,
  pub year: i32,
  pub professor_name: String,
  pub description: Option<String>,
  pub students_count: u32,
  pub capacity: u32,
}

/// A student's aggregated results across games.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StudentProgress {
  /// Mean of the best score per game, 0..=100.
  pub score_percent: f64,
  pub completed_games: u32,
  pub last_activity: Option<DateTime<Utc>>,
}

/// Students at or above this score count towards the completion rate.
pub const COMPLETION_SCORE: f64 = 70.0;

#[derive(Clone, Debug, Serialize)]
pub struct RankingEntry {
  pub rank: usize,
  pub student_id: String,
  pub student_name: String,
  pub score_percent: f64,
  pub completed_games: u32,
  pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ClassRanking {
  pub class_id: String,
  pub class_name: String,
  pub students_count: usize,
  pub average_score: f64,
  pub completion_rate: f64,
  pub entries: Vec<RankingEntry>,
  pub generated_at: DateTime<Utc>,
}

fn round_one(v: f64) -> f64 {
  (v * 10.0).round() / 10.0
}

pub struct ClassService<S> {
  store: S,
  settings: ClassSettings,
}

impl<S: ClassStore> ClassService<S> {
  pub fn new(store: S, settings: ClassSettings) -> Self {
    Self { store, settings: settings.validated() }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn retention(&self) -> Option<Duration> {
    Duration::try_days(self.settings.retention_days)
  }

  #[instrument(level = "info", skip(self, form), fields(professor = %professor.id, name = %form.name))]
  pub async fn create_class(&self, professor: &Actor, form: ClassForm, now: DateTime<Utc>) -> Result<ClassEntity, ClassError> {
    validate_form(&form).map_err(ClassError::Validation)?;

    let year = form.year.unwrap_or_else(|| now.year());
    let mut code = String::new();
    for _ in 0..CODE_ATTEMPTS {
      let candidate = generate_invite_code(&form.name, year, &mut rand::thread_rng());
      if self.store.get_invite(&candidate).await?.is_none() {
        code = candidate;
        break;
      }
    }
    if code.is_empty() {
      return Err(StoreError::Conflict("could not allocate a unique invite code".into()).into());
    }

    let class = ClassEntity {
      id: Uuid::new_v4().to_string(),
      name: form.name.trim().to_string(),
      description: form.description.filter(|d| !d.trim().is_empty()),
      semester: form.semester.trim().to_string(),
      year,
      capacity: form.capacity,
      invite_code: code.clone(),
      professor_id: professor.id.clone(),
      professor_name: professor.name.clone(),
      students_count: 0,
      avg_progress: 0.0,
      status: ClassStatus::Active,
      created_at: now,
      updated_at: now,
    };
    let invite = ClassInvite {
      code,
      class_id: class.id.clone(),
      created_at: now,
      expires_at: None,
      is_active: true,
      max_uses: None,
      current_uses: 0,
      created_by: professor.id.clone(),
    };
    self.store.insert_class(class.clone(), invite).await?;
    info!(target: "classes", id = %class.id, code = %class.invite_code, "Class created");
    Ok(class)
  }

  pub async fn get_class(&self, class_id: &str) -> Result<ClassEntity, ClassError> {
    self.store.get_class(class_id).await?.ok_or_else(|| ClassError::NotFound(class_id.to_string()))
  }

  /// Students enrolled in a class, in join order.
  pub async fn enrollments(&self, class_id: &str) -> Result<Vec<Enrollment>, ClassError> {
    Ok(self.store.enrollments(class_id).await?)
  }

  /// Active classes of a professor, newest first.
  pub async fn list_classes(&self, professor_id: &str) -> Result<Vec<ClassEntity>, ClassError> {
    let filter = ClassFilter { professor_id: Some(professor_id.to_string()), status: Some(ClassStatus::Active) };
    Ok(self.store.query_classes(&filter).await?)
  }

  #[instrument(level = "info", skip(self, reason), fields(by = %by.id))]
  pub async fn soft_delete(
    &self,
    class_id: &str,
    by: &Actor,
    reason: Option<String>,
    now: DateTime<Utc>,
  ) -> Result<DeletedClassRecord, ClassError> {
    let class = self.get_class(class_id).await?;
    if class.status == ClassStatus::Deleted {
      return Err(ClassError::AlreadyDeleted(class_id.to_string()));
    }
    let expires_at = self
      .retention()
      .and_then(|d| now.checked_add_signed(d))
      .ok_or(ClassError::InvalidRetention(self.settings.retention_days))?;
    let record = DeletedClassRecord {
      class,
      deleted_at: now,
      deleted_by: by.id.clone(),
      deleted_by_name: by.name.clone(),
      expires_at,
      reason: reason.filter(|r| !r.trim().is_empty()).unwrap_or_else(|| "Excluída pelo professor".to_string()),
    };
    self.store.soft_delete(record.clone()).await?;
    info!(target: "classes", %class_id, expires_at = %record.expires_at, "Class moved to trash");
    Ok(record)
  }

  /// Bring a class back from the trash. Allowed while `now < expires_at`,
  /// and only for the professor who owns the class.
  #[instrument(level = "info", skip(self), fields(by = %by.id))]
  pub async fn restore(&self, class_id: &str, by: &Actor, now: DateTime<Utc>) -> Result<ClassEntity, ClassError> {
    let record = self
      .store
      .get_trash(class_id)
      .await?
      .ok_or_else(|| ClassError::NotInTrash(class_id.to_string()))?;
    if !record.can_restore(now) {
      warn!(target: "classes", %class_id, expires_at = %record.expires_at, "Restore refused: retention elapsed");
      return Err(ClassError::RestoreExpired { class_id: class_id.to_string(), expired_at: record.expires_at });
    }
    if record.class.professor_id != by.id {
      return Err(ClassError::NotAuthorized);
    }
    self.store.restore(class_id, now).await?;
    info!(target: "classes", %class_id, "Class restored");
    self.get_class(class_id).await
  }

  pub async fn list_deleted(&self, professor_id: &str, now: DateTime<Utc>) -> Result<Vec<TrashEntry>, ClassError> {
    let records = self.store.query_trash(Some(professor_id)).await?;
    Ok(
      records
        .into_iter()
        .map(|r| TrashEntry { can_restore: r.can_restore(now), days_remaining: r.days_remaining(now), record: r })
        .collect(),
    )
  }

  pub async fn trash_stats(&self, professor_id: &str, now: DateTime<Utc>) -> Result<TrashStats, ClassError> {
    let entries = self.list_deleted(professor_id, now).await?;
    let soon = self.settings.expiring_soon_days;
    let mut stats = TrashStats { total_deleted: entries.len(), ..TrashStats::default() };
    for e in &entries {
      if e.days_remaining > 0 && e.days_remaining <= soon {
        stats.expiring_soon += 1;
      }
      stats.total_size += serde_json::to_string(&e.record.class).map(|s| s.len()).unwrap_or(0);
    }
    Ok(stats)
  }

  /// Permanently remove every trash record with `expires_at <= now`.
  #[instrument(level = "info", skip(self))]
  pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize, ClassError> {
    let expired: Vec<String> = self
      .store
      .query_trash(None)
      .await?
      .into_iter()
      .filter(|r| !r.can_restore(now))
      .map(|r| r.class.id)
      .collect();
    for id in &expired {
      self.store.purge(id).await?;
    }
    if !expired.is_empty() {
      info!(target: "classes", removed = expired.len(), "Expired classes purged");
    }
    Ok(expired.len())
  }

  /// Purge a trashed class ahead of expiry; only whoever deleted it may.
  #[instrument(level = "info", skip(self), fields(by = %by.id))]
  pub async fn force_delete(&self, class_id: &str, by: &Actor) -> Result<(), ClassError> {
    let record = self
      .store
      .get_trash(class_id)
      .await?
      .ok_or_else(|| ClassError::NotInTrash(class_id.to_string()))?;
    if record.deleted_by != by.id {
      return Err(ClassError::NotAuthorized);
    }
    self.store.purge(class_id).await?;
    info!(target: "classes", %class_id, "Class permanently deleted");
    Ok(())
  }

  pub async fn validate_invite(&self, code: &str, now: DateTime<Utc>) -> Result<InviteInfo, ClassError> {
    let (_, class) = self.usable_invite(code, now).await?;
    Ok(InviteInfo {
      class_id: class.id,
      name: class.name,
      semester: class.semester,
      year: class.year,
      professor_name: class.professor_name,
      description: class.description,
      students_count: class.students_count,
      capacity: class.capacity,
    })
  }

  #[instrument(level = "info", skip(self, student), fields(student = %student.id))]
  pub async fn join_with_code(&self, code: &str, student: &Student, now: DateTime<Utc>) -> Result<Enrollment, ClassError> {
    let (invite, class) = self.usable_invite(code, now).await?;
    let enrollment = Enrollment {
      class_id: class.id.clone(),
      student_id: student.id.clone(),
      student_name: student.name.clone(),
      student_email: student.email.clone(),
      invite_code: invite.code,
      enrolled_at: now,
    };
    match self.store.enroll(enrollment.clone()).await? {
      EnrollOutcome::Enrolled => {}
      EnrollOutcome::ClassFull => return Err(InviteError::ClassFull.into()),
      EnrollOutcome::UsesExhausted => return Err(InviteError::UsesExhausted.into()),
      EnrollOutcome::AlreadyEnrolled => return Err(InviteError::AlreadyEnrolled.into()),
    }
    info!(target: "classes", class_id = %class.id, "Student enrolled");
    Ok(enrollment)
  }

  /// Rank a class's students by score and store the class average as
  /// `avg_progress`. Only the owning professor may ask.
  #[instrument(level = "info", skip(self, progress), fields(by = %by.id))]
  pub async fn class_ranking(
    &self,
    class_id: &str,
    by: &Actor,
    progress: &HashMap<String, StudentProgress>,
    now: DateTime<Utc>,
  ) -> Result<ClassRanking, ClassError> {
    let class = self.get_class(class_id).await?;
    if class.status != ClassStatus::Active {
      return Err(ClassError::NotFound(class_id.to_string()));
    }
    if class.professor_id != by.id {
      return Err(ClassError::NotAuthorized);
    }
    let mut entries: Vec<RankingEntry> = self
      .store
      .enrollments(class_id)
      .await?
      .into_iter()
      .map(|e| {
        let p = progress.get(&e.student_id).cloned().unwrap_or_default();
        RankingEntry {
          rank: 0,
          student_id: e.student_id,
          student_name: e.student_name,
          score_percent: p.score_percent.clamp(0.0, 100.0),
          completed_games: p.completed_games,
          last_activity: p.last_activity,
        }
      })
      .collect();
    entries.sort_by(|a, b| {
      b.score_percent
        .total_cmp(&a.score_percent)
        .then_with(|| b.completed_games.cmp(&a.completed_games))
        .then_with(|| a.student_name.cmp(&b.student_name))
    });
    for (i, e) in entries.iter_mut().enumerate() {
      e.rank = i + 1;
    }

    let n = entries.len();
    let (average_score, completion_rate) = if n == 0 {
      (0.0, 0.0)
    } else {
      let total: f64 = entries.iter().map(|e| e.score_percent).sum();
      let done = entries.iter().filter(|e| e.score_percent >= COMPLETION_SCORE).count();
      (round_one(total / n as f64), round_one(done as f64 * 100.0 / n as f64))
    };
    self.store.set_avg_progress(class_id, average_score, now).await?;
    info!(target: "classes", %class_id, students = n, average_score, "Class ranking generated");
    Ok(ClassRanking {
      class_id: class.id,
      class_name: class.name,
      students_count: n,
      average_score,
      completion_rate,
      entries,
      generated_at: now,
    })
  }

  async fn usable_invite(&self, code: &str, now: DateTime<Utc>) -> Result<(ClassInvite, ClassEntity), ClassError> {
    let invite = self.store.get_invite(code).await?.ok_or(InviteError::NotFound)?;
    if !invite.is_active {
      return Err(InviteError::Inactive.into());
    }
    if invite.expires_at.map(|e| e < now).unwrap_or(false) {
      return Err(InviteError::Expired.into());
    }
    if invite.max_uses.map(|m| invite.current_uses >= m).unwrap_or(false) {
      return Err(InviteError::UsesExhausted.into());
    }
    let class = self.store.get_class(&invite.class_id).await?.ok_or(InviteError::ClassUnavailable)?;
    if class.status != ClassStatus::Active {
      return Err(InviteError::ClassUnavailable.into());
    }
    Ok((invite, class))
  }
}
