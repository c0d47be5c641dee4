//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and maps core errors to status codes.

use std::{convert::Infallible, sync::Arc};

use axum::{
  extract::{FromRequestParts, Path, Query, State},
  http::{request::Parts, HeaderMap, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use crate::classes::{Actor, ClassError, ClassForm, InviteError, Student};
use crate::logic::{self, GameError};
use crate::matching::MatchError;
use crate::notify::Notification;
use crate::protocol::*;
use crate::shell::AuthProvider;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// Caller identity from the `x-user-id` / `x-user-name` headers.
#[derive(Clone, Debug, Default)]
pub struct HeaderAuth {
  pub user_id: Option<String>,
  pub user_name: Option<String>,
}

impl HeaderAuth {
  pub fn from_headers(headers: &HeaderMap) -> Self {
    let read = |name: &str| {
      headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    };
    Self { user_id: read(USER_ID_HEADER), user_name: read(USER_NAME_HEADER) }
  }

  /// Signed-in caller as an actor, or a 401.
  fn actor(&self) -> Result<Actor, Response> {
    match &self.user_id {
      Some(id) => Ok(Actor { id: id.clone(), name: self.user_name.clone().unwrap_or_else(|| id.clone()) }),
      None => Err(error_response(StatusCode::UNAUTHORIZED, "Faça login para continuar")),
    }
  }
}

impl AuthProvider for HeaderAuth {
  fn current_user(&self) -> Option<String> { self.user_id.clone() }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for HeaderAuth {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    Ok(HeaderAuth::from_headers(&parts.headers))
  }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
  (status, Json(ErrorOut { message: message.into() })).into_response()
}

pub fn game_status(e: &GameError) -> StatusCode {
  match e {
    GameError::UnknownGame(_) | GameError::UnknownSession(_) | GameError::UnknownDeck(_) | GameError::UnknownScenario(_) => {
      StatusCode::NOT_FOUND
    }
    GameError::AnswerLocked => StatusCode::CONFLICT,
    GameError::Matching(MatchError::InvalidGroup { .. }) | GameError::Matching(MatchError::DuplicateId(_)) => {
      StatusCode::INTERNAL_SERVER_ERROR
    }
    GameError::Matching(_) | GameError::Simulation(_) => StatusCode::UNPROCESSABLE_ENTITY,
  }
}

pub fn class_status(e: &ClassError) -> StatusCode {
  match e {
    ClassError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
    ClassError::NotFound(_) | ClassError::NotInTrash(_) => StatusCode::NOT_FOUND,
    ClassError::AlreadyDeleted(_) => StatusCode::CONFLICT,
    ClassError::RestoreExpired { .. } => StatusCode::GONE,
    ClassError::NotAuthorized => StatusCode::FORBIDDEN,
    ClassError::Invite(InviteError::NotFound) | ClassError::Invite(InviteError::ClassUnavailable) => StatusCode::NOT_FOUND,
    ClassError::Invite(InviteError::ClassFull) | ClassError::Invite(InviteError::AlreadyEnrolled) => StatusCode::CONFLICT,
    ClassError::Invite(_) => StatusCode::GONE,
    ClassError::InvalidRetention(_) => StatusCode::INTERNAL_SERVER_ERROR,
    ClassError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
  }
}

fn game_result<T: Serialize>(res: Result<T, GameError>) -> Response {
  match res {
    Ok(v) => Json(v).into_response(),
    Err(e) => error_response(game_status(&e), e.to_string()),
  }
}

fn class_read<T: Serialize>(res: Result<T, ClassError>) -> Response {
  match res {
    Ok(v) => Json(v).into_response(),
    Err(e) => error_response(class_status(&e), e.to_string()),
  }
}

fn class_action<T: Serialize>((res, notification): (Result<T, ClassError>, Notification), ok: StatusCode) -> Response {
  match res {
    Ok(data) => (ok, Json(ActionOut { ok: true, data: Some(data), errors: None, notification })).into_response(),
    Err(e) => {
      let errors = match &e {
        ClassError::Validation(f) => Some(f.clone()),
        _ => None,
      };
      (class_status(&e), Json(ActionOut::<T> { ok: false, data: None, errors, notification })).into_response()
    }
  }
}

//
// Games
//

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_list_games(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.catalog.list())
}

#[instrument(level = "info", skip(state, auth, body), fields(game_id = %body.game_id))]
pub async fn http_start_session(
  State(state): State<Arc<AppState>>,
  auth: HeaderAuth,
  Json(body): Json<StartSessionIn>,
) -> Response {
  match logic::start_session(&state, &body.game_id, &auth).await {
    Ok(s) => (StatusCode::CREATED, Json(s)).into_response(),
    Err(e) => error_response(game_status(&e), e.to_string()),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> Response {
  game_result(logic::session_snapshot(&state, &session_id).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_end_session(State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> Response {
  match logic::end_session(&state, &session_id).await {
    Ok(()) => StatusCode::NO_CONTENT.into_response(),
    Err(e) => error_response(game_status(&e), e.to_string()),
  }
}

#[instrument(level = "info", skip(state, body), fields(choice = body.choice))]
pub async fn http_answer(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
  Json(body): Json<AnswerIn>,
) -> Response {
  game_result(logic::submit_answer(&state, &session_id, body.choice).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_advance(State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> Response {
  game_result(logic::advance_session(&state, &session_id).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_restart(State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> Response {
  game_result(logic::restart_session(&state, &session_id).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_toggle_education(State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> Response {
  game_result(logic::toggle_education(&state, &session_id).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_deck(State(state): State<Arc<AppState>>, Path(deck_id): Path<String>) -> Response {
  match state.catalog.deck(&deck_id) {
    Some((deck, _)) => Json(to_deck_out(deck, &mut rand::thread_rng())).into_response(),
    None => error_response(StatusCode::NOT_FOUND, GameError::UnknownDeck(deck_id).to_string()),
  }
}

#[instrument(level = "info", skip(state, auth, body), fields(pairs = body.pairs.len()))]
pub async fn http_validate_matching(
  State(state): State<Arc<AppState>>,
  auth: HeaderAuth,
  Path(deck_id): Path<String>,
  Json(body): Json<MatchingIn>,
) -> Response {
  game_result(logic::validate_matching(&state, &deck_id, &body.pairs, &auth).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_simulation(State(state): State<Arc<AppState>>, Path(scenario_id): Path<String>) -> Response {
  match state.catalog.scenario(&scenario_id) {
    Some(s) => Json(s.clone()).into_response(),
    None => error_response(StatusCode::NOT_FOUND, GameError::UnknownScenario(scenario_id).to_string()),
  }
}

#[instrument(level = "info", skip(state, body), fields(params = body.params.len()))]
pub async fn http_run_simulation(
  State(state): State<Arc<AppState>>,
  Path(scenario_id): Path<String>,
  Json(body): Json<SimulationIn>,
) -> Response {
  game_result(logic::run_simulation(&state, &scenario_id, &body.params, body.bins))
}

#[instrument(level = "info", skip(state, auth))]
pub async fn http_get_progress(State(state): State<Arc<AppState>>, auth: HeaderAuth) -> Response {
  match auth.current_user() {
    Some(user) => Json(state.progress.for_user(&user).await).into_response(),
    None => error_response(StatusCode::UNAUTHORIZED, "Faça login para continuar"),
  }
}

//
// Classes, trash & invites
//

#[instrument(level = "info", skip(state, auth))]
pub async fn http_list_classes(State(state): State<Arc<AppState>>, auth: HeaderAuth) -> Response {
  let actor = match auth.actor() {
    Ok(a) => a,
    Err(r) => return r,
  };
  class_read(state.classes.list_classes(&actor.id).await)
}

#[instrument(level = "info", skip(state, auth))]
pub async fn http_class_ranking(
  State(state): State<Arc<AppState>>,
  auth: HeaderAuth,
  Path(class_id): Path<String>,
) -> Response {
  let actor = match auth.actor() {
    Ok(a) => a,
    Err(r) => return r,
  };
  class_read(logic::class_ranking(&state, &actor, &class_id).await)
}

#[instrument(level = "info", skip(state, auth, form), fields(name = %form.name))]
pub async fn http_create_class(
  State(state): State<Arc<AppState>>,
  auth: HeaderAuth,
  Json(form): Json<ClassForm>,
) -> Response {
  let actor = match auth.actor() {
    Ok(a) => a,
    Err(r) => return r,
  };
  class_action(logic::create_class(&state, &actor, form).await, StatusCode::CREATED)
}

#[instrument(level = "info", skip(state, auth, body))]
pub async fn http_soft_delete_class(
  State(state): State<Arc<AppState>>,
  auth: HeaderAuth,
  Path(class_id): Path<String>,
  Json(body): Json<SoftDeleteIn>,
) -> Response {
  let actor = match auth.actor() {
    Ok(a) => a,
    Err(r) => return r,
  };
  class_action(logic::soft_delete_class(&state, &actor, &class_id, body.reason).await, StatusCode::OK)
}

#[instrument(level = "info", skip(state, auth))]
pub async fn http_list_trash(State(state): State<Arc<AppState>>, auth: HeaderAuth) -> Response {
  let actor = match auth.actor() {
    Ok(a) => a,
    Err(r) => return r,
  };
  class_read(state.classes.list_deleted(&actor.id, Utc::now()).await)
}

#[instrument(level = "info", skip(state, auth))]
pub async fn http_trash_stats(State(state): State<Arc<AppState>>, auth: HeaderAuth) -> Response {
  let actor = match auth.actor() {
    Ok(a) => a,
    Err(r) => return r,
  };
  class_read(state.classes.trash_stats(&actor.id, Utc::now()).await)
}

#[instrument(level = "info", skip(state, auth))]
pub async fn http_restore_class(
  State(state): State<Arc<AppState>>,
  auth: HeaderAuth,
  Path(class_id): Path<String>,
) -> Response {
  let actor = match auth.actor() {
    Ok(a) => a,
    Err(r) => return r,
  };
  class_action(logic::restore_class(&state, &actor, &class_id).await, StatusCode::OK)
}

#[instrument(level = "info", skip(state, auth))]
pub async fn http_force_delete_class(
  State(state): State<Arc<AppState>>,
  auth: HeaderAuth,
  Path(class_id): Path<String>,
) -> Response {
  let actor = match auth.actor() {
    Ok(a) => a,
    Err(r) => return r,
  };
  class_action(logic::force_delete_class(&state, &actor, &class_id).await, StatusCode::OK)
}

#[instrument(level = "info", skip(state, auth))]
pub async fn http_cleanup_trash(State(state): State<Arc<AppState>>, auth: HeaderAuth) -> Response {
  let actor = match auth.actor() {
    Ok(a) => a,
    Err(r) => return r,
  };
  class_action(logic::cleanup_trash(&state, &actor).await, StatusCode::OK)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_invite(State(state): State<Arc<AppState>>, Path(code): Path<String>) -> Response {
  let code = code.trim().to_uppercase();
  class_read(state.classes.validate_invite(&code, Utc::now()).await)
}

#[instrument(level = "info", skip(state, auth, body))]
pub async fn http_join_class(
  State(state): State<Arc<AppState>>,
  auth: HeaderAuth,
  Path(code): Path<String>,
  Json(body): Json<JoinIn>,
) -> Response {
  let actor = match auth.actor() {
    Ok(a) => a,
    Err(r) => return r,
  };
  let student = Student { id: actor.id, name: body.name, email: body.email };
  let res = logic::join_class(&state, &student, &code).await;
  info!(target: "classes", student = %student.id, ok = res.0.is_ok(), "HTTP join_class handled");
  class_action(res, StatusCode::CREATED)
}

//
// Notifications & dates
//

#[instrument(level = "info", skip(state, auth))]
pub async fn http_list_notifications(State(state): State<Arc<AppState>>, auth: HeaderAuth) -> impl IntoResponse {
  Json(state.active_notifications(auth.current_user().as_deref(), Utc::now()).await)
}

#[instrument(level = "info", skip(state, auth))]
pub async fn http_dismiss_notification(
  State(state): State<Arc<AppState>>,
  auth: HeaderAuth,
  Path(id): Path<String>,
) -> Response {
  if state.dismiss_notification(auth.current_user().as_deref(), &id).await {
    StatusCode::NO_CONTENT.into_response()
  } else {
    error_response(StatusCode::NOT_FOUND, "Notificação não encontrada")
  }
}

#[instrument(level = "info")]
pub async fn http_inspect_date(Query(q): Query<DateQuery>) -> impl IntoResponse {
  Json(logic::inspect_date(q.value.as_deref(), Utc::now()))
}
