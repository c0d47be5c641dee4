//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.
//!
//! Matching boards live on the connection: clicks build pairs, submit scores
//! them against the catalog. Quiz sessions started here are ended when the
//! socket closes.

use std::{collections::HashMap, sync::Arc};
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::logic::{self, GameError};
use crate::matching::MatchingBoard;
use crate::routes::http::HeaderAuth;
use crate::shell::AuthProvider;
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state, auth))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>, auth: HeaderAuth) -> impl IntoResponse {
  info!(target: "nutrilab", user = ?auth.user_id, "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state, auth))
}

/// Per-connection state.
#[derive(Default)]
pub struct WsConn {
  pub boards: HashMap<String, MatchingBoard>,
  pub sessions: Vec<String>,
}

#[instrument(level = "info", skip(socket, state, auth))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, auth: HeaderAuth) {
  info!(target: "nutrilab", "WebSocket connected");
  let mut conn = WsConn::default();
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "nutrilab", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state, &auth, &mut conn).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "nutrilab", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  close_conn(&state, conn).await;
  info!(target: "nutrilab", "WebSocket disconnected");
}

/// End whatever sessions the connection still owns.
pub async fn close_conn(state: &AppState, conn: WsConn) {
  for session_id in conn.sessions {
    match logic::end_session(state, &session_id).await {
      Ok(()) | Err(GameError::UnknownSession(_)) => {}
      Err(e) => error!(target: "game", %session_id, error = %e, "Failed to end session on disconnect"),
    }
  }
}

fn error_msg(e: GameError) -> ServerWsMessage {
  ServerWsMessage::Error { message: e.to_string() }
}

fn session_msg(res: Result<crate::protocol::SessionOut, GameError>) -> ServerWsMessage {
  match res {
    Ok(session) => ServerWsMessage::Session { session },
    Err(e) => error_msg(e),
  }
}

#[instrument(level = "info", skip(state, auth, conn))]
pub async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &Arc<AppState>,
  auth: &HeaderAuth,
  conn: &mut WsConn,
) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::StartGame { game_id } => match logic::start_session(state, &game_id, auth).await {
      Ok(session) => {
        conn.sessions.push(session.session_id.clone());
        ServerWsMessage::Session { session }
      }
      Err(e) => error_msg(e),
    },

    ClientWsMessage::Snapshot { session_id } => session_msg(logic::session_snapshot(state, &session_id).await),

    ClientWsMessage::SubmitAnswer { session_id, choice } => match logic::submit_answer(state, &session_id, choice).await {
      Ok(result) => {
        info!(target: "game", %session_id, correct = result.record.is_correct, "WS submit_answer evaluated");
        ServerWsMessage::AnswerResult { result }
      }
      Err(e) => error_msg(e),
    },

    ClientWsMessage::Advance { session_id } => session_msg(logic::advance_session(state, &session_id).await),

    ClientWsMessage::Restart { session_id } => session_msg(logic::restart_session(state, &session_id).await),

    ClientWsMessage::ToggleEducation { session_id } => session_msg(logic::toggle_education(state, &session_id).await),

    ClientWsMessage::EndGame { session_id } => match logic::end_session(state, &session_id).await {
      Ok(()) => {
        conn.sessions.retain(|id| id != &session_id);
        ServerWsMessage::SessionEnded { session_id }
      }
      Err(e) => error_msg(e),
    },

    ClientWsMessage::MatchingClick { deck_id, item_id } => {
      let Some((_, set)) = state.catalog.deck(&deck_id) else {
        return error_msg(GameError::UnknownDeck(deck_id));
      };
      let board = conn.boards.entry(deck_id.clone()).or_default();
      let effect = board.click(set, &item_id);
      ServerWsMessage::MatchingBoard { ready: board.ready(set), pairs: board.pairs.clone(), deck_id, effect }
    }

    ClientWsMessage::MatchingSubmit { deck_id } => {
      let Some((_, set)) = state.catalog.deck(&deck_id) else {
        return error_msg(GameError::UnknownDeck(deck_id));
      };
      let board = conn.boards.entry(deck_id.clone()).or_default();
      match board.submit(set) {
        Ok(outcome) => {
          info!(target: "game", %deck_id, score = outcome.score_percent, "WS matching submitted");
          // Progress is recorded through the HTTP path.
          if let Err(e) = logic::validate_matching(state, &deck_id, &board.pairs, auth).await {
            error!(target: "game", %deck_id, error = %e, "Matching progress not recorded");
          }
          ServerWsMessage::MatchingResult { deck_id, outcome }
        }
        Err(e) => error_msg(e.into()),
      }
    }

    ClientWsMessage::MatchingReset { deck_id } => {
      let Some((_, set)) = state.catalog.deck(&deck_id) else {
        return error_msg(GameError::UnknownDeck(deck_id));
      };
      let board = conn.boards.entry(deck_id.clone()).or_default();
      board.reset();
      debug!(target: "game", %deck_id, user = ?auth.current_user(), "WS matching reset");
      ServerWsMessage::MatchingBoard {
        ready: board.ready(set),
        pairs: board.pairs.clone(),
        deck_id,
        effect: crate::matching::ClickEffect::Cleared,
      }
    }

    ClientWsMessage::RunSimulation { scenario_id, params } => match logic::run_simulation(state, &scenario_id, &params, None) {
      Ok(result) => ServerWsMessage::Simulation { result },
      Err(e) => error_msg(e),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AppConfig;

  fn state() -> Arc<AppState> {
    Arc::new(AppState::from_config(AppConfig::default()))
  }

  fn parse(raw: &str) -> ClientWsMessage {
    serde_json::from_str(raw).unwrap()
  }

  #[tokio::test]
  async fn quiz_flow_over_messages() {
    let st = state();
    let auth = HeaderAuth::default();
    let mut conn = WsConn::default();
    let sid = match handle_client_ws(parse(r#"{"type":"start_game","gameId":"p-value"}"#), &st, &auth, &mut conn).await {
      ServerWsMessage::Session { session } => session.session_id,
      other => panic!("unexpected {:?}", other),
    };
    let answer = format!(r#"{{"type":"submit_answer","sessionId":"{}","choice":0}}"#, sid);
    assert!(matches!(
      handle_client_ws(parse(&answer), &st, &auth, &mut conn).await,
      ServerWsMessage::AnswerResult { .. }
    ));
    let end = format!(r#"{{"type":"end_game","sessionId":"{}"}}"#, sid);
    assert!(matches!(
      handle_client_ws(parse(&end), &st, &auth, &mut conn).await,
      ServerWsMessage::SessionEnded { .. }
    ));
    assert!(matches!(
      handle_client_ws(parse(&end), &st, &auth, &mut conn).await,
      ServerWsMessage::Error { .. }
    ));
  }

  #[tokio::test]
  async fn closing_the_connection_ends_its_sessions() {
    let st = state();
    let auth = HeaderAuth::default();
    let mut conn = WsConn::default();
    let start = r#"{"type":"start_game","gameId":"p-value"}"#;
    for _ in 0..2 {
      handle_client_ws(parse(start), &st, &auth, &mut conn).await;
    }
    let first = conn.sessions[0].clone();
    let end = format!(r#"{{"type":"end_game","sessionId":"{}"}}"#, first);
    handle_client_ws(parse(&end), &st, &auth, &mut conn).await;
    assert_eq!(conn.sessions.len(), 1);
    assert_eq!(st.sessions.read().await.len(), 1);

    let mut other = WsConn::default();
    handle_client_ws(parse(start), &st, &auth, &mut other).await;

    close_conn(&st, conn).await;
    let left = st.sessions.read().await;
    assert_eq!(left.len(), 1);
    assert!(left.contains_key(&other.sessions[0]));
  }

  #[tokio::test]
  async fn matching_board_is_kept_per_connection() {
    let st = state();
    let auth = HeaderAuth::default();
    let mut conn = WsConn::default();
    let click = |id: &str| format!(r#"{{"type":"matching_click","deckId":"everyday-concepts","itemId":"{}"}}"#, id);

    for (concept, example) in [
      ("mean-concept", "mean-example"),
      ("correlation-concept", "correlation-example"),
      ("sample-concept", "sample-example"),
    ] {
      handle_client_ws(parse(&click(concept)), &st, &auth, &mut conn).await;
      handle_client_ws(parse(&click(example)), &st, &auth, &mut conn).await;
    }
    assert!(conn.boards["everyday-concepts"].ready(&st.catalog.deck("everyday-concepts").unwrap().1));

    let submit = r#"{"type":"matching_submit","deckId":"everyday-concepts"}"#;
    match handle_client_ws(parse(submit), &st, &auth, &mut conn).await {
      ServerWsMessage::MatchingResult { outcome, .. } => {
        assert!(outcome.all_correct);
        assert_eq!(outcome.score_percent, 100);
      }
      other => panic!("unexpected {:?}", other),
    }

    let reset = r#"{"type":"matching_reset","deckId":"everyday-concepts"}"#;
    match handle_client_ws(parse(reset), &st, &auth, &mut conn).await {
      ServerWsMessage::MatchingBoard { pairs, ready, .. } => {
        assert!(pairs.is_empty());
        assert!(!ready);
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[tokio::test]
  async fn unknown_deck_and_simulation_report_errors() {
    let st = state();
    let auth = HeaderAuth::default();
    let mut conn = WsConn::default();
    let bad_click = r#"{"type":"matching_click","deckId":"nope","itemId":"x"}"#;
    assert!(matches!(handle_client_ws(parse(bad_click), &st, &auth, &mut conn).await, ServerWsMessage::Error { .. }));
    let sim = r#"{"type":"run_simulation","scenarioId":"coffee-energy","params":{"people":10}}"#;
    match handle_client_ws(parse(sim), &st, &auth, &mut conn).await {
      ServerWsMessage::Simulation { result } => assert_eq!(result.values.len(), 10),
      other => panic!("unexpected {:?}", other),
    }
  }
}
