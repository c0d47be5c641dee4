//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::HashMap;

use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

use crate::classes::FieldErrors;
use crate::domain::{Difficulty, MatchRole, Question};
use crate::engine::{AnswerRecord, GameState};
use crate::matching::{ClickEffect, MatchOutcome, MatchingDeck};
use crate::notify::Notification;
use crate::simulation::{HistogramBin, SimulationStats};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    StartGame {
        #[serde(rename = "gameId")]
        game_id: String,
    },
    Snapshot {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    SubmitAnswer {
        #[serde(rename = "sessionId")]
        session_id: String,
        choice: usize,
    },
    Advance {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Restart {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    ToggleEducation {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    EndGame {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    MatchingClick {
        #[serde(rename = "deckId")]
        deck_id: String,
        #[serde(rename = "itemId")]
        item_id: String,
    },
    MatchingSubmit {
        #[serde(rename = "deckId")]
        deck_id: String,
    },
    MatchingReset {
        #[serde(rename = "deckId")]
        deck_id: String,
    },
    RunSimulation {
        #[serde(rename = "scenarioId")]
        scenario_id: String,
        #[serde(default)]
        params: HashMap<String, f64>,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        session: SessionOut,
    },
    AnswerResult {
        result: AnswerOut,
    },
    SessionEnded {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    MatchingBoard {
        #[serde(rename = "deckId")]
        deck_id: String,
        effect: ClickEffect,
        pairs: HashMap<String, String>,
        ready: bool,
    },
    MatchingResult {
        #[serde(rename = "deckId")]
        deck_id: String,
        outcome: MatchOutcome,
    },
    Simulation {
        result: SimulationOut,
    },
    Error {
        message: String,
    },
}

/// Question as shown to the learner; the answer stays server-side.
#[derive(Debug, Serialize)]
pub struct QuestionOut {
    pub id: String,
    pub difficulty: Difficulty,
    pub level_label: String,
    pub prompt: String,
    pub options: Vec<String>,
}

pub fn to_question_out(q: &Question) -> QuestionOut {
    QuestionOut {
        id: q.id.clone(),
        difficulty: q.difficulty,
        level_label: q.difficulty.label().to_string(),
        prompt: q.prompt.clone(),
        options: q.options.clone(),
    }
}

#[derive(Debug, Serialize)]
pub struct MatchingItemOut {
    pub id: String,
    pub text: String,
}

/// Matching round without group keys; examples come shuffled.
#[derive(Debug, Serialize)]
pub struct DeckOut {
    pub id: String,
    pub level: Difficulty,
    pub title: String,
    pub instruction: String,
    pub concepts: Vec<MatchingItemOut>,
    pub examples: Vec<MatchingItemOut>,
}

pub fn to_deck_out<R: Rng + ?Sized>(deck: &MatchingDeck, rng: &mut R) -> DeckOut {
    let pick = |role: MatchRole| -> Vec<MatchingItemOut> {
        deck.items
            .iter()
            .filter(|i| i.role == role)
            .map(|i| MatchingItemOut { id: i.id.clone(), text: i.text.clone() })
            .collect()
    };
    let mut examples = pick(MatchRole::Example);
    examples.shuffle(rng);
    DeckOut {
        id: deck.id.clone(),
        level: deck.level,
        title: deck.title.clone(),
        instruction: deck.instruction.clone(),
        concepts: pick(MatchRole::Concept),
        examples,
    }
}

#[derive(Debug, Serialize)]
pub struct SessionOut {
    pub session_id: String,
    pub game_id: String,
    pub state: GameState,
    pub question: Option<QuestionOut>,
    pub progress_percent: u32,
    pub elapsed: String,
    pub final_score_percent: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AnswerOut {
    pub session_id: String,
    pub record: AnswerRecord,
    pub correct_option: usize,
    pub explanation: String,
    pub score: u32,
}

#[derive(Debug, Serialize)]
pub struct SimulationOut {
    pub scenario_id: String,
    pub values: Vec<f64>,
    pub stats: Option<SimulationStats>,
    pub histogram: Vec<HistogramBin>,
    pub target_met: Option<bool>,
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct StartSessionIn {
    #[serde(rename = "gameId")]
    pub game_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
    pub choice: usize,
}

#[derive(Debug, Deserialize)]
pub struct MatchingIn {
    pub pairs: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct SimulationIn {
    #[serde(default)]
    pub params: HashMap<String, f64>,
    #[serde(default)]
    pub bins: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SoftDeleteIn {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JoinIn {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub value: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DateOut {
    pub parsed: Option<String>,
    pub date: String,
    pub date_time: String,
    pub time_ago: String,
    pub hours_since: f64,
    pub is_recent: bool,
    pub timestamp_millis: i64,
}

/// Envelope for class-management actions: payload or errors, plus the
/// notification the dashboard should show.
#[derive(Debug, Serialize)]
pub struct ActionOut<T: Serialize> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
    pub notification: Notification,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
