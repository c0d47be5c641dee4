//! Application state: game catalog, live sessions, class service, progress
//! store and per-user notification queues.
//!
//! The catalog is assembled once at startup from the built-in seeds plus the
//! optional TOML bank. Invalid authored content is logged and skipped so one
//! bad entry never takes the server down.

use std::{collections::BTreeMap, collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

use crate::classes::{ClassService, InMemoryClassStore};
use crate::config::{load_app_config_from_env, AppConfig, NotificationDurations};
use crate::domain::Difficulty;
use crate::engine::{QuestionBank, QuizContent};
use crate::matching::{MatchingDeck, MatchingSet};
use crate::notify::{Notification, NotificationCenter, NotificationKind};
use crate::seeds::{matching_decks, p_value_questions, probability_questions, simulation_scenarios};
use crate::shell::{GameSession, InMemoryProgressStore};
use crate::simulation::SimulationScenario;

const NOTIFICATION_QUEUE: usize = 5;
const ANONYMOUS: &str = "anonymous";

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    Quiz,
    Matching,
    Simulation,
}

/// Public listing entry for any game.
#[derive(Clone, Debug, Serialize)]
pub struct GameDescriptor {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: GameKind,
    pub levels: Vec<Difficulty>,
    pub max_score: Option<u32>,
}

#[derive(Default)]
pub struct GameCatalog {
    quizzes: BTreeMap<String, (GameDescriptor, Arc<QuestionBank>)>,
    decks: BTreeMap<String, (MatchingDeck, MatchingSet)>,
    scenarios: BTreeMap<String, SimulationScenario>,
}

impl GameCatalog {
    pub fn build(cfg: &AppConfig) -> Self {
        let mut catalog = GameCatalog::default();
        let points = cfg.games.points_per_question;

        catalog.add_quiz(
            "p-value",
            "Interpretando o Valor-p",
            "Significância estatística e relevância clínica",
            QuestionBank::new(p_value_questions(), points),
        );
        catalog.add_quiz(
            "basic-probability",
            "Probabilidade Básica",
            "Moedas, dados e probabilidade condicional",
            QuestionBank::new(probability_questions(), points),
        );
        for q in &cfg.quizzes {
            if catalog.quizzes.contains_key(&q.id) {
                warn!(target: "nutrilab", id = %q.id, "Configured quiz id already taken; skipping");
                continue;
            }
            let bank = QuestionBank::new(q.questions.clone(), q.points_per_question.unwrap_or(points));
            catalog.add_quiz(&q.id, &q.title, &q.description, bank);
        }

        for deck in matching_decks() {
            match deck.build() {
                Ok(set) => {
                    catalog.decks.insert(deck.id.clone(), (deck, set));
                }
                Err(e) => error!(target: "nutrilab", id = %deck.id, error = %e, "Skipping invalid matching deck"),
            }
        }

        for s in simulation_scenarios() {
            match s.check() {
                Ok(()) => {
                    catalog.scenarios.insert(s.id.clone(), s);
                }
                Err(e) => error!(target: "nutrilab", id = %s.id, error = %e, "Skipping invalid simulation"),
            }
        }

        info!(
            target: "nutrilab",
            quizzes = catalog.quizzes.len(),
            matching = catalog.decks.len(),
            simulations = catalog.scenarios.len(),
            "Game catalog ready"
        );
        catalog
    }

    fn add_quiz(&mut self, id: &str, title: &str, description: &str, bank: QuestionBank) {
        let levels: Vec<Difficulty> = Difficulty::ALL.iter().copied().filter(|l| bank.questions_at(*l) > 0).collect();
        if levels.is_empty() {
            warn!(target: "nutrilab", %id, "Quiz has no questions; skipping");
            return;
        }
        if let Some(bad) = bank.questions().find(|q| q.correct_option >= q.options.len()) {
            error!(target: "nutrilab", %id, question = %bad.id, "Correct option out of range; skipping quiz");
            return;
        }
        let descriptor = GameDescriptor {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            kind: GameKind::Quiz,
            levels,
            max_score: Some(bank.max_score()),
        };
        self.quizzes.insert(id.to_string(), (descriptor, Arc::new(bank)));
    }

    pub fn list(&self) -> Vec<GameDescriptor> {
        let mut out: Vec<GameDescriptor> = self.quizzes.values().map(|(d, _)| d.clone()).collect();
        out.extend(self.decks.values().map(|(deck, _)| GameDescriptor {
            id: deck.id.clone(),
            title: deck.title.clone(),
            description: deck.instruction.clone(),
            kind: GameKind::Matching,
            levels: vec![deck.level],
            max_score: Some(100),
        }));
        out.extend(self.scenarios.values().map(|s| GameDescriptor {
            id: s.id.clone(),
            title: s.title.clone(),
            description: s.instruction.clone(),
            kind: GameKind::Simulation,
            levels: vec![s.level],
            max_score: None,
        }));
        out
    }

    pub fn quiz(&self, id: &str) -> Option<Arc<QuestionBank>> {
        self.quizzes.get(id).map(|(_, bank)| bank.clone())
    }

    pub fn deck(&self, id: &str) -> Option<&(MatchingDeck, MatchingSet)> {
        self.decks.get(id)
    }

    pub fn scenario(&self, id: &str) -> Option<&SimulationScenario> {
        self.scenarios.get(id)
    }
}

pub struct AppState {
    pub catalog: GameCatalog,
    pub sessions: RwLock<HashMap<String, GameSession>>,
    pub classes: ClassService<InMemoryClassStore>,
    pub progress: InMemoryProgressStore,
    pub notifications: RwLock<HashMap<String, NotificationCenter>>,
    pub notification_durations: NotificationDurations,
    pub cleanup_interval_secs: u64,
    pub session_idle_secs: u64,
    pub session_sweep_secs: u64,
}

impl AppState {
    /// Build state from env: load the optional TOML config, then assemble.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_app_config_from_env().unwrap_or_default();
        Self::from_config(cfg)
    }

    pub fn from_config(cfg: AppConfig) -> Self {
        info!(
            target: "nutrilab",
            retention_days = cfg.classes.retention_days,
            points_per_question = cfg.games.points_per_question,
            "Configuration applied"
        );
        Self {
            catalog: GameCatalog::build(&cfg),
            sessions: RwLock::new(HashMap::new()),
            classes: ClassService::new(InMemoryClassStore::new(), cfg.classes.clone()),
            progress: InMemoryProgressStore::new(),
            notifications: RwLock::new(HashMap::new()),
            notification_durations: cfg.notifications.clone(),
            cleanup_interval_secs: cfg.classes.cleanup_interval_secs,
            session_idle_secs: cfg.games.session_idle_secs,
            session_sweep_secs: cfg.games.session_sweep_secs,
        }
    }

    /// Queue a notification for `user` (or the shared anonymous queue).
    pub async fn notify(
        &self,
        user: Option<&str>,
        kind: NotificationKind,
        title: &str,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Notification {
        let key = user.unwrap_or(ANONYMOUS).to_string();
        let mut all = self.notifications.write().await;
        let center = all
            .entry(key)
            .or_insert_with(|| NotificationCenter::new(self.notification_durations.clone(), NOTIFICATION_QUEUE));
        center.push(kind, title, message, now)
    }

    pub async fn active_notifications(&self, user: Option<&str>, now: DateTime<Utc>) -> Vec<Notification> {
        let key = user.unwrap_or(ANONYMOUS);
        match self.notifications.write().await.get_mut(key) {
            Some(center) => center.active(now),
            None => Vec::new(),
        }
    }

    pub async fn dismiss_notification(&self, user: Option<&str>, id: &str) -> bool {
        let key = user.unwrap_or(ANONYMOUS);
        match self.notifications.write().await.get_mut(key) {
            Some(center) => center.dismiss(id),
            None => false,
        }
    }
}
