//! Game state engine: question/level progression and scoring.
//!
//! The engine never looks at question text. It only needs to know how many
//! questions each level has, how to name them, and whether a choice is right;
//! that is the `QuizContent` trait. `QuestionBank` is the implementation backed
//! by authored `Question`s.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, Question};

/// What the engine needs from a game's content.
pub trait QuizContent {
  fn questions_at(&self, level: Difficulty) -> usize;
  fn question_id(&self, level: Difficulty, index: usize) -> String;
  fn is_correct(&self, level: Difficulty, index: usize, chosen: usize) -> bool;
  fn points_per_question(&self) -> u32;

  fn total_questions(&self) -> usize {
    Difficulty::ALL.iter().map(|l| self.questions_at(*l)).sum()
  }

  fn max_score(&self) -> u32 {
    self.total_questions() as u32 * self.points_per_question()
  }
}

/// Authored questions grouped by level, in authoring order.
#[derive(Clone, Debug, Default)]
pub struct QuestionBank {
  levels: BTreeMap<Difficulty, Vec<Question>>,
  points: u32,
}

impl QuestionBank {
  pub fn new(questions: Vec<Question>, points_per_question: u32) -> Self {
    let mut levels: BTreeMap<Difficulty, Vec<Question>> = BTreeMap::new();
    for q in questions {
      levels.entry(q.difficulty).or_default().push(q);
    }
    Self { levels, points: points_per_question }
  }

  pub fn question(&self, level: Difficulty, index: usize) -> Option<&Question> {
    self.levels.get(&level).and_then(|qs| qs.get(index))
  }

  pub fn questions(&self) -> impl Iterator<Item = &Question> {
    self.levels.values().flatten()
  }
}

impl QuizContent for QuestionBank {
  fn questions_at(&self, level: Difficulty) -> usize {
    self.levels.get(&level).map(Vec::len).unwrap_or(0)
  }

  fn question_id(&self, level: Difficulty, index: usize) -> String {
    self.question(level, index).map(|q| q.id.clone()).unwrap_or_default()
  }

  fn is_correct(&self, level: Difficulty, index: usize, chosen: usize) -> bool {
    self.question(level, index).map(|q| q.correct_option == chosen).unwrap_or(false)
  }

  fn points_per_question(&self) -> u32 { self.points }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerRecord {
  pub question_id: String,
  pub chosen_index: usize,
  pub is_correct: bool,
  pub points: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameState {
  pub current_question: usize,
  pub current_level: Difficulty,
  pub score: u32,
  pub answers: Vec<AnswerRecord>,
  pub elapsed_seconds: u64,
  pub is_completed: bool,
  pub show_education: bool,
  /// Feedback for the last answer is on screen; no new answer until `advance`.
  pub awaiting_advance: bool,
}

impl GameState {
  /// Fresh state positioned on the first level that has content.
  /// Content with no questions at all starts (and stays) completed.
  pub fn new(content: &impl QuizContent) -> Self {
    let mut state = Self {
      current_question: 0,
      current_level: Difficulty::first(),
      score: 0,
      answers: Vec::new(),
      elapsed_seconds: 0,
      is_completed: false,
      show_education: true,
      awaiting_advance: false,
    };
    match first_level_from(content, Some(Difficulty::first())) {
      Some(level) => state.current_level = level,
      None => state.is_completed = true,
    }
    state
  }

  /// Record an answer to the current question.
  ///
  /// Returns `None` (state untouched) while feedback is displayed or once the
  /// game is over. A choice outside the option list is just a wrong answer.
  pub fn submit_answer(&mut self, content: &impl QuizContent, chosen_index: usize) -> Option<AnswerRecord> {
    if self.awaiting_advance || self.is_completed {
      return None;
    }
    let is_correct = content.is_correct(self.current_level, self.current_question, chosen_index);
    let points = if is_correct { content.points_per_question() } else { 0 };
    let record = AnswerRecord {
      question_id: content.question_id(self.current_level, self.current_question),
      chosen_index,
      is_correct,
      points,
    };
    self.score += points;
    self.answers.push(record.clone());
    self.awaiting_advance = true;
    Some(record)
  }

  /// Move to the next question, the next non-empty level, or completion.
  pub fn advance(&mut self, content: &impl QuizContent) {
    if self.is_completed {
      return;
    }
    self.awaiting_advance = false;
    if self.current_question + 1 < content.questions_at(self.current_level) {
      self.current_question += 1;
      return;
    }
    match first_level_from(content, self.current_level.next()) {
      Some(level) => {
        self.current_level = level;
        self.current_question = 0;
      }
      None => self.is_completed = true,
    }
  }

  /// Back to the start, skipping the education panel.
  pub fn restart(&mut self, content: &impl QuizContent) {
    *self = GameState::new(content);
    self.show_education = false;
  }

  pub fn toggle_education(&mut self) {
    self.show_education = !self.show_education;
  }

  /// Share of questions answered, 0..=100.
  pub fn progress_percent(&self, content: &impl QuizContent) -> u32 {
    let total = content.total_questions();
    if total == 0 {
      return 100;
    }
    ((self.answers.len().min(total) * 100) / total) as u32
  }

  /// Score normalised against the content's maximum, rounded, 0..=100.
  pub fn final_score_percent(&self, content: &impl QuizContent) -> u32 {
    let max = content.max_score();
    if max == 0 {
      return 0;
    }
    ((self.score as f64 / max as f64) * 100.0).round() as u32
  }
}

fn first_level_from(content: &impl QuizContent, start: Option<Difficulty>) -> Option<Difficulty> {
  let mut level = start;
  while let Some(l) = level {
    if content.questions_at(l) > 0 {
      return Some(l);
    }
    level = l.next();
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  fn q(id: &str, difficulty: Difficulty, correct: usize) -> Question {
    Question {
      id: id.into(),
      difficulty,
      prompt: format!("prompt {id}"),
      options: vec!["a".into(), "b".into(), "c".into()],
      correct_option: correct,
      explanation: String::new(),
    }
  }

  fn one_per_level() -> QuestionBank {
    QuestionBank::new(
      Difficulty::ALL.iter().enumerate().map(|(i, d)| q(&format!("q{i}"), *d, 0)).collect(),
      40,
    )
  }

  #[test]
  fn advance_visits_levels_in_order_then_completes() {
    let bank = one_per_level();
    let mut s = GameState::new(&bank);
    assert_eq!(s.current_level, Difficulty::VeryEasy);

    let mut visited = vec![s.current_level];
    for _ in 0..4 {
      s.advance(&bank);
      visited.push(s.current_level);
      assert!(!s.is_completed);
      assert_eq!(s.current_question, 0);
    }
    assert_eq!(visited, Difficulty::ALL.to_vec());
    s.advance(&bank);
    assert!(s.is_completed);
    assert_eq!(s.current_level, Difficulty::VeryHard);
  }

  #[test]
  fn advance_walks_questions_within_a_level_first() {
    let bank = QuestionBank::new(
      vec![
        q("a", Difficulty::VeryEasy, 0),
        q("b", Difficulty::VeryEasy, 0),
        q("c", Difficulty::Easy, 0),
      ],
      10,
    );
    let mut s = GameState::new(&bank);
    s.advance(&bank);
    assert_eq!((s.current_level, s.current_question), (Difficulty::VeryEasy, 1));
    s.advance(&bank);
    assert_eq!((s.current_level, s.current_question), (Difficulty::Easy, 0));
    s.advance(&bank);
    assert!(s.is_completed);
  }

  #[test]
  fn empty_levels_are_skipped() {
    let bank = QuestionBank::new(vec![q("m", Difficulty::Medium, 1), q("vh", Difficulty::VeryHard, 1)], 10);
    let mut s = GameState::new(&bank);
    assert_eq!(s.current_level, Difficulty::Medium);
    s.advance(&bank);
    assert_eq!(s.current_level, Difficulty::VeryHard);
    s.advance(&bank);
    assert!(s.is_completed);
  }

  #[test]
  fn empty_content_starts_completed() {
    let bank = QuestionBank::new(vec![], 10);
    let s = GameState::new(&bank);
    assert!(s.is_completed);
  }

  #[test]
  fn submit_scores_and_logs() {
    let bank = one_per_level();
    let mut s = GameState::new(&bank);
    let rec = s.submit_answer(&bank, 0).unwrap();
    assert!(rec.is_correct);
    assert_eq!(rec.points, 40);
    assert_eq!(rec.question_id, "q0");
    assert_eq!(s.score, 40);

    s.advance(&bank);
    let rec = s.submit_answer(&bank, 2).unwrap();
    assert!(!rec.is_correct);
    assert_eq!(rec.points, 0);
    assert_eq!(s.score, 40);
    assert_eq!(s.answers.len(), 2);
  }

  #[test]
  fn double_submit_is_ignored_until_advance() {
    let bank = one_per_level();
    let mut s = GameState::new(&bank);
    assert!(s.submit_answer(&bank, 0).is_some());
    assert!(s.submit_answer(&bank, 0).is_none());
    assert_eq!(s.score, 40);
    assert_eq!(s.answers.len(), 1);
    s.advance(&bank);
    assert!(s.submit_answer(&bank, 0).is_some());
  }

  #[test]
  fn out_of_range_choice_is_wrong_not_an_error() {
    let bank = one_per_level();
    let mut s = GameState::new(&bank);
    let rec = s.submit_answer(&bank, 99).unwrap();
    assert!(!rec.is_correct);
  }

  #[test]
  fn no_answers_after_completion() {
    let bank = QuestionBank::new(vec![q("only", Difficulty::Hard, 0)], 10);
    let mut s = GameState::new(&bank);
    s.advance(&bank);
    assert!(s.is_completed);
    assert!(s.submit_answer(&bank, 0).is_none());
  }

  #[test]
  fn final_score_is_normalised() {
    let bank = QuestionBank::new(
      vec![
        q("a", Difficulty::VeryEasy, 0),
        q("b", Difficulty::VeryEasy, 0),
        q("c", Difficulty::Easy, 0),
      ],
      40,
    );
    let mut s = GameState::new(&bank);
    s.submit_answer(&bank, 0);
    s.advance(&bank);
    s.submit_answer(&bank, 1);
    s.advance(&bank);
    s.submit_answer(&bank, 0);
    assert_eq!(s.score, 80);
    assert_eq!(s.final_score_percent(&bank), 67);
    assert_eq!(s.progress_percent(&bank), 100);
  }

  #[test]
  fn restart_resets_and_hides_education() {
    let bank = one_per_level();
    let mut s = GameState::new(&bank);
    s.submit_answer(&bank, 0);
    s.advance(&bank);
    s.restart(&bank);
    assert_eq!(s.score, 0);
    assert!(s.answers.is_empty());
    assert_eq!(s.current_level, Difficulty::VeryEasy);
    assert!(!s.show_education);
  }
}
