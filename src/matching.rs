//! Matching exercises: concept items are paired with example items that share
//! their group key.
//!
//! - `MatchingSet` checks the item invariants once, at construction.
//! - `MatchingBoard` replays the click-to-pair interaction.
//! - `validate` grades a full concept → example assignment.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, MatchRole, MatchingItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
  /// A group key has no concept, several concepts, or no example.
  InvalidGroup { group_key: String, concepts: usize, examples: usize },
  DuplicateId(String),
  /// Some concepts have no example assigned yet.
  Incomplete { missing: Vec<String> },
  UnknownConcept(String),
  UnknownExample(String),
}

impl std::fmt::Display for MatchError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      MatchError::InvalidGroup { group_key, concepts, examples } => write!(
        f,
        "group '{}' needs exactly one concept and at least one example (found {} concepts, {} examples)",
        group_key, concepts, examples
      ),
      MatchError::DuplicateId(id) => write!(f, "duplicate item id '{}'", id),
      MatchError::Incomplete { missing } => write!(f, "concepts without a pair: {}", missing.join(", ")),
      MatchError::UnknownConcept(id) => write!(f, "unknown concept '{}'", id),
      MatchError::UnknownExample(id) => write!(f, "unknown example '{}'", id),
    }
  }
}

impl std::error::Error for MatchError {}

/// A validated pool of matching items.
#[derive(Clone, Debug)]
pub struct MatchingSet {
  items: Vec<MatchingItem>,
  by_id: HashMap<String, usize>,
}

impl MatchingSet {
  pub fn new(items: Vec<MatchingItem>) -> Result<Self, MatchError> {
    let mut by_id = HashMap::new();
    let mut groups: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for (i, it) in items.iter().enumerate() {
      if by_id.insert(it.id.clone(), i).is_some() {
        return Err(MatchError::DuplicateId(it.id.clone()));
      }
      let g = groups.entry(it.group_key.as_str()).or_insert((0, 0));
      match it.role {
        MatchRole::Concept => g.0 += 1,
        MatchRole::Example => g.1 += 1,
      }
    }
    for (key, (concepts, examples)) in groups {
      if concepts != 1 || examples == 0 {
        return Err(MatchError::InvalidGroup { group_key: key.to_string(), concepts, examples });
      }
    }
    Ok(Self { items, by_id })
  }

  pub fn items(&self) -> &[MatchingItem] { &self.items }

  pub fn get(&self, id: &str) -> Option<&MatchingItem> {
    self.by_id.get(id).map(|i| &self.items[*i])
  }

  pub fn concepts(&self) -> impl Iterator<Item = &MatchingItem> {
    self.items.iter().filter(|i| i.role == MatchRole::Concept)
  }

  pub fn examples(&self) -> impl Iterator<Item = &MatchingItem> {
    self.items.iter().filter(|i| i.role == MatchRole::Example)
  }
}

/// Authored matching round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchingDeck {
  pub id: String,
  pub level: Difficulty,
  pub title: String,
  pub instruction: String,
  pub items: Vec<MatchingItem>,
}

impl MatchingDeck {
  pub fn build(&self) -> Result<MatchingSet, MatchError> {
    MatchingSet::new(self.items.clone())
  }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct PairResult {
  pub concept_id: String,
  pub example_id: String,
  pub correct: bool,
  pub explanation: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchOutcome {
  pub all_correct: bool,
  pub score_percent: u32,
  pub correct: usize,
  pub total: usize,
  pub pairs: Vec<PairResult>,
}

/// Grade a concept → example assignment.
///
/// Every concept must be assigned; an incomplete board is an error rather than
/// a partial score.
pub fn validate(pairs: &HashMap<String, String>, set: &MatchingSet) -> Result<MatchOutcome, MatchError> {
  for (concept_id, example_id) in pairs {
    match set.get(concept_id) {
      Some(it) if it.role == MatchRole::Concept => {}
      _ => return Err(MatchError::UnknownConcept(concept_id.clone())),
    }
    match set.get(example_id) {
      Some(it) if it.role == MatchRole::Example => {}
      _ => return Err(MatchError::UnknownExample(example_id.clone())),
    }
  }

  let missing: Vec<String> = set
    .concepts()
    .filter(|c| !pairs.contains_key(&c.id))
    .map(|c| c.id.clone())
    .collect();
  if !missing.is_empty() {
    return Err(MatchError::Incomplete { missing });
  }

  let mut results = Vec::new();
  for concept in set.concepts() {
    let example_id = &pairs[&concept.id];
    let correct = set
      .get(example_id)
      .map(|ex| ex.group_key == concept.group_key)
      .unwrap_or(false);
    results.push(PairResult {
      concept_id: concept.id.clone(),
      example_id: example_id.clone(),
      correct,
      explanation: concept.explanation.clone(),
    });
  }

  let total = results.len();
  let correct = results.iter().filter(|r| r.correct).count();
  let score_percent = if total == 0 { 0 } else { ((correct as f64 / total as f64) * 100.0).round() as u32 };
  Ok(MatchOutcome { all_correct: correct == total, score_percent, correct, total, pairs: results })
}

/// What a click did to the board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClickEffect {
  Selected { item_id: String },
  Paired { concept_id: String, example_id: String },
  Cleared,
  Ignored,
}

/// Click-driven pairing state for one matching round.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MatchingBoard {
  pub pairs: HashMap<String, String>,
  pub selected: Option<String>,
  pub submitted: bool,
}

impl MatchingBoard {
  pub fn new() -> Self { Self::default() }

  /// First click selects; a second click on the other role pairs the two.
  /// A second click on the same role only clears the selection.
  pub fn click(&mut self, set: &MatchingSet, item_id: &str) -> ClickEffect {
    if self.submitted {
      return ClickEffect::Ignored;
    }
    let Some(current) = set.get(item_id) else {
      return ClickEffect::Ignored;
    };
    let Some(prev_id) = self.selected.take() else {
      self.selected = Some(item_id.to_string());
      return ClickEffect::Selected { item_id: item_id.to_string() };
    };
    let Some(prev) = set.get(&prev_id) else {
      return ClickEffect::Cleared;
    };
    if prev.role == current.role {
      return ClickEffect::Cleared;
    }
    let (concept, example) = match prev.role {
      MatchRole::Concept => (prev, current),
      MatchRole::Example => (current, prev),
    };
    self.pairs.insert(concept.id.clone(), example.id.clone());
    ClickEffect::Paired { concept_id: concept.id.clone(), example_id: example.id.clone() }
  }

  /// True once every concept has an example; the submit button gate.
  pub fn ready(&self, set: &MatchingSet) -> bool {
    let assigned: HashSet<&String> = self.pairs.keys().collect();
    set.concepts().all(|c| assigned.contains(&c.id))
  }

  pub fn submit(&mut self, set: &MatchingSet) -> Result<MatchOutcome, MatchError> {
    let outcome = validate(&self.pairs, set)?;
    self.submitted = true;
    self.selected = None;
    Ok(outcome)
  }

  pub fn reset(&mut self) {
    *self = MatchingBoard::default();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(id: &str, role: MatchRole, group: &str) -> MatchingItem {
    MatchingItem {
      id: id.into(),
      role,
      group_key: group.into(),
      text: id.to_uppercase(),
      explanation: format!("why {id}"),
      analogy: None,
    }
  }

  fn four_groups() -> MatchingSet {
    let mut items = vec![];
    for g in ["mean", "median", "mode", "sd"] {
      items.push(item(&format!("c-{g}"), MatchRole::Concept, g));
      items.push(item(&format!("e-{g}"), MatchRole::Example, g));
    }
    MatchingSet::new(items).unwrap()
  }

  fn pairs(list: &[(&str, &str)]) -> HashMap<String, String> {
    list.iter().map(|(c, e)| (c.to_string(), e.to_string())).collect()
  }

  #[test]
  fn all_correct_scores_100() {
    let set = four_groups();
    let p = pairs(&[("c-mean", "e-mean"), ("c-median", "e-median"), ("c-mode", "e-mode"), ("c-sd", "e-sd")]);
    let out = validate(&p, &set).unwrap();
    assert!(out.all_correct);
    assert_eq!(out.score_percent, 100);
  }

  #[test]
  fn three_of_four_scores_75() {
    let set = four_groups();
    let p = pairs(&[("c-mean", "e-mean"), ("c-median", "e-median"), ("c-mode", "e-mode"), ("c-sd", "e-mean")]);
    let out = validate(&p, &set).unwrap();
    assert!(!out.all_correct);
    assert_eq!(out.correct, 3);
    assert_eq!(out.score_percent, 75);
    let sd = out.pairs.iter().find(|r| r.concept_id == "c-sd").unwrap();
    assert!(!sd.correct);
  }

  #[test]
  fn incomplete_assignment_is_rejected() {
    let set = four_groups();
    let p = pairs(&[("c-mean", "e-mean")]);
    match validate(&p, &set) {
      Err(MatchError::Incomplete { missing }) => assert_eq!(missing.len(), 3),
      other => panic!("unexpected: {:?}", other),
    }
  }

  #[test]
  fn unknown_ids_are_rejected() {
    let set = four_groups();
    let p = pairs(&[("e-mean", "e-mean")]);
    assert_eq!(validate(&p, &set).unwrap_err(), MatchError::UnknownConcept("e-mean".into()));
    let p = pairs(&[("c-mean", "nope")]);
    assert_eq!(validate(&p, &set).unwrap_err(), MatchError::UnknownExample("nope".into()));
  }

  #[test]
  fn several_examples_per_group_are_allowed() {
    let set = MatchingSet::new(vec![
      item("c", MatchRole::Concept, "g"),
      item("e1", MatchRole::Example, "g"),
      item("e2", MatchRole::Example, "g"),
    ])
    .unwrap();
    let out = validate(&pairs(&[("c", "e2")]), &set).unwrap();
    assert_eq!(out.score_percent, 100);
  }

  #[test]
  fn set_invariants_are_checked() {
    let two_concepts = MatchingSet::new(vec![
      item("c1", MatchRole::Concept, "g"),
      item("c2", MatchRole::Concept, "g"),
      item("e", MatchRole::Example, "g"),
    ]);
    assert!(matches!(two_concepts, Err(MatchError::InvalidGroup { concepts: 2, .. })));

    let no_example = MatchingSet::new(vec![item("c1", MatchRole::Concept, "g")]);
    assert!(matches!(no_example, Err(MatchError::InvalidGroup { examples: 0, .. })));

    let dup = MatchingSet::new(vec![item("x", MatchRole::Concept, "g"), item("x", MatchRole::Example, "g")]);
    assert_eq!(dup.unwrap_err(), MatchError::DuplicateId("x".into()));
  }

  #[test]
  fn board_pairs_in_either_click_order() {
    let set = four_groups();
    let mut b = MatchingBoard::new();
    assert_eq!(b.click(&set, "e-mean"), ClickEffect::Selected { item_id: "e-mean".into() });
    assert_eq!(
      b.click(&set, "c-mean"),
      ClickEffect::Paired { concept_id: "c-mean".into(), example_id: "e-mean".into() }
    );
    assert_eq!(b.pairs.get("c-mean").map(String::as_str), Some("e-mean"));
    assert!(b.selected.is_none());
  }

  #[test]
  fn board_same_role_click_clears_selection() {
    let set = four_groups();
    let mut b = MatchingBoard::new();
    b.click(&set, "c-mean");
    assert_eq!(b.click(&set, "c-sd"), ClickEffect::Cleared);
    assert!(b.selected.is_none());
    assert!(b.pairs.is_empty());
  }

  #[test]
  fn board_repairing_a_concept_replaces_the_old_example() {
    let set = four_groups();
    let mut b = MatchingBoard::new();
    b.click(&set, "c-mean");
    b.click(&set, "e-sd");
    b.click(&set, "c-mean");
    b.click(&set, "e-mean");
    assert_eq!(b.pairs.get("c-mean").map(String::as_str), Some("e-mean"));
    assert_eq!(b.pairs.len(), 1);
  }

  #[test]
  fn board_submit_locks_until_reset() {
    let set = four_groups();
    let mut b = MatchingBoard::new();
    for g in ["mean", "median", "mode", "sd"] {
      b.click(&set, &format!("c-{g}"));
      b.click(&set, &format!("e-{g}"));
    }
    assert!(b.ready(&set));
    let out = b.submit(&set).unwrap();
    assert!(out.all_correct);
    assert_eq!(b.click(&set, "c-mean"), ClickEffect::Ignored);
    b.reset();
    assert!(!b.submitted);
    assert!(b.pairs.is_empty());
  }
}
