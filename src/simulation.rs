//! Parameter-driven toy simulations.
//!
//! Each sample is a random baseline plus a linear effect of the input slider
//! plus symmetric noise, clamped to a plausible range. Randomness comes from
//! the caller's `Rng`, so tests can seed it.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, SimulationParameter};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimulationKind {
  /// Energy on a 1..10 scale after `cups` of coffee, for `people` subjects.
  CoffeeEnergy,
  /// Heart rate at `intensity` % effort, for `athletes` subjects.
  ExerciseHeartRate,
  /// Body weight given height, with noise shrinking as `correlation` grows.
  HeightWeight,
}

impl SimulationKind {
  /// Parameter whose value is the number of samples.
  pub fn population_param(self) -> &'static str {
    match self {
      SimulationKind::CoffeeEnergy => "people",
      SimulationKind::ExerciseHeartRate => "athletes",
      SimulationKind::HeightWeight => "sample_size",
    }
  }

  /// Clamp range for every sample.
  pub fn range(self) -> (f64, f64) {
    match self {
      SimulationKind::CoffeeEnergy => (1.0, 10.0),
      SimulationKind::ExerciseHeartRate => (60.0, 200.0),
      SimulationKind::HeightWeight => (40.0, 250.0),
    }
  }

  fn sample<R: Rng + ?Sized>(self, p: &HashMap<String, f64>, rng: &mut R) -> f64 {
    let (lo, hi) = self.range();
    match self {
      SimulationKind::CoffeeEnergy => {
        let cups = p["cups"];
        let base = 3.0 + rng.gen::<f64>() * 2.0;
        let effect = cups * (1.5 + rng.gen::<f64>());
        let noise = (rng.gen::<f64>() - 0.5) * 2.0;
        round_to(clamp(base + effect + noise, lo, hi), 1)
      }
      SimulationKind::ExerciseHeartRate => {
        let intensity = p["intensity"];
        let base = 60.0 + rng.gen::<f64>() * 20.0;
        let effect = (intensity / 100.0) * (100.0 + rng.gen::<f64>() * 40.0);
        let noise = (rng.gen::<f64>() - 0.5) * 20.0;
        clamp(base + effect + noise, lo, hi).round()
      }
      SimulationKind::HeightWeight => {
        let r = p["correlation"].abs().min(1.0);
        let height = 150.0 + rng.gen::<f64>() * 50.0;
        let noise = (rng.gen::<f64>() - 0.5) * 30.0 * (1.0 - r);
        round_to(clamp(50.0 + height * 0.8 + noise, lo, hi), 1)
      }
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetRange {
  pub min: f64,
  pub max: f64,
  pub label: String,
}

impl TargetRange {
  pub fn contains(&self, v: f64) -> bool {
    v >= self.min && v <= self.max
  }
}

/// Authored simulation: sliders, model and an optional goal band.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationScenario {
  pub id: String,
  pub level: Difficulty,
  pub title: String,
  pub instruction: String,
  pub concept: String,
  pub kind: SimulationKind,
  pub parameters: Vec<SimulationParameter>,
  #[serde(default)] pub target: Option<TargetRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
  InvalidDefinition { id: String, reason: String },
  UnknownParameter(String),
  OutOfRange { id: String, value: f64, min: f64, max: f64 },
  MissingModelParameter(String),
}

impl std::fmt::Display for SimulationError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SimulationError::InvalidDefinition { id, reason } => write!(f, "parameter '{}' is badly defined: {}", id, reason),
      SimulationError::UnknownParameter(id) => write!(f, "unknown parameter '{}'", id),
      SimulationError::OutOfRange { id, value, min, max } => {
        write!(f, "parameter '{}' = {} outside [{}, {}]", id, value, min, max)
      }
      SimulationError::MissingModelParameter(id) => write!(f, "scenario does not define parameter '{}'", id),
    }
  }
}

impl std::error::Error for SimulationError {}

impl SimulationScenario {
  /// Check the slider definitions and that the model's inputs exist.
  pub fn check(&self) -> Result<(), SimulationError> {
    for p in &self.parameters {
      let bad = |reason: &str| SimulationError::InvalidDefinition { id: p.id.clone(), reason: reason.into() };
      if !(p.min.is_finite() && p.max.is_finite() && p.step.is_finite() && p.default_value.is_finite()) {
        return Err(bad("non-finite bound"));
      }
      if p.min > p.max {
        return Err(bad("min greater than max"));
      }
      if p.step <= 0.0 {
        return Err(bad("step must be positive"));
      }
      if p.default_value < p.min || p.default_value > p.max {
        return Err(bad("default outside [min, max]"));
      }
    }
    for needed in self.model_inputs() {
      if !self.parameters.iter().any(|p| p.id == needed) {
        return Err(SimulationError::MissingModelParameter(needed.to_string()));
      }
    }
    Ok(())
  }

  fn model_inputs(&self) -> [&'static str; 2] {
    match self.kind {
      SimulationKind::CoffeeEnergy => ["cups", "people"],
      SimulationKind::ExerciseHeartRate => ["intensity", "athletes"],
      SimulationKind::HeightWeight => ["correlation", "sample_size"],
    }
  }

  pub fn defaults(&self) -> HashMap<String, f64> {
    self.parameters.iter().map(|p| (p.id.clone(), p.default_value)).collect()
  }

  /// Merge caller values over the defaults, rejecting unknown ids and
  /// values outside a slider's range.
  pub fn resolve(&self, given: &HashMap<String, f64>) -> Result<HashMap<String, f64>, SimulationError> {
    let mut out = self.defaults();
    for (id, value) in given {
      let Some(def) = self.parameters.iter().find(|p| &p.id == id) else {
        return Err(SimulationError::UnknownParameter(id.clone()));
      };
      if !value.is_finite() || *value < def.min || *value > def.max {
        return Err(SimulationError::OutOfRange { id: id.clone(), value: *value, min: def.min, max: def.max });
      }
      out.insert(id.clone(), *value);
    }
    Ok(out)
  }

  /// Run the model once per subject.
  pub fn simulate<R: Rng + ?Sized>(&self, given: &HashMap<String, f64>, rng: &mut R) -> Result<Vec<f64>, SimulationError> {
    self.check()?;
    let params = self.resolve(given)?;
    let n = params[self.kind.population_param()].floor().max(0.0) as usize;
    Ok((0..n).map(|_| self.kind.sample(&params, rng)).collect())
  }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SimulationStats {
  pub count: usize,
  pub mean: f64,
  pub min: f64,
  pub max: f64,
  pub std_dev: f64,
}

/// Population statistics; `None` for an empty run.
pub fn stats(values: &[f64]) -> Option<SimulationStats> {
  if values.is_empty() {
    return None;
  }
  let n = values.len() as f64;
  let mean = values.iter().sum::<f64>() / n;
  let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
  let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
  let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
  Some(SimulationStats { count: values.len(), mean, min, max, std_dev: var.sqrt() })
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct HistogramBin {
  pub start: f64,
  pub end: f64,
  pub count: usize,
}

/// Equal-width bins between the observed min and max. The maximum lands in
/// the last bin.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
  let Some(s) = stats(values) else { return Vec::new() };
  if bins == 0 {
    return Vec::new();
  }
  let width = (s.max - s.min) / bins as f64;
  let mut out: Vec<HistogramBin> = (0..bins)
    .map(|i| HistogramBin { start: s.min + i as f64 * width, end: s.min + (i + 1) as f64 * width, count: 0 })
    .collect();
  for v in values {
    let idx = if width == 0.0 { 0 } else { (((v - s.min) / width).floor() as usize).min(bins - 1) };
    out[idx].count += 1;
  }
  out
}

pub fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
  v.max(lo).min(hi)
}

pub fn round_to(v: f64, decimals: i32) -> f64 {
  let f = 10f64.powi(decimals);
  (v * f).round() / f
}
