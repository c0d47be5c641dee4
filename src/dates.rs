//! Lenient date handling.
//!
//! Stored records carry timestamps in several shapes (native datetimes,
//! `{seconds, nanos}` timestamps, JSON objects with `seconds`/`_seconds`,
//! ISO strings, epoch milliseconds). Everything funnels through `parse_date`,
//! which yields `None` instead of failing, and the display helpers fall back
//! to fixed placeholders.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const INVALID_DATE: &str = "Data inválida";
pub const NOT_AVAILABLE: &str = "N/A";

/// Document-store timestamp: whole seconds plus nanoseconds.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timestamp {
  pub seconds: i64,
  #[serde(default)] pub nanos: u32,
}

impl Timestamp {
  pub fn to_date(&self) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(self.seconds, self.nanos).single()
  }
}

/// Anything that may or may not hold a usable date.
pub trait DateLike {
  fn to_date(&self) -> Option<DateTime<Utc>>;
}

impl DateLike for DateTime<Utc> {
  fn to_date(&self) -> Option<DateTime<Utc>> { Some(*self) }
}

impl DateLike for Timestamp {
  fn to_date(&self) -> Option<DateTime<Utc>> { Timestamp::to_date(self) }
}

impl DateLike for str {
  fn to_date(&self) -> Option<DateTime<Utc>> { parse_str(self) }
}

impl DateLike for String {
  fn to_date(&self) -> Option<DateTime<Utc>> { parse_str(self) }
}

/// Epoch milliseconds.
impl DateLike for i64 {
  fn to_date(&self) -> Option<DateTime<Utc>> { Utc.timestamp_millis_opt(*self).single() }
}

/// Epoch milliseconds; fractional part is dropped.
impl DateLike for f64 {
  fn to_date(&self) -> Option<DateTime<Utc>> { millis_f64(*self) }
}

impl DateLike for Value {
  fn to_date(&self) -> Option<DateTime<Utc>> {
    match self {
      Value::String(s) => parse_str(s),
      Value::Number(n) => n.as_f64().and_then(millis_f64),
      Value::Object(map) => {
        let secs = map.get("seconds").or_else(|| map.get("_seconds")).and_then(Value::as_f64)?;
        let nanos = map
          .get("nanoseconds")
          .or_else(|| map.get("_nanoseconds"))
          .or_else(|| map.get("nanos"))
          .and_then(Value::as_u64)
          .unwrap_or(0);
        if !secs.is_finite() {
          return None;
        }
        Timestamp { seconds: secs.trunc() as i64, nanos: nanos.min(999_999_999) as u32 }.to_date()
      }
      _ => None,
    }
  }
}

impl<T: DateLike + ?Sized> DateLike for &T {
  fn to_date(&self) -> Option<DateTime<Utc>> { (**self).to_date() }
}

impl<T: DateLike> DateLike for Option<T> {
  fn to_date(&self) -> Option<DateTime<Utc>> { self.as_ref().and_then(|v| v.to_date()) }
}

pub fn parse_date<T: DateLike + ?Sized>(value: &T) -> Option<DateTime<Utc>> {
  value.to_date()
}

fn millis_f64(ms: f64) -> Option<DateTime<Utc>> {
  if !ms.is_finite() {
    return None;
  }
  Utc.timestamp_millis_opt(ms.trunc() as i64).single()
}

fn parse_str(s: &str) -> Option<DateTime<Utc>> {
  let s = s.trim();
  if s.is_empty() {
    return None;
  }
  if let Ok(d) = DateTime::parse_from_rfc3339(s) {
    return Some(d.with_timezone(&Utc));
  }
  for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
    if let Ok(n) = NaiveDateTime::parse_from_str(s, fmt) {
      return Some(Utc.from_utc_datetime(&n));
    }
  }
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|n| Utc.from_utc_datetime(&n))
}

/// `dd/mm/yyyy`, or the invalid-date placeholder.
pub fn format_date<T: DateLike + ?Sized>(value: &T) -> String {
  match parse_date(value) {
    Some(d) => d.format("%d/%m/%Y").to_string(),
    None => INVALID_DATE.to_string(),
  }
}

/// `dd/mm/yyyy HH:MM`, or the invalid-date placeholder.
pub fn format_date_time<T: DateLike + ?Sized>(value: &T) -> String {
  match parse_date(value) {
    Some(d) => d.format("%d/%m/%Y %H:%M").to_string(),
    None => INVALID_DATE.to_string(),
  }
}

/// Relative Portuguese text such as "Há 2 horas".
pub fn time_ago<T: DateLike + ?Sized>(value: &T, now: DateTime<Utc>) -> String {
  let Some(d) = parse_date(value) else {
    return NOT_AVAILABLE.to_string();
  };
  let diff = now - d;
  let plural = |n: i64, one: &str, many: &str| if n == 1 { one.to_string() } else { many.to_string() };
  if diff.num_days() > 0 {
    let n = diff.num_days();
    return format!("Há {} {}", n, plural(n, "dia", "dias"));
  }
  if diff.num_hours() > 0 {
    let n = diff.num_hours();
    return format!("Há {} {}", n, plural(n, "hora", "horas"));
  }
  if diff.num_minutes() > 0 {
    let n = diff.num_minutes();
    return format!("Há {} {}", n, plural(n, "minuto", "minutos"));
  }
  "Agora há pouco".to_string()
}

/// Absolute difference in hours; 0.0 when either side is unusable.
pub fn hours_diff<A: DateLike + ?Sized, B: DateLike + ?Sized>(a: &A, b: &B) -> f64 {
  match (parse_date(a), parse_date(b)) {
    (Some(a), Some(b)) => (b - a).num_milliseconds().abs() as f64 / 3_600_000.0,
    _ => 0.0,
  }
}

/// Activity within the last 24 hours.
pub fn is_recent_activity<T: DateLike + ?Sized>(value: &T, now: DateTime<Utc>) -> bool {
  parse_date(value).map(|d| now - d < Duration::hours(24)).unwrap_or(false)
}

/// Sort key; 0 for unusable values.
pub fn timestamp_millis<T: DateLike + ?Sized>(value: &T) -> i64 {
  parse_date(value).map(|d| d.timestamp_millis()).unwrap_or(0)
}

/// Game clock text, `m:ss`.
pub fn format_elapsed(seconds: u64) -> String {
  format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
  }

  #[test]
  fn unusable_values_give_none() {
    assert!(parse_date(&Value::Null).is_none());
    assert!(parse_date(&None::<Value>).is_none());
    assert!(parse_date(&json!("not-a-date")).is_none());
    assert!(parse_date(&json!({})).is_none());
    assert!(parse_date(&json!({"seconds": "soon"})).is_none());
    assert!(parse_date(&json!([1, 2])).is_none());
    assert!(parse_date(&json!(true)).is_none());
    assert!(parse_date("").is_none());
  }

  #[test]
  fn timestamp_shapes_parse() {
    let expected = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    assert_eq!(parse_date(&json!({"seconds": 1_700_000_000})), Some(expected));
    assert_eq!(parse_date(&json!({"_seconds": 1_700_000_000, "_nanoseconds": 0})), Some(expected));
    assert_eq!(parse_date(&Timestamp { seconds: 1_700_000_000, nanos: 0 }), Some(expected));
  }

  #[test]
  fn strings_numbers_and_native_dates_parse() {
    let d = at(2024, 5, 17, 14, 30);
    assert_eq!(parse_date(&json!("2024-05-17T14:30:00Z")), Some(d));
    assert_eq!(parse_date("2024-05-17T11:30:00-03:00"), Some(d));
    assert_eq!(parse_date("2024-05-17T14:30:00"), Some(d));
    assert_eq!(parse_date("2024-05-17"), Some(at(2024, 5, 17, 0, 0)));
    assert_eq!(parse_date(&d.timestamp_millis()), Some(d));
    assert_eq!(parse_date(&json!(d.timestamp_millis())), Some(d));
    assert_eq!(parse_date(&d), Some(d));
    assert_eq!(parse_date(&Some(d)), Some(d));
  }

  #[test]
  fn formatting_degrades_to_placeholders() {
    let now = at(2024, 5, 17, 14, 30);
    assert_eq!(format_date(&now), "17/05/2024");
    assert_eq!(format_date(&json!("garbage")), INVALID_DATE);
    assert_eq!(format_date_time(&now), "17/05/2024 14:30");
    assert_eq!(time_ago(&json!({}), now), NOT_AVAILABLE);
    assert_eq!(hours_diff(&json!(null), &now), 0.0);
    assert_eq!(timestamp_millis("nope"), 0);
    assert!(!is_recent_activity(&json!("nope"), now));
  }

  #[test]
  fn time_ago_wording() {
    let now = at(2024, 5, 17, 14, 30);
    assert_eq!(time_ago(&(now - Duration::days(1)), now), "Há 1 dia");
    assert_eq!(time_ago(&(now - Duration::days(3)), now), "Há 3 dias");
    assert_eq!(time_ago(&(now - Duration::hours(2)), now), "Há 2 horas");
    assert_eq!(time_ago(&(now - Duration::minutes(1)), now), "Há 1 minuto");
    assert_eq!(time_ago(&(now - Duration::seconds(20)), now), "Agora há pouco");
  }

  #[test]
  fn hours_and_recency() {
    let now = at(2024, 5, 17, 14, 30);
    assert_eq!(hours_diff(&(now - Duration::minutes(90)), &now), 1.5);
    assert_eq!(hours_diff(&now, &(now - Duration::minutes(90))), 1.5);
    assert!(is_recent_activity(&(now - Duration::hours(23)), now));
    assert!(!is_recent_activity(&(now - Duration::hours(25)), now));
  }

  #[test]
  fn elapsed_clock() {
    assert_eq!(format_elapsed(0), "0:00");
    assert_eq!(format_elapsed(65), "1:05");
    assert_eq!(format_elapsed(600), "10:00");
  }
}
