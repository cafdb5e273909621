//! Small utility helpers used across modules.

use serde_json::Value;

/// Shorten `text` to at most `max_len` characters, appending "..." when cut.
pub fn shortify(text: &str, max_len: usize) -> String {
  if text.chars().count() <= max_len {
    return text.to_string();
  }
  let mut out: String = text.chars().take(max_len).collect();
  out.push_str("...");
  out
}

/// Coerce an arbitrary JSON value to a finite number.
/// Numbers and numeric strings are accepted; anything else is `None`.
pub fn to_finite(value: &Value) -> Option<f64> {
  let n = match value {
    Value::Number(n) => n.as_f64()?,
    Value::String(s) => s.trim().parse::<f64>().ok()?,
    _ => return None,
  };
  n.is_finite().then_some(n)
}

/// Coerce a wire id to an integer. Ids that are not finite whole numbers are rejected.
pub fn coerce_id(value: &Value) -> Option<i64> {
  let n = to_finite(value)?;
  if n.fract() != 0.0 || n < i64::MIN as f64 || n > i64::MAX as f64 {
    return None;
  }
  Some(n as i64)
}

/// Plain-text rendering of a value that should have been a string.
pub fn coerce_to_plain_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

/// Log-safe truncation for large strings.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) { cut -= 1; }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn shortify_cuts_on_chars() {
    assert_eq!(shortify("abc", 5), "abc");
    assert_eq!(shortify("Brasília é", 7), "Brasíli...");
  }

  #[test]
  fn ids_must_be_whole_and_finite() {
    assert_eq!(coerce_id(&json!(12)), Some(12));
    assert_eq!(coerce_id(&json!("7")), Some(7));
    assert_eq!(coerce_id(&json!(3.0)), Some(3));
    assert_eq!(coerce_id(&json!(3.5)), None);
    assert_eq!(coerce_id(&json!("abc")), None);
    assert_eq!(coerce_id(&Value::Null), None);
  }

  #[test]
  fn trunc_respects_char_boundaries() {
    let s = "ééééé";
    let out = trunc_for_log(s, 3);
    assert!(out.starts_with('é'));
    assert!(out.ends_with("(10 bytes total)"));
  }
}
