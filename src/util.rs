//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) { end -= 1; }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}

/// Locate the first balanced top-level `{...}` region in `text`.
///
/// Models like to wrap JSON in prose or code fences. Braces inside string
/// literals (including escaped quotes) do not count toward nesting.
pub fn extract_json_object(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let mut depth = 0usize;
  let mut in_string = false;
  let mut escaped = false;

  for (i, ch) in text[start..].char_indices() {
    if in_string {
      match ch {
        _ if escaped => escaped = false,
        '\\' => escaped = true,
        '"' => in_string = false,
        _ => {}
      }
      continue;
    }
    match ch {
      '"' => in_string = true,
      '{' => depth += 1,
      '}' => {
        depth -= 1;
        if depth == 0 {
          return Some(&text[start..start + i + 1]);
        }
      }
      _ => {}
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_replaces_all_occurrences() {
    let out = fill_template("{a} and {a} then {b}", &[("a", "x"), ("b", "y")]);
    assert_eq!(out, "x and x then y");
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    let s = "ééééé";
    let t = trunc_for_log(s, 3);
    assert!(t.starts_with('é'));
    assert!(t.contains("10 bytes total"));
    assert_eq!(trunc_for_log("short", 10), "short");
  }

  #[test]
  fn extracts_object_from_prose() {
    let text = "Sure! Here it is:\n```json\n{\"a\": {\"b\": 1}}\n```\nEnjoy {not this}";
    assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 1}}"));
  }

  #[test]
  fn braces_inside_strings_are_ignored() {
    let text = r#"{"code": "fn main() { println!(\"}\"); }", "n": 2} trailing"#;
    assert_eq!(
      extract_json_object(text),
      Some(r#"{"code": "fn main() { println!(\"}\"); }", "n": 2}"#)
    );
  }

  #[test]
  fn unbalanced_or_missing_object_yields_none() {
    assert_eq!(extract_json_object("not json"), None);
    assert_eq!(extract_json_object("{\"open\": 1"), None);
  }
}
