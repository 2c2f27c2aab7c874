// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Dotted-path lookups into GitHub/Gerrit JSON payloads with typed, non-panicking extraction
// role: extension/serde_json
// outputs: JsonFetch trait and JsonFetched wrapper (to, to_or_default, str, items)
// invariants: No panics; missing paths or wrong types yield None / empty
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use serde::de::DeserializeOwned;
use serde_json::Value;

/// A (possibly missing) location inside a JSON document.
pub struct JsonFetched<'a> {
  inner: Option<&'a Value>,
}

impl<'a> JsonFetched<'a> {
  pub fn to<T>(&self) -> Option<T>
  where
    T: DeserializeOwned,
  {
    self.inner.and_then(|v| serde_json::from_value::<T>(v.clone()).ok())
  }

  pub fn to_or_default<T>(&self) -> T
  where
    T: DeserializeOwned + Default,
  {
    self.to::<T>().unwrap_or_default()
  }

  /// Borrow a string without cloning; `null` and non-strings are None.
  pub fn str(&self) -> Option<&'a str> {
    self.inner.and_then(Value::as_str)
  }

  /// Array elements at this location (empty when absent or not an array).
  pub fn items(&self) -> &'a [Value] {
    self.inner.and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn is_present(&self) -> bool {
    matches!(self.inner, Some(v) if !v.is_null())
  }
}

/// Fetch nested values via dotted paths like `"user.login"` or `"labels.0.name"`.
pub trait JsonFetch {
  fn fetch(&self, path: &str) -> JsonFetched<'_>;
}

impl JsonFetch for Value {
  fn fetch(&self, path: &str) -> JsonFetched<'_> {
    if path.is_empty() {
      return JsonFetched { inner: Some(self) };
    }

    let mut cur = self;

    for key in path.split('.') {
      let next = match cur {
        Value::Array(arr) => key.parse::<usize>().ok().and_then(|i| arr.get(i)),
        _ => cur.get(key),
      };
      match next {
        Some(v) => cur = v,
        None => return JsonFetched { inner: None },
      }
    }

    JsonFetched { inner: Some(cur) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fetch_top_level_nested_and_indexed() {
    let v: Value = serde_json::json!({
      "title": "Hello",
      "user": { "login": "octocat" },
      "labels": [{"name": "bug"}, {"name": "gopls"}]
    });

    assert_eq!(v.fetch("title").str(), Some("Hello"));
    assert_eq!(v.fetch("user.login").to::<String>().as_deref(), Some("octocat"));
    assert_eq!(v.fetch("labels.1.name").str(), Some("gopls"));
    assert_eq!(v.fetch("labels.7.name").str(), None);
    assert_eq!(v.fetch("missing").to::<String>(), None);
    assert_eq!(v.fetch("labels").items().len(), 2);
    assert!(v.fetch("").is_present());
  }

  #[test]
  fn null_and_wrong_types_are_absent() {
    let v: Value = serde_json::json!({ "closed_at": null, "n": 3 });
    assert!(!v.fetch("closed_at").is_present());
    assert_eq!(v.fetch("closed_at").str(), None);
    assert!(v.fetch("n").items().is_empty());
    let s: String = v.fetch("nope").to_or_default();
    assert_eq!(s, "");
  }
}
