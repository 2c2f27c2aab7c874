// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Source-neutral issue and changelist types shared by fetchers, tables and snippets
// role: model/types
// outputs: Issue, Changelist, ChangelistStatus, Activity, category helpers
// invariants:
// - category heuristics are pure and deterministic (no map iteration order leaks)
// - Activity lists are sorted by link once a fetcher returns them
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
  pub number: i64,
  pub link: String,
  pub repo: String,
  pub title: String,
  pub opened_by: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub closed_by: Option<String>,
  pub date_opened: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date_closed: Option<DateTime<Utc>>,
  pub comments: usize,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub labels: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub milestone: Option<String>,
  /// Moved to another repository after it was filed.
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub transferred: bool,
}

impl Issue {
  pub fn category(&self) -> String {
    extract_category(&self.title).unwrap_or_default()
  }

  pub fn opened_by_user(&self, username: &str) -> bool {
    self.opened_by == username
  }

  pub fn closed_by_user(&self, username: &str) -> bool {
    self.closed_by.as_deref() == Some(username)
  }

  pub fn has_label(&self, label: &str) -> bool {
    self.labels.iter().any(|l| l == label)
  }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangelistStatus {
  Abandoned,
  Draft,
  New,
  Merged,
  Unknown,
}

impl ChangelistStatus {
  /// Map a Gerrit status string (any case) onto our status.
  pub fn from_gerrit(s: &str) -> Self {
    match s.to_ascii_lowercase().as_str() {
      "merged" => ChangelistStatus::Merged,
      "abandoned" => ChangelistStatus::Abandoned,
      "new" => ChangelistStatus::New,
      "draft" => ChangelistStatus::Draft,
      _ => ChangelistStatus::Unknown,
    }
  }
}

impl fmt::Display for ChangelistStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ChangelistStatus::Merged => "merged",
      ChangelistStatus::Abandoned => "abandoned",
      ChangelistStatus::New => "new",
      ChangelistStatus::Draft => "draft",
      ChangelistStatus::Unknown => "unknown",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changelist {
  pub number: i64,
  pub link: String,
  pub subject: String,
  #[serde(default)]
  pub message: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub comments: Vec<String>,
  #[serde(default)]
  pub branch: String,
  pub author: String,
  pub repo: String,
  pub status: ChangelistStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub merged_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub associated_issues: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub affected_files: Vec<String>,
}

impl Changelist {
  /// Category from the subject prefix, else the most popular parent directory
  /// among the affected files (longer path wins a tie).
  pub fn category(&self) -> String {
    if let Some(category) = extract_category(&self.subject) {
      return category;
    }

    let mut directories: BTreeMap<&str, usize> = BTreeMap::new();

    for filename in &self.affected_files {
      let mut dir = parent_dir(filename);
      while dir != parent_dir(dir) {
        *directories.entry(dir).or_insert(0) += 1;
        dir = parent_dir(dir);
      }
    }

    let mut popular_dir = "";
    let mut popular_count = 0;

    for (dir, count) in directories {
      if count < popular_count {
        continue;
      }
      if count > popular_count || dir.len() > popular_dir.len() {
        popular_count = count;
        popular_dir = dir;
      }
    }

    popular_dir.to_string()
  }

  pub fn is_merged(&self) -> bool {
    self.status == ChangelistStatus::Merged
  }
}

/// Grouping key for authored changelists.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangelistCategory {
  pub branch: String,
  pub desc: String,
}

impl fmt::Display for ChangelistCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.branch.is_empty() {
      f.write_str(&self.desc)
    } else {
      write!(f, "{}: {}", self.branch, self.desc)
    }
  }
}

/// Everything one source reports for a user.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Activity {
  pub authored: Vec<Changelist>,
  pub reviewed: Vec<Changelist>,
  pub issues: Vec<Issue>,
}

impl Activity {
  pub fn sort_by_link(&mut self) {
    self.authored.sort_by(|a, b| a.link.cmp(&b.link));
    self.reviewed.sort_by(|a, b| a.link.cmp(&b.link));
    self.issues.sort_by(|a, b| a.link.cmp(&b.link));
  }
}

/// `"x/tools: fix thing"` → `Some("x/tools")`. A prefix containing a space is
/// prose, not a category.
pub fn extract_category(description: &str) -> Option<String> {
  let mut split = description.split(':');
  let first = split.next()?;
  split.next()?;

  if first.contains(' ') {
    return None;
  }

  Some(first.to_string())
}

/// Lexical parent like Go's `filepath.Dir`: `"a/b.go"` → `"a"`, `"b.go"` → `"."`,
/// `"/a"` → `"/"`.
fn parent_dir(path: &str) -> &str {
  match path.rfind('/') {
    Some(0) => "/",
    Some(idx) => &path[..idx],
    None => ".",
  }
}
