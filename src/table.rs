// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Turn issues and changelists into ordered, styled rows grouped by repository and category/author
// role: formatting/tables
// inputs: username (for issue open/close attribution), Vec<Issue> / Vec<Changelist>
// outputs: Vec<Row> with header, item rows, and sub-subtotal / Subtotal / Total rows
// invariants:
// - empty input yields no rows at all
// - repositories, categories and authors are emitted in sorted order; items by link
// - summary-row colour and boldness are a function of the row kind only
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Changelist, ChangelistCategory, Issue};
use crate::util::truncate;

/// Named tables, ordered by name.
pub type Tables = BTreeMap<String, Vec<Row>>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
  pub const PALE_YELLOW: Rgb = Rgb(255, 255, 237);
  pub const SUBSUBTOTAL_GRAY: Rgb = Rgb(247, 247, 247);
  pub const SUBTOTAL_GRAY: Rgb = Rgb(240, 240, 240);
  pub const TOTAL_GRAY: Rgb = Rgb(232, 232, 232);
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Cell {
  pub text: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub hyperlink: Option<String>,
}

impl Cell {
  pub fn text<S: Into<String>>(text: S) -> Self {
    Self {
      text: text.into(),
      hyperlink: None,
    }
  }

  pub fn link(link: &str) -> Self {
    Self {
      text: link.to_string(),
      hyperlink: Some(link.to_string()),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Row {
  pub cells: Vec<Cell>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub color: Option<Rgb>,
  pub bold: bool,
}

impl Row {
  pub fn plain(cells: Vec<Cell>) -> Self {
    Self {
      cells,
      color: None,
      bold: false,
    }
  }

  pub fn header(titles: &[&str]) -> Self {
    Self {
      cells: titles.iter().map(|t| Cell::text(*t)).collect(),
      color: None,
      bold: true,
    }
  }

  fn summary(kind: Summary, label: &str, values: Vec<String>) -> Self {
    let mut cells = vec![Cell::text(kind.first_cell()), Cell::text(label)];
    cells.extend(values.into_iter().map(Cell::text));

    Self {
      cells,
      color: Some(kind.color()),
      bold: true,
    }
  }

  /// Cell texts, for CSV output.
  pub fn texts(&self) -> Vec<&str> {
    self.cells.iter().map(|c| c.text.as_str()).collect()
  }
}

/// The three levels of total rows.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Summary {
  /// Per category or author; first cell empty.
  SubSubtotal,
  Subtotal,
  Total,
}

impl Summary {
  fn first_cell(self) -> &'static str {
    match self {
      Summary::SubSubtotal => "",
      Summary::Subtotal => "Subtotal",
      Summary::Total => "Total",
    }
  }

  fn color(self) -> Rgb {
    match self {
      Summary::SubSubtotal => Rgb::SUBSUBTOTAL_GRAY,
      Summary::Subtotal => Rgb::SUBTOTAL_GRAY,
      Summary::Total => Rgb::TOTAL_GRAY,
    }
  }
}

#[derive(Default, Clone, Copy)]
struct IssueTotal {
  issues: usize,
  comments: usize,
  opened: usize,
  closed: usize,
}

impl IssueTotal {
  fn add(&mut self, other: &IssueTotal) {
    self.issues += other.issues;
    self.comments += other.comments;
    self.opened += other.opened;
    self.closed += other.closed;
  }

  fn values(&self) -> Vec<String> {
    vec![
      self.opened.to_string(),
      self.closed.to_string(),
      self.comments.to_string(),
      self.issues.to_string(),
    ]
  }
}

fn by_repo<T, F: Fn(&T) -> &str>(items: &[T], repo: F) -> BTreeMap<String, Vec<&T>> {
  let mut repos: BTreeMap<String, Vec<&T>> = BTreeMap::new();
  for item in items {
    repos.entry(repo(item).to_string()).or_default().push(item);
  }
  repos
}

pub fn issues_to_rows(username: &str, issues: &[Issue]) -> Vec<Row> {
  if issues.is_empty() {
    return Vec::new();
  }

  let repos = by_repo(issues, |i| i.repo.as_str());
  let mut rows = vec![Row::header(&[
    "Issue Number",
    "Description",
    "Opened",
    "Closed",
    "Number of Comments",
    "Total Issues",
  ])];
  let mut grand_total = IssueTotal::default();

  for (repo, repo_issues) in &repos {
    let mut categories: BTreeMap<String, Vec<&Issue>> = BTreeMap::new();
    for issue in repo_issues {
      categories.entry(issue.category()).or_default().push(*issue);
    }

    let mut repo_total = IssueTotal::default();
    for (category, issues) in &categories {
      let mut issues = issues.clone();
      issues.sort_by(|a, b| a.link.cmp(&b.link));

      let mut category_total = IssueTotal {
        issues: issues.len(),
        ..IssueTotal::default()
      };
      for issue in issues {
        let opened = issue.opened_by_user(username);
        let closed = issue.closed_by_user(username);
        category_total.opened += usize::from(opened);
        category_total.closed += usize::from(closed);
        category_total.comments += issue.comments;

        rows.push(Row::plain(vec![
          Cell::link(&issue.link),
          Cell::text(truncate(&issue.title)),
          Cell::text(opened.to_string()),
          Cell::text(closed.to_string()),
          Cell::text(issue.comments.to_string()),
        ]));
      }
      if categories.len() > 1 {
        rows.push(Row::summary(Summary::SubSubtotal, category, category_total.values()));
      }
      repo_total.add(&category_total);
    }

    if repos.len() > 1 {
      rows.push(Row::summary(Summary::Subtotal, repo, repo_total.values()));
    }
    grand_total.add(&repo_total);
  }

  rows.push(Row::summary(Summary::Total, "", grand_total.values()));
  rows
}

fn changelist_row(cl: &Changelist, highlight_unmerged: bool) -> Row {
  let mut row = Row::plain(vec![Cell::link(&cl.link), Cell::text(truncate(&cl.subject)), Cell::text("")]);
  if highlight_unmerged && !cl.is_merged() {
    row.color = Some(Rgb::PALE_YELLOW);
  }
  row
}

pub fn authored_changelists_to_rows(cls: &[Changelist]) -> Vec<Row> {
  if cls.is_empty() {
    return Vec::new();
  }

  let repos = by_repo(cls, |c| c.repo.as_str());
  let mut rows = vec![Row::header(&["CL", "Description"])];

  for (repo, repo_cls) in &repos {
    // Ord on ChangelistCategory sorts by branch, then description.
    let mut categories: BTreeMap<ChangelistCategory, Vec<&Changelist>> = BTreeMap::new();
    for cl in repo_cls {
      let category = ChangelistCategory {
        branch: cl.branch.clone(),
        desc: cl.category(),
      };
      categories.entry(category).or_default().push(*cl);
    }

    for (category, cls) in &categories {
      let mut cls = cls.clone();
      cls.sort_by(|a, b| a.link.cmp(&b.link));
      for cl in &cls {
        rows.push(changelist_row(cl, true));
      }
      if categories.len() > 1 {
        rows.push(Row::summary(
          Summary::SubSubtotal,
          &category.to_string(),
          vec![cls.len().to_string()],
        ));
      }
    }
    rows.push(Row::summary(Summary::Subtotal, repo, vec![repo_cls.len().to_string()]));
  }

  rows.push(Row::summary(Summary::Total, "", vec![cls.len().to_string()]));
  rows
}

pub fn reviewed_changelists_to_rows(cls: &[Changelist]) -> Vec<Row> {
  if cls.is_empty() {
    return Vec::new();
  }

  let repos = by_repo(cls, |c| c.repo.as_str());
  let mut rows = vec![Row::header(&["CL", "Description"])];

  for (repo, repo_cls) in &repos {
    let mut authors: BTreeMap<&str, Vec<&Changelist>> = BTreeMap::new();
    for cl in repo_cls {
      authors.entry(cl.author.as_str()).or_default().push(*cl);
    }

    for (author, cls) in &authors {
      let mut cls = cls.clone();
      cls.sort_by(|a, b| a.link.cmp(&b.link));
      for cl in &cls {
        rows.push(changelist_row(cl, false));
      }
      rows.push(Row::summary(Summary::SubSubtotal, author, vec![cls.len().to_string()]));
    }
    if repos.len() > 1 {
      rows.push(Row::summary(Summary::Subtotal, repo, vec![repo_cls.len().to_string()]));
    }
  }

  rows.push(Row::summary(Summary::Total, "", vec![cls.len().to_string()]));
  rows
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::ChangelistStatus;
  use chrono::{TimeZone, Utc};

  fn render(rows: &[Row]) -> String {
    rows
      .iter()
      .map(|r| {
        let mark = match (r.bold, r.color) {
          (true, Some(Rgb::TOTAL_GRAY)) => "T",
          (true, Some(Rgb::SUBTOTAL_GRAY)) => "S",
          (true, Some(Rgb::SUBSUBTOTAL_GRAY)) => "s",
          (true, None) => "H",
          (false, Some(Rgb::PALE_YELLOW)) => "y",
          _ => " ",
        };
        format!("{} {}", mark, r.texts().join("|"))
      })
      .collect::<Vec<_>>()
      .join("\n")
  }

  fn cl(repo: &str, n: i64, subject: &str, author: &str, status: ChangelistStatus) -> Changelist {
    Changelist {
      number: n,
      link: format!("go-review.googlesource.com/c/{}/+/{}", repo, n),
      subject: subject.into(),
      message: String::new(),
      comments: Vec::new(),
      branch: "master".into(),
      author: author.into(),
      repo: repo.into(),
      status,
      merged_at: None,
      associated_issues: Vec::new(),
      affected_files: Vec::new(),
    }
  }

  fn issue(repo: &str, n: i64, title: &str, opened_by: &str, closed_by: Option<&str>, comments: usize) -> Issue {
    Issue {
      number: n,
      link: format!("https://github.com/{}/issues/{}", repo, n),
      repo: repo.into(),
      title: title.into(),
      opened_by: opened_by.into(),
      closed_by: closed_by.map(str::to_string),
      date_opened: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
      date_closed: None,
      comments,
      labels: Vec::new(),
      milestone: None,
      transferred: false,
    }
  }

  #[test]
  fn empty_inputs_yield_no_rows() {
    assert!(issues_to_rows("a", &[]).is_empty());
    assert!(authored_changelists_to_rows(&[]).is_empty());
    assert!(reviewed_changelists_to_rows(&[]).is_empty());
  }

  #[test]
  fn authored_groups_by_repo_and_category() {
    let cls = vec![
      cl("tools", 3, "gopls: fix hover", "me", ChangelistStatus::Merged),
      cl("tools", 1, "cmd/guru: drop", "me", ChangelistStatus::New),
      cl("tools", 2, "gopls: add test", "me", ChangelistStatus::Merged),
      cl("vscode-go", 9, "src/goMain: tidy", "me", ChangelistStatus::Merged),
    ];
    insta::assert_snapshot!(render(&authored_changelists_to_rows(&cls)), @r"
    H CL|Description
    y go-review.googlesource.com/c/tools/+/1|cmd/guru: drop|
    s |master: cmd/guru|1
      go-review.googlesource.com/c/tools/+/2|gopls: add test|
      go-review.googlesource.com/c/tools/+/3|gopls: fix hover|
    s |master: gopls|2
    S Subtotal|tools|3
      go-review.googlesource.com/c/vscode-go/+/9|src/goMain: tidy|
    S Subtotal|vscode-go|1
    T Total||4
    ");
  }

  #[test]
  fn reviewed_groups_by_author_with_subtotals_only_for_many_repos() {
    let one_repo = vec![
      cl("tools", 5, "gopls: a", "zed@x", ChangelistStatus::New),
      cl("tools", 4, "gopls: b", "amy@x", ChangelistStatus::Merged),
    ];
    insta::assert_snapshot!(render(&reviewed_changelists_to_rows(&one_repo)), @r"
    H CL|Description
      go-review.googlesource.com/c/tools/+/4|gopls: b|
    s |amy@x|1
      go-review.googlesource.com/c/tools/+/5|gopls: a|
    s |zed@x|1
    T Total||2
    ");

    let mut two_repos = one_repo.clone();
    two_repos.push(cl("net", 7, "http2: c", "amy@x", ChangelistStatus::Merged));
    let rows = reviewed_changelists_to_rows(&two_repos);
    let subtotals: Vec<String> = rows
      .iter()
      .filter(|r| r.cells[0].text == "Subtotal")
      .map(|r| r.texts().join("|"))
      .collect();
    assert_eq!(subtotals, vec!["Subtotal|net|1", "Subtotal|tools|2"]);
  }

  #[test]
  fn issues_count_user_actions() {
    let issues = vec![
      issue("o/r", 2, "x/tools/gopls: crash", "me", Some("me"), 3),
      issue("o/r", 1, "x/tools/gopls: slow", "other", None, 1),
      issue("o/r", 3, "Question about things", "other", Some("me"), 0),
    ];
    insta::assert_snapshot!(render(&issues_to_rows("me", &issues)), @r"
    H Issue Number|Description|Opened|Closed|Number of Comments|Total Issues
      https://github.com/o/r/issues/3|Question about things|false|true|0
    s ||0|1|0|1
      https://github.com/o/r/issues/1|x/tools/gopls: slow|false|false|1
      https://github.com/o/r/issues/2|x/tools/gopls: crash|true|true|3
    s |x/tools/gopls|1|1|4|2
    T Total||1|2|4|3
    ");
  }

  #[test]
  fn issue_rows_link_and_truncate() {
    let long = "a".repeat(120);
    let rows = issues_to_rows("me", &[issue("o/r", 1, &long, "me", None, 0)]);
    assert_eq!(rows[1].cells[0].hyperlink.as_deref(), Some("https://github.com/o/r/issues/1"));
    assert_eq!(rows[1].cells[1].text.chars().count(), 80);
    // One repo, one category: header, item, total.
    assert_eq!(rows.len(), 3);
  }
}
