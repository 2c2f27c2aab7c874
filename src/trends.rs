// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Daily open-issue counts for one repository, split into feature requests and other issues
// role: processing/trends
// inputs: TrendsConfig (repo, optional label, feature label, window), effective now
// outputs: <out>/<name>-trend.csv with one row per day; average close time in the log
// side_effects: Network calls via the GitHub source; creates the output directory
// invariants:
// - one row per UTC day from the window's start day through its end day
// - an issue counts on every day from its opened day through its closed day (open issues through the end)
// - issues transferred to another repository are never counted
// errors: Propagates fetch and write errors
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Duration, Local, NaiveDate};
use tracing::{debug, info};

use crate::cli::TrendsConfig;
use crate::ext::serde_json::JsonFetch;
use crate::model::Issue;
use crate::report::open_http;
use crate::sinks::csv_dir::write_table;
use crate::sources::github::{self, issue_from_json, search_all, was_transferred, GithubApi, WindowField};
use crate::table::{Cell, Row};
use crate::util;
use crate::window::{self, history_start, Window};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCount {
  pub day: NaiveDate,
  pub feature_requests: usize,
  pub other: usize,
}

fn label_filter(label: Option<&str>) -> String {
  label.map(|l| format!(" label:\"{}\"", l)).unwrap_or_default()
}

/// Issues that were open at some point in the window: still open, or closed after it started.
/// Issues moved to another repository come back flagged `transferred`.
pub fn fetch_issues(api: &dyn GithubApi, repo: &str, label: Option<&str>, window: &Window) -> Result<Vec<Issue>> {
  let labels = label_filter(label);
  let queries = [
    format!("repo:{} is:issue is:open{}", repo, labels),
    format!(
      "repo:{} is:issue is:closed closed:>={}{}",
      repo,
      window.start.format("%Y-%m-%d"),
      labels
    ),
  ];

  let mut seen = HashSet::new();
  let mut out = Vec::new();

  for query in &queries {
    for item in search_all(api, query, WindowField::Created, history_start(), window.end)? {
      if item.fetch("pull_request").is_present() {
        continue;
      }
      let Some(mut issue) = issue_from_json(&item, repo) else {
        continue;
      };
      if !seen.insert(issue.link.clone()) {
        continue;
      }
      issue.transferred = was_transferred(api, repo, &issue)?;
      if issue.transferred {
        debug!(link = %issue.link, "issue was transferred out");
      }
      out.push(issue);
    }
  }

  out.sort_by(|a, b| a.link.cmp(&b.link));

  Ok(out)
}

fn counted(issues: &[Issue]) -> impl Iterator<Item = &Issue> {
  issues.iter().filter(|i| !i.transferred)
}

fn open_on(issue: &Issue, day: NaiveDate) -> bool {
  let opened = issue.date_opened.date_naive();
  match issue.date_closed {
    Some(closed) => opened <= day && day <= closed.date_naive(),
    None => opened <= day,
  }
}

pub fn daily_counts(issues: &[Issue], window: &Window, feature_label: &str) -> Vec<DayCount> {
  window
    .days()
    .into_iter()
    .map(|day| {
      let mut count = DayCount {
        day,
        feature_requests: 0,
        other: 0,
      };
      for issue in counted(issues).filter(|i| open_on(i, day)) {
        if issue.has_label(feature_label) {
          count.feature_requests += 1;
        } else {
          count.other += 1;
        }
      }
      count
    })
    .collect()
}

/// Mean of closed minus opened over closed, non-transferred issues.
pub fn average_time_to_close(issues: &[Issue]) -> Option<Duration> {
  let spans: Vec<Duration> = counted(issues)
    .filter_map(|i| i.date_closed.map(|c| c - i.date_opened))
    .collect();

  if spans.is_empty() {
    return None;
  }
  let total: i64 = spans.iter().map(|d| d.num_seconds()).sum();

  Some(Duration::seconds(total / spans.len() as i64))
}

pub fn rows(counts: &[DayCount]) -> Vec<Row> {
  let mut rows = vec![Row::header(&["Date", "Feature requests", "Other issues"])];
  rows.extend(counts.iter().map(|c| {
    Row::plain(vec![
      Cell::text(c.day.format("%Y-%m-%d").to_string()),
      Cell::text(c.feature_requests.to_string()),
      Cell::text(c.other.to_string()),
    ])
  }));
  rows
}

/// `--label` when given, otherwise the repository name.
pub fn trend_name(repo: &str, label: Option<&str>) -> String {
  match label {
    Some(l) => l.to_string(),
    None => repo.rsplit('/').next().unwrap_or(repo).to_string(),
  }
}

pub fn run(cfg: &TrendsConfig, now: DateTime<Local>) -> Result<()> {
  let window = window::resolve(&cfg.window, now)?;
  let http = open_http(&cfg.corpus)?;
  let api = github::build_api(http)?;

  let issues = fetch_issues(api.as_ref(), &cfg.repo, cfg.label.as_deref(), &window)?;
  let transferred = issues.iter().filter(|i| i.transferred).count();
  info!(repo = %cfg.repo, count = issues.len() - transferred, transferred, "issues open during window");

  match average_time_to_close(&issues) {
    Some(d) => info!(
      days = d.num_days(),
      hours = d.num_hours() % 24,
      "average time to close an issue"
    ),
    None => info!("no closed issues; average time to close is undefined"),
  }

  let counts = daily_counts(&issues, &window, &cfg.feature_label);
  let out_dir = util::prepare_out_dir(cfg.out.as_deref(), Some(now))?;
  let path = Path::new(&out_dir).join(format!("{}-trend.csv", trend_name(&cfg.repo, cfg.label.as_deref())));
  write_table(&path, &rows(&counts))?;
  info!(path = %path.display(), "wrote output");

  Ok(())
}
