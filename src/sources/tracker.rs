// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Issues in the review project's tracker repository that a user opened, closed, or commented on
// role: sources/tracker
// inputs: GithubApi, tracker repo (owner/name), username, window
// outputs: Vec<model::Issue> sorted by link
// side_effects: GitHub API calls via the injected backend
// invariants:
// - opened_by / closed_by name the user only when that action happened inside the window
// - an issue is reported only when at least one of open, close, comment fell inside the window
// errors: API failures propagate
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::ext::serde_json::JsonFetch;
use crate::model::Issue;
use crate::sources::github::{count_user_comments, issue_from_json, search_all, GithubApi, WindowField};
use crate::util::{in_scope, parse_rfc3339};

pub const DEFAULT_TRACKER_REPO: &str = "golang/go";

pub fn tracker_issues(
  api: &dyn GithubApi,
  repo: &str,
  username: &str,
  start: DateTime<Utc>,
  end: DateTime<Utc>,
) -> Result<Vec<Issue>> {
  let query = format!("repo:{} is:issue involves:{}", repo, username);
  let items = search_all(api, &query, WindowField::Updated, start, end)?;

  let mut out = Vec::new();

  for item in &items {
    if item.fetch("pull_request").is_present() {
      continue;
    }
    let Some(mut issue) = issue_from_json(item, repo) else {
      continue;
    };

    let opened = issue.opened_by == username && in_scope(issue.date_opened, start, end);

    let events = api.list_issue_events(repo, issue.number)?;
    let closed = events.iter().any(|e| {
      e.fetch("event").str() == Some("closed")
        && e.fetch("actor.login").str() == Some(username)
        && e
          .fetch("created_at")
          .str()
          .and_then(parse_rfc3339)
          .map(|t| in_scope(t, start, end))
          .unwrap_or(false)
    });

    let comments = api.list_issue_comments(repo, issue.number)?;
    issue.comments = count_user_comments(&comments, username, start, end);

    if !opened && !closed && issue.comments == 0 {
      continue;
    }

    if !opened {
      issue.opened_by = String::new();
    }
    issue.closed_by = closed.then(|| username.to_string());
    out.push(issue);
  }

  out.sort_by(|a, b| a.link.cmp(&b.link));
  info!(repo, count = out.len(), "tracker issues");

  Ok(out)
}
