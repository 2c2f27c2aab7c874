// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: GitHub issues and pull requests a user was involved in during a window
// role: sources/github
// inputs: username, window, GITHUB_TOKEN/GH_TOKEN or `gh auth token`; WS_TEST_GITHUB_* fixtures
// outputs: model::Activity (authored PRs, reviewed PRs, issues), raw search items for other sources
// side_effects: Network calls to the GitHub REST API (or corpus reads); spawns `gh` when no token env is set
// invariants:
// - search items are de-duplicated by html_url across sliding windows
// - closed-but-unmerged pull requests are dropped
// - comment counts only include the user's comments strictly inside the window
// errors: API failures propagate to the caller with the request as context
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::ext::serde_json::JsonFetch;
use crate::http::HttpClient;
use crate::model::{Activity, Changelist, ChangelistStatus, Issue};
use crate::util::{in_scope, parse_rfc3339, rfc3339};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// The Search API stops at 1000 results: ten pages of 100.
const MAX_PAGES: u32 = 10;
const PER_PAGE: usize = 100;

/// Discover a GitHub token: env vars first, then `gh auth token` if available.
pub fn get_github_token() -> Option<String> {
  for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
    if let Ok(t) = std::env::var(var) {
      if !t.trim().is_empty() {
        return Some(t.trim().to_string());
      }
    }
  }

  if let Ok(output) = std::process::Command::new("gh").args(["auth", "token"]).output() {
    if output.status.success() {
      let t = String::from_utf8_lossy(&output.stdout).trim().to_string();

      if !t.is_empty() {
        return Some(t);
      }
    }
  }

  None
}

// --- Trait seam for GitHub API ---
pub trait GithubApi {
  /// One page of `/search/issues`, sorted ascending by `sort`.
  fn search_issues(&self, query: &str, sort: &str, page: u32) -> Result<Value>;
  fn is_merged(&self, repo: &str, number: i64) -> Result<bool>;
  fn get_issue(&self, repo: &str, number: i64) -> Result<Value>;
  fn list_issue_comments(&self, repo: &str, number: i64) -> Result<Vec<Value>>;
  fn list_issue_events(&self, repo: &str, number: i64) -> Result<Vec<Value>>;
}

// --- Lightweight in-memory caching wrapper ---
// Caches successful responses per run; the tracker and GitHub passes overlap.
struct GithubCachedApi {
  inner: Box<dyn GithubApi>,
  search: RefCell<HashMap<String, Value>>,
  merged: RefCell<HashMap<String, bool>>,
  issue: RefCell<HashMap<String, Value>>,
  comments: RefCell<HashMap<String, Vec<Value>>>,
  events: RefCell<HashMap<String, Vec<Value>>>,
}

impl GithubCachedApi {
  fn new(inner: Box<dyn GithubApi>) -> Self {
    Self {
      inner,
      search: RefCell::new(HashMap::new()),
      merged: RefCell::new(HashMap::new()),
      issue: RefCell::new(HashMap::new()),
      comments: RefCell::new(HashMap::new()),
      events: RefCell::new(HashMap::new()),
    }
  }

  #[inline]
  fn key_num(repo: &str, n: i64) -> String {
    format!("{}#{}", repo, n)
  }
}

impl GithubApi for GithubCachedApi {
  fn search_issues(&self, query: &str, sort: &str, page: u32) -> Result<Value> {
    let key = format!("{}|{}|{}", query, sort, page);

    if let Some(v) = self.search.borrow().get(&key).cloned() {
      return Ok(v);
    }
    let v = self.inner.search_issues(query, sort, page)?;
    self.search.borrow_mut().insert(key, v.clone());

    Ok(v)
  }

  fn is_merged(&self, repo: &str, number: i64) -> Result<bool> {
    let key = Self::key_num(repo, number);

    if let Some(v) = self.merged.borrow().get(&key).copied() {
      return Ok(v);
    }
    let v = self.inner.is_merged(repo, number)?;
    self.merged.borrow_mut().insert(key, v);

    Ok(v)
  }

  fn get_issue(&self, repo: &str, number: i64) -> Result<Value> {
    let key = Self::key_num(repo, number);

    if let Some(v) = self.issue.borrow().get(&key).cloned() {
      return Ok(v);
    }
    let v = self.inner.get_issue(repo, number)?;
    self.issue.borrow_mut().insert(key, v.clone());

    Ok(v)
  }

  fn list_issue_comments(&self, repo: &str, number: i64) -> Result<Vec<Value>> {
    let key = Self::key_num(repo, number);

    if let Some(v) = self.comments.borrow().get(&key).cloned() {
      return Ok(v);
    }
    let v = self.inner.list_issue_comments(repo, number)?;
    self.comments.borrow_mut().insert(key, v.clone());

    Ok(v)
  }

  fn list_issue_events(&self, repo: &str, number: i64) -> Result<Vec<Value>> {
    let key = Self::key_num(repo, number);

    if let Some(v) = self.events.borrow().get(&key).cloned() {
      return Ok(v);
    }
    let v = self.inner.list_issue_events(repo, number)?;
    self.events.borrow_mut().insert(key, v.clone());

    Ok(v)
  }
}

struct GithubHttpApi {
  http: HttpClient,
  base: String,
  auth: String,
}

impl GithubHttpApi {
  fn new(http: HttpClient, base: String, token: &str) -> Self {
    Self {
      http,
      base: base.trim_end_matches('/').to_string(),
      auth: format!("Bearer {}", token),
    }
  }

  fn headers(&self) -> [(&str, &str); 2] {
    [("Accept", "application/vnd.github+json"), ("Authorization", self.auth.as_str())]
  }

  /// Follow `page=` until a short page comes back.
  fn get_all_pages(&self, path: &str) -> Result<Vec<Value>> {
    let mut out = Vec::new();

    for page in 1.. {
      let url = format!("{}{}?per_page={}&page={}", self.base, path, PER_PAGE, page);
      let v = self.http.get_json(&url, &self.headers())?;
      let items = v.fetch("").items();

      out.extend_from_slice(items);
      if items.len() < PER_PAGE {
        break;
      }
    }

    Ok(out)
  }
}

impl GithubApi for GithubHttpApi {
  fn search_issues(&self, query: &str, sort: &str, page: u32) -> Result<Value> {
    let url = format!(
      "{}/search/issues?q={}&sort={}&order=asc&per_page={}&page={}",
      self.base,
      urlencoding::encode(query),
      sort,
      PER_PAGE,
      page
    );
    self.http.get_json(&url, &self.headers())
  }

  fn is_merged(&self, repo: &str, number: i64) -> Result<bool> {
    let url = format!("{}/repos/{}/pulls/{}/merge", self.base, repo, number);

    match self.http.get_status(&url, &self.headers())? {
      204 => Ok(true),
      404 => Ok(false),
      code => bail!("{} returned unexpected HTTP {}", url, code),
    }
  }

  fn get_issue(&self, repo: &str, number: i64) -> Result<Value> {
    let url = format!("{}/repos/{}/issues/{}", self.base, repo, number);
    self.http.get_json(&url, &self.headers())
  }

  fn list_issue_comments(&self, repo: &str, number: i64) -> Result<Vec<Value>> {
    self.get_all_pages(&format!("/repos/{}/issues/{}/comments", repo, number))
  }

  fn list_issue_events(&self, repo: &str, number: i64) -> Result<Vec<Value>> {
    self.get_all_pages(&format!("/repos/{}/issues/{}/events", repo, number))
  }
}

const ENV_SEARCH: &str = "WS_TEST_GITHUB_SEARCH_JSON";
const ENV_MERGED: &str = "WS_TEST_GITHUB_MERGED";
const ENV_ISSUES: &str = "WS_TEST_GITHUB_ISSUES_JSON";
const ENV_COMMENTS: &str = "WS_TEST_GITHUB_COMMENTS_JSON";
const ENV_EVENTS: &str = "WS_TEST_GITHUB_EVENTS_JSON";

/// Fixture backend fed from `WS_TEST_GITHUB_*` variables.
///
/// - search: either one search result object (has `items`) or a map from query
///   substring to result object; the longest matching key wins. Items outside
///   the query's `updated:`/`created:` range are dropped. Pages past the first
///   are empty.
/// - merged: JSON array of `"owner/repo#N"` strings.
/// - issues/comments/events: maps keyed by `"owner/repo#N"`.
struct GithubEnvApi;

impl GithubEnvApi {
  fn read(var: &str) -> Result<Option<Value>> {
    match std::env::var(var) {
      Ok(s) => serde_json::from_str(&s).map(Some).with_context(|| format!("parsing {}", var)),
      Err(_) => Ok(None),
    }
  }

  /// The `<field>:<from>..<to>` qualifier, when both ends are timestamps.
  fn range(query: &str, field: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let prefix = format!("{}:", field);
    let (from, to) = query
      .split_whitespace()
      .find_map(|t| t.strip_prefix(prefix.as_str()))?
      .split_once("..")?;

    Some((parse_rfc3339(from)?, parse_rfc3339(to)?))
  }

  fn keyed(var: &str, repo: &str, number: i64) -> Result<Option<Value>> {
    let key = format!("{}#{}", repo, number);
    Ok(Self::read(var)?.and_then(|m| m.get(&key).cloned()))
  }
}

impl GithubApi for GithubEnvApi {
  fn search_issues(&self, query: &str, sort: &str, page: u32) -> Result<Value> {
    let empty = serde_json::json!({ "total_count": 0, "items": [] });
    let Some(fixture) = Self::read(ENV_SEARCH)? else {
      return Ok(empty);
    };

    let result = if fixture.get("items").is_some() {
      Some(fixture)
    } else {
      fixture.as_object().and_then(|m| {
        m.iter()
          .filter(|(k, _)| query.contains(k.as_str()))
          .max_by_key(|(k, _)| k.len())
          .map(|(_, v)| v.clone())
      })
    };

    let Some(mut v) = result else {
      return Ok(empty);
    };
    if let Some((from, to)) = Self::range(query, sort) {
      let key = format!("{}_at", sort);
      let kept: Vec<Value> = v
        .fetch("items")
        .items()
        .iter()
        .filter(|item| {
          item
            .fetch(&key)
            .str()
            .and_then(parse_rfc3339)
            .map(|t| from <= t && t <= to)
            .unwrap_or(true)
        })
        .cloned()
        .collect();
      v = serde_json::json!({ "total_count": kept.len(), "items": kept });
    }

    if page == 1 {
      Ok(v)
    } else {
      Ok(serde_json::json!({ "total_count": v.fetch("total_count").to_or_default::<u64>(), "items": [] }))
    }
  }

  fn is_merged(&self, repo: &str, number: i64) -> Result<bool> {
    let key = format!("{}#{}", repo, number);
    let merged = Self::read(ENV_MERGED)?;
    Ok(merged.map(|m| m.fetch("").items().iter().any(|v| v.as_str() == Some(key.as_str()))).unwrap_or(false))
  }

  fn get_issue(&self, repo: &str, number: i64) -> Result<Value> {
    Ok(Self::keyed(ENV_ISSUES, repo, number)?.unwrap_or(Value::Null))
  }

  fn list_issue_comments(&self, repo: &str, number: i64) -> Result<Vec<Value>> {
    Ok(Self::keyed(ENV_COMMENTS, repo, number)?.map(|v| v.fetch("").items().to_vec()).unwrap_or_default())
  }

  fn list_issue_events(&self, repo: &str, number: i64) -> Result<Vec<Value>> {
    Ok(Self::keyed(ENV_EVENTS, repo, number)?.map(|v| v.fetch("").items().to_vec()).unwrap_or_default())
  }
}

pub fn env_wants_mock() -> bool {
  [ENV_SEARCH, ENV_MERGED, ENV_ISSUES, ENV_COMMENTS, ENV_EVENTS]
    .iter()
    .any(|v| std::env::var(v).is_ok())
}

/// Pick the backend: env fixtures when present, otherwise HTTP with a token.
/// `GITHUB_API_URL` overrides the API host (as in GitHub Actions).
pub fn build_api(http: HttpClient) -> Result<Box<dyn GithubApi>> {
  let inner: Box<dyn GithubApi> = if env_wants_mock() {
    debug!("using GitHub env fixtures");
    Box::new(GithubEnvApi)
  } else {
    let Some(token) = get_github_token() else {
      bail!("GITHUB_TOKEN environment variable is not configured");
    };
    let base = std::env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    Box::new(GithubHttpApi::new(http, base, &token))
  };

  Ok(Box::new(GithubCachedApi::new(inner)))
}

/// Which timestamp the sliding search window moves along.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WindowField {
  Updated,
  Created,
}

impl WindowField {
  fn qualifier(self) -> &'static str {
    match self {
      WindowField::Updated => "updated",
      WindowField::Created => "created",
    }
  }

  fn json_key(self) -> &'static str {
    match self {
      WindowField::Updated => "updated_at",
      WindowField::Created => "created_at",
    }
  }
}

/// Run `base_query` over `[start, end]`, sliding the window forward every ten
/// pages so more than 1000 results can be collected. Items are unique by `html_url`.
pub fn search_all(
  api: &dyn GithubApi,
  base_query: &str,
  field: WindowField,
  start: DateTime<Utc>,
  end: DateTime<Utc>,
) -> Result<Vec<Value>> {
  let mut seen: HashSet<String> = HashSet::new();
  let mut out: Vec<Value> = Vec::new();
  let mut last = start;

  loop {
    let query = format!("{} {}:{}..{}", base_query, field.qualifier(), rfc3339(last), rfc3339(end));
    let mut current = 0usize;
    let mut most_recent = last;
    let mut progressed = false;

    for page in 1..=MAX_PAGES {
      let result = api
        .search_issues(&query, field.qualifier(), page)
        .with_context(|| format!("searching GitHub for {:?} (page {})", query, page))?;
      let items = result.fetch("items").items();
      let total = result.fetch("total_count").to::<usize>().unwrap_or(0);

      for item in items {
        let url = item.fetch("html_url").to_or_default::<String>();
        if !seen.insert(url) {
          continue;
        }
        progressed = true;
        if let Some(ts) = item.fetch(field.json_key()).str().and_then(parse_rfc3339) {
          most_recent = most_recent.max(ts);
        }
        out.push(item.clone());
      }

      current += items.len();
      if items.is_empty() || current >= total {
        return Ok(out);
      }
    }

    if !progressed {
      debug!(query = %query, "search window yielded nothing new; stopping");
      return Ok(out);
    }
    last = most_recent;
  }
}

/// `https://api.github.com/repos/owner/name` → `owner/name`.
pub fn repo_from_url(repository_url: &str) -> Option<String> {
  let (_, rest) = repository_url.split_once("/repos/")?;
  let mut parts = rest.splitn(3, '/');
  let owner = parts.next().filter(|s| !s.is_empty())?;
  let name = parts.next().filter(|s| !s.is_empty())?;

  Some(format!("{}/{}", owner, name))
}

/// Build an `Issue` from a search/issue JSON item. Comments start at zero and
/// `closed_by` at None; callers fill those in.
pub fn issue_from_json(item: &Value, repo: &str) -> Option<Issue> {
  let number = item.fetch("number").to::<i64>()?;
  let link = item.fetch("html_url").str()?.to_string();
  let date_opened = item.fetch("created_at").str().and_then(parse_rfc3339)?;

  let labels = item
    .fetch("labels")
    .items()
    .iter()
    .filter_map(|l| l.fetch("name").str().map(str::to_string))
    .collect();

  Some(Issue {
    number,
    link,
    repo: repo.to_string(),
    title: item.fetch("title").to_or_default(),
    opened_by: item.fetch("user.login").to_or_default(),
    closed_by: None,
    date_opened,
    date_closed: item.fetch("closed_at").str().and_then(parse_rfc3339),
    comments: 0,
    labels,
    milestone: item.fetch("milestone.title").to::<String>(),
    transferred: false,
  })
}

/// The issue now lives outside `repo`, or its events record a transfer.
pub fn was_transferred(api: &dyn GithubApi, repo: &str, issue: &Issue) -> Result<bool> {
  if !issue.link.contains(&format!("github.com/{}/", repo)) {
    return Ok(true);
  }
  let events = api.list_issue_events(repo, issue.number)?;

  Ok(events.iter().any(|e| e.fetch("event").str() == Some("transferred")))
}

/// Comments by `username` strictly inside the window.
pub fn count_user_comments(comments: &[Value], username: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
  comments
    .iter()
    .filter(|c| c.fetch("user.login").str() == Some(username))
    .filter(|c| {
      c.fetch("created_at")
        .str()
        .and_then(parse_rfc3339)
        .map(|t| in_scope(t, start, end))
        .unwrap_or(false)
    })
    .count()
}

#[derive(Debug, Clone)]
pub struct GithubQuery {
  pub username: String,
  pub start: DateTime<Utc>,
  pub end: DateTime<Utc>,
  /// Organisation whose repositories another source reports (e.g. `golang`).
  pub skip_org: Option<String>,
  /// Repositories under `skip_org` that are still reported here.
  pub keep_repos: Vec<String>,
}

impl GithubQuery {
  fn skips(&self, repo: &str) -> bool {
    let Some(org) = &self.skip_org else { return false };
    let owner = repo.split('/').next().unwrap_or_default();

    owner == org && !self.keep_repos.iter().any(|r| r == repo)
  }
}

/// Issues and pull requests `username` was involved in during the window.
pub fn issues_and_prs(api: &dyn GithubApi, q: &GithubQuery) -> Result<Activity> {
  let items = search_all(api, &format!("involves:{}", q.username), WindowField::Updated, q.start, q.end)?;
  info!(count = items.len(), user = %q.username, "GitHub search items");

  let mut activity = Activity::default();

  for item in &items {
    let Some(repo) = item.fetch("repository_url").str().and_then(repo_from_url) else {
      debug!(url = ?item.fetch("html_url").str(), "search item without repository_url");
      continue;
    };
    if q.skips(&repo) {
      continue;
    }

    let number = item.fetch("number").to::<i64>().unwrap_or(0);
    let closed = item.fetch("closed_by").is_present() || item.fetch("closed_at").is_present();

    if item.fetch("pull_request").is_present() {
      let mut status = ChangelistStatus::New;
      if closed {
        // Closed without merging (this includes PRs mirrored from Gerrit).
        if !api.is_merged(&repo, number)? {
          continue;
        }
        status = ChangelistStatus::Merged;
      }

      let cl = Changelist {
        number,
        link: item.fetch("html_url").to_or_default(),
        subject: item.fetch("title").to_or_default(),
        message: item.fetch("body").to_or_default(),
        comments: Vec::new(),
        branch: String::new(),
        author: item.fetch("user.login").to_or_default(),
        repo,
        status,
        merged_at: item.fetch("closed_at").str().and_then(parse_rfc3339),
        associated_issues: Vec::new(),
        affected_files: Vec::new(),
      };

      if cl.author == q.username {
        activity.authored.push(cl);
      } else {
        activity.reviewed.push(cl);
      }
      continue;
    }

    let Some(mut issue) = issue_from_json(item, &repo) else {
      continue;
    };

    let comments = api.list_issue_comments(&repo, number)?;
    issue.comments = count_user_comments(&comments, &q.username, q.start, q.end);

    if closed {
      issue.closed_by = match item.fetch("closed_by.login").str() {
        Some(login) => Some(login.to_string()),
        None => api.get_issue(&repo, number)?.fetch("closed_by.login").to::<String>(),
      };
    }
    activity.issues.push(issue);
  }

  activity.sort_by_link();

  Ok(activity)
}
