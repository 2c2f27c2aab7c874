// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Changelists a user authored or reviewed on a Gerrit server during a window
// role: sources/gerrit
// inputs: user emails, window, Gerrit base URL; WS_TEST_GERRIT_CHANGES_JSON fixture
// outputs: model::Activity with authored and reviewed changelists (issues left empty)
// side_effects: Network calls to the Gerrit REST API (or corpus reads)
// invariants:
// - bot-owned changes (gobot, gerritbot) are never reported
// - abandoned changes are never reported
// - a reviewed change needs a message by the user strictly inside the window
// - owner IDs are collected from authored changes before reviewed changes are matched
// errors: API and decode failures propagate; conflicting owner IDs are logged, not fatal
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ext::serde_json::JsonFetch;
use crate::http::HttpClient;
use crate::model::{Activity, Changelist, ChangelistStatus};
use crate::util::in_scope;

pub const DEFAULT_GERRIT_URL: &str = "https://go-review.googlesource.com";

pub const GOBOT_ID: i64 = 5976;
pub const GERRITBOT_ID: i64 = 12446;

const PAGE_SIZE: usize = 100;
const XSSI_PREFIX: &str = ")]}'";
const QUERY_OPTIONS: &[&str] = &[
  "DETAILED_ACCOUNTS",
  "CURRENT_REVISION",
  "CURRENT_COMMIT",
  "CURRENT_FILES",
  "MESSAGES",
];
/// Files Gerrit synthesizes for every revision.
const MAGIC_FILES: &[&str] = &["/COMMIT_MSG", "/MERGE_LIST", "/PATCHSET_LEVEL"];

pub trait GerritApi {
  /// One page of `/changes/` results starting at offset `start`.
  fn query_changes(&self, query: &str, start: usize) -> Result<Vec<Value>>;
}

struct GerritHttpApi {
  http: HttpClient,
  base: String,
}

impl GerritApi for GerritHttpApi {
  fn query_changes(&self, query: &str, start: usize) -> Result<Vec<Value>> {
    let opts: String = QUERY_OPTIONS.iter().map(|o| format!("&o={}", o)).collect();
    let url = format!(
      "{}/changes/?q={}&n={}&S={}{}",
      self.base,
      urlencoding::encode(query),
      PAGE_SIZE,
      start,
      opts
    );
    let body = self.http.get_text(&url, &[("Accept", "application/json")])?;
    let v = parse_gerrit_json(&body).with_context(|| format!("decoding {}", url))?;

    Ok(v.fetch("").items().to_vec())
  }
}

/// Fixture backend: `WS_TEST_GERRIT_CHANGES_JSON` is either an array served for
/// every query or a map from query substring to array (longest key wins).
struct GerritEnvApi;

const ENV_CHANGES: &str = "WS_TEST_GERRIT_CHANGES_JSON";

impl GerritApi for GerritEnvApi {
  fn query_changes(&self, query: &str, start: usize) -> Result<Vec<Value>> {
    if start > 0 {
      return Ok(Vec::new());
    }
    let Ok(s) = std::env::var(ENV_CHANGES) else {
      return Ok(Vec::new());
    };
    let v: Value = serde_json::from_str(&s).with_context(|| format!("parsing {}", ENV_CHANGES))?;

    let changes = match v.as_object() {
      Some(map) => map
        .iter()
        .filter(|(k, _)| query.contains(k.as_str()))
        .max_by_key(|(k, _)| k.len())
        .map(|(_, v)| v.fetch("").items().to_vec())
        .unwrap_or_default(),
      None => v.fetch("").items().to_vec(),
    };

    Ok(changes)
  }
}

pub fn env_wants_mock() -> bool {
  std::env::var(ENV_CHANGES).is_ok()
}

pub fn build_api(http: HttpClient, base: &str) -> Box<dyn GerritApi> {
  if env_wants_mock() {
    debug!("using Gerrit env fixtures");
    return Box::new(GerritEnvApi);
  }
  Box::new(GerritHttpApi {
    http,
    base: base.trim_end_matches('/').to_string(),
  })
}

/// Gerrit prefixes JSON bodies with `)]}'` to defeat XSSI.
pub fn parse_gerrit_json(body: &str) -> Result<Value> {
  let trimmed = body.trim_start();
  let json = trimmed.strip_prefix(XSSI_PREFIX).unwrap_or(trimmed);
  Ok(serde_json::from_str(json)?)
}

/// Gerrit timestamps look like `2020-04-13 09:30:00.000000000` and are UTC.
pub fn parse_gerrit_time(s: &str) -> Option<DateTime<Utc>> {
  let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok()?;
  Some(Utc.from_utc_datetime(&naive))
}

fn gerrit_time(t: DateTime<Utc>) -> String {
  t.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Every page of a query, following `_more_changes` on the last entry.
pub fn query_all(api: &dyn GerritApi, query: &str) -> Result<Vec<Value>> {
  let mut out: Vec<Value> = Vec::new();

  loop {
    let page = api
      .query_changes(query, out.len())
      .with_context(|| format!("querying Gerrit for {:?}", query))?;
    let more = page
      .last()
      .map(|c| c.fetch("_more_changes").to::<bool>().unwrap_or(false))
      .unwrap_or(false);

    if page.is_empty() {
      break;
    }
    out.extend(page);
    if !more {
      break;
    }
  }

  Ok(out)
}

/// `"Gerrit User 1234"` → `Some(1234)`.
pub fn person_to_id(name: &str) -> Option<i64> {
  let rest = name.strip_prefix("Gerrit User ")?;
  if rest.contains(' ') {
    return None;
  }
  rest.parse().ok()
}

/// Owner account IDs are tracked per (project, branch, status).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerKey {
  pub project: String,
  pub branch: String,
  pub status: String,
}

impl OwnerKey {
  fn of(change: &Value) -> Self {
    Self {
      project: change.fetch("project").to_or_default(),
      branch: change.fetch("branch").to_or_default(),
      status: change.fetch("status").to_or_default::<String>().to_ascii_lowercase(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct GerritQuery {
  pub emails: Vec<String>,
  pub start: DateTime<Utc>,
  pub end: DateTime<Utc>,
  /// Host and path prefix used in links, without a scheme.
  pub link_host: String,
  /// Repository that bare `#N` issue references point at.
  pub tracker_repo: String,
}

fn owner_id(change: &Value) -> Option<i64> {
  change.fetch("owner._account_id").to::<i64>()
}

fn is_bot(change: &Value) -> bool {
  matches!(owner_id(change), Some(GOBOT_ID) | Some(GERRITBOT_ID))
}

fn is_abandoned(change: &Value) -> bool {
  ChangelistStatus::from_gerrit(change.fetch("status").str().unwrap_or_default()) == ChangelistStatus::Abandoned
}

fn is_cherry_pick(change: &Value) -> bool {
  current_revision(change)
    .and_then(|rev| rev.fetch("commit.message").str())
    .map(|m| m.lines().any(|l| l.starts_with("Reviewed-on:")))
    .unwrap_or(false)
}

fn current_revision(change: &Value) -> Option<&Value> {
  let sha = change.fetch("current_revision").str()?;
  change.get("revisions")?.get(sha)
}

/// Owner IDs of the user's own changes; conflicting IDs for one key are logged.
pub fn owner_ids(changes: &[Value], emails: &HashSet<&str>) -> BTreeMap<OwnerKey, i64> {
  let mut ids: BTreeMap<OwnerKey, i64> = BTreeMap::new();

  for change in changes {
    let Some(email) = change.fetch("owner.email").str() else { continue };
    if !emails.contains(email) || is_bot(change) || is_abandoned(change) {
      continue;
    }
    let Some(id) = owner_id(change) else { continue };
    let key = OwnerKey::of(change);

    match ids.get(&key).copied() {
      None => {
        ids.insert(key, id);
      }
      Some(have) if have != id => {
        if is_cherry_pick(change) {
          continue;
        }
        warn!(
          have,
          got = id,
          project = %key.project,
          branch = %key.branch,
          status = %key.status,
          "conflicting Gerrit owner IDs; ignoring the later one"
        );
      }
      Some(_) => {}
    }
  }

  ids
}

static RE_ISSUE_REF: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?:\b([A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+))?#(\d+)\b").unwrap());

/// Issue references from `Fixes`/`Updates` lines, as `owner/repo#N`.
pub fn associated_issues(message: &str, tracker_repo: &str) -> Vec<String> {
  let mut out: Vec<String> = Vec::new();

  for line in message.lines() {
    let trimmed = line.trim_start();
    let lower = trimmed.to_ascii_lowercase();
    if !(lower.starts_with("fixes") || lower.starts_with("updates")) {
      continue;
    }
    for cap in RE_ISSUE_REF.captures_iter(trimmed) {
      let repo = cap.get(1).map(|m| m.as_str()).unwrap_or(tracker_repo);
      let reference = format!("{}#{}", repo, &cap[2]);
      if !out.contains(&reference) {
        out.push(reference);
      }
    }
  }

  out
}

/// Convert one Gerrit `ChangeInfo` into a `Changelist`.
pub fn to_changelist(change: &Value, q: &GerritQuery) -> Changelist {
  let project: String = change.fetch("project").to_or_default();
  let number = change.fetch("_number").to::<i64>().unwrap_or(0);
  let status = ChangelistStatus::from_gerrit(change.fetch("status").str().unwrap_or_default());
  let revision = current_revision(change);

  let message: String = revision.map(|r| r.fetch("commit.message").to_or_default()).unwrap_or_default();

  let affected_files = revision
    .and_then(|r| r.fetch("files").to::<BTreeMap<String, Value>>())
    .map(|files| {
      files
        .into_keys()
        .filter(|f| !MAGIC_FILES.contains(&f.as_str()))
        .collect()
    })
    .unwrap_or_default();

  let comments = change
    .fetch("messages")
    .items()
    .iter()
    .filter_map(|m| m.fetch("message").str().map(str::to_string))
    .collect();

  let merged_at = if status == ChangelistStatus::Merged {
    change.fetch("submitted").str().and_then(parse_gerrit_time)
  } else {
    None
  };

  Changelist {
    number,
    link: format!("{}/c/{}/+/{}", q.link_host, project, number),
    subject: change.fetch("subject").to_or_default(),
    associated_issues: associated_issues(&message, &q.tracker_repo),
    message,
    comments,
    branch: change.fetch("branch").to_or_default(),
    author: change.fetch("owner.email").to_or_default(),
    repo: project,
    status,
    merged_at,
    affected_files,
  }
}

fn window_clause(q: &GerritQuery) -> String {
  format!(
    "-status:abandoned after:\"{}\" before:\"{}\"",
    gerrit_time(q.start),
    gerrit_time(q.end)
  )
}

fn updated_in_window(change: &Value, q: &GerritQuery) -> bool {
  change
    .fetch("updated")
    .str()
    .and_then(parse_gerrit_time)
    .map(|t| in_scope(t, q.start, q.end))
    .unwrap_or(false)
}

/// Whether some message inside the window was written by the user.
fn reviewed_by_user(change: &Value, q: &GerritQuery, emails: &HashSet<&str>, ids: &BTreeSet<i64>) -> bool {
  change.fetch("messages").items().iter().any(|msg| {
    let in_window = msg
      .fetch("date")
      .str()
      .and_then(parse_gerrit_time)
      .map(|t| in_scope(t, q.start, q.end))
      .unwrap_or(false);
    if !in_window || !msg.fetch("author").is_present() {
      return false;
    }

    if msg.fetch("author.email").str().map(|e| emails.contains(e)).unwrap_or(false) {
      return true;
    }
    let id = msg
      .fetch("author._account_id")
      .to::<i64>()
      .or_else(|| msg.fetch("author.name").str().and_then(person_to_id));

    id.map(|id| ids.contains(&id)).unwrap_or(false)
  })
}

/// Changelists authored and reviewed by any of `q.emails`.
pub fn changelists(api: &dyn GerritApi, q: &GerritQuery) -> Result<Activity> {
  let emails: HashSet<&str> = q.emails.iter().map(String::as_str).collect();
  let window = window_clause(q);

  let mut owned: Vec<Value> = Vec::new();
  for email in &q.emails {
    owned.extend(query_all(api, &format!("owner:{} {}", email, window))?);
  }

  let ids = owner_ids(&owned, &emails);
  let id_set: BTreeSet<i64> = ids.values().copied().collect();
  debug!(ids = ?id_set, "Gerrit owner IDs");

  let mut authored: HashMap<String, Changelist> = HashMap::new();
  for change in &owned {
    let Some(email) = change.fetch("owner.email").str() else { continue };
    if !emails.contains(email) || is_abandoned(change) || !updated_in_window(change, q) {
      continue;
    }
    let cl = to_changelist(change, q);
    authored.insert(cl.link.clone(), cl);
  }

  if id_set.is_empty() {
    warn!("no Gerrit owner IDs found (no authored changes); matching reviews by email only");
  }

  let mut reviewed: HashMap<String, Changelist> = HashMap::new();
  for email in &q.emails {
    for change in query_all(api, &format!("reviewer:{} -owner:{} {}", email, email, window))? {
      let owner_email = change.fetch("owner.email").str().unwrap_or_default();
      if emails.contains(owner_email) || is_bot(&change) || is_abandoned(&change) {
        continue;
      }
      if !reviewed_by_user(&change, q, &emails, &id_set) {
        continue;
      }
      let cl = to_changelist(&change, q);
      reviewed.insert(cl.link.clone(), cl);
    }
  }

  let mut activity = Activity {
    authored: authored.into_values().collect(),
    reviewed: reviewed.into_values().collect(),
    issues: Vec::new(),
  };
  activity.sort_by_link();
  info!(
    authored = activity.authored.len(),
    reviewed = activity.reviewed.len(),
    "Gerrit changelists"
  );

  Ok(activity)
}

/// `https://go-review.googlesource.com/` → `go-review.googlesource.com`.
pub fn link_host(base_url: &str) -> String {
  base_url
    .trim_start_matches("https://")
    .trim_start_matches("http://")
    .trim_end_matches('/')
    .to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use serial_test::serial;

  fn q() -> GerritQuery {
    GerritQuery {
      emails: vec!["me@golang.org".into()],
      start: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
      end: Utc.with_ymd_and_hms(2021, 12, 31, 0, 0, 0).unwrap(),
      link_host: "go-review.googlesource.com".into(),
      tracker_repo: "golang/go".into(),
    }
  }

  fn change(n: i64, project: &str, owner_id: i64, owner_email: &str, status: &str) -> Value {
    json!({
      "_number": n,
      "project": project,
      "branch": "master",
      "status": status,
      "subject": format!("{}: change {}", project, n),
      "updated": "2021-06-01 10:00:00.000000000",
      "submitted": "2021-06-02 11:30:00.000000000",
      "owner": { "_account_id": owner_id, "email": owner_email, "name": "Owner" },
      "current_revision": "abc",
      "revisions": {
        "abc": {
          "commit": { "message": format!("{}: change {}\n\nFixes #42\nUpdates golang/vscode-go#7\n\nChange-Id: I1\n", project, n) },
          "files": { "/COMMIT_MSG": {}, "src/goMain.ts": {}, "src/goplsSurvey.ts": {} }
        }
      },
      "messages": [
        { "author": { "_account_id": 16140, "name": "Gerrit User 16140" }, "date": "2021-06-01 09:00:00.000000000", "message": "Patch Set 1: Code-Review+2" }
      ]
    })
  }

  /// Returns owned changes for `owner:` queries and others for `reviewer:`.
  struct FakeGerrit {
    owned: Vec<Value>,
    reviewed: Vec<Value>,
  }

  impl GerritApi for FakeGerrit {
    fn query_changes(&self, query: &str, start: usize) -> Result<Vec<Value>> {
      if start > 0 {
        return Ok(Vec::new());
      }
      if query.starts_with("owner:") {
        Ok(self.owned.clone())
      } else {
        Ok(self.reviewed.clone())
      }
    }
  }

  #[test]
  fn strips_xssi_prefix() {
    let v = parse_gerrit_json(")]}'\n[{\"_number\":1}]").unwrap();
    assert_eq!(v.fetch("0._number").to::<i64>(), Some(1));
    assert!(parse_gerrit_json("[]").unwrap().as_array().is_some());
  }

  #[test]
  fn parses_gerrit_timestamps() {
    let t = parse_gerrit_time("2021-06-02 11:30:00.000000000").unwrap();
    assert_eq!(t, Utc.with_ymd_and_hms(2021, 6, 2, 11, 30, 0).unwrap());
    assert!(parse_gerrit_time("2021-06-02T11:30:00Z").is_none());
  }

  #[test]
  fn person_to_id_accepts_only_gerrit_user_names() {
    assert_eq!(person_to_id("Gerrit User 16140"), Some(16140));
    assert_eq!(person_to_id("Gerrit User"), None);
    assert_eq!(person_to_id("Gerrit User 1 2"), None);
    assert_eq!(person_to_id("Rebecca"), None);
  }

  #[test]
  fn associated_issues_from_footer_lines() {
    let msg = "x: y\n\nSee #1 for context.\nFixes #42\nUpdates golang/vscode-go#7, #42\n";
    assert_eq!(associated_issues(msg, "golang/go"), vec!["golang/go#42", "golang/vscode-go#7"]);
  }

  #[test]
  fn converts_change_info() {
    let cl = to_changelist(&change(352613, "vscode-go", 16140, "me@golang.org", "MERGED"), &q());
    assert_eq!(cl.link, "go-review.googlesource.com/c/vscode-go/+/352613");
    assert_eq!(cl.repo, "vscode-go");
    assert_eq!(cl.branch, "master");
    assert_eq!(cl.author, "me@golang.org");
    assert_eq!(cl.status, ChangelistStatus::Merged);
    assert_eq!(cl.merged_at, Some(Utc.with_ymd_and_hms(2021, 6, 2, 11, 30, 0).unwrap()));
    assert_eq!(cl.affected_files, vec!["src/goMain.ts", "src/goplsSurvey.ts"]);
    assert_eq!(cl.associated_issues, vec!["golang/go#42", "golang/vscode-go#7"]);
    assert_eq!(cl.comments.len(), 1);
    assert!(cl.message.contains("Change-Id"));
  }

  #[test]
  fn open_change_has_no_merge_time() {
    let cl = to_changelist(&change(1, "tools", 1, "me@golang.org", "NEW"), &q());
    assert_eq!(cl.status, ChangelistStatus::New);
    assert_eq!(cl.merged_at, None);
  }

  #[test]
  fn owner_ids_keep_first_and_skip_bots() {
    let emails: HashSet<&str> = ["me@golang.org"].into_iter().collect();
    let changes = vec![
      change(1, "tools", 16140, "me@golang.org", "MERGED"),
      change(2, "tools", 99999, "me@golang.org", "MERGED"),
      change(3, "go", GERRITBOT_ID, "me@golang.org", "MERGED"),
      change(4, "go", 5, "other@golang.org", "NEW"),
    ];
    let ids = owner_ids(&changes, &emails);
    assert_eq!(ids.len(), 1);
    assert_eq!(ids.values().copied().collect::<Vec<_>>(), vec![16140]);
  }

  #[test]
  fn changelists_split_authored_and_reviewed() {
    let mut not_mine = change(20, "tools", 777, "them@golang.org", "NEW");
    not_mine["messages"] = json!([
      { "author": { "_account_id": 16140, "name": "Gerrit User 16140" }, "date": "2021-07-01 00:00:00.000000000", "message": "LGTM" }
    ]);
    let mut stale = change(21, "tools", 777, "them@golang.org", "NEW");
    stale["messages"] = json!([
      { "author": { "_account_id": 16140 }, "date": "2020-07-01 00:00:00.000000000", "message": "old" }
    ]);
    let bot = change(22, "go", GOBOT_ID, "gobot@golang.org", "MERGED");
    let mut by_email = change(23, "net", 888, "them@golang.org", "MERGED");
    by_email["messages"] = json!([
      { "author": { "email": "me@golang.org" }, "date": "2021-03-01 00:00:00.000000000", "message": "nit" }
    ]);

    let api = FakeGerrit {
      owned: vec![
        change(10, "tools", 16140, "me@golang.org", "MERGED"),
        change(11, "tools", 16140, "me@golang.org", "ABANDONED"),
      ],
      reviewed: vec![not_mine, stale, bot, by_email],
    };

    let activity = changelists(&api, &q()).unwrap();
    let authored: Vec<i64> = activity.authored.iter().map(|c| c.number).collect();
    let reviewed: Vec<i64> = activity.reviewed.iter().map(|c| c.number).collect();
    assert_eq!(authored, vec![10]);
    assert_eq!(reviewed, vec![23, 20]);
  }

  #[test]
  fn query_all_follows_more_changes() {
    struct Paged;
    impl GerritApi for Paged {
      fn query_changes(&self, _query: &str, start: usize) -> Result<Vec<Value>> {
        Ok(match start {
          0 => vec![json!({ "_number": 1 }), json!({ "_number": 2, "_more_changes": true })],
          2 => vec![json!({ "_number": 3 })],
          _ => vec![json!({ "_number": 99 })],
        })
      }
    }
    let all = query_all(&Paged, "q").unwrap();
    assert_eq!(all.len(), 3);
  }

  #[test]
  fn link_host_drops_scheme_and_slash() {
    assert_eq!(link_host("https://go-review.googlesource.com/"), "go-review.googlesource.com");
  }

  #[test]
  #[serial]
  fn env_api_serves_longest_matching_key() {
    std::env::set_var(
      ENV_CHANGES,
      json!({ "owner:": [{ "_number": 1 }], "reviewer:": [{ "_number": 2 }, { "_number": 3 }] }).to_string(),
    );
    assert_eq!(GerritEnvApi.query_changes("owner:a", 0).unwrap().len(), 1);
    assert_eq!(GerritEnvApi.query_changes("reviewer:a -owner:a", 0).unwrap().len(), 2);
    assert!(GerritEnvApi.query_changes("reviewer:a", 100).unwrap().is_empty());
    std::env::remove_var(ENV_CHANGES);
  }
}
