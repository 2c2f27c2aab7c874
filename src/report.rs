// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Orchestrate the report command: fetch both sources, build named tables, write CSV and optionally Sheets
// role: processing/orchestrator
// inputs: ReportConfig (sources, window, sinks), effective now
// outputs: <out>/<table>.csv files; optional spreadsheet URL in the log
// side_effects: Creates the output directory; network calls via the sources and Sheets sink; reads stdin during OAuth
// invariants:
// - GitHub skips the mirrored org only when the Gerrit source is enabled
// - tracker issues are fetched only when a GitHub username is known
// - with --no-github, missing GitHub credentials skip tracker issues instead of failing
// - empty tables produce neither a CSV file nor a sheet
// errors: Propagates fetch and sink errors unchanged
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use tracing::{info, warn};

use crate::cli::{CorpusConfig, ReportConfig, SourcesConfig};
use crate::corpus::Corpus;
use crate::http::HttpClient;
use crate::model::Activity;
use crate::sinks::{csv_dir, sheets};
use crate::sources::gerrit::{self, GerritQuery};
use crate::sources::github::{self, GithubApi, GithubQuery};
use crate::sources::tracker;
use crate::table::{authored_changelists_to_rows, issues_to_rows, reviewed_changelists_to_rows, Tables};
use crate::util;
use crate::window::{self, Window};

/// What each enabled source reported.
#[derive(Debug, Default)]
pub struct SourceActivity {
  pub gerrit: Option<Activity>,
  pub github: Option<Activity>,
}

pub fn open_http(corpus: &CorpusConfig) -> Result<HttpClient> {
  let corpus = match &corpus.dir {
    Some(dir) => {
      info!(dir = %dir, refresh = corpus.refresh, "using corpus");
      Some(Corpus::open(dir, corpus.refresh)?)
    }
    None => None,
  };

  Ok(HttpClient::new(corpus))
}

/// Fetch activity from every enabled source.
pub fn collect(cfg: &SourcesConfig, window: &Window, http: &HttpClient) -> Result<SourceActivity> {
  // Without the GitHub source, a missing token only costs the tracker issues.
  let github_api: Option<Box<dyn GithubApi>> = if cfg.github {
    Some(github::build_api(http.clone())?)
  } else if cfg.gerrit && cfg.username.is_some() {
    match github::build_api(http.clone()) {
      Ok(api) => Some(api),
      Err(e) => {
        warn!(repo = %cfg.tracker_repo, error = %e, "no GitHub access; skipping tracker issues");
        None
      }
    }
  } else {
    None
  };

  let mut out = SourceActivity::default();

  if cfg.gerrit {
    let api = gerrit::build_api(http.clone(), &cfg.gerrit_url);
    let q = GerritQuery {
      emails: cfg.emails.clone(),
      start: window.start,
      end: window.end,
      link_host: gerrit::link_host(&cfg.gerrit_url),
      tracker_repo: cfg.tracker_repo.clone(),
    };
    let mut activity = gerrit::changelists(api.as_ref(), &q)?;

    match (&cfg.username, &github_api) {
      (Some(user), Some(gh)) => {
        activity.issues = tracker::tracker_issues(gh.as_ref(), &cfg.tracker_repo, user, window.start, window.end)?;
      }
      // Missing access was already logged.
      (Some(_), None) => {}
      (None, _) => warn!(repo = %cfg.tracker_repo, "no --username given; skipping tracker issues"),
    }

    info!(
      authored = activity.authored.len(),
      reviewed = activity.reviewed.len(),
      issues = activity.issues.len(),
      "Gerrit activity"
    );
    out.gerrit = Some(activity);
  }

  if cfg.github {
    if let (Some(gh), Some(user)) = (&github_api, &cfg.username) {
      let q = GithubQuery {
        username: user.clone(),
        start: window.start,
        end: window.end,
        skip_org: cfg.gerrit.then(|| cfg.mirrored_org.clone()),
        keep_repos: cfg.github_repos.clone(),
      };
      let activity = github::issues_and_prs(gh.as_ref(), &q)?;

      info!(
        authored = activity.authored.len(),
        reviewed = activity.reviewed.len(),
        issues = activity.issues.len(),
        "GitHub activity"
      );
      out.github = Some(activity);
    }
  }

  Ok(out)
}

/// Named tables for everything collected. Gerrit tables carry `gerrit_prefix`.
pub fn build_tables(username: &str, gerrit_prefix: &str, activity: &SourceActivity) -> Tables {
  let mut tables = Tables::new();

  if let Some(a) = &activity.gerrit {
    tables.insert(format!("{}-issues", gerrit_prefix), issues_to_rows(username, &a.issues));
    tables.insert(format!("{}-authored", gerrit_prefix), authored_changelists_to_rows(&a.authored));
    tables.insert(format!("{}-reviewed", gerrit_prefix), reviewed_changelists_to_rows(&a.reviewed));
  }
  if let Some(a) = &activity.github {
    tables.insert("github-issues".into(), issues_to_rows(username, &a.issues));
    tables.insert("github-prs-authored".into(), authored_changelists_to_rows(&a.authored));
    tables.insert("github-prs-reviewed".into(), reviewed_changelists_to_rows(&a.reviewed));
  }

  tables
}

/// Username, else the local part of the first email.
pub fn display_name(cfg: &SourcesConfig) -> String {
  if let Some(user) = &cfg.username {
    return user.clone();
  }
  cfg
    .emails
    .first()
    .map(|e| e.split('@').next().unwrap_or_default().to_string())
    .unwrap_or_default()
}

pub fn sheet_title(name: &str, now: DateTime<Local>) -> String {
  format!("{} (as of {})", name, util::us_date(&now))
}

fn publish_sheets(cfg: &ReportConfig, tables: &Tables, now: DateTime<Local>) -> Result<()> {
  let (Some(credentials), Some(token_path)) = (&cfg.credentials, &cfg.token) else {
    return Ok(());
  };

  // OAuth and Sheets calls never go through the corpus.
  let http = HttpClient::new(None);
  let secret = sheets::ClientSecret::load(Path::new(credentials))?;
  let stdin = std::io::stdin();
  let token = sheets::obtain_token(&http, &secret, Path::new(token_path), Utc::now(), &mut stdin.lock())?;

  let client = sheets::SheetsClient::new(http, sheets::SHEETS_API_URL, &token);
  let title = sheet_title(&display_name(&cfg.sources), now);
  sheets::publish(&client, &cfg.sheets, &title, tables)?;

  Ok(())
}

pub fn run(cfg: &ReportConfig, now: DateTime<Local>) -> Result<()> {
  let window = window::resolve(&cfg.window, now)?;
  info!(start = %util::rfc3339(window.start), end = %util::rfc3339(window.end), "report window");

  let http = open_http(&cfg.sources.corpus)?;
  let activity = collect(&cfg.sources, &window, &http)?;

  let username = cfg.sources.username.as_deref().unwrap_or_default();
  let tables = build_tables(username, &cfg.gerrit_prefix, &activity);

  let out_dir = util::prepare_out_dir(cfg.out.as_deref(), Some(now))?;
  let written = csv_dir::write_tables(Path::new(&out_dir), &tables)?;
  if written.is_empty() {
    info!(dir = %out_dir, "no activity in window; nothing written");
  }

  if cfg.sheets.is_enabled() {
    publish_sheets(cfg, &tables, now)?;
  }

  Ok(())
}
