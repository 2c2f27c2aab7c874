//! Weekly markdown snippet: merged, in-progress and reviewed changes plus a commented-issue count.

use std::fmt::Write as _;

use anyhow::Result;
use chrono::{DateTime, Local};
use tracing::info;

use crate::cli::SnippetsConfig;
use crate::model::{Activity, Changelist};
use crate::report::{collect, open_http};
use crate::util::us_date;
use crate::window::{infer_week, local_midnight, Window};

const RULE: &str = "----------------------------------------------\n";

fn section(out: &mut String, heading: &str, cls: &[&Changelist], line: impl Fn(&Changelist) -> String) {
  if cls.is_empty() {
    return;
  }
  out.push_str(heading);
  for cl in cls {
    out.push_str(&line(cl));
    out.push('\n');
  }
}

fn split_merged(cls: &[Changelist]) -> (Vec<&Changelist>, Vec<&Changelist>) {
  cls.iter().partition(|cl| cl.is_merged())
}

/// Gerrit links carry no scheme.
fn gerrit_line(cl: &Changelist) -> String {
  format!("* [CL {}](https://{}): {}", cl.number, cl.link, cl.subject)
}

fn github_line(pr: &Changelist) -> String {
  format!("* [{}#{}]({}): {}", pr.repo, pr.number, pr.link, pr.subject)
}

pub fn render(gerrit: Option<&Activity>, github: Option<&Activity>, tracker_repo: &str) -> String {
  let mut out = String::from(RULE);

  if let Some(a) = gerrit {
    let (merged, in_progress) = split_merged(&a.authored);
    let reviewed: Vec<&Changelist> = a.reviewed.iter().collect();

    section(&mut out, "## CLs Merged\n\n", &merged, gerrit_line);
    section(&mut out, "\n## CLs In Progress\n\n", &in_progress, gerrit_line);
    section(&mut out, "\n## CLs Reviewed\n\n", &reviewed, gerrit_line);
    if !a.issues.is_empty() {
      let _ = write!(out, "\n### Commented on {} {} issues\n\n", a.issues.len(), tracker_repo);
    }
  }

  if let Some(a) = github {
    let (merged, in_progress) = split_merged(&a.authored);
    let reviewed: Vec<&Changelist> = a.reviewed.iter().collect();

    section(&mut out, "## PRs Merged\n\n", &merged, github_line);
    section(&mut out, "\n## PRs In Progress\n\n", &in_progress, github_line);
    section(&mut out, "\n## PRs Reviewed\n\n", &reviewed, github_line);
    if !a.issues.is_empty() {
      let _ = write!(out, "\n### Commented on {} GitHub issues\n\n", a.issues.len());
    }
  }

  out
}

pub fn run(cfg: &SnippetsConfig, now: DateTime<Local>) -> Result<()> {
  let (start_day, end_day) = infer_week(now.date_naive(), cfg.week_of);
  let window = Window {
    start: local_midnight(start_day)?,
    end: local_midnight(end_day)?,
  };
  info!(
    start = %us_date(&window.start.with_timezone(&Local)),
    end = %us_date(&window.end.with_timezone(&Local)),
    "generating snippets for the week"
  );

  let http = open_http(&cfg.sources.corpus)?;
  let activity = collect(&cfg.sources, &window, &http)?;

  println!(
    "{}",
    render(activity.gerrit.as_ref(), activity.github.as_ref(), &cfg.sources.tracker_repo)
  );

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{ChangelistStatus, Issue};
  use chrono::{TimeZone, Utc};

  fn cl(n: i64, repo: &str, link: &str, status: ChangelistStatus) -> Changelist {
    Changelist {
      number: n,
      link: link.into(),
      subject: format!("{}: change {}", repo, n),
      message: String::new(),
      comments: Vec::new(),
      branch: "master".into(),
      author: "amy@golang.org".into(),
      repo: repo.into(),
      status,
      merged_at: None,
      associated_issues: Vec::new(),
      affected_files: Vec::new(),
    }
  }

  fn issue(n: i64) -> Issue {
    Issue {
      number: n,
      link: format!("https://github.com/golang/go/issues/{}", n),
      repo: "golang/go".into(),
      title: "x".into(),
      opened_by: String::new(),
      closed_by: None,
      date_opened: Utc.with_ymd_and_hms(2020, 4, 14, 0, 0, 0).unwrap(),
      date_closed: None,
      comments: 1,
      labels: Vec::new(),
      milestone: None,
      transferred: false,
    }
  }

  #[test]
  fn renders_both_sources() {
    let gerrit = Activity {
      authored: vec![
        cl(1, "tools", "go-review.googlesource.com/c/tools/+/1", ChangelistStatus::Merged),
        cl(2, "tools", "go-review.googlesource.com/c/tools/+/2", ChangelistStatus::New),
      ],
      reviewed: vec![cl(3, "net", "go-review.googlesource.com/c/net/+/3", ChangelistStatus::Merged)],
      issues: vec![issue(10), issue(11)],
    };
    let github = Activity {
      authored: vec![cl(
        4,
        "golang/vscode-go",
        "https://github.com/golang/vscode-go/pull/4",
        ChangelistStatus::New,
      )],
      ..Activity::default()
    };

    let md = render(Some(&gerrit), Some(&github), "golang/go");
    insta::assert_snapshot!(md.trim_end(), @r"
    ----------------------------------------------
    ## CLs Merged

    * [CL 1](https://go-review.googlesource.com/c/tools/+/1): tools: change 1

    ## CLs In Progress

    * [CL 2](https://go-review.googlesource.com/c/tools/+/2): tools: change 2

    ## CLs Reviewed

    * [CL 3](https://go-review.googlesource.com/c/net/+/3): net: change 3

    ### Commented on 2 golang/go issues


    ## PRs In Progress

    * [golang/vscode-go#4](https://github.com/golang/vscode-go/pull/4): golang/vscode-go: change 4
    ");
  }

  #[test]
  fn empty_activity_is_just_the_rule() {
    assert_eq!(render(Some(&Activity::default()), None, "golang/go"), RULE);
  }
}
