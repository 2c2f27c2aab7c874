use std::fs;

use predicates::prelude::*;
use test_support::{cmd_bin, fixture_env, tempdir};

fn run_report(out: &std::path::Path, extra: &[&str]) -> assert_cmd::assert::Assert {
  let out = out.to_str().unwrap();
  let mut args = vec![
    "report",
    "--username",
    "amy",
    "--email",
    "amy@golang.org",
    "--since",
    "2020-04-01",
    "--until",
    "2020-05-01",
    "--out",
    out,
  ];
  args.extend_from_slice(extra);

  cmd_bin("work-stats").env("TZ", "UTC").envs(fixture_env()).args(args).assert()
}

#[test]
fn writes_one_csv_per_non_empty_table() {
  let td = tempdir();
  run_report(td.path(), &[])
    .success()
    .stderr(predicate::str::contains("wrote output"));

  let mut names: Vec<String> = fs::read_dir(td.path())
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
    .collect();
  names.sort();
  assert_eq!(
    names,
    vec![
      "github-issues.csv",
      "github-prs-authored.csv",
      "golang-authored.csv",
      "golang-issues.csv",
      "golang-reviewed.csv",
    ]
  );

  let authored = fs::read_to_string(td.path().join("golang-authored.csv")).unwrap();
  assert!(authored.starts_with("CL,Description"));
  assert!(authored.contains("go-review.googlesource.com/c/tools/+/101"));
  assert!(authored.contains("go-review.googlesource.com/c/tools/+/102"));

  let reviewed = fs::read_to_string(td.path().join("golang-reviewed.csv")).unwrap();
  assert!(reviewed.contains("go-review.googlesource.com/c/net/+/201"));
  assert!(reviewed.contains("bob@golang.org"));

  let issues = fs::read_to_string(td.path().join("golang-issues.csv")).unwrap();
  assert!(issues.contains("https://github.com/golang/go/issues/500"));
  assert!(issues.contains(",false,true,1"));

  // golang/tools is left to Gerrit; vscode-go is kept.
  let prs = fs::read_to_string(td.path().join("github-prs-authored.csv")).unwrap();
  assert!(prs.contains("https://github.com/golang/vscode-go/pull/9"));
  assert!(!prs.contains("golang/tools"));
}

#[test]
fn github_only_keeps_mirrored_repositories() {
  let td = tempdir();
  run_report(td.path(), &["--no-gerrit", "--gerrit-prefix", "go"]).success();

  assert!(!td.path().join("go-authored.csv").exists());
  let prs = fs::read_to_string(td.path().join("github-prs-authored.csv")).unwrap();
  assert!(prs.contains("https://github.com/golang/tools/pull/3"));
  assert!(prs.contains("https://github.com/golang/vscode-go/pull/9"));
}

#[test]
fn gerrit_prefix_renames_tables() {
  let td = tempdir();
  run_report(td.path(), &["--no-github", "--gerrit-prefix", "go"]).success();

  assert!(td.path().join("go-authored.csv").exists());
  assert!(td.path().join("go-issues.csv").exists());
  assert!(!td.path().join("github-issues.csv").exists());
}

#[test]
fn corpus_dir_is_created_when_requested() {
  let td = tempdir();
  let corpus = td.path().join("corpus");
  let out = td.path().join("out");
  run_report(&out, &["--corpus-dir", corpus.to_str().unwrap()]).success();
  assert!(corpus.is_dir());
}

#[test]
fn gerrit_only_without_github_credentials_skips_tracker_issues() {
  let td = tempdir();
  let no_tools = tempdir();
  let gerrit_only: Vec<(&str, String)> = fixture_env()
    .into_iter()
    .filter(|(k, _)| k.starts_with("WS_TEST_GERRIT"))
    .collect();

  cmd_bin("work-stats")
    .env("TZ", "UTC")
    // No `gh` to fall back on.
    .env("PATH", no_tools.path())
    .envs(gerrit_only)
    .args([
      "report",
      "--no-github",
      "--username",
      "amy",
      "--email",
      "amy@golang.org",
      "--since",
      "2020-04-01",
      "--until",
      "2020-05-01",
      "--out",
      td.path().to_str().unwrap(),
    ])
    .assert()
    .success()
    .stderr(predicate::str::contains("skipping tracker issues"));

  assert!(td.path().join("golang-authored.csv").exists());
  assert!(!td.path().join("golang-issues.csv").exists());
}
