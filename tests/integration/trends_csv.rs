use std::fs;

use predicates::prelude::*;
use serde_json::Value;
use test_support::{cmd_bin, fixture_env, read_fixture_json, tempdir};

#[test]
fn trends_writes_daily_counts() {
  let td = tempdir();
  cmd_bin("work-stats")
    .env("TZ", "UTC")
    .envs(fixture_env())
    .args([
      "trends",
      "--repo",
      "golang/vscode-go",
      "--since",
      "2020-03-01",
      "--until",
      "2020-03-04",
      "--out",
      td.path().to_str().unwrap(),
    ])
    .assert()
    .success()
    .stderr(predicate::str::contains("transferred=1"));

  let csv = fs::read_to_string(td.path().join("vscode-go-trend.csv")).unwrap();
  insta::assert_snapshot!(csv.trim_end(), @r"
  Date,Feature requests,Other issues
  2020-03-01,0,1
  2020-03-02,1,1
  2020-03-03,1,0
  2020-03-04,1,0
  ");

  // golang/vscode-go#42 moved to another repository, so it never shows up above.
  let search: Value = read_fixture_json("github_search.json");
  assert_eq!(search["repo:golang/vscode-go is:issue is:open"]["total_count"], 1);
  assert_eq!(search["repo:golang/vscode-go is:issue is:closed"]["items"][1]["number"], 42);
}
