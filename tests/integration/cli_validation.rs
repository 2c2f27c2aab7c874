use predicates::prelude::*;
use test_support::cmd_bin;

#[test]
fn report_requires_username_for_github() {
  cmd_bin("work-stats")
    .args(["--email", "amy@golang.org"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("--username is required"));
}

#[test]
fn report_rejects_ambiguous_windows() {
  cmd_bin("work-stats")
    .args(["report", "--username", "amy", "--no-gerrit", "--month", "2020-04", "--since", "2020-04-01"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Ambiguous time selection"));
}

#[test]
fn report_rejects_inverted_window() {
  cmd_bin("work-stats")
    .envs(test_support::fixture_env())
    .args(["--username", "amy", "--no-gerrit", "--since", "2020-05-01", "--until", "2020-04-01"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("is not before end"));
}

#[test]
fn sheets_requires_token() {
  cmd_bin("work-stats")
    .args(["--username", "amy", "--no-gerrit", "--sheets", "new", "--credentials", "c.json"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("--token is required with --sheets"));
}

#[test]
fn trends_requires_an_explicit_window() {
  cmd_bin("work-stats")
    .args(["trends", "--repo", "golang/vscode-go"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Provide one of --month, --for, or --since"));
}

#[test]
fn help_lists_subcommands() {
  cmd_bin("work-stats")
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("snippets").and(predicate::str::contains("trends")));
}
