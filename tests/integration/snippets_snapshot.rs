use test_support::{cmd_bin, fixture_env};

#[test]
fn snippets_for_a_thursday_cover_the_current_week() {
  let out = cmd_bin("work-stats")
    .env("TZ", "UTC")
    .envs(fixture_env())
    .args([
      "snippets",
      "--username",
      "amy",
      "--email",
      "amy@golang.org",
      "--now-override",
      "2020-04-16T12:00:00",
    ])
    .output()
    .unwrap();

  assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
  let stdout = String::from_utf8_lossy(&out.stdout);
  insta::assert_snapshot!(stdout.trim_end(), @r"
  ----------------------------------------------
  ## CLs Merged

  * [CL 101](https://go-review.googlesource.com/c/tools/+/101): gopls: fix hover for embedded fields

  ## CLs In Progress

  * [CL 102](https://go-review.googlesource.com/c/tools/+/102): gopls: add workspace symbols

  ## CLs Reviewed

  * [CL 201](https://go-review.googlesource.com/c/net/+/201): http2: close idle connections

  ### Commented on 1 golang/go issues

  ## PRs Merged

  * [golang/vscode-go#9](https://github.com/golang/vscode-go/pull/9): debug: support remote attach

  ### Commented on 1 GitHub issues
  ");
}

#[test]
fn snippets_week_of_outside_activity_is_empty() {
  let out = cmd_bin("work-stats")
    .env("TZ", "UTC")
    .envs(fixture_env())
    .args([
      "snippets",
      "--username",
      "amy",
      "--email",
      "amy@golang.org",
      "--week-of",
      "2019-01-02",
    ])
    .output()
    .unwrap();

  assert!(out.status.success());
  assert_eq!(String::from_utf8_lossy(&out.stdout).trim_end(), "----------------------------------------------");
}
