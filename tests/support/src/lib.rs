//! test-support: helpers for robust, nextest-friendly tests.
//!
//! Add as a dev-dependency in your top-level `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test_support = { path = "tests/support", features = ["serde"] }
//! ```
//!
//! Then in tests:
//! ```rust,no_run
//! use test_support::{cmd_bin, fixture_env};
//!
//! let mut cmd = cmd_bin("work-stats");
//! cmd.envs(fixture_env()).args(["snippets", "--username", "amy", "--email", "amy@golang.org"]);
//! ```

use once_cell::sync::Lazy;
use tracing_subscriber::{fmt, EnvFilter};

use std::path::{Path, PathBuf};

/// Initialize `tracing` once, honoring `RUST_LOG` and writing via the test writer.
///
/// Safe to call from multiple tests; only the first call configures the global subscriber.
pub fn init_tracing() {
  static INIT: Lazy<()> = Lazy::new(|| {
    let filter = EnvFilter::try_from_default_env()
      .or_else(|_| EnvFilter::try_new("warn,test=info"))
      .unwrap();
    // with_test_writer() causes logs to appear alongside failing tests only (cargo/nextest)
    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
  });
  Lazy::force(&INIT);
}

/// Return the path to the repository's `tests/fixtures` directory.
///
/// `CARGO_MANIFEST_DIR` here is `tests/support`, so step up once.
pub fn fixtures_dir() -> PathBuf {
  let support = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
  support
    .parent()
    .map(|tests| tests.join("fixtures"))
    .unwrap_or_else(|| support.join("fixtures"))
}

/// Read a UTF-8 text fixture into a string.
pub fn read_fixture_text<P: AsRef<Path>>(rel_path: P) -> String {
  let path = fixtures_dir().join(rel_path);
  std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
}

/// Deserialize a JSON fixture into `T` (enable `serde` feature).
#[cfg(feature = "serde")]
pub fn read_fixture_json<T, P>(rel_path: P) -> T
where
  T: serde::de::DeserializeOwned,
  P: AsRef<Path>,
{
  let path = fixtures_dir().join(rel_path);
  let file = std::fs::File::open(&path).unwrap_or_else(|e| panic!("failed to open fixture {}: {e}", path.display()));
  serde_json::from_reader::<_, T>(file).unwrap_or_else(|e| panic!("failed to parse JSON fixture {}: {e}", path.display()))
}

/// `WS_TEST_*` variables pointing every API backend at the JSON fixtures.
pub fn fixture_env() -> Vec<(&'static str, String)> {
  vec![
    ("WS_TEST_GERRIT_CHANGES_JSON", read_fixture_text("gerrit_changes.json")),
    ("WS_TEST_GITHUB_SEARCH_JSON", read_fixture_text("github_search.json")),
    ("WS_TEST_GITHUB_MERGED", read_fixture_text("github_merged.json")),
    ("WS_TEST_GITHUB_COMMENTS_JSON", read_fixture_text("github_comments.json")),
    ("WS_TEST_GITHUB_EVENTS_JSON", read_fixture_text("github_events.json")),
  ]
}

/// Create a temp directory that deletes on drop.
pub fn tempdir() -> tempfile::TempDir {
  tempfile::tempdir().expect("create tempdir")
}

/// Run a binary target with `assert_cmd`, returning the ready-to-run `Command`.
///
/// Credentials and corpus settings from the developer's shell are removed so
/// runs only ever see fixtures.
pub fn cmd_bin(bin: &str) -> assert_cmd::Command {
  init_tracing();
  let mut cmd = assert_cmd::Command::cargo_bin(bin).expect("binary target not found");
  for var in ["GITHUB_TOKEN", "GH_TOKEN", "GITHUB_API_URL", "WORK_STATS_CORPUS", "RUST_LOG"] {
    cmd.env_remove(var);
  }
  cmd
}
