// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Utilities for paths, timestamps, window checks, text truncation and man page rendering
// role: utilities/helpers
// inputs: Various primitives; DateTime; paths; clap CommandFactory
// outputs: Canonicalized paths, parsed timestamps, prepared output directories, man page text
// side_effects: prepare_out_dir creates directories
// invariants:
// - prepare_out_dir returns an existing directory (either provided or temp timestamped)
// - truncate never splits UTF-8
// - in_scope is exclusive at both ends
// errors: IO errors bubble with context
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::CommandFactory;

/// Longest description kept in a table cell.
pub const MAX_DESCRIPTION_CHARS: usize = 80;

pub fn canonicalize_lossy<P: AsRef<Path>>(p: P) -> String {
  let p = p.as_ref();
  let pb: PathBuf = match std::fs::canonicalize(p) {
    Ok(x) => x,
    Err(_) => match std::env::current_dir() {
      Ok(cwd) => cwd.join(p),
      Err(_) => PathBuf::from(p),
    },
  };
  pb.to_string_lossy().to_string()
}

/// Returns the effective "now" given an optional override.
pub fn effective_now(override_now: Option<DateTime<Local>>) -> DateTime<Local> {
  override_now.unwrap_or_else(Local::now)
}

/// Prepare the CSV output directory.
///
/// - `Some(dir)` is created if needed and returned as given.
/// - `None` creates `work-stats-<timestamp>` under the system temp dir.
pub fn prepare_out_dir(out: Option<&str>, now_opt: Option<DateTime<Local>>) -> Result<String> {
  let dir = match out {
    Some(d) => d.to_string(),
    None => {
      let eff_now = effective_now(now_opt);
      std::env::temp_dir()
        .join(format!("work-stats-{}", eff_now.format("%Y%m%d-%H%M%S")))
        .to_string_lossy()
        .to_string()
    }
  };
  std::fs::create_dir_all(&dir).with_context(|| format!("creating output dir {}", dir))?;

  Ok(dir)
}

/// Render a section-1 man page for a clap `CommandFactory` implementor.
pub fn render_man_page<T: CommandFactory>() -> Result<String> {
  let cmd = T::command();
  let man = clap_mangen::Man::new(cmd);
  let mut buf: Vec<u8> = Vec::new();

  man.render(&mut buf)?;

  Ok(String::from_utf8_lossy(&buf).to_string())
}

/// Clip to `MAX_DESCRIPTION_CHARS` characters.
pub fn truncate(text: &str) -> String {
  text.chars().take(MAX_DESCRIPTION_CHARS).collect()
}

/// Strictly after `start` and strictly before `end`.
pub fn in_scope(t: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
  t > start && t < end
}

/// Parse an RFC3339 timestamp (GitHub style) into UTC.
pub fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

/// RFC3339 with second precision and a `Z` suffix, as GitHub search expects.
pub fn rfc3339(t: DateTime<Utc>) -> String {
  t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// `MM-DD-YYYY`, used in spreadsheet titles and log lines.
pub fn us_date<Tz: chrono::TimeZone>(t: &DateTime<Tz>) -> String
where
  Tz::Offset: std::fmt::Display,
{
  t.format("%m-%d-%Y").to_string()
}
