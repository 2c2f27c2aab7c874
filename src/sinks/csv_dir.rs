//! CSV output: one `<name>.csv` per table in an output directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::WriterBuilder;
use tracing::info;

use crate::table::{Row, Tables};

/// Write `rows` to `path`. Rows have differing widths (summary rows carry
/// extra totals), so the writer is flexible.
pub fn write_table(path: &Path, rows: &[Row]) -> Result<()> {
  let mut writer = WriterBuilder::new()
    .flexible(true)
    .from_path(path)
    .with_context(|| format!("creating {}", path.display()))?;

  for row in rows {
    writer.write_record(row.texts())?;
  }
  writer.flush()?;

  Ok(())
}

/// Write every non-empty table to `<dir>/<name>.csv`, returning the paths in name order.
pub fn write_tables(dir: &Path, tables: &Tables) -> Result<Vec<PathBuf>> {
  let mut written = Vec::new();

  for (name, rows) in tables {
    if rows.is_empty() {
      continue;
    }
    let path = dir.join(format!("{}.csv", name));
    write_table(&path, rows)?;
    written.push(path);
  }

  for path in &written {
    info!(path = %path.display(), "wrote output");
  }

  Ok(written)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Changelist, ChangelistStatus};
  use crate::table::reviewed_changelists_to_rows;

  fn reviewed() -> Vec<Row> {
    reviewed_changelists_to_rows(&[Changelist {
      number: 7,
      link: "go-review.googlesource.com/c/net/+/7".into(),
      subject: "http2: fix, with a comma".into(),
      message: String::new(),
      comments: Vec::new(),
      branch: "master".into(),
      author: "amy@x".into(),
      repo: "net".into(),
      status: ChangelistStatus::Merged,
      merged_at: None,
      associated_issues: Vec::new(),
      affected_files: Vec::new(),
    }])
  }

  #[test]
  fn writes_ragged_rows_and_skips_empty_tables() {
    let td = tempfile::TempDir::new().unwrap();
    let mut tables = Tables::new();
    tables.insert("golang-reviewed".into(), reviewed());
    tables.insert("github-issues".into(), Vec::new());

    let written = write_tables(td.path(), &tables).unwrap();
    assert_eq!(written, vec![td.path().join("golang-reviewed.csv")]);
    assert!(!td.path().join("github-issues.csv").exists());

    let content = std::fs::read_to_string(&written[0]).unwrap();
    insta::assert_snapshot!(content.trim_end(), @r#"
    CL,Description
    go-review.googlesource.com/c/net/+/7,"http2: fix, with a comma",
    ,amy@x,1
    Total,,1
    "#);
  }
}
