// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Namespace for report outputs (CSV directory, Google Sheets)
// role: sinks/namespace
// outputs: Public submodules that consume table::Tables
// invariants: Sinks never reorder rows; empty tables are skipped
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

pub mod csv_dir;
pub mod sheets;
