// Driver for integration + snapshot tests under tests/integration/
// Keeps tests organized in a subdirectory while remaining visible to Cargo.
//
#[path = "integration/cli_gen_man.rs"]
mod cli_gen_man;
#[path = "integration/cli_validation.rs"]
mod cli_validation;
#[path = "integration/report_end_to_end.rs"]
mod report_end_to_end;
#[path = "integration/trends_csv.rs"]
mod trends_csv;

// snapshots
#[path = "integration/snippets_snapshot.rs"]
mod snippets_snapshot;
