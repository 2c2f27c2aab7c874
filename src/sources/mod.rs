// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Namespace for activity sources (GitHub search, the issue tracker repo, Gerrit)
// role: sources/namespace
// outputs: Public submodules, each returning model::Activity or model::Issue lists
// invariants: Each source isolates its remote API behind a trait seam with an env-fixture backend
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

pub mod gerrit;
pub mod github;
pub mod tracker;
