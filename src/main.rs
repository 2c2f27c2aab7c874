use anyhow::Result;
use clap::Parser;

mod cli;
mod corpus;
mod ext;
mod http;
mod logging;
mod model;
mod report;
mod sinks;
mod snippets;
mod sources;
mod table;
mod trends;
mod util;
mod window;

use crate::cli::{normalize, Cli, CommandConfig};

fn main() -> Result<()> {
  let cli = Cli::parse();

  if cli.gen_man {
    let page = util::render_man_page::<Cli>()?;
    print!("{}", page);
    return Ok(());
  }

  logging::init(cli.verbose)?;

  // Phase 1: normalize CLI
  let cfg = normalize(cli)?;

  // Phase 2: resolve now
  let now = util::effective_now(window::parse_now_override(cfg.now_override.as_deref()));

  // Phase 3: run the command
  match &cfg.command {
    CommandConfig::Report(c) => report::run(c, now),
    CommandConfig::Snippets(c) => snippets::run(c, now),
    CommandConfig::Trends(c) => trends::run(c, now),
  }
}
