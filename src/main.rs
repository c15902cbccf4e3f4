use anyhow::Result;
use clap::Parser;

mod cli;
mod error;
mod ext;
mod jira;
mod months;
mod report;
mod runner;
mod sharepoint;
mod upload;
mod util;
mod xlsx;

use crate::cli::{Cli, normalize};


fn main() -> Result<()> {
  let cli = Cli::parse();

  if cli.gen_man {
    let page = util::render_man_page::<Cli>()?;
    print!("{}", page);
    return Ok(());
  }

  util::init_logging();

  // Phase 1: normalize CLI
  let cfg = normalize(cli)?;
  tracing::debug!(config = %serde_json::to_string(&cfg)?, "effective configuration");

  // Phase 2: resolve now
  let now_opt = crate::months::parse_now_override(cfg.now_override.as_deref());

  // Phase 3: count, write, publish
  let summary = crate::runner::execute(&cfg, now_opt)?;
  println!("{}", serde_json::to_string_pretty(&summary)?);

  Ok(())
}
