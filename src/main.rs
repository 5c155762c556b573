mod cli;
mod engine;
mod error;
mod export;
mod logging;
mod model;
mod orchestrator;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = !args.is_interactive();

    if let Err(e) = logging::init(
        args.is_interactive(),
        args.log_level.as_deref(),
        args.log_file.as_deref(),
    ) {
        eprintln!("warning: logging disabled: {e:#}");
    }

    cli::run(args).await?;
    // Exit explicitly so lingering blocking reads don't hold non-TUI runs open.
    if is_non_tui {
        std::process::exit(0);
    }
    Ok(())
}
