//! Command implementations for campus-market.

mod sync;

pub use sync::sync;

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::args::Cli;
use crate::error::MarketError;

/// Generate shell completions for the specified shell.
///
/// # Errors
///
/// Returns `MarketError::Parse` if the generated script is not UTF-8.
pub fn completions(shell: Shell) -> Result<String, MarketError> {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, "campus-market", &mut buf);
    String::from_utf8(buf).map_err(|e| MarketError::Parse(format!("UTF-8 error: {e}")))
}
