//! Text/JSON result emission shared by the subcommands.

use anyhow::Result;
use serde::Serialize;

use crate::{Cli, OutputFormat};

/// Emit a command result: JSON when requested, otherwise the provided
/// text renderer. Quiet mode suppresses text but not JSON (scripts still
/// need their output).
pub fn emit<T: Serialize>(cli: &Cli, result: &T, text: impl FnOnce()) -> Result<()> {
    match cli.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                text();
            }
        }
    }
    Ok(())
}
