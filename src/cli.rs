//! The `ciscfuck` command line surface (§6.3): two subcommands over the
//! same lifter/engine pair `main.rs` wires up to real stdin/stdout/files.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::error::ToolchainError;
use crate::lifter::LifterFlags;

#[derive(Debug, Parser)]
#[command(name = "ciscfuck", about = "A Brainfuck lifter and interpreter")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Lifts Brainfuck source read from stdin into IR JSON on stdout.
    Compile(CompileArgs),
    /// Executes one or more previously-compiled IR files, in order.
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct CompileArgs {
    /// Optimizer toggles, e.g. `--no-seekzero --all --no-xfrmultiple`,
    /// applied left to right. Parsed by hand in [`parse_optimizer_flags`]
    /// since clap's derive booleans can't tell "absent" from "given false".
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub flags: Vec<String>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// IR files (or, with `--raw`, Brainfuck source files) to execute in
    /// order.
    pub files: Vec<PathBuf>,

    /// Treat every file as raw Brainfuck source and lift it with every
    /// optimization enabled before running it.
    #[arg(long)]
    pub raw: bool,

    /// Overrides the default tape length.
    #[arg(long = "tape-size")]
    pub tape_size: Option<usize>,
}

/// An optimizer flag token didn't match any recognised feature or group
/// toggle.
#[derive(Debug, Error)]
#[error("unrecognised optimizer flag: {flag}")]
pub struct FlagError {
    pub flag: String,
}

impl ToolchainError for FlagError {}

/// Applies a sequence of `--<feature>` / `--no-<feature>` / `--all` /
/// `--none` tokens, left to right, starting from [`LifterFlags::all`] —
/// a bare `ciscfuck compile` runs every optimization.
pub fn parse_optimizer_flags(tokens: &[String]) -> Result<LifterFlags, FlagError> {
    let mut flags = LifterFlags::all();

    for token in tokens {
        match token.as_str() {
            "--all" => flags = LifterFlags::all(),
            "--none" => flags = LifterFlags::none(),
            "--deadcode" => flags.deadcode = true,
            "--no-deadcode" => flags.deadcode = false,
            "--seekzero" => flags.seekzero = true,
            "--no-seekzero" => flags.seekzero = false,
            "--pruneiflociszero" => flags.pruneiflociszero = true,
            "--no-pruneiflociszero" => flags.pruneiflociszero = false,
            "--xfrmultiple" => flags.xfrmultiple = true,
            "--no-xfrmultiple" => flags.xfrmultiple = false,
            "--superfluous" => flags.superfluous = true,
            "--no-superfluous" => flags.superfluous = false,
            other => return Err(FlagError { flag: other.to_string() }),
        }
    }

    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flags_defaults_to_all_optimizations() {
        let flags = parse_optimizer_flags(&[]).unwrap();
        assert_eq!(flags, LifterFlags::all());
    }

    #[test]
    fn none_then_reenable_one() {
        let tokens = vec!["--none".to_string(), "--deadcode".to_string()];
        let flags = parse_optimizer_flags(&tokens).unwrap();
        let mut expected = LifterFlags::none();
        expected.deadcode = true;
        assert_eq!(flags, expected);
    }

    #[test]
    fn all_then_disable_one() {
        let tokens = vec!["--all".to_string(), "--no-superfluous".to_string()];
        let flags = parse_optimizer_flags(&tokens).unwrap();
        let mut expected = LifterFlags::all();
        expected.superfluous = false;
        assert_eq!(flags, expected);
    }

    #[test]
    fn order_matters() {
        let tokens = vec!["--no-seekzero".to_string(), "--all".to_string()];
        let flags = parse_optimizer_flags(&tokens).unwrap();
        assert_eq!(flags, LifterFlags::all());
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let tokens = vec!["--not-a-real-flag".to_string()];
        let err = parse_optimizer_flags(&tokens).unwrap_err();
        assert_eq!(err.flag, "--not-a-real-flag");
    }
}
