// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::core::error::{AsmError, AsmErrorKind};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "Assembler for a register-based VM.

Compiles one assembly input into a binary bytecode module (.pfbm). The input
is a file path, or stdin when the path is '-' or omitted. The output path
defaults to the input base name with a .pfbm extension; stdin input needs an
explicit -o/--outfile unless --dump is given.";

#[derive(Parser, Debug)]
#[command(
    name = "protoforge",
    version = VERSION,
    about = "Register-VM assembler producing prototype-tree bytecode modules",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(
        value_name = "INPUT",
        long_help = "Input assembly file. '-' or omitted reads from stdin."
    )]
    pub input: Option<PathBuf>,
    #[arg(
        short = 'o',
        long = "outfile",
        value_name = "FILE",
        long_help = "Write the module to FILE instead of the derived default name."
    )]
    pub outfile: Option<PathBuf>,
    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Select diagnostic output format. text renders source context with a caret; json emits one machine-readable object per diagnostic."
    )]
    pub format: OutputFormat,
    #[arg(
        long = "dump",
        action = ArgAction::SetTrue,
        long_help = "Print a JSON summary of the compiled module to stdout instead of writing a module file."
    )]
    pub dump: bool,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        long_help = "Suppress the success summary line. Errors are still reported."
    )]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Validated run configuration derived from raw arguments.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Input path; `None` means stdin.
    pub input: Option<PathBuf>,
    /// Module output path; `None` only when `--dump` skips the write.
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    pub dump: bool,
    pub quiet: bool,
}

pub fn validate_cli(cli: &Cli) -> Result<CliConfig, AsmError> {
    let input = match &cli.input {
        Some(path) if path.as_os_str() != "-" => Some(path.clone()),
        _ => None,
    };

    let output = match (&cli.outfile, &input) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(input)) => Some(input.with_extension("pfbm")),
        (None, None) => None,
    };

    if output.is_none() && !cli.dump {
        return Err(AsmError::new(
            AsmErrorKind::Cli,
            "stdin input requires -o/--outfile (or --dump)",
        ));
    }

    Ok(CliConfig {
        input,
        output,
        format: cli.format,
        dump: cli.dump,
        quiet: cli.quiet,
    })
}
