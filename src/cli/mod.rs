//! External collaborators: argument parsing via `clap`'s derive
//! API and the four subcommand front-ends. The core library never parses
//! arguments or touches stdio directly; everything here translates `clap`
//! input into calls against [`crate::volume`]/[`crate::dir`]/[`crate::file`]
//! and typed [`crate::error::FatImgError`]s back into process exit codes.

pub mod copy;
pub mod format;
pub mod list;
pub mod mkdir;

use clap::{Parser, Subcommand};

use crate::diagnostics::{DiagnosticSink, LogDiagnosticSink, Severity};

#[derive(Parser)]
#[command(name = "fatimg", version, about = "Offline FAT12/16/32 image toolkit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or overwrite a FAT filesystem image.
    Format(format::FormatArgs),
    /// Copy files between the host and an image.
    Copy(copy::CopyArgs),
    /// List directory entries inside an image.
    List(list::ListArgs),
    /// Create directories inside an image.
    Mkdir(mkdir::MkdirArgs),
}

/// Dispatches a parsed [`Cli`] and returns the process exit code (0 on
/// full success, 1 on any failure).
pub fn run(cli: Cli) -> i32 {
    let sink = LogDiagnosticSink;
    let result = match cli.command {
        Command::Format(args) => format::run(&args, &sink),
        Command::Copy(args) => copy::run(&args, &sink),
        Command::List(args) => list::run(&args),
        Command::Mkdir(args) => mkdir::run(&args),
    };
    match result {
        Ok(()) => 0,
        Err(err) => {
            sink.report(Severity::Error, "fatimg", &err.to_string());
            1
        }
    }
}
