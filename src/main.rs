/*
sparsepad, to bloat and trim Android sparse images
Copyright (C) 2024-present Guoxin "7Ji" Pu

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU Affero General Public License as
published by the Free Software Foundation, either version 3 of the
License, or (at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU Affero General Public License for more details.

You should have received a copy of the GNU Affero General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use std::{path::PathBuf, process::ExitCode};

use clap::{ArgAction, Parser};
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod error;
#[cfg(test)]
mod fixture;
mod inspect;
mod pretty;
mod progress;
mod remap;
mod sparse;
mod walker;

use error::{Error, Result};
use inspect::ListFormat;
use sparse::{HeaderSizes, SIZE_CHUNK_HEADER, SIZE_FILE_HEADER};

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
struct Action {
    /// List the file header and chunk table of an image
    #[arg(long, value_name = "INFILE")]
    list: Option<PathBuf>,

    /// Pad headers to 32-byte file and 16-byte chunk headers
    #[arg(long, num_args = 2, value_names = ["INFILE", "OUTFILE"],
        action = ArgAction::Set)]
    bloat: Option<Vec<PathBuf>>,

    /// Strip headers back to 28-byte file and 12-byte chunk headers
    #[arg(long, num_args = 2, value_names = ["INFILE", "OUTFILE"],
        action = ArgAction::Set)]
    trim: Option<Vec<PathBuf>>,

    /// Rewrite headers to --file-hdr-sz and --chunk-hdr-sz
    #[arg(long, num_args = 2, value_names = ["INFILE", "OUTFILE"],
        action = ArgAction::Set)]
    remap: Option<Vec<PathBuf>>,
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Arg {
    #[command(flatten)]
    action: Action,

    #[arg(short = 'f', long, value_enum, default_value_t, requires = "list")]
    /// Output format of --list
    format: ListFormat,

    #[arg(long, requires = "remap", default_value_t = SIZE_FILE_HEADER)]
    /// Target file header size for --remap
    file_hdr_sz: u16,

    #[arg(long, requires = "remap", default_value_t = SIZE_CHUNK_HEADER)]
    /// Target chunk header size for --remap
    chunk_hdr_sz: u16,

    #[arg(short = 'q', long)]
    /// No progress bar, only warnings and errors
    quiet: bool,

    #[arg(short = 'v', long, action = ArgAction::Count)]
    /// Log more, repeat for even more
    verbose: u8,
}

fn init_logging(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// Paths are guaranteed to come in pairs by num_args
fn in_out(paths: &[PathBuf]) -> (&PathBuf, &PathBuf) {
    (&paths[0], &paths[1])
}

fn run(arg: Arg) -> Result<()> {
    let progress = ! arg.quiet;
    let action = arg.action;
    if let Some(image) = action.list {
        inspect::inspect(image, arg.format).map(|_| ())
    } else if let Some(paths) = action.bloat {
        let (image, out) = in_out(&paths);
        remap::bloat(image, out, progress).map(|_| ())
    } else if let Some(paths) = action.trim {
        let (image, out) = in_out(&paths);
        remap::trim(image, out, progress).map(|_| ())
    } else if let Some(paths) = action.remap {
        let (image, out) = in_out(&paths);
        let target = HeaderSizes::try_new(arg.file_hdr_sz, arg.chunk_hdr_sz)?;
        remap::remap(image, out, target, progress).map(|_| ())
    } else {
        unreachable!("clap requires exactly one action")
    }
}

fn main() -> ExitCode {
    let arg = match Arg::try_parse() {
        Ok(arg) => arg,
        Err(e) => {
            // Nowhere left to report a failed write of the usage
            e.print().ok();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    };
    init_logging(arg.quiet, arg.verbose);
    match run(arg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
