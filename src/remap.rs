/*
sparsepad, to bloat and trim Android sparse images: remapping module
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

use std::{fs::{remove_file, File}, io::{self, BufReader, BufWriter, Read, Write},
    path::Path};

use indicatif::ProgressBar;
use tracing::{debug, info, trace, warn};

use crate::{pretty::human_readable, progress::progress_bar_chunks,
    sparse::{HeaderSizes, SparseError, SIZE_CHUNK_HEADER, SIZE_FILE_HEADER},
    walker::{SparseReader, SIZE_BUFFER}, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RemapReport {
    pub(crate) source: HeaderSizes,
    pub(crate) chunks: u32,
    pub(crate) bytes_read: u64,
    pub(crate) bytes_written: u64,
}

fn write_zeros<W: Write>(writer: &mut W, count: u16) -> Result<u64> {
    Ok(io::copy(&mut io::repeat(0).take(count.into()), writer)?)
}

/// Rewrites every header of the image in reader to the target sizes, the
/// payload is copied through untouched
pub(crate) fn remap_stream<R: Read, W: Write>(
    reader: R, writer: &mut W, target: HeaderSizes, bar: &ProgressBar
) -> Result<RemapReport>
{
    let mut walker = SparseReader::new(reader)?;
    let source = walker.sizes();
    let header = walker.header().with_sizes(target);
    debug!("Remapping headers {} => {}, discarding {}/{} padding bytes, \
        writing {}/{} zero bytes", source, target, source.file_extra(),
        source.chunk_extra(), target.file_extra(), target.chunk_extra());
    header.write_to(writer)?;
    let mut bytes_written = SIZE_FILE_HEADER as u64;
    bytes_written += write_zeros(writer, target.file_extra())?;
    bar.set_length(header.total_chunks.into());
    let mut buffer = vec![0; SIZE_BUFFER];
    while let Some(chunk) = walker.next_chunk()? {
        let rewritten = chunk.header.reframed(
            chunk.index, chunk.payload, target)?;
        trace!("Chunk #{}: total size {} => {}", chunk.index,
            chunk.header.total_sz, rewritten.total_sz);
        rewritten.write_to(writer)?;
        bytes_written += SIZE_CHUNK_HEADER as u64;
        bytes_written += write_zeros(writer, target.chunk_extra())?;
        bytes_written += walker.copy_payload(writer, &mut buffer)?;
        bar.inc(1);
    }
    let consumed = walker.consumed();
    let trailing = walker.trailing()?;
    if trailing > 0 {
        return Err(SparseError::TrailingData { consumed, trailing }.into())
    }
    Ok(RemapReport {
        source,
        chunks: header.total_chunks,
        bytes_read: consumed,
        bytes_written,
    })
}

fn check_not_same_file(in_path: &Path, out_path: &Path) -> Result<()> {
    if let (Ok(input), Ok(output)) =
        (in_path.canonicalize(), out_path.canonicalize())
    {
        if input == output {
            return Err(Error::SamePathError { path: input })
        }
    }
    Ok(())
}

fn remap_file(in_path: &Path, out_path: &Path, target: HeaderSizes,
    bar: &ProgressBar) -> Result<RemapReport>
{
    let input = File::open(in_path)
        .map_err(|e| Error::file_open(in_path, e))?;
    let output = File::create(out_path)
        .map_err(|e| Error::file_open(out_path, e))?;
    let mut writer = BufWriter::new(output);
    let report = remap_stream(
        BufReader::new(input), &mut writer, target, bar)?;
    writer.flush()?;
    Ok(report)
}

pub(crate) fn remap<P1, P2>(
    in_path: P1, out_path: P2, target: HeaderSizes, progress: bool
) -> Result<RemapReport>
where
    P1: AsRef<Path>,
    P2: AsRef<Path>
{
    let in_path = in_path.as_ref();
    let out_path = out_path.as_ref();
    check_not_same_file(in_path, out_path)?;
    info!("Remapping headers of '{}' to {} into '{}'",
        in_path.display(), target, out_path.display());
    let bar = progress_bar_chunks("Remapping chunks", progress)?;
    let result = remap_file(in_path, out_path, target, &bar);
    bar.finish_and_clear();
    match result {
        Ok(report) => {
            info!("Wrote {} chunks with headers {} => {}, {} => {} \
                ({} => {} bytes)", report.chunks, report.source, target,
                human_readable(report.bytes_read),
                human_readable(report.bytes_written),
                report.bytes_read, report.bytes_written);
            Ok(report)
        },
        Err(e) => {
            // Nothing was written if either file could not be opened
            if let Error::FileOpenError { .. } = e {
                return Err(e)
            }
            warn!("Removing incomplete output '{}'", out_path.display());
            if let Err(remove_error) = remove_file(out_path) {
                warn!("Failed to remove incomplete output '{}': {}",
                    out_path.display(), remove_error);
            }
            Err(e)
        },
    }
}

/// Pads both headers by 4 bytes, like the I9500 firmware expects
pub(crate) fn bloat<P1, P2>(in_path: P1, out_path: P2, progress: bool)
    -> Result<RemapReport>
where
    P1: AsRef<Path>,
    P2: AsRef<Path>
{
    remap(in_path, out_path, HeaderSizes::BLOATED, progress)
}

pub(crate) fn trim<P1, P2>(in_path: P1, out_path: P2, progress: bool)
    -> Result<RemapReport>
where
    P1: AsRef<Path>,
    P2: AsRef<Path>
{
    remap(in_path, out_path, HeaderSizes::CANONICAL, progress)
}
