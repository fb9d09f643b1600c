/*
sparsepad, to bloat and trim Android sparse images: inspection module
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

use std::{fs::File, io::{BufReader, Read, Seek, Write}, path::Path};

use cli_table::{format::Justify, Cell, CellStruct, Style, Table};
use serde::Serialize;
use tracing::{info, warn};

use crate::{pretty::{hex_bytes, human_readable},
    sparse::{ChunkHeader, ChunkType, FileHeader, SPARSE_HEADER_MAGIC},
    walker::{Chunk, SparseReader}, Error, Result};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ListFormat {
    /// One line per field and per chunk
    #[default]
    Plain,
    /// Header fields, then chunks as a table
    Table,
    /// A YAML document
    Yaml,
}

#[derive(Serialize)]
struct HeaderEntry<'a> {
    #[serde(flatten)]
    header: &'a FileHeader,
    file_hdr_sz_extra: u16,
    chunk_hdr_sz_extra: u16,
    #[serde(with = "hex::serde")]
    extra_bytes: &'a [u8],
}

#[derive(Serialize)]
struct ChunkEntry {
    index: u32,
    kind: Option<ChunkType>,
    #[serde(flatten)]
    header: ChunkHeader,
    payload: u32,
    #[serde(with = "hex::serde")]
    extra_bytes: Vec<u8>,
}

impl From<Chunk> for ChunkEntry {
    fn from(value: Chunk) -> Self {
        Self {
            index: value.index,
            kind: value.header.kind(),
            header: value.header,
            payload: value.payload,
            extra_bytes: value.padding,
        }
    }
}

#[derive(Serialize)]
struct Listing<'a> {
    header: HeaderEntry<'a>,
    chunks: Vec<ChunkEntry>,
}

fn chunk_type_label(header: &ChunkHeader) -> String {
    match header.kind() {
        Some(kind) => format!("0x{:04X} ({})", header.chunk_type, kind),
        None => format!("0x{:04X}", header.chunk_type),
    }
}

fn print_file_header<R, W>(walker: &SparseReader<R>, out: &mut W) -> Result<()>
where
    R: Read,
    W: Write
{
    let header = walker.header();
    let sizes = walker.sizes();
    writeln!(out, "--- file header ---\n")?;
    writeln!(out, "magic: 0x{:08X}", header.magic)?;
    writeln!(out, "version: {}.{}", header.major_version, header.minor_version)?;
    writeln!(out, "file_hdr_sz: {}", header.file_hdr_sz)?;
    writeln!(out, "chunk_hdr_sz: {}", header.chunk_hdr_sz)?;
    writeln!(out, "blk_sz: {}", header.blk_sz)?;
    writeln!(out, "total_blks: {} ({})", header.total_blks,
        human_readable(header.image_size()))?;
    writeln!(out, "total_chunks: {}", header.total_chunks)?;
    writeln!(out, "image_checksum: 0x{:08X}", header.image_checksum)?;
    writeln!(out)?;
    writeln!(out, "file_hdr_sz extra: {}", sizes.file_extra())?;
    writeln!(out, "chunk_hdr_sz extra: {}", sizes.chunk_extra())?;
    if ! walker.padding().is_empty() {
        writeln!(out)?;
        writeln!(out, "extra bytes 0x {}", hex_bytes(walker.padding()))?;
    }
    writeln!(out)?;
    Ok(())
}

fn print_plain<R, W>(walker: &mut SparseReader<R>, out: &mut W) -> Result<()>
where
    R: Read + Seek,
    W: Write
{
    print_file_header(walker, out)?;
    writeln!(out, "--- chunks ---")?;
    while let Some(chunk) = walker.next_chunk()? {
        writeln!(out, "chunk {} / chunk_sz {:8} / total_sz {:8} / extra bytes \
            0x {}", chunk_type_label(&chunk.header), chunk.header.chunk_sz,
            chunk.header.total_sz, hex_bytes(&chunk.padding))?;
        walker.skip_payload()?;
    }
    Ok(())
}

macro_rules! cell_right {
    ($raw: expr) => {
        $raw.cell().justify(Justify::Right)
    };
}

macro_rules! cell_bold_center {
    ($raw: expr) => {
        $raw.cell().bold(true).justify(Justify::Center)
    };
}

fn print_table<R, W>(walker: &mut SparseReader<R>, out: &mut W) -> Result<()>
where
    R: Read + Seek,
    W: Write
{
    print_file_header(walker, out)?;
    let mut rows: Vec<[CellStruct; 6]> = Vec::new();
    while let Some(chunk) = walker.next_chunk()? {
        rows.push([
            cell_right!(chunk.index),
            chunk_type_label(&chunk.header).cell(),
            cell_right!(chunk.header.chunk_sz),
            cell_right!(chunk.header.total_sz),
            cell_right!(chunk.payload),
            hex_bytes(&chunk.padding).cell(),
        ]);
        walker.skip_payload()?;
    }
    let table = rows.table().title([
        cell_bold_center!("ID"),
        cell_bold_center!("type"),
        cell_bold_center!("chunk_sz"),
        cell_bold_center!("total_sz"),
        cell_bold_center!("payload"),
        cell_bold_center!("extra bytes"),
    ]).bold(true);
    writeln!(out, "{}", table.display()?)?;
    Ok(())
}

fn print_yaml<R, W>(walker: &mut SparseReader<R>, out: &mut W) -> Result<()>
where
    R: Read + Seek,
    W: Write
{
    let mut chunks = Vec::new();
    while let Some(chunk) = walker.next_chunk()? {
        walker.skip_payload()?;
        chunks.push(chunk.into());
    }
    let sizes = walker.sizes();
    let listing = Listing {
        header: HeaderEntry {
            header: walker.header(),
            file_hdr_sz_extra: sizes.file_extra(),
            chunk_hdr_sz_extra: sizes.chunk_extra(),
            extra_bytes: walker.padding(),
        },
        chunks,
    };
    serde_yaml::to_writer(out, &listing)?;
    Ok(())
}

/// Dumps the headers of the image in reader, returns the bytes it accounts
/// for: headers, their padding and every payload
pub(crate) fn inspect_stream<R, W>(reader: R, out: &mut W, format: ListFormat)
    -> Result<u64>
where
    R: Read + Seek,
    W: Write
{
    let mut walker = SparseReader::new(reader)?;
    if walker.header().magic != SPARSE_HEADER_MAGIC {
        warn!("Magic 0x{:08x} is not the sparse image magic 0x{:08x}, \
            listing anyway", walker.header().magic, SPARSE_HEADER_MAGIC);
    }
    match format {
        ListFormat::Plain => print_plain(&mut walker, out)?,
        ListFormat::Table => print_table(&mut walker, out)?,
        ListFormat::Yaml => print_yaml(&mut walker, out)?,
    }
    Ok(walker.consumed())
}

/// How far the chunks reached against how large the file is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InspectReport {
    pub(crate) consumed: u64,
    pub(crate) size: u64,
}

pub(crate) fn inspect<P: AsRef<Path>>(path: P, format: ListFormat)
    -> Result<InspectReport>
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::file_open(path, e))?;
    let size = file.metadata()?.len();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let consumed = inspect_stream(BufReader::new(file), &mut out, format)?;
    out.flush()?;
    if consumed == size {
        info!("All {} bytes of '{}' accounted for", size, path.display());
    } else {
        warn!("Chunks of '{}' end at offset 0x{:x}, {} bytes before the end \
            of the file", path.display(), consumed,
            size.saturating_sub(consumed));
    }
    Ok(InspectReport { consumed, size })
}
