/*
sparsepad, to bloat and trim Android sparse images: sparse format module
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

// Logic to interact with Android Sparse Image
// # Android sparse img format
// # From https://android.googlesource.com/\
// # platform/system/core/+/master/libsparse/sparse_format.h
// 0		lelong	0xed26ff3a		Android sparse image
// >4		leshort	x			\b, version: %d
// >6		leshort	x			\b.%d
// >16		lelong	x			\b, Total of %d
// >12		lelong	x			\b %d-byte output blocks in
// >20		lelong	x			\b %d input chunks.

use std::{fmt::Display, io::Write};

use serde::Serialize;

use crate::Result;

pub(crate) const SPARSE_HEADER_MAGIC: u32 = 0xed26ff3a;

/* Canonical sizes, declared sizes may only be larger */

pub(crate) const SIZE_FILE_HEADER: u16 = 28;
pub(crate) const SIZE_CHUNK_HEADER: u16 = 12;

pub(crate) const CHUNK_TYPE_RAW: u16 = 0xcac1;
pub(crate) const CHUNK_TYPE_FILL: u16 = 0xcac2;
pub(crate) const CHUNK_TYPE_DONT_CARE: u16 = 0xcac3;
pub(crate) const CHUNK_TYPE_CRC32: u16 = 0xcac4;

pub(crate) type RawFileHeader = [u8; SIZE_FILE_HEADER as usize];
pub(crate) type RawChunkHeader = [u8; SIZE_CHUNK_HEADER as usize];

/// Where in the image a read came up short
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Section {
    FileHeader,
    FileHeaderPadding,
    ChunkHeader(u32),
    ChunkHeaderPadding(u32),
    Payload(u32),
}

impl Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Section::FileHeader => write!(f, "file header"),
            Section::FileHeaderPadding => write!(f, "file header padding"),
            Section::ChunkHeader(index) => write!(f, "chunk #{} header", index),
            Section::ChunkHeaderPadding(index) =>
                write!(f, "chunk #{} header padding", index),
            Section::Payload(index) => write!(f, "chunk #{} payload", index),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SparseError {
    FileHeaderTooSmall {
        size: u16,
    },
    ChunkHeaderTooSmall {
        size: u16,
    },
    ChunkTooSmall {
        index: u32,
        total_sz: u32,
        chunk_hdr_sz: u16,
    },
    ChunkTooLarge {
        index: u32,
        payload: u32,
        chunk_hdr_sz: u16,
    },
    Truncated {
        section: Section,
        expected: u64,
        got: u64,
    },
    TrailingData {
        consumed: u64,
        trailing: u64,
    },
}

impl Display for SparseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SparseError::FileHeaderTooSmall { size } =>
                write!(f, "File header size {} is smaller than the {}-byte \
                    minimum", size, SIZE_FILE_HEADER),
            SparseError::ChunkHeaderTooSmall { size } =>
                write!(f, "Chunk header size {} is smaller than the {}-byte \
                    minimum", size, SIZE_CHUNK_HEADER),
            SparseError::ChunkTooSmall { index, total_sz, chunk_hdr_sz } =>
                write!(f, "Chunk #{}: total size {} is smaller than its \
                    {}-byte header", index, total_sz, chunk_hdr_sz),
            SparseError::ChunkTooLarge { index, payload, chunk_hdr_sz } =>
                write!(f, "Chunk #{}: {} payload bytes with a {}-byte header \
                    overflow the total size field",
                    index, payload, chunk_hdr_sz),
            SparseError::Truncated { section, expected, got } =>
                write!(f, "Truncated input: {} needs {} bytes but only {} \
                    are available", section, expected, got),
            SparseError::TrailingData { consumed, trailing } =>
                write!(f, "{} unexpected bytes after the last chunk, which \
                    ends at offset 0x{:x}", trailing, consumed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum ChunkType {
    Raw,
    Fill,
    DontCare,
    Crc32,
}

impl TryFrom<u16> for ChunkType {
    type Error = u16;

    fn try_from(value: u16) -> std::result::Result<Self, u16> {
        match value {
            CHUNK_TYPE_RAW => Ok(Self::Raw),
            CHUNK_TYPE_FILL => Ok(Self::Fill),
            CHUNK_TYPE_DONT_CARE => Ok(Self::DontCare),
            CHUNK_TYPE_CRC32 => Ok(Self::Crc32),
            _ => Err(value),
        }
    }
}

impl Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}",
            match self {
                ChunkType::Raw => "RAW",
                ChunkType::Fill => "FILL",
                ChunkType::DontCare => "DONT_CARE",
                ChunkType::Crc32 => "CRC32",
            }
        )
    }
}

/// Declared sizes of both header kinds, never below the canonical sizes.
///
/// Computed once per image from its file header (or picked as a target) and
/// handed down to every chunk, so the padding counts can't drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HeaderSizes {
    file: u16,
    chunk: u16,
}

impl HeaderSizes {
    pub(crate) const CANONICAL: Self = Self {
        file: SIZE_FILE_HEADER,
        chunk: SIZE_CHUNK_HEADER,
    };

    /// Samsung (I9500 era) images, 4 reserved bytes after both headers
    pub(crate) const BLOATED: Self = Self {
        file: SIZE_FILE_HEADER + 4,
        chunk: SIZE_CHUNK_HEADER + 4,
    };

    pub(crate) fn try_new(file: u16, chunk: u16) -> Result<Self> {
        if file < SIZE_FILE_HEADER {
            return Err(SparseError::FileHeaderTooSmall { size: file }.into())
        }
        if chunk < SIZE_CHUNK_HEADER {
            return Err(SparseError::ChunkHeaderTooSmall { size: chunk }.into())
        }
        Ok(Self { file, chunk })
    }

    pub(crate) fn file(&self) -> u16 {
        self.file
    }

    pub(crate) fn chunk(&self) -> u16 {
        self.chunk
    }

    pub(crate) fn file_extra(&self) -> u16 {
        self.file - SIZE_FILE_HEADER
    }

    pub(crate) fn chunk_extra(&self) -> u16 {
        self.chunk - SIZE_CHUNK_HEADER
    }
}

impl Display for HeaderSizes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.file, self.chunk)
    }
}

fn le_u16(raw: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([raw[offset], raw[offset + 1]])
}

fn le_u32(raw: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        raw[offset], raw[offset + 1], raw[offset + 2], raw[offset + 3]])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct FileHeader {
    pub(crate) magic: u32,
    pub(crate) major_version: u16,
    pub(crate) minor_version: u16,
    pub(crate) file_hdr_sz: u16,
    pub(crate) chunk_hdr_sz: u16,
    pub(crate) blk_sz: u32,
    pub(crate) total_blks: u32,
    pub(crate) total_chunks: u32,
    pub(crate) image_checksum: u32,
}

impl From<&RawFileHeader> for FileHeader {
    fn from(value: &RawFileHeader) -> Self {
        Self {
            magic: le_u32(value, 0),
            major_version: le_u16(value, 4),
            minor_version: le_u16(value, 6),
            file_hdr_sz: le_u16(value, 8),
            chunk_hdr_sz: le_u16(value, 10),
            blk_sz: le_u32(value, 12),
            total_blks: le_u32(value, 16),
            total_chunks: le_u32(value, 20),
            image_checksum: le_u32(value, 24),
        }
    }
}

impl From<&FileHeader> for RawFileHeader {
    fn from(value: &FileHeader) -> Self {
        let mut raw = [0; SIZE_FILE_HEADER as usize];
        raw[0..4].copy_from_slice(&value.magic.to_le_bytes());
        raw[4..6].copy_from_slice(&value.major_version.to_le_bytes());
        raw[6..8].copy_from_slice(&value.minor_version.to_le_bytes());
        raw[8..10].copy_from_slice(&value.file_hdr_sz.to_le_bytes());
        raw[10..12].copy_from_slice(&value.chunk_hdr_sz.to_le_bytes());
        raw[12..16].copy_from_slice(&value.blk_sz.to_le_bytes());
        raw[16..20].copy_from_slice(&value.total_blks.to_le_bytes());
        raw[20..24].copy_from_slice(&value.total_chunks.to_le_bytes());
        raw[24..28].copy_from_slice(&value.image_checksum.to_le_bytes());
        raw
    }
}

impl FileHeader {
    pub(crate) fn sizes(&self) -> Result<HeaderSizes> {
        HeaderSizes::try_new(self.file_hdr_sz, self.chunk_hdr_sz)
    }

    pub(crate) fn with_sizes(&self, sizes: HeaderSizes) -> Self {
        Self {
            file_hdr_sz: sizes.file,
            chunk_hdr_sz: sizes.chunk,
            ..*self
        }
    }

    /// Size of the expanded, non-sparse image
    pub(crate) fn image_size(&self) -> u64 {
        self.blk_sz as u64 * self.total_blks as u64
    }

    /// Writes only the canonical fields, padding is up to the caller
    pub(crate) fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&RawFileHeader::from(self))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct ChunkHeader {
    pub(crate) chunk_type: u16,
    pub(crate) reserved1: u16,
    pub(crate) chunk_sz: u32,
    pub(crate) total_sz: u32,
}

impl From<&RawChunkHeader> for ChunkHeader {
    fn from(value: &RawChunkHeader) -> Self {
        Self {
            chunk_type: le_u16(value, 0),
            reserved1: le_u16(value, 2),
            chunk_sz: le_u32(value, 4),
            total_sz: le_u32(value, 8),
        }
    }
}

impl From<&ChunkHeader> for RawChunkHeader {
    fn from(value: &ChunkHeader) -> Self {
        let mut raw = [0; SIZE_CHUNK_HEADER as usize];
        raw[0..2].copy_from_slice(&value.chunk_type.to_le_bytes());
        raw[2..4].copy_from_slice(&value.reserved1.to_le_bytes());
        raw[4..8].copy_from_slice(&value.chunk_sz.to_le_bytes());
        raw[8..12].copy_from_slice(&value.total_sz.to_le_bytes());
        raw
    }
}

impl ChunkHeader {
    pub(crate) fn kind(&self) -> Option<ChunkType> {
        ChunkType::try_from(self.chunk_type).ok()
    }

    /// Bytes following the header (and its padding) that belong to this chunk
    pub(crate) fn payload_len(&self, index: u32, sizes: HeaderSizes)
        -> Result<u32>
    {
        match self.total_sz.checked_sub(sizes.chunk.into()) {
            Some(payload) => Ok(payload),
            None => Err(SparseError::ChunkTooSmall {
                index,
                total_sz: self.total_sz,
                chunk_hdr_sz: sizes.chunk
            }.into()),
        }
    }

    /// The same chunk with its total size accounting for a header of the
    /// target size instead of the one it was read with
    pub(crate) fn reframed(&self, index: u32, payload: u32, target: HeaderSizes)
        -> Result<Self>
    {
        match payload.checked_add(target.chunk.into()) {
            Some(total_sz) => Ok(Self { total_sz, ..*self }),
            None => Err(SparseError::ChunkTooLarge {
                index,
                payload,
                chunk_hdr_sz: target.chunk
            }.into()),
        }
    }

    pub(crate) fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&RawChunkHeader::from(self))?;
        Ok(())
    }
}
