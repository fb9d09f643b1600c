/*
sparsepad, to bloat and trim Android sparse images: test image module
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

// Byte-level image construction for tests, deliberately independent of the
// codec in sparse.rs

use crate::sparse::{CHUNK_TYPE_CRC32, CHUNK_TYPE_DONT_CARE, CHUNK_TYPE_FILL,
    CHUNK_TYPE_RAW, SIZE_CHUNK_HEADER, SIZE_FILE_HEADER, SPARSE_HEADER_MAGIC};

struct FixtureChunk {
    chunk_type: u16,
    chunk_sz: u32,
    payload: Vec<u8>,
}

pub(crate) struct ImageBuilder {
    file_hdr_sz: u16,
    chunk_hdr_sz: u16,
    blk_sz: u32,
    padding: u8,
    declared_chunks: Option<u32>,
    chunks: Vec<FixtureChunk>,
}

impl ImageBuilder {
    pub(crate) fn new() -> Self {
        Self {
            file_hdr_sz: SIZE_FILE_HEADER,
            chunk_hdr_sz: SIZE_CHUNK_HEADER,
            blk_sz: 512,
            padding: 0,
            declared_chunks: None,
            chunks: Vec::new(),
        }
    }

    pub(crate) fn header_sizes(mut self, file: u16, chunk: u16) -> Self {
        self.file_hdr_sz = file;
        self.chunk_hdr_sz = chunk;
        self
    }

    pub(crate) fn block_size(mut self, blk_sz: u32) -> Self {
        self.blk_sz = blk_sz;
        self
    }

    pub(crate) fn padding_byte(mut self, padding: u8) -> Self {
        self.padding = padding;
        self
    }

    pub(crate) fn declared_chunks(mut self, count: u32) -> Self {
        self.declared_chunks = Some(count);
        self
    }

    pub(crate) fn chunk(mut self, chunk_type: u16, chunk_sz: u32,
        payload: Vec<u8>) -> Self
    {
        self.chunks.push(FixtureChunk { chunk_type, chunk_sz, payload });
        self
    }

    /// Recognizable non-zero bytes, so padding mixups show up
    pub(crate) fn raw_payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251 + 1) as u8).collect()
    }

    pub(crate) fn raw(self, blocks: u32) -> Self {
        let payload = Self::raw_payload((blocks * self.blk_sz) as usize);
        self.chunk(CHUNK_TYPE_RAW, blocks, payload)
    }

    pub(crate) fn fill(self, blocks: u32, pattern: [u8; 4]) -> Self {
        self.chunk(CHUNK_TYPE_FILL, blocks, pattern.to_vec())
    }

    pub(crate) fn dont_care(self, blocks: u32) -> Self {
        self.chunk(CHUNK_TYPE_DONT_CARE, blocks, Vec::new())
    }

    pub(crate) fn crc32(self, crc: u32) -> Self {
        self.chunk(CHUNK_TYPE_CRC32, 0, crc.to_le_bytes().to_vec())
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut image = Vec::new();
        let total_blks: u32 = self.chunks.iter().map(|c| c.chunk_sz).sum();
        let total_chunks = self.declared_chunks
            .unwrap_or(self.chunks.len() as u32);
        image.extend_from_slice(&SPARSE_HEADER_MAGIC.to_le_bytes());
        image.extend_from_slice(&1u16.to_le_bytes());
        image.extend_from_slice(&0u16.to_le_bytes());
        image.extend_from_slice(&self.file_hdr_sz.to_le_bytes());
        image.extend_from_slice(&self.chunk_hdr_sz.to_le_bytes());
        image.extend_from_slice(&self.blk_sz.to_le_bytes());
        image.extend_from_slice(&total_blks.to_le_bytes());
        image.extend_from_slice(&total_chunks.to_le_bytes());
        image.extend_from_slice(&0x0badcafeu32.to_le_bytes());
        let file_extra = self.file_hdr_sz.saturating_sub(SIZE_FILE_HEADER);
        image.resize(image.len() + file_extra as usize, self.padding);
        let chunk_extra = self.chunk_hdr_sz.saturating_sub(SIZE_CHUNK_HEADER);
        for chunk in self.chunks.iter() {
            let total_sz = self.chunk_hdr_sz as u32 + chunk.payload.len() as u32;
            image.extend_from_slice(&chunk.chunk_type.to_le_bytes());
            image.extend_from_slice(&0u16.to_le_bytes());
            image.extend_from_slice(&chunk.chunk_sz.to_le_bytes());
            image.extend_from_slice(&total_sz.to_le_bytes());
            image.resize(image.len() + chunk_extra as usize, self.padding);
            image.extend_from_slice(&chunk.payload);
        }
        image
    }
}
