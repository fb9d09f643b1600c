/*
sparsepad, to bloat and trim Android sparse images: stream walker module
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

use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::{debug, trace};

use crate::{sparse::{ChunkHeader, FileHeader, HeaderSizes, RawChunkHeader,
    RawFileHeader, Section, SparseError, SIZE_CHUNK_HEADER, SIZE_FILE_HEADER},
    Result};

/// Payload is streamed through a buffer of this size, never whole
pub(crate) const SIZE_BUFFER: usize = 0x10000;

#[derive(Debug)]
pub(crate) struct Chunk {
    pub(crate) index: u32,
    pub(crate) header: ChunkHeader,
    pub(crate) padding: Vec<u8>,
    pub(crate) payload: u32,
}

/// Reads as much as possible into buffer, only stopping early at EOF
fn read_full<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(size) => filled += size,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn read_section<R: Read>(reader: &mut R, buffer: &mut [u8], section: Section)
    -> Result<()>
{
    let got = read_full(reader, buffer)?;
    if got < buffer.len() {
        return Err(SparseError::Truncated {
            section,
            expected: buffer.len() as u64,
            got: got as u64
        }.into())
    }
    Ok(())
}

/// Sequential walk over a sparse image: file header first, then every
/// declared chunk in order
pub(crate) struct SparseReader<R> {
    reader: R,
    header: FileHeader,
    sizes: HeaderSizes,
    padding: Vec<u8>,
    next_index: u32,
    payload_left: u64,
    consumed: u64,
    /// Where the stream ends, counted like consumed, found on first skip
    limit: Option<u64>,
}

impl<R: Read> SparseReader<R> {
    pub(crate) fn new(mut reader: R) -> Result<Self> {
        let mut raw: RawFileHeader = [0; SIZE_FILE_HEADER as usize];
        read_section(&mut reader, &mut raw, Section::FileHeader)?;
        let header = FileHeader::from(&raw);
        let sizes = header.sizes()?;
        let mut padding = vec![0; sizes.file_extra().into()];
        read_section(&mut reader, &mut padding, Section::FileHeaderPadding)?;
        debug!("Sparse image {}.{}, headers {}, {} chunks, {} blocks of {} \
            bytes", header.major_version, header.minor_version, sizes,
            header.total_chunks, header.total_blks, header.blk_sz);
        Ok(Self {
            reader,
            header,
            sizes,
            padding,
            next_index: 0,
            payload_left: 0,
            consumed: sizes.file().into(),
            limit: None,
        })
    }

    pub(crate) fn header(&self) -> &FileHeader {
        &self.header
    }

    pub(crate) fn sizes(&self) -> HeaderSizes {
        self.sizes
    }

    /// Opaque bytes between the canonical file header and the first chunk
    pub(crate) fn padding(&self) -> &[u8] {
        &self.padding
    }

    /// Bytes of the image accounted for so far, including skipped payload
    pub(crate) fn consumed(&self) -> u64 {
        self.consumed
    }

    fn current_index(&self) -> u32 {
        self.next_index.saturating_sub(1)
    }

    pub(crate) fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        self.discard_payload()?;
        if self.next_index >= self.header.total_chunks {
            return Ok(None)
        }
        let index = self.next_index;
        let mut raw: RawChunkHeader = [0; SIZE_CHUNK_HEADER as usize];
        read_section(&mut self.reader, &mut raw, Section::ChunkHeader(index))?;
        let header = ChunkHeader::from(&raw);
        let mut padding = vec![0; self.sizes.chunk_extra().into()];
        read_section(&mut self.reader, &mut padding,
            Section::ChunkHeaderPadding(index))?;
        let payload = header.payload_len(index, self.sizes)?;
        trace!("Chunk #{}: type 0x{:04x}, {} blocks, {} payload bytes",
            index, header.chunk_type, header.chunk_sz, payload);
        self.consumed += u64::from(self.sizes.chunk());
        self.payload_left = payload.into();
        self.next_index += 1;
        Ok(Some(Chunk { index, header, padding, payload }))
    }

    /// Streams the current chunk's payload into writer, returns bytes copied
    pub(crate) fn copy_payload<W: Write>(
        &mut self, writer: &mut W, buffer: &mut [u8]
    ) -> Result<u64>
    {
        let expected = self.payload_left;
        let mut left = expected;
        while left > 0 {
            let size = left.min(buffer.len() as u64) as usize;
            let got = read_full(&mut self.reader, &mut buffer[..size])?;
            writer.write_all(&buffer[..got])?;
            left -= got as u64;
            self.consumed += got as u64;
            if got < size {
                self.payload_left = 0;
                return Err(SparseError::Truncated {
                    section: Section::Payload(self.current_index()),
                    expected,
                    got: expected - left,
                }.into())
            }
        }
        self.payload_left = 0;
        Ok(expected)
    }

    fn discard_payload(&mut self) -> Result<()> {
        if self.payload_left == 0 {
            return Ok(())
        }
        let expected = self.payload_left;
        let got = io::copy(
            &mut (&mut self.reader).take(expected), &mut io::sink())?;
        self.consumed += got;
        self.payload_left = 0;
        if got < expected {
            return Err(SparseError::Truncated {
                section: Section::Payload(self.current_index()),
                expected,
                got,
            }.into())
        }
        Ok(())
    }

    /// Counts whatever follows the last chunk, reading it to the end
    pub(crate) fn trailing(&mut self) -> Result<u64> {
        while self.next_chunk()?.is_some() {}
        Ok(io::copy(&mut self.reader, &mut io::sink())?)
    }
}

impl<R: Read + Seek> SparseReader<R> {
    /// Seeks over the current chunk's payload without reading it
    pub(crate) fn skip_payload(&mut self) -> Result<()> {
        let expected = self.payload_left;
        if expected == 0 {
            return Ok(())
        }
        let limit = match self.limit {
            Some(limit) => limit,
            None => {
                let position = self.reader.stream_position()?;
                let end = self.reader.seek(SeekFrom::End(0))?;
                self.reader.seek(SeekFrom::Start(position))?;
                let limit = self.consumed + end.saturating_sub(position);
                self.limit = Some(limit);
                limit
            },
        };
        let available = limit.saturating_sub(self.consumed);
        if available < expected {
            self.consumed += available;
            self.payload_left = 0;
            return Err(SparseError::Truncated {
                section: Section::Payload(self.current_index()),
                expected,
                got: available,
            }.into())
        }
        // u32 payload lengths always fit
        self.reader.seek(SeekFrom::Current(expected as i64))?;
        self.consumed += expected;
        self.payload_left = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{fixture::ImageBuilder, sparse::CHUNK_TYPE_FILL, Error};

    fn truncated(error: Error) -> Section {
        match error {
            Error::SparseError(SparseError::Truncated { section, .. }) =>
                section,
            other => panic!("Expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn walks_chunks_and_surfaces_padding() {
        let image = ImageBuilder::new()
            .header_sizes(36, 20)
            .padding_byte(0xa5)
            .raw(2)
            .fill(3, [1, 2, 3, 4])
            .dont_care(5)
            .build();
        let mut walker = SparseReader::new(Cursor::new(&image)).unwrap();
        assert_eq!(walker.sizes(), HeaderSizes::try_new(36, 20).unwrap());
        assert_eq!(walker.padding(), &[0xa5; 8]);
        assert_eq!(walker.header().total_chunks, 3);

        let mut payloads = Vec::new();
        let mut buffer = [0; 100];
        while let Some(chunk) = walker.next_chunk().unwrap() {
            assert_eq!(chunk.padding, vec![0xa5; 8]);
            let mut payload = Vec::new();
            walker.copy_payload(&mut payload, &mut buffer).unwrap();
            assert_eq!(payload.len() as u32, chunk.payload);
            payloads.push((chunk.index, chunk.header.chunk_type, payload));
        }
        assert_eq!(payloads.len(), 3);
        assert_eq!(payloads[0].2, ImageBuilder::raw_payload(2 * 512));
        assert_eq!(payloads[1].1, CHUNK_TYPE_FILL);
        assert_eq!(payloads[1].2, vec![1, 2, 3, 4]);
        assert!(payloads[2].2.is_empty());
        assert_eq!(walker.consumed(), image.len() as u64);
        assert_eq!(walker.trailing().unwrap(), 0);
    }

    #[test]
    fn skip_payload_seeks_to_every_chunk() {
        let image = ImageBuilder::new().raw(1).crc32(0xdeadbeef).raw(4)
            .build();
        let mut walker = SparseReader::new(Cursor::new(&image)).unwrap();
        let mut totals = Vec::new();
        while let Some(chunk) = walker.next_chunk().unwrap() {
            totals.push(chunk.header.total_sz);
            walker.skip_payload().unwrap();
        }
        assert_eq!(totals, vec![12 + 512, 12 + 4, 12 + 4 * 512]);
        assert_eq!(walker.consumed(), image.len() as u64);
    }

    /// Counts how often the end of the stream is looked up
    struct EndSeeks<R> {
        inner: R,
        ends: usize,
    }

    impl<R: Read> Read for EndSeeks<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl<R: Seek> Seek for EndSeeks<R> {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            if let SeekFrom::End(_) = pos {
                self.ends += 1;
            }
            self.inner.seek(pos)
        }
    }

    #[test]
    fn stream_end_is_looked_up_once() {
        let image = ImageBuilder::new().raw(1).raw(2).fill(1, [3; 4]).raw(1)
            .build();
        let mut reader = EndSeeks { inner: Cursor::new(&image), ends: 0 };
        let mut walker = SparseReader::new(&mut reader).unwrap();
        let mut chunks = 0;
        while walker.next_chunk().unwrap().is_some() {
            walker.skip_payload().unwrap();
            chunks += 1;
        }
        assert_eq!(chunks, 4);
        assert_eq!(walker.consumed(), image.len() as u64);
        drop(walker);
        assert_eq!(reader.ends, 1);
    }

    #[test]
    fn unconsumed_payload_is_discarded() {
        let image = ImageBuilder::new().raw(3).fill(1, [9; 4]).build();
        let mut walker = SparseReader::new(Cursor::new(&image)).unwrap();
        assert_eq!(walker.next_chunk().unwrap().unwrap().index, 0);
        let second = walker.next_chunk().unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.header.chunk_type, CHUNK_TYPE_FILL);
        assert_eq!(walker.trailing().unwrap(), 0);
        assert_eq!(walker.consumed(), image.len() as u64);
    }

    #[test]
    fn missing_chunk_headers_are_truncation() {
        let image = ImageBuilder::new().raw(1).declared_chunks(3).build();
        let mut walker = SparseReader::new(Cursor::new(&image)).unwrap();
        walker.next_chunk().unwrap().unwrap();
        assert_eq!(truncated(walker.next_chunk().unwrap_err()),
            Section::ChunkHeader(1));
    }

    #[test]
    fn short_payload_is_truncation() {
        let mut image = ImageBuilder::new().raw(2).build();
        image.truncate(image.len() - 100);
        let mut walker = SparseReader::new(Cursor::new(&image)).unwrap();
        walker.next_chunk().unwrap().unwrap();
        let mut sink = Vec::new();
        match walker.copy_payload(&mut sink, &mut [0; 64]).unwrap_err() {
            Error::SparseError(SparseError::Truncated {
                section, expected, got
            }) => {
                assert_eq!(section, Section::Payload(0));
                assert_eq!(expected, 1024);
                assert_eq!(got, 924);
            },
            other => panic!("Expected truncation, got {:?}", other),
        }
        assert_eq!(sink.len(), 924);

        let mut walker = SparseReader::new(Cursor::new(&image)).unwrap();
        walker.next_chunk().unwrap().unwrap();
        assert_eq!(truncated(walker.skip_payload().unwrap_err()),
            Section::Payload(0));
    }

    #[test]
    fn short_headers_are_truncation() {
        let image = ImageBuilder::new().header_sizes(32, 16).raw(1).build();
        let walker = SparseReader::new(Cursor::new(&image[..20]));
        assert_eq!(truncated(walker.err().unwrap()), Section::FileHeader);
        let walker = SparseReader::new(Cursor::new(&image[..30]));
        assert_eq!(truncated(walker.err().unwrap()),
            Section::FileHeaderPadding);
        let mut walker = SparseReader::new(Cursor::new(&image[..46]))
            .unwrap();
        assert_eq!(truncated(walker.next_chunk().unwrap_err()),
            Section::ChunkHeaderPadding(0));
    }

    #[test]
    fn undersized_declared_sizes_fail_fast() {
        let image = ImageBuilder::new().header_sizes(24, 12).raw(1).build();
        match SparseReader::new(Cursor::new(&image)).err().unwrap() {
            Error::SparseError(SparseError::FileHeaderTooSmall { size }) =>
                assert_eq!(size, 24),
            other => panic!("Expected format error, got {:?}", other),
        }
        let image = ImageBuilder::new().header_sizes(28, 10).raw(1).build();
        match SparseReader::new(Cursor::new(&image)).err().unwrap() {
            Error::SparseError(SparseError::ChunkHeaderTooSmall { size }) =>
                assert_eq!(size, 10),
            other => panic!("Expected format error, got {:?}", other),
        }
    }

    #[test]
    fn trailing_bytes_are_counted() {
        let mut image = ImageBuilder::new().dont_care(8).build();
        image.extend_from_slice(&[0; 7]);
        let mut walker = SparseReader::new(Cursor::new(&image)).unwrap();
        assert_eq!(walker.trailing().unwrap(), 7);
    }
}
