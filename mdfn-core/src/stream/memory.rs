//! In-memory stream
//!
//! A growable heap buffer behind the [`Stream`] contract. Used for rewind
//! snapshots, for staging state payloads before they hit disk, and for any
//! file small enough to slurp.
//!
//! # Sparse Writes
//! The cursor may be seeked past the logical end. Nothing is allocated until
//! the next write, which zero-fills the hole between the old end and the write
//! offset before storing the payload.
//!
//! # Growth
//! Capacity grows geometrically (next power of two) so that appends amortize
//! to O(1). Capacity is never released implicitly; see
//! [`MemoryStream::shrink_to_fit`].

use super::{resolve_seek, Attributes, LineEnd, Result, SeekFrom, Stream, StreamExt};
use crate::error::StreamError;

/// Growable in-memory byte stream.
///
/// `data.len()` is the logical size and `data.capacity()` the allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStream {
    data: Vec<u8>,
    position: u64,
}

/// A line found by [`MemoryStream::get_line_mem`], borrowed from the buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct LineMem<'a> {
    pub line: &'a mut [u8],
    pub end: LineEnd,
}

impl MemoryStream {
    /// Create an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty stream with room for `alloc_hint` bytes.
    pub fn with_capacity(alloc_hint: usize) -> Self {
        Self {
            data: Vec::with_capacity(alloc_hint),
            position: 0,
        }
    }

    /// Create a stream whose logical size is already `size`, zero-filled.
    ///
    /// Intended for callers that know the exact final size and will overwrite
    /// every byte; the zeroed allocation is the safe form of skipping init.
    pub fn with_size(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
            position: 0,
        }
    }

    /// Wrap an existing buffer; the cursor starts at 0.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }

    /// Drain `stream` from its current position into a new memory stream.
    ///
    /// Fails with [`StreamError::SizeLimitExceeded`] if more than `size_limit`
    /// bytes remain; nothing is returned in that case.
    pub fn from_stream<S: Stream + ?Sized>(stream: &mut S, size_limit: u64) -> Result<Self> {
        let data = stream.alloc_and_read(size_limit)?;
        Ok(Self::from_vec(data))
    }

    /// Logical contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Logical contents, writable in place.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Logical size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Allocated capacity in bytes (at least [`MemoryStream::len`]).
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Take ownership of the buffer.
    ///
    /// Consumes the stream, so no further use of it is expressible.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Release capacity beyond the logical size.
    pub fn shrink_to_fit(&mut self) {
        self.data.shrink_to_fit();
    }

    /// Ensure capacity for `new_required_size` bytes and zero-fill from the
    /// current logical end up to `hole_end`.
    fn grow_if_necessary(&mut self, new_required_size: u64, hole_end: u64) -> Result<()> {
        let required = usize::try_from(new_required_size).map_err(|_| StreamError::TooLarge(new_required_size))?;
        let hole_end = usize::try_from(hole_end).map_err(|_| StreamError::TooLarge(hole_end))?;

        if required > self.data.capacity() {
            let len = self.data.len();
            let rounded = required.checked_next_power_of_two().unwrap_or(required);
            // Fall back to the exact size before giving up.
            if self.data.try_reserve_exact(rounded - len).is_err() {
                self.data
                    .try_reserve_exact(required - len)
                    .map_err(|_| StreamError::TooLarge(new_required_size))?;
            }
        }

        if hole_end > self.data.len() {
            self.data.resize(hole_end, 0);
        }
        Ok(())
    }

    fn position_index(&self) -> usize {
        // Positions past usize::MAX are necessarily past the end.
        usize::try_from(self.position).unwrap_or(usize::MAX)
    }

    /// Find the next line without copying it.
    ///
    /// Unlike [`Stream::get_line`] on other streams, `\r\n` is always folded
    /// into [`LineEnd::CrLf`]. The returned slice borrows the stream, so it is
    /// released before any further call on it. Returns `None` at end of stream
    /// with nothing left to read.
    pub fn get_line_mem(&mut self) -> Option<LineMem<'_>> {
        let start = self.position_index().min(self.data.len());
        let rest = &self.data[start..];

        let found = rest
            .iter()
            .position(|&c| c == b'\n' || c == b'\r' || c == 0);

        match found {
            Some(offset) => {
                let term = rest[offset];
                let mut next = start + offset + 1;
                let end = match term {
                    b'\r' if self.data.get(next) == Some(&b'\n') => {
                        next += 1;
                        LineEnd::CrLf
                    }
                    b'\r' => LineEnd::Cr,
                    b'\n' => LineEnd::Lf,
                    _ => LineEnd::Nul,
                };
                self.position = next as u64;
                Some(LineMem {
                    line: &mut self.data[start..start + offset],
                    end,
                })
            }
            None => {
                let len = self.data.len();
                self.position = len as u64;
                if start == len {
                    None
                } else {
                    Some(LineMem {
                        line: &mut self.data[start..len],
                        end: LineEnd::Eof,
                    })
                }
            }
        }
    }
}

impl Stream for MemoryStream {
    fn attributes(&self) -> Attributes {
        Attributes::READABLE | Attributes::WRITEABLE | Attributes::SEEKABLE | Attributes::INMEM_FAST
    }

    fn map(&mut self) -> Option<&[u8]> {
        Some(&self.data)
    }

    fn map_size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read(&mut self, buf: &mut [u8], error_on_eos: bool) -> Result<usize> {
        let start = self.position_index().min(self.data.len());
        let count = buf.len().min(self.data.len() - start);

        if count < buf.len() && error_on_eos {
            return Err(StreamError::UnexpectedEof {
                requested: buf.len() as u64,
                read: count as u64,
            });
        }

        buf[..count].copy_from_slice(&self.data[start..start + count]);
        self.position += count as u64;
        Ok(count)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let end = self
            .position
            .checked_add(buf.len() as u64)
            .ok_or(StreamError::TooLarge(u64::MAX))?;

        if end > self.data.len() as u64 {
            self.grow_if_necessary(end, self.position)?;
        }

        // The hole (if any) is filled; split into overwrite and append parts.
        let start = self.position as usize;
        let overlap = buf.len().min(self.data.len() - start);
        self.data[start..start + overlap].copy_from_slice(&buf[..overlap]);
        self.data.extend_from_slice(&buf[overlap..]);

        self.position = end;
        Ok(())
    }

    fn truncate(&mut self, length: u64) -> Result<()> {
        if length > self.data.len() as u64 {
            self.grow_if_necessary(length, length)?;
        } else {
            self.data.truncate(length as usize);
        }
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.position = resolve_seek(pos, self.position, self.data.len() as u64)?;
        Ok(self.position)
    }

    fn tell(&self) -> u64 {
        self.position
    }

    fn size(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn get_line(&mut self, line: &mut String) -> Result<LineEnd> {
        line.clear();
        Ok(match self.get_line_mem() {
            Some(found) => {
                line.push_str(&String::from_utf8_lossy(found.line));
                found.end
            }
            None => LineEnd::Empty,
        })
    }
}

impl From<Vec<u8>> for MemoryStream {
    fn from(data: Vec<u8>) -> Self {
        Self::from_vec(data)
    }
}

impl std::io::Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Stream::write(self, buf).map_err(std::io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl std::io::Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Stream::read(self, buf, false).map_err(std::io::Error::other)
    }
}
