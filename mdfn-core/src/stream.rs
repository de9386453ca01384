//! Stream Abstraction
//!
//! A byte stream contract shared by in-memory buffers and disk files. Every
//! stream advertises what it can do through an [`Attributes`] mask instead of
//! being probed at runtime, so callers can pick a strategy up front (for
//! example, preferring [`Stream::map`] on in-memory streams).
//!
//! # Error Policy
//! Stream operations fail fast. A write either persists every byte or returns
//! an error, and reads fail on a short count unless `error_on_eos` is `false`.
//! `close()` is the only place deferred write failures (disk full) surface, so
//! implementations must call it from `Drop` and log, never propagate, its error.
//!
//! # Typed Access
//! [`StreamExt`] adds fixed-width little/big/native-endian accessors on top of
//! raw `read`/`write`. These back the binary state format and must be exact.

pub mod file;
pub mod memory;

use crate::error::StreamError;
use bitflags::bitflags;
use std::fmt;

pub use std::io::SeekFrom;

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

bitflags! {
    /// Capability mask reported by [`Stream::attributes`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Attributes: u64 {
        const READABLE = 1 << 0;
        const WRITEABLE = 1 << 1;
        /// Can seek at all, regardless of how fast seeking is.
        const SEEKABLE = 1 << 2;
        /// Seeking (particularly backwards) is slow and should be avoided.
        const SLOW_SEEK = 1 << 3;
        /// `size()` is slow and should be avoided.
        const SLOW_SIZE = 1 << 4;
        /// Data lives in memory; reads and seeks are both very fast.
        const INMEM_FAST = 1 << 5;
    }
}

/// Terminator reported by [`Stream::get_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnd {
    /// `\0`
    Nul,
    /// `\n`
    Lf,
    /// `\r` not followed by `\n`
    Cr,
    /// `\r\n`, folded into one terminator
    CrLf,
    /// End of stream after reading some line content
    Eof,
    /// End of stream with nothing left to read
    Empty,
}

impl LineEnd {
    /// Numeric code of the terminator: the terminator byte(s) as an integer,
    /// 256 for an unterminated last line, and -1 when nothing was read.
    pub fn code(self) -> i32 {
        match self {
            LineEnd::Nul => 0,
            LineEnd::Lf => 0x0A,
            LineEnd::Cr => 0x0D,
            LineEnd::CrLf => 0x0D0A,
            LineEnd::Eof => 256,
            LineEnd::Empty => -1,
        }
    }

    /// Whether the end of the stream was reached.
    pub fn is_eof(self) -> bool {
        matches!(self, LineEnd::Eof | LineEnd::Empty)
    }
}

/// Sequential and random-access byte stream.
pub trait Stream {
    /// Capabilities of this stream.
    fn attributes(&self) -> Attributes;

    /// Fail unless the stream can seek quickly.
    fn require_fast_seekable(&self) -> Result<()> {
        let attributes = self.attributes();
        if !attributes.contains(Attributes::SEEKABLE) {
            return Err(StreamError::NotSeekable);
        }
        if attributes.contains(Attributes::SLOW_SEEK) {
            return Err(StreamError::NotFastSeekable);
        }
        Ok(())
    }

    /// Map the whole stream into memory, if possible.
    ///
    /// Returns the same view on repeated calls until [`Stream::unmap`].
    /// A stream that cannot map returns `None`; this is an optimization hint,
    /// not a failure, and callers must fall back to [`Stream::read`].
    fn map(&mut self) -> Option<&[u8]> {
        None
    }

    /// Size of the current mapping, 0 if nothing is mapped.
    fn map_size(&self) -> u64 {
        0
    }

    /// Drop the mapping. A no-op for streams whose data was never mapped.
    fn unmap(&mut self) {}

    /// Read up to `buf.len()` bytes.
    ///
    /// With `error_on_eos`, a short read is an error; otherwise the count of
    /// bytes actually read is returned. The contents of `buf` are undefined
    /// after an error.
    fn read(&mut self, buf: &mut [u8], error_on_eos: bool) -> Result<usize>;

    /// Write all of `buf`. There is no partial-success outcome.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Set the stream length, `ftruncate()`-style. Don't rely on it to grow.
    fn truncate(&mut self, length: u64) -> Result<()>;

    /// Move the cursor and return the new absolute position.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Seek back to the start.
    fn rewind(&mut self) -> Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Current cursor position.
    fn tell(&self) -> u64;

    /// Total stream length. May flush pending writes.
    fn size(&mut self) -> Result<u64>;

    /// Push buffered writes down to the backing store.
    fn flush(&mut self) -> Result<()>;

    /// Flush and release the stream. Write failures deferred by buffering
    /// surface here.
    fn close(&mut self) -> Result<()>;

    /// Read one line into `line`, replacing its contents.
    ///
    /// Lines end at `\n`, `\r`, `\r\n` or `\0`; the terminator is not stored.
    /// `\r\n` is only folded into [`LineEnd::CrLf`] on seekable streams, since
    /// a lone `\r` needs the following byte pushed back.
    fn get_line(&mut self, line: &mut String) -> Result<LineEnd> {
        let mut bytes = Vec::new();
        let mut byte = [0u8; 1];

        let end = loop {
            if self.read(&mut byte, false)? == 0 {
                break if bytes.is_empty() {
                    LineEnd::Empty
                } else {
                    LineEnd::Eof
                };
            }

            match byte[0] {
                b'\n' => break LineEnd::Lf,
                0 => break LineEnd::Nul,
                b'\r' => {
                    if self.attributes().contains(Attributes::SEEKABLE)
                        && self.read(&mut byte, false)? == 1
                    {
                        if byte[0] == b'\n' {
                            break LineEnd::CrLf;
                        }
                        self.seek(SeekFrom::Current(-1))?;
                    }
                    break LineEnd::Cr;
                }
                c => bytes.push(c),
            }
        };

        line.clear();
        line.push_str(&String::from_utf8_lossy(&bytes));
        Ok(end)
    }
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    fn attributes(&self) -> Attributes {
        (**self).attributes()
    }

    fn require_fast_seekable(&self) -> Result<()> {
        (**self).require_fast_seekable()
    }

    fn map(&mut self) -> Option<&[u8]> {
        (**self).map()
    }

    fn map_size(&self) -> u64 {
        (**self).map_size()
    }

    fn unmap(&mut self) {
        (**self).unmap()
    }

    fn read(&mut self, buf: &mut [u8], error_on_eos: bool) -> Result<usize> {
        (**self).read(buf, error_on_eos)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write(buf)
    }

    fn truncate(&mut self, length: u64) -> Result<()> {
        (**self).truncate(length)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        (**self).seek(pos)
    }

    fn tell(&self) -> u64 {
        (**self).tell()
    }

    fn size(&mut self) -> Result<u64> {
        (**self).size()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn get_line(&mut self, line: &mut String) -> Result<LineEnd> {
        (**self).get_line(line)
    }
}

/// Resolve a seek request against the current position and length.
pub(crate) fn resolve_seek(pos: SeekFrom, current: u64, len: u64) -> Result<u64> {
    let (base, offset) = match pos {
        SeekFrom::Start(offset) => return Ok(offset),
        SeekFrom::Current(offset) => (current, offset),
        SeekFrom::End(offset) => (len, offset),
    };

    let target = i128::from(base) + i128::from(offset);
    if target < 0 {
        return Err(StreamError::SeekBeforeStart);
    }
    u64::try_from(target).map_err(|_| StreamError::SeekOverflow)
}

/// Fixed-width primitive with an exact byte representation.
pub trait Scalar: Copy + Sized {
    /// Width in bytes.
    const SIZE: usize;

    fn from_le_slice(bytes: &[u8]) -> Self;
    fn from_be_slice(bytes: &[u8]) -> Self;
    fn write_le(self, out: &mut [u8]);
    fn write_be(self, out: &mut [u8]);

    fn from_ne_slice(bytes: &[u8]) -> Self {
        if cfg!(target_endian = "little") {
            Self::from_le_slice(bytes)
        } else {
            Self::from_be_slice(bytes)
        }
    }

    /// Reverse-endian: the opposite of host order.
    fn from_re_slice(bytes: &[u8]) -> Self {
        if cfg!(target_endian = "little") {
            Self::from_be_slice(bytes)
        } else {
            Self::from_le_slice(bytes)
        }
    }

    fn write_ne(self, out: &mut [u8]) {
        if cfg!(target_endian = "little") {
            self.write_le(out)
        } else {
            self.write_be(out)
        }
    }

    fn write_re(self, out: &mut [u8]) {
        if cfg!(target_endian = "little") {
            self.write_be(out)
        } else {
            self.write_le(out)
        }
    }
}

macro_rules! impl_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl Scalar for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                #[inline]
                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(raw)
                }

                #[inline]
                fn from_be_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_be_bytes(raw)
                }

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn write_be(self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_be_bytes());
                }
            }
        )*
    };
}

impl_scalar!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

const SCALAR_MAX: usize = 8;
const DISCARD_CHUNK: usize = 4096;
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Convenience operations available on every [`Stream`].
pub trait StreamExt: Stream {
    fn get_u8(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read(&mut byte, true)?;
        Ok(byte[0])
    }

    fn put_u8(&mut self, value: u8) -> Result<()> {
        self.write(&[value])
    }

    /// Read one byte, `None` at end of stream.
    fn get_char(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        Ok(match self.read(&mut byte, false)? {
            0 => None,
            _ => Some(byte[0]),
        })
    }

    fn get_le<T: Scalar>(&mut self) -> Result<T> {
        let mut raw = [0u8; SCALAR_MAX];
        self.read(&mut raw[..T::SIZE], true)?;
        Ok(T::from_le_slice(&raw))
    }

    fn get_be<T: Scalar>(&mut self) -> Result<T> {
        let mut raw = [0u8; SCALAR_MAX];
        self.read(&mut raw[..T::SIZE], true)?;
        Ok(T::from_be_slice(&raw))
    }

    fn get_ne<T: Scalar>(&mut self) -> Result<T> {
        let mut raw = [0u8; SCALAR_MAX];
        self.read(&mut raw[..T::SIZE], true)?;
        Ok(T::from_ne_slice(&raw))
    }

    fn get_re<T: Scalar>(&mut self) -> Result<T> {
        let mut raw = [0u8; SCALAR_MAX];
        self.read(&mut raw[..T::SIZE], true)?;
        Ok(T::from_re_slice(&raw))
    }

    fn put_le<T: Scalar>(&mut self, value: T) -> Result<()> {
        let mut raw = [0u8; SCALAR_MAX];
        value.write_le(&mut raw);
        self.write(&raw[..T::SIZE])
    }

    fn put_be<T: Scalar>(&mut self, value: T) -> Result<()> {
        let mut raw = [0u8; SCALAR_MAX];
        value.write_be(&mut raw);
        self.write(&raw[..T::SIZE])
    }

    fn put_ne<T: Scalar>(&mut self, value: T) -> Result<()> {
        let mut raw = [0u8; SCALAR_MAX];
        value.write_ne(&mut raw);
        self.write(&raw[..T::SIZE])
    }

    fn put_re<T: Scalar>(&mut self, value: T) -> Result<()> {
        let mut raw = [0u8; SCALAR_MAX];
        value.write_re(&mut raw);
        self.write(&raw[..T::SIZE])
    }

    fn put_string(&mut self, s: &str) -> Result<()> {
        self.write(s.as_bytes())
    }

    /// Write `s` followed by `\n`.
    fn put_line(&mut self, s: &str) -> Result<()> {
        self.write(s.as_bytes())?;
        self.write(b"\n")
    }

    /// `write!`-style formatted output.
    fn print_format(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        match args.as_str() {
            Some(s) => self.put_string(s),
            None => self.put_string(&args.to_string()),
        }
    }

    /// Read `count` bytes and append them to `s`, returning how many were read.
    fn get_string_append(&mut self, s: &mut String, count: u64, error_on_eos: bool) -> Result<u64> {
        let len = usize::try_from(count).map_err(|_| StreamError::TooLarge(count))?;
        let mut raw = vec![0u8; len];
        let read = self.read(&mut raw, error_on_eos)?;
        raw.truncate(read);
        s.push_str(&String::from_utf8_lossy(&raw));
        Ok(read as u64)
    }

    fn get_string(&mut self, count: u64, error_on_eos: bool) -> Result<String> {
        let mut s = String::new();
        self.get_string_append(&mut s, count, error_on_eos)?;
        Ok(s)
    }

    /// Consume a UTF-8 byte order mark if one is present.
    ///
    /// Anything else is pushed back, which needs a seekable stream.
    fn read_utf8_bom(&mut self) -> Result<bool> {
        let start = self.tell();
        let mut raw = [0u8; 3];
        let read = self.read(&mut raw, false)?;

        if read == raw.len() && raw == UTF8_BOM {
            return Ok(true);
        }
        if read > 0 {
            self.seek(SeekFrom::Start(start))?;
        }
        Ok(false)
    }

    fn write_utf8_bom(&mut self) -> Result<()> {
        self.write(&UTF8_BOM)
    }

    /// Read and drop up to `count` bytes, returning how many were consumed.
    ///
    /// Useful to detect trailing garbage without calling `size()`.
    fn read_discard(&mut self, count: u64) -> Result<u64> {
        let mut scratch = [0u8; DISCARD_CHUNK];
        let mut total = 0u64;

        while total < count {
            let want = (count - total).min(DISCARD_CHUNK as u64) as usize;
            let got = self.read(&mut scratch[..want], false)?;
            total += got as u64;
            if got < want {
                break;
            }
        }
        Ok(total)
    }

    /// Read everything from the cursor to the end into a new buffer.
    ///
    /// Fails with [`StreamError::SizeLimitExceeded`] and returns no data if
    /// more than `size_limit` bytes remain.
    fn alloc_and_read(&mut self, size_limit: u64) -> Result<Vec<u8>> {
        let attributes = self.attributes();

        if attributes.contains(Attributes::INMEM_FAST) {
            let pos = self.tell();
            let copied = self.map().map(|all| {
                let rest = usize::try_from(pos).ok().and_then(|at| all.get(at..)).unwrap_or(&[]);
                if rest.len() as u64 > size_limit {
                    Err(StreamError::SizeLimitExceeded { limit: size_limit })
                } else {
                    Ok(rest.to_vec())
                }
            });
            if let Some(result) = copied {
                self.unmap();
                let data = result?;
                self.seek(SeekFrom::Start(pos + data.len() as u64))?;
                return Ok(data);
            }
        }

        if attributes.contains(Attributes::SEEKABLE) && !attributes.contains(Attributes::SLOW_SIZE) {
            let remaining = self.size()?.saturating_sub(self.tell());
            if remaining > size_limit {
                return Err(StreamError::SizeLimitExceeded { limit: size_limit });
            }
            let len = usize::try_from(remaining).map_err(|_| StreamError::TooLarge(remaining))?;
            let mut data = vec![0u8; len];
            let read = self.read(&mut data, false)?;
            data.truncate(read);
            return Ok(data);
        }

        let mut data = Vec::new();
        let mut chunk = [0u8; DISCARD_CHUNK];
        loop {
            let got = self.read(&mut chunk, false)?;
            if got == 0 {
                break;
            }
            if data.len() as u64 + got as u64 > size_limit {
                return Err(StreamError::SizeLimitExceeded { limit: size_limit });
            }
            data.extend_from_slice(&chunk[..got]);
        }
        Ok(data)
    }
}

impl<S: Stream + ?Sized> StreamExt for S {}
