//! Disk-backed stream
//!
//! Wraps [`std::fs::File`] with its own read and write buffering so that the
//! per-frame movie traffic (one command byte, a few port bytes) does not turn
//! into a syscall per call. The logical cursor is tracked here; the OS file
//! offset is only synchronized when switching between reading and writing,
//! seeking, or truncating.

use super::{resolve_seek, Attributes, Result, SeekFrom, Stream};
use crate::error::StreamError;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

const BUFFER_SIZE: usize = 8192;

/// How a [`FileStream`] opens its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Existing file, read-only.
    Read,
    /// Create or truncate, read/write.
    Write,
    /// Create, failing if the file already exists.
    WriteSafe,
    /// Existing file, read/write, contents preserved.
    WriteInPlace,
}

/// Buffered file stream.
#[derive(Debug)]
pub struct FileStream {
    file: Option<File>,
    path: PathBuf,
    mode: FileMode,
    /// Logical cursor.
    position: u64,
    /// Bytes read ahead from the OS; `read_buf[read_pos..]` starts at `position`.
    read_buf: Vec<u8>,
    read_pos: usize,
    /// Pending writes, starting at `write_start`.
    write_buf: Vec<u8>,
    write_start: u64,
}

impl FileStream {
    /// Open `path` in `mode`.
    pub fn open(path: impl AsRef<Path>, mode: FileMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        match mode {
            FileMode::Read => options.read(true),
            FileMode::Write => options.read(true).write(true).create(true).truncate(true),
            FileMode::WriteSafe => options.read(true).write(true).create_new(true),
            FileMode::WriteInPlace => options.read(true).write(true),
        };

        let file = options.open(&path)?;
        log::debug!("Opened {} ({:?})", path.display(), mode);

        Ok(Self {
            file: Some(file),
            path,
            mode,
            position: 0,
            read_buf: Vec::new(),
            read_pos: 0,
            write_buf: Vec::new(),
            write_start: 0,
        })
    }

    /// Path this stream was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(StreamError::Closed)
    }

    fn writeable(&self) -> bool {
        self.mode != FileMode::Read
    }

    /// Push pending writes to the OS at their recorded offset.
    fn flush_write_buffer(&mut self) -> Result<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        let start = self.write_start;
        let pending = std::mem::take(&mut self.write_buf);
        let file = self.file()?;
        file.seek(std::io::SeekFrom::Start(start))?;
        file.write_all(&pending)?;
        Ok(())
    }

    /// Forget read-ahead data so the next read goes to the OS.
    fn drop_read_buffer(&mut self) {
        self.read_buf.clear();
        self.read_pos = 0;
    }
}

impl Stream for FileStream {
    fn attributes(&self) -> Attributes {
        let mut attributes = Attributes::READABLE | Attributes::SEEKABLE;
        if self.writeable() {
            attributes |= Attributes::WRITEABLE;
        }
        attributes
    }

    fn read(&mut self, buf: &mut [u8], error_on_eos: bool) -> Result<usize> {
        self.flush_write_buffer()?;

        let mut done = 0usize;
        while done < buf.len() {
            if self.read_pos < self.read_buf.len() {
                let available = &self.read_buf[self.read_pos..];
                let n = available.len().min(buf.len() - done);
                buf[done..done + n].copy_from_slice(&available[..n]);
                self.read_pos += n;
                done += n;
                continue;
            }

            self.drop_read_buffer();
            let position = self.position + done as u64;
            let want = buf.len() - done;
            let file = self.file()?;
            file.seek(std::io::SeekFrom::Start(position))?;

            if want >= BUFFER_SIZE {
                let n = read_full(file, &mut buf[done..])?;
                done += n;
                if n < want {
                    break;
                }
            } else {
                let mut chunk = vec![0u8; BUFFER_SIZE];
                let n = read_full(file, &mut chunk)?;
                if n == 0 {
                    break;
                }
                chunk.truncate(n);
                self.read_buf = chunk;
            }
        }

        self.position += done as u64;

        if done < buf.len() && error_on_eos {
            return Err(StreamError::UnexpectedEof {
                requested: buf.len() as u64,
                read: done as u64,
            });
        }
        Ok(done)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if !self.writeable() {
            return Err(StreamError::NotWriteable);
        }
        self.drop_read_buffer();

        let contiguous = self.write_start + self.write_buf.len() as u64 == self.position;
        if !self.write_buf.is_empty() && !contiguous {
            self.flush_write_buffer()?;
        }
        if self.write_buf.is_empty() {
            self.write_start = self.position;
        }

        if buf.len() >= BUFFER_SIZE {
            self.flush_write_buffer()?;
            let position = self.position;
            let file = self.file()?;
            file.seek(std::io::SeekFrom::Start(position))?;
            file.write_all(buf)?;
        } else {
            self.write_buf.extend_from_slice(buf);
            if self.write_buf.len() >= BUFFER_SIZE {
                self.flush_write_buffer()?;
            }
        }

        self.position += buf.len() as u64;
        Ok(())
    }

    fn truncate(&mut self, length: u64) -> Result<()> {
        if !self.writeable() {
            return Err(StreamError::NotWriteable);
        }
        self.flush_write_buffer()?;
        self.drop_read_buffer();
        self.file()?.set_len(length)?;
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let len = match pos {
            SeekFrom::End(_) => self.size()?,
            _ => 0,
        };
        let target = resolve_seek(pos, self.position, len)?;

        // Stay inside the read-ahead window when possible.
        let window_start = self.position - self.read_pos as u64;
        let window_end = window_start + self.read_buf.len() as u64;
        if target >= window_start && target <= window_end && !self.read_buf.is_empty() {
            self.read_pos = (target - window_start) as usize;
        } else {
            self.drop_read_buffer();
        }

        self.position = target;
        Ok(target)
    }

    fn tell(&self) -> u64 {
        self.position
    }

    fn size(&mut self) -> Result<u64> {
        self.flush_write_buffer()?;
        Ok(self.file()?.metadata()?.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.flush_write_buffer()?;
        self.file()?.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        let flushed = self.flush_write_buffer();
        let synced = match (&mut self.file, self.mode) {
            (Some(file), mode) if mode != FileMode::Read => file.flush().map_err(StreamError::from),
            _ => Ok(()),
        };
        self.file = None;
        self.drop_read_buffer();
        flushed?;
        synced
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Error closing {}: {}", self.path.display(), e);
        }
    }
}

/// Read until `buf` is full or the file ends.
fn read_full(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        match file.read(&mut buf[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamExt;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mdfn-filestream-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_write_then_read_back() {
        let path = temp_path("roundtrip");
        {
            let mut fs = FileStream::open(&path, FileMode::Write).unwrap();
            fs.put_le::<u32>(0xDEAD_BEEF).unwrap();
            fs.write(b"tail").unwrap();
            fs.close().unwrap();
        }

        let mut fs = FileStream::open(&path, FileMode::Read).unwrap();
        assert_eq!(fs.get_le::<u32>().unwrap(), 0xDEAD_BEEF);
        let mut tail = [0u8; 4];
        fs.read(&mut tail, true).unwrap();
        assert_eq!(&tail, b"tail");
        assert!(fs.get_char().unwrap().is_none());
        drop(fs);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_seek_and_truncate() {
        let path = temp_path("truncate");
        let mut fs = FileStream::open(&path, FileMode::Write).unwrap();
        fs.write(&[1, 2, 3, 4, 5, 6]).unwrap();
        fs.seek(SeekFrom::Start(2)).unwrap();
        assert_eq!(fs.get_u8().unwrap(), 3);
        fs.truncate(3).unwrap();
        assert_eq!(fs.size().unwrap(), 3);
        fs.seek(SeekFrom::End(0)).unwrap();
        fs.write(&[9]).unwrap();
        fs.rewind().unwrap();
        let mut all = [0u8; 4];
        fs.read(&mut all, true).unwrap();
        assert_eq!(all, [1, 2, 3, 9]);
        drop(fs);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let path = temp_path("readonly");
        std::fs::write(&path, b"x").unwrap();
        let mut fs = FileStream::open(&path, FileMode::Read).unwrap();
        assert!(matches!(fs.write(b"y"), Err(StreamError::NotWriteable)));
        assert!(!fs.attributes().contains(Attributes::WRITEABLE));
        drop(fs);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_write_safe_refuses_existing() {
        let path = temp_path("safe");
        std::fs::write(&path, b"x").unwrap();
        assert!(FileStream::open(&path, FileMode::WriteSafe).is_err());
        std::fs::remove_file(&path).ok();
    }
}
