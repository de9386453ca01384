// Tests for the stream layer
#[cfg(test)]
mod tests {
    use mdfn_core::stream::SeekFrom;
    use mdfn_core::{Attributes, FileMode, FileStream, LineEnd, MemoryStream, Stream, StreamError, StreamExt};

    #[test]
    fn test_memory_roundtrip() {
        let samples: [&[u8]; 4] = [b"", b"x", b"hello world", &[0u8, 255, 1, 254, 2, 253]];
        for sample in samples {
            let mut ms = MemoryStream::new();
            ms.write(sample).unwrap();
            ms.rewind().unwrap();
            let mut back = vec![0u8; sample.len()];
            ms.read(&mut back, true).unwrap();
            assert_eq!(back, sample);
        }
    }

    #[test]
    fn test_seek_then_tell() {
        let mut ms = MemoryStream::from_vec(vec![0u8; 16]);
        assert_eq!(ms.seek(SeekFrom::Start(5)).unwrap(), 5);
        assert_eq!(ms.tell(), 5);
        assert_eq!(ms.seek(SeekFrom::Current(3)).unwrap(), 8);
        assert_eq!(ms.seek(SeekFrom::Current(-8)).unwrap(), 0);
        assert_eq!(ms.seek(SeekFrom::End(-4)).unwrap(), 12);
        assert_eq!(ms.seek(SeekFrom::End(0)).unwrap(), 16);
        assert_eq!(ms.tell(), 16);
    }

    #[test]
    fn test_seek_before_start_fails() {
        let mut ms = MemoryStream::from_vec(vec![1, 2, 3]);
        assert!(matches!(ms.seek(SeekFrom::Current(-1)), Err(StreamError::SeekBeforeStart)));
        assert_eq!(ms.tell(), 0);
    }

    #[test]
    fn test_sparse_write_zero_fills_hole() {
        let mut ms = MemoryStream::from_vec(vec![0xAA; 4]);
        ms.seek(SeekFrom::Start(10)).unwrap();
        assert_eq!(ms.len(), 4);
        ms.write(&[0xBB, 0xCC]).unwrap();
        assert_eq!(ms.len(), 12);
        assert_eq!(&ms.as_slice()[4..10], &[0u8; 6]);
        assert_eq!(&ms.as_slice()[10..], &[0xBB, 0xCC]);
    }

    #[test]
    fn test_huge_sparse_write_fails_cleanly() {
        let mut ms = MemoryStream::from_vec(vec![0xAA; 4]);
        ms.seek(SeekFrom::Start(1 << 50)).unwrap();
        assert!(matches!(ms.write(&[1]), Err(StreamError::TooLarge(_))));
        assert!(matches!(ms.truncate(1 << 50), Err(StreamError::TooLarge(_))));
        assert_eq!(ms.as_slice(), &[0xAA; 4]);
    }

    #[test]
    fn test_short_read() {
        let mut ms = MemoryStream::from_vec(vec![1, 2, 3]);
        let mut buf = [0u8; 8];
        let err = ms.read(&mut buf, true).unwrap_err();
        assert!(err.is_eof());

        ms.rewind().unwrap();
        assert_eq!(ms.read(&mut buf, false).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_get_line_crlf() {
        let mut ms = MemoryStream::from_vec(b"abc\r\ndef".to_vec());
        let mut line = String::new();

        let end = ms.get_line(&mut line).unwrap();
        assert_eq!(line, "abc");
        assert_eq!(end, LineEnd::CrLf);
        assert_eq!(end.code(), 0x0D0A);

        let end = ms.get_line(&mut line).unwrap();
        assert_eq!(line, "def");
        assert_eq!(end.code(), 256);

        let end = ms.get_line(&mut line).unwrap();
        assert_eq!(line, "");
        assert_eq!(end.code(), -1);
    }

    #[test]
    fn test_get_line_mem_crlf() {
        let mut ms = MemoryStream::from_vec(b"abc\r\ndef".to_vec());
        let first = ms.get_line_mem().unwrap();
        assert_eq!(&*first.line, b"abc");
        assert_eq!(first.end.code(), 0x0D0A);

        let second = ms.get_line_mem().unwrap();
        assert_eq!(&*second.line, b"def");
        assert_eq!(second.end.code(), 256);
    }

    #[test]
    fn test_get_line_through_box() {
        let mut stream: Box<dyn Stream> = Box::new(MemoryStream::from_vec(b"one\ntwo\rthree\0".to_vec()));
        let mut line = String::new();
        assert_eq!(stream.get_line(&mut line).unwrap(), LineEnd::Lf);
        assert_eq!(line, "one");
        assert_eq!(stream.get_line(&mut line).unwrap(), LineEnd::Cr);
        assert_eq!(line, "two");
        assert_eq!(stream.get_line(&mut line).unwrap(), LineEnd::Nul);
        assert_eq!(line, "three");
        assert_eq!(stream.get_line(&mut line).unwrap(), LineEnd::Empty);
    }

    #[test]
    fn test_byte_wise_get_line_on_file() {
        let path = std::env::temp_dir().join(format!("mdfn-stream-test-{}-lines", std::process::id()));
        std::fs::write(&path, b"abc\r\ndef\rg").unwrap();

        let mut fs = FileStream::open(&path, FileMode::Read).unwrap();
        let mut line = String::new();
        assert_eq!(fs.get_line(&mut line).unwrap(), LineEnd::CrLf);
        assert_eq!(line, "abc");
        assert_eq!(fs.get_line(&mut line).unwrap(), LineEnd::Cr);
        assert_eq!(line, "def");
        assert_eq!(fs.get_line(&mut line).unwrap(), LineEnd::Eof);
        assert_eq!(line, "g");
        assert_eq!(fs.get_line(&mut line).unwrap(), LineEnd::Empty);

        drop(fs);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_typed_accessors() {
        let mut ms = MemoryStream::new();
        ms.put_le::<u32>(0x0102_0304).unwrap();
        ms.put_be::<u16>(0x0A0B).unwrap();
        ms.put_le::<i16>(-2).unwrap();
        ms.put_le::<f64>(0.25).unwrap();
        assert_eq!(&ms.as_slice()[..8], &[0x04, 0x03, 0x02, 0x01, 0x0A, 0x0B, 0xFE, 0xFF]);

        ms.rewind().unwrap();
        assert_eq!(ms.get_le::<u32>().unwrap(), 0x0102_0304);
        assert_eq!(ms.get_be::<u16>().unwrap(), 0x0A0B);
        assert_eq!(ms.get_le::<i16>().unwrap(), -2);
        assert_eq!(ms.get_le::<f64>().unwrap(), 0.25);
        assert!(ms.get_u8().unwrap_err().is_eof());
    }

    #[test]
    fn test_native_and_reverse_endian_are_opposites() {
        let mut ms = MemoryStream::new();
        ms.put_ne::<u32>(0x1122_3344).unwrap();
        ms.rewind().unwrap();
        assert_eq!(ms.get_re::<u32>().unwrap(), 0x4433_2211);
    }

    #[test]
    fn test_strings_and_bom() {
        let mut ms = MemoryStream::new();
        ms.write_utf8_bom().unwrap();
        ms.put_line("first").unwrap();
        ms.print_format(format_args!("{}-{}", 1, 2)).unwrap();

        ms.rewind().unwrap();
        assert!(ms.read_utf8_bom().unwrap());
        assert_eq!(ms.get_string(6, true).unwrap(), "first\n");
        assert_eq!(ms.get_string(10, false).unwrap(), "1-2");

        let mut plain = MemoryStream::from_vec(b"no bom".to_vec());
        assert!(!plain.read_utf8_bom().unwrap());
        assert_eq!(plain.tell(), 0);
    }

    #[test]
    fn test_read_discard_reports_consumed() {
        let mut ms = MemoryStream::from_vec(vec![7u8; 10_000]);
        assert_eq!(ms.read_discard(6_000).unwrap(), 6_000);
        assert_eq!(ms.read_discard(6_000).unwrap(), 4_000);
        assert_eq!(ms.get_char().unwrap(), None);
    }

    #[test]
    fn test_from_stream_respects_limit() {
        let mut source = MemoryStream::from_vec(vec![3u8; 64]);
        source.seek(SeekFrom::Start(16)).unwrap();

        let err = MemoryStream::from_stream(&mut source, 8).unwrap_err();
        assert!(matches!(err, StreamError::SizeLimitExceeded { limit: 8 }));
        assert_eq!(source.tell(), 16);

        let copy = MemoryStream::from_stream(&mut source, 48).unwrap();
        assert_eq!(copy.len(), 48);
        assert_eq!(copy.tell(), 0);
    }

    /// In-memory stream that only hands out its data through `map`.
    struct MapOnly {
        data: Vec<u8>,
        pos: u64,
        mapped: bool,
    }

    impl Stream for MapOnly {
        fn attributes(&self) -> Attributes {
            Attributes::READABLE | Attributes::SEEKABLE | Attributes::INMEM_FAST
        }

        fn map(&mut self) -> Option<&[u8]> {
            self.mapped = true;
            Some(&self.data)
        }

        fn map_size(&self) -> u64 {
            if self.mapped {
                self.data.len() as u64
            } else {
                0
            }
        }

        fn unmap(&mut self) {
            self.mapped = false;
        }

        fn read(&mut self, _buf: &mut [u8], _error_on_eos: bool) -> mdfn_core::stream::Result<usize> {
            Err(StreamError::NotReadable)
        }

        fn write(&mut self, _buf: &[u8]) -> mdfn_core::stream::Result<()> {
            Err(StreamError::NotWriteable)
        }

        fn truncate(&mut self, _length: u64) -> mdfn_core::stream::Result<()> {
            Err(StreamError::NotWriteable)
        }

        fn seek(&mut self, pos: SeekFrom) -> mdfn_core::stream::Result<u64> {
            if let SeekFrom::Start(at) = pos {
                self.pos = at;
            }
            Ok(self.pos)
        }

        fn tell(&self) -> u64 {
            self.pos
        }

        fn size(&mut self) -> mdfn_core::stream::Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn flush(&mut self) -> mdfn_core::stream::Result<()> {
            Ok(())
        }

        fn close(&mut self) -> mdfn_core::stream::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_alloc_and_read_copies_from_map() {
        let mut stream = MapOnly {
            data: (0..32).collect(),
            pos: 20,
            mapped: false,
        };
        assert!(matches!(
            stream.alloc_and_read(4),
            Err(StreamError::SizeLimitExceeded { limit: 4 })
        ));
        assert_eq!(stream.tell(), 20);

        let rest = stream.alloc_and_read(12).unwrap();
        assert_eq!(rest, (20..32).collect::<Vec<u8>>());
        assert_eq!(stream.tell(), 32);
        assert_eq!(stream.map_size(), 0);
    }

    #[test]
    fn test_into_inner_takes_buffer() {
        let mut ms = MemoryStream::with_size(4);
        ms.write(&[1, 2]).unwrap();
        let data = ms.into_inner();
        assert_eq!(data, vec![1, 2, 0, 0]);
    }

    #[test]
    fn test_memory_stream_is_fast_seekable() {
        let ms = MemoryStream::new();
        assert!(ms.attributes().contains(Attributes::INMEM_FAST | Attributes::SEEKABLE));
        assert!(ms.require_fast_seekable().is_ok());
    }
}
