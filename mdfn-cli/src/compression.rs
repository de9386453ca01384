//! State File Compression
//!
//! Converts state files between the plain and zstd-packed on-disk forms.
//! Both forms load the same way, so conversion only trades size for speed.

use anyhow::{bail, Context, Result};
use mdfn_core::state::state_info;
use mdfn_core::MemoryStream;
use mdfn_runtime::save_state::decompress_if_needed;
use std::path::Path;

/// zstd accepts levels 1..=22.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(i32);

impl CompressionLevel {
    pub fn new(level: i32) -> Self {
        Self(level.clamp(1, 22))
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

/// Read a state file in either form and check that it is a state.
fn read_plain(input_path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(input_path).with_context(|| format!("Failed to read {}", input_path.display()))?;
    let data = decompress_if_needed(raw)?;

    let mut stream = MemoryStream::from_vec(data);
    state_info(&mut stream).with_context(|| format!("{} is not a save state", input_path.display()))?;
    Ok(stream.into_inner())
}

/// Write `input_path` zstd-compressed. Returns (plain, packed) sizes.
pub fn pack_state(input_path: &Path, output_path: &Path, level: CompressionLevel) -> Result<(usize, usize)> {
    let data = read_plain(input_path)?;
    let packed = zstd::bulk::compress(&data, level.get()).context("Failed to compress state")?;
    std::fs::write(output_path, &packed).with_context(|| format!("Failed to write {}", output_path.display()))?;
    log::debug!("Packed {} -> {} bytes", data.len(), packed.len());
    Ok((data.len(), packed.len()))
}

/// Write `input_path` uncompressed. Returns the plain size.
pub fn unpack_state(input_path: &Path, output_path: &Path) -> Result<usize> {
    if input_path == output_path {
        bail!("Refusing to unpack {} onto itself", input_path.display());
    }
    let data = read_plain(input_path)?;
    std::fs::write(output_path, &data).with_context(|| format!("Failed to write {}", output_path.display()))?;
    Ok(data.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdfn_core::state::{save_sm, SaveOptions};
    use mdfn_core::{StateAction, StateError, StateMem, StateVar};
    use std::path::PathBuf;

    struct Blob(Vec<u8>);

    impl StateAction for Blob {
        fn state_action(&mut self, sm: &mut StateMem<'_>, _load: bool, _data_only: bool) -> Result<(), StateError> {
            sm.section("BLOB", &mut [StateVar::new("data", &mut self.0)])?;
            Ok(())
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mdfn-cli-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_pack_then_unpack() {
        let plain = temp_path("plain.mcs");
        let packed = temp_path("packed.mcs");
        let unpacked = temp_path("unpacked.mcs");

        let mut stream = MemoryStream::new();
        save_sm(&mut stream, &mut Blob(vec![7; 4096]), &SaveOptions::full()).unwrap();
        std::fs::write(&plain, stream.as_slice()).unwrap();

        let (plain_len, packed_len) = pack_state(&plain, &packed, CompressionLevel::new(99)).unwrap();
        assert!(packed_len < plain_len);
        assert_eq!(unpack_state(&packed, &unpacked).unwrap(), plain_len);
        assert_eq!(std::fs::read(&unpacked).unwrap(), std::fs::read(&plain).unwrap());

        for path in [plain, packed, unpacked] {
            std::fs::remove_file(path).ok();
        }
    }

    #[test]
    fn test_rejects_non_state() {
        let junk = temp_path("junk.bin");
        std::fs::write(&junk, b"definitely not a state").unwrap();
        assert!(pack_state(&junk, &temp_path("junk.out"), CompressionLevel::new(3)).is_err());
        std::fs::remove_file(junk).ok();
    }
}
