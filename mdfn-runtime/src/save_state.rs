//! Save state slots
//!
//! Quick save/load to numbered slots or explicit files, with optional zstd
//! compression on disk. Compressed files are recognized on load by the zstd
//! frame magic, so both kinds can sit side by side.

use crate::module::EmulationModule;
use crate::movie::MovieController;
use crate::notify::{NoticeType, NotificationSink, SlotInfo, StateStatus, SLOT_COUNT};
use crate::paths::SlotResolver;
use anyhow::{bail, Context, Result};
use mdfn_core::state::{load_sm, save_sm, state_info, LoadReport, Preview, SaveOptions};
use mdfn_core::{FileMode, FileStream, MemoryStream, StateError, Stream, StreamExt};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// First four bytes of every zstd frame.
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
/// Refuse to slurp state files larger than this.
const MAX_STATE_FILE: u64 = 1 << 30;

/// On-disk options for saved states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateFileOptions {
    /// zstd level, or `None` to store states uncompressed.
    pub compression_level: Option<i32>,
}

impl Default for StateFileOptions {
    fn default() -> Self {
        Self {
            compression_level: Some(3),
        }
    }
}

/// Numbered save-state slots for one session.
pub struct SaveStateSlots {
    options: StateFileOptions,
    current: usize,
    recently_saved: Option<usize>,
    slots: [SlotInfo; SLOT_COUNT],
    resolver: Rc<dyn SlotResolver>,
    sink: Rc<dyn NotificationSink>,
}

impl SaveStateSlots {
    pub fn new(resolver: Rc<dyn SlotResolver>, sink: Rc<dyn NotificationSink>, options: StateFileOptions) -> Self {
        Self {
            options,
            current: 0,
            recently_saved: None,
            slots: [SlotInfo::default(); SLOT_COUNT],
            resolver,
            sink,
        }
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn recently_saved(&self) -> Option<usize> {
        self.recently_saved
    }

    pub fn slots(&self) -> &[SlotInfo; SLOT_COUNT] {
        &self.slots
    }

    /// Save to the selected slot, or to `path`. Returns the file written.
    pub fn save_state(
        &mut self,
        module: &mut dyn EmulationModule,
        path: Option<&Path>,
        preview: Option<Preview>,
    ) -> Result<PathBuf> {
        let slot = path.is_none().then_some(self.current);
        let target = match path {
            Some(path) => path.to_path_buf(),
            None => self.resolver.state_path(self.current),
        };

        match self.write_state(module, &target, preview) {
            Ok(()) => {
                if let Some(slot) = slot {
                    self.slots[slot] = SlotInfo {
                        present: true,
                        modified: std::fs::metadata(&target).and_then(|m| m.modified()).ok(),
                    };
                    self.recently_saved = Some(slot);
                    self.sink.notify(NoticeType::Status, &format!("State {} saved.", slot));
                }
                Ok(target)
            }
            Err(e) => {
                let message = match slot {
                    Some(slot) => format!("State {} save error: {:#}", slot, e),
                    None => format!("State save error: {:#}", e),
                };
                self.sink.notify(NoticeType::Error, &message);
                Err(e)
            }
        }
    }

    /// Load from the selected slot, or from `path`.
    ///
    /// A load during movie recording is itself recorded, so playback
    /// reproduces it.
    pub fn load_state(
        &mut self,
        module: &mut dyn EmulationModule,
        movie: &mut MovieController,
        path: Option<&Path>,
    ) -> Result<LoadReport> {
        let slot = path.is_none().then_some(self.current);
        let target = match path {
            Some(path) => path.to_path_buf(),
            None => self.resolver.state_path(self.current),
        };

        let report = match self.read_state(module, &target) {
            Ok(report) => report,
            Err(e) => {
                let message = match slot {
                    Some(slot) => format!("State {} load error: {:#}", slot, e),
                    None => format!("State load error: {:#}", e),
                };
                self.sink.notify(NoticeType::Error, &message);
                return Err(e);
            }
        };

        if movie.is_recording() {
            movie.record_state(module);
        }

        if let Some(slot) = slot {
            self.sink.notify(NoticeType::Status, &format!("State {} loaded.", slot));
        }
        if !report.is_clean() {
            self.sink.notify(
                NoticeType::Warning,
                &format!("State loaded with {} compatibility warning(s).", report.warnings.len()),
            );
        }
        Ok(report)
    }

    /// Probe all slots. Probe failures just mean "absent".
    pub fn check_states(&mut self) {
        let mut newest = None;
        for slot in 0..SLOT_COUNT {
            let info = match std::fs::metadata(self.resolver.state_path(slot)) {
                Ok(meta) => SlotInfo {
                    present: true,
                    modified: meta.modified().ok(),
                },
                Err(_) => SlotInfo::default(),
            };
            if let Some(time) = info.modified {
                if newest.map_or(true, |(t, _)| time > t) {
                    newest = Some((time, slot));
                }
            }
            self.slots[slot] = info;
        }
        self.recently_saved = newest.map(|(_, slot)| slot);
        self.current = 0;
    }

    /// Select a slot and publish its status with preview.
    pub fn select_state(&mut self, slot: usize) {
        if slot >= SLOT_COUNT {
            return;
        }
        self.sink.set_movie_status(None);
        self.current = slot;

        let preview = if self.slots[slot].present {
            match read_state_file(&self.resolver.state_path(slot)).and_then(|data| {
                let mut stream = MemoryStream::from_vec(data);
                Ok(state_info(&mut stream)?.preview)
            }) {
                Ok(preview) => preview,
                Err(e) => {
                    self.sink.notify(NoticeType::Warning, &format!("{:#}", e));
                    self.sink.set_state_status(None);
                    return;
                }
            }
        } else {
            None
        };

        self.sink.set_state_status(Some(StateStatus {
            slots: self.slots,
            current: slot,
            current_movie: 0,
            recently_saved: self.recently_saved,
            preview,
        }));
    }

    fn write_state(&self, module: &mut dyn EmulationModule, target: &Path, preview: Option<Preview>) -> Result<()> {
        let module_name = module.shortname().to_string();
        let participant = module
            .state_action()
            .ok_or(StateError::Unsupported { module: module_name })?;

        let mut buffer = MemoryStream::with_capacity(256 * 1024);
        let options = SaveOptions {
            data_only: false,
            preview,
        };
        save_sm(&mut buffer, participant, &options).context("Failed to serialize state")?;

        let data = match self.options.compression_level {
            Some(level) => zstd::bulk::compress(buffer.as_slice(), level)
                .map_err(|e| StateError::Compression(e.to_string()))
                .context("Failed to compress state")?,
            None => buffer.into_inner(),
        };

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        let mut file = FileStream::open(target, FileMode::Write)
            .with_context(|| format!("Failed to open {}", target.display()))?;
        file.write(&data).context("Failed to write state file")?;
        file.close().context("Failed to write state file")?;

        log::debug!("Wrote {} bytes to {}", data.len(), target.display());
        Ok(())
    }

    fn read_state(&self, module: &mut dyn EmulationModule, target: &Path) -> Result<LoadReport> {
        let module_name = module.shortname().to_string();
        let participant = module
            .state_action()
            .ok_or(StateError::Unsupported { module: module_name })?;

        let data = read_state_file(target)?;
        let mut stream = MemoryStream::from_vec(data);
        let report = load_sm(&mut stream, participant, false).context("Failed to load state")?;
        Ok(report)
    }
}

/// Read a state file, transparently decompressing zstd.
pub fn read_state_file(path: &Path) -> Result<Vec<u8>> {
    let mut file =
        FileStream::open(path, FileMode::Read).with_context(|| format!("Failed to open {}", path.display()))?;
    let raw = file
        .alloc_and_read(MAX_STATE_FILE)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    decompress_if_needed(raw)
}

/// Undo zstd compression if `raw` starts with a zstd frame.
pub fn decompress_if_needed(raw: Vec<u8>) -> Result<Vec<u8>> {
    decompress_limited(raw, MAX_STATE_FILE)
}

fn decompress_limited(raw: Vec<u8>, limit: u64) -> Result<Vec<u8>> {
    if !raw.starts_with(&ZSTD_MAGIC) {
        return Ok(raw);
    }
    let decoder = zstd::stream::read::Decoder::new(raw.as_slice())
        .map_err(|e| StateError::Compression(e.to_string()))
        .context("Failed to decompress state")?;

    // One byte past the limit tells "exactly at" from "over".
    let mut data = Vec::new();
    decoder
        .take(limit + 1)
        .read_to_end(&mut data)
        .map_err(|e| StateError::Compression(e.to_string()))
        .context("Failed to decompress state")?;
    if data.len() as u64 > limit {
        bail!("Decompressed state exceeds {} bytes", limit);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_data_passes_through() {
        let raw = b"MDFNSVST".to_vec();
        assert_eq!(decompress_if_needed(raw.clone()).unwrap(), raw);
    }

    #[test]
    fn test_decompressed_size_is_bounded() {
        let plain = vec![0u8; 64 * 1024];
        let packed = zstd::bulk::compress(&plain, 3).unwrap();
        assert!(packed.len() < 1024);

        let err = decompress_limited(packed.clone(), 4096).unwrap_err();
        assert!(format!("{:#}", err).contains("exceeds 4096 bytes"));
        assert_eq!(decompress_limited(packed, plain.len() as u64).unwrap(), plain);
    }

    #[test]
    fn test_compressed_data_is_detected() {
        let plain = vec![0x42u8; 4096];
        let packed = zstd::bulk::compress(&plain, 3).unwrap();
        assert!(packed.starts_with(&ZSTD_MAGIC));
        assert_eq!(decompress_if_needed(packed).unwrap(), plain);
    }
}
