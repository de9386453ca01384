//! Test Utilities
//!
//! A toy emulation module, a notification sink that remembers what it was
//! told, and per-test scratch directories.

#![allow(dead_code)]

use mdfn_core::{StateAction, StateError, StateMem, StateVar};
use mdfn_runtime::{EmulationModule, MediaChange, MediaError, NoticeType, NotificationSink, StateStatus};
use std::cell::RefCell;
use std::path::{Path, PathBuf};

/// Deterministic toy machine: two input bytes per frame drive a counter and
/// scribble into RAM.
#[derive(Debug, Clone, PartialEq)]
pub struct ToyConsole {
    pub counter: u32,
    pub ram: [u8; 32],
    pub media: MediaChange,
    pub commands: Vec<u8>,
    pub supports_states: bool,
    pub media_count: u32,
}

impl ToyConsole {
    pub fn new() -> Self {
        Self {
            counter: 0,
            ram: [0; 32],
            media: MediaChange::default(),
            commands: Vec::new(),
            supports_states: true,
            media_count: 2,
        }
    }

    pub fn run_frame(&mut self, input: &[u8]) {
        self.counter = self.counter.wrapping_add(u32::from(input[0]) + 1);
        let at = self.counter as usize % self.ram.len();
        self.ram[at] ^= input[1];
    }
}

impl StateAction for ToyConsole {
    fn state_action(&mut self, sm: &mut StateMem<'_>, _load: bool, _data_only: bool) -> Result<(), StateError> {
        sm.section(
            "TOY",
            &mut [
                StateVar::new("counter", &mut self.counter),
                StateVar::bytes("ram", &mut self.ram),
                StateVar::new("media", &mut self.media.media_idx),
            ],
        )?;
        Ok(())
    }
}

impl EmulationModule for ToyConsole {
    fn shortname(&self) -> &str {
        "toy"
    }

    fn state_action(&mut self) -> Option<&mut dyn StateAction> {
        if self.supports_states {
            Some(self)
        } else {
            None
        }
    }

    fn do_simple_command(&mut self, cmd: u8) {
        self.commands.push(cmd);
    }

    fn set_media(&mut self, change: MediaChange) -> Result<(), MediaError> {
        if change.media_idx >= self.media_count {
            return Err(MediaError::NoSuchMedia(change.media_idx));
        }
        self.media = change;
        Ok(())
    }
}

/// Sink that keeps every notification and the last published statuses.
#[derive(Default)]
pub struct RecordingSink {
    pub notices: RefCell<Vec<(NoticeType, String)>>,
    pub state_status: RefCell<Option<StateStatus>>,
    pub movie_status: RefCell<Option<StateStatus>>,
}

impl RecordingSink {
    pub fn has(&self, kind: NoticeType, needle: &str) -> bool {
        self.notices
            .borrow()
            .iter()
            .any(|(k, message)| *k == kind && message.contains(needle))
    }

    pub fn errors(&self) -> usize {
        self.notices
            .borrow()
            .iter()
            .filter(|(k, _)| *k == NoticeType::Error)
            .count()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, kind: NoticeType, message: &str) {
        self.notices.borrow_mut().push((kind, message.to_string()));
    }

    fn set_state_status(&self, status: Option<StateStatus>) {
        *self.state_status.borrow_mut() = status;
    }

    fn set_movie_status(&self, status: Option<StateStatus>) {
        *self.movie_status.borrow_mut() = status;
    }
}

/// Fresh scratch directory, removed on drop.
pub struct ScratchDir(PathBuf);

impl ScratchDir {
    pub fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("mdfn-runtime-{}-{}", std::process::id(), name));
        std::fs::remove_dir_all(&path).ok();
        std::fs::create_dir_all(&path).unwrap();
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.0).ok();
    }
}
