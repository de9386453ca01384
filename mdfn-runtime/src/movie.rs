//! Movie recording and playback
//!
//! A movie is a full state snapshot followed by one record per frame: a run of
//! command bytes ended by [`commands::FRAME_END`], then each port's raw input
//! bytes. Port widths are fixed for a session, so records carry no lengths.
//!
//! ```text
//! [state] [cmd* 00 port0 port1 ...] [cmd* 00 port0 port1 ...] ... [80 state]
//! ```
//!
//! # State Machine
//! `Stopped -> Recording` and `Stopped -> Playing` open the movie file and
//! write or restore the leading snapshot. Asking to record while recording (or
//! play while playing) stops. Recording stops by appending one last snapshot.
//!
//! Any failure after the movie file is open (I/O, truncated data, rejected
//! media change) forces the controller back to `Stopped`, drops the file,
//! and notifies the user. Nothing propagates past [`MovieController::process_input`].
//!
//! # Rewind
//! The controller takes part in data-only states with its file position. When
//! such a state is loaded the file is seeked back, and while recording it is
//! truncated there, so rewinding and continuing produces a consistent movie.

use crate::commands;
use crate::module::{EmulationModule, MediaChange, MediaError};
use crate::notify::{NoticeType, NotificationSink, SlotInfo, StateStatus, SLOT_COUNT};
use crate::paths::SlotResolver;
use mdfn_core::state::{load_sm, save_sm, state_info, Preview, SaveOptions};
use mdfn_core::stream::SeekFrom;
use mdfn_core::{FileMode, FileStream, StateAction, StateError, StateMem, StateVar, Stream, StreamError, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

/// Section name of the movie position record in data-only states.
pub const MOVIE_SECTION: &str = "MEDNAFEN_MOVIE";

#[derive(Error, Debug)]
pub enum MovieError {
    #[error("module \"{module}\" doesn't support save states")]
    Unsupported { module: String },

    #[error("module {module} is not compatible with manual movie save starting/stopping during netplay")]
    NetplayIncompatible { module: String },

    #[error("can't play movies during netplay")]
    NetplayActive,

    #[error("can't record movie during movie playback")]
    RecordingDuringPlayback,

    #[error("can't play movie during movie recording")]
    PlaybackDuringRecording,

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("untrusted media change rejected: {0}")]
    Media(#[from] MediaError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MovieMode {
    Stopped,
    Playing,
    Recording,
}

/// Single active movie of an emulation session.
pub struct MovieController {
    mode: MovieMode,
    /// Slot of the active movie; `None` for an explicit path or no movie.
    active_slot: Option<usize>,
    stream: Option<Box<dyn Stream>>,
    current: usize,
    recently_saved: Option<usize>,
    slots: [SlotInfo; SLOT_COUNT],
    netplay_active: bool,
    resolver: Rc<dyn SlotResolver>,
    sink: Rc<dyn NotificationSink>,
}

impl MovieController {
    pub fn new(resolver: Rc<dyn SlotResolver>, sink: Rc<dyn NotificationSink>) -> Self {
        Self {
            mode: MovieMode::Stopped,
            active_slot: None,
            stream: None,
            current: 0,
            recently_saved: None,
            slots: [SlotInfo::default(); SLOT_COUNT],
            netplay_active: false,
            resolver,
            sink,
        }
    }

    pub fn mode(&self) -> MovieMode {
        self.mode
    }

    pub fn is_playing(&self) -> bool {
        self.mode == MovieMode::Playing
    }

    pub fn is_recording(&self) -> bool {
        self.mode == MovieMode::Recording
    }

    /// Selected movie slot.
    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn recently_saved(&self) -> Option<usize> {
        self.recently_saved
    }

    pub fn slots(&self) -> &[SlotInfo; SLOT_COUNT] {
        &self.slots
    }

    /// `1 + slot` while recording, `-1 - slot` while playing, 0 otherwise
    /// (including movies opened by explicit path).
    pub fn current_movie(&self) -> i32 {
        match (self.mode, self.active_slot) {
            (MovieMode::Recording, Some(slot)) => 1 + slot as i32,
            (MovieMode::Playing, Some(slot)) => -1 - slot as i32,
            _ => 0,
        }
    }

    pub fn set_netplay_active(&mut self, active: bool) {
        self.netplay_active = active;
    }

    /// Start recording to the selected slot (or `path`), or stop if already
    /// recording.
    pub fn save_movie(
        &mut self,
        module: &mut dyn EmulationModule,
        path: Option<&Path>,
        preview: Option<Preview>,
    ) -> Result<(), MovieError> {
        let checked = self.check_can_record(module);
        if let Err(e) = checked {
            self.sink.notify(NoticeType::Error, &format!("Movie error: {}", e));
            return Err(e);
        }

        if self.mode == MovieMode::Recording {
            self.stop(module);
            return Ok(());
        }

        let slot = path.is_none().then_some(self.current);
        let target = self.target_path(path);
        self.mode = MovieMode::Recording;
        self.active_slot = slot;

        match self.begin_recording(module, &target, preview) {
            Ok(()) => {
                self.sink.notify(NoticeType::Status, "Movie recording started.");
                if let Some(slot) = slot {
                    self.slots[slot] = SlotInfo {
                        present: true,
                        modified: std::fs::metadata(&target).and_then(|m| m.modified()).ok(),
                    };
                    self.recently_saved = Some(slot);
                }
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Start playback of the selected slot (or `path`), or stop if already
    /// playing.
    pub fn load_movie(&mut self, module: &mut dyn EmulationModule, path: Option<&Path>) -> Result<(), MovieError> {
        let checked = self.check_can_play(module);
        if let Err(e) = checked {
            self.sink.notify(NoticeType::Error, &format!("Movie error: {}", e));
            return Err(e);
        }

        if self.mode == MovieMode::Playing {
            self.stop(module);
            return Ok(());
        }

        let slot = path.is_none().then_some(self.current);
        let target = self.target_path(path);
        self.mode = MovieMode::Playing;
        self.active_slot = slot;
        if let Some(slot) = slot {
            self.slots[slot].present = true;
        }

        match self.begin_playback(module, &target) {
            Ok(()) => {
                self.sink.notify(NoticeType::Status, "Movie playback started.");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Stop playback or recording. Recording ends with a final snapshot.
    pub fn stop(&mut self, module: &mut dyn EmulationModule) {
        let previous = self.mode;
        if previous == MovieMode::Stopped {
            return;
        }

        if previous == MovieMode::Recording {
            self.record_state(module);
            if self.mode == MovieMode::Stopped {
                // Final snapshot failed; the error path already cleaned up.
                return;
            }
        }

        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close() {
                self.sink.notify(NoticeType::Error, &format!("Movie error: {}", e));
            }
        }
        self.mode = MovieMode::Stopped;
        self.active_slot = None;

        match previous {
            MovieMode::Playing => self.sink.notify(NoticeType::Status, "Movie playback stopped."),
            MovieMode::Recording => self.sink.notify(NoticeType::Status, "Movie recording stopped."),
            MovieMode::Stopped => {}
        }
    }

    /// Per-frame movie step.
    ///
    /// While playing, replays this frame's commands into `module` and
    /// overwrites each port buffer with recorded input. While recording,
    /// appends a frame record with the live port buffers. Empty port slices
    /// stand for unconnected ports.
    pub fn process_input(&mut self, module: &mut dyn EmulationModule, ports: &mut [&mut [u8]]) {
        let result = match self.mode {
            MovieMode::Stopped => return,
            MovieMode::Playing => self.play_frame(module, ports),
            MovieMode::Recording => self.record_frame(ports).map(|_| true),
        };

        match result {
            Ok(true) => {}
            Ok(false) => self.stop(module),
            Err(e) => {
                self.fail(e);
            }
        }
    }

    /// Append an arbitrary command while recording.
    pub fn add_command(&mut self, cmd: u8, data: &[u8]) {
        if self.mode != MovieMode::Recording {
            return;
        }
        let result = self.with_stream(|stream| {
            stream.put_u8(cmd)?;
            if !data.is_empty() {
                stream.write(data)?;
            }
            Ok(())
        });
        if let Err(e) = result {
            self.fail(e);
        }
    }

    /// Record a media change while recording.
    pub fn add_media_change(&mut self, change: MediaChange) {
        self.add_command(commands::SET_MEDIA, &change.encode());
    }

    /// Append a load-state command and a full snapshot while recording, so
    /// playback reproduces a state load made during authoring.
    pub fn record_state(&mut self, module: &mut dyn EmulationModule) {
        if self.mode != MovieMode::Recording {
            return;
        }
        if let Err(e) = self.write_snapshot(module, true) {
            self.fail(e);
        }
    }

    /// Probe all movie slots. Probe failures just mean "absent".
    pub fn check_movies(&mut self, module: &mut dyn EmulationModule) {
        if module.state_action().is_none() {
            return;
        }

        let mut newest = None;
        for slot in 0..SLOT_COUNT {
            self.slots[slot] = SlotInfo::default();
            let Ok(meta) = std::fs::metadata(self.resolver.movie_path(slot)) else {
                continue;
            };
            let modified = meta.modified().ok();
            self.slots[slot] = SlotInfo {
                present: true,
                modified,
            };
            if let Some(time) = modified {
                if newest.map_or(true, |(t, _)| time > t) {
                    newest = Some((time, slot));
                }
            }
        }

        if let Some((_, slot)) = newest {
            self.recently_saved = Some(slot);
        }
        self.current = 0;
    }

    /// Select a movie slot and publish its status with the leading
    /// snapshot's preview.
    pub fn select_movie(&mut self, slot: usize) {
        if slot >= SLOT_COUNT {
            return;
        }
        self.sink.set_state_status(None);
        self.current = slot;

        let path = self.resolver.movie_path(slot);
        let preview = if self.slots[slot].present {
            match read_preview(&path) {
                Ok(preview) => preview,
                Err(e) => {
                    self.sink.notify(NoticeType::Warning, &e.to_string());
                    self.sink.set_movie_status(None);
                    return;
                }
            }
        } else {
            None
        };

        self.sink.set_movie_status(Some(StateStatus {
            slots: self.slots,
            current: self.current,
            current_movie: self.current_movie(),
            recently_saved: self.recently_saved,
            preview,
        }));
    }

    fn check_can_record(&self, module: &mut dyn EmulationModule) -> Result<(), MovieError> {
        if module.state_action().is_none() {
            return Err(MovieError::Unsupported {
                module: module.shortname().to_string(),
            });
        }
        if self.netplay_active && module.save_state_alters_state() {
            return Err(MovieError::NetplayIncompatible {
                module: module.shortname().to_string(),
            });
        }
        if self.mode == MovieMode::Playing {
            return Err(MovieError::RecordingDuringPlayback);
        }
        Ok(())
    }

    fn check_can_play(&self, module: &mut dyn EmulationModule) -> Result<(), MovieError> {
        if module.state_action().is_none() {
            return Err(MovieError::Unsupported {
                module: module.shortname().to_string(),
            });
        }
        if self.netplay_active {
            return Err(MovieError::NetplayActive);
        }
        if self.mode == MovieMode::Recording {
            return Err(MovieError::PlaybackDuringRecording);
        }
        Ok(())
    }

    fn target_path(&self, path: Option<&Path>) -> PathBuf {
        match path {
            Some(path) => path.to_path_buf(),
            None => self.resolver.movie_path(self.current),
        }
    }

    fn begin_recording(
        &mut self,
        module: &mut dyn EmulationModule,
        target: &Path,
        preview: Option<Preview>,
    ) -> Result<(), MovieError> {
        let mut stream = FileStream::open(target, FileMode::Write)?;
        let participant = module_state(module)?;
        let options = SaveOptions {
            data_only: false,
            preview,
        };
        save_sm(&mut stream, participant, &options)?;
        // Flushed so previews work while the movie is still being recorded.
        stream.flush()?;

        log::info!("Recording movie to {}", target.display());
        self.stream = Some(Box::new(stream));
        Ok(())
    }

    fn begin_playback(&mut self, module: &mut dyn EmulationModule, target: &Path) -> Result<(), MovieError> {
        let mut stream = FileStream::open(target, FileMode::Read)?;
        let participant = module_state(module)?;
        let report = load_sm(&mut stream, participant, false)?;
        if !report.is_clean() {
            log::warn!("Movie snapshot loaded with {} warning(s)", report.warnings.len());
        }

        log::info!("Playing movie {}", target.display());
        self.stream = Some(Box::new(stream));
        Ok(())
    }

    /// Replay one frame. Returns `false` at the end of the movie.
    fn play_frame(&mut self, module: &mut dyn EmulationModule, ports: &mut [&mut [u8]]) -> Result<bool, MovieError> {
        let stream = self.stream.as_mut().ok_or(StreamError::Closed)?;

        loop {
            let Some(cmd) = stream.get_char()? else {
                return Ok(false);
            };
            match cmd {
                commands::FRAME_END => break,
                commands::LOADSTATE => {
                    load_sm(&mut **stream, module_state(module)?, false)?;
                }
                commands::SET_MEDIA => {
                    let mut raw = [0u8; MediaChange::ENCODED_LEN];
                    stream.read(&mut raw, true)?;
                    module.set_media(MediaChange::decode(&raw))?;
                }
                other => module.do_simple_command(other),
            }
        }

        for port in ports.iter_mut() {
            stream.read(port, true)?;
        }
        Ok(true)
    }

    fn record_frame(&mut self, ports: &[&mut [u8]]) -> Result<(), MovieError> {
        self.with_stream(|stream| {
            stream.put_u8(commands::FRAME_END)?;
            for port in ports {
                stream.write(port)?;
            }
            Ok(())
        })
    }

    fn write_snapshot(&mut self, module: &mut dyn EmulationModule, with_command: bool) -> Result<(), MovieError> {
        let stream = self.stream.as_mut().ok_or(StreamError::Closed)?;
        if with_command {
            stream.put_u8(commands::LOADSTATE)?;
        }
        save_sm(&mut **stream, module_state(module)?, &SaveOptions::full())?;
        Ok(())
    }

    fn with_stream<F>(&mut self, f: F) -> Result<(), MovieError>
    where
        F: FnOnce(&mut dyn Stream) -> Result<(), StreamError>,
    {
        let stream = self.stream.as_mut().ok_or(StreamError::Closed)?;
        f(&mut **stream)?;
        Ok(())
    }

    /// Uniform error path: drop the movie, go back to `Stopped`, tell the
    /// user. Returns the error for callers that propagate it.
    fn fail(&mut self, error: MovieError) -> MovieError {
        // Dropping the stream closes it; close failures are logged there.
        self.stream = None;

        if let Some(slot) = self.active_slot {
            self.slots[slot].present = false;
            let message = match self.mode {
                MovieMode::Playing => format!("Movie {} playback failed.", slot),
                _ => format!("Movie {} recording failed.", slot),
            };
            self.sink.notify(NoticeType::Error, &message);
        }
        self.sink.notify(NoticeType::Error, &format!("Movie error: {}", error));

        self.mode = MovieMode::Stopped;
        self.active_slot = None;
        error
    }
}

impl StateAction for MovieController {
    /// Only contributes to data-only states; movies never embed their own
    /// position in full snapshots.
    fn state_action(&mut self, sm: &mut StateMem<'_>, load: bool, data_only: bool) -> Result<(), StateError> {
        if !data_only {
            return Ok(());
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };

        let mut fpos = stream.tell();
        sm.section(MOVIE_SECTION, &mut [StateVar::new("fpos", &mut fpos)])?;

        if load {
            stream.seek(SeekFrom::Start(fpos))?;
            if self.mode == MovieMode::Recording {
                stream.truncate(fpos)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MovieController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovieController")
            .field("mode", &self.mode)
            .field("active_slot", &self.active_slot)
            .field("current", &self.current)
            .field("recently_saved", &self.recently_saved)
            .finish()
    }
}

fn module_state(module: &mut dyn EmulationModule) -> Result<&mut dyn StateAction, MovieError> {
    let module_name = module.shortname().to_string();
    module
        .state_action()
        .ok_or(MovieError::Unsupported { module: module_name })
}

fn read_preview(path: &Path) -> Result<Option<Preview>, MovieError> {
    let mut stream = FileStream::open(path, FileMode::Read)?;
    Ok(state_info(&mut stream)?.preview)
}

/// Offline summary of a movie file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MovieSummary {
    pub frames: u64,
    /// Full snapshots, including the leading one.
    pub snapshots: u64,
    pub media_changes: u64,
    /// Simple commands, keyed by opcode.
    pub commands: Vec<(u8, u64)>,
    /// Whether the data ends inside a record.
    pub truncated: bool,
    pub preview: Option<(u32, u32)>,
}

impl MovieSummary {
    fn count_command(&mut self, cmd: u8) {
        match self.commands.iter_mut().find(|(c, _)| *c == cmd) {
            Some((_, n)) => *n += 1,
            None => self.commands.push((cmd, 1)),
        }
    }
}

/// Walk a movie without replaying it.
///
/// `port_lens` must match the port widths of the recording session.
pub fn scan_movie(stream: &mut dyn Stream, port_lens: &[usize]) -> Result<MovieSummary, StateError> {
    let mut summary = MovieSummary::default();

    let info = state_info(stream)?;
    summary.preview = info.preview.as_ref().map(|p| (p.width, p.height));
    if !skip_payload(stream, info.payload_len)? {
        summary.truncated = true;
        return Ok(summary);
    }
    summary.snapshots = 1;

    let frame_len: u64 = port_lens.iter().map(|&n| n as u64).sum();
    while let Some(cmd) = stream.get_char()? {
        match cmd {
            commands::FRAME_END => {
                if stream.read_discard(frame_len)? < frame_len {
                    summary.truncated = true;
                    break;
                }
                summary.frames += 1;
            }
            commands::LOADSTATE => {
                let skipped = match state_info(stream) {
                    Ok(info) => skip_payload(stream, info.payload_len)?,
                    Err(StateError::Truncated { .. }) | Err(StateError::BadMagic) => false,
                    Err(StateError::Stream(e)) if e.is_eof() => false,
                    Err(e) => return Err(e),
                };
                if !skipped {
                    summary.truncated = true;
                    break;
                }
                summary.snapshots += 1;
            }
            commands::SET_MEDIA => {
                let len = MediaChange::ENCODED_LEN as u64;
                if stream.read_discard(len)? < len {
                    summary.truncated = true;
                    break;
                }
                summary.media_changes += 1;
            }
            other => summary.count_command(other),
        }
    }

    Ok(summary)
}

fn skip_payload(stream: &mut dyn Stream, len: u32) -> Result<bool, StateError> {
    Ok(stream.read_discard(u64::from(len))? == u64::from(len))
}
