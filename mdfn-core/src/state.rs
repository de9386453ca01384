//! State Serialization Engine
//!
//! Every emulation module implements [`StateAction`] and, when called, hands
//! its state to [`StateMem::section`] as named groups of [`StateVar`]s. The
//! same declaration drives both directions, so save and load cannot drift
//! apart.
//!
//! # Framing
//! In full mode each section is written as a 32-byte NUL-padded name, a `u32`
//! version and a `u32` payload length, followed by variable entries
//! (`u8` name length, name, `u32` size, data). All integers little-endian.
//!
//! In data-only mode (rewind) there is no framing at all: variable data is
//! concatenated in declaration order and must be loaded with the identical
//! layout.
//!
//! # Compatibility
//! Loads tolerate layout drift between module revisions:
//! - sections nobody asks for are skipped by their declared length
//! - variables missing from a section are zero-filled
//! - resized variables are zero-extended or truncated
//!
//! Each of these is recorded as a [`StateWarning`], never an error.

pub mod format;
pub mod var;

use crate::error::StateError;
use crate::stream::{SeekFrom, Stream, StreamExt};
use std::collections::HashSet;

pub use format::{
    inspect, load_sm, save_sm, state_info, Preview, SaveOptions, SectionSummary, StateInfo, StateSummary,
    VarSummary, STATE_FORMAT_VERSION, STATE_MAGIC,
};
pub use var::{StateValue, StateVar};

/// Width of the section name field, including at least one NUL.
pub const SECTION_NAME_LEN: usize = 32;
/// Section name, version and length.
pub const SECTION_HEADER_LEN: u64 = SECTION_NAME_LEN as u64 + 8;
/// Longest variable name an entry can carry.
pub const MAX_VAR_NAME_LEN: usize = u8::MAX as usize;

/// A participant that can describe its mutable state to the engine.
pub trait StateAction {
    /// Enumerate state sections through `sm`.
    ///
    /// `load` tells the participant whether values were just restored (so it
    /// can recompute derived state); `data_only` marks the fast rewind path.
    fn state_action(&mut self, sm: &mut StateMem<'_>, load: bool, data_only: bool) -> Result<(), StateError>;
}

impl<F> StateAction for F
where
    F: FnMut(&mut StateMem<'_>, bool, bool) -> Result<(), StateError>,
{
    fn state_action(&mut self, sm: &mut StateMem<'_>, load: bool, data_only: bool) -> Result<(), StateError> {
        self(sm, load, data_only)
    }
}

/// A recoverable mismatch found while loading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateWarning {
    #[error("unknown section \"{name}\" ({len} bytes) skipped")]
    UnknownSection { name: String, len: u32 },

    #[error("section \"{name}\" missing from state")]
    MissingSection { name: String },

    #[error("variable \"{section}.{name}\" missing from state, zero-filled")]
    MissingVariable { section: String, name: String },

    #[error("variable \"{section}.{name}\" size mismatch: stored {stored} bytes, expected {expected}")]
    SizeMismatch {
        section: String,
        name: String,
        stored: usize,
        expected: usize,
    },

    #[error("unknown variable \"{section}.{name}\" skipped")]
    UnknownVariable { section: String, name: String },

    #[error("state was written by newer format version {found:#x} (this build: {current:#x})")]
    NewerFormat { found: u32, current: u32 },
}

/// Outcome of a successful load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Format version from the file header (0 for data-only loads).
    pub format_version: u32,
    pub warnings: Vec<StateWarning>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[derive(Debug, Clone)]
struct IndexedSection {
    name: String,
    version: u32,
    /// Absolute stream offset of the section body.
    offset: u64,
    len: u32,
    claimed: bool,
}

/// Context for one save or load pass over one stream.
pub struct StateMem<'a> {
    stream: &'a mut dyn Stream,
    loading: bool,
    data_only: bool,
    sections: Vec<IndexedSection>,
    written: HashSet<String>,
    warnings: Vec<StateWarning>,
    scratch: Vec<u8>,
}

impl<'a> StateMem<'a> {
    /// Start a save pass writing at the stream's cursor.
    pub fn saver(stream: &'a mut dyn Stream, data_only: bool) -> Self {
        Self {
            stream,
            loading: false,
            data_only,
            sections: Vec::new(),
            written: HashSet::new(),
            warnings: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Start a load pass over `payload_len` bytes from the stream's cursor
    /// (to the end of the stream when `None`).
    ///
    /// Full-mode loads index every section header up front, skipping bodies by
    /// their declared length, and need a seekable stream.
    pub fn loader(stream: &'a mut dyn Stream, data_only: bool, payload_len: Option<u64>) -> Result<Self, StateError> {
        let mut sm = Self {
            stream,
            loading: true,
            data_only,
            sections: Vec::new(),
            written: HashSet::new(),
            warnings: Vec::new(),
            scratch: Vec::new(),
        };
        if !data_only {
            sm.index_sections(payload_len)?;
        }
        Ok(sm)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_data_only(&self) -> bool {
        self.data_only
    }

    /// Version stored for `name` in the state being loaded.
    pub fn loaded_version(&self, name: &str) -> Option<u32> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.version)
    }

    /// Warnings collected so far.
    pub fn warnings(&self) -> &[StateWarning] {
        &self.warnings
    }

    /// Save or load a required section at version 0.
    ///
    /// Returns whether the section was present (always `true` when saving).
    pub fn section(&mut self, name: &str, vars: &mut [StateVar<'_>]) -> Result<bool, StateError> {
        self.section_ext(name, 0, false, vars)
    }

    /// Save or load a section that older states may lack.
    pub fn section_optional(&mut self, name: &str, vars: &mut [StateVar<'_>]) -> Result<bool, StateError> {
        self.section_ext(name, 0, true, vars)
    }

    /// Save or load a section with an explicit version tag.
    pub fn section_ext(
        &mut self,
        name: &str,
        version: u32,
        optional: bool,
        vars: &mut [StateVar<'_>],
    ) -> Result<bool, StateError> {
        if name.len() >= SECTION_NAME_LEN {
            return Err(StateError::NameTooLong {
                name: name.to_string(),
                max: SECTION_NAME_LEN - 1,
            });
        }

        match (self.loading, self.data_only) {
            (false, true) => self.save_raw(vars).map(|_| true),
            (true, true) => self.load_raw(name, vars).map(|_| true),
            (false, false) => self.save_framed(name, version, vars).map(|_| true),
            (true, false) => self.load_framed(name, optional, vars),
        }
    }

    /// Finish the pass, reporting sections that nobody claimed.
    pub fn finish(mut self) -> LoadReport {
        let unclaimed: Vec<StateWarning> = self
            .sections
            .iter()
            .filter(|s| !s.claimed)
            .map(|s| StateWarning::UnknownSection {
                name: s.name.clone(),
                len: s.len,
            })
            .collect();
        for warning in unclaimed {
            self.warn(warning);
        }
        LoadReport {
            format_version: 0,
            warnings: self.warnings,
        }
    }

    fn warn(&mut self, warning: StateWarning) {
        log::warn!("State load: {}", warning);
        self.warnings.push(warning);
    }

    fn save_raw(&mut self, vars: &[StateVar<'_>]) -> Result<(), StateError> {
        self.scratch.clear();
        for var in vars {
            var.save_le(&mut self.scratch);
        }
        self.stream.write(&self.scratch)?;
        Ok(())
    }

    fn load_raw(&mut self, name: &str, vars: &mut [StateVar<'_>]) -> Result<(), StateError> {
        for var in vars.iter_mut() {
            self.scratch.resize(var.byte_len(), 0);
            self.stream.read(&mut self.scratch, true).map_err(|e| {
                if e.is_eof() {
                    StateError::LayoutMismatch(format!("state ends inside \"{}.{}\"", name, var.name()))
                } else {
                    e.into()
                }
            })?;
            var.load_le(&self.scratch);
        }
        Ok(())
    }

    fn save_framed(&mut self, name: &str, version: u32, vars: &[StateVar<'_>]) -> Result<(), StateError> {
        if !self.written.insert(name.to_string()) {
            return Err(StateError::DuplicateSection(name.to_string()));
        }

        let mut body = std::mem::take(&mut self.scratch);
        body.clear();
        for var in vars {
            let var_name = var.name().as_bytes();
            if var_name.len() > MAX_VAR_NAME_LEN {
                return Err(StateError::NameTooLong {
                    name: var.name().to_string(),
                    max: MAX_VAR_NAME_LEN,
                });
            }
            let size = u32::try_from(var.byte_len()).map_err(|_| StateError::SectionTooLarge(name.to_string()))?;
            body.push(var_name.len() as u8);
            body.extend_from_slice(var_name);
            body.extend_from_slice(&size.to_le_bytes());
            var.save_le(&mut body);
        }
        let len = u32::try_from(body.len()).map_err(|_| StateError::SectionTooLarge(name.to_string()))?;

        let mut header = [0u8; SECTION_NAME_LEN];
        header[..name.len()].copy_from_slice(name.as_bytes());
        self.stream.write(&header)?;
        self.stream.put_le(version)?;
        self.stream.put_le(len)?;
        self.stream.write(&body)?;

        self.scratch = body;
        Ok(())
    }

    fn load_framed(&mut self, name: &str, optional: bool, vars: &mut [StateVar<'_>]) -> Result<bool, StateError> {
        let Some(index) = self.sections.iter().position(|s| !s.claimed && s.name == name) else {
            if !optional {
                self.warn(StateWarning::MissingSection { name: name.to_string() });
            }
            return Ok(false);
        };
        self.sections[index].claimed = true;
        let (offset, len) = (self.sections[index].offset, self.sections[index].len);

        let resume = self.stream.tell();
        self.stream.seek(SeekFrom::Start(offset))?;
        let mut body = vec![0u8; len as usize];
        self.stream.read(&mut body, true)?;
        self.stream.seek(SeekFrom::Start(resume))?;

        let entries = parse_entries(name, &body)?;
        let mut used = vec![false; entries.len()];

        for var in vars.iter_mut() {
            match entries.iter().position(|(entry_name, _)| *entry_name == var.name().as_bytes()) {
                Some(i) => {
                    used[i] = true;
                    let stored = entries[i].1;
                    if stored.len() != var.byte_len() {
                        self.warn(StateWarning::SizeMismatch {
                            section: name.to_string(),
                            name: var.name().to_string(),
                            stored: stored.len(),
                            expected: var.byte_len(),
                        });
                    }
                    var.load_resized(stored);
                }
                None => {
                    self.warn(StateWarning::MissingVariable {
                        section: name.to_string(),
                        name: var.name().to_string(),
                    });
                    var.zero_fill();
                }
            }
        }

        for (i, (entry_name, _)) in entries.iter().enumerate() {
            if !used[i] {
                let warning = StateWarning::UnknownVariable {
                    section: name.to_string(),
                    name: String::from_utf8_lossy(entry_name).into_owned(),
                };
                self.warn(warning);
            }
        }
        Ok(true)
    }

    fn index_sections(&mut self, payload_len: Option<u64>) -> Result<(), StateError> {
        let start = self.stream.tell();
        let end = match payload_len {
            Some(len) => start.checked_add(len).ok_or(StateError::malformed_section(0, "payload length overflow"))?,
            None => self.stream.size()?,
        };

        let mut pos = start;
        while pos < end {
            if end - pos < SECTION_HEADER_LEN {
                return Err(StateError::malformed_section(pos - start, "truncated section header"));
            }
            let mut raw_name = [0u8; SECTION_NAME_LEN];
            self.stream.read(&mut raw_name, true)?;
            let version: u32 = self.stream.get_le()?;
            let len: u32 = self.stream.get_le()?;

            let body = pos + SECTION_HEADER_LEN;
            if u64::from(len) > end - body {
                return Err(StateError::malformed_section(
                    pos - start,
                    format!("section length {} runs past end of state", len),
                ));
            }

            self.sections.push(IndexedSection {
                name: section_name(&raw_name),
                version,
                offset: body,
                len,
                claimed: false,
            });
            pos = body + u64::from(len);
            self.stream.seek(SeekFrom::Start(pos))?;
        }
        Ok(())
    }
}

/// Decode a NUL-padded section name.
pub(crate) fn section_name(raw: &[u8; SECTION_NAME_LEN]) -> String {
    let end = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Split a section body into `(name, data)` entries.
pub(crate) fn parse_entries<'b>(section: &str, body: &'b [u8]) -> Result<Vec<(&'b [u8], &'b [u8])>, StateError> {
    let malformed = || StateError::MalformedVariable {
        section: section.to_string(),
    };

    let mut entries = Vec::new();
    let mut pos = 0usize;
    while pos < body.len() {
        let name_len = body[pos] as usize;
        pos += 1;
        let name = body.get(pos..pos + name_len).ok_or_else(malformed)?;
        pos += name_len;
        let size_raw = body.get(pos..pos + 4).ok_or_else(malformed)?;
        let size = u32::from_le_bytes([size_raw[0], size_raw[1], size_raw[2], size_raw[3]]) as usize;
        pos += 4;
        let data = body.get(pos..pos.checked_add(size).ok_or_else(malformed)?).ok_or_else(malformed)?;
        pos += size;
        entries.push((name, data));
    }
    Ok(entries)
}
