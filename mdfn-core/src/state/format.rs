//! State file container
//!
//! Wraps the section payload produced by [`StateMem`] in a fixed 32-byte
//! header and an optional RGB preview:
//!
//! | offset | size | field                      |
//! |--------|------|----------------------------|
//! | 0      | 8    | magic `MDFNSVST`           |
//! | 8      | 8    | reserved                   |
//! | 16     | 4    | format version             |
//! | 20     | 4    | payload length             |
//! | 24     | 4    | preview width (0 = none)   |
//! | 28     | 4    | preview height             |
//!
//! Data-only states (rewind) carry no container at all.

use super::{parse_entries, section_name, LoadReport, StateAction, StateMem, StateWarning, SECTION_NAME_LEN};
use crate::error::StateError;
use crate::stream::memory::MemoryStream;
use crate::stream::{Attributes, Stream, StreamExt};
use serde::Serialize;

pub const STATE_MAGIC: &[u8; 8] = b"MDFNSVST";
/// Bumped whenever the container or framing changes.
pub const STATE_FORMAT_VERSION: u32 = 0x0001_0000;
pub const HEADER_LEN: usize = 32;
const READ_CHUNK: usize = 64 * 1024;

/// Thumbnail stored alongside a full state, 24-bit RGB, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub rgb: Vec<u8>,
}

impl Preview {
    /// Expected `rgb` length for the given dimensions.
    pub fn byte_len(width: u32, height: u32) -> Option<usize> {
        (width as usize).checked_mul(height as usize)?.checked_mul(3)
    }
}

/// How [`save_sm`] writes a state.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Raw variable data only, no header or framing.
    pub data_only: bool,
    pub preview: Option<Preview>,
}

impl SaveOptions {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn data_only() -> Self {
        Self {
            data_only: true,
            preview: None,
        }
    }

    pub fn with_preview(mut self, preview: Preview) -> Self {
        self.preview = Some(preview);
        self
    }
}

/// Header fields of a full state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateInfo {
    pub format_version: u32,
    pub payload_len: u32,
    /// Offset of the payload relative to the start of the header.
    pub payload_offset: u64,
    pub preview: Option<Preview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VarSummary {
    pub name: String,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionSummary {
    pub name: String,
    pub version: u32,
    pub len: u32,
    pub variables: Vec<VarSummary>,
}

/// Structure of a full state, decoded without a live participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSummary {
    pub info: StateInfo,
    pub sections: Vec<SectionSummary>,
}

/// Save `participant`'s state at the stream cursor.
pub fn save_sm(stream: &mut dyn Stream, participant: &mut dyn StateAction, options: &SaveOptions) -> Result<(), StateError> {
    if options.data_only {
        let mut sm = StateMem::saver(stream, true);
        return participant.state_action(&mut sm, false, true);
    }

    let mut payload = MemoryStream::with_capacity(64 * 1024);
    {
        let mut sm = StateMem::saver(&mut payload, false);
        participant.state_action(&mut sm, false, false)?;
    }
    let payload_len =
        u32::try_from(payload.len()).map_err(|_| StateError::SectionTooLarge("<payload>".to_string()))?;

    let (width, height) = match &options.preview {
        Some(preview) => {
            if Preview::byte_len(preview.width, preview.height) != Some(preview.rgb.len()) {
                return Err(StateError::malformed_section(0, "preview size does not match its dimensions"));
            }
            (preview.width, preview.height)
        }
        None => (0, 0),
    };

    let mut header = [0u8; HEADER_LEN];
    header[..8].copy_from_slice(STATE_MAGIC);
    header[16..20].copy_from_slice(&STATE_FORMAT_VERSION.to_le_bytes());
    header[20..24].copy_from_slice(&payload_len.to_le_bytes());
    header[24..28].copy_from_slice(&width.to_le_bytes());
    header[28..32].copy_from_slice(&height.to_le_bytes());

    stream.write(&header)?;
    if let Some(preview) = &options.preview {
        stream.write(&preview.rgb)?;
    }
    stream.write(payload.as_slice())?;

    log::debug!("Saved state: {} payload bytes, preview {}x{}", payload_len, width, height);
    Ok(())
}

/// Load state from the stream cursor into `participant`.
///
/// Full loads leave the cursor just past the payload, so states embedded in
/// a larger stream (movies) can be followed by more data.
pub fn load_sm(stream: &mut dyn Stream, participant: &mut dyn StateAction, data_only: bool) -> Result<LoadReport, StateError> {
    if data_only {
        let mut sm = StateMem::loader(stream, true, None)?;
        participant.state_action(&mut sm, true, true)?;
        return Ok(sm.finish());
    }

    let info = read_header(stream, false)?;
    let mut payload = MemoryStream::from_vec(read_payload(stream, &info)?);

    let mut sm = StateMem::loader(&mut payload, false, None)?;
    if info.format_version > STATE_FORMAT_VERSION {
        sm.warn(StateWarning::NewerFormat {
            found: info.format_version,
            current: STATE_FORMAT_VERSION,
        });
    }
    participant.state_action(&mut sm, true, false)?;

    let mut report = sm.finish();
    report.format_version = info.format_version;
    Ok(report)
}

/// Read the header and preview of a full state.
pub fn state_info(stream: &mut dyn Stream) -> Result<StateInfo, StateError> {
    read_header(stream, true)
}

/// Decode the section and variable layout of a full state.
pub fn inspect(stream: &mut dyn Stream) -> Result<StateSummary, StateError> {
    let info = read_header(stream, false)?;
    let payload = read_payload(stream, &info)?;

    let mut sections = Vec::new();
    let mut pos = 0usize;
    while pos < payload.len() {
        let header_end = pos + SECTION_NAME_LEN + 8;
        let header = payload
            .get(pos..header_end)
            .ok_or_else(|| StateError::malformed_section(pos as u64, "truncated section header"))?;

        let mut raw_name = [0u8; SECTION_NAME_LEN];
        raw_name.copy_from_slice(&header[..SECTION_NAME_LEN]);
        let name = section_name(&raw_name);
        let version = u32::from_le_bytes([header[32], header[33], header[34], header[35]]);
        let len = u32::from_le_bytes([header[36], header[37], header[38], header[39]]);

        let body = payload.get(header_end..header_end + len as usize).ok_or_else(|| {
            StateError::malformed_section(pos as u64, format!("section length {} runs past end of state", len))
        })?;
        let variables = parse_entries(&name, body)?
            .into_iter()
            .map(|(var_name, data)| VarSummary {
                name: String::from_utf8_lossy(var_name).into_owned(),
                size: data.len() as u32,
            })
            .collect();

        sections.push(SectionSummary {
            name,
            version,
            len,
            variables,
        });
        pos = header_end + len as usize;
    }

    Ok(StateSummary { info, sections })
}

fn read_header(stream: &mut dyn Stream, keep_preview: bool) -> Result<StateInfo, StateError> {
    let mut header = [0u8; HEADER_LEN];
    let read = stream.read(&mut header, false)?;
    if read < 8 || &header[..8] != STATE_MAGIC {
        return Err(StateError::BadMagic);
    }
    if read < HEADER_LEN {
        return Err(StateError::Truncated {
            expected: HEADER_LEN as u64,
            actual: read as u64,
        });
    }

    let field = |at: usize| u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]]);
    let format_version = field(16);
    let payload_len = field(20);
    let width = field(24);
    let height = field(28);

    let preview_len = Preview::byte_len(width, height)
        .ok_or_else(|| StateError::malformed_section(0, "preview dimensions overflow"))?;

    let preview = if preview_len == 0 {
        None
    } else if keep_preview {
        let rgb = read_declared(stream, preview_len as u64)?;
        Some(Preview { width, height, rgb })
    } else {
        let skipped = stream.read_discard(preview_len as u64)?;
        if skipped < preview_len as u64 {
            return Err(StateError::Truncated {
                expected: preview_len as u64,
                actual: skipped,
            });
        }
        Some(Preview {
            width,
            height,
            rgb: Vec::new(),
        })
    };

    Ok(StateInfo {
        format_version,
        payload_len,
        payload_offset: (HEADER_LEN + preview_len) as u64,
        preview,
    })
}

fn read_payload(stream: &mut dyn Stream, info: &StateInfo) -> Result<Vec<u8>, StateError> {
    read_declared(stream, u64::from(info.payload_len))
}

/// Read exactly `len` bytes whose count comes from an untrusted header.
///
/// Checked against the remaining stream size when that is cheap; otherwise
/// the buffer grows only as data arrives. Short data is `Truncated`.
fn read_declared(stream: &mut dyn Stream, len: u64) -> Result<Vec<u8>, StateError> {
    let attributes = stream.attributes();
    if attributes.contains(Attributes::SEEKABLE) && !attributes.contains(Attributes::SLOW_SIZE) {
        let remaining = stream.size()?.saturating_sub(stream.tell());
        if remaining < len {
            return Err(StateError::Truncated {
                expected: len,
                actual: remaining,
            });
        }
        let mut data = vec![0u8; len as usize];
        stream.read(&mut data, true)?;
        return Ok(data);
    }

    let mut data = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    while (data.len() as u64) < len {
        let want = (len - data.len() as u64).min(READ_CHUNK as u64) as usize;
        let got = stream.read(&mut chunk[..want], false)?;
        data.extend_from_slice(&chunk[..got]);
        if got < want {
            return Err(StateError::Truncated {
                expected: len,
                actual: data.len() as u64,
            });
        }
    }
    Ok(data)
}
