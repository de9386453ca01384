//! Emulation module contract
//!
//! The runtime never looks inside an emulation core. It only needs the core's
//! state participant, a handful of flags, and entry points for the commands
//! a movie can replay.

use mdfn_core::StateAction;
use thiserror::Error;

/// Rejected media change.
///
/// Media changes replayed from movies are untrusted input and must be
/// validated by the module before being applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("no drive {0}")]
    NoSuchDrive(u32),

    #[error("drive {drive} has no state {state}")]
    NoSuchState { drive: u32, state: u32 },

    #[error("no media {0}")]
    NoSuchMedia(u32),

    #[error("media {media} has no orientation {orientation}")]
    NoSuchOrientation { media: u32, orientation: u32 },

    #[error("module has no changeable media")]
    NotSupported,
}

/// Drive/media selection, as recorded in movies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaChange {
    pub drive_idx: u32,
    pub state_idx: u32,
    pub media_idx: u32,
    pub orientation_idx: u32,
}

impl MediaChange {
    /// Encoded size: four little-endian `u32`s.
    pub const ENCODED_LEN: usize = 16;

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut raw = [0u8; Self::ENCODED_LEN];
        raw[0..4].copy_from_slice(&self.drive_idx.to_le_bytes());
        raw[4..8].copy_from_slice(&self.state_idx.to_le_bytes());
        raw[8..12].copy_from_slice(&self.media_idx.to_le_bytes());
        raw[12..16].copy_from_slice(&self.orientation_idx.to_le_bytes());
        raw
    }

    pub fn decode(raw: &[u8; Self::ENCODED_LEN]) -> Self {
        let field = |at: usize| u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
        Self {
            drive_idx: field(0),
            state_idx: field(4),
            media_idx: field(8),
            orientation_idx: field(12),
        }
    }
}

/// One emulation core, as seen by the movie/state runtime.
pub trait EmulationModule {
    /// Short system name used in messages ("nes", "snes", ...).
    fn shortname(&self) -> &str;

    /// The module's state participant, or `None` if it cannot save state.
    ///
    /// Without one, save states, movies and rewind are unavailable.
    fn state_action(&mut self) -> Option<&mut dyn StateAction>;

    /// Whether saving a state perturbs emulation (netplay-sensitive).
    fn save_state_alters_state(&self) -> bool {
        false
    }

    /// Execute a simple (argument-less) command such as reset or power.
    fn do_simple_command(&mut self, cmd: u8);

    /// Apply a media change from an untrusted source.
    fn set_media(&mut self, change: MediaChange) -> Result<(), MediaError> {
        let _ = change;
        Err(MediaError::NotSupported)
    }
}
