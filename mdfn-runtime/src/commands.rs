//! Command opcodes shared by movies and netplay
//!
//! Every frame of a movie is a run of commands terminated by
//! [`FRAME_END`], followed by the raw port data.

/// Ends a frame's command run.
pub const FRAME_END: u8 = 0x00;

// Simple commands, forwarded to the module unchanged.
pub const RESET: u8 = 0x01;
pub const POWER: u8 = 0x02;
pub const INSERT_COIN: u8 = 0x07;
/// DIP switch toggles occupy `TOGGLE_DIP0..TOGGLE_DIP0 + 16`.
pub const TOGGLE_DIP0: u8 = 0x10;

/// A full state snapshot follows.
pub const LOADSTATE: u8 = 0x80;
/// Four little-endian `u32`s follow: drive, state, media, orientation.
pub const SET_MEDIA: u8 = 0x81;

/// Command opcode for toggling DIP switch `n` (0..16).
pub fn toggle_dip(n: u8) -> Option<u8> {
    (n < 16).then(|| TOGGLE_DIP0 + n)
}

/// Human-readable name of an opcode.
pub fn name(cmd: u8) -> &'static str {
    match cmd {
        FRAME_END => "frame-end",
        RESET => "reset",
        POWER => "power",
        INSERT_COIN => "insert-coin",
        0x10..=0x1F => "toggle-dip",
        LOADSTATE => "load-state",
        SET_MEDIA => "set-media",
        _ => "unknown",
    }
}
