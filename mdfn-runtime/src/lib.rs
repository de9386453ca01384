//! Movie recording, save-state slots and rewind
//!
//! Everything here runs on the emulation thread, once per frame or in
//! response to user commands; there is no internal locking. A [`Session`]
//! wires one [`EmulationModule`] to a [`MovieController`], [`SaveStateSlots`]
//! and an optional [`Rewinder`].

pub mod commands;
pub mod config;
pub mod module;
pub mod movie;
pub mod notify;
pub mod paths;
pub mod rewind;
pub mod save_state;
pub mod session;

pub use config::{RewindConfig, RuntimeConfig};
pub use module::{EmulationModule, MediaChange, MediaError};
pub use movie::{scan_movie, MovieController, MovieError, MovieMode, MovieSummary};
pub use notify::{LogSink, NoticeType, NotificationSink, SlotInfo, StateStatus, SLOT_COUNT};
pub use paths::{SlotPaths, SlotResolver};
pub use rewind::Rewinder;
pub use save_state::{SaveStateSlots, StateFileOptions};
pub use session::Session;
