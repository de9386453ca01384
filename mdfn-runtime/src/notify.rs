//! User notifications
//!
//! The runtime reports what happened (movie started, state saved, errors)
//! and publishes slot status blobs; a front-end decides how to show them.

use mdfn_core::state::Preview;
use serde::Serialize;
use std::time::SystemTime;

/// Number of numbered slots for states and movies.
pub const SLOT_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoticeType {
    Status,
    Warning,
    Error,
}

/// Presence of one numbered slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlotInfo {
    pub present: bool,
    pub modified: Option<SystemTime>,
}

/// Slot overview published when the user selects a state or movie slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateStatus {
    pub slots: [SlotInfo; SLOT_COUNT],
    /// Selected slot.
    pub current: usize,
    /// `1 + slot` while recording, `-1 - slot` while playing, 0 otherwise.
    /// Always 0 for save-state status.
    pub current_movie: i32,
    pub recently_saved: Option<usize>,
    /// Thumbnail of the selected slot, if it has one.
    pub preview: Option<Preview>,
}

/// Receiver for notifications and status blobs.
///
/// Sinks are shared between the movie controller and the save-state manager
/// of a session, so methods take `&self`.
pub trait NotificationSink {
    fn notify(&self, kind: NoticeType, message: &str);

    /// Publish (or with `None`, hide) the save-state slot overview.
    fn set_state_status(&self, status: Option<StateStatus>) {
        let _ = status;
    }

    /// Publish (or with `None`, hide) the movie slot overview.
    fn set_movie_status(&self, status: Option<StateStatus>) {
        let _ = status;
    }
}

/// Sink that forwards notifications to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, kind: NoticeType, message: &str) {
        match kind {
            NoticeType::Status => log::info!("{}", message),
            NoticeType::Warning => log::warn!("{}", message),
            NoticeType::Error => log::error!("{}", message),
        }
    }

    fn set_state_status(&self, status: Option<StateStatus>) {
        if let Some(status) = status {
            log::debug!("State slot {} selected", status.current);
        }
    }

    fn set_movie_status(&self, status: Option<StateStatus>) {
        if let Some(status) = status {
            log::debug!("Movie slot {} selected", status.current);
        }
    }
}
