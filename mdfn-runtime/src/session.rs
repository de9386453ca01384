//! Emulation session
//!
//! Ties one module to its movie controller, save-state slots and rewind
//! history, and drives them from the per-frame entry point.

use crate::config::RuntimeConfig;
use crate::module::{EmulationModule, MediaChange, MediaError};
use crate::movie::{MovieController, MovieError, MovieMode};
use crate::notify::NotificationSink;
use crate::paths::SlotResolver;
use crate::rewind::Rewinder;
use crate::save_state::SaveStateSlots;
use mdfn_core::state::{LoadReport, Preview};
use mdfn_core::{StateAction, StateError, StateMem};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// The module's state plus the movie position, as seen by rewind.
struct SessionState<'a> {
    module: &'a mut dyn StateAction,
    movie: &'a mut MovieController,
}

impl StateAction for SessionState<'_> {
    fn state_action(&mut self, sm: &mut StateMem<'_>, load: bool, data_only: bool) -> Result<(), StateError> {
        self.module.state_action(sm, load, data_only)?;
        self.movie.state_action(sm, load, data_only)
    }
}

pub struct Session<M: EmulationModule> {
    module: M,
    movie: MovieController,
    slots: SaveStateSlots,
    rewinder: Option<Rewinder>,
    /// Movie mode at the last frame; a change invalidates rewind history,
    /// whose layout depends on whether a movie is open.
    last_movie_mode: MovieMode,
}

impl<M: EmulationModule> Session<M> {
    pub fn new(module: M, config: &RuntimeConfig, sink: Rc<dyn NotificationSink>) -> Self {
        let resolver: Rc<dyn SlotResolver> = Rc::new(config.slot_paths());
        Self::with_resolver(module, config, resolver, sink)
    }

    pub fn with_resolver(
        module: M,
        config: &RuntimeConfig,
        resolver: Rc<dyn SlotResolver>,
        sink: Rc<dyn NotificationSink>,
    ) -> Self {
        let rewinder = config
            .rewind
            .enabled
            .then(|| Rewinder::new(config.rewind.max_snapshots, config.rewind.compression_level));

        Self {
            module,
            movie: MovieController::new(resolver.clone(), sink.clone()),
            slots: SaveStateSlots::new(resolver, sink, config.state_file_options()),
            rewinder,
            last_movie_mode: MovieMode::Stopped,
        }
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut M {
        &mut self.module
    }

    pub fn movie(&self) -> &MovieController {
        &self.movie
    }

    pub fn movie_mut(&mut self) -> &mut MovieController {
        &mut self.movie
    }

    pub fn slots(&self) -> &SaveStateSlots {
        &self.slots
    }

    pub fn rewinder(&self) -> Option<&Rewinder> {
        self.rewinder.as_ref()
    }

    /// Turn rewinding on (with a fresh history) or off.
    pub fn set_rewind(&mut self, rewinder: Option<Rewinder>) {
        self.rewinder = rewinder;
    }

    /// Probe state and movie slots.
    pub fn check_slots(&mut self) {
        self.slots.check_states();
        self.movie.check_movies(&mut self.module);
    }

    /// Per-frame entry point, called before emulating a frame.
    ///
    /// Rewinds one step if requested (and possible), otherwise records a
    /// rewind snapshot; then runs movie input for the frame. Returns whether
    /// a rewind happened.
    pub fn frame_begin(&mut self, ports: &mut [&mut [u8]], rewind_requested: bool) -> bool {
        let mode = self.movie.mode();
        if mode != self.last_movie_mode {
            if let Some(rewinder) = self.rewinder.as_mut() {
                rewinder.clear();
            }
            self.last_movie_mode = mode;
        }

        let rewound = self.step_rewind(rewind_requested);
        self.movie.process_input(&mut self.module, ports);
        rewound
    }

    fn step_rewind(&mut self, rewind_requested: bool) -> bool {
        let Some(rewinder) = self.rewinder.as_mut() else {
            return false;
        };
        let Some(module) = self.module.state_action() else {
            return false;
        };
        let mut state = SessionState {
            module,
            movie: &mut self.movie,
        };

        let result = if rewind_requested {
            rewinder.rewind(&mut state)
        } else {
            rewinder.push(&mut state).map(|_| false)
        };

        match result {
            Ok(rewound) => rewound,
            Err(e) => {
                log::warn!("Rewind disabled for this history: {}", e);
                rewinder.clear();
                false
            }
        }
    }

    pub fn save_state(&mut self, path: Option<&Path>, preview: Option<Preview>) -> anyhow::Result<PathBuf> {
        self.slots.save_state(&mut self.module, path, preview)
    }

    pub fn load_state(&mut self, path: Option<&Path>) -> anyhow::Result<LoadReport> {
        let report = self.slots.load_state(&mut self.module, &mut self.movie, path)?;
        // The loaded state starts a new timeline.
        if let Some(rewinder) = self.rewinder.as_mut() {
            rewinder.clear();
        }
        Ok(report)
    }

    pub fn select_state(&mut self, slot: usize) {
        self.slots.select_state(slot);
    }

    pub fn save_movie(&mut self, path: Option<&Path>, preview: Option<Preview>) -> Result<(), MovieError> {
        self.movie.save_movie(&mut self.module, path, preview)
    }

    pub fn load_movie(&mut self, path: Option<&Path>) -> Result<(), MovieError> {
        self.movie.load_movie(&mut self.module, path)
    }

    pub fn stop_movie(&mut self) {
        self.movie.stop(&mut self.module);
    }

    pub fn select_movie(&mut self, slot: usize) {
        self.movie.select_movie(slot);
    }

    /// Execute a simple command, recording it into an active movie.
    pub fn do_simple_command(&mut self, cmd: u8) {
        self.movie.add_command(cmd, &[]);
        self.module.do_simple_command(cmd);
    }

    /// Change media, recording the change into an active movie once the
    /// module accepts it.
    pub fn set_media(&mut self, change: MediaChange) -> Result<(), MediaError> {
        self.module.set_media(change)?;
        self.movie.add_media_change(change);
        Ok(())
    }
}

impl<M: EmulationModule> Drop for Session<M> {
    fn drop(&mut self) {
        self.movie.stop(&mut self.module);
    }
}
