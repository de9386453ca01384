//! Slot file naming

use std::path::{Path, PathBuf};

/// Maps slot numbers to files.
pub trait SlotResolver {
    fn movie_path(&self, slot: usize) -> PathBuf;
    fn state_path(&self, slot: usize) -> PathBuf;
}

/// `<dir>/<base>.mc<N>` for movies and `<dir>/<base>.nc<N>` for states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPaths {
    dir: PathBuf,
    base_name: String,
}

impl SlotPaths {
    pub fn new(dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_name: base_name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Make sure the slot directory exists.
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }
}

impl SlotResolver for SlotPaths {
    fn movie_path(&self, slot: usize) -> PathBuf {
        self.dir.join(format!("{}.mc{}", self.base_name, slot))
    }

    fn state_path(&self, slot: usize) -> PathBuf {
        self.dir.join(format!("{}.nc{}", self.base_name, slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_names() {
        let paths = SlotPaths::new("/data/mdfn", "game");
        assert_eq!(paths.movie_path(3), PathBuf::from("/data/mdfn/game.mc3"));
        assert_eq!(paths.state_path(0), PathBuf::from("/data/mdfn/game.nc0"));
    }
}
