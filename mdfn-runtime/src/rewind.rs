//! State rewinding
//!
//! Keeps a bounded history of data-only states. Consecutive frames differ in
//! few bytes, so only the newest state is held raw; each older one is stored
//! as the zstd-compressed XOR against its successor. Popping the newest state
//! reconstructs the next one from its delta.

use mdfn_core::state::{load_sm, save_sm, SaveOptions};
use mdfn_core::{MemoryStream, StateAction, StateError, Stream};
use std::collections::VecDeque;

#[derive(Debug)]
enum Delta {
    /// XOR against the successor, which has the same length.
    Xor(Vec<u8>),
    /// Whole state; the successor had a different length.
    Full(Vec<u8>),
}

#[derive(Debug)]
struct Stored {
    len: usize,
    delta: Delta,
}

/// Bounded rewind history.
#[derive(Debug)]
pub struct Rewinder {
    max_snapshots: usize,
    compression_level: i32,
    newest: Option<Vec<u8>>,
    /// Oldest first.
    older: VecDeque<Stored>,
}

impl Rewinder {
    /// History of at most `max_snapshots` states (at least 1).
    pub fn new(max_snapshots: usize, compression_level: i32) -> Self {
        Self {
            max_snapshots: max_snapshots.max(1),
            compression_level,
            newest: None,
            older: VecDeque::new(),
        }
    }

    /// Number of states that can be rewound to.
    pub fn len(&self) -> usize {
        self.older.len() + usize::from(self.newest.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.newest.is_none()
    }

    pub fn clear(&mut self) {
        self.newest = None;
        self.older.clear();
    }

    /// Capture the current state of `participant`.
    pub fn push(&mut self, participant: &mut dyn StateAction) -> Result<(), StateError> {
        let hint = self.newest.as_ref().map_or(0, Vec::len);
        let mut stream = MemoryStream::with_capacity(hint);
        save_sm(&mut stream, participant, &SaveOptions::data_only())?;
        self.push_raw(stream.into_inner())
    }

    /// Take the newest state out of the history.
    pub fn pop(&mut self) -> Result<Option<Vec<u8>>, StateError> {
        let Some(newest) = self.newest.take() else {
            return Ok(None);
        };

        if let Some(stored) = self.older.pop_back() {
            self.newest = Some(self.restore(stored, &newest)?);
        }
        Ok(Some(newest))
    }

    /// Pop the newest state and load it into `participant`.
    ///
    /// Returns `false` when the history is empty.
    pub fn rewind(&mut self, participant: &mut dyn StateAction) -> Result<bool, StateError> {
        let Some(state) = self.pop()? else {
            return Ok(false);
        };
        let mut stream = MemoryStream::from_vec(state);
        load_sm(&mut stream, participant, true)?;
        if stream.tell() != stream.len() as u64 {
            return Err(StateError::LayoutMismatch(format!(
                "{} trailing bytes in rewind state",
                stream.len() as u64 - stream.tell()
            )));
        }
        Ok(true)
    }

    fn push_raw(&mut self, state: Vec<u8>) -> Result<(), StateError> {
        if let Some(previous) = self.newest.take() {
            let stored = self.encode(previous, &state)?;
            self.older.push_back(stored);
        }
        self.newest = Some(state);

        while self.len() > self.max_snapshots {
            self.older.pop_front();
        }
        Ok(())
    }

    fn encode(&self, previous: Vec<u8>, successor: &[u8]) -> Result<Stored, StateError> {
        let len = previous.len();
        let delta = if len == successor.len() {
            let mut xor = previous;
            xor.iter_mut().zip(successor).for_each(|(a, b)| *a ^= b);
            Delta::Xor(compress(&xor, self.compression_level)?)
        } else {
            Delta::Full(compress(&previous, self.compression_level)?)
        };
        Ok(Stored { len, delta })
    }

    fn restore(&self, stored: Stored, successor: &[u8]) -> Result<Vec<u8>, StateError> {
        match stored.delta {
            Delta::Full(data) => decompress(&data, stored.len),
            Delta::Xor(data) => {
                let mut state = decompress(&data, stored.len)?;
                if state.len() != successor.len() {
                    return Err(StateError::Compression("rewind delta length mismatch".to_string()));
                }
                state.iter_mut().zip(successor).for_each(|(a, b)| *a ^= b);
                Ok(state)
            }
        }
    }
}

fn compress(data: &[u8], level: i32) -> Result<Vec<u8>, StateError> {
    zstd::bulk::compress(data, level).map_err(|e| StateError::Compression(e.to_string()))
}

fn decompress(data: &[u8], len: usize) -> Result<Vec<u8>, StateError> {
    zstd::bulk::decompress(data, len).map_err(|e| StateError::Compression(e.to_string()))
}
