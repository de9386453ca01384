//! Stream and save-state core
//!
//! Byte streams with explicit capability attributes, and the tagged-field
//! state format built on top of them. Emulation modules describe their
//! mutable state as named variables grouped into sections; the engine in
//! [`state`] flattens that description into a little-endian binary blob and
//! restores it, tolerating layout drift between module revisions.

pub mod error;
pub mod state;
pub mod stream;

pub use error::{StateError, StreamError};
pub use state::{LoadReport, StateAction, StateMem, StateVar, StateWarning};
pub use stream::file::{FileMode, FileStream};
pub use stream::memory::MemoryStream;
pub use stream::{Attributes, LineEnd, Stream, StreamExt};
