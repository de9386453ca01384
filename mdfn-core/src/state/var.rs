//! State variable descriptors
//!
//! A [`StateVar`] is a named, borrowed view of one piece of module memory.
//! The engine never owns module state; it reads or writes through these
//! references for the duration of a single save or load.

use crate::stream::Scalar;
use std::borrow::Cow;

/// A value with a fixed little-endian byte layout.
///
/// `load_le` always receives exactly `byte_len()` bytes; the engine pads or
/// truncates stored data to fit before calling it.
pub trait StateValue {
    fn byte_len(&self) -> usize;
    fn save_le(&self, out: &mut Vec<u8>);
    fn load_le(&mut self, data: &[u8]);
}

macro_rules! impl_state_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl StateValue for $t {
                #[inline]
                fn byte_len(&self) -> usize {
                    <$t as Scalar>::SIZE
                }

                #[inline]
                fn save_le(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn load_le(&mut self, data: &[u8]) {
                    *self = <$t as Scalar>::from_le_slice(data);
                }
            }
        )*
    };
}

impl_state_scalar!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl StateValue for bool {
    fn byte_len(&self) -> usize {
        1
    }

    fn save_le(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn load_le(&mut self, data: &[u8]) {
        *self = data[0] != 0;
    }
}

fn save_elements<T: StateValue>(items: &[T], out: &mut Vec<u8>) {
    for item in items {
        item.save_le(out);
    }
}

fn load_elements<T: StateValue>(items: &mut [T], data: &[u8]) {
    let mut offset = 0;
    for item in items {
        let len = item.byte_len();
        item.load_le(&data[offset..offset + len]);
        offset += len;
    }
}

impl<T: StateValue, const N: usize> StateValue for [T; N] {
    fn byte_len(&self) -> usize {
        self.iter().map(StateValue::byte_len).sum()
    }

    fn save_le(&self, out: &mut Vec<u8>) {
        save_elements(self, out);
    }

    fn load_le(&mut self, data: &[u8]) {
        load_elements(self, data);
    }
}

/// Vectors keep their live length; only the element values are restored.
impl<T: StateValue> StateValue for Vec<T> {
    fn byte_len(&self) -> usize {
        self.iter().map(StateValue::byte_len).sum()
    }

    fn save_le(&self, out: &mut Vec<u8>) {
        save_elements(self, out);
    }

    fn load_le(&mut self, data: &[u8]) {
        load_elements(self, data);
    }
}

enum Target<'a> {
    Value(&'a mut dyn StateValue),
    Bytes(&'a mut [u8]),
}

/// One named entry in a section's variable list.
pub struct StateVar<'a> {
    name: Cow<'a, str>,
    target: Target<'a>,
}

impl<'a> StateVar<'a> {
    /// Describe a typed value (scalar, bool, array or vector of those).
    pub fn new(name: impl Into<Cow<'a, str>>, value: &'a mut dyn StateValue) -> Self {
        Self {
            name: name.into(),
            target: Target::Value(value),
        }
    }

    /// Describe a raw byte region (RAM banks and similar), copied verbatim.
    pub fn bytes(name: impl Into<Cow<'a, str>>, data: &'a mut [u8]) -> Self {
        Self {
            name: name.into(),
            target: Target::Bytes(data),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the live value in bytes.
    pub fn byte_len(&self) -> usize {
        match &self.target {
            Target::Value(value) => value.byte_len(),
            Target::Bytes(data) => data.len(),
        }
    }

    pub(crate) fn save_le(&self, out: &mut Vec<u8>) {
        match &self.target {
            Target::Value(value) => value.save_le(out),
            Target::Bytes(data) => out.extend_from_slice(data),
        }
    }

    /// Load from exactly `byte_len()` bytes.
    pub(crate) fn load_le(&mut self, data: &[u8]) {
        match &mut self.target {
            Target::Value(value) => value.load_le(data),
            Target::Bytes(bytes) => bytes.copy_from_slice(data),
        }
    }

    /// Load from stored data of any length: shorter data is zero-extended,
    /// longer data is truncated.
    pub(crate) fn load_resized(&mut self, stored: &[u8]) {
        let len = self.byte_len();
        if stored.len() == len {
            self.load_le(stored);
            return;
        }
        let mut resized = vec![0u8; len];
        let n = len.min(stored.len());
        resized[..n].copy_from_slice(&stored[..n]);
        self.load_le(&resized);
    }

    /// Reset the value to all-zero bytes.
    pub(crate) fn zero_fill(&mut self) {
        self.load_resized(&[]);
    }
}

impl std::fmt::Debug for StateVar<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateVar")
            .field("name", &self.name)
            .field("len", &self.byte_len())
            .finish()
    }
}

/// Build a [`StateVar`] for a struct field, named after the field.
///
/// ```rust,ignore
/// let mut vars = [sfvar!(self.joy_latch), sfvar!("WRIO", self.wrio)];
/// ```
#[macro_export]
macro_rules! sfvar {
    ($base:ident . $field:ident) => {
        $crate::state::StateVar::new(stringify!($field), &mut $base.$field)
    };
    ($name:expr, $value:expr) => {
        $crate::state::StateVar::new($name, &mut $value)
    };
}
