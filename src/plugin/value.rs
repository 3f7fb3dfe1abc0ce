/*
 *  plugin/value.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  Owned values - text payloads that cross the module boundary
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

//! Owned values
//!
//! Every text payload (display name, schema, value report) travels as a
//! [`RawValue`] whose [`Ownership`] tag decides how it is released. The
//! producer builds an [`OwnedValue`] and hands it over with
//! [`OwnedValue::into_raw`]; the consumer wraps what it received in a
//! [`ReceivedValue`], which calls the producer's release entry exactly once
//! when dropped. The host never frees plugin memory with its own allocator.

use std::fmt;
use std::mem::ManuallyDrop;

use crate::error::{PluginError, Result};
use super::ffi::{Ownership, RawValue, ReleaseFn};

/// A payload owned by the producing side, not yet handed across
pub struct OwnedValue {
    raw: ManuallyDrop<RawValue>,
}

impl OwnedValue {
    /// Owning-copy: duplicate `data` into a fresh NUL-terminated allocation
    pub fn copy_from(data: &[u8]) -> Result<Self> {
        let mut buf: Vec<u8> = Vec::new();
        buf.try_reserve_exact(data.len() + 1)?;
        buf.extend_from_slice(data);
        Ok(Self::owned(buf, Ownership::Copied))
    }

    /// Owning-copy of a string slice
    pub fn copy_str(text: &str) -> Result<Self> {
        Self::copy_from(text.as_bytes())
    }

    /// Owning-move: take over an existing allocation
    pub fn from_vec(mut buf: Vec<u8>) -> Result<Self> {
        buf.try_reserve_exact(1)?;
        Ok(Self::owned(buf, Ownership::Moved))
    }

    /// Owning-move of a `String`
    pub fn from_string(text: String) -> Result<Self> {
        Self::from_vec(text.into_bytes())
    }

    /// Borrowed: wrap program-lifetime text, no allocation and no-op release
    pub const fn from_static(text: &'static str) -> Self {
        Self {
            raw: ManuallyDrop::new(RawValue {
                bytes: text.as_ptr(),
                len: text.len(),
                capacity: 0,
                ownership: Ownership::Borrowed,
            }),
        }
    }

    /// Zero-length borrowed value
    pub const fn empty() -> Self {
        Self { raw: ManuallyDrop::new(RawValue::empty()) }
    }

    // `buf` has room for the terminator.
    fn owned(mut buf: Vec<u8>, ownership: Ownership) -> Self {
        let len = buf.len();
        buf.push(0);
        let mut buf = ManuallyDrop::new(buf);
        Self {
            raw: ManuallyDrop::new(RawValue {
                bytes: buf.as_mut_ptr(),
                len,
                capacity: buf.capacity(),
                ownership,
            }),
        }
    }

    pub fn ownership(&self) -> Ownership {
        self.raw.ownership
    }

    pub fn len(&self) -> usize {
        self.raw.len
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: bytes points at len initialised bytes for as long as self lives.
        unsafe { std::slice::from_raw_parts(self.raw.bytes, self.raw.len) }
    }

    /// Hand the value across the boundary. The receiver now owns the release.
    pub fn into_raw(self) -> RawValue {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the raw value is moved out once.
        unsafe { ManuallyDrop::take(&mut this.raw) }
    }
}

impl Drop for OwnedValue {
    fn drop(&mut self) {
        // SAFETY: drop runs once and the value was never handed out.
        let raw = unsafe { ManuallyDrop::take(&mut self.raw) };
        release_value(raw);
    }
}

impl fmt::Debug for OwnedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedValue")
            .field("ownership", &self.raw.ownership)
            .field("text", &String::from_utf8_lossy(self.as_bytes()))
            .finish()
    }
}

// SAFETY: an OwnedValue exclusively owns (or borrows 'static) its bytes.
unsafe impl Send for OwnedValue {}

/// Release entry point exported by every plugin module
///
/// Must run inside the module that produced `value`, so the allocation is
/// returned to the allocator that made it.
pub extern "C" fn release_value(value: RawValue) {
    match value.ownership {
        Ownership::Borrowed => {}
        Ownership::Copied | Ownership::Moved => {
            if value.bytes.is_null() || value.capacity == 0 {
                return;
            }
            // SAFETY: owned values come from a Vec<u8> of this capacity.
            unsafe {
                drop(Vec::from_raw_parts(value.bytes as *mut u8, 0, value.capacity));
            }
        }
    }
}

/// A value received from the other side of the boundary
///
/// Released through the producer's release entry exactly once, on drop.
pub struct ReceivedValue {
    raw: ManuallyDrop<RawValue>,
    release: ReleaseFn,
}

impl ReceivedValue {
    /// Take ownership of `raw`, which must have been produced by the module
    /// exporting `release`.
    ///
    /// # Safety
    /// `raw` must be a value handed over by that module and not yet released.
    pub unsafe fn from_raw(raw: RawValue, release: ReleaseFn) -> Self {
        Self { raw: ManuallyDrop::new(raw), release }
    }

    pub fn len(&self) -> usize {
        self.raw.len
    }

    pub fn is_empty(&self) -> bool {
        self.raw.len == 0
    }

    pub fn ownership(&self) -> Ownership {
        self.raw.ownership
    }

    pub fn as_bytes(&self) -> &[u8] {
        if self.raw.bytes.is_null() {
            return &[];
        }
        // SAFETY: the producer guarantees len readable bytes until release.
        unsafe { std::slice::from_raw_parts(self.raw.bytes, self.raw.len) }
    }

    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(self.as_bytes()).map_err(PluginError::from)
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl Drop for ReceivedValue {
    fn drop(&mut self) {
        // SAFETY: drop runs once.
        let raw = unsafe { ManuallyDrop::take(&mut self.raw) };
        (self.release)(raw);
    }
}

impl fmt::Debug for ReceivedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedValue")
            .field("ownership", &self.raw.ownership)
            .field("len", &self.raw.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_copy_is_nul_terminated() {
        let value = OwnedValue::copy_str("Clock").unwrap();
        assert_eq!(value.ownership(), Ownership::Copied);
        assert_eq!(value.as_bytes(), b"Clock");

        let raw = value.into_raw();
        let terminator = unsafe { *raw.bytes.add(raw.len) };
        assert_eq!(terminator, 0);
        assert!(raw.capacity > raw.len);
        release_value(raw);
    }

    #[test]
    fn test_move_keeps_allocation() {
        let text = String::with_capacity(64) + "{\"Seconds\":1}";
        let ptr = text.as_ptr();

        let value = OwnedValue::from_string(text).unwrap();
        assert_eq!(value.ownership(), Ownership::Moved);
        assert_eq!(value.as_bytes().as_ptr(), ptr);
        assert_eq!(value.as_bytes(), b"{\"Seconds\":1}");
    }

    #[test]
    fn test_static_value_does_not_allocate() {
        static NAME: &str = "Clock";
        let value = OwnedValue::from_static(NAME);
        assert_eq!(value.ownership(), Ownership::Borrowed);

        let raw = value.into_raw();
        assert_eq!(raw.bytes, NAME.as_ptr());
        assert_eq!(raw.capacity, 0);
        release_value(raw);
        assert_eq!(NAME, "Clock");
    }

    #[test]
    fn test_empty_copy_still_terminated() {
        let value = OwnedValue::copy_from(b"").unwrap();
        assert!(value.is_empty());
        let raw = value.into_raw();
        assert_eq!(unsafe { *raw.bytes }, 0);
        release_value(raw);
    }

    static RELEASED: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn counting_release(value: RawValue) {
        RELEASED.fetch_add(1, Ordering::SeqCst);
        release_value(value);
    }

    #[test]
    fn test_received_value_releases_once() {
        let before = RELEASED.load(Ordering::SeqCst);
        {
            let raw = OwnedValue::copy_str("{\"Hours\":13}").unwrap().into_raw();
            let received = unsafe { ReceivedValue::from_raw(raw, counting_release) };
            assert_eq!(received.as_str().unwrap(), "{\"Hours\":13}");
            assert_eq!(RELEASED.load(Ordering::SeqCst), before);
        }
        assert_eq!(RELEASED.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_received_invalid_utf8() {
        let raw = OwnedValue::copy_from(&[0xff, 0xfe]).unwrap().into_raw();
        let received = unsafe { ReceivedValue::from_raw(raw, release_value) };
        assert!(matches!(received.as_str(), Err(PluginError::Utf8(_))));
        assert_eq!(received.len(), 2);
    }
}
