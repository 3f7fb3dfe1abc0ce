/*
 *  plugin/ffi.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  C ABI types for plugin interface
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

//! FFI types for the statelink plugin protocol
//!
//! This module defines the C-compatible types shared by the host and every
//! plugin module. All types use `#[repr(C)]` (or a fixed integer repr) so the
//! layout is identical on both sides of the boundary even when host and
//! plugin were built by different compilers.

use std::ffi::{c_char, c_void, CStr};
use std::fmt;
use std::sync::atomic::AtomicI32;

/// Name of the single symbol every plugin module exports
pub const REGISTER_SYMBOL: &[u8] = b"statelink_plugin_register\0";

/// Status returned by every plugin entry point
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// Operation completed successfully
    Ok = 0,

    /// Operation failed; the instance is left in its prior state
    Error = 1,
}

impl StatusCode {
    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

/// How the bytes of a [`RawValue`] were obtained, and therefore how they
/// must be released
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Fresh allocation holding a copy of caller data
    Copied = 0,

    /// Allocation taken over from an existing buffer
    Moved = 1,

    /// Program-lifetime memory; release is a no-op
    Borrowed = 2,
}

/// A length-prefixed byte buffer crossing the boundary by value
///
/// `bytes[len]` is a NUL terminator for owned values. The consumer must hand
/// the value back to the producing module's `release` entry exactly once.
#[repr(C)]
#[derive(Debug)]
pub struct RawValue {
    pub bytes: *const u8,
    pub len: usize,
    pub capacity: usize,
    pub ownership: Ownership,
}

impl RawValue {
    /// Zero-length borrowed value, also the "no change" marker of `sample`
    pub const fn empty() -> Self {
        Self {
            bytes: b"\0".as_ptr(),
            len: 0,
            capacity: 0,
            ownership: Ownership::Borrowed,
        }
    }
}

/// Opaque handle to one plugin instance's private state
#[repr(C)]
pub struct RawHandle {
    _private: [u8; 0],
}

/// Release entry point; always the one exported by the producing module
pub type ReleaseFn = extern "C" fn(value: RawValue);

/// Host callback invoked by push plugins on every change
///
/// `bytes` is only valid for the duration of the call.
pub type UpdateCallbackFn = extern "C" fn(
    context: *mut c_void,
    bytes: *const u8,
    len: usize
) -> StatusCode;

/// Poll capability profile: host-driven sampling
#[repr(C)]
pub struct PollVTable {
    /// Create an instance; writes the handle only on success
    pub initialize: extern "C" fn(
        handle: *mut *mut RawHandle
    ) -> StatusCode,

    /// Human-readable plugin name
    pub display_name: extern "C" fn(
        handle: *mut RawHandle,
        out: *mut RawValue
    ) -> StatusCode,

    /// JSON object mapping field name to type tag
    pub describe_schema: extern "C" fn(
        handle: *mut RawHandle,
        out: *mut RawValue
    ) -> StatusCode,

    /// JSON value report, or a zero-length value when nothing changed
    pub sample: extern "C" fn(
        handle: *mut RawHandle,
        out: *mut RawValue
    ) -> StatusCode,

    /// Destroy the instance
    pub finalize: extern "C" fn(
        handle: *mut RawHandle
    ) -> StatusCode,

    pub release: ReleaseFn,
}

/// Push capability profile: plugin-driven sampling loop
#[repr(C)]
pub struct PushVTable {
    pub display_name: extern "C" fn(out: *mut RawValue) -> StatusCode,

    pub describe_schema: extern "C" fn(out: *mut RawValue) -> StatusCode,

    /// Blocks until `keep_running` is observed as 0
    pub run: extern "C" fn(
        keep_running: *const AtomicI32,
        on_update: UpdateCallbackFn,
        context: *mut c_void
    ) -> StatusCode,

    pub release: ReleaseFn,
}

/// The capability profile a module declares conformance to
#[repr(C, u32)]
pub enum Profile {
    Poll(&'static PollVTable),
    Push(&'static PushVTable),
}

impl Profile {
    pub fn kind(&self) -> ProfileKind {
        match self {
            Profile::Poll(_) => ProfileKind::Poll,
            Profile::Push(_) => ProfileKind::Push,
        }
    }
}

/// Which profile a module implements, without the vtable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Poll,
    Push,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileKind::Poll => f.write_str("poll"),
            ProfileKind::Push => f.write_str("push"),
        }
    }
}

/// Module metadata returned by the register symbol
#[repr(C)]
pub struct PluginDescriptor {
    /// NUL-terminated module name
    pub name: *const c_char,

    /// NUL-terminated module version
    pub version: *const c_char,

    pub profile: Profile,
}

// SAFETY: the descriptor only points at 'static, immutable data.
unsafe impl Sync for PluginDescriptor {}

impl PluginDescriptor {
    pub const fn poll(name: &'static CStr, version: &'static CStr, vtable: &'static PollVTable) -> Self {
        Self {
            name: name.as_ptr(),
            version: version.as_ptr(),
            profile: Profile::Poll(vtable),
        }
    }

    pub const fn push(name: &'static CStr, version: &'static CStr, vtable: &'static PushVTable) -> Self {
        Self {
            name: name.as_ptr(),
            version: version.as_ptr(),
            profile: Profile::Push(vtable),
        }
    }

    /// Module name as a Rust string
    pub fn name(&self) -> String {
        c_string(self.name)
    }

    /// Module version as a Rust string
    pub fn version(&self) -> String {
        c_string(self.version)
    }
}

/// Registration function type
///
/// Each plugin must export a function with this signature:
/// ```c
/// const PluginDescriptor* statelink_plugin_register(void);
/// ```
pub type PluginRegisterFn = extern "C" fn() -> *const PluginDescriptor;

fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: descriptor strings are static and NUL-terminated.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}
