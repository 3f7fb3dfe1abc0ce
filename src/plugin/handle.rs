/*
 *  plugin/handle.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  Opaque plugin instance handles
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

use std::ptr::NonNull;

use super::ffi::RawHandle;

/// Box plugin state and erase its type for the host
pub fn into_raw<T>(state: Box<T>) -> *mut RawHandle {
    Box::into_raw(state) as *mut RawHandle
}

/// Borrow the plugin state behind a handle
///
/// # Safety
/// `handle` must come from [`into_raw::<T>`] and not have been destroyed,
/// and no other reference to the state may be live.
pub unsafe fn state_mut<'a, T>(handle: *mut RawHandle) -> Option<&'a mut T> {
    // SAFETY: upheld by the caller.
    unsafe { (handle as *mut T).as_mut() }
}

/// Drop the plugin state behind a handle
///
/// # Safety
/// `handle` must come from [`into_raw::<T>`] and is invalid afterwards.
pub unsafe fn destroy<T>(handle: *mut RawHandle) -> bool {
    if handle.is_null() {
        return false;
    }
    // SAFETY: upheld by the caller.
    drop(unsafe { Box::from_raw(handle as *mut T) });
    true
}

/// Host-side token for one live plugin instance
///
/// Neither `Copy` nor `Clone`: the host can pass it back unchanged or give
/// it up to finalize, nothing else.
#[derive(Debug, PartialEq, Eq)]
pub struct PluginHandle {
    ptr: NonNull<RawHandle>,
}

impl PluginHandle {
    /// Wrap a handle written by a successful `initialize`
    pub(crate) fn new(ptr: *mut RawHandle) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr })
    }

    /// Pass the handle back to its plugin
    pub(crate) fn as_ptr(&self) -> *mut RawHandle {
        self.ptr.as_ptr()
    }

    /// Surrender the handle to finalize
    pub(crate) fn into_raw(self) -> *mut RawHandle {
        self.ptr.as_ptr()
    }
}
