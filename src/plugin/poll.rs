/*
 *  plugin/poll.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  Poll profile - host-driven sampling, plugin side
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

//! Poll profile, plugin side
//!
//! A plugin implements [`PollSource`] and exports it with
//! [`export_poll_plugin!`](crate::export_poll_plugin). The host then calls
//! `sample` on its own schedule; the plugin answers "no change" as a
//! zero-length value and only serializes a report when its state moved.

use crate::error::{PluginError, Result};
use super::ffi::{PollVTable, RawHandle, RawValue, StatusCode};
use super::guard::{catch_ffi_call, write_value};
use super::handle;
use super::value::{release_value, OwnedValue};

/// Outcome of one `sample` call
#[derive(Debug)]
pub enum ChangeResult {
    Unchanged,
    Changed(OwnedValue),
}

impl ChangeResult {
    pub fn is_changed(&self) -> bool {
        matches!(self, ChangeResult::Changed(_))
    }
}

/// Remembers the previous sample and reports whether a new one differs
///
/// Starts from a sentinel that equals no real sample, so the first
/// observation always counts as a change.
#[derive(Debug)]
pub struct Debouncer<S> {
    last: Option<S>,
}

impl<S> Default for Debouncer<S> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<S: PartialEq> Debouncer<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `state` if it differs from the previous one
    ///
    /// The state is only recorded once `encode` succeeds, so a failed
    /// encode leaves the debouncer as it was and the same state counts as a
    /// change again next time.
    pub fn observe_with<T, E, F>(&mut self, state: S, encode: F) -> std::result::Result<Option<T>, E>
    where
        F: FnOnce(&S) -> std::result::Result<T, E>,
    {
        if self.last.as_ref() == Some(&state) {
            return Ok(None);
        }
        let encoded = encode(&state)?;
        self.last = Some(state);
        Ok(Some(encoded))
    }
}

/// A plugin implementing the poll profile
///
/// One value of the implementing type is the private state behind a plugin
/// handle; finalize drops it.
pub trait PollSource: Sized + 'static {
    /// Allocate the instance state
    fn initialize() -> Result<Self>;

    /// Human-readable name; must not depend on prior samples
    fn display_name(&self) -> Result<OwnedValue>;

    /// JSON schema declaration; immutable for the instance's lifetime
    fn describe_schema(&self) -> Result<OwnedValue>;

    /// Sample the underlying state, serializing only on change
    fn sample(&mut self) -> Result<ChangeResult>;
}

impl PollVTable {
    /// Vtable whose entries drive `T`
    pub const fn of<T: PollSource>() -> Self {
        Self {
            initialize: initialize::<T>,
            display_name: display_name::<T>,
            describe_schema: describe_schema::<T>,
            sample: sample::<T>,
            finalize: finalize::<T>,
            release: release_value,
        }
    }
}

fn source<'a, T: PollSource>(handle: *mut RawHandle) -> Result<&'a mut T> {
    // SAFETY: the host only passes back handles created by initialize::<T>.
    unsafe { handle::state_mut::<T>(handle) }
        .ok_or_else(|| PluginError::ContractViolation("null plugin handle".to_string()))
}

extern "C" fn initialize<T: PollSource>(out: *mut *mut RawHandle) -> StatusCode {
    catch_ffi_call("initialize", || {
        if out.is_null() {
            return Err(PluginError::ContractViolation("null handle slot".to_string()));
        }
        let state = T::initialize()?;
        // SAFETY: out is non-null; only written once initialization succeeded.
        unsafe { out.write(handle::into_raw(Box::new(state))) };
        Ok(())
    })
}

extern "C" fn display_name<T: PollSource>(handle: *mut RawHandle, out: *mut RawValue) -> StatusCode {
    catch_ffi_call("display_name", || {
        let value = source::<T>(handle)?.display_name()?;
        write_value(out, value)
    })
}

extern "C" fn describe_schema<T: PollSource>(handle: *mut RawHandle, out: *mut RawValue) -> StatusCode {
    catch_ffi_call("describe_schema", || {
        let value = source::<T>(handle)?.describe_schema()?;
        write_value(out, value)
    })
}

extern "C" fn sample<T: PollSource>(handle: *mut RawHandle, out: *mut RawValue) -> StatusCode {
    catch_ffi_call("sample", || {
        match source::<T>(handle)?.sample()? {
            ChangeResult::Unchanged => write_value(out, OwnedValue::empty()),
            ChangeResult::Changed(value) => write_value(out, value),
        }
    })
}

extern "C" fn finalize<T: PollSource>(handle: *mut RawHandle) -> StatusCode {
    catch_ffi_call("finalize", || {
        // SAFETY: the host surrenders each handle to finalize exactly once.
        if unsafe { handle::destroy::<T>(handle) } {
            Ok(())
        } else {
            Err(PluginError::ContractViolation("finalize called with a null handle".to_string()))
        }
    })
}

/// Export a [`PollSource`] as this module's plugin
///
/// ```ignore
/// statelink::export_poll_plugin!(ClockPlugin, name = c"Clock", version = c"1.0.0");
/// ```
#[macro_export]
macro_rules! export_poll_plugin {
    ($source:ty, name = $name:expr, version = $version:expr) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn statelink_plugin_register() -> *const $crate::plugin::ffi::PluginDescriptor {
            static VTABLE: $crate::plugin::ffi::PollVTable =
                $crate::plugin::ffi::PollVTable::of::<$source>();
            static DESCRIPTOR: $crate::plugin::ffi::PluginDescriptor =
                $crate::plugin::ffi::PluginDescriptor::poll($name, $version, &VTABLE);
            &DESCRIPTOR
        }
    };
}
