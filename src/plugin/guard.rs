/*
 *  plugin/guard.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  Panic and error containment for exported entry points
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

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use log::{error, warn};

use crate::error::{PluginError, Result};
use super::ffi::{RawValue, StatusCode};
use super::value::OwnedValue;

/// Run the body of an exported entry point
///
/// Errors and panics become `StatusCode::Error`; nothing unwinds across the
/// FFI boundary.
pub(crate) fn catch_ffi_call<F>(operation: &'static str, f: F) -> StatusCode
where
    F: FnOnce() -> Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => StatusCode::Ok,
        Ok(Err(e)) => {
            warn!("Plugin operation '{}' failed: {}", operation, e);
            StatusCode::Error
        }
        Err(payload) => {
            error!("Caught panic in plugin operation '{}': {}", operation, panic_message(&*payload));
            StatusCode::Error
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown error".to_string()
    }
}

/// Hand `value` to the host through an out-pointer
pub(crate) fn write_value(out: *mut RawValue, value: OwnedValue) -> Result<()> {
    if out.is_null() {
        return Err(PluginError::ContractViolation("null output slot".to_string()));
    }
    // SAFETY: out is non-null and points at host-owned storage for one RawValue.
    unsafe { out.write(value.into_raw()) };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_ffi_call_success() {
        assert_eq!(catch_ffi_call("test", || Ok(())), StatusCode::Ok);
    }

    #[test]
    fn test_catch_ffi_call_error() {
        let status = catch_ffi_call("test", || Err(PluginError::Encoding("too long".into())));
        assert_eq!(status, StatusCode::Error);
    }

    #[test]
    fn test_catch_ffi_call_panic() {
        let status = catch_ffi_call("test", || panic!("Test panic"));
        assert_eq!(status, StatusCode::Error);
    }

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(&*payload), "boom 1");
    }

    #[test]
    fn test_write_value_null() {
        let err = write_value(std::ptr::null_mut(), OwnedValue::from_static("x")).unwrap_err();
        assert!(matches!(err, PluginError::ContractViolation(_)));
    }
}
