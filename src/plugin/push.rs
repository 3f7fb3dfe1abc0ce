/*
 *  plugin/push.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  Push profile - plugin-driven sampling loop, plugin side
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

//! Push profile, plugin side
//!
//! `run` blocks the calling thread while a dedicated sampling thread ticks
//! at a fixed interval, debounces the sampled state and invokes the host
//! callback on every change. Cancellation is cooperative: the stop flag is
//! read between ticks only, so shutdown takes at most one interval plus the
//! callback in flight.

use std::ffi::c_void;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use log::{debug, info};

use crate::error::{PluginError, Result};
use crate::pacer::Pacer;
use super::ffi::{PushVTable, RawValue, StatusCode, UpdateCallbackFn};
use super::guard::{catch_ffi_call, panic_message, write_value};
use super::poll::Debouncer;
use super::value::{release_value, OwnedValue};

/// Reference sampling interval
pub const DEFAULT_PUSH_INTERVAL: Duration = Duration::from_millis(50);

/// Flag value that keeps `run` going
pub const KEEP_RUNNING: i32 = 1;

/// Flag value that asks `run` to return
pub const STOP: i32 = 0;

/// Cancellation token shared between the host and a running push loop
///
/// The loop only reads it; the host flips it from any thread.
#[derive(Debug, Clone)]
pub struct StopFlag {
    flag: Arc<AtomicI32>,
}

impl Default for StopFlag {
    fn default() -> Self {
        Self { flag: Arc::new(AtomicI32::new(KEEP_RUNNING)) }
    }
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flag.store(STOP, Ordering::Release);
    }

    pub fn keep_running(&self) -> bool {
        self.flag.load(Ordering::Acquire) == KEEP_RUNNING
    }

    /// Pointer handed to `run`; valid while any clone of this flag lives
    pub fn as_ptr(&self) -> *const AtomicI32 {
        Arc::as_ptr(&self.flag)
    }
}

/// A plugin implementing the push profile
pub trait PushSource: Sized + 'static {
    /// Sampled state compared tick to tick
    type State: PartialEq;

    /// Sampling interval
    const INTERVAL: Duration = DEFAULT_PUSH_INTERVAL;

    /// Allocate the loop state; called on the sampling thread
    fn initialize() -> Result<Self>;

    fn display_name() -> Result<OwnedValue>;

    fn describe_schema() -> Result<OwnedValue>;

    /// Read the underlying state; must be cheap
    fn sample_state(&mut self) -> Result<Self::State>;

    /// Serialize a changed state into a value report
    fn encode(&self, state: &Self::State) -> Result<OwnedValue>;
}

/// Drive `T` until `keep_running` reads anything but [`KEEP_RUNNING`]
///
/// `on_update` gets the report bytes of every change; the report is
/// released right after it returns.
pub fn run_loop<T, F>(keep_running: &AtomicI32, mut on_update: F) -> Result<()>
where
    T: PushSource,
    F: FnMut(&[u8]) -> StatusCode,
{
    let mut source = T::initialize()?;
    let mut debouncer = Debouncer::new();
    let mut pacer = Pacer::new(T::INTERVAL);
    let mut updates: u64 = 0;

    while keep_running.load(Ordering::Acquire) == KEEP_RUNNING {
        let state = source.sample_state()?;

        if let Some(report) = debouncer.observe_with(state, |state| source.encode(state))? {
            updates += 1;
            if !on_update(report.as_bytes()).is_ok() {
                debug!("Host callback rejected update {}", updates);
            }
        }

        pacer.wait();
    }

    info!("Push loop stopped after {} updates", updates);
    Ok(())
}

struct CallbackTarget {
    on_update: UpdateCallbackFn,
    context: *mut c_void,
}

// SAFETY: the host hands over `context` for use on the sampling thread for
// the duration of `run`.
unsafe impl Send for CallbackTarget {}

impl CallbackTarget {
    fn call(&self, bytes: &[u8]) -> StatusCode {
        (self.on_update)(self.context, bytes.as_ptr(), bytes.len())
    }
}

impl PushVTable {
    /// Vtable whose entries drive `T`
    pub const fn of<T: PushSource>() -> Self {
        Self {
            display_name: display_name::<T>,
            describe_schema: describe_schema::<T>,
            run: run::<T>,
            release: release_value,
        }
    }
}

extern "C" fn display_name<T: PushSource>(out: *mut RawValue) -> StatusCode {
    catch_ffi_call("display_name", || write_value(out, T::display_name()?))
}

extern "C" fn describe_schema<T: PushSource>(out: *mut RawValue) -> StatusCode {
    catch_ffi_call("describe_schema", || write_value(out, T::describe_schema()?))
}

extern "C" fn run<T: PushSource>(
    keep_running: *const AtomicI32,
    on_update: UpdateCallbackFn,
    context: *mut c_void,
) -> StatusCode {
    catch_ffi_call("run", || {
        // SAFETY: the host keeps the flag alive until run returns.
        let keep_running = unsafe { keep_running.as_ref() }
            .ok_or_else(|| PluginError::ContractViolation("null stop flag".to_string()))?;
        let target = CallbackTarget { on_update, context };

        thread::scope(|scope| -> Result<()> {
            let worker = thread::Builder::new()
                .name("statelink-push".to_string())
                .spawn_scoped(scope, move || {
                    let target = target;
                    run_loop::<T, _>(keep_running, |bytes| target.call(bytes))
                })
                .map_err(|e| PluginError::Allocation(format!("cannot spawn sampling thread: {}", e)))?;

            worker.join()
                .map_err(|payload| PluginError::Panic(panic_message(&*payload)))?
        })
    })
}

/// Export a [`PushSource`] as this module's plugin
///
/// ```ignore
/// statelink::export_push_plugin!(ClockPusher, name = c"Clock", version = c"1.0.0");
/// ```
#[macro_export]
macro_rules! export_push_plugin {
    ($source:ty, name = $name:expr, version = $version:expr) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn statelink_plugin_register() -> *const $crate::plugin::ffi::PluginDescriptor {
            static VTABLE: $crate::plugin::ffi::PushVTable =
                $crate::plugin::ffi::PushVTable::of::<$source>();
            static DESCRIPTOR: $crate::plugin::ffi::PluginDescriptor =
                $crate::plugin::ffi::PluginDescriptor::push($name, $version, &VTABLE);
            &DESCRIPTOR
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Walks a fixed script of states, then holds the last one
    struct Scripted {
        tick: usize,
    }

    const SCRIPT: [u32; 8] = [1, 1, 2, 2, 2, 3, 1, 1];

    impl PushSource for Scripted {
        type State = u32;
        const INTERVAL: Duration = Duration::from_millis(1);

        fn initialize() -> Result<Self> {
            Ok(Self { tick: 0 })
        }

        fn display_name() -> Result<OwnedValue> {
            Ok(OwnedValue::from_static("Scripted"))
        }

        fn describe_schema() -> Result<OwnedValue> {
            Ok(OwnedValue::from_static(r#"{"Value":"number"}"#))
        }

        fn sample_state(&mut self) -> Result<u32> {
            let i = self.tick.min(SCRIPT.len() - 1);
            self.tick += 1;
            Ok(SCRIPT[i])
        }

        fn encode(&self, state: &u32) -> Result<OwnedValue> {
            OwnedValue::from_string(format!(r#"{{"Value":{}}}"#, state))
        }
    }

    #[test]
    fn test_stop_flag() {
        let flag = StopFlag::new();
        let shared = flag.clone();
        assert!(flag.keep_running());
        shared.request_stop();
        assert!(!flag.keep_running());
        assert_eq!(flag.as_ptr(), shared.as_ptr());
    }

    #[test]
    fn test_run_loop_debounces() {
        let flag = StopFlag::new();
        let stopper = flag.clone();
        let mut reports = Vec::new();

        // no second thread here, so stop from inside the callback once the
        // script has settled
        let keep_running = unsafe { &*flag.as_ptr() };
        run_loop::<Scripted, _>(keep_running, |bytes| {
            reports.push(String::from_utf8_lossy(bytes).into_owned());
            if reports.len() == 4 {
                stopper.request_stop();
            }
            StatusCode::Ok
        }).unwrap();

        assert_eq!(reports, [
            r#"{"Value":1}"#,
            r#"{"Value":2}"#,
            r#"{"Value":3}"#,
            r#"{"Value":1}"#,
        ]);
    }

    #[test]
    fn test_run_loop_honours_preset_stop() {
        let flag = StopFlag::new();
        flag.request_stop();

        let mut calls = 0;
        let keep_running = unsafe { &*flag.as_ptr() };
        run_loop::<Scripted, _>(keep_running, |_| { calls += 1; StatusCode::Ok }).unwrap();
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_rejected_callback_keeps_running() {
        let flag = StopFlag::new();
        let stopper = flag.clone();
        let mut calls = 0;

        let keep_running = unsafe { &*flag.as_ptr() };
        run_loop::<Scripted, _>(keep_running, |_| {
            calls += 1;
            if calls == 2 {
                stopper.request_stop();
            }
            StatusCode::Error
        }).unwrap();
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_shutdown_latency_is_bounded() {
        let flag = StopFlag::new();
        let keep_running = flag.clone();

        let worker = thread::spawn(move || {
            let ptr = keep_running.as_ptr();
            run_loop::<Scripted, _>(unsafe { &*ptr }, |_| StatusCode::Ok)
        });

        thread::sleep(Duration::from_millis(20));
        let requested = Instant::now();
        flag.request_stop();
        worker.join().unwrap().unwrap();
        assert!(requested.elapsed() < Duration::from_millis(500));
    }
}
