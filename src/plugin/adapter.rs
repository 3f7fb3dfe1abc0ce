/*
 *  plugin/adapter.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  Host-side adapters driving a plugin through its vtable
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

//! Host side of both capability profiles
//!
//! These wrappers own everything the host must get right: every received
//! value goes back through the producing module's `release`, handles are
//! surrendered to `finalize` exactly once, and push loops are stopped and
//! joined before the module can be unloaded.

use std::any::Any;
use std::ffi::c_void;
use std::ptr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use log::{debug, info, warn};

use crate::error::{PluginError, Result};
use super::ffi::{
    PluginDescriptor, PollVTable, Profile, ProfileKind, PushVTable,
    RawHandle, RawValue, ReleaseFn, StatusCode,
};
use super::guard::{catch_ffi_call, panic_message};
use super::handle::PluginHandle;
use super::lifecycle::{Lifecycle, LifecycleState};
use super::push::StopFlag;
use super::schema::Schema;
use super::value::ReceivedValue;

/// Keeps the module a vtable points into loaded
///
/// `None` for plugins linked into the host itself.
pub type ModuleGuard = Arc<dyn Any + Send + Sync>;

/// Call an entry point that answers through an out-value
fn fetch<F>(operation: &'static str, release: ReleaseFn, call: F) -> Result<ReceivedValue>
where
    F: FnOnce(*mut RawValue) -> StatusCode,
{
    let mut out = RawValue::empty();
    PluginError::check(operation, call(&mut out))?;
    // SAFETY: the plugin wrote a fresh value into `out` on success.
    Ok(unsafe { ReceivedValue::from_raw(out, release) })
}

fn text(value: ReceivedValue) -> Result<String> {
    Ok(value.as_str()?.to_string())
}

/// The profile a module declared, ready to drive
#[derive(Clone)]
pub enum Capability {
    Poll(PollPlugin),
    Push(PushPlugin),
}

impl Capability {
    /// Resolve the profile named by `descriptor`
    pub fn from_descriptor(descriptor: &'static PluginDescriptor, module: Option<ModuleGuard>) -> Self {
        match descriptor.profile {
            Profile::Poll(vtable) => Capability::Poll(PollPlugin { vtable, module }),
            Profile::Push(vtable) => Capability::Push(PushPlugin { vtable, module }),
        }
    }

    pub fn kind(&self) -> ProfileKind {
        match self {
            Capability::Poll(_) => ProfileKind::Poll,
            Capability::Push(_) => ProfileKind::Push,
        }
    }
}

/// A module implementing the poll profile
#[derive(Clone)]
pub struct PollPlugin {
    vtable: &'static PollVTable,

    /// Keeps the module loaded while any instance lives
    #[allow(dead_code)]
    module: Option<ModuleGuard>,
}

impl PollPlugin {
    /// Wrap a vtable from a plugin linked into this binary
    pub fn from_vtable(vtable: &'static PollVTable) -> Self {
        Self { vtable, module: None }
    }

    /// Create a new instance
    ///
    /// A failed initialize is terminal: no handle exists and there is
    /// nothing to finalize.
    pub fn initialize(&self) -> Result<PollInstance> {
        let mut lifecycle = Lifecycle::new();
        let mut raw = ptr::null_mut();

        PluginError::check("initialize", (self.vtable.initialize)(&mut raw))?;
        let handle = PluginHandle::new(raw).ok_or_else(|| {
            PluginError::ContractViolation("initialize succeeded without a handle".to_string())
        })?;
        lifecycle.advance(LifecycleState::Ready);

        debug!("Created poll plugin instance: {:p}", raw);

        Ok(PollInstance {
            plugin: self.clone(),
            handle: Some(handle),
            lifecycle,
            schema: None,
            validate_reports: true,
        })
    }
}

/// One live poll-profile instance
///
/// Not `Send`: calls on a handle must come from one caller sequence.
pub struct PollInstance {
    plugin: PollPlugin,
    handle: Option<PluginHandle>,
    lifecycle: Lifecycle,
    schema: Option<Schema>,
    validate_reports: bool,
}

impl PollInstance {
    /// Check every report against the declared schema (on by default)
    pub fn set_validate_reports(&mut self, validate: bool) {
        self.validate_reports = validate;
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    fn raw_handle(&self, operation: &str) -> *mut RawHandle {
        self.lifecycle.require_ready(operation);
        self.handle.as_ref().map_or(ptr::null_mut(), PluginHandle::as_ptr)
    }

    pub fn display_name(&self) -> Result<String> {
        let handle = self.raw_handle("display_name");
        let display_name = self.plugin.vtable.display_name;
        text(fetch("display_name", self.plugin.vtable.release, |out| display_name(handle, out))?)
    }

    /// The schema declaration exactly as the plugin produced it
    pub fn describe_schema(&self) -> Result<ReceivedValue> {
        let handle = self.raw_handle("describe_schema");
        let describe_schema = self.plugin.vtable.describe_schema;
        fetch("describe_schema", self.plugin.vtable.release, |out| describe_schema(handle, out))
    }

    /// Parsed schema, fetched once per instance
    pub fn schema(&mut self) -> Result<&Schema> {
        let schema = match self.schema.take() {
            Some(schema) => schema,
            None => Schema::parse(self.describe_schema()?.as_str()?)?,
        };
        Ok(self.schema.insert(schema))
    }

    /// Sample the plugin; `None` when nothing changed since the last call
    pub fn sample(&mut self) -> Result<Option<ReceivedValue>> {
        let handle = self.raw_handle("sample");
        let sample = self.plugin.vtable.sample;
        let value = fetch("sample", self.plugin.vtable.release, |out| sample(handle, out))?;

        if value.is_empty() {
            return Ok(None);
        }
        if self.validate_reports {
            let report = value.as_str()?;
            self.schema()?.check_report(report)?;
        }
        Ok(Some(value))
    }

    /// Release the instance; the handle is gone whatever the plugin answers
    pub fn finalize(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.lifecycle.require_ready("finalize");
        let handle = self.handle.take().map_or(ptr::null_mut(), PluginHandle::into_raw);
        self.lifecycle.advance(LifecycleState::Finalized);

        debug!("Finalizing poll plugin instance: {:p}", handle);
        PluginError::check("finalize", (self.plugin.vtable.finalize)(handle))
    }
}

impl Drop for PollInstance {
    fn drop(&mut self) {
        if self.lifecycle.is_ready() {
            if let Err(e) = self.shutdown() {
                warn!("Failed to finalize poll plugin instance: {}", e);
            }
        }
    }
}

/// A module implementing the push profile
#[derive(Clone)]
pub struct PushPlugin {
    vtable: &'static PushVTable,
    module: Option<ModuleGuard>,
}

impl PushPlugin {
    /// Wrap a vtable from a plugin linked into this binary
    pub fn from_vtable(vtable: &'static PushVTable) -> Self {
        Self { vtable, module: None }
    }

    pub fn display_name(&self) -> Result<String> {
        let display_name = self.vtable.display_name;
        text(fetch("display_name", self.vtable.release, |out| display_name(out))?)
    }

    pub fn describe_schema(&self) -> Result<ReceivedValue> {
        let describe_schema = self.vtable.describe_schema;
        fetch("describe_schema", self.vtable.release, |out| describe_schema(out))
    }

    pub fn schema(&self) -> Result<Schema> {
        Schema::parse(self.describe_schema()?.as_str()?)
    }
}

type Sink = Box<dyn FnMut(&[u8]) -> StatusCode + Send>;

/// Callback handed to `run`; `context` is the session's boxed sink
extern "C" fn forward_update(context: *mut c_void, bytes: *const u8, len: usize) -> StatusCode {
    catch_ffi_call("on_update", || {
        // SAFETY: context is the &mut Sink owned by the run thread for the
        // duration of run; the plugin calls back on one thread at a time.
        let sink = unsafe { (context as *mut Sink).as_mut() }
            .ok_or_else(|| PluginError::ContractViolation("null callback context".to_string()))?;
        let payload = if bytes.is_null() || len == 0 {
            &[][..]
        } else {
            // SAFETY: the plugin guarantees len readable bytes during the call.
            unsafe { std::slice::from_raw_parts(bytes, len) }
        };
        PluginError::check("on_update", sink(payload))
    })
}

/// A push plugin's `run` in progress on a host thread
///
/// Dropping the session stops and joins it.
pub struct PushSession {
    flag: StopFlag,
    worker: Option<JoinHandle<StatusCode>>,
}

impl PushSession {
    /// Call `run` on a new thread, feeding every update to `sink`
    ///
    /// `sink` runs on the plugin's sampling thread and must return quickly.
    pub fn start<F>(plugin: &PushPlugin, sink: F) -> Result<Self>
    where
        F: FnMut(&[u8]) -> StatusCode + Send + 'static,
    {
        Self::start_with_flag(plugin, StopFlag::new(), sink)
    }

    /// As [`start`](Self::start), observing an existing stop flag
    pub fn start_with_flag<F>(plugin: &PushPlugin, flag: StopFlag, sink: F) -> Result<Self>
    where
        F: FnMut(&[u8]) -> StatusCode + Send + 'static,
    {
        let run = plugin.vtable.run;
        let module = plugin.module.clone();
        let keep_running = flag.clone();
        let mut sink: Sink = Box::new(sink);

        let worker = thread::Builder::new()
            .name("statelink-host-run".to_string())
            .spawn(move || {
                // held until run returns so the module stays mapped
                let _module = module;
                let context = &mut sink as *mut Sink as *mut c_void;
                run(keep_running.as_ptr(), forward_update, context)
            })
            .map_err(|e| PluginError::Allocation(format!("cannot spawn run thread: {}", e)))?;

        info!("Push session started");
        Ok(Self { flag, worker: Some(worker) })
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.flag.clone()
    }

    /// Ask the loop to stop without waiting for it
    pub fn request_stop(&self) {
        self.flag.request_stop();
    }

    /// True once `run` has returned
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the loop and wait for `run` to return its status
    pub fn stop(mut self) -> Result<StatusCode> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<StatusCode> {
        self.flag.request_stop();
        let Some(worker) = self.worker.take() else {
            return Ok(StatusCode::Ok);
        };
        let status = worker.join()
            .map_err(|payload| PluginError::Panic(panic_message(&*payload)))?;
        info!("Push session stopped with status {:?}", status);
        Ok(status)
    }
}

impl Drop for PushSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.shutdown() {
                warn!("Push session ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;
    use crate::plugin::poll::{ChangeResult, PollSource};
    use crate::plugin::push::PushSource;
    use crate::plugin::value::OwnedValue;

    struct Counter {
        next: u32,
    }

    impl PollSource for Counter {
        fn initialize() -> Result<Self> {
            Ok(Self { next: 0 })
        }

        fn display_name(&self) -> Result<OwnedValue> {
            Ok(OwnedValue::from_static("Counter"))
        }

        fn describe_schema(&self) -> Result<OwnedValue> {
            Ok(OwnedValue::from_static(r#"{"Count":"number"}"#))
        }

        fn sample(&mut self) -> Result<ChangeResult> {
            self.next += 1;
            if self.next % 2 == 0 {
                return Ok(ChangeResult::Unchanged);
            }
            let report = format!(r#"{{"Count":{}}}"#, self.next);
            Ok(ChangeResult::Changed(OwnedValue::from_string(report)?))
        }
    }

    static COUNTER: PollVTable = PollVTable::of::<Counter>();

    #[test]
    fn test_poll_instance_round_trip() {
        let plugin = PollPlugin::from_vtable(&COUNTER);
        let mut instance = plugin.initialize().unwrap();
        assert_eq!(instance.state(), LifecycleState::Ready);
        assert_eq!(instance.display_name().unwrap(), "Counter");
        assert_eq!(instance.schema().unwrap().len(), 1);

        let first = instance.sample().unwrap().unwrap();
        assert_eq!(first.as_str().unwrap(), r#"{"Count":1}"#);
        assert!(instance.sample().unwrap().is_none());

        instance.finalize().unwrap();
    }

    struct Liar;

    impl PollSource for Liar {
        fn initialize() -> Result<Self> {
            Ok(Self)
        }

        fn display_name(&self) -> Result<OwnedValue> {
            Ok(OwnedValue::from_static("Liar"))
        }

        fn describe_schema(&self) -> Result<OwnedValue> {
            Ok(OwnedValue::from_static(r#"{"Count":"number"}"#))
        }

        fn sample(&mut self) -> Result<ChangeResult> {
            Ok(ChangeResult::Changed(OwnedValue::from_static(r#"{"Count":"many"}"#)))
        }
    }

    static LIAR: PollVTable = PollVTable::of::<Liar>();

    #[test]
    fn test_report_outside_schema_is_rejected() {
        let mut instance = PollPlugin::from_vtable(&LIAR).initialize().unwrap();
        let err = instance.sample().unwrap_err();
        assert!(matches!(err, PluginError::ContractViolation(_)));

        instance.set_validate_reports(false);
        assert!(instance.sample().unwrap().is_some());
    }

    struct Beacon {
        ticks: u32,
    }

    impl PushSource for Beacon {
        type State = u32;
        const INTERVAL: Duration = Duration::from_millis(2);

        fn initialize() -> Result<Self> {
            Ok(Self { ticks: 0 })
        }

        fn display_name() -> Result<OwnedValue> {
            Ok(OwnedValue::from_static("Beacon"))
        }

        fn describe_schema() -> Result<OwnedValue> {
            Ok(OwnedValue::from_static(r#"{"Tick":"number"}"#))
        }

        fn sample_state(&mut self) -> Result<u32> {
            self.ticks += 1;
            Ok(self.ticks / 3)
        }

        fn encode(&self, state: &u32) -> Result<OwnedValue> {
            OwnedValue::from_string(format!(r#"{{"Tick":{}}}"#, state))
        }
    }

    static BEACON: PushVTable = PushVTable::of::<Beacon>();

    #[test]
    fn test_push_plugin_metadata() {
        let plugin = PushPlugin::from_vtable(&BEACON);
        assert_eq!(plugin.display_name().unwrap(), "Beacon");

        let schema = plugin.describe_schema().unwrap();
        assert_eq!(schema.ownership(), crate::plugin::ffi::Ownership::Borrowed);
        assert_eq!(schema.as_str().unwrap(), r#"{"Tick":"number"}"#);
        assert_eq!(plugin.schema().unwrap().to_json().unwrap(), r#"{"Tick":"number"}"#);
    }

    #[test]
    fn test_push_session_delivers_and_stops() {
        let plugin = PushPlugin::from_vtable(&BEACON);
        assert_eq!(plugin.display_name().unwrap(), "Beacon");
        let schema = plugin.schema().unwrap();

        let (tx, rx) = mpsc::channel();
        let session = PushSession::start(&plugin, move |bytes| {
            let _ = tx.send(String::from_utf8_lossy(bytes).into_owned());
            StatusCode::Ok
        }).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_ne!(first, second);
        schema.check_report(&first).unwrap();

        assert_eq!(session.stop().unwrap(), StatusCode::Ok);
    }

    #[test]
    fn test_external_stop_flag() {
        let flag = StopFlag::new();
        let session = PushSession::start_with_flag(
            &PushPlugin::from_vtable(&BEACON),
            flag.clone(),
            |_| StatusCode::Ok,
        ).unwrap();

        flag.request_stop();
        for _ in 0..200 {
            if session.is_finished() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(session.is_finished());
        assert_eq!(session.stop().unwrap(), StatusCode::Ok);
    }

    static SEEN: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn null_run(keep_running: *const AtomicI32, on_update: crate::plugin::ffi::UpdateCallbackFn, context: *mut c_void) -> StatusCode {
        assert!(!keep_running.is_null());
        // the payload pointer may be null for an empty update
        let status = on_update(context, ptr::null(), 0);
        SEEN.fetch_add(1, Ordering::SeqCst);
        status
    }

    extern "C" fn no_value(_out: *mut RawValue) -> StatusCode {
        StatusCode::Error
    }

    extern "C" fn no_release(_value: RawValue) {}

    static ONE_SHOT: PushVTable = PushVTable {
        display_name: no_value,
        describe_schema: no_value,
        run: null_run,
        release: no_release,
    };

    #[test]
    fn test_sink_status_reaches_plugin() {
        let plugin = PushPlugin::from_vtable(&ONE_SHOT);
        assert!(matches!(plugin.display_name(), Err(PluginError::Status { operation: "display_name" })));

        let session = PushSession::start(&plugin, |bytes| {
            assert!(bytes.is_empty());
            StatusCode::Error
        }).unwrap();
        assert_eq!(session.stop().unwrap(), StatusCode::Error);
        assert_eq!(SEEN.load(Ordering::SeqCst), 1);
    }
}
