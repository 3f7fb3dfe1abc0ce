/*
 *  tests/push_contract.rs
 *
 *  Integration tests for the push profile, host and plugin side together
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 */

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime};
use statelink::clock::{ClockPusher, TimeSource};
use statelink::plugin::adapter::Capability;
use statelink::plugin::{OwnedValue, ProfileKind, PushPlugin, PushSession, PushSource, PushVTable, StatusCode, StopFlag};
use statelink::Result;

#[derive(Default)]
struct ThursdayAfternoon;

impl TimeSource for ThursdayAfternoon {
    fn now(&mut self) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
            .and_hms_opt(13, 45, 9).unwrap()
    }
}

static FROZEN_CLOCK: PushVTable = PushVTable::of::<ClockPusher<ThursdayAfternoon>>();
static LIVE_CLOCK: PushVTable = PushVTable::of::<ClockPusher>();

statelink::export_push_plugin!(ClockPusher, name = c"Clock", version = c"1.0.0");

fn collect(plugin: &PushPlugin, for_how_long: Duration) -> (Vec<String>, StatusCode) {
    let (tx, rx) = mpsc::channel();
    let session = PushSession::start(plugin, move |bytes| {
        let _ = tx.send(String::from_utf8_lossy(bytes).into_owned());
        StatusCode::Ok
    }).unwrap();

    thread::sleep(for_how_long);
    let status = session.stop().unwrap();
    (rx.try_iter().collect(), status)
}

#[test]
fn test_unchanged_state_reports_once() {
    let plugin = PushPlugin::from_vtable(&FROZEN_CLOCK);
    let (reports, status) = collect(&plugin, Duration::from_millis(200));

    assert_eq!(status, StatusCode::Ok);
    assert_eq!(reports, [
        r#"{"Seconds":9,"Minutes":45,"Hours":13,"MonthDay":7,"Month":2,"Year":2024,"WeekDay":3}"#,
    ]);
}

#[test]
fn test_live_clock_reports_conform_to_schema() {
    let plugin = PushPlugin::from_vtable(&LIVE_CLOCK);
    let schema = plugin.schema().unwrap();
    let (reports, status) = collect(&plugin, Duration::from_millis(1200));

    assert_eq!(status, StatusCode::Ok);
    assert!(!reports.is_empty());
    for report in &reports {
        schema.check_report(report).unwrap();
    }
}

#[test]
fn test_shutdown_within_an_interval() {
    let session = PushSession::start(&PushPlugin::from_vtable(&LIVE_CLOCK), |_| StatusCode::Ok).unwrap();
    thread::sleep(Duration::from_millis(120));

    let requested = Instant::now();
    assert_eq!(session.stop().unwrap(), StatusCode::Ok);
    // one 50 ms tick plus scheduling slack
    assert!(requested.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_preset_stop_flag_returns_without_reports() {
    let flag = StopFlag::new();
    flag.request_stop();

    let (tx, rx) = mpsc::channel::<()>();
    let session = PushSession::start_with_flag(&PushPlugin::from_vtable(&LIVE_CLOCK), flag, move |_| {
        let _ = tx.send(());
        StatusCode::Ok
    }).unwrap();

    assert_eq!(session.stop().unwrap(), StatusCode::Ok);
    assert!(rx.try_recv().is_err());
}

struct Faulty;

impl PushSource for Faulty {
    type State = u8;
    const INTERVAL: Duration = Duration::from_millis(1);

    fn initialize() -> Result<Self> {
        Ok(Faulty)
    }

    fn display_name() -> Result<OwnedValue> {
        Ok(OwnedValue::from_static("Faulty"))
    }

    fn describe_schema() -> Result<OwnedValue> {
        Ok(OwnedValue::from_static(r#"{"Level":"number"}"#))
    }

    fn sample_state(&mut self) -> Result<u8> {
        panic!("sensor went away");
    }

    fn encode(&self, state: &u8) -> Result<OwnedValue> {
        OwnedValue::from_string(format!(r#"{{"Level":{}}}"#, state))
    }
}

static FAULTY: PushVTable = PushVTable::of::<Faulty>();

#[test]
fn test_panicking_plugin_reports_error_status() {
    let session = PushSession::start(&PushPlugin::from_vtable(&FAULTY), |_| StatusCode::Ok).unwrap();

    for _ in 0..200 {
        if session.is_finished() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert!(session.is_finished());
    assert_eq!(session.stop().unwrap(), StatusCode::Error);
}

#[test]
fn test_exported_module_declares_push() {
    // SAFETY: the descriptor is a static in this test crate.
    let descriptor = unsafe { &*statelink_plugin_register() };
    let capability = Capability::from_descriptor(descriptor, None);
    assert_eq!(capability.kind(), ProfileKind::Push);

    let Capability::Push(plugin) = capability else {
        panic!("expected the push profile");
    };
    assert_eq!(plugin.display_name().unwrap(), "Clock");
}
