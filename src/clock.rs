/*
 *  clock.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  Wall-clock state reporting, the worked example plugin
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

//! Clock plugin logic
//!
//! Reports the local time broken into fields. Numbering convention, used by
//! both the schema and every report:
//!
//! - `Month`: 0-11, January = 0
//! - `WeekDay`: 0-6, Monday = 0, Sunday = 6

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use serde::Serialize;

use crate::error::Result;
use crate::plugin::poll::{ChangeResult, Debouncer, PollSource};
use crate::plugin::push::PushSource;
use crate::plugin::value::OwnedValue;

pub const CLOCK_DISPLAY_NAME: &str = "Clock";

pub const CLOCK_SCHEMA: &str = concat!(
    "{",
    r#""Seconds":"number","#,
    r#""Minutes":"number","#,
    r#""Hours":"number","#,
    r#""MonthDay":"number","#,
    r#""Month":"number","#,
    r#""Year":"number","#,
    r#""WeekDay":"number""#,
    "}"
);

/// Month number 1-12 to the reported 0-11
pub const fn month_index(month: u32) -> u32 {
    month.saturating_sub(1)
}

/// Sunday-based weekday 0-6 to the reported Monday-based 0-6
pub const fn weekday_index(days_from_sunday: u32) -> u32 {
    (days_from_sunday + 6) % 7
}

/// One value report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClockReport {
    pub seconds: u32,
    pub minutes: u32,
    pub hours: u32,
    pub month_day: u32,
    pub month: u32,
    pub year: i32,
    pub week_day: u32,
}

impl ClockReport {
    pub fn from_datetime<T: Datelike + Timelike>(time: &T) -> Self {
        Self {
            seconds: time.second(),
            minutes: time.minute(),
            hours: time.hour(),
            month_day: time.day(),
            month: month_index(time.month()),
            year: time.year(),
            week_day: weekday_index(time.weekday().num_days_from_sunday()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Where the clock reads the time from
pub trait TimeSource {
    fn now(&mut self) -> NaiveDateTime;
}

/// The local wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTime;

impl TimeSource for LocalTime {
    fn now(&mut self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

impl<F: FnMut() -> NaiveDateTime> TimeSource for F {
    fn now(&mut self) -> NaiveDateTime {
        self()
    }
}

/// Poll-profile clock, changing once per wall-clock second
pub struct ClockPoller<S = LocalTime> {
    source: S,
    last_second: Debouncer<i64>,
}

impl<S: TimeSource> ClockPoller<S> {
    pub fn with_source(source: S) -> Self {
        Self { source, last_second: Debouncer::new() }
    }

    /// Report the time if the second moved since the previous poll
    pub fn poll(&mut self) -> Result<ChangeResult> {
        let now = self.source.now();
        let encoded = self.last_second.observe_with(now.and_utc().timestamp(), |_| -> Result<OwnedValue> {
            OwnedValue::from_string(ClockReport::from_datetime(&now).to_json()?)
        })?;
        Ok(encoded.map_or(ChangeResult::Unchanged, ChangeResult::Changed))
    }
}

impl<S: TimeSource + Default + 'static> PollSource for ClockPoller<S> {
    fn initialize() -> Result<Self> {
        Ok(Self::with_source(S::default()))
    }

    fn display_name(&self) -> Result<OwnedValue> {
        Ok(OwnedValue::from_static(CLOCK_DISPLAY_NAME))
    }

    fn describe_schema(&self) -> Result<OwnedValue> {
        Ok(OwnedValue::from_static(CLOCK_SCHEMA))
    }

    fn sample(&mut self) -> Result<ChangeResult> {
        self.poll()
    }
}

/// Push-profile clock; ticks faster than a second and reports when the
/// broken-down time changes
pub struct ClockPusher<S = LocalTime> {
    source: S,
}

impl<S: TimeSource> ClockPusher<S> {
    pub fn with_source(source: S) -> Self {
        Self { source }
    }
}

impl<S: TimeSource + Default + 'static> PushSource for ClockPusher<S> {
    type State = ClockReport;

    fn initialize() -> Result<Self> {
        Ok(Self::with_source(S::default()))
    }

    fn display_name() -> Result<OwnedValue> {
        Ok(OwnedValue::from_static(CLOCK_DISPLAY_NAME))
    }

    fn describe_schema() -> Result<OwnedValue> {
        Ok(OwnedValue::from_static(CLOCK_SCHEMA))
    }

    fn sample_state(&mut self) -> Result<ClockReport> {
        Ok(ClockReport::from_datetime(&self.source.now()))
    }

    fn encode(&self, state: &ClockReport) -> Result<OwnedValue> {
        OwnedValue::from_string(state.to_json()?)
    }
}
