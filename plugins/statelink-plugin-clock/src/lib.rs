/*
 *  statelink Clock Plugin
 *
 *  A dynamic plugin reporting the local wall-clock time through the
 *  statelink poll profile.
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 */

//! # statelink Clock Plugin (poll profile)
//!
//! The host calls `sample` on its own cadence; the plugin answers with a
//! report once per wall-clock second and "no change" in between.
//!
//! ## Reports
//!
//! ```json
//! {"Seconds":9,"Minutes":45,"Hours":13,"MonthDay":7,"Month":2,"Year":2024,"WeekDay":3}
//! ```
//!
//! `Month` counts from 0 (January) and `WeekDay` from 0 (Monday).
//!
//! ## Usage
//!
//! ```yaml
//! plugin: target/release/libstatelink_plugin_clock.so
//! poll_interval_ms: 250
//! ```

use statelink::clock::ClockPoller;

statelink::export_poll_plugin!(ClockPoller, name = c"Clock", version = c"1.0.0");
