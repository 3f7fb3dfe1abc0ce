/*
 *  statelink Clock Plugin (push)
 *
 *  A dynamic plugin reporting the local wall-clock time through the
 *  statelink push profile.
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 */

//! # statelink Clock Plugin (push profile)
//!
//! `run` samples the clock every 50 ms on its own thread and calls the
//! host back whenever the broken-down time changes, which in practice is
//! once per second. Reports match the poll-profile clock exactly.
//!
//! ## Usage
//!
//! ```yaml
//! plugin: target/release/libstatelink_plugin_clock_push.so
//! run_for_secs: 10
//! ```

use statelink::clock::ClockPusher;

statelink::export_push_plugin!(ClockPusher, name = c"Clock", version = c"1.0.0");
