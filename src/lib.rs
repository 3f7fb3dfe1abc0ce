/*
 *  lib.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
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

//! statelink - typed plugin state across a dynamic-library boundary
//!
//! The library is both halves of the protocol: plugin crates implement
//! [`plugin::PollSource`] or [`plugin::PushSource`] and export it with a
//! macro, and hosts drive loaded modules through [`plugin::adapter`].

pub mod error;
pub mod pacer;
pub mod plugin;
pub mod clock;
#[cfg(feature = "host")]
pub mod config;

pub use error::{PluginError, Result};
