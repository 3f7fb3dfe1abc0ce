/*
 *  plugin/mod.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  Plugin boundary protocol
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

//! Plugin boundary protocol
//!
//! A plugin is a dynamic library reporting a small piece of state as JSON
//! text. Everything crossing the boundary is C ABI, so host and plugin may
//! be built by different compilers.
//!
//! ## Architecture
//!
//! 1. **FFI Layer** (`ffi.rs`) - C ABI types, vtables and the descriptor
//! 2. **Values and handles** (`value.rs`, `handle.rs`) - ownership of
//!    everything that crosses the boundary
//! 3. **Profiles** (`poll.rs`, `push.rs`) - plugin-side traits and export
//!    macros for the two capability profiles
//! 4. **Loader** (`loader.rs`) - loads a .so/.dll from a path
//! 5. **Adapter** (`adapter.rs`) - drives a loaded or linked plugin from
//!    the host
//!
//! ## Capability profiles
//!
//! - **Poll**: the host calls `sample` on its own schedule; the plugin
//!   answers with a report or an empty "no change" value.
//! - **Push**: the host calls `run` once; the plugin samples on its own
//!   thread and calls back on every change until the stop flag clears.
//!
//! A module declares exactly one profile in its descriptor.

pub mod ffi;
pub mod value;
pub mod handle;
pub mod lifecycle;
pub mod schema;
pub mod poll;
pub mod push;
pub mod adapter;
pub(crate) mod guard;

#[cfg(feature = "plugin-system")]
pub mod loader;

// Re-exports for convenience
pub use ffi::{
    PluginDescriptor,
    PollVTable,
    PushVTable,
    Profile,
    ProfileKind,
    RawValue,
    Ownership,
    StatusCode,
};

pub use value::{OwnedValue, ReceivedValue};
pub use handle::PluginHandle;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use schema::{Schema, TypeTag};
pub use poll::{ChangeResult, Debouncer, PollSource};
pub use push::{PushSource, StopFlag};
pub use adapter::{Capability, PollInstance, PollPlugin, PushPlugin, PushSession};

#[cfg(feature = "plugin-system")]
pub use loader::{LoadedPlugin, PluginLoader, PluginMetadata};
