/*
 *  plugin/lifecycle.rs
 *
 *  statelink - typed plugin state across the module boundary
 *  (c) 2020-26 Stuart Hunter
 *
 *  Plugin instance lifecycle state machine
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

//! Lifecycle of one plugin instance: `Uninitialized -> Ready -> Finalized`.
//!
//! Misuse is a programming error at the call site, not a runtime condition,
//! so illegal transitions panic instead of returning an error. The host
//! adapter also makes most of them unrepresentable: `finalize` consumes the
//! instance.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Ready,
    Finalized,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Ready => "ready",
            LifecycleState::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Tracks the state of one instance and rejects illegal calls
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self { state: LifecycleState::Uninitialized }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LifecycleState::Ready
    }

    /// Move to `to`
    ///
    /// # Panics
    /// On anything but `Uninitialized -> Ready` or `Ready -> Finalized`.
    pub fn advance(&mut self, to: LifecycleState) {
        let legal = matches!(
            (self.state, to),
            (LifecycleState::Uninitialized, LifecycleState::Ready)
                | (LifecycleState::Ready, LifecycleState::Finalized)
        );
        assert!(legal, "contract violation: illegal lifecycle transition {} -> {}", self.state, to);
        self.state = to;
    }

    /// Guard for every call that needs a live handle
    ///
    /// # Panics
    /// When the instance is not Ready.
    pub fn require_ready(&self, operation: &str) {
        assert!(
            self.is_ready(),
            "contract violation: '{}' called on a {} instance", operation, self.state
        );
    }
}
